//! Media library access.
//!
//! The tree consumes the library through the `MediaLibrary` trait. An
//! in-memory implementation backs the terminal front end and the tests;
//! it is filled from a JSON fixture or by scanning a music directory.

use std::collections::{ BTreeSet, HashMap };
use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::domain::{ ChangeKind, LibraryEvent, MediaObject, MediaRef, ObjectType, Query };
use crate::list::MediaList;


/// Supported audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "wma", "aiff", "alac",
];

const EVENT_CHANNEL_CAPACITY: usize = 256;


/// Errors that can occur during library operations.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid library fixture: {0}" )]
    Fixture( #[from] serde_json::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "Object not found: {0}" )]
    MissingObject( String ),

    #[error( "Operation not supported: {0}" )]
    Unsupported( String ),
}


pub type LibraryResult<T> = Result<T, LibraryError>;


/// Album lookup sent to the online catalog.
#[derive( Debug, Clone, PartialEq )]
pub struct OnlineAlbumQuery {
    pub title: String,
    pub artist: Option<String>,
}


/// The database and online clients, seen through the queries the tree needs.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Runs a query and returns matching objects in display order.
    async fn query( &self, query: Query ) -> LibraryResult<Vec<MediaRef>>;

    /// Looks up an object by its persisted identity.
    async fn get_object( &self, object_type: ObjectType, persistent_info: &str ) -> LibraryResult<Option<MediaRef>>;

    /// Returns the chain of parents of a playlist or folder, top level first.
    async fn parents_of( &self, object: &MediaObject ) -> LibraryResult<Vec<MediaRef>>;

    /// Searches the online catalog for an album.
    async fn search_online( &self, query: OnlineAlbumQuery ) -> LibraryResult<Option<MediaRef>>;

    /// Appends tracks to a playlist.
    async fn add_to_playlist( &self, playlist: &MediaObject, tracks: &[MediaRef] ) -> LibraryResult<()>;

    /// Moves tracks into a folder.
    async fn move_to_folder( &self, folder: &MediaObject, tracks: &[MediaRef] ) -> LibraryResult<()>;

    /// Deletes an object (playlists only for now).
    async fn delete_object( &self, object: &MediaObject ) -> LibraryResult<()>;

    /// Subscribes to change notifications.
    fn subscribe( &self ) -> broadcast::Receiver<LibraryEvent>;
}


/// Returns a list that fills asynchronously with the result of `query`.
///
/// The list is marked loaded when the query finishes, even on failure, so
/// `when_loaded` waiters are never stranded. A canceled fill leaves the
/// list unloaded.
pub fn query_list(
    library: std::sync::Arc<dyn MediaLibrary>,
    query: Query,
    token: CancellationToken,
) -> MediaList {
    let list = MediaList::new();
    let target = list.clone();
    tokio::spawn( async move {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = library.query( query.clone() ) => result,
        };
        match result {
            Ok( items ) => target.add_list( items ),
            Err( e ) => tracing::warn!( "List query {:?} failed: {}", query, e ),
        }
        target.set_loaded();
    } );
    list
}


/// Tracks of a domain object, filled asynchronously.
pub fn get_tracklist(
    library: std::sync::Arc<dyn MediaLibrary>,
    scope: MediaRef,
    token: CancellationToken,
) -> MediaList {
    query_list( library, Query::Tracks { scope }, token )
}


/// Albums of a domain object, filled asynchronously.
pub fn get_album_list(
    library: std::sync::Arc<dyn MediaLibrary>,
    scope: MediaRef,
    token: CancellationToken,
) -> MediaList {
    let query = match scope.object_type {
        ObjectType::Collection => Query::Albums { collection: scope.persistent_info.clone() },
        _ => Query::AlbumsOf { scope },
    };
    query_list( library, query, token )
}


/// Artists of a domain object, filled asynchronously.
pub fn get_person_list(
    library: std::sync::Arc<dyn MediaLibrary>,
    scope: MediaRef,
    token: CancellationToken,
) -> MediaList {
    let query = match scope.object_type {
        ObjectType::Collection => Query::Artists { collection: scope.persistent_info.clone() },
        _ => Query::ArtistsOf { scope },
    };
    query_list( library, query, token )
}


/// Serialized form of an in-memory library.
#[derive( Debug, Clone, Default, Serialize, Deserialize )]
#[serde( default )]
pub struct LibraryFixture {
    pub objects: Vec<MediaObject>,

    /// Albums only known to the online catalog.
    pub online: Vec<MediaObject>,

    /// Playlist id to track ids.
    pub playlist_items: HashMap<String, Vec<String>>,
}


/// In-memory library with change notifications and call counters.
pub struct MemoryLibrary {
    objects: RwLock<Vec<MediaRef>>,
    online: RwLock<Vec<MediaRef>>,
    playlist_items: RwLock<HashMap<String, Vec<String>>>,
    events: broadcast::Sender<LibraryEvent>,
    latency: RwLock<Option<Duration>>,
    online_latency: RwLock<Option<Duration>>,
    query_count: AtomicUsize,
    online_count: AtomicUsize,
    snapshot_first: AtomicBool,
}


impl MemoryLibrary {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::from_fixture( LibraryFixture::default() )
    }


    /// Creates a library from fixture data.
    pub fn from_fixture( fixture: LibraryFixture ) -> Self {
        let ( events, _ ) = broadcast::channel( EVENT_CHANNEL_CAPACITY );
        Self {
            objects: RwLock::new( fixture.objects.into_iter().map( MediaObject::into_ref ).collect() ),
            online: RwLock::new( fixture.online.into_iter().map( MediaObject::into_ref ).collect() ),
            playlist_items: RwLock::new( fixture.playlist_items ),
            events,
            latency: RwLock::new( None ),
            online_latency: RwLock::new( None ),
            query_count: AtomicUsize::new( 0 ),
            online_count: AtomicUsize::new( 0 ),
            snapshot_first: AtomicBool::new( false ),
        }
    }


    /// Loads a fixture file.
    pub fn load( path: &Path ) -> LibraryResult<Self> {
        if !path.exists() {
            return Err( LibraryError::NotFound( path.to_path_buf() ) );
        }
        let contents = std::fs::read_to_string( path )?;
        let fixture: LibraryFixture = serde_json::from_str( &contents )?;
        tracing::info!( "Loaded {} library objects from {:?}", fixture.objects.len(), path );
        Ok( Self::from_fixture( fixture ) )
    }


    /// Delays every query, simulating a slow database.
    pub fn set_latency( &self, latency: Option<Duration> ) {
        *self.latency.write() = latency;
    }


    /// Delays every online lookup.
    pub fn set_online_latency( &self, latency: Option<Duration> ) {
        *self.online_latency.write() = latency;
    }


    /// Makes `query` read its result before the simulated latency, like a
    /// database that answers from a snapshot taken when the query started.
    pub fn set_snapshot_first( &self, snapshot_first: bool ) {
        self.snapshot_first.store( snapshot_first, Ordering::SeqCst );
    }


    /// Number of `query` calls served.
    pub fn query_count( &self ) -> usize {
        self.query_count.load( Ordering::SeqCst )
    }


    /// Number of online lookups served.
    pub fn online_count( &self ) -> usize {
        self.online_count.load( Ordering::SeqCst )
    }


    /// Adds an object and announces it.
    pub fn insert( &self, object: MediaObject ) -> MediaRef {
        let object = object.into_ref();
        self.objects.write().push( object.clone() );
        self.emit( ChangeKind::Added, object.clone() );
        object
    }


    /// Replaces an object with the same identity and announces the change.
    pub fn update( &self, object: MediaObject ) -> LibraryResult<MediaRef> {
        let object = object.into_ref();
        {
            let mut objects = self.objects.write();
            let slot = objects.iter_mut()
                .find( |o| o.same_object( &object ) )
                .ok_or_else( || LibraryError::MissingObject( object.key() ) )?;
            *slot = object.clone();
        }
        self.emit( ChangeKind::Changed, object.clone() );
        Ok( object )
    }


    /// Announces a change without modifying anything.
    pub fn touch( &self, object: &MediaRef ) {
        self.emit( ChangeKind::Changed, object.clone() );
    }


    fn emit( &self, kind: ChangeKind, object: MediaRef ) {
        let _ = self.events.send( LibraryEvent { kind, object } );
    }


    async fn simulate_latency( &self, online: bool ) {
        let latency = if online { *self.online_latency.read() } else { *self.latency.read() };
        if let Some( latency ) = latency {
            tokio::time::sleep( latency ).await;
        }
    }


    fn find( &self, object_type: ObjectType, persistent_info: &str ) -> Option<MediaRef> {
        self.objects.read().iter()
            .find( |o| o.object_type == object_type && o.persistent_info == persistent_info )
            .cloned()
    }


    fn filter( &self, pred: impl Fn( &MediaObject ) -> bool ) -> Vec<MediaRef> {
        self.objects.read().iter().filter( |o| pred( o ) ).cloned().collect()
    }


    fn tracks_of( &self, scope: &MediaObject ) -> Vec<MediaRef> {
        let id = scope.persistent_info.as_str();
        match scope.object_type {
            ObjectType::Collection => self.filter( |o| o.object_type == ObjectType::Track && o.collection.as_deref() == Some( id ) ),
            ObjectType::Album => {
                if !scope.local {
                    return Vec::new();
                }
                self.filter( |o| o.object_type == ObjectType::Track && o.album.as_deref() == Some( id ) )
            }
            ObjectType::Artist => self.filter( |o| o.object_type == ObjectType::Track && o.artist.as_deref() == Some( id ) ),
            ObjectType::Genre => self.filter( |o| o.object_type == ObjectType::Track && o.genre.as_deref() == Some( id ) ),
            ObjectType::Year => self.filter( |o| {
                o.object_type == ObjectType::Track
                    && o.collection == scope.collection
                    && o.year == scope.year
            } ),
            ObjectType::Folder | ObjectType::Device => {
                self.filter( |o| o.object_type == ObjectType::Track && o.parent.as_deref() == Some( id ) )
            }
            ObjectType::Playlist => {
                let ids = self.playlist_items.read().get( id ).cloned().unwrap_or_default();
                ids.iter().filter_map( |t| self.find( ObjectType::Track, t ) ).collect()
            }
            ObjectType::Track => vec![ std::sync::Arc::new( scope.clone() ) ],
        }
    }


    fn albums_of( &self, scope: &MediaObject ) -> Vec<MediaRef> {
        match scope.object_type {
            ObjectType::Artist => self.filter( |o| {
                o.object_type == ObjectType::Album && o.artist.as_deref() == Some( scope.persistent_info.as_str() )
            } ),
            ObjectType::Year => self.filter( |o| {
                o.object_type == ObjectType::Album && o.collection == scope.collection && o.year == scope.year
            } ),
            _ => {
                let ids: BTreeSet<String> = self.tracks_of( scope ).iter()
                    .filter_map( |t| t.album.clone() )
                    .collect();
                ids.iter().filter_map( |id| self.find( ObjectType::Album, id ) ).collect()
            }
        }
    }


    fn artists_of( &self, scope: &MediaObject ) -> Vec<MediaRef> {
        let ids: BTreeSet<String> = self.tracks_of( scope ).iter()
            .filter_map( |t| t.artist.clone() )
            .collect();
        ids.iter().filter_map( |id| self.find( ObjectType::Artist, id ) ).collect()
    }
}


impl Default for MemoryLibrary {
    fn default() -> Self {
        Self::new()
    }
}


#[async_trait]
impl MediaLibrary for MemoryLibrary {
    async fn query( &self, query: Query ) -> LibraryResult<Vec<MediaRef>> {
        self.query_count.fetch_add( 1, Ordering::SeqCst );
        let snapshot_first = self.snapshot_first.load( Ordering::SeqCst );
        if !snapshot_first {
            self.simulate_latency( false ).await;
        }

        let of_type = |t: ObjectType, collection: &str| {
            self.filter( |o| o.object_type == t && o.collection.as_deref() == Some( collection ) )
        };

        let result = match &query {
            Query::Collections => self.filter( |o| o.object_type == ObjectType::Collection ),
            Query::Albums { collection } => of_type( ObjectType::Album, collection )
                .into_iter()
                .filter( |a| !a.series )
                .collect(),
            Query::Series { collection } => of_type( ObjectType::Album, collection )
                .into_iter()
                .filter( |a| a.series )
                .collect(),
            Query::Artists { collection } => of_type( ObjectType::Artist, collection ),
            Query::Genres { collection } => of_type( ObjectType::Genre, collection ),
            Query::Years { collection } => of_type( ObjectType::Year, collection ),
            Query::Tracks { scope } => self.tracks_of( scope ),
            Query::AlbumsOf { scope } => self.albums_of( scope ),
            Query::ArtistsOf { scope } => self.artists_of( scope ),
            Query::Playlists { parent } => self.filter( |o| o.object_type == ObjectType::Playlist && o.parent == *parent ),
            Query::Folders { parent } => self.filter( |o| o.object_type == ObjectType::Folder && o.parent == *parent ),
            Query::Devices => self.filter( |o| o.object_type == ObjectType::Device ),
        };

        if snapshot_first {
            self.simulate_latency( false ).await;
        }
        tracing::trace!( "Query {:?} returned {} objects", query, result.len() );
        Ok( result )
    }


    async fn get_object( &self, object_type: ObjectType, persistent_info: &str ) -> LibraryResult<Option<MediaRef>> {
        self.simulate_latency( false ).await;
        if let Some( found ) = self.find( object_type, persistent_info ) {
            return Ok( Some( found ) );
        }
        Ok( self.online.read().iter()
            .find( |o| o.object_type == object_type && o.persistent_info == persistent_info )
            .cloned() )
    }


    async fn parents_of( &self, object: &MediaObject ) -> LibraryResult<Vec<MediaRef>> {
        let mut chain = Vec::new();
        let mut parent = object.parent.clone();
        while let Some( id ) = parent {
            let found = self.find( object.object_type, &id )
                .ok_or_else( || LibraryError::MissingObject( format!( "{}:{}", object.object_type, id ) ) )?;
            if chain.iter().any( |p: &MediaRef| p.same_object( &found ) ) {
                break;
            }
            parent = found.parent.clone();
            chain.push( found );
        }
        chain.reverse();
        Ok( chain )
    }


    async fn search_online( &self, query: OnlineAlbumQuery ) -> LibraryResult<Option<MediaRef>> {
        self.online_count.fetch_add( 1, Ordering::SeqCst );
        self.simulate_latency( true ).await;

        let title = query.title.to_lowercase();
        let artist = query.artist.map( |a| a.to_lowercase() );
        Ok( self.online.read().iter()
            .find( |o| {
                o.title.to_lowercase() == title
                    && match ( &artist, &o.artist ) {
                        ( Some( wanted ), Some( have ) ) => wanted == &have.to_lowercase(),
                        _ => true,
                    }
            } )
            .cloned() )
    }


    async fn add_to_playlist( &self, playlist: &MediaObject, tracks: &[MediaRef] ) -> LibraryResult<()> {
        let playlist = self.find( ObjectType::Playlist, &playlist.persistent_info )
            .ok_or_else( || LibraryError::MissingObject( playlist.key() ) )?;
        self.playlist_items.write()
            .entry( playlist.persistent_info.clone() )
            .or_default()
            .extend( tracks.iter().map( |t| t.persistent_info.clone() ) );
        self.emit( ChangeKind::Changed, playlist );
        Ok(())
    }


    async fn move_to_folder( &self, folder: &MediaObject, tracks: &[MediaRef] ) -> LibraryResult<()> {
        let folder = self.find( ObjectType::Folder, &folder.persistent_info )
            .ok_or_else( || LibraryError::MissingObject( folder.key() ) )?;
        let mut moved = Vec::new();
        {
            let mut objects = self.objects.write();
            for slot in objects.iter_mut() {
                if tracks.iter().any( |t| t.same_object( slot ) ) {
                    let mut track = ( **slot ).clone();
                    track.parent = Some( folder.persistent_info.clone() );
                    *slot = track.into_ref();
                    moved.push( slot.clone() );
                }
            }
        }
        for track in moved {
            self.emit( ChangeKind::Changed, track );
        }
        self.emit( ChangeKind::Changed, folder );
        Ok(())
    }


    async fn delete_object( &self, object: &MediaObject ) -> LibraryResult<()> {
        if object.object_type != ObjectType::Playlist {
            return Err( LibraryError::Unsupported( format!( "delete {}", object.object_type ) ) );
        }
        let removed = {
            let mut objects = self.objects.write();
            let pos = objects.iter().position( |o| o.same_object( object ) )
                .ok_or_else( || LibraryError::MissingObject( object.key() ) )?;
            objects.remove( pos )
        };
        self.playlist_items.write().remove( &object.persistent_info );
        self.emit( ChangeKind::Removed, removed );
        Ok(())
    }


    fn subscribe( &self ) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }
}


/// Builds a library fixture from a music directory.
///
/// The expected layout is `Artist/Album/Track.ext`. Every directory also
/// becomes a folder object, and all tracks land in one collection.
pub struct LibraryScanner {
    roots: Vec<PathBuf>,
    collection: String,
}


impl LibraryScanner {
    /// Creates a scanner that files tracks under the given collection id.
    pub fn new( collection: impl Into<String> ) -> Self {
        Self { roots: Vec::new(), collection: collection.into() }
    }


    /// Adds a root directory to scan.
    pub fn add_root( &mut self, path: PathBuf ) {
        if !self.roots.contains( &path ) {
            self.roots.push( path );
        }
    }


    /// Gets all root directories.
    pub fn roots( &self ) -> &[PathBuf] {
        &self.roots
    }


    /// Scans all roots and returns the discovered objects.
    pub fn scan( &self ) -> Result<LibraryFixture, LibraryError> {
        let mut fixture = LibraryFixture::default();
        fixture.objects.push( MediaObject::new( ObjectType::Collection, self.collection.clone(), "Music" ) );

        for root in &self.roots {
            tracing::info!( "Scanning: {:?}", root );
            self.scan_recursive( root, None, 0, &mut fixture )?;
        }

        let tracks = fixture.objects.iter().filter( |o| o.object_type == ObjectType::Track ).count();
        tracing::info!( "Found {} tracks", tracks );
        Ok( fixture )
    }


    fn scan_recursive(
        &self,
        dir: &Path,
        parent: Option<&str>,
        depth: usize,
        fixture: &mut LibraryFixture,
    ) -> Result<(), LibraryError> {
        let entries = match std::fs::read_dir( dir ) {
            Ok( e ) => e,
            Err( e ) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                tracing::warn!( "Access denied: {:?}", dir );
                return Ok(());
            }
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err( LibraryError::NotFound( dir.to_path_buf() ) );
            }
            Err( e ) => return Err( LibraryError::Io( e ) ),
        };

        let folder_id = dir.to_string_lossy().to_string();
        let mut folder = MediaObject::new( ObjectType::Folder, folder_id.clone(), display_name( dir ) );
        folder.parent = parent.map( str::to_string );
        fixture.objects.push( folder );

        let mut paths: Vec<PathBuf> = entries.flatten().map( |e| e.path() ).collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                if depth == 0 {
                    self.ensure_artist( &path, fixture );
                } else if depth == 1 {
                    self.ensure_album( &path, fixture );
                }
                self.scan_recursive( &path, Some( &folder_id ), depth + 1, fixture )?;
            } else if Self::is_audio_file( &path ) {
                fixture.objects.push( self.track_for( &path, &folder_id, depth ) );
            }
        }

        Ok(())
    }


    fn ensure_artist( &self, dir: &Path, fixture: &mut LibraryFixture ) {
        let id = slug( &display_name( dir ) );
        if !fixture.objects.iter().any( |o| o.object_type == ObjectType::Artist && o.persistent_info == id ) {
            fixture.objects.push(
                MediaObject::new( ObjectType::Artist, id, display_name( dir ) ).with_collection( self.collection.clone() ),
            );
        }
    }


    fn ensure_album( &self, dir: &Path, fixture: &mut LibraryFixture ) {
        let artist = dir.parent().map( |p| slug( &display_name( p ) ) );
        let id = format!( "{}/{}", artist.clone().unwrap_or_default(), slug( &display_name( dir ) ) );
        let mut album = MediaObject::new( ObjectType::Album, id, display_name( dir ) )
            .with_collection( self.collection.clone() );
        album.artist = artist;
        fixture.objects.push( album );
    }


    fn track_for( &self, path: &Path, folder_id: &str, depth: usize ) -> MediaObject {
        let title = path.file_stem()
            .map( |s| s.to_string_lossy().to_string() )
            .unwrap_or_default();
        let mut track = MediaObject::new( ObjectType::Track, path.to_string_lossy().to_string(), title )
            .with_collection( self.collection.clone() )
            .with_parent( folder_id );

        // Artist/Album/Track: depth 2 puts the track inside an album directory.
        if depth >= 1 {
            let album_dir = path.parent();
            let artist_dir = album_dir.and_then( |d| if depth >= 2 { d.parent() } else { Some( d ) } );
            if let Some( artist_dir ) = artist_dir {
                track.artist = Some( slug( &display_name( artist_dir ) ) );
            }
            if depth >= 2 {
                if let ( Some( album_dir ), Some( artist ) ) = ( album_dir, track.artist.clone() ) {
                    track.album = Some( format!( "{}/{}", artist, slug( &display_name( album_dir ) ) ) );
                }
            }
        }
        track
    }


    /// Checks if a file has a supported audio extension.
    fn is_audio_file( path: &Path ) -> bool {
        path.extension()
            .and_then( |e| e.to_str() )
            .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
            .unwrap_or( false )
    }
}


fn display_name( path: &Path ) -> String {
    path.file_name()
        .map( |n| n.to_string_lossy().to_string() )
        .unwrap_or_else( || path.to_string_lossy().to_string() )
}


fn slug( name: &str ) -> String {
    name.trim().to_lowercase().replace( char::is_whitespace, "-" )
}


#[cfg( test )]
pub( crate ) mod tests {
    use super::*;


    /// Small library used across the crate's tests.
    ///
    /// One collection `music` with two artists, three albums (one of them
    /// a series), genres, a year, two playlists (one nested) and a folder.
    pub fn sample_library() -> MemoryLibrary {
        let mut objects = vec![
            MediaObject::new( ObjectType::Collection, "music", "Music" ),
            MediaObject::new( ObjectType::Artist, "miles", "Miles Davis" ).with_collection( "music" ),
            MediaObject::new( ObjectType::Artist, "nina", "Nina Simone" ).with_collection( "music" ),
            MediaObject::new( ObjectType::Album, "kob", "Kind of Blue" )
                .with_collection( "music" ).with_artist( "miles" ).with_year( 1959 ),
            MediaObject::new( ObjectType::Album, "pastel", "Pastel Blues" )
                .with_collection( "music" ).with_artist( "nina" ).with_year( 1965 ),
            MediaObject::new( ObjectType::Genre, "jazz", "Jazz" ).with_collection( "music" ),
            MediaObject::new( ObjectType::Genre, "blues", "Blues" ).with_collection( "music" ),
            MediaObject::new( ObjectType::Year, "1959", "1959" ).with_collection( "music" ).with_year( 1959 ),
            MediaObject::new( ObjectType::Playlist, "favs", "Favourites" ),
            MediaObject::new( ObjectType::Playlist, "late", "Late Night" ).with_parent( "favs" ),
            MediaObject::new( ObjectType::Folder, "/music", "music" ),
            MediaObject::new( ObjectType::Device, "phone", "Phone" ),
        ];
        let mut series = MediaObject::new( ObjectType::Album, "talks", "Jazz Talks" ).with_collection( "music" );
        series.series = true;
        objects.push( series );

        let tracks = [
            ( "t1", "So What", "kob", "miles", "jazz", 1959 ),
            ( "t2", "Freddie Freeloader", "kob", "miles", "jazz", 1959 ),
            ( "t3", "Blue in Green", "kob", "miles", "jazz", 1959 ),
            ( "t4", "Be My Husband", "pastel", "nina", "blues", 1965 ),
            ( "t5", "Sinnerman", "pastel", "nina", "jazz", 1965 ),
        ];
        for ( id, title, album, artist, genre, year ) in tracks {
            objects.push(
                MediaObject::new( ObjectType::Track, id, title )
                    .with_collection( "music" )
                    .with_album( album )
                    .with_artist( artist )
                    .with_genre( genre )
                    .with_year( year )
                    .with_parent( "/music" ),
            );
        }

        let mut online = MediaObject::new( ObjectType::Album, "mb-1", "Sketches of Spain" )
            .with_collection( "music" )
            .with_artist( "Miles Davis" );
        online.local = false;
        online.online_id = Some( "mb-1".into() );

        let mut playlist_items = HashMap::new();
        playlist_items.insert( "favs".to_string(), vec![ "t1".to_string(), "t5".to_string() ] );

        MemoryLibrary::from_fixture( LibraryFixture { objects, online: vec![ online ], playlist_items } )
    }


    #[tokio::test]
    async fn test_collection_queries() {
        let lib = sample_library();
        let albums = lib.query( Query::Albums { collection: "music".into() } ).await.unwrap();
        let series = lib.query( Query::Series { collection: "music".into() } ).await.unwrap();

        assert_eq!( albums.len(), 2 );
        assert_eq!( series.len(), 1 );
        assert_eq!( series[ 0 ].persistent_info, "talks" );
        assert_eq!( lib.query_count(), 2 );
    }


    #[tokio::test]
    async fn test_scoped_queries() {
        let lib = sample_library();
        let genre = lib.get_object( ObjectType::Genre, "jazz" ).await.unwrap().unwrap();

        let tracks = lib.query( Query::Tracks { scope: genre.clone() } ).await.unwrap();
        let albums = lib.query( Query::AlbumsOf { scope: genre.clone() } ).await.unwrap();
        let artists = lib.query( Query::ArtistsOf { scope: genre } ).await.unwrap();

        assert_eq!( tracks.len(), 4 );
        assert_eq!( albums.len(), 2 );
        assert_eq!( artists.len(), 2 );
    }


    #[tokio::test]
    async fn test_playlist_tracks_and_parents() {
        let lib = sample_library();
        let late = lib.get_object( ObjectType::Playlist, "late" ).await.unwrap().unwrap();
        let favs = lib.get_object( ObjectType::Playlist, "favs" ).await.unwrap().unwrap();

        let parents = lib.parents_of( &late ).await.unwrap();
        assert_eq!( parents.len(), 1 );
        assert_eq!( parents[ 0 ].persistent_info, "favs" );

        let tracks = lib.query( Query::Tracks { scope: favs } ).await.unwrap();
        let ids: Vec<_> = tracks.iter().map( |t| t.persistent_info.as_str() ).collect();
        assert_eq!( ids, vec![ "t1", "t5" ] );
    }


    #[tokio::test]
    async fn test_mutations_emit_events() {
        let lib = sample_library();
        let mut rx = lib.subscribe();
        let favs = lib.get_object( ObjectType::Playlist, "favs" ).await.unwrap().unwrap();
        let track = lib.get_object( ObjectType::Track, "t2" ).await.unwrap().unwrap();

        lib.add_to_playlist( &favs, &[ track ] ).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!( event.kind, ChangeKind::Changed );
        assert!( event.concerns( &favs ) );

        lib.delete_object( &favs ).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!( event.kind, ChangeKind::Removed );
        assert!( lib.get_object( ObjectType::Playlist, "favs" ).await.unwrap().is_none() );
    }


    #[tokio::test]
    async fn test_online_search() {
        let lib = sample_library();
        let found = lib.search_online( OnlineAlbumQuery {
            title: "sketches of spain".into(),
            artist: Some( "Miles Davis".into() ),
        } ).await.unwrap();

        assert!( found.is_some() );
        assert!( !found.unwrap().local );
        assert_eq!( lib.online_count(), 1 );
    }


    #[tokio::test]
    async fn test_get_tracklist_fills_async() {
        let lib: std::sync::Arc<dyn MediaLibrary> = std::sync::Arc::new( sample_library() );
        let album = lib.get_object( ObjectType::Album, "kob" ).await.unwrap().unwrap();

        let list = get_tracklist( lib, album, CancellationToken::new() );
        list.when_loaded().await;
        assert_eq!( list.len(), 3 );
    }


    #[test]
    fn test_scanner_builds_artist_album_layout() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join( "Miles Davis" ).join( "Kind of Blue" );
        std::fs::create_dir_all( &album ).unwrap();
        std::fs::write( album.join( "01 So What.flac" ), b"" ).unwrap();
        std::fs::write( album.join( "cover.jpg" ), b"" ).unwrap();

        let mut scanner = LibraryScanner::new( "music" );
        scanner.add_root( dir.path().to_path_buf() );
        let fixture = scanner.scan().unwrap();

        let tracks: Vec<_> = fixture.objects.iter().filter( |o| o.object_type == ObjectType::Track ).collect();
        assert_eq!( tracks.len(), 1 );
        assert_eq!( tracks[ 0 ].artist.as_deref(), Some( "miles-davis" ) );
        assert_eq!( tracks[ 0 ].album.as_deref(), Some( "miles-davis/kind-of-blue" ) );
        assert!( fixture.objects.iter().any( |o| o.object_type == ObjectType::Album && o.title == "Kind of Blue" ) );
        assert_eq!( fixture.objects.iter().filter( |o| o.object_type == ObjectType::Folder ).count(), 3 );
    }
}
