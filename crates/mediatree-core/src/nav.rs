//! Navigation: resolving domain objects to their place in the node tree.
//!
//! Every navigation builds a path of stored node descriptors from the root
//! down to the object's canonical node and walks it with
//! `get_node_by_path`. Steps missing among a parent's loaded children are
//! restored from their descriptor as virtual children, so deep objects are
//! reachable without enumerating large branches.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{ MediaObject, MediaRef, ObjectType };
use crate::error::{ TreeError, TreeResult };
use crate::library::OnlineAlbumQuery;
use crate::node::{ DataSource, NodeId, StoredNode };
use crate::node_engine::NodeEngine;
use crate::node_handler::NodeKind;


/// Shows a progress indicator for slow lookups.
pub trait ProgressReporter: Send + Sync {
    fn show( &self, message: &str );
    fn hide( &self );
}


/// Reporter that shows nothing.
#[derive( Debug, Default )]
pub struct NoProgress;


impl ProgressReporter for NoProgress {
    fn show( &self, _message: &str ) {}
    fn hide( &self ) {}
}


/// Object kinds that can be navigated to.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum NavKind {
    Track,
    Album,
    Artist,
    Genre,
    Playlist,
    Folder,
    Collection,
}


impl NavKind {
    pub const ALL: [NavKind; 7] = [
        NavKind::Track,
        NavKind::Album,
        NavKind::Artist,
        NavKind::Genre,
        NavKind::Playlist,
        NavKind::Folder,
        NavKind::Collection,
    ];


    pub fn object_type( &self ) -> ObjectType {
        match self {
            NavKind::Track => ObjectType::Track,
            NavKind::Album => ObjectType::Album,
            NavKind::Artist => ObjectType::Artist,
            NavKind::Genre => ObjectType::Genre,
            NavKind::Playlist => ObjectType::Playlist,
            NavKind::Folder => ObjectType::Folder,
            NavKind::Collection => ObjectType::Collection,
        }
    }
}


impl fmt::Display for NavKind {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.object_type().name() )
    }
}


impl FromStr for NavKind {
    type Err = String;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        NavKind::ALL.iter()
            .copied()
            .find( |k| k.object_type().name() == wanted )
            .ok_or_else( || format!( "cannot navigate to '{}'", s ) )
    }
}


/// What to do when a path resolves only partially.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PartialPolicy {
    /// Fail with `TreeError::PathIncomplete`.
    #[default]
    Reject,

    /// Settle for the deepest node reached.
    AcceptDeepest,
}


/// Where a navigation ended.
#[derive( Debug, Clone, PartialEq )]
pub struct NavResult {
    pub node: NodeId,

    /// Item to select inside the node's view (the track for track
    /// navigation).
    pub focus: Option<MediaRef>,

    /// The node shows an object known only from the online catalog.
    pub online: bool,
}


#[derive( Debug, Clone, Copy, PartialEq, Eq )]
enum ProgressState {
    Pending,
    Shown,
    Done,
}


/// Path resolution over a node engine.
pub struct NavUtils {
    engine: NodeEngine,
    progress: Arc<dyn ProgressReporter>,
}


impl NavUtils {
    pub fn new( engine: NodeEngine, progress: Arc<dyn ProgressReporter> ) -> Self {
        Self { engine, progress }
    }


    pub fn engine( &self ) -> &NodeEngine {
        &self.engine
    }


    /// Walks `path` from the root, loading each level and restoring steps
    /// that are not among the loaded children.
    ///
    /// A leading root descriptor is optional. Configuration errors and
    /// cancellation are returned as they are; any other failure yields
    /// `TreeError::PathIncomplete` with the deepest node reached.
    pub async fn get_node_by_path( &self, path: &[StoredNode] ) -> TreeResult<NodeId> {
        let mut current = self.engine.root();
        let steps = match path.first() {
            Some( first ) if first.handler_id == NodeKind::Root.id() => &path[1..],
            _ => path,
        };

        for step in steps {
            match self.resolve_step( current, step ).await {
                Ok( next ) => current = next,
                Err( e ) if e.is_fatal() || e.is_canceled() => return Err( e ),
                Err( e ) => {
                    tracing::debug!( "Path stopped before {}: {}", step.persistent_id, e );
                    return Err( TreeError::PathIncomplete { deepest: current } );
                }
            }
        }
        Ok( current )
    }


    async fn resolve_step( &self, parent: NodeId, step: &StoredNode ) -> TreeResult<NodeId> {
        self.engine.load_children( parent ).await?;
        if let Some( found ) = self.engine.find_child( parent, &step.persistent_id ) {
            return Ok( found );
        }
        self.engine.restore_node( parent, step ).await
    }


    /// Resolves `path`, applying `policy` to partial matches.
    pub async fn navigate_node_path( &self, path: &[StoredNode], policy: PartialPolicy ) -> TreeResult<NodeId> {
        match self.get_node_by_path( path ).await {
            Err( TreeError::PathIncomplete { deepest } ) if policy == PartialPolicy::AcceptDeepest => {
                tracing::warn!( "Navigation settled for a partial path" );
                Ok( deepest )
            }
            other => other,
        }
    }


    /// Looks up an object by id and navigates to it.
    pub async fn navigate_to_id( &self, kind: NavKind, id: &str ) -> TreeResult<NavResult> {
        let object = self.engine.library()
            .get_object( kind.object_type(), id ).await?
            .ok_or_else( || TreeError::NotFound( format!( "{}:{}", kind, id ) ) )?;
        self.navigate( kind, &object, None ).await
    }


    /// Navigates to the canonical node of `object`.
    pub async fn navigate( &self, kind: NavKind, object: &MediaRef, collection: Option<MediaRef> ) -> TreeResult<NavResult> {
        tracing::info!( "Navigating to {} {}", kind, object.persistent_info );
        match kind {
            NavKind::Track => self.navigate_track( object, collection ).await,
            NavKind::Album => self.navigate_album( object, collection, None ).await,
            NavKind::Artist => self.navigate_in_collection( NodeKind::Artists, NodeKind::Artist, object, collection ).await,
            NavKind::Genre => self.navigate_in_collection( NodeKind::Genres, NodeKind::Genre, object, collection ).await,
            NavKind::Playlist => self.navigate_nested( NodeKind::Playlists, NodeKind::Playlist, object, None ).await,
            NavKind::Folder => self.navigate_nested( NodeKind::Folders, NodeKind::Folder, object, None ).await,
            NavKind::Collection => {
                let path = vec![
                    self.state( NodeKind::Root, None )?,
                    self.state( NodeKind::Collection, Some( object ) )?,
                ];
                self.go( &path, None, false ).await
            }
        }
    }


    async fn navigate_track( &self, track: &MediaRef, collection: Option<MediaRef> ) -> TreeResult<NavResult> {
        if track.album.is_some() {
            return self.navigate_album( track, collection, Some( track.clone() ) ).await;
        }
        let folder_id = track.parent.as_deref()
            .ok_or_else( || TreeError::NotFound( format!( "no album or folder for {}", track.key() ) ) )?;
        let folder = self.engine.library()
            .get_object( ObjectType::Folder, folder_id ).await?
            .ok_or_else( || TreeError::NotFound( format!( "folder:{}", folder_id ) ) )?;
        self.navigate_nested( NodeKind::Folders, NodeKind::Folder, &folder, Some( track.clone() ) ).await
    }


    async fn navigate_album(
        &self,
        object: &MediaRef,
        collection: Option<MediaRef>,
        focus: Option<MediaRef>,
    ) -> TreeResult<NavResult> {
        let collection = self.collection_of( object, collection ).await?;
        let mut album = match object.object_type {
            ObjectType::Track => self.album_of_track( object ).await?,
            ObjectType::Album => object.clone(),
            other => return Err( TreeError::Unsupported( format!( "album navigation from {}", other ) ) ),
        };

        let mut online = !album.local;
        if online && album.online_id.is_none() {
            album = self.lookup_online( &album ).await?;
            online = true;
        }

        let ( branch, kind ) = if album.series {
            ( NodeKind::AllSeries, NodeKind::Series )
        } else {
            ( NodeKind::Albums, NodeKind::Album )
        };
        let path = vec![
            self.state( NodeKind::Root, None )?,
            self.state( NodeKind::Collection, Some( &collection ) )?,
            self.state( branch, Some( &collection ) )?,
            self.state( kind, Some( &album ) )?,
        ];
        self.go( &path, focus, online ).await
    }


    /// The track's album, or a placeholder when the library does not know it.
    async fn album_of_track( &self, track: &MediaObject ) -> TreeResult<MediaRef> {
        let library = self.engine.library();
        let album_id = track.album.as_deref()
            .ok_or_else( || TreeError::NotFound( format!( "album of {}", track.key() ) ) )?;
        if let Some( album ) = library.get_object( ObjectType::Album, album_id ).await? {
            return Ok( album );
        }

        let artist = match track.artist.as_deref() {
            Some( id ) => library.get_object( ObjectType::Artist, id ).await?.map( |a| a.title.clone() ),
            None => None,
        };
        let mut album = MediaObject::new( ObjectType::Album, album_id, album_id );
        album.local = false;
        album.artist = artist;
        album.collection = track.collection.clone();
        tracing::debug!( "Album {} of {} is not in the library", album_id, track.key() );
        Ok( album.into_ref() )
    }


    /// Searches the online catalog, showing progress if the lookup is slow.
    async fn lookup_online( &self, album: &MediaObject ) -> TreeResult<MediaRef> {
        let query = OnlineAlbumQuery { title: album.title.clone(), artist: album.artist.clone() };
        let state = Arc::new( Mutex::new( ProgressState::Pending ) );

        let timer = {
            let state = state.clone();
            let progress = self.progress.clone();
            let delay = self.engine.config().progress_delay();
            let message = format!( "Looking up {} online", album.title );
            tokio::spawn( async move {
                tokio::time::sleep( delay ).await;
                let mut state = state.lock();
                if *state == ProgressState::Pending {
                    progress.show( &message );
                    *state = ProgressState::Shown;
                }
            } )
        };

        let result = self.engine.library().search_online( query ).await;
        timer.abort();
        let shown = {
            let mut state = state.lock();
            let shown = *state == ProgressState::Shown;
            *state = ProgressState::Done;
            shown
        };
        if shown {
            self.progress.hide();
        }

        match result? {
            Some( found ) => {
                tracing::info!( "Found {} online", found.title );
                Ok( found )
            }
            None => Err( TreeError::NotFound( format!( "album '{}' online", album.title ) ) ),
        }
    }


    async fn navigate_in_collection(
        &self,
        branch: NodeKind,
        kind: NodeKind,
        object: &MediaRef,
        collection: Option<MediaRef>,
    ) -> TreeResult<NavResult> {
        let collection = self.collection_of( object, collection ).await?;
        let path = vec![
            self.state( NodeKind::Root, None )?,
            self.state( NodeKind::Collection, Some( &collection ) )?,
            self.state( branch, Some( &collection ) )?,
            self.state( kind, Some( object ) )?,
        ];
        self.go( &path, None, false ).await
    }


    /// Playlists and folders: the branch, then every parent, then the object.
    async fn navigate_nested(
        &self,
        branch: NodeKind,
        kind: NodeKind,
        object: &MediaRef,
        focus: Option<MediaRef>,
    ) -> TreeResult<NavResult> {
        let parents = self.engine.library().parents_of( object ).await?;
        let mut path = vec![
            self.state( NodeKind::Root, None )?,
            self.state( branch, None )?,
        ];
        for parent in parents.iter().chain( std::iter::once( object ) ) {
            path.push( self.state( kind, Some( parent ) )? );
        }
        self.go( &path, focus, false ).await
    }


    async fn collection_of( &self, object: &MediaObject, collection: Option<MediaRef> ) -> TreeResult<MediaRef> {
        if let Some( collection ) = collection {
            return Ok( collection );
        }
        let id = object.collection.as_deref()
            .ok_or_else( || TreeError::NotFound( format!( "collection of {}", object.key() ) ) )?;
        self.engine.library()
            .get_object( ObjectType::Collection, id ).await?
            .ok_or_else( || TreeError::NotFound( format!( "collection:{}", id ) ) )
    }


    fn state( &self, kind: NodeKind, object: Option<&MediaRef> ) -> TreeResult<StoredNode> {
        let data_source = object.map_or( DataSource::None, |o| DataSource::Object( o.clone() ) );
        self.engine.create_node_state( kind, data_source )
    }


    async fn go( &self, path: &[StoredNode], focus: Option<MediaRef>, online: bool ) -> TreeResult<NavResult> {
        let node = self.navigate_node_path( path, PartialPolicy::Reject ).await?;
        Ok( NavResult { node, focus, online } )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::library::tests::sample_library;
    use crate::library::{ MediaLibrary, MemoryLibrary };
    use crate::node::StoredDataSource;
    use crate::view::tests::{ node_at, test_engine };
    use std::time::Duration;


    #[derive( Default )]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }


    impl ProgressReporter for RecordingProgress {
        fn show( &self, message: &str ) {
            self.events.lock().push( format!( "show {}", message ) );
        }


        fn hide( &self ) {
            self.events.lock().push( "hide".into() );
        }
    }


    fn nav_with( lib: Arc<MemoryLibrary> ) -> ( NavUtils, Arc<RecordingProgress> ) {
        let progress = Arc::new( RecordingProgress::default() );
        ( NavUtils::new( test_engine( lib ), progress.clone() ), progress )
    }


    fn pid( nav: &NavUtils, id: NodeId ) -> String {
        nav.engine().info( id ).unwrap().persistent_id
    }


    async fn object( lib: &MemoryLibrary, t: ObjectType, id: &str ) -> MediaRef {
        lib.get_object( t, id ).await.unwrap().unwrap()
    }


    #[tokio::test]
    async fn test_album_resolves_to_canonical_path() {
        let lib = Arc::new( sample_library() );
        let ( nav, _ ) = nav_with( lib.clone() );
        let kob = object( &lib, ObjectType::Album, "kob" ).await;

        let result = nav.navigate( NavKind::Album, &kob, None ).await.unwrap();
        let path: Vec<String> = nav.engine().ancestors( result.node ).into_iter().map( |a| pid( &nav, a ) ).collect();
        assert_eq!( path, vec![ "root", "collection:music", "albums", "album:kob" ] );
        assert!( !result.online );
        assert!( !nav.engine().is_virtual( result.node ) );
    }


    #[tokio::test]
    async fn test_track_goes_to_album_with_focus() {
        let lib = Arc::new( sample_library() );
        let ( nav, _ ) = nav_with( lib.clone() );

        let result = nav.navigate_to_id( NavKind::Track, "t4" ).await.unwrap();
        assert_eq!( pid( &nav, result.node ), "album:pastel" );
        assert_eq!( result.focus.unwrap().persistent_info, "t4" );
    }


    #[tokio::test]
    async fn test_series_album_goes_under_series_branch() {
        let lib = Arc::new( sample_library() );
        let ( nav, _ ) = nav_with( lib );

        let result = nav.navigate_to_id( NavKind::Album, "talks" ).await.unwrap();
        let parent = nav.engine().parent( result.node ).unwrap();
        assert_eq!( pid( &nav, parent ), "all_series" );
        assert_eq!( nav.engine().info( result.node ).unwrap().kind, NodeKind::Series );
    }


    #[tokio::test]
    async fn test_nested_playlist_and_artist() {
        let lib = Arc::new( sample_library() );
        let ( nav, _ ) = nav_with( lib );

        let late = nav.navigate_to_id( NavKind::Playlist, "late" ).await.unwrap();
        let parent = nav.engine().parent( late.node ).unwrap();
        assert_eq!( pid( &nav, late.node ), "playlist:late" );
        assert_eq!( pid( &nav, parent ), "playlist:favs" );

        let nina = nav.navigate_to_id( NavKind::Artist, "nina" ).await.unwrap();
        assert_eq!( pid( &nav, nina.node ), "artist:nina" );

        let jazz = nav.navigate_to_id( NavKind::Genre, "jazz" ).await.unwrap();
        assert_eq!( pid( &nav, jazz.node ), "genre:jazz" );

        let err = nav.navigate_to_id( NavKind::Artist, "coltrane" ).await.unwrap_err();
        assert_eq!( err, TreeError::NotFound( "artist:coltrane".into() ) );
    }


    #[tokio::test]
    async fn test_track_without_album_goes_to_folder() {
        let lib = Arc::new( sample_library() );
        lib.insert( MediaObject::new( ObjectType::Track, "memo", "Voice memo" ).with_parent( "/music" ) );
        let ( nav, _ ) = nav_with( lib );

        let result = nav.navigate_to_id( NavKind::Track, "memo" ).await.unwrap();
        assert_eq!( pid( &nav, result.node ), "folder:/music" );
        assert_eq!( result.focus.unwrap().persistent_info, "memo" );
    }


    #[tokio::test( start_paused = true )]
    async fn test_slow_online_lookup_shows_and_hides_progress() {
        let lib = Arc::new( sample_library() );
        lib.insert(
            MediaObject::new( ObjectType::Track, "t7", "Saeta" )
                .with_collection( "music" )
                .with_album( "Sketches of Spain" )
                .with_artist( "miles" ),
        );
        lib.set_online_latency( Some( Duration::from_millis( 400 ) ) );
        let ( nav, progress ) = nav_with( lib.clone() );

        let result = nav.navigate_to_id( NavKind::Track, "t7" ).await.unwrap();
        assert!( result.online );
        assert_eq!( pid( &nav, result.node ), "album:mb-1" );
        assert!( nav.engine().is_virtual( result.node ) );
        assert_eq!( lib.online_count(), 1 );

        let events = progress.events.lock().clone();
        assert_eq!( events, vec![ "show Looking up Sketches of Spain online".to_string(), "hide".to_string() ] );
    }


    #[tokio::test( start_paused = true )]
    async fn test_fast_online_lookup_shows_nothing() {
        let lib = Arc::new( sample_library() );
        lib.insert(
            MediaObject::new( ObjectType::Track, "t7", "Saeta" )
                .with_collection( "music" )
                .with_album( "Sketches of Spain" )
                .with_artist( "miles" ),
        );
        lib.set_online_latency( Some( Duration::from_millis( 50 ) ) );
        let ( nav, progress ) = nav_with( lib );

        nav.navigate_to_id( NavKind::Track, "t7" ).await.unwrap();
        tokio::time::sleep( Duration::from_millis( 500 ) ).await;
        assert!( progress.events.lock().is_empty() );
    }


    #[tokio::test( start_paused = true )]
    async fn test_online_miss_rejects() {
        let lib = Arc::new( sample_library() );
        lib.insert(
            MediaObject::new( ObjectType::Track, "t8", "Untitled" )
                .with_collection( "music" )
                .with_album( "Lost Tapes" ),
        );
        lib.set_online_latency( Some( Duration::from_millis( 300 ) ) );
        let ( nav, progress ) = nav_with( lib );

        let err = nav.navigate_to_id( NavKind::Track, "t8" ).await.unwrap_err();
        assert!( matches!( err, TreeError::NotFound( _ ) ) );
        assert_eq!( progress.events.lock().last().map( String::as_str ), Some( "hide" ) );
    }


    #[tokio::test]
    async fn test_partial_path_reports_deepest_node() {
        let lib = Arc::new( sample_library() );
        let ( nav, _ ) = nav_with( lib );
        let albums = node_at( nav.engine(), &[ "collection:music", "albums" ] ).await;

        let mut path = nav.engine().store_path( albums ).unwrap();
        path.push( StoredNode {
            handler_id: "album".into(),
            persistent_id: "album:gone".into(),
            data_source: StoredDataSource::Object { object_type: ObjectType::Album, persistent_info: "gone".into() },
        } );

        let err = nav.navigate_node_path( &path, PartialPolicy::Reject ).await.unwrap_err();
        assert_eq!( err, TreeError::PathIncomplete { deepest: albums } );
        let settled = nav.navigate_node_path( &path, PartialPolicy::AcceptDeepest ).await.unwrap();
        assert_eq!( settled, albums );
    }


    #[tokio::test]
    async fn test_unknown_handler_in_path_is_fatal() {
        let lib = Arc::new( sample_library() );
        let ( nav, _ ) = nav_with( lib );
        let path = vec![ StoredNode {
            handler_id: "smart_playlist".into(),
            persistent_id: "smart".into(),
            data_source: StoredDataSource::Value( serde_json::Value::Null ),
        } ];

        let err = nav.navigate_node_path( &path, PartialPolicy::AcceptDeepest ).await.unwrap_err();
        assert!( err.is_fatal() );
    }


    #[tokio::test]
    async fn test_stored_path_round_trip() {
        let lib = Arc::new( sample_library() );
        let ( nav, _ ) = nav_with( lib.clone() );
        let late = node_at( nav.engine(), &[ "playlists", "playlist:favs", "playlist:late" ] ).await;
        let json = serde_json::to_string( &nav.engine().store_path( late ).unwrap() ).unwrap();

        let ( fresh, _ ) = nav_with( lib );
        let path: Vec<StoredNode> = serde_json::from_str( &json ).unwrap();
        let restored = fresh.get_node_by_path( &path ).await.unwrap();
        assert_eq!( pid( &fresh, restored ), "playlist:late" );
        assert_eq!( fresh.engine().info( restored ).unwrap().kind, NodeKind::Playlist );
    }
}
