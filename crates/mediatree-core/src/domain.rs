//! Domain objects consumed by the tree.
//!
//! Tracks, albums, artists, playlists and the rest are plain records
//! identified by `(object_type, persistent_info)`. The engine never mutates
//! them; changes arrive as `LibraryEvent`s.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{ Deserialize, Serialize };


/// Kind of a domain object.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize )]
#[serde( rename_all = "lowercase" )]
pub enum ObjectType {
    Track,
    Album,
    Artist,
    Genre,
    Year,
    Playlist,
    Folder,
    Collection,
    Device,
}


impl ObjectType {
    /// Returns the lowercase name used in persisted descriptors.
    pub fn name( &self ) -> &'static str {
        match self {
            ObjectType::Track => "track",
            ObjectType::Album => "album",
            ObjectType::Artist => "artist",
            ObjectType::Genre => "genre",
            ObjectType::Year => "year",
            ObjectType::Playlist => "playlist",
            ObjectType::Folder => "folder",
            ObjectType::Collection => "collection",
            ObjectType::Device => "device",
        }
    }
}


impl fmt::Display for ObjectType {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.name() )
    }
}


impl FromStr for ObjectType {
    type Err = String;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok( ObjectType::Track ),
            "album" => Ok( ObjectType::Album ),
            "artist" => Ok( ObjectType::Artist ),
            "genre" => Ok( ObjectType::Genre ),
            "year" => Ok( ObjectType::Year ),
            "playlist" => Ok( ObjectType::Playlist ),
            "folder" => Ok( ObjectType::Folder ),
            "collection" => Ok( ObjectType::Collection ),
            "device" => Ok( ObjectType::Device ),
            other => Err( format!( "unknown object type '{}'", other ) ),
        }
    }
}


fn default_local() -> bool {
    true
}


/// A domain object: a track, album, playlist and so on.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
pub struct MediaObject {
    pub object_type: ObjectType,

    /// Stable key, unique per object type.
    pub persistent_info: String,

    pub title: String,

    /// Owning collection id, for tracks, albums, artists, genres and years.
    /// Tracks reference their album, artist and genre by persistent info.
    #[serde( default )]
    pub collection: Option<String>,

    #[serde( default )]
    pub artist: Option<String>,

    #[serde( default )]
    pub album: Option<String>,

    #[serde( default )]
    pub genre: Option<String>,

    #[serde( default )]
    pub year: Option<i32>,

    /// Parent playlist or folder id.
    #[serde( default )]
    pub parent: Option<String>,

    /// Online fingerprint (MusicBrainz release id).
    #[serde( default )]
    pub online_id: Option<String>,

    /// False for objects known only from an online lookup.
    #[serde( default = "default_local" )]
    pub local: bool,

    /// Albums that belong to a series (podcasts, audiobooks).
    #[serde( default )]
    pub series: bool,
}


/// Shared handle to a domain object.
pub type MediaRef = Arc<MediaObject>;


impl MediaObject {
    /// Creates a local object with only its identity and title set.
    pub fn new( object_type: ObjectType, persistent_info: impl Into<String>, title: impl Into<String> ) -> Self {
        Self {
            object_type,
            persistent_info: persistent_info.into(),
            title: title.into(),
            collection: None,
            artist: None,
            album: None,
            genre: None,
            year: None,
            parent: None,
            online_id: None,
            local: true,
            series: false,
        }
    }


    pub fn with_collection( mut self, collection: impl Into<String> ) -> Self {
        self.collection = Some( collection.into() );
        self
    }


    pub fn with_artist( mut self, artist: impl Into<String> ) -> Self {
        self.artist = Some( artist.into() );
        self
    }


    pub fn with_album( mut self, album: impl Into<String> ) -> Self {
        self.album = Some( album.into() );
        self
    }


    pub fn with_genre( mut self, genre: impl Into<String> ) -> Self {
        self.genre = Some( genre.into() );
        self
    }


    pub fn with_year( mut self, year: i32 ) -> Self {
        self.year = Some( year );
        self
    }


    pub fn with_parent( mut self, parent: impl Into<String> ) -> Self {
        self.parent = Some( parent.into() );
        self
    }


    /// Wraps the object in a shared handle.
    pub fn into_ref( self ) -> MediaRef {
        Arc::new( self )
    }


    /// Identity key used for node persistent ids: `type:info`.
    pub fn key( &self ) -> String {
        format!( "{}:{}", self.object_type, self.persistent_info )
    }


    /// Returns true if both values describe the same object.
    pub fn same_object( &self, other: &MediaObject ) -> bool {
        self.object_type == other.object_type && self.persistent_info == other.persistent_info
    }
}


/// Kind of change reported by the library.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ChangeKind {
    Changed,
    Added,
    Removed,
}


/// Change notification emitted by the library.
#[derive( Debug, Clone )]
pub struct LibraryEvent {
    pub kind: ChangeKind,
    pub object: MediaRef,
}


impl LibraryEvent {
    /// Returns true if the event concerns the given object itself.
    pub fn concerns( &self, object: &MediaObject ) -> bool {
        self.object.same_object( object )
    }


    /// Returns true if the event concerns any object of the given collection.
    pub fn in_collection( &self, collection: &str ) -> bool {
        self.object.collection.as_deref() == Some( collection )
    }
}


/// Queries the tree issues against the library.
#[derive( Debug, Clone, PartialEq )]
pub enum Query {
    Collections,
    Albums { collection: String },
    Artists { collection: String },
    Genres { collection: String },
    Years { collection: String },
    Series { collection: String },

    /// Tracks belonging to an object (collection, album, artist, genre,
    /// year, playlist, folder, device).
    Tracks { scope: MediaRef },

    /// Albums of an artist, genre or year.
    AlbumsOf { scope: MediaRef },

    /// Artists appearing in a scope (album, genre, playlist).
    ArtistsOf { scope: MediaRef },

    /// Child playlists; `None` lists the top level.
    Playlists { parent: Option<String> },

    /// Child folders; `None` lists the top level.
    Folders { parent: Option<String> },

    Devices,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_object_type_round_trip_names() {
        for t in [ ObjectType::Track, ObjectType::Album, ObjectType::Folder, ObjectType::Device ] {
            assert_eq!( t.name().parse::<ObjectType>(), Ok( t ) );
        }
        assert!( "widget".parse::<ObjectType>().is_err() );
    }


    #[test]
    fn test_key_and_identity() {
        let a = MediaObject::new( ObjectType::Album, "42", "Blue" );
        let b = MediaObject::new( ObjectType::Album, "42", "Blue (Remaster)" );
        let c = MediaObject::new( ObjectType::Artist, "42", "Blue" );

        assert_eq!( a.key(), "album:42" );
        assert!( a.same_object( &b ) );
        assert!( !a.same_object( &c ) );
    }


    #[test]
    fn test_deserialize_defaults_local() {
        let json = r#"{"object_type":"track","persistent_info":"t1","title":"Song"}"#;
        let obj: MediaObject = serde_json::from_str( json ).unwrap();
        assert!( obj.local );
        assert!( !obj.series );
        assert_eq!( obj.collection, None );
    }
}
