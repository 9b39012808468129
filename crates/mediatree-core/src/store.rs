//! Persisted UI state.
//!
//! A process-wide key/value store holding tree item order, node handler
//! state and view handler sub-view visibility. Keys are namespaced by
//! collection id and touch mode so the contexts never collide.

use std::fs;
use std::path::{ Path, PathBuf };

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use thiserror::Error;

use crate::node_handler::NodeKind;
use crate::view_handler::ViewKind;


/// Errors raised when reading or writing the state file.
#[derive( Debug, Error )]
pub enum StoreError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid state file: {0}" )]
    Format( #[from] serde_json::Error ),
}


/// Key/value store backed by an optional JSON file.
#[derive( Debug, Default )]
pub struct StateStore {
    values: Mutex<Map<String, Value>>,
    path: Option<PathBuf>,
}


impl StateStore {
    /// Creates a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }


    /// Opens a store bound to a file, starting empty if it does not exist.
    pub fn open( path: PathBuf ) -> Result<Self, StoreError> {
        let values = if path.exists() {
            let contents = fs::read_to_string( &path )?;
            match serde_json::from_str::<Map<String, Value>>( &contents ) {
                Ok( values ) => values,
                Err( e ) => {
                    tracing::warn!( "Ignoring unreadable state file {:?}: {}", path, e );
                    Map::new()
                }
            }
        } else {
            Map::new()
        };
        Ok( Self { values: Mutex::new( values ), path: Some( path ) } )
    }


    /// Default location of the state file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map( |d| d.join( "mediatree" ).join( "state.json" ) )
    }


    /// Reads a value, falling back to `default` when missing or malformed.
    pub fn get_value<T: DeserializeOwned>( &self, key: &str, default: T ) -> T {
        let values = self.values.lock();
        match values.get( key ) {
            Some( value ) => match serde_json::from_value( value.clone() ) {
                Ok( v ) => v,
                Err( e ) => {
                    tracing::warn!( "Malformed state for '{}': {}", key, e );
                    default
                }
            },
            None => default,
        }
    }


    /// Writes a value. Serialization failures are logged and dropped.
    pub fn set_value<T: Serialize>( &self, key: &str, value: &T ) {
        match serde_json::to_value( value ) {
            Ok( v ) => {
                self.values.lock().insert( key.to_string(), v );
            }
            Err( e ) => tracing::warn!( "Failed to serialize state for '{}': {}", key, e ),
        }
    }


    pub fn contains( &self, key: &str ) -> bool {
        self.values.lock().contains_key( key )
    }


    pub fn remove( &self, key: &str ) {
        self.values.lock().remove( key );
    }


    /// Writes the store to its file, if it has one.
    pub fn save( &self ) -> Result<(), StoreError> {
        let Some( path ) = &self.path else {
            return Ok(());
        };
        if let Some( parent ) = path.parent() {
            fs::create_dir_all( parent )?;
        }
        let json = serde_json::to_string_pretty( &*self.values.lock() )?;
        fs::write( path, json )?;
        Ok(())
    }


    pub fn path( &self ) -> Option<&Path> {
        self.path.as_deref()
    }
}


/// Builders for namespaced store keys.
pub struct StateKey;


impl StateKey {
    fn touch_suffix( touch: bool ) -> &'static str {
        if touch { "_touch" } else { "" }
    }


    /// Ordered item list shown under a collection.
    pub fn media_tree_items( collection: &str, touch: bool ) -> String {
        format!( "mediaTreeItems_{}{}", collection, Self::touch_suffix( touch ) )
    }


    /// Per-collection state of a node handler.
    pub fn node_handler( kind: NodeKind, collection: Option<&str>, touch: bool ) -> String {
        format!(
            "nodeHandler_{}_{}{}",
            kind,
            collection.unwrap_or( "global" ),
            Self::touch_suffix( touch ),
        )
    }


    /// State of a view handler, or of the group sharing `state_key`.
    pub fn view_handler( state_key: &str, touch: bool ) -> String {
        format!( "viewHandler_{}{}", state_key, Self::touch_suffix( touch ) )
    }
}


/// One entry of a collection's item list.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
pub struct MediaTreeItem {
    pub kind: NodeKind,
    pub visible: bool,
}


/// Persisted state of a node handler.
#[derive( Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize )]
#[serde( default )]
pub struct NodeHandlerState {
    /// View handler last chosen for nodes of this kind.
    pub view_as: Option<ViewKind>,
}


/// Persisted state of a view handler.
#[derive( Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize )]
#[serde( default )]
pub struct ViewHandlerState {
    /// Sub-views the user has hidden. `None` means the handler defaults.
    pub hidden_sub_views: Option<Vec<ViewKind>>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_get_value_default_and_roundtrip() {
        let store = StateStore::in_memory();
        assert_eq!( store.get_value( "missing", 5u32 ), 5 );

        store.set_value( "count", &7u32 );
        assert_eq!( store.get_value( "count", 0u32 ), 7 );
    }


    #[test]
    fn test_malformed_value_falls_back() {
        let store = StateStore::in_memory();
        store.set_value( "flag", &"not a bool" );
        assert!( store.get_value( "flag", true ) );
    }


    #[test]
    fn test_keys_are_namespaced() {
        let plain = StateKey::node_handler( NodeKind::Album, Some( "music" ), false );
        let touch = StateKey::node_handler( NodeKind::Album, Some( "music" ), true );
        let other = StateKey::node_handler( NodeKind::Album, Some( "video" ), false );

        assert_eq!( plain, "nodeHandler_album_music" );
        assert_ne!( plain, touch );
        assert_ne!( plain, other );
        assert_eq!( StateKey::media_tree_items( "music", true ), "mediaTreeItems_music_touch" );
    }


    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "state.json" );

        let store = StateStore::open( path.clone() ).unwrap();
        store.set_value( "viewHandler_tracklist", &ViewHandlerState {
            hidden_sub_views: Some( vec![ ViewKind::ColumnBrowser ] ),
        } );
        store.save().unwrap();

        let reopened = StateStore::open( path ).unwrap();
        let state: ViewHandlerState = reopened.get_value( "viewHandler_tracklist", ViewHandlerState::default() );
        assert_eq!( state.hidden_sub_views, Some( vec![ ViewKind::ColumnBrowser ] ) );
    }


    #[test]
    fn test_open_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "state.json" );
        std::fs::write( &path, "{ not json" ).unwrap();

        let store = StateStore::open( path ).unwrap();
        assert!( !store.contains( "anything" ) );
    }
}
