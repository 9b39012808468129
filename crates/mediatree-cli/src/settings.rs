//! Application settings management
//!
//! Persists the engine tunables, where the library comes from, and the last
//! node the user looked at.

use std::fs;
use std::path::PathBuf;

use mediatree_core::{ EngineConfig, StoredNode };
use serde::{ Deserialize, Serialize };


/// Application settings.
#[derive( Debug, Clone, Default, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Timing and touch-mode configuration for the engine.
    pub engine: EngineConfig,

    /// Library fixture file or music directory.
    pub library: Option<PathBuf>,

    /// State store file; the platform data directory when unset.
    pub state_file: Option<PathBuf>,

    /// Node path shown when the app last quit.
    pub last_path: Vec<StoredNode>,
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "mediatree" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::from_json( &contents ),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    fn from_json( contents: &str ) -> Self {
        serde_json::from_str( contents ).unwrap_or_else( |e| {
            tracing::warn!( "Ignoring malformed settings: {}", e );
            Self::default()
        } )
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return,
        };

        if let Some( parent ) = path.parent() {
            if let Err( e ) = fs::create_dir_all( parent ) {
                tracing::warn!( "Failed to create settings directory: {}", e );
                return;
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( &path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_partial_settings_keep_defaults() {
        let settings = Settings::from_json( r#"{ "engine": { "touch_mode": true } }"# );
        assert!( settings.engine.touch_mode );
        assert_eq!( settings.engine.refresh_timeout_ms, 500 );
        assert!( settings.last_path.is_empty() );
    }


    #[test]
    fn test_malformed_settings_fall_back() {
        let settings = Settings::from_json( "not json" );
        assert!( settings.library.is_none() );
    }
}
