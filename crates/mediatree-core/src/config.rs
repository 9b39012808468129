//! Engine timing and context configuration.

use std::time::Duration;

use serde::{ Deserialize, Serialize };


/// Tunables shared by the node engine, view host and navigation.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct EngineConfig {
    /// Quiet period before a deferred refresh fires, in milliseconds.
    pub refresh_timeout_ms: u64,

    /// Quiet period for sources that change in bursts (playlists, folders).
    pub high_churn_timeout_ms: u64,

    /// Online lookups shorter than this never show a progress indicator.
    pub progress_delay_ms: u64,

    /// Touch mode keeps its own persisted layout state.
    pub touch_mode: bool,
}


impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_timeout_ms: 500,
            high_churn_timeout_ms: 1500,
            progress_delay_ms: 250,
            touch_mode: false,
        }
    }
}


impl EngineConfig {
    pub fn refresh_timeout( &self ) -> Duration {
        Duration::from_millis( self.refresh_timeout_ms )
    }


    pub fn high_churn_timeout( &self ) -> Duration {
        Duration::from_millis( self.high_churn_timeout_ms )
    }


    pub fn progress_delay( &self ) -> Duration {
        Duration::from_millis( self.progress_delay_ms )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str( r#"{"touch_mode":true}"# ).unwrap();
        assert!( config.touch_mode );
        assert_eq!( config.refresh_timeout(), Duration::from_millis( 500 ) );
        assert_eq!( config.high_churn_timeout(), Duration::from_millis( 1500 ) );
    }
}
