//! Command-line argument parsing for mediatree.

use std::path::PathBuf;

use clap::Parser;


/// Mediatree - Browse a media library as a tree in the terminal.
#[derive( Parser, Debug )]
#[command( name = "mediatree" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Node path to open on startup, as persistent ids joined by '/'
    /// (e.g. "collection:music/albums").
    #[arg( short, long )]
    pub path: Option<String>,

    /// Library fixture (.json) or music directory to scan.
    #[arg( short, long )]
    pub library: Option<PathBuf>,

    /// Print the expanded tree to stdout and exit.
    #[arg( short, long )]
    pub dump: bool,

    /// Navigate to an object on startup, as "<type>:<id>" (e.g. "album:kob").
    #[arg( short, long )]
    pub navigate: Option<String>,

    /// Use the touch-mode layout state.
    #[arg( short, long )]
    pub touch: bool,
}


impl Args {
    /// Splits `--navigate` into its object type and id.
    pub fn navigate_target( &self ) -> Option<( &str, &str )> {
        self.navigate.as_deref().and_then( |s| s.split_once( ':' ) )
    }


    /// Persistent ids of `--path`.
    pub fn path_ids( &self ) -> Vec<&str> {
        self.path.as_deref()
            .map( |p| p.split( '/' ).filter( |s| !s.is_empty() ).collect() )
            .unwrap_or_default()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_args_navigate_and_path() {
        let args = Args::parse_from( [ "mediatree", "--navigate", "album:kob", "--path", "/collection:music/albums/" ] );
        assert_eq!( args.navigate_target(), Some(( "album", "kob" )) );
        assert_eq!( args.path_ids(), vec![ "collection:music", "albums" ] );
        assert!( !args.dump );
    }
}
