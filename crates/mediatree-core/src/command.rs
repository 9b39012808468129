//! Slash command parsing.
//!
//! Commands are typed into the front end's command line and act on the
//! selected node or the active view. Parsing lives here so every host shares
//! the same grammar; executing them is up to the host.

use thiserror::Error;

use crate::column_browser::ColumnField;
use crate::nav::NavKind;
use crate::view_handler::ViewKind;


/// Errors that can occur during command parsing or execution.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),

    #[error( "Execution failed: {0}" )]
    ExecutionFailed( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Tree commands
    Expand,
    Collapse,
    Refresh,
    Delete,
    Menu { index: Option<usize> },

    // View commands
    View { kind: ViewKind },
    Toggle { sub_view: ViewKind },
    Filter { field: ColumnField, value: String },
    ClearFilter,

    // Navigation
    Goto { kind: NavKind, id: String },

    Help,
    Quit,
}


impl Command {
    /// Parses a command string (without the leading slash).
    ///
    /// @param input - The command text, e.g. "goto album kind-of-blue"
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let input = input.strip_prefix( '/' ).unwrap_or( input );
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            "expand" | "e" => Ok( Command::Expand ),
            "collapse" | "c" => Ok( Command::Collapse ),
            "refresh" | "r" => Ok( Command::Refresh ),
            "delete" | "del" | "rm" => Ok( Command::Delete ),
            "menu" | "m" => {
                let index = match args {
                    Some( n ) => Some( n.parse().map_err( |_| CommandError::InvalidArgument( format!( "Invalid menu item: {}", n ) ) )? ),
                    None => None,
                };
                Ok( Command::Menu { index } )
            }

            "view" | "v" => {
                let name = args.ok_or_else( || CommandError::MissingArgument( "view kind".into() ) )?;
                let kind: ViewKind = name.parse().map_err( CommandError::InvalidArgument )?;
                if kind.is_sub_view() || kind == ViewKind::Base {
                    return Err( CommandError::InvalidArgument( format!( "{} is not a primary view", kind ) ) );
                }
                Ok( Command::View { kind } )
            }
            "toggle" | "t" => {
                let name = args.ok_or_else( || CommandError::MissingArgument( "sub-view".into() ) )?;
                let sub_view: ViewKind = name.parse().map_err( CommandError::InvalidArgument )?;
                if !sub_view.is_sub_view() {
                    return Err( CommandError::InvalidArgument( format!( "{} is not a sub-view", sub_view ) ) );
                }
                Ok( Command::Toggle { sub_view } )
            }
            "filter" | "f" => {
                let args = args.ok_or_else( || CommandError::MissingArgument( "column".into() ) )?;
                let ( column, value ) = match args.split_once( ' ' ) {
                    Some(( column, value )) => ( column, value.trim() ),
                    None => return Err( CommandError::MissingArgument( "filter value".into() ) ),
                };
                let field: ColumnField = column.parse().map_err( CommandError::InvalidArgument )?;
                Ok( Command::Filter { field, value: value.to_string() } )
            }
            "clearfilter" | "cf" => Ok( Command::ClearFilter ),

            "goto" | "g" => {
                let args = args.ok_or_else( || CommandError::MissingArgument( "object type".into() ) )?;
                let ( kind, id ) = match args.split_once( ' ' ) {
                    Some(( kind, id )) => ( kind, id.trim() ),
                    None => return Err( CommandError::MissingArgument( "object id".into() ) ),
                };
                let kind: NavKind = kind.parse().map_err( CommandError::InvalidArgument )?;
                Ok( Command::Goto { kind, id: id.to_string() } )
            }

            "help" | "h" | "?" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Expand => "Expand selected node",
            Command::Collapse => "Collapse selected node",
            Command::Refresh => "Reload children of selected node",
            Command::Delete => "Delete selected node",
            Command::Menu { .. } => "Show or run context menu",
            Command::View { .. } => "Switch the active view",
            Command::Toggle { .. } => "Show or hide a sub-view",
            Command::Filter { .. } => "Filter by column value",
            Command::ClearFilter => "Remove column filters",
            Command::Goto { .. } => "Navigate to object",
            Command::Help => "Show help",
            Command::Quit => "Quit application",
        }
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Tree Commands:
  /expand              Expand selected node        [Right]
  /collapse            Collapse selected node      [Left]
  /refresh             Reload children             [r]
  /delete              Delete selected node
  /menu [n]            List or run menu item n     [m]

View Commands:
  /view <kind>         tracklist, album_grid, artist_view, ...
  /toggle <subview>    status_bar, column_browser, info_header
  /filter <col> <val>  Filter by genre/artist/album/year
  /clearfilter         Remove all filters

Navigation:
  /goto <type> <id>    track, album, artist, genre,
                       playlist, folder, collection

Other Commands:
  /help                Show this help              [?]
  /quit                Exit mediatree              [q]"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_goto() {
        let cmd = Command::parse( "goto album kob" ).unwrap();
        assert_eq!( cmd, Command::Goto { kind: NavKind::Album, id: "kob".into() } );
    }


    #[test]
    fn test_parse_goto_alias_with_slash() {
        let cmd = Command::parse( "/g playlist  favs" ).unwrap();
        assert_eq!( cmd, Command::Goto { kind: NavKind::Playlist, id: "favs".into() } );
    }


    #[test]
    fn test_parse_view() {
        let cmd = Command::parse( "view album-grid" ).unwrap();
        assert_eq!( cmd, Command::View { kind: ViewKind::AlbumGrid } );
    }


    #[test]
    fn test_parse_view_rejects_sub_view() {
        let result = Command::parse( "view status_bar" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_toggle() {
        let cmd = Command::parse( "toggle column browser" ).unwrap();
        assert_eq!( cmd, Command::Toggle { sub_view: ViewKind::ColumnBrowser } );
    }


    #[test]
    fn test_parse_filter_keeps_spaces_in_value() {
        let cmd = Command::parse( "filter album Kind of Blue" ).unwrap();
        assert_eq!( cmd, Command::Filter { field: ColumnField::Album, value: "Kind of Blue".into() } );
    }


    #[test]
    fn test_parse_menu() {
        assert_eq!( Command::parse( "menu" ).unwrap(), Command::Menu { index: None } );
        assert_eq!( Command::parse( "m 2" ).unwrap(), Command::Menu { index: Some( 2 ) } );
        assert!( matches!( Command::parse( "menu x" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        assert!( matches!( Command::parse( "goto" ), Err( CommandError::MissingArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "goto album" ), Err( CommandError::MissingArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "filter genre" ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_bad_goto_type() {
        let result = Command::parse( "goto year 1959" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }
}
