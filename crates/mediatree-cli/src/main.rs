//! Mediatree CLI - Terminal browser for a media library tree

mod cli;
mod input;
mod settings;
mod tree;
mod view;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{ Duration, Instant };

use anyhow::{ Context, Result };
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use parking_lot::Mutex;
use ratatui::{
    prelude::*,
    widgets::{ Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap },
};
use tracing_subscriber::EnvFilter;

use cli::Args;
use input::{ InputBuffer, InputMode };
use settings::Settings;
use tree::TreePane;
use view::Pane;

use mediatree_core::{
    command,
    library::LibraryScanner,
    nav::{ NavResult, PartialPolicy },
    node_engine::MenuOutcome,
    node_handler::{ MenuAction, MenuItem },
    view_handler::{ Activation, ControlEvent, ControlSource },
    Command, MediaRef, MemoryLibrary, NavKind, NavUtils, NodeEngine, NodeHandlerRegistry, NodeId,
    ProgressReporter, StateStore, TreeError, ViewHandlerRegistry, ViewHost, ViewKind,
};


/// Levels of the tree expanded by `--dump`.
const DUMP_DEPTH: usize = 3;

/// How long a double click waits for its view handler.
const ACTIVATION_WAIT: Duration = Duration::from_millis( 200 );


/// Progress message shown in the status line during online lookups.
#[derive( Debug, Default )]
struct StatusProgress {
    message: Mutex<Option<String>>,
}


impl StatusProgress {
    fn message( &self ) -> Option<String> {
        self.message.lock().clone()
    }
}


impl ProgressReporter for StatusProgress {
    fn show( &self, message: &str ) {
        *self.message.lock() = Some( message.to_string() );
    }


    fn hide( &self ) {
        *self.message.lock() = None;
    }
}


/// Application state.
struct App {
    engine: NodeEngine,
    host: ViewHost,
    nav: NavUtils,
    progress: Arc<StatusProgress>,
    settings: Settings,
    should_quit: bool,

    // Panes
    pane: Pane,
    tree: TreePane,
    view_selected: usize,
    menu: Vec<MenuItem>,
    menu_selected: usize,
    help_scroll: u16,

    // Input state
    input_mode: InputMode,
    input_buffer: InputBuffer,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,

    /// Configuration errors block the UI until acknowledged.
    alert: Option<String>,
}


impl App {
    /// Builds the engine over the configured library and state store.
    fn new( args: &Args, mut settings: Settings ) -> Result<Self> {
        if let Some( library ) = &args.library {
            settings.library = Some( library.clone() );
        }
        let mut config = settings.engine.clone();
        if args.touch {
            config.touch_mode = true;
        }

        let library = open_library( settings.library.as_deref() )?;
        let store = match settings.state_file.clone().or_else( StateStore::default_path ) {
            Some( path ) => StateStore::open( path ).context( "opening state store" )?,
            None => StateStore::in_memory(),
        };

        let engine = NodeEngine::new(
            Arc::new( NodeHandlerRegistry::with_defaults()? ),
            Arc::new( library ),
            Arc::new( store ),
            config,
        )?;
        let host = ViewHost::new( engine.clone(), Arc::new( ViewHandlerRegistry::with_defaults()? ) );
        let progress = Arc::new( StatusProgress::default() );
        let nav = NavUtils::new( engine.clone(), progress.clone() );

        Ok( Self {
            engine,
            host,
            nav,
            progress,
            settings,
            should_quit: false,
            pane: Pane::Tree,
            tree: TreePane::new(),
            view_selected: 0,
            menu: Vec::new(),
            menu_selected: 0,
            help_scroll: 0,
            input_mode: InputMode::Normal,
            input_buffer: InputBuffer::new(),
            status_message: None,
            status_clear_at: None,
            alert: None,
        } )
    }


    /// Opens the startup node: `--navigate`, then `--path`, then the last
    /// path from the settings.
    async fn open_initial( &mut self, args: &Args ) {
        if let Err( e ) = self.engine.expand( self.engine.root() ).await {
            self.report( e );
        }

        let target = if let Some(( kind, id )) = args.navigate_target() {
            match kind.parse::<NavKind>() {
                Ok( kind ) => self.nav.navigate_to_id( kind, id ).await.map( |r| r.node ),
                Err( e ) => {
                    self.set_status( e );
                    Ok( self.engine.root() )
                }
            }
        } else if args.path.is_some() {
            self.open_path( &args.path_ids() ).await
        } else if !self.settings.last_path.is_empty() {
            let path = self.settings.last_path.clone();
            self.nav.navigate_node_path( &path, PartialPolicy::AcceptDeepest ).await
        } else {
            Ok( self.engine.root() )
        };

        match target {
            Ok( id ) => self.show_node( id ).await,
            Err( e ) => self.report( e ),
        }
    }


    async fn open_path( &self, ids: &[&str] ) -> Result<NodeId, TreeError> {
        let mut id = self.engine.root();
        for pid in ids {
            self.engine.load_children( id ).await?;
            id = self.engine.find_child( id, pid ).ok_or_else( || TreeError::NotFound( pid.to_string() ) )?;
        }
        Ok( id )
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + Duration::from_secs( 3 ) );
    }


    /// Routes an engine error: cancellation is silent, configuration errors
    /// raise the alert, the rest go to the status line.
    fn report( &mut self, e: TreeError ) {
        if e.is_canceled() {
            tracing::debug!( "Operation canceled: {}", e );
        } else if e.is_fatal() {
            tracing::error!( "Configuration error: {}", e );
            self.alert = Some( e.to_string() );
        } else {
            tracing::warn!( "{}", e );
            self.set_status( format!( "Error: {}", e ) );
        }
    }


    /// Clears expired messages and picks up tree changes made by
    /// background refreshes.
    fn tick( &mut self ) {
        if self.status_clear_at.is_some_and( |t| Instant::now() >= t ) {
            self.status_message = None;
            self.status_clear_at = None;
        }
        self.tree.rebuild( &self.engine );

        let gone = self.host.current_node().is_some_and( |id| !self.engine.contains( id ) );
        if gone {
            self.host.hide();
        }
    }


    /// Expands every ancestor of `id` so it is visible, then selects it.
    fn reveal( &mut self, id: NodeId ) {
        let ancestors = self.engine.ancestors( id );
        for a in ancestors.iter().take( ancestors.len().saturating_sub( 1 ) ) {
            if self.engine.expand_lock( *a ) == 0 {
                if let Err( e ) = self.engine.on_expanded( *a ) {
                    self.report( e );
                    return;
                }
            }
        }
        self.tree.rebuild( &self.engine );
        self.tree.select_node( id );
    }


    async fn show_node( &mut self, id: NodeId ) {
        self.reveal( id );
        match self.host.show_node( id ).await {
            Ok( _ ) => {
                self.view_selected = 0;
                match self.engine.store_path( id ) {
                    Ok( path ) => self.settings.last_path = path,
                    Err( e ) => tracing::warn!( "Could not store node path: {}", e ),
                }
            }
            Err( e ) => self.report( e ),
        }
    }


    async fn show_nav_result( &mut self, result: NavResult ) {
        self.show_node( result.node ).await;
        if let Some( focus ) = result.focus {
            let index = self.active_list()
                .and_then( |l| l.locked( |items| items.iter().position( |o| o.same_object( &focus ) ) ) );
            if let Some( index ) = index {
                self.view_selected = index;
                self.pane = Pane::View;
            }
        }
        if result.online {
            self.set_status( "Showing album from online catalog" );
        }
    }


    fn active_list( &self ) -> Option<mediatree_core::MediaList> {
        self.host.active().and_then( |a| a.main.list() )
    }


    /// Handles a key event.
    async fn handle_key( &mut self, code: KeyCode ) {
        if self.alert.is_some() {
            self.alert = None;
            return;
        }
        match self.input_mode {
            InputMode::Normal => self.handle_normal_key( code ).await,
            InputMode::Command => self.handle_command_key( code ).await,
        }
    }


    async fn handle_normal_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Char( '/' ) => {
                self.input_mode = InputMode::Command;
                self.input_buffer.clear();
                return;
            }
            KeyCode::Tab => {
                self.pane = self.pane.next_tab();
                return;
            }
            KeyCode::Char( '?' ) => {
                self.pane = if self.pane == Pane::Help { Pane::Tree } else { Pane::Help };
                return;
            }
            KeyCode::Esc if self.pane.is_overlay() => {
                self.pane = Pane::Tree;
                return;
            }
            KeyCode::Char( 'q' ) if !self.pane.is_overlay() => {
                self.should_quit = true;
                return;
            }
            _ => {}
        }

        match self.pane {
            Pane::Tree => self.handle_tree_key( code ).await,
            Pane::View => self.handle_view_key( code ).await,
            Pane::Help => match code {
                KeyCode::Up => self.help_scroll = self.help_scroll.saturating_sub( 1 ),
                KeyCode::Down => self.help_scroll = self.help_scroll.saturating_add( 1 ),
                _ => {}
            },
            Pane::Menu => self.handle_menu_key( code ).await,
        }
    }


    async fn handle_tree_key( &mut self, code: KeyCode ) {
        let Some( id ) = self.tree.selected_node() else { return };
        match code {
            KeyCode::Up => self.tree.select_previous(),
            KeyCode::Down => self.tree.select_next(),
            KeyCode::Enter => self.show_node( id ).await,
            KeyCode::Right => self.run_command( Command::Expand ).await,
            KeyCode::Left => {
                if self.engine.expand_lock( id ) > 0 {
                    self.run_command( Command::Collapse ).await;
                } else if let Some( parent ) = self.engine.parent( id ) {
                    self.tree.select_node( parent );
                }
            }
            KeyCode::Char( 'r' ) => self.run_command( Command::Refresh ).await,
            KeyCode::Char( 'm' ) => self.run_command( Command::Menu { index: None } ).await,
            _ => {}
        }
    }


    async fn handle_view_key( &mut self, code: KeyCode ) {
        let count = self.host.active().map_or( 0, |a| a.main.item_count() );
        match code {
            KeyCode::Up => self.view_selected = self.view_selected.saturating_sub( 1 ),
            KeyCode::Down => {
                if self.view_selected + 1 < count {
                    self.view_selected += 1;
                }
            }
            KeyCode::Enter => self.open_view_item().await,
            KeyCode::Char( 'c' ) => self.run_command( Command::Toggle { sub_view: ViewKind::ColumnBrowser } ).await,
            KeyCode::Char( 's' ) => self.run_command( Command::Toggle { sub_view: ViewKind::StatusBar } ).await,
            KeyCode::Char( 'i' ) => self.run_command( Command::Toggle { sub_view: ViewKind::InfoHeader } ).await,
            _ => {}
        }
    }


    async fn handle_menu_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Up => self.menu_selected = self.menu_selected.saturating_sub( 1 ),
            KeyCode::Down => {
                if self.menu_selected + 1 < self.menu.len() {
                    self.menu_selected += 1;
                }
            }
            KeyCode::Enter => {
                self.pane = Pane::Tree;
                let index = self.menu_selected + 1;
                self.run_command( Command::Menu { index: Some( index ) } ).await;
            }
            _ => {}
        }
    }


    async fn handle_command_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                let input = self.input_buffer.submit();
                self.input_mode = InputMode::Normal;
                self.execute_command( &input ).await;
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Backspace => {
                if self.input_buffer.is_empty() {
                    self.input_mode = InputMode::Normal;
                } else {
                    self.input_buffer.backspace();
                }
            }
            KeyCode::Left => self.input_buffer.move_left(),
            KeyCode::Right => self.input_buffer.move_right(),
            KeyCode::Up => self.input_buffer.recall_previous(),
            KeyCode::Down => self.input_buffer.recall_next(),
            KeyCode::Char( c ) => self.input_buffer.insert( c ),
            _ => {}
        }
    }


    /// Double-clicks the selected item of the main control. Its view
    /// handler answers with an activation.
    async fn open_view_item( &mut self ) {
        let Some( active ) = self.host.active() else { return };
        active.main.emit( ControlEvent::ItemDblClick( self.view_selected ) );

        let activation = tokio::time::timeout( ACTIVATION_WAIT, self.host.recv_activation() ).await;
        match activation {
            Ok( Some( activation ) ) => self.run_activation( activation ).await,
            Ok( None ) => {}
            Err( _ ) => tracing::debug!( "Nothing to open at row {}", self.view_selected ),
        }
    }


    /// Handles activations that arrived outside a key press.
    async fn drain_activations( &mut self ) {
        while let Some( activation ) = self.host.next_activation() {
            self.run_activation( activation ).await;
        }
    }


    async fn run_activation( &mut self, activation: Activation ) {
        match activation {
            Activation::ShowNode( id ) => self.show_node( id ).await,
            Activation::Navigate { object, collection } => self.navigate_to_object( &object, collection ).await,
            Activation::Play( object ) => self.set_status( format!( "Play: {}", object.title ) ),
        }
    }


    async fn navigate_to_object( &mut self, object: &MediaRef, collection: Option<MediaRef> ) {
        let kind = NavKind::ALL.iter().copied().find( |k| k.object_type() == object.object_type );
        let Some( kind ) = kind else {
            self.set_status( format!( "Cannot open {}", object.object_type ) );
            return;
        };
        match self.nav.navigate( kind, object, collection ).await {
            Ok( result ) => self.show_nav_result( result ).await,
            Err( e ) => self.report( e ),
        }
    }


    async fn execute_command( &mut self, input: &str ) {
        match Command::parse( input ) {
            Ok( cmd ) => self.run_command( cmd ).await,
            Err( e ) => self.set_status( format!( "{}", e ) ),
        }
    }


    async fn run_command( &mut self, cmd: Command ) {
        if let Err( e ) = self.try_command( cmd ).await {
            self.report( e );
        }
    }


    async fn try_command( &mut self, cmd: Command ) -> Result<(), TreeError> {
        let selected = self.tree.selected_node().unwrap_or_else( || self.engine.root() );
        match cmd {
            Command::Expand => {
                if self.engine.expand_lock( selected ) == 0 {
                    let children = self.engine.expand( selected ).await?;
                    tracing::debug!( "Expanded into {} children", children.len() );
                }
            }
            Command::Collapse => {
                if self.engine.expand_lock( selected ) > 0 {
                    self.engine.collapse( selected )?;
                }
            }
            Command::Refresh => {
                let children = self.engine.refresh_node_children( selected ).await?;
                self.set_status( format!( "Refreshed ({} children)", children.len() ) );
            }
            Command::Delete => {
                let title = self.engine.title( selected )?;
                self.engine.delete_node( selected ).await?;
                self.set_status( format!( "Deleted {}", title ) );
            }
            Command::Menu { index: None } => {
                self.menu = self.engine.build_menu( selected )?;
                self.menu_selected = 0;
                self.pane = Pane::Menu;
            }
            Command::Menu { index: Some( index ) } => {
                let menu = self.engine.build_menu( selected )?;
                let item = index.checked_sub( 1 ).and_then( |i| menu.get( i ) )
                    .ok_or_else( || TreeError::Unsupported( format!( "no menu item {}", index ) ) )?;
                self.run_menu_action( selected, item.action ).await?;
            }
            Command::View { kind } => {
                self.host.switch_view( kind ).await?;
                self.view_selected = 0;
            }
            Command::Toggle { sub_view } => {
                let visible = self.host.toggle_sub_view( sub_view ).await?;
                self.set_status( format!( "{} {}", sub_view.title(), if visible { "shown" } else { "hidden" } ) );
            }
            Command::Filter { field, value } => {
                let view = self.host.active()
                    .map( |a| a.view.clone() )
                    .ok_or_else( || TreeError::Unsupported( "no active view".into() ) )?;
                view.set_filter( field, value )?;
                self.view_selected = 0;
            }
            Command::ClearFilter => {
                if let Some( active ) = self.host.active() {
                    active.view.clear_filter()?;
                }
            }
            Command::Goto { kind, id } => {
                let result = self.nav.navigate_to_id( kind, &id ).await?;
                self.show_nav_result( result ).await;
            }
            Command::Help => self.pane = Pane::Help,
            Command::Quit => self.should_quit = true,
        }
        Ok(())
    }


    async fn run_menu_action( &mut self, id: NodeId, action: MenuAction ) -> Result<(), TreeError> {
        match self.engine.execute_menu( id, action ).await? {
            MenuOutcome::Done => {}
            MenuOutcome::ShowView => self.show_node( id ).await,
            MenuOutcome::Removed => self.set_status( "Removed" ),
            MenuOutcome::Navigate( object ) => {
                let collection = self.engine.info( id )?.collection;
                self.navigate_to_object( &object, collection ).await;
            }
        }
        Ok(())
    }


    /// Persists settings and the state store.
    fn save( &self ) {
        self.settings.save();
        if let Err( e ) = self.engine.store().save() {
            tracing::warn!( "Failed to save state: {}", e );
        }
    }
}


/// Loads a fixture file, scans a music directory, or starts empty.
fn open_library( path: Option<&Path> ) -> Result<MemoryLibrary> {
    match path {
        Some( dir ) if dir.is_dir() => {
            let mut scanner = LibraryScanner::new( "music" );
            scanner.add_root( dir.to_path_buf() );
            Ok( MemoryLibrary::from_fixture( scanner.scan()? ) )
        }
        Some( file ) => Ok( MemoryLibrary::load( file )? ),
        None => {
            tracing::info!( "No library configured; starting empty" );
            Ok( MemoryLibrary::new() )
        }
    }
}


/// Logs to a file under the data directory; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_env( "MEDIATREE_LOG" )
        .unwrap_or_else( |_| EnvFilter::new( "info" ) );

    let Some( dir ) = dirs::data_local_dir().map( |d| d.join( "mediatree" ) ) else {
        return Ok(());
    };
    std::fs::create_dir_all( &dir )?;
    let log_file = std::fs::OpenOptions::new()
        .create( true )
        .append( true )
        .open( dir.join( "mediatree.log" ) )?;

    tracing_subscriber::fmt()
        .with_writer( std::sync::Mutex::new( log_file ) )
        .with_ansi( false )
        .with_env_filter( filter )
        .init();
    Ok(())
}


/// Expands the top levels and prints the tree.
async fn dump_tree( engine: &NodeEngine ) -> Result<()> {
    let mut pending = vec![ ( engine.root(), 0 ) ];
    while let Some(( id, depth )) = pending.pop() {
        if depth >= DUMP_DEPTH || !engine.has_children( id )? {
            continue;
        }
        for child in engine.expand( id ).await? {
            pending.push(( child, depth + 1 ));
        }
    }

    let mut pane = TreePane::new();
    pane.rebuild( engine );
    for line in pane.render_lines() {
        println!( "{}", line );
    }
    Ok(())
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;
    tracing::info!( "mediatree starting" );

    let mut app = App::new( &args, Settings::load() )?;
    if args.dump {
        return dump_tree( &app.engine ).await;
    }
    app.open_initial( &args ).await;

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    let result = run( &mut terminal, &mut app ).await;
    app.save();

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;
    result
}


async fn run( terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App ) -> Result<()> {
    loop {
        app.tick();
        app.drain_activations().await;
        terminal.draw( |frame| draw_ui( frame, app ) )?;

        let ready = tokio::task::block_in_place( || event::poll( Duration::from_millis( 100 ) ) )?;
        if ready {
            if let Event::Key( key ) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key( key.code ).await;
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &App ) {
    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Min( 0 ),     // Panes
            Constraint::Length( 1 ),  // Status line
        ])
        .split( frame.area() );

    let panes = Layout::default()
        .direction( Direction::Horizontal )
        .constraints([ Constraint::Percentage( 35 ), Constraint::Percentage( 65 ) ])
        .split( chunks[0] );

    draw_tree( frame, app, panes[0] );
    draw_view( frame, app, panes[1] );
    draw_status_line( frame, app, chunks[1] );

    match app.pane {
        Pane::Help => draw_help( frame, app, chunks[0] ),
        Pane::Menu => draw_menu( frame, app, chunks[0] ),
        _ => {}
    }
    if let Some( alert ) = &app.alert {
        draw_alert( frame, alert, chunks[0] );
    }
}


fn pane_block( title: String, focused: bool ) -> Block<'static> {
    let style = if focused { Style::default().fg( Color::Cyan ) } else { Style::default() };
    Block::default().title( title ).borders( Borders::ALL ).border_style( style )
}


fn draw_tree( frame: &mut Frame, app: &App, area: Rect ) {
    let items: Vec<ListItem> = app.tree.render_lines().into_iter().map( ListItem::new ).collect();
    let mut state = ListState::default();
    state.select( Some( app.tree.selected_index() ) );

    let list = List::new( items )
        .block( pane_block( " Library ".into(), app.pane == Pane::Tree ) )
        .highlight_style( Style::default().bg( Color::DarkGray ) );
    frame.render_stateful_widget( list, area, &mut state );
}


fn object_line( object: &MediaRef ) -> String {
    match &object.artist {
        Some( artist ) if object.object_type != mediatree_core::ObjectType::Artist => {
            format!( " {} - {}", object.title, artist )
        }
        _ => format!( " {}", object.title ),
    }
}


fn draw_view( frame: &mut Frame, app: &App, area: Rect ) {
    let Some( active ) = app.host.active() else {
        frame.render_widget( Paragraph::new( " Select a node and press Enter" ).block( pane_block( " View ".into(), false ) ), area );
        return;
    };

    let header = active.sub_view( ViewKind::InfoHeader );
    let columns = active.sub_view( ViewKind::ColumnBrowser );
    let status = active.sub_view( ViewKind::StatusBar );
    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( if header.is_some() { 1 } else { 0 } ),
            Constraint::Length( if columns.is_some() { 1 } else { 0 } ),
            Constraint::Min( 0 ),
            Constraint::Length( if status.is_some() { 1 } else { 0 } ),
        ])
        .split( area );

    let sub_text = |control: Option<&mediatree_core::view_handler::Control>, style: Style| {
        Paragraph::new( control.and_then( |c| c.text() ).unwrap_or_default() ).style( style )
    };
    frame.render_widget( sub_text( header, Style::default().bold() ), chunks[0] );
    frame.render_widget( sub_text( columns, Style::default().fg( Color::Yellow ) ), chunks[1] );
    frame.render_widget( sub_text( status, Style::default().fg( Color::DarkGray ) ), chunks[3] );

    let title = format!( " {} ({}) ", app.engine.title( active.node() ).unwrap_or_default(), active.kind.title() );
    let block = pane_block( title, app.pane == Pane::View );
    let items: Vec<ListItem> = match active.main.source() {
        ControlSource::List( list ) if !list.is_loaded() && list.is_empty() => vec![ ListItem::new( " Loading..." ) ],
        ControlSource::List( list ) => list.locked( |objects| objects.iter().map( |o| ListItem::new( object_line( o ) ) ).collect() ),
        ControlSource::Nodes( ids ) => ids.iter()
            .map( |id| ListItem::new( format!( " {}", app.engine.title( *id ).unwrap_or_default() ) ) )
            .collect(),
        ControlSource::Text( text ) => vec![ ListItem::new( text ) ],
        ControlSource::Empty => Vec::new(),
    };

    let mut state = ListState::default();
    state.select( Some( app.view_selected ) );
    let list = List::new( items )
        .block( block )
        .highlight_style( Style::default().bg( Color::DarkGray ) );
    frame.render_stateful_widget( list, chunks[2], &mut state );
}


fn popup( area: Rect, width: u16, height: u16 ) -> Rect {
    let width = width.min( area.width );
    let height = height.min( area.height );
    Rect {
        x: area.x + ( area.width - width ) / 2,
        y: area.y + ( area.height - height ) / 2,
        width,
        height,
    }
}


fn draw_help( frame: &mut Frame, app: &App, area: Rect ) {
    let text = command::help_text();
    let area = popup( area, 60, text.lines().count() as u16 + 2 );
    let help = Paragraph::new( text )
        .block( Block::default().title( " Help " ).borders( Borders::ALL ) )
        .wrap( Wrap { trim: false } )
        .scroll(( app.help_scroll, 0 ));
    frame.render_widget( Clear, area );
    frame.render_widget( help, area );
}


fn draw_menu( frame: &mut Frame, app: &App, area: Rect ) {
    let area = popup( area, 40, app.menu.len() as u16 + 2 );
    let items: Vec<ListItem> = app.menu.iter()
        .enumerate()
        .map( |( i, item )| {
            let style = if item.enabled { Style::default() } else { Style::default().fg( Color::DarkGray ) };
            ListItem::new( format!( " {}. {}", i + 1, item.title ) ).style( style )
        } )
        .collect();
    let mut state = ListState::default();
    state.select( Some( app.menu_selected ) );
    let menu = List::new( items )
        .block( Block::default().title( " Menu " ).borders( Borders::ALL ) )
        .highlight_style( Style::default().bg( Color::DarkGray ) );
    frame.render_widget( Clear, area );
    frame.render_stateful_widget( menu, area, &mut state );
}


fn draw_alert( frame: &mut Frame, alert: &str, area: Rect ) {
    let area = popup( area, 60, 5 );
    let text = format!( "{}\n\nPress any key", alert );
    let widget = Paragraph::new( text )
        .style( Style::default().fg( Color::Red ) )
        .block( Block::default().title( " Configuration error " ).borders( Borders::ALL ) )
        .wrap( Wrap { trim: true } );
    frame.render_widget( Clear, area );
    frame.render_widget( widget, area );
}


fn draw_status_line( frame: &mut Frame, app: &App, area: Rect ) {
    let ( text, style ) = match app.input_mode {
        InputMode::Command => {
            ( format!( "/{}", app.input_buffer.content() ), Style::default().fg( Color::Yellow ) )
        }
        InputMode::Normal => {
            if let Some( progress ) = app.progress.message() {
                ( progress, Style::default().fg( Color::Magenta ) )
            } else if let Some( msg ) = &app.status_message {
                ( msg.clone(), Style::default().fg( Color::Green ) )
            } else {
                ( app.pane.hint().to_string(), Style::default().fg( Color::DarkGray ) )
            }
        }
    };
    frame.render_widget( Paragraph::new( text ).style( style ), area );

    if app.input_mode == InputMode::Command {
        let cursor_x = area.x + 1 + app.input_buffer.cursor_char_pos() as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}
