//! View handler registry and the rendering control contract.
//!
//! A view handler describes one rendering surface: which control it drives,
//! what it shows on `on_show` and what it releases on `on_hide`. Like node
//! handlers they are flattened single-inheritance tables; an override that
//! needs the parent behavior captures the parent's function at registration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{ Mutex, RwLock };
use serde::{ Deserialize, Serialize };
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::domain::MediaRef;
use crate::error::{ TreeError, TreeResult };
use crate::list::MediaList;
use crate::node::NodeId;
use crate::shared_source::SourceId;
use crate::view::ViewData;


const CONTROL_EVENT_CAPACITY: usize = 64;


/// Every kind of view the host can show.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize )]
#[serde( rename_all = "snake_case" )]
pub enum ViewKind {
    Base,
    Tracklist,
    FolderListView,
    PlaylistTracklist,
    AlbumTracklist,
    AlbumGrid,
    ArtistGrid,
    ArtistView,
    NodeList,

    // Sub-views
    StatusBar,
    ColumnBrowser,
    InfoHeader,
}


impl ViewKind {
    pub const ALL: [ViewKind; 12] = [
        ViewKind::Base,
        ViewKind::Tracklist,
        ViewKind::FolderListView,
        ViewKind::PlaylistTracklist,
        ViewKind::AlbumTracklist,
        ViewKind::AlbumGrid,
        ViewKind::ArtistGrid,
        ViewKind::ArtistView,
        ViewKind::NodeList,
        ViewKind::StatusBar,
        ViewKind::ColumnBrowser,
        ViewKind::InfoHeader,
    ];


    pub fn id( &self ) -> &'static str {
        match self {
            ViewKind::Base => "base",
            ViewKind::Tracklist => "tracklist",
            ViewKind::FolderListView => "folder_list_view",
            ViewKind::PlaylistTracklist => "playlist_tracklist",
            ViewKind::AlbumTracklist => "album_tracklist",
            ViewKind::AlbumGrid => "album_grid",
            ViewKind::ArtistGrid => "artist_grid",
            ViewKind::ArtistView => "artist_view",
            ViewKind::NodeList => "node_list",
            ViewKind::StatusBar => "status_bar",
            ViewKind::ColumnBrowser => "column_browser",
            ViewKind::InfoHeader => "info_header",
        }
    }


    pub fn is_sub_view( &self ) -> bool {
        matches!( self, ViewKind::StatusBar | ViewKind::ColumnBrowser | ViewKind::InfoHeader )
    }


    /// Human readable name for menus.
    pub fn title( &self ) -> &'static str {
        match self {
            ViewKind::Base => "base",
            ViewKind::Tracklist => "track list",
            ViewKind::FolderListView => "folder list",
            ViewKind::PlaylistTracklist => "playlist",
            ViewKind::AlbumTracklist => "album",
            ViewKind::AlbumGrid => "album grid",
            ViewKind::ArtistGrid => "artist grid",
            ViewKind::ArtistView => "artist",
            ViewKind::NodeList => "node list",
            ViewKind::StatusBar => "status bar",
            ViewKind::ColumnBrowser => "column browser",
            ViewKind::InfoHeader => "info header",
        }
    }
}


impl fmt::Display for ViewKind {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.id() )
    }
}


impl FromStr for ViewKind {
    type Err = String;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace( [ '-', ' ' ], "_" );
        ViewKind::ALL.iter()
            .copied()
            .find( |k| k.id() == wanted )
            .ok_or_else( || format!( "unknown view '{}'", s ) )
    }
}


/// Widget a view handler instantiates.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ControlClass {
    Panel,
    ListView,
    GridView,
    NodeListView,
    ArtistPanel,
    StatusBar,
    ColumnBrowser,
    InfoHeader,
}


/// What a control displays.
#[derive( Debug, Clone, Default )]
pub enum ControlSource {
    #[default]
    Empty,
    List( MediaList ),
    Nodes( Vec<NodeId> ),
    Text( String ),
}


/// Interactions a control offers.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ControlAction {
    PlayItem,
    NavigateToNode,
    NavigateToItem,
    Reorder,
}


/// Events emitted by a control.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ControlEvent {
    ItemClick( usize ),
    ItemDblClick( usize ),

    /// The data source was assigned.
    DataResult,
}


/// What the host should do for an item a control's user picked.
#[derive( Debug, Clone, PartialEq )]
pub enum Activation {
    ShowNode( NodeId ),

    /// Open the object's own node, searching within `collection`.
    Navigate { object: MediaRef, collection: Option<MediaRef> },

    Play( MediaRef ),
}


struct ControlInner {
    class: ControlClass,
    view: ViewKind,
    source: RwLock<ControlSource>,
    actions: Mutex<Vec<ControlAction>>,
    events: broadcast::Sender<ControlEvent>,
    held_source: Mutex<Option<SourceId>>,
    token: CancellationToken,
}


/// A rendering control instance. Clones share the same control.
#[derive( Clone )]
pub struct Control {
    inner: Arc<ControlInner>,
}


impl fmt::Debug for Control {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.debug_struct( "Control" )
            .field( "class", &self.inner.class )
            .field( "view", &self.inner.view )
            .field( "actions", &*self.inner.actions.lock() )
            .finish_non_exhaustive()
    }
}


impl Control {
    /// Creates a control whose lifetime ends when `token` is canceled.
    pub fn new( class: ControlClass, view: ViewKind, token: CancellationToken ) -> Self {
        let ( events, _ ) = broadcast::channel( CONTROL_EVENT_CAPACITY );
        Self {
            inner: Arc::new( ControlInner {
                class,
                view,
                source: RwLock::new( ControlSource::Empty ),
                actions: Mutex::new( Vec::new() ),
                events,
                held_source: Mutex::new( None ),
                token,
            } ),
        }
    }


    pub fn class( &self ) -> ControlClass {
        self.inner.class
    }


    pub fn view_kind( &self ) -> ViewKind {
        self.inner.view
    }


    pub fn ptr_eq( &self, other: &Control ) -> bool {
        Arc::ptr_eq( &self.inner, &other.inner )
    }


    /// Assigns the data source and announces it with `DataResult`.
    pub fn set_source( &self, source: ControlSource ) {
        *self.inner.source.write() = source;
        self.emit( ControlEvent::DataResult );
    }


    pub fn source( &self ) -> ControlSource {
        self.inner.source.read().clone()
    }


    /// The list shown, if the control shows one.
    pub fn list( &self ) -> Option<MediaList> {
        match &*self.inner.source.read() {
            ControlSource::List( list ) => Some( list.clone() ),
            _ => None,
        }
    }


    pub fn text( &self ) -> Option<String> {
        match &*self.inner.source.read() {
            ControlSource::Text( text ) => Some( text.clone() ),
            _ => None,
        }
    }


    /// Number of rows the control would draw.
    pub fn item_count( &self ) -> usize {
        match &*self.inner.source.read() {
            ControlSource::Empty => 0,
            ControlSource::List( list ) => list.len(),
            ControlSource::Nodes( nodes ) => nodes.len(),
            ControlSource::Text( _ ) => 1,
        }
    }


    pub fn add_action( &self, action: ControlAction ) {
        let mut actions = self.inner.actions.lock();
        if !actions.contains( &action ) {
            actions.push( action );
        }
    }


    pub fn actions( &self ) -> Vec<ControlAction> {
        self.inner.actions.lock().clone()
    }


    pub fn has_action( &self, action: ControlAction ) -> bool {
        self.inner.actions.lock().contains( &action )
    }


    /// What picking row `index` does under the control's actions.
    pub fn activation_for( &self, index: usize, collection: Option<MediaRef> ) -> Option<Activation> {
        let actions = self.actions();
        match &*self.inner.source.read() {
            ControlSource::Nodes( ids ) if actions.contains( &ControlAction::NavigateToNode ) => {
                ids.get( index ).copied().map( Activation::ShowNode )
            }
            ControlSource::List( list ) => {
                let object = list.get( index )?;
                if actions.contains( &ControlAction::NavigateToItem ) {
                    Some( Activation::Navigate { object, collection } )
                } else if actions.contains( &ControlAction::PlayItem ) {
                    Some( Activation::Play( object ) )
                } else {
                    None
                }
            }
            _ => None,
        }
    }


    pub fn emit( &self, event: ControlEvent ) {
        let _ = self.inner.events.send( event );
    }


    pub fn subscribe( &self ) -> broadcast::Receiver<ControlEvent> {
        self.inner.events.subscribe()
    }


    /// Remembers a shared source reference this control must release.
    pub fn hold_source( &self, id: SourceId ) {
        *self.inner.held_source.lock() = Some( id );
    }


    pub fn take_held_source( &self ) -> Option<SourceId> {
        self.inner.held_source.lock().take()
    }


    /// Canceled when the control is hidden.
    pub fn token( &self ) -> CancellationToken {
        self.inner.token.clone()
    }


    /// Drops the data source and actions and stops work tied to the control.
    pub fn clear( &self ) {
        *self.inner.source.write() = ControlSource::Empty;
        self.inner.actions.lock().clear();
        self.inner.token.cancel();
    }
}


/// Arguments of `on_show`.
#[derive( Clone )]
pub struct ShowCtx {
    pub control: Control,
    pub view: ViewData,

    /// The primary view's control, when showing a sub-view.
    pub main_control: Option<Control>,

    /// Fill the cache only; wire no listeners or actions.
    pub only_data_init: bool,

    /// Only the view handler changed; the node stayed the same.
    pub single_view_change: bool,
}


pub type ShowFn = Arc<dyn Fn( ShowCtx ) -> BoxFuture<'static, TreeResult<()>> + Send + Sync>;
pub type HideFn = Arc<dyn Fn( &ViewData, &Control ) + Send + Sync>;


/// Fully resolved behavior of one view kind.
#[derive( Clone )]
pub struct ViewHandler {
    pub kind: ViewKind,
    pub parent: Option<ViewKind>,
    pub title: String,
    pub control_class: ControlClass,

    /// Identity shared by related handlers ("list", "grid").
    pub base_view_type: Option<String>,

    /// Key under which sub-view visibility is persisted. Handlers sharing a
    /// key share the state.
    pub store_state_key: Option<String>,

    pub sub_views: Vec<ViewKind>,

    /// Sub-views hidden until the user shows them.
    pub hidden_sub_views: Vec<ViewKind>,

    pub is_sub_view: bool,
    pub on_show: ShowFn,
    pub on_hide: HideFn,
}


impl fmt::Debug for ViewHandler {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.debug_struct( "ViewHandler" )
            .field( "kind", &self.kind )
            .field( "parent", &self.parent )
            .field( "control_class", &self.control_class )
            .field( "base_view_type", &self.base_view_type )
            .field( "sub_views", &self.sub_views )
            .finish_non_exhaustive()
    }
}


impl ViewHandler {
    pub fn base() -> Self {
        Self {
            kind: ViewKind::Base,
            parent: None,
            title: String::new(),
            control_class: ControlClass::Panel,
            base_view_type: None,
            store_state_key: None,
            sub_views: Vec::new(),
            hidden_sub_views: Vec::new(),
            is_sub_view: false,
            on_show: Arc::new( |_| Box::pin( async { Ok(()) } ) ),
            on_hide: Arc::new( |_, control| control.clear() ),
        }
    }


    /// Key used for persisted state: the explicit state key, else the base
    /// view type, else the kind.
    pub fn state_key( &self ) -> String {
        self.store_state_key.clone()
            .or_else( || self.base_view_type.clone() )
            .unwrap_or_else( || self.kind.id().to_string() )
    }


    fn derive( &self, kind: ViewKind, overrides: ViewHandlerOverrides ) -> Self {
        let mut h = self.clone();
        h.kind = kind;
        h.parent = Some( self.kind );
        if let Some( v ) = overrides.title { h.title = v; }
        if let Some( v ) = overrides.control_class { h.control_class = v; }
        if let Some( v ) = overrides.base_view_type { h.base_view_type = Some( v ); }
        if let Some( v ) = overrides.store_state_key { h.store_state_key = Some( v ); }
        if let Some( v ) = overrides.sub_views { h.sub_views = v; }
        if let Some( v ) = overrides.hidden_sub_views { h.hidden_sub_views = v; }
        if let Some( v ) = overrides.is_sub_view { h.is_sub_view = v; }
        if let Some( v ) = overrides.on_show { h.on_show = v; }
        if let Some( v ) = overrides.on_hide { h.on_hide = v; }
        h
    }
}


#[derive( Default )]
pub struct ViewHandlerOverrides {
    pub title: Option<String>,
    pub control_class: Option<ControlClass>,
    pub base_view_type: Option<String>,
    pub store_state_key: Option<String>,
    pub sub_views: Option<Vec<ViewKind>>,
    pub hidden_sub_views: Option<Vec<ViewKind>>,
    pub is_sub_view: Option<bool>,
    pub on_show: Option<ShowFn>,
    pub on_hide: Option<HideFn>,
}


/// Registry of view handlers.
#[derive( Debug, Default )]
pub struct ViewHandlerRegistry {
    handlers: HashMap<ViewKind, Arc<ViewHandler>>,
}


impl ViewHandlerRegistry {
    pub fn new() -> Self {
        let mut handlers = HashMap::new();
        handlers.insert( ViewKind::Base, Arc::new( ViewHandler::base() ) );
        Self { handlers }
    }


    pub fn with_defaults() -> TreeResult<Self> {
        let mut registry = Self::new();
        crate::view_handlers::register_all( &mut registry )?;
        Ok( registry )
    }


    /// Registers `kind` as a child of `parent`, which must exist.
    pub fn inherit(
        &mut self,
        kind: ViewKind,
        parent: ViewKind,
        build: impl FnOnce( &ViewHandler ) -> ViewHandlerOverrides,
    ) -> TreeResult<()> {
        let parent_handler = self.handlers.get( &parent )
            .cloned()
            .ok_or( TreeError::UnregisteredView( parent ) )?;
        let handler = parent_handler.derive( kind, build( &parent_handler ) );
        if self.handlers.insert( kind, Arc::new( handler ) ).is_some() {
            tracing::warn!( "View handler {} registered twice", kind );
        }
        Ok(())
    }


    pub fn get( &self, kind: ViewKind ) -> TreeResult<Arc<ViewHandler>> {
        self.handlers.get( &kind ).cloned().ok_or_else( || {
            tracing::error!( "View handler {} is not registered", kind );
            TreeError::UnregisteredView( kind )
        } )
    }


    pub fn contains( &self, kind: ViewKind ) -> bool {
        self.handlers.contains_key( &kind )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::view::tests::test_view;
    use futures::FutureExt;
    use std::sync::atomic::{ AtomicUsize, Ordering };


    #[test]
    fn test_view_kind_parse() {
        assert_eq!( "column-browser".parse::<ViewKind>(), Ok( ViewKind::ColumnBrowser ) );
        assert_eq!( "Tracklist".parse::<ViewKind>(), Ok( ViewKind::Tracklist ) );
        assert!( "carousel".parse::<ViewKind>().is_err() );
    }


    #[test]
    fn test_state_key_fallbacks() {
        let mut registry = ViewHandlerRegistry::new();
        registry.inherit( ViewKind::Tracklist, ViewKind::Base, |_| ViewHandlerOverrides {
            base_view_type: Some( "list".into() ),
            ..Default::default()
        } ).unwrap();
        registry.inherit( ViewKind::FolderListView, ViewKind::Tracklist, |_| ViewHandlerOverrides::default() ).unwrap();
        registry.inherit( ViewKind::AlbumTracklist, ViewKind::Tracklist, |_| ViewHandlerOverrides {
            store_state_key: Some( "tracklist".into() ),
            ..Default::default()
        } ).unwrap();

        assert_eq!( registry.get( ViewKind::Base ).unwrap().state_key(), "base" );
        assert_eq!( registry.get( ViewKind::FolderListView ).unwrap().state_key(), "list" );
        assert_eq!( registry.get( ViewKind::AlbumTracklist ).unwrap().state_key(), "tracklist" );
    }


    #[tokio::test]
    async fn test_super_on_show_runs_with_same_arguments() {
        let calls = Arc::new( AtomicUsize::new( 0 ) );
        let mut registry = ViewHandlerRegistry::new();
        let counter = calls.clone();
        registry.inherit( ViewKind::Tracklist, ViewKind::Base, move |_| ViewHandlerOverrides {
            on_show: Some( Arc::new( move |ctx: ShowCtx| {
                counter.fetch_add( 1, Ordering::SeqCst );
                async move {
                    ctx.control.set_source( ControlSource::Text( format!( "init={}", ctx.only_data_init ) ) );
                    Ok(())
                }.boxed()
            } ) ),
            ..Default::default()
        } ).unwrap();
        registry.inherit( ViewKind::PlaylistTracklist, ViewKind::Tracklist, |parent| {
            let sup = parent.on_show.clone();
            ViewHandlerOverrides {
                on_show: Some( Arc::new( move |ctx: ShowCtx| {
                    let sup = sup.clone();
                    async move {
                        sup( ctx.clone() ).await?;
                        ctx.control.add_action( ControlAction::Reorder );
                        Ok(())
                    }.boxed()
                } ) ),
                ..Default::default()
            }
        } ).unwrap();

        let ( view, _lib ) = test_view().await;
        let control = Control::new( ControlClass::ListView, ViewKind::PlaylistTracklist, CancellationToken::new() );
        let handler = registry.get( ViewKind::PlaylistTracklist ).unwrap();
        ( handler.on_show )( ShowCtx {
            control: control.clone(),
            view,
            main_control: None,
            only_data_init: true,
            single_view_change: false,
        } ).await.unwrap();

        assert_eq!( calls.load( Ordering::SeqCst ), 1 );
        assert_eq!( control.text().as_deref(), Some( "init=true" ) );
        assert!( control.has_action( ControlAction::Reorder ) );
    }


    #[test]
    fn test_control_clear_cancels_work() {
        let control = Control::new( ControlClass::ListView, ViewKind::Tracklist, CancellationToken::new() );
        control.set_source( ControlSource::Text( "x".into() ) );
        control.add_action( ControlAction::PlayItem );
        control.add_action( ControlAction::PlayItem );
        assert_eq!( control.actions().len(), 1 );

        control.clear();
        assert_eq!( control.item_count(), 0 );
        assert!( control.actions().is_empty() );
        assert!( control.token().is_cancelled() );
    }


    #[test]
    fn test_unregistered_parent_view() {
        let mut registry = ViewHandlerRegistry::new();
        let err = registry.inherit( ViewKind::FolderListView, ViewKind::Tracklist, |_| ViewHandlerOverrides::default() ).unwrap_err();
        assert!( err.is_fatal() );
        assert!( registry.get( ViewKind::Tracklist ).is_err() );
    }
}
