//! Node handler registry.
//!
//! A node handler is a capability table describing how one kind of node
//! behaves. Handlers form single-inheritance chains rooted at `Base`: a
//! child is registered with only its overrides, and the registry copies the
//! parent's table under them once, at registration time. An override that
//! needs the parent behavior captures the parent's function from the table
//! handed to its builder.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{ Deserialize, Serialize };
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::domain::{ LibraryEvent, MediaRef, ObjectType };
use crate::error::{ TreeError, TreeResult };
use crate::library::MediaLibrary;
use crate::node::{ DataSource, NodeId };
use crate::node_engine::NodeEngine;
use crate::store::StateStore;
use crate::view_handler::ViewKind;


/// Every kind of node the tree knows about.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize )]
#[serde( rename_all = "snake_case" )]
pub enum NodeKind {
    // Abstract kinds, only used as parents.
    Base,
    Observable,
    PlaylistBase,

    Root,
    Collection,
    AllTracks,
    Albums,
    Album,
    Artists,
    Artist,
    Genres,
    Genre,
    Years,
    Year,
    AllSeries,
    Series,
    Playlists,
    Playlist,
    Folders,
    Folder,
    Devices,
    Device,
}


impl NodeKind {
    pub const ALL: [NodeKind; 22] = [
        NodeKind::Base,
        NodeKind::Observable,
        NodeKind::PlaylistBase,
        NodeKind::Root,
        NodeKind::Collection,
        NodeKind::AllTracks,
        NodeKind::Albums,
        NodeKind::Album,
        NodeKind::Artists,
        NodeKind::Artist,
        NodeKind::Genres,
        NodeKind::Genre,
        NodeKind::Years,
        NodeKind::Year,
        NodeKind::AllSeries,
        NodeKind::Series,
        NodeKind::Playlists,
        NodeKind::Playlist,
        NodeKind::Folders,
        NodeKind::Folder,
        NodeKind::Devices,
        NodeKind::Device,
    ];


    /// Handler id used in persisted paths.
    pub fn id( &self ) -> &'static str {
        match self {
            NodeKind::Base => "base",
            NodeKind::Observable => "observable",
            NodeKind::PlaylistBase => "playlist_base",
            NodeKind::Root => "root",
            NodeKind::Collection => "collection",
            NodeKind::AllTracks => "all_tracks",
            NodeKind::Albums => "albums",
            NodeKind::Album => "album",
            NodeKind::Artists => "artists",
            NodeKind::Artist => "artist",
            NodeKind::Genres => "genres",
            NodeKind::Genre => "genre",
            NodeKind::Years => "years",
            NodeKind::Year => "year",
            NodeKind::AllSeries => "all_series",
            NodeKind::Series => "series",
            NodeKind::Playlists => "playlists",
            NodeKind::Playlist => "playlist",
            NodeKind::Folders => "folders",
            NodeKind::Folder => "folder",
            NodeKind::Devices => "devices",
            NodeKind::Device => "device",
        }
    }


    /// Abstract kinds never appear as nodes.
    pub fn is_abstract( &self ) -> bool {
        matches!( self, NodeKind::Base | NodeKind::Observable | NodeKind::PlaylistBase )
    }
}


impl fmt::Display for NodeKind {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.id() )
    }
}


impl FromStr for NodeKind {
    type Err = TreeError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        NodeKind::ALL.iter()
            .copied()
            .find( |k| k.id() == s )
            .ok_or_else( || TreeError::UnknownHandler( s.to_string() ) )
    }
}


/// Read-only snapshot of a node handed to handler functions.
#[derive( Debug, Clone )]
pub struct NodeInfo {
    pub id: NodeId,
    pub kind: NodeKind,
    pub data_source: DataSource,
    pub persistent_id: String,

    /// Nearest collection object on the path to the root, if any.
    pub collection: Option<MediaRef>,
}


impl NodeInfo {
    pub fn object( &self ) -> Option<&MediaRef> {
        self.data_source.object()
    }


    /// The node's domain object; a node without one is misconfigured.
    pub fn require_object( &self ) -> TreeResult<&MediaRef> {
        self.object().ok_or( TreeError::MissingDataSource( self.kind ) )
    }


    pub fn collection_id( &self ) -> Option<&str> {
        self.collection.as_ref().map( |c| c.persistent_info.as_str() )
    }
}


/// Context for asynchronous handler functions.
#[derive( Clone )]
pub struct HandlerCtx {
    pub node: NodeInfo,
    pub library: Arc<dyn MediaLibrary>,
    pub store: Arc<StateStore>,
    pub config: EngineConfig,

    /// Canceled when the node is discarded.
    pub token: CancellationToken,
}


/// A child to create under a node.
#[derive( Debug, Clone )]
pub struct ChildSpec {
    pub kind: NodeKind,
    pub data_source: DataSource,
}


impl ChildSpec {
    pub fn object( kind: NodeKind, object: MediaRef ) -> Self {
        Self { kind, data_source: DataSource::Object( object ) }
    }


    /// A child that shares its parent's scope object (collection branches).
    pub fn scoped( kind: NodeKind, scope: &DataSource ) -> Self {
        Self { kind, data_source: scope.clone() }
    }


    pub fn handler_only( kind: NodeKind ) -> Self {
        Self { kind, data_source: DataSource::None }
    }
}


/// Objects dragged onto a node.
#[derive( Debug, Clone )]
pub struct DragPayload {
    pub objects: Vec<MediaRef>,
}


impl DragPayload {
    pub fn all_of( &self, object_type: ObjectType ) -> bool {
        !self.objects.is_empty() && self.objects.iter().all( |o| o.object_type == object_type )
    }
}


/// What a drop would do.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum DropMode {
    None,
    Copy,
    Move,
}


/// Context menu actions.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum MenuAction {
    Expand,
    Collapse,
    Refresh,
    ViewAs( ViewKind ),
    Delete,
    GoToArtist,
}


/// One context menu entry.
#[derive( Debug, Clone, PartialEq )]
pub struct MenuItem {
    pub action: MenuAction,
    pub title: String,
    pub group: u32,
    pub order: u32,
    pub enabled: bool,
}


impl MenuItem {
    pub fn new( action: MenuAction, title: impl Into<String>, group: u32, order: u32 ) -> Self {
        Self { action, title: title.into(), group, order, enabled: true }
    }
}


/// Which configured quiet period a handler's deferred refreshes use.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum RefreshTimeout {
    Normal,
    HighChurn,
}


impl RefreshTimeout {
    pub fn duration( &self, config: &EngineConfig ) -> Duration {
        match self {
            RefreshTimeout::Normal => config.refresh_timeout(),
            RefreshTimeout::HighChurn => config.high_churn_timeout(),
        }
    }
}


/// A value that is either constant or computed from the node.
pub enum Resolver<T> {
    Const( T ),
    Dynamic( Arc<dyn Fn( &NodeInfo ) -> T + Send + Sync> ),
}


impl<T: Clone> Clone for Resolver<T> {
    fn clone( &self ) -> Self {
        match self {
            Resolver::Const( v ) => Resolver::Const( v.clone() ),
            Resolver::Dynamic( f ) => Resolver::Dynamic( Arc::clone( f ) ),
        }
    }
}


impl<T: Clone> Resolver<T> {
    pub fn dynamic( f: impl Fn( &NodeInfo ) -> T + Send + Sync + 'static ) -> Self {
        Resolver::Dynamic( Arc::new( f ) )
    }


    pub fn resolve( &self, node: &NodeInfo ) -> T {
        match self {
            Resolver::Const( v ) => v.clone(),
            Resolver::Dynamic( f ) => f( node ),
        }
    }
}


pub type ChildrenFn = Arc<dyn Fn( HandlerCtx ) -> BoxFuture<'static, TreeResult<Vec<ChildSpec>>> + Send + Sync>;
pub type ActionFn = Arc<dyn Fn( HandlerCtx ) -> BoxFuture<'static, TreeResult<()>> + Send + Sync>;
pub type DropFn = Arc<dyn Fn( HandlerCtx, DragPayload ) -> BoxFuture<'static, TreeResult<()>> + Send + Sync>;
pub type CanDropFn = Arc<dyn Fn( &NodeInfo, &DragPayload ) -> bool + Send + Sync>;
pub type DropModeFn = Arc<dyn Fn( &NodeInfo, &DragPayload ) -> DropMode + Send + Sync>;
pub type MenuFn = Arc<dyn Fn( &NodeInfo ) -> Vec<MenuItem> + Send + Sync>;
pub type HookFn = Arc<dyn Fn( &NodeEngine, &NodeInfo ) + Send + Sync>;
pub type EventFilterFn = Arc<dyn Fn( &NodeInfo, &LibraryEvent ) -> bool + Send + Sync>;
pub type PersistentIdFn = Arc<dyn Fn( NodeKind, &DataSource ) -> String + Send + Sync>;


/// Fully resolved behavior of one node kind.
#[derive( Clone )]
pub struct NodeHandler {
    pub kind: NodeKind,
    pub parent: Option<NodeKind>,
    pub title: Resolver<String>,
    pub icon: Resolver<String>,
    pub has_children: Resolver<bool>,
    pub get_children: Option<ChildrenFn>,

    /// Compatible view handlers, preferred first.
    pub view_as: Vec<ViewKind>,

    pub can_delete: Resolver<bool>,
    pub delete_items: Option<ActionFn>,
    pub can_drop: CanDropFn,
    pub drop: Option<DropFn>,
    pub get_drop_mode: DropModeFn,
    pub menu: MenuFn,

    /// Runs when the first widget expands the node.
    pub on_expanded: Option<HookFn>,

    /// Runs when the last widget collapses the node.
    pub on_collapsed: Option<HookFn>,

    /// Library changes that require this node's children to be reloaded.
    pub affected_by: Option<EventFilterFn>,

    pub refresh_timeout: RefreshTimeout,
    pub persistent_id: PersistentIdFn,
    pub requires_data_source: bool,
}


impl fmt::Debug for NodeHandler {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.debug_struct( "NodeHandler" )
            .field( "kind", &self.kind )
            .field( "parent", &self.parent )
            .field( "view_as", &self.view_as )
            .field( "refresh_timeout", &self.refresh_timeout )
            .finish_non_exhaustive()
    }
}


/// Persistent id of a node: the object key, or the kind for handler-only
/// nodes.
pub fn default_persistent_id( kind: NodeKind, data_source: &DataSource ) -> String {
    match data_source {
        DataSource::Object( o ) => o.key(),
        DataSource::Value( v ) => format!( "{}:{}", kind, v ),
        DataSource::None => kind.to_string(),
    }
}


impl NodeHandler {
    /// The root of every inheritance chain.
    pub fn base() -> Self {
        Self {
            kind: NodeKind::Base,
            parent: None,
            title: Resolver::dynamic( |n: &NodeInfo| {
                n.object().map( |o| o.title.clone() ).unwrap_or_else( || n.kind.to_string() )
            } ),
            icon: Resolver::Const( "unknown".to_string() ),
            has_children: Resolver::Const( false ),
            get_children: None,
            view_as: Vec::new(),
            can_delete: Resolver::Const( false ),
            delete_items: None,
            can_drop: Arc::new( |_, _| false ),
            drop: None,
            get_drop_mode: Arc::new( |_, _| DropMode::None ),
            menu: Arc::new( |_| Vec::new() ),
            on_expanded: None,
            on_collapsed: None,
            affected_by: None,
            refresh_timeout: RefreshTimeout::Normal,
            persistent_id: Arc::new( default_persistent_id ),
            requires_data_source: false,
        }
    }


    /// Copies this table under the given overrides.
    fn derive( &self, kind: NodeKind, overrides: NodeHandlerOverrides ) -> Self {
        let mut h = self.clone();
        h.kind = kind;
        h.parent = Some( self.kind );
        if let Some( v ) = overrides.title { h.title = v; }
        if let Some( v ) = overrides.icon { h.icon = v; }
        if let Some( v ) = overrides.has_children { h.has_children = v; }
        if let Some( v ) = overrides.get_children { h.get_children = Some( v ); }
        if let Some( v ) = overrides.view_as { h.view_as = v; }
        if let Some( v ) = overrides.can_delete { h.can_delete = v; }
        if let Some( v ) = overrides.delete_items { h.delete_items = Some( v ); }
        if let Some( v ) = overrides.can_drop { h.can_drop = v; }
        if let Some( v ) = overrides.drop { h.drop = Some( v ); }
        if let Some( v ) = overrides.get_drop_mode { h.get_drop_mode = v; }
        if let Some( v ) = overrides.menu { h.menu = v; }
        if let Some( v ) = overrides.on_expanded { h.on_expanded = Some( v ); }
        if let Some( v ) = overrides.on_collapsed { h.on_collapsed = Some( v ); }
        if let Some( v ) = overrides.affected_by { h.affected_by = Some( v ); }
        if let Some( v ) = overrides.refresh_timeout { h.refresh_timeout = v; }
        if let Some( v ) = overrides.persistent_id { h.persistent_id = v; }
        if let Some( v ) = overrides.requires_data_source { h.requires_data_source = v; }
        h
    }


    pub fn persistent_id_for( &self, data_source: &DataSource ) -> String {
        ( self.persistent_id )( self.kind, data_source )
    }
}


/// The properties a derived handler sets; everything else is inherited.
#[derive( Default )]
pub struct NodeHandlerOverrides {
    pub title: Option<Resolver<String>>,
    pub icon: Option<Resolver<String>>,
    pub has_children: Option<Resolver<bool>>,
    pub get_children: Option<ChildrenFn>,
    pub view_as: Option<Vec<ViewKind>>,
    pub can_delete: Option<Resolver<bool>>,
    pub delete_items: Option<ActionFn>,
    pub can_drop: Option<CanDropFn>,
    pub drop: Option<DropFn>,
    pub get_drop_mode: Option<DropModeFn>,
    pub menu: Option<MenuFn>,
    pub on_expanded: Option<HookFn>,
    pub on_collapsed: Option<HookFn>,
    pub affected_by: Option<EventFilterFn>,
    pub refresh_timeout: Option<RefreshTimeout>,
    pub persistent_id: Option<PersistentIdFn>,
    pub requires_data_source: Option<bool>,
}


/// Registry of node handlers, built once at startup and shared.
#[derive( Debug, Default )]
pub struct NodeHandlerRegistry {
    handlers: HashMap<NodeKind, Arc<NodeHandler>>,
}


impl NodeHandlerRegistry {
    /// Creates a registry holding only `Base`.
    pub fn new() -> Self {
        let mut handlers = HashMap::new();
        handlers.insert( NodeKind::Base, Arc::new( NodeHandler::base() ) );
        Self { handlers }
    }


    /// Creates a registry with every built-in handler.
    pub fn with_defaults() -> TreeResult<Self> {
        let mut registry = Self::new();
        crate::node_handlers::register_all( &mut registry )?;
        Ok( registry )
    }


    /// Registers `kind` as a child of `parent`.
    ///
    /// `build` receives the parent's resolved table so overrides can call
    /// the parent behavior. The parent must already be registered.
    pub fn inherit(
        &mut self,
        kind: NodeKind,
        parent: NodeKind,
        build: impl FnOnce( &NodeHandler ) -> NodeHandlerOverrides,
    ) -> TreeResult<()> {
        let parent_handler = self.handlers.get( &parent )
            .cloned()
            .ok_or( TreeError::UnregisteredHandler( parent ) )?;
        let overrides = build( &parent_handler );
        let handler = parent_handler.derive( kind, overrides );
        if self.handlers.insert( kind, Arc::new( handler ) ).is_some() {
            tracing::warn!( "Node handler {} registered twice", kind );
        }
        Ok(())
    }


    /// Looks up a handler. A missing handler is a configuration error.
    pub fn get( &self, kind: NodeKind ) -> TreeResult<Arc<NodeHandler>> {
        self.handlers.get( &kind ).cloned().ok_or_else( || {
            tracing::error!( "Node handler {} is not registered", kind );
            TreeError::UnregisteredHandler( kind )
        } )
    }


    /// Looks up a handler by persisted id.
    pub fn resolve_id( &self, id: &str ) -> TreeResult<Arc<NodeHandler>> {
        let kind = id.parse::<NodeKind>().inspect_err( |_| {
            tracing::error!( "Unknown node handler id '{}'", id );
        } )?;
        self.get( kind )
    }


    pub fn contains( &self, kind: NodeKind ) -> bool {
        self.handlers.contains_key( &kind )
    }


    /// Parent chain of a kind, from the kind itself up to `Base`.
    pub fn lineage( &self, kind: NodeKind ) -> Vec<NodeKind> {
        let mut chain = Vec::new();
        let mut current = self.handlers.get( &kind );
        while let Some( handler ) = current {
            chain.push( handler.kind );
            current = handler.parent.and_then( |p| self.handlers.get( &p ) );
        }
        chain
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::domain::MediaObject;
    use futures::FutureExt;


    fn info( kind: NodeKind ) -> NodeInfo {
        NodeInfo {
            id: NodeId::default(),
            kind,
            data_source: DataSource::Object( MediaObject::new( ObjectType::Playlist, "p1", "Road Trip" ).into_ref() ),
            persistent_id: "playlist:p1".into(),
            collection: None,
        }
    }


    fn parent_registry() -> NodeHandlerRegistry {
        let mut registry = NodeHandlerRegistry::new();
        registry.inherit( NodeKind::Observable, NodeKind::Base, |_| NodeHandlerOverrides {
            icon: Some( Resolver::Const( "parent-icon".into() ) ),
            has_children: Some( Resolver::Const( true ) ),
            get_children: Some( Arc::new( |_ctx| async { Ok( vec![ ChildSpec::handler_only( NodeKind::Playlists ) ] ) }.boxed() ) ),
            menu: Some( Arc::new( |_| vec![ MenuItem::new( MenuAction::Refresh, "Parent item", 0, 0 ) ] ) ),
            ..Default::default()
        } ).unwrap();
        registry
    }


    #[test]
    fn test_child_overriding_title_inherits_rest() {
        let mut registry = parent_registry();
        registry.inherit( NodeKind::Playlist, NodeKind::Observable, |_| NodeHandlerOverrides {
            title: Some( Resolver::dynamic( |n: &NodeInfo| n.object().map( |o| o.title.clone() ).unwrap_or_default() ) ),
            ..Default::default()
        } ).unwrap();

        let parent = registry.get( NodeKind::Observable ).unwrap();
        let child = registry.get( NodeKind::Playlist ).unwrap();
        let node = info( NodeKind::Playlist );

        assert_eq!( child.title.resolve( &node ), "Road Trip" );
        assert_eq!( child.icon.resolve( &node ), "parent-icon" );
        assert!( Arc::ptr_eq( child.get_children.as_ref().unwrap(), parent.get_children.as_ref().unwrap() ) );
        assert!( Arc::ptr_eq( &child.menu, &parent.menu ) );
        assert_eq!( ( child.menu )( &node ), ( parent.menu )( &node ) );
        assert_eq!( child.parent, Some( NodeKind::Observable ) );
    }


    #[test]
    fn test_super_call_runs_parent_first() {
        let mut registry = parent_registry();
        registry.inherit( NodeKind::Playlist, NodeKind::Observable, |parent| {
            let sup = parent.menu.clone();
            NodeHandlerOverrides {
                menu: Some( Arc::new( move |n| {
                    let mut items = sup( n );
                    items.push( MenuItem::new( MenuAction::Delete, "Child item", 0, 1 ) );
                    items
                } ) ),
                ..Default::default()
            }
        } ).unwrap();

        let items = ( registry.get( NodeKind::Playlist ).unwrap().menu )( &info( NodeKind::Playlist ) );
        let titles: Vec<_> = items.iter().map( |i| i.title.as_str() ).collect();
        assert_eq!( titles, vec![ "Parent item", "Child item" ] );
    }


    #[test]
    fn test_unregistered_parent_is_an_error() {
        let mut registry = NodeHandlerRegistry::new();
        let result = registry.inherit( NodeKind::Playlist, NodeKind::PlaylistBase, |_| NodeHandlerOverrides::default() );
        assert_eq!( result, Err( TreeError::UnregisteredHandler( NodeKind::PlaylistBase ) ) );
    }


    #[test]
    fn test_unknown_id_is_fatal() {
        let registry = NodeHandlerRegistry::new();
        let err = registry.resolve_id( "smart_widget" ).unwrap_err();
        assert!( err.is_fatal() );
        assert!( registry.get( NodeKind::Album ).unwrap_err().is_fatal() );
    }


    #[test]
    fn test_kind_ids_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!( kind.id().parse::<NodeKind>(), Ok( kind ) );
        }
        let json = serde_json::to_string( &NodeKind::AllSeries ).unwrap();
        assert_eq!( json, "\"all_series\"" );
    }


    #[test]
    fn test_lineage() {
        let mut registry = parent_registry();
        registry.inherit( NodeKind::Playlist, NodeKind::Observable, |_| NodeHandlerOverrides::default() ).unwrap();
        assert_eq!(
            registry.lineage( NodeKind::Playlist ),
            vec![ NodeKind::Playlist, NodeKind::Observable, NodeKind::Base ],
        );
    }
}
