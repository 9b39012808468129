//! Node expansion and refresh engine.
//!
//! Interprets node handlers against the node arena. Every node moves through
//! `collapsed -> expanding -> expanded`; a node has at most one children
//! load in flight and concurrent callers share it. Loads run as spawned
//! tasks so a caller giving up never strands the node in `expanding`.
//!
//! The tree lock is never held across an `.await`.

use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::domain::{ MediaRef, ObjectType };
use crate::error::{ TreeError, TreeResult };
use crate::library::MediaLibrary;
use crate::node::{ DataSource, NodeId, NodeTree, SharedLoad, StoredDataSource, StoredNode };
use crate::node_handler::{
    DragPayload, DropMode, HandlerCtx, HookFn, MenuAction, MenuItem, NodeHandler, NodeHandlerRegistry,
    NodeInfo, NodeKind,
};
use crate::store::{ MediaTreeItem, NodeHandlerState, StateKey, StateStore, ViewHandlerState };


/// What the caller should do after a context menu action ran.
#[derive( Debug, Clone, PartialEq )]
pub enum MenuOutcome {
    Done,

    /// The node's preferred view changed; show it again.
    ShowView,

    /// The node no longer exists.
    Removed,

    /// Navigate to this object.
    Navigate( MediaRef ),
}


struct EngineInner {
    tree: Mutex<NodeTree>,
    registry: Arc<NodeHandlerRegistry>,
    library: Arc<dyn MediaLibrary>,
    store: Arc<StateStore>,
    config: EngineConfig,

    /// Deferred refreshes currently running. Pending timers re-arm while
    /// this is non-zero so refreshes do not pile up.
    any_node_in_refresh: AtomicUsize,
}


/// Decrements the in-refresh counter when a deferred refresh ends.
struct RefreshGuard<'a>( &'a AtomicUsize );


impl<'a> RefreshGuard<'a> {
    fn enter( counter: &'a AtomicUsize ) -> Self {
        counter.fetch_add( 1, Ordering::SeqCst );
        Self( counter )
    }
}


impl Drop for RefreshGuard<'_> {
    fn drop( &mut self ) {
        self.0.fetch_sub( 1, Ordering::SeqCst );
    }
}


/// The node runtime. Cheap to clone; clones share the same tree.
#[derive( Clone )]
pub struct NodeEngine {
    inner: Arc<EngineInner>,
}


impl std::fmt::Debug for NodeEngine {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "NodeEngine" )
            .field( "nodes", &self.inner.tree.lock().len() )
            .field( "config", &self.inner.config )
            .finish_non_exhaustive()
    }
}


impl NodeEngine {
    /// Creates an engine with a fresh tree holding only the root node.
    pub fn new(
        registry: Arc<NodeHandlerRegistry>,
        library: Arc<dyn MediaLibrary>,
        store: Arc<StateStore>,
        config: EngineConfig,
    ) -> TreeResult<Self> {
        let root = registry.get( NodeKind::Root )?;
        let tree = NodeTree::new( NodeKind::Root, root.persistent_id_for( &DataSource::None ) );
        Ok( Self {
            inner: Arc::new( EngineInner {
                tree: Mutex::new( tree ),
                registry,
                library,
                store,
                config,
                any_node_in_refresh: AtomicUsize::new( 0 ),
            } ),
        } )
    }


    pub fn root( &self ) -> NodeId {
        self.inner.tree.lock().root()
    }


    pub fn registry( &self ) -> &Arc<NodeHandlerRegistry> {
        &self.inner.registry
    }


    pub fn library( &self ) -> &Arc<dyn MediaLibrary> {
        &self.inner.library
    }


    pub fn store( &self ) -> &Arc<StateStore> {
        &self.inner.store
    }


    pub fn config( &self ) -> &EngineConfig {
        &self.inner.config
    }


    fn node_info( tree: &NodeTree, id: NodeId ) -> TreeResult<NodeInfo> {
        let node = tree.node( id )?;
        let collection = tree.ancestors( id ).into_iter()
            .rev()
            .filter_map( |a| tree.get( a ) )
            .find( |n| n.kind == NodeKind::Collection )
            .and_then( |n| n.data_source.object().cloned() );
        Ok( NodeInfo {
            id,
            kind: node.kind,
            data_source: node.data_source.clone(),
            persistent_id: node.persistent_id.clone(),
            collection,
        } )
    }


    /// Snapshot of a node for handler calls.
    pub fn info( &self, id: NodeId ) -> TreeResult<NodeInfo> {
        Self::node_info( &self.inner.tree.lock(), id )
    }


    /// The resolved handler of a node.
    pub fn handler( &self, id: NodeId ) -> TreeResult<Arc<NodeHandler>> {
        let kind = self.inner.tree.lock().node( id )?.kind;
        self.inner.registry.get( kind )
    }


    fn handler_ctx( &self, info: NodeInfo, token: CancellationToken ) -> HandlerCtx {
        HandlerCtx {
            node: info,
            library: Arc::clone( &self.inner.library ),
            store: Arc::clone( &self.inner.store ),
            config: self.inner.config.clone(),
            token,
        }
    }


    /// Context for calling a node's handler functions outside a load.
    pub fn ctx( &self, id: NodeId ) -> TreeResult<HandlerCtx> {
        let ( info, token ) = {
            let tree = self.inner.tree.lock();
            ( Self::node_info( &tree, id )?, tree.node( id )?.token() )
        };
        Ok( self.handler_ctx( info, token ) )
    }


    pub fn title( &self, id: NodeId ) -> TreeResult<String> {
        let info = self.info( id )?;
        Ok( self.inner.registry.get( info.kind )?.title.resolve( &info ) )
    }


    pub fn icon( &self, id: NodeId ) -> TreeResult<String> {
        let info = self.info( id )?;
        Ok( self.inner.registry.get( info.kind )?.icon.resolve( &info ) )
    }


    pub fn has_children( &self, id: NodeId ) -> TreeResult<bool> {
        let info = self.info( id )?;
        Ok( self.inner.registry.get( info.kind )?.has_children.resolve( &info ) )
    }


    /// Currently materialized children.
    pub fn children( &self, id: NodeId ) -> Vec<NodeId> {
        self.inner.tree.lock().children( id ).to_vec()
    }


    pub fn find_child( &self, parent: NodeId, persistent_id: &str ) -> Option<NodeId> {
        self.inner.tree.lock().find_child( parent, persistent_id )
    }


    pub fn parent( &self, id: NodeId ) -> Option<NodeId> {
        self.inner.tree.lock().get( id ).and_then( |n| n.parent )
    }


    /// Nodes from the root down to `id`.
    pub fn ancestors( &self, id: NodeId ) -> Vec<NodeId> {
        self.inner.tree.lock().ancestors( id )
    }


    pub fn contains( &self, id: NodeId ) -> bool {
        self.inner.tree.lock().contains( id )
    }


    /// Children were loaded at least once.
    pub fn is_expanded( &self, id: NodeId ) -> bool {
        self.inner.tree.lock().get( id ).is_some_and( |n| n.expanded )
    }


    pub fn is_expanding( &self, id: NodeId ) -> bool {
        self.inner.tree.lock().get( id ).is_some_and( |n| n.expanding )
    }


    pub fn is_canceled( &self, id: NodeId ) -> bool {
        self.inner.tree.lock().get( id ).map( |n| n.canceled() ).unwrap_or( true )
    }


    /// Number of widgets showing the node expanded.
    pub fn expand_lock( &self, id: NodeId ) -> u32 {
        self.inner.tree.lock().get( id ).map( |n| n.tag.expand_lock ).unwrap_or( 0 )
    }


    /// True while the node listens to library changes.
    pub fn is_watching( &self, id: NodeId ) -> bool {
        self.inner.tree.lock().get( id ).is_some_and( |n| n.tag.listener.is_some() )
    }


    /// True for nodes restored from a stored path without enumeration.
    pub fn is_virtual( &self, id: NodeId ) -> bool {
        self.inner.tree.lock().get( id ).is_some_and( |n| n.tag.virtual_child )
    }


    /// Returns the node's children, loading them if they were never loaded
    /// or were invalidated. Concurrent callers share one load.
    pub async fn load_children( &self, id: NodeId ) -> TreeResult<Vec<NodeId>> {
        {
            let tree = self.inner.tree.lock();
            let node = tree.node( id )?;
            if node.canceled() {
                return Err( TreeError::Canceled );
            }
            if node.expanded && !node.expanding && !node.tag.stale {
                return Ok( node.children.clone() );
            }
        }
        self.refresh_node_children( id ).await
    }


    /// Reloads the node's children from its handler, or joins the reload
    /// already in flight.
    pub async fn refresh_node_children( &self, id: NodeId ) -> TreeResult<Vec<NodeId>> {
        let load = {
            let mut tree = self.inner.tree.lock();
            let node = tree.node_mut( id )?;
            if node.canceled() {
                return Err( TreeError::Canceled );
            }
            match node.tag.pending_load.clone() {
                Some( load ) => load,
                None => {
                    let token = node.token().child_token();
                    node.tag.load_token = Some( token.clone() );
                    node.expanding = true;

                    let engine = self.clone();
                    let handle = tokio::spawn( async move { engine.run_load( id, token ).await } );
                    let load: SharedLoad = async move {
                        handle.await.unwrap_or_else( |e| {
                            tracing::error!( "Children load task failed: {}", e );
                            Err( TreeError::Canceled )
                        } )
                    }.boxed().shared();
                    node.tag.pending_load = Some( load.clone() );
                    load
                }
            }
        };
        load.await
    }


    async fn run_load( self, id: NodeId, token: CancellationToken ) -> TreeResult<Vec<NodeId>> {
        let result = self.load_and_apply( id, &token ).await;

        let mut tree = self.inner.tree.lock();
        if result.is_err() {
            tree.abort_update( id );
        }
        if let Some( node ) = tree.get_mut( id ) {
            node.expanding = false;
            node.tag.pending_load = None;
            node.tag.load_token = None;
        }
        match &result {
            Ok( children ) => tracing::debug!( "Loaded {} children", children.len() ),
            Err( e ) if e.is_canceled() => tracing::debug!( "Children load canceled" ),
            Err( e ) if e.is_fatal() => tracing::error!( "Children load failed: {}", e ),
            Err( e ) => tracing::warn!( "Children load failed: {}", e ),
        }
        result
    }


    async fn load_and_apply( &self, id: NodeId, token: &CancellationToken ) -> TreeResult<Vec<NodeId>> {
        let ( get_children, ctx, generation ) = {
            let mut tree = self.inner.tree.lock();
            let info = Self::node_info( &tree, id )?;
            let handler = self.inner.registry.get( info.kind )?;
            tree.begin_update( id )?;
            let generation = tree.node( id )?.tag.generation;
            ( handler.get_children.clone(), self.handler_ctx( info, token.clone() ), generation )
        };

        let specs = match get_children {
            None => Vec::new(),
            Some( get_children ) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err( TreeError::Canceled ),
                specs = get_children( ctx ) => specs?,
            },
        };

        // Resolve child handlers before touching the tree so a bad handler
        // table leaves the previous children intact.
        let mut resolved = Vec::with_capacity( specs.len() );
        for spec in specs {
            let handler = self.inner.registry.get( spec.kind )?;
            if handler.requires_data_source && spec.data_source.object().is_none() {
                tracing::error!( "Node handler {} requires a data source", spec.kind );
                return Err( TreeError::MissingDataSource( spec.kind ) );
            }
            let persistent_id = handler.persistent_id_for( &spec.data_source );
            resolved.push( ( spec, persistent_id ) );
        }

        let ( children, deleted ) = {
            let mut tree = self.inner.tree.lock();
            if token.is_cancelled() {
                return Err( TreeError::Canceled );
            }
            for ( spec, persistent_id ) in resolved {
                tree.add_child( id, spec.kind, spec.data_source, persistent_id )?;
            }
            let deleted = tree.end_update_and_get_deleted( id )?;
            let node = tree.node_mut( id )?;
            node.expanded = true;
            // Changes announced while the handler ran are not in these children.
            node.tag.stale = node.tag.generation != generation;
            ( node.children.clone(), deleted )
        };

        for gone in deleted {
            self.remove_node( gone );
        }
        Ok( children )
    }


    /// Marks the node's children for reload on the next `load_children`.
    pub fn invalidate( &self, id: NodeId ) {
        if let Some( node ) = self.inner.tree.lock().get_mut( id ) {
            node.tag.stale = true;
            node.tag.generation += 1;
        }
    }


    /// Schedules a refresh once `timeout` passed without a new trigger.
    ///
    /// Repeated calls only move the trigger time; one timer per node checks
    /// the time since the last trigger and re-arms itself until the node has
    /// been quiet long enough. A load already in flight when the timer fires
    /// is awaited and followed by a fresh one. Nodes whose children were
    /// never loaded are only marked stale. The timer stops when the node
    /// stops watching the library.
    pub fn deferred_refresh( &self, id: NodeId, timeout: Duration ) {
        let token = {
            let mut tree = self.inner.tree.lock();
            let Some( node ) = tree.get_mut( id ) else {
                return;
            };
            if node.canceled() {
                return;
            }
            node.tag.last_trigger = Some( Instant::now() );
            node.tag.stale = true;
            node.tag.generation += 1;
            if node.tag.refresh_armed {
                return;
            }
            node.tag.refresh_armed = true;
            node.tag.listener.clone().unwrap_or_else( || node.token() )
        };

        let engine = self.clone();
        tokio::spawn( async move {
            if engine.wait_until_quiet( id, timeout, &token ).await {
                engine.run_deferred_refresh( id ).await;
            }
        } );
    }


    /// Sleeps until the node saw no trigger for `timeout` and no other
    /// deferred refresh is running. Returns false when the timer was
    /// stopped or the node is gone.
    async fn wait_until_quiet( &self, id: NodeId, timeout: Duration, token: &CancellationToken ) -> bool {
        loop {
            let deadline = {
                let tree = self.inner.tree.lock();
                match tree.get( id ).and_then( |n| n.tag.last_trigger ) {
                    Some( last ) => last + timeout,
                    None => return false,
                }
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::trace!( "Deferred refresh stopped" );
                    if let Some( node ) = self.inner.tree.lock().get_mut( id ) {
                        node.tag.refresh_armed = false;
                    }
                    return false;
                }
                _ = tokio::time::sleep_until( deadline ) => {}
            }

            let quiet = {
                let tree = self.inner.tree.lock();
                tree.get( id )
                    .and_then( |n| n.tag.last_trigger )
                    .is_some_and( |last| last + timeout <= Instant::now() )
            };
            if !quiet {
                continue;
            }
            if self.inner.any_node_in_refresh.load( Ordering::SeqCst ) > 0 {
                tracing::trace!( "Another refresh is running, re-arming" );
                if let Some( node ) = self.inner.tree.lock().get_mut( id ) {
                    node.tag.last_trigger = Some( Instant::now() );
                }
                continue;
            }
            return true;
        }
    }


    async fn run_deferred_refresh( &self, id: NodeId ) {
        let _guard = RefreshGuard::enter( &self.inner.any_node_in_refresh );
        let ( loaded, in_flight ) = {
            let mut tree = self.inner.tree.lock();
            let Some( node ) = tree.get_mut( id ) else {
                return;
            };
            node.tag.refresh_armed = false;
            ( node.expanded, node.tag.pending_load.clone() )
        };

        // The load in flight may have read the library before the change.
        if let Some( load ) = in_flight {
            let _ = load.await;
        } else if !loaded {
            return;
        }
        let stale = self.inner.tree.lock().get( id ).is_some_and( |n| n.tag.stale && n.expanded );
        if !stale {
            return;
        }

        tracing::debug!( "Deferred refresh firing" );
        if let Err( e ) = self.refresh_node_children( id ).await {
            if !e.is_canceled() {
                tracing::warn!( "Deferred refresh failed: {}", e );
            }
        }
    }


    /// Cancels the node and everything running on its behalf. The node
    /// stays in the tree but refuses further loads.
    pub fn cancel_node( &self, id: NodeId ) {
        if let Some( node ) = self.inner.tree.lock().get( id ) {
            node.token().cancel();
        }
    }


    fn fire( &self, hook: Option<( HookFn, NodeInfo )> ) {
        if let Some( ( hook, info ) ) = hook {
            hook( self, &info );
        }
    }


    /// A widget started showing the node expanded. The handler's
    /// `on_expanded` runs only for the first one.
    pub fn on_expanded( &self, id: NodeId ) -> TreeResult<()> {
        let hook = {
            let mut tree = self.inner.tree.lock();
            let info = Self::node_info( &tree, id )?;
            let handler = self.inner.registry.get( info.kind )?;
            let node = tree.node_mut( id )?;
            node.tag.expand_lock += 1;
            if node.tag.expand_lock == 1 {
                handler.on_expanded.clone().map( |h| ( h, info ) )
            } else {
                None
            }
        };
        self.fire( hook );
        Ok(())
    }


    /// A widget stopped showing the node expanded. The last one runs the
    /// handler's `on_collapsed` and aborts a load still in flight.
    pub fn on_collapsed( &self, id: NodeId ) -> TreeResult<()> {
        let hook = {
            let mut tree = self.inner.tree.lock();
            let info = Self::node_info( &tree, id )?;
            let handler = self.inner.registry.get( info.kind )?;
            let node = tree.node_mut( id )?;
            if node.tag.expand_lock == 0 {
                tracing::warn!( "Collapse of {} without matching expand", info.persistent_id );
                return Ok(());
            }
            node.tag.expand_lock -= 1;
            if node.tag.expand_lock > 0 {
                return Ok(());
            }
            if let Some( load ) = node.tag.load_token.take() {
                load.cancel();
            }
            handler.on_collapsed.clone().map( |h| ( h, info ) )
        };
        self.fire( hook );
        Ok(())
    }


    /// Expands the node for one widget and returns its children.
    pub async fn expand( &self, id: NodeId ) -> TreeResult<Vec<NodeId>> {
        self.on_expanded( id )?;
        self.load_children( id ).await
    }


    /// Collapses the node for one widget. Loaded children are kept.
    pub fn collapse( &self, id: NodeId ) -> TreeResult<()> {
        self.on_collapsed( id )
    }


    /// Subscribes the node to library changes that affect it. Matching
    /// events schedule a deferred refresh.
    pub fn watch_library( &self, id: NodeId ) {
        let ( filter, info, listener, timeout ) = {
            let mut tree = self.inner.tree.lock();
            let Ok( info ) = Self::node_info( &tree, id ) else {
                return;
            };
            let Ok( handler ) = self.inner.registry.get( info.kind ) else {
                return;
            };
            let Some( filter ) = handler.affected_by.clone() else {
                return;
            };
            let Some( node ) = tree.get_mut( id ) else {
                return;
            };
            if node.tag.listener.is_some() {
                return;
            }
            let listener = node.token().child_token();
            node.tag.listener = Some( listener.clone() );
            ( filter, info, listener, handler.refresh_timeout.duration( &self.inner.config ) )
        };

        let mut events = self.inner.library.subscribe();
        let engine = self.clone();
        tokio::spawn( async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = listener.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok( event ) => {
                        if filter( &info, &event ) {
                            tracing::trace!( "{} affected by {:?} of {}", info.persistent_id, event.kind, event.object.key() );
                            engine.deferred_refresh( id, timeout );
                        }
                    }
                    Err( RecvError::Lagged( missed ) ) => {
                        tracing::warn!( "Missed {} library events, refreshing {}", missed, info.persistent_id );
                        engine.deferred_refresh( id, timeout );
                    }
                    Err( RecvError::Closed ) => break,
                }
            }
        } );
    }


    /// Stops listening to library changes.
    pub fn unwatch_library( &self, id: NodeId ) {
        let listener = self.inner.tree.lock().get_mut( id ).and_then( |n| n.tag.listener.take() );
        if let Some( listener ) = listener {
            listener.cancel();
        }
    }


    /// Removes a node and its subtree. Expanded nodes in the subtree are
    /// collapsed first so their handlers release listeners.
    pub fn remove_node( &self, id: NodeId ) {
        let hooks: Vec<( HookFn, NodeInfo )> = {
            let mut tree = self.inner.tree.lock();
            let mut hooks = Vec::new();
            for d in tree.descendants_post_order( id ) {
                let Ok( info ) = Self::node_info( &tree, d ) else {
                    continue;
                };
                let Some( node ) = tree.get_mut( d ) else {
                    continue;
                };
                if node.tag.expand_lock == 0 {
                    continue;
                }
                node.tag.expand_lock = 0;
                if let Some( hook ) = self.inner.registry.get( info.kind ).ok().and_then( |h| h.on_collapsed.clone() ) {
                    hooks.push( ( hook, info ) );
                }
            }
            hooks
        };
        for hook in hooks {
            self.fire( Some( hook ) );
        }

        let removed = self.inner.tree.lock().remove_subtree( id );
        if !removed.is_empty() {
            tracing::debug!( "Removed {} nodes", removed.len() );
        }
    }


    /// Deletes the node's object through its handler, then the node.
    pub async fn delete_node( &self, id: NodeId ) -> TreeResult<()> {
        let ctx = self.ctx( id )?;
        let handler = self.inner.registry.get( ctx.node.kind )?;
        let delete = match &handler.delete_items {
            Some( delete ) if handler.can_delete.resolve( &ctx.node ) => Arc::clone( delete ),
            _ => return Err( TreeError::Unsupported( format!( "delete {}", ctx.node.kind ) ) ),
        };
        delete( ctx ).await?;
        self.remove_node( id );
        Ok(())
    }


    pub fn can_drop( &self, id: NodeId, payload: &DragPayload ) -> TreeResult<bool> {
        let info = self.info( id )?;
        let handler = self.inner.registry.get( info.kind )?;
        Ok( handler.drop.is_some() && ( handler.can_drop )( &info, payload ) )
    }


    pub fn drop_mode( &self, id: NodeId, payload: &DragPayload ) -> TreeResult<DropMode> {
        if !self.can_drop( id, payload )? {
            return Ok( DropMode::None );
        }
        let info = self.info( id )?;
        Ok( ( self.inner.registry.get( info.kind )?.get_drop_mode )( &info, payload ) )
    }


    /// Drops objects onto the node.
    pub async fn drop_objects( &self, id: NodeId, payload: DragPayload ) -> TreeResult<()> {
        let ctx = self.ctx( id )?;
        let handler = self.inner.registry.get( ctx.node.kind )?;
        let on_drop = match &handler.drop {
            Some( on_drop ) if ( handler.can_drop )( &ctx.node, &payload ) => Arc::clone( on_drop ),
            _ => return Err( TreeError::Unsupported( format!( "drop onto {}", ctx.node.kind ) ) ),
        };
        tracing::info!( "Dropping {} objects onto {}", payload.objects.len(), ctx.node.persistent_id );
        on_drop( ctx, payload ).await
    }


    /// Context menu for a node: the handler's items plus the common ones,
    /// ordered by group then order.
    pub fn build_menu( &self, id: NodeId ) -> TreeResult<Vec<MenuItem>> {
        let info = self.info( id )?;
        let handler = self.inner.registry.get( info.kind )?;
        let mut items = ( handler.menu )( &info );

        if handler.has_children.resolve( &info ) {
            if self.expand_lock( id ) > 0 {
                items.push( MenuItem::new( MenuAction::Collapse, "Collapse", 0, 0 ) );
            } else {
                items.push( MenuItem::new( MenuAction::Expand, "Expand", 0, 0 ) );
            }
            items.push( MenuItem::new( MenuAction::Refresh, "Refresh", 0, 1 ) );
        }
        for ( order, view ) in handler.view_as.iter().enumerate() {
            items.push( MenuItem::new( MenuAction::ViewAs( *view ), format!( "View as {}", view.title() ), 10, order as u32 ) );
        }
        if handler.can_delete.resolve( &info ) && handler.delete_items.is_some() {
            items.push( MenuItem::new( MenuAction::Delete, "Delete", 30, 0 ) );
        }

        items.sort_by_key( |i| ( i.group, i.order ) );
        Ok( items )
    }


    /// Runs a context menu action.
    pub async fn execute_menu( &self, id: NodeId, action: MenuAction ) -> TreeResult<MenuOutcome> {
        match action {
            MenuAction::Expand => {
                self.expand( id ).await?;
                Ok( MenuOutcome::Done )
            }
            MenuAction::Collapse => {
                self.collapse( id )?;
                Ok( MenuOutcome::Done )
            }
            MenuAction::Refresh => {
                self.refresh_node_children( id ).await?;
                Ok( MenuOutcome::Done )
            }
            MenuAction::ViewAs( view ) => {
                let info = self.info( id )?;
                self.set_node_handler_state( info.kind, info.collection_id(), &NodeHandlerState { view_as: Some( view ) } );
                Ok( MenuOutcome::ShowView )
            }
            MenuAction::Delete => {
                self.delete_node( id ).await?;
                Ok( MenuOutcome::Removed )
            }
            MenuAction::GoToArtist => {
                let info = self.info( id )?;
                let handler = self.inner.registry.get( info.kind )?;
                let enabled = ( handler.menu )( &info ).iter().any( |i| i.action == action && i.enabled );
                if !enabled {
                    return Err( TreeError::Unsupported( format!( "go to artist from {}", info.kind ) ) );
                }
                let artist_id = info.require_object()?.artist.clone()
                    .ok_or_else( || TreeError::NotFound( format!( "artist of {}", info.persistent_id ) ) )?;
                let artist = self.inner.library.get_object( ObjectType::Artist, &artist_id ).await?
                    .ok_or_else( || TreeError::NotFound( format!( "artist:{}", artist_id ) ) )?;
                Ok( MenuOutcome::Navigate( artist ) )
            }
        }
    }


    pub fn node_handler_state( &self, kind: NodeKind, collection: Option<&str> ) -> NodeHandlerState {
        let key = StateKey::node_handler( kind, collection, self.inner.config.touch_mode );
        self.inner.store.get_value( &key, NodeHandlerState::default() )
    }


    pub fn set_node_handler_state( &self, kind: NodeKind, collection: Option<&str>, state: &NodeHandlerState ) {
        let key = StateKey::node_handler( kind, collection, self.inner.config.touch_mode );
        self.inner.store.set_value( &key, state );
    }


    pub fn view_handler_state( &self, state_key: &str ) -> ViewHandlerState {
        let key = StateKey::view_handler( state_key, self.inner.config.touch_mode );
        self.inner.store.get_value( &key, ViewHandlerState::default() )
    }


    pub fn set_view_handler_state( &self, state_key: &str, state: &ViewHandlerState ) {
        let key = StateKey::view_handler( state_key, self.inner.config.touch_mode );
        self.inner.store.set_value( &key, state );
    }


    /// Branch order and visibility of a collection.
    pub async fn media_tree_items( &self, collection: &MediaRef ) -> TreeResult<Vec<MediaTreeItem>> {
        crate::node_handlers::media_tree_items(
            self.inner.library.as_ref(),
            &self.inner.store,
            self.inner.config.touch_mode,
            collection,
        ).await
    }


    /// Persists a collection's branch list and invalidates its node.
    pub fn set_media_tree_items( &self, collection: &MediaRef, items: &[MediaTreeItem] ) {
        let key = StateKey::media_tree_items( &collection.persistent_info, self.inner.config.touch_mode );
        self.inner.store.set_value( &key, &items );

        let root = self.root();
        if let Some( node ) = self.find_child( root, &collection.key() ) {
            self.invalidate( node );
        }
    }


    /// Serializable descriptor of a node.
    pub fn store_node( &self, id: NodeId ) -> TreeResult<StoredNode> {
        let tree = self.inner.tree.lock();
        let node = tree.node( id )?;
        Ok( StoredNode {
            handler_id: node.kind.id().to_string(),
            persistent_id: node.persistent_id.clone(),
            data_source: node.data_source.to_stored(),
        } )
    }


    /// Descriptors of every node from the root down to `id`.
    pub fn store_path( &self, id: NodeId ) -> TreeResult<Vec<StoredNode>> {
        self.ancestors( id ).into_iter().map( |a| self.store_node( a ) ).collect()
    }


    /// Descriptor for a node that may not exist yet.
    pub fn create_node_state( &self, kind: NodeKind, data_source: DataSource ) -> TreeResult<StoredNode> {
        let handler = self.inner.registry.get( kind )?;
        Ok( StoredNode {
            handler_id: kind.id().to_string(),
            persistent_id: handler.persistent_id_for( &data_source ),
            data_source: data_source.to_stored(),
        } )
    }


    /// Turns a stored data source back into a live one.
    pub async fn resolve_data_source( &self, stored: &StoredDataSource ) -> TreeResult<DataSource> {
        match stored {
            StoredDataSource::Object { object_type, persistent_info } => {
                let object = self.inner.library.get_object( *object_type, persistent_info ).await?
                    .ok_or_else( || TreeError::NotFound( format!( "{}:{}", object_type, persistent_info ) ) )?;
                Ok( DataSource::Object( object ) )
            }
            StoredDataSource::Value( serde_json::Value::Null ) => Ok( DataSource::None ),
            StoredDataSource::Value( v ) => Ok( DataSource::Value( v.clone() ) ),
        }
    }


    /// Recreates a child of `parent` from its descriptor. An existing child
    /// with the same identity is returned as is; otherwise a virtual child
    /// is inserted without enumerating the parent.
    pub async fn restore_node( &self, parent: NodeId, stored: &StoredNode ) -> TreeResult<NodeId> {
        let kind: NodeKind = stored.handler_id.parse().inspect_err( |e| tracing::error!( "{}", e ) )?;
        let handler = self.inner.registry.get( kind )?;
        if let Some( existing ) = self.find_child( parent, &stored.persistent_id ) {
            return Ok( existing );
        }

        let data_source = self.resolve_data_source( &stored.data_source ).await?;
        if handler.requires_data_source && data_source.object().is_none() {
            tracing::error!( "Stored {} node has no data source", kind );
            return Err( TreeError::MissingDataSource( kind ) );
        }
        let persistent_id = handler.persistent_id_for( &data_source );

        let mut tree = self.inner.tree.lock();
        if tree.node( parent )?.canceled() {
            return Err( TreeError::Canceled );
        }
        if let Some( existing ) = tree.find_child( parent, &persistent_id ) {
            return Ok( existing );
        }
        let id = tree.add_child( parent, kind, data_source, persistent_id )?;
        tree.node_mut( id )?.tag.virtual_child = true;
        tracing::debug!( "Restored virtual {} node {}", kind, stored.persistent_id );
        Ok( id )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::domain::{ MediaObject, Query };
    use crate::library::tests::sample_library;
    use crate::library::MemoryLibrary;
    use crate::node_handler::{ ChildSpec, NodeHandlerOverrides, Resolver };


    fn engine_with( lib: Arc<MemoryLibrary> ) -> NodeEngine {
        NodeEngine::new(
            Arc::new( NodeHandlerRegistry::with_defaults().unwrap() ),
            lib,
            Arc::new( StateStore::in_memory() ),
            EngineConfig::default(),
        ).unwrap()
    }


    async fn playlists_node( engine: &NodeEngine ) -> NodeId {
        let root = engine.root();
        engine.load_children( root ).await.unwrap();
        engine.find_child( root, "playlists" ).unwrap()
    }


    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        lib.set_latency( Some( Duration::from_millis( 20 ) ) );
        let before = lib.query_count();

        let ( a, b ) = tokio::join!( engine.load_children( playlists ), engine.load_children( playlists ) );

        assert_eq!( lib.query_count(), before + 1 );
        assert_eq!( a.unwrap(), b.unwrap() );
        assert!( !engine.is_expanding( playlists ) );
    }


    #[tokio::test]
    async fn test_expand_three_playlists_then_reexpand_uses_cache() {
        let lib = Arc::new( sample_library() );
        lib.insert( MediaObject::new( ObjectType::Playlist, "gym", "Gym" ) );
        lib.insert( MediaObject::new( ObjectType::Playlist, "road", "Road" ) );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        let before = lib.query_count();

        let children = engine.expand( playlists ).await.unwrap();
        assert_eq!( children.len(), 3 );
        assert_eq!( lib.query_count(), before + 1 );

        engine.collapse( playlists ).unwrap();
        let again = engine.expand( playlists ).await.unwrap();
        assert_eq!( again, children );
        assert_eq!( lib.query_count(), before + 1 );
    }


    #[tokio::test]
    async fn test_refresh_reuses_nodes_and_drops_removed() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        let children = engine.load_children( playlists ).await.unwrap();
        let favs = engine.find_child( playlists, "playlist:favs" ).unwrap();
        assert_eq!( children, vec![ favs ] );

        lib.insert( MediaObject::new( ObjectType::Playlist, "gym", "Gym" ) );
        let children = engine.refresh_node_children( playlists ).await.unwrap();
        assert_eq!( children.len(), 2 );
        assert_eq!( children[ 0 ], favs );

        let favs_object = engine.info( favs ).unwrap().data_source.object().cloned().unwrap();
        lib.delete_object( &favs_object ).await.unwrap();
        let children = engine.refresh_node_children( playlists ).await.unwrap();
        assert_eq!( children.len(), 1 );
        assert!( !engine.contains( favs ) );
    }


    #[tokio::test]
    async fn test_removed_children_are_collapsed_first() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.load_children( playlists ).await.unwrap();
        let favs = engine.find_child( playlists, "playlist:favs" ).unwrap();
        engine.expand( favs ).await.unwrap();
        assert!( engine.is_watching( favs ) );
        let listener = engine.inner.tree.lock().get( favs ).unwrap().tag.listener.clone().unwrap();

        let favs_object = engine.info( favs ).unwrap().data_source.object().cloned().unwrap();
        lib.delete_object( &favs_object ).await.unwrap();
        engine.refresh_node_children( playlists ).await.unwrap();

        assert!( listener.is_cancelled() );
        assert!( !engine.contains( favs ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_collapse_mid_load_discards_children() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        lib.set_latency( Some( Duration::from_millis( 100 ) ) );

        let expanding = engine.clone();
        let task = tokio::spawn( async move { expanding.expand( playlists ).await } );
        tokio::time::sleep( Duration::from_millis( 10 ) ).await;
        assert!( engine.is_expanding( playlists ) );
        engine.collapse( playlists ).unwrap();

        assert_eq!( task.await.unwrap(), Err( TreeError::Canceled ) );
        tokio::time::sleep( Duration::from_millis( 200 ) ).await;
        assert!( engine.children( playlists ).is_empty() );
        assert!( !engine.is_expanded( playlists ) );
        assert!( !engine.is_expanding( playlists ) );
    }


    #[tokio::test]
    async fn test_canceled_node_refuses_loads() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib );
        let playlists = playlists_node( &engine ).await;

        engine.cancel_node( playlists );
        assert!( engine.is_canceled( playlists ) );
        assert_eq!( engine.load_children( playlists ).await, Err( TreeError::Canceled ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_deferred_refresh_coalesces_triggers() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.load_children( playlists ).await.unwrap();
        let before = lib.query_count();

        for _ in 0..5 {
            engine.deferred_refresh( playlists, Duration::from_millis( 500 ) );
            tokio::time::sleep( Duration::from_millis( 100 ) ).await;
        }
        // The window runs from the last trigger, not the first.
        tokio::time::sleep( Duration::from_millis( 300 ) ).await;
        assert_eq!( lib.query_count(), before );

        tokio::time::sleep( Duration::from_millis( 300 ) ).await;
        assert_eq!( lib.query_count(), before + 1 );

        tokio::time::sleep( Duration::from_secs( 5 ) ).await;
        assert_eq!( lib.query_count(), before + 1 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_library_events_refresh_expanded_node() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.expand( playlists ).await.unwrap();
        let before = lib.query_count();

        for id in [ "a", "b", "c" ] {
            lib.insert( MediaObject::new( ObjectType::Playlist, id, id ) );
            tokio::time::sleep( Duration::from_millis( 200 ) ).await;
        }
        // Unrelated objects do not count as triggers.
        lib.insert( MediaObject::new( ObjectType::Track, "t9", "Nine" ) );

        tokio::time::sleep( Duration::from_millis( 1000 ) ).await;
        assert_eq!( lib.query_count(), before );

        tokio::time::sleep( Duration::from_millis( 1000 ) ).await;
        assert_eq!( lib.query_count(), before + 1 );
        assert_eq!( engine.children( playlists ).len(), 4 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_collapsed_node_ignores_events() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.expand( playlists ).await.unwrap();
        engine.collapse( playlists ).unwrap();
        let before = lib.query_count();

        lib.insert( MediaObject::new( ObjectType::Playlist, "a", "A" ) );
        tokio::time::sleep( Duration::from_secs( 3 ) ).await;
        assert_eq!( lib.query_count(), before );
    }


    #[tokio::test( start_paused = true )]
    async fn test_change_during_first_load_reaches_node() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        lib.set_snapshot_first( true );
        lib.set_latency( Some( Duration::from_secs( 3 ) ) );

        let expanding = engine.clone();
        let task = tokio::spawn( async move { expanding.expand( playlists ).await } );
        tokio::time::sleep( Duration::from_millis( 100 ) ).await;
        lib.insert( MediaObject::new( ObjectType::Playlist, "gym", "Gym" ) );

        // The first load read the library before the insert.
        assert_eq!( task.await.unwrap().unwrap().len(), 1 );
        assert!( engine.inner.tree.lock().get( playlists ).unwrap().tag.stale );

        tokio::time::sleep( Duration::from_secs( 30 ) ).await;
        assert_eq!( engine.load_children( playlists ).await.unwrap().len(), 2 );
        assert!( engine.find_child( playlists, "playlist:gym" ).is_some() );
    }


    #[tokio::test( start_paused = true )]
    async fn test_change_during_refresh_triggers_another() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.expand( playlists ).await.unwrap();
        lib.set_snapshot_first( true );
        lib.set_latency( Some( Duration::from_secs( 1 ) ) );

        let refreshing = engine.clone();
        let task = tokio::spawn( async move { refreshing.refresh_node_children( playlists ).await } );
        tokio::time::sleep( Duration::from_millis( 100 ) ).await;
        lib.insert( MediaObject::new( ObjectType::Playlist, "gym", "Gym" ) );
        assert_eq!( task.await.unwrap().unwrap().len(), 1 );

        tokio::time::sleep( Duration::from_secs( 30 ) ).await;
        assert_eq!( engine.children( playlists ).len(), 2 );
        assert!( !engine.inner.tree.lock().get( playlists ).unwrap().tag.stale );
    }


    #[tokio::test( start_paused = true )]
    async fn test_deferred_refresh_waits_for_running_refresh() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let root = engine.root();
        let playlists = playlists_node( &engine ).await;
        let devices = engine.find_child( root, "devices" ).unwrap();
        engine.load_children( playlists ).await.unwrap();
        engine.load_children( devices ).await.unwrap();
        lib.set_latency( Some( Duration::from_secs( 1 ) ) );
        let before = lib.query_count();
        let timeout = Duration::from_millis( 500 );

        // Playlists refresh runs from 500 ms to 1500 ms.
        engine.deferred_refresh( playlists, timeout );
        tokio::time::sleep( Duration::from_millis( 300 ) ).await;
        let triggered = Instant::now();
        engine.deferred_refresh( devices, timeout );

        tokio::time::sleep( Duration::from_millis( 700 ) ).await;
        assert_eq!( lib.query_count(), before + 1 );
        let last = engine.inner.tree.lock().get( devices ).unwrap().tag.last_trigger.unwrap();
        assert!( last > triggered );

        tokio::time::sleep( Duration::from_millis( 700 ) ).await;
        assert_eq!( lib.query_count(), before + 1 );

        tokio::time::sleep( Duration::from_millis( 300 ) ).await;
        assert_eq!( lib.query_count(), before + 2 );

        tokio::time::sleep( Duration::from_secs( 10 ) ).await;
        assert_eq!( lib.query_count(), before + 2 );
        assert!( !engine.inner.tree.lock().get( devices ).unwrap().tag.stale );
    }


    #[tokio::test( start_paused = true )]
    async fn test_collapse_stops_pending_refresh() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.expand( playlists ).await.unwrap();
        let before = lib.query_count();

        lib.insert( MediaObject::new( ObjectType::Playlist, "gym", "Gym" ) );
        tokio::time::sleep( Duration::from_millis( 100 ) ).await;
        assert!( engine.inner.tree.lock().get( playlists ).unwrap().tag.refresh_armed );
        engine.collapse( playlists ).unwrap();

        tokio::time::sleep( Duration::from_secs( 5 ) ).await;
        assert_eq!( lib.query_count(), before );
        assert!( !engine.inner.tree.lock().get( playlists ).unwrap().tag.refresh_armed );

        // The change is picked up on the next expand.
        assert_eq!( engine.expand( playlists ).await.unwrap().len(), 2 );
        assert_eq!( lib.query_count(), before + 1 );
    }


    #[tokio::test]
    async fn test_expand_lock_is_reference_counted() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib );
        let playlists = playlists_node( &engine ).await;

        engine.on_expanded( playlists ).unwrap();
        engine.on_expanded( playlists ).unwrap();
        assert!( engine.is_watching( playlists ) );

        engine.on_collapsed( playlists ).unwrap();
        assert!( engine.is_watching( playlists ) );
        assert_eq!( engine.expand_lock( playlists ), 1 );

        engine.on_collapsed( playlists ).unwrap();
        assert!( !engine.is_watching( playlists ) );

        // Unbalanced collapse is ignored.
        engine.on_collapsed( playlists ).unwrap();
        assert_eq!( engine.expand_lock( playlists ), 0 );
    }


    #[tokio::test]
    async fn test_store_and_restore_round_trip() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.load_children( playlists ).await.unwrap();
        let favs = engine.find_child( playlists, "playlist:favs" ).unwrap();
        let stored = engine.store_node( favs ).unwrap();

        assert_eq!( engine.restore_node( playlists, &stored ).await.unwrap(), favs );

        let fresh = engine_with( lib );
        let playlists = playlists_node( &fresh ).await;
        let restored = fresh.restore_node( playlists, &stored ).await.unwrap();
        let info = fresh.info( restored ).unwrap();

        assert_eq!( info.kind, NodeKind::Playlist );
        assert_eq!( info.persistent_id, stored.persistent_id );
        assert_eq!( info.data_source.to_stored(), stored.data_source );
        assert!( fresh.is_virtual( restored ) );
        assert!( !fresh.is_expanded( playlists ) );
    }


    #[tokio::test]
    async fn test_restore_rejects_unknown_handler_and_missing_object() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib );
        let playlists = playlists_node( &engine ).await;

        let mut stored = engine.create_node_state(
            NodeKind::Playlist,
            DataSource::Object( MediaObject::new( ObjectType::Playlist, "gone", "Gone" ).into_ref() ),
        ).unwrap();
        assert!( matches!( engine.restore_node( playlists, &stored ).await, Err( TreeError::NotFound( _ ) ) ) );

        stored.handler_id = "smart_playlist".into();
        let err = engine.restore_node( playlists, &stored ).await.unwrap_err();
        assert!( err.is_fatal() );
    }


    #[tokio::test]
    async fn test_unregistered_child_handler_is_fatal() {
        let mut registry = NodeHandlerRegistry::new();
        registry.inherit( NodeKind::Root, NodeKind::Base, |_| NodeHandlerOverrides {
            has_children: Some( Resolver::Const( true ) ),
            get_children: Some( Arc::new( |_| async { Ok( vec![ ChildSpec::handler_only( NodeKind::Playlists ) ] ) }.boxed() ) ),
            ..Default::default()
        } ).unwrap();
        let engine = NodeEngine::new(
            Arc::new( registry ),
            Arc::new( sample_library() ),
            Arc::new( StateStore::in_memory() ),
            EngineConfig::default(),
        ).unwrap();

        let err = engine.load_children( engine.root() ).await.unwrap_err();
        assert_eq!( err, TreeError::UnregisteredHandler( NodeKind::Playlists ) );
        assert!( engine.children( engine.root() ).is_empty() );
        assert!( !engine.is_expanding( engine.root() ) );
    }


    #[tokio::test]
    async fn test_menu_and_delete() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.load_children( playlists ).await.unwrap();
        let favs = engine.find_child( playlists, "playlist:favs" ).unwrap();

        let actions: Vec<_> = engine.build_menu( favs ).unwrap().into_iter().map( |i| i.action ).collect();
        assert_eq!( actions, vec![
            MenuAction::Expand,
            MenuAction::Refresh,
            MenuAction::ViewAs( crate::view_handler::ViewKind::PlaylistTracklist ),
            MenuAction::Delete,
        ] );

        let outcome = engine.execute_menu( favs, MenuAction::Delete ).await.unwrap();
        assert_eq!( outcome, MenuOutcome::Removed );
        assert!( !engine.contains( favs ) );
        assert!( lib.get_object( ObjectType::Playlist, "favs" ).await.unwrap().is_none() );

        let err = engine.execute_menu( playlists, MenuAction::Delete ).await.unwrap_err();
        assert!( matches!( err, TreeError::Unsupported( _ ) ) );
    }


    #[tokio::test]
    async fn test_disabled_go_to_artist_is_refused() {
        let lib = Arc::new( sample_library() );
        lib.insert( MediaObject::new( ObjectType::Album, "solo", "Solo" ).with_collection( "music" ) );
        let engine = engine_with( lib.clone() );
        let root = engine.root();
        engine.load_children( root ).await.unwrap();
        let music = engine.find_child( root, "collection:music" ).unwrap();
        engine.load_children( music ).await.unwrap();
        let albums = engine.find_child( music, "albums" ).unwrap();
        engine.load_children( albums ).await.unwrap();

        let solo = engine.find_child( albums, "album:solo" ).unwrap();
        let go = engine.build_menu( solo ).unwrap().into_iter().find( |i| i.action == MenuAction::GoToArtist ).unwrap();
        assert!( !go.enabled );
        let err = engine.execute_menu( solo, MenuAction::GoToArtist ).await.unwrap_err();
        assert!( matches!( err, TreeError::Unsupported( _ ) ) );

        let kob = engine.find_child( albums, "album:kob" ).unwrap();
        match engine.execute_menu( kob, MenuAction::GoToArtist ).await.unwrap() {
            MenuOutcome::Navigate( artist ) => assert_eq!( artist.persistent_info, "miles" ),
            other => panic!( "unexpected outcome {:?}", other ),
        }
    }


    #[tokio::test]
    async fn test_view_as_menu_persists_choice() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib );
        let playlists = playlists_node( &engine ).await;
        engine.load_children( playlists ).await.unwrap();
        let favs = engine.find_child( playlists, "playlist:favs" ).unwrap();

        let view = crate::view_handler::ViewKind::Tracklist;
        let outcome = engine.execute_menu( favs, MenuAction::ViewAs( view ) ).await.unwrap();
        assert_eq!( outcome, MenuOutcome::ShowView );
        assert_eq!( engine.node_handler_state( NodeKind::Playlist, None ).view_as, Some( view ) );
    }


    #[tokio::test]
    async fn test_drop_tracks_on_playlist() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let playlists = playlists_node( &engine ).await;
        engine.load_children( playlists ).await.unwrap();
        let favs = engine.find_child( playlists, "playlist:favs" ).unwrap();

        let track = lib.get_object( ObjectType::Track, "t2" ).await.unwrap().unwrap();
        let payload = DragPayload { objects: vec![ track ] };
        assert_eq!( engine.drop_mode( favs, &payload ).unwrap(), DropMode::Copy );
        assert_eq!( engine.drop_mode( playlists, &payload ).unwrap(), DropMode::None );

        engine.drop_objects( favs, payload ).await.unwrap();
        let favs_object = engine.info( favs ).unwrap().data_source.object().cloned().unwrap();
        let tracks = lib.query( Query::Tracks { scope: favs_object } ).await.unwrap();
        assert_eq!( tracks.len(), 3 );
    }


    #[tokio::test]
    async fn test_collection_branches_follow_stored_items() {
        let lib = Arc::new( sample_library() );
        let engine = engine_with( lib.clone() );
        let root = engine.root();
        engine.load_children( root ).await.unwrap();
        let music = engine.find_child( root, "collection:music" ).unwrap();
        assert_eq!( engine.load_children( music ).await.unwrap().len(), 6 );

        let collection = lib.get_object( ObjectType::Collection, "music" ).await.unwrap().unwrap();
        let mut items = engine.media_tree_items( &collection ).await.unwrap();
        items.retain( |i| i.kind != NodeKind::Years );
        items.reverse();
        engine.set_media_tree_items( &collection, &items );

        let children = engine.load_children( music ).await.unwrap();
        assert_eq!( children.len(), 5 );
        assert_eq!( engine.info( children[ 0 ] ).unwrap().kind, NodeKind::AllSeries );
        assert_eq!( engine.info( children[ 0 ] ).unwrap().collection_id(), Some( "music" ) );
    }
}
