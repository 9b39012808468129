//! Per-view runtime state and the view host.
//!
//! `ViewData` belongs to one displayed node. It owns the data-source cache,
//! ties asynchronous work to the view's lifetime and carries the state its
//! sub-views share (column browser filters, the shared artist source).
//!
//! `ViewHost` picks the view handler for a node, creates the controls for the
//! primary view and its visible sub-views and runs `on_show`/`on_hide`.

use std::collections::{ HashMap, VecDeque };
use std::future::Future;
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{ broadcast, mpsc };
use tokio_util::sync::CancellationToken;

use crate::column_browser::{ ColumnBrowser, ColumnField };
use crate::error::{ TreeError, TreeResult };
use crate::library::MediaLibrary;
use crate::list::MediaList;
use crate::node::NodeId;
use crate::node_engine::NodeEngine;
use crate::node_handler::NodeInfo;
use crate::shared_source::{ Released, SharedSources, SourceId };
use crate::store::{ NodeHandlerState, ViewHandlerState };
use crate::view_handler::{ Activation, Control, ShowCtx, ViewHandler, ViewHandlerRegistry, ViewKind };


const CACHE_OBSERVER_CAPACITY: usize = 32;

/// Views kept alive for nodes shown recently.
const HISTORY_CAPACITY: usize = 8;


/// Slots of the data-source cache.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum CacheKey {
    Tracklist,
    TracklistUnfiltered,
    Albumlist,
    AlbumlistUnfiltered,
    Personlist,
    PersonlistUnfiltered,
}


impl CacheKey {
    pub fn id( &self ) -> &'static str {
        match self {
            CacheKey::Tracklist => "tracklist",
            CacheKey::TracklistUnfiltered => "tracklist_unfiltered",
            CacheKey::Albumlist => "albumlist",
            CacheKey::AlbumlistUnfiltered => "albumlist_unfiltered",
            CacheKey::Personlist => "personlist",
            CacheKey::PersonlistUnfiltered => "personlist_unfiltered",
        }
    }


    /// Slot holding the unfiltered copy of this list.
    pub fn unfiltered( &self ) -> CacheKey {
        match self {
            CacheKey::Tracklist | CacheKey::TracklistUnfiltered => CacheKey::TracklistUnfiltered,
            CacheKey::Albumlist | CacheKey::AlbumlistUnfiltered => CacheKey::AlbumlistUnfiltered,
            CacheKey::Personlist | CacheKey::PersonlistUnfiltered => CacheKey::PersonlistUnfiltered,
        }
    }
}


/// Lists computed for a view.
#[derive( Debug, Default )]
pub struct DataSourceCache {
    pub tracklist: Option<MediaList>,
    pub tracklist_unfiltered: Option<MediaList>,
    pub albumlist: Option<MediaList>,
    pub albumlist_unfiltered: Option<MediaList>,
    pub personlist: Option<MediaList>,
    pub personlist_unfiltered: Option<MediaList>,
}


impl DataSourceCache {
    fn slot( &mut self, key: CacheKey ) -> &mut Option<MediaList> {
        match key {
            CacheKey::Tracklist => &mut self.tracklist,
            CacheKey::TracklistUnfiltered => &mut self.tracklist_unfiltered,
            CacheKey::Albumlist => &mut self.albumlist,
            CacheKey::AlbumlistUnfiltered => &mut self.albumlist_unfiltered,
            CacheKey::Personlist => &mut self.personlist,
            CacheKey::PersonlistUnfiltered => &mut self.personlist_unfiltered,
        }
    }


    pub fn get( &self, key: CacheKey ) -> Option<&MediaList> {
        match key {
            CacheKey::Tracklist => self.tracklist.as_ref(),
            CacheKey::TracklistUnfiltered => self.tracklist_unfiltered.as_ref(),
            CacheKey::Albumlist => self.albumlist.as_ref(),
            CacheKey::AlbumlistUnfiltered => self.albumlist_unfiltered.as_ref(),
            CacheKey::Personlist => self.personlist.as_ref(),
            CacheKey::PersonlistUnfiltered => self.personlist_unfiltered.as_ref(),
        }
    }
}


struct PromiseEntry {
    generation: u64,
    token: CancellationToken,
}


/// Tracks in-flight work by id. Registering work under an id cancels the
/// previous work with that id, and only the latest registration may deliver
/// its result.
pub struct PromiseTracker {
    entries: Mutex<HashMap<String, PromiseEntry>>,
    next_generation: AtomicU64,
    parent: CancellationToken,
}


impl PromiseTracker {
    pub fn new( parent: CancellationToken ) -> Self {
        Self {
            entries: Mutex::new( HashMap::new() ),
            next_generation: AtomicU64::new( 0 ),
            parent,
        }
    }


    /// Runs `fut` under `id`. Returns `None` if it was canceled or
    /// superseded before finishing.
    pub async fn promise<T, F>( &self, id: &str, fut: F ) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let ( generation, token ) = self.register( id );
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            value = fut => Some( value ),
        };
        if self.finish( id, generation ) {
            result
        } else {
            tracing::trace!( "Dropped stale result for promise {}", id );
            None
        }
    }


    fn register( &self, id: &str ) -> ( u64, CancellationToken ) {
        let generation = self.next_generation.fetch_add( 1, Ordering::SeqCst ) + 1;
        let token = self.parent.child_token();
        let entry = PromiseEntry { generation, token: token.clone() };
        if let Some( old ) = self.entries.lock().insert( id.to_string(), entry ) {
            old.token.cancel();
        }
        ( generation, token )
    }


    fn finish( &self, id: &str, generation: u64 ) -> bool {
        let mut entries = self.entries.lock();
        match entries.get( id ) {
            Some( entry ) if entry.generation == generation => {
                entries.remove( id );
                true
            }
            _ => false,
        }
    }


    pub fn cancel_promise( &self, id: &str ) {
        if let Some( entry ) = self.entries.lock().remove( id ) {
            entry.token.cancel();
            tracing::trace!( "Canceled promise {}", id );
        }
    }


    pub fn cancel_all( &self ) {
        for ( _, entry ) in self.entries.lock().drain() {
            entry.token.cancel();
        }
    }


    pub fn pending( &self ) -> usize {
        self.entries.lock().len()
    }
}


struct ViewInner {
    node: NodeInfo,
    engine: NodeEngine,
    sources: Arc<Mutex<SharedSources>>,
    cache: Mutex<DataSourceCache>,
    cache_observer: broadcast::Sender<CacheKey>,
    promises: PromiseTracker,
    token: CancellationToken,
    column_browser: Mutex<Option<ColumnBrowser>>,
    artist_source: Mutex<Option<SourceId>>,
    activations: mpsc::UnboundedSender<Activation>,
}


/// Runtime state of one open view. Clones share the same view.
#[derive( Clone )]
pub struct ViewData {
    inner: Arc<ViewInner>,
}


impl std::fmt::Debug for ViewData {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "ViewData" )
            .field( "node", &self.inner.node.id )
            .field( "kind", &self.inner.node.kind )
            .field( "cache", &*self.inner.cache.lock() )
            .finish_non_exhaustive()
    }
}


impl ViewData {
    pub fn new(
        engine: NodeEngine,
        node: NodeInfo,
        sources: Arc<Mutex<SharedSources>>,
        activations: mpsc::UnboundedSender<Activation>,
    ) -> Self {
        let token = CancellationToken::new();
        let ( cache_observer, _ ) = broadcast::channel( CACHE_OBSERVER_CAPACITY );
        Self {
            inner: Arc::new( ViewInner {
                node,
                engine,
                sources,
                cache: Mutex::new( DataSourceCache::default() ),
                cache_observer,
                promises: PromiseTracker::new( token.clone() ),
                token,
                column_browser: Mutex::new( None ),
                artist_source: Mutex::new( None ),
                activations,
            } ),
        }
    }


    pub fn node( &self ) -> &NodeInfo {
        &self.inner.node
    }


    pub fn engine( &self ) -> &NodeEngine {
        &self.inner.engine
    }


    pub fn library( &self ) -> &Arc<dyn MediaLibrary> {
        self.inner.engine.library()
    }


    pub fn sources( &self ) -> &Arc<Mutex<SharedSources>> {
        &self.inner.sources
    }


    /// Hands an item the user picked to the host.
    pub fn activate( &self, activation: Activation ) {
        tracing::debug!( "Activating {:?}", activation );
        if self.inner.activations.send( activation ).is_err() {
            tracing::warn!( "View host is gone, activation dropped" );
        }
    }


    pub fn promises( &self ) -> &PromiseTracker {
        &self.inner.promises
    }


    /// Canceled when the view is closed.
    pub fn token( &self ) -> CancellationToken {
        self.inner.token.clone()
    }


    pub fn is_closed( &self ) -> bool {
        self.inner.token.is_cancelled()
    }


    pub fn cached( &self, key: CacheKey ) -> Option<MediaList> {
        self.inner.cache.lock().get( key ).cloned()
    }


    /// Stores `list` under `key`. Work still registered under the same key
    /// is canceled first so it cannot overwrite the newer value.
    pub fn set_cache( &self, key: CacheKey, list: MediaList ) {
        self.inner.promises.cancel_promise( key.id() );
        self.store_cache( key, list );
    }


    fn store_cache( &self, key: CacheKey, list: MediaList ) {
        *self.inner.cache.lock().slot( key ) = Some( list );
        self.notify( key );
    }


    /// Computes a list under the promise id of `key` and caches it. Returns
    /// `Ok( None )` when newer work for the same key won.
    pub async fn cache_async<F>( &self, key: CacheKey, fut: F ) -> TreeResult<Option<MediaList>>
    where
        F: Future<Output = TreeResult<MediaList>>,
    {
        match self.inner.promises.promise( key.id(), fut ).await {
            Some( Ok( list ) ) => {
                self.store_cache( key, list.clone() );
                Ok( Some( list ) )
            }
            Some( Err( e ) ) => Err( e ),
            None => Ok( None ),
        }
    }


    /// Returns the cached list, creating it with `make` on a miss.
    pub fn get_or_create( &self, key: CacheKey, make: impl FnOnce() -> MediaList ) -> MediaList {
        if let Some( list ) = self.cached( key ) {
            return list;
        }
        let list = make();
        self.set_cache( key, list.clone() );
        list
    }


    /// Drops the cached list and any work computing it.
    pub fn invalidate( &self, key: CacheKey ) {
        self.inner.promises.cancel_promise( key.id() );
        let removed = self.inner.cache.lock().slot( key ).take();
        if removed.is_some() {
            tracing::debug!( "Invalidated {} of node {}", key.id(), self.inner.node.persistent_id );
            self.notify( key );
        }
    }


    pub fn take_cache( &self, key: CacheKey ) -> Option<MediaList> {
        self.inner.cache.lock().slot( key ).take()
    }


    /// Moves fresh content into the cached list without replacing it.
    ///
    /// With a column browser attached, the unfiltered copy receives the
    /// content and observers of the unfiltered slot reapply the filters.
    pub fn update_source( &self, key: CacheKey, fresh: &MediaList ) {
        let unfiltered_key = key.unfiltered();
        let ( unfiltered, live ) = {
            let cache = self.inner.cache.lock();
            let unfiltered = if unfiltered_key != key { cache.get( unfiltered_key ).cloned() } else { None };
            ( unfiltered, cache.get( key ).cloned() )
        };

        if let Some( unfiltered ) = unfiltered {
            unfiltered.use_list( fresh );
            self.notify( unfiltered_key );
        } else if let Some( live ) = live {
            live.use_list( fresh );
            self.notify( key );
        } else {
            self.set_cache( key, fresh.clone() );
        }
    }


    /// Re-reads a list into the cache, superseding older refreshes of the
    /// same slot.
    pub async fn refresh_list( &self, key: CacheKey, fresh: MediaList ) {
        let loaded = self.inner.promises.promise( key.id(), async move {
            fresh.when_loaded().await;
            fresh
        } ).await;
        if let Some( fresh ) = loaded {
            self.update_source( key, &fresh );
        }
    }


    /// Drops every cached list that never finished loading.
    pub fn release_unloaded( &self ) {
        let keys = [
            CacheKey::Tracklist,
            CacheKey::TracklistUnfiltered,
            CacheKey::Albumlist,
            CacheKey::AlbumlistUnfiltered,
            CacheKey::Personlist,
            CacheKey::PersonlistUnfiltered,
        ];
        for key in keys {
            let unloaded = self.cached( key ).is_some_and( |l| !l.is_loaded() );
            if unloaded {
                self.invalidate( key );
            }
        }
    }


    /// Runs `fut` until it ends or `control` is hidden.
    pub fn listen<F>( &self, control: &Control, fut: F )
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = control.token();
        tokio::spawn( async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        } );
    }


    pub fn subscribe_cache( &self ) -> broadcast::Receiver<CacheKey> {
        self.inner.cache_observer.subscribe()
    }


    fn notify( &self, key: CacheKey ) {
        let _ = self.inner.cache_observer.send( key );
    }


    pub fn set_column_browser( &self, browser: Option<ColumnBrowser> ) {
        *self.inner.column_browser.lock() = browser;
    }


    /// Runs `f` against the attached column browser, if any.
    pub fn with_column_browser<R>( &self, f: impl FnOnce( &mut ColumnBrowser ) -> R ) -> Option<R> {
        self.inner.column_browser.lock().as_mut().map( f )
    }


    pub fn set_filter( &self, field: ColumnField, value: impl Into<String> ) -> TreeResult<()> {
        let value = value.into();
        self.with_column_browser( |b| b.set_filter( field, value ) )
            .ok_or_else( || TreeError::Unsupported( "column browser is hidden".into() ) )
    }


    pub fn clear_filter( &self ) -> TreeResult<()> {
        self.with_column_browser( |b| b.clear_filter() )
            .ok_or_else( || TreeError::Unsupported( "column browser is hidden".into() ) )
    }


    /// Detaches the column browser, restoring the unfiltered content.
    pub fn detach_column_browser( &self ) {
        let browser = self.inner.column_browser.lock().take();
        if let Some( browser ) = browser {
            browser.detach( self );
        }
    }


    pub fn artist_source( &self ) -> Option<SourceId> {
        *self.inner.artist_source.lock()
    }


    /// Takes a reference on the shared source of `artist` for this view.
    pub fn acquire_artist_source( &self, artist: &crate::domain::MediaRef ) -> SourceId {
        let mut held = self.inner.artist_source.lock();
        if let Some( id ) = *held {
            return id;
        }
        let id = self.inner.sources.lock().acquire_artist( self.library(), artist );
        *held = Some( id );
        id
    }


    /// Gives back the view's reference on its artist source.
    pub fn release_artist_source( &self ) -> Option<Released> {
        let id = self.inner.artist_source.lock().take()?;
        match self.inner.sources.lock().release( id ) {
            Ok( released ) => Some( released ),
            Err( e ) => {
                tracing::warn!( "Releasing artist source failed: {}", e );
                None
            }
        }
    }


    /// Ends the view: stops its work and gives back shared sources.
    pub fn close( &self ) {
        self.inner.promises.cancel_all();
        self.inner.token.cancel();
        self.release_artist_source();
        tracing::debug!( "Closed view of node {}", self.inner.node.persistent_id );
    }
}


/// The view currently shown.
#[derive( Debug )]
pub struct ActiveView {
    pub view: ViewData,
    pub kind: ViewKind,
    pub main: Control,

    /// Visible sub-views in declaration order.
    pub sub_views: Vec<( ViewKind, Control )>,
}


impl ActiveView {
    pub fn node( &self ) -> NodeId {
        self.view.node().id
    }


    pub fn sub_view( &self, kind: ViewKind ) -> Option<&Control> {
        self.sub_views.iter().find( |( k, _ )| *k == kind ).map( |( _, c )| c )
    }
}


/// Shows nodes through their view handlers.
pub struct ViewHost {
    engine: NodeEngine,
    registry: Arc<ViewHandlerRegistry>,
    sources: Arc<Mutex<SharedSources>>,

    /// Most recent first.
    history: VecDeque<( NodeId, ViewData )>,
    active: Option<ActiveView>,
    activation_tx: mpsc::UnboundedSender<Activation>,
    activation_rx: mpsc::UnboundedReceiver<Activation>,
}


impl ViewHost {
    pub fn new( engine: NodeEngine, registry: Arc<ViewHandlerRegistry> ) -> Self {
        let ( activation_tx, activation_rx ) = mpsc::unbounded_channel();
        Self {
            engine,
            registry,
            sources: Arc::new( Mutex::new( SharedSources::new() ) ),
            history: VecDeque::new(),
            active: None,
            activation_tx,
            activation_rx,
        }
    }


    pub fn engine( &self ) -> &NodeEngine {
        &self.engine
    }


    pub fn registry( &self ) -> &Arc<ViewHandlerRegistry> {
        &self.registry
    }


    pub fn sources( &self ) -> &Arc<Mutex<SharedSources>> {
        &self.sources
    }


    pub fn active( &self ) -> Option<&ActiveView> {
        self.active.as_ref()
    }


    /// Next item picked in any view, if one is waiting.
    pub fn next_activation( &mut self ) -> Option<Activation> {
        self.activation_rx.try_recv().ok()
    }


    /// Waits for the next item picked in any view.
    pub async fn recv_activation( &mut self ) -> Option<Activation> {
        self.activation_rx.recv().await
    }


    pub fn current_node( &self ) -> Option<NodeId> {
        self.active.as_ref().map( ActiveView::node )
    }


    /// View handler a node is shown with: the persisted choice if the node
    /// still offers it, else the node's first view.
    pub fn preferred_view( &self, id: NodeId ) -> TreeResult<ViewKind> {
        let handler = self.engine.handler( id )?;
        let info = self.engine.info( id )?;
        let state = self.engine.node_handler_state( info.kind, info.collection_id() );
        if let Some( kind ) = state.view_as.filter( |k| handler.view_as.contains( k ) ) {
            return Ok( kind );
        }
        handler.view_as.first()
            .copied()
            .ok_or_else( || TreeError::Unsupported( format!( "{} has no views", info.kind ) ) )
    }


    /// Sub-views of `handler` that are currently visible.
    pub fn visible_sub_views( &self, handler: &ViewHandler ) -> Vec<ViewKind> {
        let hidden = self.hidden_sub_views( handler );
        handler.sub_views.iter().copied().filter( |s| !hidden.contains( s ) ).collect()
    }


    fn hidden_sub_views( &self, handler: &ViewHandler ) -> Vec<ViewKind> {
        self.engine.view_handler_state( &handler.state_key() )
            .hidden_sub_views
            .unwrap_or_else( || handler.hidden_sub_views.clone() )
    }


    /// Shows `id` with its preferred view.
    pub async fn show_node( &mut self, id: NodeId ) -> TreeResult<&ActiveView> {
        let kind = self.preferred_view( id )?;
        self.show( id, kind, false ).await
    }


    /// Shows the current node with another of its views and remembers the
    /// choice.
    pub async fn switch_view( &mut self, kind: ViewKind ) -> TreeResult<&ActiveView> {
        let id = self.current_node().ok_or_else( || TreeError::Unsupported( "no active view".into() ) )?;
        let handler = self.engine.handler( id )?;
        if !handler.view_as.contains( &kind ) {
            return Err( TreeError::Unsupported( format!( "{} cannot be shown as {}", handler.kind, kind ) ) );
        }
        let info = self.engine.info( id )?;
        self.engine.set_node_handler_state( info.kind, info.collection_id(), &NodeHandlerState { view_as: Some( kind ) } );
        self.show( id, kind, true ).await
    }


    async fn show( &mut self, id: NodeId, kind: ViewKind, single_view_change: bool ) -> TreeResult<&ActiveView> {
        self.hide();
        let view = self.view_for( id )?;
        let handler = self.registry.get( kind )?;

        let main = Control::new( handler.control_class, kind, view.token().child_token() );
        let shown = ( handler.on_show )( ShowCtx {
            control: main.clone(),
            view: view.clone(),
            main_control: None,
            only_data_init: false,
            single_view_change,
        } ).await;
        if let Err( e ) = shown {
            ( handler.on_hide )( &view, &main );
            return Err( e );
        }

        let mut sub_views: Vec<( ViewKind, Control )> = Vec::new();
        for sub in self.visible_sub_views( &handler ) {
            match self.show_sub_view( &view, &main, sub, single_view_change ).await {
                Ok( control ) => sub_views.push( ( sub, control ) ),
                Err( e ) => {
                    self.hide_controls( &view, &main, kind, &sub_views );
                    return Err( e );
                }
            }
        }

        tracing::info!( "Showing node {} as {}", view.node().persistent_id, kind );
        let active = self.active.insert( ActiveView { view, kind, main, sub_views } );
        Ok( &*active )
    }


    async fn show_sub_view(
        &self,
        view: &ViewData,
        main: &Control,
        sub: ViewKind,
        single_view_change: bool,
    ) -> TreeResult<Control> {
        let handler = self.registry.get( sub )?;
        let control = Control::new( handler.control_class, sub, view.token().child_token() );
        let shown = ( handler.on_show )( ShowCtx {
            control: control.clone(),
            view: view.clone(),
            main_control: Some( main.clone() ),
            only_data_init: false,
            single_view_change,
        } ).await;
        match shown {
            Ok(()) => Ok( control ),
            Err( e ) => {
                ( handler.on_hide )( view, &control );
                Err( e )
            }
        }
    }


    /// Shows or hides a sub-view of the active view. Returns whether it is
    /// now visible.
    pub async fn toggle_sub_view( &mut self, sub: ViewKind ) -> TreeResult<bool> {
        let ( view, main, kind ) = match &self.active {
            Some( active ) => ( active.view.clone(), active.main.clone(), active.kind ),
            None => return Err( TreeError::Unsupported( "no active view".into() ) ),
        };
        let handler = self.registry.get( kind )?;
        if !handler.sub_views.contains( &sub ) {
            return Err( TreeError::Unsupported( format!( "{} has no {} sub-view", kind, sub ) ) );
        }

        let mut hidden = self.hidden_sub_views( &handler );
        let visible = !hidden.contains( &sub );
        if visible {
            let control = self.active.as_mut()
                .and_then( |a| a.sub_views.iter().position( |( k, _ )| *k == sub ).map( |i| a.sub_views.remove( i ).1 ) );
            if let Some( control ) = control {
                let sub_handler = self.registry.get( sub )?;
                ( sub_handler.on_hide )( &view, &control );
                control.token().cancel();
            }
            hidden.push( sub );
        } else {
            let control = self.show_sub_view( &view, &main, sub, true ).await?;
            hidden.retain( |k| *k != sub );
            if let Some( active ) = self.active.as_mut() {
                active.sub_views.push( ( sub, control ) );
                let order = &handler.sub_views;
                active.sub_views.sort_by_key( |( k, _ )| order.iter().position( |s| s == k ) );
            }
        }

        self.engine.set_view_handler_state( &handler.state_key(), &ViewHandlerState { hidden_sub_views: Some( hidden ) } );
        tracing::debug!( "Sub-view {} of {} visible: {}", sub, kind, !visible );
        Ok( !visible )
    }


    /// Hides the active view. Its `ViewData` stays cached for the node.
    pub fn hide( &mut self ) {
        if let Some( active ) = self.active.take() {
            self.hide_controls( &active.view, &active.main, active.kind, &active.sub_views );
            active.view.promises().cancel_all();
        }
    }


    fn hide_controls( &self, view: &ViewData, main: &Control, kind: ViewKind, sub_views: &[( ViewKind, Control )] ) {
        for ( sub, control ) in sub_views.iter().rev() {
            match self.registry.get( *sub ) {
                Ok( handler ) => ( handler.on_hide )( view, control ),
                Err( e ) => tracing::error!( "Hiding sub-view failed: {}", e ),
            }
            control.token().cancel();
        }
        match self.registry.get( kind ) {
            Ok( handler ) => ( handler.on_hide )( view, main ),
            Err( e ) => tracing::error!( "Hiding view failed: {}", e ),
        }
        main.token().cancel();
    }


    /// Fills the preferred view's cache for `id` without showing it. A
    /// shared source the data-only show took is given back; cached lists
    /// stay.
    pub async fn prefetch( &mut self, id: NodeId ) -> TreeResult<()> {
        let kind = self.preferred_view( id )?;
        let view = self.view_for( id )?;
        let handler = self.registry.get( kind )?;
        let control = Control::new( handler.control_class, kind, view.token().child_token() );
        let held = view.artist_source().is_some();
        let result = ( handler.on_show )( ShowCtx {
            control: control.clone(),
            view: view.clone(),
            main_control: None,
            only_data_init: true,
            single_view_change: false,
        } ).await;
        control.token().cancel();
        if !held {
            view.release_artist_source();
        }
        result
    }


    /// The view for `id`, reused from history when the node was shown before.
    pub fn view_for( &mut self, id: NodeId ) -> TreeResult<ViewData> {
        self.prune_history();
        if let Some( pos ) = self.history.iter().position( |( n, _ )| *n == id ) {
            if let Some( entry ) = self.history.remove( pos ) {
                let view = entry.1.clone();
                self.history.push_front( entry );
                return Ok( view );
            }
        }

        let view = ViewData::new(
            self.engine.clone(),
            self.engine.info( id )?,
            self.sources.clone(),
            self.activation_tx.clone(),
        );
        self.history.push_front( ( id, view.clone() ) );
        while self.history.len() > HISTORY_CAPACITY {
            if let Some( ( _, evicted ) ) = self.history.pop_back() {
                evicted.close();
            }
        }
        Ok( view )
    }


    /// Closes views whose node was removed from the tree.
    fn prune_history( &mut self ) {
        let engine = &self.engine;
        let active = self.active.as_ref().map( ActiveView::node );
        self.history.retain( |( id, view )| {
            let keep = engine.contains( *id ) || Some( *id ) == active;
            if !keep {
                view.close();
            }
            keep
        } );
    }


    /// Number of views kept for reuse.
    pub fn history_len( &self ) -> usize {
        self.history.len()
    }
}


#[cfg( test )]
pub( crate ) mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::ObjectType;
    use crate::library::tests::sample_library;
    use crate::library::MemoryLibrary;
    use crate::node_handler::NodeHandlerRegistry;
    use crate::store::StateStore;
    use crate::view_handler::ControlSource;
    use std::time::Duration;


    pub fn test_engine( lib: Arc<MemoryLibrary> ) -> NodeEngine {
        NodeEngine::new(
            Arc::new( NodeHandlerRegistry::with_defaults().unwrap() ),
            lib,
            Arc::new( StateStore::in_memory() ),
            EngineConfig::default(),
        ).unwrap()
    }


    /// Follows persistent ids from the root, loading each level.
    pub async fn node_at( engine: &NodeEngine, path: &[&str] ) -> NodeId {
        let mut id = engine.root();
        for pid in path {
            engine.load_children( id ).await.unwrap();
            id = engine.find_child( id, pid ).unwrap();
        }
        id
    }


    /// A view of the "favs" playlist node over the sample library.
    pub async fn test_view() -> ( ViewData, Arc<MemoryLibrary> ) {
        let lib = Arc::new( sample_library() );
        let engine = test_engine( lib.clone() );
        let id = node_at( &engine, &[ "playlists", "playlist:favs" ] ).await;
        let info = engine.info( id ).unwrap();
        let ( activations, _ ) = mpsc::unbounded_channel();
        ( ViewData::new( engine, info, Arc::new( Mutex::new( SharedSources::new() ) ), activations ), lib )
    }


    pub fn test_host( engine: NodeEngine ) -> ViewHost {
        ViewHost::new( engine, Arc::new( ViewHandlerRegistry::with_defaults().unwrap() ) )
    }


    fn delayed( items: usize, ms: u64 ) -> impl Future<Output = TreeResult<MediaList>> {
        async move {
            tokio::time::sleep( Duration::from_millis( ms ) ).await;
            let list = MediaList::new();
            for i in 0..items {
                list.add( crate::domain::MediaObject::new( ObjectType::Track, format!( "x{}", i ), "x" ).into_ref() );
            }
            list.set_loaded();
            Ok( list )
        }
    }


    #[tokio::test( start_paused = true )]
    async fn test_latest_cache_write_wins() {
        let ( view, _lib ) = test_view().await;

        let slow = {
            let view = view.clone();
            tokio::spawn( async move { view.cache_async( CacheKey::Tracklist, delayed( 1, 200 ) ).await } )
        };
        tokio::time::sleep( Duration::from_millis( 10 ) ).await;
        let fast = view.cache_async( CacheKey::Tracklist, delayed( 2, 50 ) ).await.unwrap();

        assert!( slow.await.unwrap().unwrap().is_none() );
        let fast = fast.unwrap();
        let cached = view.cached( CacheKey::Tracklist ).unwrap();
        assert!( cached.ptr_eq( &fast ) );
        assert_eq!( cached.len(), 2 );
        assert_eq!( view.promises().pending(), 0 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_set_cache_cancels_pending_write() {
        let ( view, _lib ) = test_view().await;
        let pending = {
            let view = view.clone();
            tokio::spawn( async move { view.cache_async( CacheKey::Albumlist, delayed( 3, 100 ) ).await } )
        };
        tokio::time::sleep( Duration::from_millis( 10 ) ).await;

        let direct = MediaList::from_items( Vec::new() );
        view.set_cache( CacheKey::Albumlist, direct.clone() );

        assert!( pending.await.unwrap().unwrap().is_none() );
        tokio::time::sleep( Duration::from_millis( 200 ) ).await;
        assert!( view.cached( CacheKey::Albumlist ).unwrap().ptr_eq( &direct ) );
    }


    #[tokio::test]
    async fn test_update_source_keeps_identity() {
        let ( view, _lib ) = test_view().await;
        let live = MediaList::from_items( Vec::new() );
        view.set_cache( CacheKey::Tracklist, live.clone() );
        let mut observer = view.subscribe_cache();

        let fresh = delayed( 3, 0 ).await.unwrap();
        view.update_source( CacheKey::Tracklist, &fresh );

        let cached = view.cached( CacheKey::Tracklist ).unwrap();
        assert!( cached.ptr_eq( &live ) );
        assert_eq!( live.len(), 3 );
        assert_eq!( observer.try_recv().unwrap(), CacheKey::Tracklist );
    }


    #[tokio::test]
    async fn test_release_unloaded_drops_half_loaded_lists() {
        let ( view, _lib ) = test_view().await;
        view.set_cache( CacheKey::Tracklist, MediaList::new() );
        view.set_cache( CacheKey::Personlist, MediaList::from_items( Vec::new() ) );

        view.release_unloaded();
        assert!( view.cached( CacheKey::Tracklist ).is_none() );
        assert!( view.cached( CacheKey::Personlist ).is_some() );
    }


    #[tokio::test]
    async fn test_show_node_uses_first_view_and_hidden_defaults() {
        let lib = Arc::new( sample_library() );
        let engine = test_engine( lib );
        let tracks = node_at( &engine, &[ "collection:music", "all_tracks" ] ).await;
        let mut host = test_host( engine );

        let active = host.show_node( tracks ).await.unwrap();
        assert_eq!( active.kind, ViewKind::Tracklist );
        assert!( active.sub_view( ViewKind::StatusBar ).is_some() );
        assert!( active.sub_view( ViewKind::ColumnBrowser ).is_none() );

        let list = active.main.list().unwrap();
        list.when_loaded().await;
        assert_eq!( list.len(), 5 );
        assert!( active.view.cached( CacheKey::Tracklist ).unwrap().ptr_eq( &list ) );
    }


    #[tokio::test]
    async fn test_switch_view_persists_choice() {
        let lib = Arc::new( sample_library() );
        let engine = test_engine( lib );
        let albums = node_at( &engine, &[ "collection:music", "albums" ] ).await;
        let mut host = test_host( engine.clone() );

        assert_eq!( host.show_node( albums ).await.unwrap().kind, ViewKind::AlbumGrid );
        assert_eq!( host.switch_view( ViewKind::Tracklist ).await.unwrap().kind, ViewKind::Tracklist );
        assert!( host.switch_view( ViewKind::ArtistView ).await.is_err() );

        host.hide();
        assert_eq!( host.show_node( albums ).await.unwrap().kind, ViewKind::Tracklist );
        let state = engine.node_handler_state( crate::node_handler::NodeKind::Albums, Some( "music" ) );
        assert_eq!( state.view_as, Some( ViewKind::Tracklist ) );
    }


    #[tokio::test]
    async fn test_toggle_sub_view_is_shared_by_state_key() {
        let lib = Arc::new( sample_library() );
        let engine = test_engine( lib );
        let tracks = node_at( &engine, &[ "collection:music", "all_tracks" ] ).await;
        let folder = node_at( &engine, &[ "folders", "folder:/music" ] ).await;
        let mut host = test_host( engine );

        host.show_node( tracks ).await.unwrap();
        assert!( host.toggle_sub_view( ViewKind::ColumnBrowser ).await.unwrap() );
        assert!( host.active().unwrap().sub_view( ViewKind::ColumnBrowser ).is_some() );
        assert!( host.toggle_sub_view( ViewKind::InfoHeader ).await.unwrap() );
        let order: Vec<ViewKind> = host.active().unwrap().sub_views.iter().map( |( k, _ )| *k ).collect();
        assert_eq!( order, vec![ ViewKind::StatusBar, ViewKind::ColumnBrowser, ViewKind::InfoHeader ] );

        let active = host.show_node( folder ).await.unwrap();
        assert_eq!( active.kind, ViewKind::FolderListView );
        assert!( active.sub_view( ViewKind::ColumnBrowser ).is_some() );

        assert!( !host.toggle_sub_view( ViewKind::ColumnBrowser ).await.unwrap() );
        assert!( host.active().unwrap().sub_view( ViewKind::ColumnBrowser ).is_none() );
        assert!( host.toggle_sub_view( ViewKind::Tracklist ).await.is_err() );
    }


    #[tokio::test]
    async fn test_hide_cancels_controls_and_keeps_cache() {
        let lib = Arc::new( sample_library() );
        let engine = test_engine( lib.clone() );
        let tracks = node_at( &engine, &[ "collection:music", "all_tracks" ] ).await;
        let mut host = test_host( engine );

        let active = host.show_node( tracks ).await.unwrap();
        let main = active.main.clone();
        let list = main.list().unwrap();
        list.when_loaded().await;

        host.hide();
        assert!( main.token().is_cancelled() );
        assert!( matches!( main.source(), ControlSource::Empty ) );

        let before = lib.query_count();
        let again = host.show_node( tracks ).await.unwrap();
        assert!( again.main.list().unwrap().ptr_eq( &list ) );
        assert_eq!( lib.query_count(), before );
        assert_eq!( host.history_len(), 1 );
    }


    #[tokio::test]
    async fn test_prefetch_fills_cache_without_showing() {
        let lib = Arc::new( sample_library() );
        let engine = test_engine( lib );
        let album = node_at( &engine, &[ "collection:music", "albums", "album:kob" ] ).await;
        let mut host = test_host( engine );

        host.prefetch( album ).await.unwrap();
        assert!( host.active().is_none() );
        let view = host.view_for( album ).unwrap();
        let list = view.cached( CacheKey::Tracklist ).unwrap();
        list.when_loaded().await;
        assert_eq!( list.len(), 3 );
    }


    #[tokio::test]
    async fn test_prefetch_gives_back_artist_source() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let miles = node_at( &engine, &[ "collection:music", "artists", "artist:miles" ] ).await;
        let mut host = test_host( engine );
        let sources = host.sources().clone();

        host.prefetch( miles ).await.unwrap();
        assert_eq!( sources.lock().live_count(), 0 );
        assert_eq!( sources.lock().disposed_count(), 1 );

        // A prefetch of the shown view leaves its references alone.
        let id = host.show_node( miles ).await.unwrap().view.artist_source().unwrap();
        host.prefetch( miles ).await.unwrap();
        assert_eq!( sources.lock().ref_count( id ), 2 );

        host.hide();
        assert_eq!( sources.lock().live_count(), 0 );
    }
}
