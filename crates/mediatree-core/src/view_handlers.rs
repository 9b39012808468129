//! Built-in view handlers.
//!
//! ```text
//! Base ─┬─ Tracklist ─┬─ FolderListView
//!       │             ├─ PlaylistTracklist
//!       │             └─ AlbumTracklist
//!       ├─ AlbumGrid ── ArtistGrid
//!       ├─ ArtistView
//!       ├─ NodeList
//!       └─ StatusBar, ColumnBrowser, InfoHeader   (sub-views)
//! ```
//!
//! Every `on_hide` undoes its `on_show`: listeners die with the control's
//! token, shared references are released and half-loaded lists leave the
//! cache.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::{ self, error::RecvError };
use tokio_util::sync::CancellationToken;

use crate::column_browser::ColumnBrowser;
use crate::domain::{ LibraryEvent, MediaObject, MediaRef, ObjectType, Query };
use crate::error::{ TreeError, TreeResult };
use crate::library::{ get_album_list, get_person_list, get_tracklist, query_list, MediaLibrary };
use crate::list::{ ListChange, MediaList };
use crate::node_handler::NodeKind;
use crate::view::{ CacheKey, ViewData };
use crate::view_handler::{
    Control, ControlAction, ControlClass, ControlEvent, ControlSource, HideFn, ShowCtx, ShowFn,
    ViewHandlerOverrides, ViewHandlerRegistry, ViewKind,
};


/// Builds a list of a scope object, filled in the background.
type ListFetch = fn( Arc<dyn MediaLibrary>, MediaRef, CancellationToken ) -> MediaList;


/// Registers every built-in view handler. Parents go first.
pub fn register_all( registry: &mut ViewHandlerRegistry ) -> TreeResult<()> {
    registry.inherit( ViewKind::Tracklist, ViewKind::Base, |parent| ViewHandlerOverrides {
        title: Some( "Track list".into() ),
        control_class: Some( ControlClass::ListView ),
        base_view_type: Some( "list".into() ),
        store_state_key: Some( "tracklist".into() ),
        sub_views: Some( vec![ ViewKind::StatusBar, ViewKind::ColumnBrowser, ViewKind::InfoHeader ] ),
        hidden_sub_views: Some( vec![ ViewKind::ColumnBrowser, ViewKind::InfoHeader ] ),
        on_show: Some( show( tracklist_show ) ),
        on_hide: Some( release_unloaded_after( parent.on_hide.clone() ) ),
        ..Default::default()
    } )?;

    registry.inherit( ViewKind::FolderListView, ViewKind::Tracklist, |_| ViewHandlerOverrides {
        title: Some( "Folder".into() ),
        ..Default::default()
    } )?;

    registry.inherit( ViewKind::PlaylistTracklist, ViewKind::Tracklist, |parent| {
        let sup = parent.on_show.clone();
        ViewHandlerOverrides {
            title: Some( "Playlist".into() ),
            on_show: Some( Arc::new( move |ctx: ShowCtx| {
                let sup = sup.clone();
                async move {
                    sup( ctx.clone() ).await?;
                    if !ctx.only_data_init {
                        ctx.control.add_action( ControlAction::Reorder );
                    }
                    Ok(())
                }.boxed()
            } ) ),
            ..Default::default()
        }
    } )?;

    registry.inherit( ViewKind::AlbumTracklist, ViewKind::Tracklist, |_| ViewHandlerOverrides {
        title: Some( "Album".into() ),
        hidden_sub_views: Some( vec![ ViewKind::ColumnBrowser ] ),
        ..Default::default()
    } )?;

    registry.inherit( ViewKind::AlbumGrid, ViewKind::Base, |parent| ViewHandlerOverrides {
        title: Some( "Album grid".into() ),
        control_class: Some( ControlClass::GridView ),
        base_view_type: Some( "grid".into() ),
        sub_views: Some( vec![ ViewKind::StatusBar, ViewKind::ColumnBrowser ] ),
        hidden_sub_views: Some( vec![ ViewKind::ColumnBrowser ] ),
        on_show: Some( show( album_grid_show ) ),
        on_hide: Some( release_unloaded_after( parent.on_hide.clone() ) ),
        ..Default::default()
    } )?;

    registry.inherit( ViewKind::ArtistGrid, ViewKind::AlbumGrid, |_| ViewHandlerOverrides {
        title: Some( "Artist grid".into() ),
        on_show: Some( show( artist_grid_show ) ),
        ..Default::default()
    } )?;

    registry.inherit( ViewKind::ArtistView, ViewKind::Base, |parent| {
        let sup = parent.on_hide.clone();
        ViewHandlerOverrides {
            title: Some( "Artist".into() ),
            control_class: Some( ControlClass::ArtistPanel ),
            sub_views: Some( vec![ ViewKind::InfoHeader, ViewKind::StatusBar ] ),
            on_show: Some( show( artist_view_show ) ),
            on_hide: Some( Arc::new( move |view: &ViewData, control: &Control| {
                sup( view, control );
                view.release_artist_source();
            } ) ),
            ..Default::default()
        }
    } )?;

    registry.inherit( ViewKind::NodeList, ViewKind::Base, |parent| {
        let sup = parent.on_hide.clone();
        ViewHandlerOverrides {
            title: Some( "Node list".into() ),
            control_class: Some( ControlClass::NodeListView ),
            sub_views: Some( vec![ ViewKind::StatusBar ] ),
            on_show: Some( show( node_list_show ) ),
            on_hide: Some( Arc::new( move |view: &ViewData, control: &Control| {
                sup( view, control );
                if let Err( e ) = view.engine().on_collapsed( view.node().id ) {
                    tracing::debug!( "Node list hidden after its node went away: {}", e );
                }
            } ) ),
            ..Default::default()
        }
    } )?;

    register_sub_views( registry )?;

    tracing::debug!( "Registered built-in view handlers" );
    Ok(())
}


fn register_sub_views( registry: &mut ViewHandlerRegistry ) -> TreeResult<()> {
    registry.inherit( ViewKind::StatusBar, ViewKind::Base, |_| ViewHandlerOverrides {
        title: Some( "Status bar".into() ),
        control_class: Some( ControlClass::StatusBar ),
        is_sub_view: Some( true ),
        on_show: Some( show( status_bar_show ) ),
        ..Default::default()
    } )?;

    registry.inherit( ViewKind::ColumnBrowser, ViewKind::Base, |parent| {
        let sup = parent.on_hide.clone();
        ViewHandlerOverrides {
            title: Some( "Column browser".into() ),
            control_class: Some( ControlClass::ColumnBrowser ),
            is_sub_view: Some( true ),
            on_show: Some( show( column_browser_show ) ),
            on_hide: Some( Arc::new( move |view: &ViewData, control: &Control| {
                sup( view, control );
                view.detach_column_browser();
            } ) ),
            ..Default::default()
        }
    } )?;

    registry.inherit( ViewKind::InfoHeader, ViewKind::Base, |parent| {
        let sup = parent.on_hide.clone();
        ViewHandlerOverrides {
            title: Some( "Info header".into() ),
            control_class: Some( ControlClass::InfoHeader ),
            is_sub_view: Some( true ),
            on_show: Some( show( info_header_show ) ),
            on_hide: Some( Arc::new( move |view: &ViewData, control: &Control| {
                sup( view, control );
                if let Some( id ) = control.take_held_source() {
                    if let Err( e ) = view.sources().lock().release( id ) {
                        tracing::warn!( "Info header held a stale source: {}", e );
                    }
                }
            } ) ),
            ..Default::default()
        }
    } )
}


fn show<F, Fut>( f: F ) -> ShowFn
where
    F: Fn( ShowCtx ) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TreeResult<()>> + Send + 'static,
{
    Arc::new( move |ctx| f( ctx ).boxed() )
}


fn release_unloaded_after( sup: HideFn ) -> HideFn {
    Arc::new( move |view: &ViewData, control: &Control| {
        sup( view, control );
        view.release_unloaded();
    } )
}


/// True when `event` may change the lists shown for `scope`.
pub fn scope_touched_by( scope: &MediaObject, event: &LibraryEvent ) -> bool {
    if event.concerns( scope ) {
        return true;
    }
    let object = &event.object;
    let id = Some( scope.persistent_info.as_str() );
    match scope.object_type {
        ObjectType::Collection => event.in_collection( &scope.persistent_info ),
        ObjectType::Album => object.album.as_deref() == id,
        ObjectType::Artist => object.artist.as_deref() == id,
        ObjectType::Genre => object.genre.as_deref() == id,
        ObjectType::Year => object.year.is_some() && object.year == scope.year && object.collection == scope.collection,
        ObjectType::Folder | ObjectType::Device => {
            object.object_type == ObjectType::Track && object.parent.as_deref() == id
        }
        ObjectType::Playlist | ObjectType::Track => false,
    }
}


/// Refreshes the list cached under `key` whenever the library reports a
/// change touching `scope`, for as long as the control is shown.
fn watch_scope( ctx: &ShowCtx, scope: MediaRef, key: CacheKey, fetch: ListFetch ) {
    let view = ctx.view.clone();
    let mut events = view.library().subscribe();
    ctx.view.listen( &ctx.control, async move {
        loop {
            let touched = match events.recv().await {
                Ok( event ) => scope_touched_by( &scope, &event ),
                Err( RecvError::Lagged( _ ) ) => true,
                Err( RecvError::Closed ) => break,
            };
            if touched {
                tracing::debug!( "Refreshing {} of {}", key.id(), scope.key() );
                let fresh = fetch( view.library().clone(), scope.clone(), view.token().child_token() );
                view.refresh_list( key, fresh ).await;
            }
        }
    } );
}


/// Turns double clicks on the control into activations for the host.
fn forward_activations( ctx: &ShowCtx ) {
    let mut events = ctx.control.subscribe();
    let control = ctx.control.clone();
    let view = ctx.view.clone();
    ctx.view.listen( &ctx.control, async move {
        loop {
            match events.recv().await {
                Ok( ControlEvent::ItemDblClick( index ) ) => {
                    match control.activation_for( index, view.node().collection.clone() ) {
                        Some( activation ) => view.activate( activation ),
                        None => tracing::debug!( "Nothing to open at row {}", index ),
                    }
                }
                Ok( _ ) => {}
                Err( RecvError::Lagged( missed ) ) => tracing::warn!( "Missed {} control events", missed ),
                Err( RecvError::Closed ) => break,
            }
        }
    } );
}


/// Shows the cached list under `key`, creating it with `fetch`.
fn show_list( ctx: &ShowCtx, key: CacheKey, fetch: ListFetch, action: ControlAction ) -> TreeResult<()> {
    let view = &ctx.view;
    let scope = view.node().require_object()?.clone();
    let list = view.get_or_create( key, || fetch( view.library().clone(), scope.clone(), view.token().child_token() ) );
    ctx.control.set_source( ControlSource::List( list ) );
    if ctx.only_data_init {
        return Ok(());
    }
    ctx.control.add_action( action );
    forward_activations( ctx );
    watch_scope( ctx, scope, key, fetch );
    Ok(())
}


async fn tracklist_show( ctx: ShowCtx ) -> TreeResult<()> {
    show_list( &ctx, CacheKey::Tracklist, get_tracklist, ControlAction::PlayItem )
}


fn series_list( library: Arc<dyn MediaLibrary>, collection: MediaRef, token: CancellationToken ) -> MediaList {
    query_list( library, Query::Series { collection: collection.persistent_info.clone() }, token )
}


async fn album_grid_show( ctx: ShowCtx ) -> TreeResult<()> {
    let fetch: ListFetch = if ctx.view.node().kind == NodeKind::AllSeries { series_list } else { get_album_list };
    show_list( &ctx, CacheKey::Albumlist, fetch, ControlAction::NavigateToItem )
}


async fn artist_grid_show( ctx: ShowCtx ) -> TreeResult<()> {
    show_list( &ctx, CacheKey::Personlist, get_person_list, ControlAction::NavigateToItem )
}


async fn artist_view_show( ctx: ShowCtx ) -> TreeResult<()> {
    let view = &ctx.view;
    let artist = view.node().require_object()?.clone();
    let id = view.acquire_artist_source( &artist );
    let albums = view.sources().lock()
        .get( id )
        .map( |s| s.albumlist.clone() )
        .ok_or( TreeError::NodeGone )?;
    ctx.control.set_source( ControlSource::List( albums ) );
    if !ctx.only_data_init {
        ctx.control.add_action( ControlAction::NavigateToItem );
        forward_activations( &ctx );
    }
    Ok(())
}


async fn node_list_show( ctx: ShowCtx ) -> TreeResult<()> {
    let engine = ctx.view.engine().clone();
    let id = ctx.view.node().id;
    if !ctx.only_data_init {
        engine.on_expanded( id )?;
    }
    let children = engine.load_children( id ).await?;
    ctx.control.set_source( ControlSource::Nodes( children ) );
    if !ctx.only_data_init {
        ctx.control.add_action( ControlAction::NavigateToNode );
        forward_activations( &ctx );
    }
    Ok(())
}


fn item_count_text( count: usize ) -> String {
    match count {
        1 => "1 item".to_string(),
        n => format!( "{} items", n ),
    }
}


/// Next change of the list the status bar counts; never resolves without one.
async fn next_list_change( changes: &mut Option<broadcast::Receiver<ListChange>> ) -> Result<ListChange, RecvError> {
    match changes {
        Some( changes ) => changes.recv().await,
        None => std::future::pending().await,
    }
}


async fn status_bar_show( ctx: ShowCtx ) -> TreeResult<()> {
    let main = ctx.main_control.clone()
        .ok_or_else( || TreeError::Unsupported( "status bar without a main view".into() ) )?;
    ctx.control.set_source( ControlSource::Text( item_count_text( main.item_count() ) ) );
    if ctx.only_data_init {
        return Ok(());
    }

    // A new data source on the main control replaces the list being counted.
    let mut results = main.subscribe();
    let mut changes = main.list().map( |l| l.subscribe() );
    let control = ctx.control.clone();
    ctx.view.listen( &ctx.control, async move {
        loop {
            let recount = tokio::select! {
                event = results.recv() => match event {
                    Ok( ControlEvent::DataResult ) | Err( RecvError::Lagged( _ ) ) => {
                        changes = main.list().map( |l| l.subscribe() );
                        true
                    }
                    Ok( _ ) => false,
                    Err( RecvError::Closed ) => break,
                },
                change = next_list_change( &mut changes ) => match change {
                    Ok( _ ) | Err( RecvError::Lagged( _ ) ) => true,
                    Err( RecvError::Closed ) => {
                        changes = None;
                        false
                    }
                },
            };
            if recount {
                control.set_source( ControlSource::Text( item_count_text( main.item_count() ) ) );
            }
        }
    } );
    Ok(())
}


async fn column_browser_show( ctx: ShowCtx ) -> TreeResult<()> {
    let main = ctx.main_control.clone()
        .ok_or_else( || TreeError::Unsupported( "column browser without a main view".into() ) )?;
    let key = match main.view_kind() {
        ViewKind::AlbumGrid => CacheKey::Albumlist,
        ViewKind::ArtistGrid => CacheKey::Personlist,
        _ => CacheKey::Tracklist,
    };

    let browser = ColumnBrowser::attach( &ctx.view, key ).await?;
    ctx.control.set_source( ControlSource::Text( browser.summary() ) );
    ctx.view.set_column_browser( Some( browser ) );
    if ctx.only_data_init {
        return Ok(());
    }

    let mut observer = ctx.view.subscribe_cache();
    let view = ctx.view.clone();
    let control = ctx.control.clone();
    ctx.view.listen( &ctx.control, async move {
        loop {
            match observer.recv().await {
                Ok( changed ) if changed != key.unfiltered() => continue,
                Ok( _ ) | Err( RecvError::Lagged( _ ) ) => {
                    view.with_column_browser( |b| {
                        b.reapply();
                        control.set_source( ControlSource::Text( b.summary() ) );
                    } );
                }
                Err( RecvError::Closed ) => break,
            }
        }
    } );
    Ok(())
}


async fn info_header_show( ctx: ShowCtx ) -> TreeResult<()> {
    let node = ctx.view.node();
    let title = ctx.view.engine().title( node.id ).unwrap_or_else( |_| node.persistent_id.clone() );
    ctx.control.set_source( ControlSource::Text( title ) );

    if let Some( id ) = ctx.view.artist_source() {
        ctx.view.sources().lock().add_ref( id )?;
        ctx.control.hold_source( id );
    }
    Ok(())
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::column_browser::ColumnField;
    use crate::domain::ChangeKind;
    use crate::library::tests::sample_library;
    use crate::view::tests::{ node_at, test_engine, test_host };
    use crate::view_handler::Activation;
    use std::time::Duration;


    async fn eventually( check: impl Fn() -> bool ) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep( Duration::from_millis( 5 ) ).await;
        }
        check()
    }


    #[test]
    fn test_every_view_kind_registered() {
        let registry = ViewHandlerRegistry::with_defaults().unwrap();
        for kind in ViewKind::ALL {
            assert!( registry.contains( kind ), "{} missing", kind );
        }

        let folder = registry.get( ViewKind::FolderListView ).unwrap();
        assert_eq!( folder.base_view_type.as_deref(), Some( "list" ) );
        assert_eq!( folder.state_key(), "tracklist" );
        assert_eq!( folder.control_class, ControlClass::ListView );

        let artists = registry.get( ViewKind::ArtistGrid ).unwrap();
        assert_eq!( artists.sub_views, vec![ ViewKind::StatusBar, ViewKind::ColumnBrowser ] );
        assert_eq!( artists.state_key(), "grid" );
        assert!( registry.get( ViewKind::ColumnBrowser ).unwrap().is_sub_view );
    }


    #[test]
    fn test_scope_touched_by() {
        let album = MediaObject::new( ObjectType::Album, "kob", "Kind of Blue" ).with_collection( "music" );
        let track = MediaObject::new( ObjectType::Track, "t9", "x" )
            .with_collection( "music" )
            .with_album( "kob" )
            .with_parent( "/music" );
        let other = MediaObject::new( ObjectType::Track, "t10", "y" ).with_album( "pastel" );
        let event = |o: &MediaObject| LibraryEvent { kind: ChangeKind::Added, object: o.clone().into_ref() };

        assert!( scope_touched_by( &album, &event( &track ) ) );
        assert!( scope_touched_by( &album, &event( &album ) ) );
        assert!( !scope_touched_by( &album, &event( &other ) ) );

        let folder = MediaObject::new( ObjectType::Folder, "/music", "music" );
        assert!( scope_touched_by( &folder, &event( &track ) ) );
        let collection = MediaObject::new( ObjectType::Collection, "music", "Music" );
        assert!( !scope_touched_by( &collection, &event( &other ) ) );
    }


    #[tokio::test]
    async fn test_playlist_tracklist_adds_reorder() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let favs = node_at( &engine, &[ "playlists", "playlist:favs" ] ).await;
        let mut host = test_host( engine );

        let active = host.show_node( favs ).await.unwrap();
        assert_eq!( active.kind, ViewKind::PlaylistTracklist );
        assert!( active.main.has_action( ControlAction::PlayItem ) );
        assert!( active.main.has_action( ControlAction::Reorder ) );

        let list = active.main.list().unwrap();
        list.when_loaded().await;
        assert_eq!( list.len(), 2 );
    }


    #[tokio::test]
    async fn test_tracklist_follows_library_changes() {
        let lib = Arc::new( sample_library() );
        let engine = test_engine( lib.clone() );
        let album = node_at( &engine, &[ "collection:music", "albums", "album:kob" ] ).await;
        let mut host = test_host( engine );

        let list = host.show_node( album ).await.unwrap().main.list().unwrap();
        list.when_loaded().await;
        assert_eq!( list.len(), 3 );

        lib.insert(
            MediaObject::new( ObjectType::Track, "t6", "All Blues" )
                .with_collection( "music" )
                .with_album( "kob" )
                .with_artist( "miles" ),
        );
        assert!( eventually( || list.len() == 4 ).await );
        let view = &host.active().unwrap().view;
        assert!( view.cached( CacheKey::Tracklist ).unwrap().ptr_eq( &list ) );
    }


    #[tokio::test]
    async fn test_status_bar_counts_main_list() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let tracks = node_at( &engine, &[ "collection:music", "all_tracks" ] ).await;
        let mut host = test_host( engine );

        let active = host.show_node( tracks ).await.unwrap();
        let status = active.sub_view( ViewKind::StatusBar ).unwrap().clone();
        assert!( eventually( || status.text().as_deref() == Some( "5 items" ) ).await );
    }


    #[tokio::test]
    async fn test_artist_view_shares_one_source() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let miles = node_at( &engine, &[ "collection:music", "artists", "artist:miles" ] ).await;
        let mut host = test_host( engine );

        let active = host.show_node( miles ).await.unwrap();
        assert_eq!( active.kind, ViewKind::ArtistView );
        let header = active.sub_view( ViewKind::InfoHeader ).unwrap();
        assert_eq!( header.text().as_deref(), Some( "Miles Davis" ) );

        let id = active.view.artist_source().unwrap();
        let sources = host.sources().clone();
        assert_eq!( sources.lock().ref_count( id ), 2 );

        host.hide();
        assert_eq!( sources.lock().live_count(), 0 );
        assert_eq!( sources.lock().disposed_count(), 1 );
    }


    #[tokio::test]
    async fn test_column_browser_filters_main_list_in_place() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let tracks = node_at( &engine, &[ "collection:music", "all_tracks" ] ).await;
        let mut host = test_host( engine );

        let list = host.show_node( tracks ).await.unwrap().main.list().unwrap();
        list.when_loaded().await;
        assert!( host.toggle_sub_view( ViewKind::ColumnBrowser ).await.unwrap() );

        let view = host.active().unwrap().view.clone();
        view.set_filter( ColumnField::Artist, "nina" ).unwrap();
        assert_eq!( list.len(), 2 );
        assert!( host.active().unwrap().main.list().unwrap().ptr_eq( &list ) );

        assert!( !host.toggle_sub_view( ViewKind::ColumnBrowser ).await.unwrap() );
        assert_eq!( list.len(), 5 );
        assert!( view.set_filter( ColumnField::Artist, "nina" ).is_err() );
    }


    #[tokio::test]
    async fn test_node_list_holds_expand_lock() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let playlists = node_at( &engine, &[ "playlists" ] ).await;
        let mut host = test_host( engine.clone() );

        let active = host.show_node( playlists ).await.unwrap();
        assert_eq!( active.kind, ViewKind::NodeList );
        assert!( matches!( active.main.source(), ControlSource::Nodes( ref n ) if n.len() == 1 ) );
        assert_eq!( engine.expand_lock( playlists ), 1 );

        host.hide();
        assert_eq!( engine.expand_lock( playlists ), 0 );
    }


    #[tokio::test]
    async fn test_series_grid_lists_series_only() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let series = node_at( &engine, &[ "collection:music", "all_series" ] ).await;
        let mut host = test_host( engine );

        let list = host.show_node( series ).await.unwrap().main.list().unwrap();
        list.when_loaded().await;
        let ids: Vec<String> = list.to_vec().iter().map( |a| a.persistent_info.clone() ).collect();
        assert_eq!( ids, vec![ "talks".to_string() ] );
    }


    #[tokio::test]
    async fn test_double_click_navigates_from_grid() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let albums = node_at( &engine, &[ "collection:music", "albums" ] ).await;
        let mut host = test_host( engine );

        let main = host.show_node( albums ).await.unwrap().main.clone();
        let list = main.list().unwrap();
        list.when_loaded().await;
        let first = list.get( 0 ).unwrap();

        main.emit( ControlEvent::ItemDblClick( 0 ) );
        let activation = tokio::time::timeout( Duration::from_secs( 1 ), host.recv_activation() ).await.unwrap().unwrap();
        match activation {
            Activation::Navigate { object, collection } => {
                assert!( object.same_object( &first ) );
                assert_eq!( collection.unwrap().persistent_info, "music" );
            }
            other => panic!( "unexpected activation {:?}", other ),
        }

        // Rows past the end open nothing.
        main.emit( ControlEvent::ItemDblClick( 99 ) );
        tokio::time::sleep( Duration::from_millis( 50 ) ).await;
        assert!( host.next_activation().is_none() );
    }


    #[tokio::test]
    async fn test_double_click_on_node_list_and_tracklist() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let playlists = node_at( &engine, &[ "playlists" ] ).await;
        let favs = node_at( &engine, &[ "playlists", "playlist:favs" ] ).await;
        let tracks = node_at( &engine, &[ "collection:music", "all_tracks" ] ).await;
        let mut host = test_host( engine );

        let main = host.show_node( playlists ).await.unwrap().main.clone();
        main.emit( ControlEvent::ItemDblClick( 0 ) );
        let activation = tokio::time::timeout( Duration::from_secs( 1 ), host.recv_activation() ).await.unwrap();
        assert_eq!( activation, Some( Activation::ShowNode( favs ) ) );

        let main = host.show_node( tracks ).await.unwrap().main.clone();
        main.list().unwrap().when_loaded().await;
        main.emit( ControlEvent::ItemDblClick( 0 ) );
        let activation = tokio::time::timeout( Duration::from_secs( 1 ), host.recv_activation() ).await.unwrap();
        assert!( matches!( activation, Some( Activation::Play( _ ) ) ) );

        // A hidden control no longer answers.
        host.hide();
        main.emit( ControlEvent::ItemDblClick( 0 ) );
        tokio::time::sleep( Duration::from_millis( 50 ) ).await;
        assert!( host.next_activation().is_none() );
    }


    #[tokio::test]
    async fn test_status_bar_follows_new_main_source() {
        let engine = test_engine( Arc::new( sample_library() ) );
        let tracks = node_at( &engine, &[ "collection:music", "all_tracks" ] ).await;
        let mut host = test_host( engine );

        let active = host.show_node( tracks ).await.unwrap();
        let main = active.main.clone();
        let status = active.sub_view( ViewKind::StatusBar ).unwrap().clone();
        assert!( eventually( || status.text().as_deref() == Some( "5 items" ) ).await );

        let replacement = MediaList::new();
        replacement.add( MediaObject::new( ObjectType::Track, "x1", "One" ).into_ref() );
        main.set_source( ControlSource::List( replacement.clone() ) );
        assert!( eventually( || status.text().as_deref() == Some( "1 item" ) ).await );

        replacement.add( MediaObject::new( ObjectType::Track, "x2", "Two" ).into_ref() );
        assert!( eventually( || status.text().as_deref() == Some( "2 items" ) ).await );
    }
}
