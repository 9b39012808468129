//! Built-in node handlers.
//!
//! The chains registered here:
//!
//! ```text
//! Base ─┬─ Observable ─┬─ Root
//!       │              ├─ Collection
//!       │              ├─ Albums, Artists, Genres, Years, AllSeries
//!       │              ├─ Artist, Genre, Year
//!       │              ├─ PlaylistBase ─┬─ Playlists
//!       │              │                └─ Playlist
//!       │              ├─ Folders ── Folder
//!       │              └─ Devices
//!       ├─ AllTracks
//!       ├─ Album ── Series
//!       └─ Device
//! ```

use std::sync::Arc;

use futures::FutureExt;

use crate::domain::{ LibraryEvent, MediaRef, ObjectType, Query };
use crate::error::TreeResult;
use crate::library::MediaLibrary;
use crate::node_handler::{
    ChildSpec, ChildrenFn, DropMode, HandlerCtx, MenuAction, MenuItem, NodeHandlerOverrides,
    NodeHandlerRegistry, NodeInfo, NodeKind, RefreshTimeout, Resolver,
};
use crate::store::{ MediaTreeItem, StateKey, StateStore };
use crate::view_handler::ViewKind;


/// Branches a collection may show, in default order.
pub const COLLECTION_BRANCHES: [NodeKind; 6] = [
    NodeKind::AllTracks,
    NodeKind::Albums,
    NodeKind::Artists,
    NodeKind::Genres,
    NodeKind::Years,
    NodeKind::AllSeries,
];


/// Registers every built-in handler. Parents go first.
pub fn register_all( registry: &mut NodeHandlerRegistry ) -> TreeResult<()> {
    registry.inherit( NodeKind::Observable, NodeKind::Base, |_| NodeHandlerOverrides {
        has_children: Some( Resolver::Const( true ) ),
        on_expanded: Some( Arc::new( |engine, node| engine.watch_library( node.id ) ) ),
        on_collapsed: Some( Arc::new( |engine, node| engine.unwatch_library( node.id ) ) ),
        affected_by: Some( Arc::new( |_, _| true ) ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::Root, NodeKind::Observable, |_| NodeHandlerOverrides {
        title: Some( Resolver::Const( "Library".into() ) ),
        icon: Some( Resolver::Const( "home".into() ) ),
        get_children: Some( Arc::new( |ctx| root_children( ctx ).boxed() ) ),
        view_as: Some( vec![ ViewKind::NodeList ] ),
        affected_by: Some( Arc::new( |_, e| e.object.object_type == ObjectType::Collection ) ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::Collection, NodeKind::Observable, |_| NodeHandlerOverrides {
        icon: Some( Resolver::Const( "collection".into() ) ),
        get_children: Some( Arc::new( |ctx| collection_children( ctx ).boxed() ) ),
        view_as: Some( vec![ ViewKind::NodeList, ViewKind::Tracklist ] ),
        // Only a new series album can change the branch list.
        affected_by: Some( Arc::new( |n, e| {
            e.object.series && n.collection_id().is_some_and( |c| e.in_collection( c ) )
        } ) ),
        requires_data_source: Some( true ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::AllTracks, NodeKind::Base, |_| category( "All tracks", "tracks", NodeHandlerOverrides {
        view_as: Some( vec![ ViewKind::Tracklist ] ),
        ..Default::default()
    } ) )?;

    register_categories( registry )?;
    register_leaves( registry )?;
    register_playlists( registry )?;
    register_folders( registry )?;

    registry.inherit( NodeKind::Devices, NodeKind::Observable, |_| NodeHandlerOverrides {
        title: Some( Resolver::Const( "Devices".into() ) ),
        icon: Some( Resolver::Const( "devices".into() ) ),
        get_children: Some( list_children( NodeKind::Device, |_| Ok( Query::Devices ) ) ),
        view_as: Some( vec![ ViewKind::NodeList ] ),
        affected_by: Some( Arc::new( |_, e| e.object.object_type == ObjectType::Device ) ),
        persistent_id: Some( Arc::new( |kind, _| kind.to_string() ) ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::Device, NodeKind::Base, |_| NodeHandlerOverrides {
        icon: Some( Resolver::Const( "device".into() ) ),
        view_as: Some( vec![ ViewKind::Tracklist ] ),
        requires_data_source: Some( true ),
        ..Default::default()
    } )?;

    tracing::debug!( "Registered built-in node handlers" );
    Ok(())
}


/// Collection branches, listing the collection's objects of one type.
fn register_categories( registry: &mut NodeHandlerRegistry ) -> TreeResult<()> {
    registry.inherit( NodeKind::Albums, NodeKind::Observable, |_| category( "Albums", "albums", NodeHandlerOverrides {
        get_children: Some( list_children( NodeKind::Album, |n| {
            Ok( Query::Albums { collection: scope_id( n )? } )
        } ) ),
        view_as: Some( vec![ ViewKind::AlbumGrid, ViewKind::Tracklist ] ),
        affected_by: Some( type_in_collection( ObjectType::Album ) ),
        ..Default::default()
    } ) )?;

    registry.inherit( NodeKind::Artists, NodeKind::Observable, |_| category( "Artists", "artists", NodeHandlerOverrides {
        get_children: Some( list_children( NodeKind::Artist, |n| {
            Ok( Query::Artists { collection: scope_id( n )? } )
        } ) ),
        view_as: Some( vec![ ViewKind::ArtistGrid, ViewKind::Tracklist ] ),
        affected_by: Some( type_in_collection( ObjectType::Artist ) ),
        ..Default::default()
    } ) )?;

    registry.inherit( NodeKind::Genres, NodeKind::Observable, |_| category( "Genres", "genres", NodeHandlerOverrides {
        get_children: Some( list_children( NodeKind::Genre, |n| {
            Ok( Query::Genres { collection: scope_id( n )? } )
        } ) ),
        view_as: Some( vec![ ViewKind::NodeList, ViewKind::Tracklist ] ),
        affected_by: Some( type_in_collection( ObjectType::Genre ) ),
        ..Default::default()
    } ) )?;

    registry.inherit( NodeKind::Years, NodeKind::Observable, |_| category( "Years", "years", NodeHandlerOverrides {
        get_children: Some( list_children( NodeKind::Year, |n| {
            Ok( Query::Years { collection: scope_id( n )? } )
        } ) ),
        view_as: Some( vec![ ViewKind::NodeList, ViewKind::Tracklist ] ),
        affected_by: Some( type_in_collection( ObjectType::Year ) ),
        ..Default::default()
    } ) )?;

    registry.inherit( NodeKind::AllSeries, NodeKind::Observable, |_| category( "Series", "series", NodeHandlerOverrides {
        get_children: Some( list_children( NodeKind::Series, |n| {
            Ok( Query::Series { collection: scope_id( n )? } )
        } ) ),
        view_as: Some( vec![ ViewKind::AlbumGrid ] ),
        affected_by: Some( Arc::new( |n, e| {
            e.object.series && n.collection_id().is_some_and( |c| e.in_collection( c ) )
        } ) ),
        ..Default::default()
    } ) )
}


/// Artist, genre, year and album nodes.
fn register_leaves( registry: &mut NodeHandlerRegistry ) -> TreeResult<()> {
    let albums_of = || list_children( NodeKind::Album, |n| Ok( Query::AlbumsOf { scope: n.require_object()?.clone() } ) );

    registry.inherit( NodeKind::Artist, NodeKind::Observable, |_| NodeHandlerOverrides {
        icon: Some( Resolver::Const( "artist".into() ) ),
        get_children: Some( albums_of() ),
        view_as: Some( vec![ ViewKind::ArtistView, ViewKind::AlbumGrid, ViewKind::Tracklist ] ),
        affected_by: Some( Arc::new( |n, e| {
            e.object.object_type == ObjectType::Album
                && n.object().is_some_and( |a| e.object.artist.as_deref() == Some( a.persistent_info.as_str() ) )
        } ) ),
        requires_data_source: Some( true ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::Genre, NodeKind::Observable, |_| NodeHandlerOverrides {
        icon: Some( Resolver::Const( "genre".into() ) ),
        get_children: Some( albums_of() ),
        view_as: Some( vec![ ViewKind::AlbumGrid, ViewKind::Tracklist ] ),
        affected_by: Some( Arc::new( |n, e| {
            e.object.object_type == ObjectType::Track
                && n.object().is_some_and( |g| e.object.genre.as_deref() == Some( g.persistent_info.as_str() ) )
        } ) ),
        requires_data_source: Some( true ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::Year, NodeKind::Observable, |_| NodeHandlerOverrides {
        icon: Some( Resolver::Const( "year".into() ) ),
        get_children: Some( albums_of() ),
        view_as: Some( vec![ ViewKind::AlbumGrid, ViewKind::Tracklist ] ),
        affected_by: Some( Arc::new( |n, e| {
            e.object.object_type == ObjectType::Album && n.object().is_some_and( |y| e.object.year == y.year )
        } ) ),
        requires_data_source: Some( true ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::Album, NodeKind::Base, |parent| {
        let sup = parent.menu.clone();
        NodeHandlerOverrides {
            icon: Some( Resolver::Const( "album".into() ) ),
            view_as: Some( vec![ ViewKind::AlbumTracklist, ViewKind::Tracklist ] ),
            menu: Some( Arc::new( move |n| {
                let mut items = sup( n );
                let mut go = MenuItem::new( MenuAction::GoToArtist, "Go to artist", 20, 0 );
                go.enabled = n.object().is_some_and( |a| a.artist.is_some() );
                items.push( go );
                items
            } ) ),
            requires_data_source: Some( true ),
            ..Default::default()
        }
    } )?;

    registry.inherit( NodeKind::Series, NodeKind::Album, |_| NodeHandlerOverrides {
        icon: Some( Resolver::Const( "series".into() ) ),
        view_as: Some( vec![ ViewKind::AlbumTracklist ] ),
        ..Default::default()
    } )
}


fn register_playlists( registry: &mut NodeHandlerRegistry ) -> TreeResult<()> {
    registry.inherit( NodeKind::PlaylistBase, NodeKind::Observable, |_| NodeHandlerOverrides {
        icon: Some( Resolver::Const( "playlist".into() ) ),
        get_children: Some( list_children( NodeKind::Playlist, |n| {
            Ok( Query::Playlists { parent: n.object().map( |p| p.persistent_info.clone() ) } )
        } ) ),
        affected_by: Some( Arc::new( |_, e| e.object.object_type == ObjectType::Playlist ) ),
        refresh_timeout: Some( RefreshTimeout::HighChurn ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::Playlists, NodeKind::PlaylistBase, |parent| {
        let sup = parent.affected_by.clone();
        NodeHandlerOverrides {
            title: Some( Resolver::Const( "Playlists".into() ) ),
            view_as: Some( vec![ ViewKind::NodeList ] ),
            affected_by: Some( Arc::new( move |n, e| {
                sup.as_ref().is_some_and( |f| f( n, e ) ) && e.object.parent.is_none()
            } ) ),
            persistent_id: Some( Arc::new( |kind, _| kind.to_string() ) ),
            ..Default::default()
        }
    } )?;

    registry.inherit( NodeKind::Playlist, NodeKind::PlaylistBase, |parent| {
        let sup = parent.affected_by.clone();
        NodeHandlerOverrides {
            view_as: Some( vec![ ViewKind::PlaylistTracklist ] ),
            affected_by: Some( Arc::new( move |n, e| {
                sup.as_ref().is_some_and( |f| f( n, e ) ) && child_of( n, e )
            } ) ),
            can_delete: Some( Resolver::Const( true ) ),
            delete_items: Some( Arc::new( |ctx| async move {
                let playlist = ctx.node.require_object()?.clone();
                ctx.library.delete_object( &playlist ).await?;
                tracing::info!( "Deleted playlist {}", playlist.title );
                Ok(())
            }.boxed() ) ),
            can_drop: Some( Arc::new( |_, payload| payload.all_of( ObjectType::Track ) ) ),
            get_drop_mode: Some( Arc::new( |_, payload| {
                if payload.all_of( ObjectType::Track ) { DropMode::Copy } else { DropMode::None }
            } ) ),
            drop: Some( Arc::new( |ctx, payload| async move {
                let playlist = ctx.node.require_object()?.clone();
                ctx.library.add_to_playlist( &playlist, &payload.objects ).await?;
                Ok(())
            }.boxed() ) ),
            requires_data_source: Some( true ),
            ..Default::default()
        }
    } )
}


fn register_folders( registry: &mut NodeHandlerRegistry ) -> TreeResult<()> {
    registry.inherit( NodeKind::Folders, NodeKind::Observable, |_| NodeHandlerOverrides {
        title: Some( Resolver::Const( "Folders".into() ) ),
        icon: Some( Resolver::Const( "folders".into() ) ),
        get_children: Some( list_children( NodeKind::Folder, |_| Ok( Query::Folders { parent: None } ) ) ),
        view_as: Some( vec![ ViewKind::NodeList ] ),
        affected_by: Some( Arc::new( |_, e| {
            e.object.object_type == ObjectType::Folder && e.object.parent.is_none()
        } ) ),
        refresh_timeout: Some( RefreshTimeout::HighChurn ),
        persistent_id: Some( Arc::new( |kind, _| kind.to_string() ) ),
        ..Default::default()
    } )?;

    registry.inherit( NodeKind::Folder, NodeKind::Folders, |_| NodeHandlerOverrides {
        title: Some( Resolver::dynamic( object_title ) ),
        icon: Some( Resolver::Const( "folder".into() ) ),
        get_children: Some( list_children( NodeKind::Folder, |n| {
            Ok( Query::Folders { parent: Some( n.require_object()?.persistent_info.clone() ) } )
        } ) ),
        view_as: Some( vec![ ViewKind::FolderListView ] ),
        affected_by: Some( Arc::new( |n, e| {
            matches!( e.object.object_type, ObjectType::Folder | ObjectType::Track ) && child_of( n, e )
        } ) ),
        can_drop: Some( Arc::new( |_, payload| payload.all_of( ObjectType::Track ) ) ),
        get_drop_mode: Some( Arc::new( |_, payload| {
            if payload.all_of( ObjectType::Track ) { DropMode::Move } else { DropMode::None }
        } ) ),
        drop: Some( Arc::new( |ctx, payload| async move {
            let folder = ctx.node.require_object()?.clone();
            ctx.library.move_to_folder( &folder, &payload.objects ).await?;
            Ok(())
        }.boxed() ) ),
        persistent_id: Some( Arc::new( crate::node_handler::default_persistent_id ) ),
        requires_data_source: Some( true ),
        ..Default::default()
    } )
}


/// Overrides shared by collection branches: fixed title and icon, and the
/// kind itself as persistent id since every collection has one of each.
fn category( title: &str, icon: &str, overrides: NodeHandlerOverrides ) -> NodeHandlerOverrides {
    NodeHandlerOverrides {
        title: Some( Resolver::Const( title.to_string() ) ),
        icon: Some( Resolver::Const( icon.to_string() ) ),
        persistent_id: Some( Arc::new( |kind, _| kind.to_string() ) ),
        requires_data_source: Some( true ),
        ..overrides
    }
}


fn object_title( node: &NodeInfo ) -> String {
    node.object().map( |o| o.title.clone() ).unwrap_or_else( || node.kind.to_string() )
}


/// Id of the collection a branch node is scoped to.
fn scope_id( node: &NodeInfo ) -> TreeResult<String> {
    Ok( node.require_object()?.persistent_info.clone() )
}


fn child_of( node: &NodeInfo, event: &LibraryEvent ) -> bool {
    node.object().is_some_and( |o| event.object.parent.as_deref() == Some( o.persistent_info.as_str() ) )
}


fn type_in_collection( object_type: ObjectType ) -> crate::node_handler::EventFilterFn {
    Arc::new( move |n, e| {
        e.object.object_type == object_type && n.collection_id().is_some_and( |c| e.in_collection( c ) )
    } )
}


/// Children built from one library query, one node of `kind` per object.
fn list_children(
    kind: NodeKind,
    query: impl Fn( &NodeInfo ) -> TreeResult<Query> + Send + Sync + 'static,
) -> ChildrenFn {
    Arc::new( move |ctx: HandlerCtx| {
        let query = query( &ctx.node );
        async move {
            let objects = ctx.library.query( query? ).await?;
            Ok( objects.into_iter().map( |o| ChildSpec::object( kind, o ) ).collect() )
        }.boxed()
    } )
}


async fn root_children( ctx: HandlerCtx ) -> TreeResult<Vec<ChildSpec>> {
    let collections = ctx.library.query( Query::Collections ).await?;
    let mut children: Vec<ChildSpec> = collections.into_iter()
        .map( |c| ChildSpec::object( NodeKind::Collection, c ) )
        .collect();
    children.push( ChildSpec::handler_only( NodeKind::Playlists ) );
    children.push( ChildSpec::handler_only( NodeKind::Folders ) );
    children.push( ChildSpec::handler_only( NodeKind::Devices ) );
    Ok( children )
}


async fn collection_children( ctx: HandlerCtx ) -> TreeResult<Vec<ChildSpec>> {
    let collection = ctx.node.require_object()?.clone();
    let items = media_tree_items( ctx.library.as_ref(), &ctx.store, ctx.config.touch_mode, &collection ).await?;
    Ok( items.into_iter()
        .filter( |i| i.visible )
        .map( |i| ChildSpec::scoped( i.kind, &ctx.node.data_source ) )
        .collect() )
}


/// Branch order and visibility for a collection: the persisted list if one
/// exists, else every branch the collection has content for.
pub async fn media_tree_items(
    library: &dyn MediaLibrary,
    store: &StateStore,
    touch: bool,
    collection: &MediaRef,
) -> TreeResult<Vec<MediaTreeItem>> {
    let key = StateKey::media_tree_items( &collection.persistent_info, touch );
    if store.contains( &key ) {
        let stored: Vec<MediaTreeItem> = store.get_value( &key, Vec::new() );
        return Ok( stored.into_iter()
            .filter( |i| COLLECTION_BRANCHES.contains( &i.kind ) )
            .collect() );
    }

    let series = library.query( Query::Series { collection: collection.persistent_info.clone() } ).await?;
    Ok( COLLECTION_BRANCHES.iter()
        .filter( |k| **k != NodeKind::AllSeries || !series.is_empty() )
        .map( |k| MediaTreeItem { kind: *k, visible: true } )
        .collect() )
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::{ ChangeKind, MediaObject };
    use crate::library::tests::sample_library;
    use crate::node::{ DataSource, NodeId };
    use crate::node_handler::DragPayload;
    use tokio_util::sync::CancellationToken;


    fn ctx_for( kind: NodeKind, object: Option<MediaRef>, store: Arc<StateStore> ) -> HandlerCtx {
        let data_source = object.clone().map( DataSource::Object ).unwrap_or_default();
        HandlerCtx {
            node: NodeInfo {
                id: NodeId::default(),
                kind,
                persistent_id: kind.to_string(),
                collection: object.filter( |o| o.object_type == ObjectType::Collection ),
                data_source,
            },
            library: Arc::new( sample_library() ),
            store,
            config: EngineConfig::default(),
            token: CancellationToken::new(),
        }
    }


    fn collection() -> MediaRef {
        MediaObject::new( ObjectType::Collection, "music", "Music" ).into_ref()
    }


    #[test]
    fn test_register_all_builds_expected_chains() {
        let registry = NodeHandlerRegistry::with_defaults().unwrap();
        assert_eq!(
            registry.lineage( NodeKind::Playlist ),
            vec![ NodeKind::Playlist, NodeKind::PlaylistBase, NodeKind::Observable, NodeKind::Base ],
        );
        for kind in NodeKind::ALL {
            assert!( registry.contains( kind ), "{} not registered", kind );
        }
    }


    #[test]
    fn test_series_inherits_album_behavior() {
        let registry = NodeHandlerRegistry::with_defaults().unwrap();
        let album = registry.get( NodeKind::Album ).unwrap();
        let series = registry.get( NodeKind::Series ).unwrap();

        assert!( Arc::ptr_eq( &album.menu, &series.menu ) );
        assert!( series.get_children.is_none() );
        assert_eq!( series.view_as, vec![ ViewKind::AlbumTracklist ] );
        assert!( series.requires_data_source );
    }


    #[tokio::test]
    async fn test_root_children() {
        let registry = NodeHandlerRegistry::with_defaults().unwrap();
        let root = registry.get( NodeKind::Root ).unwrap();
        let ctx = ctx_for( NodeKind::Root, None, Arc::new( StateStore::in_memory() ) );

        let children = ( root.get_children.as_ref().unwrap() )( ctx ).await.unwrap();
        let kinds: Vec<_> = children.iter().map( |c| c.kind ).collect();
        assert_eq!( kinds, vec![ NodeKind::Collection, NodeKind::Playlists, NodeKind::Folders, NodeKind::Devices ] );
    }


    #[tokio::test]
    async fn test_collection_children_default_and_stored() {
        let registry = NodeHandlerRegistry::with_defaults().unwrap();
        let handler = registry.get( NodeKind::Collection ).unwrap();
        let store = Arc::new( StateStore::in_memory() );
        let get_children = handler.get_children.clone().unwrap();

        let children = get_children( ctx_for( NodeKind::Collection, Some( collection() ), store.clone() ) ).await.unwrap();
        assert_eq!( children.len(), 6 );
        assert!( children.iter().all( |c| c.data_source.equivalent( &DataSource::Object( collection() ) ) ) );

        store.set_value( &StateKey::media_tree_items( "music", false ), &vec![
            MediaTreeItem { kind: NodeKind::Genres, visible: true },
            MediaTreeItem { kind: NodeKind::Albums, visible: false },
            MediaTreeItem { kind: NodeKind::AllTracks, visible: true },
        ] );
        let children = get_children( ctx_for( NodeKind::Collection, Some( collection() ), store ) ).await.unwrap();
        let kinds: Vec<_> = children.iter().map( |c| c.kind ).collect();
        assert_eq!( kinds, vec![ NodeKind::Genres, NodeKind::AllTracks ] );
    }


    #[tokio::test]
    async fn test_collection_without_series_hides_branch() {
        let lib = crate::library::MemoryLibrary::new();
        lib.insert( MediaObject::new( ObjectType::Collection, "video", "Video" ) );
        let video = MediaObject::new( ObjectType::Collection, "video", "Video" ).into_ref();

        let items = media_tree_items( &lib, &StateStore::in_memory(), false, &video ).await.unwrap();
        assert_eq!( items.len(), 5 );
        assert!( items.iter().all( |i| i.kind != NodeKind::AllSeries ) );
    }


    #[test]
    fn test_category_persistent_ids_ignore_scope() {
        let registry = NodeHandlerRegistry::with_defaults().unwrap();
        let albums = registry.get( NodeKind::Albums ).unwrap();
        let album = registry.get( NodeKind::Album ).unwrap();
        let scope = DataSource::Object( collection() );

        assert_eq!( albums.persistent_id_for( &scope ), "albums" );
        let kob = DataSource::Object( MediaObject::new( ObjectType::Album, "kob", "Kind of Blue" ).into_ref() );
        assert_eq!( album.persistent_id_for( &kob ), "album:kob" );
    }


    #[test]
    fn test_playlist_event_filters() {
        let registry = NodeHandlerRegistry::with_defaults().unwrap();
        let playlists = registry.get( NodeKind::Playlists ).unwrap();
        let playlist = registry.get( NodeKind::Playlist ).unwrap();

        let favs = MediaObject::new( ObjectType::Playlist, "favs", "Favourites" ).into_ref();
        let top = LibraryEvent { kind: ChangeKind::Added, object: MediaObject::new( ObjectType::Playlist, "new", "New" ).into_ref() };
        let nested = LibraryEvent {
            kind: ChangeKind::Added,
            object: MediaObject::new( ObjectType::Playlist, "inner", "Inner" ).with_parent( "favs" ).into_ref(),
        };
        let track = LibraryEvent { kind: ChangeKind::Added, object: MediaObject::new( ObjectType::Track, "t9", "T" ).into_ref() };

        let branch = ctx_for( NodeKind::Playlists, None, Arc::new( StateStore::in_memory() ) ).node;
        let node = ctx_for( NodeKind::Playlist, Some( favs ), Arc::new( StateStore::in_memory() ) ).node;
        let in_branch = playlists.affected_by.as_ref().unwrap();
        let in_node = playlist.affected_by.as_ref().unwrap();

        assert!( in_branch( &branch, &top ) );
        assert!( !in_branch( &branch, &nested ) );
        assert!( !in_branch( &branch, &track ) );
        assert!( in_node( &node, &nested ) );
        assert!( !in_node( &node, &top ) );
        assert_eq!( playlist.refresh_timeout, RefreshTimeout::HighChurn );
    }


    #[test]
    fn test_drop_modes() {
        let registry = NodeHandlerRegistry::with_defaults().unwrap();
        let store = Arc::new( StateStore::in_memory() );
        let tracks = DragPayload { objects: vec![ MediaObject::new( ObjectType::Track, "t1", "So What" ).into_ref() ] };
        let albums = DragPayload { objects: vec![ MediaObject::new( ObjectType::Album, "kob", "Kind of Blue" ).into_ref() ] };

        let playlist = registry.get( NodeKind::Playlist ).unwrap();
        let folder = registry.get( NodeKind::Folder ).unwrap();
        let album = registry.get( NodeKind::Album ).unwrap();
        let node = ctx_for( NodeKind::Playlist, None, store ).node;

        assert_eq!( ( playlist.get_drop_mode )( &node, &tracks ), DropMode::Copy );
        assert_eq!( ( playlist.get_drop_mode )( &node, &albums ), DropMode::None );
        assert_eq!( ( folder.get_drop_mode )( &node, &tracks ), DropMode::Move );
        assert!( !( album.can_drop )( &node, &tracks ) );
    }


    #[test]
    fn test_album_menu_adds_go_to_artist() {
        let registry = NodeHandlerRegistry::with_defaults().unwrap();
        let album = registry.get( NodeKind::Album ).unwrap();
        let with_artist = MediaObject::new( ObjectType::Album, "kob", "Kind of Blue" ).with_artist( "miles" ).into_ref();
        let node = ctx_for( NodeKind::Album, Some( with_artist ), Arc::new( StateStore::in_memory() ) ).node;

        let items = ( album.menu )( &node );
        assert_eq!( items.len(), 1 );
        assert_eq!( items[ 0 ].action, MenuAction::GoToArtist );
        assert!( items[ 0 ].enabled );
    }
}
