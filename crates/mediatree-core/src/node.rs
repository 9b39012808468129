//! Node arena.
//!
//! Nodes live in a slot map and refer to each other by `NodeId`. Every node
//! owns a cancellation token derived from its parent's, so discarding a
//! subtree cancels all work still running on behalf of its nodes.

use futures::future::{ BoxFuture, Shared };
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use slotmap::{ new_key_type, SlotMap };
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{ MediaRef, ObjectType };
use crate::error::{ TreeError, TreeResult };
use crate::node_handler::NodeKind;


new_key_type! {
    /// Handle to a node in the tree arena.
    pub struct NodeId;
}


/// A children load shared by every caller waiting on it.
pub( crate ) type SharedLoad = Shared<BoxFuture<'static, TreeResult<Vec<NodeId>>>>;


/// What a node displays.
#[derive( Debug, Clone, PartialEq, Default )]
pub enum DataSource {
    /// Handler-only node (for example the Playlists branch).
    #[default]
    None,

    /// A domain object.
    Object( MediaRef ),

    /// A plain value for handler-specific nodes.
    Value( Value ),
}


impl DataSource {
    pub fn object( &self ) -> Option<&MediaRef> {
        match self {
            DataSource::Object( o ) => Some( o ),
            _ => None,
        }
    }


    /// Serializable descriptor of this data source.
    pub fn to_stored( &self ) -> StoredDataSource {
        match self {
            DataSource::None => StoredDataSource::Value( Value::Null ),
            DataSource::Object( o ) => StoredDataSource::Object {
                object_type: o.object_type,
                persistent_info: o.persistent_info.clone(),
            },
            DataSource::Value( v ) => StoredDataSource::Value( v.clone() ),
        }
    }


    /// True when both describe the same object or value.
    pub fn equivalent( &self, other: &DataSource ) -> bool {
        self.to_stored() == other.to_stored()
    }
}


/// Persisted form of a data source: an object reference or a raw value.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( untagged )]
pub enum StoredDataSource {
    Object {
        #[serde( rename = "objectType" )]
        object_type: ObjectType,

        #[serde( rename = "persistentInfo" )]
        persistent_info: String,
    },
    Value( Value ),
}


/// One step of a persisted node path.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
pub struct StoredNode {
    #[serde( rename = "handlerID" )]
    pub handler_id: String,

    #[serde( rename = "persistentID" )]
    pub persistent_id: String,

    #[serde( rename = "dataSource" )]
    pub data_source: StoredDataSource,
}


/// Per-node scratch state owned by the engine.
#[derive( Default )]
pub struct NodeTag {
    /// Number of widgets currently showing this node expanded.
    pub expand_lock: u32,

    /// Subscription to library changes, live while expanded.
    pub listener: Option<CancellationToken>,

    /// Last change notification that asked for a refresh.
    pub last_trigger: Option<Instant>,

    /// A deferred refresh timer is pending.
    pub refresh_armed: bool,

    /// Children must be fetched again on the next load.
    pub stale: bool,

    /// Bumped by every invalidation. A load that started under an older
    /// generation leaves the node stale.
    pub generation: u64,

    /// Restored straight from a stored descriptor rather than enumerated.
    pub virtual_child: bool,

    pub( crate ) pending_load: Option<SharedLoad>,

    /// Cancels the children load in flight, if any.
    pub( crate ) load_token: Option<CancellationToken>,
}


impl std::fmt::Debug for NodeTag {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "NodeTag" )
            .field( "expand_lock", &self.expand_lock )
            .field( "listening", &self.listener.is_some() )
            .field( "refresh_armed", &self.refresh_armed )
            .field( "stale", &self.stale )
            .field( "generation", &self.generation )
            .field( "virtual_child", &self.virtual_child )
            .finish()
    }
}


/// A position in the tree.
#[derive( Debug )]
pub struct Node {
    pub kind: NodeKind,
    pub data_source: DataSource,
    pub persistent_id: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,

    /// Children have been loaded at least once.
    pub expanded: bool,

    /// A children load is in flight.
    pub expanding: bool,

    pub tag: NodeTag,
    token: CancellationToken,
    update_snapshot: Option<Vec<NodeId>>,
}


impl Node {
    fn new( kind: NodeKind, data_source: DataSource, persistent_id: String, parent: Option<NodeId>, token: CancellationToken ) -> Self {
        Self {
            kind,
            data_source,
            persistent_id,
            parent,
            children: Vec::new(),
            expanded: false,
            expanding: false,
            tag: NodeTag::default(),
            token,
            update_snapshot: None,
        }
    }


    /// True once the node was discarded; async work must not touch it.
    pub fn canceled( &self ) -> bool {
        self.token.is_cancelled()
    }


    /// Token canceled when the node is discarded.
    pub fn token( &self ) -> CancellationToken {
        self.token.clone()
    }


    pub fn is_updating( &self ) -> bool {
        self.update_snapshot.is_some()
    }
}


/// Arena holding the whole tree.
#[derive( Debug )]
pub struct NodeTree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}


impl NodeTree {
    /// Creates a tree with a single root node.
    pub fn new( root_kind: NodeKind, root_persistent_id: impl Into<String> ) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert( Node::new(
            root_kind,
            DataSource::None,
            root_persistent_id.into(),
            None,
            CancellationToken::new(),
        ) );
        Self { nodes, root }
    }


    pub fn root( &self ) -> NodeId {
        self.root
    }


    pub fn get( &self, id: NodeId ) -> Option<&Node> {
        self.nodes.get( id )
    }


    pub fn get_mut( &mut self, id: NodeId ) -> Option<&mut Node> {
        self.nodes.get_mut( id )
    }


    /// Like `get`, but a missing node is an error.
    pub fn node( &self, id: NodeId ) -> TreeResult<&Node> {
        self.nodes.get( id ).ok_or( TreeError::NodeGone )
    }


    pub fn node_mut( &mut self, id: NodeId ) -> TreeResult<&mut Node> {
        self.nodes.get_mut( id ).ok_or( TreeError::NodeGone )
    }


    pub fn contains( &self, id: NodeId ) -> bool {
        self.nodes.contains_key( id )
    }


    pub fn len( &self ) -> usize {
        self.nodes.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.nodes.is_empty()
    }


    /// Children of a node; empty when the node is gone.
    pub fn children( &self, id: NodeId ) -> &[NodeId] {
        self.nodes.get( id ).map( |n| n.children.as_slice() ).unwrap_or( &[] )
    }


    /// Finds a direct child by persistent id.
    pub fn find_child( &self, parent: NodeId, persistent_id: &str ) -> Option<NodeId> {
        self.children( parent ).iter()
            .copied()
            .find( |c| self.nodes.get( *c ).map( |n| n.persistent_id == persistent_id ).unwrap_or( false ) )
    }


    /// Path from the root down to `id`, both included.
    pub fn ancestors( &self, id: NodeId ) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some( id );
        while let Some( cur ) = current {
            let Some( node ) = self.nodes.get( cur ) else {
                break;
            };
            path.push( cur );
            current = node.parent;
        }
        path.reverse();
        path
    }


    /// Every node of the subtree rooted at `id`, children before parents.
    pub fn descendants_post_order( &self, id: NodeId ) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![ ( id, false ) ];
        while let Some( ( cur, visited ) ) = stack.pop() {
            if visited {
                out.push( cur );
                continue;
            }
            if !self.nodes.contains_key( cur ) {
                continue;
            }
            stack.push( ( cur, true ) );
            for &child in self.children( cur ).iter().rev() {
                stack.push( ( child, false ) );
            }
        }
        out
    }


    /// Snapshots the current children so a reload can be diffed.
    pub fn begin_update( &mut self, id: NodeId ) -> TreeResult<()> {
        let node = self.node_mut( id )?;
        if node.update_snapshot.is_none() {
            node.update_snapshot = Some( std::mem::take( &mut node.children ) );
        }
        Ok(())
    }


    /// Adds a child. During an update, a previous child with the same kind
    /// and persistent id is reused instead of duplicated.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        data_source: DataSource,
        persistent_id: String,
    ) -> TreeResult<NodeId> {
        let ( reuse, token ) = {
            let node = self.node( parent )?;
            let candidates = node.update_snapshot.as_deref().unwrap_or( &[] ).iter()
                .chain( node.children.iter() );
            let mut reuse = None;
            for &c in candidates {
                if let Some( child ) = self.nodes.get( c ) {
                    if child.kind == kind && child.persistent_id == persistent_id {
                        reuse = Some( c );
                        break;
                    }
                }
            }
            ( reuse, node.token.child_token() )
        };

        if let Some( existing ) = reuse {
            let child = self.node_mut( existing )?;
            child.data_source = data_source;
            let parent_node = self.node_mut( parent )?;
            if !parent_node.children.contains( &existing ) {
                parent_node.children.push( existing );
            }
            return Ok( existing );
        }

        let id = self.nodes.insert( Node::new( kind, data_source, persistent_id, Some( parent ), token ) );
        self.node_mut( parent )?.children.push( id );
        Ok( id )
    }


    /// Finishes an update and returns the children that were not re-added.
    /// The returned nodes are detached but still in the arena; the caller
    /// disposes of them.
    pub fn end_update_and_get_deleted( &mut self, id: NodeId ) -> TreeResult<Vec<NodeId>> {
        let node = self.node_mut( id )?;
        let snapshot = node.update_snapshot.take().unwrap_or_default();
        let deleted = snapshot.into_iter()
            .filter( |c| !node.children.contains( c ) )
            .collect();
        Ok( deleted )
    }


    /// Abandons an update, restoring the children as they were.
    pub fn abort_update( &mut self, id: NodeId ) {
        if let Some( node ) = self.nodes.get_mut( id ) {
            if let Some( snapshot ) = node.update_snapshot.take() {
                let added: Vec<NodeId> = node.children.iter()
                    .copied()
                    .filter( |c| !snapshot.contains( c ) )
                    .collect();
                node.children = snapshot;
                for orphan in added {
                    self.remove_subtree( orphan );
                }
            }
        }
    }


    /// Removes a node and its descendants, canceling their tokens and
    /// listeners. Returns the removed ids.
    pub fn remove_subtree( &mut self, id: NodeId ) -> Vec<NodeId> {
        if id == self.root {
            tracing::warn!( "Refusing to remove the root node" );
            return Vec::new();
        }
        let parent = self.nodes.get( id ).and_then( |n| n.parent );
        if let Some( parent ) = parent.and_then( |p| self.nodes.get_mut( p ) ) {
            parent.children.retain( |c| *c != id );
            if let Some( snapshot ) = parent.update_snapshot.as_mut() {
                snapshot.retain( |c| *c != id );
            }
        }

        let removed = self.descendants_post_order( id );
        for &r in &removed {
            if let Some( node ) = self.nodes.remove( r ) {
                node.token.cancel();
                if let Some( listener ) = node.tag.listener {
                    listener.cancel();
                }
            }
        }
        removed
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::domain::MediaObject;


    fn album( id: &str ) -> DataSource {
        DataSource::Object( MediaObject::new( ObjectType::Album, id, id ).into_ref() )
    }


    #[test]
    fn test_update_reuses_and_reports_deleted() {
        let mut tree = NodeTree::new( NodeKind::Root, "root" );
        let root = tree.root();
        let a = tree.add_child( root, NodeKind::Album, album( "a" ), "album:a".into() ).unwrap();
        let b = tree.add_child( root, NodeKind::Album, album( "b" ), "album:b".into() ).unwrap();

        tree.begin_update( root ).unwrap();
        let b2 = tree.add_child( root, NodeKind::Album, album( "b" ), "album:b".into() ).unwrap();
        let c = tree.add_child( root, NodeKind::Album, album( "c" ), "album:c".into() ).unwrap();
        let deleted = tree.end_update_and_get_deleted( root ).unwrap();

        assert_eq!( b, b2 );
        assert_eq!( deleted, vec![ a ] );
        assert_eq!( tree.children( root ), &[ b, c ] );
    }


    #[test]
    fn test_abort_update_restores_children() {
        let mut tree = NodeTree::new( NodeKind::Root, "root" );
        let root = tree.root();
        let a = tree.add_child( root, NodeKind::Album, album( "a" ), "album:a".into() ).unwrap();

        tree.begin_update( root ).unwrap();
        let extra = tree.add_child( root, NodeKind::Album, album( "x" ), "album:x".into() ).unwrap();
        tree.abort_update( root );

        assert_eq!( tree.children( root ), &[ a ] );
        assert!( !tree.contains( extra ) );
    }


    #[test]
    fn test_remove_subtree_cancels_descendants() {
        let mut tree = NodeTree::new( NodeKind::Root, "root" );
        let root = tree.root();
        let branch = tree.add_child( root, NodeKind::Playlists, DataSource::None, "playlists".into() ).unwrap();
        let leaf = tree.add_child( branch, NodeKind::Playlist, DataSource::None, "playlist:1".into() ).unwrap();
        let leaf_token = tree.get( leaf ).unwrap().token();

        let removed = tree.remove_subtree( branch );

        assert_eq!( removed, vec![ leaf, branch ] );
        assert!( leaf_token.is_cancelled() );
        assert!( tree.children( root ).is_empty() );
        assert_eq!( tree.len(), 1 );
    }


    #[test]
    fn test_ancestors_and_find_child() {
        let mut tree = NodeTree::new( NodeKind::Root, "root" );
        let root = tree.root();
        let branch = tree.add_child( root, NodeKind::Playlists, DataSource::None, "playlists".into() ).unwrap();
        let leaf = tree.add_child( branch, NodeKind::Playlist, DataSource::None, "playlist:1".into() ).unwrap();

        assert_eq!( tree.ancestors( leaf ), vec![ root, branch, leaf ] );
        assert_eq!( tree.find_child( branch, "playlist:1" ), Some( leaf ) );
        assert_eq!( tree.find_child( root, "playlist:1" ), None );
    }


    #[test]
    fn test_stored_data_source_json_shape() {
        let stored = album( "kob" ).to_stored();
        let json = serde_json::to_value( &stored ).unwrap();
        assert_eq!( json, serde_json::json!( { "objectType": "album", "persistentInfo": "kob" } ) );

        let raw: StoredDataSource = serde_json::from_value( serde_json::json!( 42 ) ).unwrap();
        assert_eq!( raw, StoredDataSource::Value( serde_json::json!( 42 ) ) );

        let back: StoredDataSource = serde_json::from_value( json ).unwrap();
        assert_eq!( back, stored );
    }
}
