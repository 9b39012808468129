//! Flattened node tree for the tree pane.

use mediatree_core::{ NodeEngine, NodeId };


/// One visible line of the tree.
#[derive( Debug, Clone, PartialEq )]
pub struct TreeRow {
    pub id: NodeId,
    pub depth: usize,
    pub title: String,
    pub expanded: bool,
    pub has_children: bool,
}


/// Rows of the expanded part of the tree plus the selection.
#[derive( Debug, Default )]
pub struct TreePane {
    rows: Vec<TreeRow>,
    selected: usize,
}


impl TreePane {
    pub fn new() -> Self {
        Self::default()
    }


    /// Re-reads the tree, keeping the selection on the same node when it
    /// still exists.
    pub fn rebuild( &mut self, engine: &NodeEngine ) {
        let keep = self.selected_node();
        self.rows.clear();
        Self::collect( engine, engine.root(), 0, &mut self.rows );

        self.selected = keep
            .and_then( |id| self.rows.iter().position( |r| r.id == id ) )
            .unwrap_or_else( || self.selected.min( self.rows.len().saturating_sub( 1 ) ) );
    }


    fn collect( engine: &NodeEngine, id: NodeId, depth: usize, rows: &mut Vec<TreeRow> ) {
        let title = match engine.title( id ) {
            Ok( title ) => title,
            Err( e ) => {
                tracing::warn!( "Skipping node without title: {}", e );
                return;
            }
        };
        let expanded = engine.expand_lock( id ) > 0 && engine.is_expanded( id );
        rows.push( TreeRow {
            id,
            depth,
            title,
            expanded,
            has_children: engine.has_children( id ).unwrap_or( false ),
        } );
        if expanded {
            for child in engine.children( id ) {
                Self::collect( engine, child, depth + 1, rows );
            }
        }
    }


    pub fn rows( &self ) -> &[TreeRow] {
        &self.rows
    }


    pub fn selected_index( &self ) -> usize {
        self.selected
    }


    pub fn selected_node( &self ) -> Option<NodeId> {
        self.rows.get( self.selected ).map( |r| r.id )
    }


    pub fn select_node( &mut self, id: NodeId ) -> bool {
        match self.rows.iter().position( |r| r.id == id ) {
            Some( index ) => {
                self.selected = index;
                true
            }
            None => false,
        }
    }


    pub fn select_next( &mut self ) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }


    pub fn select_previous( &mut self ) {
        self.selected = self.selected.saturating_sub( 1 );
    }


    /// Text lines of the tree, indented two spaces per level.
    pub fn render_lines( &self ) -> Vec<String> {
        self.rows.iter()
            .map( |row| {
                let marker = match ( row.has_children, row.expanded ) {
                    ( false, _ ) => " ",
                    ( true, true ) => "v",
                    ( true, false ) => ">",
                };
                format!( "{}{} {}", "  ".repeat( row.depth ), marker, row.title )
            } )
            .collect()
    }
}


#[cfg( test )]
mod tests {
    use std::sync::Arc;

    use mediatree_core::library::LibraryFixture;
    use mediatree_core::{
        EngineConfig, MediaObject, MemoryLibrary, NodeHandlerRegistry, ObjectType, StateStore,
    };

    use super::*;


    fn engine() -> NodeEngine {
        let fixture = LibraryFixture {
            objects: vec![
                MediaObject::new( ObjectType::Collection, "music", "Music" ),
                MediaObject::new( ObjectType::Track, "t1", "So What" ).with_collection( "music" ).with_album( "kob" ),
            ],
            ..Default::default()
        };
        NodeEngine::new(
            Arc::new( NodeHandlerRegistry::with_defaults().unwrap() ),
            Arc::new( MemoryLibrary::from_fixture( fixture ) ),
            Arc::new( StateStore::in_memory() ),
            EngineConfig::default(),
        ).unwrap()
    }


    #[tokio::test]
    async fn test_rebuild_follows_expansion() {
        let engine = engine();
        let mut pane = TreePane::new();
        pane.rebuild( &engine );
        assert_eq!( pane.rows().len(), 1 );

        engine.expand( engine.root() ).await.unwrap();
        pane.rebuild( &engine );
        let lines = pane.render_lines();
        assert!( lines[0].starts_with( "v " ) );
        assert!( lines.iter().any( |l| l.starts_with( "  > Music" ) ) );

        pane.select_next();
        let music = pane.selected_node().unwrap();
        engine.expand( music ).await.unwrap();
        pane.rebuild( &engine );
        assert_eq!( pane.selected_node(), Some( music ) );
        assert!( pane.rows().iter().any( |r| r.depth == 2 ) );
    }
}
