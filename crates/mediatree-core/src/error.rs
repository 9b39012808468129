//! Error types shared by the node engine, view host and navigation.
//!
//! `TreeError` is `Clone` because a single in-flight children load is
//! shared between every caller that asked for it.

use thiserror::Error;

use crate::node::NodeId;
use crate::node_handler::NodeKind;
use crate::view_handler::ViewKind;


/// Result alias used across the crate.
pub type TreeResult<T> = Result<T, TreeError>;


/// Errors raised by the tree engine.
#[derive( Debug, Clone, Error, PartialEq )]
pub enum TreeError {
    /// A persisted or configured handler id does not name any handler kind.
    #[error( "Unknown node handler: {0}" )]
    UnknownHandler( String ),

    /// A handler kind was referenced before being registered.
    #[error( "Node handler not registered: {0}" )]
    UnregisteredHandler( NodeKind ),

    /// A view handler kind was referenced before being registered.
    #[error( "View handler not registered: {0}" )]
    UnregisteredView( ViewKind ),

    /// A node handler needs a domain object but the node carries none.
    #[error( "Node handler {0} requires a data source" )]
    MissingDataSource( NodeKind ),

    /// The node id no longer refers to a live node.
    #[error( "Node no longer exists" )]
    NodeGone,

    /// The object could not be resolved locally or online.
    #[error( "Not found: {0}" )]
    NotFound( String ),

    /// Path resolution stopped early; `deepest` is the last node reached.
    #[error( "Path resolved only partially" )]
    PathIncomplete { deepest: NodeId },

    /// Work was abandoned because its node or view went away.
    #[error( "Operation canceled" )]
    Canceled,

    /// The handler does not support the requested operation.
    #[error( "Operation not supported by {0}" )]
    Unsupported( String ),

    #[error( "Library error: {0}" )]
    Library( String ),

    #[error( "State store error: {0}" )]
    Store( String ),
}


impl TreeError {
    /// Returns true for configuration errors that must be surfaced loudly.
    pub fn is_fatal( &self ) -> bool {
        matches!(
            self,
            TreeError::UnknownHandler( _ )
                | TreeError::UnregisteredHandler( _ )
                | TreeError::UnregisteredView( _ )
                | TreeError::MissingDataSource( _ )
        )
    }


    /// Returns true when the error only signals cancellation.
    pub fn is_canceled( &self ) -> bool {
        matches!( self, TreeError::Canceled | TreeError::NodeGone )
    }
}


impl From<crate::library::LibraryError> for TreeError {
    fn from( err: crate::library::LibraryError ) -> Self {
        TreeError::Library( err.to_string() )
    }
}


impl From<crate::store::StoreError> for TreeError {
    fn from( err: crate::store::StoreError ) -> Self {
        TreeError::Store( err.to_string() )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_fatal_classification() {
        assert!( TreeError::UnknownHandler( "bogus".into() ).is_fatal() );
        assert!( TreeError::MissingDataSource( NodeKind::Album ).is_fatal() );
        assert!( !TreeError::Canceled.is_fatal() );
        assert!( !TreeError::NotFound( "x".into() ).is_fatal() );
    }


    #[test]
    fn test_cancel_classification() {
        assert!( TreeError::Canceled.is_canceled() );
        assert!( TreeError::NodeGone.is_canceled() );
        assert!( !TreeError::Library( "db".into() ).is_canceled() );
    }
}
