//! Mediatree Core - Node tree and view engine for a media library
//!
//! This crate provides the navigable tree of a media library: node handlers
//! and the expansion/refresh engine, view handlers with their cached data
//! sources, the column browser, and path navigation.

pub mod column_browser;
pub mod command;
pub mod config;
pub mod domain;
pub mod error;
pub mod library;
pub mod list;
pub mod nav;
pub mod node;
pub mod node_engine;
pub mod node_handler;
pub mod node_handlers;
pub mod shared_source;
pub mod store;
pub mod view;
pub mod view_handler;
pub mod view_handlers;

pub use column_browser::{ ColumnBrowser, ColumnField };
pub use command::{ Command, CommandError };
pub use config::EngineConfig;
pub use domain::{ MediaObject, MediaRef, ObjectType };
pub use error::{ TreeError, TreeResult };
pub use library::{ MediaLibrary, MemoryLibrary };
pub use list::{ MediaList, SharedList };
pub use nav::{ NavKind, NavUtils, ProgressReporter };
pub use node::{ DataSource, NodeId, StoredNode };
pub use node_engine::NodeEngine;
pub use node_handler::{ NodeHandlerRegistry, NodeKind };
pub use store::StateStore;
pub use view::{ ViewData, ViewHost };
pub use view_handler::{ ViewHandlerRegistry, ViewKind };
