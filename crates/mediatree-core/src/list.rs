//! Shared observable lists.
//!
//! A `SharedList` is a reference-counted handle: cloning it yields the same
//! list, and every holder sees the same content and change notifications.
//! Controls, caches and sub-views hold on to a list's identity, so content
//! replacement goes through `use_list` instead of swapping handles.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{ broadcast, watch };

use crate::domain::MediaRef;


const CHANGE_CHANNEL_CAPACITY: usize = 64;


/// Change notification emitted by a list.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ListChange {
    /// Items were inserted starting at `index`.
    Insert { index: usize, count: usize },

    /// The item at `index` was removed.
    Delete { index: usize },

    /// The list was emptied.
    Clear,

    /// The whole content was replaced.
    NewContent,
}


struct ListInner<T> {
    items: RwLock<Vec<T>>,
    loaded: watch::Sender<bool>,
    changes: broadcast::Sender<ListChange>,
}


/// An ordered, observable collection shared by identity.
pub struct SharedList<T> {
    inner: Arc<ListInner<T>>,
}


/// List of domain objects, the common case.
pub type MediaList = SharedList<MediaRef>;


impl<T> Clone for SharedList<T> {
    fn clone( &self ) -> Self {
        Self { inner: Arc::clone( &self.inner ) }
    }
}


impl<T> std::fmt::Debug for SharedList<T> {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "SharedList" )
            .field( "len", &self.inner.items.read().len() )
            .field( "loaded", &*self.inner.loaded.borrow() )
            .finish()
    }
}


impl<T: Clone + Send + Sync + 'static> SharedList<T> {
    /// Creates an empty list that is still loading.
    pub fn new() -> Self {
        let ( loaded, _ ) = watch::channel( false );
        let ( changes, _ ) = broadcast::channel( CHANGE_CHANNEL_CAPACITY );
        Self {
            inner: Arc::new( ListInner {
                items: RwLock::new( Vec::new() ),
                loaded,
                changes,
            } ),
        }
    }


    /// Creates a fully loaded list with the given items.
    pub fn from_items( items: Vec<T> ) -> Self {
        let list = Self::new();
        *list.inner.items.write() = items;
        list.set_loaded();
        list
    }


    /// Returns true if both handles refer to the same list.
    pub fn ptr_eq( &self, other: &Self ) -> bool {
        Arc::ptr_eq( &self.inner, &other.inner )
    }


    /// Marks the initial fill as complete and wakes `when_loaded` waiters.
    pub fn set_loaded( &self ) {
        self.inner.loaded.send_replace( true );
    }


    /// Returns true once the initial fill completed.
    pub fn is_loaded( &self ) -> bool {
        *self.inner.loaded.borrow()
    }


    /// Resolves once the initial fill completed.
    pub async fn when_loaded( &self ) {
        let mut rx = self.inner.loaded.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for( |loaded| *loaded ).await;
    }


    /// Runs `f` with a consistent view of the items.
    pub fn locked<R>( &self, f: impl FnOnce( &[T] ) -> R ) -> R {
        let items = self.inner.items.read();
        f( &items )
    }


    pub fn len( &self ) -> usize {
        self.inner.items.read().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.inner.items.read().is_empty()
    }


    pub fn get( &self, index: usize ) -> Option<T> {
        self.inner.items.read().get( index ).cloned()
    }


    /// Returns a snapshot of the items.
    pub fn to_vec( &self ) -> Vec<T> {
        self.inner.items.read().clone()
    }


    /// Appends one item.
    pub fn add( &self, item: T ) {
        let index = {
            let mut items = self.inner.items.write();
            items.push( item );
            items.len() - 1
        };
        self.notify( ListChange::Insert { index, count: 1 } );
    }


    /// Appends many items.
    pub fn add_list( &self, more: impl IntoIterator<Item = T> ) {
        let ( index, count ) = {
            let mut items = self.inner.items.write();
            let index = items.len();
            items.extend( more );
            ( index, items.len() - index )
        };
        if count > 0 {
            self.notify( ListChange::Insert { index, count } );
        }
    }


    /// Removes the item at `index`.
    pub fn remove( &self, index: usize ) -> Option<T> {
        let removed = {
            let mut items = self.inner.items.write();
            if index < items.len() { Some( items.remove( index ) ) } else { None }
        };
        if removed.is_some() {
            self.notify( ListChange::Delete { index } );
        }
        removed
    }


    pub fn clear( &self ) {
        self.inner.items.write().clear();
        self.notify( ListChange::Clear );
    }


    /// Replaces the content with the content of `other`, keeping this
    /// list's identity so existing holders keep receiving updates.
    pub fn use_list( &self, other: &Self ) {
        if self.ptr_eq( other ) {
            return;
        }
        let content = other.to_vec();
        self.replace_content( content );
        if other.is_loaded() {
            self.set_loaded();
        }
    }


    /// Replaces the content with `items`, keeping this list's identity.
    pub fn replace_content( &self, items: Vec<T> ) {
        *self.inner.items.write() = items;
        self.notify( ListChange::NewContent );
    }


    /// Returns a new, independent list with the same content.
    pub fn get_copy( &self ) -> Self {
        let copy = Self::new();
        *copy.inner.items.write() = self.to_vec();
        if self.is_loaded() {
            copy.set_loaded();
        }
        copy
    }


    /// Subscribes to change notifications.
    pub fn subscribe( &self ) -> broadcast::Receiver<ListChange> {
        self.inner.changes.subscribe()
    }


    fn notify( &self, change: ListChange ) {
        // No receivers is fine.
        let _ = self.inner.changes.send( change );
    }
}


impl<T: Clone + Send + Sync + 'static> Default for SharedList<T> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[tokio::test]
    async fn test_when_loaded_resolves_after_fill() {
        let list: SharedList<u32> = SharedList::new();
        assert!( !list.is_loaded() );

        let filler = list.clone();
        let task = tokio::spawn( async move {
            filler.add_list( vec![ 1, 2, 3 ] );
            filler.set_loaded();
        } );

        list.when_loaded().await;
        task.await.unwrap();
        assert!( list.is_loaded() );
        assert_eq!( list.to_vec(), vec![ 1, 2, 3 ] );
    }


    #[test]
    fn test_use_list_keeps_identity() {
        let live = SharedList::from_items( vec![ 1, 2, 3, 4 ] );
        let holder = live.clone();
        let mut rx = holder.subscribe();

        let filtered = SharedList::from_items( vec![ 2, 4 ] );
        live.use_list( &filtered );

        assert!( holder.ptr_eq( &live ) );
        assert!( !holder.ptr_eq( &filtered ) );
        assert_eq!( holder.to_vec(), vec![ 2, 4 ] );
        assert_eq!( rx.try_recv().unwrap(), ListChange::NewContent );
    }


    #[test]
    fn test_get_copy_is_independent() {
        let list = SharedList::from_items( vec![ "a", "b" ] );
        let copy = list.get_copy();
        copy.add( "c" );

        assert!( !copy.ptr_eq( &list ) );
        assert_eq!( list.len(), 2 );
        assert_eq!( copy.len(), 3 );
        assert!( copy.is_loaded() );
    }


    #[test]
    fn test_change_notifications() {
        let list: SharedList<u8> = SharedList::new();
        let mut rx = list.subscribe();

        list.add( 7 );
        list.add_list( vec![ 8, 9 ] );
        list.remove( 0 );
        list.clear();

        assert_eq!( rx.try_recv().unwrap(), ListChange::Insert { index: 0, count: 1 } );
        assert_eq!( rx.try_recv().unwrap(), ListChange::Insert { index: 1, count: 2 } );
        assert_eq!( rx.try_recv().unwrap(), ListChange::Delete { index: 0 } );
        assert_eq!( rx.try_recv().unwrap(), ListChange::Clear );
    }


    #[test]
    fn test_locked_reads_consistent_snapshot() {
        let list = SharedList::from_items( vec![ 3, 1, 2 ] );
        let sum = list.locked( |items| items.iter().sum::<i32>() );
        assert_eq!( sum, 6 );
    }
}
