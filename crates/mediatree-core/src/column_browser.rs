//! Column browser: filters the list a view shows by genre, artist, album or
//! year.
//!
//! The browser keeps an unfiltered copy of the view's list in the cache and
//! writes filtered content into the live list with `replace_content`/`use_list`.
//! The live list is never swapped for another object; controls and other
//! sub-views keep holding it and keep receiving its change notifications.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::{ MediaObject, ObjectType };
use crate::error::{ TreeError, TreeResult };
use crate::list::MediaList;
use crate::view::{ CacheKey, ViewData };


/// A column of the browser.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum ColumnField {
    Genre,
    Artist,
    Album,
    Year,
}


impl ColumnField {
    pub const ALL: [ColumnField; 4] = [ ColumnField::Genre, ColumnField::Artist, ColumnField::Album, ColumnField::Year ];


    pub fn id( &self ) -> &'static str {
        match self {
            ColumnField::Genre => "genre",
            ColumnField::Artist => "artist",
            ColumnField::Album => "album",
            ColumnField::Year => "year",
        }
    }


    /// The object's value in this column.
    pub fn value( &self, object: &MediaObject ) -> Option<String> {
        match self {
            ColumnField::Genre => object.genre.clone(),
            ColumnField::Artist if object.object_type == ObjectType::Artist => Some( object.persistent_info.clone() ),
            ColumnField::Artist => object.artist.clone(),
            ColumnField::Album if object.object_type == ObjectType::Album => Some( object.persistent_info.clone() ),
            ColumnField::Album => object.album.clone(),
            ColumnField::Year => object.year.map( |y| y.to_string() ),
        }
    }
}


impl fmt::Display for ColumnField {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.id() )
    }
}


impl FromStr for ColumnField {
    type Err = String;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ColumnField::ALL.iter()
            .copied()
            .find( |f| f.id() == wanted )
            .ok_or_else( || format!( "unknown column '{}'", s ) )
    }
}


#[derive( Debug, Clone, PartialEq, Eq )]
pub struct ColumnFilter {
    pub field: ColumnField,
    pub value: String,
}


impl ColumnFilter {
    fn matches( &self, object: &MediaObject ) -> bool {
        self.field.value( object ).as_deref() == Some( self.value.as_str() )
    }
}


/// Filter state over one cached list of a view.
#[derive( Debug )]
pub struct ColumnBrowser {
    key: CacheKey,
    live: MediaList,
    unfiltered: MediaList,
    filters: Vec<ColumnFilter>,
}


impl ColumnBrowser {
    /// Wraps the list cached under `key` once it has loaded.
    pub async fn attach( view: &ViewData, key: CacheKey ) -> TreeResult<Self> {
        let live = view.cached( key )
            .ok_or_else( || TreeError::Unsupported( format!( "no {} to browse", key.id() ) ) )?;

        let token = view.token();
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err( TreeError::Canceled ),
            _ = live.when_loaded() => {}
        }

        let unfiltered = match view.cached( key.unfiltered() ) {
            Some( unfiltered ) => unfiltered,
            None => {
                let copy = live.get_copy();
                view.set_cache( key.unfiltered(), copy.clone() );
                copy
            }
        };
        tracing::debug!( "Column browser attached to {} ({} items)", key.id(), unfiltered.len() );
        Ok( Self { key, live, unfiltered, filters: Vec::new() } )
    }


    pub fn key( &self ) -> CacheKey {
        self.key
    }


    pub fn live( &self ) -> &MediaList {
        &self.live
    }


    pub fn unfiltered( &self ) -> &MediaList {
        &self.unfiltered
    }


    pub fn filters( &self ) -> &[ColumnFilter] {
        &self.filters
    }


    /// Filters `field` to `value`, replacing an earlier filter on the same
    /// column.
    pub fn set_filter( &mut self, field: ColumnField, value: String ) {
        self.filters.retain( |f| f.field != field );
        self.filters.push( ColumnFilter { field, value } );
        self.reapply();
    }


    /// Restores the unfiltered content into the live list.
    pub fn clear_filter( &mut self ) {
        self.filters.clear();
        self.live.use_list( &self.unfiltered );
    }


    /// Recomputes the live content from the unfiltered copy.
    pub fn reapply( &self ) {
        if self.filters.is_empty() {
            self.live.use_list( &self.unfiltered );
            return;
        }
        let filtered: Vec<_> = self.unfiltered.locked( |items| {
            items.iter()
                .filter( |o| self.filters.iter().all( |f| f.matches( o ) ) )
                .cloned()
                .collect()
        } );
        tracing::trace!( "Column filter kept {} of {} items", filtered.len(), self.unfiltered.len() );
        self.live.replace_content( filtered );
    }


    /// Values each column offers. A column lists the values left by the
    /// filters on the other columns.
    pub fn columns( &self ) -> Vec<( ColumnField, Vec<String> )> {
        self.unfiltered.locked( |items| {
            ColumnField::ALL.iter()
                .map( |field| {
                    let values: BTreeSet<String> = items.iter()
                        .filter( |o| self.filters.iter().filter( |f| f.field != *field ).all( |f| f.matches( o ) ) )
                        .filter_map( |o| field.value( o ) )
                        .collect();
                    ( *field, values.into_iter().collect::<Vec<_>>() )
                } )
                .filter( |( _, values )| !values.is_empty() )
                .collect()
        } )
    }


    /// One-line description for the browser's control.
    pub fn summary( &self ) -> String {
        let columns: Vec<String> = self.columns().iter()
            .map( |( field, values )| {
                let active = self.filters.iter().find( |f| f.field == *field ).map( |f| f.value.as_str() );
                match active {
                    Some( value ) => format!( "{}: [{}]", field, value ),
                    None => format!( "{}: {}", field, values.len() ),
                }
            } )
            .collect();
        columns.join( " | " )
    }


    /// Leaves the view with its unfiltered content and drops the copy.
    pub fn detach( mut self, view: &ViewData ) {
        self.clear_filter();
        view.take_cache( self.key.unfiltered() );
        tracing::debug!( "Column browser detached from {}", self.key.id() );
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::library::get_tracklist;
    use crate::view::tests::test_view;


    async fn tracklist_view() -> ViewData {
        let ( view, _lib ) = test_view().await;
        let collection = view.library()
            .get_object( ObjectType::Collection, "music" ).await.unwrap().unwrap();
        let list = get_tracklist( view.library().clone(), collection, view.token() );
        list.when_loaded().await;
        view.set_cache( CacheKey::Tracklist, list );
        view
    }


    #[tokio::test]
    async fn test_filter_keeps_live_identity() {
        let view = tracklist_view().await;
        let live = view.cached( CacheKey::Tracklist ).unwrap();
        let mut changes = live.subscribe();

        let mut browser = ColumnBrowser::attach( &view, CacheKey::Tracklist ).await.unwrap();
        browser.set_filter( ColumnField::Artist, "nina".into() );

        assert!( view.cached( CacheKey::Tracklist ).unwrap().ptr_eq( &live ) );
        assert_eq!( live.len(), 2 );
        assert_eq!( changes.try_recv().unwrap(), crate::list::ListChange::NewContent );
        assert_eq!( view.cached( CacheKey::TracklistUnfiltered ).unwrap().len(), 5 );
    }


    #[tokio::test]
    async fn test_clear_filter_restores_unfiltered_copy() {
        let view = tracklist_view().await;
        let live = view.cached( CacheKey::Tracklist ).unwrap();
        let mut browser = ColumnBrowser::attach( &view, CacheKey::Tracklist ).await.unwrap();

        browser.set_filter( ColumnField::Genre, "jazz".into() );
        browser.set_filter( ColumnField::Year, "1965".into() );
        assert_eq!( live.len(), 1 );

        browser.set_filter( ColumnField::Year, "1959".into() );
        assert_eq!( live.len(), 3 );
        assert_eq!( browser.filters().len(), 2 );

        browser.clear_filter();
        assert_eq!( live.len(), 5 );
        assert!( browser.filters().is_empty() );
    }


    #[tokio::test]
    async fn test_upstream_change_reapplies_filter() {
        let view = tracklist_view().await;
        let live = view.cached( CacheKey::Tracklist ).unwrap();
        let mut browser = ColumnBrowser::attach( &view, CacheKey::Tracklist ).await.unwrap();
        browser.set_filter( ColumnField::Artist, "miles".into() );
        assert_eq!( live.len(), 3 );

        let mut fresh_items = browser.unfiltered().to_vec();
        fresh_items.push( MediaObject::new( ObjectType::Track, "t6", "All Blues" ).with_artist( "miles" ).into_ref() );
        let fresh = MediaList::from_items( fresh_items );

        let mut observer = view.subscribe_cache();
        view.update_source( CacheKey::Tracklist, &fresh );
        assert_eq!( observer.try_recv().unwrap(), CacheKey::TracklistUnfiltered );

        browser.reapply();
        assert!( view.cached( CacheKey::Tracklist ).unwrap().ptr_eq( &live ) );
        assert_eq!( live.len(), 4 );
        assert_eq!( browser.unfiltered().len(), 6 );
    }


    #[tokio::test]
    async fn test_columns_follow_other_filters() {
        let view = tracklist_view().await;
        let mut browser = ColumnBrowser::attach( &view, CacheKey::Tracklist ).await.unwrap();
        browser.set_filter( ColumnField::Genre, "blues".into() );

        let columns = browser.columns();
        let artists = columns.iter().find( |( f, _ )| *f == ColumnField::Artist ).unwrap();
        let genres = columns.iter().find( |( f, _ )| *f == ColumnField::Genre ).unwrap();
        assert_eq!( artists.1, vec![ "nina".to_string() ] );
        assert_eq!( genres.1, vec![ "blues".to_string(), "jazz".to_string() ] );
        assert!( browser.summary().contains( "genre: [blues]" ) );
    }


    #[tokio::test]
    async fn test_detach_restores_content_and_drops_copy() {
        let view = tracklist_view().await;
        let live = view.cached( CacheKey::Tracklist ).unwrap();
        let mut browser = ColumnBrowser::attach( &view, CacheKey::Tracklist ).await.unwrap();
        browser.set_filter( ColumnField::Album, "pastel".into() );
        assert_eq!( live.len(), 2 );

        browser.detach( &view );
        assert_eq!( live.len(), 5 );
        assert!( view.cached( CacheKey::TracklistUnfiltered ).is_none() );
    }


    #[test]
    fn test_field_values() {
        let album = MediaObject::new( ObjectType::Album, "kob", "Kind of Blue" ).with_year( 1959 );
        assert_eq!( ColumnField::Album.value( &album ).as_deref(), Some( "kob" ) );
        assert_eq!( ColumnField::Year.value( &album ).as_deref(), Some( "1959" ) );
        assert_eq!( ColumnField::Genre.value( &album ), None );
        assert_eq!( "Artist".parse::<ColumnField>(), Ok( ColumnField::Artist ) );
        assert!( "composer".parse::<ColumnField>().is_err() );
    }
}
