//! Reference-counted data sources shared between sub-views.
//!
//! An artist view and its info header show the same artist lists. The
//! source lives in an arena slot; each consumer holds a `SourceId` and calls
//! `release` when done. The last release cancels the source's token, which
//! stops its background fills, and frees the slot.

use std::sync::Arc;

use slotmap::{ new_key_type, SlotMap };
use tokio_util::sync::CancellationToken;

use crate::domain::MediaRef;
use crate::error::{ TreeError, TreeResult };
use crate::library::{ get_album_list, get_tracklist, MediaLibrary };
use crate::list::MediaList;


new_key_type! {
    /// Handle to a shared data source.
    pub struct SourceId;
}


/// Lists of one artist, shared by every view showing that artist.
#[derive( Debug )]
pub struct ArtistDataSource {
    pub artist: MediaRef,
    pub tracklist: MediaList,
    pub albumlist: MediaList,
    token: CancellationToken,
    refs: usize,
}


impl ArtistDataSource {
    pub fn token( &self ) -> CancellationToken {
        self.token.clone()
    }
}


/// Outcome of `SharedSources::release`.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Released {
    /// Still referenced this many times.
    Alive( usize ),

    /// The last reference went away; the source was disposed.
    Disposed,
}


/// Arena of shared artist sources.
#[derive( Debug, Default )]
pub struct SharedSources {
    artists: SlotMap<SourceId, ArtistDataSource>,
    disposed: usize,
}


impl SharedSources {
    pub fn new() -> Self {
        Self::default()
    }


    /// Returns the source for `artist`, creating it on first use. Either way
    /// the caller owns one reference.
    pub fn acquire_artist( &mut self, library: &Arc<dyn MediaLibrary>, artist: &MediaRef ) -> SourceId {
        let existing = self.artists.iter()
            .find( |( _, s )| s.artist.same_object( artist ) )
            .map( |( id, _ )| id );
        if let Some( id ) = existing {
            if let Some( source ) = self.artists.get_mut( id ) {
                source.refs += 1;
                return id;
            }
        }

        let token = CancellationToken::new();
        let source = ArtistDataSource {
            artist: artist.clone(),
            tracklist: get_tracklist( library.clone(), artist.clone(), token.child_token() ),
            albumlist: get_album_list( library.clone(), artist.clone(), token.child_token() ),
            token,
            refs: 1,
        };
        tracing::debug!( "Created shared source for artist {}", artist.persistent_info );
        self.artists.insert( source )
    }


    /// Adds a reference and returns the new count.
    pub fn add_ref( &mut self, id: SourceId ) -> TreeResult<usize> {
        let source = self.artists.get_mut( id ).ok_or( TreeError::NodeGone )?;
        source.refs += 1;
        Ok( source.refs )
    }


    /// Drops a reference; the last one disposes the source.
    pub fn release( &mut self, id: SourceId ) -> TreeResult<Released> {
        let source = self.artists.get_mut( id ).ok_or( TreeError::NodeGone )?;
        source.refs -= 1;
        if source.refs > 0 {
            return Ok( Released::Alive( source.refs ) );
        }

        if let Some( source ) = self.artists.remove( id ) {
            source.token.cancel();
            self.disposed += 1;
            tracing::debug!( "Disposed shared source for artist {}", source.artist.persistent_info );
        }
        Ok( Released::Disposed )
    }


    pub fn get( &self, id: SourceId ) -> Option<&ArtistDataSource> {
        self.artists.get( id )
    }


    pub fn ref_count( &self, id: SourceId ) -> usize {
        self.artists.get( id ).map_or( 0, |s| s.refs )
    }


    /// Number of sources disposed so far.
    pub fn disposed_count( &self ) -> usize {
        self.disposed
    }


    pub fn live_count( &self ) -> usize {
        self.artists.len()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::domain::ObjectType;
    use crate::library::tests::sample_library;


    async fn miles( library: &Arc<dyn MediaLibrary> ) -> MediaRef {
        library.get_object( ObjectType::Artist, "miles" ).await.unwrap().unwrap()
    }


    #[tokio::test]
    async fn test_n_refs_need_n_releases() {
        let library: Arc<dyn MediaLibrary> = Arc::new( sample_library() );
        let artist = miles( &library ).await;
        let mut sources = SharedSources::new();

        let id = sources.acquire_artist( &library, &artist );
        assert_eq!( sources.add_ref( id ).unwrap(), 2 );
        assert_eq!( sources.add_ref( id ).unwrap(), 3 );
        let token = sources.get( id ).unwrap().token();

        assert_eq!( sources.release( id ).unwrap(), Released::Alive( 2 ) );
        assert_eq!( sources.release( id ).unwrap(), Released::Alive( 1 ) );
        assert!( !token.is_cancelled() );
        assert_eq!( sources.disposed_count(), 0 );

        assert_eq!( sources.release( id ).unwrap(), Released::Disposed );
        assert!( token.is_cancelled() );
        assert_eq!( sources.disposed_count(), 1 );
        assert_eq!( sources.live_count(), 0 );

        assert!( sources.release( id ).is_err() );
        assert_eq!( sources.disposed_count(), 1 );
    }


    #[tokio::test]
    async fn test_acquire_dedupes_by_artist() {
        let library: Arc<dyn MediaLibrary> = Arc::new( sample_library() );
        let artist = miles( &library ).await;
        let mut sources = SharedSources::new();

        let a = sources.acquire_artist( &library, &artist );
        let b = sources.acquire_artist( &library, &artist );
        assert_eq!( a, b );
        assert_eq!( sources.ref_count( a ), 2 );

        let source = sources.get( a ).unwrap();
        source.albumlist.when_loaded().await;
        assert_eq!( source.albumlist.len(), 1 );
    }
}
