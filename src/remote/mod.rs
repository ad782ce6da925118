use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Album, Artist, MutationStep, Page, Playlist, Revision, SessionInfo, Track};

pub mod tidal;

#[cfg(test)]
pub mod memory;

pub use tidal::TidalClient;

/// Listings whose items are tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackSource {
    /// The user's favorites, newest first.
    Favorites,
    Playlist(String),
    Search(String),
    /// Track radio seeded by a track id.
    Radio(String),
}

impl std::fmt::Display for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackSource::Favorites => write!(f, "favorite tracks"),
            TrackSource::Playlist(id) => write!(f, "playlist {}", id),
            TrackSource::Search(query) => write!(f, "track search '{}'", query),
            TrackSource::Radio(id) => write!(f, "radio for track {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaylistSource {
    User,
    Search(String),
}

impl std::fmt::Display for PlaylistSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaylistSource::User => write!(f, "user playlists"),
            PlaylistSource::Search(query) => write!(f, "playlist search '{}'", query),
        }
    }
}

/// What a successful mutation left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Playlist revision after the edit, when the remote reports one.
    pub revision: Option<Revision>,
}

/// Narrow view of the remote service: paged listings and single-item
/// playlist edits. Implementations hold no per-request state.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Largest `limit` a listing call accepts.
    fn max_page_size(&self) -> usize;

    /// Largest number of track ids a single add call accepts.
    fn max_items_per_add(&self) -> usize;

    /// Whether [`MutationStep::Move`] is executed natively.
    fn supports_move(&self) -> bool;

    async fn validate_session(&self) -> Result<SessionInfo>;

    async fn track_page(&self, source: &TrackSource, offset: usize, limit: usize)
        -> Result<Page<Track>>;

    async fn playlist_page(
        &self,
        source: &PlaylistSource,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Playlist>>;

    async fn album_page(&self, query: &str, offset: usize, limit: usize) -> Result<Page<Album>>;

    async fn artist_page(&self, query: &str, offset: usize, limit: usize) -> Result<Page<Artist>>;

    /// Playlist metadata, including its current revision.
    async fn playlist(&self, playlist_id: &str) -> Result<Playlist>;

    async fn create_playlist(&self, title: &str, description: &str) -> Result<Playlist>;

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()>;

    /// Applies one step. `expected` is sent as a precondition when present;
    /// a mismatch fails with `RevisionConflict`.
    async fn mutate(
        &self,
        playlist_id: &str,
        step: &MutationStep,
        expected: Option<&Revision>,
    ) -> Result<MutationOutcome>;
}
