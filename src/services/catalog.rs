//! Read-only catalog access: favorites, search and track radio.

use std::collections::HashSet;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Album, Artist, Playlist, Track};
use crate::pager::{Collection, Dedup, Pager};
use crate::remote::{PlaylistSource, RemoteApi, TrackSource};

pub const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    #[default]
    All,
    Tracks,
    Albums,
    Artists,
    Playlists,
}

impl SearchKind {
    fn includes(self, other: SearchKind) -> bool {
        self == SearchKind::All || self == other
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<Track>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub albums: Option<Vec<Album>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artists: Option<Vec<Artist>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlists: Option<Vec<Playlist>>,
}

impl SearchResults {
    pub fn total(&self) -> usize {
        self.tracks.as_ref().map_or(0, Vec::len)
            + self.albums.as_ref().map_or(0, Vec::len)
            + self.artists.as_ref().map_or(0, Vec::len)
            + self.playlists.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendRequest {
    /// Explicit seeds; the user's favorites are used when empty.
    pub track_ids: Vec<String>,
    pub filter_criteria: Option<String>,
    pub limit_per_track: usize,
    pub limit_from_favorite: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub track: Track,
    /// Seed whose radio produced this track first.
    pub source_track_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendations {
    pub seed_track_ids: Vec<String>,
    /// Present when the seeds came from favorites.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub seed_tracks: Vec<Track>,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_criteria: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_seeds: Vec<String>,
}

pub struct CatalogService {
    remote: Arc<dyn RemoteApi>,
    pager: Pager,
}

impl CatalogService {
    pub fn new(remote: Arc<dyn RemoteApi>, pager: Pager) -> Self {
        Self { remote, pager }
    }

    pub fn clamp_limit(limit: usize) -> usize {
        limit.clamp(1, MAX_SEARCH_LIMIT)
    }

    fn check_query(query: &str) -> Result<&str> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::invalid(
                "search query cannot be empty, please provide a search term",
            ));
        }
        Ok(query)
    }

    async fn tracks_from(
        &self,
        source: &TrackSource,
        max_items: usize,
    ) -> Result<Collection<Track>> {
        self.pager
            .collect_up_to(&source.to_string(), Dedup::ByKey, max_items, |offset, limit| {
                self.remote.track_page(source, offset, limit)
            })
            .await
    }

    /// Favorites, most recently added first.
    pub async fn favorites(&self, limit: usize) -> Result<Vec<Track>> {
        let collection = self.tracks_from(&TrackSource::Favorites, limit).await?;
        info!("Catalog: fetched {} favorite track(s)", collection.items.len());
        Ok(collection.items)
    }

    pub async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let source = TrackSource::Search(Self::check_query(query)?.to_string());
        let collection = self.tracks_from(&source, Self::clamp_limit(limit)).await?;
        Ok(collection.items)
    }

    pub async fn search_albums(&self, query: &str, limit: usize) -> Result<Vec<Album>> {
        let query = Self::check_query(query)?;
        let what = format!("album search '{}'", query);
        let collection = self
            .pager
            .collect_up_to(&what, Dedup::ByKey, Self::clamp_limit(limit), |offset, page| {
                self.remote.album_page(query, offset, page)
            })
            .await?;
        Ok(collection.items)
    }

    pub async fn search_artists(&self, query: &str, limit: usize) -> Result<Vec<Artist>> {
        let query = Self::check_query(query)?;
        let what = format!("artist search '{}'", query);
        let collection = self
            .pager
            .collect_up_to(&what, Dedup::ByKey, Self::clamp_limit(limit), |offset, page| {
                self.remote.artist_page(query, offset, page)
            })
            .await?;
        Ok(collection.items)
    }

    pub async fn search_playlists(&self, query: &str, limit: usize) -> Result<Vec<Playlist>> {
        let source = PlaylistSource::Search(Self::check_query(query)?.to_string());
        let collection = self
            .pager
            .collect_up_to(
                &source.to_string(),
                Dedup::ByKey,
                Self::clamp_limit(limit),
                |offset, page| self.remote.playlist_page(&source, offset, page),
            )
            .await?;
        Ok(collection.items)
    }

    /// `limit` applies to each result type separately.
    pub async fn search(&self, query: &str, kind: SearchKind, limit: usize) -> Result<SearchResults> {
        let query = Self::check_query(query)?;
        let mut results = SearchResults::default();
        if kind.includes(SearchKind::Tracks) {
            results.tracks = Some(self.search_tracks(query, limit).await?);
        }
        if kind.includes(SearchKind::Albums) {
            results.albums = Some(self.search_albums(query, limit).await?);
        }
        if kind.includes(SearchKind::Artists) {
            results.artists = Some(self.search_artists(query, limit).await?);
        }
        if kind.includes(SearchKind::Playlists) {
            results.playlists = Some(self.search_playlists(query, limit).await?);
        }
        debug!(
            "Catalog: search '{}' ({:?}) found {} result(s)",
            query,
            kind,
            results.total()
        );
        Ok(results)
    }

    /// Collects radio for every seed, one seed at a time. Candidates are
    /// deduplicated across seeds and never include a seed. Ranking is left to
    /// the caller.
    pub async fn recommend(
        &self,
        request: RecommendRequest,
        cancel: &CancellationToken,
    ) -> Result<Recommendations> {
        let (seed_track_ids, seed_tracks) = if request.track_ids.is_empty() {
            let favorites = self.favorites(request.limit_from_favorite).await?;
            if favorites.is_empty() {
                return Err(Error::not_found(
                    "favorite tracks to use as recommendation seeds",
                ));
            }
            (favorites.iter().map(|t| t.id.clone()).collect(), favorites)
        } else {
            let mut seen = HashSet::new();
            let ids: Vec<String> = request
                .track_ids
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .collect();
            (ids, Vec::new())
        };

        let per_seed = Self::clamp_limit(request.limit_per_track);
        let seeds: HashSet<&str> = seed_track_ids.iter().map(String::as_str).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut recommendations = Vec::new();
        let mut skipped_seeds = Vec::new();

        for seed in &seed_track_ids {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let source = TrackSource::Radio(seed.clone());
            match self.tracks_from(&source, per_seed).await {
                Ok(collection) => {
                    for track in collection.items {
                        if seeds.contains(track.id.as_str()) || !seen.insert(track.id.clone()) {
                            continue;
                        }
                        recommendations.push(Recommendation {
                            track,
                            source_track_id: seed.clone(),
                        });
                    }
                }
                Err(Error::Unauthenticated) => return Err(Error::Unauthenticated),
                Err(err) => {
                    warn!("Catalog: skipping seed {}: {}", seed, err);
                    skipped_seeds.push(seed.clone());
                }
            }
        }

        info!(
            "Catalog: {} recommendation(s) from {} seed(s)",
            recommendations.len(),
            seed_track_ids.len()
        );
        Ok(Recommendations {
            seed_track_ids,
            seed_tracks,
            recommendations,
            filter_criteria: request.filter_criteria,
            skipped_seeds,
        })
    }
}
