use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::default_limit;
use crate::error::Result;
use crate::services::{CatalogService, RecommendRequest};
use crate::tools::{parse_params, schema_for, Tool, TrackId};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FavoriteTracksParams {
    /// Maximum number of tracks to return, newest favorites first (default 20)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub struct FavoriteTracksTool {
    pub catalog: Arc<CatalogService>,
}

#[async_trait]
impl Tool for FavoriteTracksTool {
    fn name(&self) -> &str {
        "get_favorite_tracks"
    }

    fn description(&self) -> &str {
        "Get the tracks the user saved as favorites on TIDAL, most recently added first. \
         Each track has its id, title, artists, album, duration and URL."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<FavoriteTracksParams>()
    }

    async fn execute(&self, params: Value, _cancel: CancellationToken) -> Result<Value> {
        let params: FavoriteTracksParams = parse_params(params)?;
        let tracks = self.catalog.favorites(params.limit).await?;
        Ok(json!({
            "track_count": tracks.len(),
            "tracks": tracks,
        }))
    }
}

fn default_seed_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecommendTracksParams {
    /// Seed track ids; the user's favorites are used when omitted
    #[serde(default)]
    pub track_ids: Option<Vec<TrackId>>,
    /// Free-text preferences (e.g. "upbeat", "recent releases") echoed back for ranking
    #[serde(default)]
    pub filter_criteria: Option<String>,
    /// Radio tracks to fetch per seed (default 20)
    #[serde(default = "default_seed_limit")]
    pub limit_per_track: usize,
    /// Favorites to use as seeds when no track ids are given (default 20)
    #[serde(default = "default_seed_limit")]
    pub limit_from_favorite: usize,
}

pub struct RecommendTracksTool {
    pub catalog: Arc<CatalogService>,
}

#[async_trait]
impl Tool for RecommendTracksTool {
    fn name(&self) -> &str {
        "recommend_tracks"
    }

    fn description(&self) -> &str {
        "Collect recommendation candidates from TIDAL track radio, seeded by the given track \
         ids or by the user's favorites. Candidates are deduplicated, exclude the seeds and \
         carry the seed they came from. Rank and filter them yourself using filter_criteria, \
         and include each track's URL when presenting them."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<RecommendTracksParams>()
    }

    async fn execute(&self, params: Value, cancel: CancellationToken) -> Result<Value> {
        let params: RecommendTracksParams = parse_params(params)?;
        let request = RecommendRequest {
            track_ids: params
                .track_ids
                .map(TrackId::into_strings)
                .unwrap_or_default(),
            filter_criteria: params.filter_criteria.filter(|c| !c.trim().is_empty()),
            limit_per_track: params.limit_per_track,
            limit_from_favorite: params.limit_from_favorite,
        };
        let recommendations = self.catalog.recommend(request, &cancel).await?;
        let mut body = serde_json::to_value(&recommendations)?;
        body["recommendation_count"] = json!(recommendations.recommendations.len());
        Ok(body)
    }
}
