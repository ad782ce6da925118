use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::default_limit;
use crate::error::Result;
use crate::services::{CatalogService, SearchKind};
use crate::tools::{parse_params, schema_for, Tool};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search text (artist, title, album, ...)
    pub query: String,
    /// Which result types to return (default all)
    #[serde(default)]
    pub search_type: SearchKind,
    /// Maximum results per type, 1 to 50 (default 20)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SingleSearchParams {
    /// Search text
    pub query: String,
    /// Maximum number of results, 1 to 50 (default 20)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub struct SearchTool {
    pub catalog: Arc<CatalogService>,
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search_tidal"
    }

    fn description(&self) -> &str {
        "Search the TIDAL catalog for tracks, albums, artists and playlists at once, or for a \
         single type with search_type. Results include ids usable with the playlist tools."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<SearchParams>()
    }

    async fn execute(&self, params: Value, _cancel: CancellationToken) -> Result<Value> {
        let params: SearchParams = parse_params(params)?;
        let limit = CatalogService::clamp_limit(params.limit);
        let results = self
            .catalog
            .search(&params.query, params.search_type, limit)
            .await?;
        Ok(json!({
            "query": params.query.trim(),
            "search_type": params.search_type,
            "limit": limit,
            "summary": {
                "track_count": results.tracks.as_ref().map(Vec::len),
                "album_count": results.albums.as_ref().map(Vec::len),
                "artist_count": results.artists.as_ref().map(Vec::len),
                "playlist_count": results.playlists.as_ref().map(Vec::len),
                "total": results.total(),
            },
            "results": results,
        }))
    }
}

/// Declares a single-type search tool.
macro_rules! single_search_tool {
    ($tool:ident, $name:literal, $noun:literal, $method:ident, $key:literal, $count:literal) => {
        pub struct $tool {
            pub catalog: Arc<CatalogService>,
        }

        #[async_trait]
        impl Tool for $tool {
            fn name(&self) -> &str {
                $name
            }

            fn description(&self) -> &str {
                concat!(
                    "Search the TIDAL catalog for ",
                    $noun,
                    " matching a query. Returns at most `limit` results."
                )
            }

            fn parameters_schema(&self) -> Value {
                schema_for::<SingleSearchParams>()
            }

            async fn execute(&self, params: Value, _cancel: CancellationToken) -> Result<Value> {
                let params: SingleSearchParams = parse_params(params)?;
                let items = self.catalog.$method(&params.query, params.limit).await?;
                let mut body = json!({ "query": params.query.trim() });
                body[$count] = json!(items.len());
                body[$key] = json!(items);
                Ok(body)
            }
        }
    };
}

single_search_tool!(
    SearchTracksTool,
    "search_tracks",
    "tracks",
    search_tracks,
    "tracks",
    "track_count"
);
single_search_tool!(
    SearchAlbumsTool,
    "search_albums",
    "albums",
    search_albums,
    "albums",
    "album_count"
);
single_search_tool!(
    SearchArtistsTool,
    "search_artists",
    "artists",
    search_artists,
    "artists",
    "artist_count"
);
single_search_tool!(
    SearchPlaylistsTool,
    "search_playlists",
    "public playlists",
    search_playlists,
    "playlists",
    "playlist_count"
);
