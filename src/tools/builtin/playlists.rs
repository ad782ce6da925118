use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::edit_payload;
use crate::error::{Error, Result};
use crate::planner::Outcome;
use crate::services::PlaylistService;
use crate::tools::executor::failure;
use crate::tools::{parse_params, schema_for, PlaylistId, Tool, TrackId};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlaylistParams {
    /// TIDAL playlist id (UUID)
    pub playlist_id: PlaylistId,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePlaylistParams {
    /// Name of the new playlist
    pub title: String,
    /// Tracks to add, in order
    pub track_ids: Vec<TrackId>,
    #[serde(default)]
    pub description: String,
}

pub struct CreatePlaylistTool {
    pub playlists: Arc<PlaylistService>,
}

#[async_trait]
impl Tool for CreatePlaylistTool {
    fn name(&self) -> &str {
        "create_tidal_playlist"
    }

    fn description(&self) -> &str {
        "Create a new playlist in the user's TIDAL account and add the given tracks in order. \
         Check get_user_playlists first to match the user's naming style. The response has \
         the playlist URL to share with the user."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<CreatePlaylistParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, cancel: CancellationToken) -> Result<Value> {
        let params: CreatePlaylistParams = parse_params(params)?;
        let track_ids = TrackId::into_strings(params.track_ids);
        let creation = self
            .playlists
            .create(&params.title, &params.description, &track_ids, &cancel)
            .await?;

        match creation.added {
            Ok(report) => {
                let mut body = edit_payload(&report);
                body["message"] = json!(format!(
                    "Created playlist '{}' with {} track(s)",
                    creation.playlist.title,
                    track_ids.len()
                ));
                body["tracks_added"] = json!(track_ids.len());
                body["playlist"] = json!(creation.playlist);
                Ok(body)
            }
            // The playlist exists; report it alongside the failed add.
            Err(err) => {
                let mut body = failure(&err, true);
                body["playlist"] = json!(creation.playlist);
                Ok(body)
            }
        }
    }
}

pub struct UserPlaylistsTool {
    pub playlists: Arc<PlaylistService>,
}

#[async_trait]
impl Tool for UserPlaylistsTool {
    fn name(&self) -> &str {
        "get_user_playlists"
    }

    fn description(&self) -> &str {
        "List all of the user's TIDAL playlists, most recently updated first, with track \
         counts and URLs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, _cancel: CancellationToken) -> Result<Value> {
        let playlists = self.playlists.user_playlists().await?;
        Ok(json!({
            "playlist_count": playlists.len(),
            "playlists": playlists,
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlaylistTracksParams {
    /// TIDAL playlist id (UUID)
    pub playlist_id: PlaylistId,
    /// Maximum number of tracks; every track when omitted
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct PlaylistTracksTool {
    pub playlists: Arc<PlaylistService>,
}

#[async_trait]
impl Tool for PlaylistTracksTool {
    fn name(&self) -> &str {
        "get_playlist_tracks"
    }

    fn description(&self) -> &str {
        "Get the tracks of a TIDAL playlist in playlist order. Positions in the result are the \
         indices used by remove_tracks_from_playlist and reorder_playlist_tracks."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<PlaylistTracksParams>()
    }

    async fn execute(&self, params: Value, _cancel: CancellationToken) -> Result<Value> {
        let params: PlaylistTracksParams = parse_params(params)?;
        let collection = self
            .playlists
            .tracks(params.playlist_id.as_str(), params.limit)
            .await?;
        Ok(json!({
            "playlist_id": params.playlist_id,
            "track_count": collection.items.len(),
            "total": collection.total,
            "stable": collection.stable,
            "tracks": collection.items,
        }))
    }
}

pub struct DeletePlaylistTool {
    pub playlists: Arc<PlaylistService>,
}

#[async_trait]
impl Tool for DeletePlaylistTool {
    fn name(&self) -> &str {
        "delete_tidal_playlist"
    }

    fn description(&self) -> &str {
        "Permanently delete one of the user's TIDAL playlists. Confirm with the user first; \
         this cannot be undone."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<PlaylistParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, _cancel: CancellationToken) -> Result<Value> {
        let params: PlaylistParams = parse_params(params)?;
        self.playlists.delete(params.playlist_id.as_str()).await?;
        Ok(json!({
            "message": format!("Deleted playlist {}", params.playlist_id.as_str()),
            "playlist_id": params.playlist_id,
            "outcome": Outcome::FullyApplied,
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddTracksParams {
    /// TIDAL playlist id (UUID)
    pub playlist_id: PlaylistId,
    /// Tracks to append, in order
    pub track_ids: Vec<TrackId>,
}

pub struct AddTracksTool {
    pub playlists: Arc<PlaylistService>,
}

#[async_trait]
impl Tool for AddTracksTool {
    fn name(&self) -> &str {
        "add_tracks_to_playlist"
    }

    fn description(&self) -> &str {
        "Append tracks to the end of an existing TIDAL playlist, keeping their order."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<AddTracksParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, cancel: CancellationToken) -> Result<Value> {
        let params: AddTracksParams = parse_params(params)?;
        let track_ids = TrackId::into_strings(params.track_ids);
        let report = self
            .playlists
            .add_tracks(params.playlist_id.as_str(), &track_ids, &cancel)
            .await?;
        let mut body = edit_payload(&report);
        body["tracks_added"] = json!(track_ids.len());
        Ok(body)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemoveTracksParams {
    /// TIDAL playlist id (UUID)
    pub playlist_id: PlaylistId,
    /// Remove every occurrence of these tracks
    #[serde(default)]
    pub track_ids: Option<Vec<TrackId>>,
    /// Remove the tracks at these zero-based positions
    #[serde(default)]
    pub indices: Option<Vec<usize>>,
}

pub struct RemoveTracksTool {
    pub playlists: Arc<PlaylistService>,
}

#[async_trait]
impl Tool for RemoveTracksTool {
    fn name(&self) -> &str {
        "remove_tracks_from_playlist"
    }

    fn description(&self) -> &str {
        "Remove tracks from a TIDAL playlist, either by track id (every occurrence) or by \
         zero-based position. Give track_ids or indices, not both."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<RemoveTracksParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, cancel: CancellationToken) -> Result<Value> {
        let params: RemoveTracksParams = parse_params(params)?;
        let playlist_id = params.playlist_id.as_str();
        match (params.track_ids, params.indices) {
            (Some(track_ids), None) => {
                let track_ids = TrackId::into_strings(track_ids);
                let removal = self
                    .playlists
                    .remove_track_ids(playlist_id, &track_ids, &cancel)
                    .await?;
                let mut body = edit_payload(&removal.report);
                body["removed_count"] = json!(removal.report.applied_count());
                body["missing_track_ids"] = json!(removal.missing);
                Ok(body)
            }
            (None, Some(indices)) => {
                let report = self
                    .playlists
                    .remove_positions(playlist_id, &indices, &cancel)
                    .await?;
                let mut body = edit_payload(&report);
                body["removed_count"] = json!(report.applied_count());
                Ok(body)
            }
            _ => Err(Error::invalid(
                "provide either track_ids or indices, not both",
            )),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateMetadataParams {
    /// TIDAL playlist id (UUID)
    pub playlist_id: PlaylistId,
    /// New title; cannot be blank
    #[serde(default)]
    pub title: Option<String>,
    /// New description; an empty string clears it
    #[serde(default)]
    pub description: Option<String>,
}

pub struct UpdateMetadataTool {
    pub playlists: Arc<PlaylistService>,
}

#[async_trait]
impl Tool for UpdateMetadataTool {
    fn name(&self) -> &str {
        "update_playlist_metadata"
    }

    fn description(&self) -> &str {
        "Change the title and/or description of a TIDAL playlist."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<UpdateMetadataParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, cancel: CancellationToken) -> Result<Value> {
        let params: UpdateMetadataParams = parse_params(params)?;
        let report = self
            .playlists
            .update_metadata(
                params.playlist_id.as_str(),
                params.title.as_deref(),
                params.description.as_deref(),
                &cancel,
            )
            .await?;
        Ok(edit_payload(&report))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReorderTracksParams {
    /// TIDAL playlist id (UUID)
    pub playlist_id: PlaylistId,
    /// Current zero-based position of the track
    pub from_index: usize,
    /// Zero-based position to insert the track before, as numbered before
    /// the move; the playlist length moves it to the end
    pub to_index: usize,
}

pub struct ReorderTracksTool {
    pub playlists: Arc<PlaylistService>,
}

#[async_trait]
impl Tool for ReorderTracksTool {
    fn name(&self) -> &str {
        "reorder_playlist_tracks"
    }

    fn description(&self) -> &str {
        "Move one track of a TIDAL playlist in front of the track currently at to_index \
         (use the playlist length to move it to the end). Other tracks keep their relative \
         order."
    }

    fn parameters_schema(&self) -> Value {
        schema_for::<ReorderTracksParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, cancel: CancellationToken) -> Result<Value> {
        let params: ReorderTracksParams = parse_params(params)?;
        let report = self
            .playlists
            .move_track(
                params.playlist_id.as_str(),
                params.from_index,
                params.to_index,
                &cancel,
            )
            .await?;
        Ok(edit_payload(&report))
    }
}
