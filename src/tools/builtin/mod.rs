use std::sync::Arc;

use serde_json::{json, Value};

use crate::planner::MutationReport;
use crate::services::Services;
use crate::tools::Tool;

pub mod auth;
pub mod playlists;
pub mod search;
pub mod tracks;

pub fn all(services: &Services) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(auth::LoginTool {
            auth: services.auth.clone(),
        }),
        Arc::new(tracks::FavoriteTracksTool {
            catalog: services.catalog.clone(),
        }),
        Arc::new(tracks::RecommendTracksTool {
            catalog: services.catalog.clone(),
        }),
        Arc::new(playlists::CreatePlaylistTool {
            playlists: services.playlists.clone(),
        }),
        Arc::new(playlists::UserPlaylistsTool {
            playlists: services.playlists.clone(),
        }),
        Arc::new(playlists::PlaylistTracksTool {
            playlists: services.playlists.clone(),
        }),
        Arc::new(playlists::DeletePlaylistTool {
            playlists: services.playlists.clone(),
        }),
        Arc::new(playlists::AddTracksTool {
            playlists: services.playlists.clone(),
        }),
        Arc::new(playlists::RemoveTracksTool {
            playlists: services.playlists.clone(),
        }),
        Arc::new(playlists::UpdateMetadataTool {
            playlists: services.playlists.clone(),
        }),
        Arc::new(playlists::ReorderTracksTool {
            playlists: services.playlists.clone(),
        }),
        Arc::new(search::SearchTool {
            catalog: services.catalog.clone(),
        }),
        Arc::new(search::SearchTracksTool {
            catalog: services.catalog.clone(),
        }),
        Arc::new(search::SearchAlbumsTool {
            catalog: services.catalog.clone(),
        }),
        Arc::new(search::SearchArtistsTool {
            catalog: services.catalog.clone(),
        }),
        Arc::new(search::SearchPlaylistsTool {
            catalog: services.catalog.clone(),
        }),
    ]
}

/// Outcome and per-step report of a completed edit.
fn edit_payload(report: &MutationReport) -> Value {
    json!({
        "playlist_id": report.playlist_id,
        "outcome": report.outcome(),
        "mutation": report,
    })
}

fn default_limit() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Pager;
    use crate::remote::memory::{tracks, MemoryRemote};
    use crate::remote::RemoteApi;
    use crate::retry::RetryPolicy;
    use crate::session::{Session, SessionStore};
    use crate::tools::{ToolExecutor, ToolRegistry};
    use tokio_util::sync::CancellationToken;

    fn executor(remote: &Arc<MemoryRemote>) -> ToolExecutor {
        let api: Arc<dyn RemoteApi> = remote.clone();
        let services = Services::new(
            api,
            SessionStore::with_session(Session::new("tok")),
            Pager::new(5, RetryPolicy::none()),
        );
        ToolExecutor::new(Arc::new(ToolRegistry::with_services(&services)))
    }

    async fn call(executor: &ToolExecutor, name: &str, params: Value) -> Value {
        executor
            .execute(name, params, CancellationToken::new())
            .await
    }

    #[test]
    fn test_registry_exposes_every_tool() {
        let remote = Arc::new(MemoryRemote::default());
        let executor = executor(&remote);
        let names: Vec<String> = executor
            .registry()
            .list_tools()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names.len(), 16);
        for name in [
            "tidal_login",
            "get_favorite_tracks",
            "recommend_tracks",
            "create_tidal_playlist",
            "get_user_playlists",
            "get_playlist_tracks",
            "delete_tidal_playlist",
            "add_tracks_to_playlist",
            "remove_tracks_from_playlist",
            "update_playlist_metadata",
            "reorder_playlist_tracks",
            "search_tidal",
            "search_tracks",
            "search_albums",
            "search_artists",
            "search_playlists",
        ] {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
        }
        for tool in executor.registry().list_tools() {
            assert_eq!(tool.parameters_schema()["type"], "object", "{}", tool.name());
        }
    }

    #[tokio::test]
    async fn test_playlist_round_trip_through_tools() {
        let remote = Arc::new(MemoryRemote::default());
        remote.set_catalog(tracks(1..=6));
        let executor = executor(&remote);

        let created = call(
            &executor,
            "create_tidal_playlist",
            json!({"title": "Focus", "track_ids": [1, "2", 3, 4]}),
        )
        .await;
        assert_eq!(created["status"], "success");
        assert_eq!(created["outcome"], "fully_applied");
        let id = created["playlist"]["id"].as_str().unwrap().to_string();

        let moved = call(
            &executor,
            "reorder_playlist_tracks",
            json!({"playlist_id": id, "from_index": 0, "to_index": 4}),
        )
        .await;
        assert_eq!(moved["outcome"], "fully_applied");
        assert_eq!(remote.track_ids(&id), vec!["2", "3", "4", "1"]);

        let removed = call(
            &executor,
            "remove_tracks_from_playlist",
            json!({"playlist_id": id, "track_ids": ["3", "9"]}),
        )
        .await;
        assert_eq!(removed["removed_count"], 1);
        assert_eq!(removed["missing_track_ids"], json!(["9"]));

        let listed = call(&executor, "get_playlist_tracks", json!({"playlist_id": id})).await;
        assert_eq!(listed["track_count"], 3);

        let deleted = call(&executor, "delete_tidal_playlist", json!({"playlist_id": id})).await;
        assert_eq!(deleted["status"], "success");
        let again = call(&executor, "delete_tidal_playlist", json!({"playlist_id": id})).await;
        assert_eq!(again["kind"], "not_found");
        assert_eq!(again["outcome"], "nothing_applied");
    }

    #[tokio::test]
    async fn test_partial_failure_envelope() {
        let remote = Arc::new(MemoryRemote::default());
        remote.add_playlist("abc", "mix", tracks(1..=8));
        remote.script_mutations(vec![
            None,
            Some(crate::error::Error::not_found("track")),
        ]);
        let executor = executor(&remote);

        let out = call(
            &executor,
            "remove_tracks_from_playlist",
            json!({"playlist_id": "abc", "indices": [1, 3, 5, 7]}),
        )
        .await;
        assert_eq!(out["status"], "error");
        assert_eq!(out["kind"], "partial_mutation_failure");
        assert_eq!(out["outcome"], "partially_applied");
        let statuses: Vec<&str> = out["mutation"]["steps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["status"].as_str().unwrap())
            .collect();
        assert_eq!(
            statuses,
            vec!["applied", "failed", "not_attempted", "not_attempted"]
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_rejected_before_remote_calls() {
        let remote = Arc::new(MemoryRemote::default());
        remote.add_playlist("abc", "mix", tracks(1..=3));
        let executor = executor(&remote);

        let both = call(
            &executor,
            "remove_tracks_from_playlist",
            json!({"playlist_id": "abc", "track_ids": ["1"], "indices": [0]}),
        )
        .await;
        assert_eq!(both["kind"], "invalid_request");

        let negative = call(
            &executor,
            "reorder_playlist_tracks",
            json!({"playlist_id": "abc", "from_index": -1, "to_index": 0}),
        )
        .await;
        assert_eq!(negative["kind"], "invalid_request");

        let bad_type = call(
            &executor,
            "search_tidal",
            json!({"query": "x", "search_type": "podcasts"}),
        )
        .await;
        assert_eq!(bad_type["kind"], "invalid_request");
        assert_eq!(remote.page_calls(), 0);
        assert_eq!(remote.mutate_calls(), 0);
    }
}
