use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{Playlist, Track};
use crate::pager::{Collection, Dedup, Pager};
use crate::planner::{MutationPlanner, MutationReport, Removal};
use crate::remote::{PlaylistSource, RemoteApi, TrackSource};

/// A new playlist and what happened when its tracks were added.
#[derive(Debug)]
pub struct Creation {
    pub playlist: Playlist,
    /// The playlist exists even when this is an error.
    pub added: Result<MutationReport>,
}

pub struct PlaylistService {
    remote: Arc<dyn RemoteApi>,
    pager: Pager,
    planner: MutationPlanner,
}

impl PlaylistService {
    pub fn new(remote: Arc<dyn RemoteApi>, pager: Pager) -> Self {
        let planner = MutationPlanner::new(remote.clone(), pager.clone());
        Self {
            remote,
            pager,
            planner,
        }
    }

    /// All of the user's playlists, most recently updated first.
    pub async fn user_playlists(&self) -> Result<Vec<Playlist>> {
        let source = PlaylistSource::User;
        let collection = self
            .pager
            .collect_all(&source.to_string(), Dedup::ByKey, |offset, limit| {
                self.remote.playlist_page(&source, offset, limit)
            })
            .await?;
        let mut playlists = collection.items;
        playlists.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(playlists)
    }

    /// Playlist contents in order, duplicates included.
    pub async fn tracks(&self, playlist_id: &str, limit: Option<usize>) -> Result<Collection<Track>> {
        let source = TrackSource::Playlist(playlist_id.to_string());
        let what = source.to_string();
        let fetch = |offset, page| self.remote.track_page(&source, offset, page);
        match limit {
            Some(limit) => {
                self.pager
                    .collect_up_to(&what, Dedup::Keep, limit, fetch)
                    .await
            }
            None => self.pager.collect_all(&what, Dedup::Keep, fetch).await,
        }
    }

    pub async fn create(
        &self,
        title: &str,
        description: &str,
        track_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Creation> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::invalid("playlist title cannot be empty"));
        }
        if track_ids.is_empty() {
            return Err(Error::invalid("at least one track id is required"));
        }

        let playlist = self.remote.create_playlist(title, description).await?;
        info!("Playlists: created '{}' ({})", playlist.title, playlist.id);
        let added = self
            .planner
            .add_tracks(&playlist.id, track_ids, cancel)
            .await;
        Ok(Creation { playlist, added })
    }

    /// Not retried: a repeated delete of an already deleted playlist would
    /// report `NotFound` for a request that succeeded.
    pub async fn delete(&self, playlist_id: &str) -> Result<()> {
        self.remote.delete_playlist(playlist_id).await?;
        info!("Playlists: deleted {}", playlist_id);
        Ok(())
    }

    pub async fn add_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        self.planner.add_tracks(playlist_id, track_ids, cancel).await
    }

    pub async fn remove_track_ids(
        &self,
        playlist_id: &str,
        track_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Removal> {
        self.planner
            .remove_track_ids(playlist_id, track_ids, cancel)
            .await
    }

    pub async fn remove_positions(
        &self,
        playlist_id: &str,
        positions: &[usize],
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        self.planner
            .remove_positions(playlist_id, positions, cancel)
            .await
    }

    pub async fn move_track(
        &self,
        playlist_id: &str,
        from: usize,
        to: usize,
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        self.planner.move_track(playlist_id, from, to, cancel).await
    }

    pub async fn update_metadata(
        &self,
        playlist_id: &str,
        title: Option<&str>,
        description: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        self.planner
            .update_metadata(playlist_id, title, description, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{tracks, MemoryRemote};
    use crate::retry::RetryPolicy;
    use chrono::{TimeZone, Utc};

    fn service(remote: &Arc<MemoryRemote>) -> PlaylistService {
        let remote: Arc<dyn RemoteApi> = remote.clone();
        PlaylistService::new(remote, Pager::new(3, RetryPolicy::none()))
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_user_playlists_sorted_by_last_update() {
        let remote = Arc::new(MemoryRemote::default());
        for (id, day) in [("a", 1), ("b", 3), ("c", 2)] {
            remote.add_playlist(id, id, Vec::new());
            remote.set_last_updated(id, Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap());
        }
        remote.add_playlist("never", "never", Vec::new());

        let playlists = service(&remote).user_playlists().await.unwrap();
        let order: Vec<&str> = playlists.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a", "never"]);
    }

    #[tokio::test]
    async fn test_tracks_keep_duplicates() {
        let remote = Arc::new(MemoryRemote::default());
        remote.add_playlist("p", "mix", tracks([1, 2, 1, 3, 1]));
        let playlists = service(&remote);

        let all = playlists.tracks("p", None).await.unwrap();
        assert_eq!(all.items.len(), 5);
        let first_two = playlists.tracks("p", Some(2)).await.unwrap();
        assert_eq!(first_two.items.len(), 2);
    }

    #[tokio::test]
    async fn test_create_adds_tracks_in_chunks() {
        let remote = Arc::new(MemoryRemote::new(100, 2, true));
        let playlists = service(&remote);

        let creation = playlists
            .create(" Road trip ", "summer", &strings(&["1", "2", "3"]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(creation.playlist.title, "Road trip");
        let report = creation.added.unwrap();
        assert_eq!(report.steps.len(), 2);
        assert_eq!(remote.track_ids(&creation.playlist.id), strings(&["1", "2", "3"]));
    }

    #[tokio::test]
    async fn test_create_reports_failed_add() {
        let remote = Arc::new(MemoryRemote::new(100, 2, true));
        remote.script_mutations(vec![None, Some(Error::invalid("unknown track"))]);
        let playlists = service(&remote);

        let creation = playlists
            .create("Mix", "", &strings(&["1", "2", "3"]), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            creation.added,
            Err(Error::PartialMutationFailure(_))
        ));
        assert!(remote.playlist_meta(&creation.playlist.id).is_some());
    }

    #[tokio::test]
    async fn test_create_validates_before_calling_remote() {
        let remote = Arc::new(MemoryRemote::default());
        let playlists = service(&remote);
        let cancel = CancellationToken::new();

        assert!(matches!(
            playlists.create("  ", "", &strings(&["1"]), &cancel).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            playlists.create("Mix", "", &[], &cancel).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(service(&remote).user_playlists().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_terminal() {
        let remote = Arc::new(MemoryRemote::default());
        remote.add_playlist("p", "mix", tracks(1..=3));
        let playlists = service(&remote);

        playlists.delete("p").await.unwrap();
        assert!(matches!(playlists.delete("p").await, Err(Error::NotFound(_))));
        assert!(matches!(
            playlists.tracks("p", None).await,
            Err(Error::NotFound(_))
        ));
    }
}
