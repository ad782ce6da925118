//! Turns logical playlist edits into ordered single-item remote calls and
//! runs them one by one.
//!
//! Planning is pure: every positional step is computed against the playlist
//! as it will look after the steps before it. Execution threads the revision
//! returned by each step into the next one as a precondition and never rolls
//! anything back; the [`MutationReport`] says exactly what happened.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::model::{MutationStep, Playlist, Revision};
use crate::pager::{Dedup, Pager};
use crate::remote::{RemoteApi, TrackSource};
use crate::retry::RetryPolicy;

/// Playlist state taken immediately before planning.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSnapshot {
    pub playlist_id: String,
    pub track_ids: Vec<String>,
    pub revision: Option<Revision>,
}

impl PlaylistSnapshot {
    pub fn len(&self) -> usize {
        self.track_ids.len()
    }
}

/// Track ids resolved to their current positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Every position holding one of the requested ids, ascending.
    pub positions: Vec<usize>,
    /// Requested ids that are not in the playlist, in request order.
    pub missing: Vec<String>,
}

pub fn plan_remove_positions(len: usize, positions: &[usize]) -> Result<Vec<MutationStep>> {
    if positions.is_empty() {
        return Err(Error::invalid("no positions to remove"));
    }
    if let Some(bad) = positions.iter().find(|&&p| p >= len) {
        return Err(Error::invalid(format!(
            "position {} is out of range for a playlist of {} track(s)",
            bad, len
        )));
    }
    // Highest first, so earlier removals never shift later targets.
    let unique: BTreeSet<usize> = positions.iter().copied().collect();
    Ok(unique
        .into_iter()
        .rev()
        .map(|index| MutationStep::Remove { index })
        .collect())
}

pub fn resolve_track_ids(snapshot: &PlaylistSnapshot, track_ids: &[String]) -> Resolution {
    let wanted: HashSet<&str> = track_ids.iter().map(String::as_str).collect();
    let positions = snapshot
        .track_ids
        .iter()
        .enumerate()
        .filter(|(_, id)| wanted.contains(id.as_str()))
        .map(|(i, _)| i)
        .collect();

    let present: HashSet<&str> = snapshot.track_ids.iter().map(String::as_str).collect();
    let mut reported = HashSet::new();
    let missing = track_ids
        .iter()
        .filter(|id| !present.contains(id.as_str()) && reported.insert(id.as_str()))
        .cloned()
        .collect();

    Resolution { positions, missing }
}

/// Moves the item at `from` in front of the item currently at `to`;
/// `to == len` moves it to the end.
///
/// Without native move support the edit becomes a removal followed by an
/// insert. The removal shifts everything after `from` left by one, so a
/// destination after the source is adjusted by -1.
pub fn plan_move(
    snapshot: &PlaylistSnapshot,
    from: usize,
    to: usize,
    native: bool,
) -> Result<Vec<MutationStep>> {
    let len = snapshot.len();
    if from >= len {
        return Err(Error::invalid(format!(
            "from index {} is out of range for a playlist of {} track(s)",
            from, len
        )));
    }
    if to > len {
        return Err(Error::invalid(format!(
            "to index {} is out of range for a playlist of {} track(s)",
            to, len
        )));
    }
    if from == to {
        return Ok(Vec::new());
    }
    if native {
        return Ok(vec![MutationStep::Move { from, to }]);
    }
    let track_id = snapshot.track_ids[from].clone();
    let index = if to > from { to - 1 } else { to };
    Ok(vec![
        MutationStep::Remove { index: from },
        MutationStep::Insert {
            index,
            track_ids: vec![track_id],
        },
    ])
}

pub fn plan_append(track_ids: &[String], chunk_size: usize) -> Result<Vec<MutationStep>> {
    if track_ids.is_empty() {
        return Err(Error::invalid("no track ids to add"));
    }
    Ok(track_ids
        .chunks(chunk_size.max(1))
        .map(|chunk| MutationStep::Append {
            track_ids: chunk.to_vec(),
        })
        .collect())
}

fn check_metadata(title: Option<&str>, description: Option<&str>) -> Result<()> {
    if title.is_none() && description.is_none() {
        return Err(Error::invalid(
            "at least one of title or description is required",
        ));
    }
    if title.is_some_and(|t| t.trim().is_empty()) {
        return Err(Error::invalid("title cannot be empty"));
    }
    Ok(())
}

/// Fields left out keep the playlist's current value.
pub fn plan_metadata(
    current: &Playlist,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<MutationStep> {
    check_metadata(title, description)?;
    Ok(MutationStep::SetMetadata {
        title: title.map_or_else(|| current.title.clone(), |t| t.trim().to_string()),
        description: description.map_or_else(|| current.description.clone(), str::to_string),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    Failed { kind: ErrorKind, message: String },
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: MutationStep,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NothingApplied,
    PartiallyApplied,
    FullyApplied,
}

/// Per-step account of one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationReport {
    pub playlist_id: String,
    pub steps: Vec<StepReport>,
}

impl MutationReport {
    /// Every step starts out not attempted.
    pub fn planned(playlist_id: &str, steps: &[MutationStep]) -> Self {
        Self {
            playlist_id: playlist_id.to_string(),
            steps: steps
                .iter()
                .enumerate()
                .map(|(index, step)| StepReport {
                    index,
                    step: step.clone(),
                    status: StepStatus::NotAttempted,
                })
                .collect(),
        }
    }

    pub fn applied_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Applied)
            .count()
    }

    /// An empty plan counts as fully applied.
    pub fn outcome(&self) -> Outcome {
        let applied = self.applied_count();
        if applied == self.steps.len() {
            Outcome::FullyApplied
        } else if applied == 0 {
            Outcome::NothingApplied
        } else {
            Outcome::PartiallyApplied
        }
    }

    /// Turns a stopped execution into the error the caller sees.
    fn into_error(self, cause: Error) -> Error {
        if self.applied_count() == 0 {
            cause
        } else {
            Error::PartialMutationFailure(Box::new(self))
        }
    }
}

/// Result of removing tracks by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub report: MutationReport,
    pub missing: Vec<String>,
}

/// Snapshots playlists, plans edits against them and executes the plans.
pub struct MutationPlanner {
    remote: Arc<dyn RemoteApi>,
    pager: Pager,
    retry: RetryPolicy,
}

impl MutationPlanner {
    pub fn new(remote: Arc<dyn RemoteApi>, pager: Pager) -> Self {
        let retry = pager.retry().clone();
        Self {
            remote,
            pager,
            retry,
        }
    }

    /// Current revision first, then the full contents. A listing that kept
    /// changing while it was read cannot be planned against.
    pub async fn snapshot(&self, playlist_id: &str) -> Result<PlaylistSnapshot> {
        let playlist = self.fetch_playlist(playlist_id).await?;

        let source = TrackSource::Playlist(playlist_id.to_string());
        let collection = self
            .pager
            .collect_all(&source.to_string(), Dedup::Keep, |offset, limit| {
                self.remote.track_page(&source, offset, limit)
            })
            .await?;
        if !collection.stable {
            return Err(Error::RevisionConflict(playlist_id.to_string()));
        }

        Ok(PlaylistSnapshot {
            playlist_id: playlist_id.to_string(),
            track_ids: collection.items.into_iter().map(|t| t.id).collect(),
            revision: playlist.revision,
        })
    }

    async fn fetch_playlist(&self, playlist_id: &str) -> Result<Playlist> {
        self.retry
            .run(&format!("fetch playlist {}", playlist_id), || {
                self.remote.playlist(playlist_id)
            })
            .await
    }

    /// Runs `steps` in order. Cancellation is honoured between steps only.
    pub async fn execute(
        &self,
        playlist_id: &str,
        steps: Vec<MutationStep>,
        revision: Option<Revision>,
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        let mut report = MutationReport::planned(playlist_id, &steps);
        let mut expected = revision;
        let total = steps.len();

        for (i, step) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "Planner: cancelled on playlist {} with {} of {} step(s) applied",
                    playlist_id, i, total
                );
                return Err(report.into_error(Error::Cancelled));
            }

            debug!(
                "Planner: step {}/{} on playlist {}: {}",
                i + 1,
                total,
                playlist_id,
                step.describe()
            );
            let label = format!("{} on playlist {}", step.describe(), playlist_id);
            let result = self
                .retry
                .run(&label, || {
                    self.remote.mutate(playlist_id, step, expected.as_ref())
                })
                .await;

            match result {
                Ok(outcome) => {
                    report.steps[i].status = StepStatus::Applied;
                    expected = outcome.revision;
                }
                Err(err) => {
                    error!(
                        "Planner: step {}/{} ({}) failed on playlist {}: {}",
                        i + 1,
                        total,
                        step.describe(),
                        playlist_id,
                        err
                    );
                    report.steps[i].status = StepStatus::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                    };
                    return Err(report.into_error(err));
                }
            }
        }

        info!(
            "Planner: applied {} step(s) to playlist {}",
            total, playlist_id
        );
        Ok(report)
    }

    pub async fn remove_positions(
        &self,
        playlist_id: &str,
        positions: &[usize],
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        let snapshot = self.snapshot(playlist_id).await?;
        let steps = plan_remove_positions(snapshot.len(), positions)?;
        self.execute(playlist_id, steps, snapshot.revision, cancel)
            .await
    }

    /// Removes every occurrence of each id. Absent ids are reported, not
    /// treated as failures.
    pub async fn remove_track_ids(
        &self,
        playlist_id: &str,
        track_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Removal> {
        if track_ids.is_empty() {
            return Err(Error::invalid("no track ids to remove"));
        }
        let snapshot = self.snapshot(playlist_id).await?;
        let resolution = resolve_track_ids(&snapshot, track_ids);
        if resolution.positions.is_empty() {
            info!(
                "Planner: none of {} id(s) are in playlist {}",
                track_ids.len(),
                playlist_id
            );
            return Ok(Removal {
                report: MutationReport::planned(playlist_id, &[]),
                missing: resolution.missing,
            });
        }
        let steps = plan_remove_positions(snapshot.len(), &resolution.positions)?;
        let report = self
            .execute(playlist_id, steps, snapshot.revision, cancel)
            .await?;
        Ok(Removal {
            report,
            missing: resolution.missing,
        })
    }

    pub async fn move_track(
        &self,
        playlist_id: &str,
        from: usize,
        to: usize,
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        let snapshot = self.snapshot(playlist_id).await?;
        let steps = plan_move(&snapshot, from, to, self.remote.supports_move())?;
        self.execute(playlist_id, steps, snapshot.revision, cancel)
            .await
    }

    pub async fn add_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        let steps = plan_append(track_ids, self.remote.max_items_per_add())?;
        let playlist = self.fetch_playlist(playlist_id).await?;
        self.execute(playlist_id, steps, playlist.revision, cancel)
            .await
    }

    pub async fn update_metadata(
        &self,
        playlist_id: &str,
        title: Option<&str>,
        description: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<MutationReport> {
        check_metadata(title, description)?;
        let playlist = self.fetch_playlist(playlist_id).await?;
        let step = plan_metadata(&playlist, title, description)?;
        self.execute(playlist_id, vec![step], playlist.revision, cancel)
            .await
    }
}
