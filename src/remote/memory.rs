//! In-memory stand-in for TIDAL with scripted faults, used by tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{
    playlist_url, Album, Artist, MutationStep, Page, Playlist, Revision, SessionInfo, Track,
};
use crate::remote::{MutationOutcome, PlaylistSource, RemoteApi, TrackSource};

pub fn track(id: u64) -> Track {
    Track::new(
        id.to_string(),
        format!("Track {}", id),
        vec![format!("Artist {}", id % 7)],
        format!("Album {}", id % 5),
        180 + (id % 60) as u32,
        Some(2000 + (id % 25) as i32),
    )
}

pub fn tracks(ids: impl IntoIterator<Item = u64>) -> Vec<Track> {
    ids.into_iter().map(track).collect()
}

struct StoredPlaylist {
    meta: Playlist,
    tracks: Vec<Track>,
    version: u64,
}

impl StoredPlaylist {
    fn revision(&self) -> Revision {
        Revision(format!("\"{}-{}\"", self.meta.id, self.version))
    }
}

#[derive(Default)]
struct State {
    playlists: HashMap<String, StoredPlaylist>,
    order: Vec<String>,
    deleted: HashSet<String>,
    favorites: Vec<Track>,
    catalog: Vec<Track>,
    albums: Vec<Album>,
    artists: Vec<Artist>,
    radio: HashMap<String, Vec<Track>>,
    next_id: u64,
    page_faults: VecDeque<Error>,
    mutation_script: VecDeque<Option<Error>>,
    drift_once: Option<(String, Track)>,
    endless: bool,
    hide_totals: bool,
    page_calls: usize,
    mutate_calls: usize,
    applied: Vec<MutationStep>,
    authenticated: bool,
}

pub struct MemoryRemote {
    state: Mutex<State>,
    page_size: usize,
    add_chunk: usize,
    native_move: bool,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new(100, 50, true)
    }
}

impl MemoryRemote {
    pub fn new(page_size: usize, add_chunk: usize, native_move: bool) -> Self {
        let state = State {
            authenticated: true,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            page_size,
            add_chunk,
            native_move,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_playlist(&self, id: &str, title: &str, tracks: Vec<Track>) {
        let mut state = self.lock();
        let meta = Playlist {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            track_count: tracks.len(),
            duration: tracks.iter().map(|t| t.duration as u64).sum(),
            created: None,
            last_updated: None,
            creator: None,
            url: playlist_url(id),
            revision: None,
        };
        state.order.push(id.to_string());
        state.playlists.insert(
            id.to_string(),
            StoredPlaylist {
                meta,
                tracks,
                version: 1,
            },
        );
    }

    pub fn set_last_updated(&self, id: &str, at: chrono::DateTime<chrono::Utc>) {
        if let Some(p) = self.lock().playlists.get_mut(id) {
            p.meta.last_updated = Some(at);
        }
    }

    pub fn set_favorites(&self, favorites: Vec<Track>) {
        self.lock().favorites = favorites;
    }

    pub fn set_catalog(&self, catalog: Vec<Track>) {
        self.lock().catalog = catalog;
    }

    pub fn set_albums(&self, albums: Vec<Album>) {
        self.lock().albums = albums;
    }

    pub fn set_artists(&self, artists: Vec<Artist>) {
        self.lock().artists = artists;
    }

    pub fn set_radio(&self, seed: &str, tracks: Vec<Track>) {
        self.lock().radio.insert(seed.to_string(), tracks);
    }

    /// Every listing reports more pages forever.
    pub fn set_endless(&self, endless: bool) {
        self.lock().endless = endless;
    }

    /// Listings report no total, forcing full-page `has_more` inference.
    pub fn hide_totals(&self) {
        self.lock().hide_totals = true;
    }

    /// After the first page of `playlist_id` is served, `track` is inserted at
    /// the front once, as another client would.
    pub fn drift_once(&self, playlist_id: &str, track: Track) {
        self.lock().drift_once = Some((playlist_id.to_string(), track));
    }

    pub fn push_page_fault(&self, err: Error) {
        self.lock().page_faults.push_back(err);
    }

    /// One entry per upcoming `mutate` call: `None` succeeds, `Some` fails.
    pub fn script_mutations(&self, script: Vec<Option<Error>>) {
        self.lock().mutation_script.extend(script);
    }

    /// Simulates an edit by another client.
    pub fn touch(&self, playlist_id: &str) {
        if let Some(p) = self.lock().playlists.get_mut(playlist_id) {
            p.version += 1;
        }
    }

    pub fn log_out(&self) {
        self.lock().authenticated = false;
    }

    pub fn track_ids(&self, playlist_id: &str) -> Vec<String> {
        self.lock()
            .playlists
            .get(playlist_id)
            .map(|p| p.tracks.iter().map(|t| t.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn playlist_meta(&self, playlist_id: &str) -> Option<Playlist> {
        self.lock().playlists.get(playlist_id).map(|p| p.meta.clone())
    }

    pub fn page_calls(&self) -> usize {
        self.lock().page_calls
    }

    pub fn mutate_calls(&self) -> usize {
        self.lock().mutate_calls
    }

    pub fn applied(&self) -> Vec<MutationStep> {
        self.lock().applied.clone()
    }

    fn page_of<T: Clone>(
        state: &mut State,
        items: &[T],
        offset: usize,
        limit: usize,
    ) -> Result<Page<T>> {
        state.page_calls += 1;
        if !state.authenticated {
            return Err(Error::Unauthenticated);
        }
        if let Some(err) = state.page_faults.pop_front() {
            return Err(err);
        }
        if state.endless {
            let window: Vec<T> = items.iter().cycle().skip(offset).take(limit).cloned().collect();
            let mut page = Page::new(offset, limit, window, None);
            page.has_more = true;
            return Ok(page);
        }
        let window: Vec<T> = items.iter().skip(offset).take(limit).cloned().collect();
        let total = if state.hide_totals {
            None
        } else {
            Some(items.len())
        };
        Ok(Page::new(offset, limit, window, total))
    }

    fn lookup(state: &State, id: &str) -> Track {
        state
            .catalog
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .unwrap_or_else(|| Track::new(id, format!("Track {}", id), vec![], "Unknown", 0, None))
    }

    fn live<'a>(state: &'a mut State, id: &str) -> Result<&'a mut StoredPlaylist> {
        if state.deleted.contains(id) {
            return Err(Error::not_found(format!("playlist {}", id)));
        }
        state
            .playlists
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("playlist {}", id)))
    }
}

fn bounds(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::invalid(format!("index {} out of range", index)))
    }
}

#[async_trait]
impl RemoteApi for MemoryRemote {
    fn max_page_size(&self) -> usize {
        self.page_size
    }

    fn max_items_per_add(&self) -> usize {
        self.add_chunk
    }

    fn supports_move(&self) -> bool {
        self.native_move
    }

    async fn validate_session(&self) -> Result<SessionInfo> {
        if !self.lock().authenticated {
            return Err(Error::Unauthenticated);
        }
        Ok(SessionInfo {
            user_id: 1,
            country_code: "US".to_string(),
        })
    }

    async fn track_page(
        &self,
        source: &TrackSource,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Track>> {
        let limit = limit.clamp(1, self.page_size);
        let mut state = self.lock();
        if !state.authenticated {
            return Err(Error::Unauthenticated);
        }
        let items = match source {
            TrackSource::Favorites => state.favorites.clone(),
            TrackSource::Playlist(id) => Self::live(&mut state, id)?.tracks.clone(),
            TrackSource::Radio(id) => state
                .radio
                .get(id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("track {}", id)))?,
            TrackSource::Search(query) => {
                let query = query.to_lowercase();
                state
                    .catalog
                    .iter()
                    .filter(|t| t.title.to_lowercase().contains(&query))
                    .cloned()
                    .collect()
            }
        };
        let page = Self::page_of(&mut state, &items, offset, limit)?;

        if let TrackSource::Playlist(id) = source {
            if state.drift_once.as_ref().is_some_and(|(target, _)| target == id) {
                if let Some((_, extra)) = state.drift_once.take() {
                    if let Some(p) = state.playlists.get_mut(id) {
                        p.tracks.insert(0, extra);
                        p.version += 1;
                    }
                }
            }
        }
        Ok(page)
    }

    async fn playlist_page(
        &self,
        source: &PlaylistSource,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Playlist>> {
        let limit = limit.clamp(1, self.page_size);
        let mut state = self.lock();
        let all: Vec<Playlist> = state
            .order
            .iter()
            .filter(|id| !state.deleted.contains(*id))
            .filter_map(|id| state.playlists.get(id))
            .map(|p| {
                let mut meta = p.meta.clone();
                meta.track_count = p.tracks.len();
                meta
            })
            .collect();
        let items = match source {
            PlaylistSource::User => all,
            PlaylistSource::Search(query) => {
                let query = query.to_lowercase();
                all.into_iter()
                    .filter(|p| p.title.to_lowercase().contains(&query))
                    .collect()
            }
        };
        Self::page_of(&mut state, &items, offset, limit)
    }

    async fn album_page(&self, query: &str, offset: usize, limit: usize) -> Result<Page<Album>> {
        let limit = limit.clamp(1, self.page_size);
        let mut state = self.lock();
        let query = query.to_lowercase();
        let items: Vec<Album> = state
            .albums
            .iter()
            .filter(|a| a.title.to_lowercase().contains(&query))
            .cloned()
            .collect();
        Self::page_of(&mut state, &items, offset, limit)
    }

    async fn artist_page(&self, query: &str, offset: usize, limit: usize) -> Result<Page<Artist>> {
        let limit = limit.clamp(1, self.page_size);
        let mut state = self.lock();
        let query = query.to_lowercase();
        let items: Vec<Artist> = state
            .artists
            .iter()
            .filter(|a| a.name.to_lowercase().contains(&query))
            .cloned()
            .collect();
        Self::page_of(&mut state, &items, offset, limit)
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Playlist> {
        let mut state = self.lock();
        if !state.authenticated {
            return Err(Error::Unauthenticated);
        }
        let stored = Self::live(&mut state, playlist_id)?;
        let mut meta = stored.meta.clone();
        meta.track_count = stored.tracks.len();
        meta.revision = Some(stored.revision());
        Ok(meta)
    }

    async fn create_playlist(&self, title: &str, description: &str) -> Result<Playlist> {
        let id = {
            let mut state = self.lock();
            if !state.authenticated {
                return Err(Error::Unauthenticated);
            }
            state.next_id += 1;
            format!("00000000-0000-4000-8000-{:012}", state.next_id)
        };
        self.add_playlist(&id, title, Vec::new());
        if let Some(p) = self.lock().playlists.get_mut(&id) {
            p.meta.description = description.to_string();
        }
        self.playlist(&id).await
    }

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        let mut state = self.lock();
        Self::live(&mut state, playlist_id)?;
        state.playlists.remove(playlist_id);
        state.deleted.insert(playlist_id.to_string());
        Ok(())
    }

    async fn mutate(
        &self,
        playlist_id: &str,
        step: &MutationStep,
        expected: Option<&Revision>,
    ) -> Result<MutationOutcome> {
        let mut state = self.lock();
        state.mutate_calls += 1;
        if !state.authenticated {
            return Err(Error::Unauthenticated);
        }
        if let Some(Some(err)) = state.mutation_script.pop_front() {
            return Err(err);
        }

        let resolved: Vec<Track> = match step {
            MutationStep::Append { track_ids } | MutationStep::Insert { track_ids, .. } => {
                track_ids.iter().map(|id| Self::lookup(&state, id)).collect()
            }
            _ => Vec::new(),
        };
        let stored = Self::live(&mut state, playlist_id)?;
        if let Some(expected) = expected {
            if *expected != stored.revision() {
                return Err(Error::RevisionConflict(playlist_id.to_string()));
            }
        }

        let len = stored.tracks.len();
        match step {
            MutationStep::Append { .. } => stored.tracks.extend(resolved),
            MutationStep::Insert { index, .. } => {
                if *index > len {
                    return Err(Error::invalid(format!("index {} out of range", index)));
                }
                let tail = stored.tracks.split_off(*index);
                stored.tracks.extend(resolved);
                stored.tracks.extend(tail);
            }
            MutationStep::Remove { index } => {
                bounds(*index, len)?;
                stored.tracks.remove(*index);
            }
            MutationStep::Move { from, to } => {
                if !self.native_move {
                    return Err(Error::invalid("move is not supported"));
                }
                bounds(*from, len)?;
                if *to > len {
                    return Err(Error::invalid(format!("index {} out of range", to)));
                }
                let item = stored.tracks.remove(*from);
                let index = if to > from { to - 1 } else { *to };
                stored.tracks.insert(index, item);
            }
            MutationStep::SetMetadata { title, description } => {
                stored.meta.title = title.clone();
                stored.meta.description = description.clone();
            }
        }
        stored.version += 1;
        let revision = stored.revision();
        state.applied.push(step.clone());
        Ok(MutationOutcome {
            revision: Some(revision),
        })
    }
}
