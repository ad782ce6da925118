//! TIDAL v1 REST adapter.
//!
//! Listing endpoints take `offset`/`limit` and answer with
//! `totalNumberOfItems`. Playlist edits are single-item calls guarded by the
//! playlist's ETag, sent back as `If-None-Match`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, ETAG, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    album_url, artist_url, playlist_url, Album, Artist, MutationStep, Page, Playlist, Revision,
    SessionInfo, Track,
};
use crate::remote::{MutationOutcome, PlaylistSource, RemoteApi, TrackSource};
use crate::session::SessionStore;

/// Documented maximum page size of the v1 listing endpoints.
pub const TIDAL_MAX_PAGE_SIZE: usize = 100;
/// Track ids accepted by one add call.
pub const TIDAL_MAX_ITEMS_PER_ADD: usize = 50;

pub struct TidalClient {
    http: Client,
    base_url: String,
    session: SessionStore,
    page_size: usize,
    add_chunk: usize,
    native_move: bool,
}

impl TidalClient {
    pub fn new(config: &Config, session: SessionStore) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("tidal-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            session,
            page_size: config.page_size.clamp(1, TIDAL_MAX_PAGE_SIZE),
            add_chunk: config.add_chunk_size.clamp(1, TIDAL_MAX_ITEMS_PER_ADD),
            native_move: config.native_move,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn identity(&self) -> Result<SessionInfo> {
        let session = self.session.current()?;
        match (session.user_id, session.country_code) {
            (Some(user_id), Some(country_code)) => Ok(SessionInfo {
                user_id,
                country_code,
            }),
            _ => self.validate_session().await,
        }
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let identity = self.identity().await?;
        Ok(self
            .http
            .request(method, self.url(path))
            .query(&[("countryCode", identity.country_code.as_str())]))
    }

    /// Sends with the session's credentials and maps failures onto the error
    /// taxonomy. A rejected session is dropped from the store.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let session = self.session.current()?;
        let response = request
            .header(AUTHORIZATION, session.authorization())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        let err = classify(status, retry_after, &body, what);
        match &err {
            Error::Unauthenticated => self.session.invalidate(),
            Error::RateLimited { .. } | Error::TransientNetwork(_) => {
                warn!("TIDAL: {} answered {} for {}", self.base_url, status, what)
            }
            _ => debug!("TIDAL: {} for {}: {}", status, what, body),
        }
        Err(err)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let request = self.request(Method::GET, path).await?.query(query);
        let response = self.send(request, what).await?;
        Ok(response.json::<T>().await?)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        mut query: Vec<(&str, String)>,
        offset: usize,
        limit: usize,
        what: &str,
    ) -> Result<(ListJson<T>, usize)> {
        let limit = limit.clamp(1, self.page_size);
        query.push(("offset", offset.to_string()));
        query.push(("limit", limit.to_string()));
        debug!("TIDAL: fetching {} offset={} limit={}", what, offset, limit);
        let list = self.get_json::<ListJson<T>>(path, &query, what).await?;
        Ok((list, limit))
    }

    async fn search<T: DeserializeOwned>(
        &self,
        query: &str,
        kind: SearchKind,
        offset: usize,
        limit: usize,
    ) -> Result<(ListJson<T>, usize)> {
        let limit = limit.clamp(1, self.page_size);
        let params = vec![
            ("query", query.to_string()),
            ("types", kind.as_param().to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        let what = format!("{} search '{}'", kind.as_param().to_lowercase(), query);
        let mut body: SearchJson<T> = self.get_json("search", &params, &what).await?;
        let list = body.take(kind).unwrap_or_default();
        Ok((list, limit))
    }

    async fn current_revision(&self, playlist_id: &str) -> Result<Option<Revision>> {
        Ok(self.playlist(playlist_id).await?.revision)
    }
}

#[async_trait]
impl RemoteApi for TidalClient {
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
        let request = self.http.get(self.url("sessions"));
        let response = self.send(request, "session").await?;
        let body: SessionJson = response.json().await?;
        self.session
            .remember_identity(body.user_id, &body.country_code)?;
        Ok(SessionInfo {
            user_id: body.user_id,
            country_code: body.country_code,
        })
    }

    async fn track_page(
        &self,
        source: &TrackSource,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Track>> {
        let what = source.to_string();
        let (items, total, limit): (Vec<Track>, Option<usize>, usize) = match source {
            TrackSource::Favorites => {
                let user = self.identity().await?.user_id;
                let query = vec![
                    ("order", "DATE".to_string()),
                    ("orderDirection", "DESC".to_string()),
                ];
                let path = format!("users/{}/favorites/tracks", user);
                let (list, limit) = self
                    .list::<WrappedJson>(&path, query, offset, limit, &what)
                    .await?;
                let total = list.total_number_of_items;
                (list.items.into_iter().map(|w| w.item.into()).collect(), total, limit)
            }
            TrackSource::Playlist(id) => {
                let path = format!("playlists/{}/items", id);
                let (list, limit) = self
                    .list::<WrappedJson>(&path, Vec::new(), offset, limit, &what)
                    .await?;
                let total = list.total_number_of_items;
                (list.items.into_iter().map(|w| w.item.into()).collect(), total, limit)
            }
            TrackSource::Radio(id) => {
                let path = format!("tracks/{}/radio", id);
                let (list, limit) = self
                    .list::<TrackJson>(&path, Vec::new(), offset, limit, &what)
                    .await?;
                let total = list.total_number_of_items;
                (list.items.into_iter().map(Track::from).collect(), total, limit)
            }
            TrackSource::Search(query) => {
                let (list, limit) = self
                    .search::<TrackJson>(query, SearchKind::Tracks, offset, limit)
                    .await?;
                let total = list.total_number_of_items;
                (list.items.into_iter().map(Track::from).collect(), total, limit)
            }
        };
        Ok(Page::new(offset, limit, items, total))
    }

    async fn playlist_page(
        &self,
        source: &PlaylistSource,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Playlist>> {
        let (list, limit) = match source {
            PlaylistSource::User => {
                let user = self.identity().await?.user_id;
                let path = format!("users/{}/playlists", user);
                self.list::<PlaylistJson>(&path, Vec::new(), offset, limit, "user playlists")
                    .await?
            }
            PlaylistSource::Search(query) => {
                self.search::<PlaylistJson>(query, SearchKind::Playlists, offset, limit)
                    .await?
            }
        };
        let total = list.total_number_of_items;
        let items = list.items.into_iter().map(Playlist::from).collect();
        Ok(Page::new(offset, limit, items, total))
    }

    async fn album_page(&self, query: &str, offset: usize, limit: usize) -> Result<Page<Album>> {
        let (list, limit) = self
            .search::<AlbumJson>(query, SearchKind::Albums, offset, limit)
            .await?;
        let total = list.total_number_of_items;
        let items = list.items.into_iter().map(Album::from).collect();
        Ok(Page::new(offset, limit, items, total))
    }

    async fn artist_page(&self, query: &str, offset: usize, limit: usize) -> Result<Page<Artist>> {
        let (list, limit) = self
            .search::<ArtistJson>(query, SearchKind::Artists, offset, limit)
            .await?;
        let total = list.total_number_of_items;
        let items = list.items.into_iter().map(Artist::from).collect();
        Ok(Page::new(offset, limit, items, total))
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Playlist> {
        let path = format!("playlists/{}", playlist_id);
        let request = self.request(Method::GET, &path).await?;
        let response = self
            .send(request, &format!("playlist {}", playlist_id))
            .await?;
        let revision = etag(response.headers());
        let mut playlist: Playlist = response.json::<PlaylistJson>().await?.into();
        playlist.revision = revision;
        Ok(playlist)
    }

    async fn create_playlist(&self, title: &str, description: &str) -> Result<Playlist> {
        let user = self.identity().await?.user_id;
        let path = format!("users/{}/playlists", user);
        let request = self
            .request(Method::POST, &path)
            .await?
            .form(&[("title", title), ("description", description)]);
        let response = self.send(request, "new playlist").await?;
        let revision = etag(response.headers());
        let mut playlist: Playlist = response.json::<PlaylistJson>().await?.into();
        playlist.revision = revision;
        Ok(playlist)
    }

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        let path = format!("playlists/{}", playlist_id);
        let request = self.request(Method::DELETE, &path).await?;
        self.send(request, &format!("playlist {}", playlist_id))
            .await?;
        Ok(())
    }

    async fn mutate(
        &self,
        playlist_id: &str,
        step: &MutationStep,
        expected: Option<&Revision>,
    ) -> Result<MutationOutcome> {
        // Item edits need a precondition; without a known revision proceed
        // optimistically against whatever the playlist is now.
        let revision = match expected {
            Some(revision) => Some(revision.clone()),
            None => self.current_revision(playlist_id).await?,
        };

        let base = format!("playlists/{}", playlist_id);
        let request = match step {
            MutationStep::Append { track_ids } => self
                .request(Method::POST, &format!("{}/items", base))
                .await?
                .form(&[
                    ("trackIds", track_ids.join(",")),
                    ("onArtifactNotFound", "FAIL".to_string()),
                    ("onDupes", "ADD".to_string()),
                ]),
            MutationStep::Insert { index, track_ids } => self
                .request(Method::POST, &format!("{}/items", base))
                .await?
                .form(&[
                    ("trackIds", track_ids.join(",")),
                    ("toIndex", index.to_string()),
                    ("onArtifactNotFound", "FAIL".to_string()),
                    ("onDupes", "ADD".to_string()),
                ]),
            MutationStep::Remove { index } => {
                self.request(Method::DELETE, &format!("{}/items/{}", base, index))
                    .await?
            }
            MutationStep::Move { from, to } => self
                .request(Method::POST, &format!("{}/items/{}", base, from))
                .await?
                .form(&[("toIndex", to.to_string())]),
            MutationStep::SetMetadata { title, description } => self
                .request(Method::POST, &base)
                .await?
                .form(&[("title", title), ("description", description)]),
        };
        let request = match &revision {
            Some(revision) => request.header("If-None-Match", revision.as_str()),
            None => request,
        };

        let response = self
            .send(request, &format!("playlist {}", playlist_id))
            .await
            .map_err(|e| match e {
                Error::RevisionConflict(_) => Error::RevisionConflict(playlist_id.to_string()),
                other => other,
            })?;
        Ok(MutationOutcome {
            revision: etag(response.headers()),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum SearchKind {
    Tracks,
    Albums,
    Artists,
    Playlists,
}

impl SearchKind {
    fn as_param(self) -> &'static str {
        match self {
            SearchKind::Tracks => "TRACKS",
            SearchKind::Albums => "ALBUMS",
            SearchKind::Artists => "ARTISTS",
            SearchKind::Playlists => "PLAYLISTS",
        }
    }
}

/// Maps a non-success status onto the error taxonomy.
pub(crate) fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    what: &str,
) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::Unauthenticated,
        StatusCode::NOT_FOUND => Error::not_found(what),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { retry_after },
        StatusCode::PRECONDITION_FAILED => Error::RevisionConflict(what.to_string()),
        StatusCode::REQUEST_TIMEOUT => Error::TransientNetwork(format!("{} timed out", what)),
        s if s.is_server_error() => {
            Error::TransientNetwork(format!("TIDAL answered {} for {}", s, what))
        }
        s => {
            let message = serde_json::from_str::<ErrorJson>(body)
                .ok()
                .and_then(|e| e.user_message)
                .unwrap_or_else(|| format!("TIDAL answered {} for {}", s, what));
            error!("TIDAL: rejected request for {}: {}", what, message);
            Error::InvalidRequest(message)
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn etag(headers: &HeaderMap) -> Option<Revision> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| Revision(v.to_string()))
}

/// TIDAL timestamps look like `2021-02-25T10:04:39.741+0000`.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn year_of(raw: &str) -> Option<i32> {
    raw.get(..4)?.parse().ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListJson<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    total_number_of_items: Option<usize>,
}

impl<T> Default for ListJson<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total_number_of_items: Some(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchJson<T> {
    tracks: Option<ListJson<T>>,
    albums: Option<ListJson<T>>,
    artists: Option<ListJson<T>>,
    playlists: Option<ListJson<T>>,
}

impl<T> SearchJson<T> {
    fn take(&mut self, kind: SearchKind) -> Option<ListJson<T>> {
        match kind {
            SearchKind::Tracks => self.tracks.take(),
            SearchKind::Albums => self.albums.take(),
            SearchKind::Artists => self.artists.take(),
            SearchKind::Playlists => self.playlists.take(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WrappedJson {
    item: TrackJson,
}

#[derive(Debug, Deserialize)]
struct NamedJson {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumRefJson {
    title: Option<String>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackJson {
    id: u64,
    title: String,
    #[serde(default)]
    duration: u32,
    #[serde(default)]
    artists: Vec<NamedJson>,
    artist: Option<NamedJson>,
    album: Option<AlbumRefJson>,
    stream_start_date: Option<String>,
}

impl From<TrackJson> for Track {
    fn from(json: TrackJson) -> Self {
        let mut artists: Vec<String> = json.artists.into_iter().filter_map(|a| a.name).collect();
        if artists.is_empty() {
            artists.extend(json.artist.and_then(|a| a.name));
        }
        let release_year = json
            .album
            .as_ref()
            .and_then(|a| a.release_date.as_deref())
            .or(json.stream_start_date.as_deref())
            .and_then(year_of);
        let album = json
            .album
            .and_then(|a| a.title)
            .unwrap_or_else(|| "Unknown".to_string());
        Track::new(
            json.id.to_string(),
            json.title,
            artists,
            album,
            json.duration,
            release_year,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatorJson {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistJson {
    uuid: String,
    title: String,
    description: Option<String>,
    #[serde(default)]
    number_of_tracks: usize,
    #[serde(default)]
    number_of_videos: usize,
    #[serde(default)]
    duration: u64,
    created: Option<String>,
    last_updated: Option<String>,
    creator: Option<CreatorJson>,
}

impl From<PlaylistJson> for Playlist {
    fn from(json: PlaylistJson) -> Self {
        Playlist {
            url: playlist_url(&json.uuid),
            id: json.uuid,
            title: json.title,
            description: json.description.unwrap_or_default(),
            track_count: json.number_of_tracks + json.number_of_videos,
            duration: json.duration,
            created: json.created.as_deref().and_then(parse_timestamp),
            last_updated: json.last_updated.as_deref().and_then(parse_timestamp),
            creator: json.creator.and_then(|c| c.name),
            revision: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumJson {
    id: u64,
    title: String,
    artist: Option<NamedJson>,
    release_date: Option<String>,
    #[serde(default)]
    number_of_tracks: usize,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    explicit: bool,
}

impl From<AlbumJson> for Album {
    fn from(json: AlbumJson) -> Self {
        let id = json.id.to_string();
        Album {
            url: album_url(&id),
            id,
            title: json.title,
            artist: json
                .artist
                .and_then(|a| a.name)
                .unwrap_or_else(|| "Unknown Artist".to_string()),
            release_date: json.release_date,
            track_count: json.number_of_tracks,
            duration: json.duration,
            explicit: json.explicit,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArtistJson {
    id: u64,
    name: String,
}

impl From<ArtistJson> for Artist {
    fn from(json: ArtistJson) -> Self {
        let id = json.id.to_string();
        Artist {
            url: artist_url(&id),
            id,
            name: json.name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionJson {
    user_id: u64,
    country_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorJson {
    user_message: Option<String>,
}
