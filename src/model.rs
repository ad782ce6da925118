use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Items with a stable identity inside a listing.
pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    /// Seconds
    pub duration: u32,
    pub release_year: Option<i32>,
    pub url: String,
}

impl Track {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artists: Vec<String>,
        album: impl Into<String>,
        duration: u32,
        release_year: Option<i32>,
    ) -> Self {
        let id = id.into();
        let url = track_url(&id);
        Self {
            id,
            title: title.into(),
            artists,
            album: album.into(),
            duration,
            release_year,
            url,
        }
    }

    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("Unknown")
    }
}

impl Keyed for Track {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Opaque playlist version marker (TIDAL's ETag).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub description: String,
    pub track_count: usize,
    /// Seconds
    pub duration: u64,
    pub created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub creator: Option<String>,
    pub url: String,
    #[serde(skip)]
    pub revision: Option<Revision>,
}

impl Keyed for Playlist {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub release_date: Option<String>,
    pub track_count: usize,
    pub duration: u64,
    pub explicit: bool,
    pub url: String,
}

impl Keyed for Album {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl Keyed for Artist {
    fn key(&self) -> &str {
        &self.id
    }
}

/// One bounded window of a remote listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub offset: usize,
    pub limit: usize,
    pub items: Vec<T>,
    pub total: Option<usize>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Builds a page, deriving `has_more` from the total when the remote
    /// reports one and from a full page otherwise.
    pub fn new(offset: usize, limit: usize, items: Vec<T>, total: Option<usize>) -> Self {
        let has_more = match total {
            Some(total) => !items.is_empty() && offset + items.len() < total,
            None => !items.is_empty() && items.len() >= limit,
        };
        Self {
            offset,
            limit,
            items,
            total,
            has_more,
        }
    }
}

/// One atomic remote playlist edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationStep {
    Append { track_ids: Vec<String> },
    Insert { index: usize, track_ids: Vec<String> },
    Remove { index: usize },
    /// Moves the item at `from` in front of the item at `to` (`len` for the end).
    Move { from: usize, to: usize },
    /// Both fields are always sent; unchanged ones carry the current value.
    SetMetadata { title: String, description: String },
}

impl MutationStep {
    pub fn describe(&self) -> String {
        match self {
            MutationStep::Append { track_ids } => format!("append {} track(s)", track_ids.len()),
            MutationStep::Insert { index, track_ids } => {
                format!("insert {} track(s) at {}", track_ids.len(), index)
            }
            MutationStep::Remove { index } => format!("remove index {}", index),
            MutationStep::Move { from, to } => format!("move {} -> {}", from, to),
            MutationStep::SetMetadata { .. } => "update metadata".to_string(),
        }
    }
}

/// Who the current session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: u64,
    pub country_code: String,
}

pub fn track_url(id: &str) -> String {
    format!("https://tidal.com/browse/track/{}?u", id)
}

pub fn album_url(id: &str) -> String {
    format!("https://tidal.com/browse/album/{}?u", id)
}

pub fn artist_url(id: &str) -> String {
    format!("https://tidal.com/browse/artist/{}?u", id)
}

pub fn playlist_url(id: &str) -> String {
    format!("https://tidal.com/playlist/{}", id)
}
