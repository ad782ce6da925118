use std::sync::Arc;

use crate::pager::Pager;
use crate::remote::RemoteApi;
use crate::session::SessionStore;

pub mod auth;
pub mod catalog;
pub mod playlists;

pub use auth::AuthService;
pub use catalog::{CatalogService, RecommendRequest, SearchKind};
pub use playlists::{Creation, PlaylistService};

/// Everything the tools delegate to, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<AuthService>,
    pub catalog: Arc<CatalogService>,
    pub playlists: Arc<PlaylistService>,
}

impl Services {
    pub fn new(remote: Arc<dyn RemoteApi>, session: SessionStore, pager: Pager) -> Self {
        Self {
            auth: Arc::new(AuthService::new(session, remote.clone())),
            catalog: Arc::new(CatalogService::new(remote.clone(), pager.clone())),
            playlists: Arc::new(PlaylistService::new(remote, pager)),
        }
    }
}
