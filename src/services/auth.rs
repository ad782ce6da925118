use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::SessionInfo;
use crate::remote::RemoteApi;
use crate::session::SessionStore;

pub struct AuthService {
    session: SessionStore,
    remote: Arc<dyn RemoteApi>,
}

impl AuthService {
    pub fn new(session: SessionStore, remote: Arc<dyn RemoteApi>) -> Self {
        Self { session, remote }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_active()
    }

    /// Loads the stored session and checks it against TIDAL.
    pub async fn login(&self) -> Result<SessionInfo> {
        self.session.reload()?;
        match self.remote.validate_session().await {
            Ok(info) => {
                info!(
                    "Auth: logged in as user {} ({})",
                    info.user_id, info.country_code
                );
                Ok(info)
            }
            Err(err) => {
                if matches!(err, Error::Unauthenticated) {
                    self.session.invalidate();
                }
                warn!("Auth: session validation failed: {}", err);
                Err(err)
            }
        }
    }
}
