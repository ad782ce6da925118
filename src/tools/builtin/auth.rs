use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::services::AuthService;
use crate::tools::Tool;

pub struct LoginTool {
    pub auth: Arc<AuthService>,
}

#[async_trait]
impl Tool for LoginTool {
    fn name(&self) -> &str {
        "tidal_login"
    }

    fn description(&self) -> &str {
        "Log in to TIDAL using the stored session (written by the authorization helper or \
         provided through TIDAL_ACCESS_TOKEN) and confirm it is valid. Call this first, or \
         again whenever another tool reports unauthenticated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, _cancel: CancellationToken) -> Result<Value> {
        let info = self.auth.login().await?;
        Ok(json!({
            "message": format!("Logged in to TIDAL as user {}", info.user_id),
            "user_id": info.user_id,
            "country_code": info.country_code,
        }))
    }
}
