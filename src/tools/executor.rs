use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Error;
use crate::planner::Outcome;
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs a tool and wraps whatever happened in the response envelope.
    pub async fn execute(&self, name: &str, params: Value, cancel: CancellationToken) -> Value {
        let Some(tool) = self.registry.get(name) else {
            warn!("Tool not found: {}", name);
            return failure(&Error::invalid(format!("unknown tool: {}", name)), false);
        };

        let started = Instant::now();
        let result = tool.execute(params, cancel).await;
        let elapsed = started.elapsed();
        match result {
            Ok(payload) => {
                info!("Tool {} succeeded in {:?}", name, elapsed);
                success(payload)
            }
            Err(err) => {
                warn!("Tool {} failed in {:?}: {}", name, elapsed, err);
                failure(&err, tool.mutates())
            }
        }
    }
}

/// `{"status": "success", ...payload}`. A payload that already carries a
/// status is passed through unchanged.
pub fn success(payload: Value) -> Value {
    if payload.get("status").is_some() {
        return payload;
    }
    let mut body = Map::new();
    body.insert("status".to_string(), json!("success"));
    match payload {
        Value::Object(fields) => body.extend(fields),
        Value::Null => {}
        other => {
            body.insert("result".to_string(), other);
        }
    }
    Value::Object(body)
}

/// `{"status": "error", "kind", "message", "retryable"}`, plus the mutation
/// report and outcome for edits.
pub fn failure(err: &Error, mutates: bool) -> Value {
    let mut body = json!({
        "status": "error",
        "kind": err.kind(),
        "message": err.to_string(),
        "retryable": err.is_retryable(),
    });
    match err {
        Error::PartialMutationFailure(report) => {
            body["mutation"] = json!(report);
            body["outcome"] = json!(report.outcome());
        }
        _ if mutates => {
            body["outcome"] = json!(Outcome::NothingApplied);
        }
        _ => {}
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MutationStep;
    use crate::planner::{MutationReport, StepStatus};
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes its arguments"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn mutates(&self) -> bool {
            true
        }
        async fn execute(&self, params: Value, _cancel: CancellationToken) -> crate::Result<Value> {
            if params["fail"].as_bool() == Some(true) {
                return Err(Error::RateLimited { retry_after: None });
            }
            Ok(json!({"echo": params}))
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        ToolExecutor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let out = executor()
            .execute("echo", json!({"x": 1}), CancellationToken::new())
            .await;
        assert_eq!(out["status"], "success");
        assert_eq!(out["echo"]["x"], 1);
    }

    #[tokio::test]
    async fn test_error_envelope_for_edits() {
        let out = executor()
            .execute("echo", json!({"fail": true}), CancellationToken::new())
            .await;
        assert_eq!(out["status"], "error");
        assert_eq!(out["kind"], "rate_limited");
        assert_eq!(out["retryable"], true);
        assert_eq!(out["outcome"], "nothing_applied");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let out = executor()
            .execute("nope", Value::Null, CancellationToken::new())
            .await;
        assert_eq!(out["kind"], "invalid_request");
        assert!(out.get("outcome").is_none());
    }

    #[test]
    fn test_partial_failure_carries_report() {
        let steps = vec![
            MutationStep::Remove { index: 4 },
            MutationStep::Remove { index: 2 },
        ];
        let mut report = MutationReport::planned("p", &steps);
        report.steps[0].status = StepStatus::Applied;
        report.steps[1].status = StepStatus::Failed {
            kind: crate::error::ErrorKind::NotFound,
            message: "gone".into(),
        };

        let out = failure(&Error::PartialMutationFailure(Box::new(report)), true);
        assert_eq!(out["kind"], "partial_mutation_failure");
        assert_eq!(out["outcome"], "partially_applied");
        assert_eq!(out["mutation"]["steps"][1]["status"], "failed");
        assert_eq!(out["mutation"]["steps"][1]["kind"], "not_found");
    }
}
