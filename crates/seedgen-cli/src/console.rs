//! Newline-delimited JSON console for a running scheduler.
//!
//! Each stdin line is a request such as `{"command":"add","policy_id":"p1"}`;
//! each gets exactly one JSON response line on stdout. Logs go to stderr.

use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use seedgen_core::config::SchedulerConfig;
use seedgen_core::models::{CoreError, CoreErrorKind, PolicyGenerationConfig};
use seedgen_core::persistence::{PolicyStore, SessionFactory};
use seedgen_core::scheduling::{ScheduledJobInfo, Scheduler};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Stdout};
use tokio::runtime::Handle;

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum ConsoleRequest {
    Start,
    Stop,
    Reload,
    Status,
    Jobs,
    Add { policy_id: String },
    Remove { policy_id: String },
    Generate { policy_id: String },
    Enable { policy_id: String },
    Disable { policy_id: String },
    Quit,
}

#[derive(Debug, Serialize)]
struct ConsoleResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ConsoleResponse {
    fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn rejected(data: Value) -> Self {
        Self {
            ok: false,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Hosts the scheduler until stdin closes, a `quit` request arrives, or the
/// process receives Ctrl-C. The scheduler is always stopped before returning.
pub async fn serve(sessions: Arc<dyn SessionFactory>, config: SchedulerConfig) -> Result<()> {
    let scheduler = Scheduler::new(Arc::clone(&sessions), config, Handle::current());
    scheduler.bootstrap().await;
    tracing::info!(running = scheduler.is_running(), "seedgen console ready");

    let outcome = tokio::select! {
        result = run_reader(&scheduler, sessions.as_ref()) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("interrupt received; shutting down");
            Ok(())
        }
    };

    scheduler.stop().await;
    outcome
}

async fn run_reader(scheduler: &Scheduler, sessions: &dyn SessionFactory) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut writer = BufWriter::new(tokio::io::stdout());
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("failed to read from stdin")?;
        if bytes_read == 0 {
            tracing::info!("stdin closed; shutting down console");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (response, quit) = match serde_json::from_str::<ConsoleRequest>(trimmed) {
            Ok(ConsoleRequest::Quit) => (ConsoleResponse::ok(json!("bye")), true),
            Ok(request) => (handle(scheduler, sessions, request).await, false),
            Err(error) => {
                tracing::warn!(error = %error, raw_line = %trimmed, "unparseable console request");
                (
                    ConsoleResponse::error(format!("invalid request: {error}")),
                    false,
                )
            }
        };

        let json = serde_json::to_string(&response).context("failed to serialize response")?;
        write_line(&mut writer, &json).await?;

        if quit {
            return Ok(());
        }
    }
}

async fn handle(
    scheduler: &Scheduler,
    sessions: &dyn SessionFactory,
    request: ConsoleRequest,
) -> ConsoleResponse {
    match request {
        ConsoleRequest::Start => {
            let started = scheduler.start().await;
            if started && let Err(error) = scheduler.load_all_policies().await {
                return ConsoleResponse::error(error.to_string());
            }
            ConsoleResponse::ok(json!({ "started": started, "status": scheduler.status() }))
        }
        ConsoleRequest::Stop => {
            let stopped = scheduler.stop().await;
            ConsoleResponse::ok(json!({ "stopped": stopped, "status": scheduler.status() }))
        }
        ConsoleRequest::Reload => match scheduler.load_all_policies().await {
            Ok(report) => ConsoleResponse::ok(json!(report)),
            Err(error) => ConsoleResponse::error(error.to_string()),
        },
        ConsoleRequest::Status => ConsoleResponse::ok(json!(scheduler.status())),
        ConsoleRequest::Jobs => {
            let jobs: Vec<Value> = scheduler.jobs().iter().map(job_json).collect();
            ConsoleResponse::ok(Value::Array(jobs))
        }
        ConsoleRequest::Add { policy_id } => match generation_config(sessions, &policy_id) {
            Ok(config) => {
                let added = scheduler.add_policy_job(&config);
                let data = json!({ "policy_id": policy_id, "added": added });
                if added {
                    ConsoleResponse::ok(data)
                } else {
                    ConsoleResponse::rejected(data)
                }
            }
            Err(error) => ConsoleResponse::error(error.to_string()),
        },
        ConsoleRequest::Remove { policy_id } => {
            let removed = scheduler.remove_policy_job(&policy_id);
            ConsoleResponse::ok(json!({ "policy_id": policy_id, "removed": removed }))
        }
        ConsoleRequest::Generate { policy_id } => {
            let outcome = scheduler.trigger_generation(&policy_id).await;
            if outcome.success {
                ConsoleResponse::ok(json!(outcome))
            } else {
                ConsoleResponse::rejected(json!(outcome))
            }
        }
        ConsoleRequest::Enable { policy_id } => set_enabled(scheduler, &policy_id, true).await,
        ConsoleRequest::Disable { policy_id } => set_enabled(scheduler, &policy_id, false).await,
        ConsoleRequest::Quit => ConsoleResponse::ok(json!("bye")),
    }
}

async fn set_enabled(scheduler: &Scheduler, policy_id: &str, enabled: bool) -> ConsoleResponse {
    match scheduler.set_policy_enabled(policy_id, enabled).await {
        Ok(Some(record)) => ConsoleResponse::ok(json!({
            "policy_id": record.policy_id,
            "enabled": record.enabled,
            "scheduled": scheduler.active_policies().contains(policy_id),
        })),
        Ok(None) => ConsoleResponse::error(format!("policy '{policy_id}' not found")),
        Err(error) => ConsoleResponse::error(error.to_string()),
    }
}

// Console requests are handled one at a time, so the blocking read is short
// and does not contend with other requests.
fn generation_config(
    sessions: &dyn SessionFactory,
    policy_id: &str,
) -> Result<PolicyGenerationConfig, CoreError> {
    sessions.open_session()?.generation_config(policy_id)?.ok_or_else(|| {
        CoreError::new(
            CoreErrorKind::NotFound,
            format!("no generation config for policy '{policy_id}'"),
        )
    })
}

fn job_json(job: &ScheduledJobInfo) -> Value {
    json!({
        "policy_id": job.policy_id,
        "cron_expression": job.cron_expression,
        "registered_at_unix": job
            .registered_at
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default(),
        "next_fire_at": job.next_fire_at.map(|at| at.to_rfc3339()),
    })
}

async fn write_line(writer: &mut BufWriter<Stdout>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .context("failed to write to stdout")?;
    writer
        .write_all(b"\n")
        .await
        .context("failed to write newline to stdout")?;
    writer.flush().await.context("failed to flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ConsoleRequest;

    #[test]
    fn requests_are_tagged_by_command() {
        let request: ConsoleRequest =
            serde_json::from_str(r#"{"command":"add","policy_id":"sales-daily"}"#).unwrap();
        assert!(matches!(request, ConsoleRequest::Add { policy_id } if policy_id == "sales-daily"));

        let request: ConsoleRequest = serde_json::from_str(r#"{"command":"status"}"#).unwrap();
        assert!(matches!(request, ConsoleRequest::Status));

        assert!(serde_json::from_str::<ConsoleRequest>(r#"{"command":"explode"}"#).is_err());
    }
}
