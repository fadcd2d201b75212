use serde::Serialize;

use crate::models::{NewSeedTask, PolicyGenerationConfig, QueryRow, TaskKind, TaskParams};
use crate::persistence::{PolicySession, PolicyStore, QueryBackend, SessionFactory};

/// Result of a manual generation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GenerationOutcome {
    pub policy_id: String,
    pub kind: Option<TaskKind>,
    pub success: bool,
    pub generated: usize,
    pub message: String,
}

impl GenerationOutcome {
    fn failed(policy_id: &str, kind: Option<TaskKind>, message: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.to_string(),
            kind,
            success: false,
            generated: 0,
            message: message.into(),
        }
    }
}

/// Runs a policy's query and turns each returned row into a seed task.
///
/// Borrows a session for the duration of one unit of work; nothing here
/// returns an error to the caller. Failures are logged and reflected in the
/// returned count.
pub struct GenerationExecutor<'a> {
    session: &'a dyn PolicySession,
}

impl<'a> GenerationExecutor<'a> {
    pub fn new(session: &'a dyn PolicySession) -> Self {
        Self { session }
    }

    /// Returns the number of seed tasks persisted. Rows are persisted one at a
    /// time; generation stops at the first row that fails to persist and the
    /// rows before it stay committed.
    pub fn generate_seed_tasks(&self, config: &PolicyGenerationConfig) -> usize {
        let policy_id = config.policy_id.as_str();

        match self.session.policy_record(policy_id) {
            Ok(Some(record)) if record.enabled => {}
            Ok(Some(_)) => {
                tracing::info!(policy_id, "policy is disabled; skipping generation");
                return 0;
            }
            Ok(None) => {
                tracing::info!(policy_id, "policy record not found; skipping generation");
                return 0;
            }
            Err(error) => {
                tracing::error!(policy_id, error = %error, "failed to read policy record");
                return 0;
            }
        }

        let rows = match self.session.fetch_rows(&config.query) {
            Ok(rows) => rows,
            Err(error) => {
                tracing::error!(
                    policy_id,
                    error = %error,
                    "policy query failed; treating as empty result"
                );
                return 0;
            }
        };

        let total = rows.len();
        let mut generated = 0usize;
        for row in rows {
            let task = NewSeedTask {
                policy_id: policy_id.to_string(),
                kind: config.kind,
                params: row_to_params(row),
            };
            match self.session.create_seed_task(&task) {
                Ok(_) => generated += 1,
                Err(error) => {
                    tracing::error!(
                        policy_id,
                        generated,
                        total,
                        error = %error,
                        "failed to persist seed task; stopping generation"
                    );
                    break;
                }
            }
        }

        tracing::info!(policy_id, kind = config.kind.as_str(), generated, "generated seed tasks");
        generated
    }

    /// Generates tasks for a one-time policy, then marks every pending task of
    /// that policy consumed. Configs of any other kind are ignored.
    pub fn handle_one_time_generation(&self, config: &PolicyGenerationConfig) -> usize {
        let policy_id = config.policy_id.as_str();
        if config.kind != TaskKind::OneTime {
            tracing::warn!(
                policy_id,
                kind = config.kind.as_str(),
                "one-time generation requested for a non one-time policy"
            );
            return 0;
        }

        let generated = self.generate_seed_tasks(config);
        if generated > 0 {
            self.consume_pending(policy_id);
        }
        generated
    }

    fn consume_pending(&self, policy_id: &str) {
        let pending = match self.session.list_pending_seed_tasks(Some(policy_id)) {
            Ok(pending) => pending,
            Err(error) => {
                tracing::error!(policy_id, error = %error, "failed to list pending seed tasks");
                return;
            }
        };

        let mut consumed = 0usize;
        for task in pending {
            match self.session.mark_seed_task_consumed(task.id) {
                Ok(Some(_)) => consumed += 1,
                Ok(None) => {
                    tracing::warn!(policy_id, task_id = task.id.0, "seed task vanished before consumption");
                }
                Err(error) => {
                    tracing::error!(
                        policy_id,
                        task_id = task.id.0,
                        error = %error,
                        "failed to mark seed task consumed"
                    );
                }
            }
        }
        tracing::debug!(policy_id, consumed, "marked one-time seed tasks consumed");
    }
}

/// Normalizes a query row into a seed task parameter map.
pub fn row_to_params(row: QueryRow) -> TaskParams {
    row.into_iter()
        .map(|(column, value)| (column, value.into_scalar()))
        .collect()
}

/// Work done when a policy's cron trigger fires. Opens its own session, re-reads
/// the generation config and only generates for scheduled policies.
pub fn run_scheduled_generation(sessions: &dyn SessionFactory, policy_id: &str) -> usize {
    let session = match sessions.open_session() {
        Ok(session) => session,
        Err(error) => {
            tracing::error!(policy_id, error = %error, "failed to open session for scheduled generation");
            return 0;
        }
    };

    let config = match session.generation_config(policy_id) {
        Ok(Some(config)) => config,
        Ok(None) => {
            tracing::info!(policy_id, "generation config not found; skipping scheduled run");
            return 0;
        }
        Err(error) => {
            tracing::error!(policy_id, error = %error, "failed to read generation config");
            return 0;
        }
    };

    if config.kind != TaskKind::Scheduled {
        tracing::info!(
            policy_id,
            kind = config.kind.as_str(),
            "policy is no longer scheduled; skipping scheduled run"
        );
        return 0;
    }

    GenerationExecutor::new(session.as_ref()).generate_seed_tasks(&config)
}

/// Manual generation for one policy, dispatched on the config's kind.
pub fn trigger_generation(sessions: &dyn SessionFactory, policy_id: &str) -> GenerationOutcome {
    let session = match sessions.open_session() {
        Ok(session) => session,
        Err(error) => {
            tracing::error!(policy_id, error = %error, "failed to open session for manual generation");
            return GenerationOutcome::failed(policy_id, None, error.message);
        }
    };

    let config = match session.generation_config(policy_id) {
        Ok(Some(config)) => config,
        Ok(None) => {
            return GenerationOutcome::failed(
                policy_id,
                None,
                format!("no generation config for policy '{policy_id}'"),
            );
        }
        Err(error) => {
            tracing::error!(policy_id, error = %error, "failed to read generation config");
            return GenerationOutcome::failed(policy_id, None, error.message);
        }
    };

    let executor = GenerationExecutor::new(session.as_ref());
    let generated = match config.kind {
        TaskKind::OneTime => executor.handle_one_time_generation(&config),
        TaskKind::Scheduled => executor.generate_seed_tasks(&config),
    };

    GenerationOutcome {
        policy_id: policy_id.to_string(),
        kind: Some(config.kind),
        success: true,
        generated,
        message: format!("generated {generated} seed task(s)"),
    }
}
