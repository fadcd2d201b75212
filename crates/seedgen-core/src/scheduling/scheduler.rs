use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::config::SchedulerConfig;
use crate::generation::{self, GenerationOutcome};
use crate::models::{CoreError, CoreErrorKind, PolicyGenerationConfig, PolicyRecord, TaskKind};
use crate::persistence::{PolicyAdminStore, PolicyStore, SessionFactory};
use crate::scheduling::SchedulingResult;
use crate::scheduling::reconcile::{LoopState, ReconcileReport, Reconciler, ReconciliationLoop};
use crate::scheduling::registry::{JobCallback, JobFuture, JobRegistry, ScheduledJobInfo};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub active_jobs: usize,
    pub active_policies: Vec<String>,
}

/// The scheduling authority for a process: one job registry plus the
/// reconciliation loop that keeps it in line with the store.
///
/// Construct once at startup and share by reference (or `Arc`) with every
/// consumer.
pub struct Scheduler {
    sessions: Arc<dyn SessionFactory>,
    registry: Arc<JobRegistry>,
    reconciler: Reconciler,
    reconciliation: ReconciliationLoop,
    callback: JobCallback,
    config: SchedulerConfig,
    running: AtomicBool,
    lifecycle: Mutex<()>,
}

impl Scheduler {
    /// Jobs and the reconciliation worker are spawned onto `runtime`.
    pub fn new(sessions: Arc<dyn SessionFactory>, config: SchedulerConfig, runtime: Handle) -> Self {
        let registry = Arc::new(JobRegistry::new(runtime));
        let callback = generation_callback(Arc::clone(&sessions));
        let reconciler = Reconciler::new(
            Arc::clone(&sessions),
            Arc::clone(&registry),
            Arc::clone(&callback),
        );
        let reconciliation = ReconciliationLoop::new(reconciler.clone(), config.clone());

        Self {
            sessions,
            registry,
            reconciler,
            reconciliation,
            callback,
            config,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Starts the registry and the reconciliation loop. Returns false (and
    /// does nothing) if already running.
    pub async fn start(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::SeqCst) {
            tracing::debug!("scheduler already running");
            return false;
        }

        self.registry.resume();
        self.reconciliation.start().await;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("scheduler started");
        true
    }

    /// Stops the reconciliation loop, then cancels every job trigger. Once
    /// this returns no further firings or store reads are started. Returns
    /// false if already stopped.
    pub async fn stop(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.load(Ordering::SeqCst) {
            tracing::debug!("scheduler already stopped");
            return false;
        }

        self.reconciliation.stop().await;
        self.registry.shutdown();
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("scheduler stopped");
        true
    }

    /// Starts the scheduler and loads all policies when `auto_start` is set.
    /// A failed load is logged; the reconciliation loop retries it.
    pub async fn bootstrap(&self) -> bool {
        if !self.config.auto_start {
            tracing::info!("scheduler auto start disabled");
            return false;
        }

        self.start().await;
        if let Err(error) = self.load_all_policies().await {
            tracing::error!(error = %error, "initial policy load failed");
        }
        true
    }

    /// Registers a job for every enabled scheduled policy in the store.
    pub async fn load_all_policies(&self) -> SchedulingResult<ReconcileReport> {
        let reconciler = self.reconciler.clone();
        tokio::task::spawn_blocking(move || reconciler.load_all())
            .await
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("policy load task failed: {error}"),
                )
            })?
    }

    /// Immediate registration outside the reconciliation cycle. One-time
    /// configs are accepted without registering a job.
    pub fn add_policy_job(&self, config: &PolicyGenerationConfig) -> bool {
        if config.kind == TaskKind::OneTime {
            tracing::debug!(
                policy_id = %config.policy_id,
                "one-time policy has no schedule; nothing to register"
            );
            return true;
        }

        self.registry.add_job(
            &config.policy_id,
            &config.cron_expression,
            Arc::clone(&self.callback),
        )
    }

    pub fn remove_policy_job(&self, policy_id: &str) -> bool {
        self.registry.remove_job(policy_id)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn reconciliation_state(&self) -> LoopState {
        self.reconciliation.state()
    }

    pub fn job_count(&self) -> usize {
        self.registry.count()
    }

    pub fn active_policies(&self) -> BTreeSet<String> {
        self.registry.active_policy_ids()
    }

    pub fn jobs(&self) -> Vec<ScheduledJobInfo> {
        self.registry.jobs()
    }

    pub fn status(&self) -> SchedulerStatus {
        let active_policies: Vec<String> = self.active_policies().into_iter().collect();
        SchedulerStatus {
            running: self.is_running(),
            active_jobs: active_policies.len(),
            active_policies,
        }
    }

    /// Runs generation for one policy now, regardless of its schedule.
    pub async fn trigger_generation(&self, policy_id: &str) -> GenerationOutcome {
        let sessions = Arc::clone(&self.sessions);
        let owned_policy_id = policy_id.to_string();
        let outcome = tokio::task::spawn_blocking(move || {
            generation::trigger_generation(sessions.as_ref(), &owned_policy_id)
        })
        .await;

        match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(policy_id, error = %error, "manual generation task failed");
                GenerationOutcome {
                    policy_id: policy_id.to_string(),
                    kind: None,
                    success: false,
                    generated: 0,
                    message: format!("generation task failed: {error}"),
                }
            }
        }
    }

    /// Updates the policy's enabled flag and applies the change to the
    /// registry immediately instead of waiting for the next cycle.
    pub async fn set_policy_enabled(
        &self,
        policy_id: &str,
        enabled: bool,
    ) -> SchedulingResult<Option<PolicyRecord>> {
        let sessions = Arc::clone(&self.sessions);
        let owned_policy_id = policy_id.to_string();
        let (record, config) = tokio::task::spawn_blocking(move || {
            let session = sessions.open_session()?;
            let record = session.set_policy_enabled(&owned_policy_id, enabled)?;
            let config = match record {
                Some(_) => session.generation_config(&owned_policy_id)?,
                None => None,
            };
            Ok::<_, CoreError>((record, config))
        })
        .await
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("policy update task failed: {error}"),
            )
        })?
        .map_err(|error| error.for_policy(policy_id))?;

        if record.is_none() {
            return Ok(None);
        }

        if enabled {
            if let Some(config) = config
                && self.is_running()
            {
                self.add_policy_job(&config);
            }
        } else {
            self.remove_policy_job(policy_id);
        }
        Ok(record)
    }
}

fn generation_callback(sessions: Arc<dyn SessionFactory>) -> JobCallback {
    Arc::new(move |policy_id: String| -> JobFuture {
        let sessions = Arc::clone(&sessions);
        Box::pin(async move {
            let task_policy_id = policy_id.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                generation::run_scheduled_generation(sessions.as_ref(), &task_policy_id)
            })
            .await;
            if let Err(error) = outcome {
                tracing::error!(
                    policy_id = %policy_id,
                    error = %error,
                    "scheduled generation task failed"
                );
            }
        })
    })
}
