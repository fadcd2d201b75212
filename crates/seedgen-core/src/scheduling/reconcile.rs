use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::SchedulerConfig;
use crate::models::{CoreError, CoreErrorKind, PolicyGenerationConfig, TaskKind};
use crate::persistence::{PersistenceResult, PolicyStore, SessionFactory};
use crate::scheduling::registry::{JobCallback, JobRegistry};

/// What a reconciliation pass changed in the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Number of enabled scheduled policies found in the store.
    pub desired: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Policies whose job could not be registered (invalid cron expression).
    pub rejected: Vec<String>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Converges the job registry onto the enabled scheduled policies in the
/// store. Each pass opens its own session and recomputes desired state from
/// scratch.
#[derive(Clone)]
pub struct Reconciler {
    sessions: Arc<dyn SessionFactory>,
    registry: Arc<JobRegistry>,
    callback: JobCallback,
}

impl Reconciler {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        registry: Arc<JobRegistry>,
        callback: JobCallback,
    ) -> Self {
        Self {
            sessions,
            registry,
            callback,
        }
    }

    /// One full cycle: adds jobs for desired policies missing from the
    /// registry and removes jobs no longer desired. Any store failure aborts
    /// the cycle before the registry is touched.
    pub fn run_cycle(&self) -> PersistenceResult<ReconcileReport> {
        let desired = {
            let session = self.sessions.open_session()?;
            let mut desired = BTreeMap::new();
            for config in session.list_generation_configs()? {
                if config.kind != TaskKind::Scheduled {
                    continue;
                }
                let record = session
                    .policy_record(&config.policy_id)
                    .map_err(|error| error.for_policy(&config.policy_id))?;
                if record.is_some_and(|record| record.enabled) {
                    desired.insert(config.policy_id.clone(), config);
                }
            }
            desired
        };

        let current = self.registry.active_policy_ids();
        let mut report = ReconcileReport {
            desired: desired.len(),
            ..ReconcileReport::default()
        };

        for (policy_id, config) in &desired {
            if !current.contains(policy_id) {
                self.register(config, &mut report);
            }
        }

        for policy_id in current {
            if !desired.contains_key(&policy_id) && self.registry.remove_job(&policy_id) {
                report.removed.push(policy_id);
            }
        }

        Ok(report)
    }

    /// Add side only: registers (or re-registers) a job for every enabled
    /// scheduled policy. Existing jobs for other policies are left alone.
    pub fn load_all(&self) -> PersistenceResult<ReconcileReport> {
        let configs = {
            let session = self.sessions.open_session()?;
            session.list_enabled_generation_configs()?
        };

        let mut report = ReconcileReport::default();
        for config in configs
            .iter()
            .filter(|config| config.kind == TaskKind::Scheduled)
        {
            report.desired += 1;
            self.register(config, &mut report);
        }

        tracing::info!(
            desired = report.desired,
            registered = report.added.len(),
            rejected = report.rejected.len(),
            "loaded scheduled policies"
        );
        Ok(report)
    }

    fn register(&self, config: &PolicyGenerationConfig, report: &mut ReconcileReport) {
        let added = self.registry.add_job(
            &config.policy_id,
            &config.cron_expression,
            Arc::clone(&self.callback),
        );
        if added {
            report.added.push(config.policy_id.clone());
        } else {
            report.rejected.push(config.policy_id.clone());
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Running,
    Stopped,
}

struct LoopWorker {
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Periodic worker driving [`Reconciler::run_cycle`]. The first cycle runs one
/// interval after start; the initial registration is the caller's job (see
/// [`Reconciler::load_all`]).
pub struct ReconciliationLoop {
    reconciler: Reconciler,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<LoopWorker>>,
}

impl ReconciliationLoop {
    pub fn new(reconciler: Reconciler, config: SchedulerConfig) -> Self {
        Self {
            reconciler,
            config,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LoopState {
        if self.running.load(Ordering::SeqCst) {
            LoopState::Running
        } else {
            LoopState::Stopped
        }
    }

    /// Spawns the worker. Returns false if it is already running.
    pub async fn start(&self) -> bool {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return false;
        }

        self.running.store(true, Ordering::SeqCst);
        let wake = Arc::new(Notify::new());
        let handle = tokio::spawn(run_worker(
            self.reconciler.clone(),
            self.config.clone(),
            Arc::clone(&self.running),
            Arc::clone(&wake),
        ));
        *worker = Some(LoopWorker { wake, handle });
        tracing::debug!(
            interval_secs = self.config.reconcile_interval.as_secs(),
            "reconciliation loop started"
        );
        true
    }

    /// Signals the worker, wakes it from its idle wait and waits up to the
    /// configured stop timeout for it to exit. Returns false if it was not
    /// running.
    pub async fn stop(&self) -> bool {
        let mut worker = self.worker.lock().await;
        let Some(LoopWorker { wake, mut handle }) = worker.take() else {
            return false;
        };

        self.running.store(false, Ordering::SeqCst);
        // notify_one stores a permit if the worker is mid-cycle.
        wake.notify_one();

        match timeout(self.config.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::error!(error = %error, "reconciliation worker terminated abnormally");
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(
                    timeout_secs = self.config.stop_timeout.as_secs(),
                    "reconciliation worker did not stop in time; aborted"
                );
            }
        }
        tracing::debug!("reconciliation loop stopped");
        true
    }
}

async fn run_worker(
    reconciler: Reconciler,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    let mut consecutive_failures = 0u32;
    let mut pause = config.reconcile_interval;

    loop {
        idle(pause, &wake).await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let cycle = reconciler.clone();
        let outcome = tokio::task::spawn_blocking(move || cycle.run_cycle())
            .await
            .unwrap_or_else(|error| {
                Err(CoreError::new(
                    CoreErrorKind::Internal,
                    format!("reconciliation cycle panicked: {error}"),
                ))
            });

        pause = match outcome {
            Ok(report) => {
                consecutive_failures = 0;
                if report.changed() || !report.rejected.is_empty() {
                    tracing::info!(
                        desired = report.desired,
                        added = ?report.added,
                        removed = ?report.removed,
                        rejected = ?report.rejected,
                        "reconciliation cycle applied changes"
                    );
                } else {
                    tracing::debug!(desired = report.desired, "reconciliation cycle found no drift");
                }
                config.reconcile_interval
            }
            Err(error) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let backoff = config.backoff_after(consecutive_failures);
                tracing::error!(
                    error = %error,
                    consecutive_failures,
                    backoff_secs = backoff.as_secs_f64(),
                    "reconciliation cycle failed; backing off"
                );
                backoff
            }
        };
    }

    tracing::debug!("reconciliation worker exited");
}

async fn idle(pause: Duration, wake: &Notify) {
    let _ = timeout(pause, wake.notified()).await;
}
