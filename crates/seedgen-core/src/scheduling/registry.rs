use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::scheduling::cron::CronSchedule;

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Invoked with the policy id each time a job's trigger fires.
pub type JobCallback = Arc<dyn Fn(String) -> JobFuture + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledJobInfo {
    pub policy_id: String,
    pub cron_expression: String,
    pub registered_at: SystemTime,
    pub next_fire_at: Option<DateTime<Local>>,
}

struct ScheduledJob {
    schedule: CronSchedule,
    trigger: AbortHandle,
    gate: TriggerGate,
    registered_at: SystemTime,
}

impl ScheduledJob {
    fn cancel(&self) {
        self.gate.close();
        self.trigger.abort();
    }
}

struct RegistryState {
    jobs: HashMap<String, ScheduledJob>,
    shut_down: bool,
}

/// Cron jobs keyed by policy id, at most one per policy.
///
/// Each job owns a trigger task on the runtime that sleeps until the next
/// fire time and then spawns the callback, so a slow callback never delays
/// other triggers. Fire times are computed in the local time zone.
pub struct JobRegistry {
    runtime: Handle,
    state: Mutex<RegistryState>,
    in_flight: InFlightPolicies,
}

impl JobRegistry {
    /// Creates a registry in the shut-down state; call [`JobRegistry::resume`]
    /// before registering jobs.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            state: Mutex::new(RegistryState {
                jobs: HashMap::new(),
                shut_down: true,
            }),
            in_flight: InFlightPolicies::default(),
        }
    }

    pub fn resume(&self) {
        self.lock_state().shut_down = false;
    }

    /// Cancels every trigger and refuses further registrations until resumed.
    /// Callbacks already running are left to finish.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        for (_, job) in state.jobs.drain() {
            job.cancel();
        }
        state.shut_down = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_state().shut_down
    }

    /// Registers (or re-registers) the job for `policy_id`. Returns false when
    /// the expression does not parse or the registry is shut down; in both
    /// cases an existing job for the policy is left untouched.
    pub fn add_job(&self, policy_id: &str, cron_expression: &str, callback: JobCallback) -> bool {
        let schedule = match CronSchedule::parse(cron_expression) {
            Ok(schedule) => schedule,
            Err(error) => {
                tracing::warn!(
                    policy_id,
                    cron = cron_expression,
                    error = %error,
                    "rejected job with invalid cron expression"
                );
                return false;
            }
        };

        let mut state = self.lock_state();
        if state.shut_down {
            tracing::warn!(policy_id, "job registry is shut down; job not registered");
            return false;
        }

        let gate = TriggerGate::default();
        let trigger = self
            .runtime
            .spawn(run_trigger(
                policy_id.to_string(),
                schedule.clone(),
                callback,
                self.in_flight.clone(),
                gate.clone(),
            ))
            .abort_handle();

        let replaced = state.jobs.insert(
            policy_id.to_string(),
            ScheduledJob {
                schedule,
                trigger,
                gate,
                registered_at: SystemTime::now(),
            },
        );
        if let Some(previous) = replaced {
            previous.cancel();
            tracing::debug!(policy_id, "replaced existing job");
        }

        tracing::info!(policy_id, cron = cron_expression, "registered job");
        true
    }

    /// Cancels the job for `policy_id`. Returns whether a job was present.
    pub fn remove_job(&self, policy_id: &str) -> bool {
        let removed = self.lock_state().jobs.remove(policy_id);
        match removed {
            Some(job) => {
                job.cancel();
                tracing::info!(policy_id, "removed job");
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.lock_state().jobs.len()
    }

    pub fn contains(&self, policy_id: &str) -> bool {
        self.lock_state().jobs.contains_key(policy_id)
    }

    pub fn active_policy_ids(&self) -> BTreeSet<String> {
        self.lock_state().jobs.keys().cloned().collect()
    }

    /// Snapshot of registered jobs ordered by policy id.
    pub fn jobs(&self) -> Vec<ScheduledJobInfo> {
        let now = Local::now();
        let state = self.lock_state();
        let mut jobs: Vec<ScheduledJobInfo> = state
            .jobs
            .iter()
            .map(|(policy_id, job)| ScheduledJobInfo {
                policy_id: policy_id.clone(),
                cron_expression: job.schedule.as_str().to_string(),
                registered_at: job.registered_at,
                next_fire_at: job.schedule.next_after(&now),
            })
            .collect();
        jobs.sort_by(|left, right| left.policy_id.cmp(&right.policy_id));
        jobs
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for job in state.jobs.values() {
            job.cancel();
        }
    }
}

async fn run_trigger(
    policy_id: String,
    schedule: CronSchedule,
    callback: JobCallback,
    in_flight: InFlightPolicies,
    gate: TriggerGate,
) {
    let mut last_fire: Option<DateTime<Local>> = None;

    loop {
        let now = Local::now();
        // A timer may wake marginally before the wall clock reaches the fire
        // time; never compute the same fire time twice.
        let reference = match last_fire {
            Some(last) if last >= now => last,
            _ => now,
        };

        let Some(fire_at) = schedule.next_after(&reference) else {
            tracing::warn!(
                policy_id = %policy_id,
                cron = schedule.as_str(),
                "cron expression has no upcoming fire time; trigger stopped"
            );
            return;
        };

        let wait = (fire_at - reference).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        last_fire = Some(fire_at);

        let Some(guard) = in_flight.try_acquire(&policy_id) else {
            tracing::warn!(
                policy_id = %policy_id,
                "previous run still in progress; skipping this firing"
            );
            continue;
        };

        // The abort may land while this task is between its sleep and the
        // spawn below; the gate decides whether the firing still counts.
        let fired = gate.run_if_open(|| {
            tracing::debug!(policy_id = %policy_id, "job fired");
            let job = callback(policy_id.clone());
            tokio::spawn(async move {
                let _guard = guard;
                job.await;
            });
        });
        if !fired {
            return;
        }
    }
}

/// Closed when a job is removed. Closing waits for any firing that is
/// currently being spawned, so once `close` returns no new callback starts.
#[derive(Clone, Default)]
struct TriggerGate {
    closed: Arc<Mutex<bool>>,
}

impl TriggerGate {
    fn close(&self) {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    fn run_if_open(&self, fire: impl FnOnce()) -> bool {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return false;
        }
        fire();
        true
    }
}

/// Policies with a callback currently running.
#[derive(Clone, Default)]
struct InFlightPolicies {
    active: Arc<Mutex<HashSet<String>>>,
}

impl InFlightPolicies {
    fn try_acquire(&self, policy_id: &str) -> Option<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(policy_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            policy_id: policy_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }
}

struct InFlightGuard {
    policy_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.policy_id);
    }
}

#[cfg(test)]
mod tests {
    use super::{InFlightPolicies, TriggerGate};

    #[test]
    fn in_flight_guard_blocks_until_dropped() {
        let in_flight = InFlightPolicies::default();

        let guard = in_flight.try_acquire("sales-daily").unwrap();
        assert!(in_flight.try_acquire("sales-daily").is_none());
        assert!(in_flight.try_acquire("import-once").is_some());

        drop(guard);
        assert!(in_flight.try_acquire("sales-daily").is_some());
    }

    #[test]
    fn closed_gate_never_fires() {
        let gate = TriggerGate::default();
        let mut fired = 0;

        assert!(gate.run_if_open(|| fired += 1));
        gate.clone().close();
        assert!(!gate.run_if_open(|| fired += 1));
        assert_eq!(fired, 1);
    }
}
