use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use seedgen_core::config::SchedulerConfig;
use seedgen_core::models::{
    CoreError, CoreErrorKind, NewPolicyGenerationConfig, NewPolicyRecord, TaskKind,
};
use seedgen_core::persistence::{PersistenceResult, PolicyAdminStore, PolicySession, SessionFactory};
use seedgen_core::scheduling::{
    JobCallback, JobFuture, JobRegistry, LoopState, Reconciler, ReconciliationLoop,
};
use seedgen_core::sqlite::SqliteStore;
use tokio::runtime::Handle;

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("seedgen-{test_name}-{nanos}.sqlite3"))
}

fn migrated_store(test_name: &str) -> Arc<SqliteStore> {
    let store = SqliteStore::new(test_db_path(test_name));
    store.migrate_to_latest().unwrap();
    Arc::new(store)
}

fn add_policy(store: &SqliteStore, policy_id: &str, enabled: bool, kind: TaskKind, cron: &str) {
    let session = store.session().unwrap();
    session
        .create_policy_record(&NewPolicyRecord {
            policy_id: policy_id.to_string(),
            data_source_type: "sqlite".to_string(),
            description: None,
            enabled,
        })
        .unwrap();
    session
        .create_generation_config(&NewPolicyGenerationConfig {
            policy_id: policy_id.to_string(),
            query: "SELECT 1 AS value".to_string(),
            cron_expression: cron.to_string(),
            kind,
        })
        .unwrap();
}

fn set_enabled(store: &SqliteStore, policy_id: &str, enabled: bool) {
    store
        .session()
        .unwrap()
        .set_policy_enabled(policy_id, enabled)
        .unwrap()
        .unwrap();
}

fn noop_callback() -> JobCallback {
    Arc::new(|_policy_id: String| -> JobFuture { Box::pin(async {}) })
}

fn running_registry() -> Arc<JobRegistry> {
    let registry = Arc::new(JobRegistry::new(Handle::current()));
    registry.resume();
    registry
}

fn reconciler_for(sessions: Arc<dyn SessionFactory>, registry: &Arc<JobRegistry>) -> Reconciler {
    Reconciler::new(sessions, Arc::clone(registry), noop_callback())
}

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        auto_start: true,
        reconcile_interval: Duration::from_millis(20),
        error_backoff: Duration::from_millis(10),
        max_error_backoff: Duration::from_millis(40),
        stop_timeout: Duration::from_secs(5),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Store that is never reachable.
struct UnavailableSessions;

impl SessionFactory for UnavailableSessions {
    fn open_session(&self) -> PersistenceResult<Box<dyn PolicySession>> {
        Err(CoreError::new(
            CoreErrorKind::StorageFailure,
            "store unavailable",
        ))
    }
}

/// Fails the first `failures` sessions, then delegates; counts every open.
struct FlakySessions {
    store: Arc<SqliteStore>,
    failures_left: AtomicUsize,
    opened: AtomicUsize,
}

impl FlakySessions {
    fn new(store: Arc<SqliteStore>, failures: usize) -> Self {
        Self {
            store,
            failures_left: AtomicUsize::new(failures),
            opened: AtomicUsize::new(0),
        }
    }
}

impl SessionFactory for FlakySessions {
    fn open_session(&self) -> PersistenceResult<Box<dyn PolicySession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CoreError::new(
                CoreErrorKind::StorageFailure,
                "transient outage",
            ));
        }
        self.store.open_session()
    }
}

#[tokio::test]
async fn cycle_registers_only_enabled_scheduled_policies() {
    let store = migrated_store("cycle-desired");
    add_policy(&store, "sales-daily", true, TaskKind::Scheduled, "0 2 * * *");
    add_policy(&store, "paused", false, TaskKind::Scheduled, "0 2 * * *");
    add_policy(&store, "import-once", true, TaskKind::OneTime, "0 2 * * *");

    let registry = running_registry();
    let reconciler = Reconciler::new(store, Arc::clone(&registry), noop_callback());
    let report = reconciler.run_cycle().unwrap();

    assert_eq!(report.desired, 1);
    assert_eq!(report.added, vec!["sales-daily"]);
    assert!(report.removed.is_empty());
    assert_eq!(registry.active_policy_ids(), ids(&["sales-daily"]));

    // A second pass finds nothing to change.
    let report = reconciler.run_cycle().unwrap();
    assert!(!report.changed());
    assert_eq!(registry.count(), 1);
}

#[tokio::test]
async fn cycle_removes_jobs_for_disabled_and_unknown_policies() {
    let store = migrated_store("cycle-remove");
    add_policy(&store, "sales-daily", true, TaskKind::Scheduled, "0 2 * * *");

    let registry = running_registry();
    registry.add_job("stale", "0 4 * * *", noop_callback());
    let reconciler = reconciler_for(store.clone(), &registry);

    let report = reconciler.run_cycle().unwrap();
    assert_eq!(report.removed, vec!["stale"]);
    assert_eq!(registry.active_policy_ids(), ids(&["sales-daily"]));

    set_enabled(&store, "sales-daily", false);
    let report = reconciler.run_cycle().unwrap();
    assert_eq!(report.removed, vec!["sales-daily"]);
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn cycle_reports_invalid_cron_as_rejected() {
    let store = migrated_store("cycle-bad-cron");
    add_policy(&store, "bad-cron", true, TaskKind::Scheduled, "not-a-cron");
    add_policy(&store, "sales-daily", true, TaskKind::Scheduled, "0 2 * * *");

    let registry = running_registry();
    let report = Reconciler::new(store, Arc::clone(&registry), noop_callback())
        .run_cycle()
        .unwrap();

    assert_eq!(report.desired, 2);
    assert_eq!(report.rejected, vec!["bad-cron"]);
    assert_eq!(registry.active_policy_ids(), ids(&["sales-daily"]));
}

#[tokio::test]
async fn store_outage_abandons_cycle_without_touching_registry() {
    let registry = running_registry();
    registry.add_job("sales-daily", "0 2 * * *", noop_callback());

    let reconciler = Reconciler::new(
        Arc::new(UnavailableSessions),
        Arc::clone(&registry),
        noop_callback(),
    );
    let error = reconciler.run_cycle().unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::StorageFailure);
    assert_eq!(registry.active_policy_ids(), ids(&["sales-daily"]));
}

#[tokio::test]
async fn load_all_only_adds() {
    let store = migrated_store("load-all");
    add_policy(&store, "sales-daily", true, TaskKind::Scheduled, "0 2 * * *");
    add_policy(&store, "paused", false, TaskKind::Scheduled, "0 2 * * *");
    add_policy(&store, "import-once", true, TaskKind::OneTime, "");

    let registry = running_registry();
    registry.add_job("external", "0 4 * * *", noop_callback());
    let report = Reconciler::new(store, Arc::clone(&registry), noop_callback())
        .load_all()
        .unwrap();

    assert_eq!(report.desired, 1);
    assert_eq!(report.added, vec!["sales-daily"]);
    assert_eq!(registry.active_policy_ids(), ids(&["external", "sales-daily"]));
}

#[tokio::test]
async fn loop_converges_on_store_changes() {
    let store = migrated_store("loop-converge");
    let registry = running_registry();
    let reconciliation = ReconciliationLoop::new(
        reconciler_for(store.clone(), &registry),
        fast_config(),
    );

    assert!(reconciliation.start().await);
    assert!(!reconciliation.start().await);
    assert_eq!(reconciliation.state(), LoopState::Running);

    add_policy(&store, "sales-daily", true, TaskKind::Scheduled, "0 2 * * *");
    assert!(wait_until(|| registry.contains("sales-daily")).await);

    set_enabled(&store, "sales-daily", false);
    assert!(wait_until(|| !registry.contains("sales-daily")).await);

    assert!(reconciliation.stop().await);
    assert!(!reconciliation.stop().await);
    assert_eq!(reconciliation.state(), LoopState::Stopped);
}

#[tokio::test]
async fn loop_backs_off_and_recovers_after_failures() {
    let store = migrated_store("loop-recover");
    add_policy(&store, "sales-daily", true, TaskKind::Scheduled, "0 2 * * *");
    let sessions = Arc::new(FlakySessions::new(Arc::clone(&store), 3));

    let registry = running_registry();
    let reconciliation = ReconciliationLoop::new(
        reconciler_for(sessions.clone(), &registry),
        fast_config(),
    );
    reconciliation.start().await;

    assert!(wait_until(|| registry.contains("sales-daily")).await);
    assert!(sessions.opened.load(Ordering::SeqCst) >= 4);

    reconciliation.stop().await;
}

#[tokio::test]
async fn stop_interrupts_idle_wait_and_ends_store_reads() {
    let store = migrated_store("loop-stop");
    let sessions = Arc::new(FlakySessions::new(store, 0));
    let registry = running_registry();
    let reconciliation = ReconciliationLoop::new(
        reconciler_for(sessions.clone(), &registry),
        SchedulerConfig {
            reconcile_interval: Duration::from_secs(3600),
            ..SchedulerConfig::default()
        },
    );
    reconciliation.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopping = Instant::now();
    assert!(reconciliation.stop().await);
    assert!(stopping.elapsed() < Duration::from_secs(1));

    let opened = sessions.opened.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sessions.opened.load(Ordering::SeqCst), opened);
}

#[tokio::test]
async fn stopped_loop_can_restart() {
    let store = migrated_store("loop-restart");
    let registry = running_registry();
    let reconciliation = ReconciliationLoop::new(
        reconciler_for(store.clone(), &registry),
        fast_config(),
    );

    reconciliation.start().await;
    reconciliation.stop().await;

    add_policy(&store, "sales-daily", true, TaskKind::Scheduled, "0 2 * * *");
    assert!(reconciliation.start().await);
    assert!(wait_until(|| registry.contains("sales-daily")).await);
    reconciliation.stop().await;
}
