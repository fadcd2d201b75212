use crate::models::{
    CoreError, NewPolicyGenerationConfig, NewPolicyRecord, NewSeedTask, NewTaskSource,
    PolicyGenerationConfig, PolicyRecord, QueryRow, SeedTask, SeedTaskId, TaskSource,
    TaskSourceId,
};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Policy and seed-task operations the scheduling core depends on.
pub trait PolicyStore: Send {
    fn policy_record(&self, policy_id: &str) -> PersistenceResult<Option<PolicyRecord>>;

    fn generation_config(&self, policy_id: &str)
    -> PersistenceResult<Option<PolicyGenerationConfig>>;

    fn list_generation_configs(&self) -> PersistenceResult<Vec<PolicyGenerationConfig>>;

    /// Generation configs whose policy record exists and is enabled.
    fn list_enabled_generation_configs(&self) -> PersistenceResult<Vec<PolicyGenerationConfig>>;

    fn create_seed_task(&self, task: &NewSeedTask) -> PersistenceResult<SeedTask>;

    /// Unconsumed seed tasks, optionally restricted to one policy.
    fn list_pending_seed_tasks(&self, policy_id: Option<&str>) -> PersistenceResult<Vec<SeedTask>>;

    /// Returns `None` when no task has the given id. Marking an already
    /// consumed task returns it unchanged.
    fn mark_seed_task_consumed(&self, task_id: SeedTaskId) -> PersistenceResult<Option<SeedTask>>;
}

/// Administrative writes and listings used outside the scheduling core.
pub trait PolicyAdminStore: Send {
    fn create_policy_record(&self, record: &NewPolicyRecord) -> PersistenceResult<PolicyRecord>;

    fn set_policy_enabled(
        &self,
        policy_id: &str,
        enabled: bool,
    ) -> PersistenceResult<Option<PolicyRecord>>;

    fn list_policy_records(&self, offset: usize, limit: usize)
    -> PersistenceResult<Vec<PolicyRecord>>;

    fn create_generation_config(
        &self,
        config: &NewPolicyGenerationConfig,
    ) -> PersistenceResult<PolicyGenerationConfig>;

    fn list_seed_tasks(&self, offset: usize, limit: usize) -> PersistenceResult<Vec<SeedTask>>;

    /// A second source with the same name and url is `InvalidInput`.
    fn create_task_source(&self, source: &NewTaskSource) -> PersistenceResult<TaskSource>;

    fn list_task_sources(&self, offset: usize, limit: usize) -> PersistenceResult<Vec<TaskSource>>;

    fn set_task_source_enabled(
        &self,
        source_id: TaskSourceId,
        enabled: bool,
    ) -> PersistenceResult<Option<TaskSource>>;
}

/// The data backend a policy's query text runs against.
pub trait QueryBackend: Send {
    fn fetch_rows(&self, query: &str) -> PersistenceResult<Vec<QueryRow>>;
}

/// An isolated connection to the backend, owned by a single unit of work and
/// released when dropped.
pub trait PolicySession: PolicyStore + PolicyAdminStore + QueryBackend {}

impl<T> PolicySession for T where T: PolicyStore + PolicyAdminStore + QueryBackend {}

pub trait SessionFactory: Send + Sync {
    fn open_session(&self) -> PersistenceResult<Box<dyn PolicySession>>;
}
