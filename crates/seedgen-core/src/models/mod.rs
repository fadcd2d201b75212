pub mod error;
pub mod policy;
pub mod seed_task;
pub mod task_source;

pub use error::{CoreError, CoreErrorKind};
pub use policy::{
    NewPolicyGenerationConfig, NewPolicyRecord, PolicyGenerationConfig, PolicyRecord, TaskKind,
};
pub use seed_task::{ColumnValue, NewSeedTask, QueryRow, SeedTask, SeedTaskId, TaskParams};
pub use task_source::{NewTaskSource, TaskSource, TaskSourceId};
