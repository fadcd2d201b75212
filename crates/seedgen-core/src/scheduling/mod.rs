pub mod cron;
pub mod reconcile;
pub mod registry;
pub mod scheduler;

use crate::models::CoreError;

pub use cron::CronSchedule;
pub use reconcile::{LoopState, ReconcileReport, Reconciler, ReconciliationLoop};
pub use registry::{JobCallback, JobFuture, JobRegistry, ScheduledJobInfo};
pub use scheduler::{Scheduler, SchedulerStatus};

pub type SchedulingResult<T> = Result<T, CoreError>;
