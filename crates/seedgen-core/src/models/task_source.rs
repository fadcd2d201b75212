use std::time::SystemTime;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskSourceId(pub u64);

/// An upstream location that downstream executors fetch and parse. A name may
/// be reused across urls but each (name, url) pair is registered once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSource {
    pub id: TaskSourceId,
    pub source_name: String,
    pub url: String,
    /// Free-form extraction rules, kept as JSON.
    pub parse_template: Option<serde_json::Value>,
    pub enabled: bool,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTaskSource {
    pub source_name: String,
    pub url: String,
    pub parse_template: Option<serde_json::Value>,
    pub enabled: bool,
}
