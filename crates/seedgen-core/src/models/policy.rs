use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// How seed tasks for a policy are produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Generated repeatedly on the policy's cron schedule.
    Scheduled,
    /// Generated once on demand and immediately marked consumed.
    OneTime,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::Scheduled, TaskKind::OneTime];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::OneTime => "one_time",
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(Self::Scheduled),
            "one_time" => Ok(Self::OneTime),
            _ => Err(()),
        }
    }
}

/// Enablement record for a policy, owned by the configuration store.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub policy_id: String,
    pub data_source_type: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewPolicyRecord {
    pub policy_id: String,
    pub data_source_type: String,
    pub description: Option<String>,
    pub enabled: bool,
}

/// Task-generation settings for a policy: what to query, when, and which kind
/// of seed task the rows become.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PolicyGenerationConfig {
    pub policy_id: String,
    pub query: String,
    pub cron_expression: String,
    pub kind: TaskKind,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewPolicyGenerationConfig {
    pub policy_id: String,
    pub query: String,
    pub cron_expression: String,
    pub kind: TaskKind,
}
