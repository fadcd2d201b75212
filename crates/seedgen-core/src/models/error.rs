use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    InvalidInput,
    InvalidSchedule,
    NotFound,
    QueryFailure,
    StorageFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub policy: Option<String>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            policy: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_policy(mut self, policy_id: &str) -> Self {
        if self.policy.is_none() {
            self.policy = Some(policy_id.to_string());
        }
        self
    }
}
