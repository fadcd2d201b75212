use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::models::TaskKind;

pub type TaskParams = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeedTaskId(pub u64);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedTask {
    pub id: SeedTaskId,
    pub policy_id: String,
    pub kind: TaskKind,
    pub params: TaskParams,
    pub consumed: bool,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSeedTask {
    pub policy_id: String,
    pub kind: TaskKind,
    pub params: TaskParams,
}

/// A single column value as produced by the data backend, before it is
/// normalized into task parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ColumnValue {
    /// Collapses the variant into the JSON scalar stored in a seed task's
    /// parameter map.
    pub fn into_scalar(self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Null => Value::Null,
            Self::Integer(value) => Value::from(value),
            Self::Real(value) => serde_json::Number::from_f64(value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(value) => Value::String(value),
            Self::Blob(bytes) => Value::String(hex::encode(bytes)),
        }
    }
}

/// One row of query output in column order.
pub type QueryRow = Vec<(String, ColumnValue)>;

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::ColumnValue;

    #[test]
    fn scalar_values_keep_their_json_type() {
        assert_eq!(ColumnValue::Null.into_scalar(), Value::Null);
        assert_eq!(ColumnValue::Integer(-4).into_scalar(), json!(-4));
        assert_eq!(ColumnValue::Real(1.5).into_scalar(), json!(1.5));
        assert_eq!(
            ColumnValue::Text("east".to_string()).into_scalar(),
            json!("east")
        );
    }

    #[test]
    fn non_finite_reals_become_null() {
        assert_eq!(ColumnValue::Real(f64::NAN).into_scalar(), Value::Null);
        assert_eq!(ColumnValue::Real(f64::INFINITY).into_scalar(), Value::Null);
    }

    #[test]
    fn blobs_are_hex_encoded() {
        assert_eq!(
            ColumnValue::Blob(vec![0x00, 0xab, 0x10]).into_scalar(),
            json!("00ab10")
        );
    }
}
