//! Transaction data structures for card fraud scoring

use crate::types::frame::Frame;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Input fields of a scored transaction, in model column order
pub const FIELD_NAMES: [&str; 29] = [
    "V1", "V2", "V3", "V4", "V5", "V6", "V7", "V8", "V9", "V10", "V11", "V12", "V13", "V14",
    "V15", "V16", "V17", "V18", "V19", "V20", "V21", "V22", "V23", "V24", "V25", "V26", "V27",
    "V28", "Amount",
];

/// Why a single field failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Missing,
    FloatType,
}

impl FieldErrorKind {
    pub fn message(&self) -> &'static str {
        match self {
            FieldErrorKind::Missing => "Field required",
            FieldErrorKind::FloatType => "Input should be a valid number",
        }
    }
}

/// A single invalid field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub kind: FieldErrorKind,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind.message())
    }
}

/// Request payload that does not describe a transaction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("body must be a JSON object")]
    NotAnObject,

    #[error("{} invalid field(s), first: {}", .0.len(), .0[0])]
    InvalidFields(Vec<FieldError>),
}

/// A card transaction to be scored: 28 anonymized PCA components plus the amount.
///
/// Only constructed through validation ([`Transaction::from_json`]) or directly
/// from already-typed values, so every instance carries all 29 fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "V1")]
    pub v1: f64,
    #[serde(rename = "V2")]
    pub v2: f64,
    #[serde(rename = "V3")]
    pub v3: f64,
    #[serde(rename = "V4")]
    pub v4: f64,
    #[serde(rename = "V5")]
    pub v5: f64,
    #[serde(rename = "V6")]
    pub v6: f64,
    #[serde(rename = "V7")]
    pub v7: f64,
    #[serde(rename = "V8")]
    pub v8: f64,
    #[serde(rename = "V9")]
    pub v9: f64,
    #[serde(rename = "V10")]
    pub v10: f64,
    #[serde(rename = "V11")]
    pub v11: f64,
    #[serde(rename = "V12")]
    pub v12: f64,
    #[serde(rename = "V13")]
    pub v13: f64,
    #[serde(rename = "V14")]
    pub v14: f64,
    #[serde(rename = "V15")]
    pub v15: f64,
    #[serde(rename = "V16")]
    pub v16: f64,
    #[serde(rename = "V17")]
    pub v17: f64,
    #[serde(rename = "V18")]
    pub v18: f64,
    #[serde(rename = "V19")]
    pub v19: f64,
    #[serde(rename = "V20")]
    pub v20: f64,
    #[serde(rename = "V21")]
    pub v21: f64,
    #[serde(rename = "V22")]
    pub v22: f64,
    #[serde(rename = "V23")]
    pub v23: f64,
    #[serde(rename = "V24")]
    pub v24: f64,
    #[serde(rename = "V25")]
    pub v25: f64,
    #[serde(rename = "V26")]
    pub v26: f64,
    #[serde(rename = "V27")]
    pub v27: f64,
    #[serde(rename = "V28")]
    pub v28: f64,

    /// Transaction amount, in the dataset's currency
    #[serde(rename = "Amount")]
    pub amount: f64,
}

impl Transaction {
    /// Build from values laid out as [`FIELD_NAMES`]
    pub fn from_values(v: [f64; 29]) -> Self {
        Self {
            v1: v[0],
            v2: v[1],
            v3: v[2],
            v4: v[3],
            v5: v[4],
            v6: v[5],
            v7: v[6],
            v8: v[7],
            v9: v[8],
            v10: v[9],
            v11: v[10],
            v12: v[11],
            v13: v[12],
            v14: v[13],
            v15: v[14],
            v16: v[15],
            v17: v[16],
            v18: v[17],
            v19: v[18],
            v20: v[19],
            v21: v[20],
            v22: v[21],
            v23: v[22],
            v24: v[23],
            v25: v[24],
            v26: v[25],
            v27: v[26],
            v28: v[27],
            amount: v[28],
        }
    }

    /// Values in [`FIELD_NAMES`] order
    pub fn values(&self) -> [f64; 29] {
        [
            self.v1, self.v2, self.v3, self.v4, self.v5, self.v6, self.v7, self.v8, self.v9,
            self.v10, self.v11, self.v12, self.v13, self.v14, self.v15, self.v16, self.v17,
            self.v18, self.v19, self.v20, self.v21, self.v22, self.v23, self.v24, self.v25,
            self.v26, self.v27, self.v28, self.amount,
        ]
    }

    /// Validate a raw request body.
    ///
    /// Every required field must be present and a JSON number. All offending
    /// fields are reported, not only the first. Unknown fields are ignored.
    pub fn from_slice(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        Self::from_json(&value)
    }

    /// Validate an already-parsed JSON value
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;
        Self::from_object(object)
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self, ValidationError> {
        let mut values = [0.0; 29];
        let mut errors = Vec::new();

        for (slot, field) in values.iter_mut().zip(FIELD_NAMES) {
            match object.get(field) {
                None => errors.push(FieldError {
                    field,
                    kind: FieldErrorKind::Missing,
                }),
                Some(raw) => match raw.as_f64() {
                    Some(v) => *slot = v,
                    None => errors.push(FieldError {
                        field,
                        kind: FieldErrorKind::FloatType,
                    }),
                },
            }
        }

        if errors.is_empty() {
            Ok(Self::from_values(values))
        } else {
            Err(ValidationError::InvalidFields(errors))
        }
    }

    /// Single-row frame with columns in [`FIELD_NAMES`] order
    pub fn to_frame(&self) -> Frame {
        Frame::single_row(&FIELD_NAMES, self.values().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(amount: f64) -> Value {
        let mut object = Map::new();
        for (i, field) in FIELD_NAMES.iter().enumerate() {
            object.insert(field.to_string(), json!(i as f64 * 0.1));
        }
        object.insert("Amount".to_string(), json!(amount));
        Value::Object(object)
    }

    #[test]
    fn test_valid_payload() {
        let tx = Transaction::from_json(&payload(149.62)).unwrap();
        assert_eq!(tx.amount, 149.62);
        assert_eq!(tx.v1, 0.0);
        assert_eq!(tx.values()[27], 27.0 * 0.1);
    }

    #[test]
    fn test_integers_are_accepted_as_floats() {
        let mut body = payload(0.0);
        body["Amount"] = json!(100);
        let tx = Transaction::from_json(&body).unwrap();
        assert_eq!(tx.amount, 100.0);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let mut body = payload(10.0);
        body["extra_field"] = json!("should_be_ignored");
        assert!(Transaction::from_json(&body).is_ok());
    }

    #[test]
    fn test_missing_field_reported() {
        let mut body = payload(10.0);
        body.as_object_mut().unwrap().remove("V7");

        match Transaction::from_json(&body) {
            Err(ValidationError::InvalidFields(errors)) => {
                assert_eq!(
                    errors,
                    vec![FieldError {
                        field: "V7",
                        kind: FieldErrorKind::Missing
                    }]
                );
            }
            other => panic!("expected InvalidFields, got {:?}", other),
        }
    }

    #[test]
    fn test_all_invalid_fields_reported() {
        let body = json!({"V1": "invalid_string", "V2": 1.0});

        match Transaction::from_json(&body) {
            Err(ValidationError::InvalidFields(errors)) => {
                assert_eq!(errors.len(), 28);
                assert_eq!(errors[0].field, "V1");
                assert_eq!(errors[0].kind, FieldErrorKind::FloatType);
                assert!(errors[1..]
                    .iter()
                    .all(|e| e.kind == FieldErrorKind::Missing));
            }
            other => panic!("expected InvalidFields, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_and_malformed_bodies() {
        assert_eq!(
            Transaction::from_json(&json!([1, 2, 3])),
            Err(ValidationError::NotAnObject)
        );
        assert!(matches!(
            Transaction::from_slice(b"{not json"),
            Err(ValidationError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_to_frame_column_order() {
        let tx = Transaction::from_json(&payload(42.0)).unwrap();
        let frame = tx.to_frame();

        assert_eq!(frame.len(), 1);
        assert_eq!(frame.num_columns(), 29);
        assert_eq!(frame.columns()[28], "Amount");
        assert_eq!(frame.rows()[0][28], 42.0);
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = Transaction::from_json(&payload(50.0)).unwrap();

        let json = serde_json::to_value(tx).unwrap();
        assert_eq!(json["Amount"], json!(50.0));

        let deserialized: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(tx, deserialized);
    }
}
