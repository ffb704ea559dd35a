//! The polymorphic result value.
//!
//! The relational layout spreads a computed value over five nullable columns
//! (numeric, datetime, text, boolean, json); exactly one must be populated.
//! In the domain model that is a tagged union with a single validated
//! constructor — the five-column form only exists at the storage boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CanonError;
use crate::types::ResultType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultValue {
    Numeric(Decimal),
    Datetime(DateTime<Utc>),
    Text(String),
    Boolean(bool),
    Json(Value),
}

/// Exploded five-column form for SQL binding.
pub type ValueColumns = (
    Option<Decimal>,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<bool>,
    Option<Value>,
);

impl ResultValue {
    /// The single validated constructor over the five nullable columns.
    /// Zero populated columns and more than one both fail, before any write.
    pub fn from_columns(
        numeric: Option<Decimal>,
        datetime: Option<DateTime<Utc>>,
        text: Option<String>,
        boolean: Option<bool>,
        json: Option<Value>,
    ) -> Result<Self, CanonError> {
        let populated = numeric.is_some() as u8
            + datetime.is_some() as u8
            + text.is_some() as u8
            + boolean.is_some() as u8
            + json.is_some() as u8;
        if populated != 1 {
            return Err(CanonError::Validation(format!(
                "exactly one result value column must be populated, found {populated}"
            )));
        }
        Ok(if let Some(n) = numeric {
            Self::Numeric(n)
        } else if let Some(d) = datetime {
            Self::Datetime(d)
        } else if let Some(t) = text {
            Self::Text(t)
        } else if let Some(b) = boolean {
            Self::Boolean(b)
        } else {
            Self::Json(json.expect("one column populated"))
        })
    }

    pub fn into_columns(self) -> ValueColumns {
        match self {
            Self::Numeric(n) => (Some(n), None, None, None, None),
            Self::Datetime(d) => (None, Some(d), None, None, None),
            Self::Text(t) => (None, None, Some(t), None, None),
            Self::Boolean(b) => (None, None, None, Some(b), None),
            Self::Json(j) => (None, None, None, None, Some(j)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric",
            Self::Datetime(_) => "datetime",
            Self::Text(_) => "text",
            Self::Boolean(_) => "boolean",
            Self::Json(_) => "json",
        }
    }

    pub fn as_numeric(&self) -> Option<Decimal> {
        match self {
            Self::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether this value arm can carry a result of the declared type.
    /// The numeric-family result types all bind through the numeric column.
    pub fn compatible_with(&self, result_type: ResultType) -> bool {
        matches!(
            (result_type, self),
            (
                ResultType::Numeric
                    | ResultType::Percentage
                    | ResultType::Currency
                    | ResultType::Count
                    | ResultType::Ratio,
                Self::Numeric(_)
            ) | (ResultType::Text, Self::Text(_))
                | (ResultType::Boolean, Self::Boolean(_))
                | (ResultType::Datetime, Self::Datetime(_))
                | (ResultType::Json, Self::Json(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn from_columns_zero_populated_fails() {
        let err = ResultValue::from_columns(None, None, None, None, None).unwrap_err();
        assert!(err.to_string().contains("found 0"));
    }

    #[test]
    fn from_columns_two_populated_fails() {
        let err = ResultValue::from_columns(
            Some(Decimal::from_str("1000.00").unwrap()),
            None,
            Some("oops".into()),
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn from_columns_each_single_arm() {
        let n = ResultValue::from_columns(Some(Decimal::ONE), None, None, None, None).unwrap();
        assert_eq!(n.kind(), "numeric");

        let d = ResultValue::from_columns(None, Some(Utc::now()), None, None, None).unwrap();
        assert_eq!(d.kind(), "datetime");

        let t = ResultValue::from_columns(None, None, Some("x".into()), None, None).unwrap();
        assert_eq!(t.kind(), "text");

        let b = ResultValue::from_columns(None, None, None, Some(true), None).unwrap();
        assert_eq!(b.kind(), "boolean");

        let j = ResultValue::from_columns(None, None, None, None, Some(json!({"p50": 4}))).unwrap();
        assert_eq!(j.kind(), "json");
    }

    #[test]
    fn columns_round_trip() {
        let value = ResultValue::Numeric(Decimal::from_str("1000.00").unwrap());
        let (n, d, t, b, j) = value.clone().into_columns();
        let back = ResultValue::from_columns(n, d, t, b, j).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn currency_requires_numeric_arm() {
        let numeric = ResultValue::Numeric(Decimal::ONE);
        let text = ResultValue::Text("1000".into());
        assert!(numeric.compatible_with(ResultType::Currency));
        assert!(!text.compatible_with(ResultType::Currency));
    }

    #[test]
    fn json_type_rejects_boolean_arm() {
        assert!(!ResultValue::Boolean(true).compatible_with(ResultType::Json));
        assert!(ResultValue::Json(json!([1, 2])).compatible_with(ResultType::Json));
    }

    #[test]
    fn serde_shape_is_snake_case_tagged() {
        let value = ResultValue::Boolean(true);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, json!({"boolean": true}));
    }
}
