//! The two column selectors every strategy and table lookup is parameterized
//! over (spec §3, §4.4): `content` (free text) or `service_template_id`
//! (dense integer key assigned after template clustering).

use crate::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Content,
    ServiceTemplateId,
}

impl Column {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        match raw {
            "content" => Ok(Column::Content),
            "service_template_id" => Ok(Column::ServiceTemplateId),
            other => Err(Error::BadStrategy(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Content => "content",
            Column::ServiceTemplateId => "service_template_id",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime-typed value of a [`Column`]. `content` values are text,
/// `service_template_id` values are dense integers; candidates and noise
/// counts are always keyed on values of the same column, so the two never
/// mix in practice, but the enum keeps that invariant checkable (spec's
/// *TypeMismatch* error kind) rather than assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnValue {
    Text(String),
    TemplateId(u64),
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Text(s) => f.write_str(s),
            ColumnValue::TemplateId(id) => write!(f, "{id}"),
        }
    }
}
