//! [`LogMessage`]: one row of a [`crate::table::MessageTable`] (spec §3).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::column::{Column, ColumnValue};
use crate::error::Error;

/// The timestamp format the CSV input and caches use: `YYYY-MM-DD
/// HH:MM:SS.ffffff`, sub-second resolution, no timezone.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub line_id: u64,
    pub timestamp: NaiveDateTime,
    pub content: String,
    pub service: String,
    /// Present iff `service_template_id` is also present (schema invariant,
    /// spec §3: "pre-clustering" vs "post-clustering" table states).
    pub template: Option<String>,
    pub service_template_id: Option<u64>,
}

impl LogMessage {
    /// Read this row's value of `column`, failing with *TypeMismatch* when
    /// `column` is `service_template_id` but the row hasn't been clustered
    /// yet (pre-clustering schema state).
    pub fn column_value(&self, column: Column) -> Result<ColumnValue, Error> {
        match column {
            Column::Content => Ok(ColumnValue::Text(self.content.clone())),
            Column::ServiceTemplateId => self
                .service_template_id
                .map(ColumnValue::TemplateId)
                .ok_or_else(|| Error::TypeMismatch(column.to_string())),
        }
    }
}
