//! [`MessageTable`]: the in-memory struct-of-arrays log table (spec §4.1),
//! plus [`RawRecords`], the untyped CSV-shaped intermediate Preparation
//! drives through the schema normalization/validation steps before it is
//! parsed into a table.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::column::{Column, ColumnValue};
use crate::error::{Error, Result};
use crate::message::{LogMessage, TIMESTAMP_FORMAT};

/// Columns every row must carry once template clustering has happened.
const REQUIRED_BASE: [&str; 3] = ["timestamp", "content", "service"];
const REQUIRED_TEMPLATE: [&str; 2] = ["template", "service_template_id"];
/// The columns a persisted cache CSV keeps; everything else is dropped by
/// `remove_unnecessary_columns` (spec §4.3 step 2: "drop everything else").
const KEEP_COLUMNS: [&str; 5] = ["timestamp", "content", "service", "template", "service_template_id"];

/// An untyped, header-addressed table of CSV rows, in original row order.
/// This is the shape Preparation's normalization/validation stages operate
/// on before the rows are parsed into a [`MessageTable`]. `line_id` is kept
/// out of `headers`/`rows` and carried separately: it is always the first
/// column of a persisted cache CSV (spec §6) and is never subject to the
/// normalization/column-dropping steps applied to the rest of the row.
#[derive(Debug, Clone, Default)]
pub struct RawRecords {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub line_ids: Vec<u64>,
}

impl RawRecords {
    /// Build from parsed CSV headers/rows, taking `line_id` values from a
    /// `line_id` column when present (case as read, before normalization),
    /// otherwise assigning the 0-based row position (spec §3: "dense index
    /// ... or stable sparse key").
    pub fn from_csv_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let line_id_idx = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("line_id"));

        let line_ids = match line_id_idx {
            Some(idx) => rows
                .iter()
                .map(|row| {
                    row[idx]
                        .parse::<u64>()
                        .map_err(|_| Error::Config(format!("line_id '{}' is not an integer", row[idx])))
                })
                .collect::<Result<Vec<_>>>()?,
            None => (0..rows.len() as u64).collect(),
        };

        let (headers, rows) = match line_id_idx {
            Some(idx) => {
                let headers = headers.into_iter().enumerate().filter(|(i, _)| *i != idx).map(|(_, h)| h).collect();
                let rows = rows
                    .into_iter()
                    .map(|row| row.into_iter().enumerate().filter(|(i, _)| *i != idx).map(|(_, v)| v).collect())
                    .collect();
                (headers, rows)
            }
            None => (headers, rows),
        };

        Ok(Self { headers, rows, line_ids })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn value<'a>(&'a self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.column_index(name).and_then(|i| row.get(i)).map(|s| s.as_str())
    }

    /// Trim, lowercase, and replace `-`/` ` with `_` in every header.
    pub fn normalize_column_names(&mut self) {
        for header in &mut self.headers {
            *header = header.trim().to_lowercase().replace(['-', ' '], "_");
        }
    }

    /// When `day` and `time` columns exist but `timestamp` doesn't,
    /// concatenate them into a new `timestamp` column.
    pub fn combine_daytime_to_timestamps(&mut self) {
        if self.has_column("timestamp") {
            return;
        }
        let (Some(day_idx), Some(time_idx)) = (self.column_index("day"), self.column_index("time")) else {
            return;
        };
        self.headers.push("timestamp".to_string());
        for row in &mut self.rows {
            let combined = format!("{} {}", row[day_idx], row[time_idx]);
            row.push(combined);
        }
    }

    pub fn ensure_required_columns_exist(&self, template_required: bool) -> Result<()> {
        let mut required = REQUIRED_BASE.to_vec();
        if template_required {
            required.extend(REQUIRED_TEMPLATE);
        }
        for column in required {
            if !self.has_column(column) {
                return Err(Error::MissingColumn(column.to_string()));
            }
        }
        Ok(())
    }

    /// Keep only the five schema columns (`line_id` is carried separately
    /// and always survives).
    pub fn remove_unnecessary_columns(&mut self) {
        let mut keep: Vec<usize> = Vec::new();
        for name in KEEP_COLUMNS {
            if let Some(i) = self.column_index(name) {
                keep.push(i);
            }
        }
        let headers = std::mem::take(&mut self.headers);
        self.headers = keep.iter().map(|&i| headers[i].clone()).collect();
        for row in &mut self.rows {
            let old = std::mem::take(row);
            *row = keep.iter().map(|&i| old[i].clone()).collect();
        }
    }

    pub fn validate_timestamp_format(&self) -> Result<()> {
        let Some(first) = self.rows.first() else {
            return Ok(());
        };
        let raw = self.value(first, "timestamp").unwrap_or_default();
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .map(|_| ())
            .map_err(|_| Error::BadTimestamp(raw.to_string()))
    }

    /// Only the endpoints are checked, matching the reference implementation
    /// (see DESIGN.md): a dip in the middle of the data is not detected.
    /// Ascending order is the contract; the error variant name documents
    /// what is actually enforced, not "descending" as an earlier draft of
    /// this check's message claimed.
    pub fn validate_timestamp_order(&self) -> Result<()> {
        let (Some(first), Some(last)) = (self.rows.first(), self.rows.last()) else {
            return Ok(());
        };
        let first_raw = self.value(first, "timestamp").unwrap_or_default();
        let last_raw = self.value(last, "timestamp").unwrap_or_default();
        let first_ts = NaiveDateTime::parse_from_str(first_raw, TIMESTAMP_FORMAT)
            .map_err(|_| Error::BadTimestamp(first_raw.to_string()))?;
        let last_ts = NaiveDateTime::parse_from_str(last_raw, TIMESTAMP_FORMAT)
            .map_err(|_| Error::BadTimestamp(last_raw.to_string()))?;
        if first_ts > last_ts {
            return Err(Error::OutOfOrder {
                first: first_raw.to_string(),
                last: last_raw.to_string(),
            });
        }
        Ok(())
    }

    /// Set a column's values, one per row, in row order. If `name` is
    /// already a column (spec §6: `template`/`service_template_id` may
    /// already be present on the input), overwrite its values in place;
    /// otherwise append a new column. Overwriting, rather than appending a
    /// second same-named header, keeps `column_index(name)` resolving to
    /// the freshly computed values instead of shadowing them behind a
    /// stale duplicate.
    pub fn set_or_push_column(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        if let Some(idx) = self.column_index(name) {
            for (row, value) in self.rows.iter_mut().zip(values) {
                row[idx] = value;
            }
        } else {
            self.headers.push(name.to_string());
            for (row, value) in self.rows.iter_mut().zip(values) {
                row.push(value);
            }
        }
    }

    /// Parse every row into a [`MessageTable`].
    pub fn into_message_table(self) -> Result<MessageTable> {
        let timestamp_idx = self
            .column_index("timestamp")
            .ok_or_else(|| Error::MissingColumn("timestamp".to_string()))?;
        let content_idx = self
            .column_index("content")
            .ok_or_else(|| Error::MissingColumn("content".to_string()))?;
        let service_idx = self
            .column_index("service")
            .ok_or_else(|| Error::MissingColumn("service".to_string()))?;
        let template_idx = self.column_index("template");
        let service_template_id_idx = self.column_index("service_template_id");

        let mut messages = Vec::with_capacity(self.rows.len());
        for (position, row) in self.rows.iter().enumerate() {
            let line_id = self.line_ids[position];
            let raw_ts = &row[timestamp_idx];
            let timestamp = NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT)
                .map_err(|_| Error::BadTimestamp(raw_ts.to_string()))?;
            let template = template_idx.map(|i| row[i].clone());
            let service_template_id = match service_template_id_idx {
                Some(i) if !row[i].is_empty() => Some(
                    row[i]
                        .parse::<u64>()
                        .map_err(|_| Error::TypeMismatch("service_template_id".to_string()))?,
                ),
                _ => None,
            };
            messages.push(LogMessage {
                line_id,
                timestamp,
                content: row[content_idx].clone(),
                service: row[service_idx].clone(),
                template,
                service_template_id,
            });
        }

        Ok(MessageTable::from_rows(messages))
    }
}

/// In-memory table of normalized log records (spec §4.1). Rows are kept in
/// the order Preparation produced them, which callers are expected to have
/// already validated as ascending by timestamp.
#[derive(Debug, Clone, Default)]
pub struct MessageTable {
    rows: Vec<LogMessage>,
    id_index: HashMap<u64, usize>,
}

impl MessageTable {
    pub fn from_rows(rows: Vec<LogMessage>) -> Self {
        let id_index = rows.iter().enumerate().map(|(i, r)| (r.line_id, i)).collect();
        Self { rows, id_index }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[LogMessage] {
        &self.rows
    }

    pub fn get_by_id(&self, line_id: u64) -> Result<LogMessage> {
        self.id_index
            .get(&line_id)
            .map(|&i| self.rows[i].clone())
            .ok_or(Error::NotFound(line_id))
    }

    /// All rows where `row[column] == value`, in table order.
    pub fn get_by_value(&self, column: Column, value: &ColumnValue) -> Result<Vec<LogMessage>> {
        let mut out = Vec::new();
        for row in &self.rows {
            if &row.column_value(column)? == value {
                out.push(row.clone());
            }
        }
        Ok(out)
    }

    fn max_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.iter().map(|r| r.timestamp).max()
    }

    /// Rows whose timestamp lies in `[end_time - seconds, end_time]`
    /// (closed on both ends, spec §8 property 2). Located via two binary
    /// searches since the table is timestamp-ordered.
    pub fn time_window(&self, end_time: NaiveDateTime, seconds: u64) -> Vec<LogMessage> {
        let start_time = end_time - chrono::Duration::seconds(seconds as i64);
        let lo = self.rows.partition_point(|r| r.timestamp < start_time);
        let hi = self.rows.partition_point(|r| r.timestamp <= end_time);
        self.rows[lo..hi].to_vec()
    }

    pub fn time_windows(&self, end_times: &[NaiveDateTime], seconds: u64) -> Vec<Vec<LogMessage>> {
        end_times.iter().map(|&e| self.time_window(e, seconds)).collect()
    }

    /// Distinct values of `column` present in every window in `end_times`
    /// (spec §8 property 3).
    pub fn time_windows_intersection(
        &self,
        column: Column,
        end_times: &[NaiveDateTime],
        seconds: u64,
    ) -> Result<Vec<ColumnValue>> {
        if end_times.is_empty() {
            return Ok(Vec::new());
        }
        let windows = self.time_windows(end_times, seconds);

        let distinct_ordered = |window: &[LogMessage]| -> Result<Vec<ColumnValue>> {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for row in window {
                let v = row.column_value(column)?;
                if seen.insert(v.clone()) {
                    out.push(v);
                }
            }
            Ok(out)
        };

        if windows.len() == 1 {
            return distinct_ordered(&windows[0]);
        }

        let first = distinct_ordered(&windows[0])?;
        let mut rest_sets: Vec<HashSet<ColumnValue>> = Vec::with_capacity(windows.len() - 1);
        for window in &windows[1..] {
            rest_sets.push(distinct_ordered(window)?.into_iter().collect());
        }

        Ok(first
            .into_iter()
            .filter(|v| rest_sets.iter().all(|set| set.contains(v)))
            .collect())
    }

    /// Values of `column` in rows outside every interval in `end_times`
    /// (and, per spec §4.1/§8 property 4, outside the tail interval
    /// anchored at the table's maximum timestamp).
    pub fn count_outside_time_windows(
        &self,
        column: Column,
        end_times: &[NaiveDateTime],
        seconds: u64,
    ) -> Result<HashMap<ColumnValue, u64>> {
        let mut intervals: Vec<(NaiveDateTime, NaiveDateTime)> = end_times
            .iter()
            .map(|&e| (e - chrono::Duration::seconds(seconds as i64), e))
            .collect();
        if let Some(max_ts) = self.max_timestamp() {
            intervals.push((max_ts - chrono::Duration::seconds(seconds as i64), max_ts));
        }
        intervals.sort_by_key(|&(start, _)| start);

        // Merge overlapping/adjacent intervals so the inside/outside test
        // below is a single binary search per row.
        let mut merged: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::new();
        for (start, end) in intervals {
            match merged.last_mut() {
                Some((_, last_end)) if start <= *last_end => {
                    if end > *last_end {
                        *last_end = end;
                    }
                }
                _ => merged.push((start, end)),
            }
        }

        let inside = |ts: NaiveDateTime| -> bool {
            let idx = merged.partition_point(|&(start, _)| start <= ts);
            idx > 0 && merged[idx - 1].1 >= ts
        };

        let mut counts: HashMap<ColumnValue, u64> = HashMap::new();
        for row in &self.rows {
            if !inside(row.timestamp) {
                *counts.entry(row.column_value(column)?).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Group rows by the unordered `(service, template)` pair and assign
    /// each group a fresh positive integer id, in first-appearance order
    /// (spec §4.1, §8 property 5).
    pub fn assign_service_template_ids(&mut self) -> Result<()> {
        let mut next_id: u64 = 1;
        let mut seen: HashMap<(String, String), u64> = HashMap::new();
        for row in &mut self.rows {
            let template = row
                .template
                .clone()
                .ok_or_else(|| Error::MissingColumn("template".to_string()))?;
            let key = (row.service.clone(), template);
            let id = *seen.entry(key).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                id
            });
            row.service_template_id = Some(id);
        }
        Ok(())
    }

    /// Flatten back into CSV-shaped rows (used to persist the
    /// post-clustering cache).
    pub fn to_raw_records(&self) -> RawRecords {
        let headers = KEEP_COLUMNS.iter().map(|s| s.to_string()).collect();
        let line_ids = self.rows.iter().map(|r| r.line_id).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| {
                vec![
                    r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    r.content.clone(),
                    r.service.clone(),
                    r.template.clone().unwrap_or_default(),
                    r.service_template_id.map(|id| id.to_string()).unwrap_or_default(),
                ]
            })
            .collect();
        RawRecords { headers, rows, line_ids }
    }
}
