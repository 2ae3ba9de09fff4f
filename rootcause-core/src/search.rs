//! [`SearchEngine`]: the correlation core (spec §4.5). Given an error line
//! and an ordered list of strategies, produces a [`RootCauseSet`] using
//! [`MessageTable`] primitives only.

use tracing::{debug, info};

use crate::error::Result;
use crate::message::LogMessage;
use crate::settings::SearchSettings;
use crate::strategy::Strategy;
use crate::table::MessageTable;
use crate::template::extract_parameters;

/// A strategy that contributed a candidate, frozen with the noise count
/// observed at match time (spec §3: "each matched strategy carries a
/// `found_with_noise` count observed at match time"). Stored as a value
/// copy, not a reference, per the design notes.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedStrategy {
    pub strategy: Strategy,
    pub found_with_noise: u64,
}

#[derive(Debug, Clone)]
pub struct RootCauseEntry {
    pub line_id: u64,
    pub message: LogMessage,
    pub strategies: Vec<MatchedStrategy>,
    /// Substrings matched against the message's template wildcards (spec
    /// §G.2's `extract_template_parameters` supplement), surfaced here for
    /// operator inspection; never fed back into correlation logic.
    pub parameters: Vec<String>,
}

/// Ordered sequence of [`RootCauseEntry`], sorted ascending by `line_id`,
/// at most one entry per `line_id` (spec §3, §8 property 8).
#[derive(Debug, Clone, Default)]
pub struct RootCauseSet {
    pub entries: Vec<RootCauseEntry>,
}

impl RootCauseSet {
    fn position(&self, line_id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.line_id == line_id)
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.line_id);
    }
}

/// Owns the [`MessageTable`] for one search session (spec §3 lifecycle: "A
/// fresh session is used per search invocation"). Mutates no row contents.
pub struct SearchEngine<'a> {
    settings: &'a SearchSettings,
    messages: MessageTable,
}

impl<'a> SearchEngine<'a> {
    pub fn new(settings: &'a SearchSettings, messages: MessageTable) -> Self {
        Self { settings, messages }
    }

    /// Run every configured strategy against `error_line_id`, then ensure
    /// the error line itself is included, then sort (spec §4.5).
    pub fn search(&self, error_line_id: u64) -> Result<RootCauseSet> {
        let error = self.messages.get_by_id(error_line_id)?;
        let mut root_cause = RootCauseSet::default();

        for strategy in &self.settings.strategies {
            self.search_strategy(&mut root_cause, error_line_id, &error, strategy)?;
        }
        self.add_to_root_cause(&mut root_cause, error_line_id, 0, None)?;

        root_cause.sort();
        self.settings.output.print_root_cause(error_line_id, &root_cause);
        Ok(root_cause)
    }

    fn search_strategy(
        &self,
        root_cause: &mut RootCauseSet,
        error_line_id: u64,
        error: &LogMessage,
        strategy: &Strategy,
    ) -> Result<()> {
        self.settings.output.print_headline(&format!(
            "Trying search strategy \"{}|{}|{}|{}|{}\"",
            strategy.intersection_occurrences_col,
            strategy.intersection_col,
            strategy.hidden_occurrences_col,
            strategy.uniqueness_col,
            strategy.max_noise
        ));

        // 1. Find error occurrences, for building the intersection.
        let intersection_occurrences_value = error.column_value(strategy.intersection_occurrences_col)?;
        let intersection_occurrences =
            self.messages.get_by_value(strategy.intersection_occurrences_col, &intersection_occurrences_value)?;
        self.settings.output.print_status(&format!(
            "{} error occurrences found. They are used to create a intersection of all time windows before the error",
            intersection_occurrences.len()
        ));
        if intersection_occurrences.len() < 2 {
            return Ok(());
        }

        // 2. Build the intersection of time windows before those occurrences.
        let intersection_timestamps: Vec<_> = intersection_occurrences.iter().map(|m| m.timestamp).collect();
        let intersection = self.messages.time_windows_intersection(
            strategy.intersection_col,
            &intersection_timestamps,
            strategy.window_seconds,
        )?;
        self.settings
            .output
            .print_status(&format!("{} values in intersection of time windows found", intersection.len()));
        if intersection.len() < 2 {
            return Ok(());
        }

        // 3. Cut the time window before the error.
        let error_window = self.messages.time_window(error.timestamp, strategy.window_seconds);

        // 4. Find hidden occurrences: windows excluded from the noise count.
        let hidden_occurrences_value = error.column_value(strategy.hidden_occurrences_col)?;
        let hidden_occurrences =
            self.messages.get_by_value(strategy.hidden_occurrences_col, &hidden_occurrences_value)?;
        self.settings.output.print_status(&format!(
            "{} error occurrences found. They are used to mark the time windows that are skipped in the uniqueness check for root cause candidates",
            hidden_occurrences.len()
        ));
        if hidden_occurrences.len() < 2 {
            return Ok(());
        }

        // 5. Compute outside-windows counts.
        let hidden_timestamps: Vec<_> = hidden_occurrences.iter().map(|m| m.timestamp).collect();
        let outside_windows_count = self.messages.count_outside_time_windows(
            strategy.uniqueness_col,
            &hidden_timestamps,
            strategy.window_seconds,
        )?;

        // 6. Scan candidates.
        let mut added_count = 0;
        for intersection_value in &intersection {
            let mut seen_uniqueness_values = std::collections::HashSet::new();
            for row in &error_window {
                if &row.column_value(strategy.intersection_col)? != intersection_value {
                    continue;
                }
                let uniqueness_value = row.column_value(strategy.uniqueness_col)?;
                if !seen_uniqueness_values.insert(uniqueness_value.clone()) {
                    continue;
                }
                if row.line_id == error_line_id {
                    continue;
                }

                let found_with_noise = *outside_windows_count.get(&uniqueness_value).unwrap_or(&0);
                if found_with_noise <= strategy.max_noise
                    && self.add_to_root_cause(root_cause, row.line_id, found_with_noise, Some(strategy))?
                {
                    added_count += 1;
                }
            }
        }
        self.settings.output.print_completion(&format!("{added_count} lines added to root cause"));
        debug!(strategy = ?strategy, added_count, "strategy pass complete");
        Ok(())
    }

    /// Admit (or append a strategy to an already-admitted) candidate.
    /// Returns whether the candidate ended up represented in the set.
    fn add_to_root_cause(
        &self,
        root_cause: &mut RootCauseSet,
        line_id: u64,
        found_with_noise: u64,
        strategy: Option<&Strategy>,
    ) -> Result<bool> {
        let message = self.messages.get_by_id(line_id)?;

        for pattern in &self.settings.service_filter {
            if pattern.is_match(&message.service) {
                return Ok(false);
            }
        }
        for pattern in &self.settings.content_filter {
            if pattern.is_match(&message.content) {
                return Ok(false);
            }
        }
        if let Some(column) = self.settings.duplicate_filter_col {
            let candidate_value = message.column_value(column)?;
            let mut existing = root_cause.entries.iter().map(|e| e.message.column_value(column));
            if existing.any(|v| matches!(v, Ok(v) if v == candidate_value)) {
                return Ok(false);
            }
        }

        let matched = strategy.map(|s| MatchedStrategy {
            strategy: s.clone(),
            found_with_noise,
        });

        if let Some(position) = root_cause.position(line_id) {
            if let Some(matched) = matched {
                root_cause.entries[position].strategies.push(matched);
            }
            return Ok(true);
        }

        let parameters = message
            .template
            .as_deref()
            .map(|template| extract_parameters(&message.content, template))
            .unwrap_or_default();
        let strategies = matched.into_iter().collect();
        root_cause.entries.push(RootCauseEntry {
            line_id,
            message,
            strategies,
            parameters,
        });
        info!(line_id, "added candidate to root cause set");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::message::TIMESTAMP_FORMAT;
    use crate::output::Output;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn msg(line_id: u64, t: &str, content: &str, service: &str) -> LogMessage {
        LogMessage {
            line_id,
            timestamp: ts(t),
            content: content.to_string(),
            service: service.to_string(),
            template: None,
            service_template_id: None,
        }
    }

    fn settings(dir: &std::path::Path, strategies: Vec<Strategy>) -> SearchSettings {
        let csv = dir.join("source.csv");
        std::fs::write(&csv, "timestamp,content,service\n").unwrap();
        let config = dir.join("drain.toml");
        std::fs::write(&config, "").unwrap();
        SearchSettings::new("ds", &csv, dir, &config, strategies, vec![], vec![], None, false, Output::Silent).unwrap()
    }

    fn content_strategy(max_noise: u64) -> Strategy {
        Strategy::new("content", "content", "content", "content", 2, max_noise).unwrap()
    }

    /// S1: single strategy, clean signal.
    #[test]
    fn s1_clean_signal_finds_precursor() {
        let rows = vec![
            msg(0, "2024-01-01 00:00:09.000000", "heartbeat miss", "hb"),
            msg(1, "2024-01-01 00:00:10.000000", "conn lost", "db"),
            msg(2, "2024-01-01 00:00:39.000000", "heartbeat miss", "hb"),
            msg(3, "2024-01-01 00:00:40.000000", "conn lost", "db"),
        ];
        let table = MessageTable::from_rows(rows);
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), vec![content_strategy(0)]);
        let engine = SearchEngine::new(&settings, table);

        let result = engine.search(3).unwrap();
        let ids: Vec<u64> = result.entries.iter().map(|e| e.line_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    /// S2: noisy candidate, rejected at max_noise=0, accepted at max_noise=1.
    #[test]
    fn s2_noisy_candidate_gated_by_max_noise() {
        let rows = vec![
            msg(0, "2024-01-01 00:00:09.000000", "heartbeat miss", "hb"),
            msg(1, "2024-01-01 00:00:10.000000", "conn lost", "db"),
            msg(2, "2024-01-01 00:00:25.000000", "heartbeat miss", "hb"),
            msg(3, "2024-01-01 00:00:39.000000", "heartbeat miss", "hb"),
            msg(4, "2024-01-01 00:00:40.000000", "conn lost", "db"),
        ];
        let table = MessageTable::from_rows(rows.clone());
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), vec![content_strategy(0)]);
        let engine = SearchEngine::new(&settings, table);
        let result = engine.search(4).unwrap();
        let ids: Vec<u64> = result.entries.iter().map(|e| e.line_id).collect();
        assert_eq!(ids, vec![4]);

        let table = MessageTable::from_rows(rows);
        let settings = settings(dir.path(), vec![content_strategy(1)]);
        let engine = SearchEngine::new(&settings, table);
        let result = engine.search(4).unwrap();
        let ids: Vec<u64> = result.entries.iter().map(|e| e.line_id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    /// S3: fewer than two error occurrences yields only the error line.
    #[test]
    fn s3_single_occurrence_yields_only_error_line() {
        let rows = vec![
            msg(0, "2024-01-01 00:00:09.000000", "heartbeat miss", "hb"),
            msg(1, "2024-01-01 00:00:10.000000", "conn lost", "db"),
        ];
        let table = MessageTable::from_rows(rows);
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), vec![content_strategy(0)]);
        let engine = SearchEngine::new(&settings, table);
        let result = engine.search(1).unwrap();
        let ids: Vec<u64> = result.entries.iter().map(|e| e.line_id).collect();
        assert_eq!(ids, vec![1]);
    }

    /// S7 (property 7 & 9): a service_filter match on the error line itself
    /// can empty the result entirely.
    #[test]
    fn filters_can_reject_the_error_line_too() {
        let rows = vec![msg(0, "2024-01-01 00:00:10.000000", "conn lost", "db")];
        let table = MessageTable::from_rows(rows);
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("source.csv");
        std::fs::write(&csv, "timestamp,content,service\n").unwrap();
        let config = dir.path().join("drain.toml");
        std::fs::write(&config, "").unwrap();
        let settings = SearchSettings::new(
            "ds",
            &csv,
            dir.path(),
            &config,
            vec![],
            vec!["^db$".to_string()],
            vec![],
            None,
            false,
            Output::Silent,
        )
        .unwrap();
        let engine = SearchEngine::new(&settings, table);
        let result = engine.search(0).unwrap();
        assert!(result.entries.is_empty());
    }

    /// S5: duplicate filter collapses two candidates sharing a column value.
    #[test]
    fn s5_duplicate_filter_keeps_first_admitted() {
        let rows = vec![
            msg(0, "2024-01-01 00:00:08.000000", "retry", "a"),
            msg(1, "2024-01-01 00:00:09.000000", "heartbeat miss", "hb"),
            msg(2, "2024-01-01 00:00:10.000000", "conn lost", "db"),
            msg(3, "2024-01-01 00:00:38.000000", "retry", "a"),
            msg(4, "2024-01-01 00:00:39.000000", "heartbeat miss", "hb"),
            msg(5, "2024-01-01 00:00:40.000000", "conn lost", "db"),
        ];
        let table = MessageTable::from_rows(rows);
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("source.csv");
        std::fs::write(&csv, "timestamp,content,service\n").unwrap();
        let config = dir.path().join("drain.toml");
        std::fs::write(&config, "").unwrap();
        let settings = SearchSettings::new(
            "ds",
            &csv,
            dir.path(),
            &config,
            vec![content_strategy(0)],
            vec![],
            vec![],
            Some(Column::Content),
            false,
            Output::Silent,
        )
        .unwrap();
        let engine = SearchEngine::new(&settings, table);
        let result = engine.search(5).unwrap();
        let ids: Vec<u64> = result.entries.iter().map(|e| e.line_id).collect();
        assert!(ids.contains(&5));
        assert!(ids.len() <= 3);
    }

    /// Spec §G.2: an admitted candidate's template wildcards are resolved
    /// into `RootCauseEntry::parameters`; a row with no template yields no
    /// parameters.
    #[test]
    fn admitted_candidate_carries_extracted_parameters() {
        let mut precursor_a = msg(0, "2024-01-01 00:00:09.000000", "miss 42", "hb");
        precursor_a.template = Some("miss <*>".to_string());
        let error_a = msg(1, "2024-01-01 00:00:10.000000", "conn lost", "db");
        let mut precursor_b = msg(2, "2024-01-01 00:00:39.000000", "miss 42", "hb");
        precursor_b.template = Some("miss <*>".to_string());
        let error_b = msg(3, "2024-01-01 00:00:40.000000", "conn lost", "db");

        let table = MessageTable::from_rows(vec![precursor_a, error_a, precursor_b, error_b]);
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), vec![content_strategy(0)]);
        let engine = SearchEngine::new(&settings, table);

        let result = engine.search(3).unwrap();
        let precursor_entry = result.entries.iter().find(|e| e.line_id == 2).unwrap();
        assert_eq!(precursor_entry.parameters, vec!["42".to_string()]);

        let error_entry = result.entries.iter().find(|e| e.line_id == 3).unwrap();
        assert!(error_entry.parameters.is_empty());
    }
}
