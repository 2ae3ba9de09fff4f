//! Display capability (spec §6, §9 "Polymorphic display"): a two-variant
//! tagged union rather than a trait object, since outputs are pure side
//! effects that don't belong on the core's test surface.

use crate::search::{RootCauseEntry, RootCauseSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Human-facing progress messages and colored result rendering.
    Notebook,
    /// No output at all; used for library embedding and tests.
    Silent,
}

impl Output {
    pub fn progress_bars(&self) -> bool {
        matches!(self, Output::Notebook)
    }

    pub fn print_headline(&self, text: &str) {
        if let Output::Notebook = self {
            println!("{}", colored_bold(&format!("{text}:"), 30));
        }
    }

    pub fn print_next(&self, text: &str) {
        if let Output::Notebook = self {
            println!("\u{21bb} {text} ...");
        }
    }

    pub fn print_status(&self, text: &str) {
        if let Output::Notebook = self {
            println!("\u{2139} {text}.");
        }
    }

    pub fn print_completion(&self, text: &str) {
        if let Output::Notebook = self {
            println!("\u{2713} {text}.");
        }
    }

    pub fn print_root_cause(&self, error_line_id: u64, root_cause: &RootCauseSet) {
        if let Output::Silent = self {
            return;
        }
        if root_cause.entries.len() > 1 {
            self.print_headline("\nResults");
        } else {
            self.print_completion("No root cause found");
            return;
        }
        for entry in &root_cause.entries {
            self.print_root_cause_entry(error_line_id, entry);
        }
    }

    pub fn print_root_cause_entry(&self, error_line_id: u64, entry: &RootCauseEntry) {
        if let Output::Silent = self {
            return;
        }
        let color = if entry.line_id == error_line_id { 31 } else { 32 };
        let message = &entry.message;

        let fields = [
            ("Line", entry.line_id.to_string()),
            ("Timestamp", message.timestamp.to_string()),
            ("Service", message.service.clone()),
            ("Template", message.template.clone().unwrap_or_default()),
            ("Content", right_trim(&message.content, ':')),
        ];

        let mut out = String::new();
        for (key, value) in fields {
            out.push('\n');
            out.push_str(&colored_bold(&format!("{key}:"), color));
            out.push(' ');
            out.push_str(&colored(&value, color));
        }

        if !entry.parameters.is_empty() {
            out.push('\n');
            out.push_str(&colored_bold("Parameters:", color));
            out.push(' ');
            out.push_str(&colored(&entry.parameters.join(", "), color));
        }

        if !entry.strategies.is_empty() {
            out.push('\n');
            out.push_str(&colored_bold("Found with strategies:", color));
        }
        for matched in &entry.strategies {
            let s = &matched.strategy;
            out.push('\n');
            out.push_str(&colored(
                &format!(
                    "- {}|{}|{}|{}|{}|{}",
                    s.intersection_occurrences_col,
                    s.intersection_col,
                    s.hidden_occurrences_col,
                    s.uniqueness_col,
                    s.max_noise,
                    matched.found_with_noise
                ),
                color,
            ));
        }

        println!("{out}");
    }
}

fn right_trim(text: &str, remove: char) -> String {
    text.strip_suffix(remove).unwrap_or(text).to_string()
}

fn colored(text: &str, code: u8) -> String {
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn colored_bold(text: &str, code: u8) -> String {
    format!("\x1b[{code};1m{text}\x1b[0m")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_trim_only_strips_trailing_match() {
        assert_eq!(right_trim("failed to connect:", ':'), "failed to connect");
        assert_eq!(right_trim("no trailing colon", ':'), "no trailing colon");
    }
}
