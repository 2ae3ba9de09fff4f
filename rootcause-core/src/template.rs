//! Template normalization (spec §4.2). `spec.md` treats an off-the-shelf
//! Drain-style miner as an external collaborator and specifies only the
//! `train`/`match` contract it expects. No published Rust crate implements
//! Drain, so this module carries a small internal implementation of the
//! same grouping idea (tokenize, mask variable tokens, group by a bounded
//! prefix, refine by token-overlap similarity) rather than depend on
//! something that doesn't exist. See DESIGN.md for the Open Question this
//! resolves.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const WILDCARD: &str = "<*>";

static VARIABLE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:0x[0-9a-fA-F]+|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}|(?:\d{1,3}\.){3}\d{1,3}|\d+(?:[.,]\d+)?)$",
    )
    .expect("variable-token regex is a fixed pattern")
});

/// Tunables read from `drain_config_file` (spec §6).
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct TemplateMinerConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_similarity_threshold() -> f64 {
    0.4
}

fn default_max_depth() -> usize {
    4
}

impl Default for TemplateMinerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_depth: default_max_depth(),
        }
    }
}

impl TemplateMinerConfig {
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::error::Error::Config(e.to_string()))
    }
}

fn tokenize(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .map(|tok| {
            if VARIABLE_TOKEN.is_match(tok) {
                WILDCARD.to_string()
            } else {
                tok.to_string()
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cluster {
    template: Vec<String>,
}

impl Cluster {
    fn similarity(&self, tokens: &[String]) -> f64 {
        if self.template.len() != tokens.len() || tokens.is_empty() {
            return 0.0;
        }
        let matches = self
            .template
            .iter()
            .zip(tokens.iter())
            .filter(|(a, b)| *a == b || a.as_str() == WILDCARD)
            .count();
        matches as f64 / tokens.len() as f64
    }

    fn merge(&mut self, tokens: &[String]) {
        for (slot, token) in self.template.iter_mut().zip(tokens.iter()) {
            if slot != token {
                *slot = WILDCARD.to_string();
            }
        }
    }

    fn render(&self) -> String {
        self.template.join(" ")
    }
}

/// Groups clusters first by token count, then by a prefix of up to
/// `max_depth` tokens — the bounded tree-path Drain uses to narrow the
/// candidate list before the full similarity scan.
type GroupKey = (usize, Vec<String>);

fn group_key(tokens: &[String], max_depth: usize) -> GroupKey {
    let prefix_len = tokens.len().min(max_depth);
    (tokens.len(), tokens[..prefix_len].to_vec())
}

/// Substrings matched against each `<*>` wildcard of `template` when
/// `content` was classified into it (original's
/// `extract_template_parameters`). A pure function of the two strings: it
/// needs no trained cluster state, so callers outside the miner (e.g.
/// `RootCauseEntry` snapshots) can call it directly from a stored
/// `(content, template)` pair without holding a miner instance.
pub fn extract_parameters(content: &str, template: &str) -> Vec<String> {
    let content_tokens: Vec<&str> = content.split_whitespace().collect();
    let template_tokens: Vec<&str> = template.split_whitespace().collect();
    if content_tokens.len() != template_tokens.len() {
        return Vec::new();
    }
    content_tokens
        .into_iter()
        .zip(template_tokens)
        .filter(|(_, t)| *t == WILDCARD)
        .map(|(c, _)| c.to_string())
        .collect()
}

/// Consumes log message content and produces stable per-line templates.
/// `train` updates internal clusters; `match` is read-only.
pub trait TemplateAssigner {
    fn train(&mut self, content: &str);
    fn matches(&self, content: &str) -> String;
    /// Substrings the miner matched against each `<*>` wildcard of
    /// `template` when it classified `content` (original's
    /// `extract_template_parameters`, surfaced for operator inspection).
    fn parameters(&self, content: &str, template: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainTemplateMiner {
    #[serde(skip)]
    config: TemplateMinerConfig,
    groups: HashMap<GroupKey, Vec<Cluster>>,
}

impl DrainTemplateMiner {
    pub fn new(config: TemplateMinerConfig) -> Self {
        Self {
            config,
            groups: HashMap::new(),
        }
    }

    /// Rehydrate trained cluster state from a persisted `.drain.bin` file,
    /// re-attaching a freshly loaded config (clusters carry no config of
    /// their own, matching the original's separate `drain_config_file`/
    /// `drain_state_file` inputs to `TemplateParser`).
    pub fn from_persisted(bytes: &[u8], config: TemplateMinerConfig) -> crate::error::Result<Self> {
        let mut miner: DrainTemplateMiner = bincode::deserialize(bytes)?;
        miner.config = config;
        Ok(miner)
    }

    pub fn to_bytes(&self) -> crate::error::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn best_cluster(&self, tokens: &[String]) -> Option<&Cluster> {
        let key = group_key(tokens, self.config.max_depth);
        self.groups
            .get(&key)?
            .iter()
            .map(|c| (c.similarity(tokens), c))
            .filter(|(sim, _)| *sim >= self.config.similarity_threshold)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, c)| c)
    }
}

impl TemplateAssigner for DrainTemplateMiner {
    fn train(&mut self, content: &str) {
        let tokens = tokenize(content);
        if tokens.is_empty() {
            return;
        }
        let key = group_key(&tokens, self.config.max_depth);
        let threshold = self.config.similarity_threshold;
        let clusters = self.groups.entry(key).or_default();

        let best = clusters
            .iter_mut()
            .map(|c| (c.similarity(&tokens), c))
            .filter(|(sim, _)| *sim >= threshold)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((_, cluster)) => cluster.merge(&tokens),
            None => clusters.push(Cluster { template: tokens }),
        }
    }

    fn matches(&self, content: &str) -> String {
        let tokens = tokenize(content);
        if tokens.is_empty() {
            return String::new();
        }
        self.best_cluster(&tokens).map(Cluster::render).unwrap_or_default()
    }

    fn parameters(&self, content: &str, template: &str) -> Vec<String> {
        extract_parameters(content, template)
    }
}
