//! [`SearchSettings`]: the programmatic entry point's configuration record
//! (spec §6). Per the design notes ("Cached settings"), every field that
//! validates filesystem existence is checked eagerly in [`SearchSettings::new`]
//! rather than lazily on first access.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::column::Column;
use crate::error::{Error, Result};
use crate::output::Output;
use crate::strategy::Strategy;

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub dataset_name: String,
    pub source_csv_file: PathBuf,
    pub storage_dir: PathBuf,
    pub drain_config_file: PathBuf,
    pub strategies: Vec<Strategy>,
    pub service_filter: Vec<Regex>,
    pub content_filter: Vec<Regex>,
    pub duplicate_filter_col: Option<Column>,
    pub parallel_processing: bool,
    pub output: Output,
}

impl SearchSettings {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dataset_name: impl Into<String>,
        source_csv_file: impl AsRef<Path>,
        storage_dir: impl AsRef<Path>,
        drain_config_file: impl AsRef<Path>,
        strategies: Vec<Strategy>,
        service_filter: Vec<String>,
        content_filter: Vec<String>,
        duplicate_filter_col: Option<Column>,
        parallel_processing: bool,
        output: Output,
    ) -> Result<Self> {
        let source_csv_file = source_csv_file.as_ref().to_path_buf();
        if !source_csv_file.is_file() {
            return Err(Error::MissingCacheInput(source_csv_file.display().to_string()));
        }
        let storage_dir = storage_dir.as_ref().to_path_buf();
        if !storage_dir.is_dir() {
            return Err(Error::MissingCacheInput(storage_dir.display().to_string()));
        }
        let drain_config_file = drain_config_file.as_ref().to_path_buf();
        if !drain_config_file.is_file() {
            return Err(Error::MissingCacheInput(drain_config_file.display().to_string()));
        }

        let service_filter = service_filter
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let content_filter = content_filter
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            dataset_name: dataset_name.into(),
            source_csv_file,
            storage_dir,
            drain_config_file,
            strategies,
            service_filter,
            content_filter,
            duplicate_filter_col,
            parallel_processing,
            output,
        })
    }

    pub fn pre_clustering_csv_file(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.pre_clustering.csv", self.dataset_name))
    }

    pub fn pre_clustering_csv_file_exists(&self) -> bool {
        self.pre_clustering_csv_file().is_file()
    }

    pub fn post_clustering_csv_file(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.post_clustering.csv", self.dataset_name))
    }

    pub fn post_clustering_csv_file_exists(&self) -> bool {
        self.post_clustering_csv_file().is_file()
    }

    pub fn drain_state_file(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.drain.bin", self.dataset_name))
    }

    pub fn drain_state_file_exists(&self) -> bool {
        self.drain_state_file().is_file()
    }

    pub fn temporary_drain_state_file(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.drain.tmp.bin", self.dataset_name))
    }
}
