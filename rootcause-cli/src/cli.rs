//! Command line surface: `search` runs a full session end to end, `prepare`
//! runs only ingestion/normalization/clustering and leaves the result
//! cached for later searches (spec §4.3, §6).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rootcause_core::{Column, Output, SearchSettings, Strategy, StrategyConfig};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "rootcause", about = "Root-cause correlation over structured log streams", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare a dataset (ingest, normalize, cluster) and cache the result.
    Prepare(DatasetArgs),
    /// Prepare (if needed) and search for the precursors of an error line.
    Search {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// line_id of the error to investigate
        #[arg(long)]
        error_line_id: u64,
    },
}

#[derive(Parser, Debug)]
pub struct DatasetArgs {
    /// Name used to namespace this dataset's cache files
    #[arg(long)]
    pub dataset_name: String,
    /// Path to the source CSV file
    #[arg(long)]
    pub source_csv_file: PathBuf,
    /// Directory holding cache artifacts
    #[arg(long)]
    pub storage_dir: PathBuf,
    /// TOML file with the template miner's tunables
    #[arg(long)]
    pub drain_config_file: PathBuf,
    /// Optional rootcause.toml with strategies/filters; CLI flags override it
    #[arg(long)]
    pub config_file: Option<PathBuf>,
    /// Regex applied to `service`; matches are excluded from results
    #[arg(long = "service-filter")]
    pub service_filter: Vec<String>,
    /// Regex applied to `content`; matches are excluded from results
    #[arg(long = "content-filter")]
    pub content_filter: Vec<String>,
    /// Column used to drop duplicate candidates across strategies
    #[arg(long)]
    pub duplicate_filter_col: Option<String>,
    /// Run template assignment over row chunks in parallel
    #[arg(long)]
    pub parallel_processing: bool,
    /// Print progress and colored results instead of running silently
    #[arg(long)]
    pub notebook: bool,
}

/// Shape of an optional `rootcause.toml` (spec §D): only the fields that
/// are awkward to repeat as flags.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    strategies: Vec<StrategyConfig>,
    #[serde(default)]
    service_filter: Vec<String>,
    #[serde(default)]
    content_filter: Vec<String>,
}

impl DatasetArgs {
    pub fn into_settings(self) -> anyhow::Result<SearchSettings> {
        let file_config = match &self.config_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
                toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?
            }
            None => FileConfig::default(),
        };

        let strategies = file_config
            .strategies
            .into_iter()
            .map(Strategy::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut service_filter = file_config.service_filter;
        service_filter.extend(self.service_filter);
        let mut content_filter = file_config.content_filter;
        content_filter.extend(self.content_filter);

        let duplicate_filter_col = self.duplicate_filter_col.map(|s| Column::parse(&s)).transpose()?;
        let output = if self.notebook { Output::Notebook } else { Output::Silent };

        Ok(SearchSettings::new(
            self.dataset_name,
            self.source_csv_file,
            self.storage_dir,
            self.drain_config_file,
            strategies,
            service_filter,
            content_filter,
            duplicate_filter_col,
            self.parallel_processing,
            output,
        )?)
    }
}
