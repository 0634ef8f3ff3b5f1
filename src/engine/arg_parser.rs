use clap::Parser;
use std::path::PathBuf;

use crate::types::{IndexType, Uid};
use crate::utils::config::PackagePaths;

/// Build a search index from a JSON fixture catalog.
#[derive(Clone, Parser)]
#[command(name = "indexpipe")]
#[command(about = "Run an index build (full rebuild or update) from a fixture catalog.")]
pub struct Cli {
    /// Fixture catalog: JSON array of {"uid", "fields", "fail"} records.
    #[arg(long, value_name = "FILE")]
    pub fixture: PathBuf,

    /// Index to build: product, category, customer, promotion or sku.
    #[arg(long, short = 't', default_value = "product", value_parser = clap::value_parser!(IndexType))]
    pub index_type: IndexType,

    /// Full rebuild: clear the index, then index every record in the catalog.
    #[arg(long, short = 'r', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub rebuild: Option<bool>,

    /// Update only these ids (default: every id in the catalog).
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub ids: Vec<Uid>,

    /// Ids to remove from the index (update only).
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub deleted: Vec<Uid>,

    /// Ids per lookup batch.
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Worker threads per pooled stage.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Run every stage on the calling thread instead of worker pools.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub inline: Option<bool>,

    /// Build status database. Default: `.indexpipe_status` in the current directory.
    #[arg(long, value_name = "FILE")]
    pub status_db: Option<PathBuf>,

    /// Keep build status in memory only.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub memory_status: Option<bool>,

    /// Write documents as JSON lines here instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Config file. Default: `.indexpipe.toml` in the current directory.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Strict mode: fail the build with its first record failure.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub strict: Option<bool>,

    /// Verbose output and progress bar.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

impl Cli {
    pub fn status_db_path(&self) -> PathBuf {
        self.status_db
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().status_db_filename()))
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    pub fn is_rebuild(&self) -> bool {
        self.rebuild.unwrap_or(false)
    }
}
