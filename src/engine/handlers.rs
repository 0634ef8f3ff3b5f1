//! Command handler: wire the fixture catalog, status store and pipeline, run one build.

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::engine::arg_parser::Cli;
use crate::engine::fixtures::{
    FixtureCatalog, FixtureDocumentCreator, FixtureRecord, JsonLinesPublisher,
};
use crate::engine::progress::{ProgressBar, create_progress_bar, finish_bar, show_counts};
use crate::index::IndexBuildRunner;
use crate::pipeline::{DocumentPublisher, EntityLookup, IndexingPipeline, PipelineBuilder};
use crate::stats::{IndexingStatistics, SharedBuildStatus};
use crate::status::{
    BuildStatusUpdater, GuardedIndexBuildStatusDao, InMemoryBuildStatusStore,
    IndexBuildStatusStore, SqliteBuildStatusStore,
};
use crate::types::IndexType;
use crate::utils::config::{ExecutionMode, MONITOR_INTERVAL, PipelineConfig};
use crate::utils::{apply_file_to_config, load_config_toml, setup_logging};

/// Defaults, then the config file, then CLI flags.
fn setup_config(cli: &Cli) -> PipelineConfig {
    let mut cfg = PipelineConfig::pooled();
    if let Some(file) = load_config_toml(Path::new("."), cli.config.as_deref()) {
        apply_file_to_config(&file, &mut cfg);
    }
    if let Some(n) = cli.batch_size {
        cfg.batch_size = n;
    }
    if let Some(n) = cli.workers {
        cfg.worker_threads = Some(n);
    }
    if cli.inline.unwrap_or(false) {
        cfg.grouping = ExecutionMode::Inline;
        cfg.loading = ExecutionMode::Inline;
        cfg.documents = ExecutionMode::Inline;
        cfg.publishing = ExecutionMode::Inline;
    }
    if let Some(strict) = cli.strict {
        cfg.strict = strict;
    }
    cfg
}

fn open_status_store(cli: &Cli) -> Result<Arc<dyn IndexBuildStatusStore>> {
    if cli.memory_status.unwrap_or(false) {
        return Ok(Arc::new(InMemoryBuildStatusStore::default()));
    }
    let path = cli.status_db_path();
    let store = SqliteBuildStatusStore::open(&path)
        .with_context(|| format!("open build status db {}", path.display()))?;
    Ok(Arc::new(store))
}

fn open_output(cli: &Cli) -> Result<Box<dyn Write + Send>> {
    Ok(match &cli.out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout()),
    })
}

/// Poll the pipeline until the build thread exits, finishing builds and moving the bar.
/// Returns true if Ctrl+C was pressed.
fn monitor_until_done(
    pipeline: &IndexingPipeline,
    index_type: IndexType,
    build: &thread::JoinHandle<Result<bool>>,
    cancel_requested: &AtomicBool,
    bar: Option<&ProgressBar>,
) -> bool {
    while !build.is_finished() {
        if cancel_requested.load(Ordering::Relaxed) {
            warn!("Cancel requested; draining in-flight records");
            pipeline.destroy();
            return true;
        }
        pipeline.periodic_monitor();
        if let Some(bar) = bar {
            show_counts(bar, &pipeline.pipeline_counts(index_type));
        }
        thread::sleep(MONITOR_INTERVAL);
    }
    false
}

/// Run one rebuild or update as described by `cli`.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let verbose = cli.is_verbose();
    setup_logging(verbose);
    let cfg = setup_config(cli);
    debug!("{} CONFIG: {:#?}", env!("CARGO_PKG_NAME").to_uppercase(), cfg);
    let index_type = cli.index_type;

    let catalog = Arc::new(FixtureCatalog::load(&cli.fixture)?);
    let publisher = Arc::new(JsonLinesPublisher::new(open_output(cli)?));

    let dao = Arc::new(GuardedIndexBuildStatusDao::new(
        open_status_store(cli)?,
        cfg.degraded_probe_interval,
    ));
    let statistics = Arc::new(IndexingStatistics::new());
    if let Some(previous) = dao.get(index_type) {
        debug!("{index_type}: previous build status {previous:?}");
        statistics.attach_build_status(Arc::new(SharedBuildStatus::from_status(previous)));
    }
    let updater = Arc::new(
        BuildStatusUpdater::start(Arc::clone(&dao), cfg.status_queue_capacity)
            .context("start build status updater")?,
    );

    let pipeline = Arc::new(
        PipelineBuilder::<FixtureRecord>::new(
            Arc::clone(&catalog) as Arc<dyn EntityLookup<FixtureRecord>>,
            Arc::new(FixtureDocumentCreator),
            Arc::clone(&publisher) as Arc<dyn DocumentPublisher>,
        )
            .config(cfg)
            .statistics(statistics)
            .status_updater(Arc::clone(&updater))
            .on_build_complete(|it| debug!("{it}: completion observed"))
            .build()?,
    );

    let cancel_requested = Arc::new(AtomicBool::new(false));
    let cancel_requested_handler = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        cancel_requested_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    let rebuild = cli.is_rebuild();
    let added = if cli.ids.is_empty() && (rebuild || cli.deleted.is_empty()) {
        catalog.uids()
    } else {
        cli.ids.clone()
    };
    let deleted = cli.deleted.clone();
    let bar = verbose.then(|| create_progress_bar(added.len(), format!("Indexing {index_type}")));

    let runner = IndexBuildRunner::new(Arc::clone(&pipeline));
    let build = thread::Builder::new()
        .name("index-build".to_string())
        .spawn(move || {
            if rebuild {
                runner.rebuild(index_type, &added)
            } else {
                runner.update(index_type, &added, &deleted)
            }
        })
        .context("spawn build thread")?;

    let cancelled = monitor_until_done(
        &pipeline,
        index_type,
        &build,
        &cancel_requested,
        bar.as_ref(),
    );
    let outcome = build
        .join()
        .map_err(|_| anyhow!("build thread panicked"))?;
    if let Some(bar) = &bar {
        show_counts(bar, &pipeline.pipeline_counts(index_type));
        finish_bar(bar);
    }
    pipeline.destroy();

    let status = pipeline.build_status(index_type);
    info!(
        "{index_type}: {} ({}/{} records, {} documents written, {} failures)",
        status.state.as_str(),
        status.processed_records,
        status.total_records,
        publisher.published(),
        pipeline.failures().recorded()
    );
    if updater.dropped() > 0 {
        warn!("{} build status snapshots were dropped", updater.dropped());
    }
    if updater.is_in_degraded_mode() {
        warn!("Build status store is degraded; the stored status may be stale");
    }

    if cancelled {
        return Err(anyhow!("Build cancelled by user; in-flight records were drained"));
    }
    if !outcome? {
        info!("{index_type}: nothing was published");
    }
    Ok(())
}
