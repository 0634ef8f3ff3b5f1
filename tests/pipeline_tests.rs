mod common;

use common::{TestCreator, TestEntity, TestLookup, TestPublisher};
use indexpipe::pipeline::{
    ExecutionStrategy, GroupingTask, LoadingTask, PipelineContext, Sink, Stage, Task,
    group_into_batches,
};
use indexpipe::stats::IndexingStatistics;
use indexpipe::status::{
    BuildStatusUpdater, GuardedIndexBuildStatusDao, InMemoryBuildStatusStore,
    IndexBuildStatusStore,
};
use indexpipe::{
    Batch, DocumentPublisher, IdentifierSet, IndexBuildRunner, IndexState, IndexType,
    IndexingPipeline, Loaded, PipelineBuilder, PipelineConfig, PipelineError, PipelineState, Uid,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const P: IndexType = IndexType::Product;

fn build_pipeline(
    lookup: TestLookup,
    creator: TestCreator,
    publisher: &Arc<TestPublisher>,
    config: PipelineConfig,
) -> IndexingPipeline {
    PipelineBuilder::<TestEntity>::new(
        Arc::new(lookup),
        Arc::new(creator),
        Arc::clone(publisher) as Arc<dyn DocumentPublisher>,
    )
    .config(config)
    .build()
    .unwrap()
}

fn inline_pipeline(
    ids: impl IntoIterator<Item = Uid>,
    publisher: &Arc<TestPublisher>,
) -> IndexingPipeline {
    build_pipeline(
        TestLookup::with_ids(ids),
        TestCreator::default(),
        publisher,
        PipelineConfig::default().with_batch_size(10),
    )
}

// --- grouping ---

#[test]
fn test_grouping_covers_every_id_once() {
    let uids: Vec<Uid> = (1..=25).collect();
    let batches = group_into_batches(P, &uids, 10).unwrap();
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|b| b.len() <= 10));
    let seen: Vec<Uid> = batches.iter().flat_map(|b| b.uids.clone()).collect();
    assert_eq!(seen.len(), uids.len());
    assert_eq!(seen.iter().copied().collect::<BTreeSet<_>>().len(), 25);
}

#[test]
fn test_grouping_empty_set_has_no_batches() {
    assert!(group_into_batches(P, &[], 10).unwrap().is_empty());
}

#[test]
fn test_grouping_zero_batch_size_is_configuration_error() {
    let err = group_into_batches(P, &[1, 2], 0).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_builder_rejects_zero_batch_size() {
    let publisher = Arc::new(TestPublisher::default());
    let result = PipelineBuilder::<TestEntity>::new(
        Arc::new(TestLookup::with_ids([1])),
        Arc::new(TestCreator::default()),
        publisher,
    )
    .config(PipelineConfig::default().with_batch_size(0))
    .build();
    assert!(matches!(result, Err(PipelineError::Configuration { .. })));
}

// --- loading ---

#[test]
fn test_poisoned_id_costs_only_itself() {
    let lookup = Arc::new(TestLookup::with_ids(1..=5).poison(3));
    let stats = Arc::new(IndexingStatistics::new());
    let mut task =
        LoadingTask::<TestEntity>::new(lookup.clone(), PipelineContext::new(Arc::clone(&stats)));
    let mut forwarded = Vec::new();
    task.run(
        Batch {
            index_type: P,
            uids: vec![1, 2, 3, 4, 5],
        },
        &mut |loaded: Loaded<TestEntity>| -> Result<(), PipelineError> {
            forwarded.push(loaded.entity.uid);
            Ok(())
        },
    )
    .unwrap();
    forwarded.sort_unstable();
    assert_eq!(forwarded, vec![1, 2, 4, 5]);
    assert_eq!(*lookup.bulk_calls.lock().unwrap(), 1);
    let perf = stats.performance(P);
    assert_eq!(perf.get("loader.fallbacks").count, 1);
    assert_eq!(perf.get("loader.unresolved").count, 1);
}

#[test]
fn test_missing_ids_still_complete_the_build() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = inline_pipeline([1, 2], &publisher);
    pipeline.start(&[1, 2, 3, 4], P).unwrap();
    let counts = pipeline.pipeline_counts(P);
    assert_eq!((counts.incoming, counts.completed), (4, 4));
    assert_eq!(publisher.published_uids(), vec![1, 2]);
}

// --- stage wiring ---

#[test]
fn test_stage_without_next_stage_is_configuration_error() {
    let ctx = PipelineContext::new(Arc::new(IndexingStatistics::new()));
    let stage = Stage::<GroupingTask>::new(
        "grouper",
        ExecutionStrategy::Inline,
        Arc::new(|| GroupingTask::new(10)),
        ctx.clone(),
    );
    let err = stage.send(IdentifierSet::new(P, [1, 2])).unwrap_err();
    assert!(err.is_configuration());
    assert!(ctx.failures.is_empty());
}

#[test]
fn test_stage_next_stage_is_set_once() {
    let ctx = PipelineContext::new(Arc::new(IndexingStatistics::new()));
    let lookup: Arc<TestLookup> = Arc::new(TestLookup::with_ids([1]));
    let loader_ctx = ctx.clone();
    let loading = Arc::new(Stage::<LoadingTask<TestEntity>>::new(
        "loader",
        ExecutionStrategy::Inline,
        Arc::new(move || LoadingTask::<TestEntity>::new(lookup.clone(), loader_ctx.clone())),
        ctx.clone(),
    ));
    let grouping = Stage::<GroupingTask>::new(
        "grouper",
        ExecutionStrategy::Inline,
        Arc::new(|| GroupingTask::new(10)),
        ctx,
    );
    grouping.set_next_stage(loading.clone()).unwrap();
    assert!(grouping.set_next_stage(loading).unwrap_err().is_configuration());
}

// --- lifecycle ---

#[test]
fn test_fresh_pipeline_is_idle_and_not_busy() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = inline_pipeline([1], &publisher);
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(!pipeline.is_busy());
}

#[test]
fn test_end_to_end_three_ids() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = inline_pipeline([1, 2, 3], &publisher);
    pipeline.start(&[1, 2, 3], P).unwrap();

    assert_eq!(publisher.published_uids(), vec![1, 2, 3]);
    let counts = pipeline.pipeline_counts(P);
    assert_eq!(counts.completed, 3);
    assert_eq!(counts.incoming, 3);

    pipeline.destroy();
    let status = pipeline.build_status(P);
    assert_eq!(status.processed_records, 3);
    assert_eq!(status.total_records, 3);
    assert_eq!(status.state, IndexState::Complete);
    assert!(status.last_build_date_ms.is_some());
    assert_eq!(publisher.commit_count(), 1);
    assert_eq!(pipeline.state(), PipelineState::ShutDown);
}

#[test]
fn test_monitor_finishes_build_once_and_goes_idle() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = inline_pipeline([1, 2], &publisher);
    pipeline.start(&[1, 2], P).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert!(!pipeline.is_busy());

    assert_eq!(pipeline.periodic_monitor(), vec![P]);
    assert!(pipeline.periodic_monitor().is_empty());
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(publisher.commit_count(), 1);
}

#[test]
fn test_rebuild_resets_build_status_but_not_cumulative_counts() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = inline_pipeline(1..=10, &publisher);

    pipeline.start(&[1, 2, 3], P).unwrap();
    pipeline.periodic_monitor();
    pipeline.start(&[4, 5], P).unwrap();
    pipeline.periodic_monitor();

    let status = pipeline.build_status(P);
    assert_eq!(status.total_records, 2);
    assert_eq!(status.processed_records, 2);
    let counts = pipeline.pipeline_counts(P);
    assert_eq!((counts.incoming, counts.completed), (2, 2));
    assert_eq!((counts.total_incoming, counts.total_completed), (5, 5));

    pipeline.statistics().reset(P);
    let counts = pipeline.pipeline_counts(P);
    assert_eq!((counts.incoming, counts.completed), (0, 0));
    assert_eq!(counts.total_incoming, 0);
}

#[test]
fn test_start_after_destroy_is_configuration_error() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = inline_pipeline([1], &publisher);
    pipeline.destroy();
    pipeline.destroy();
    let err = pipeline.start(&[1], P).unwrap_err();
    assert!(err.is_configuration());
    assert!(publisher.published_uids().is_empty());
}

#[test]
fn test_builds_of_different_types_are_tracked_apart() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = inline_pipeline(1..=5, &publisher);
    pipeline.start(&[1, 2], IndexType::Product).unwrap();
    pipeline.start(&[3, 4, 5], IndexType::Category).unwrap();
    assert_eq!(pipeline.pipeline_counts(IndexType::Product).incoming, 2);
    assert_eq!(pipeline.pipeline_counts(IndexType::Category).incoming, 3);
    let mut finished = pipeline.periodic_monitor();
    finished.sort();
    assert_eq!(finished, vec![IndexType::Product, IndexType::Category]);
}

#[test]
fn test_completion_listener_sees_finished_build() {
    let publisher = Arc::new(TestPublisher::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_listener = Arc::clone(&seen);
    let pipeline = PipelineBuilder::<TestEntity>::new(
        Arc::new(TestLookup::with_ids([1, 2])),
        Arc::new(TestCreator::default()),
        Arc::clone(&publisher) as Arc<dyn DocumentPublisher>,
    )
    .on_build_complete(move |it| seen_by_listener.lock().unwrap().push(it))
    .build()
    .unwrap();
    pipeline.start(&[1, 2], IndexType::Sku).unwrap();
    pipeline.periodic_monitor();
    pipeline.destroy();
    assert_eq!(*seen.lock().unwrap(), vec![IndexType::Sku]);
}

#[test]
fn test_pooled_pipeline_end_to_end() {
    let publisher = Arc::new(TestPublisher::default());
    let mut config = PipelineConfig::pooled().with_batch_size(7);
    config.worker_threads = Some(3);
    let pipeline = build_pipeline(
        TestLookup::with_ids(1..=50),
        TestCreator::default(),
        &publisher,
        config,
    );
    let uids: Vec<Uid> = (1..=50).collect();
    pipeline.start(&uids, P).unwrap();

    let status = pipeline.statistics().pipeline_status(P);
    assert!(status.wait_until_completed_timeout(Duration::from_secs(10)));
    assert_eq!(pipeline.periodic_monitor(), vec![P]);
    pipeline.destroy();

    assert_eq!(publisher.published_uids(), uids);
    let build = pipeline.build_status(P);
    assert_eq!((build.processed_records, build.total_records), (50, 50));
}

#[test]
fn test_inline_stage_time_excludes_later_stages() {
    let publisher = Arc::new(TestPublisher::slow(Duration::from_millis(60)));
    let pipeline = inline_pipeline([1, 2], &publisher);
    pipeline.start(&[1, 2], P).unwrap();
    let perf = pipeline.statistics().performance(P);
    assert!(perf.get("publisher.millis").sum >= 120);
    assert!(perf.get("grouper.millis").sum < 60);
    assert!(perf.get("loader.millis").sum < 60);
    assert_eq!(perf.get("documents.items").count, 2);
}

// --- failures ---

#[test]
fn test_transform_failure_is_recorded_and_build_completes() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = build_pipeline(
        TestLookup::with_ids([1, 2, 3]),
        TestCreator::failing_on([2]),
        &publisher,
        PipelineConfig::default(),
    );
    pipeline.start(&[1, 2, 3], P).unwrap();
    assert_eq!(publisher.published_uids(), vec![1, 3]);
    assert!(pipeline.pipeline_counts(P).is_completed());
    let failures = pipeline.failures().all();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "documents");
    assert!(matches!(
        failures[0].error,
        PipelineError::Transform { uid: 2, .. }
    ));
}

#[test]
fn test_publish_failure_is_recorded_and_build_completes() {
    let publisher = Arc::new(TestPublisher::failing_on([3]));
    let pipeline = inline_pipeline([1, 2, 3], &publisher);
    pipeline.start(&[1, 2, 3], P).unwrap();
    let counts = pipeline.pipeline_counts(P);
    assert_eq!((counts.incoming, counts.completed), (3, 3));
    assert_eq!(pipeline.failures().count_for(P), 1);
    assert_eq!(pipeline.failures().all()[0].stage, "publisher");
    assert_eq!(
        pipeline.statistics().performance(P).get("publisher.published").count,
        2
    );
}

#[test]
fn test_panicking_creator_in_pooled_stage_fails_only_its_item() {
    let publisher = Arc::new(TestPublisher::default());
    let mut config = PipelineConfig::pooled().with_batch_size(2);
    config.worker_threads = Some(2);
    let pipeline = Arc::new(build_pipeline(
        TestLookup::with_ids([1, 2, 3]),
        TestCreator::panicking_on([2]),
        &publisher,
        config,
    ));
    let runner =
        IndexBuildRunner::new(Arc::clone(&pipeline)).with_wait_timeout(Duration::from_secs(10));
    assert!(runner.rebuild(P, &[1, 2, 3]).unwrap());
    assert_eq!(publisher.published_uids(), vec![1, 3]);
    let counts = pipeline.pipeline_counts(P);
    assert_eq!((counts.incoming, counts.completed), (3, 3));
    assert_eq!(pipeline.failures().recorded(), 1);
    assert_eq!(pipeline.build_status(P).state, IndexState::Complete);
    pipeline.destroy();
}

#[test]
fn test_panicking_creator_inline_is_recorded_as_failure() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = build_pipeline(
        TestLookup::with_ids([1, 2]),
        TestCreator::panicking_on([1]),
        &publisher,
        PipelineConfig::default(),
    );
    pipeline.start(&[1, 2], P).unwrap();
    assert_eq!(publisher.published_uids(), vec![2]);
    assert!(pipeline.pipeline_counts(P).is_completed());
    let failures = pipeline.failures().all();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "documents");
    match &failures[0].error {
        PipelineError::Panicked { stage, message, .. } => {
            assert_eq!(*stage, "documents");
            assert!(message.contains("mapper bug on entity 1"));
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

// --- runner ---

#[test]
fn test_rebuild_clears_index_and_commits() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = Arc::new(inline_pipeline([1, 2, 3], &publisher));
    let runner = IndexBuildRunner::new(Arc::clone(&pipeline));
    assert!(runner.rebuild(P, &[1, 2, 3]).unwrap());
    assert_eq!(*publisher.deleted_all.lock().unwrap(), vec![P]);
    assert_eq!(publisher.commit_count(), 1);
    assert_eq!(pipeline.build_status(P).state, IndexState::Complete);
}

#[test]
fn test_failed_commit_fails_lenient_rebuild() {
    let publisher = Arc::new(TestPublisher::failing_commits());
    let pipeline = Arc::new(inline_pipeline([1, 2], &publisher));
    let runner = IndexBuildRunner::new(Arc::clone(&pipeline));
    let err = runner.rebuild(P, &[1, 2]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Commit { .. })
    ));
    let build = pipeline.build_status(P);
    assert_eq!(build.state, IndexState::RebuildInProgress);
    assert_eq!(build.last_build_date_ms, None);
    assert!(pipeline.periodic_monitor().is_empty());
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[test]
fn test_rebuild_after_destroy_leaves_index_untouched() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = Arc::new(inline_pipeline([1], &publisher));
    pipeline.destroy();
    let runner = IndexBuildRunner::new(Arc::clone(&pipeline));
    assert!(runner.rebuild(P, &[1]).is_err());
    assert!(runner.update(P, &[1], &[2]).is_err());
    assert!(publisher.deleted_all.lock().unwrap().is_empty());
    assert!(publisher.deleted.lock().unwrap().is_empty());
    assert_eq!(publisher.commit_count(), 0);
}

#[test]
fn test_rebuild_of_empty_set_commits_empty_index() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = Arc::new(inline_pipeline([1], &publisher));
    let runner = IndexBuildRunner::new(Arc::clone(&pipeline));
    assert!(!runner.rebuild(P, &[]).unwrap());
    assert_eq!(publisher.commit_count(), 1);
}

#[test]
fn test_update_with_nothing_to_do_is_a_no_op() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = Arc::new(inline_pipeline([1], &publisher));
    let runner = IndexBuildRunner::new(pipeline);
    assert!(!runner.update(P, &[], &[]).unwrap());
    assert_eq!(publisher.commit_count(), 0);
}

#[test]
fn test_update_deletes_and_reindexes() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = Arc::new(inline_pipeline([1, 2], &publisher));
    let runner =
        IndexBuildRunner::new(Arc::clone(&pipeline)).with_wait_timeout(Duration::from_secs(5));
    assert!(runner.update(P, &[2], &[7, 8]).unwrap());
    assert_eq!(publisher.published_uids(), vec![2]);
    assert_eq!(*publisher.deleted.lock().unwrap(), vec![7, 8]);
    assert_eq!(publisher.commit_count(), 1);
    assert_eq!(pipeline.build_status(P).state, IndexState::Complete);
}

#[test]
fn test_strict_runner_fails_on_record_failure() {
    let publisher = Arc::new(TestPublisher::default());
    let mut config = PipelineConfig::default();
    config.strict = true;
    let pipeline = Arc::new(build_pipeline(
        TestLookup::with_ids([1, 2]),
        TestCreator::failing_on([1]),
        &publisher,
        config,
    ));
    let runner = IndexBuildRunner::new(Arc::clone(&pipeline));
    assert!(runner.rebuild(P, &[1, 2]).is_err());
    assert!(pipeline.failures().is_empty());
}

#[test]
fn test_lenient_runner_logs_and_continues() {
    let publisher = Arc::new(TestPublisher::default());
    let pipeline = Arc::new(build_pipeline(
        TestLookup::with_ids([1, 2]),
        TestCreator::failing_on([1]),
        &publisher,
        PipelineConfig::default(),
    ));
    let runner = IndexBuildRunner::new(Arc::clone(&pipeline));
    assert!(runner.rebuild(P, &[1, 2]).unwrap());
    assert_eq!(publisher.published_uids(), vec![2]);
    assert_eq!(pipeline.failures().recorded(), 1);
}

#[test]
fn test_rebuild_index_entry_point() {
    let publisher = Arc::new(TestPublisher::default());
    let published = indexpipe::rebuild_index::<TestEntity>(
        Arc::new(TestLookup::with_ids([5, 6])),
        Arc::new(TestCreator::default()),
        Arc::clone(&publisher) as Arc<dyn DocumentPublisher>,
        PipelineConfig::default(),
        IndexType::Customer,
        &[5, 6],
    )
    .unwrap();
    assert!(published);
    assert_eq!(publisher.published_uids(), vec![5, 6]);
}

// --- status persistence ---

#[test]
fn test_destroy_persists_final_build_status() {
    let publisher = Arc::new(TestPublisher::default());
    let store = Arc::new(InMemoryBuildStatusStore::new());
    let dao = Arc::new(GuardedIndexBuildStatusDao::new(
        Arc::clone(&store) as Arc<dyn IndexBuildStatusStore>,
        Duration::ZERO,
    ));
    let updater = Arc::new(BuildStatusUpdater::start(dao, 16).unwrap());
    let listener_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&listener_calls);
    let pipeline = PipelineBuilder::<TestEntity>::new(
        Arc::new(TestLookup::with_ids([1, 2, 3])),
        Arc::new(TestCreator::default()),
        Arc::clone(&publisher) as Arc<dyn DocumentPublisher>,
    )
    .status_updater(updater)
    .on_build_complete(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
    })
    .build()
    .unwrap();

    pipeline.start(&[1, 2, 3], P).unwrap();
    pipeline.destroy();

    let stored = store.get(P).unwrap().unwrap();
    assert_eq!(stored.state, IndexState::Complete);
    assert_eq!((stored.processed_records, stored.total_records), (3, 3));
    assert!(stored.last_build_date_ms.is_some());
    assert_eq!(listener_calls.load(Ordering::SeqCst), 1);
}
