use std::num::NonZeroUsize;
use std::sync::Arc;

use proptest::prelude::*;

use chunkline::item::{CollectingWriter, VecReader};
use chunkline::{ChunkSettings, ChunkStep, InMemoryRunStore, Job, JobLauncher, JobResult, RunId};

fn keep_odd(n: &u32) -> anyhow::Result<Option<u32>> {
    Ok((n % 2 == 1).then_some(*n))
}

fn run(items: Vec<u32>, chunk_size: usize, writer: &CollectingWriter<u32>) -> JobResult {
    let settings = ChunkSettings::new(NonZeroUsize::new(chunk_size).unwrap());
    let mut job = Job::builder("prop")
        .step(ChunkStep::new("odd", VecReader::new(items), keep_odd, writer.clone()).with_settings(settings))
        .build()
        .unwrap();
    let launcher = JobLauncher::new(Arc::new(InMemoryRunStore::new()));

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(launcher.run_job(&mut job, RunId::new(1)))
}

proptest! {
    #[test]
    fn writes_equal_ceil_of_successful_over_chunk_size(
        items in prop::collection::vec(0u32..1000, 0..120),
        chunk_size in 1usize..16,
    ) {
        let writer = CollectingWriter::new();
        let successful = items.iter().filter(|n| *n % 2 == 1).count();

        let result = run(items.clone(), chunk_size, &writer);

        prop_assert!(result.is_success());
        prop_assert_eq!(writer.batches().len(), successful.div_ceil(chunk_size));
        prop_assert!(writer.batch_sizes().iter().all(|&size| size >= 1 && size <= chunk_size));

        let counters = result.steps[0].counters;
        prop_assert_eq!(counters.read_count, items.len() as u64);
        prop_assert_eq!(counters.write_count, successful as u64);
        prop_assert_eq!(counters.skip_count, (items.len() - successful) as u64);
    }

    #[test]
    fn committed_items_keep_source_order(
        items in prop::collection::vec(0u32..1000, 0..60),
        chunk_size in 1usize..8,
    ) {
        let writer = CollectingWriter::new();
        run(items.clone(), chunk_size, &writer);

        let expected: Vec<u32> = items.into_iter().filter(|n| n % 2 == 1).collect();
        prop_assert_eq!(writer.items(), expected);
    }
}
