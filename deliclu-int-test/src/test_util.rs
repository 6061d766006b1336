use deliclu_rtree::{
    DeLiCluTreeIndex, Distance, Neighbor, ObjectId, RTreeSettings, Relation, SpatialResult,
    VectorRelation,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Runs a test between a setup and a teardown step.
///
/// The teardown also runs when the test fails. A failing or panicking run is
/// retried before the test is reported as failed.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> SpatialResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 2;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        let failure = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_backtrace = Some(bt);
                e
            }
            Err(panic_err) => {
                last_backtrace = Some(Backtrace::capture().to_string());
                if let Some(s) = panic_err.downcast_ref::<&str>() {
                    format!("Panic: {}", s)
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    format!("Panic: {}", s)
                } else {
                    "Panic: unknown payload".to_string()
                }
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("{}", failure);
            thread::sleep(Duration::from_millis(50));
        }
        last_error = Some(failure);
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// Everything a test needs: a relation, an index over it and a scratch
/// directory that lives as long as any clone of the context.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
    relation: Arc<VectorRelation>,
    index: DeLiCluTreeIndex<VectorRelation>,
}

impl TestContext {
    pub fn new(
        dir: Arc<TempDir>,
        relation: Arc<VectorRelation>,
        index: DeLiCluTreeIndex<VectorRelation>,
    ) -> Self {
        Self {
            dir,
            relation,
            index,
        }
    }

    pub fn relation(&self) -> Arc<VectorRelation> {
        Arc::clone(&self.relation)
    }

    pub fn index(&self) -> DeLiCluTreeIndex<VectorRelation> {
        self.index.clone()
    }

    /// The page file path used by persistent contexts.
    pub fn index_path(&self) -> PathBuf {
        self.dir.path().join("index.deliclu")
    }

    pub fn point(&self, id: ObjectId) -> Vec<f64> {
        self.relation.get(id).unwrap_or_default()
    }

    /// All objects of the relation sorted by distance to `query`.
    pub fn linear_scan(&self, distance: &dyn Distance, query: &[f64]) -> Vec<Neighbor> {
        let mut all: Vec<Neighbor> = self
            .relation
            .ids()
            .into_iter()
            .filter_map(|id| {
                self.relation
                    .get(id)
                    .map(|p| Neighbor::new(id, distance.distance(query, &p)))
            })
            .collect();
        all.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        all
    }
}

/// A relation of `n` points drawn uniformly from `[0, 100)^dim`.
pub fn random_relation(n: usize, dim: usize, seed: u64) -> Arc<VectorRelation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let relation = VectorRelation::new(dim);
    for _ in 0..n {
        let point = (0..dim).map(|_| rng.gen_range(0.0..100.0)).collect();
        // Points are finite and of the right dimensionality
        let _ = relation.add(point);
    }
    Arc::new(relation)
}

/// Settings with tiny nodes so a few hundred points already build deep trees.
pub fn small_node_settings() -> RTreeSettings {
    RTreeSettings {
        leaf_capacity: Some(6),
        dir_capacity: Some(5),
        integrity_checks: true,
        ..RTreeSettings::default()
    }
}

/// An in-memory index over 500 random 2-D points, not yet initialized.
pub fn create_test_context() -> SpatialResult<TestContext> {
    create_context(random_relation(500, 2, 42), small_node_settings(), false)
}

/// A file-backed index over 800 random 3-D points with a tiny page cache,
/// not yet initialized.
pub fn create_persistent_test_context() -> SpatialResult<TestContext> {
    let settings = RTreeSettings {
        page_size: 512,
        cache_pages: 4,
        integrity_checks: true,
        ..RTreeSettings::default()
    };
    create_context(random_relation(800, 3, 43), settings, true)
}

pub fn create_context(
    relation: Arc<VectorRelation>,
    settings: RTreeSettings,
    persistent: bool,
) -> SpatialResult<TestContext> {
    let dir = Arc::new(tempfile::tempdir()?);
    let index = if persistent {
        DeLiCluTreeIndex::persistent(
            Arc::clone(&relation),
            &dir.path().join("index.deliclu"),
            settings,
        )?
    } else {
        DeLiCluTreeIndex::in_memory(Arc::clone(&relation), settings)?
    };
    Ok(TestContext::new(dir, relation, index))
}

/// Verifies the tree and flushes it.
pub fn cleanup(ctx: TestContext) -> SpatialResult<()> {
    let index = ctx.index();
    let report = index.check_integrity()?;
    assert_eq!(report.entries, index.size());
    index.flush()
}
