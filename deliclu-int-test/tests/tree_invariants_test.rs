//! Structural invariants of the tree under mixed workloads.

use deliclu_int_test::test_util::{
    cleanup, create_context, create_test_context, random_relation, run_test, small_node_settings,
};
use deliclu_rtree::{BulkSplit, OverlapPolicy, RTreeSettings, SpatialError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_incremental_insert_keeps_invariants() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for id in 0..500 {
                index.insert(id)?;
                if id % 50 == 49 {
                    let report = index.check_integrity()?;
                    assert_eq!(report.entries, id + 1);
                }
            }
            assert!(index.height() >= 3);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_random_deletes_keep_invariants() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            index.initialize()?;

            let mut ids: Vec<u64> = (0..500).collect();
            ids.shuffle(&mut StdRng::seed_from_u64(3));
            for (n, id) in ids.iter().enumerate() {
                assert!(index.delete(*id)?);
                assert!(!index.delete(*id)?);
                if n % 37 == 0 {
                    index.check_integrity()?;
                }
            }
            assert_eq!(index.size(), 0);
            assert_eq!(index.height(), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_interleaved_insert_delete() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for id in 0..250 {
                index.insert(id)?;
            }
            for round in 0..5u64 {
                let removed: Vec<u64> = (0..250).filter(|id| id % 5 == round).collect();
                assert_eq!(index.delete_all(&removed)?, removed.len());
                index.check_integrity()?;
                let added: Vec<u64> = (250 + round * 50..300 + round * 50).collect();
                index.insert_all(&added)?;
                index.check_integrity()?;
            }
            assert_eq!(index.size(), 250);
            for (q, expected) in [(7u64, false), (251, true), (499, true)] {
                let found = index.knn_search(&ctx.point(q), 1)?;
                assert_eq!(found[0].id == q, expected, "object {}", q);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_every_overlap_policy() {
    for policy in [OverlapPolicy::LeafParents, OverlapPolicy::AllLevels, OverlapPolicy::Never] {
        run_test(
            || {
                let settings = RTreeSettings {
                    overlap_policy: policy,
                    bulk_load: false,
                    ..small_node_settings()
                };
                create_context(random_relation(300, 3, 11), settings, false)
            },
            |ctx| {
                let index = ctx.index();
                index.initialize()?;
                let report = index.check_integrity()?;
                assert_eq!(report.entries, 300);
                assert_eq!(report.leaf_nodes + report.directory_nodes, report.pages_checked);
                Ok(())
            },
            cleanup,
        )
    }
}

#[test]
fn test_bulk_load_strategies() {
    for split in [BulkSplit::SortTileRecursive, BulkSplit::Hilbert] {
        run_test(
            || {
                let settings = RTreeSettings {
                    bulk_split: split,
                    ..small_node_settings()
                };
                create_context(random_relation(1000, 2, 12), settings, false)
            },
            |ctx| {
                let index = ctx.index();
                index.initialize()?;
                assert_eq!(index.check_integrity()?.entries, 1000);

                // Bulk loaded trees stay valid under further updates
                let odd: Vec<u64> = (0..1000).filter(|id| id % 2 == 1).collect();
                assert_eq!(index.delete_all(&odd)?, 500);
                index.insert_all(&odd[..100])?;
                assert_eq!(index.size(), 600);
                Ok(())
            },
            cleanup,
        )
    }
}

#[test]
fn test_dimension_mismatch_rejected() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            index.initialize()?;
            let err = index.knn_search(&[1.0, 2.0, 3.0], 1).unwrap_err();
            assert!(matches!(err, SpatialError::DimensionMismatch { expected: 2, actual: 3 }));
            Ok(())
        },
        cleanup,
    )
}
