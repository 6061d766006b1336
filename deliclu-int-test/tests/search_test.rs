//! The three searches against brute-force scans of the relation.

use deliclu_int_test::test_util::{
    cleanup, create_persistent_test_context, create_test_context, random_relation, run_test,
};
use deliclu_rtree::{
    CosineDistance, Distance, LpNormDistance, MaximumDistance, Neighbor, Relation,
};

fn distances(neighbors: &[Neighbor]) -> Vec<f64> {
    neighbors.iter().map(|n| n.distance).collect()
}

fn spatial_distances() -> Vec<Box<dyn Distance>> {
    vec![
        Box::new(LpNormDistance::EUCLIDEAN),
        Box::new(LpNormDistance::MANHATTAN),
        Box::new(MaximumDistance),
        Box::new(LpNormDistance::new(3.0).unwrap()),
    ]
}

#[test]
fn test_knn_matches_scan() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            index.initialize()?;
            let queries = random_relation(25, 2, 100);
            for distance in spatial_distances() {
                let searcher = index.knn_searcher(distance.as_ref()).unwrap();
                for q in queries.ids() {
                    let query = queries.get(q).unwrap();
                    for k in [1, 4, 30] {
                        let result = searcher.by_object(&query, k)?;
                        let expected = ctx.linear_scan(distance.as_ref(), &query);
                        assert_eq!(distances(&result), distances(&expected[..k]), "{}", distance.name());
                    }
                }
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_knn_by_id_finds_itself() {
    run_test(
        create_persistent_test_context,
        |ctx| {
            let index = ctx.index();
            index.initialize()?;
            let searcher = index.knn_searcher(&LpNormDistance::EUCLIDEAN).unwrap();
            for id in (0..800).step_by(41) {
                let result = searcher.by_id(id, 5)?;
                assert_eq!(result[0], Neighbor::new(id, 0.0));
                assert_eq!(result.len(), 5);
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_range_matches_scan() {
    run_test(
        create_persistent_test_context,
        |ctx| {
            let index = ctx.index();
            index.initialize()?;
            let queries = random_relation(10, 3, 101);
            for distance in spatial_distances() {
                let searcher = index.range_searcher(distance.as_ref()).unwrap();
                for (q, radius) in queries.ids().into_iter().zip([0.5, 5.0, 12.0, 30.0, 500.0].iter().cycle()) {
                    let query = queries.get(q).unwrap();
                    let result = searcher.by_object(&query, *radius)?;
                    let expected: Vec<Neighbor> = ctx
                        .linear_scan(distance.as_ref(), &query)
                        .into_iter()
                        .filter(|n| n.distance <= *radius)
                        .collect();
                    assert_eq!(result.len(), expected.len(), "{} radius {}", distance.name(), radius);
                    assert_eq!(distances(&result), distances(&expected));
                }
            }
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_priority_order_matches_scan() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            index.initialize()?;
            let searcher = index.priority_searcher(&MaximumDistance).unwrap();
            let query = vec![50.0, 50.0];
            let result: Vec<Neighbor> = searcher
                .by_object(&query, false, None)?
                .collect::<Result<_, _>>()?;
            let expected = ctx.linear_scan(&MaximumDistance, &query);
            assert_eq!(result.len(), 500);
            assert_eq!(distances(&result), distances(&expected));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_priority_early_stop_reads_few_pages() {
    run_test(
        create_persistent_test_context,
        |ctx| {
            let index = ctx.index();
            index.initialize()?;
            let before = index.stats();
            let first: Vec<Neighbor> = index
                .priority_search(&ctx.point(17), false)?
                .take(3)
                .collect::<Result<_, _>>()?;
            let after = index.stats();
            assert_eq!(first[0], Neighbor::new(17, 0.0));
            let pages = (after.reads - before.reads) + (after.cache_hits - before.cache_hits);
            assert!(pages < index.check_integrity()?.pages_checked / 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_unsupported_distance_has_no_searcher() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            index.initialize()?;
            assert!(index.knn_searcher(&CosineDistance).is_none());
            assert!(index.range_searcher(&CosineDistance).is_none());
            assert!(index.priority_searcher(&CosineDistance).is_none());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_empty_index_searches() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            assert!(index.knn_search(&[1.0, 1.0], 10)?.is_empty());
            assert!(index.range_search(&[1.0, 1.0], 100.0)?.is_empty());
            assert!(index.priority_search(&[1.0, 1.0], true)?.next().is_none());
            Ok(())
        },
        cleanup,
    )
}
