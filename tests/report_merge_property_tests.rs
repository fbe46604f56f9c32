//! Property-based tests for folding trip counts into the canonical counterpart list

use proptest::prelude::*;
use snow_acts::report::{TripGroup, merge_groups};
use snow_acts::types::Id;
use std::collections::HashMap;

/// Canonical ids, a subset of them with counts, and a few strangers with counts.
fn scenario_strategy() -> impl Strategy<Value = (Vec<Id>, Vec<(usize, i64)>, Vec<i64>)> {
    (1usize..12).prop_flat_map(|canonical| {
        (
            Just(canonical),
            prop::collection::vec((0..canonical, 1i64..500), 0..canonical),
            prop::collection::vec(1i64..500, 0..4),
        )
            .prop_map(|(canonical, hits, strangers)| {
                let ids: Vec<Id> = (0..canonical).map(|_| Id::new()).collect();
                // one count row per canonical id at most
                let mut seen: HashMap<usize, i64> = HashMap::new();
                for (pos, count) in hits {
                    seen.entry(pos).or_insert(count);
                }
                (ids, seen.into_iter().collect::<Vec<_>>(), strangers)
            })
    })
}

proptest! {
    #[test]
    fn canonical_entries_appear_once_with_their_counts(
        (ids, hits, strangers) in scenario_strategy()
    ) {
        let canonical: Vec<TripGroup> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| TripGroup::new(Some(*id), format!("group {i}"), 0))
            .collect();

        let stranger_ids: Vec<Id> = strangers.iter().map(|_| Id::new()).collect();
        let mut counted: Vec<TripGroup> = hits
            .iter()
            .map(|(pos, count)| TripGroup::new(Some(ids[*pos]), "", *count))
            .collect();
        counted.extend(
            stranger_ids
                .iter()
                .zip(&strangers)
                .map(|(id, count)| TripGroup::new(Some(*id), "stranger", *count)),
        );

        let merged = merge_groups(canonical, counted);

        prop_assert_eq!(merged.len(), ids.len() + stranger_ids.len());

        // canonical order is kept and names survive
        for (i, id) in ids.iter().enumerate() {
            prop_assert_eq!(merged[i].id, Some(*id));
            prop_assert_eq!(&merged[i].name, &format!("group {i}"));
            let expected = hits
                .iter()
                .find(|(pos, _)| *pos == i)
                .map(|(_, count)| *count)
                .unwrap_or(0);
            prop_assert_eq!(merged[i].trip_count, expected);
        }

        // strangers are appended in the order they came in
        for (offset, id) in stranger_ids.iter().enumerate() {
            prop_assert_eq!(merged[ids.len() + offset].id, Some(*id));
        }

        let total: i64 = merged.iter().map(|g| g.trip_count).sum();
        let expected_total: i64 = hits.iter().map(|(_, c)| c).sum::<i64>() + strangers.iter().sum::<i64>();
        prop_assert_eq!(total, expected_total);
    }

    #[test]
    fn empty_counts_leave_canonical_untouched(size in 0usize..20) {
        let canonical: Vec<TripGroup> = (0..size)
            .map(|i| TripGroup::new(Some(Id::new()), format!("p{i}"), 0))
            .collect();
        let merged = merge_groups(canonical.clone(), vec![]);
        prop_assert_eq!(merged, canonical);
    }
}
