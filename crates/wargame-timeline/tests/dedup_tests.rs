//! Deduplication properties

use proptest::prelude::*;
use std::collections::HashSet;
use wargame_timeline::{aggregate, deduplicate, ItemId, ItemType, Team, TimelineItem};

fn arb_team() -> impl Strategy<Value = Option<Team>> {
    prop_oneof![
        Just(None),
        Just(Some(Team::Blue)),
        Just(Some(Team::White)),
        Just(Some(Team::Red)),
    ]
}

fn arb_item() -> impl Strategy<Value = TimelineItem> {
    (
        prop::option::of(0i64..6),
        0i64..4,
        "[a-c]{0,6}",
        arb_team(),
        prop::option::of("[xy]{1,3}"),
    )
        .prop_map(|(id, ts, content, team, title)| {
            let mut item = TimelineItem::new(ItemType::Note)
                .with_timestamp(ts)
                .with_content(content);
            item.id = id.map(ItemId::number);
            item.team = team;
            item.title = title;
            item
        })
}

fn canonical_set(items: &[TimelineItem]) -> Vec<String> {
    let mut set: Vec<String> = items.iter().map(TimelineItem::canonical).collect();
    set.sort();
    set
}

proptest! {
    #[test]
    fn output_set_ignores_input_order(
        items in prop::collection::vec(arb_item(), 0..24),
        seed in any::<u64>(),
    ) {
        let forward = deduplicate(items.clone());
        let mut shuffled = items.clone();
        // Deterministic permutation from the seed
        let len = shuffled.len().max(1) as u64;
        shuffled.rotate_left((seed % len) as usize);
        shuffled.reverse();
        let backward = deduplicate(shuffled);
        prop_assert_eq!(canonical_set(&forward), canonical_set(&backward));
    }

    #[test]
    fn ids_are_unique_and_output_not_larger(items in prop::collection::vec(arb_item(), 0..24)) {
        let merged = deduplicate(items.clone());
        prop_assert!(merged.len() <= items.len());
        let mut seen = HashSet::new();
        for item in &merged {
            if let Some(id) = item.present_id() {
                prop_assert!(seen.insert(id.to_string()));
            }
        }
    }

    #[test]
    fn sorted_newest_first(items in prop::collection::vec(arb_item(), 0..24)) {
        let merged = deduplicate(items);
        for pair in merged.windows(2) {
            prop_assert!(pair[0].effective_timestamp() >= pair[1].effective_timestamp());
        }
    }

    #[test]
    fn merge_is_idempotent(items in prop::collection::vec(arb_item(), 0..24)) {
        let once = deduplicate(items);
        let twice = aggregate(vec![once.clone(), once.clone()]);
        prop_assert_eq!(canonical_set(&once), canonical_set(&twice));
    }
}
