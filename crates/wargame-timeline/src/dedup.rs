//! Timeline aggregation and deduplication
//!
//! Candidates sharing an [`Identity`] collapse to the most complete one.
//! Ties on completeness are broken on canonical JSON, so the surviving set
//! does not depend on the order sources were concatenated in. The result is
//! sorted newest first; the sort is stable.

use crate::item::{Identity, Team, TimelineItem};
use indexmap::map::Entry;
use indexmap::IndexMap;
use std::cmp::Ordering;

fn prefer(candidate: &TimelineItem, existing: &TimelineItem) -> bool {
    match candidate.completeness().cmp(&existing.completeness()) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.canonical() > existing.canonical(),
    }
}

/// Collapse duplicates and sort newest first
#[must_use]
pub fn deduplicate(items: impl IntoIterator<Item = TimelineItem>) -> Vec<TimelineItem> {
    let mut groups: IndexMap<Identity, TimelineItem> = IndexMap::new();
    for item in items {
        match groups.entry(item.identity()) {
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
            Entry::Occupied(mut slot) => {
                if prefer(&item, slot.get()) {
                    slot.insert(item);
                }
            }
        }
    }
    let mut merged: Vec<TimelineItem> = groups.into_values().collect();
    merged.sort_by_key(|item| std::cmp::Reverse(item.effective_timestamp()));
    merged
}

/// Concatenate several sources, then [`deduplicate`]
#[must_use]
pub fn aggregate<I>(sources: I) -> Vec<TimelineItem>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = TimelineItem>,
{
    deduplicate(sources.into_iter().flatten())
}

/// A merged feed split by team
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamTimelines {
    /// Player team items
    pub blue: Vec<TimelineItem>,
    /// Game control items
    pub white: Vec<TimelineItem>,
    /// Ally items
    pub green: Vec<TimelineItem>,
    /// Adversary items
    pub red: Vec<TimelineItem>,
    /// Items with no team
    pub unassigned: Vec<TimelineItem>,
}

impl TeamTimelines {
    /// Items for one team
    #[must_use]
    pub fn team(&self, team: Team) -> &[TimelineItem] {
        match team {
            Team::Blue => &self.blue,
            Team::White => &self.white,
            Team::Green => &self.green,
            Team::Red => &self.red,
        }
    }
}

/// Split a feed by team, keeping order
#[must_use]
pub fn partition_by_team(items: Vec<TimelineItem>) -> TeamTimelines {
    let mut split = TeamTimelines::default();
    for item in items {
        match item.team {
            Some(Team::Blue) => split.blue.push(item),
            Some(Team::White) => split.white.push(item),
            Some(Team::Green) => split.green.push(item),
            Some(Team::Red) => split.red.push(item),
            None => split.unassigned.push(item),
        }
    }
    split
}

/// Case-insensitive search over title, content, type and team
#[must_use]
pub fn search<'a>(items: &'a [TimelineItem], query: &str) -> Vec<&'a TimelineItem> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|item| {
            [
                item.title.as_deref(),
                item.content.as_deref(),
                Some(item.item_type.as_str()),
                item.team.map(Team::as_str),
                item.faction.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemId, ItemType};
    use pretty_assertions::assert_eq;

    fn note(id: i64, content: &str, ts: i64) -> TimelineItem {
        TimelineItem::new(ItemType::Note)
            .with_id(ItemId::number(id))
            .with_content(content)
            .with_timestamp(ts)
    }

    #[test]
    fn keeps_most_complete_duplicate() {
        let short = note(1, "short", 10);
        let long = note(1, "a much longer body", 10).with_team(Team::Blue);
        let merged = deduplicate(vec![short, long.clone()]);
        assert_eq!(merged, vec![long]);
    }

    #[test]
    fn sorts_newest_first() {
        let merged = aggregate(vec![
            vec![note(1, "a", 100), note(2, "b", 300)],
            vec![note(3, "c", 200)],
        ]);
        let order: Vec<_> = merged.iter().map(|i| i.effective_timestamp()).collect();
        assert_eq!(order, vec![300, 200, 100]);
    }

    #[test]
    fn composite_identity_collapses_copies_without_ids() {
        let a = TimelineItem::new(ItemType::Moment)
            .with_content("Leader overruled deputy")
            .with_team(Team::Blue)
            .with_timestamp(42);
        let b = a.clone().with_title("Moment");
        let merged = deduplicate(vec![a, b.clone()]);
        assert_eq!(merged, vec![b]);
    }

    #[test]
    fn partition_and_search() {
        let items = vec![
            note(1, "Blue move", 3).with_team(Team::Blue),
            note(2, "Red feint", 2).with_team(Team::Red),
            note(3, "loose", 1),
        ];
        let split = partition_by_team(items.clone());
        assert_eq!(split.blue.len(), 1);
        assert_eq!(split.team(Team::Red).len(), 1);
        assert_eq!(split.unassigned.len(), 1);
        assert_eq!(search(&items, "FEINT").len(), 1);
        assert_eq!(search(&items, "blue").len(), 1);
        assert_eq!(search(&items, " ").len(), 3);
    }
}
