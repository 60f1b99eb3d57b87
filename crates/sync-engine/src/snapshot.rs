// crates/sync-engine/src/snapshot.rs
//! Read-only views of the list for rendering

use serde::Serialize;
use shoplist_core::{Category, ShoppingListItem};

/// Unchecked items of one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup {
    pub category: Category,
    pub items: Vec<ShoppingListItem>,
}

/// Progress counters for a list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListStats {
    pub total: usize,
    pub checked: usize,
    pub remaining: usize,
    /// Rounded to the nearest whole percent; zero for an empty list
    pub completion_percent: u8,
}

impl ListStats {
    pub fn from_items(items: &[ShoppingListItem]) -> Self {
        let total = items.len();
        let checked = items.iter().filter(|i| i.checked).count();
        let completion_percent = if total == 0 {
            0
        } else {
            ((checked * 200 + total) / (total * 2)) as u8
        };
        Self {
            total,
            checked,
            remaining: total - checked,
            completion_percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.remaining == 0
    }
}

/// Items grouped the way the list is displayed
///
/// Unchecked items are grouped by category in display order, empty groups
/// left out. Checked items form one trailing bucket, oldest check first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListSnapshot {
    pub items: Vec<ShoppingListItem>,
    pub groups: Vec<CategoryGroup>,
    pub checked: Vec<ShoppingListItem>,
    pub stats: ListStats,
}

impl ListSnapshot {
    pub fn build(items: Vec<ShoppingListItem>) -> Self {
        let mut groups: Vec<CategoryGroup> = Category::ALL
            .iter()
            .map(|category| CategoryGroup {
                category: *category,
                items: Vec::new(),
            })
            .collect();
        let mut checked = Vec::new();

        for item in &items {
            if item.checked {
                checked.push(item.clone());
            } else {
                groups[item.category.display_index()].items.push(item.clone());
            }
        }

        groups.retain(|g| !g.items.is_empty());
        // Stable, so items checked at the same instant keep list order.
        checked.sort_by_key(|i| i.checked_at);

        Self {
            stats: ListStats::from_items(&items),
            items,
            groups,
            checked,
        }
    }

    pub fn group(&self, category: Category) -> Option<&CategoryGroup> {
        self.groups.iter().find(|g| g.category == category)
    }
}
