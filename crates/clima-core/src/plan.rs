//! Action plans and the status-preserving merge.
//!
//! Plans are regenerated wholesale by the generative backend, but the user's
//! progress on individual items must survive regeneration. [`merge_plan`]
//! carries each existing item's identity and status onto the matching item of
//! the new plan.
//!
//! Matching uses the stable [`ItemId`] first and falls back to the item title
//! (trimmed, case-insensitive). Each existing item is claimed at most once, so
//! two new items with the same title never share one existing status.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Stable identity of an action item, assigned the first time it is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Ulid);

impl ItemId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Ulid::from_string(s.trim()).ok().map(Self)
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Home,
    Community,
    Farming,
    Conservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Progress of a single action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ItemStatus {
    #[default]
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::ToDo => "To Do",
            ItemStatus::InProgress => "In Progress",
            ItemStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
            "to do" | "todo" => Ok(ItemStatus::ToDo),
            "in progress" => Ok(ItemStatus::InProgress),
            "completed" | "done" => Ok(ItemStatus::Completed),
            other => Err(format!("Unknown item status: '{other}'")),
        }
    }
}

/// An external link attached to an action item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub url: String,
}

/// A single recommended mitigation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    /// Absent only on items fresh from the backend, before merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,

    pub title: String,

    pub description: String,

    pub category: Category,

    pub priority: Priority,

    #[serde(default)]
    pub status: ItemStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
}

/// A generated set of mitigation steps for one risk at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub summary: String,
    pub items: Vec<ActionItem>,
}

impl ActionPlan {
    /// Items with `High` priority, in plan order.
    pub fn high_priority(&self) -> impl Iterator<Item = &ActionItem> {
        self.items.iter().filter(|i| i.priority == Priority::High)
    }

    /// Find an item by id or, failing that, by title.
    pub fn find_mut(&mut self, key: &str) -> Option<&mut ActionItem> {
        if let Some(id) = ItemId::parse(key) {
            if let Some(pos) = self.items.iter().position(|i| i.id == Some(id)) {
                return self.items.get_mut(pos);
            }
        }
        let wanted = normalize_title(key);
        self.items
            .iter_mut()
            .find(|i| normalize_title(&i.title) == wanted)
    }

    /// Set the status of the item addressed by `key` (id or title).
    ///
    /// Returns the updated item, or `None` when nothing matched.
    pub fn set_status(&mut self, key: &str, status: ItemStatus) -> Option<&ActionItem> {
        let item = self.find_mut(key)?;
        item.status = status;
        Some(item)
    }

    /// Put every item back to `To Do`.
    pub fn reset_progress(&mut self) {
        for item in &mut self.items {
            item.status = ItemStatus::ToDo;
        }
    }

    /// (completed, total)
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count();
        (done, self.items.len())
    }
}

/// Merge a freshly generated plan with the plan it replaces.
///
/// Every item of `new` that matches an item of `existing` inherits that item's
/// id and status. Unmatched items get a fresh id and start at `To Do`. The
/// summary and item order always come from `new`.
pub fn merge_plan(existing: Option<&ActionPlan>, mut new: ActionPlan) -> ActionPlan {
    let previous: &[ActionItem] = existing.map(|p| p.items.as_slice()).unwrap_or(&[]);
    let mut claimed = vec![false; previous.len()];

    for item in &mut new.items {
        let by_id = item.id.and_then(|id| {
            previous
                .iter()
                .enumerate()
                .position(|(i, old)| !claimed[i] && old.id == Some(id))
        });
        let matched = by_id.or_else(|| {
            let title = normalize_title(&item.title);
            previous
                .iter()
                .enumerate()
                .position(|(i, old)| !claimed[i] && normalize_title(&old.title) == title)
        });

        match matched {
            Some(index) => {
                claimed[index] = true;
                let old = &previous[index];
                item.id = Some(old.id.unwrap_or_default());
                item.status = old.status;
            }
            None => {
                item.id = Some(ItemId::new());
                item.status = ItemStatus::ToDo;
            }
        }
    }

    new
}

fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
