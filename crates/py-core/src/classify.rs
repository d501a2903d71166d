//! # Item Classification
//!
//! Lost/found buckets and the three-month recency window used by the typed tabs.

use chrono::{DateTime, Months, Utc};

use crate::models::{Item, ItemType};

/// Items older than this drop out of the lost and found tabs.
pub const RECENCY_MONTHS: u32 = 3;

/// Legacy keyword marking a found item in records without a stored type.
const FOUND_KEYWORD: &str = "encontré";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub is_lost: bool,
    pub is_found: bool,
}

/// Whether `item` was created within the last three calendar months.
pub fn is_recent(item: &Item, now: DateTime<Utc>) -> bool {
    match now.checked_sub_months(Months::new(RECENCY_MONTHS)) {
        Some(cutoff) => item.created_at >= cutoff,
        None => true,
    }
}

/// Tab eligibility. Only the stored `type` counts; legacy records without one
/// belong to neither typed tab.
pub fn classify(item: &Item, now: DateTime<Utc>) -> Classification {
    let recent = is_recent(item, now);
    Classification {
        is_lost: recent && item.item_type == Some(ItemType::Lost),
        is_found: recent && item.item_type == Some(ItemType::Found),
    }
}

/// Type used for display. Prefers the stored `type`; records predating that
/// field fall back to sniffing name and description for "encontré".
///
/// The fallback is a best-effort text match kept for old data, not a classifier.
pub fn effective_type(item: &Item) -> ItemType {
    if let Some(stored) = item.item_type {
        return stored;
    }

    let mentions_found = item.name.to_lowercase().contains(FOUND_KEYWORD)
        || item.description.to_lowercase().contains(FOUND_KEYWORD);

    if mentions_found {
        ItemType::Found
    } else {
        ItemType::Lost
    }
}
