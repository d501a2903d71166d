//! # Filter Engine
//!
//! Pure predicates over the loaded item sequence. Nothing here performs I/O or
//! mutates its input; views are recomputed from the loaded sequence on every render.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::calendar;
use crate::classify::classify;
use crate::models::{Item, Location, UserId};

/// Creation-date window selectable in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateBucket {
    /// Same local calendar day as now.
    Today,
    /// The local calendar day before today.
    Yesterday,
    /// Rolling seven days back from now.
    LastWeek,
    #[default]
    All,
}

impl DateBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            DateBucket::Today => "today",
            DateBucket::Yesterday => "yesterday",
            DateBucket::LastWeek => "lastWeek",
            DateBucket::All => "all",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DateBucket::Today => "Hoy",
            DateBucket::Yesterday => "Ayer",
            DateBucket::LastWeek => "Última semana",
            DateBucket::All => "Todas las fechas",
        }
    }

    pub fn matches(self, item: &Item, now: DateTime<FixedOffset>) -> bool {
        match self {
            DateBucket::Today => calendar::is_same_day(item.created_at, now),
            DateBucket::Yesterday => calendar::is_previous_day(item.created_at, now),
            DateBucket::LastWeek => item.created_at >= now - Duration::days(7),
            DateBucket::All => true,
        }
    }
}

impl FromStr for DateBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(DateBucket::Today),
            "yesterday" => Ok(DateBucket::Yesterday),
            "lastWeek" => Ok(DateBucket::LastWeek),
            "all" | "" => Ok(DateBucket::All),
            other => Err(format!("unknown date filter: {other}")),
        }
    }
}

/// Location criterion; `All` neutralizes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationFilter {
    #[default]
    All,
    Only(Location),
}

impl LocationFilter {
    pub fn matches(self, item: &Item) -> bool {
        match self {
            LocationFilter::All => true,
            LocationFilter::Only(location) => item.location == Some(location),
        }
    }
}

impl fmt::Display for LocationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationFilter::All => f.write_str("all"),
            LocationFilter::Only(location) => f.write_str(location.label()),
        }
    }
}

impl FromStr for LocationFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" | "" => Ok(LocationFilter::All),
            other => other.parse().map(LocationFilter::Only),
        }
    }
}

/// Catalog tabs. Each tab owns its own scroll loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tab {
    #[default]
    All,
    Lost,
    Found,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::All, Tab::Lost, Tab::Found];

    pub fn as_str(self) -> &'static str {
        match self {
            Tab::All => "all",
            Tab::Lost => "lost",
            Tab::Found => "found",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tab::All => "Todos",
            Tab::Lost => "Perdidos",
            Tab::Found => "Encontrados",
        }
    }

    /// Typed tabs only show recent items of their type; `All` shows everything.
    pub fn admits(self, item: &Item, now: DateTime<FixedOffset>) -> bool {
        let classification = classify(item, now.with_timezone(&Utc));
        match self {
            Tab::All => true,
            Tab::Lost => classification.is_lost,
            Tab::Found => classification.is_found,
        }
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" | "" => Ok(Tab::All),
            "lost" => Ok(Tab::Lost),
            "found" => Ok(Tab::Found),
            other => Err(format!("unknown tab: {other}")),
        }
    }
}

/// The combined predicate: logical AND of search, location, date and ownership.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
    pub search_term: String,
    pub location: LocationFilter,
    pub date_bucket: DateBucket,
    pub mine_only: bool,
    pub viewer_id: Option<UserId>,
}

impl FilterState {
    fn matches_search(&self, item: &Item) -> bool {
        if self.search_term.is_empty() {
            return true;
        }
        let term = self.search_term.to_lowercase();
        item.name.to_lowercase().contains(&term) || item.description.to_lowercase().contains(&term)
    }

    fn matches_owner(&self, item: &Item) -> bool {
        if !self.mine_only {
            return true;
        }
        self.viewer_id
            .as_ref()
            .is_some_and(|viewer| item.is_authored_by(viewer))
    }

    pub fn matches(&self, item: &Item, now: DateTime<FixedOffset>) -> bool {
        self.matches_search(item)
            && self.location.matches(item)
            && self.date_bucket.matches(item, now)
            && self.matches_owner(item)
    }

    /// Filtered view of `items`, in source order.
    pub fn apply<'a, I>(&self, items: I, now: DateTime<FixedOffset>) -> Vec<&'a Item>
    where
        I: IntoIterator<Item = &'a Item>,
    {
        items.into_iter().filter(|item| self.matches(item, now)).collect()
    }

    /// Filtered view restricted to what `tab` admits.
    pub fn tab_view<'a, I>(&self, items: I, tab: Tab, now: DateTime<FixedOffset>) -> Vec<&'a Item>
    where
        I: IntoIterator<Item = &'a Item>,
    {
        items
            .into_iter()
            .filter(|item| self.matches(item, now) && tab.admits(item, now))
            .collect()
    }

    /// Whether moving to `next` changes a criterion that reloads the feed.
    /// The search term only narrows the loaded sequence locally.
    pub fn requires_reset(&self, next: &FilterState) -> bool {
        self.location != next.location
            || self.date_bucket != next.date_bucket
            || self.mine_only != next.mine_only
    }
}
