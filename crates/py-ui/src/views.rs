//! View models handed to the templates.

use chrono::{DateTime, Utc};

use py_core::{
    effective_type, Comment, DateBucket, FilterState, Item, ItemType, Location, LocationFilter,
    Tab, Viewer, ANONYMOUS_NAME,
};
use py_feed::{CatalogView, FeedSettings, Sentinel, TabView};

const DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Default)]
pub struct ViewerView {
    pub signed_in: bool,
    pub verified: bool,
    pub name: String,
    pub email: String,
}

impl ViewerView {
    pub fn from_viewer(viewer: Option<&Viewer>) -> Self {
        match viewer {
            Some(v) => Self {
                signed_in: true,
                verified: v.email_verified,
                name: v.display_name_or_fallback().to_string(),
                email: v.email.clone().unwrap_or_default(),
            },
            None => Self::default(),
        }
    }
}

/// Transient message shown once at the top of a page.
#[derive(Debug, Clone, Default)]
pub struct NoticeView {
    pub visible: bool,
    pub is_error: bool,
    pub text: String,
}

impl NoticeView {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { visible: true, is_error: true, text: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self { visible: true, is_error: false, text: text.into() }
    }
}

#[derive(Debug, Clone)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    fn new(value: &str, label: &str, selected: bool) -> Self {
        Self { value: value.to_string(), label: label.to_string(), selected }
    }
}

pub fn location_filter_options(current: LocationFilter) -> Vec<SelectOption> {
    std::iter::once(SelectOption::new("all", "Todas las ubicaciones", current == LocationFilter::All))
        .chain(Location::ALL.into_iter().map(|loc| {
            SelectOption::new(loc.label(), loc.label(), current == LocationFilter::Only(loc))
        }))
        .collect()
}

pub fn date_options(current: DateBucket) -> Vec<SelectOption> {
    [DateBucket::All, DateBucket::Today, DateBucket::Yesterday, DateBucket::LastWeek]
        .into_iter()
        .map(|bucket| SelectOption::new(bucket.as_str(), bucket.label(), bucket == current))
        .collect()
}

#[derive(Debug, Clone)]
pub struct CommentView {
    pub id: String,
    pub text: String,
    pub author_name: String,
    pub author_photo_url: String,
    pub date_label: String,
    pub deletable: bool,
}

impl CommentView {
    fn build(comment: &Comment, viewer: Option<&Viewer>, settings: &FeedSettings) -> Self {
        Self {
            id: comment.id.to_string(),
            text: comment.text.clone(),
            author_name: comment.author_name.clone(),
            author_photo_url: comment.author_photo_url.clone().unwrap_or_default(),
            date_label: date_label(comment.created_at, settings),
            deletable: viewer.is_some_and(|v| v.uid == comment.author_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemCard {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub thumb_url: String,
    pub has_image: bool,
    pub location_label: String,
    pub type_label: String,
    pub type_class: String,
    pub author_name: String,
    pub date_label: String,
    pub like_count: usize,
    pub liked: bool,
    pub comment_count: usize,
    pub comments: Vec<CommentView>,
    pub is_author: bool,
    pub can_comment: bool,
    pub detail_url: String,
}

impl ItemCard {
    pub fn build(item: &Item, viewer: Option<&Viewer>, settings: &FeedSettings) -> Self {
        let kind = effective_type(item);
        let verified_uid = viewer.filter(|v| v.email_verified).map(|v| &v.uid);
        Self {
            id: item.id.to_string(),
            name: item.name.clone(),
            description: item.description.clone(),
            image_url: item.image_url.clone(),
            thumb_url: format!("{}.thumb.webp", item.image_url),
            has_image: !item.image_url.is_empty(),
            location_label: item.location.map(|l| l.label().to_string()).unwrap_or_default(),
            type_label: kind.label().to_string(),
            type_class: kind.as_str().to_string(),
            author_name: if item.is_anonymous {
                ANONYMOUS_NAME.to_string()
            } else {
                item.author_name.clone()
            },
            date_label: date_label(item.created_at, settings),
            like_count: item.like_count(),
            liked: viewer.is_some_and(|v| item.is_liked_by(&v.uid)),
            comment_count: item.comments.len(),
            comments: item
                .comments
                .iter()
                .map(|c| CommentView::build(c, viewer, settings))
                .collect(),
            is_author: viewer.is_some_and(|v| item.is_authored_by(&v.uid)),
            can_comment: verified_uid.is_some_and(|uid| item.comments_by(uid) < settings.comment_limit),
            detail_url: format!("/items?id={}", item.id),
        }
    }
}

fn date_label(at: DateTime<Utc>, settings: &FeedSettings) -> String {
    settings.local(at).format(DATE_FORMAT).to_string()
}

#[derive(Debug, Clone)]
pub struct TabLink {
    pub key: String,
    pub label: String,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SentinelView {
    pub visible: bool,
    pub loading: bool,
    pub more: bool,
    pub text: String,
    pub more_href: String,
}

impl SentinelView {
    pub fn build(tab: Tab, sentinel: Option<Sentinel>) -> Self {
        match sentinel {
            Some(s) => Self {
                visible: true,
                loading: s == Sentinel::Loading,
                more: s == Sentinel::MoreAvailable,
                text: s.text().to_string(),
                more_href: format!("/catalogo/more?tab={}", tab.as_str()),
            },
            None => Self::default(),
        }
    }
}

/// The cards of one tab followed by its sentinel.
#[derive(Debug, Clone)]
pub struct FeedList {
    pub tab: String,
    pub cards: Vec<ItemCard>,
    pub empty: bool,
    pub sentinel: SentinelView,
}

impl FeedList {
    pub fn build(tab: &TabView, viewer: Option<&Viewer>, settings: &FeedSettings) -> Self {
        Self {
            tab: tab.tab.as_str().to_string(),
            cards: tab.items.iter().map(|i| ItemCard::build(i, viewer, settings)).collect(),
            empty: tab.items.is_empty(),
            sentinel: SentinelView::build(tab.tab, tab.sentinel),
        }
    }
}

/// Tab strip for a catalog view.
pub fn tab_links(view: &CatalogView) -> Vec<TabLink> {
    view.tabs
        .iter()
        .map(|t| TabLink {
            key: t.tab.as_str().to_string(),
            label: format!("{} ({})", t.tab.label(), t.items.len()),
            active: t.tab == view.active_tab,
        })
        .collect()
}

/// Create/edit form. `id` is empty when creating.
#[derive(Debug, Clone)]
pub struct ItemForm {
    pub id: String,
    pub name: String,
    pub description: String,
    pub locations: Vec<SelectOption>,
    pub types: Vec<SelectOption>,
    pub is_anonymous: bool,
    pub date_value: String,
    pub image_url: String,
    pub max_date: String,
}

impl ItemForm {
    pub fn blank(now: DateTime<Utc>, settings: &FeedSettings) -> Self {
        let today = settings.local(now).format("%Y-%m-%d").to_string();
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            locations: location_options(None),
            types: type_options(ItemType::Lost),
            is_anonymous: false,
            date_value: today.clone(),
            image_url: String::new(),
            max_date: today,
        }
    }

    pub fn for_item(item: &Item, now: DateTime<Utc>, settings: &FeedSettings) -> Self {
        Self {
            id: item.id.to_string(),
            name: item.name.clone(),
            description: item.description.clone(),
            locations: location_options(item.location),
            types: type_options(effective_type(item)),
            is_anonymous: item.is_anonymous,
            date_value: settings.local(item.created_at).format("%Y-%m-%d").to_string(),
            image_url: item.image_url.clone(),
            max_date: settings.local(now).format("%Y-%m-%d").to_string(),
        }
    }
}

fn location_options(current: Option<Location>) -> Vec<SelectOption> {
    Location::ALL
        .into_iter()
        .map(|loc| SelectOption::new(loc.label(), loc.label(), current == Some(loc)))
        .collect()
}

fn type_options(current: ItemType) -> Vec<SelectOption> {
    [ItemType::Lost, ItemType::Found]
        .into_iter()
        .map(|t| SelectOption::new(t.as_str(), t.label(), t == current))
        .collect()
}

/// Everything the catalog template needs besides the notice and form.
pub struct CatalogParts {
    pub search_term: String,
    pub locations: Vec<SelectOption>,
    pub dates: Vec<SelectOption>,
    pub mine_only: bool,
    pub tabs: Vec<TabLink>,
    pub feed: FeedList,
}

impl CatalogParts {
    pub fn build(view: &CatalogView, settings: &FeedSettings) -> Self {
        let filter: &FilterState = &view.filter;
        let viewer = view.viewer.as_ref();
        let feed = match view.active() {
            Some(active) => FeedList::build(active, viewer, settings),
            None => FeedList {
                tab: view.active_tab.as_str().to_string(),
                cards: Vec::new(),
                empty: true,
                sentinel: SentinelView::default(),
            },
        };
        Self {
            search_term: filter.search_term.clone(),
            locations: location_filter_options(filter.location),
            dates: date_options(filter.date_bucket),
            mine_only: filter.mine_only,
            tabs: tab_links(view),
            feed,
        }
    }
}
