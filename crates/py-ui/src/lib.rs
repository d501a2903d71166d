//! # py-ui
//!
//! Askama page templates for PerdidosYa!. Templates only read precomputed
//! view models from [`views`]; nothing is derived inside the markup.

pub mod views;

/// Stylesheets and scripts served under `/static`.
pub const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

use askama::Template;

pub use views::{
    CommentView, FeedList, ItemCard, ItemForm, NoticeView, SelectOption, SentinelView, TabLink,
    ViewerView,
};

#[derive(Template)]
#[template(path = "catalog.html")]
pub struct CatalogTemplate {
    pub title: String,
    pub viewer: ViewerView,
    pub notice: NoticeView,
    pub search_term: String,
    pub locations: Vec<SelectOption>,
    pub dates: Vec<SelectOption>,
    pub mine_only: bool,
    pub tabs: Vec<TabLink>,
    pub feed: FeedList,
    pub form: ItemForm,
}

/// The list of one tab, returned to the scroll loader.
#[derive(Template)]
#[template(path = "feed.html")]
pub struct FeedFragment {
    pub feed: FeedList,
}

#[derive(Template)]
#[template(path = "item.html")]
pub struct ItemTemplate {
    pub title: String,
    pub viewer: ViewerView,
    pub notice: NoticeView,
    pub card: ItemCard,
    pub share_title: String,
    pub share_text: String,
    pub share_url: String,
    pub form: ItemForm,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub title: String,
    pub viewer: ViewerView,
    pub notice: NoticeView,
    pub email: String,
}
