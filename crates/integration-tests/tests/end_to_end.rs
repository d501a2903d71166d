mod common;

use std::sync::atomic::Ordering;

use chrono::Duration;
use tokio_test::assert_ok;

use common::{campus_now, item, viewer, FakeStore, Harness};
use py_core::{FilterState, Tab};
use py_feed::{PageLoad, Sentinel};

/// Seventeen items, newest first; every third mentions a backpack.
fn catalog() -> FakeStore {
    let items = (0..17)
        .map(|i| {
            let mut it = item(&format!("item-{i:02}"), &format!("Objeto {i}"), "owner", campus_now() - Duration::minutes(i));
            match i % 3 {
                0 => it.name = format!("Mochila {i}"),
                1 => it.description = format!("Dejada junto a una MOCHILA ({i})"),
                _ => it.description = "Sin pistas".into(),
            }
            it
        })
        .collect();
    FakeStore::with_items(items)
}

#[tokio::test]
async fn test_search_then_scroll_to_the_end_of_the_feed() {
    let harness = Harness::new(catalog());
    let session = harness.session(Some(viewer("ana", true)));

    // Entering the catalog loads the first page of 12.
    let first = assert_ok!(session.apply_filters(FilterState::default(), Tab::All).await);
    assert_eq!(first, Some(PageLoad::Loaded(12)));
    assert!(session.feed().has_more());

    let search = FilterState { search_term: "mochila".into(), ..Default::default() };
    assert_eq!(assert_ok!(session.apply_filters(search, Tab::All).await), None);

    let view = session.catalog();
    let tab = view.active().unwrap();
    assert!(!tab.items.is_empty());
    assert!(tab.items.iter().all(|i| {
        i.name.to_lowercase().contains("mochila") || i.description.to_lowercase().contains("mochila")
    }));
    assert_eq!(tab.sentinel, Some(Sentinel::MoreAvailable));

    // A sentinel on an inactive tab does nothing.
    assert_eq!(assert_ok!(session.load_more(Tab::Lost).await), PageLoad::Skipped);

    assert_eq!(assert_ok!(session.load_more(Tab::All).await), PageLoad::Loaded(5));
    assert!(!session.feed().has_more());
    assert_eq!(session.feed().len(), 17);

    assert_eq!(assert_ok!(session.load_more(Tab::All).await), PageLoad::Skipped);
    assert_eq!(harness.store.page_requests.load(Ordering::SeqCst), 2);

    let view = session.catalog();
    let tab = view.active().unwrap();
    assert_eq!(tab.sentinel, Some(Sentinel::Exhausted));
    assert_eq!(tab.items.len(), 12);
}

#[tokio::test]
async fn test_leaving_the_catalog_detaches_the_loaders() {
    let harness = Harness::new(catalog());
    let session = harness.session(None);
    assert_ok!(session.enter().await);

    session.leave();
    assert_eq!(assert_ok!(session.load_more(Tab::All).await), PageLoad::Skipped);
    assert_eq!(harness.store.page_requests.load(Ordering::SeqCst), 1);
}
