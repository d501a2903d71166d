use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use actix_web::cookie::Cookie;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use tokio::sync::watch;

use py_api::sessions::VISITOR_COOKIE;
use py_api::{configure_routes, AppState, SessionRegistry, VisitorLimits};
use py_core::{
    AppError, AuthSession, Item, ItemId, ItemType, Location, MockAuthProvider, MockContentModerator,
    MockItemStore, MockNotifier, MockObjectStorage, SystemClock, UserId, Viewer,
};
use py_feed::{CatalogPorts, FeedSettings, MutationCoordinator};

fn item(name: &str) -> Item {
    let now = Utc::now();
    Item {
        id: ItemId::new(format!("id-{name}")),
        name: name.to_string(),
        description: "Cerca de la entrada".to_string(),
        image_url: "/media/items/x/image".to_string(),
        location: Some(Location::Biblioteca),
        item_type: Some(ItemType::Lost),
        author_id: UserId::new("owner"),
        author_name: "Dueña".to_string(),
        author_email: None,
        author_photo_url: None,
        is_anonymous: false,
        created_at: now - Duration::minutes(5),
        posted_at: now - Duration::minutes(5),
        updated_at: now,
        likes: vec![],
        comments: vec![],
    }
}

fn viewer() -> Viewer {
    Viewer {
        uid: UserId::new("ana"),
        email: Some("ana@uni.edu".to_string()),
        display_name: Some("ana".to_string()),
        photo_url: None,
        email_verified: true,
    }
}

fn state(items: Vec<Item>, auth: MockAuthProvider) -> web::Data<AppState> {
    state_with_limits(items, auth, VisitorLimits::default())
}

fn state_with_limits(items: Vec<Item>, auth: MockAuthProvider, limits: VisitorLimits) -> web::Data<AppState> {
    let mut store = MockItemStore::new();
    store
        .expect_query_items_page()
        .returning(move |_, _| Ok(items.clone()));

    let ports = CatalogPorts {
        store: Arc::new(store),
        storage: Arc::new(MockObjectStorage::new()),
        moderator: Arc::new(MockContentModerator::new()),
        notifier: Arc::new(MockNotifier::new()),
        clock: Arc::new(SystemClock),
    };
    let coordinator = Arc::new(MutationCoordinator::new(ports, FeedSettings::default()));
    web::Data::new(AppState {
        sessions: SessionRegistry::with_limits(coordinator, Arc::new(auth), limits),
    })
}

fn visitor_cookie<B>(resp: &actix_web::dev::ServiceResponse<B>) -> Cookie<'static> {
    resp.response()
        .cookies()
        .find(|c| c.name() == VISITOR_COOKIE)
        .map(|c| c.into_owned())
        .expect("visitor cookie set on first visit")
}

#[actix_web::test]
async fn test_root_redirects_to_catalog() {
    let app = test::init_service(
        App::new()
            .app_data(state(vec![], MockAuthProvider::new()))
            .configure(configure_routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/catalogo");
}

#[actix_web::test]
async fn test_catalog_renders_loaded_items_and_sets_visitor_cookie() {
    let app = test::init_service(
        App::new()
            .app_data(state(vec![item("Termo")], MockAuthProvider::new()))
            .configure(configure_routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/catalogo").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    visitor_cookie(&resp);

    let body = test::read_body(resp).await;
    let html = std::str::from_utf8(&body).unwrap();
    assert!(html.contains("Termo"));
    assert!(html.contains("item-id-Termo"));
}

#[actix_web::test]
async fn test_anonymous_like_flashes_a_notice_once() {
    let app = test::init_service(
        App::new()
            .app_data(state(vec![item("Termo")], MockAuthProvider::new()))
            .configure(configure_routes),
    )
    .await;

    let first = test::call_service(&app, test::TestRequest::get().uri("/catalogo").to_request()).await;
    let cookie = visitor_cookie(&first);

    let like = test::TestRequest::post()
        .uri("/items/id-Termo/like")
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, like).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let expected = AppError::Unauthenticated.user_message();
    let page = test::TestRequest::get().uri("/catalogo").cookie(cookie.clone()).to_request();
    let body = test::read_body(test::call_service(&app, page).await).await;
    assert!(std::str::from_utf8(&body).unwrap().contains(&expected));

    let page = test::TestRequest::get().uri("/catalogo").cookie(cookie).to_request();
    let body = test::read_body(test::call_service(&app, page).await).await;
    assert!(!std::str::from_utf8(&body).unwrap().contains(&expected));
}

#[actix_web::test]
async fn test_login_binds_the_visitor_to_the_session() {
    let mut auth = MockAuthProvider::new();
    auth.expect_sign_in_with_password()
        .withf(|email, password| email == "ana@uni.edu" && password == "secreto")
        .times(1)
        .returning(|_, _| {
            Ok(AuthSession {
                token: "tok".to_string(),
                user: viewer(),
            })
        });
    auth.expect_current_user()
        .returning(|_| watch::channel(Some(viewer())).1);

    let app = test::init_service(
        App::new()
            .app_data(state(vec![], auth))
            .configure(configure_routes),
    )
    .await;

    let first = test::call_service(&app, test::TestRequest::get().uri("/auth/login").to_request()).await;
    let cookie = visitor_cookie(&first);

    let login = test::TestRequest::post()
        .uri("/auth/login")
        .cookie(cookie.clone())
        .set_form([("email", "ana@uni.edu"), ("password", "secreto")])
        .to_request();
    let resp = test::call_service(&app, login).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/catalogo");

    let page = test::TestRequest::get().uri("/catalogo").cookie(cookie).to_request();
    let body = test::read_body(test::call_service(&app, page).await).await;
    let html = std::str::from_utf8(&body).unwrap();
    assert!(html.contains("Cerrar sesión"));
    assert!(html.contains("Sesión iniciada"));
}

#[actix_web::test]
async fn test_notification_links_redirect_to_the_detail_page() {
    let app = test::init_service(
        App::new()
            .app_data(state(vec![], MockAuthProvider::new()))
            .configure(configure_routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/items/abc").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/items?id=abc");
}

#[actix_web::test]
async fn test_cookieless_clients_cannot_grow_the_registry() {
    let limits = VisitorLimits { max_visitors: 50, ..Default::default() };
    let state = state_with_limits(vec![], MockAuthProvider::new(), limits);
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure_routes)).await;

    for _ in 0..500 {
        let resp = test::call_service(&app, test::TestRequest::get().uri("/auth/login").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert!(state.sessions.len() <= 50);
}

#[actix_web::test]
async fn test_idle_visitors_are_evicted() {
    let limits = VisitorLimits { idle_ttl: StdDuration::from_secs(60), ..Default::default() };
    let state = state_with_limits(vec![], MockAuthProvider::new(), limits);
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure_routes)).await;

    let first = test::call_service(&app, test::TestRequest::get().uri("/auth/login").to_request()).await;
    let cookie = visitor_cookie(&first);
    assert_eq!(state.sessions.len(), 1);

    assert_eq!(state.sessions.evict_idle(Instant::now()), 0);
    assert_eq!(state.sessions.evict_idle(Instant::now() + StdDuration::from_secs(61)), 1);
    assert!(state.sessions.is_empty());

    // The stale cookie gets a new visitor.
    let again = test::TestRequest::get().uri("/auth/login").cookie(cookie.clone()).to_request();
    let resp = test::call_service(&app, again).await;
    assert_ne!(visitor_cookie(&resp).value(), cookie.value());
}
