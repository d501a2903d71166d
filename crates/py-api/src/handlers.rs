//! # py-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the visitor's
//! catalog session. Actions follow post/redirect/get: the outcome is queued as
//! a notice and the browser is sent back to the page it came from.

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use askama::Template;
use tracing::{debug, warn};

use py_core::{AppError, CommentId, ItemId};
use py_feed::DeleteOutcome;
use py_ui::views::{CatalogParts, FeedList, ItemCard, ItemForm, NoticeView, SentinelView, ViewerView};
use py_ui::{CatalogTemplate, FeedFragment, ItemTemplate, LoginTemplate};

use crate::error::ApiError;
use crate::forms::{
    parse_tab, read_item_form, CatalogQuery, CommentForm, DeleteForm, ItemQuery, LoginForm,
    TabQuery, TokenQuery,
};
use crate::sessions::{SessionRegistry, Visit};

/// State shared across all Actix-web workers.
pub struct AppState {
    pub sessions: SessionRegistry,
}

fn html(visit: &Visit, body: String) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    if let Some(cookie) = visit.cookie() {
        builder.cookie(cookie);
    }
    builder.content_type("text/html; charset=utf-8").body(body)
}

fn redirect(visit: &Visit, location: &str) -> HttpResponse {
    let mut builder = HttpResponse::SeeOther();
    if let Some(cookie) = visit.cookie() {
        builder.cookie(cookie);
    }
    builder.insert_header((header::LOCATION, location.to_string())).finish()
}

/// Same-site path of the referring page, or the catalog.
fn back_to(req: &HttpRequest) -> String {
    req.headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|referer| {
            let rest = referer.split_once("://").map_or(referer, |(_, rest)| rest);
            rest.find('/').map(|i| rest[i..].to_string())
        })
        .filter(|path| is_local_path(path))
        .unwrap_or_else(|| "/catalogo".to_string())
}

/// Browsers read `\` as `/`, so `/\host` is as off-site as `//host`.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}

/// Queues the outcome of an action. `ok` is `None` for silent successes.
fn report<T>(state: &AppState, visit: &Visit, result: &Result<T, ApiError>, ok: Option<&str>) {
    let notice = match result {
        Ok(_) => match ok {
            Some(text) => NoticeView::info(text),
            None => return,
        },
        Err(err) => {
            debug!(visitor = %visit.id, error = %err, "action failed");
            NoticeView::error(err.user_message())
        }
    };
    state.sessions.flash(visit, notice);
}

// ── Catalog ─────────────────────────────────────────────────────────────────

pub async fn index() -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/catalogo"))
        .finish()
}

/// Applies the query's filters and renders the active tab.
pub async fn catalog(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<CatalogQuery>,
) -> Result<HttpResponse, ApiError> {
    let visit = state.sessions.resolve(&req);
    let mut notice = state.sessions.take_notice(&visit);

    if let Err(err) = visit.catalog.apply_filters(query.filter(), query.tab()).await {
        warn!(visitor = %visit.id, error = %err, "catalog load failed");
        notice = NoticeView::error(err.user_message());
    }

    let coordinator = state.sessions.coordinator();
    let settings = coordinator.settings();
    let view = visit.catalog.catalog();
    let parts = CatalogParts::build(&view, settings);

    let page = CatalogTemplate {
        title: "Catálogo - PerdidosYa!".to_string(),
        viewer: ViewerView::from_viewer(view.viewer.as_ref()),
        notice,
        search_term: parts.search_term,
        locations: parts.locations,
        dates: parts.dates,
        mine_only: parts.mine_only,
        tabs: parts.tabs,
        feed: parts.feed,
        form: ItemForm::blank(coordinator.ports().clock.now(), settings),
    };
    Ok(html(&visit, page.render()?))
}

/// The sentinel of a tab scrolled into view: load the next page and return
/// the tab's list.
pub async fn load_more(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<TabQuery>,
) -> Result<HttpResponse, ApiError> {
    let visit = state.sessions.resolve(&req);
    let tab = parse_tab(query.tab.as_deref());

    let loaded = if visit.catalog.is_entered() {
        visit.catalog.load_more(tab).await
    } else {
        visit.catalog.enter().await
    };
    if let Err(err) = loaded {
        warn!(visitor = %visit.id, tab = tab.as_str(), error = %err, "next page failed");
    }

    let settings = state.sessions.coordinator().settings();
    let view = visit.catalog.catalog();
    let feed = match view.tabs.iter().find(|t| t.tab == tab) {
        Some(tab_view) => FeedList::build(tab_view, view.viewer.as_ref(), settings),
        None => FeedList {
            tab: tab.as_str().to_string(),
            cards: Vec::new(),
            empty: true,
            sentinel: SentinelView::default(),
        },
    };
    Ok(html(&visit, FeedFragment { feed }.render()?))
}

// ── Items ───────────────────────────────────────────────────────────────────

pub async fn item_detail(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ItemQuery>,
) -> Result<HttpResponse, ApiError> {
    let visit = state.sessions.resolve(&req);
    let item = match visit.catalog.item(&ItemId::new(query.id.as_str())).await {
        Ok(item) => item,
        Err(err) => {
            report::<()>(&state, &visit, &Err(err.into()), None);
            return Ok(redirect(&visit, "/catalogo"));
        }
    };

    let coordinator = state.sessions.coordinator();
    let settings = coordinator.settings();
    let viewer = visit.viewer();
    let share = visit.catalog.share(&item);

    let page = ItemTemplate {
        title: share.title.clone(),
        viewer: ViewerView::from_viewer(viewer.as_ref()),
        notice: state.sessions.take_notice(&visit),
        card: ItemCard::build(&item, viewer.as_ref(), settings),
        share_title: share.title,
        share_text: share.text,
        share_url: share.url,
        form: ItemForm::for_item(&item, coordinator.ports().clock.now(), settings),
    };
    Ok(html(&visit, page.render()?))
}

/// Link format used in notification e-mails.
pub async fn item_permalink(path: web::Path<String>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, format!("/items?id={}", path.into_inner())))
        .finish()
}

/// Creates or updates an item from the multipart form.
pub async fn save_item(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let coordinator = state.sessions.coordinator();
    let settings = coordinator.settings();

    let result = async {
        let form = read_item_form(payload, settings.max_image_bytes).await?;
        let (draft, image) = form.into_parts(coordinator.ports().clock.now(), settings)?;
        let creating = draft.id.is_none();
        let item = visit.catalog.save_item(draft, image).await?;
        Ok::<_, ApiError>((item, creating))
    }
    .await;

    match &result {
        Ok((_, true)) => report(&state, &visit, &result, Some("¡Objeto publicado!")),
        Ok((_, false)) => report(&state, &visit, &result, Some("Publicación actualizada")),
        Err(_) => report(&state, &visit, &result, None),
    }
    match result {
        Ok((item, false)) => redirect(&visit, &format!("/items?id={}", item.id)),
        Ok((_, true)) => redirect(&visit, "/catalogo"),
        Err(_) => redirect(&visit, &back_to(&req)),
    }
}

pub async fn toggle_like(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let item_id = ItemId::new(path.into_inner());
    let result = visit.catalog.toggle_like(&item_id).await.map_err(ApiError::from);
    report(&state, &visit, &result, None);
    redirect(&visit, &back_to(&req))
}

pub async fn add_comment(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    form: web::Form<CommentForm>,
) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let item_id = ItemId::new(path.into_inner());
    let result = visit
        .catalog
        .add_comment(&item_id, &form.text, form.is_anonymous())
        .await
        .map_err(ApiError::from);
    report(&state, &visit, &result, Some("Comentario publicado"));
    redirect(&visit, &back_to(&req))
}

pub async fn delete_comment(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let (item_id, comment_id) = path.into_inner();
    let result = visit
        .catalog
        .delete_comment(&ItemId::new(item_id), &CommentId::new(comment_id))
        .await
        .map_err(ApiError::from);
    report(&state, &visit, &result, Some("Comentario eliminado"));
    redirect(&visit, &back_to(&req))
}

pub async fn delete_item(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    form: web::Form<DeleteForm>,
) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let item_id = ItemId::new(path.into_inner());
    let result = visit
        .catalog
        .delete_item(&item_id, form.confirmation())
        .await
        .map_err(ApiError::from);

    match result {
        Ok(DeleteOutcome::Deleted) => {
            report(&state, &visit, &result, Some("Publicación eliminada"));
            redirect(&visit, "/catalogo")
        }
        Ok(DeleteOutcome::Cancelled) => redirect(&visit, &back_to(&req)),
        Err(_) => {
            report(&state, &visit, &result, None);
            redirect(&visit, &back_to(&req))
        }
    }
}

// ── Auth ────────────────────────────────────────────────────────────────────

pub async fn login_page(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let visit = state.sessions.resolve(&req);
    let viewer = visit.viewer();
    let page = LoginTemplate {
        title: "Iniciar sesión - PerdidosYa!".to_string(),
        email: viewer.as_ref().and_then(|v| v.email.clone()).unwrap_or_default(),
        viewer: ViewerView::from_viewer(viewer.as_ref()),
        notice: state.sessions.take_notice(&visit),
    };
    Ok(html(&visit, page.render()?))
}

pub async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<LoginForm>,
) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let result = state
        .sessions
        .auth()
        .sign_in_with_password(&form.email, &form.password)
        .await
        .map_err(ApiError::from);

    match &result {
        Ok(session) => {
            state.sessions.sign_in(&visit, session);
            let text = if session.user.email_verified {
                "Sesión iniciada"
            } else {
                "Sesión iniciada. Verifica tu correo para publicar, comentar y dar me gusta"
            };
            report(&state, &visit, &result, Some(text));
            redirect(&visit, "/catalogo")
        }
        Err(_) => {
            report(&state, &visit, &result, None);
            redirect(&visit, "/auth/login")
        }
    }
}

pub async fn signup(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<LoginForm>,
) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let result = state
        .sessions
        .auth()
        .sign_up_with_password(&form.email, &form.password)
        .await
        .map_err(ApiError::from);

    match &result {
        Ok(session) => {
            state.sessions.sign_in(&visit, session);
            report(
                &state,
                &visit,
                &result,
                Some("Cuenta creada. Te enviamos un correo de verificación"),
            );
            redirect(&visit, "/catalogo")
        }
        Err(_) => {
            report(&state, &visit, &result, None);
            redirect(&visit, "/auth/login")
        }
    }
}

pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    if let Some(token) = state.sessions.sign_out(&visit) {
        state.sessions.auth().sign_out(&token).await;
    }
    report::<()>(&state, &visit, &Ok(()), Some("Sesión cerrada"));
    redirect(&visit, "/catalogo")
}

pub async fn send_verification(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let result = match visit.viewer() {
        Some(viewer) => {
            if state.sessions.auth().send_verification_email(&viewer.uid).await {
                Ok(())
            } else {
                Err(ApiError::Form("No se pudo enviar el correo de verificación".to_string()))
            }
        }
        None => Err(AppError::Unauthenticated.into()),
    };
    report(&state, &visit, &result, Some("Te enviamos un correo de verificación"));
    redirect(&visit, &back_to(&req))
}

pub async fn confirm_email(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<TokenQuery>,
) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let auth = state.sessions.auth();
    let result = if auth.confirm_email(&query.token).await {
        if let Some(viewer) = visit.viewer() {
            auth.reload_and_check_verified(&viewer.uid).await;
        }
        Ok(())
    } else {
        Err(ApiError::Form("El enlace de verificación no es válido o ya fue usado".to_string()))
    };
    report(&state, &visit, &result, Some("Correo verificado"));
    redirect(&visit, "/catalogo")
}

pub async fn check_verification(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let visit = state.sessions.resolve(&req);
    let result = match visit.viewer() {
        Some(viewer) => {
            if state.sessions.auth().reload_and_check_verified(&viewer.uid).await {
                Ok(())
            } else {
                Err(AppError::EmailNotVerified.into())
            }
        }
        None => Err(AppError::Unauthenticated.into()),
    };
    report(&state, &visit, &result, Some("Correo verificado"));
    redirect(&visit, &back_to(&req))
}
