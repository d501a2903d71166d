//! Per-visitor catalog sessions.
//!
//! Every browser gets a visitor cookie. The registry maps it to the
//! visitor's `CatalogSession`, the auth token behind it (if signed in) and a
//! pending notice that is shown once. Visitors idle past the TTL are
//! dropped, and the registry never holds more than `max_visitors`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::cookie::{Cookie, SameSite};
use actix_web::HttpRequest;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use py_core::{AuthProvider, AuthSession, Viewer};
use py_feed::{CatalogSession, MutationCoordinator};
use py_ui::NoticeView;

pub const VISITOR_COOKIE: &str = "py_visitor";

#[derive(Debug, Clone, Copy)]
pub struct VisitorLimits {
    pub idle_ttl: Duration,
    pub max_visitors: usize,
}

impl Default for VisitorLimits {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(30 * 60),
            max_visitors: 10_000,
        }
    }
}

struct Visitor {
    catalog: Arc<CatalogSession>,
    auth_token: Option<String>,
    notice: Option<NoticeView>,
    last_seen: Instant,
}

/// The resolved visitor of one request.
pub struct Visit {
    pub id: String,
    pub catalog: Arc<CatalogSession>,
    fresh: bool,
}

impl Visit {
    pub fn viewer(&self) -> Option<Viewer> {
        self.catalog.viewer()
    }

    /// The cookie to set when this visitor was created by the request.
    pub fn cookie(&self) -> Option<Cookie<'static>> {
        self.fresh.then(|| {
            Cookie::build(VISITOR_COOKIE, self.id.clone())
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .finish()
        })
    }
}

pub struct SessionRegistry {
    coordinator: Arc<MutationCoordinator>,
    auth: Arc<dyn AuthProvider>,
    limits: VisitorLimits,
    visitors: DashMap<String, Visitor>,
}

fn signed_out() -> watch::Receiver<Option<Viewer>> {
    watch::channel(None).1
}

impl SessionRegistry {
    pub fn new(coordinator: Arc<MutationCoordinator>, auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_limits(coordinator, auth, VisitorLimits::default())
    }

    pub fn with_limits(
        coordinator: Arc<MutationCoordinator>,
        auth: Arc<dyn AuthProvider>,
        limits: VisitorLimits,
    ) -> Self {
        Self {
            coordinator,
            auth,
            limits,
            visitors: DashMap::new(),
        }
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn auth(&self) -> &dyn AuthProvider {
        self.auth.as_ref()
    }

    fn anonymous(&self) -> Visitor {
        Visitor {
            catalog: Arc::new(CatalogSession::new(Arc::clone(&self.coordinator), signed_out())),
            auth_token: None,
            notice: None,
            last_seen: Instant::now(),
        }
    }

    fn is_idle(&self, visitor: &Visitor, now: Instant) -> bool {
        now.saturating_duration_since(visitor.last_seen) >= self.limits.idle_ttl
    }

    /// Marks a known, live visitor as seen. Idle visitors are dropped.
    fn touch(&self, id: &str, now: Instant) -> Option<Arc<CatalogSession>> {
        let mut visitor = self.visitors.get_mut(id)?;
        if self.is_idle(&visitor, now) {
            drop(visitor);
            self.visitors.remove(id);
            return None;
        }
        visitor.last_seen = now;
        Some(Arc::clone(&visitor.catalog))
    }

    /// Removes every visitor idle at `now`; returns how many went away.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.visitors.len();
        self.visitors.retain(|_, visitor| !self.is_idle(visitor, now));
        let evicted = before.saturating_sub(self.visitors.len());
        if evicted > 0 {
            debug!(evicted, "idle visitors evicted");
        }
        evicted
    }

    /// Frees a slot for a new visitor: idle ones first, then the least
    /// recently seen.
    fn make_room(&self, now: Instant) {
        if self.visitors.len() < self.limits.max_visitors {
            return;
        }
        self.evict_idle(now);
        while self.visitors.len() >= self.limits.max_visitors.max(1) {
            let oldest = self
                .visitors
                .iter()
                .min_by_key(|entry| entry.last_seen)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(id) => {
                    self.visitors.remove(&id);
                    debug!(visitor = %id, "registry full, oldest visitor evicted");
                }
                None => break,
            }
        }
    }

    /// Looks the visitor up by cookie, creating one when the cookie is
    /// missing, unknown (e.g. after a restart) or expired.
    pub fn resolve(&self, req: &HttpRequest) -> Visit {
        let now = Instant::now();
        if let Some(cookie) = req.cookie(VISITOR_COOKIE) {
            if let Some(catalog) = self.touch(cookie.value(), now) {
                return Visit {
                    id: cookie.value().to_string(),
                    catalog,
                    fresh: false,
                };
            }
        }

        self.make_room(now);
        let id = Uuid::new_v4().to_string();
        let visitor = self.anonymous();
        let catalog = Arc::clone(&visitor.catalog);
        self.visitors.insert(id.clone(), visitor);
        debug!(visitor = %id, "new visitor");
        Visit { id, catalog, fresh: true }
    }

    /// Binds the visitor to a signed-in session. The catalog is rebuilt on
    /// the session's identity channel.
    pub fn sign_in(&self, visit: &Visit, session: &AuthSession) {
        let catalog = Arc::new(CatalogSession::new(
            Arc::clone(&self.coordinator),
            self.auth.current_user(&session.token),
        ));
        let notice = self.visitors.remove(&visit.id).and_then(|(_, v)| v.notice);
        self.visitors.insert(
            visit.id.clone(),
            Visitor {
                catalog,
                auth_token: Some(session.token.clone()),
                notice,
                last_seen: Instant::now(),
            },
        );
    }

    /// Detaches the visitor from its session and returns the auth token it held.
    pub fn sign_out(&self, visit: &Visit) -> Option<String> {
        let previous = self.visitors.remove(&visit.id).map(|(_, v)| v);
        visit.catalog.leave();
        self.visitors.insert(visit.id.clone(), self.anonymous());
        previous.and_then(|v| v.auth_token)
    }

    pub fn flash(&self, visit: &Visit, notice: NoticeView) {
        if let Some(mut visitor) = self.visitors.get_mut(&visit.id) {
            visitor.notice = Some(notice);
        }
    }

    /// The pending notice, cleared by reading it.
    pub fn take_notice(&self, visit: &Visit) -> NoticeView {
        self.visitors
            .get_mut(&visit.id)
            .and_then(|mut visitor| visitor.notice.take())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }
}
