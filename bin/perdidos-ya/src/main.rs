//! # PerdidosYa! Binary
//!
//! The entry point that assembles the application based on compile-time features.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use configs::Settings;
use py_api::{configure_routes, middleware, AppState, SessionRegistry, VisitorLimits};
use py_core::{AuthProvider, ContentModerator, ItemStore, Notifier, ObjectStorage, SystemClock};
use py_feed::{CatalogPorts, MutationCoordinator};

#[cfg(feature = "db-sqlite")]
use py_db_sqlite::SqliteItemStore;

#[cfg(feature = "storage-local")]
use py_storage_local::LocalObjectStorage;

#[cfg(feature = "auth-simple")]
use py_auth_simple::SimpleAuthProvider;

#[cfg(feature = "moderation-mistral")]
use py_moderation_mistral::{MistralModerator, MistralSettings};

#[cfg(feature = "notify-emailjs")]
use py_notify_emailjs::{EmailJsNotifier, EmailJsSettings};

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "db-sqlite")]
async fn item_store(settings: &Settings) -> anyhow::Result<Arc<dyn ItemStore>> {
    let store = SqliteItemStore::new(&settings.database.url)
        .await
        .with_context(|| format!("failed to open {}", settings.database.url))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "db-sqlite"))]
async fn item_store(_: &Settings) -> anyhow::Result<Arc<dyn ItemStore>> {
    anyhow::bail!("no item store compiled in; enable the `db-sqlite` feature")
}

#[cfg(feature = "storage-local")]
fn object_storage(settings: &Settings) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    Ok(Arc::new(LocalObjectStorage::new(
        settings.media.root.as_str(),
        settings.media.url_prefix.as_str(),
    )))
}

#[cfg(not(feature = "storage-local"))]
fn object_storage(_: &Settings) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    anyhow::bail!("no object storage compiled in; enable the `storage-local` feature")
}

#[cfg(feature = "auth-simple")]
fn auth_provider(settings: &Settings) -> anyhow::Result<Arc<dyn AuthProvider>> {
    Ok(Arc::new(SimpleAuthProvider::new(
        settings.auth.session_salt.expose_secret(),
        &settings.auth.allowed_email_suffix,
        &settings.feed.public_base_url,
    )))
}

#[cfg(not(feature = "auth-simple"))]
fn auth_provider(_: &Settings) -> anyhow::Result<Arc<dyn AuthProvider>> {
    anyhow::bail!("no auth provider compiled in; enable the `auth-simple` feature")
}

#[cfg(feature = "moderation-mistral")]
fn moderator(settings: &Settings) -> anyhow::Result<Arc<dyn ContentModerator>> {
    let section = &settings.moderation;
    if section.api_key.expose_secret().is_empty() {
        warn!("moderation.api_key is empty; every moderated submission will be rejected");
    }
    Ok(Arc::new(MistralModerator::new(MistralSettings {
        endpoint: section.endpoint.clone(),
        api_key: SecretString::from(section.api_key.expose_secret().to_string()),
        text_model: section.text_model.clone(),
        image_model: section.image_model.clone(),
    })))
}

#[cfg(not(feature = "moderation-mistral"))]
fn moderator(_: &Settings) -> anyhow::Result<Arc<dyn ContentModerator>> {
    anyhow::bail!("no moderator compiled in; enable the `moderation-mistral` feature")
}

#[cfg(feature = "notify-emailjs")]
fn notifier(settings: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    let section = &settings.email;
    if section.service_id.is_empty() {
        warn!("email.service_id is empty; comment notifications will fail");
    }
    Ok(Arc::new(EmailJsNotifier::new(EmailJsSettings {
        endpoint: section.endpoint.clone(),
        service_id: section.service_id.clone(),
        template_id: section.template_id.clone(),
        public_key: SecretString::from(section.public_key.expose_secret().to_string()),
        reply_to: section.reply_to.clone(),
    })))
}

#[cfg(not(feature = "notify-emailjs"))]
fn notifier(_: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    anyhow::bail!("no notifier compiled in; enable the `notify-emailjs` feature")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    init_logging(&settings);

    let ports = CatalogPorts {
        store: item_store(&settings).await?,
        storage: object_storage(&settings)?,
        moderator: moderator(&settings)?,
        notifier: notifier(&settings)?,
        clock: Arc::new(SystemClock),
    };
    let coordinator = Arc::new(MutationCoordinator::new(ports, settings.feed_settings()?));
    let state = web::Data::new(AppState {
        sessions: SessionRegistry::with_limits(
            coordinator,
            auth_provider(&settings)?,
            VisitorLimits {
                idle_ttl: settings.sessions.idle_ttl(),
                max_visitors: settings.sessions.max_visitors,
            },
        ),
    });

    let media_root = settings.media.root.clone();
    let media_prefix = settings.media.url_prefix.trim_end_matches('/').to_string();
    std::fs::create_dir_all(&media_root)
        .with_context(|| format!("failed to create media root {media_root}"))?;

    let (host, port) = settings.bind_address();
    info!(%host, port, "PerdidosYa! starting");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::standard_middleware())
            .wrap(middleware::security_headers())
            .wrap(middleware::cors_policy())
            .service(actix_files::Files::new(&media_prefix, &media_root))
            .service(actix_files::Files::new("/static", py_ui::STATIC_DIR))
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}
