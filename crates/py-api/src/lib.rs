//! # py-api
//!
//! The web routing and orchestration layer for PerdidosYa!.

pub mod error;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod sessions;

use actix_web::web;

pub use error::ApiError;
pub use handlers::AppState;
pub use sessions::{SessionRegistry, VisitorLimits};

/// Configures the catalog, item and auth routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .route("/", web::get().to(handlers::index))
            .route("/catalogo", web::get().to(handlers::catalog))
            .route("/catalogo/more", web::get().to(handlers::load_more))
            .route("/items", web::get().to(handlers::item_detail))
            .route("/items", web::post().to(handlers::save_item))
            .route("/items/{id}", web::get().to(handlers::item_permalink))
            .route("/items/{id}/like", web::post().to(handlers::toggle_like))
            .route("/items/{id}/comments", web::post().to(handlers::add_comment))
            .route(
                "/items/{id}/comments/{comment_id}/delete",
                web::post().to(handlers::delete_comment),
            )
            .route("/items/{id}/delete", web::post().to(handlers::delete_item))
            .route("/auth/login", web::get().to(handlers::login_page))
            .route("/auth/login", web::post().to(handlers::login))
            .route("/auth/signup", web::post().to(handlers::signup))
            .route("/auth/logout", web::post().to(handlers::logout))
            .route("/auth/verify/send", web::post().to(handlers::send_verification))
            .route("/auth/verify", web::get().to(handlers::confirm_email))
            .route("/auth/verify/check", web::post().to(handlers::check_verification)),
    );
}
