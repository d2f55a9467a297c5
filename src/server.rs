//! HTTP server and routes.

mod extract;
mod handlers;
mod state;

pub use state::{AppState, ChapterNavigation, ChapterRef, ChapterStatus, WorkDetail};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.upload.max_body_bytes());

    let work_routes = Router::new()
        .route("/", get(handlers::list_works))
        .route("/", post(handlers::create_work).layer(body_limit))
        .route(
            "/{slug}",
            get(handlers::work_detail).delete(handlers::delete_work),
        );

    let chapter_routes = Router::new()
        .route("/", post(handlers::create_chapter).layer(body_limit))
        .route("/{id}", delete(handlers::delete_chapter))
        .route("/{id}/pages", get(handlers::chapter_pages))
        .route("/{id}/navigation", get(handlers::chapter_navigation))
        .route(
            "/{id}/comments",
            get(handlers::list_comments).post(handlers::add_comment),
        );

    let user_routes = Router::new()
        .route("/", post(handlers::create_user))
        .route("/{id}", get(handlers::get_user));

    let uploads = ServeDir::new(&state.config.storage.uploads_dir);
    let prefix = state.config.storage.url_prefix();

    let router = Router::new()
        .nest("/works", work_routes)
        .nest("/chapters", chapter_routes)
        .nest("/users", user_routes)
        .route("/genres", get(handlers::list_genres))
        .route("/tags", get(handlers::list_tags))
        .route("/titles", get(handlers::list_titles))
        .route("/bug-reports", post(handlers::create_bug_report));

    let router = if prefix.is_empty() {
        router.fallback_service(uploads)
    } else {
        router.nest_service(&prefix, uploads)
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
