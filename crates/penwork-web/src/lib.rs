//! HTTP layer for Penwork.
//!
//! Routes:
//! * `/contact` - contact form
//! * `/post`, `/post-index` - paginated post listing (`?page=`)
//! * `/post/create` - new post (full login required)
//! * `/post/show/{id}` - a single post
//! * `/post/edit/{id}` - edit a post (full login required)
//! * `/post/my-post` - posts owned by the current user
//! * `/register`, `/login`, `/logout` - accounts and sessions
//! * `/images/{file}` - uploaded post images

pub mod auth;
pub mod contact;
pub mod error;
pub mod flash;
pub mod middleware;
pub mod posts;
pub mod uploads;
pub mod views;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    response::Redirect,
    routing::get,
};
use tower_http::services::ServeDir;

use penwork_db::Database;

use crate::error::AppError;
use crate::uploads::ImageStore;

/// Room left in the request body for the text fields next to an image.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub images: ImageStore,
    pub settings: Settings,
}

/// Runtime knobs the handlers need.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HMAC secret for session tokens.
    pub secret: String,
    /// Mark auth cookies `Secure`.
    pub secure_cookies: bool,
    pub max_image_bytes: usize,
}

/// Runs a blocking database closure off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    let result = tokio::task::spawn_blocking(move || f(&state.db)).await?;
    result.map_err(AppError::from)
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/post/create", get(posts::create_form).post(posts::create))
        .route("/post/edit/{id}", get(posts::edit_form).post(posts::edit))
        .route_layer(from_fn(middleware::require_full_auth));

    let public = Router::new()
        .route("/", get(|| async { Redirect::to("/post") }))
        .route("/contact", get(contact::form).post(contact::submit))
        .route("/post", get(posts::index))
        .route("/post-index", get(posts::index))
        .route("/post/show/{id}", get(posts::show))
        .route("/post/my-post", get(posts::my_posts))
        .route("/register", get(auth::register_form).post(auth::register))
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/logout", get(auth::logout));

    let images = ServeDir::new(state.images.dir());
    let body_limit = state.settings.max_image_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .merge(protected)
        .merge(public)
        .nest_service("/images", images)
        .fallback(|| async { AppError::NotFound })
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn_with_state(state.clone(), middleware::load_identity))
        .with_state(state)
}
