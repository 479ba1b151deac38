use askama::Template;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("You must log in to access this page.")]
    Unauthenticated,
    #[error("Please log in again with your password to access this page.")]
    NotFullyAuthenticated,
    #[error("Page not found.")]
    NotFound,
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::NotFullyAuthenticated => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Multipart(e) => e.status(),
            AppError::Database(_)
            | AppError::Template(_)
            | AppError::Task(_)
            | AppError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show to the visitor.
    fn public_message(&self) -> String {
        match self {
            AppError::Multipart(e) => e.body_text(),
            e if e.status().is_server_error() => "Something went wrong.".to_string(),
            e => e.to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorPage {
    status: u16,
    reason: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let page = ErrorPage {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Error"),
            message: self.public_message(),
        };
        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                error!("Failed to render error page: {}", e);
                (status, page.message).into_response()
            }
        }
    }
}
