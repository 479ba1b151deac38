use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use penwork_types::models::{AuthLevel, Identity};

use crate::AppState;
use crate::auth::{REMEMBER_COOKIE, SESSION_COOKIE, decode_token};
use crate::error::AppError;

/// Resolve the visitor's identity from the auth cookies and stash it in the
/// request extensions. Bad or expired tokens leave the request anonymous.
pub async fn load_identity(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(identity) = identity_from_cookies(&jar, &state.settings.secret) {
        req.extensions_mut().insert(identity);
    }
    next.run(req).await
}

pub fn identity_from_cookies(jar: &CookieJar, secret: &str) -> Option<Identity> {
    let session = jar
        .get(SESSION_COOKIE)
        .and_then(|c| decode_token(secret, c.value()))
        .map(Identity::from);
    if session.is_some() {
        return session;
    }

    // Whatever the token says, a restored session is never a full login.
    jar.get(REMEMBER_COOKIE)
        .and_then(|c| decode_token(secret, c.value()))
        .map(|claims| Identity {
            level: AuthLevel::Remembered,
            ..Identity::from(claims)
        })
}

/// Gate for routes that need a password login in the current session.
pub async fn require_full_auth(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Identity>() {
        None => Err(AppError::Unauthenticated),
        Some(identity) if !identity.is_fully_authenticated() => {
            Err(AppError::NotFullyAuthenticated)
        }
        Some(_) => Ok(next.run(req).await),
    }
}

/// The identity placed by `load_identity`, if any.
pub struct CurrentUser(pub Option<Identity>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentUser(parts.extensions.get::<Identity>().cloned()))
    }
}
