//! Read-once notices carried across a redirect in the `flash` cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Danger,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: Level,
    pub message: String,
}

/// Queues a notice for the next rendered page.
pub fn push(jar: CookieJar, level: Level, message: impl Into<String>) -> CookieJar {
    let mut flashes = jar
        .get(FLASH_COOKIE)
        .map(|c| decode(c.value()))
        .unwrap_or_default();
    flashes.push(Flash {
        level,
        message: message.into(),
    });

    let cookie = Cookie::build((FLASH_COOKIE, encode(&flashes)))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    jar.add(cookie)
}

/// Removes and returns all queued notices.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<Flash>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, Vec::new());
    };
    let flashes = decode(cookie.value());
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));
    (jar, flashes)
}

fn encode(flashes: &[Flash]) -> String {
    // Serializing plain structs cannot fail.
    let json = serde_json::to_vec(flashes).unwrap_or_default();
    B64.encode(json)
}

fn decode(value: &str) -> Vec<Flash> {
    let parsed = B64
        .decode(value)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());
    if parsed.is_none() {
        debug!("Ignoring malformed flash cookie");
    }
    parsed.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_are_read_once() {
        let jar = push(CookieJar::new(), Level::Success, "Saved");
        let jar = push(jar, Level::Danger, "But also this");

        let (jar, flashes) = take(jar);
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].level, Level::Success);
        assert_eq!(flashes[1].message, "But also this");

        let (_, again) = take(jar);
        assert!(again.is_empty());
    }

    #[test]
    fn cookie_value_is_header_safe() {
        let jar = push(CookieJar::new(), Level::Danger, "Could not \"move\"; file; 100%");
        let value = jar.get(FLASH_COOKIE).unwrap().value().to_string();
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn malformed_cookie_is_ignored() {
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "%%%not-base64"));
        let (_, flashes) = take(jar);
        assert!(flashes.is_empty());
    }
}
