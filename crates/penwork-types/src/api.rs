use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AuthLevel, Identity};

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 180;
pub const MIN_PASSWORD_LEN: usize = 8;

// -- Session claims --

/// Claims carried by the `session` and `remember` cookies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub roles: Vec<String>,
    pub level: AuthLevel,
    pub exp: usize,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            user_id: claims.sub,
            email: claims.email,
            roles: claims.roles,
            level: claims.level,
        }
    }
}

// -- Validation errors --

/// Field-level validation messages, keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{} invalid field(s)", .fields.len())]
pub struct FormErrors {
    fields: BTreeMap<&'static str, String>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for `field`. The first message recorded for a field wins.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Ok(value) when nothing was recorded, otherwise the collected errors.
    pub fn finish<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

fn require(errors: &mut FormErrors, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This value should not be blank.");
    }
}

fn max_len(errors: &mut FormErrors, field: &'static str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(
            field,
            format!("This value is too long. It should have {max} characters or less."),
        );
    }
}

fn check_email(errors: &mut FormErrors, field: &'static str, value: &str) {
    require(errors, field, value);
    max_len(errors, field, value, MAX_EMAIL_LEN);
    if !value.trim().is_empty() && !is_plausible_email(value.trim()) {
        errors.add(field, "This value is not a valid email address.");
    }
}

/// Loose address check: one `@`, non-empty local part, dotted domain, no whitespace.
pub fn is_plausible_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

// -- Contact --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<NewContact, FormErrors> {
        let mut errors = FormErrors::new();
        require(&mut errors, "name", &self.name);
        max_len(&mut errors, "name", &self.name, MAX_NAME_LEN);
        check_email(&mut errors, "email", &self.email);
        require(&mut errors, "message", &self.message);

        errors.finish(NewContact {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            message: self.message.clone(),
        })
    }
}

// -- Posts --

/// Text fields of the post form. The optional image travels separately
/// because it arrives as a multipart file part.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
}

impl PostForm {
    pub fn validate(&self) -> Result<PostDraft, FormErrors> {
        let mut errors = FormErrors::new();
        require(&mut errors, "title", &self.title);
        max_len(&mut errors, "title", self.title.trim(), MAX_TITLE_LEN);
        require(&mut errors, "body", &self.body);

        errors.finish(PostDraft {
            title: self.title.trim().to_string(),
            body: self.body.clone(),
        })
    }
}

// -- Registration --

/// NOTE: holds the raw password until it is hashed.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for RegisterForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterForm")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A validated registration, still carrying the plaintext password.
pub struct Registration {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl RegisterForm {
    pub fn validate(&self) -> Result<Registration, FormErrors> {
        let mut errors = FormErrors::new();
        check_email(&mut errors, "email", &self.email);
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Your password should be at least {MIN_PASSWORD_LEN} characters."),
            );
        }

        errors.finish(Registration {
            email: self.email.trim().to_lowercase(),
            password: self.password.clone(),
        })
    }
}

// -- Login --

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    /// Checkbox; present (with any value) when ticked.
    pub remember_me: Option<String>,
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        self.remember_me.is_some()
    }

    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}
