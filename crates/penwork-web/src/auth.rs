use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};

use penwork_db::models::UserRow;
use penwork_types::api::{Claims, FormErrors, LoginForm, RegisterForm};
use penwork_types::models::{AuthLevel, DEFAULT_ROLES};

use crate::error::AppError;
use crate::flash::{self, Level};
use crate::middleware::CurrentUser;
use crate::views::{Chrome, LoginPage, RegisterPage, TemplateExt};
use crate::{AppState, blocking};

pub const SESSION_COOKIE: &str = "session";
pub const REMEMBER_COOKIE: &str = "remember";

/// Lifetime of the token behind the browser-session cookie.
const SESSION_HOURS: i64 = 12;
const REMEMBER_DAYS: i64 = 30;

// -- Passwords --

/// Argon2id with a random salt, encoded as a PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

// -- Tokens --

pub fn create_token(secret: &str, user: &UserRow, level: AuthLevel) -> Result<String, AppError> {
    let lifetime = match level {
        AuthLevel::Full => chrono::Duration::hours(SESSION_HOURS),
        AuthLevel::Remembered => chrono::Duration::days(REMEMBER_DAYS),
    };
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        roles: user.roles.clone(),
        level,
        exp: (chrono::Utc::now() + lifetime).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Claims of a valid, unexpired token; `None` for anything else.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

fn auth_cookie(name: &'static str, token: String, secure: bool) -> Cookie<'static> {
    let builder = Cookie::build((name, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure);
    if name == REMEMBER_COOKIE {
        builder.max_age(time::Duration::days(REMEMBER_DAYS)).build()
    } else {
        builder.build()
    }
}

// -- Registration --

pub async fn register_form(CurrentUser(identity): CurrentUser, jar: CookieJar) -> Result<Response, AppError> {
    let (jar, chrome) = Chrome::take(jar, identity);
    let page = RegisterPage {
        chrome,
        form: RegisterForm::default(),
        errors: FormErrors::new(),
    };
    Ok((jar, page.to_html()?).into_response())
}

pub async fn register(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let errors = match form.validate() {
        Ok(registration) => {
            let email = registration.email.clone();
            if blocking(&state, move |db| db.email_taken(&email)).await? {
                let mut errors = FormErrors::new();
                errors.add("email", "There is already an account with this email.");
                errors
            } else {
                let roles: Vec<String> = DEFAULT_ROLES.iter().map(|r| r.to_string()).collect();
                let user_id = blocking(&state, move |db| {
                    let hash = hash_password(&registration.password)?;
                    db.create_user(&registration.email, &hash, &roles)
                })
                .await?;

                info!("Registered user {}", user_id);
                let jar = flash::push(jar, Level::Success, "Registered User successfull");
                return Ok((jar, Redirect::to("/register")).into_response());
            }
        }
        Err(errors) => errors,
    };

    let (jar, chrome) = Chrome::take(jar, identity);
    let page = RegisterPage {
        chrome,
        form: RegisterForm {
            password: String::new(),
            ..form
        },
        errors,
    };
    Ok((StatusCode::UNPROCESSABLE_ENTITY, jar, page.to_html()?).into_response())
}

// -- Login --

pub async fn login_form(CurrentUser(identity): CurrentUser, jar: CookieJar) -> Result<Response, AppError> {
    let (jar, chrome) = Chrome::take(jar, identity);
    let page = LoginPage {
        chrome,
        email: String::new(),
        error: None,
    };
    Ok((jar, page.to_html()?).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let email = form.normalized_email();
    let password = form.password.clone();
    let user = blocking(&state, move |db| {
        let user = db.get_user_by_email(&email)?;
        Ok(user.filter(|u| verify_password(&password, &u.password)))
    })
    .await?;

    let Some(user) = user else {
        warn!("Failed login for {}", form.normalized_email());
        let (jar, chrome) = Chrome::take(jar, identity);
        let page = LoginPage {
            chrome,
            email: form.email.clone(),
            error: Some("Invalid credentials."),
        };
        return Ok((StatusCode::UNAUTHORIZED, jar, page.to_html()?).into_response());
    };

    let secret = &state.settings.secret;
    let secure = state.settings.secure_cookies;
    let session = create_token(secret, &user, AuthLevel::Full)?;
    let mut jar = jar.add(auth_cookie(SESSION_COOKIE, session, secure));
    if form.remember() {
        let remember = create_token(secret, &user, AuthLevel::Remembered)?;
        jar = jar.add(auth_cookie(REMEMBER_COOKIE, remember, secure));
    }

    info!("User {} logged in", user.id);
    Ok((jar, Redirect::to("/post")).into_response())
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar
        .remove(Cookie::build(SESSION_COOKIE).path("/"))
        .remove(Cookie::build(REMEMBER_COOKIE).path("/"));
    (jar, Redirect::to("/post"))
}
