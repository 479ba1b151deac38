use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::info;

use penwork_types::api::{ContactForm, FormErrors};

use crate::error::AppError;
use crate::flash::{self, Level};
use crate::middleware::CurrentUser;
use crate::views::{Chrome, ContactPage, TemplateExt};
use crate::{AppState, blocking};

/// GET /contact
pub async fn form(CurrentUser(identity): CurrentUser, jar: CookieJar) -> Result<Response, AppError> {
    let (jar, chrome) = Chrome::take(jar, identity);
    let page = ContactPage {
        chrome,
        form: ContactForm::default(),
        errors: FormErrors::new(),
    };
    Ok((jar, page.to_html()?).into_response())
}

/// POST /contact: stores the message, or shows the form again with errors.
pub async fn submit(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
    Form(form): Form<ContactForm>,
) -> Result<Response, AppError> {
    let errors = match form.validate() {
        Ok(contact) => {
            let id = blocking(&state, move |db| db.insert_contact(&contact)).await?;
            info!("Stored contact message {}", id);

            let jar = flash::push(jar, Level::Success, "Registrered contact successfully");
            return Ok((jar, Redirect::to("/contact")).into_response());
        }
        Err(errors) => errors,
    };

    let (jar, chrome) = Chrome::take(jar, identity);
    let page = ContactPage {
        chrome,
        form,
        errors,
    };
    Ok((StatusCode::UNPROCESSABLE_ENTITY, jar, page.to_html()?).into_response())
}
