use askama::Template;
use axum::response::Html;
use axum_extra::extract::cookie::CookieJar;

use penwork_db::models::PostRow;
use penwork_types::api::{ContactForm, FormErrors, PostForm, RegisterForm};
use penwork_types::models::Identity;
use penwork_types::pagination::Page;

use crate::error::AppError;
use crate::flash::{self, Flash};

pub trait TemplateExt {
    fn to_html(&self) -> Result<Html<String>, AppError>;
}

impl<T: Template> TemplateExt for T {
    fn to_html(&self) -> Result<Html<String>, AppError> {
        Ok(Html(self.render()?))
    }
}

/// Layout data shared by every page: who is logged in and pending notices.
pub struct Chrome {
    pub identity: Option<Identity>,
    pub flashes: Vec<Flash>,
}

impl Chrome {
    /// Builds the layout data, consuming any queued flash notices.
    pub fn take(jar: CookieJar, identity: Option<Identity>) -> (CookieJar, Self) {
        let (jar, flashes) = flash::take(jar);
        (jar, Chrome { identity, flashes })
    }
}

#[derive(Template)]
#[template(path = "contact.html")]
pub struct ContactPage {
    pub chrome: Chrome,
    pub form: ContactForm,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "post/index.html")]
pub struct PostIndexPage {
    pub chrome: Chrome,
    pub page: Page<PostRow>,
}

#[derive(Template)]
#[template(path = "post/form.html")]
pub struct PostFormPage {
    pub chrome: Chrome,
    pub heading: &'static str,
    pub action: String,
    pub form: PostForm,
    pub errors: FormErrors,
    /// Image kept when the edit form is submitted without a new file.
    pub current_image: Option<String>,
}

#[derive(Template)]
#[template(path = "post/show.html")]
pub struct PostShowPage {
    pub chrome: Chrome,
    pub post: PostRow,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "post/my_posts.html")]
pub struct MyPostsPage {
    pub chrome: Chrome,
    pub posts: Vec<PostRow>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterPage {
    pub chrome: Chrome,
    pub form: RegisterForm,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub chrome: Chrome,
    pub email: String,
    pub error: Option<&'static str>,
}
