//! Post listing, display and the create/edit workflow.
//!
//! Submitting a post runs three stages, stopping at the first failure:
//! validate the form, store the image (if any), then write the row. A
//! failed image write therefore never leaves a post behind, and an invalid
//! form never touches the disk.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use penwork_db::models::PostRow;
use penwork_types::api::{FormErrors, PostDraft, PostForm};
use penwork_types::models::Identity;
use penwork_types::pagination::{POSTS_PER_PAGE, Page, PageQuery};

use crate::error::AppError;
use crate::flash::{self, Level};
use crate::middleware::CurrentUser;
use crate::uploads::{ImageUpload, UploadError, validate_image};
use crate::views::{Chrome, MyPostsPage, PostFormPage, PostIndexPage, PostShowPage, TemplateExt};
use crate::{AppState, blocking};

const CREATE_URL: &str = "/post/create";

/// Everything the post form submits.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub form: PostForm,
    pub image: Option<ImageUpload>,
}

/// What a submission is applied to.
#[derive(Debug, Clone)]
pub enum Target {
    Create,
    Edit(PostRow),
}

impl Target {
    fn heading(&self) -> &'static str {
        match self {
            Target::Create => "Create post",
            Target::Edit(_) => "Edit post",
        }
    }

    fn action(&self) -> String {
        match self {
            Target::Create => CREATE_URL.to_string(),
            Target::Edit(post) => format!("/post/edit/{}", post.id),
        }
    }

    fn current_image(&self) -> Option<String> {
        match self {
            Target::Create => None,
            Target::Edit(post) => post.image.clone(),
        }
    }

    /// Where to go after a save, or after a submission without a logged-in owner.
    fn landing(&self) -> String {
        match self {
            Target::Create => CREATE_URL.to_string(),
            Target::Edit(post) => show_url(post.id),
        }
    }
}

/// Outcome of a post submission.
#[derive(Debug)]
pub enum Submission {
    Saved { id: i64 },
    Invalid(FormErrors),
    /// The form was valid but nobody is logged in to own the post.
    NoOwner,
    UploadFailed(UploadError),
}

fn show_url(id: i64) -> String {
    format!("/post/show/{}", id)
}

/// Checks the text fields and, when present, the image part.
pub fn validate(input: &PostInput, max_image_bytes: usize) -> Result<PostDraft, FormErrors> {
    let image_error = input
        .image
        .as_ref()
        .and_then(|image| validate_image(image, max_image_bytes).err());

    match (input.form.validate(), image_error) {
        (Ok(draft), None) => Ok(draft),
        (Ok(_), Some(message)) => {
            let mut errors = FormErrors::new();
            errors.add("image", message);
            Err(errors)
        }
        (Err(mut errors), Some(message)) => {
            errors.add("image", message);
            Err(errors)
        }
        (Err(errors), None) => Err(errors),
    }
}

/// Validate, store the image, persist.
///
/// The owner is always set to `identity`, on edits too. Editing without a
/// new image keeps the filename already on the post.
pub async fn submit(
    state: &AppState,
    target: &Target,
    identity: Option<&Identity>,
    input: &PostInput,
) -> Result<Submission, AppError> {
    let draft = match validate(input, state.settings.max_image_bytes) {
        Ok(draft) => draft,
        Err(errors) => return Ok(Submission::Invalid(errors)),
    };

    let Some(owner) = identity.map(|i| i.user_id) else {
        warn!("Post submission without a logged-in user");
        return Ok(Submission::NoOwner);
    };

    let image = match &input.image {
        Some(upload) => match state.images.store(upload).await {
            Ok(name) => Some(name),
            Err(e) => {
                warn!("Image upload failed: {}", e);
                return Ok(Submission::UploadFailed(e));
            }
        },
        None => target.current_image(),
    };

    let id = match target {
        Target::Create => {
            blocking(state, move |db| {
                db.insert_post(&draft.title, &draft.body, image.as_deref(), owner)
            })
            .await?
        }
        Target::Edit(post) => {
            let id = post.id;
            let updated = blocking(state, move |db| {
                db.update_post(id, &draft.title, &draft.body, image.as_deref(), owner)
            })
            .await?;
            if !updated {
                return Err(AppError::NotFound);
            }
            id
        }
    };

    info!("Saved post {} for user {}", id, owner);
    Ok(Submission::Saved { id })
}

/// Pulls the post form out of a multipart body. An empty file part means
/// "no new image".
pub async fn read_input(mut multipart: Multipart) -> Result<PostInput, AppError> {
    let mut input = PostInput::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "title" => input.form.title = field.text().await?,
            "body" => input.form.body = field.text().await?,
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    input.image = Some(ImageUpload { file_name, bytes });
                }
            }
            _ => {}
        }
    }

    Ok(input)
}

async fn load_post(state: &AppState, id: i64) -> Result<PostRow, AppError> {
    blocking(state, move |db| db.get_post(id))
        .await?
        .ok_or(AppError::NotFound)
}

fn form_page(chrome: Chrome, target: &Target, form: PostForm, errors: FormErrors) -> PostFormPage {
    PostFormPage {
        chrome,
        heading: target.heading(),
        action: target.action(),
        form,
        errors,
        current_image: target.current_image(),
    }
}

fn respond(
    submission: Submission,
    target: &Target,
    identity: Option<Identity>,
    jar: CookieJar,
    form: PostForm,
) -> Result<Response, AppError> {
    let response = match submission {
        Submission::Saved { .. } => {
            let jar = flash::push(jar, Level::Success, "Registered post successfully");
            (jar, Redirect::to(&target.landing())).into_response()
        }
        Submission::Invalid(errors) => {
            let (jar, chrome) = Chrome::take(jar, identity);
            let page = form_page(chrome, target, form, errors);
            (StatusCode::UNPROCESSABLE_ENTITY, jar, page.to_html()?).into_response()
        }
        Submission::NoOwner => {
            let jar = flash::push(jar, Level::Danger, "Not registered post");
            (jar, Redirect::to(&target.landing())).into_response()
        }
        // Edits land on the create form too.
        Submission::UploadFailed(e) => {
            let jar = flash::push(jar, Level::Danger, e.to_string());
            (jar, Redirect::to(CREATE_URL)).into_response()
        }
    };
    Ok(response)
}

// -- Handlers --

/// GET /post and /post-index
pub async fn index(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
    Query(query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let request = query.request(POSTS_PER_PAGE);
    let (items, total) = blocking(&state, move |db| {
        let items = db.list_posts(request.limit(), request.offset())?;
        let total = db.count_posts()?;
        Ok((items, total))
    })
    .await?;

    let (jar, chrome) = Chrome::take(jar, identity);
    let page = PostIndexPage {
        chrome,
        page: Page::new(items, total, request),
    };
    Ok((jar, page.to_html()?).into_response())
}

/// GET /post/create
pub async fn create_form(
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let (jar, chrome) = Chrome::take(jar, identity);
    let page = form_page(chrome, &Target::Create, PostForm::default(), FormErrors::new());
    Ok((jar, page.to_html()?).into_response())
}

/// POST /post/create
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let input = read_input(multipart).await?;
    let target = Target::Create;
    let submission = submit(&state, &target, identity.as_ref(), &input).await?;
    respond(submission, &target, identity, jar, input.form)
}

/// GET /post/show/{id}
pub async fn show(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let post = load_post(&state, id).await?;
    let can_edit = identity.as_ref().is_some_and(Identity::is_fully_authenticated);

    let (jar, chrome) = Chrome::take(jar, identity);
    let page = PostShowPage {
        chrome,
        post,
        can_edit,
    };
    Ok((jar, page.to_html()?).into_response())
}

/// GET /post/edit/{id}
pub async fn edit_form(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let post = load_post(&state, id).await?;
    let form = PostForm {
        title: post.title.clone(),
        body: post.body.clone(),
    };
    let target = Target::Edit(post);

    let (jar, chrome) = Chrome::take(jar, identity);
    let page = form_page(chrome, &target, form, FormErrors::new());
    Ok((jar, page.to_html()?).into_response())
}

/// POST /post/edit/{id}
pub async fn edit(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let target = Target::Edit(load_post(&state, id).await?);
    let input = read_input(multipart).await?;
    let submission = submit(&state, &target, identity.as_ref(), &input).await?;
    respond(submission, &target, identity, jar, input.form)
}

/// GET /post/my-post, empty for anonymous visitors.
pub async fn my_posts(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let posts = match identity.as_ref().map(|i| i.user_id) {
        Some(user_id) => blocking(&state, move |db| db.posts_by_user(user_id)).await?,
        None => Vec::new(),
    };

    let (jar, chrome) = Chrome::take(jar, identity);
    let page = MyPostsPage { chrome, posts };
    Ok((jar, page.to_html()?).into_response())
}
