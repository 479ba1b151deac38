use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use penwork_db::Database;
use penwork_types::models::AuthLevel;
use penwork_web::auth::{REMEMBER_COOKIE, SESSION_COOKIE, create_token};
use penwork_web::uploads::ImageStore;
use penwork_web::{AppState, AppStateInner, Settings, router};

const SECRET: &str = "integration-secret";
const BOUNDARY: &str = "penwork-test-boundary";

struct TestApp {
    app: Router,
    state: AppState,
    user_id: i64,
    _dir: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let user_id = db
            .create_user("writer@example.com", "not-a-real-hash", &["bloggers".to_string()])
            .unwrap();
        let images = ImageStore::new(dir.path().join("images")).await.unwrap();
        let state = Arc::new(AppStateInner {
            db,
            images,
            settings: Settings {
                secret: SECRET.into(),
                secure_cookies: false,
                max_image_bytes: 1024,
            },
        });
        TestApp {
            app: router(state.clone()),
            state,
            user_id,
            _dir: dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    fn cookie(&self, name: &str, level: AuthLevel) -> String {
        let user = self
            .state
            .db
            .get_user_by_email("writer@example.com")
            .unwrap()
            .unwrap();
        format!("{}={}", name, create_token(SECRET, &user, level).unwrap())
    }

    fn session(&self) -> String {
        self.cookie(SESSION_COOKIE, AuthLevel::Full)
    }

    /// `(name, message)` of every stored contact message.
    fn contacts(&self) -> Vec<(String, String)> {
        self.state
            .db
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT name, message FROM contacts ORDER BY id")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .unwrap()
    }

    fn stored_images(&self) -> usize {
        std::fs::read_dir(self.state.images.dir()).unwrap().count()
    }
}

struct Part<'a> {
    name: &'a str,
    file: Option<(&'a str, &'a str)>,
    data: &'a [u8],
}

fn text(name: &'static str, value: &'static str) -> Part<'static> {
    Part {
        name,
        file: None,
        data: value.as_bytes(),
    }
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part.file {
            Some((file_name, content_type)) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    part.name, file_name, content_type
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name).as_bytes(),
            ),
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_post(uri: &str, cookie: Option<&str>, parts: &[Part<'_>]) -> Request<Body> {
    let mut builder = Request::post(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

fn form_post(uri: &str, body: &'static str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(res: &Response) -> &str {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `name=value` of a cookie set by the response.
fn set_cookie(res: &Response, name: &str) -> Option<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(str::to_owned)
}

async fn body_text(res: Response) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn png(len: usize) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.resize(len, 0);
    data
}

#[tokio::test]
async fn contact_message_is_stored_and_flashed() {
    let t = TestApp::new().await;

    let res = t
        .send(form_post(
            "/contact",
            "name=Ada&email=ada%40example.com&message=Hello+there",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/contact");

    assert_eq!(
        t.contacts(),
        vec![("Ada".to_string(), "Hello there".to_string())]
    );

    let flash = set_cookie(&res, "flash").unwrap();
    let res = t.send(get("/contact", Some(&flash))).await;
    // Shown once: the page clears the cookie it rendered from.
    assert_eq!(set_cookie(&res, "flash").as_deref(), Some("flash="));
    let page = body_text(res).await;
    assert!(page.contains("Registrered contact successfully"));
}

#[tokio::test]
async fn invalid_contact_is_rerendered() {
    let t = TestApp::new().await;

    let res = t
        .send(form_post("/contact", "name=Ada&email=not-an-email&message=Hi"))
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let page = body_text(res).await;
    assert!(page.contains("This value is not a valid email address."));
    assert!(page.contains("value=\"Ada\""));
    assert!(t.contacts().is_empty());
}

#[tokio::test]
async fn anonymous_create_is_rejected() {
    let t = TestApp::new().await;

    let res = t.send(get("/post/create", None)).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = t
        .send(multipart_post(
            "/post/create",
            None,
            &[text("title", "Hello"), text("body", "World")],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(t.state.db.count_posts().unwrap(), 0);
}

#[tokio::test]
async fn remembered_session_cannot_create() {
    let t = TestApp::new().await;
    let cookie = t.cookie(REMEMBER_COOKIE, AuthLevel::Remembered);

    let res = t
        .send(multipart_post(
            "/post/create",
            Some(&cookie),
            &[text("title", "Hello"), text("body", "World")],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(t.state.db.count_posts().unwrap(), 0);

    // Reading is still open to them.
    let res = t.send(get("/post", Some(&cookie))).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_without_image() {
    let t = TestApp::new().await;
    let session = t.session();

    let res = t
        .send(multipart_post(
            "/post/create",
            Some(&session),
            &[
                text("title", "Plain post"),
                text("body", "No picture here"),
                Part {
                    name: "image",
                    file: Some(("", "application/octet-stream")),
                    data: b"",
                },
            ],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/post/create");

    let posts = t.state.db.posts_by_user(t.user_id).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Plain post");
    assert!(posts[0].image.is_none());

    let flash = set_cookie(&res, "flash").unwrap();
    let page = body_text(t.send(get("/post/my-post", Some(&format!("{session}; {flash}")))).await).await;
    assert!(page.contains("Registered post successfully"));
    assert!(page.contains("Plain post"));
}

#[tokio::test]
async fn create_with_image_uses_unique_name() {
    let t = TestApp::new().await;
    let session = t.session();
    let data = png(64);

    let post = |title: &'static str| {
        multipart_post(
            "/post/create",
            Some(&session),
            &[
                text("title", title),
                text("body", "Body"),
                Part {
                    name: "image",
                    file: Some(("photo.png", "image/png")),
                    data: &data,
                },
            ],
        )
    };
    assert_eq!(t.send(post("One")).await.status(), StatusCode::SEE_OTHER);
    assert_eq!(t.send(post("Two")).await.status(), StatusCode::SEE_OTHER);

    let posts = t.state.db.posts_by_user(t.user_id).unwrap();
    let names: Vec<String> = posts.iter().filter_map(|p| p.image.clone()).collect();
    assert_eq!(names.len(), 2);
    assert_ne!(names[0], names[1]);
    for name in &names {
        assert!(name.starts_with("photo-"), "{name}");
        assert!(name.ends_with(".png"));
        assert_ne!(name, "photo.png");
    }

    let res = t.send(get(&format!("/images/{}", names[0]), None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let served = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(served.to_vec(), data);
}

#[tokio::test]
async fn invalid_post_is_rerendered_without_saving() {
    let t = TestApp::new().await;
    let session = t.session();

    let res = t
        .send(multipart_post(
            "/post/create",
            Some(&session),
            &[
                text("title", ""),
                text("body", "Kept body"),
                Part {
                    name: "image",
                    file: Some(("big.png", "image/png")),
                    data: &png(2048),
                },
            ],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let page = body_text(res).await;
    assert!(page.contains("This value should not be blank."));
    assert!(page.contains("too large"));
    assert!(page.contains("Kept body"));

    assert_eq!(t.state.db.count_posts().unwrap(), 0);
    assert_eq!(t.stored_images(), 0);
}

#[tokio::test]
async fn markup_disguised_as_an_image_is_rejected() {
    let t = TestApp::new().await;
    let session = t.session();

    let res = t
        .send(multipart_post(
            "/post/create",
            Some(&session),
            &[
                text("title", "Sneaky"),
                text("body", "Body"),
                Part {
                    name: "image",
                    file: Some(("evil.html", "image/x-anything")),
                    data: b"<script>alert(document.cookie)</script>",
                },
            ],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(res).await.contains("Please upload a valid image"));
    assert_eq!(t.state.db.count_posts().unwrap(), 0);
    assert_eq!(t.stored_images(), 0);

    let svg = t
        .send(multipart_post(
            "/post/create",
            Some(&session),
            &[
                text("title", "Vector"),
                text("body", "Body"),
                Part {
                    name: "image",
                    file: Some(("logo.svg", "image/svg+xml")),
                    data: b"<svg xmlns=\"http://www.w3.org/2000/svg\"><script>alert(1)</script></svg>",
                },
            ],
        ))
        .await;
    assert_eq!(svg.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(t.stored_images(), 0);
}

#[tokio::test]
async fn stored_extension_comes_from_the_content() {
    let t = TestApp::new().await;
    let session = t.session();

    let res = t
        .send(multipart_post(
            "/post/create",
            Some(&session),
            &[
                text("title", "Renamed"),
                text("body", "Body"),
                Part {
                    name: "image",
                    file: Some(("page.html", "text/html")),
                    data: &png(32),
                },
            ],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let posts = t.state.db.posts_by_user(t.user_id).unwrap();
    let name = posts[0].image.clone().unwrap();
    assert!(name.starts_with("page-"), "{name}");
    assert!(name.ends_with(".png"), "{name}");

    let served = t.send(get(&format!("/images/{name}"), None)).await;
    assert_eq!(served.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn edit_without_new_image_keeps_the_old_one() {
    let t = TestApp::new().await;
    let session = t.session();
    let id = t
        .state
        .db
        .insert_post("Before", "Body", Some("kept-abc.png"), t.user_id)
        .unwrap();

    let form = body_text(t.send(get(&format!("/post/edit/{id}"), Some(&session))).await).await;
    assert!(form.contains("value=\"Before\""));
    assert!(form.contains("kept-abc.png"));

    let res = t
        .send(multipart_post(
            &format!("/post/edit/{id}"),
            Some(&session),
            &[text("title", "After"), text("body", "New body")],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("/post/show/{id}"));

    let post = t.state.db.get_post(id).unwrap().unwrap();
    assert_eq!(post.title, "After");
    assert_eq!(post.image.as_deref(), Some("kept-abc.png"));
}

#[tokio::test]
async fn edit_requires_a_full_login() {
    let t = TestApp::new().await;
    let id = t
        .state
        .db
        .insert_post("Original", "Body", Some("kept-abc.png"), t.user_id)
        .unwrap();
    let edit = |cookie: Option<&str>| {
        multipart_post(
            &format!("/post/edit/{id}"),
            cookie,
            &[text("title", "Hijacked"), text("body", "Changed")],
        )
    };

    assert_eq!(t.send(edit(None)).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        t.send(get(&format!("/post/edit/{id}"), None)).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let remembered = t.cookie(REMEMBER_COOKIE, AuthLevel::Remembered);
    assert_eq!(
        t.send(edit(Some(&remembered))).await.status(),
        StatusCode::FORBIDDEN
    );

    let post = t.state.db.get_post(id).unwrap().unwrap();
    assert_eq!(post.title, "Original");
    assert_eq!(post.body, "Body");
    assert_eq!(post.image.as_deref(), Some("kept-abc.png"));
}

#[tokio::test]
async fn edit_with_new_image_replaces_the_filename() {
    let t = TestApp::new().await;
    let session = t.session();
    let id = t
        .state
        .db
        .insert_post("Before", "Body", Some("old-abc.png"), t.user_id)
        .unwrap();

    let res = t
        .send(multipart_post(
            &format!("/post/edit/{id}"),
            Some(&session),
            &[
                text("title", "After"),
                text("body", "Body"),
                Part {
                    name: "image",
                    file: Some(("fresh.png", "image/png")),
                    data: &png(48),
                },
            ],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), format!("/post/show/{id}"));

    let image = t.state.db.get_post(id).unwrap().unwrap().image.unwrap();
    assert_ne!(image, "old-abc.png");
    assert!(image.starts_with("fresh-"), "{image}");
    assert!(t.state.images.path_of(&image).exists());
}

#[tokio::test]
async fn failed_edit_upload_lands_on_the_create_form() {
    let t = TestApp::new().await;
    let session = t.session();
    let id = t
        .state
        .db
        .insert_post("Before", "Body", Some("old-abc.png"), t.user_id)
        .unwrap();

    // Replace the images directory with a plain file so the write fails.
    let images = t.state.images.dir().to_path_buf();
    std::fs::remove_dir(&images).unwrap();
    std::fs::write(&images, b"not a directory").unwrap();

    let res = t
        .send(multipart_post(
            &format!("/post/edit/{id}"),
            Some(&session),
            &[
                text("title", "After"),
                text("body", "Body"),
                Part {
                    name: "image",
                    file: Some(("fresh.png", "image/png")),
                    data: &png(48),
                },
            ],
        ))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/post/create");

    let flash = set_cookie(&res, "flash").unwrap();
    let page = body_text(t.send(get("/post", Some(&flash))).await).await;
    assert!(page.contains("Could not store the file"));

    let post = t.state.db.get_post(id).unwrap().unwrap();
    assert_eq!(post.title, "Before");
    assert_eq!(post.image.as_deref(), Some("old-abc.png"));
}

#[tokio::test]
async fn missing_posts_are_not_found() {
    let t = TestApp::new().await;
    let session = t.session();

    assert_eq!(t.send(get("/post/show/999", None)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        t.send(get("/post/edit/999", Some(&session))).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(t.send(get("/nowhere", None)).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_is_paginated_newest_first() {
    let t = TestApp::new().await;
    for n in 1..=7 {
        t.state
            .db
            .insert_post(&format!("Post {n}"), "Body", None, t.user_id)
            .unwrap();
    }

    let first = body_text(t.send(get("/post", None)).await).await;
    assert!(first.contains(">Post 7</a>"));
    assert!(first.contains(">Post 5</a>"));
    assert!(!first.contains(">Post 4</a>"));
    assert!(first.contains("Page 1 of 3 (7 posts)"));

    let last = body_text(t.send(get("/post-index?page=3", None)).await).await;
    assert_eq!(last.matches("<article>").count(), 1);
    assert!(last.contains(">Post 1</a>"));
    assert!(last.contains("rel=\"prev\""));
    assert!(!last.contains("rel=\"next\""));

    let beyond = t.send(get("/post?page=9", None)).await;
    assert_eq!(beyond.status(), StatusCode::OK);
    assert!(body_text(beyond).await.contains("No posts on this page."));

    let zero = body_text(t.send(get("/post?page=0", None)).await).await;
    assert!(zero.contains("Page 1 of 3"));

    let bad = t.send(get("/post?page=abc", None)).await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_stores_hashed_password_and_default_role() {
    let t = TestApp::new().await;

    let res = t
        .send(form_post("/register", "email=New%40Example.com&password=secret123"))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/register");

    let user = t.state.db.get_user_by_email("new@example.com").unwrap().unwrap();
    assert!(user.password.starts_with("$argon2id$"));
    assert_eq!(user.roles, vec!["bloggers".to_string()]);

    let again = t
        .send(form_post("/register", "email=new%40example.com&password=secret123"))
        .await;
    assert_eq!(again.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(again).await.contains("There is already an account with this email."));
}

#[tokio::test]
async fn login_sets_cookies_only_on_success() {
    let t = TestApp::new().await;
    t.send(form_post("/register", "email=reader%40example.com&password=secret123"))
        .await;

    let res = t
        .send(form_post("/login", "email=reader%40example.com&password=wrong-one"))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&res, SESSION_COOKIE).is_none());

    let res = t
        .send(form_post(
            "/login",
            "email=Reader%40example.com&password=secret123&remember_me=on",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/post");
    let session = set_cookie(&res, SESSION_COOKIE).unwrap();
    assert!(set_cookie(&res, REMEMBER_COOKIE).is_some());

    // A fresh password login may create posts.
    let res = t.send(get("/post/create", Some(&session))).await;
    assert_eq!(res.status(), StatusCode::OK);
}
