/// Database row types; these map directly to SQLite rows.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    /// Argon2 PHC string, never the plaintext.
    pub password: String,
    pub roles: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub body: String,
    /// Filename inside the images directory.
    pub image: Option<String>,
    pub user_id: i64,
    pub author_email: String,
    pub created_at: String,
}
