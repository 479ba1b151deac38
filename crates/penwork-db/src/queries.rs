use crate::Database;
use crate::models::{PostRow, UserRow};
use anyhow::Result;
use penwork_types::api::NewContact;
use rusqlite::{Connection, Row, types::Type};

const POST_COLUMNS: &str =
    "p.id, p.title, p.body, p.image, p.user_id, COALESCE(u.email, ''), p.created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, password_hash: &str, roles: &[String]) -> Result<i64> {
        let roles = serde_json::to_string(roles)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, password, roles) VALUES (?1, ?2, ?3)",
                (email, password_hash, &roles),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password, roles, created_at FROM users WHERE email = ?1",
                [email],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    // -- Posts --

    pub fn insert_post(
        &self,
        title: &str,
        body: &str,
        image: Option<&str>,
        user_id: i64,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (title, body, image, user_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![title, body, image, user_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Overwrites every editable column. Returns false when no post has `id`.
    pub fn update_post(
        &self,
        id: i64,
        title: &str,
        body: &str,
        image: Option<&str>,
        user_id: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET title = ?2, body = ?3, image = ?4, user_id = ?5 WHERE id = ?1",
                rusqlite::params![id, title, body, image, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN users u ON p.user_id = u.id
                 WHERE p.id = ?1"
            );
            conn.query_row(&sql, [id], post_from_row).optional()
        })
    }

    /// Newest first.
    pub fn list_posts(&self, limit: u64, offset: u64) -> Result<Vec<PostRow>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN users u ON p.user_id = u.id
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?1 OFFSET ?2"
            );
            query_posts(conn, &sql, rusqlite::params![limit, offset])
        })
    }

    pub fn count_posts(&self) -> Result<u64> {
        self.with_conn(|conn| count(conn, "SELECT COUNT(*) FROM posts"))
    }

    pub fn posts_by_user(&self, user_id: i64) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN users u ON p.user_id = u.id
                 WHERE p.user_id = ?1
                 ORDER BY p.created_at DESC, p.id DESC"
            );
            query_posts(conn, &sql, [user_id])
        })
    }

    // -- Contacts --

    pub fn insert_contact(&self, contact: &NewContact) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO contacts (name, email, message) VALUES (?1, ?2, ?3)",
                (&contact.name, &contact.email, &contact.message),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let roles: String = row.get(3)?;
    let roles = serde_json::from_str(&roles)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        roles,
        created_at: row.get(4)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        image: row.get(3)?,
        user_id: row.get(4)?,
        author_email: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_posts<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, post_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or(0))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
