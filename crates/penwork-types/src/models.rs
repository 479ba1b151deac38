use serde::{Deserialize, Serialize};

/// Roles granted to every account created through the registration form.
pub const DEFAULT_ROLES: &[&str] = &["bloggers"];

/// How the current session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthLevel {
    /// Password checked during this browser session.
    Full,
    /// Restored from the long-lived "remember me" cookie.
    Remembered,
}

/// The logged-in user as seen by request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub roles: Vec<String>,
    pub level: AuthLevel,
}

impl Identity {
    pub fn is_fully_authenticated(&self) -> bool {
        self.level == AuthLevel::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(level: AuthLevel) -> Identity {
        Identity {
            user_id: 7,
            email: "writer@example.com".into(),
            roles: DEFAULT_ROLES.iter().map(|r| r.to_string()).collect(),
            level,
        }
    }

    #[test]
    fn remembered_sessions_are_not_fully_authenticated() {
        assert!(identity(AuthLevel::Full).is_fully_authenticated());
        assert!(!identity(AuthLevel::Remembered).is_fully_authenticated());
    }

    #[test]
    fn default_role_is_bloggers() {
        let id = identity(AuthLevel::Full);
        assert_eq!(id.roles, vec!["bloggers".to_string()]);
    }

    #[test]
    fn auth_level_serializes_snake_case() {
        let json = serde_json::to_string(&AuthLevel::Remembered).unwrap();
        assert_eq!(json, "\"remembered\"");
    }
}
