//! Shared types for the Sheba admin console session core.
//!
//! These are the shapes exchanged between the backend, the persisted
//! session record and the console front-ends.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend identifier of a user.
///
/// The backend usually hands out integers, but some deployments use
/// string identifiers, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Int(i64),
    Str(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Int(id) => write!(f, "{id}"),
            UserId::Str(id) => f.write_str(id),
        }
    }
}

/// Console role a user is asserted to hold.
///
/// Roles the console does not know about are kept as `Other` so that a
/// server-asserted role is never silently rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    Admin,
    Manager,
    Developer,
    Client,
    Other(String),
}

impl Role {
    /// Roles offered on the login form, in display order.
    pub fn selectable() -> &'static [Role] {
        &[Role::Admin, Role::Manager, Role::Developer, Role::Client]
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Developer => "developer",
            Role::Client => "client",
            Role::Other(other) => other,
        }
    }
}

impl FromStr for Role {
    type Err = Infallible;

    /// Exact match only; any other spelling is kept verbatim as `Other`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "admin" => Role::Admin,
            "manager" => Role::Manager,
            "developer" => Role::Developer,
            "client" => Role::Client,
            _ => Role::Other(value.to_string()),
        })
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(role) => role,
            Err(never) => match never {},
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated user record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    /// Remaining profile fields (email, names, avatar, ...), kept verbatim.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<UserId>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role,
            profile: Map::new(),
        }
    }

    /// Returns a profile field, if the backend sent one.
    pub fn profile_field(&self, key: &str) -> Option<&Value> {
        self.profile.get(key)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId::Int(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId::Str(id.to_string())
    }
}

/// Login form input. Transient, never persisted.
///
/// `selected_role` is what the visitor expects to be; it is never sent to
/// the backend and is only compared after authentication.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub selected_role: Role,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        selected_role: Role,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            selected_role,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[HIDDEN]")
            .field("selected_role", &self.selected_role)
            .finish()
    }
}

/// Password change request body.
#[derive(Clone, Serialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn new(old_password: impl Into<String>, new_password: impl Into<String>) -> Self {
        Self {
            old_password: old_password.into(),
            new_password: new_password.into(),
        }
    }
}

impl fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_role_parse_known_and_unknown() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!(
            "Admin".parse::<Role>().unwrap(),
            Role::Other("Admin".to_string())
        );
        assert_eq!(
            " manager ".parse::<Role>().unwrap(),
            Role::Other(" manager ".to_string())
        );
        assert_eq!(
            "auditor".parse::<Role>().unwrap(),
            Role::Other("auditor".to_string())
        );
        assert_eq!(Role::Other("auditor".to_string()).to_string(), "auditor");
    }

    #[test]
    fn test_user_keeps_unknown_profile_fields() {
        let raw = json!({
            "id": 7,
            "username": "ada",
            "role": "developer",
            "email": "ada@example.com",
            "is_staff": true
        });

        let user: User = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(user.id, UserId::Int(7));
        assert_eq!(user.role, Role::Developer);
        assert_eq!(
            user.profile_field("email"),
            Some(&json!("ada@example.com"))
        );

        assert_eq!(serde_json::to_value(&user).unwrap(), raw);
    }

    #[test]
    fn test_server_role_spelling_round_trips() {
        let raw = r#"{"id":1,"username":"a","role":"Admin"}"#;
        let user: User = serde_json::from_str(raw).unwrap();

        assert_ne!(user.role, Role::Admin);
        assert_eq!(user.role.as_str(), "Admin");
        assert_eq!(serde_json::to_string(&user).unwrap(), raw);
    }

    #[test]
    fn test_user_accepts_string_id() {
        let user: User =
            serde_json::from_str(r#"{"id":"u-1","username":"bo","role":"client"}"#).unwrap();
        assert_eq!(user.id.to_string(), "u-1");
    }

    #[test]
    fn test_secrets_are_hidden_in_debug() {
        let creds = Credentials::new("ada", "hunter2", Role::Admin);
        let shown = format!("{creds:?}");
        assert!(shown.contains("ada"));
        assert!(!shown.contains("hunter2"));

        let change = PasswordChange::new("old-secret", "new-secret");
        assert!(!format!("{change:?}").contains("secret"));
    }
}
