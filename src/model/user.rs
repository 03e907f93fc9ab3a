//! User (credential principal) records.

use crate::auth::LOCKOUT_THRESHOLD;
use crate::model::{
    expect_fields, parse_count, parse_email, parse_id, required, FieldError, WireRecord,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of wire fields in a SIGNUP payload: `role|name|pwdHash|email|phone`.
pub const SIGNUP_FIELDS: usize = 5;

/// Number of wire fields in an UPDATE_USER payload:
/// `id|role|name|pwdHash|email|phone|loginAttempts`.
pub const USER_UPDATE_FIELDS: usize = 7;

/// Authorization role of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            _ => Err(FieldError::InvalidRole(s.trim().to_string())),
        }
    }
}

/// A user account.
///
/// `pwd_hash` always holds an adaptive hash once the record reaches the
/// store. While a request is being decoded it holds the raw credential
/// field, which the dispatcher resolves before calling the store. An empty
/// `pwd_hash` on update means "keep the current hash".
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Server-assigned id; `None` until the store assigns one
    pub id: Option<i64>,
    pub role: Role,
    pub name: String,
    pub pwd_hash: String,
    /// Stored trimmed and lowercased; unique across users
    pub email: String,
    pub phone: String,
    /// Consecutive failed logins; the account is locked at the threshold
    pub login_attempts: u32,
}

impl User {
    /// Builds a new account from a SIGNUP payload.
    pub fn from_signup_fields(fields: &[&str]) -> Result<Self, FieldError> {
        expect_fields(fields, SIGNUP_FIELDS)?;

        Ok(Self {
            id: None,
            role: fields[0].parse()?,
            name: required("Name", fields[1])?,
            pwd_hash: required("Password", fields[2])?,
            email: parse_email(fields[3])?,
            phone: fields[4].trim().to_string(),
            login_attempts: 0,
        })
    }

    /// Builds the replacement record from an UPDATE_USER payload.
    ///
    /// The credential field may be empty to keep the stored hash.
    pub fn from_update_fields(fields: &[&str]) -> Result<Self, FieldError> {
        expect_fields(fields, USER_UPDATE_FIELDS)?;

        Ok(Self {
            id: Some(parse_id("User id", fields[0])?),
            role: fields[1].parse()?,
            name: required("Name", fields[2])?,
            pwd_hash: fields[3].to_string(),
            email: parse_email(fields[4])?,
            phone: fields[5].trim().to_string(),
            login_attempts: parse_login_attempts(fields[6])?,
        })
    }
}

/// Parses a failed-login count, which never exceeds the lockout threshold.
fn parse_login_attempts(value: &str) -> Result<u32, FieldError> {
    let attempts = parse_count("Login attempts", value)?;
    if attempts > LOCKOUT_THRESHOLD {
        return Err(FieldError::OutOfRange {
            field: "Login attempts",
        });
    }
    Ok(attempts)
}

impl WireRecord for User {
    /// `id|role|name|email|phone|loginAttempts`; the hash never leaves the server.
    fn to_wire(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.id.map(|id| id.to_string()).unwrap_or_default(),
            self.role,
            self.name,
            self.email,
            self.phone,
            self.login_attempts
        )
    }
}

// Keep credential material out of logs.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("login_attempts", &self.login_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" Staff ".parse::<Role>(), Ok(Role::Staff));
        assert_eq!(
            "owner".parse::<Role>(),
            Err(FieldError::InvalidRole("owner".to_string()))
        );
    }

    #[test]
    fn test_from_signup_fields() {
        let user =
            User::from_signup_fields(&["staff", "Bob", "hunter2", "Bob@Example.com", "555-0100"])
                .unwrap();
        assert_eq!(user.id, None);
        assert_eq!(user.role, Role::Staff);
        assert_eq!(user.email, "bob@example.com");
        assert_eq!(user.pwd_hash, "hunter2");
        assert_eq!(user.login_attempts, 0);
    }

    #[test]
    fn test_signup_requires_password() {
        let result = User::from_signup_fields(&["staff", "Bob", "", "bob@example.com", ""]);
        assert_eq!(result, Err(FieldError::Missing { field: "Password" }));
    }

    #[test]
    fn test_from_update_fields() {
        let user = User::from_update_fields(&[
            "7",
            "admin",
            "Alice",
            "",
            "alice@example.com",
            "555",
            "0",
        ])
        .unwrap();
        assert_eq!(user.id, Some(7));
        assert!(user.pwd_hash.is_empty());
        assert_eq!(user.login_attempts, 0);
    }

    #[test]
    fn test_update_bounds_login_attempts() {
        fn fields(attempts: &str) -> [&str; 7] {
            ["7", "staff", "Bob", "", "bob@example.com", "", attempts]
        }

        let user = User::from_update_fields(&fields("5")).unwrap();
        assert_eq!(user.login_attempts, LOCKOUT_THRESHOLD);

        assert_eq!(
            User::from_update_fields(&fields("6")),
            Err(FieldError::OutOfRange {
                field: "Login attempts"
            })
        );
        assert_eq!(
            User::from_update_fields(&fields("4294967295")),
            Err(FieldError::OutOfRange {
                field: "Login attempts"
            })
        );
    }

    #[test]
    fn test_update_rejects_bad_id() {
        let result =
            User::from_update_fields(&["x", "admin", "Alice", "", "alice@example.com", "", "0"]);
        assert!(matches!(result, Err(FieldError::NotANumber { field: "User id", .. })));
    }

    #[test]
    fn test_to_wire_omits_hash() {
        let user = User {
            id: Some(3),
            role: Role::Admin,
            name: "Alice".into(),
            pwd_hash: "$argon2id$secret".into(),
            email: "alice@example.com".into(),
            phone: "555".into(),
            login_attempts: 2,
        };
        assert_eq!(user.to_wire(), "3|admin|Alice|alice@example.com|555|2");
        assert!(!format!("{user:?}").contains("argon2"));
    }
}
