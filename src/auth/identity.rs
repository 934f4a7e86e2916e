//! Authenticated identities and admin resolution.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::RequiredRole;

/// Role of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Whether this role may access a route requiring `required`.
    pub fn satisfies(&self, required: RequiredRole) -> bool {
        match required {
            RequiredRole::User => true,
            RequiredRole::Admin => *self == Role::Admin,
        }
    }
}

/// Identity attached to requests that passed the route guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Role,
}

/// The one place that decides who is an administrator.
///
/// A user is an admin when the provider reports an `admin` role claim or
/// when their email is on the configured list.
#[derive(Debug, Clone, Default)]
pub struct AdminDirectory {
    emails: HashSet<String>,
}

impl AdminDirectory {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn resolve_role(&self, email: Option<&str>, role_claim: Option<&str>) -> Role {
        let claimed_admin = role_claim.is_some_and(|r| r.eq_ignore_ascii_case("admin"));
        let listed = email.is_some_and(|e| self.emails.contains(&e.trim().to_lowercase()));

        if claimed_admin || listed {
            Role::Admin
        } else {
            Role::User
        }
    }

    /// Build an [`Identity`] with its role resolved here.
    pub fn identify(
        &self,
        user_id: impl Into<String>,
        email: Option<String>,
        role_claim: Option<&str>,
    ) -> Identity {
        let role = self.resolve_role(email.as_deref(), role_claim);
        Identity {
            user_id: user_id.into(),
            email,
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_by_claim_or_email() {
        let directory = AdminDirectory::new(["Owner@Example.com", " "]);

        assert_eq!(directory.resolve_role(None, Some("admin")), Role::Admin);
        assert_eq!(
            directory.resolve_role(Some("owner@example.COM"), None),
            Role::Admin
        );
        assert_eq!(
            directory.resolve_role(Some("someone@example.com"), Some("user")),
            Role::User
        );
        assert_eq!(directory.resolve_role(None, None), Role::User);
    }

    #[test]
    fn test_role_satisfies() {
        assert!(Role::Admin.satisfies(RequiredRole::User));
        assert!(Role::Admin.satisfies(RequiredRole::Admin));
        assert!(Role::User.satisfies(RequiredRole::User));
        assert!(!Role::User.satisfies(RequiredRole::Admin));
    }
}
