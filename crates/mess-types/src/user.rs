//! User identity types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MessTypeError;

/// Unique user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new random user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a user ID from a string
    pub fn parse(s: &str) -> Result<Self, MessTypeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| MessTypeError::InvalidId(s.to_string()))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// User role, as asserted by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Student holding subscriptions
    #[default]
    Student,
    /// Dining hall staff redeeming coupons
    Staff,
    /// Administrator
    Admin,
}

impl Role {
    /// Wire name of the role
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = MessTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            _ => Err(MessTypeError::invalid("role", s)),
        }
    }
}

/// Authenticated caller attached to every engine call.
///
/// Verification happens upstream; the engine trusts these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Caller's user ID
    pub user_id: UserId,
    /// Caller's role
    pub role: Role,
    /// Institutional student number, when the caller is a student
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl Principal {
    /// Create a principal without a student number
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            student_id: None,
        }
    }

    /// Attach a student number
    pub fn with_student_id(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    /// Check if the caller is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Check if the caller may redeem coupons at a terminal
    pub fn is_staff_or_admin(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }

    /// Check if the caller owns a resource or is an administrator
    pub fn owns_or_admin(&self, owner: UserId) -> bool {
        self.user_id == owner || self.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("staff".parse::<Role>().unwrap(), Role::Staff);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("cook".parse::<Role>().is_err());
    }

    #[test]
    fn test_owns_or_admin() {
        let owner = UserId::new();
        let student = Principal::new(owner, Role::Student);
        let other = Principal::new(UserId::new(), Role::Student);
        let admin = Principal::new(UserId::new(), Role::Admin);

        assert!(student.owns_or_admin(owner));
        assert!(!other.owns_or_admin(owner));
        assert!(admin.owns_or_admin(owner));
    }

    #[test]
    fn test_user_id_parse_rejects_garbage() {
        assert!(UserId::parse("not-a-uuid").is_err());
    }
}
