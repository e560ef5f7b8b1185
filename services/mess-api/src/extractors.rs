//! Caller identity extractor.
//!
//! Authentication happens at the gateway, which forwards the verified
//! identity as headers:
//!
//! - `x-user-id` - caller's user UUID (required)
//! - `x-user-role` - `student`, `staff` or `admin` (defaults to `student`)
//! - `x-student-id` - institutional student number (optional)

use std::ops::Deref;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use mess_types::{Principal, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const STUDENT_ID_HEADER: &str = "x-student-id";

/// Longest student number accepted from the gateway
const MAX_STUDENT_ID_LEN: usize = 64;

/// Extractor for the calling principal.
///
/// Returns 401 if the gateway headers are missing or malformed.
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

impl Deref for Caller {
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers).map(Self)
    }
}

/// Build a principal from gateway headers
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let user_id = header_str(headers, USER_ID_HEADER)?
        .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER}")))?;
    let user_id = UserId::parse(user_id)
        .map_err(|_| ApiError::Unauthenticated(format!("invalid {USER_ID_HEADER}")))?;

    let role = match header_str(headers, USER_ROLE_HEADER)? {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|_| ApiError::Unauthenticated(format!("invalid {USER_ROLE_HEADER}")))?,
        None => Role::default(),
    };

    let mut principal = Principal::new(user_id, role);

    if let Some(student_id) = header_str(headers, STUDENT_ID_HEADER)? {
        let student_id = student_id.trim();
        if student_id.len() > MAX_STUDENT_ID_LEN {
            return Err(ApiError::Unauthenticated(format!(
                "{STUDENT_ID_HEADER} too long"
            )));
        }
        if !student_id.is_empty() {
            principal = principal.with_student_id(student_id);
        }
    }

    Ok(principal)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::Unauthenticated(format!("invalid {name} encoding")))
        })
        .transpose()
}
