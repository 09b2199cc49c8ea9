use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderName},
};

use crate::error::ApiError;
use crate::wallet::DerivationPath;

/// Header the fronting gateway uses to pass the authenticated principal.
pub const CALLER_HEADER: HeaderName = HeaderName::from_static("x-caller-principal");

/// Principal used when no caller header is present.
pub const ANONYMOUS_PRINCIPAL: &str = "2vxsx-fae";

/// Identity of the caller for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub principal: String,
}

impl Caller {
    pub fn anonymous() -> Self {
        Caller { principal: ANONYMOUS_PRINCIPAL.to_string() }
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal == ANONYMOUS_PRINCIPAL
    }

    pub fn derivation_path(&self) -> DerivationPath {
        DerivationPath::from_principal(&self.principal)
    }
}

fn valid_principal(text: &str) -> bool {
    !text.is_empty()
        && text.len() <= 128
        && text
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !text.starts_with('-')
        && !text.ends_with('-')
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(&CALLER_HEADER) else {
            return Ok(Caller::anonymous());
        };

        let principal = value
            .to_str()
            .map(str::trim)
            .map_err(|_| ApiError::BadRequest("Invalid caller principal".into()))?;

        if !valid_principal(principal) {
            return Err(ApiError::BadRequest(format!("Invalid caller principal '{}'", principal)));
        }

        Ok(Caller { principal: principal.to_string() })
    }
}
