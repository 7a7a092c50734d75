use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;

pub const ROLE_HEADER: &str = "x-actor-role";
pub const ID_HEADER: &str = "x-actor-id";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let parts: &Parts = parts;
        let role = header(parts, ROLE_HEADER)
            .ok_or_else(|| AppError::Forbidden(format!("missing {ROLE_HEADER} header")))?;

        let id = || -> Result<Uuid, AppError> {
            let raw = header(parts, ID_HEADER)
                .ok_or_else(|| AppError::Forbidden(format!("missing {ID_HEADER} header")))?;
            Uuid::parse_str(raw)
                .map_err(|_| AppError::Validation(format!("{ID_HEADER} is not a valid id: {raw}")))
        };

        match role.to_ascii_lowercase().as_str() {
            "admin" => Ok(Actor::Admin),
            "merchant" => Ok(Actor::Merchant(id()?)),
            "courier" => Ok(Actor::Courier(id()?)),
            other => Err(AppError::Forbidden(format!("unknown actor role: {other}"))),
        }
    }
}
