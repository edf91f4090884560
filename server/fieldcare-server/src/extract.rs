//! Trusted-identity extraction.
//!
//! Request authentication lives in the upstream gateway, which verifies
//! the caller and injects `x-actor-id` and `x-actor-role` headers before
//! the request reaches this service. This extractor turns that pair into
//! the engine's `Actor`; requests without a complete identity are
//! rejected before any handler runs.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use fieldcare_sync::{Actor, ActorRole};
use uuid::Uuid;

use crate::error::ApiError;

const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, Copy)]
pub struct ActorIdentity(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor_id = header(parts, ACTOR_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| ApiError::Unauthorized("invalid actor id".to_string()))?;

        let role = header(parts, ACTOR_ROLE_HEADER)?
            .parse::<ActorRole>()
            .map_err(ApiError::Unauthorized)?;

        Ok(ActorIdentity(Actor::new(actor_id, role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_complete_identity_is_extracted() {
        let id = Uuid::new_v4();
        let mut parts = parts_with(&[
            ("x-actor-id", &id.to_string()),
            ("x-actor-role", "field_worker"),
        ]);
        let ActorIdentity(actor) = ActorIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(actor.actor_id, id);
        assert_eq!(actor.role, ActorRole::FieldWorker);
    }

    #[tokio::test]
    async fn test_missing_or_bad_identity_is_rejected() {
        let mut parts = parts_with(&[("x-actor-role", "doctor")]);
        assert!(ActorIdentity::from_request_parts(&mut parts, &())
            .await
            .is_err());

        let mut parts = parts_with(&[
            ("x-actor-id", "not-a-uuid"),
            ("x-actor-role", "doctor"),
        ]);
        assert!(ActorIdentity::from_request_parts(&mut parts, &())
            .await
            .is_err());

        let id = Uuid::new_v4().to_string();
        let mut parts = parts_with(&[("x-actor-id", &id), ("x-actor-role", "superuser")]);
        assert!(ActorIdentity::from_request_parts(&mut parts, &())
            .await
            .is_err());
    }
}
