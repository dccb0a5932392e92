/*!
 * # Authentication Boundary
 *
 * Identity is established upstream. This module only turns the resolved
 * identity into a [`Principal`] on the request and gates routes through the
 * capability policy.
 */

pub mod policy;

pub use policy::{authorize, authorize_owner, Capability, Principal, Role};

use crate::errors::ServiceError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn principal_from_headers(headers: &HeaderMap) -> Result<Option<Principal>, ServiceError> {
    let Some(raw_id) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let user_id = raw_id
        .to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| ServiceError::Unauthorized("malformed user identity".to_string()))?;

    let role = match headers.get(USER_ROLE_HEADER) {
        None => Role::User,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<Role>().ok())
            .ok_or_else(|| ServiceError::Unauthorized("unknown user role".to_string()))?,
    };

    Ok(Some(Principal::new(user_id, role)))
}

/// Trusts `x-user-id`/`x-user-role` from the authenticating proxy in front of
/// the service and stores the resulting [`Principal`] in request extensions.
pub async fn identity_from_headers(mut request: Request, next: Next) -> Response {
    match principal_from_headers(request.headers()) {
        Ok(Some(principal)) => {
            debug!(user_id = %principal.user_id, role = %principal.role, "identity resolved");
            request.extensions_mut().insert(principal);
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "rejecting request with bad identity headers");
            return e.into_response();
        }
    }
    next.run(request).await
}

async fn capability_middleware(
    State(capability): State<Capability>,
    request: Request,
    next: Next,
) -> Response {
    let Some(principal) = request.extensions().get::<Principal>().copied() else {
        return ServiceError::Unauthorized("authentication required".to_string()).into_response();
    };
    if let Err(e) = authorize(&principal, capability) {
        warn!(user_id = %principal.user_id, %capability, "capability denied");
        return e.into_response();
    }
    next.run(request).await
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or_else(|| ServiceError::Unauthorized("authentication required".to_string()))
    }
}

/// Extension methods for Router to gate routes on the capability policy
pub trait AuthRouterExt {
    fn with_capability(self, capability: Capability) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_capability(self, capability: Capability) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            capability,
            capability_middleware,
        ))
    }
}
