//! Role-based authorization gate.
//!
//! Resolves `Authorization: Bearer <token>` to a user, checks the user's role
//! against the route's allow-list and stores the user in request extensions
//! for handlers to pick up through [`CurrentUser`].

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use schoolhouse_core::models::{Role, User};
use schoolhouse_core::{Database, Error};

use crate::error::ApiError;

/// Every role.
pub const ANY: &[Role] = Role::ALL;
pub const STAFF: &[Role] = &[Role::Staff];
pub const STAFF_FACULTY: &[Role] = &[Role::Faculty, Role::Staff];

/// Middleware state: who may pass.
#[derive(Clone)]
pub struct Gate {
    db: Database,
    roles: &'static [Role],
}

impl Gate {
    pub fn new(db: Database, roles: &'static [Role]) -> Self {
        Self { db, roles }
    }

    /// Resolve the caller and check their role.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for a missing, malformed, unknown or expired token;
    /// `Forbidden` if the role is not allowed.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<User, Error> {
        let token = bearer_token(headers)?;
        let user = self
            .db
            .session_user(token)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid or expired token".into()))?;

        if !self.roles.contains(&user.role) {
            return Err(Error::Forbidden(format!("role `{}` may not access this resource", user.role)));
        }
        Ok(user)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, Error> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| Error::Unauthorized("missing Authorization header".into()))?
        .to_str()
        .map_err(|_| Error::Unauthorized("malformed Authorization header".into()))?;

    match header.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(Error::Unauthorized("expected a Bearer token".into())),
    }
}

/// Reject the request unless the caller holds one of the gate's roles.
pub async fn require_roles(State(gate): State<Gate>, mut req: Request<Body>, next: Next) -> Response {
    match gate.authorize(req.headers()).await {
        Ok(user) => {
            tracing::debug!(user = %user.id, role = %user.role, path = %req.uri().path(), "authorized");
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Err(err) => ApiError(err).into_response(),
    }
}

/// The authenticated caller, inserted by [`require_roles`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError(Error::Unauthorized("authentication required".into())))
    }
}
