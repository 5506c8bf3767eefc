//! Authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::person::{CreatePerson, Person},
    services::tokens::IssuedToken,
};

use super::AuthenticatedUser;

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Full name of the person
    pub name: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub person: Person,
}

impl LoginResponse {
    fn new(issued: IssuedToken, person: Person) -> Self {
        Self {
            token: issued.credential.into_inner(),
            token_type: "Bearer".to_string(),
            expires_at: issued.expires_at,
            person,
        }
    }
}

/// Log in with name and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (issued, person) = state.services.auth.login(&request.name, &request.password).await?;
    Ok(Json(LoginResponse::new(issued, person)))
}

/// Register a new reader account
#[utoipa::path(
    post,
    path = "/auth/registration",
    tag = "auth",
    request_body = CreatePerson,
    responses(
        (status = 201, description = "Person registered", body = LoginResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 409, description = "Name already taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<crate::AppState>,
    Json(request): Json<CreatePerson>,
) -> AppResult<(StatusCode, Json<LoginResponse>)> {
    let (issued, person) = state.services.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(LoginResponse::new(issued, person))))
}

/// Get the current person
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current person", body = Person),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Person>> {
    let person = state.services.auth.me(&principal).await?;
    Ok(Json(person))
}
