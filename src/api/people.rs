//! Person management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppResult,
    models::{
        book::Book,
        person::{CreatePerson, Person, UpdatePerson},
    },
};

use super::AuthenticatedUser;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DeletePersonQuery {
    /// Release held books and delete anyway
    pub force: Option<bool>,
}

/// List people
#[utoipa::path(
    get,
    path = "/people",
    tag = "people",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Live people", body = Vec<Person>),
        (status = 403, description = "Not allowed")
    )
)]
pub async fn list_people(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<Person>>> {
    let people = state.services.people.list(&principal).await?;
    Ok(Json(people))
}

/// List soft-deleted people
#[utoipa::path(
    get,
    path = "/people/deleted",
    tag = "people",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Deleted people", body = Vec<Person>),
        (status = 403, description = "Not allowed")
    )
)]
pub async fn list_deleted_people(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<Person>>> {
    let people = state.services.people.list_deleted(&principal).await?;
    Ok(Json(people))
}

/// Get person details by ID
#[utoipa::path(
    get,
    path = "/people/{id}",
    tag = "people",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Person ID")
    ),
    responses(
        (status = 200, description = "Person details", body = Person),
        (status = 404, description = "Person not found")
    )
)]
pub async fn get_person(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Person>> {
    let person = state.services.people.get(&principal, id).await?;
    Ok(Json(person))
}

/// Create a new person
#[utoipa::path(
    post,
    path = "/people",
    tag = "people",
    security(("bearer_auth" = [])),
    request_body = CreatePerson,
    responses(
        (status = 201, description = "Person created", body = Person),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Name already exists")
    )
)]
pub async fn create_person(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(request): Json<CreatePerson>,
) -> AppResult<(StatusCode, Json<Person>)> {
    let created = state.services.people.create(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update an existing person
#[utoipa::path(
    put,
    path = "/people/{id}",
    tag = "people",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Person ID")
    ),
    request_body = UpdatePerson,
    responses(
        (status = 200, description = "Person updated", body = Person),
        (status = 404, description = "Person not found")
    )
)]
pub async fn update_person(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePerson>,
) -> AppResult<Json<Person>> {
    let updated = state.services.people.update(&principal, id, request).await?;
    Ok(Json(updated))
}

/// Soft-delete a person
#[utoipa::path(
    delete,
    path = "/people/{id}",
    tag = "people",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Person ID"),
        DeletePersonQuery
    ),
    responses(
        (status = 204, description = "Person deleted"),
        (status = 404, description = "Person not found"),
        (status = 409, description = "Person holds books")
    )
)]
pub async fn delete_person(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<DeletePersonQuery>,
) -> AppResult<StatusCode> {
    state
        .services
        .people
        .delete(&principal, id, query.force.unwrap_or(false))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Books currently assigned to a person
#[utoipa::path(
    get,
    path = "/people/{id}/books",
    tag = "people",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Person ID")
    ),
    responses(
        (status = 200, description = "Assigned books", body = Vec<Book>)
    )
)]
pub async fn person_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.people.books(&principal, id).await?;
    Ok(Json(books))
}
