//! Book catalogue, lending and viewing endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppResult,
    models::book::{Book, BookContent, CreateBook, UpdateBook},
};

use super::AuthenticatedUser;

#[derive(Debug, Deserialize, IntoParams)]
pub struct AssignQuery {
    /// Person receiving the book
    pub person_id: i64,
}

/// List books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Live books", body = Vec<Book>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.books.list(&principal).await?;
    Ok(Json(books))
}

/// List soft-deleted books
#[utoipa::path(
    get,
    path = "/books/deleted",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Deleted books", body = Vec<Book>),
        (status = 403, description = "Not allowed")
    )
)]
pub async fn list_deleted_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.books.list_deleted(&principal).await?;
    Ok(Json(books))
}

/// Cover URLs of all books that have one
#[utoipa::path(
    get,
    path = "/books/covers",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Cover URLs", body = Vec<String>)
    )
)]
pub async fn list_cover_urls(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<Vec<String>>> {
    let urls = state.services.books.cover_urls(&principal).await?;
    Ok(Json(urls))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    let book = state.services.books.get(&principal, id).await?;
    Ok(Json(book))
}

/// Create a new book
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input or cover"),
        (status = 403, description = "Not allowed")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(request): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let created = state.services.books.create(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update an existing book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    let updated = state.services.books.update(&principal, id, request).await?;
    Ok(Json(updated))
}

/// Soft-delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book is in use")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.services.books.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Assign a free book to a person
#[utoipa::path(
    post,
    path = "/books/{id}/assign",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID"),
        AssignQuery
    ),
    responses(
        (status = 200, description = "Book assigned", body = Book),
        (status = 403, description = "Not allowed"),
        (status = 409, description = "Book is not free")
    )
)]
pub async fn assign_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<AssignQuery>,
) -> AppResult<Json<Book>> {
    let book = state.services.books.assign(&principal, id, query.person_id).await?;
    Ok(Json(book))
}

/// Return an assigned book
#[utoipa::path(
    post,
    path = "/books/{id}/free",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book freed", body = Book),
        (status = 409, description = "Book is not assigned")
    )
)]
pub async fn free_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    let book = state.services.books.free(&principal, id).await?;
    Ok(Json(book))
}

/// View the cover image
#[utoipa::path(
    get,
    path = "/books/{id}/cover",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Cover image bytes, Content-Type sniffed from the data"),
        (status = 404, description = "Book or cover not found"),
        (status = 409, description = "Book is not free")
    )
)]
pub async fn view_cover(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let cover = state.services.books.view_cover(&principal, id).await?;
    Ok(([(header::CONTENT_TYPE, cover.mime_type)], cover.bytes).into_response())
}

/// Read the book content
#[utoipa::path(
    get,
    path = "/books/{id}/content",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book content", body = BookContent),
        (status = 409, description = "Book is not free")
    )
)]
pub async fn view_content(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<BookContent>> {
    let content = state.services.books.view_content(&principal, id).await?;
    Ok(Json(content))
}

/// Finish viewing a book
#[utoipa::path(
    put,
    path = "/books/{id}/release",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book after release", body = Book)
    )
)]
pub async fn release_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    let book = state.services.books.release(&principal, id).await?;
    Ok(Json(book))
}
