//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::AppError;

/// Circulation state of a book
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookStatus {
    #[default]
    Free,
    Assigned,
    ViewingCover,
    ViewingContent,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Free => "FREE",
            BookStatus::Assigned => "ASSIGNED",
            BookStatus::ViewingCover => "VIEWING_COVER",
            BookStatus::ViewingContent => "VIEWING_CONTENT",
        }
    }

    pub fn is_viewing(&self) -> bool {
        matches!(self, BookStatus::ViewingCover | BookStatus::ViewingContent)
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(BookStatus::Free),
            "ASSIGNED" => Ok(BookStatus::Assigned),
            "VIEWING_COVER" => Ok(BookStatus::ViewingCover),
            "VIEWING_CONTENT" => Ok(BookStatus::ViewingContent),
            _ => Err(format!("Invalid book status: {}", s)),
        }
    }
}

/// Internal row structure for database queries
#[derive(Debug, Clone, FromRow)]
pub struct BookRow {
    book_id: i64,
    title: String,
    author: String,
    year_of_production: i32,
    annotation: String,
    cover_image: Option<Vec<u8>>,
    status: String,
    person_id: Option<i64>,
    created_at: DateTime<Utc>,
    created_person: Option<String>,
    updated_at: DateTime<Utc>,
    updated_person: Option<String>,
    removed_at: Option<DateTime<Utc>>,
    removed_person: Option<String>,
}

impl TryFrom<BookRow> for Book {
    type Error = AppError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<BookStatus>().map_err(|e| {
            tracing::error!("Book {} has a corrupt status column: {}", row.book_id, e);
            AppError::Internal(format!("Book {} has an unknown status", row.book_id))
        })?;

        Ok(Book {
            id: row.book_id,
            title: row.title,
            author: row.author,
            year_of_production: row.year_of_production,
            annotation: row.annotation,
            cover_image: row.cover_image.filter(|bytes| !bytes.is_empty()),
            status,
            holder_id: row.person_id,
            created_at: row.created_at,
            created_by: row.created_person,
            updated_at: row.updated_at,
            updated_by: row.updated_person,
            removed_at: row.removed_at,
            removed_by: row.removed_person,
        })
    }
}

/// Full book model
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub year_of_production: i32,
    pub annotation: String,
    #[serde(skip)]
    pub cover_image: Option<Vec<u8>>,
    pub status: BookStatus,
    /// Borrower, or current viewer while a viewing is in progress
    pub holder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub removed_at: Option<DateTime<Utc>>,
    pub removed_by: Option<String>,
}

impl Book {
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    pub fn has_cover(&self) -> bool {
        self.cover_image.is_some()
    }

    pub fn cover_url(&self) -> String {
        format!("/api/v1/books/{}/cover", self.id)
    }
}

/// Book fields shown while reading its content
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookContent {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub year_of_production: i32,
    pub annotation: String,
}

impl From<&Book> for BookContent {
    fn from(book: &Book) -> Self {
        BookContent {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            year_of_production: book.year_of_production,
            annotation: book.annotation.clone(),
        }
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 2, max = 255, message = "Title must be between 2 and 255 symbols"))]
    pub title: String,
    #[validate(length(min = 2, max = 50, message = "Author name must be between 2 and 50 symbols"))]
    pub author: String,
    #[validate(range(min = 1000, max = 9999, message = "Year must be a four-digit number"))]
    pub year_of_production: i32,
    #[validate(length(min = 1, max = 65535, message = "Description should not be empty"))]
    pub annotation: String,
    /// Image downloaded and stored as the cover
    pub cover_image_url: Option<String>,
}

/// Update book request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 2, max = 255, message = "Title must be between 2 and 255 symbols"))]
    pub title: Option<String>,
    #[validate(length(min = 2, max = 50, message = "Author name must be between 2 and 50 symbols"))]
    pub author: Option<String>,
    #[validate(range(min = 1000, max = 9999, message = "Year must be a four-digit number"))]
    pub year_of_production: Option<i32>,
    #[validate(length(min = 1, max = 65535, message = "Description should not be empty"))]
    pub annotation: Option<String>,
    /// Replaces the stored cover when present
    pub cover_image_url: Option<String>,
}

/// Book ready to be stored
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub year_of_production: i32,
    pub annotation: String,
    pub cover_image: Option<Vec<u8>>,
    pub created_by: String,
}

/// Field changes applied by the repository
#[derive(Debug, Clone, Default)]
pub struct BookChanges {
    pub title: Option<String>,
    pub author: Option<String>,
    pub year_of_production: Option<i32>,
    pub annotation: Option<String>,
    pub cover_image: Option<Vec<u8>>,
}

/// Atomic compare-and-set on a book's circulation state.
///
/// Applied only when the stored status is one of `from` and the stored
/// holder equals `expected_holder`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: Vec<BookStatus>,
    pub expected_holder: Option<i64>,
    pub to: BookStatus,
    pub holder: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> BookRow {
        BookRow {
            book_id: 7,
            title: "Anna Karenina".to_string(),
            author: "Leo Tolstoy".to_string(),
            year_of_production: 1878,
            annotation: "A novel".to_string(),
            cover_image: Some(Vec::new()),
            status: status.to_string(),
            person_id: Some(3),
            created_at: Utc::now(),
            created_person: None,
            updated_at: Utc::now(),
            updated_person: None,
            removed_at: None,
            removed_person: None,
        }
    }

    #[test]
    fn test_row_converts() {
        let book = Book::try_from(row("ASSIGNED")).unwrap();
        assert_eq!(book.status, BookStatus::Assigned);
        assert_eq!(book.holder_id, Some(3));
        assert!(!book.has_cover());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = Book::try_from(row("LOST")).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookStatus::Free,
            BookStatus::Assigned,
            BookStatus::ViewingCover,
            BookStatus::ViewingContent,
        ] {
            assert_eq!(status.as_str().parse::<BookStatus>(), Ok(status));
        }
        assert!("LOST".parse::<BookStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_like_column() {
        let json = serde_json::to_string(&BookStatus::ViewingCover).unwrap();
        assert_eq!(json, "\"VIEWING_COVER\"");
    }

    #[test]
    fn test_create_book_rules() {
        let book = CreateBook {
            title: "A".to_string(),
            author: "Leo Tolstoy".to_string(),
            year_of_production: 999,
            annotation: String::new(),
            cover_image_url: None,
        };
        let errors = book.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("year_of_production"));
        assert!(fields.contains_key("annotation"));
        assert!(!fields.contains_key("author"));
    }
}
