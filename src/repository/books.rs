//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::BooksRepository;
use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookChanges, BookRow, NewBook, Transition},
};

#[derive(Clone)]
pub struct PgBooksRepository {
    pool: Pool<Postgres>,
}

impl PgBooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BooksRepository for PgBooksRepository {
    async fn list(&self, removed: bool) -> AppResult<Vec<Book>> {
        let sql = if removed {
            "SELECT * FROM book WHERE removed_at IS NOT NULL ORDER BY book_id"
        } else {
            "SELECT * FROM book WHERE removed_at IS NULL ORDER BY book_id"
        };

        let rows = sqlx::query_as::<_, BookRow>(sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Book::try_from).collect()
    }

    async fn list_by_holder(&self, person_id: i64) -> AppResult<Vec<Book>> {
        let rows = sqlx::query_as::<_, BookRow>(
            "SELECT * FROM book WHERE person_id = $1 AND removed_at IS NULL ORDER BY book_id",
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Book::try_from).collect()
    }

    async fn get(&self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, BookRow>("SELECT * FROM book WHERE book_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Book::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn create(&self, book: &NewBook) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(
            r#"
            INSERT INTO book (
                title, author, year_of_production, annotation, cover_image, status,
                created_at, created_person, updated_at, updated_person
            )
            VALUES ($1, $2, $3, $4, $5, 'FREE', NOW(), $6, NOW(), $6)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.year_of_production)
        .bind(&book.annotation)
        .bind(&book.cover_image)
        .bind(&book.created_by)
        .fetch_one(&self.pool)
        .await?;

        Book::try_from(row)
    }

    async fn update(&self, id: i64, changes: &BookChanges, updated_by: &str) -> AppResult<Book> {
        sqlx::query_as::<_, BookRow>(
            r#"
            UPDATE book SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                year_of_production = COALESCE($4, year_of_production),
                annotation = COALESCE($5, annotation),
                cover_image = COALESCE($6, cover_image),
                updated_at = NOW(),
                updated_person = $7
            WHERE book_id = $1 AND removed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.author)
        .bind(changes.year_of_production)
        .bind(&changes.annotation)
        .bind(&changes.cover_image)
        .bind(updated_by)
        .fetch_optional(&self.pool)
        .await?
        .map(Book::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn soft_delete(&self, id: i64, removed_by: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE book SET removed_at = NOW(), removed_person = $2
            WHERE book_id = $1 AND removed_at IS NULL AND status = 'FREE' AND person_id IS NULL
            "#,
        )
        .bind(id)
        .bind(removed_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let book = self.get(id).await?;
            if book.is_removed() {
                return Err(AppError::NotFound(format!("Book with id {} not found", id)));
            }
            return Err(AppError::Conflict(format!(
                "Book {} is {} and cannot be deleted",
                id, book.status
            )));
        }

        Ok(())
    }

    async fn transition(&self, id: i64, transition: &Transition) -> AppResult<Option<Book>> {
        let from: Vec<String> = transition.from.iter().map(|s| s.as_str().to_string()).collect();

        // single statement so concurrent checkouts serialize on the row lock
        let row = sqlx::query_as::<_, BookRow>(
            r#"
            UPDATE book SET status = $2, person_id = $3, updated_at = NOW()
            WHERE book_id = $1
              AND removed_at IS NULL
              AND status = ANY($4)
              AND person_id IS NOT DISTINCT FROM $5
              AND ($3::BIGINT IS NULL
                   OR EXISTS (SELECT 1 FROM person WHERE id = $3 AND removed_at IS NULL))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(transition.to.as_str())
        .bind(transition.holder)
        .bind(&from)
        .bind(transition.expected_holder)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Book::try_from).transpose()
    }
}
