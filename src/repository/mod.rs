//! Repository layer for persisted library state
//!
//! Services talk to the traits below. The PostgreSQL implementations are
//! used when a database URL is configured, the in-memory store otherwise.

pub mod books;
pub mod memory;
pub mod people;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookChanges, NewBook, Transition},
        person::{NewPerson, Person, PersonChanges},
    },
};

#[async_trait]
pub trait BooksRepository: Send + Sync {
    /// Books that are (`removed = true`) or are not soft-deleted
    async fn list(&self, removed: bool) -> AppResult<Vec<Book>>;

    /// Live books currently held by a person
    async fn list_by_holder(&self, person_id: i64) -> AppResult<Vec<Book>>;

    /// Book by id, removed or not
    async fn get(&self, id: i64) -> AppResult<Book>;

    async fn create(&self, book: &NewBook) -> AppResult<Book>;

    async fn update(&self, id: i64, changes: &BookChanges, updated_by: &str) -> AppResult<Book>;

    async fn soft_delete(&self, id: i64, removed_by: &str) -> AppResult<()>;

    /// Apply `transition` atomically. `None` when the stored state did not match.
    async fn transition(&self, id: i64, transition: &Transition) -> AppResult<Option<Book>>;
}

#[async_trait]
pub trait PeopleRepository: Send + Sync {
    async fn list(&self, removed: bool) -> AppResult<Vec<Person>>;

    /// Person by id, removed or not
    async fn get(&self, id: i64) -> AppResult<Person>;

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Person>>;

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> AppResult<bool>;

    async fn create(&self, person: &NewPerson) -> AppResult<Person>;

    async fn update(&self, id: i64, changes: &PersonChanges) -> AppResult<Person>;

    async fn soft_delete(&self, id: i64, removed_by: &str) -> AppResult<()>;
}

/// Main repository struct handed to the services
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BooksRepository>,
    pub people: Arc<dyn PeopleRepository>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::PgBooksRepository::new(pool.clone())),
            people: Arc::new(people::PgPeopleRepository::new(pool)),
        }
    }

    /// Create a repository that keeps everything in process memory
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            books: store.clone(),
            people: store,
        }
    }
}

/// Unique constraint violations become conflicts, everything else a database error
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> crate::error::AppError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return crate::error::AppError::Conflict(format!("{} already exists", what));
        }
    }
    crate::error::AppError::Database(e)
}
