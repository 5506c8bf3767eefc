//! In-memory store used when no database is configured

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{BooksRepository, PeopleRepository};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookChanges, BookStatus, NewBook, Transition},
        person::{NewPerson, Person, PersonChanges},
    },
};

#[derive(Default)]
struct Tables {
    books: BTreeMap<i64, Book>,
    people: BTreeMap<i64, Person>,
    next_book_id: i64,
    next_person_id: i64,
}

/// Both tables behind one lock so every write is a single critical section
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn book_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn person_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Person with id {} not found", id))
}

#[async_trait]
impl BooksRepository for MemoryStore {
    async fn list(&self, removed: bool) -> AppResult<Vec<Book>> {
        let tables = self.tables.read().await;
        Ok(tables
            .books
            .values()
            .filter(|b| b.is_removed() == removed)
            .cloned()
            .collect())
    }

    async fn list_by_holder(&self, person_id: i64) -> AppResult<Vec<Book>> {
        let tables = self.tables.read().await;
        Ok(tables
            .books
            .values()
            .filter(|b| !b.is_removed() && b.holder_id == Some(person_id))
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> AppResult<Book> {
        let tables = self.tables.read().await;
        tables.books.get(&id).cloned().ok_or_else(|| book_not_found(id))
    }

    async fn create(&self, book: &NewBook) -> AppResult<Book> {
        let mut tables = self.tables.write().await;
        tables.next_book_id += 1;
        let now = Utc::now();

        let created = Book {
            id: tables.next_book_id,
            title: book.title.clone(),
            author: book.author.clone(),
            year_of_production: book.year_of_production,
            annotation: book.annotation.clone(),
            cover_image: book.cover_image.clone().filter(|bytes| !bytes.is_empty()),
            status: BookStatus::Free,
            holder_id: None,
            created_at: now,
            created_by: Some(book.created_by.clone()),
            updated_at: now,
            updated_by: Some(book.created_by.clone()),
            removed_at: None,
            removed_by: None,
        };

        tables.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, changes: &BookChanges, updated_by: &str) -> AppResult<Book> {
        let mut tables = self.tables.write().await;
        let book = tables
            .books
            .get_mut(&id)
            .filter(|b| !b.is_removed())
            .ok_or_else(|| book_not_found(id))?;

        if let Some(ref title) = changes.title {
            book.title = title.clone();
        }
        if let Some(ref author) = changes.author {
            book.author = author.clone();
        }
        if let Some(year) = changes.year_of_production {
            book.year_of_production = year;
        }
        if let Some(ref annotation) = changes.annotation {
            book.annotation = annotation.clone();
        }
        if let Some(ref cover) = changes.cover_image {
            book.cover_image = Some(cover.clone());
        }
        book.updated_at = Utc::now();
        book.updated_by = Some(updated_by.to_string());

        Ok(book.clone())
    }

    async fn soft_delete(&self, id: i64, removed_by: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let book = tables
            .books
            .get_mut(&id)
            .filter(|b| !b.is_removed())
            .ok_or_else(|| book_not_found(id))?;

        if book.status != BookStatus::Free || book.holder_id.is_some() {
            return Err(AppError::Conflict(format!(
                "Book {} is {} and cannot be deleted",
                id, book.status
            )));
        }

        book.removed_at = Some(Utc::now());
        book.removed_by = Some(removed_by.to_string());
        Ok(())
    }

    async fn transition(&self, id: i64, transition: &Transition) -> AppResult<Option<Book>> {
        let mut tables = self.tables.write().await;
        if let Some(holder) = transition.holder {
            if !tables.people.get(&holder).is_some_and(|p| !p.is_removed()) {
                return Ok(None);
            }
        }

        let Some(book) = tables.books.get_mut(&id).filter(|b| !b.is_removed()) else {
            return Ok(None);
        };

        if !transition.from.contains(&book.status) || book.holder_id != transition.expected_holder {
            return Ok(None);
        }

        book.status = transition.to;
        book.holder_id = transition.holder;
        book.updated_at = Utc::now();
        Ok(Some(book.clone()))
    }
}

#[async_trait]
impl PeopleRepository for MemoryStore {
    async fn list(&self, removed: bool) -> AppResult<Vec<Person>> {
        let tables = self.tables.read().await;
        Ok(tables
            .people
            .values()
            .filter(|p| p.is_removed() == removed)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> AppResult<Person> {
        let tables = self.tables.read().await;
        tables.people.get(&id).cloned().ok_or_else(|| person_not_found(id))
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Person>> {
        let tables = self.tables.read().await;
        Ok(tables.people.values().find(|p| p.name == name).cloned())
    }

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .people
            .values()
            .any(|p| p.name == name && Some(p.id) != exclude_id))
    }

    async fn create(&self, person: &NewPerson) -> AppResult<Person> {
        let mut tables = self.tables.write().await;
        if tables.people.values().any(|p| p.name == person.name) {
            return Err(AppError::Conflict("Person with this name already exists".to_string()));
        }

        tables.next_person_id += 1;
        let created = Person {
            id: tables.next_person_id,
            name: person.name.clone(),
            age: person.age,
            email: person.email.clone(),
            phone_number: person.phone_number.clone(),
            password: person.password_hash.clone(),
            role: person.role,
            created_at: Utc::now(),
            created_by: Some(person.created_by.clone()),
            removed_at: None,
            removed_by: None,
        };

        tables.people.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, changes: &PersonChanges) -> AppResult<Person> {
        let mut tables = self.tables.write().await;
        if let Some(ref name) = changes.name {
            if tables.people.values().any(|p| &p.name == name && p.id != id) {
                return Err(AppError::Conflict("Person with this name already exists".to_string()));
            }
        }

        let person = tables
            .people
            .get_mut(&id)
            .filter(|p| !p.is_removed())
            .ok_or_else(|| person_not_found(id))?;

        if let Some(ref name) = changes.name {
            person.name = name.clone();
        }
        if let Some(age) = changes.age {
            person.age = age;
        }
        if let Some(ref email) = changes.email {
            person.email = email.clone();
        }
        if let Some(ref phone) = changes.phone_number {
            person.phone_number = phone.clone();
        }
        if let Some(ref hash) = changes.password_hash {
            person.password = hash.clone();
        }
        if let Some(role) = changes.role {
            person.role = role;
        }

        Ok(person.clone())
    }

    async fn soft_delete(&self, id: i64, removed_by: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let holds_books = tables
            .books
            .values()
            .any(|b| !b.is_removed() && b.holder_id == Some(id));
        if holds_books && tables.people.get(&id).is_some_and(|p| !p.is_removed()) {
            return Err(AppError::Conflict(format!("Person {} still holds books", id)));
        }

        let person = tables
            .people
            .get_mut(&id)
            .filter(|p| !p.is_removed())
            .ok_or_else(|| person_not_found(id))?;

        person.removed_at = Some(Utc::now());
        person.removed_by = Some(removed_by.to_string());
        Ok(())
    }
}
