//! Book catalogue, lending and viewing

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookChanges, BookContent, BookStatus, CreateBook, NewBook, Transition, UpdateBook},
        Principal,
    },
    repository::Repository,
};

use super::{
    covers::{self, CoverFetcher},
    guard::{AccessGuard, Action, Resource},
};

/// Cover bytes with their sniffed MIME type
#[derive(Debug, Clone)]
pub struct Cover {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

#[derive(Clone)]
pub struct BooksService {
    repository: Repository,
    guard: Arc<AccessGuard>,
    covers: Arc<dyn CoverFetcher>,
}

impl BooksService {
    pub fn new(repository: Repository, guard: Arc<AccessGuard>, covers: Arc<dyn CoverFetcher>) -> Self {
        Self {
            repository,
            guard,
            covers,
        }
    }

    pub async fn list(&self, principal: &Principal) -> AppResult<Vec<Book>> {
        self.guard.require(principal, Action::ListBooks, &Resource::books())?;
        self.repository.books.list(false).await
    }

    pub async fn list_deleted(&self, principal: &Principal) -> AppResult<Vec<Book>> {
        self.guard
            .require(principal, Action::ListDeletedBooks, &Resource::books())?;
        self.repository.books.list(true).await
    }

    pub async fn get(&self, principal: &Principal, id: i64) -> AppResult<Book> {
        let book = self.live_book(id).await?;
        self.guard.require(principal, Action::ReadBook, &Resource::book(&book))?;
        Ok(book)
    }

    pub async fn create(&self, principal: &Principal, request: CreateBook) -> AppResult<Book> {
        self.guard.require(principal, Action::CreateBook, &Resource::books())?;
        request.validate()?;

        let cover_image = match request.cover_image_url {
            Some(ref url) => Some(self.download_cover(url).await?),
            None => None,
        };

        let book = self
            .repository
            .books
            .create(&NewBook {
                title: request.title,
                author: request.author,
                year_of_production: request.year_of_production,
                annotation: request.annotation,
                cover_image,
                created_by: principal.name().to_string(),
            })
            .await?;

        tracing::info!("Book {} created by {}", book.id, principal.name());
        Ok(book)
    }

    pub async fn update(&self, principal: &Principal, id: i64, request: UpdateBook) -> AppResult<Book> {
        let book = self.live_book(id).await?;
        self.guard.require(principal, Action::UpdateBook, &Resource::book(&book))?;
        request.validate()?;

        let cover_image = match request.cover_image_url {
            Some(ref url) => Some(self.download_cover(url).await?),
            None => None,
        };

        let changes = BookChanges {
            title: request.title,
            author: request.author,
            year_of_production: request.year_of_production,
            annotation: request.annotation,
            cover_image,
        };

        let updated = self.repository.books.update(id, &changes, principal.name()).await?;
        tracing::info!("Book {} updated by {}", id, principal.name());
        Ok(updated)
    }

    /// Soft-delete a book. Only free books can be removed.
    pub async fn delete(&self, principal: &Principal, id: i64) -> AppResult<()> {
        let book = self.live_book(id).await?;
        self.guard.require(principal, Action::DeleteBook, &Resource::book(&book))?;

        if book.status != BookStatus::Free {
            return Err(AppError::Conflict(format!(
                "Book {} is {} and cannot be deleted",
                id, book.status
            )));
        }

        self.repository.books.soft_delete(id, principal.name()).await?;
        tracing::info!("Book {} deleted by {}", id, principal.name());
        Ok(())
    }

    /// Lend a free book to a person
    pub async fn assign(&self, principal: &Principal, book_id: i64, person_id: i64) -> AppResult<Book> {
        let book = self.live_book(book_id).await?;
        self.guard
            .require(principal, Action::AssignBook, &Resource::loan(book.id, person_id))?;

        if !self.person_is_live(person_id).await? {
            return Err(AppError::NotFound(format!("Person with id {} not found", person_id)));
        }

        if book.status != BookStatus::Free {
            return Err(AppError::Conflict(format!("Book {} is not free ({})", book_id, book.status)));
        }

        let assigned = self
            .repository
            .books
            .transition(
                book_id,
                &Transition {
                    from: vec![BookStatus::Free],
                    expected_holder: None,
                    to: BookStatus::Assigned,
                    holder: Some(person_id),
                },
            )
            .await?;

        let Some(assigned) = assigned else {
            if !self.person_is_live(person_id).await? {
                return Err(AppError::NotFound(format!("Person with id {} not found", person_id)));
            }
            return Err(AppError::Conflict(format!("Book {} is no longer free", book_id)));
        };

        tracing::info!("Book {} assigned to person {} by {}", book_id, person_id, principal.name());
        Ok(assigned)
    }

    /// Return an assigned book to the shelf
    pub async fn free(&self, principal: &Principal, book_id: i64) -> AppResult<Book> {
        let book = self.live_book(book_id).await?;
        self.guard.require(principal, Action::FreeBook, &Resource::book(&book))?;

        if book.status != BookStatus::Assigned {
            return Err(AppError::Conflict(format!("Book {} is not assigned ({})", book_id, book.status)));
        }

        let freed = self
            .repository
            .books
            .transition(
                book_id,
                &Transition {
                    from: vec![BookStatus::Assigned],
                    expected_holder: book.holder_id,
                    to: BookStatus::Free,
                    holder: None,
                },
            )
            .await?
            .ok_or_else(|| AppError::Conflict(format!("Book {} changed concurrently", book_id)))?;

        tracing::info!("Book {} freed by {}", book_id, principal.name());
        Ok(freed)
    }

    /// Start viewing the cover. The book stays VIEWING_COVER until released.
    pub async fn view_cover(&self, principal: &Principal, book_id: i64) -> AppResult<Cover> {
        let book = self.live_book(book_id).await?;
        self.guard.require(principal, Action::ViewCover, &Resource::book(&book))?;

        let bytes = book
            .cover_image
            .clone()
            .ok_or_else(|| AppError::NotFound(format!("Book {} has no cover image", book_id)))?;
        let mime_type = covers::detect_mime(&bytes)
            .ok_or_else(|| AppError::Internal(format!("Stored cover of book {} has an unknown format", book_id)))?;

        self.start_viewing(principal, &book, BookStatus::ViewingCover).await?;
        Ok(Cover { bytes, mime_type })
    }

    /// Start reading the content. The book stays VIEWING_CONTENT until released.
    pub async fn view_content(&self, principal: &Principal, book_id: i64) -> AppResult<BookContent> {
        let book = self.live_book(book_id).await?;
        self.guard.require(principal, Action::ViewContent, &Resource::book(&book))?;

        let viewed = self.start_viewing(principal, &book, BookStatus::ViewingContent).await?;
        Ok(BookContent::from(&viewed))
    }

    /// Finish a viewing. Books that are not being viewed are returned unchanged.
    pub async fn release(&self, principal: &Principal, book_id: i64) -> AppResult<Book> {
        let book = self.live_book(book_id).await?;
        if !book.status.is_viewing() {
            return Ok(book);
        }
        self.guard.require(principal, Action::ReleaseView, &Resource::book(&book))?;

        let released = self
            .repository
            .books
            .transition(
                book_id,
                &Transition {
                    from: vec![BookStatus::ViewingCover, BookStatus::ViewingContent],
                    expected_holder: book.holder_id,
                    to: BookStatus::Free,
                    holder: None,
                },
            )
            .await?;

        match released {
            Some(book) => {
                tracing::debug!("Book {} released by {}", book_id, principal.name());
                Ok(book)
            }
            // someone else released it first
            None => self.live_book(book_id).await,
        }
    }

    /// Cover URLs of every live book that has a cover
    pub async fn cover_urls(&self, principal: &Principal) -> AppResult<Vec<String>> {
        self.guard.require(principal, Action::ListBooks, &Resource::books())?;
        let books = self.repository.books.list(false).await?;
        Ok(books.iter().filter(|b| b.has_cover()).map(Book::cover_url).collect())
    }

    async fn start_viewing(&self, principal: &Principal, book: &Book, to: BookStatus) -> AppResult<Book> {
        let viewer = principal.person_id();
        if !self.person_is_live(viewer).await? {
            return Err(account_gone(viewer));
        }

        if book.status != BookStatus::Free {
            return Err(AppError::Conflict(format!(
                "Book {} is not available for viewing ({})",
                book.id, book.status
            )));
        }

        let viewed = self
            .repository
            .books
            .transition(
                book.id,
                &Transition {
                    from: vec![BookStatus::Free],
                    expected_holder: None,
                    to,
                    holder: Some(viewer),
                },
            )
            .await?;

        let Some(viewed) = viewed else {
            if !self.person_is_live(viewer).await? {
                return Err(account_gone(viewer));
            }
            return Err(AppError::Conflict(format!("Book {} is no longer free", book.id)));
        };

        tracing::debug!("Book {} now {} by {}", book.id, to, principal.name());
        Ok(viewed)
    }

    async fn download_cover(&self, url: &str) -> AppResult<Vec<u8>> {
        let bytes = self.covers.fetch(url).await?;
        covers::ensure_image(&bytes)?;
        Ok(bytes)
    }

    async fn person_is_live(&self, id: i64) -> AppResult<bool> {
        match self.repository.people.get(id).await {
            Ok(person) => Ok(!person.is_removed()),
            Err(AppError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn live_book(&self, id: i64) -> AppResult<Book> {
        let book = self.repository.books.get(id).await?;
        if book.is_removed() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(book)
    }
}

/// A valid token can outlive the person it was issued to
fn account_gone(person_id: i64) -> AppError {
    tracing::warn!("Person {} tried to view a book after being removed", person_id);
    AppError::Authentication("Account no longer exists".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{person::NewPerson, Role, Subject},
        repository::{memory::MemoryStore, BooksRepository},
        services::covers::MockCoverFetcher,
    };

    const PNG: [u8; 12] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    fn admin() -> Principal {
        Principal::new(Subject::new(0, "root"), [Role::Admin])
    }

    fn user(id: i64) -> Principal {
        Principal::new(Subject::new(id, format!("user{}", id)), [Role::User])
    }

    fn create_request(cover: Option<&str>) -> CreateBook {
        CreateBook {
            title: "Crime and Punishment".to_string(),
            author: "Fyodor Dostoevsky".to_string(),
            year_of_production: 1866,
            annotation: "A novel about guilt".to_string(),
            cover_image_url: cover.map(str::to_string),
        }
    }

    async fn seed_people(repository: &Repository) -> Vec<i64> {
        let mut ids = Vec::new();
        for name in ["Anna Petrovna Ivanova", "Boris Petrovich Ivanov"] {
            let person = repository
                .people
                .create(&NewPerson {
                    name: name.to_string(),
                    age: 30,
                    email: "p@example.com".to_string(),
                    phone_number: "+71112223344".to_string(),
                    password_hash: "x".to_string(),
                    role: Role::User,
                    created_by: "root".to_string(),
                })
                .await
                .unwrap();
            ids.push(person.id);
        }
        ids
    }

    async fn setup(fetcher: MockCoverFetcher) -> (BooksService, Vec<i64>) {
        let repository = Repository::in_memory();
        let ids = seed_people(&repository).await;
        let service = BooksService::new(repository, Arc::new(AccessGuard::default()), Arc::new(fetcher));
        (service, ids)
    }

    /// Lends the book to `borrower` right before every soft delete
    struct LendsBeforeDelete {
        store: Arc<MemoryStore>,
        borrower: i64,
    }

    #[async_trait::async_trait]
    impl BooksRepository for LendsBeforeDelete {
        async fn list(&self, removed: bool) -> AppResult<Vec<Book>> {
            BooksRepository::list(self.store.as_ref(), removed).await
        }

        async fn list_by_holder(&self, person_id: i64) -> AppResult<Vec<Book>> {
            self.store.list_by_holder(person_id).await
        }

        async fn get(&self, id: i64) -> AppResult<Book> {
            BooksRepository::get(self.store.as_ref(), id).await
        }

        async fn create(&self, book: &NewBook) -> AppResult<Book> {
            BooksRepository::create(self.store.as_ref(), book).await
        }

        async fn update(&self, id: i64, changes: &BookChanges, updated_by: &str) -> AppResult<Book> {
            BooksRepository::update(self.store.as_ref(), id, changes, updated_by).await
        }

        async fn soft_delete(&self, id: i64, removed_by: &str) -> AppResult<()> {
            let lent = Transition {
                from: vec![BookStatus::Free],
                expected_holder: None,
                to: BookStatus::Assigned,
                holder: Some(self.borrower),
            };
            self.store.transition(id, &lent).await?;
            BooksRepository::soft_delete(self.store.as_ref(), id, removed_by).await
        }

        async fn transition(&self, id: i64, transition: &Transition) -> AppResult<Option<Book>> {
            self.store.transition(id, transition).await
        }
    }

    #[tokio::test]
    async fn test_only_admin_creates_books() {
        let (books, ids) = setup(MockCoverFetcher::new()).await;

        let err = books.create(&user(ids[0]), create_request(None)).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let book = books.create(&admin(), create_request(None)).await.unwrap();
        assert_eq!(book.status, BookStatus::Free);
        assert_eq!(book.created_by.as_deref(), Some("root"));
        assert_eq!(books.list(&user(ids[0])).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_downloads_cover() {
        let mut fetcher = MockCoverFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url| url == "https://covers.example/1.png")
            .times(1)
            .returning(|_| Ok(PNG.to_vec()));
        let (books, ids) = setup(fetcher).await;

        let book = books
            .create(&admin(), create_request(Some("https://covers.example/1.png")))
            .await
            .unwrap();
        assert!(book.has_cover());
        assert_eq!(books.cover_urls(&admin()).await.unwrap(), vec![book.cover_url()]);

        let cover = books.view_cover(&user(ids[0]), book.id).await.unwrap();
        assert_eq!(cover.mime_type, "image/png");
        assert_eq!(cover.bytes, PNG.to_vec());
    }

    #[tokio::test]
    async fn test_non_image_cover_rejected() {
        let mut fetcher = MockCoverFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(b"<html>not an image</html>".to_vec()));
        let (books, _) = setup(fetcher).await;

        let err = books
            .create(&admin(), create_request(Some("https://covers.example/page")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(books.list(&admin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assign_and_free() {
        let (books, ids) = setup(MockCoverFetcher::new()).await;
        let (anna, boris) = (ids[0], ids[1]);
        let book = books.create(&admin(), create_request(None)).await.unwrap();

        // users may only borrow for themselves
        let err = books.assign(&user(anna), book.id, boris).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let assigned = books.assign(&user(anna), book.id, anna).await.unwrap();
        assert_eq!(assigned.status, BookStatus::Assigned);
        assert_eq!(assigned.holder_id, Some(anna));

        let err = books.assign(&admin(), book.id, boris).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = books.free(&user(boris), book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let freed = books.free(&user(anna), book.id).await.unwrap();
        assert_eq!(freed.status, BookStatus::Free);
        assert_eq!(freed.holder_id, None);

        let err = books.free(&admin(), book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_assign_to_unknown_person() {
        let (books, _) = setup(MockCoverFetcher::new()).await;
        let book = books.create(&admin(), create_request(None)).await.unwrap();
        let err = books.assign(&admin(), book.id, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_assign_single_winner() {
        let (books, ids) = setup(MockCoverFetcher::new()).await;
        let book_id = books.create(&admin(), create_request(None)).await.unwrap().id;

        let mut handles = Vec::new();
        for person_id in ids.iter().copied().cycle().take(8) {
            let books = books.clone();
            handles.push(tokio::spawn(async move {
                books.assign(&admin(), book_id, person_id).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert!(matches!(e, AppError::Conflict(_))),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_view_content_and_release() {
        let (books, ids) = setup(MockCoverFetcher::new()).await;
        let (anna, boris) = (ids[0], ids[1]);
        let book = books.create(&admin(), create_request(None)).await.unwrap();

        let content = books.view_content(&user(anna), book.id).await.unwrap();
        assert_eq!(content.title, "Crime and Punishment");

        let viewing = books.get(&user(boris), book.id).await.unwrap();
        assert_eq!(viewing.status, BookStatus::ViewingContent);

        let err = books.view_content(&user(boris), book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = books.assign(&admin(), book.id, boris).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = books.release(&user(boris), book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let released = books.release(&user(anna), book.id).await.unwrap();
        assert_eq!(released.status, BookStatus::Free);

        // releasing a free book is a no-op
        let again = books.release(&user(boris), book.id).await.unwrap();
        assert_eq!(again.status, BookStatus::Free);
    }

    #[tokio::test]
    async fn test_view_cover_without_cover() {
        let (books, ids) = setup(MockCoverFetcher::new()).await;
        let book = books.create(&admin(), create_request(None)).await.unwrap();

        let err = books.view_cover(&user(ids[0]), book.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(books.get(&admin(), book.id).await.unwrap().status, BookStatus::Free);
    }

    #[tokio::test]
    async fn test_delete_and_list_deleted() {
        let (books, ids) = setup(MockCoverFetcher::new()).await;
        let book = books.create(&admin(), create_request(None)).await.unwrap();

        let err = books.delete(&user(ids[0]), book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        books.delete(&admin(), book.id).await.unwrap();
        assert!(books.list(&admin()).await.unwrap().is_empty());
        assert_eq!(books.list_deleted(&admin()).await.unwrap().len(), 1);
        assert!(matches!(books.get(&admin(), book.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(books.list_deleted(&user(ids[0])).await, Err(AppError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_update_book() {
        let (books, _) = setup(MockCoverFetcher::new()).await;
        let book = books.create(&admin(), create_request(None)).await.unwrap();

        let updated = books
            .update(
                &admin(),
                book.id,
                UpdateBook {
                    title: Some("The Idiot".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "The Idiot");
        assert_eq!(updated.author, "Fyodor Dostoevsky");

        let err = books
            .update(
                &admin(),
                book.id,
                UpdateBook {
                    year_of_production: Some(12),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_book_in_use_conflicts() {
        let (books, ids) = setup(MockCoverFetcher::new()).await;
        let assigned = books.create(&admin(), create_request(None)).await.unwrap();
        let viewed = books.create(&admin(), create_request(None)).await.unwrap();
        books.assign(&admin(), assigned.id, ids[0]).await.unwrap();
        books.view_content(&user(ids[1]), viewed.id).await.unwrap();

        for id in [assigned.id, viewed.id] {
            let err = books.delete(&admin(), id).await.unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)));
        }
        assert_eq!(books.list(&admin()).await.unwrap().len(), 2);
        assert!(books.list_deleted(&admin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_loses_race_with_assign() {
        let store = Arc::new(MemoryStore::default());
        let ids = seed_people(&Repository {
            books: store.clone(),
            people: store.clone(),
        })
        .await;
        let repository = Repository {
            books: Arc::new(LendsBeforeDelete {
                store: store.clone(),
                borrower: ids[0],
            }),
            people: store,
        };
        let books = BooksService::new(
            repository,
            Arc::new(AccessGuard::default()),
            Arc::new(MockCoverFetcher::new()),
        );
        let book = books.create(&admin(), create_request(None)).await.unwrap();

        let err = books.delete(&admin(), book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = books.get(&admin(), book.id).await.unwrap();
        assert!(!stored.is_removed());
        assert_eq!(stored.status, BookStatus::Assigned);
        assert_eq!(stored.holder_id, Some(ids[0]));
    }

    #[tokio::test]
    async fn test_removed_person_cannot_take_books() {
        let (books, ids) = setup(MockCoverFetcher::new()).await;
        let book = books.create(&admin(), create_request(None)).await.unwrap();
        books.repository.people.soft_delete(ids[1], "root").await.unwrap();

        // their token is still valid, the account is not
        let err = books.view_content(&user(ids[1]), book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
        let err = books.assign(&admin(), book.id, ids[1]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let stored = books.get(&admin(), book.id).await.unwrap();
        assert_eq!(stored.status, BookStatus::Free);
        assert_eq!(stored.holder_id, None);
    }
}
