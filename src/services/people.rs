//! Person management service

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookStatus, Transition},
        person::{CreatePerson, NewPerson, Person, PersonChanges, UpdatePerson},
        Principal, Role,
    },
    repository::Repository,
};

use super::{
    auth::hash_password,
    guard::{AccessGuard, Action, Resource},
};

#[derive(Clone)]
pub struct PeopleService {
    repository: Repository,
    guard: Arc<AccessGuard>,
}

impl PeopleService {
    pub fn new(repository: Repository, guard: Arc<AccessGuard>) -> Self {
        Self { repository, guard }
    }

    pub async fn list(&self, principal: &Principal) -> AppResult<Vec<Person>> {
        self.guard.require(principal, Action::ListPeople, &Resource::people())?;
        self.repository.people.list(false).await
    }

    pub async fn list_deleted(&self, principal: &Principal) -> AppResult<Vec<Person>> {
        self.guard
            .require(principal, Action::ListDeletedPeople, &Resource::people())?;
        self.repository.people.list(true).await
    }

    pub async fn get(&self, principal: &Principal, id: i64) -> AppResult<Person> {
        self.guard.require(principal, Action::ReadPerson, &Resource::person(id))?;
        self.live_person(id).await
    }

    pub async fn create(&self, principal: &Principal, request: CreatePerson) -> AppResult<Person> {
        self.guard.require(principal, Action::CreatePerson, &Resource::people())?;
        request.validate()?;

        if self.repository.people.name_exists(&request.name, None).await? {
            return Err(AppError::Conflict("Person with this name already exists".to_string()));
        }

        let person = self
            .repository
            .people
            .create(&NewPerson {
                password_hash: hash_password(&request.password)?,
                role: request.role.unwrap_or_default(),
                name: request.name,
                age: request.age,
                email: request.email,
                phone_number: request.phone_number,
                created_by: principal.name().to_string(),
            })
            .await?;

        tracing::info!("Person {} created by {}", person.id, principal.name());
        Ok(person)
    }

    pub async fn update(&self, principal: &Principal, id: i64, request: UpdatePerson) -> AppResult<Person> {
        self.guard.require(principal, Action::UpdatePerson, &Resource::person(id))?;
        request.validate()?;

        let current = self.live_person(id).await?;

        if let Some(role) = request.role {
            if role != current.role && !principal.is_admin() {
                return Err(AppError::Authorization("Only administrators can change roles".to_string()));
            }
        }

        if let Some(ref name) = request.name {
            if self.repository.people.name_exists(name, Some(id)).await? {
                return Err(AppError::Conflict("Person with this name already exists".to_string()));
            }
        }

        let password_hash = match request.password {
            Some(ref password) => Some(hash_password(password)?),
            None => None,
        };

        let changes = PersonChanges {
            name: request.name,
            age: request.age,
            email: request.email,
            phone_number: request.phone_number,
            password_hash,
            role: request.role,
        };

        let person = self.repository.people.update(id, &changes).await?;
        tracing::info!("Person {} updated by {}", id, principal.name());
        Ok(person)
    }

    /// Soft-delete a person. Held books block the deletion unless `force`,
    /// in which case they are returned first.
    pub async fn delete(&self, principal: &Principal, id: i64, force: bool) -> AppResult<()> {
        self.guard.require(principal, Action::DeletePerson, &Resource::person(id))?;
        self.live_person(id).await?;

        let held = self.repository.books.list_by_holder(id).await?;
        if !held.is_empty() {
            if !force {
                return Err(AppError::Conflict(format!(
                    "Person holds {} book(s). Use force=true to release them and delete anyway.",
                    held.len()
                )));
            }

            for book in &held {
                let released = self
                    .repository
                    .books
                    .transition(
                        book.id,
                        &Transition {
                            from: vec![book.status],
                            expected_holder: Some(id),
                            to: BookStatus::Free,
                            holder: None,
                        },
                    )
                    .await?;

                if released.is_none() {
                    tracing::warn!("Book {} changed while deleting person {}", book.id, id);
                }
            }
        }

        self.repository.people.soft_delete(id, principal.name()).await?;
        tracing::info!("Person {} deleted by {}", id, principal.name());
        Ok(())
    }

    /// Books currently assigned to a person
    pub async fn books(&self, principal: &Principal, id: i64) -> AppResult<Vec<Book>> {
        self.guard
            .require(principal, Action::ListPersonBooks, &Resource::person(id))?;
        self.live_person(id).await?;

        let books = self.repository.books.list_by_holder(id).await?;
        Ok(books
            .into_iter()
            .filter(|b| b.status == BookStatus::Assigned)
            .collect())
    }

    async fn live_person(&self, id: i64) -> AppResult<Person> {
        let person = self.repository.people.get(id).await?;
        if person.is_removed() {
            return Err(AppError::NotFound(format!("Person with id {} not found", id)));
        }
        Ok(person)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{book::NewBook, Subject};

    fn admin() -> Principal {
        Principal::new(Subject::new(0, "root"), [Role::Admin])
    }

    fn as_user(person: &Person) -> Principal {
        Principal::new(person.subject(), [Role::User])
    }

    fn request(name: &str) -> CreatePerson {
        CreatePerson {
            name: name.to_string(),
            age: 21,
            email: "someone@example.com".to_string(),
            phone_number: "+79001112233".to_string(),
            password: "pass".to_string(),
            role: None,
        }
    }

    fn setup() -> (PeopleService, Repository) {
        let repository = Repository::in_memory();
        let service = PeopleService::new(repository.clone(), Arc::new(AccessGuard::default()));
        (service, repository)
    }

    async fn assign(repository: &Repository, holder: i64) -> Book {
        let book = repository
            .books
            .create(&NewBook {
                title: "Dead Souls".to_string(),
                author: "Nikolai Gogol".to_string(),
                year_of_production: 1842,
                annotation: "Poem in prose".to_string(),
                cover_image: None,
                created_by: "root".to_string(),
            })
            .await
            .unwrap();

        repository
            .books
            .transition(
                book.id,
                &Transition {
                    from: vec![BookStatus::Free],
                    expected_holder: None,
                    to: BookStatus::Assigned,
                    holder: Some(holder),
                },
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_admin_creates_and_lists() {
        let (people, _) = setup();
        let created = people.create(&admin(), request("Olga Sergeevna Orlova")).await.unwrap();
        assert_eq!(created.role, Role::User);
        assert_eq!(created.created_by.as_deref(), Some("root"));

        let all = people.list(&admin()).await.unwrap();
        assert_eq!(all.len(), 1);

        let err = people.create(&admin(), request("Olga Sergeevna Orlova")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_user_sees_only_self() {
        let (people, _) = setup();
        let olga = people.create(&admin(), request("Olga Sergeevna Orlova")).await.unwrap();
        let petr = people.create(&admin(), request("Petr Ilyich Tchaikovsky")).await.unwrap();

        assert!(people.get(&as_user(&olga), olga.id).await.is_ok());
        let err = people.get(&as_user(&olga), petr.id).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        assert!(matches!(people.list(&as_user(&olga)).await, Err(AppError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_user_cannot_promote_self() {
        let (people, _) = setup();
        let olga = people.create(&admin(), request("Olga Sergeevna Orlova")).await.unwrap();

        let promote = UpdatePerson {
            role: Some(Role::Admin),
            ..Default::default()
        };
        let err = people.update(&as_user(&olga), olga.id, promote.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let renamed = people
            .update(
                &as_user(&olga),
                olga.id,
                UpdatePerson {
                    age: Some(33),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.age, 33);

        let promoted = people.update(&admin(), olga.id, promote).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_delete_requires_force_while_holding_books() {
        let (people, repository) = setup();
        let olga = people.create(&admin(), request("Olga Sergeevna Orlova")).await.unwrap();
        let book = assign(&repository, olga.id).await;

        let held = people.books(&as_user(&olga), olga.id).await.unwrap();
        assert_eq!(held.len(), 1);

        let err = people.delete(&admin(), olga.id, false).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        people.delete(&admin(), olga.id, true).await.unwrap();
        let freed = repository.books.get(book.id).await.unwrap();
        assert_eq!(freed.status, BookStatus::Free);
        assert_eq!(freed.holder_id, None);

        let deleted = people.list_deleted(&admin()).await.unwrap();
        assert_eq!(deleted.iter().map(|p| p.id).collect::<Vec<_>>(), vec![olga.id]);
        assert!(matches!(people.get(&admin(), olga.id).await, Err(AppError::NotFound(_))));
    }
}
