//! Business logic services

pub mod auth;
pub mod books;
pub mod covers;
pub mod guard;
pub mod people;
pub mod tokens;

use std::sync::Arc;

use crate::{config::AuthConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub books: books::BooksService,
    pub people: people::PeopleService,
    pub tokens: tokens::TokenService,
    pub guard: Arc<guard::AccessGuard>,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        auth_config: &AuthConfig,
        covers: Arc<dyn covers::CoverFetcher>,
    ) -> AppResult<Self> {
        let tokens = tokens::TokenService::new(auth_config)?;
        let guard = Arc::new(guard::AccessGuard::default());

        Ok(Self {
            auth: auth::AuthService::new(repository.clone(), tokens.clone()),
            books: books::BooksService::new(repository.clone(), guard.clone(), covers),
            people: people::PeopleService::new(repository, guard.clone()),
            tokens,
            guard,
        })
    }
}
