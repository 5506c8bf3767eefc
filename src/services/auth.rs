//! Registration, login and password hashing

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    config::AdminConfig,
    error::{AppError, AppResult},
    models::{
        person::{CreatePerson, NewPerson, Person},
        Principal, Role,
    },
    repository::Repository,
};

use super::tokens::{IssuedToken, TokenService};

const BAD_CREDENTIALS: &str = "Invalid name or password";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(repository: Repository, tokens: TokenService) -> Self {
        Self { repository, tokens }
    }

    /// Self-service sign up. The account always gets `ROLE_USER`.
    pub async fn register(&self, request: CreatePerson) -> AppResult<(IssuedToken, Person)> {
        request.validate()?;

        if request.role.is_some_and(|role| role != Role::User) {
            tracing::warn!("Ignoring requested role {:?} on registration of {}", request.role, request.name);
        }

        if self.repository.people.name_exists(&request.name, None).await? {
            return Err(AppError::Conflict("Person with this name already exists".to_string()));
        }

        let person = self
            .repository
            .people
            .create(&NewPerson {
                password_hash: hash_password(&request.password)?,
                created_by: request.name.clone(),
                name: request.name,
                age: request.age,
                email: request.email,
                phone_number: request.phone_number,
                role: Role::User,
            })
            .await?;

        tracing::info!("Registered person {} ({})", person.id, person.name);
        let issued = self.issue_for(&person)?;
        Ok((issued, person))
    }

    /// Check a name/password pair and issue a token
    pub async fn login(&self, name: &str, password: &str) -> AppResult<(IssuedToken, Person)> {
        let person = self
            .repository
            .people
            .find_by_name(name)
            .await?
            .filter(|p| !p.is_removed())
            .ok_or_else(|| AppError::Authentication(BAD_CREDENTIALS.to_string()))?;

        if !verify_password(&person.password, password)? {
            tracing::info!("Failed login for {}", name);
            return Err(AppError::Authentication(BAD_CREDENTIALS.to_string()));
        }

        let issued = self.issue_for(&person)?;
        tracing::info!("Person {} logged in", person.id);
        Ok((issued, person))
    }

    /// Stored profile of the authenticated caller
    pub async fn me(&self, principal: &Principal) -> AppResult<Person> {
        let person = self.repository.people.get(principal.person_id()).await?;
        if person.is_removed() {
            return Err(AppError::Authentication("Account no longer exists".to_string()));
        }
        Ok(person)
    }

    /// Create the configured administrator unless a person with that name exists
    pub async fn ensure_admin(&self, admin: &AdminConfig) -> AppResult<Person> {
        if let Some(existing) = self.repository.people.find_by_name(&admin.name).await? {
            return Ok(existing);
        }

        let request = CreatePerson {
            name: admin.name.clone(),
            age: admin.age,
            email: admin.email.clone(),
            phone_number: admin.phone_number.clone(),
            password: admin.password.clone(),
            role: Some(Role::Admin),
        };
        request.validate()?;

        let person = self
            .repository
            .people
            .create(&NewPerson {
                password_hash: hash_password(&request.password)?,
                created_by: "system".to_string(),
                name: request.name,
                age: request.age,
                email: request.email,
                phone_number: request.phone_number,
                role: Role::Admin,
            })
            .await?;

        tracing::info!("Created administrator {} ({})", person.id, person.name);
        Ok(person)
    }

    fn issue_for(&self, person: &Person) -> AppResult<IssuedToken> {
        Ok(self.tokens.issue(&person.subject(), &[person.role])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn service() -> AuthService {
        let tokens = TokenService::new(&AuthConfig::default()).unwrap();
        AuthService::new(Repository::in_memory(), tokens)
    }

    fn request(name: &str) -> CreatePerson {
        CreatePerson {
            name: name.to_string(),
            age: 25,
            email: "reader@example.com".to_string(),
            phone_number: "+71234567890".to_string(),
            password: "secret".to_string(),
            role: None,
        }
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("secret").unwrap();
        assert_ne!(hash, "secret");
        assert!(verify_password(&hash, "secret").unwrap());
        assert!(!verify_password(&hash, "other").unwrap());
        assert!(verify_password("not-a-hash", "secret").is_err());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service();
        let (issued, person) = auth.register(request("Anna Petrovna Ivanova")).await.unwrap();
        assert_eq!(person.role, Role::User);
        assert!(issued.expires_at > chrono::Utc::now());

        let principal = auth.tokens.verify(&issued.credential).unwrap();
        assert_eq!(principal.person_id(), person.id);

        let (_, logged_in) = auth.login("Anna Petrovna Ivanova", "secret").await.unwrap();
        assert_eq!(logged_in.id, person.id);

        let me = auth.me(&principal).await.unwrap();
        assert_eq!(me.name, "Anna Petrovna Ivanova");
    }

    #[tokio::test]
    async fn test_register_never_grants_admin() {
        let auth = service();
        let mut req = request("Ivan Ivanovich Ivanov");
        req.role = Some(Role::Admin);

        let (issued, person) = auth.register(req).await.unwrap();
        assert_eq!(person.role, Role::User);
        assert!(!auth.tokens.verify(&issued.credential).unwrap().is_admin());
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let auth = service();
        auth.register(request("Anna Petrovna Ivanova")).await.unwrap();
        let err = auth.register(request("Anna Petrovna Ivanova")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let auth = service();
        auth.register(request("Anna Petrovna Ivanova")).await.unwrap();

        let wrong_password = auth.login("Anna Petrovna Ivanova", "nope").await.unwrap_err();
        let unknown = auth.login("Nobody Known Here", "secret").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown.to_string());
        assert!(matches!(unknown, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let auth = service();
        let admin = AdminConfig {
            name: "Library Admin Account".to_string(),
            password: "admin-pass".to_string(),
            email: "admin@example.com".to_string(),
            phone_number: "+70000000000".to_string(),
            age: 40,
        };

        let first = auth.ensure_admin(&admin).await.unwrap();
        let second = auth.ensure_admin(&admin).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.role, Role::Admin);

        let (issued, _) = auth.login("Library Admin Account", "admin-pass").await.unwrap();
        assert!(auth.tokens.verify(&issued.credential).unwrap().is_admin());
    }
}
