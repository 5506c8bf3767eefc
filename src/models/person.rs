//! Person (library member) model and related types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::principal::{Role, Subject};
use crate::error::AppError;

/// First, middle and last name
pub static FULL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+ [A-Za-z]+ [A-Za-z]+$").expect("valid full name pattern"));

pub static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+7\d{10}$").expect("valid phone pattern"));

/// Internal row structure for database queries
#[derive(Debug, Clone, FromRow)]
pub struct PersonRow {
    id: i64,
    full_name: String,
    age: i32,
    email: String,
    phone_number: String,
    password: String,
    role: String,
    created_at: DateTime<Utc>,
    created_person: Option<String>,
    removed_at: Option<DateTime<Utc>>,
    removed_person: Option<String>,
}

impl TryFrom<PersonRow> for Person {
    type Error = AppError;

    fn try_from(row: PersonRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|e| {
            tracing::error!("Person {} has a corrupt role column: {}", row.id, e);
            AppError::Internal(format!("Person {} has an unknown role", row.id))
        })?;

        Ok(Person {
            id: row.id,
            name: row.full_name,
            age: row.age,
            email: row.email,
            phone_number: row.phone_number,
            password: row.password,
            role,
            created_at: row.created_at,
            created_by: row.created_person,
            removed_at: row.removed_at,
            removed_by: row.removed_person,
        })
    }
}

/// Full person model
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Person {
    pub id: i64,
    /// Full name, also used as the login
    pub name: String,
    pub age: i32,
    pub email: String,
    pub phone_number: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub removed_at: Option<DateTime<Utc>>,
    pub removed_by: Option<String>,
}

impl Person {
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    pub fn subject(&self) -> Subject {
        Subject::new(self.id, self.name.clone())
    }
}

/// Create person request (registration and admin creation)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePerson {
    #[validate(
        length(min = 1, max = 50, message = "Name must be less than 50 characters"),
        regex(path = *FULL_NAME_RE, message = "Name must contain full name (first, middle and last name)")
    )]
    pub name: String,
    #[validate(range(min = 10, message = "Age must be greater than 10"))]
    pub age: i32,
    #[validate(email(message = "Email should be valid"))]
    pub email: String,
    #[validate(regex(path = *PHONE_RE, message = "Phone number must be +7 followed by 10 digits"))]
    pub phone_number: String,
    #[validate(length(min = 4, message = "Password must be at least 4 characters"))]
    pub password: String,
    /// Ignored on self-registration
    pub role: Option<Role>,
}

/// Update person request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdatePerson {
    #[validate(
        length(min = 1, max = 50, message = "Name must be less than 50 characters"),
        regex(path = *FULL_NAME_RE, message = "Name must contain full name (first, middle and last name)")
    )]
    pub name: Option<String>,
    #[validate(range(min = 10, message = "Age must be greater than 10"))]
    pub age: Option<i32>,
    #[validate(email(message = "Email should be valid"))]
    pub email: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "Phone number must be +7 followed by 10 digits"))]
    pub phone_number: Option<String>,
    #[validate(length(min = 4, message = "Password must be at least 4 characters"))]
    pub password: Option<String>,
    /// Only honoured for administrators
    pub role: Option<Role>,
}

/// Person ready to be stored, password already hashed
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub name: String,
    pub age: i32,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
    pub role: Role,
    pub created_by: String,
}

/// Field changes applied by the repository, password already hashed
#[derive(Debug, Clone, Default)]
pub struct PersonChanges {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> PersonRow {
        PersonRow {
            id: 5,
            full_name: "Ivan Petrovich Sidorov".to_string(),
            age: 30,
            email: "ivan@example.com".to_string(),
            phone_number: "+79991234567".to_string(),
            password: "hash".to_string(),
            role: role.to_string(),
            created_at: Utc::now(),
            created_person: None,
            removed_at: None,
            removed_person: None,
        }
    }

    #[test]
    fn test_row_role_parsed() {
        assert_eq!(Person::try_from(row("ROLE_ADMIN")).unwrap().role, Role::Admin);
        let err = Person::try_from(row("ROLE_LIBRARIAN")).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    fn valid() -> CreatePerson {
        CreatePerson {
            name: "Ivan Petrovich Sidorov".to_string(),
            age: 30,
            email: "ivan@example.com".to_string(),
            phone_number: "+79991234567".to_string(),
            password: "secret".to_string(),
            role: None,
        }
    }

    #[test]
    fn test_valid_person() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_name_needs_three_words() {
        let person = CreatePerson {
            name: "Ivan Sidorov".to_string(),
            ..valid()
        };
        let errors = person.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn test_age_and_phone_rules() {
        let person = CreatePerson {
            age: 9,
            phone_number: "89991234567".to_string(),
            ..valid()
        };
        let errors = person.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("age"));
        assert!(fields.contains_key("phone_number"));
    }

    #[test]
    fn test_update_skips_absent_fields() {
        assert!(UpdatePerson::default().validate().is_ok());
        let update = UpdatePerson {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}
