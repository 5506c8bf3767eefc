//! People repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{map_unique_violation, PeopleRepository};
use crate::{
    error::{AppError, AppResult},
    models::person::{NewPerson, Person, PersonChanges, PersonRow},
};

#[derive(Clone)]
pub struct PgPeopleRepository {
    pool: Pool<Postgres>,
}

impl PgPeopleRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PeopleRepository for PgPeopleRepository {
    async fn list(&self, removed: bool) -> AppResult<Vec<Person>> {
        let sql = if removed {
            "SELECT * FROM person WHERE removed_at IS NOT NULL ORDER BY id"
        } else {
            "SELECT * FROM person WHERE removed_at IS NULL ORDER BY id"
        };

        let rows = sqlx::query_as::<_, PersonRow>(sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Person::try_from).collect()
    }

    async fn get(&self, id: i64) -> AppResult<Person> {
        sqlx::query_as::<_, PersonRow>("SELECT * FROM person WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Person::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Person with id {} not found", id)))
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Person>> {
        let row = sqlx::query_as::<_, PersonRow>("SELECT * FROM person WHERE full_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Person::try_from).transpose()
    }

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM person WHERE full_name = $1 AND id IS DISTINCT FROM $2)",
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn create(&self, person: &NewPerson) -> AppResult<Person> {
        let row = sqlx::query_as::<_, PersonRow>(
            r#"
            INSERT INTO person (full_name, age, email, phone_number, password, role, created_at, created_person)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7)
            RETURNING *
            "#,
        )
        .bind(&person.name)
        .bind(person.age)
        .bind(&person.email)
        .bind(&person.phone_number)
        .bind(&person.password_hash)
        .bind(person.role.as_str())
        .bind(&person.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Person with this name"))?;

        Person::try_from(row)
    }

    async fn update(&self, id: i64, changes: &PersonChanges) -> AppResult<Person> {
        sqlx::query_as::<_, PersonRow>(
            r#"
            UPDATE person SET
                full_name = COALESCE($2, full_name),
                age = COALESCE($3, age),
                email = COALESCE($4, email),
                phone_number = COALESCE($5, phone_number),
                password = COALESCE($6, password),
                role = COALESCE($7, role)
            WHERE id = $1 AND removed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(changes.age)
        .bind(&changes.email)
        .bind(&changes.phone_number)
        .bind(&changes.password_hash)
        .bind(changes.role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Person with this name"))?
        .map(Person::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound(format!("Person with id {} not found", id)))
    }

    async fn soft_delete(&self, id: i64, removed_by: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE person SET removed_at = NOW(), removed_person = $2
            WHERE id = $1
              AND removed_at IS NULL
              AND NOT EXISTS (SELECT 1 FROM book WHERE person_id = $1 AND removed_at IS NULL)
            "#,
        )
        .bind(id)
        .bind(removed_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let person = self.get(id).await?;
            if person.is_removed() {
                return Err(AppError::NotFound(format!("Person with id {} not found", id)));
            }
            return Err(AppError::Conflict(format!("Person {} still holds books", id)));
        }

        Ok(())
    }
}
