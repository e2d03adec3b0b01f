use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{query, query_as, Pool, Postgres};

use crate::domain::fraud::IdentityContent;
use crate::domain::user::{Deposit, NewDeposit, NewUser, User};
use crate::infrastructure::error::{AppError, AppResult};

const USER_COLUMNS: &str = "id, email, first_name, last_name, birth_date, roles, password_hash, \
     is_active, is_email_validated, id_piece_number, phone_number, date_created";

/// Utilisateurs et crédits
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, user_id: i64) -> AppResult<User>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn create_user(&self, new_user: &NewUser) -> AppResult<User>;
    async fn update_roles(&self, user_id: i64, roles: &[String]) -> AppResult<()>;
    /// Reporte sur le compte l'identité issue d'une vérification
    async fn update_identity(&self, user_id: i64, identity: &IdentityContent) -> AppResult<()>;

    /// Comptes ayant mêmes prénom, nom et date de naissance (sans casse)
    async fn find_by_identity(
        &self,
        first_name: &str,
        last_name: &str,
        birth_date: NaiveDate,
    ) -> AppResult<Vec<User>>;
    async fn find_by_id_piece_number(&self, id_piece_number: &str) -> AppResult<Option<User>>;

    async fn list_deposits(&self, user_id: i64) -> AppResult<Vec<Deposit>>;
    async fn create_deposit(&self, deposit: &NewDeposit) -> AppResult<Deposit>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_user(&self, user_id: i64) -> AppResult<User> {
        query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Utilisateur {}", user_id)))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, new_user: &NewUser) -> AppResult<User> {
        let roles: Vec<String> = new_user
            .roles
            .iter()
            .map(|role| role.as_str().to_string())
            .collect();

        let user = query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (
                email, first_name, last_name, birth_date, roles, password_hash,
                is_email_validated, id_piece_number, phone_number
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(new_user.birth_date)
        .bind(&roles)
        .bind(&new_user.password_hash)
        .bind(new_user.is_email_validated)
        .bind(&new_user.id_piece_number)
        .bind(&new_user.phone_number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("Email déjà utilisé".to_string()),
            other => other,
        })?;

        Ok(user)
    }

    async fn update_roles(&self, user_id: i64, roles: &[String]) -> AppResult<()> {
        query("UPDATE users SET roles = $2 WHERE id = $1")
            .bind(user_id)
            .bind(roles)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_identity(&self, user_id: i64, identity: &IdentityContent) -> AppResult<()> {
        query(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                birth_date = COALESCE($4, birth_date),
                id_piece_number = COALESCE($5, id_piece_number)
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.birth_date)
        .bind(&identity.id_piece_number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_identity(
        &self,
        first_name: &str,
        last_name: &str,
        birth_date: NaiveDate,
    ) -> AppResult<Vec<User>> {
        let users = query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(first_name) = LOWER($1) \
             AND LOWER(last_name) = LOWER($2) AND birth_date = $3",
            USER_COLUMNS
        ))
        .bind(first_name)
        .bind(last_name)
        .bind(birth_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn find_by_id_piece_number(&self, id_piece_number: &str) -> AppResult<Option<User>> {
        let user = query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id_piece_number = $1",
            USER_COLUMNS
        ))
        .bind(id_piece_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_deposits(&self, user_id: i64) -> AppResult<Vec<Deposit>> {
        let deposits = query_as::<_, Deposit>(
            "SELECT id, user_id, amount, source, date_created, expiration_date \
             FROM deposit WHERE user_id = $1 ORDER BY date_created",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(deposits)
    }

    async fn create_deposit(&self, deposit: &NewDeposit) -> AppResult<Deposit> {
        let created = query_as::<_, Deposit>(
            r#"
            INSERT INTO deposit (user_id, amount, source, expiration_date)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, amount, source, date_created, expiration_date
            "#,
        )
        .bind(deposit.user_id)
        .bind(deposit.amount)
        .bind(&deposit.source)
        .bind(deposit.expiration_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }
}
