use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{
    LoginGrant, NewUser, PendingAuthorization, Project, Store, StoreError, User, DEFAULT_ROLE,
};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, provider, role, bookmarked, image_url, created_at";

/// Postgres-backed `Store`.
#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, new: NewUser<'_>) -> Result<User, StoreError> {
        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, provider, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.id)
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.provider.as_str())
        .bind(DEFAULT_ROLE)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db))
                if db.is_unique_violation() && db.constraint() == Some("users_email_key") =>
            {
                Err(StoreError::EmailTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_image_url(&self, user_id: Uuid, image_url: &str) -> Result<bool, StoreError> {
        let done = sqlx::query("UPDATE users SET image_url = $2 WHERE id = $1")
            .bind(user_id)
            .bind(image_url)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn save_pending_authorization(
        &self,
        pending: &PendingAuthorization,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM oauth_states WHERE expires_at <= $1")
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO oauth_states (csrf_state, pkce_verifier, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&pending.csrf_state)
        .bind(&pending.pkce_verifier)
        .bind(pending.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_pending_authorization(
        &self,
        csrf_state: &str,
    ) -> Result<Option<PendingAuthorization>, StoreError> {
        let row = sqlx::query_as::<_, PendingAuthorization>(
            r#"
            DELETE FROM oauth_states
            WHERE csrf_state = $1 AND expires_at > $2
            RETURNING csrf_state, pkce_verifier, expires_at
            "#,
        )
        .bind(csrf_state)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn save_login_grant(&self, grant: &LoginGrant) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM login_grants WHERE expires_at <= $1")
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO login_grants (code, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&grant.code)
        .bind(grant.user_id)
        .bind(grant.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_login_grant(&self, code: &str) -> Result<Option<LoginGrant>, StoreError> {
        let row = sqlx::query_as::<_, LoginGrant>(
            r#"
            DELETE FROM login_grants
            WHERE code = $1 AND expires_at > $2
            RETURNING code, user_id, expires_at
            "#,
        )
        .bind(code)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_project(
        &self,
        user_id: Uuid,
        project_name: &str,
        project_data: &serde_json::Value,
    ) -> Result<Project, StoreError> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (id, user_id, project_name, project_data)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, project_name, project_data, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(project_name)
        .bind(project_data)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    async fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        project_name: &str,
        project_data: &serde_json::Value,
    ) -> Result<Option<Project>, StoreError> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
               SET project_name = $3, project_data = $4, updated_at = now()
             WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, project_name, project_data, created_at, updated_at
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(project_name)
        .bind(project_data)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    async fn list_projects(&self, user_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, Project>(
            r#"
            SELECT id, user_id, project_name, project_data, created_at, updated_at
            FROM projects
            WHERE user_id = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
