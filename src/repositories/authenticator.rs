use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::AuthenticatorRepository;
use crate::models::{Authenticator, AuthenticatorKind};

#[derive(Clone)]
pub struct PgAuthenticatorRepository {
    pool: PgPool,
}

impl PgAuthenticatorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthenticatorRepository for PgAuthenticatorRepository {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Authenticator>, sqlx::Error> {
        sqlx::query_as::<_, Authenticator>(
            r#"
            SELECT id, user_id, type, config, created_at, last_used_at
            FROM authenticators
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        auth_id: i64,
    ) -> Result<Option<Authenticator>, sqlx::Error> {
        sqlx::query_as::<_, Authenticator>(
            r#"
            SELECT id, user_id, type, config, created_at, last_used_at
            FROM authenticators
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(auth_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 新しい認証方式を作成
    ///
    /// # Errors
    /// - UNIQUE制約違反時: `sqlx::Error::Database` (constraint = "authenticators_user_id_type_key")
    async fn create(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
        config: serde_json::Value,
    ) -> Result<Authenticator, sqlx::Error> {
        sqlx::query_as::<_, Authenticator>(
            r#"
            INSERT INTO authenticators (user_id, type, config)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, type, config, created_at, last_used_at
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(Json(config))
        .fetch_one(&self.pool)
        .await
    }

    async fn create_if_absent(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
        config: serde_json::Value,
    ) -> Result<Option<Authenticator>, sqlx::Error> {
        sqlx::query_as::<_, Authenticator>(
            r#"
            INSERT INTO authenticators (user_id, type, config)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, type) DO NOTHING
            RETURNING id, user_id, type, config, created_at, last_used_at
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(Json(config))
        .fetch_optional(&self.pool)
        .await
    }

    async fn compare_and_set_config(
        &self,
        auth_id: i64,
        expected: &serde_json::Value,
        config: serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        // JSONB の等価比較はキー順序に依存しない
        let result = sqlx::query(
            r#"
            UPDATE authenticators
            SET config = $3
            WHERE id = $1 AND config = $2
            "#,
        )
        .bind(auth_id)
        .bind(Json(expected))
        .bind(Json(config))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_many(&self, user_id: Uuid, auth_ids: &[i64]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM authenticators
            WHERE user_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(auth_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
