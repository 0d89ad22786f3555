//! テスト用のインメモリ実装

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AuthenticatorRepository, UserRepository};
use crate::error::AppError;
use crate::models::{Authenticator, AuthenticatorKind, User};
use crate::services::email::{Mailer, OutgoingEmail};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<BTreeMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn create_user(&self, email: &str, is_superuser: bool) -> User {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            is_superuser,
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAuthenticatorRepository {
    rows: Mutex<BTreeMap<i64, Authenticator>>,
}

impl InMemoryAuthenticatorRepository {
    pub fn get(&self, auth_id: i64) -> Option<Authenticator> {
        self.rows.lock().unwrap().get(&auth_id).cloned()
    }
}

#[async_trait]
impl AuthenticatorRepository for InMemoryAuthenticatorRepository {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Authenticator>, sqlx::Error> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        auth_id: i64,
    ) -> Result<Option<Authenticator>, sqlx::Error> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&auth_id)
            .filter(|row| row.user_id == user_id)
            .cloned())
    }

    async fn create(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
        config: serde_json::Value,
    ) -> Result<Authenticator, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        Ok(insert_row(&mut rows, user_id, kind, config))
    }

    async fn create_if_absent(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
        config: serde_json::Value,
    ) -> Result<Option<Authenticator>, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .values()
            .any(|row| row.user_id == user_id && row.kind == kind)
        {
            return Ok(None);
        }

        Ok(Some(insert_row(&mut rows, user_id, kind, config)))
    }

    async fn compare_and_set_config(
        &self,
        auth_id: i64,
        expected: &serde_json::Value,
        config: serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        match self.rows.lock().unwrap().get_mut(&auth_id) {
            Some(row) if row.config.0 == *expected => {
                row.config = Json(config);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_many(&self, user_id: Uuid, auth_ids: &[i64]) -> Result<u64, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|id, row| !(row.user_id == user_id && auth_ids.contains(id)));
        Ok((before - rows.len()) as u64)
    }
}

fn insert_row(
    rows: &mut BTreeMap<i64, Authenticator>,
    user_id: Uuid,
    kind: AuthenticatorKind,
    config: serde_json::Value,
) -> Authenticator {
    let id = rows.keys().next_back().map_or(1, |last| last + 1);
    let row = Authenticator {
        id,
        user_id,
        kind,
        config: Json(config),
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
    };
    rows.insert(id, row.clone());
    row
}

/// 送信内容を記録するメーラー
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn message_types(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|email| email.message_type)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
