pub mod authenticator;
#[cfg(test)]
pub mod memory;
pub mod user;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Authenticator, AuthenticatorKind, User};

pub use authenticator::PgAuthenticatorRepository;
pub use user::PgUserRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// ユーザーIDでユーザーを検索
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;
}

#[async_trait]
pub trait AuthenticatorRepository: Send + Sync {
    /// ユーザーの全認証方式を取得（ID順）
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Authenticator>, sqlx::Error>;

    /// ユーザーに属する認証方式を取得
    ///
    /// 他ユーザーの認証方式は None として扱う
    async fn find_for_user(
        &self,
        user_id: Uuid,
        auth_id: i64,
    ) -> Result<Option<Authenticator>, sqlx::Error>;

    async fn create(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
        config: serde_json::Value,
    ) -> Result<Authenticator, sqlx::Error>;

    /// 同じユーザー・種別の認証方式が無い場合のみ作成
    ///
    /// 既に存在する場合は None
    async fn create_if_absent(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
        config: serde_json::Value,
    ) -> Result<Option<Authenticator>, sqlx::Error>;

    /// config が `expected` のままの場合のみ書き換える
    ///
    /// 他のリクエストが先に書き換えていた場合は false
    async fn compare_and_set_config(
        &self,
        auth_id: i64,
        expected: &serde_json::Value,
        config: serde_json::Value,
    ) -> Result<bool, sqlx::Error>;

    /// 指定した認証方式をまとめて削除（単一ステートメント）
    async fn delete_many(&self, user_id: Uuid, auth_ids: &[i64]) -> Result<u64, sqlx::Error>;
}
