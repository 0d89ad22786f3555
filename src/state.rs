use std::sync::Arc;

use axum::http::HeaderName;
use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{
    AuthenticatorRepository, PgAuthenticatorRepository, PgUserRepository, UserRepository,
};
use crate::services::email::{self, EmailService, Mailer};
use crate::services::{AuthenticatorService, TotpService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// ユーザーリポジトリ
    pub user_repo: Arc<dyn UserRepository>,
    /// 二要素認証管理サービス
    pub authenticator_service: AuthenticatorService,
    /// 認証済みユーザーIDを運ぶヘッダー
    pub actor_header: HeaderName,
}

impl AppState {
    /// PostgreSQL と設定から AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let mailer = email::mailer_from_config(&config)?;
        Self::from_parts(
            Arc::new(PgUserRepository::new(db_pool.clone())),
            Arc::new(PgAuthenticatorRepository::new(db_pool)),
            mailer,
            &config,
        )
    }

    /// 各コンポーネントを差し替えて AppState を作成
    pub fn from_parts(
        user_repo: Arc<dyn UserRepository>,
        authenticator_repo: Arc<dyn AuthenticatorRepository>,
        mailer: Arc<dyn Mailer>,
        config: &Config,
    ) -> Result<Self, AppError> {
        let totp_service = TotpService::new(
            config.totp_issuer.clone(),
            config.encryption_key.expose_secret(),
        )?;
        let authenticator_service = AuthenticatorService::new(
            authenticator_repo,
            EmailService::new(mailer),
            totp_service,
        );

        let actor_header = HeaderName::try_from(config.actor_header.as_str()).map_err(|e| {
            tracing::error!(error = ?e, header = %config.actor_header, "ヘッダー名が不正");
            AppError::Internal(anyhow::anyhow!("invalid actor_header"))
        })?;

        Ok(Self {
            user_repo,
            authenticator_service,
            actor_header,
        })
    }
}
