use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::AppError;
use crate::models::User;

/// 送信するメール
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// 監査・テスト用のメッセージ種別
    pub message_type: String,
}

/// メール配送の抽象
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), AppError>;
}

/// ログ出力のみのメーラー（開発環境用）
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            message_type = %email.message_type,
            "メール送信（開発モード）"
        );
        Ok(())
    }
}

/// lettre による SMTP 送信
#[cfg(feature = "email")]
pub struct SmtpMailer {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
    from: lettre::message::Mailbox,
}

#[cfg(feature = "email")]
impl SmtpMailer {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        use lettre::transport::smtp::authentication::Credentials;
        use secrecy::ExposeSecret;

        let (Some(host), Some(username), Some(password), Some(from)) = (
            &config.smtp_host,
            &config.smtp_username,
            &config.smtp_password,
            &config.smtp_from_address,
        ) else {
            return Err(AppError::Internal(anyhow::anyhow!("SMTP is not configured")));
        };

        let from = from.parse().map_err(|e| {
            tracing::error!(error = ?e, "送信元アドレスのパースに失敗");
            AppError::Internal(anyhow::anyhow!("invalid smtp_from_address"))
        })?;

        let transport = lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(host)
            .map_err(|e| {
                tracing::error!(error = ?e, "SMTPトランスポートの作成に失敗");
                AppError::Internal(anyhow::anyhow!("smtp transport error"))
            })?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

#[cfg(feature = "email")]
#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        use lettre::AsyncTransport;

        let to = email.to.parse().map_err(|e| {
            tracing::warn!(error = ?e, "宛先アドレスのパースに失敗");
            AppError::Validation("宛先アドレスが不正です".to_string())
        })?;

        let message = lettre::Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .body(email.body.clone())
            .map_err(|e| {
                tracing::error!(error = ?e, "メール組み立てエラー");
                AppError::Internal(anyhow::anyhow!("message build error"))
            })?;

        self.transport.send(message).await.map_err(|e| {
            tracing::error!(error = ?e, "SMTP送信エラー");
            AppError::Internal(anyhow::anyhow!("smtp send error"))
        })?;

        Ok(())
    }
}

/// 設定に応じたメーラーを選択
///
/// email 機能が無効、または SMTP 未設定の場合はログ出力のみ
pub fn mailer_from_config(config: &Config) -> Result<Arc<dyn Mailer>, AppError> {
    #[cfg(feature = "email")]
    {
        if config.smtp_configured() {
            tracing::info!("SMTP メーラーを初期化");
            return Ok(Arc::new(SmtpMailer::from_config(config)?));
        }
    }

    if config.smtp_configured() {
        tracing::warn!("SMTP 設定がありますが email 機能が無効のためログ出力のみ");
    } else {
        tracing::info!("SMTP 未設定（ログ出力のみ）");
    }
    Ok(Arc::new(LogMailer))
}

/// セキュリティ通知の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityActivity {
    MfaAdded,
    MfaRemoved,
    DeviceRemoved,
    RecoveryCodesRegenerated,
}

impl SecurityActivity {
    pub fn message_type(self) -> &'static str {
        match self {
            Self::MfaAdded => "mfa-added",
            Self::MfaRemoved => "mfa-removed",
            Self::DeviceRemoved => "device-removed",
            Self::RecoveryCodesRegenerated => "recovery-codes-regenerated",
        }
    }

    fn subject(self) -> &'static str {
        match self {
            Self::MfaAdded => "二要素認証が追加されました",
            Self::MfaRemoved => "二要素認証が削除されました",
            Self::DeviceRemoved => "セキュリティデバイスが削除されました",
            Self::RecoveryCodesRegenerated => "リカバリーコードが再発行されました",
        }
    }
}

impl fmt::Display for SecurityActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_type())
    }
}

/// リクエスト元の情報（通知メールに記載）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// 通知メールの本文に載せる内容
#[derive(Debug, Clone)]
pub struct SecurityContext<'a> {
    pub authenticator: &'a str,
    pub device_name: Option<&'a str>,
    pub origin: &'a RequestOrigin,
}

/// メール送信サービス
#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
}

impl EmailService {
    /// 新しい EmailService を作成
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// セキュリティ通知メールを送信
    ///
    /// 送信失敗は操作自体を失敗させない（ログのみ）
    pub async fn send_security_email(
        &self,
        user: &User,
        activity: SecurityActivity,
        context: SecurityContext<'_>,
    ) {
        let email = OutgoingEmail {
            to: user.email.clone(),
            subject: activity.subject().to_string(),
            body: render_security_body(activity, &context),
            message_type: activity.message_type().to_string(),
        };

        tracing::info!(
            user_id = %user.id,
            message_type = %activity,
            "mail.queued"
        );

        if let Err(e) = self.mailer.deliver(&email).await {
            tracing::warn!(error = ?e, user_id = %user.id, message_type = %activity, "通知メール送信失敗");
        }
    }
}

fn render_security_body(activity: SecurityActivity, context: &SecurityContext<'_>) -> String {
    let mut lines = vec![match activity {
        SecurityActivity::MfaAdded => {
            format!("アカウントに {} が追加されました。", context.authenticator)
        }
        SecurityActivity::MfaRemoved => {
            format!("アカウントから {} が削除されました。", context.authenticator)
        }
        SecurityActivity::DeviceRemoved => format!(
            "{} からデバイス「{}」が削除されました。",
            context.authenticator,
            context.device_name.unwrap_or("不明なデバイス")
        ),
        SecurityActivity::RecoveryCodesRegenerated => {
            "リカバリーコードが再発行されました。以前のコードは使用できません。".to_string()
        }
    }];

    if let Some(ip) = &context.origin.ip_address {
        lines.push(format!("IPアドレス: {ip}"));
    }
    if let Some(user_agent) = &context.origin.user_agent {
        lines.push(format!("ユーザーエージェント: {user_agent}"));
    }
    lines.push("心当たりがない場合は、直ちにパスワードを変更してください。".to_string());

    lines.join("\n")
}
