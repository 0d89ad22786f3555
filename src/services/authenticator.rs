use std::sync::Arc;

use crate::error::AppError;
use crate::interfaces::{
    AuthenticatorView, Interface, RecoveryCodeInterface, SmsInterface, TotpInterface, metadata,
};
use crate::models::{Authenticator, AuthenticatorKind, User};
use crate::repositories::AuthenticatorRepository;
use crate::services::email::{EmailService, RequestOrigin, SecurityActivity, SecurityContext};
use crate::services::totp::TotpService;

const UNIQUE_KIND_CONSTRAINT: &str = "authenticators_user_id_type_key";
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// 登録内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrollment {
    /// クライアントに渡したシークレットと、そこから生成された現在のコード
    Totp { secret: String, otp: String },
    Sms { phone: String },
    Recovery,
}

impl Enrollment {
    pub fn kind(&self) -> AuthenticatorKind {
        match self {
            Self::Totp { .. } => AuthenticatorKind::Totp,
            Self::Sms { .. } => AuthenticatorKind::Sms,
            Self::Recovery => AuthenticatorKind::Recovery,
        }
    }
}

/// TOTP 登録開始時にクライアントへ返す情報
#[derive(Debug, Clone)]
pub struct TotpChallenge {
    pub secret: String,
    pub qr_code: String,
}

/// 二要素認証の管理サービス
///
/// 呼び出し側でアクセス権の確認が済んでいることを前提とする
#[derive(Clone)]
pub struct AuthenticatorService {
    repo: Arc<dyn AuthenticatorRepository>,
    email_service: EmailService,
    totp_service: TotpService,
}

impl AuthenticatorService {
    pub fn new(
        repo: Arc<dyn AuthenticatorRepository>,
        email_service: EmailService,
        totp_service: TotpService,
    ) -> Self {
        Self {
            repo,
            email_service,
            totp_service,
        }
    }

    /// 全インターフェースを登録状況つきで返す
    pub async fn list(&self, user: &User) -> Result<Vec<AuthenticatorView>, AppError> {
        let enrolled = self.repo.list_for_user(user.id).await?;

        AuthenticatorKind::ALL
            .into_iter()
            .map(|kind| match enrolled.iter().find(|auth| auth.kind == kind) {
                Some(authenticator) => {
                    let interface = Interface::from_authenticator(authenticator)?;
                    AuthenticatorView::enrolled(authenticator, &interface)
                }
                None => Ok(AuthenticatorView::unenrolled(kind)),
            })
            .collect()
    }

    pub async fn get(&self, user: &User, auth_id: &str) -> Result<AuthenticatorView, AppError> {
        let (authenticator, interface) = self.load(user, auth_id).await?;
        AuthenticatorView::enrolled(&authenticator, &interface)
    }

    /// リカバリーコードを再発行
    pub async fn regenerate_recovery_codes(
        &self,
        user: &User,
        auth_id: &str,
        origin: &RequestOrigin,
    ) -> Result<AuthenticatorView, AppError> {
        let (authenticator, interface, ()) = self
            .modify_config(user, auth_id, |interface| {
                let Interface::Recovery(mut recovery) = interface else {
                    return Err(AppError::Validation(
                        "リカバリーコード以外は再発行できません".to_string(),
                    ));
                };
                recovery.regenerate();
                Ok((Interface::Recovery(recovery), ()))
            })
            .await?;

        tracing::info!(user_id = %user.id, auth_id = authenticator.id, "リカバリーコード再発行");

        self.notify(
            user,
            SecurityActivity::RecoveryCodesRegenerated,
            authenticator.kind,
            None,
            origin,
        )
        .await;

        AuthenticatorView::enrolled(&authenticator, &interface)
    }

    /// U2F デバイスを1台削除
    ///
    /// # Errors
    /// - 認証方式またはデバイスが存在しない: `AppError::NotFound`
    /// - 最後の1台: `AppError::LastDevice`
    pub async fn remove_device(
        &self,
        user: &User,
        auth_id: &str,
        device_id: &str,
        origin: &RequestOrigin,
    ) -> Result<(), AppError> {
        let (authenticator, _, removed) = self
            .modify_config(user, auth_id, |interface| {
                let Interface::U2f(mut u2f) = interface else {
                    return Err(AppError::NotFound("デバイス"));
                };
                let removed = u2f.remove_device(device_id)?;
                Ok((Interface::U2f(u2f), removed))
            })
            .await?;

        tracing::info!(user_id = %user.id, auth_id = authenticator.id, "U2Fデバイス削除");

        self.notify(
            user,
            SecurityActivity::DeviceRemoved,
            authenticator.kind,
            Some(removed.name.as_str()),
            origin,
        )
        .await;

        Ok(())
    }

    /// 認証方式を削除
    ///
    /// 主要な認証方式が無くなった場合、残ったバックアップ方式も同時に削除する
    pub async fn delete(
        &self,
        user: &User,
        auth_id: &str,
        origin: &RequestOrigin,
    ) -> Result<(), AppError> {
        let auth_id = parse_auth_id(auth_id)?;
        let all = self.repo.list_for_user(user.id).await?;
        let target = all
            .iter()
            .find(|auth| auth.id == auth_id)
            .ok_or(AppError::NotFound("認証方式"))?;

        let ids = ids_to_delete(target, &all);
        let deleted = self.repo.delete_many(user.id, &ids).await?;

        tracing::info!(
            user_id = %user.id,
            auth_id = target.id,
            deleted,
            "認証方式削除"
        );

        self.notify(user, SecurityActivity::MfaRemoved, target.kind, None, origin)
            .await;

        Ok(())
    }

    /// TOTP 登録開始（シークレットとQRコードを発行、保存はしない）
    pub fn begin_totp_enrollment(&self, user: &User) -> Result<TotpChallenge, AppError> {
        let secret = TotpService::generate_secret();
        let qr_code = self.totp_service.generate_qr_code(&user.email, &secret)?;

        tracing::info!(user_id = %user.id, "TOTP登録開始");

        Ok(TotpChallenge {
            secret,
            qr_code: format!("data:image/png;base64,{}", qr_code),
        })
    }

    /// 認証方式を登録
    ///
    /// 最初の主要な認証方式を登録した場合はリカバリーコードも発行する
    pub async fn enroll(
        &self,
        user: &User,
        enrollment: Enrollment,
        origin: &RequestOrigin,
    ) -> Result<AuthenticatorView, AppError> {
        let kind = enrollment.kind();
        let existing = self.repo.list_for_user(user.id).await?;
        if existing.iter().any(|auth| auth.kind == kind) {
            return Err(AppError::AlreadyEnrolled);
        }

        let interface = match enrollment {
            Enrollment::Totp { secret, otp } => {
                if !self.totp_service.verify_code(&secret, &otp)? {
                    return Err(AppError::TotpInvalid);
                }
                Interface::Totp(TotpInterface {
                    secret: self.totp_service.encrypt_secret(&secret)?,
                })
            }
            Enrollment::Sms { phone } => Interface::Sms(SmsInterface {
                phone_number: phone,
            }),
            Enrollment::Recovery => Interface::Recovery(RecoveryCodeInterface::generate()),
        };

        let authenticator = self.create(user, kind, &interface).await?;
        tracing::info!(
            user_id = %user.id,
            auth_id = authenticator.id,
            kind = kind.interface_id(),
            "認証方式登録"
        );

        if !kind.is_backup() && !existing.iter().any(|auth| auth.kind.is_backup()) {
            // 同時登録で先に発行済みの場合はそちらを使う
            let recovery = Interface::Recovery(RecoveryCodeInterface::generate());
            let backup = self
                .repo
                .create_if_absent(user.id, AuthenticatorKind::Recovery, recovery.to_config()?)
                .await?;
            match backup {
                Some(backup) => tracing::info!(
                    user_id = %user.id,
                    auth_id = backup.id,
                    "リカバリーコード自動発行"
                ),
                None => tracing::debug!(user_id = %user.id, "リカバリーコードは発行済み"),
            }
        }

        self.notify(user, SecurityActivity::MfaAdded, kind, None, origin)
            .await;

        AuthenticatorView::enrolled(&authenticator, &interface)
    }

    async fn create(
        &self,
        user: &User,
        kind: AuthenticatorKind,
        interface: &Interface,
    ) -> Result<Authenticator, AppError> {
        self.repo
            .create(user.id, kind, interface.to_config()?)
            .await
            .map_err(|e| {
                // 同時登録による UNIQUE 制約違反
                if let sqlx::Error::Database(db_err) = &e
                    && db_err.constraint() == Some(UNIQUE_KIND_CONSTRAINT)
                {
                    return AppError::AlreadyEnrolled;
                }
                AppError::Database(e)
            })
    }

    /// config を読み込んで変更し、読み込み時のままの場合のみ書き込む
    ///
    /// 他のリクエストに先を越された場合は読み直して `apply` をやり直す
    ///
    /// # Errors
    /// - 再試行しても競合が続く: `AppError::ConcurrentUpdate`
    async fn modify_config<T, F>(
        &self,
        user: &User,
        auth_id: &str,
        mut apply: F,
    ) -> Result<(Authenticator, Interface, T), AppError>
    where
        T: Send,
        F: FnMut(Interface) -> Result<(Interface, T), AppError> + Send,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let (authenticator, interface) = self.load(user, auth_id).await?;
            let (updated, output) = apply(interface)?;

            let config = updated.to_config()?;
            let written = self
                .repo
                .compare_and_set_config(authenticator.id, &authenticator.config.0, config)
                .await?;
            if written {
                return Ok((authenticator, updated, output));
            }

            tracing::debug!(auth_id = authenticator.id, "config 更新が競合したため再試行");
        }

        tracing::warn!(user_id = %user.id, auth_id, "config 更新の競合が解消しない");
        Err(AppError::ConcurrentUpdate)
    }

    async fn load(&self, user: &User, auth_id: &str) -> Result<(Authenticator, Interface), AppError> {
        let auth_id = parse_auth_id(auth_id)?;
        let authenticator = self
            .repo
            .find_for_user(user.id, auth_id)
            .await?
            .ok_or(AppError::NotFound("認証方式"))?;
        let interface = Interface::from_authenticator(&authenticator)?;
        Ok((authenticator, interface))
    }

    async fn notify(
        &self,
        user: &User,
        activity: SecurityActivity,
        kind: AuthenticatorKind,
        device_name: Option<&str>,
        origin: &RequestOrigin,
    ) {
        self.email_service
            .send_security_email(
                user,
                activity,
                SecurityContext {
                    authenticator: metadata(kind).name,
                    device_name,
                    origin,
                },
            )
            .await;
    }
}

/// パスのIDを解釈（数値以外は存在しない扱い）
fn parse_auth_id(raw: &str) -> Result<i64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound("認証方式"))
}

fn ids_to_delete(target: &Authenticator, all: &[Authenticator]) -> Vec<i64> {
    let mut ids = vec![target.id];
    if target.kind.is_backup() {
        return ids;
    }

    let remaining: Vec<&Authenticator> = all.iter().filter(|auth| auth.id != target.id).collect();
    if remaining.iter().all(|auth| auth.kind.is_backup()) {
        ids.extend(remaining.iter().map(|auth| auth.id));
    }
    ids
}
