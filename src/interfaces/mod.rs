//! 認証方式ごとの振る舞い
//!
//! `Authenticator.config` をインターフェースの型付き設定に変換し、
//! 登録・表示・種別固有の更新を扱う。

pub mod recovery;
pub mod u2f;
pub mod view;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::models::{Authenticator, AuthenticatorKind};

pub use recovery::RecoveryCodeInterface;
pub use u2f::{U2fBinding, U2fDevice, U2fInterface};
pub use view::{AuthenticatorView, DeviceView};

/// TOTP 設定（シークレットは AES-256-GCM 暗号化済み、Base64）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpInterface {
    pub secret: String,
}

/// SMS 設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsInterface {
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interface {
    Recovery(RecoveryCodeInterface),
    Totp(TotpInterface),
    Sms(SmsInterface),
    U2f(U2fInterface),
}

/// インターフェースの静的な説明
#[derive(Debug, Clone, Copy)]
pub struct InterfaceMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub allow_multi_enrollment: bool,
}

pub fn metadata(kind: AuthenticatorKind) -> InterfaceMetadata {
    match kind {
        AuthenticatorKind::Recovery => InterfaceMetadata {
            name: "Recovery Codes",
            description: "Recovery codes are the only way to access your account if you lose \
                          your device and cannot receive two factor authentication codes.",
            allow_multi_enrollment: false,
        },
        AuthenticatorKind::Totp => InterfaceMetadata {
            name: "Authenticator App",
            description: "An authenticator application that supports TOTP (like Google \
                          Authenticator or 1Password) can be used to access your account \
                          securely using a token and secret key.",
            allow_multi_enrollment: false,
        },
        AuthenticatorKind::Sms => InterfaceMetadata {
            name: "Text Message",
            description: "This authenticator sends you text messages for verification.",
            allow_multi_enrollment: false,
        },
        AuthenticatorKind::U2f => InterfaceMetadata {
            name: "U2F (Universal 2nd Factor)",
            description: "Authenticate with a U2F hardware device. This is a device like a \
                          Yubikey or something similar which supports FIDO's U2F \
                          specification.",
            allow_multi_enrollment: true,
        },
    }
}

impl Interface {
    /// 認証方式の config を種別に応じて復元
    pub fn from_authenticator(authenticator: &Authenticator) -> Result<Self, AppError> {
        let config = &authenticator.config.0;
        let interface = match authenticator.kind {
            AuthenticatorKind::Recovery => Self::Recovery(decode(authenticator, config)?),
            AuthenticatorKind::Totp => Self::Totp(decode(authenticator, config)?),
            AuthenticatorKind::Sms => Self::Sms(decode(authenticator, config)?),
            AuthenticatorKind::U2f => Self::U2f(decode(authenticator, config)?),
        };
        Ok(interface)
    }

    pub fn kind(&self) -> AuthenticatorKind {
        match self {
            Self::Recovery(_) => AuthenticatorKind::Recovery,
            Self::Totp(_) => AuthenticatorKind::Totp,
            Self::Sms(_) => AuthenticatorKind::Sms,
            Self::U2f(_) => AuthenticatorKind::U2f,
        }
    }

    /// 保存用の config JSON
    pub fn to_config(&self) -> Result<serde_json::Value, AppError> {
        let value = match self {
            Self::Recovery(inner) => serde_json::to_value(inner),
            Self::Totp(inner) => serde_json::to_value(inner),
            Self::Sms(inner) => serde_json::to_value(inner),
            Self::U2f(inner) => serde_json::to_value(inner),
        };
        value.map_err(|e| {
            tracing::error!(error = ?e, "認証方式設定のシリアライズエラー");
            AppError::Internal(anyhow::anyhow!("config serialization error"))
        })
    }
}

fn decode<T: DeserializeOwned>(
    authenticator: &Authenticator,
    config: &serde_json::Value,
) -> Result<T, AppError> {
    // 設定が空の場合は null ではなく空オブジェクトとして扱う
    let config = if config.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        config.clone()
    };

    serde_json::from_value(config).map_err(|e| {
        tracing::error!(
            error = ?e,
            auth_id = authenticator.id,
            kind = authenticator.kind.interface_id(),
            "認証方式設定のデコードエラー"
        );
        AppError::Internal(anyhow::anyhow!("invalid authenticator config"))
    })
}
