use serde::Serialize;
use time::OffsetDateTime;

use super::{Interface, U2fDevice, metadata};
use crate::error::AppError;
use crate::models::{Authenticator, AuthenticatorKind};

/// 認証方式の API 表現
///
/// 登録済みの場合のみ種別固有のフィールド（codes / phone / devices）を含める。
/// 登録用のフィールド（secret, qrcode 等）は含めない。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorView {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub is_backup_interface: bool,
    pub allow_multi_enrollment: bool,
    pub is_enrolled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceView>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub key_handle: String,
    pub name: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

impl From<&U2fDevice> for DeviceView {
    fn from(device: &U2fDevice) -> Self {
        Self {
            key_handle: device.key_handle().to_string(),
            name: device.name.clone(),
            timestamp: OffsetDateTime::from_unix_timestamp(device.ts).ok(),
        }
    }
}

impl AuthenticatorView {
    /// 未登録のインターフェース
    pub fn unenrolled(kind: AuthenticatorKind) -> Self {
        let meta = metadata(kind);
        Self {
            id: kind.interface_id(),
            name: meta.name,
            description: meta.description,
            is_backup_interface: kind.is_backup(),
            allow_multi_enrollment: meta.allow_multi_enrollment,
            is_enrolled: false,
            auth_id: None,
            created_at: None,
            last_used_at: None,
            codes: None,
            phone: None,
            devices: None,
        }
    }

    /// 登録済みの認証方式
    pub fn enrolled(authenticator: &Authenticator, interface: &Interface) -> Result<Self, AppError> {
        let mut view = Self::unenrolled(authenticator.kind);
        view.is_enrolled = true;
        view.auth_id = Some(authenticator.id.to_string());
        view.created_at = Some(authenticator.created_at);
        view.last_used_at = authenticator.last_used_at;

        match interface {
            Interface::Recovery(recovery) => view.codes = Some(recovery.unused_codes()?),
            Interface::Sms(sms) => view.phone = Some(sms.phone_number.clone()),
            Interface::U2f(u2f) => {
                view.devices = Some(
                    u2f.registered_devices()
                        .iter()
                        .map(DeviceView::from)
                        .collect(),
                )
            }
            Interface::Totp(_) => {}
        }

        Ok(view)
    }
}
