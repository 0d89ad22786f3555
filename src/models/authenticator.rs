use sqlx::FromRow;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

/// 認証方式の種別
///
/// DB には SMALLINT として保存される
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i16)]
pub enum AuthenticatorKind {
    Recovery = 0,
    Totp = 1,
    Sms = 2,
    U2f = 3,
}

impl AuthenticatorKind {
    /// 一覧表示の順序
    pub const ALL: [AuthenticatorKind; 4] = [Self::Totp, Self::Sms, Self::U2f, Self::Recovery];

    /// API で使用するインターフェースID
    pub fn interface_id(self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Totp => "totp",
            Self::Sms => "sms",
            Self::U2f => "u2f",
        }
    }

    pub fn from_interface_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.interface_id() == id)
    }

    /// 他の認証方式と併用される場合のみ意味を持つバックアップ方式か
    pub fn is_backup(self) -> bool {
        matches!(self, Self::Recovery)
    }
}

/// ユーザーに登録された二要素認証
///
/// config はインターフェースごとの状態を保持する JSON
/// （TOTPシークレットは暗号化済み、平文はログ出力禁止）
#[derive(Debug, Clone, FromRow)]
pub struct Authenticator {
    pub id: i64,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    pub kind: AuthenticatorKind,
    pub config: Json<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_id_lookup() {
        for kind in AuthenticatorKind::ALL {
            assert_eq!(
                AuthenticatorKind::from_interface_id(kind.interface_id()),
                Some(kind)
            );
        }
        assert_eq!(AuthenticatorKind::from_interface_id("webauthn"), None);
    }

    #[test]
    fn test_only_recovery_is_backup() {
        assert!(AuthenticatorKind::Recovery.is_backup());
        assert!(!AuthenticatorKind::Totp.is_backup());
        assert!(!AuthenticatorKind::Sms.is_backup());
        assert!(!AuthenticatorKind::U2f.is_backup());
    }
}
