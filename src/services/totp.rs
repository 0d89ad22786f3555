use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use data_encoding::BASE32;
use rand::RngCore;
use totp_rs::{Algorithm, TOTP};

use crate::error::AppError;

const NONCE_LEN: usize = 12;

/// TOTP (Time-based One-Time Password) サービス
///
/// # Security
/// - シークレットはAES-256-GCMで暗号化して config に保存
/// - シークレット平文はログに出力しない
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
    encryption_key: [u8; 32],
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `issuer` - TOTP発行者名（アプリ名）
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(issuer: String, encryption_key_base64: &str) -> Result<Self, AppError> {
        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "TOTP暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        let encryption_key: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "TOTP暗号化キーの長さが不正"
            );
            AppError::Internal(anyhow::anyhow!("encryption key must be 32 bytes"))
        })?;

        Ok(Self {
            issuer,
            encryption_key,
        })
    }

    /// 20バイトのランダムシークレットを生成し、Base32でエンコード
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE32.encode(&bytes)
    }

    /// シークレットをAES-256-GCMで暗号化
    ///
    /// # Returns
    /// Base64(96ビットnonce + 暗号文)
    pub fn encrypt_secret(&self, secret: &str) -> Result<String, AppError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレット暗号化エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(combined))
    }

    /// QRコードを生成（PNG形式、Base64エンコード）
    ///
    /// # Arguments
    /// * `email` - ユーザーのメールアドレス（アカウント識別子）
    /// * `secret` - Base32エンコードされたシークレット
    pub fn generate_qr_code(&self, email: &str, secret: &str) -> Result<String, AppError> {
        let totp = self.build_totp(secret, Some(email))?;

        totp.get_qr_base64().map_err(|e| {
            tracing::error!(error = %e, "QRコード生成エラー");
            AppError::Internal(anyhow::anyhow!("qr code generation error"))
        })
    }

    /// TOTPコードを検証
    ///
    /// # Note
    /// 前後1ステップの時間ウィンドウを許容（±30秒）
    pub fn verify_code(&self, secret: &str, code: &str) -> Result<bool, AppError> {
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let totp = self.build_totp(secret, None)?;

        let current_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!(error = ?e, "システム時刻取得エラー");
                AppError::Internal(anyhow::anyhow!("system time error"))
            })?
            .as_secs();

        Ok(totp.check(code, current_time))
    }

    fn cipher(&self) -> Result<Aes256Gcm, AppError> {
        Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })
    }

    /// TOTP オブジェクトを作成
    ///
    /// account を渡した場合は QR コード用に発行者名も設定する
    fn build_totp(&self, secret: &str, account: Option<&str>) -> Result<TOTP, AppError> {
        let secret_bytes = BASE32.decode(secret.as_bytes()).map_err(|e| {
            tracing::warn!(error = ?e, "シークレットのBase32デコードエラー");
            AppError::Validation("シークレットの形式が正しくありません".to_string())
        })?;

        let (issuer, account_name) = match account {
            Some(account) => (Some(self.issuer.clone()), account.to_string()),
            None => (None, String::new()),
        };

        TOTP::new(
            Algorithm::SHA1,
            6,  // 6桁
            1,  // skew: 前後1ステップ許容
            30, // period: 30秒
            secret_bytes,
            issuer,
            account_name,
        )
        .map_err(|e| {
            tracing::error!(error = %e, "TOTP作成エラー");
            AppError::Internal(anyhow::anyhow!("totp creation error"))
        })
    }
}
