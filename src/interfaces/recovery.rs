use data_encoding::{BASE32, HEXLOWER};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// 発行するリカバリーコードの数
pub const CODE_COUNT: usize = 10;
const CODE_LENGTH: usize = 10;
const SALT_BYTES: usize = 16;

/// リカバリーコード
///
/// コードそのものは保存せず、ソルトから HMAC-SHA256 で都度導出する。
/// `used` のビット i がコード i の使用済みフラグ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryCodeInterface {
    salt: String,
    #[serde(default)]
    used: u32,
}

impl RecoveryCodeInterface {
    /// 新しいソルトでコードを発行
    pub fn generate() -> Self {
        Self {
            salt: new_salt(),
            used: 0,
        }
    }

    /// ソルトを作り直し、使用済みフラグをリセット
    pub fn regenerate(&mut self) {
        self.salt = new_salt();
        self.used = 0;
    }

    /// 全コードを発行順に返す
    pub fn codes(&self) -> Result<Vec<String>, AppError> {
        let mut mac = HmacSha256::new_from_slice(self.salt.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "HMAC初期化エラー");
            AppError::Internal(anyhow::anyhow!("hmac initialization error"))
        })?;

        let mut codes = Vec::with_capacity(CODE_COUNT);
        for index in 0..CODE_COUNT {
            mac.update(index.to_string().as_bytes());
            let digest = mac.finalize_reset().into_bytes();
            let mut code = BASE32.encode(&digest);
            code.truncate(CODE_LENGTH);
            codes.push(code);
        }
        Ok(codes)
    }

    /// 未使用のコードのみ返す
    pub fn unused_codes(&self) -> Result<Vec<String>, AppError> {
        Ok(self
            .codes()?
            .into_iter()
            .enumerate()
            .filter(|(index, _)| self.used & (1 << index) == 0)
            .map(|(_, code)| code)
            .collect())
    }
}

fn new_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}
