//! テスト共通の設定

use base64::{Engine as _, engine::general_purpose::STANDARD};
use secrecy::SecretBox;

use crate::config::Config;

pub fn test_config() -> Config {
    Config {
        database_url: SecretBox::new(Box::new("postgres://localhost/mfagate_test".to_string())),
        host: "127.0.0.1".to_string(),
        port: 0,
        actor_header: "x-user-id".to_string(),
        smtp_host: None,
        smtp_port: 587,
        smtp_username: None,
        smtp_password: None,
        smtp_from_address: None,
        totp_issuer: "TestApp".to_string(),
        encryption_key: SecretBox::new(Box::new(STANDARD.encode([0u8; 32]))),
    }
}
