use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// U2F デバイスの鍵情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct U2fBinding {
    pub public_key: String,
    pub key_handle: String,
    pub app_id: String,
}

/// 登録済み U2F デバイス（keyHandle で識別）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct U2fDevice {
    pub binding: U2fBinding,
    pub name: String,
    /// 登録時刻（UNIX秒）
    pub ts: i64,
}

impl U2fDevice {
    pub fn key_handle(&self) -> &str {
        &self.binding.key_handle
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct U2fInterface {
    #[serde(default)]
    pub devices: Vec<U2fDevice>,
}

impl U2fInterface {
    pub fn registered_devices(&self) -> &[U2fDevice] {
        &self.devices
    }

    /// デバイスを削除し、削除したデバイスを返す
    ///
    /// # Errors
    /// - 該当デバイスなし: `AppError::NotFound`
    /// - 最後の1台: `AppError::LastDevice`（認証方式ごと削除する必要がある）
    pub fn remove_device(&mut self, key_handle: &str) -> Result<U2fDevice, AppError> {
        let position = self
            .devices
            .iter()
            .position(|device| device.key_handle() == key_handle)
            .ok_or(AppError::NotFound("デバイス"))?;

        if self.devices.len() == 1 {
            return Err(AppError::LastDevice);
        }

        Ok(self.devices.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interface() -> U2fInterface {
        serde_json::from_value(json!({
            "devices": [{
                "binding": {
                    "publicKey": "aowekroawker",
                    "keyHandle": "devicekeyhandle",
                    "appId": "https://dev.example.net:8000/auth/2fa/u2fappid.json"
                },
                "name": "Amused Beetle",
                "ts": 1512505334
            }, {
                "binding": {
                    "publicKey": "publickey",
                    "keyHandle": "aowerkoweraowerkkro",
                    "appId": "https://dev.example.net:8000/auth/2fa/u2fappid.json"
                },
                "name": "YubiKey",
                "ts": 1512505334
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_devices_defaults_to_empty() {
        let interface: U2fInterface = serde_json::from_value(json!({})).unwrap();
        assert!(interface.registered_devices().is_empty());
    }

    #[test]
    fn test_remove_device_keeps_last_one() {
        let mut interface = interface();

        let removed = interface.remove_device("devicekeyhandle").unwrap();
        assert_eq!(removed.name, "Amused Beetle");
        assert_eq!(interface.registered_devices().len(), 1);

        let result = interface.remove_device("aowerkoweraowerkkro");
        assert!(matches!(result, Err(AppError::LastDevice)));
        assert_eq!(interface.registered_devices().len(), 1);
    }

    #[test]
    fn test_remove_unknown_device() {
        let mut interface = interface();
        let result = interface.remove_device("missing");
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(interface.registered_devices().len(), 2);
    }

    #[test]
    fn test_binding_serializes_camel_case() {
        let value = serde_json::to_value(interface()).unwrap();
        assert_eq!(
            value["devices"][0]["binding"]["keyHandle"],
            "devicekeyhandle"
        );
    }
}
