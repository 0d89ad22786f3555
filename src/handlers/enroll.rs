use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::{CurrentUser, Origin};
use crate::handlers::authenticator::resolve_user;
use crate::interfaces::AuthenticatorView;
use crate::models::AuthenticatorKind;
use crate::services::Enrollment;
use crate::state::AppState;

// === Enrollment Challenge ===

#[derive(Debug, Serialize)]
pub struct TotpChallengeResponse {
    pub secret: String,
    pub qrcode: String,
}

/// GET /api/users/{user_id}/authenticators/{interface_id}/enroll/
///
/// TOTP 登録開始（シークレットとQRコードを返却、まだ保存しない）
///
/// # Security
/// - シークレット平文はログ出力禁止
pub async fn begin_enrollment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((user_id, interface_id)): Path<(String, String)>,
) -> Result<Json<TotpChallengeResponse>, AppError> {
    let user = resolve_user(&state, &actor, &user_id).await?;

    match parse_interface_id(&interface_id)? {
        AuthenticatorKind::Totp => {
            let challenge = state.authenticator_service.begin_totp_enrollment(&user)?;
            Ok(Json(TotpChallengeResponse {
                secret: challenge.secret,
                qrcode: challenge.qr_code,
            }))
        }
        _ => Err(AppError::Validation(
            "この認証方式には登録前の手順がありません".to_string(),
        )),
    }
}

// === Enrollment ===

#[derive(Debug, Default, Deserialize, Validate)]
pub struct EnrollRequest {
    /// TOTP: 登録開始時に受け取ったシークレット
    #[garde(length(min = 16, max = 128))]
    pub secret: Option<String>,
    /// TOTP: 認証アプリに表示されたコード
    #[garde(length(min = 6, max = 6))]
    pub otp: Option<String>,
    /// SMS: 電話番号
    #[garde(length(min = 1, max = 32))]
    pub phone: Option<String>,
}

/// POST /api/users/{user_id}/authenticators/{interface_id}/enroll/
///
/// 認証方式を登録
///
/// # Security
/// - シークレット・コード・電話番号はログ出力禁止
/// - 本人へ通知メールを送信
pub async fn enroll(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Origin(origin): Origin,
    Path((user_id, interface_id)): Path<(String, String)>,
    body: Option<Json<EnrollRequest>>,
) -> Result<(StatusCode, Json<AuthenticatorView>), AppError> {
    let user = resolve_user(&state, &actor, &user_id).await?;
    let kind = parse_interface_id(&interface_id)?;
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let enrollment = build_enrollment(kind, request)?;
    let view = state
        .authenticator_service
        .enroll(&user, enrollment, &origin)
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

// === Helper Functions ===

fn parse_interface_id(interface_id: &str) -> Result<AuthenticatorKind, AppError> {
    AuthenticatorKind::from_interface_id(interface_id).ok_or(AppError::NotFound("認証方式"))
}

/// リクエストを種別ごとの登録内容に変換
fn build_enrollment(kind: AuthenticatorKind, request: EnrollRequest) -> Result<Enrollment, AppError> {
    request
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;

    match kind {
        AuthenticatorKind::Totp => {
            let (Some(secret), Some(otp)) = (request.secret, request.otp) else {
                return Err(AppError::Validation(
                    "secret と otp は必須です".to_string(),
                ));
            };
            Ok(Enrollment::Totp { secret, otp })
        }
        AuthenticatorKind::Sms => {
            let phone = request
                .phone
                .ok_or_else(|| AppError::Validation("電話番号は必須です".to_string()))?;
            Ok(Enrollment::Sms {
                phone: normalize_phone(&phone)?,
            })
        }
        AuthenticatorKind::Recovery => Ok(Enrollment::Recovery),
        AuthenticatorKind::U2f => Err(AppError::Validation(
            "U2F デバイスはブラウザから登録してください".to_string(),
        )),
    }
}

/// 電話番号の区切り文字を除去（先頭の + は保持）
fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    let (prefix, rest) = match raw.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", raw),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => {
                return Err(AppError::Validation(
                    "電話番号の形式が正しくありません".to_string(),
                ));
            }
        }
    }

    if !(7..=15).contains(&digits.len()) {
        return Err(AppError::Validation(
            "電話番号の桁数が正しくありません".to_string(),
        ));
    }

    Ok(format!("{prefix}{digits}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::app::create_router;
    use crate::models::User;
    use crate::repositories::memory::{
        InMemoryAuthenticatorRepository, InMemoryUserRepository, RecordingMailer,
    };
    use crate::services::totp::tests::current_code;
    use crate::test_support::test_config;

    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("555-123-1234").unwrap(), "5551231234");
        assert_eq!(normalize_phone("+1 (555) 123.1234").unwrap(), "+15551231234");
    }

    #[test]
    fn test_normalize_phone_rejects_letters() {
        assert!(normalize_phone("555-CALL-NOW").is_err());
    }

    #[test]
    fn test_normalize_phone_rejects_short_number() {
        assert!(normalize_phone("12345").is_err());
    }

    #[test]
    fn test_totp_requires_secret_and_otp() {
        let request = EnrollRequest {
            secret: None,
            otp: Some("123456".to_string()),
            phone: None,
        };
        let result = build_enrollment(AuthenticatorKind::Totp, request);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_otp_length_is_validated() {
        let request = EnrollRequest {
            secret: Some("JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP".to_string()),
            otp: Some("1234567".to_string()),
            phone: None,
        };
        let result = build_enrollment(AuthenticatorKind::Totp, request);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_u2f_cannot_be_enrolled() {
        let result = build_enrollment(AuthenticatorKind::U2f, EnrollRequest::default());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    struct TestApp {
        router: Router,
        users: Arc<InMemoryUserRepository>,
        mailer: Arc<RecordingMailer>,
    }

    fn test_app() -> TestApp {
        let users = Arc::new(InMemoryUserRepository::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::from_parts(
            users.clone(),
            Arc::new(InMemoryAuthenticatorRepository::default()),
            mailer.clone(),
            &test_config(),
        )
        .unwrap();
        TestApp {
            router: create_router(state),
            users,
            mailer,
        }
    }

    async fn send(router: &Router, method: Method, uri: &str, actor: &User, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", actor.id.to_string());
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_totp_enrollment_flow() {
        let app = test_app();
        let user = app.users.create_user("test@example.com", false);
        let url = "/api/users/me/authenticators/totp/enroll/";

        let (status, challenge) = send(&app.router, Method::GET, url, &user, None).await;
        assert_eq!(status, StatusCode::OK);
        let secret = challenge["secret"].as_str().unwrap().to_string();
        assert!(
            challenge["qrcode"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );

        let (status, body) = send(
            &app.router,
            Method::POST,
            url,
            &user,
            Some(json!({ "secret": secret, "otp": current_code(&secret) })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "totp");
        assert_eq!(body["isEnrolled"], true);
        assert!(body.get("secret").is_none());
        assert_eq!(app.mailer.message_types(), vec!["mfa-added"]);

        // 2回目は競合
        let (status, _) = send(
            &app.router,
            Method::POST,
            url,
            &user,
            Some(json!({ "secret": secret, "otp": current_code(&secret) })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_sms_enrollment() {
        let app = test_app();
        let user = app.users.create_user("test@example.com", false);

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/users/me/authenticators/sms/enroll/",
            &user,
            Some(json!({ "phone": "555-123-1234" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["phone"], "5551231234");
    }

    #[tokio::test]
    async fn test_unknown_interface() {
        let app = test_app();
        let user = app.users.create_user("test@example.com", false);

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/api/users/me/authenticators/webauthn/enroll/",
            &user,
            None,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_begin_enrollment_for_sms_is_rejected() {
        let app = test_app();
        let user = app.users.create_user("test@example.com", false);

        let (status, _) = send(
            &app.router,
            Method::GET,
            "/api/users/me/authenticators/sms/enroll/",
            &user,
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
