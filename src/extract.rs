//! リクエストからの操作者・接続元の取り出し

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::services::email::RequestOrigin;
use crate::state::AppState;

/// 操作者（認証済みユーザー）
///
/// 上流ゲートウェイが設定するヘッダーのユーザーIDから解決する
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(&state.actor_header)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or(AppError::Unauthenticated)?;

        let user = state
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, "操作者が存在しない");
                AppError::Unauthenticated
            })?;

        Ok(Self(user))
    }
}

/// 接続元（通知メール用）
///
/// # Security
/// - `X-Forwarded-For` はそのまま信頼する。前段のゲートウェイがクライアント由来の値を
///   破棄して上書きしていることが前提
#[derive(Debug, Clone, Default)]
pub struct Origin(pub RequestOrigin);

impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(origin_from_headers(&parts.headers)))
    }
}

fn origin_from_headers(headers: &HeaderMap) -> RequestOrigin {
    let header_str = move |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    RequestOrigin {
        // X-Forwarded-For の先頭がクライアント
        ip_address: header_str(header::HeaderName::from_static("x-forwarded-for"))
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string()),
        user_agent: header_str(header::USER_AGENT).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_origin_uses_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let origin = origin_from_headers(&headers);

        assert_eq!(origin.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(origin.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_origin_without_headers() {
        let origin = origin_from_headers(&HeaderMap::new());
        assert_eq!(origin, RequestOrigin::default());
    }
}
