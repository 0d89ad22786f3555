use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("認証されていません")]
    Unauthenticated,

    #[error("権限がありません")]
    Forbidden,

    #[error("{0}が見つかりません")]
    NotFound(&'static str),

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("認証コードが無効です")]
    TotpInvalid,

    #[error("この認証方式は既に登録されています")]
    AlreadyEnrolled,

    #[error("最後のデバイスは削除できません")]
    LastDevice,

    #[error("他の操作と競合しました。再度お試しください")]
    ConcurrentUpdate,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::TotpInvalid => (
                StatusCode::BAD_REQUEST,
                "認証コードが正しくありません".to_string(),
            ),
            Self::AlreadyEnrolled => (StatusCode::CONFLICT, self.to_string()),
            // 業務ルール違反はクライアントエラーとして返す
            Self::LastDevice => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::ConcurrentUpdate => (StatusCode::CONFLICT, self.to_string()),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
