use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{CurrentUser, Origin};
use crate::interfaces::AuthenticatorView;
use crate::models::User;
use crate::state::AppState;

/// GET /api/users/{user_id}/authenticators/
///
/// 全インターフェースを登録状況つきで返す
pub async fn list_authenticators(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<AuthenticatorView>>, AppError> {
    let user = resolve_user(&state, &actor, &user_id).await?;
    let views = state.authenticator_service.list(&user).await?;
    Ok(Json(views))
}

/// GET /api/users/{user_id}/authenticators/{auth_id}/
pub async fn get_authenticator(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((user_id, auth_id)): Path<(String, String)>,
) -> Result<Json<AuthenticatorView>, AppError> {
    let user = resolve_user(&state, &actor, &user_id).await?;
    let view = state.authenticator_service.get(&user, &auth_id).await?;
    Ok(Json(view))
}

/// PUT /api/users/{user_id}/authenticators/{auth_id}/
///
/// リカバリーコードを再発行
///
/// # Security
/// - 再発行したコードはログ出力禁止
/// - 本人へ通知メールを送信
pub async fn regenerate_recovery_codes(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Origin(origin): Origin,
    Path((user_id, auth_id)): Path<(String, String)>,
) -> Result<Json<AuthenticatorView>, AppError> {
    let user = resolve_user(&state, &actor, &user_id).await?;
    let view = state
        .authenticator_service
        .regenerate_recovery_codes(&user, &auth_id, &origin)
        .await?;
    Ok(Json(view))
}

/// DELETE /api/users/{user_id}/authenticators/{auth_id}/
///
/// 認証方式を削除（スーパーユーザーのみ）
pub async fn delete_authenticator(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Origin(origin): Origin,
    Path((user_id, auth_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    if !actor.is_superuser {
        tracing::warn!(actor_id = %actor.id, "スーパーユーザー以外による認証方式削除を拒否");
        return Err(AppError::Forbidden);
    }

    let user = resolve_user(&state, &actor, &user_id).await?;
    state
        .authenticator_service
        .delete(&user, &auth_id, &origin)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/users/{user_id}/authenticators/{auth_id}/devices/{device_id}/
///
/// U2F デバイスを1台削除（最後の1台は削除不可）
pub async fn delete_device(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Origin(origin): Origin,
    Path((user_id, auth_id, device_id)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    let user = resolve_user(&state, &actor, &user_id).await?;
    state
        .authenticator_service
        .remove_device(&user, &auth_id, &device_id, &origin)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// パスの user_id を対象ユーザーに解決し、アクセス権を確認
///
/// - `me` は操作者自身
/// - 本人またはスーパーユーザーのみアクセス可
pub(crate) async fn resolve_user(
    state: &AppState,
    actor: &User,
    user_id: &str,
) -> Result<User, AppError> {
    if user_id == "me" {
        return Ok(actor.clone());
    }

    let user_id = Uuid::parse_str(user_id).map_err(|_| AppError::NotFound("ユーザー"))?;
    if user_id == actor.id {
        return Ok(actor.clone());
    }

    if !actor.is_superuser {
        return Err(AppError::Forbidden);
    }

    state
        .user_repo
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound("ユーザー"))
}
