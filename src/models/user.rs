use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub is_superuser: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
