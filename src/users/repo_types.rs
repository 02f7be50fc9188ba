use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,                      // surrogate key, carried in tokens
    pub uuid: Uuid,                   // public identifier
    pub name: String,
    pub email: String,
    pub password_hash: String,        // Argon2 hash, never leaves the server
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Values needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}
