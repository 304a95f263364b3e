//! Picture and space lookups — the storage collaborator.
//!
//! Upload, review, and CRUD live in the storage subsystem; the handshake
//! only needs existence and container metadata for the target picture.

use sqlx::{PgPool, Row};

/// `spaces.space_type` values.
pub const SPACE_TYPE_PRIVATE: i32 = 0;
pub const SPACE_TYPE_TEAM: i32 = 1;

/// Slice of a picture row the handshake cares about.
#[derive(Debug, Clone)]
pub struct PictureRef {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    /// Absent for public-gallery pictures.
    pub space_id: Option<i64>,
}

/// Slice of a space row the handshake cares about.
#[derive(Debug, Clone)]
pub struct SpaceRef {
    pub id: i64,
    pub owner_id: i64,
    pub space_type: i32,
}

/// Look up a picture by id.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_picture(pool: &PgPool, picture_id: i64) -> Result<Option<PictureRef>, sqlx::Error> {
    let row = sqlx::query("SELECT id, name, owner_id, space_id FROM pictures WHERE id = $1")
        .bind(picture_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| PictureRef {
        id: r.get("id"),
        name: r.get("name"),
        owner_id: r.get("owner_id"),
        space_id: r.get("space_id"),
    }))
}

/// Look up a space by id.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_space(pool: &PgPool, space_id: i64) -> Result<Option<SpaceRef>, sqlx::Error> {
    let row = sqlx::query("SELECT id, owner_id, space_type FROM spaces WHERE id = $1")
        .bind(space_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| SpaceRef {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        space_type: r.get("space_type"),
    }))
}
