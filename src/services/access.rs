//! Edit-capability predicate — the authorization collaborator.
//!
//! DESIGN
//! ======
//! Two regimes, depending on where the picture lives:
//! - public gallery (no space): the picture's owner or a platform admin;
//! - team space: membership role `editor` or `admin`. Space creation
//!   seeds an `admin` membership for the owner, so owners are covered by
//!   the membership query.
//!
//! The policy itself is pure; only the membership lookup touches the
//! database.

use sqlx::{PgPool, Row};

use crate::services::picture::{PictureRef, SpaceRef};
use crate::services::session::SessionUser;

/// Membership roles granting edit capability within a team space.
const EDIT_ROLES: [&str; 2] = ["editor", "admin"];

/// Whether `user` may edit `picture` collaboratively.
///
/// # Errors
///
/// Returns a database error if the membership lookup fails.
pub async fn can_edit(
    pool: &PgPool,
    user: &SessionUser,
    picture: &PictureRef,
    space: Option<&SpaceRef>,
) -> Result<bool, sqlx::Error> {
    let Some(space) = space else {
        return Ok(public_gallery_can_edit(user, picture));
    };
    let role = member_role(pool, space.id, user.id).await?;
    Ok(role.as_deref().is_some_and(role_allows))
}

fn public_gallery_can_edit(user: &SessionUser, picture: &PictureRef) -> bool {
    user.is_admin || picture.owner_id == user.id
}

fn role_allows(role: &str) -> bool {
    EDIT_ROLES.contains(&role)
}

async fn member_role(pool: &PgPool, space_id: i64, user_id: i64) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT role FROM space_members WHERE space_id = $1 AND user_id = $2")
        .bind(space_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get("role")))
}

#[cfg(test)]
#[path = "access_test.rs"]
mod tests;
