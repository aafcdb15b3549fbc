use serde::Serialize;
use sqlx::Row;

use crate::db::Db;
use crate::errors::ApiError;

/// Minimal profile exposed when a file's owner is shown to other users.
#[derive(Serialize, Debug, Clone)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

pub async fn find_public(db: &Db, user_id: &str) -> Result<Option<PublicUser>, ApiError> {
    let row = sqlx::query("SELECT id, name, email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&db.0)
        .await?;
    Ok(row.map(|r| PublicUser {
        id: r.get("id"),
        name: r.get("name"),
        email: r.get("email"),
    }))
}

/// Resolves email addresses to account ids. Unknown addresses are skipped.
pub async fn find_ids_by_emails(db: &Db, emails: &[String]) -> Result<Vec<String>, ApiError> {
    if emails.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; emails.len()].join(", ");
    let sql = format!("SELECT id FROM users WHERE email IN ({})", placeholders);
    let mut q = sqlx::query(&sql);
    for email in emails {
        q = q.bind(email);
    }
    let rows = q.fetch_all(&db.0).await?;
    Ok(rows.into_iter().map(|r| r.get("id")).collect())
}
