use serde::Serialize;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::db::Db;
use crate::errors::ApiError;
use super::user::PublicUser;

/// A bearer-token capability granting access to one file.
#[derive(Serialize, Debug, Clone)]
pub struct ShareLink {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One uploaded file with its full sharing state: the explicit grant set
/// and every link ever minted for it. Small enough to load whole; the
/// access predicate evaluates against this in memory.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub upload_date: DateTime<Utc>,
    pub shared_with: Vec<String>,
    pub share_links: Vec<ShareLink>,
}

impl FileRecord {
    pub async fn find_by_id(db: &Db, id: &str) -> Result<Option<FileRecord>, ApiError> {
        let row = sqlx::query(
            "SELECT id, owner_id, original_name, stored_name, mime_type, size_bytes, upload_date
             FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&db.0)
        .await?;
        match row {
            Some(r) => Ok(Some(Self::assemble(db, r).await?)),
            None => Ok(None),
        }
    }

    /// Looks a file up by one of its share-link tokens. Token validity is
    /// the caller's problem; this only finds the carrying record.
    pub async fn find_by_token(db: &Db, token: &str) -> Result<Option<FileRecord>, ApiError> {
        let row = sqlx::query(
            "SELECT f.id, f.owner_id, f.original_name, f.stored_name, f.mime_type, f.size_bytes, f.upload_date
             FROM files f INNER JOIN share_links l ON l.file_id = f.id
             WHERE l.token = ?",
        )
        .bind(token)
        .fetch_optional(&db.0)
        .await?;
        match row {
            Some(r) => Ok(Some(Self::assemble(db, r).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_by_owner(db: &Db, owner_id: &str) -> Result<Vec<FileRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, original_name, stored_name, mime_type, size_bytes, upload_date
             FROM files WHERE owner_id = ? ORDER BY upload_date DESC",
        )
        .bind(owner_id)
        .fetch_all(&db.0)
        .await?;
        let mut files = Vec::with_capacity(rows.len());
        for r in rows {
            files.push(Self::assemble(db, r).await?);
        }
        Ok(files)
    }

    pub async fn list_shared_with(db: &Db, user_id: &str) -> Result<Vec<FileRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT f.id, f.owner_id, f.original_name, f.stored_name, f.mime_type, f.size_bytes, f.upload_date
             FROM files f INNER JOIN file_shares s ON s.file_id = f.id
             WHERE s.user_id = ? ORDER BY f.upload_date DESC",
        )
        .bind(user_id)
        .fetch_all(&db.0)
        .await?;
        let mut files = Vec::with_capacity(rows.len());
        for r in rows {
            files.push(Self::assemble(db, r).await?);
        }
        Ok(files)
    }

    async fn assemble(db: &Db, row: SqliteRow) -> Result<FileRecord, ApiError> {
        let id: String = row.get("id");
        let shared_with: Vec<String> = sqlx::query("SELECT user_id FROM file_shares WHERE file_id = ?")
            .bind(&id)
            .fetch_all(&db.0)
            .await?
            .into_iter()
            .map(|r| r.get("user_id"))
            .collect();
        let share_links: Vec<ShareLink> =
            sqlx::query("SELECT token, expires_at FROM share_links WHERE file_id = ? ORDER BY created_at ASC")
                .bind(&id)
                .fetch_all(&db.0)
                .await?
                .into_iter()
                .map(|r| ShareLink {
                    token: r.get("token"),
                    expires_at: r.get("expires_at"),
                })
                .collect();
        Ok(FileRecord {
            id,
            owner_id: row.get("owner_id"),
            original_name: row.get("original_name"),
            stored_name: row.get("stored_name"),
            mime_type: row.get("mime_type"),
            size_bytes: row.get("size_bytes"),
            upload_date: row.get("upload_date"),
            shared_with,
            share_links,
        })
    }
}

/// Full projection, for the owner and explicitly granted users.
#[derive(Serialize, Debug)]
pub struct FileResponse {
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub upload_date: DateTime<Utc>,
    pub shared_with: Vec<String>,
    pub share_links: Vec<ShareLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<PublicUser>,
}

impl FileResponse {
    pub fn from_record(file: FileRecord, owner: Option<PublicUser>) -> Self {
        Self {
            id: file.id,
            owner_id: file.owner_id,
            original_name: file.original_name,
            stored_name: file.stored_name,
            mime_type: file.mime_type,
            size_bytes: file.size_bytes,
            upload_date: file.upload_date,
            shared_with: file.shared_with,
            share_links: file.share_links,
            owner,
        }
    }
}

/// Reduced projection for token-based public access. No stored name, no
/// grant set, no link collection.
#[derive(Serialize, Debug)]
pub struct PublicFileMeta {
    pub id: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub upload_date: DateTime<Utc>,
    pub owner: PublicUser,
}

impl PublicFileMeta {
    pub fn from_record(file: FileRecord, owner: PublicUser) -> Self {
        Self {
            id: file.id,
            original_name: file.original_name,
            mime_type: file.mime_type,
            size_bytes: file.size_bytes,
            upload_date: file.upload_date,
            owner,
        }
    }
}
