use crate::{
    access,
    auth::AuthUser,
    config::Config,
    db::Db,
    errors::ApiError,
    models::file::{FileRecord, PublicFileMeta},
    models::user,
    storage::FileStore,
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use sqlx::Row;

#[derive(Deserialize)]
pub struct ShareUsersReq {
    pub emails: Vec<String>,
}

/// Grants standing access to a set of accounts, addressed by email.
/// Owner-only; unknown emails and already-granted accounts are skipped.
pub async fn share_with_users(
    db: web::Data<Db>,
    user: AuthUser,
    path: web::Path<String>,
    body: web::Json<ShareUsersReq>,
) -> Result<HttpResponse, ApiError> {
    if body.emails.is_empty() {
        return Err(ApiError::BadRequest("Emails array is required".into()));
    }
    let file_id = path.into_inner();
    let file = FileRecord::find_by_id(&db, &file_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if file.owner_id != user.user_id {
        return Err(ApiError::Forbidden);
    }

    let ids = user::find_ids_by_emails(&db, &body.emails).await?;
    for uid in &ids {
        // owner access is implicit, never via the share set
        if uid == &file.owner_id {
            continue;
        }
        sqlx::query("INSERT OR IGNORE INTO file_shares(file_id, user_id) VALUES (?, ?)")
            .bind(&file.id)
            .bind(uid)
            .execute(&db.0)
            .await?;
    }

    let shared_with: Vec<String> = sqlx::query("SELECT user_id FROM file_shares WHERE file_id = ?")
        .bind(&file.id)
        .fetch_all(&db.0)
        .await?
        .into_iter()
        .map(|r| r.get("user_id"))
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "File shared with users",
        "shared_with": shared_with,
    })))
}

#[derive(Deserialize)]
pub struct ShareLinkReq {
    // A past instant is accepted and yields an immediately dead link.
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn create_share_link(
    cfg: web::Data<Config>,
    db: web::Data<Db>,
    user: AuthUser,
    path: web::Path<String>,
    body: web::Json<ShareLinkReq>,
) -> Result<HttpResponse, ApiError> {
    let file_id = path.into_inner();
    let file = FileRecord::find_by_id(&db, &file_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if file.owner_id != user.user_id {
        return Err(ApiError::Forbidden);
    }

    let token = new_token();
    sqlx::query("INSERT INTO share_links(token, file_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(&file.id)
        .bind(body.expires_at)
        .bind(Utc::now())
        .execute(&db.0)
        .await?;

    let share_url = format!("{}/access/{}", cfg.public_base_url.trim_end_matches('/'), token);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Share link created",
        "token": token,
        "share_url": share_url,
        "expires_at": body.expires_at,
    })))
}

/// 24 random bytes, hex encoded: 48 chars, collision-negligible.
pub fn new_token() -> String {
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Public metadata fetch by token. No identity required; the reduced
/// projection never exposes the stored name or the grant set.
pub async fn public_access(
    db: web::Data<Db>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let token = path.into_inner();
    let file = FileRecord::find_by_token(&db, &token)
        .await?
        .ok_or(ApiError::NotFound)?;
    let link = file.share_links.iter().find(|l| l.token == token);
    if !access::link_is_valid(link) {
        return Err(ApiError::Gone("Link has expired".into()));
    }
    let owner = user::find_public(&db, &file.owner_id)
        .await?
        .ok_or(ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Link is valid",
        "file": PublicFileMeta::from_record(file, owner),
    })))
}

pub async fn public_download(
    db: web::Data<Db>,
    store: web::Data<FileStore>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let token = path.into_inner();
    let file = FileRecord::find_by_token(&db, &token)
        .await?
        .ok_or(ApiError::NotFound)?;
    let link = file.share_links.iter().find(|l| l.token == token);
    if !access::link_is_valid(link) {
        return Err(ApiError::Gone("Link has expired".into()));
    }
    super::files::serve_stored(&req, &store, &file).await
}
