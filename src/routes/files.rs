use crate::{
    access,
    auth::AuthUser,
    config::Config,
    db::Db,
    errors::ApiError,
    models::file::{FileRecord, FileResponse},
    models::user,
    storage::FileStore,
};
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::Utc;
use futures_util::TryStreamExt as _;
use sanitize_filename::sanitize;
use serde::Deserialize;

const MAX_FILES_PER_UPLOAD: usize = 10;

pub async fn upload(
    cfg: web::Data<Config>,
    db: web::Data<Db>,
    store: web::Data<FileStore>,
    user: AuthUser,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    // Buffer and validate every part before anything is persisted, so a
    // rejected request leaves no bytes and no records behind.
    let mut parts: Vec<(String, String, Vec<u8>)> = Vec::new();
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart".into()))?
    {
        let original = field
            .content_disposition()
            .cloned()
            .and_then(|cd| cd.get_filename().map(|s| s.to_string()));
        let original = match original {
            Some(name) => sanitize(&name),
            None => continue, // non-file form field
        };
        // reject an over-count request before buffering another part
        if parts.len() >= MAX_FILES_PER_UPLOAD {
            return Err(ApiError::BadRequest("too many files, max 10 per upload".into()));
        }
        let mime = field
            .content_type()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !cfg.allowed_mime_types.iter().any(|m| m == &mime) {
            return Err(ApiError::BadRequest("Invalid file type".into()));
        }
        let mut data: Vec<u8> = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|_| ApiError::BadRequest("upload read error".into()))?
        {
            data.extend_from_slice(&chunk);
            if data.len() > cfg.max_upload_size {
                return Err(ApiError::BadRequest(format!(
                    "File too large. Max {} MB allowed.",
                    cfg.max_upload_size / (1024 * 1024)
                )));
            }
        }
        parts.push((original, mime, data));
    }
    if parts.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".into()));
    }

    // Bytes first, then the metadata row; a crash in between strands
    // orphan bytes, never a record without bytes.
    let mut created: Vec<FileResponse> = Vec::new();
    for (original_name, mime_type, data) in parts {
        let stored_name = store.put(&original_name, &data)?;
        let id = uuid::Uuid::new_v4().to_string();
        let upload_date = Utc::now();
        sqlx::query(
            "INSERT INTO files(id, owner_id, original_name, stored_name, mime_type, size_bytes, upload_date)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.user_id)
        .bind(&original_name)
        .bind(&stored_name)
        .bind(&mime_type)
        .bind(data.len() as i64)
        .bind(upload_date)
        .execute(&db.0)
        .await?;

        created.push(FileResponse::from_record(
            FileRecord {
                id,
                owner_id: user.user_id.clone(),
                original_name,
                stored_name,
                mime_type,
                size_bytes: data.len() as i64,
                upload_date,
                shared_with: Vec::new(),
                share_links: Vec::new(),
            },
            None,
        ));
    }

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Files uploaded successfully",
        "files": created,
    })))
}

pub async fn list_my(db: web::Data<Db>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let files = FileRecord::list_by_owner(&db, &user.user_id).await?;
    let files: Vec<FileResponse> = files
        .into_iter()
        .map(|f| FileResponse::from_record(f, None))
        .collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "files": files })))
}

pub async fn list_shared_with_me(
    db: web::Data<Db>,
    user: AuthUser,
) -> Result<HttpResponse, ApiError> {
    let files = FileRecord::list_shared_with(&db, &user.user_id).await?;
    let mut out: Vec<FileResponse> = Vec::with_capacity(files.len());
    for f in files {
        let owner = user::find_public(&db, &f.owner_id)
            .await?
            .ok_or(ApiError::Internal)?;
        out.push(FileResponse::from_record(f, Some(owner)));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "files": out })))
}

pub async fn get_file(
    db: web::Data<Db>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let file = FileRecord::find_by_id(&db, &id)
        .await?
        .ok_or(ApiError::NotFound)?;
    // No token path on metadata fetch: owner or granted users only.
    if !access::can_access(Some(&user.user_id), &file, None) {
        return Err(ApiError::Forbidden);
    }
    Ok(HttpResponse::Ok()
        .json(serde_json::json!({ "file": FileResponse::from_record(file, None) })))
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub token: Option<String>,
}

pub async fn download(
    db: web::Data<Db>,
    store: web::Data<FileStore>,
    req: HttpRequest,
    user: AuthUser,
    path: web::Path<String>,
    query: web::Query<DownloadQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let file = FileRecord::find_by_id(&db, &id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !access::can_access(Some(&user.user_id), &file, query.token.as_deref()) {
        return Err(ApiError::Forbidden);
    }
    serve_stored(&req, &store, &file).await
}

pub async fn delete_file(
    db: web::Data<Db>,
    store: web::Data<FileStore>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let file = FileRecord::find_by_id(&db, &id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if file.owner_id != user.user_id {
        return Err(ApiError::Forbidden);
    }
    // Bytes first, then the record; missing bytes are tolerated so a
    // half-deleted file can always be cleaned up.
    store.delete(&file.stored_name)?;
    sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(&file.id)
        .execute(&db.0)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "File deleted successfully" })))
}

/// Streams stored bytes as an attachment under the original name. 404 when
/// the metadata row exists but the bytes are gone.
pub async fn serve_stored(
    req: &HttpRequest,
    store: &FileStore,
    file: &FileRecord,
) -> Result<HttpResponse, ApiError> {
    let p = store.path(&file.stored_name);
    if !p.exists() {
        return Err(ApiError::NotFound);
    }
    let named = actix_files::NamedFile::open_async(p)
        .await
        .map_err(|_| ApiError::Internal)?
        .use_last_modified(true)
        .prefer_utf8(true)
        .set_content_disposition(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file.original_name.clone())],
        });

    let mut resp = named.into_response(req);
    if let Ok(val) = actix_web::http::header::HeaderValue::from_str(&file.mime_type) {
        resp.headers_mut()
            .insert(actix_web::http::header::CONTENT_TYPE, val);
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use actix_web::{http::StatusCode, test};
    use sqlx::Row;

    #[actix_web::test]
    async fn upload_creates_record_with_empty_share_set() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);

        // Scenario: a 5 MiB png from alice
        let body = multipart_body("XBOUND", &[("photo.png", "image/png", &[7u8; 5 * 1024 * 1024][..])]);
        let req = test::TestRequest::post()
            .uri("/api/files/upload")
            .insert_header(("Authorization", ctx.bearer("alice")))
            .insert_header(("Content-Type", "multipart/form-data; boundary=XBOUND"))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let row = sqlx::query("SELECT owner_id, mime_type, size_bytes FROM files")
            .fetch_one(&ctx.db.0)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("owner_id"), "alice");
        assert_eq!(row.get::<String, _>("mime_type"), "image/png");
        assert_eq!(row.get::<i64, _>("size_bytes"), 5 * 1024 * 1024);
        let shares: i64 = sqlx::query("SELECT COUNT(*) AS n FROM file_shares")
            .fetch_one(&ctx.db.0)
            .await
            .unwrap()
            .get("n");
        assert_eq!(shares, 0);
    }

    #[actix_web::test]
    async fn oversize_upload_rejected_without_record() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);

        let body = multipart_body("XBOUND", &[("big.png", "image/png", &[0u8; 11 * 1024 * 1024][..])]);
        let req = test::TestRequest::post()
            .uri("/api/files/upload")
            .insert_header(("Authorization", ctx.bearer("alice")))
            .insert_header(("Content-Type", "multipart/form-data; boundary=XBOUND"))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM files")
            .fetch_one(&ctx.db.0)
            .await
            .unwrap()
            .get("n");
        assert_eq!(n, 0);
    }

    #[actix_web::test]
    async fn disallowed_mime_type_rejected() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);

        let body = multipart_body("XBOUND", &[("a.zip", "application/zip", &b"PK\x03\x04"[..])]);
        let req = test::TestRequest::post()
            .uri("/api/files/upload")
            .insert_header(("Authorization", ctx.bearer("alice")))
            .insert_header(("Content-Type", "multipart/form-data; boundary=XBOUND"))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn eleventh_file_part_rejected_without_records() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);

        let names: Vec<String> = (0..11).map(|i| format!("f{}.txt", i)).collect();
        let parts: Vec<(&str, &str, &[u8])> = names
            .iter()
            .map(|n| (n.as_str(), "text/plain", &b"x"[..]))
            .collect();
        let body = multipart_body("XBOUND", &parts);
        let req = test::TestRequest::post()
            .uri("/api/files/upload")
            .insert_header(("Authorization", ctx.bearer("alice")))
            .insert_header(("Content-Type", "multipart/form-data; boundary=XBOUND"))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM files")
            .fetch_one(&ctx.db.0)
            .await
            .unwrap()
            .get("n");
        assert_eq!(n, 0);
    }

    #[actix_web::test]
    async fn upload_without_file_parts_rejected() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);

        // a lone form field, no file part
        let body = b"--XBOUND\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--XBOUND--\r\n".to_vec();
        let req = test::TestRequest::post()
            .uri("/api/files/upload")
            .insert_header(("Authorization", ctx.bearer("alice")))
            .insert_header(("Content-Type", "multipart/form-data; boundary=XBOUND"))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM files")
            .fetch_one(&ctx.db.0)
            .await
            .unwrap()
            .get("n");
        assert_eq!(n, 0);
    }

    #[actix_web::test]
    async fn listings_are_newest_first_and_scoped() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);
        let now = chrono::Utc::now();
        let older = ctx
            .seed_file_at("alice", "one.txt", b"1", now - chrono::Duration::minutes(5))
            .await;
        let newer = ctx.seed_file_at("alice", "two.txt", b"2", now).await;
        ctx.grant(&older, "bob").await;

        let req = test::TestRequest::get()
            .uri("/api/files/my")
            .insert_header(("Authorization", ctx.bearer("alice")))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["id"], newer);
        assert_eq!(files[1]["id"], older);

        // bob sees only the granted file, with alice's public profile
        let req = test::TestRequest::get()
            .uri("/api/files/shared/with-me")
            .insert_header(("Authorization", ctx.bearer("bob")))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["id"], older);
        assert_eq!(files[0]["owner"]["email"], "alice@example.org");
    }

    #[actix_web::test]
    async fn metadata_fetch_has_no_token_path() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);
        let id = ctx.seed_file("alice", "doc.txt", b"text").await;
        let token = ctx.seed_link(&id, None).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/files/{}?token={}", id, token))
            .insert_header(("Authorization", ctx.bearer("carol")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn download_forbidden_until_granted() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);
        let id = ctx.seed_file("alice", "doc.txt", b"shared text").await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/files/download/{}", id))
            .insert_header(("Authorization", ctx.bearer("bob")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        ctx.grant(&id, "bob").await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/files/download/{}", id))
            .insert_header(("Authorization", ctx.bearer("bob")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"shared text");
    }

    #[actix_web::test]
    async fn download_404_when_bytes_missing() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);
        let id = ctx.seed_file("alice", "gone.txt", b"x").await;
        ctx.remove_bytes(&id).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/files/download/{}", id))
            .insert_header(("Authorization", ctx.bearer("alice")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn delete_owner_only_and_tolerates_missing_bytes() {
        let ctx = TestCtx::new().await;
        let app = test_app!(ctx);
        let id = ctx.seed_file("alice", "doomed.txt", b"x").await;
        ctx.remove_bytes(&id).await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/files/{}", id))
            .insert_header(("Authorization", ctx.bearer("bob")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/files/{}", id))
            .insert_header(("Authorization", ctx.bearer("alice")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM files")
            .fetch_one(&ctx.db.0)
            .await
            .unwrap()
            .get("n");
        assert_eq!(n, 0);
    }
}
