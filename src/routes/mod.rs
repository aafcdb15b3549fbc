use actix_web::web;

pub mod files;
pub mod shares;

/// Route table for the file API. Literal paths are registered before the
/// `{id}` captures so actix matches them first.
pub fn api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/files")
            .route("/upload", web::post().to(files::upload))
            .route("/my", web::get().to(files::list_my))
            .route("/shared/with-me", web::get().to(files::list_shared_with_me))
            .route("/download/{id}", web::get().to(files::download))
            .route("/public/access/{token}", web::get().to(shares::public_access))
            .route("/public/download/{token}", web::get().to(shares::public_download))
            .route("/{file_id}/share/users", web::post().to(shares::share_with_users))
            .route("/{file_id}/share/link", web::post().to(shares::create_share_link))
            .route("/{id}", web::get().to(files::get_file))
            .route("/{id}", web::delete().to(files::delete_file)),
    );
}
