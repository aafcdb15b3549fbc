use crate::config::Config;
use crate::errors::ApiError;
use actix_web::{FromRequest, HttpRequest, dev::Payload};
use chrono::{Duration, Utc};
use futures_util::future::{Ready, err, ok};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

// Token issuance lives outside this service; we only verify bearer tokens
// signed with the shared secret. `create_access_token` exists for that
// issuer and for tests.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: usize,
}

pub fn create_access_token(user_id: &str, cfg: &Config) -> Result<String, ApiError> {
    let exp = (Utc::now() + Duration::minutes(15)).timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(cfg.jwt_secret_bytes()),
    )
    .map_err(|_| ApiError::Internal)
}

pub fn verify_access_token(token: &str, cfg: &Config) -> Result<Claims, ApiError> {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(cfg.jwt_secret_bytes()), &v)
        .map(|data| data.claims)
        .map_err(|_| ApiError::Unauthorized)
}

/// A verified requester identity, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let cfg = req.app_data::<actix_web::web::Data<Config>>().unwrap();
        if let Some(h) = req.headers().get("Authorization") {
            if let Ok(s) = h.to_str() {
                if let Some(token) = s.strip_prefix("Bearer ") {
                    if let Ok(claims) = verify_access_token(token, cfg) {
                        return ok(AuthUser {
                            user_id: claims.sub,
                        });
                    }
                }
            }
        }
        err(ApiError::Unauthorized)
    }
}
