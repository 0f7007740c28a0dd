//! Bearer-token management and axum auth middleware shared by both control
//! planes (§4.H, §4.I). Each plane persists its own token under
//! `<home>/secrets/<plane>.token` with mode `0600`.

use std::{fs, path::Path};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::OttoError;

/// Load the token at `path`, or mint and persist a new one if absent.
pub fn load_or_create_token(path: &Path) -> Result<String, String> {
    if path.exists() {
        return fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| format!("failed to read token file {path:?}: {e}"));
    }

    let token = Uuid::new_v4().to_string().replace('-', "");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create secrets dir: {e}"))?;
    }
    fs::write(path, &token).map_err(|e| format!("failed to write token {path:?}: {e}"))?;

    #[cfg(unix)]
    {
        let mut perms = fs::metadata(path)
            .map_err(|e| format!("failed to read token metadata: {e}"))?
            .permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)
            .map_err(|e| format!("failed to set token permissions: {e}"))?;
    }

    Ok(token)
}

#[derive(Clone)]
pub struct BearerToken(pub Arc<String>);

impl BearerToken {
    pub fn new(token: String) -> Self {
        Self(Arc::new(token))
    }

    /// Validate `Authorization: Bearer <token>` against this plane's
    /// expected token. No query-string or cookie fallback (§6 HTTP contract
    /// conventions).
    pub async fn middleware(
        axum::extract::State(expected): axum::extract::State<BearerToken>,
        headers: HeaderMap,
        request: Request<Body>,
        next: Next,
    ) -> Result<Response, OttoError> {
        let provided = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(token) if token == expected.0.as_str() => Ok(next.run(request).await),
            _ => Err(OttoError::Unauthorized),
        }
    }
}

pub fn status_ok() -> StatusCode {
    StatusCode::OK
}
