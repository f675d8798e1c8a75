//! Per-route access requirements.
//!
//! Every route group is tagged with an [`Access`] level; the
//! [`enforce_access`] middleware checks it before the handler runs, so
//! handlers never deal with credentials themselves.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Header carrying the base64-encoded user password.
pub const PASSWORD_HEADER: &str = "x-appshelf-password";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone.
    Public,
    /// Clients knowing the user password, if one is configured.
    User,
    /// Holders of the admin bearer token.
    Admin,
}

impl Access {
    pub fn check(self, headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
        match self {
            Access::Public => Ok(()),
            Access::User => verify_user_password(headers, config),
            Access::Admin => verify_admin_token(headers, config),
        }
    }
}

/// State of one [`enforce_access`] layer.
#[derive(Clone)]
pub struct AccessGuard {
    pub access: Access,
    pub config: Arc<ServerConfig>,
}

pub async fn enforce_access(
    State(guard): State<AccessGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    if guard.access != Access::Public {
        // argon2 verification is CPU-bound
        let headers = request.headers().clone();
        tokio::task::spawn_blocking(move || guard.access.check(&headers, &guard.config)).await??;
    }
    Ok(next.run(request).await)
}

fn verify_user_password(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref hash) = config.user_password_hash else {
        return Ok(());
    };

    let encoded = headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("Password required".into()))?;

    let supplied = STANDARD
        .decode(encoded.trim())
        .map_err(|_| ServerError::Unauthorized("Invalid password".into()))?;

    if !verify_secret(&supplied, hash) {
        return Err(ServerError::Unauthorized("Invalid password".into()));
    }
    Ok(())
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref hash) = config.admin_token_hash else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN_HASH configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    if token.is_empty() || !verify_secret(token.as_bytes(), hash) {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }
    Ok(())
}

/// Check `supplied` against a PHC-format argon2 hash.  A hash that does not
/// parse matches nothing.
fn verify_secret(supplied: &[u8], phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(hash) => Argon2::default().verify_password(supplied, &hash).is_ok(),
        Err(e) => {
            tracing::error!("configured secret hash is not a valid PHC string: {e}");
            false
        }
    }
}

/// Hash `secret` with cheap argon2 parameters so tests stay fast.
#[cfg(test)]
pub(crate) fn hash_for_tests(secret: &str) -> String {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::{Algorithm, Params, Version};

    let params = Params::new(8, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(secret.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn config(password: Option<&str>, token: Option<&str>) -> ServerConfig {
        ServerConfig {
            user_password_hash: password.map(hash_for_tests),
            admin_token_hash: token.map(hash_for_tests),
            ..ServerConfig::default()
        }
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn user_access_is_open_without_password() {
        assert!(Access::User.check(&HeaderMap::new(), &config(None, None)).is_ok());
    }

    #[test]
    fn user_access_checks_base64_password() {
        let config = config(Some("hunter2"), None);
        let good = STANDARD.encode("hunter2");
        let bad = STANDARD.encode("hunter3");

        assert!(Access::User
            .check(&headers(&[(PASSWORD_HEADER, &good)]), &config)
            .is_ok());
        assert!(matches!(
            Access::User.check(&headers(&[(PASSWORD_HEADER, &bad)]), &config),
            Err(ServerError::Unauthorized(_))
        ));
        assert!(matches!(
            Access::User.check(&headers(&[(PASSWORD_HEADER, "hunter2")]), &config),
            Err(ServerError::Unauthorized(_))
        ));
        assert!(matches!(
            Access::User.check(&HeaderMap::new(), &config),
            Err(ServerError::Unauthorized(_))
        ));
    }

    #[test]
    fn admin_access_needs_configured_token() {
        let h = headers(&[("authorization", "Bearer secret")]);

        assert!(matches!(
            Access::Admin.check(&h, &config(None, None)),
            Err(ServerError::Forbidden(_))
        ));
        assert!(Access::Admin.check(&h, &config(None, Some("secret"))).is_ok());
        assert!(Access::Admin
            .check(&h, &config(None, Some("other")))
            .is_err());
        assert!(Access::Public.check(&HeaderMap::new(), &config(Some("x"), Some("y"))).is_ok());
    }

    #[test]
    fn plaintext_in_place_of_a_hash_matches_nothing() {
        let config = ServerConfig {
            user_password_hash: Some("hunter2".into()),
            admin_token_hash: Some("secret".into()),
            ..ServerConfig::default()
        };

        let password = STANDARD.encode("hunter2");
        assert!(matches!(
            Access::User.check(&headers(&[(PASSWORD_HEADER, &password)]), &config),
            Err(ServerError::Unauthorized(_))
        ));
        assert!(matches!(
            Access::Admin.check(&headers(&[("authorization", "Bearer secret")]), &config),
            Err(ServerError::Forbidden(_))
        ));
    }
}
