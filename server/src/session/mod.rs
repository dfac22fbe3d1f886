pub mod store;

use sha2::{Digest, Sha512};
use tower_cookies::{cookie::SameSite, Cookie, Cookies, Key};
use uuid::Uuid;

pub const SESSION_COOKIE_NAME: &str = "session";

/// Signing key for the session cookie.
#[derive(Clone)]
pub struct SessionKey(Key);

impl SessionKey {
    /// Any non-empty secret works, it is stretched to a full key with SHA-512.
    pub fn from_secret(secret: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(!secret.is_empty(), "session secret must not be empty");
        let digest = Sha512::digest(secret.as_bytes());
        Ok(Self(Key::from(digest.as_slice())))
    }

    pub fn generate() -> Self {
        Self(Key::generate())
    }

    /// `SESSION_SECRET` from the environment, or a per-process random key.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("SESSION_SECRET") {
            Ok(secret) => Self::from_secret(&secret),
            Err(_) => {
                tracing::warn!(
                    "SESSION_SECRET is not set, sessions will not survive a restart"
                );
                Ok(Self::generate())
            }
        }
    }
}

/// The session id carried by a correctly signed cookie, if any.
pub fn existing_session_id(cookies: &Cookies, key: &SessionKey) -> Option<Uuid> {
    cookies
        .signed(&key.0)
        .get(SESSION_COOKIE_NAME)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// Reuses the caller's session or starts a new one and sets its cookie.
pub fn session_id(cookies: &Cookies, key: &SessionKey) -> Uuid {
    if let Some(id) = existing_session_id(cookies, key) {
        return id;
    }

    let id = Uuid::new_v4();
    let cookie = Cookie::build((SESSION_COOKIE_NAME, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    cookies.signed(&key.0).add(cookie);
    tracing::debug!(session = %id, "Started chat session");
    id
}
