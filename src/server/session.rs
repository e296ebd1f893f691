use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};
use tracing::debug;

use crate::chat::conversation_state::SessionKey;

pub const SESSION_COOKIE: &str = "kumtanesi_session";

/// The caller's session, read from the session cookie or freshly issued.
///
/// Used as a response part it sets the cookie when the key is new.
#[derive(Debug, Clone)]
pub struct BrowserSession {
    pub key: SessionKey,
    fresh: bool,
}

impl BrowserSession {
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    fn from_headers(headers: &HeaderMap) -> Self {
        match session_key_from_cookies(headers) {
            Some(key) => Self { key, fresh: false },
            None => {
                let key = SessionKey::generate();
                debug!("Issuing new session {}", key);
                Self { key, fresh: true }
            }
        }
    }

    fn set_cookie_value(&self) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE, self.key
        )
    }
}

fn session_key_from_cookies(headers: &HeaderMap) -> Option<SessionKey> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| SessionKey::parse(value.trim()))
}

#[async_trait]
impl<S> FromRequestParts<S> for BrowserSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

impl IntoResponseParts for BrowserSession {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if self.fresh {
            if let Ok(value) = HeaderValue::from_str(&self.set_cookie_value()) {
                res.headers_mut().append(SET_COOKIE, value);
            }
        }
        Ok(res)
    }
}
