//! Connect-time identity
//!
//! Every request to the matchmaking surface carries a `Viewer`. Credentials
//! are tried in order:
//!
//! 1. `Authorization: Bearer <jwt>`
//! 2. `?token=<jwt>` (browsers cannot set headers on a WebSocket upgrade)
//! 3. The `menti_session` cookie, resolved through the profile store
//!
//! Anything missing or invalid degrades to an anonymous guest. Guests can
//! queue, chat and join rooms but cannot host rooms.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use serde::Deserialize;
use uuid::Uuid;

use super::api::MatchmakingState;
use super::protocol::AccountId;
use super::session::ConnectionSession;
use crate::core::auth::{Claims, JwtService};
use crate::core::db::models::{Account, CreateAccount};
use crate::core::store::{ProfileStore, StoreError};

/// Cookie carrying a raw session token
pub const SESSION_COOKIE: &str = "menti_session";

/// Prefix of generated guest names
const GUEST_PREFIX: &str = "Guest-";

// ============================================================================
// Viewer
// ============================================================================

/// Identity of whoever is on the other end of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub account_id: Option<AccountId>,
    pub display_name: String,
    /// Non-guest account; may host rooms
    pub authenticated: bool,
}

impl Viewer {
    /// Anonymous guest with a generated name
    pub fn guest() -> Self {
        Self {
            account_id: None,
            display_name: guest_name(),
            authenticated: false,
        }
    }

    pub fn from_account(account: &Account) -> Self {
        Self {
            account_id: Some(account.id),
            display_name: account.username.clone(),
            authenticated: !account.is_guest,
        }
    }

    /// Fresh IDLE session for a connection opened by this viewer
    pub fn into_session(self, connection_id: Uuid) -> ConnectionSession {
        let session = ConnectionSession::new(connection_id, self.display_name);
        match self.account_id {
            Some(account_id) => session.with_account(account_id, self.authenticated),
            None => session,
        }
    }
}

/// `Guest-` followed by eight hex digits
pub fn guest_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{GUEST_PREFIX}{}", &id[..8])
}

// ============================================================================
// Credential resolution
// ============================================================================

/// A credential presented with the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    AccessToken(String),
    SessionCookie(String),
    None,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer token from the Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
}

impl Credential {
    /// Pick the first credential present, in priority order
    pub fn from_parts(parts: &Parts) -> Self {
        if let Some(token) = bearer_token(&parts.headers) {
            return Self::AccessToken(token);
        }

        if let Ok(Query(TokenQuery { token: Some(token) })) =
            Query::<TokenQuery>::try_from_uri(&parts.uri)
            && !token.is_empty()
        {
            return Self::AccessToken(token);
        }

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE)
            && !cookie.value().is_empty()
        {
            return Self::SessionCookie(cookie.value().to_string());
        }

        Self::None
    }

    /// Turn the credential into a viewer; failures fall back to a guest
    pub async fn resolve(self, jwt: Option<&JwtService>, store: &dyn ProfileStore) -> Viewer {
        let resolved = match self {
            Self::AccessToken(token) => match jwt {
                Some(jwt) => match jwt.validate_token(&token) {
                    Ok(claims) => account_from_claims(&claims, store).await,
                    Err(e) => {
                        tracing::debug!(error = %e, "Access token rejected");
                        Ok(None)
                    }
                },
                None => {
                    tracing::debug!("Access token presented but no signing secret is configured");
                    Ok(None)
                }
            },
            Self::SessionCookie(raw) => match store.resolve_session(&raw).await {
                Ok(Some(account_id)) => store.find_account(account_id).await,
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            },
            Self::None => Ok(None),
        };

        match resolved {
            Ok(Some(account)) => Viewer::from_account(&account),
            Ok(None) => Viewer::guest(),
            Err(e) => {
                tracing::warn!(error = %e, "Credential lookup failed, continuing as guest");
                Viewer::guest()
            }
        }
    }
}

/// Known account for the token subject, created on first sight
async fn account_from_claims(
    claims: &Claims,
    store: &dyn ProfileStore,
) -> Result<Option<Account>, StoreError> {
    let Ok(account_id) = claims.account_id() else {
        return Ok(None);
    };

    if let Some(account) = store.find_account(account_id).await? {
        return Ok(Some(account));
    }

    let created = store
        .create_account(CreateAccount {
            id: Some(account_id),
            username: claims.username.clone(),
            is_guest: claims.is_guest,
        })
        .await;

    match created {
        Ok(account) => {
            tracing::info!(account_id = %account.id, "Account created from access token");
            Ok(Some(account))
        }
        // Another connection with the same token won the insert
        Err(StoreError::Conflict(_)) => store.find_account(account_id).await,
        Err(e) => Err(e),
    }
}

impl FromRequestParts<MatchmakingState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &MatchmakingState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Credential::from_parts(parts)
            .resolve(state.jwt(), state.store())
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::JwtConfig;
    use crate::core::store::MemoryProfileStore;
    use axum::http::Request;

    const SECRET: &str = "test_secret_key_for_testing_only_32bytes!";

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    // ========================================================================
    // Credential extraction
    // ========================================================================

    #[test]
    fn test_bearer_header_wins() {
        let parts = parts(
            Request::builder()
                .uri("/ws?token=from-query")
                .header("Authorization", "Bearer from-header")
                .header("Cookie", "menti_session=from-cookie")
                .body(())
                .unwrap(),
        );
        assert_eq!(
            Credential::from_parts(&parts),
            Credential::AccessToken("from-header".to_string())
        );
    }

    #[test]
    fn test_query_token_before_cookie() {
        let parts = parts(
            Request::builder()
                .uri("/ws?token=from-query")
                .header("Cookie", "menti_session=from-cookie")
                .body(())
                .unwrap(),
        );
        assert_eq!(
            Credential::from_parts(&parts),
            Credential::AccessToken("from-query".to_string())
        );
    }

    #[test]
    fn test_cookie_fallback() {
        let parts = parts(
            Request::builder()
                .uri("/ws")
                .header("Cookie", "theme=dark; menti_session=abc123")
                .body(())
                .unwrap(),
        );
        assert_eq!(
            Credential::from_parts(&parts),
            Credential::SessionCookie("abc123".to_string())
        );
    }

    #[test]
    fn test_no_credential() {
        let parts = parts(
            Request::builder()
                .uri("/ws")
                .header("Authorization", "Basic dXNlcjpwYXNz")
                .body(())
                .unwrap(),
        );
        assert_eq!(Credential::from_parts(&parts), Credential::None);
    }

    #[test]
    fn test_guest_name_format() {
        let name = guest_name();
        assert!(name.starts_with("Guest-"));
        assert_eq!(name.len(), GUEST_PREFIX.len() + 8);
        assert!(name[GUEST_PREFIX.len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    #[tokio::test]
    async fn test_access_token_creates_account() {
        let store = MemoryProfileStore::new();
        let jwt = JwtService::new(JwtConfig::new(SECRET));
        let account_id = Uuid::new_v4();
        let (token, _) = jwt.issue_access_token(account_id, "river", false).unwrap();

        let viewer = Credential::AccessToken(token.clone())
            .resolve(Some(&jwt), &store)
            .await;
        assert_eq!(viewer.account_id, Some(account_id));
        assert_eq!(viewer.display_name, "river");
        assert!(viewer.authenticated);
        assert!(store.find_account(account_id).await.unwrap().is_some());

        // Second connection finds the same account
        let again = Credential::AccessToken(token)
            .resolve(Some(&jwt), &store)
            .await;
        assert_eq!(again, viewer);
    }

    #[tokio::test]
    async fn test_guest_token_is_not_authenticated() {
        let store = MemoryProfileStore::new();
        let jwt = JwtService::new(JwtConfig::new(SECRET));
        let (token, _) = jwt
            .issue_access_token(Uuid::new_v4(), "visitor", true)
            .unwrap();

        let viewer = Credential::AccessToken(token).resolve(Some(&jwt), &store).await;
        assert!(viewer.account_id.is_some());
        assert!(!viewer.authenticated);
    }

    #[tokio::test]
    async fn test_invalid_token_is_guest() {
        let store = MemoryProfileStore::new();
        let jwt = JwtService::new(JwtConfig::new(SECRET));

        let viewer = Credential::AccessToken("not.a.jwt".to_string())
            .resolve(Some(&jwt), &store)
            .await;
        assert_eq!(viewer.account_id, None);
        assert!(viewer.display_name.starts_with("Guest-"));
    }

    #[tokio::test]
    async fn test_token_without_secret_is_guest() {
        let store = MemoryProfileStore::new();
        let jwt = JwtService::new(JwtConfig::new(SECRET));
        let (token, _) = jwt
            .issue_access_token(Uuid::new_v4(), "river", false)
            .unwrap();

        let viewer = Credential::AccessToken(token).resolve(None, &store).await;
        assert!(!viewer.authenticated);
        assert_eq!(viewer.account_id, None);
    }

    #[tokio::test]
    async fn test_session_cookie_resolves_member() {
        let store = MemoryProfileStore::new();
        let account = store
            .create_account(CreateAccount {
                id: None,
                username: "harbor".to_string(),
                is_guest: false,
            })
            .await
            .unwrap();
        store.insert_session("raw-cookie", account.id, chrono::Duration::hours(1));

        let viewer = Credential::SessionCookie("raw-cookie".to_string())
            .resolve(None, &store)
            .await;
        assert_eq!(viewer, Viewer::from_account(&account));

        let unknown = Credential::SessionCookie("nope".to_string())
            .resolve(None, &store)
            .await;
        assert_eq!(unknown.account_id, None);
    }

    #[test]
    fn test_into_session() {
        let connection_id = Uuid::new_v4();
        let guest = Viewer::guest().into_session(connection_id);
        assert_eq!(guest.account_id, None);
        assert!(!guest.authenticated);

        let account_id = Uuid::new_v4();
        let member = Viewer {
            account_id: Some(account_id),
            display_name: "harbor".to_string(),
            authenticated: true,
        }
        .into_session(connection_id);
        assert_eq!(member.account_id, Some(account_id));
        assert!(member.authenticated);
        assert_eq!(member.display_name, "harbor");
    }
}
