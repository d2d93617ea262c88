use std::sync::Arc;

use hyper::header::{self, HeaderMap};
use tracing::{debug, warn};

use panel_shared::types::Claims;

use super::cookie::CookieService;
use super::token::TokenService;
use crate::database::{SessionError, SessionStore};
use crate::errors::{ApiError, ErrorCode};

/// Identity attached to a request once it passed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: i64,
    pub username: String,
    pub jti: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub claims: Claims,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.username.clone(),
            jti: claims.jti.clone(),
            roles: claims.roles.clone(),
            permissions: claims.permissions.clone(),
            claims,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cookie,
    Bearer,
}

/// Session cookie first, then `Authorization: Bearer`.
pub fn extract_token(
    headers: &HeaderMap,
    cookies: &CookieService,
) -> Result<(String, TokenSource), ApiError> {
    if let Some(token) = cookies.read_cookie(headers) {
        return Ok((token, TokenSource::Cookie));
    }

    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(ErrorCode::Unauthorized.into());
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::new(ErrorCode::InvalidRequest))?;

    Ok((token.to_string(), TokenSource::Bearer))
}

/// Runs token extraction, verification and the revocation lookup.
#[derive(Clone)]
pub struct Authenticator {
    tokens: Arc<TokenService>,
    cookies: Arc<CookieService>,
    sessions: Arc<dyn SessionStore>,
}

impl Authenticator {
    pub fn new(
        tokens: Arc<TokenService>,
        cookies: Arc<CookieService>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            tokens,
            cookies,
            sessions,
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
        let (token, source) = extract_token(headers, &self.cookies).inspect_err(|e| {
            debug!(code = %e.code, "No usable credentials on request");
        })?;

        // Three segments or nothing; skip the HMAC on obvious junk.
        if token.matches('.').count() != 2 {
            warn!(?source, "Rejected structurally invalid token");
            return Err(ErrorCode::InvalidRequest.into());
        }

        let claims = self.tokens.validate(&token).map_err(|e| {
            warn!(?source, "Token validation failed: {}", e);
            ApiError::new(ErrorCode::TokenExpired)
        })?;

        if claims.username.is_empty() || claims.iss != self.tokens.issuer() {
            warn!(?source, "Token claims failed integrity check");
            return Err(ErrorCode::InvalidCredentials.into());
        }

        match self.sessions.validate(&claims.jti).await {
            Ok(()) => {}
            Err(SessionError::Database(e)) => {
                warn!(jti = %claims.jti, "Session lookup failed: {}", e);
                return Err(ErrorCode::DatabaseError.into());
            }
            Err(e) => {
                warn!(jti = %claims.jti, username = %claims.username, "Session rejected: {}", e);
                return Err(ErrorCode::TokenExpired.into());
            }
        }

        debug!(username = %claims.username, jti = %claims.jti, ?source, "Request authenticated");
        Ok(AuthContext::from(claims))
    }
}

/// Predicate over the attached identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Permission(&'static str),
    AnyPermission(Vec<&'static str>),
    Role(&'static str),
}

impl Gate {
    /// A missing identity never passes.
    pub fn check(&self, identity: Option<&AuthContext>) -> Result<(), ApiError> {
        let Some(identity) = identity else {
            warn!(gate = ?self, "Gate reached without an authenticated identity");
            return Err(ErrorCode::PermissionDenied.into());
        };

        let allowed = match self {
            Gate::Permission(name) => identity.claims.has_permission(name),
            Gate::AnyPermission(names) => identity.claims.has_any_permission(names),
            Gate::Role(name) => identity.claims.has_role(name),
        };

        if allowed {
            Ok(())
        } else {
            warn!(username = %identity.username, gate = ?self, "Access denied");
            Err(ErrorCode::ActionNotAllowed.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hyper::header::HeaderValue;
    use panel_shared::types::server_config::CookieConfig;

    use crate::auth::token::TokenSubject;
    use crate::database::SqliteSessionStore;
    use crate::database::create::{create_sessions_schema, open_memory_pool};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct Fixture {
        auth: Authenticator,
        tokens: Arc<TokenService>,
        store: Arc<SqliteSessionStore>,
    }

    async fn fixture() -> Fixture {
        let pool = open_memory_pool().await.unwrap();
        create_sessions_schema(&pool).await.unwrap();
        let store = Arc::new(SqliteSessionStore::new(pool));
        let tokens = Arc::new(TokenService::new(
            SECRET,
            "vps-control",
            Duration::from_secs(3600),
        ));
        let cookies = Arc::new(CookieService::new(
            &CookieConfig::default(),
            Duration::from_secs(3600),
        ));
        Fixture {
            auth: Authenticator::new(tokens.clone(), cookies, store.clone()),
            tokens,
            store,
        }
    }

    async fn login(f: &Fixture, username: &str, permissions: &[&str]) -> String {
        let jti = f.store.new_session_id(username);
        let issued = f
            .tokens
            .issue(TokenSubject {
                user_id: 1,
                username: username.to_string(),
                jti: jti.clone(),
                roles: vec![],
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
            })
            .unwrap();
        f.store
            .save_exclusive(&jti, username, issued.expires_at)
            .await
            .unwrap();
        issued.token
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn code(result: Result<AuthContext, ApiError>) -> ErrorCode {
        result.unwrap_err().code
    }

    #[tokio::test]
    async fn no_credentials_is_unauthorized() {
        let f = fixture().await;
        assert_eq!(
            code(f.auth.authenticate(&HeaderMap::new()).await),
            ErrorCode::Unauthorized
        );
    }

    #[tokio::test]
    async fn malformed_bearer_header_is_bad_request() {
        let f = fixture().await;
        for raw in ["Basic abc", "Bearer ", "Bearer"] {
            let mut headers = HeaderMap::new();
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(raw));
            assert_eq!(
                code(f.auth.authenticate(&headers).await),
                ErrorCode::InvalidRequest,
                "{raw}"
            );
        }
    }

    #[tokio::test]
    async fn wrong_segment_count_is_bad_request() {
        let f = fixture().await;
        assert_eq!(
            code(f.auth.authenticate(&bearer("only.two")).await),
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            code(f.auth.authenticate(&bearer("a.b.c.d")).await),
            ErrorCode::InvalidRequest
        );
    }

    #[tokio::test]
    async fn bad_signature_is_token_expired_class() {
        let f = fixture().await;
        assert_eq!(
            code(f.auth.authenticate(&bearer("aaa.bbb.ccc")).await),
            ErrorCode::TokenExpired
        );
    }

    #[tokio::test]
    async fn valid_bearer_attaches_identity() {
        let f = fixture().await;
        let token = login(&f, "alice", &["user.view"]).await;
        let identity = f.auth.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.permissions, vec!["user.view"]);
        assert_eq!(identity.jti, identity.claims.jti);
    }

    #[tokio::test]
    async fn unrecorded_token_is_rejected() {
        let f = fixture().await;
        let issued = f
            .tokens
            .issue(TokenSubject {
                username: "ghost".to_string(),
                jti: "ghost_0_00".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            code(f.auth.authenticate(&bearer(&issued.token)).await),
            ErrorCode::TokenExpired
        );
    }

    #[tokio::test]
    async fn superseded_session_is_rejected() {
        let f = fixture().await;
        let first = login(&f, "alice", &[]).await;
        let second = login(&f, "alice", &[]).await;

        assert_eq!(
            code(f.auth.authenticate(&bearer(&first)).await),
            ErrorCode::TokenExpired
        );
        assert!(f.auth.authenticate(&bearer(&second)).await.is_ok());
    }

    #[tokio::test]
    async fn cookie_wins_over_bearer() {
        let f = fixture().await;
        let alice = login(&f, "alice", &[]).await;
        let bob = login(&f, "bob", &[]).await;

        let mut headers = bearer(&bob);
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("auth_token={alice}")).unwrap(),
        );
        let identity = f.auth.authenticate(&headers).await.unwrap();
        assert_eq!(identity.username, "alice");
    }

    fn identity(permissions: &[&str], roles: &[&str]) -> AuthContext {
        AuthContext::from(Claims {
            username: "alice".to_string(),
            user_id: 1,
            jti: "j".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            sub: "alice".to_string(),
            iss: "vps-control".to_string(),
            iat: 0,
            nbf: 0,
            exp: u64::MAX,
        })
    }

    #[test]
    fn permission_gates() {
        let who = identity(&["x"], &[]);
        assert!(Gate::Permission("x").check(Some(&who)).is_ok());
        assert_eq!(
            Gate::Permission("y").check(Some(&who)).unwrap_err().code,
            ErrorCode::ActionNotAllowed
        );
        assert!(Gate::AnyPermission(vec!["y", "x"]).check(Some(&who)).is_ok());
        assert!(Gate::AnyPermission(vec![]).check(Some(&who)).is_err());
    }

    #[test]
    fn role_gate() {
        let who = identity(&[], &["admin"]);
        assert!(Gate::Role("admin").check(Some(&who)).is_ok());
        assert!(Gate::Role("Admin").check(Some(&who)).is_err());
    }

    #[test]
    fn gates_without_identity_deny() {
        for gate in [
            Gate::Permission("x"),
            Gate::AnyPermission(vec!["x"]),
            Gate::Role("admin"),
        ] {
            assert_eq!(
                gate.check(None).unwrap_err().code,
                ErrorCode::PermissionDenied
            );
        }
    }
}
