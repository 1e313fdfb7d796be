use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::{
    auth::{scopes::ScopeSet, token_service::TokenService},
    error::{AppError, AppResult, OAuthError},
    models::AppState,
};

/// The caller behind a validated access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPrincipal {
    pub principal_id: String,
    pub client_id: String,
    pub scopes: ScopeSet,
}

impl AuthPrincipal {
    pub fn require_scope(&self, scope: &str) -> AppResult<()> {
        if self.scopes.contains(scope) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("Required scope: {}", scope)))
        }
    }
}

// Populated by `gate_middleware`.
#[async_trait]
impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthPrincipal>()
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("Authentication required".to_string()))
    }
}

/// Extracts the token from a `Bearer <token>` header value. The scheme is
/// matched case-insensitively.
pub fn parse_bearer(header: Option<&str>) -> AppResult<&str> {
    let value = header
        .ok_or_else(|| AppError::Unauthenticated("Missing Authorization header".to_string()))?;

    let (scheme, token) = value
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| AppError::Unauthenticated("Bearer token required".to_string()))?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AppError::Unauthenticated("Bearer token required".to_string()));
    }
    Ok(token)
}

/// Turns an `Authorization` header into a principal.
#[derive(Clone)]
pub struct AuthorizationGate {
    tokens: TokenService,
}

impl AuthorizationGate {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    /// Rejections carry one uniform message; the specific reason is only
    /// logged.
    pub async fn authenticate(&self, header: Option<&str>) -> AppResult<AuthPrincipal> {
        let token = parse_bearer(header)?;

        match self.tokens.validate(token).await {
            Ok(info) => Ok(AuthPrincipal {
                principal_id: info.principal_id,
                client_id: info.client_id,
                scopes: info.scopes,
            }),
            Err(AppError::OAuth(e)) => {
                debug!(reason = %e.description, "bearer token rejected");
                Err(OAuthError::invalid_token("Invalid or expired token").into())
            }
            Err(e) => Err(e),
        }
    }
}

/// Network origin of a request: the socket peer when known, else the proxy
/// headers.
pub fn request_origin(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(addr) = peer {
        return addr.ip().to_string();
    }
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .unwrap_or("unknown")
        .to_string()
}

/// Authenticates, rate limits and records every request to the tool routes.
/// The principal is inserted into request extensions for [`AuthPrincipal`].
pub async fn gate_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let auth = match state.gate.authenticate(header.as_deref()).await {
        Err(e) if e.is_server_failure() => return e.into_response(),
        result => result,
    };

    let identifier = match &auth {
        Ok(principal) => format!("user:{}", principal.principal_id),
        Err(_) => {
            let peer = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            format!("ip:{}", request_origin(req.headers(), peer))
        }
    };

    let status = match state.rate_limiter.is_limited(&identifier).await {
        Ok(status) => status,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = state.rate_limiter.record(&identifier).await {
        return e.into_response();
    }

    if status.limited {
        warn!(%identifier, reason = ?status.reason, "rate limit exceeded");
        return AppError::RateLimited {
            reason: status.reason.unwrap_or_default(),
            retry_after: status.retry_after.unwrap_or(0),
            limit: status.limit.unwrap_or(0),
            current: status.current.unwrap_or(0),
        }
        .into_response();
    }

    match auth {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Checks a collaborator's shared secret in constant time. An unset secret
/// disables the surface it guards.
pub(crate) fn check_shared_key(
    headers: &HeaderMap,
    header_name: &str,
    expected: Option<&str>,
    surface: &str,
) -> AppResult<()> {
    let Some(expected) = expected else {
        return Err(AppError::Forbidden(format!("{} is disabled", surface)));
    };

    let presented = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated(format!("Missing {}", header_name)))?;

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        warn!(header = header_name, "invalid shared key presented");
        Err(AppError::Unauthenticated(format!("Invalid {}", header_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(parse_bearer(Some("Bearer abc")).unwrap(), "abc");
        assert_eq!(parse_bearer(Some("bearer abc")).unwrap(), "abc");
        assert_eq!(parse_bearer(Some("BEARER   abc ")).unwrap(), "abc");
    }

    #[test]
    fn malformed_headers_are_unauthenticated() {
        for header in [None, Some(""), Some("Bearer"), Some("Basic abc"), Some("Bearer a b")] {
            let err = parse_bearer(header).unwrap_err();
            assert!(matches!(err, AppError::Unauthenticated(_)), "{header:?}");
        }
    }

    #[test]
    fn origin_prefers_peer_then_forwarded_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_origin(&headers, None), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(request_origin(&headers, None), "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 172.16.0.1"));
        assert_eq!(request_origin(&headers, None), "10.0.0.1");

        let peer: SocketAddr = "192.168.1.5:4000".parse().unwrap();
        assert_eq!(request_origin(&headers, Some(peer)), "192.168.1.5");
    }

    #[test]
    fn missing_scope_is_forbidden() {
        let principal = AuthPrincipal {
            principal_id: "user-1".into(),
            client_id: "c1".into(),
            scopes: ScopeSet::from_vec(["read"]),
        };
        assert!(principal.require_scope("read").is_ok());
        assert!(matches!(principal.require_scope("write"), Err(AppError::Forbidden(_))));
    }
}
