//! Role-gated route middleware.
//!
//! Paths matching an [`AccessRule`] need a valid session with a role that
//! satisfies the rule. Page requests are redirected, `/api` requests get a
//! JSON error.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};

use crate::auth::identity::Identity;
use crate::auth::provider::AuthProvider;
use crate::config::{AccessRule, AuthConfig, RequiredRole};
use crate::http::path::{malformed_path, normalize_path};
use crate::observability::metrics;

/// Forwarded to the upstream with the authenticated user's id.
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
/// Forwarded to the upstream with the authenticated user's role.
pub const USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");

/// Shared state for [`auth_guard_middleware`].
pub struct GuardState {
    provider: Arc<dyn AuthProvider>,
    // Longest prefix first.
    rules: Vec<AccessRule>,
    session_cookie: String,
    login_path: String,
    forbidden_redirect: String,
}

impl GuardState {
    pub fn new(config: &AuthConfig, provider: Arc<dyn AuthProvider>) -> Self {
        let mut rules = config.rules.clone();
        rules.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));

        Self {
            provider,
            rules,
            session_cookie: config.session_cookie.clone(),
            login_path: config.login_path.clone(),
            forbidden_redirect: config.forbidden_redirect.clone(),
        }
    }

    /// Role required for `path`, if any rule covers it. `path` must already
    /// be canonical, see [`normalize_path`].
    pub fn required_role(&self, path: &str) -> Option<RequiredRole> {
        self.rules
            .iter()
            .find(|rule| path.starts_with(rule.path_prefix.as_str()))
            .map(|rule| rule.role)
    }

    fn login_redirect(&self, target: &str) -> Response {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        Redirect::temporary(&format!("{}?redirectTo={}", self.login_path, encoded)).into_response()
    }
}

/// Session token from an `Authorization: Bearer` header or the session
/// cookie, in that order.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

fn json_error(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": error, "message": message })),
    )
        .into_response()
}

/// Middleware enforcing [`AccessRule`]s.
///
/// Client-supplied identity headers are always removed so the upstream can
/// trust them.
pub async fn auth_guard_middleware(
    State(state): State<Arc<GuardState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.headers_mut().remove(USER_ID_HEADER);
    request.headers_mut().remove(USER_ROLE_HEADER);

    let Some(path) = normalize_path(request.uri().path()) else {
        return malformed_path();
    };
    let Some(required) = state.required_role(&path) else {
        return next.run(request).await;
    };
    let api = is_api_path(&path);
    let target = match request.uri().query() {
        Some(query) => format!("{path}?{query}"),
        None => path.clone(),
    };

    let unauthenticated = |reason: &'static str| {
        tracing::info!(path = %path, reason, "Unauthenticated request to guarded route");
        metrics::record_auth_rejection(reason);
        if api {
            json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Sign in required.")
        } else {
            state.login_redirect(&target)
        }
    };

    let Some(token) = session_token(request.headers(), &state.session_cookie) else {
        return unauthenticated("missing_session");
    };

    match state.provider.validate(&token).await {
        Ok(Some(identity)) if identity.role.satisfies(required) => {
            attach_identity(&mut request, identity);
            next.run(request).await
        }
        Ok(Some(identity)) => {
            tracing::warn!(
                path = %path,
                user_id = %identity.user_id,
                role = identity.role.as_str(),
                "Insufficient role for guarded route"
            );
            metrics::record_auth_rejection("forbidden");
            if api {
                json_error(StatusCode::FORBIDDEN, "forbidden", "Insufficient permissions.")
            } else {
                Redirect::temporary(&state.forbidden_redirect).into_response()
            }
        }
        Ok(None) => unauthenticated("invalid_session"),
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Auth provider unavailable");
            metrics::record_auth_rejection("provider_error");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "auth_unavailable",
                "Authentication service unavailable.",
            )
        }
    }
}

fn attach_identity(request: &mut Request<Body>, identity: Identity) {
    let headers = request.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&identity.user_id) {
        headers.insert(USER_ID_HEADER, value);
    }
    headers.insert(
        USER_ROLE_HEADER,
        HeaderValue::from_static(identity.role.as_str()),
    );
    request.extensions_mut().insert(identity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::Role;
    use crate::auth::provider::{AuthError, StaticAuthProvider};
    use async_trait::async_trait;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    struct FailingProvider;

    #[async_trait]
    impl AuthProvider for FailingProvider {
        async fn validate(&self, _token: &str) -> Result<Option<Identity>, AuthError> {
            Err(AuthError::UnexpectedStatus(500))
        }
    }

    fn identity(id: &str, role: Role) -> Identity {
        Identity {
            user_id: id.into(),
            email: None,
            role,
        }
    }

    fn app(provider: Arc<dyn AuthProvider>) -> Router {
        let state = Arc::new(GuardState::new(&AuthConfig::default(), provider));
        let echo = |request: Request<Body>| async move {
            let headers = request.headers();
            format!(
                "{}|{}",
                headers
                    .get(&USER_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-"),
                headers
                    .get(&USER_ROLE_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-"),
            )
        };
        Router::new()
            .route("/", get(echo))
            .route("/admin/orders", get(echo))
            .route("/api/admin/withdrawals", get(echo))
            .route("/dashboard", get(echo))
            .layer(middleware::from_fn_with_state(state, auth_guard_middleware))
    }

    fn provider() -> Arc<dyn AuthProvider> {
        Arc::new(
            StaticAuthProvider::new()
                .with_session("admin-tok", identity("a1", Role::Admin))
                .with_session("user-tok", identity("u1", Role::User)),
        )
    }

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_session_token_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; sb-access-token=abc ; x=1".parse().unwrap());
        assert_eq!(session_token(&headers, "sb-access-token").as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Bearer xyz".parse().unwrap());
        assert_eq!(session_token(&headers, "sb-access-token").as_deref(), Some("xyz"));

        assert_eq!(session_token(&HeaderMap::new(), "sb-access-token"), None);
    }

    #[test]
    fn test_longest_rule_wins() {
        let mut config = AuthConfig::default();
        config.rules.push(AccessRule {
            path_prefix: "/dashboard/public".into(),
            role: RequiredRole::Admin,
        });
        let state = GuardState::new(&config, provider());

        assert_eq!(state.required_role("/dashboard/public/x"), Some(RequiredRole::Admin));
        assert_eq!(state.required_role("/dashboard/stats"), Some(RequiredRole::User));
        assert_eq!(state.required_role("/about"), None);
    }

    #[tokio::test]
    async fn test_unguarded_route_strips_spoofed_identity() {
        let res = app(provider())
            .oneshot(
                Request::get("/")
                    .header("x-user-role", "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "-|-");
    }

    #[tokio::test]
    async fn test_page_without_session_redirects_to_login() {
        let res = app(provider())
            .oneshot(Request::get("/admin/orders?page=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            res.headers()[header::LOCATION],
            "/login?redirectTo=%2Fadmin%2Forders%3Fpage%3D2"
        );
    }

    #[tokio::test]
    async fn test_path_spellings_cannot_skip_the_guard() {
        for path in ["/%61dmin/orders", "//admin/orders", "/public/../admin/orders", "/admin/./orders"] {
            let res = app(provider())
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT, "{path}");
            assert_eq!(res.headers()[header::LOCATION], "/login?redirectTo=%2Fadmin%2Forders");
        }

        let res = app(provider())
            .oneshot(Request::get("/api/%61dmin/withdrawals").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app(provider())
            .oneshot(Request::get("/%2Fadmin/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_without_session_is_401() {
        let res = app(provider())
            .oneshot(
                Request::get("/api/admin/withdrawals")
                    .header(header::COOKIE, "sb-access-token=stale")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_cannot_reach_admin() {
        let res = app(provider())
            .oneshot(
                Request::get("/admin/orders")
                    .header(header::COOKIE, "sb-access-token=user-tok")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(res.headers()[header::LOCATION], "/");

        let res = app(provider())
            .oneshot(
                Request::get("/api/admin/withdrawals")
                    .header(header::AUTHORIZATION, "Bearer user-tok")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_authorized_requests_carry_identity() {
        let res = app(provider())
            .oneshot(
                Request::get("/admin/orders")
                    .header(header::COOKIE, "sb-access-token=admin-tok")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "a1|admin");

        let res = app(provider())
            .oneshot(
                Request::get("/dashboard")
                    .header(header::COOKIE, "sb-access-token=user-tok")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_text(res).await, "u1|user");
    }

    #[tokio::test]
    async fn test_provider_failure_fails_closed() {
        let res = app(Arc::new(FailingProvider))
            .oneshot(
                Request::get("/dashboard")
                    .header(header::COOKIE, "sb-access-token=any")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
