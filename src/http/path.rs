//! Request path canonicalization.
//!
//! The guard, the rate limiter and the upstream must agree on which route
//! a request targets. Clients can spell one route many ways
//! (`/%61dmin`, `//admin`, `/x/../admin`), so every path is reduced to a
//! single form before anything matches on it.

use std::str::FromStr;

use axum::{
    body::Body,
    http::{uri::PathAndQuery, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

/// Canonical form of `raw`, or `None` when it cannot be made canonical.
///
/// - percent-escapes of unreserved characters are decoded, other escapes
///   are kept with uppercase hex
/// - repeated `/` collapse to one
/// - `.` and `..` segments are resolved, never climbing above the root
/// - a trailing `/` is kept
///
/// Malformed escapes and encoded `/`, `\` or NUL are refused: they would
/// let the upstream see a different path than the gateway matched on.
pub fn normalize_path(raw: &str) -> Option<String> {
    let decoded = decode_unreserved(raw)?;
    if decoded.contains('\\') {
        return None;
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut path = String::with_capacity(decoded.len() + 1);
    for segment in &segments {
        path.push('/');
        path.push_str(segment);
    }
    let trailing = decoded.ends_with('/') || decoded.ends_with("/.") || decoded.ends_with("/..");
    if path.is_empty() || trailing {
        path.push('/');
    }
    Some(path)
}

fn decode_unreserved(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(char::from(bytes[i]));
            i += 1;
            continue;
        }

        let hi = hex_value(*bytes.get(i + 1)?)?;
        let lo = hex_value(*bytes.get(i + 2)?)?;
        let byte = (hi << 4) | lo;
        match byte {
            b'/' | b'\\' | 0 => return None,
            b if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') => {
                out.push(char::from(b))
            }
            b => {
                out.push('%');
                out.push_str(&format!("{b:02X}"));
            }
        }
        i += 3;
    }
    Some(out)
}

fn hex_value(b: u8) -> Option<u8> {
    char::from(b).to_digit(16).map(|d| d as u8)
}

/// Rewrite the request URI to its canonical path before any other layer
/// looks at it. Paths that cannot be canonicalized get a 400.
pub async fn normalize_path_middleware(mut request: Request<Body>, next: Next) -> Response {
    let raw = request.uri().path();
    let Some(path) = normalize_path(raw) else {
        tracing::warn!(path = %raw, "Rejected malformed request path");
        return malformed_path();
    };

    if path != raw {
        match canonical_uri(request.uri(), &path) {
            Some(uri) => *request.uri_mut() = uri,
            None => return malformed_path(),
        }
    }
    next.run(request).await
}

fn canonical_uri(uri: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => PathAndQuery::from_str(&format!("{path}?{query}")),
        None => PathAndQuery::from_str(path),
    }
    .ok()?;

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).ok()
}

/// 400 for a request path that has no canonical form.
pub fn malformed_path() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": "bad_request",
            "message": "Malformed request path.",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    #[test]
    fn test_canonical_paths_are_unchanged() {
        for path in ["/", "/admin", "/admin/orders", "/api/auth/login", "/admin/", "/a%20b"] {
            assert_eq!(normalize_path(path).as_deref(), Some(path));
        }
    }

    #[test]
    fn test_encoded_unreserved_characters_are_decoded() {
        assert_eq!(normalize_path("/%61dmin/orders").as_deref(), Some("/admin/orders"));
        assert_eq!(normalize_path("/api/auth/logi%6E").as_deref(), Some("/api/auth/login"));
        assert_eq!(normalize_path("/%7Euser").as_deref(), Some("/~user"));
        // Reserved characters stay encoded, with uppercase hex
        assert_eq!(normalize_path("/search%3fq").as_deref(), Some("/search%3Fq"));
    }

    #[test]
    fn test_slashes_and_dot_segments_collapse() {
        assert_eq!(normalize_path("//admin//orders").as_deref(), Some("/admin/orders"));
        assert_eq!(normalize_path("/api/./auth/login").as_deref(), Some("/api/auth/login"));
        assert_eq!(normalize_path("/public/../admin").as_deref(), Some("/admin"));
        assert_eq!(normalize_path("/%2e%2e/%2E%2E/admin").as_deref(), Some("/admin"));
        assert_eq!(normalize_path("/admin/.").as_deref(), Some("/admin/"));
        assert_eq!(normalize_path("").as_deref(), Some("/"));
    }

    #[test]
    fn test_unsafe_paths_are_refused() {
        assert_eq!(normalize_path("/%2Fadmin"), None);
        assert_eq!(normalize_path("/x%5c..%5cadmin"), None);
        assert_eq!(normalize_path("/admin%00"), None);
        assert_eq!(normalize_path("/bad%zz"), None);
        assert_eq!(normalize_path("/truncated%4"), None);
    }

    #[tokio::test]
    async fn test_middleware_rewrites_uri_and_keeps_query() {
        let app = Router::new()
            .fallback(|request: Request<Body>| async move { request.uri().to_string() })
            .layer(middleware::from_fn(normalize_path_middleware));

        let res = app
            .clone()
            .oneshot(Request::get("//%61dmin/./orders?page=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"/admin/orders?page=2");

        let res = app
            .oneshot(Request::get("/%2Fadmin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
