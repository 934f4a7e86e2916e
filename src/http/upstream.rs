//! Forwarding to the web application.
//!
//! # Responsibilities
//! - Rewrite the request URI to the upstream authority
//! - Strip hop-by-hop headers in both directions
//! - Append the client address to X-Forwarded-For
//! - Map transport failures to 502 Bad Gateway
//!
//! # Design Decisions
//! - Bodies are streamed, never buffered
//! - No retries: the application behind the gateway is not idempotent

use std::net::SocketAddr;
use std::str::FromStr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        header,
        uri::{Authority, InvalidUri, PathAndQuery, Scheme},
        HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::request::request_id;

const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// HTTP client bound to the upstream application.
#[derive(Clone)]
pub struct Upstream {
    client: Client<HttpConnector, Body>,
    authority: Authority,
}

impl Upstream {
    pub fn new(address: &str) -> Result<Self, InvalidUri> {
        let authority = Authority::from_str(address)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self { client, authority })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Forward `request` and stream the upstream response back.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let request_id = request_id(request.headers()).to_owned();
        let client_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        let (mut parts, body) = request.into_parts();

        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(self.authority.clone());
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        parts.uri = match Uri::from_parts(uri_parts) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
                return bad_gateway();
            }
        };

        strip_hop_by_hop(&mut parts.headers);
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut parts.headers, &ip);
        }

        tracing::debug!(
            request_id = %request_id,
            method = %parts.method,
            uri = %parts.uri,
            "Forwarding request"
        );

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Upstream error");
                bad_gateway()
            }
        }
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", value);
    }
}

fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({
            "error": "bad_gateway",
            "message": "Upstream request failed.",
        })),
    )
        .into_response()
}
