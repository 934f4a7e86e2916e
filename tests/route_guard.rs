//! Route guard tests against a mock hosted auth service.

use referral_gateway::config::GatewayConfig;

mod common;

async fn guarded_gateway() -> (std::net::SocketAddr, referral_gateway::Shutdown) {
    let upstream = common::start_mock_upstream().await;
    let auth = common::start_mock_auth().await;

    let mut config = GatewayConfig::default();
    config.upstream.address = upstream.to_string();
    config.auth.enabled = true;
    config.auth.provider_url = format!("http://{auth}");
    config.auth.api_key = "anon-key".into();
    common::start_gateway(config).await
}

#[tokio::test]
async fn test_anonymous_admin_page_redirects_to_login() {
    let (addr, shutdown) = guarded_gateway().await;

    let res = common::client()
        .get(format!("http://{addr}/admin/withdrawals"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 307);
    assert_eq!(
        res.headers()["location"],
        "/login?redirectTo=%2Fadmin%2Fwithdrawals"
    );
    assert_eq!(res.headers()["x-frame-options"], "DENY");

    shutdown.trigger();
}

#[tokio::test]
async fn test_encoded_admin_path_is_guarded() {
    let (addr, shutdown) = guarded_gateway().await;
    let client = common::client();

    for path in ["/%61dmin/orders", "//admin/orders"] {
        let res = client
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 307, "{path}");
        assert_eq!(res.headers()["location"], "/login?redirectTo=%2Fadmin%2Forders");
    }

    // With a session the upstream sees the same path the guard matched on.
    let res = client
        .get(format!("http://{addr}/%61dmin/orders"))
        .header("cookie", "sb-access-token=admin-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "GET /admin/orders HTTP/1.1|admin");

    shutdown.trigger();
}

#[tokio::test]
async fn test_admin_session_reaches_upstream_with_role() {
    let (addr, shutdown) = guarded_gateway().await;

    let res = common::client()
        .get(format!("http://{addr}/admin/orders"))
        .header("cookie", "sb-access-token=admin-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "GET /admin/orders HTTP/1.1|admin");

    shutdown.trigger();
}

#[tokio::test]
async fn test_user_session_is_forbidden_from_admin_api() {
    let (addr, shutdown) = guarded_gateway().await;
    let client = common::client();

    let res = client
        .get(format!("http://{addr}/api/admin/codes"))
        .bearer_auth("user-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let res = client
        .get(format!("http://{addr}/dashboard"))
        .bearer_auth("user-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "GET /dashboard HTTP/1.1|user");

    shutdown.trigger();
}

#[tokio::test]
async fn test_spoofed_role_header_is_dropped() {
    let (addr, shutdown) = guarded_gateway().await;

    let res = common::client()
        .get(format!("http://{addr}/notices"))
        .header("x-user-role", "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "GET /notices HTTP/1.1|-");

    shutdown.trigger();
}
