use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use risknexus_api::app::services::AppServices;
use risknexus_auth::JwtClaims;
use risknexus_core::{RoleId, TenantId, UserId};
use risknexus_infra::config::AppConfig;
use risknexus_infra::roles::{InMemoryRoleRepository, NewRole, RoleRepository};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig::from_lookup(|var| match var {
            "JWT_SECRET" => Some(JWT_SECRET.to_string()),
            "CACHE_SWEEP_INTERVAL_SECS" => Some("0".to_string()),
            _ => None,
        })
        .expect("test config");

        let services = Arc::new(AppServices::new(Arc::new(InMemoryRoleRepository::new()), &config));
        let app = risknexus_api::app::build_app_with_services(&config, Arc::clone(&services));

        // Same router as prod, bound to an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    /// Seed a role directly through the cached store.
    async fn seed_role(&self, tenant_id: TenantId, name: &str, permissions: &[&str]) -> RoleId {
        self.services
            .roles
            .create(
                tenant_id,
                NewRole {
                    name: name.to_string(),
                    description: None,
                    permissions: permissions.iter().map(|p| p.to_string()).collect(),
                },
            )
            .await
            .expect("seed role")
            .id
    }

    /// A fresh user holding `roles` in `tenant_id`, and a token for them.
    async fn sign_in(&self, tenant_id: TenantId, roles: &[RoleId]) -> (UserId, String) {
        let user_id = UserId::new();
        for role in roles {
            self.services
                .roles
                .assign_to_user(tenant_id, user_id, *role)
                .await
                .expect("assign role");
        }
        (user_id, mint_jwt(tenant_id, user_id))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, user_id: UserId) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user_id,
        tenant_id,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let res = client
        .get(srv.url("/roles"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reports_assigned_roles_and_permissions() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let role = srv.seed_role(tenant_id, "Viewer", &["asset.view", "risk.view"]).await;
    let (_, token) = srv.sign_in(tenant_id, &[role]).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert_eq!(body["roles"][0].as_str().unwrap(), role.to_string());
    assert_eq!(body["permissions"], json!(["asset.view", "risk.view"]));
}

#[tokio::test]
async fn grant_takes_effect_on_the_next_request() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = srv.seed_role(tenant_id, "Administrator", &["*"]).await;
    let analyst = srv.seed_role(tenant_id, "Analyst", &["risk.view"]).await;
    let (_, admin_token) = srv.sign_in(tenant_id, &[admin]).await;
    let (_, analyst_token) = srv.sign_in(tenant_id, &[analyst]).await;
    let client = reqwest::Client::new();

    // Denied, and the analyst's permission set is now cached.
    let res = client
        .get(srv.url("/roles"))
        .bearer_auth(&analyst_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = client
        .post(srv.url(&format!("/roles/{analyst}/permissions/roles.view")))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/roles"))
        .bearer_auth(&analyst_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["roles"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn revoke_denies_on_the_next_request() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = srv.seed_role(tenant_id, "Administrator", &["*"]).await;
    let auditor = srv.seed_role(tenant_id, "Auditor", &["roles.view"]).await;
    let (_, admin_token) = srv.sign_in(tenant_id, &[admin]).await;
    let (_, auditor_token) = srv.sign_in(tenant_id, &[auditor]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/permissions"))
        .bearer_auth(&auditor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url(&format!("/roles/{auditor}/permissions/roles.view")))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/permissions"))
        .bearer_auth(&auditor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn role_lifecycle_and_admin_rules() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = srv.seed_role(tenant_id, "Administrator", &["*"]).await;
    let (_, token) = srv.sign_in(tenant_id, &[admin]).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/roles"))
        .bearer_auth(&token)
        .json(&json!({ "name": "  Risk Owner ", "permissions": ["risk.view", "risk.edit"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["name"], "Risk Owner");
    let id = created["id"].as_str().unwrap().to_string();

    // Duplicate name.
    let res = client
        .post(srv.url("/roles"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Risk Owner" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Unknown permission code.
    let res = client
        .put(srv.url(&format!("/roles/{id}/permissions")))
        .bearer_auth(&token)
        .json(&json!({ "permissions": ["risk.teleport"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Assigned roles cannot be deleted.
    let user = UserId::new();
    let res = client
        .post(srv.url(&format!("/users/{user}/roles/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(srv.url(&format!("/roles/{id}/users")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["user_ids"], json!([user.to_string()]));

    let res = client
        .delete(srv.url(&format!("/roles/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "role_in_use");

    let res = client
        .delete(srv.url(&format!("/users/{user}/roles/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .delete(srv.url(&format!("/roles/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(srv.url(&format!("/roles/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn roles_do_not_leak_across_tenants() {
    let srv = TestServer::spawn().await;
    let (tenant_a, tenant_b) = (TenantId::new(), TenantId::new());
    let admin_a = srv.seed_role(tenant_a, "Administrator", &["*"]).await;
    let admin_b = srv.seed_role(tenant_b, "Administrator", &["*"]).await;
    let client = reqwest::Client::new();

    // An assignment in tenant A grants nothing to a token for tenant B.
    let (admin_a_user, _) = srv.sign_in(tenant_a, &[admin_a]).await;
    let forged = mint_jwt(tenant_b, admin_a_user);
    let res = client
        .get(srv.url("/roles"))
        .bearer_auth(&forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (_, token_b) = srv.sign_in(tenant_b, &[admin_b]).await;
    let res = client
        .get(srv.url(&format!("/roles/{admin_a}")))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Acting in another tenant than the token's is rejected.
    let res = client
        .get(srv.url("/roles"))
        .bearer_auth(&token_b)
        .header("X-Tenant-Id", tenant_a.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "tenant_mismatch");
}

#[tokio::test]
async fn explain_reports_missing_permission() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let role = srv.seed_role(tenant_id, "Clerk", &["document.read"]).await;
    let (_, token) = srv.sign_in(tenant_id, &[role]).await;

    let res = reqwest::Client::new()
        .get(srv.url("/authz/explain?permission=document.delete"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["granted"], false);
    assert_eq!(body["denial_reason"]["kind"], "missing_permission");
    assert_eq!(body["principal"]["effective_permissions"], json!(["document.read"]));
}

#[tokio::test]
async fn unassigning_a_role_denies_on_the_next_request() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = srv.seed_role(tenant_id, "Administrator", &["*"]).await;
    let auditor = srv.seed_role(tenant_id, "Auditor", &["roles.view"]).await;
    let (_, admin_token) = srv.sign_in(tenant_id, &[admin]).await;
    let (auditor_user, auditor_token) = srv.sign_in(tenant_id, &[auditor]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/roles"))
        .bearer_auth(&auditor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url(&format!("/users/{auditor_user}/roles/{auditor}")))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Same token, no assignment left.
    let res = client
        .get(srv.url("/roles"))
        .bearer_auth(&auditor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn token_without_assignments_grants_nothing() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    srv.seed_role(tenant_id, "Administrator", &["*"]).await;
    let token = mint_jwt(tenant_id, UserId::new());
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/roles"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["roles"], json!([]));
    assert_eq!(body["permissions"], json!([]));
}
