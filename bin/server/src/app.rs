//! Router assembly.

use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState, require_authenticated, require_role};
use crate::pages;

/// Message returned when the admin gate denies a request.
pub const ADMIN_DENIED: &str = "Forbidden: Insufficient Privileges";

/// Message returned when the moderator gate denies a request.
pub const MODERATOR_DENIED: &str = "Forbidden: Moderator Access Required";

/// Builds the gateway router.
///
/// Protected routes sit behind the authentication gate; the role views add
/// a role gate inside it. The role views are only mounted when the tenant
/// enables them.
pub fn router(state: AppState) -> Router {
    let mut protected = Router::new().route("/dashboard", get(pages::dashboard));

    if state.tenant.role_views {
        let admin_gate = state.rbac.gate("admin").with_denial_message(ADMIN_DENIED);
        let moderator_gate = state
            .rbac
            .gate("moderator")
            .with_denial_message(MODERATOR_DENIED);

        protected = protected
            .route(
                "/admin",
                get(pages::admin).route_layer(from_fn_with_state(admin_gate, require_role)),
            )
            .route(
                "/moderator",
                get(pages::moderator)
                    .route_layer(from_fn_with_state(moderator_gate, require_role)),
            );
    }

    let protected =
        protected.route_layer(from_fn_with_state(state.clone(), require_authenticated));

    Router::new()
        .route("/", get(pages::home))
        .route("/login", get(auth::login))
        .route("/callback", get(auth::callback))
        .route("/logout", get(auth::logout))
        .route("/healthz", get(pages::healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityProvider, OidcClient, OidcError, ProviderSlot};
    use crate::config::{SessionConfig, TenantConfig};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode, header};
    use http_body_util::BodyExt;
    use rolegate_access::{
        AuthState, ClaimsStrategy, InMemorySessionStore, RbacPolicy, RelyingPartyConfig,
        RelyingPartySettings, TokenSet,
    };
    use serde_json::{Map, Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIXED_STATE: &str = "fixed-state";
    const COOKIE_NAME: &str = "rolegate_session";

    struct FakeProvider {
        config: RelyingPartyConfig,
        claims: Value,
        access_token: String,
        userinfo_fails: bool,
        supports_end_session: bool,
    }

    impl FakeProvider {
        fn with_roles(roles: &[&str]) -> Self {
            Self {
                config: relying_party(ClaimsStrategy::RolesInUserinfo),
                claims: json!({
                    "sub": "user-1",
                    "name": "Test User",
                    "email": "user@example.com",
                    "realm_access": { "roles": roles },
                }),
                access_token: "access-token".to_string(),
                userinfo_fails: false,
                supports_end_session: true,
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn config(&self) -> &RelyingPartyConfig {
            &self.config
        }

        fn authorization_url(&self) -> (String, AuthState) {
            let url = format!(
                "https://idp.example/authorize?client_id=portal&response_type=code&state={FIXED_STATE}"
            );
            let state = AuthState {
                csrf_token: FIXED_STATE.to_string(),
                pkce_verifier: "verifier".to_string(),
                nonce: "nonce".to_string(),
            };
            (url, state)
        }

        async fn exchange_code(
            &self,
            code: &str,
            _state: &AuthState,
        ) -> Result<TokenSet, OidcError> {
            if code == "BAD" {
                return Err(OidcError::TokenExchange("invalid_grant".to_string()));
            }
            Ok(TokenSet::new(self.access_token.clone())
                .with_id_token(Some("id-token".to_string())))
        }

        async fn fetch_userinfo(
            &self,
            _tokens: &TokenSet,
        ) -> Result<Map<String, Value>, OidcError> {
            if self.userinfo_fails {
                return Err(OidcError::UserInfo("userinfo endpoint returned 401".to_string()));
            }
            match &self.claims {
                Value::Object(map) => Ok(map.clone()),
                _ => Err(OidcError::UserInfo("not an object".to_string())),
            }
        }

        fn end_session_url(&self, id_token: &str) -> Option<String> {
            if !self.supports_end_session {
                return None;
            }
            Some(format!(
                "https://idp.example/logout?id_token_hint={id_token}&client_id=portal"
            ))
        }
    }

    fn relying_party(strategy: ClaimsStrategy) -> RelyingPartyConfig {
        relying_party_for("https://idp.example", strategy)
    }

    fn relying_party_for(issuer: &str, strategy: ClaimsStrategy) -> RelyingPartyConfig {
        RelyingPartySettings {
            issuer_url: Some(issuer.to_string()),
            client_id: Some("portal".to_string()),
            client_secret: Some("portal-secret".to_string()),
            redirect_uri: Some("http://localhost:3000/callback".to_string()),
            claims_strategy: strategy,
            ..Default::default()
        }
        .resolve("http://localhost:3000/")
        .unwrap()
    }

    struct TestApp {
        router: Router,
        store: Arc<InMemorySessionStore>,
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            secret: Some("k".repeat(64)),
            ..SessionConfig::default()
        }
    }

    fn test_app_with(slot: ProviderSlot, tenant: TenantConfig) -> TestApp {
        build_app(
            slot,
            tenant,
            session_config(),
            Arc::new(InMemorySessionStore::new()),
        )
    }

    /// Builds an app over an existing store. Apps sharing a store and a
    /// session secret accept each other's cookies.
    fn build_app(
        slot: ProviderSlot,
        tenant: TenantConfig,
        session_config: SessionConfig,
        store: Arc<InMemorySessionStore>,
    ) -> TestApp {
        let state = AppState::new(
            Arc::new(slot),
            store.clone(),
            session_config,
            tenant,
            RbacPolicy::default(),
        );
        TestApp {
            router: router(state),
            store,
        }
    }

    fn test_app(provider: FakeProvider) -> TestApp {
        test_app_with(
            ProviderSlot::ready(Arc::new(provider)),
            TenantConfig::default(),
        )
    }

    async fn send(app: &TestApp, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        app.router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &Response<Body>) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .expect("location header")
            .to_str()
            .unwrap()
    }

    /// Returns the `name=value` pair of the session cookie set by a response.
    fn set_session_cookie(response: &Response<Body>) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&format!("{COOKIE_NAME}=")))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Starts a login and returns the pre-login session cookie.
    async fn start_login(app: &TestApp) -> String {
        let response = send(app, "/login", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        set_session_cookie(&response).expect("session cookie")
    }

    /// Runs the full login flow and returns the authenticated session cookie.
    async fn sign_in(app: &TestApp) -> String {
        let cookie = start_login(app).await;
        let response = send(
            app,
            &format!("/callback?code=GOOD&state={FIXED_STATE}"),
            Some(&cookie),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/dashboard");
        set_session_cookie(&response).expect("authenticated session cookie")
    }

    #[tokio::test]
    async fn anonymous_root_renders_landing_page() {
        let app = test_app(FakeProvider::with_roles(&[]));

        let response = send(&app, "/", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("href=\"/login\""));
    }

    #[tokio::test]
    async fn authenticated_root_redirects_to_dashboard() {
        let app = test_app(FakeProvider::with_roles(&[]));
        let cookie = sign_in(&app).await;

        let response = send(&app, "/", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/dashboard");
    }

    #[tokio::test]
    async fn protected_routes_redirect_anonymous_users_to_login() {
        let app = test_app(FakeProvider::with_roles(&["admin"]));

        for uri in ["/dashboard", "/admin", "/moderator"] {
            let response = send(&app, uri, None).await;
            assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
            assert_eq!(location(&response), "/login", "{uri}");
        }
    }

    #[tokio::test]
    async fn pending_login_is_not_authenticated() {
        let app = test_app(FakeProvider::with_roles(&["admin"]));
        let cookie = start_login(&app).await;

        let response = send(&app, "/dashboard", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn tampered_cookie_is_treated_as_anonymous() {
        let app = test_app(FakeProvider::with_roles(&["admin"]));
        sign_in(&app).await;

        let response = send(&app, "/dashboard", Some("rolegate_session=forged")).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn dashboard_renders_claims() {
        let app = test_app(FakeProvider::with_roles(&["moderator"]));
        let cookie = sign_in(&app).await;

        let response = send(&app, "/dashboard", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("Test User"));
        assert!(body.contains("user@example.com"));
        assert!(body.contains("moderator"));
    }

    #[tokio::test]
    async fn admin_view_requires_admin_role() {
        let app = test_app(FakeProvider::with_roles(&["moderator"]));
        let cookie = sign_in(&app).await;

        let response = send(&app, "/admin", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, ADMIN_DENIED);
    }

    #[tokio::test]
    async fn admin_view_allows_admin() {
        let app = test_app(FakeProvider::with_roles(&["admin"]));
        let cookie = sign_in(&app).await;

        let response = send(&app, "/admin", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn user_without_roles_is_forbidden_not_redirected() {
        let app = test_app(FakeProvider::with_roles(&[]));
        let cookie = sign_in(&app).await;

        let response = send(&app, "/admin", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::LOCATION).is_none());

        let response = send(&app, "/moderator", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, MODERATOR_DENIED);
    }

    #[tokio::test]
    async fn admin_satisfies_moderator_gate() {
        let app = test_app(FakeProvider::with_roles(&["admin"]));
        let cookie = sign_in(&app).await;

        let response = send(&app, "/moderator", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn moderator_passes_moderator_gate() {
        let app = test_app(FakeProvider::with_roles(&["moderator"]));
        let cookie = sign_in(&app).await;

        let response = send(&app, "/moderator", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_rotates_session_id() {
        let app = test_app(FakeProvider::with_roles(&[]));
        let pre_login = start_login(&app).await;
        assert_eq!(app.store.len().await, 1);

        let response = send(
            &app,
            &format!("/callback?code=GOOD&state={FIXED_STATE}"),
            Some(&pre_login),
        )
        .await;
        let authenticated = set_session_cookie(&response).unwrap();

        assert_ne!(pre_login, authenticated);
        assert_eq!(app.store.len().await, 1);

        let response = send(&app, "/dashboard", Some(&pre_login)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn rejected_code_fails_without_authenticating() {
        let app = test_app(FakeProvider::with_roles(&["admin"]));
        let cookie = start_login(&app).await;

        let response = send(
            &app,
            &format!("/callback?code=BAD&state={FIXED_STATE}"),
            Some(&cookie),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(set_session_cookie(&response).is_none());
        assert_eq!(body_text(response).await, "Authentication failed");

        let response = send(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn userinfo_failure_leaves_session_unauthenticated() {
        let mut provider = FakeProvider::with_roles(&["admin"]);
        provider.userinfo_fails = true;
        let app = test_app(provider);
        let cookie = start_login(&app).await;

        let response = send(
            &app,
            &format!("/callback?code=GOOD&state={FIXED_STATE}"),
            Some(&cookie),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = send(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn malformed_access_token_fails_login() {
        let mut provider = FakeProvider::with_roles(&["admin"]);
        provider.config = relying_party(ClaimsStrategy::RolesInAccessToken);
        provider.access_token = "not-a-jwt".to_string();
        let app = test_app(provider);
        let cookie = start_login(&app).await;

        let response = send(
            &app,
            &format!("/callback?code=GOOD&state={FIXED_STATE}"),
            Some(&cookie),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Authentication failed");
    }

    #[tokio::test]
    async fn mismatched_state_fails() {
        let app = test_app(FakeProvider::with_roles(&[]));
        let cookie = start_login(&app).await;

        let response = send(&app, "/callback?code=GOOD&state=other", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn pending_state_is_single_use() {
        let app = test_app(FakeProvider::with_roles(&[]));
        let cookie = start_login(&app).await;

        let response = send(&app, "/callback?code=BAD&state=fixed-state", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = send(&app, "/callback?code=GOOD&state=fixed-state", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn provider_error_on_callback_fails() {
        let app = test_app(FakeProvider::with_roles(&[]));
        let cookie = start_login(&app).await;

        let response = send(
            &app,
            "/callback?error=access_denied&state=fixed-state",
            Some(&cookie),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn callback_without_session_fails() {
        let app = test_app(FakeProvider::with_roles(&[]));

        let response = send(&app, "/callback?code=GOOD&state=fixed-state", None).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn logout_destroys_session_and_redirects_to_provider() {
        let app = test_app(FakeProvider::with_roles(&["admin"]));
        let cookie = sign_in(&app).await;

        let response = send(&app, "/logout", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).starts_with("https://idp.example/logout?id_token_hint=id-token"));
        assert!(app.store.is_empty().await);

        let response = send(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");

        let response = send(&app, "/admin", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn logout_without_end_session_endpoint_still_logs_out_locally() {
        let mut provider = FakeProvider::with_roles(&["admin"]);
        provider.supports_end_session = false;
        let app = test_app(provider);
        let cookie = sign_in(&app).await;

        let response = send(&app, "/logout", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
        assert!(app.store.is_empty().await);

        let response = send(&app, "/admin", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn logout_with_unavailable_provider_still_logs_out_locally() {
        let signed_in = test_app(FakeProvider::with_roles(&["admin"]));
        let cookie = sign_in(&signed_in).await;

        // Same sessions, but the provider never finished discovery.
        let app = build_app(
            ProviderSlot::pending(),
            TenantConfig::default(),
            session_config(),
            signed_in.store.clone(),
        );
        let response = send(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "/logout", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
        assert!(app.store.is_empty().await);

        let response = send(&app, "/admin", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn oversized_session_duration_does_not_break_login() {
        let provider = FakeProvider::with_roles(&["admin"]);
        let app = build_app(
            ProviderSlot::ready(Arc::new(provider)),
            TenantConfig::default(),
            SessionConfig {
                duration_minutes: 10_000_000_000_000,
                ..session_config()
            },
            Arc::new(InMemorySessionStore::new()),
        );

        let cookie = sign_in(&app).await;

        let response = send(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_without_session_redirects_home() {
        let app = test_app(FakeProvider::with_roles(&[]));

        let response = send(&app, "/logout", None).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn login_reports_pending_provider() {
        let app = test_app_with(ProviderSlot::pending(), TenantConfig::default());

        let response = send(&app, "/login", None).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Identity Provider unavailable");

        let response = send(&app, "/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_reports_provider_status() {
        let app = test_app_with(ProviderSlot::pending(), TenantConfig::default());

        let response = send(&app, "/healthz", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.starts_with("ok"));
        assert!(body.contains("provider: pending"));
    }

    #[tokio::test]
    async fn role_views_can_be_disabled() {
        let tenant = TenantConfig {
            name: "sso-demo".to_string(),
            role_views: false,
        };
        let provider = FakeProvider::with_roles(&["admin"]);
        let app = test_app_with(ProviderSlot::ready(Arc::new(provider)), tenant);
        let cookie = sign_in(&app).await;

        let response = send(&app, "/admin", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("sso-demo"));
        assert!(!body.contains("href=\"/admin\""));
    }

    #[tokio::test]
    async fn login_redirects_to_discovered_authorization_endpoint() {
        let mock_server = MockServer::start().await;
        let issuer = mock_server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/protocol/openid-connect/auth"),
                "token_endpoint": format!("{issuer}/protocol/openid-connect/token"),
                "userinfo_endpoint": format!("{issuer}/protocol/openid-connect/userinfo"),
                "jwks_uri": format!("{issuer}/protocol/openid-connect/certs"),
                "response_types_supported": ["code"],
                "subject_types_supported": ["public"],
                "id_token_signing_alg_values_supported": ["RS256"]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/protocol/openid-connect/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })))
            .mount(&mock_server)
            .await;

        let client = OidcClient::discover(
            relying_party_for(&issuer, ClaimsStrategy::RolesInUserinfo),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let app = test_app_with(
            ProviderSlot::ready(Arc::new(client)),
            TenantConfig::default(),
        );

        let response = send(&app, "/login", None).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let target = reqwest::Url::parse(location(&response)).unwrap();
        assert!(
            target
                .as_str()
                .starts_with(&format!("{issuer}/protocol/openid-connect/auth"))
        );
        let query = |key: &str| {
            target
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        assert_eq!(query("client_id").as_deref(), Some("portal"));
        assert_eq!(query("response_type").as_deref(), Some("code"));
        assert_eq!(query("scope").as_deref(), Some("openid profile email"));
        assert_eq!(query("code_challenge_method").as_deref(), Some("S256"));

        let stored = app.store.len().await;
        assert_eq!(stored, 1);
        let cookie = set_session_cookie(&response).unwrap();
        assert!(cookie.starts_with("rolegate_session="));

        // The session only holds the pending login.
        let response = send(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(location(&response), "/login");
    }
}
