//! OIDC client implementation using the openidconnect crate.

use async_trait::async_trait;
use chrono::Utc;
use openidconnect::core::{CoreAuthenticationFlow, CoreClient};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeVerifier, ProviderMetadataWithLogout, RedirectUrl,
    RequestTokenError, Scope, TokenResponse,
};
use rolegate_access::{AuthState, RelyingPartyConfig, TokenSet};
use serde_json::{Map, Value};
use std::time::Duration;

use super::provider::IdentityProvider;

/// OIDC client for authenticating users.
pub struct OidcClient {
    provider_metadata: ProviderMetadataWithLogout,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: reqwest::Client,
    config: RelyingPartyConfig,
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata.
    ///
    /// `timeout` bounds every request this client makes, discovery included.
    pub async fn discover(config: RelyingPartyConfig, timeout: Duration) -> Result<Self, OidcError> {
        let issuer_url = IssuerUrl::new(config.issuer_url().to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid issuer URL: {}", e)))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid redirect URI: {}", e)))?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| {
                OidcError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        let provider_metadata =
            ProviderMetadataWithLogout::discover_async(issuer_url, &http_client)
                .await
                .map_err(|e| OidcError::Discovery(format!("failed to discover provider: {}", e)))?;

        let client_id = ClientId::new(config.client_id().to_string());
        let client_secret = ClientSecret::new(config.client_secret().to_string());

        Ok(Self {
            provider_metadata,
            client_id,
            client_secret,
            redirect_url,
            http_client,
            config,
        })
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn config(&self) -> &RelyingPartyConfig {
        &self.config
    }

    fn authorization_url(&self) -> (String, AuthState) {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        // openid is always sent by the library
        for scope in self.config.scopes().iter().filter(|s| *s != "openid") {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: nonce.secret().clone(),
        };

        (auth_url.to_string(), state)
    }

    async fn exchange_code(&self, code: &str, state: &AuthState) -> Result<TokenSet, OidcError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let pkce_verifier = PkceCodeVerifier::new(state.pkce_verifier.clone());

        let token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| OidcError::Configuration(format!("token endpoint error: {}", e)))?;

        let token_response = token_request
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    OidcError::TokenExchange(format!("provider rejected the code: {}", response))
                }
                RequestTokenError::Request(e) => {
                    OidcError::Transport(format!("token request failed: {}", e))
                }
                other => OidcError::TokenExchange(format!("token exchange failed: {}", other)),
            })?;

        // Verify the ID token when the provider issues one
        let id_token = match token_response.id_token() {
            Some(id_token) => {
                let nonce = Nonce::new(state.nonce.clone());
                id_token
                    .claims(&client.id_token_verifier(), &nonce)
                    .map_err(|e| {
                        OidcError::TokenValidation(format!("ID token validation failed: {}", e))
                    })?;
                Some(id_token.to_string())
            }
            None => None,
        };

        let token_type = serde_json::to_value(token_response.token_type())
            .ok()
            .and_then(|v| v.as_str().map(str::to_string));

        let expires_at = token_response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);

        Ok(TokenSet::new(token_response.access_token().secret().clone())
            .with_id_token(id_token)
            .with_token_type(token_type)
            .with_expires_at(expires_at))
    }

    async fn fetch_userinfo(&self, tokens: &TokenSet) -> Result<Map<String, Value>, OidcError> {
        let endpoint = self.provider_metadata.userinfo_endpoint().ok_or_else(|| {
            OidcError::Configuration("provider does not advertise a userinfo endpoint".to_string())
        })?;

        let response = self
            .http_client
            .get(endpoint.url().clone())
            .bearer_auth(tokens.access_token())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OidcError::Transport(format!("userinfo request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OidcError::UserInfo(format!(
                "userinfo endpoint returned {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| OidcError::UserInfo(format!("invalid userinfo response: {}", e)))?;

        match body {
            Value::Object(claims) => Ok(claims),
            _ => Err(OidcError::UserInfo(
                "userinfo response is not a JSON object".to_string(),
            )),
        }
    }

    fn end_session_url(&self, id_token: &str) -> Option<String> {
        let endpoint = self
            .provider_metadata
            .additional_metadata()
            .end_session_endpoint
            .as_ref()?;

        let mut url = endpoint.url().clone();
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token)
            .append_pair(
                "post_logout_redirect_uri",
                self.config.post_logout_redirect_uri(),
            )
            .append_pair("client_id", self.config.client_id());

        Some(url.to_string())
    }
}

/// OIDC-related errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcError {
    /// Configuration error (invalid URLs, missing endpoints, etc.)
    Configuration(String),
    /// Failed to discover provider metadata.
    Discovery(String),
    /// The provider could not be reached or timed out.
    Transport(String),
    /// The provider rejected the token request or answered unexpectedly.
    TokenExchange(String),
    /// Token validation failed.
    TokenValidation(String),
    /// The user-info endpoint returned an error or an unexpected body.
    UserInfo(String),
}

impl OidcError {
    /// Short category label used in logs.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Discovery(_) => "discovery",
            Self::Transport(_) => "transport",
            Self::TokenExchange(_) => "token_exchange",
            Self::TokenValidation(_) => "token_validation",
            Self::UserInfo(_) => "userinfo",
        }
    }
}

impl std::fmt::Display for OidcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "OIDC configuration error: {}", msg),
            Self::Discovery(msg) => write!(f, "OIDC discovery error: {}", msg),
            Self::Transport(msg) => write!(f, "OIDC transport error: {}", msg),
            Self::TokenExchange(msg) => write!(f, "OIDC token exchange error: {}", msg),
            Self::TokenValidation(msg) => write!(f, "OIDC token validation error: {}", msg),
            Self::UserInfo(msg) => write!(f, "OIDC userinfo error: {}", msg),
        }
    }
}

impl std::error::Error for OidcError {}
