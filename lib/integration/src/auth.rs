//! Credential strategies.
//!
//! An [`Authenticator`] knows how to obtain a fresh [`VendorCredential`]
//! from a vendor. The token lifecycle decides *when* to call it; the
//! authenticator only decides *how*:
//!
//! - [`StaticKeyAuth`]: a long-lived API key or private-app token
//! - [`ClientCredentialsAuth`]: OAuth2 client credentials, re-exchanged from
//!   scratch whenever the token runs out
//! - [`RefreshTokenAuth`]: OAuth2 with a refreshable token pair, seeded by
//!   an initial grant on first use
//!
//! The initial grant is the credential an integration is installed with.
//! On first use it is exchanged at the token endpoint for an access and
//! refresh token pair; from then on only the refresh token is used. Vendors
//! hand this out either as a one-time authorization code from the consent
//! flow ([`InitialGrant::AuthorizationCode`]) or as a long-lived refresh
//! token issued at install time ([`InitialGrant::RefreshToken`]). A vendor
//! that issues a bare access token has nothing to refresh it with, so such
//! a token is configured through [`StaticKeyAuth`] instead.

use crate::credential::VendorCredential;
use crate::error::{AdapterResult, StandardError};
use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::{
    AuthType, AuthorizationCode, ClientId, ClientSecret, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// Lifetime assumed for a static key.
const STATIC_KEY_LIFETIME_SECONDS: u64 = u32::MAX as u64;

/// Lifetime assumed when a token response carries no `expires_in`.
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3600;

/// How credentials are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Static bearer key.
    StaticKey,
    /// OAuth2 client credentials.
    ClientCredentials,
    /// OAuth2 refresh token.
    RefreshToken,
}

/// Obtains credentials from a vendor.
#[async_trait]
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Which strategy this is.
    fn strategy(&self) -> AuthStrategy;

    /// Whether obtained credentials may be written to a credential store.
    fn persistent(&self) -> bool {
        true
    }

    /// Obtains a fresh credential. `previous` is the last credential held,
    /// which refreshable strategies use for their refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor's token endpoint cannot be reached or
    /// rejects the request.
    async fn obtain(&self, previous: Option<&VendorCredential>) -> AdapterResult<VendorCredential>;
}

/// A fixed API key sent as a bearer token.
#[derive(Clone)]
pub struct StaticKeyAuth {
    key: String,
}

impl StaticKeyAuth {
    /// Creates the strategy.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl fmt::Debug for StaticKeyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeyAuth").finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for StaticKeyAuth {
    fn strategy(&self) -> AuthStrategy {
        AuthStrategy::StaticKey
    }

    fn persistent(&self) -> bool {
        false
    }

    async fn obtain(&self, _previous: Option<&VendorCredential>) -> AdapterResult<VendorCredential> {
        Ok(VendorCredential::issued_now(
            self.key.clone(),
            None,
            STATIC_KEY_LIFETIME_SECONDS,
        ))
    }
}

/// Where the client id and secret go in token requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// Form body fields `client_id` and `client_secret`.
    #[default]
    RequestBody,
    /// HTTP basic authentication.
    BasicAuth,
}

impl From<ClientAuthMethod> for AuthType {
    fn from(method: ClientAuthMethod) -> Self {
        match method {
            ClientAuthMethod::RequestBody => Self::RequestBody,
            ClientAuthMethod::BasicAuth => Self::BasicAuth,
        }
    }
}

/// OAuth2 client registration shared by both OAuth2 strategies.
#[derive(Clone)]
pub struct OAuthClientConfig {
    client_id: String,
    client_secret: String,
    token_url: TokenUrl,
    auth_method: ClientAuthMethod,
    scopes: Vec<String>,
    default_ttl_seconds: u64,
}

impl OAuthClientConfig {
    /// Creates a client registration.
    ///
    /// # Errors
    ///
    /// Returns a config error if `token_url` is not a valid URL.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
    ) -> AdapterResult<Self> {
        let token_url = token_url.into();
        let token_url = TokenUrl::new(token_url.clone())
            .map_err(|e| StandardError::config(format!("invalid token URL '{token_url}': {e}")))?;
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url,
            auth_method: ClientAuthMethod::default(),
            scopes: Vec::new(),
            default_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        })
    }

    /// Sets where client credentials go.
    #[must_use]
    pub fn with_auth_method(mut self, auth_method: ClientAuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    /// Adds requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Sets the lifetime assumed when the vendor does not report one.
    #[must_use]
    pub fn with_default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl_seconds = seconds;
        self
    }

    /// The token endpoint.
    #[must_use]
    pub fn token_url(&self) -> &str {
        self.token_url.as_str()
    }

    fn client(
        &self,
    ) -> BasicClient<
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointSet,
    > {
        BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_token_uri(self.token_url.clone())
            .set_auth_type(self.auth_method.into())
    }

    fn credential_from<T: TokenResponse>(
        &self,
        token: &T,
        previous_refresh: Option<&str>,
    ) -> VendorCredential {
        let refresh_token = token
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| previous_refresh.map(str::to_string));
        let expires_in = token
            .expires_in()
            .map_or(self.default_ttl_seconds, |d| d.as_secs());
        VendorCredential::issued_now(token.access_token().secret().clone(), refresh_token, expires_in)
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url.as_str())
            .field("auth_method", &self.auth_method)
            .finish_non_exhaustive()
    }
}

fn http_client() -> AdapterResult<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| StandardError::config(format!("HTTP client error: {e}")))
}

/// Classifies a failed token request. The OAuth2 error code stands in for
/// the HTTP status the client library does not expose: `invalid_client` and
/// `unauthorized_client` mean the registration itself was rejected (401), any
/// other code is a bad request (400).
fn classify_token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> StandardError
where
    RE: std::error::Error + 'static,
{
    match &err {
        RequestTokenError::ServerResponse(response) => {
            let status = match response.error() {
                BasicErrorResponseType::InvalidClient
                | BasicErrorResponseType::UnauthorizedClient => 401,
                _ => 400,
            };
            let error = StandardError::http(
                status,
                format!("token endpoint rejected the request: {err}"),
            );
            match serde_json::to_value(response) {
                Ok(details) => error.with_details(details),
                Err(_) => error,
            }
        }
        RequestTokenError::Request(_) => {
            StandardError::network(format!("token request failed: {err}"))
        }
        _ => StandardError::new(
            crate::error::ErrorKind::Http,
            format!("unreadable token response: {err}"),
        ),
    }
}

/// OAuth2 client-credentials grant.
#[derive(Debug, Clone)]
pub struct ClientCredentialsAuth {
    config: OAuthClientConfig,
    http: reqwest::Client,
}

impl ClientCredentialsAuth {
    /// Creates the strategy.
    ///
    /// # Errors
    ///
    /// Returns a config error if the HTTP client cannot be built.
    pub fn new(config: OAuthClientConfig) -> AdapterResult<Self> {
        Ok(Self {
            config,
            http: http_client()?,
        })
    }
}

#[async_trait]
impl Authenticator for ClientCredentialsAuth {
    fn strategy(&self) -> AuthStrategy {
        AuthStrategy::ClientCredentials
    }

    #[instrument(skip_all, fields(token_url = %self.config.token_url()))]
    async fn obtain(&self, _previous: Option<&VendorCredential>) -> AdapterResult<VendorCredential> {
        let client = self.config.client();
        let mut request = client.exchange_client_credentials();
        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let token = request
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;

        debug!("client credentials exchanged");
        Ok(self.config.credential_from(&token, None))
    }
}

/// The grant that seeds a refreshable token pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InitialGrant {
    /// One-time authorization code from the vendor's consent flow.
    AuthorizationCode(String),
    /// A refresh token issued out of band.
    RefreshToken(String),
}

impl fmt::Debug for InitialGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthorizationCode(_) => f.write_str("AuthorizationCode(..)"),
            Self::RefreshToken(_) => f.write_str("RefreshToken(..)"),
        }
    }
}

/// OAuth2 refresh-token grant.
#[derive(Debug, Clone)]
pub struct RefreshTokenAuth {
    config: OAuthClientConfig,
    initial: InitialGrant,
    redirect_url: Option<RedirectUrl>,
    http: reqwest::Client,
}

impl RefreshTokenAuth {
    /// Creates the strategy.
    ///
    /// # Errors
    ///
    /// Returns a config error if `redirect_url` is invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        config: OAuthClientConfig,
        initial: InitialGrant,
        redirect_url: Option<String>,
    ) -> AdapterResult<Self> {
        let redirect_url = redirect_url
            .map(|url| {
                RedirectUrl::new(url.clone())
                    .map_err(|e| StandardError::config(format!("invalid redirect URL '{url}': {e}")))
            })
            .transpose()?;
        Ok(Self {
            config,
            initial,
            redirect_url,
            http: http_client()?,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> AdapterResult<VendorCredential> {
        let token = self
            .config
            .client()
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;
        debug!("access token refreshed");
        Ok(self.config.credential_from(&token, Some(refresh_token)))
    }
}

#[async_trait]
impl Authenticator for RefreshTokenAuth {
    fn strategy(&self) -> AuthStrategy {
        AuthStrategy::RefreshToken
    }

    #[instrument(skip_all, fields(token_url = %self.config.token_url()))]
    async fn obtain(&self, previous: Option<&VendorCredential>) -> AdapterResult<VendorCredential> {
        if let Some(refresh_token) = previous.and_then(|c| c.refresh_token.as_deref()) {
            return self.refresh(refresh_token).await;
        }

        match &self.initial {
            InitialGrant::RefreshToken(refresh_token) => self.refresh(refresh_token).await,
            InitialGrant::AuthorizationCode(code) => {
                let mut client = self.config.client();
                if let Some(redirect_url) = &self.redirect_url {
                    client = client.set_redirect_uri(redirect_url.clone());
                }
                let token = client
                    .exchange_code(AuthorizationCode::new(code.clone()))
                    .request_async(&self.http)
                    .await
                    .map_err(classify_token_error)?;
                debug!("authorization code exchanged");
                Ok(self.config.credential_from(&token, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_key_never_expires_and_is_not_persisted() {
        let auth = StaticKeyAuth::new("pat-na1-123");
        let credential = auth.obtain(None).await.expect("static");
        assert_eq!(credential.access_token, "pat-na1-123");
        assert!(credential.is_valid(crate::credential::DEFAULT_REFRESH_BUFFER_MS));
        assert!(!auth.persistent());
        assert_eq!(auth.strategy(), AuthStrategy::StaticKey);
    }

    #[test]
    fn invalid_token_url_is_a_config_error() {
        let err = OAuthClientConfig::new("id", "secret", "not a url").expect_err("invalid");
        assert_eq!(err.kind, crate::error::ErrorKind::Config);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = OAuthClientConfig::new("id", "very-secret", "https://login.example.com/token")
            .expect("valid");
        let auth = RefreshTokenAuth::new(
            config,
            InitialGrant::AuthorizationCode("one-time-code".to_string()),
            None,
        )
        .expect("valid");
        let debug = format!("{auth:?}");
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("one-time-code"));
    }

    #[test]
    fn initial_grant_deserializes_tagged() {
        let grant: InitialGrant = serde_json::from_value(serde_json::json!({
            "type": "refresh_token",
            "value": "abc"
        }))
        .expect("deserialize");
        assert_eq!(grant, InitialGrant::RefreshToken("abc".to_string()));
    }
}
