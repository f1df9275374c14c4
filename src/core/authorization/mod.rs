//! Authorization of the wallet against the authorization server protecting
//! a credential issuer.
//!
//! The outcome of every flow is an [AuthorizedRequest], which the issuance
//! state machine threads through credential submission.

use std::fmt;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::config::{Config, ParUsage};

use super::{
    credential_offer::CredentialOffer,
    error::IssuanceError,
    metadata::AuthorizationServerMetadata,
    proof::{identifier, AttestedClient},
    transport::{build_request, execute},
    util::{form_request, AsyncHttpClient},
};

pub mod par;
pub mod token;

use self::{
    par::{AuthorizationRequestParams, Pkce, PushedAuthorizationResponse},
    token::{TokenRequest, TokenResponse},
};

const BEARER: &str = "Bearer";
const DPOP: &str = "DPoP";

/// `token_type` of an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenType {
    Bearer,
    DPoP,
    Other(String),
}

impl From<String> for TokenType {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case(BEARER) {
            TokenType::Bearer
        } else if s.eq_ignore_ascii_case(DPOP) {
            TokenType::DPoP
        } else {
            TokenType::Other(s)
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Bearer => BEARER,
            TokenType::DPoP => DPOP,
            TokenType::Other(o) => o,
        }
        .fmt(f)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    token_type: TokenType,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, token_type: TokenType) -> Self {
        Self {
            value: value.into(),
            token_type,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }

    /// Value of the `Authorization` header for resource requests.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken(pub String);

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(..)")
    }
}

/// Challenge a holder-binding proof must answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CNonce {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl CNonce {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_in: None,
        }
    }

    pub fn with_expires_in(mut self, expires_in: Option<u64>) -> Self {
        self.expires_in = expires_in;
        self
    }
}

/// Authorization to request credentials, at some point of the issuance lifecycle.
///
/// A request starts as [AuthorizedRequest::NoProofRequired] and only becomes
/// [AuthorizedRequest::ProofRequired] when the issuer rejects a submission
/// with a fresh `c_nonce`. It never goes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizedRequest {
    NoProofRequired {
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
        expires_in: Option<u64>,
    },
    ProofRequired {
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
        c_nonce: CNonce,
    },
}

impl AuthorizedRequest {
    pub fn access_token(&self) -> &AccessToken {
        match self {
            AuthorizedRequest::NoProofRequired { access_token, .. } => access_token,
            AuthorizedRequest::ProofRequired { access_token, .. } => access_token,
        }
    }

    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        match self {
            AuthorizedRequest::NoProofRequired { refresh_token, .. } => refresh_token.as_ref(),
            AuthorizedRequest::ProofRequired { refresh_token, .. } => refresh_token.as_ref(),
        }
    }

    pub fn c_nonce(&self) -> Option<&CNonce> {
        match self {
            AuthorizedRequest::NoProofRequired { .. } => None,
            AuthorizedRequest::ProofRequired { c_nonce, .. } => Some(c_nonce),
        }
    }

    /// Demand a proof answering `c_nonce` from now on.
    pub fn require_proof(self, c_nonce: CNonce) -> AuthorizedRequest {
        match self {
            AuthorizedRequest::NoProofRequired {
                access_token,
                refresh_token,
                ..
            }
            | AuthorizedRequest::ProofRequired {
                access_token,
                refresh_token,
                ..
            } => AuthorizedRequest::ProofRequired {
                access_token,
                refresh_token,
                c_nonce,
            },
        }
    }

    /// `Authorization` header of a credential request.
    ///
    /// DPoP-bound tokens are refused: a request carrying one would need a
    /// `DPoP` proof header, which this client does not produce.
    pub(crate) fn authorization_header(&self) -> Result<(http::HeaderName, String), IssuanceError> {
        let access_token = self.access_token();
        if access_token.token_type() == &TokenType::DPoP {
            return Err(IssuanceError::validation(
                "access token is DPoP-bound; credential requests without a DPoP proof would be rejected",
            ));
        }
        Ok((AUTHORIZATION, access_token.authorization_header()))
    }
}

/// The OAuth client the wallet acts as.
#[derive(Debug, Clone)]
pub enum Client {
    /// A public client, identified by its `client_id` only.
    Public { id: String },
    /// A client authenticating with a wallet provider's attestation.
    Attested(AttestedClient),
}

impl Client {
    pub fn id(&self) -> &str {
        match self {
            Client::Public { id } => id,
            Client::Attested(attested) => attested.id(),
        }
    }

    async fn authentication_headers(
        &self,
        authorization_server: &AuthorizationServerMetadata,
    ) -> Result<Vec<(&'static str, String)>, IssuanceError> {
        match self {
            Client::Public { .. } => Ok(Vec::new()),
            Client::Attested(attested) => Ok(attested
                .headers(identifier(authorization_server.issuer()))
                .await?
                .into()),
        }
    }
}

/// Authorization code returned to the wallet's redirect uri.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationCode(pub String);

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationCode(..)")
    }
}

#[derive(Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl AuthorizationCode {
    /// Extract the code from the redirect the authorization server sent the
    /// user agent to, checking `state` when one is expected.
    /// ```
    /// # use openid4vci::core::authorization::AuthorizationCode;
    /// let redirect: url::Url = "eudi-wallet://authorize?code=SplxlOBeZQQYbYS6WxSbIA&state=af0ifjsldkj"
    ///     .parse()
    ///     .unwrap();
    ///
    /// let code = AuthorizationCode::from_redirect(&redirect, Some("af0ifjsldkj")).unwrap();
    ///
    /// assert_eq!(code.0, "SplxlOBeZQQYbYS6WxSbIA");
    /// ```
    pub fn from_redirect(redirect: &Url, expected_state: Option<&str>) -> anyhow::Result<Self> {
        let params: RedirectParams = serde_urlencoded::from_str(redirect.query().unwrap_or(""))?;
        if let Some(error) = params.error {
            anyhow::bail!(
                "authorization failed: {error}{}",
                params
                    .error_description
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default()
            )
        }
        if let Some(expected) = expected_state {
            if params.state.as_deref() != Some(expected) {
                anyhow::bail!("authorization response state does not match the request")
            }
        }
        params
            .code
            .map(Self)
            .ok_or_else(|| anyhow::anyhow!("authorization response has no code"))
    }
}

/// Interactive login of the user at the authorization server.
#[async_trait]
pub trait Login {
    /// Send the user to `authorization_url` and return the authorization code
    /// the authorization server redirects back with. `state` is the value the
    /// redirect must carry.
    async fn authorization_code(
        &self,
        authorization_url: Url,
        state: &str,
    ) -> anyhow::Result<AuthorizationCode>;
}

/// Runs the authorization flows of a credential offer against its
/// authorization server.
#[derive(Debug)]
pub struct AuthorizationOrchestrator<'a, C: ?Sized, L: ?Sized> {
    http_client: &'a C,
    login: &'a L,
    client: &'a Client,
    config: &'a Config,
}

impl<'a, C, L> AuthorizationOrchestrator<'a, C, L>
where
    C: AsyncHttpClient + Sync + ?Sized,
    L: Login + Sync + ?Sized,
{
    pub fn new(http_client: &'a C, login: &'a L, client: &'a Client, config: &'a Config) -> Self {
        Self {
            http_client,
            login,
            client,
            config,
        }
    }

    /// Authorization code flow: pushed authorization request (when used),
    /// user login, then code exchange.
    pub async fn authorize(&self, offer: &CredentialOffer) -> Result<AuthorizedRequest, IssuanceError> {
        let server = &offer.authorization_server_metadata;
        let authorization_endpoint = server.authorization_endpoint().ok_or_else(|| {
            IssuanceError::validation(format!(
                "authorization server {} has no authorization endpoint",
                server.issuer()
            ))
        })?;

        let pkce = Pkce::new();
        let state = Uuid::new_v4().to_string();
        let params = AuthorizationRequestParams::new(
            self.client.id(),
            &self.config.redirect_uri,
            &offer.credentials,
            &pkce,
            state.clone(),
            offer.issuer_state(),
        );

        let authorization_url = match (self.config.par_usage, server.par_endpoint()) {
            (ParUsage::Never, _) | (ParUsage::IfSupported, None) => {
                if server.requires_par() {
                    return Err(IssuanceError::validation(format!(
                        "authorization server {} requires pushed authorization requests",
                        server.issuer()
                    )));
                }
                params.to_url(authorization_endpoint.clone())?
            }
            (ParUsage::Required, None) => {
                return Err(IssuanceError::validation(format!(
                    "authorization server {} does not support pushed authorization requests",
                    server.issuer()
                )))
            }
            (_, Some(par_endpoint)) => {
                let pushed = self.push(server, par_endpoint, &params).await?;
                pushed.to_url(authorization_endpoint.clone(), self.client.id())?
            }
        };

        let code = self
            .login
            .authorization_code(authorization_url, &state)
            .await
            .map_err(|e| IssuanceError::authorization("user authorization failed", e))?;
        debug!("received authorization code");

        let request = TokenRequest::AuthorizationCode {
            code: code.0,
            redirect_uri: self.config.redirect_uri.to_string(),
            code_verifier: pkce.verifier().to_owned(),
            client_id: self.client.id().to_owned(),
        };
        self.exchange(server, request).await
    }

    /// Pre-authorized code flow: exchange the offer's pre-authorized code,
    /// with the transaction code when the offer asks for one.
    pub async fn authorize_with_pre_authorized_code(
        &self,
        offer: &CredentialOffer,
        tx_code: Option<&str>,
    ) -> Result<AuthorizedRequest, IssuanceError> {
        let grant = offer.pre_authorized_code_grant().ok_or_else(|| {
            IssuanceError::validation("credential offer has no pre-authorized code grant")
        })?;

        let tx_code = match (&grant.tx_code, tx_code) {
            (Some(expected), Some(tx_code)) => {
                expected.check(tx_code)?;
                Some(tx_code.to_owned())
            }
            (Some(_), None) => {
                return Err(IssuanceError::validation(
                    "credential offer requires a transaction code",
                ))
            }
            (None, Some(_)) => {
                return Err(IssuanceError::validation(
                    "credential offer does not expect a transaction code",
                ))
            }
            (None, None) => None,
        };

        let request = TokenRequest::PreAuthorizedCode {
            pre_authorized_code: grant.pre_authorized_code.clone(),
            tx_code,
            client_id: self.client.id().to_owned(),
        };
        self.exchange(&offer.authorization_server_metadata, request)
            .await
    }

    async fn push(
        &self,
        server: &AuthorizationServerMetadata,
        par_endpoint: &Url,
        params: &AuthorizationRequestParams,
    ) -> Result<PushedAuthorizationResponse, IssuanceError> {
        let request = self
            .form_post(server, par_endpoint, params.to_form()?)
            .await?;
        let response: PushedAuthorizationResponse = execute(self.http_client, request)
            .await
            .map_err(|e| IssuanceError::authorization("pushed authorization request failed", e))?;
        info!(
            "pushed authorization request to {par_endpoint}, valid for {}s",
            response.expires_in
        );
        Ok(response)
    }

    async fn exchange(
        &self,
        server: &AuthorizationServerMetadata,
        request: TokenRequest,
    ) -> Result<AuthorizedRequest, IssuanceError> {
        let grant_type = request.grant_type();
        let body = crate::core::form::encode(&request).map_err(|e| {
            IssuanceError::validation(format!("unable to encode token request: {e:#}"))
        })?;
        let request = self
            .form_post(server, server.token_endpoint(), body)
            .await?;
        let response: TokenResponse = execute(self.http_client, request)
            .await
            .map_err(|e| IssuanceError::authorization("token request failed", e))?;
        info!("exchanged {grant_type} grant for an access token");
        AuthorizedRequest::try_from(response)
    }

    async fn form_post(
        &self,
        server: &AuthorizationServerMetadata,
        url: &Url,
        body: String,
    ) -> Result<http::Request<Vec<u8>>, IssuanceError> {
        let mut builder = form_request();
        for (name, value) in self.client.authentication_headers(server).await? {
            builder = builder.header(name, value);
        }
        build_request(builder, url, body.into_bytes())
            .map_err(|e| IssuanceError::authorization("unable to build request", e))
    }
}
