use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use url::Url;

use crate::core::{
    credential_offer::RequestedCredential,
    error::IssuanceError,
    form,
};

const CODE_VERIFIER_BYTES: usize = 32;
const OPENID_CREDENTIAL: &str = "openid_credential";

/// PKCE verifier and its S256 challenge (RFC 7636).
#[derive(Clone)]
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    pub fn new() -> Self {
        let bytes: [u8; CODE_VERIFIER_BYTES] = rand::random();
        Self::from_verifier(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl Default for Pkce {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

/// Authorization Request parameters, either pushed or sent through the user agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationRequestParams {
    pub response_type: &'static str,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// JSON text of the `openid_credential` authorization details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<String>,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
}

impl AuthorizationRequestParams {
    pub fn new(
        client_id: &str,
        redirect_uri: &Url,
        credentials: &[RequestedCredential],
        pkce: &Pkce,
        state: String,
        issuer_state: Option<&str>,
    ) -> Self {
        let scopes: Vec<&str> = credentials
            .iter()
            .filter_map(|c| match c {
                RequestedCredential::Scope { scope, .. } => Some(scope.as_str()),
                RequestedCredential::ConfigurationId(_) => None,
            })
            .collect();
        let details: Vec<_> = credentials
            .iter()
            .filter_map(|c| match c {
                RequestedCredential::ConfigurationId(id) => Some(json!({
                    "type": OPENID_CREDENTIAL,
                    "credential_configuration_id": id,
                })),
                RequestedCredential::Scope { .. } => None,
            })
            .collect();

        Self {
            response_type: "code",
            client_id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_string(),
            scope: (!scopes.is_empty()).then(|| scopes.join(" ")),
            authorization_details: (!details.is_empty())
                .then(|| serde_json::Value::Array(details).to_string()),
            code_challenge: pkce.challenge().to_owned(),
            code_challenge_method: "S256",
            state,
            issuer_state: issuer_state.map(ToOwned::to_owned),
        }
    }

    pub fn to_form(&self) -> Result<String, IssuanceError> {
        form::encode(self).map_err(|e| {
            IssuanceError::validation(format!("unable to encode authorization request: {e:#}"))
        })
    }

    /// Authorization url carrying every parameter in the query.
    pub fn to_url(&self, mut authorization_endpoint: Url) -> Result<Url, IssuanceError> {
        authorization_endpoint.set_query(Some(&self.to_form()?));
        Ok(authorization_endpoint)
    }
}

/// Response of the pushed authorization request endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushedAuthorizationResponse {
    pub request_uri: String,
    pub expires_in: u64,
}

impl PushedAuthorizationResponse {
    /// Authorization url referencing the pushed request.
    /// ```
    /// # use openid4vci::core::authorization::par::PushedAuthorizationResponse;
    /// let response = PushedAuthorizationResponse {
    ///     request_uri: "urn:ietf:params:oauth:request_uri:6esc_11ACC5bwc014ltc14eY22c".into(),
    ///     expires_in: 60,
    /// };
    ///
    /// let url = response
    ///     .to_url("https://as.example.com/authorize".parse().unwrap(), "wallet-dev")
    ///     .unwrap();
    ///
    /// assert_eq!(
    ///     url.as_str(),
    ///     "https://as.example.com/authorize?client_id=wallet-dev&request_uri=urn%3Aietf%3Aparams%3Aoauth%3Arequest_uri%3A6esc_11ACC5bwc014ltc14eY22c"
    /// );
    /// ```
    pub fn to_url(&self, mut authorization_endpoint: Url, client_id: &str) -> Result<Url, IssuanceError> {
        let query = serde_urlencoded::to_string([
            ("client_id", client_id),
            ("request_uri", self.request_uri.as_str()),
        ])
        .map_err(|e| IssuanceError::validation(format!("unable to encode authorization url: {e}")))?;
        authorization_endpoint.set_query(Some(&query));
        Ok(authorization_endpoint)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pkce_s256() {
        // RFC 7636 Appendix B.
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into());
        assert_eq!(pkce.challenge(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
        assert_ne!(Pkce::new().verifier(), Pkce::new().verifier());
    }

    #[test]
    fn scopes_and_authorization_details() {
        let pkce = Pkce::from_verifier("verifier".into());
        let params = AuthorizationRequestParams::new(
            "wallet-dev",
            &"eudi-wallet://authorize".parse().unwrap(),
            &[
                RequestedCredential::Scope {
                    scope: "pid".into(),
                    configuration_id: "pid_sd_jwt".into(),
                },
                RequestedCredential::Scope {
                    scope: "age".into(),
                    configuration_id: "age_sd_jwt".into(),
                },
                RequestedCredential::ConfigurationId("mdl".into()),
            ],
            &pkce,
            "state-1".into(),
            Some("eyJhbGciOiJSU0Et"),
        );

        assert_eq!(params.scope.as_deref(), Some("pid age"));
        let details: serde_json::Value =
            serde_json::from_str(params.authorization_details.as_deref().unwrap()).unwrap();
        assert_eq!(
            details,
            json!([{"type": "openid_credential", "credential_configuration_id": "mdl"}])
        );

        let form = params.to_form().unwrap();
        assert!(form.contains("scope=pid+age"));
        assert!(form.contains("code_challenge_method=S256"));
        assert!(form.contains("issuer_state=eyJhbGciOiJSU0Et"));
    }

    #[test]
    fn without_scopes() {
        let params = AuthorizationRequestParams::new(
            "wallet-dev",
            &"eudi-wallet://authorize".parse().unwrap(),
            &[RequestedCredential::ConfigurationId("mdl".into())],
            &Pkce::new(),
            "s".into(),
            None,
        );
        let url = params
            .to_url("https://as.example.com/authorize".parse().unwrap())
            .unwrap();
        let query = url.query().unwrap();
        assert!(!query.contains("scope="));
        assert!(!query.contains("issuer_state"));
        assert!(query.contains("authorization_details="));
    }
}
