use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::{credential_offer::PRE_AUTHORIZED_CODE_GRANT, error::IssuanceError};

use super::{AccessToken, AuthorizedRequest, RefreshToken, TokenType};

/// Token Request body, sent form encoded to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "grant_type")]
pub enum TokenRequest {
    #[serde(rename = "authorization_code")]
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: String,
        client_id: String,
    },
    #[serde(rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code")]
    PreAuthorizedCode {
        #[serde(rename = "pre-authorized_code")]
        pre_authorized_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_code: Option<String>,
        client_id: String,
    },
}

impl TokenRequest {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenRequest::AuthorizationCode { .. } => "authorization_code",
            TokenRequest::PreAuthorizedCode { .. } => PRE_AUTHORIZED_CODE_GRANT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub c_nonce: Option<String>,
    #[serde(default)]
    pub c_nonce_expires_in: Option<u64>,
    #[serde(default)]
    pub authorization_details: Option<Json>,
}

impl TryFrom<TokenResponse> for AuthorizedRequest {
    type Error = IssuanceError;

    /// A fresh token always starts out without a proof requirement; a token
    /// response that already carries a `c_nonce` is rejected.
    fn try_from(response: TokenResponse) -> Result<Self, Self::Error> {
        if response.c_nonce.is_some() {
            return Err(IssuanceError::ProtocolViolation(
                "token response already demands a proof (c_nonce present)".into(),
            ));
        }
        if response.access_token.trim().is_empty() {
            return Err(IssuanceError::ProtocolViolation(
                "token response has a blank access_token".into(),
            ));
        }
        Ok(AuthorizedRequest::NoProofRequired {
            access_token: AccessToken::new(response.access_token, TokenType::from(response.token_type)),
            refresh_token: response.refresh_token.map(RefreshToken),
            expires_in: response.expires_in,
        })
    }
}
