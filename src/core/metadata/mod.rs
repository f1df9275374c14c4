use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use super::error::IssuanceError;

pub mod resolver;

pub use resolver::{HttpMetadataResolver, MetadataResolver};

/// Key of an entry of `credential_configurations_supported`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialConfigurationId(pub String);

impl fmt::Display for CredentialConfigurationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CredentialConfigurationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Credential Issuer Metadata, as published at
/// `/.well-known/openid-credential-issuer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialIssuerMetadata {
    pub credential_issuer: Url,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_servers: Vec<Url>,
    pub credential_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_credential_endpoint: Option<Url>,
    pub credential_configurations_supported:
        BTreeMap<CredentialConfigurationId, CredentialConfiguration>,
}

impl CredentialIssuerMetadata {
    pub fn credential_configuration(
        &self,
        id: &CredentialConfigurationId,
    ) -> Option<&CredentialConfiguration> {
        self.credential_configurations_supported.get(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfiguration {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cryptographic_binding_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub proof_types_supported: BTreeMap<String, ProofTypeMetadata>,
    /// Format specific parameters (`vct`, `doctype`, `credential_definition`, ...).
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofTypeMetadata {
    pub proof_signing_alg_values_supported: Vec<String>,
}

impl CredentialConfiguration {
    /// Check that a `jwt` proof signed with `alg` is acceptable for this
    /// configuration.
    pub fn check_jwt_proof_alg(&self, alg: &str) -> Result<(), IssuanceError> {
        if self.proof_types_supported.is_empty() {
            return Ok(());
        }
        let Some(jwt) = self.proof_types_supported.get("jwt") else {
            return Err(IssuanceError::validation(format!(
                "credential configuration does not accept jwt proofs (accepted: {})",
                self.proof_types_supported
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        };
        if !jwt.proof_signing_alg_values_supported.iter().any(|a| a == alg) {
            return Err(IssuanceError::UnsupportedAlgorithm {
                requested: alg.to_owned(),
                supported: jwt.proof_signing_alg_values_supported.join(", "),
            });
        }
        Ok(())
    }
}

/// OAuth 2.0 Authorization Server Metadata (RFC 8414).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthServerMetadata {
    pub issuer: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<Url>,
    pub token_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<Url>,
    #[serde(default)]
    pub require_pushed_authorization_requests: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dpop_signing_alg_values_supported: Vec<String>,
}

/// OpenID Connect Discovery metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcProviderMetadata {
    pub issuer: Url,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub jwks_uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<Url>,
    #[serde(default)]
    pub require_pushed_authorization_requests: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_types_supported: Vec<String>,
}

/// Metadata of the authorization server protecting a credential issuer.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationServerMetadata {
    Oidc(OidcProviderMetadata),
    OAuth(OAuthServerMetadata),
}

impl AuthorizationServerMetadata {
    pub fn issuer(&self) -> &Url {
        match self {
            Self::Oidc(m) => &m.issuer,
            Self::OAuth(m) => &m.issuer,
        }
    }

    pub fn authorization_endpoint(&self) -> Option<&Url> {
        match self {
            Self::Oidc(m) => Some(&m.authorization_endpoint),
            Self::OAuth(m) => m.authorization_endpoint.as_ref(),
        }
    }

    pub fn token_endpoint(&self) -> &Url {
        match self {
            Self::Oidc(m) => &m.token_endpoint,
            Self::OAuth(m) => &m.token_endpoint,
        }
    }

    pub fn par_endpoint(&self) -> Option<&Url> {
        match self {
            Self::Oidc(m) => m.pushed_authorization_request_endpoint.as_ref(),
            Self::OAuth(m) => m.pushed_authorization_request_endpoint.as_ref(),
        }
    }

    pub fn requires_par(&self) -> bool {
        match self {
            Self::Oidc(m) => m.require_pushed_authorization_requests,
            Self::OAuth(m) => m.require_pushed_authorization_requests,
        }
    }
}
