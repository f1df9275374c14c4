//! Signed JWT assertions: holder-binding proofs for credential requests and
//! client attestation proofs of possession.

use std::sync::Arc;

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use url::Url;

use super::{authorization::CNonce, error::IssuanceError};

pub mod attestation;
pub mod signer;

pub use attestation::{build_pop_jwt, AttestedClient, ClientAttestationPopJwtSpec};
pub use signer::{JwtSigner, P256Signer};

pub const PROOF_JWT_TYP: &str = "openid4vci-proof+jwt";

/// The key an issued credential will be bound to.
///
/// Supplied by the caller; the engine never generates keys.
#[derive(Debug, Clone)]
pub enum BindingKey {
    /// Bind to the public JWK of the signer, sent in the `jwk` header.
    Jwk(Arc<dyn JwtSigner + Send + Sync>),
    /// Bind to a DID verification method, sent in the `kid` header.
    Did {
        kid: String,
        signer: Arc<dyn JwtSigner + Send + Sync>,
    },
}

impl BindingKey {
    pub fn signer(&self) -> &(dyn JwtSigner + Send + Sync) {
        match self {
            BindingKey::Jwk(signer) => signer.as_ref(),
            BindingKey::Did { signer, .. } => signer.as_ref(),
        }
    }

    fn header(&self) -> Result<Json, IssuanceError> {
        let signer = self.signer();
        let mut header = json!({
            "typ": PROOF_JWT_TYP,
            "alg": signer.alg(),
        });
        match self {
            BindingKey::Jwk(_) => {
                header["jwk"] = serde_json::to_value(signer.jwk())
                    .map_err(|e| IssuanceError::Signing(e.into()))?;
            }
            BindingKey::Did { kid, .. } => header["kid"] = Json::String(kid.clone()),
        }
        Ok(header)
    }
}

/// `proof` parameter of a Credential Request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "proof_type", rename_all = "snake_case")]
pub enum Proof {
    Jwt { jwt: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub aud: String,
    pub iat: i64,
    pub nonce: String,
}

/// Build the holder-binding proof answering `c_nonce`.
///
/// `client_id` is omitted from the proof for anonymous (pre-authorized) access.
pub async fn build_proof(
    binding_key: &BindingKey,
    client_id: Option<&str>,
    credential_issuer: &Url,
    c_nonce: &CNonce,
) -> Result<Proof, IssuanceError> {
    let claims = ProofClaims {
        iss: client_id.map(ToOwned::to_owned),
        aud: identifier(credential_issuer).to_owned(),
        iat: now(),
        nonce: c_nonce.value.clone(),
    };
    let header = binding_key.header()?;
    let jwt = make_jwt(&header, &claims, binding_key.signer()).await?;
    Ok(Proof::Jwt { jwt })
}

pub(crate) async fn make_jwt<S: JwtSigner + ?Sized>(
    header: &Json,
    claims: &impl Serialize,
    signer: &S,
) -> Result<String, IssuanceError> {
    let header_b64: String = serde_json::to_vec(header)
        .map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))
        .map_err(|e| IssuanceError::Signing(e.into()))?;
    let body_b64 = serde_json::to_vec(claims)
        .map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))
        .map_err(|e| IssuanceError::Signing(e.into()))?;
    let payload = [header_b64.as_bytes(), b".", body_b64.as_bytes()].concat();
    let signature = signer.sign(&payload).await.map_err(IssuanceError::Signing)?;
    let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(signature);
    Ok(format!("{header_b64}.{body_b64}.{signature_b64}"))
}

/// Current time in seconds since the epoch, rounded to the nearest second.
pub(crate) fn now() -> i64 {
    let millis = chrono::Utc::now().timestamp_millis();
    (millis + 500).div_euclid(1000)
}

/// The identifier form of `url`: a bare origin keeps no trailing slash.
pub(crate) fn identifier(url: &Url) -> &str {
    let s = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        s.trim_end_matches('/')
    } else {
        s
    }
}
