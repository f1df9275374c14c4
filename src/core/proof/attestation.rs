//! OAuth 2.0 Attestation-Based Client Authentication.

use std::{sync::Arc, time::Duration};

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use url::Url;

use crate::core::error::IssuanceError;

use super::{make_jwt, now, JwtSigner};

pub const CLIENT_ATTESTATION_HEADER: &str = "OAuth-Client-Attestation";
pub const CLIENT_ATTESTATION_POP_HEADER: &str = "OAuth-Client-Attestation-PoP";
pub const CLIENT_ATTESTATION_POP_TYP: &str = "oauth-client-attestation-pop+jwt";

const DEFAULT_POP_DURATION: Duration = Duration::from_secs(300);
const JTI_ENTROPY_BYTES: usize = 32;

/// How client attestation PoP JWTs are produced.
#[derive(Debug, Clone)]
pub struct ClientAttestationPopJwtSpec {
    pub signing_algorithm: String,
    pub duration: Duration,
    pub typ: String,
    pub nonce: Option<String>,
    pub signer: Arc<dyn JwtSigner + Send + Sync>,
}

impl ClientAttestationPopJwtSpec {
    /// A spec signing with the signer's own algorithm, valid for five minutes.
    pub fn new(signer: Arc<dyn JwtSigner + Send + Sync>) -> Self {
        Self {
            signing_algorithm: signer.alg().to_owned(),
            duration: DEFAULT_POP_DURATION,
            typ: CLIENT_ATTESTATION_POP_TYP.to_owned(),
            nonce: None,
            signer,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_signing_algorithm(mut self, alg: impl Into<String>) -> Self {
        self.signing_algorithm = alg.into();
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopClaims {
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Build a client attestation proof of possession for `client_id`, addressed
/// to the authorization server `audience`.
///
/// Fails when the spec's signer cannot sign with the requested algorithm; no
/// other key is ever substituted.
pub async fn build_pop_jwt(
    client_id: &str,
    audience: &str,
    spec: &ClientAttestationPopJwtSpec,
) -> Result<String, IssuanceError> {
    if client_id.trim().is_empty() {
        return Err(IssuanceError::validation("client id must not be blank"));
    }
    Url::parse(audience).map_err(|e| {
        IssuanceError::validation(format!("audience '{audience}' is not an absolute url: {e}"))
    })?;
    if !spec.signer.supports(&spec.signing_algorithm) {
        return Err(IssuanceError::UnsupportedAlgorithm {
            requested: spec.signing_algorithm.clone(),
            supported: spec.signer.alg().to_owned(),
        });
    }

    let iat = now();
    let exp = i64::try_from(spec.duration.as_secs())
        .ok()
        .and_then(|duration| iat.checked_add(duration))
        .ok_or_else(|| IssuanceError::validation("pop duration out of range"))?;
    let claims = PopClaims {
        iat,
        exp,
        aud: audience.to_owned(),
        iss: client_id.to_owned(),
        jti: jti(),
        nonce: spec.nonce.clone(),
    };
    let header = json!({
        "typ": spec.typ,
        "alg": spec.signing_algorithm,
    });
    make_jwt(&header, &claims, spec.signer.as_ref()).await
}

fn jti() -> String {
    let bytes: [u8; JTI_ENTROPY_BYTES] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// A wallet client authenticated by a client attestation issued by its
/// wallet provider.
#[derive(Debug, Clone)]
pub struct AttestedClient {
    id: String,
    attestation_jwt: String,
    pop_spec: ClientAttestationPopJwtSpec,
}

impl AttestedClient {
    /// Take the client identifier (`sub`) from the attestation JWT.
    ///
    /// The attestation signature is verified by the authorization server, not
    /// here.
    pub fn from_attestation(
        jwt: impl Into<String>,
        pop_spec: ClientAttestationPopJwtSpec,
    ) -> Result<Self, IssuanceError> {
        let jwt = jwt.into();
        let (_, payload_b64, _) = ssi::claims::jws::split_jws(&jwt).map_err(|e| {
            IssuanceError::validation(format!("client attestation is not a compact JWS: {e}"))
        })?;
        let payload: Json = BASE64_URL_SAFE_NO_PAD
            .decode(payload_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| IssuanceError::validation("client attestation payload is not JSON"))?;

        let id = payload
            .get("sub")
            .and_then(Json::as_str)
            .ok_or_else(|| IssuanceError::validation("client attestation has no 'sub' claim"))?;
        if id.trim().is_empty() {
            return Err(IssuanceError::validation(
                "client attestation 'sub' claim is blank",
            ));
        }

        if let Some(exp) = payload.get("exp").and_then(Json::as_i64) {
            if exp <= now() {
                return Err(IssuanceError::validation("client attestation has expired"));
            }
        }

        Ok(Self {
            id: id.to_owned(),
            attestation_jwt: jwt,
            pop_spec,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attestation_jwt(&self) -> &str {
        &self.attestation_jwt
    }

    pub fn pop_spec(&self) -> &ClientAttestationPopJwtSpec {
        &self.pop_spec
    }

    /// Header pairs authenticating this client to `audience`.
    pub async fn headers(&self, audience: &str) -> Result<[(&'static str, String); 2], IssuanceError> {
        let pop = build_pop_jwt(&self.id, audience, &self.pop_spec).await?;
        Ok([
            (CLIENT_ATTESTATION_HEADER, self.attestation_jwt.clone()),
            (CLIENT_ATTESTATION_POP_HEADER, pop),
        ])
    }
}
