use anyhow::Result;
use async_trait::async_trait;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use ssi::jwk::JWK;

/// Signing capability supplied by the caller.
///
/// Key material never leaves the implementation; the engine only asks for
/// signatures over JWS signing inputs.
#[async_trait]
pub trait JwtSigner: std::fmt::Debug {
    /// The algorithm that will be used to sign.
    fn alg(&self) -> &str;
    /// The public JWK of the signer.
    fn jwk(&self) -> &JWK;
    /// Whether this signer can produce signatures for `alg`.
    fn supports(&self, alg: &str) -> bool {
        self.alg() == alg
    }
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// ES256 signer over a P-256 key.
#[derive(Debug)]
pub struct P256Signer {
    key: SigningKey,
    jwk: JWK,
}

impl P256Signer {
    pub fn new(key: SigningKey) -> Result<Self> {
        let pk: p256::PublicKey = key.verifying_key().into();
        let jwk = serde_json::from_str(&pk.to_jwk_string())?;
        Ok(Self { key, jwk })
    }

    pub fn verifying_key(&self) -> &p256::ecdsa::VerifyingKey {
        self.key.verifying_key()
    }
}

#[async_trait]
impl JwtSigner for P256Signer {
    fn alg(&self) -> &str {
        "ES256"
    }

    fn jwk(&self) -> &JWK {
        &self.jwk
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let sig: Signature = self.key.sign(payload);
        Ok(sig.to_vec())
    }
}
