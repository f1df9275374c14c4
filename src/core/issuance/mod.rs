//! Credential submission, invalid-proof recovery and deferred issuance.
//!
//! The protocol state is the [AuthorizedRequest] value; [transition] maps a
//! state and a [SubmissionOutcome] to the next [Step] without touching the
//! network, and [IssuanceStateMachine] drives it against the issuer.

use serde_json::Value as Json;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    authorization::{AuthorizedRequest, CNonce},
    error::IssuanceError,
    metadata::{CredentialConfigurationId, CredentialIssuerMetadata},
    proof::{build_proof, BindingKey},
    transport::{build_request, execute, TransportError},
    util::{json_request, AsyncHttpClient},
};

pub mod wire;

use self::wire::{
    classify_deferred, classify_submission, CredentialRequest, CredentialResponse,
    DeferredCredentialRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCredential {
    /// Format of the credential configuration it was requested under; unknown
    /// for credentials collected through a standalone deferred poll.
    pub format: Option<String>,
    pub credential: Json,
}

/// Handle of a deferred issuance, polled verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionId {
    pub id: String,
    /// Server suggested wait before the next poll, in seconds.
    pub interval: Option<u64>,
}

/// What the credential endpoint said about one submission.
#[derive(Debug)]
pub enum SubmissionOutcome {
    Issued(Vec<IssuedCredential>),
    Deferred(TransactionId),
    InvalidProof(CNonce),
    Failed(IssuanceError),
}

/// What the deferred credential endpoint said about one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredPollOutcome {
    Issued(Vec<Json>),
    IssuancePending(TransactionId),
    Errored {
        code: String,
        description: Option<String>,
    },
}

/// Next move of the state machine.
#[derive(Debug)]
pub enum Step {
    Issued {
        authorized: AuthorizedRequest,
        credentials: Vec<IssuedCredential>,
    },
    Deferred {
        authorized: AuthorizedRequest,
        transaction_id: TransactionId,
    },
    /// Submit again, with a proof answering the new `c_nonce`.
    Retry(AuthorizedRequest),
}

/// Result of an issuance call. A pending deferred issuance is not an error.
///
/// Both variants hand back the request state the call ended in, so that a
/// `c_nonce` learned along the way is used by the next request.
#[derive(Debug, Clone, PartialEq)]
pub enum IssuanceOutcome {
    Issued {
        authorized: AuthorizedRequest,
        credentials: Vec<IssuedCredential>,
    },
    Pending {
        authorized: AuthorizedRequest,
        transaction_id: TransactionId,
    },
}

/// Apply a submission outcome to the state it was submitted under.
///
/// An invalid proof only leads to a retry from [AuthorizedRequest::NoProofRequired];
/// a proof sent in answer to a `c_nonce` must not be rejected again.
pub fn transition(
    state: AuthorizedRequest,
    outcome: SubmissionOutcome,
) -> Result<Step, IssuanceError> {
    match (state, outcome) {
        (authorized, SubmissionOutcome::Issued(credentials)) => Ok(Step::Issued {
            authorized,
            credentials,
        }),
        (authorized, SubmissionOutcome::Deferred(transaction_id)) => Ok(Step::Deferred {
            authorized,
            transaction_id,
        }),
        (
            authorized @ AuthorizedRequest::NoProofRequired { .. },
            SubmissionOutcome::InvalidProof(c_nonce),
        ) => Ok(Step::Retry(authorized.require_proof(c_nonce))),
        (AuthorizedRequest::ProofRequired { .. }, SubmissionOutcome::InvalidProof(_)) => {
            Err(IssuanceError::ProtocolViolation(
                "issuer rejected a proof built for the c_nonce it issued".into(),
            ))
        }
        (_, SubmissionOutcome::Failed(e)) => Err(e),
    }
}

/// Submits credential requests to a credential issuer.
#[derive(Debug)]
pub struct IssuanceStateMachine<'a, C: ?Sized> {
    http_client: &'a C,
    issuer_metadata: &'a CredentialIssuerMetadata,
    client_id: Option<&'a str>,
}

impl<'a, C> IssuanceStateMachine<'a, C>
where
    C: AsyncHttpClient + Sync + ?Sized,
{
    /// `client_id` becomes the `iss` of holder-binding proofs; leave it out
    /// for anonymous pre-authorized access.
    pub fn new(
        http_client: &'a C,
        issuer_metadata: &'a CredentialIssuerMetadata,
        client_id: Option<&'a str>,
    ) -> Self {
        Self {
            http_client,
            issuer_metadata,
            client_id,
        }
    }

    /// Request the credential of configuration `id`.
    ///
    /// A request rejected for a missing or invalid proof is sent again once,
    /// with a proof built from `binding_key` for the issuer's new `c_nonce`.
    /// A deferred issuance is polled once before returning; when that poll
    /// fails in transport the issuance is reported pending with its handle.
    pub async fn submit(
        &self,
        authorized: AuthorizedRequest,
        id: &CredentialConfigurationId,
        binding_key: Option<&BindingKey>,
    ) -> Result<IssuanceOutcome, IssuanceError> {
        let configuration = self
            .issuer_metadata
            .credential_configuration(id)
            .ok_or_else(|| {
                IssuanceError::validation(format!("unknown credential configuration '{id}'"))
            })?;
        if let Some(key) = binding_key {
            configuration.check_jwt_proof_alg(key.signer().alg())?;
        }

        let outcome = self
            .submit_once(&authorized, id, &configuration.format, binding_key)
            .await?;
        let step = match transition(authorized, outcome)? {
            Step::Retry(proof_required) => {
                info!("issuer demands a proof for '{id}', retrying once");
                let outcome = self
                    .submit_once(&proof_required, id, &configuration.format, binding_key)
                    .await?;
                transition(proof_required, outcome)?
            }
            step => step,
        };

        match step {
            Step::Issued {
                authorized,
                credentials,
            } => {
                info!("issued {} credential(s) for '{id}'", credentials.len());
                Ok(IssuanceOutcome::Issued {
                    authorized,
                    credentials,
                })
            }
            Step::Deferred {
                authorized,
                transaction_id,
            } => {
                info!("issuance of '{id}' deferred");
                let result = self
                    .deferred(authorized.clone(), &transaction_id, Some(&configuration.format))
                    .await;
                match result {
                    Err(IssuanceError::Transport(e)) => {
                        warn!(
                            "first poll of deferred issuance '{}' failed, keeping it pending: {e}",
                            transaction_id.id
                        );
                        Ok(IssuanceOutcome::Pending {
                            authorized,
                            transaction_id,
                        })
                    }
                    result => result,
                }
            }
            Step::Retry(_) => Err(IssuanceError::ProtocolViolation(
                "issuer rejected the proof of a retried request".into(),
            )),
        }
    }

    /// Poll a deferred issuance once.
    pub async fn poll_deferred(
        &self,
        authorized: AuthorizedRequest,
        transaction_id: &TransactionId,
    ) -> Result<IssuanceOutcome, IssuanceError> {
        self.deferred(authorized, transaction_id, None).await
    }

    async fn deferred(
        &self,
        authorized: AuthorizedRequest,
        transaction_id: &TransactionId,
        format: Option<&str>,
    ) -> Result<IssuanceOutcome, IssuanceError> {
        let endpoint = self
            .issuer_metadata
            .deferred_credential_endpoint
            .as_ref()
            .ok_or_else(|| {
                IssuanceError::ProtocolViolation(format!(
                    "issuer {} deferred issuance without a deferred_credential_endpoint",
                    self.issuer_metadata.credential_issuer
                ))
            })?;

        let body = DeferredCredentialRequest {
            transaction_id: &transaction_id.id,
        };
        let result = self.post(&authorized, endpoint, &body).await?;

        match classify_deferred(result, transaction_id)? {
            DeferredPollOutcome::Issued(credentials) => {
                info!("deferred issuance complete");
                Ok(IssuanceOutcome::Issued {
                    authorized,
                    credentials: credentials
                        .into_iter()
                        .map(|credential| IssuedCredential {
                            format: format.map(ToOwned::to_owned),
                            credential,
                        })
                        .collect(),
                })
            }
            DeferredPollOutcome::IssuancePending(transaction_id) => {
                debug!(
                    "deferred issuance pending, next poll in {:?}s",
                    transaction_id.interval
                );
                Ok(IssuanceOutcome::Pending {
                    authorized,
                    transaction_id,
                })
            }
            DeferredPollOutcome::Errored { code, description } => {
                warn!("deferred issuance failed: {code}");
                Err(IssuanceError::DeferredIssuance { code, description })
            }
        }
    }

    async fn submit_once(
        &self,
        authorized: &AuthorizedRequest,
        id: &CredentialConfigurationId,
        format: &str,
        binding_key: Option<&BindingKey>,
    ) -> Result<SubmissionOutcome, IssuanceError> {
        let proof = match authorized.c_nonce() {
            None => None,
            Some(c_nonce) => {
                let key = binding_key.ok_or_else(|| {
                    IssuanceError::validation(format!(
                        "credential '{id}' requires a proof but no binding key was given"
                    ))
                })?;
                Some(
                    build_proof(
                        key,
                        self.client_id,
                        &self.issuer_metadata.credential_issuer,
                        c_nonce,
                    )
                    .await?,
                )
            }
        };
        debug!(
            "submitting credential request for '{id}' (proof: {})",
            proof.is_some()
        );

        let body = CredentialRequest {
            credential_configuration_id: id,
            proof,
        };
        let result = self
            .post(authorized, &self.issuer_metadata.credential_endpoint, &body)
            .await?;
        Ok(classify_submission(result, format))
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        authorized: &AuthorizedRequest,
        endpoint: &Url,
        body: &T,
    ) -> Result<Result<CredentialResponse, TransportError>, IssuanceError> {
        let body = serde_json::to_vec(body).map_err(|e| {
            IssuanceError::validation(format!("unable to encode credential request: {e}"))
        })?;
        let (name, value) = authorized.authorization_header()?;
        let request = build_request(json_request().header(name, value), endpoint, body)?;
        Ok(execute(self.http_client, request).await)
    }
}
