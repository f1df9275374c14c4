use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::{
    authorization::CNonce,
    error::IssuanceError,
    metadata::CredentialConfigurationId,
    proof::Proof,
    transport::{ErrorResponse, TransportError},
};

use super::{DeferredPollOutcome, IssuedCredential, SubmissionOutcome, TransactionId};

const INVALID_PROOF: &str = "invalid_proof";
const INVALID_NONCE: &str = "invalid_nonce";
const ISSUANCE_PENDING: &str = "issuance_pending";

/// Body of a Credential Request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialRequest<'a> {
    pub credential_configuration_id: &'a CredentialConfigurationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

/// Body of a Deferred Credential Request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferredCredentialRequest<'a> {
    pub transaction_id: &'a str,
}

/// Body of a successful Credential or Deferred Credential Response.
///
/// Both the single `credential` and the `credentials` array shapes are
/// accepted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CredentialResponse {
    #[serde(default)]
    pub credential: Option<Json>,
    #[serde(default)]
    pub credentials: Option<Vec<Json>>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub notification_id: Option<String>,
}

impl CredentialResponse {
    fn into_credentials(self) -> Option<Vec<Json>> {
        if let Some(credential) = self.credential {
            return Some(vec![credential]);
        }
        let credentials: Vec<Json> = self
            .credentials?
            .into_iter()
            .map(|c| match c {
                Json::Object(mut object) if object.contains_key("credential") => object
                    .remove("credential")
                    .unwrap_or(Json::Null),
                raw => raw,
            })
            .collect();
        (!credentials.is_empty()).then_some(credentials)
    }
}

/// Interpret the answer of the credential endpoint.
pub fn classify_submission(
    result: Result<CredentialResponse, TransportError>,
    format: &str,
) -> SubmissionOutcome {
    let response = match result {
        Ok(response) => response,
        Err(TransportError::Response(error)) if is_invalid_proof(&error) => {
            return match error.c_nonce {
                Some(c_nonce) => SubmissionOutcome::InvalidProof(
                    CNonce::new(c_nonce).with_expires_in(error.c_nonce_expires_in),
                ),
                None => SubmissionOutcome::Failed(IssuanceError::ProtocolViolation(format!(
                    "issuer answered '{}' without a fresh c_nonce",
                    error.error
                ))),
            };
        }
        Err(e) => return SubmissionOutcome::Failed(e.into()),
    };

    let transaction_id = response.transaction_id.clone();
    let interval = response.interval;
    match (response.into_credentials(), transaction_id) {
        (Some(credentials), _) => SubmissionOutcome::Issued(
            credentials
                .into_iter()
                .map(|credential| IssuedCredential {
                    format: Some(format.to_owned()),
                    credential,
                })
                .collect(),
        ),
        (None, Some(id)) => SubmissionOutcome::Deferred(TransactionId { id, interval }),
        (None, None) => SubmissionOutcome::Failed(IssuanceError::ProtocolViolation(
            "credential response carries neither a credential nor a transaction_id".into(),
        )),
    }
}

/// Interpret the answer of the deferred credential endpoint to a poll of
/// `transaction_id`.
pub fn classify_deferred(
    result: Result<CredentialResponse, TransportError>,
    transaction_id: &TransactionId,
) -> Result<DeferredPollOutcome, IssuanceError> {
    let pending = |interval: Option<u64>| {
        DeferredPollOutcome::IssuancePending(TransactionId {
            id: transaction_id.id.clone(),
            interval: interval.or(transaction_id.interval),
        })
    };

    match result {
        Ok(response) => {
            let interval = response.interval;
            let still_pending = response.transaction_id.is_some();
            match response.into_credentials() {
                Some(credentials) => Ok(DeferredPollOutcome::Issued(credentials)),
                None if still_pending => Ok(pending(interval)),
                None => Err(IssuanceError::ProtocolViolation(
                    "deferred credential response carries no credential".into(),
                )),
            }
        }
        Err(TransportError::Response(error)) if error.error == ISSUANCE_PENDING => {
            Ok(pending(error.interval))
        }
        Err(TransportError::Response(ErrorResponse {
            error,
            error_description,
            ..
        })) => Ok(DeferredPollOutcome::Errored {
            code: error,
            description: error_description,
        }),
        Err(e) => Err(e.into()),
    }
}

fn is_invalid_proof(error: &ErrorResponse) -> bool {
    error.error == INVALID_PROOF || error.error == INVALID_NONCE
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn error(value: Json) -> Result<CredentialResponse, TransportError> {
        Err(TransportError::Response(serde_json::from_value(value).unwrap()))
    }

    fn ok(value: Json) -> Result<CredentialResponse, TransportError> {
        Ok(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn request_body() {
        let id = CredentialConfigurationId::from("pid_sd_jwt");
        let body = serde_json::to_value(CredentialRequest {
            credential_configuration_id: &id,
            proof: Some(Proof::Jwt { jwt: "a.b.c".into() }),
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "credential_configuration_id": "pid_sd_jwt",
                "proof": {"proof_type": "jwt", "jwt": "a.b.c"}
            })
        );
    }

    #[test]
    fn issued_in_both_shapes() {
        let single = classify_submission(ok(json!({"credential": "eyJ..~"})), "dc+sd-jwt");
        let SubmissionOutcome::Issued(credentials) = single else {
            panic!("expected issued")
        };
        assert_eq!(credentials[0].format.as_deref(), Some("dc+sd-jwt"));
        assert_eq!(credentials[0].credential, json!("eyJ..~"));

        let batch = classify_submission(
            ok(json!({"credentials": [{"credential": "one"}, {"credential": "two"}]})),
            "mso_mdoc",
        );
        let SubmissionOutcome::Issued(credentials) = batch else {
            panic!("expected issued")
        };
        assert_eq!(
            credentials.iter().map(|c| &c.credential).collect::<Vec<_>>(),
            [&json!("one"), &json!("two")]
        );
    }

    #[test]
    fn deferred_submission() {
        let outcome = classify_submission(
            ok(json!({"transaction_id": "8xLOxBtZp8", "interval": 5})),
            "mso_mdoc",
        );
        let SubmissionOutcome::Deferred(tx) = outcome else {
            panic!("expected deferred")
        };
        assert_eq!(tx.id, "8xLOxBtZp8");
        assert_eq!(tx.interval, Some(5));
    }

    #[test]
    fn invalid_proof_carries_fresh_nonce() {
        let outcome = classify_submission(
            error(json!({
                "error": "invalid_proof",
                "c_nonce": "8YE9hCnyV2",
                "c_nonce_expires_in": 86400
            })),
            "mso_mdoc",
        );
        assert!(matches!(
            outcome,
            SubmissionOutcome::InvalidProof(c_nonce)
                if c_nonce == CNonce::new("8YE9hCnyV2").with_expires_in(Some(86400))
        ));
    }

    #[test]
    fn invalid_proof_without_nonce_is_a_protocol_violation() {
        let outcome = classify_submission(error(json!({"error": "invalid_proof"})), "mso_mdoc");
        assert!(matches!(
            outcome,
            SubmissionOutcome::Failed(IssuanceError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn other_errors_keep_their_classification() {
        let outcome = classify_submission(
            error(json!({"error": "unknown_credential_configuration"})),
            "mso_mdoc",
        );
        let SubmissionOutcome::Failed(e) = outcome else {
            panic!("expected failure")
        };
        assert_eq!(
            e.transport_error().and_then(TransportError::error_code),
            Some("unknown_credential_configuration")
        );

        let empty = classify_submission(ok(json!({})), "mso_mdoc");
        assert!(matches!(
            empty,
            SubmissionOutcome::Failed(IssuanceError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn deferred_poll_outcomes() {
        let tx = TransactionId {
            id: "8xLOxBtZp8".into(),
            interval: Some(30),
        };

        let pending =
            classify_deferred(error(json!({"error": "issuance_pending", "interval": 5})), &tx)
                .unwrap();
        assert_eq!(
            pending,
            DeferredPollOutcome::IssuancePending(TransactionId {
                id: "8xLOxBtZp8".into(),
                interval: Some(5)
            })
        );

        let pending_2xx = classify_deferred(ok(json!({"transaction_id": "8xLOxBtZp8"})), &tx).unwrap();
        assert_eq!(pending_2xx, DeferredPollOutcome::IssuancePending(tx.clone()));

        let errored = classify_deferred(
            error(json!({"error": "invalid_transaction_id", "error_description": "expired"})),
            &tx,
        )
        .unwrap();
        assert_eq!(
            errored,
            DeferredPollOutcome::Errored {
                code: "invalid_transaction_id".into(),
                description: Some("expired".into())
            }
        );

        let issued = classify_deferred(ok(json!({"credentials": [{"credential": "c"}]})), &tx).unwrap();
        assert_eq!(issued, DeferredPollOutcome::Issued(vec![json!("c")]));
    }
}
