use super::transport::TransportError;

/// Failure of an issuance operation.
///
/// A deferred credential that is still pending is not an error: it is reported
/// through [IssuanceOutcome::Pending](crate::core::issuance::IssuanceOutcome::Pending).
#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    /// The input (offer, metadata, client identity, binding key) cannot be used.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Pushed authorization, login or token exchange failed.
    #[error("authorization failed: {reason}")]
    Authorization {
        reason: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered in a way the protocol does not allow at this point.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The issuer rejected a deferred credential request.
    #[error("deferred issuance failed: {}", with_description(.code, .description))]
    DeferredIssuance {
        code: String,
        description: Option<String>,
    },

    #[error("signing algorithm '{requested}' is not supported (supported: {supported})")]
    UnsupportedAlgorithm { requested: String, supported: String },

    #[error("signing failed: {0}")]
    Signing(#[source] anyhow::Error),
}

impl IssuanceError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub(crate) fn authorization(reason: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Authorization {
            reason: reason.into(),
            cause: cause.into(),
        }
    }

    /// The transport classification behind this error, if any.
    ///
    /// Looks through [IssuanceError::Authorization] so that callers can react
    /// to [TransportError::UseDpopNonce] regardless of which stage failed.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            IssuanceError::Transport(e) => Some(e),
            IssuanceError::Authorization { cause, .. } => cause.downcast_ref(),
            _ => None,
        }
    }
}

fn with_description(code: &str, description: &Option<String>) -> String {
    match description {
        Some(description) => format!("{code} ({description})"),
        None => code.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transport_error_survives_authorization_wrapping() {
        let err = IssuanceError::authorization(
            "token request failed",
            TransportError::UseDpopNonce("n".into()),
        );
        assert!(matches!(
            err.transport_error(),
            Some(TransportError::UseDpopNonce(n)) if n == "n"
        ));
        assert_eq!(err.to_string(), "authorization failed: token request failed");
    }

    #[test]
    fn deferred_display() {
        let err = IssuanceError::DeferredIssuance {
            code: "invalid_transaction_id".into(),
            description: Some("unknown".into()),
        };
        assert_eq!(
            err.to_string(),
            "deferred issuance failed: invalid_transaction_id (unknown)"
        );
    }
}
