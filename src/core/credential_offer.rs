use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{config::ScopePreference, utils::NonEmptyVec};

use super::{
    error::IssuanceError,
    metadata::{
        AuthorizationServerMetadata, CredentialConfiguration, CredentialConfigurationId,
        CredentialIssuerMetadata, MetadataResolver,
    },
    transport::execute,
    util::{base_request, AsyncHttpClient},
};

pub const PRE_AUTHORIZED_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

/// A Credential Offer as sent by a credential issuer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialOfferObject {
    pub credential_issuer: Url,
    pub credential_configuration_ids: Vec<CredentialConfigurationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grants>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<Url>,
}

/// Describes the transaction code the user must enter for a pre-authorized grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TxCode {
    pub fn check(&self, tx_code: &str) -> Result<(), IssuanceError> {
        if let Some(length) = self.length {
            if tx_code.chars().count() != length {
                return Err(IssuanceError::validation(format!(
                    "transaction code must be {length} characters long"
                )));
            }
        }
        if self.input_mode.as_deref().unwrap_or("numeric") == "numeric"
            && !tx_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(IssuanceError::validation("transaction code must be numeric"));
        }
        Ok(())
    }
}

/// A Credential Offer, passed by value or by reference.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialOfferRequest {
    ByValue(CredentialOfferObject),
    ByReference(Url),
}

#[derive(Deserialize)]
struct CredentialOfferParams {
    credential_offer: Option<String>,
    credential_offer_uri: Option<Url>,
}

impl CredentialOfferRequest {
    /// Parse a credential offer url (`openid-credential-offer://?credential_offer=...`).
    /// ```
    /// # use openid4vci::core::credential_offer::CredentialOfferRequest;
    /// # use url::Url;
    /// let url: Url = "openid-credential-offer://?credential_offer_uri=https%3A%2F%2Fissuer.example.com%2Foffer%2F1"
    ///     .parse()
    ///     .unwrap();
    ///
    /// let request = CredentialOfferRequest::from_url(&url).unwrap();
    ///
    /// assert_eq!(
    ///     request,
    ///     CredentialOfferRequest::ByReference("https://issuer.example.com/offer/1".parse().unwrap())
    /// );
    /// ```
    pub fn from_url(url: &Url) -> Result<Self, IssuanceError> {
        let query = url
            .query()
            .ok_or_else(|| IssuanceError::validation("credential offer url has no query"))?;
        let params: CredentialOfferParams = serde_urlencoded::from_str(query).map_err(|e| {
            IssuanceError::validation(format!("unable to parse credential offer url: {e}"))
        })?;
        match (params.credential_offer, params.credential_offer_uri) {
            (Some(offer), None) => serde_json::from_str(&offer).map(Self::ByValue).map_err(|e| {
                IssuanceError::validation(format!("credential_offer is not a valid offer: {e}"))
            }),
            (None, Some(uri)) => Ok(Self::ByReference(uri)),
            (Some(_), Some(_)) => Err(IssuanceError::validation(
                "credential offer url has both credential_offer and credential_offer_uri",
            )),
            (None, None) => Err(IssuanceError::validation(
                "credential offer url has neither credential_offer nor credential_offer_uri",
            )),
        }
    }
}

/// A requested credential, as named in the authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedCredential {
    Scope {
        scope: String,
        configuration_id: CredentialConfigurationId,
    },
    ConfigurationId(CredentialConfigurationId),
}

impl RequestedCredential {
    pub fn configuration_id(&self) -> &CredentialConfigurationId {
        match self {
            RequestedCredential::Scope {
                configuration_id, ..
            } => configuration_id,
            RequestedCredential::ConfigurationId(id) => id,
        }
    }
}

/// A resolved Credential Offer: the offer together with the metadata needed
/// to act on it.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialOffer {
    pub credential_issuer: Url,
    pub issuer_metadata: CredentialIssuerMetadata,
    pub authorization_server_metadata: AuthorizationServerMetadata,
    pub credentials: NonEmptyVec<RequestedCredential>,
    pub grants: Option<Grants>,
}

impl CredentialOffer {
    /// Fetch (when by reference) and resolve a credential offer.
    pub async fn resolve<C, R>(
        request: CredentialOfferRequest,
        http_client: &C,
        resolver: &R,
        scope_preference: ScopePreference,
    ) -> Result<Self, IssuanceError>
    where
        C: AsyncHttpClient + Sync + ?Sized,
        R: MetadataResolver + Sync + ?Sized,
    {
        let offer = match request {
            CredentialOfferRequest::ByValue(offer) => offer,
            CredentialOfferRequest::ByReference(url) => {
                debug!("fetching credential offer from {url}");
                let request = base_request()
                    .method("GET")
                    .uri(url.as_str())
                    .body(vec![])
                    .map_err(|e| IssuanceError::validation(format!("invalid offer uri: {e}")))?;
                execute(http_client, request).await?
            }
        };

        let issuer_metadata = resolver
            .resolve_issuer_metadata(&offer.credential_issuer)
            .await
            .map_err(|e| {
                IssuanceError::validation(format!("unable to resolve issuer metadata: {e:#}"))
            })?
            .ok_or_else(|| {
                IssuanceError::validation(format!(
                    "credential issuer {} publishes no metadata",
                    offer.credential_issuer
                ))
            })?;

        let authorization_server = authorization_server(&offer, &issuer_metadata)?;
        let authorization_server_metadata = resolver
            .resolve_authorization_server_metadata(&authorization_server)
            .await
            .map_err(|e| {
                IssuanceError::validation(format!(
                    "unable to resolve authorization server metadata: {e:#}"
                ))
            })?;

        Self::from_parts(
            offer,
            issuer_metadata,
            authorization_server_metadata,
            scope_preference,
        )
    }

    /// Validate an offer against already resolved metadata.
    pub fn from_parts(
        offer: CredentialOfferObject,
        issuer_metadata: CredentialIssuerMetadata,
        authorization_server_metadata: AuthorizationServerMetadata,
        scope_preference: ScopePreference,
    ) -> Result<Self, IssuanceError> {
        let credentials = offer
            .credential_configuration_ids
            .iter()
            .map(|id| {
                let configuration = issuer_metadata.credential_configuration(id).ok_or_else(|| {
                    IssuanceError::validation(format!(
                        "offered credential configuration '{id}' is not supported by the issuer"
                    ))
                })?;
                Ok(match (&configuration.scope, scope_preference) {
                    (Some(scope), ScopePreference::PreferScope) => RequestedCredential::Scope {
                        scope: scope.clone(),
                        configuration_id: id.clone(),
                    },
                    _ => RequestedCredential::ConfigurationId(id.clone()),
                })
            })
            .collect::<Result<Vec<_>, IssuanceError>>()?;

        let credentials = NonEmptyVec::maybe_new(credentials)
            .ok_or_else(|| IssuanceError::validation("credential offer offers no credentials"))?;

        Ok(Self {
            credential_issuer: offer.credential_issuer,
            issuer_metadata,
            authorization_server_metadata,
            credentials,
            grants: offer.grants,
        })
    }

    pub fn credential_configuration(
        &self,
        id: &CredentialConfigurationId,
    ) -> Result<&CredentialConfiguration, IssuanceError> {
        self.issuer_metadata
            .credential_configuration(id)
            .ok_or_else(|| {
                IssuanceError::validation(format!("unknown credential configuration '{id}'"))
            })
    }

    pub fn issuer_state(&self) -> Option<&str> {
        self.grants
            .as_ref()?
            .authorization_code
            .as_ref()?
            .issuer_state
            .as_deref()
    }

    pub fn pre_authorized_code_grant(&self) -> Option<&PreAuthorizedCodeGrant> {
        self.grants.as_ref()?.pre_authorized_code.as_ref()
    }
}

/// The offer's grant may pin an authorization server, which must be one the
/// issuer lists. Without any, the issuer acts as its own authorization server.
fn authorization_server(
    offer: &CredentialOfferObject,
    issuer_metadata: &CredentialIssuerMetadata,
) -> Result<Url, IssuanceError> {
    let pinned = offer.grants.as_ref().and_then(|g| {
        g.authorization_code
            .as_ref()
            .and_then(|a| a.authorization_server.clone())
            .or_else(|| {
                g.pre_authorized_code
                    .as_ref()
                    .and_then(|p| p.authorization_server.clone())
            })
    });

    match pinned {
        Some(server) if issuer_metadata.authorization_servers.contains(&server) => Ok(server),
        Some(server) => Err(IssuanceError::validation(format!(
            "offer names authorization server {server} which the issuer does not list"
        ))),
        None => Ok(issuer_metadata
            .authorization_servers
            .first()
            .cloned()
            .unwrap_or_else(|| issuer_metadata.credential_issuer.clone())),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn issuer_metadata() -> CredentialIssuerMetadata {
        serde_json::from_value(json!({
            "credential_issuer": "https://issuer.example.com",
            "authorization_servers": ["https://as.example.com", "https://as2.example.com"],
            "credential_endpoint": "https://issuer.example.com/credential",
            "credential_configurations_supported": {
                "pid_sd_jwt": {
                    "format": "dc+sd-jwt",
                    "scope": "pid",
                    "vct": "urn:eu.europa.ec.eudi:pid:1"
                },
                "mdl": {
                    "format": "mso_mdoc",
                    "doctype": "org.iso.18013.5.1.mDL"
                }
            }
        }))
        .unwrap()
    }

    fn as_metadata() -> AuthorizationServerMetadata {
        AuthorizationServerMetadata::OAuth(
            serde_json::from_value(json!({
                "issuer": "https://as.example.com",
                "token_endpoint": "https://as.example.com/token",
            }))
            .unwrap(),
        )
    }

    fn offer(ids: &[&str], grants: serde_json::Value) -> CredentialOfferObject {
        serde_json::from_value(json!({
            "credential_issuer": "https://issuer.example.com",
            "credential_configuration_ids": ids,
            "grants": grants,
        }))
        .unwrap()
    }

    #[test]
    fn offer_by_value() {
        let url = Url::parse_with_params(
            "openid-credential-offer://",
            &[(
                "credential_offer",
                json!({
                    "credential_issuer": "https://issuer.example.com",
                    "credential_configuration_ids": ["pid_sd_jwt"],
                    "grants": {
                        "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                            "pre-authorized_code": "adhjhdjajkdkhjhdj",
                            "tx_code": {"length": 4, "input_mode": "numeric"}
                        }
                    }
                })
                .to_string(),
            )],
        )
        .unwrap();

        let CredentialOfferRequest::ByValue(offer) = CredentialOfferRequest::from_url(&url).unwrap()
        else {
            panic!("expected an offer by value")
        };
        let grant = offer.grants.unwrap().pre_authorized_code.unwrap();
        assert_eq!(grant.pre_authorized_code, "adhjhdjajkdkhjhdj");
        assert_eq!(grant.tx_code.unwrap().length, Some(4));
    }

    #[test]
    fn offer_url_without_offer() {
        let url: Url = "openid-credential-offer://?foo=bar".parse().unwrap();
        assert!(matches!(
            CredentialOfferRequest::from_url(&url),
            Err(IssuanceError::Validation(_))
        ));
    }

    #[test]
    fn requested_credentials_follow_scope_preference() {
        let resolved = CredentialOffer::from_parts(
            offer(&["pid_sd_jwt", "mdl"], json!({})),
            issuer_metadata(),
            as_metadata(),
            ScopePreference::PreferScope,
        )
        .unwrap();
        assert_eq!(
            resolved.credentials.to_vec(),
            vec![
                RequestedCredential::Scope {
                    scope: "pid".into(),
                    configuration_id: "pid_sd_jwt".into()
                },
                RequestedCredential::ConfigurationId("mdl".into()),
            ]
        );

        let resolved = CredentialOffer::from_parts(
            offer(&["pid_sd_jwt"], json!({})),
            issuer_metadata(),
            as_metadata(),
            ScopePreference::AuthorizationDetails,
        )
        .unwrap();
        assert_eq!(
            resolved.credentials.first(),
            &RequestedCredential::ConfigurationId("pid_sd_jwt".into())
        );
    }

    #[test]
    fn unknown_or_empty_offers_are_rejected() {
        for ids in [&["unknown"][..], &[][..]] {
            let err = CredentialOffer::from_parts(
                offer(ids, json!({})),
                issuer_metadata(),
                as_metadata(),
                ScopePreference::PreferScope,
            )
            .unwrap_err();
            assert!(matches!(err, IssuanceError::Validation(_)));
        }
    }

    #[test]
    fn authorization_server_selection() {
        let metadata = issuer_metadata();
        let default = authorization_server(&offer(&["mdl"], json!({})), &metadata).unwrap();
        assert_eq!(default.as_str(), "https://as.example.com/");

        let pinned = offer(
            &["mdl"],
            json!({"authorization_code": {"authorization_server": "https://as2.example.com"}}),
        );
        assert_eq!(
            authorization_server(&pinned, &metadata).unwrap().as_str(),
            "https://as2.example.com/"
        );

        let foreign = offer(
            &["mdl"],
            json!({"authorization_code": {"authorization_server": "https://evil.example.com"}}),
        );
        assert!(authorization_server(&foreign, &metadata).is_err());
    }

    #[test]
    fn tx_code_check() {
        let tx_code = TxCode {
            input_mode: None,
            length: Some(4),
            description: None,
        };
        tx_code.check("1234").unwrap();
        assert!(tx_code.check("123").is_err());
        assert!(tx_code.check("12a4").is_err());

        let text = TxCode {
            input_mode: Some("text".into()),
            ..Default::default()
        };
        text.check("abc-1").unwrap();
    }
}
