use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use http::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::core::{
    transport::classify,
    util::{base_request, AsyncHttpClient},
};

use super::{
    AuthorizationServerMetadata, CredentialIssuerMetadata, OAuthServerMetadata,
    OidcProviderMetadata,
};

const CREDENTIAL_ISSUER_WELL_KNOWN: &str = "openid-credential-issuer";
const OAUTH_SERVER_WELL_KNOWN: &str = "oauth-authorization-server";
const OPENID_CONFIGURATION: &str = ".well-known/openid-configuration";

/// Discovery of issuer and authorization server metadata.
#[async_trait]
pub trait MetadataResolver {
    /// Resolve the metadata of `credential_issuer`, or `None` when it publishes none.
    async fn resolve_issuer_metadata(
        &self,
        credential_issuer: &Url,
    ) -> Result<Option<CredentialIssuerMetadata>>;

    async fn resolve_authorization_server_metadata(
        &self,
        issuer: &Url,
    ) -> Result<AuthorizationServerMetadata>;
}

/// [MetadataResolver] using the well-known locations of OID4VCI, RFC 8414 and
/// OpenID Connect Discovery.
#[derive(Debug)]
pub struct HttpMetadataResolver<'a, C: ?Sized> {
    http_client: &'a C,
}

impl<'a, C: AsyncHttpClient + Sync + ?Sized> HttpMetadataResolver<'a, C> {
    pub fn new(http_client: &'a C) -> Self {
        Self { http_client }
    }

    async fn get<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>> {
        let request = base_request()
            .method("GET")
            .uri(url.as_str())
            .body(vec![])
            .context("failed to build metadata request")?;
        let response = self
            .http_client
            .execute(request)
            .await
            .context(format!("failed to fetch metadata at {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        classify(response)
            .map(Some)
            .context(format!("failed to parse metadata at {url}"))
    }
}

#[async_trait]
impl<C: AsyncHttpClient + Sync + ?Sized> MetadataResolver for HttpMetadataResolver<'_, C> {
    async fn resolve_issuer_metadata(
        &self,
        credential_issuer: &Url,
    ) -> Result<Option<CredentialIssuerMetadata>> {
        let url = well_known(credential_issuer, CREDENTIAL_ISSUER_WELL_KNOWN)?;
        let Some(metadata) = self.get::<CredentialIssuerMetadata>(&url).await? else {
            return Ok(None);
        };
        if !same_identifier(&metadata.credential_issuer, credential_issuer) {
            bail!(
                "credential issuer metadata is for '{}', expected '{credential_issuer}'",
                metadata.credential_issuer
            )
        }
        Ok(Some(metadata))
    }

    async fn resolve_authorization_server_metadata(
        &self,
        issuer: &Url,
    ) -> Result<AuthorizationServerMetadata> {
        let url = well_known(issuer, OAUTH_SERVER_WELL_KNOWN)?;
        let metadata = match self.get::<OAuthServerMetadata>(&url).await {
            Ok(Some(metadata)) => AuthorizationServerMetadata::OAuth(metadata),
            other => {
                if let Err(e) = other {
                    debug!("falling back to OpenID Connect discovery: {e:#}");
                }
                let url = openid_configuration(issuer)?;
                let metadata = self
                    .get::<OidcProviderMetadata>(&url)
                    .await?
                    .context(format!("no authorization server metadata found for {issuer}"))?;
                AuthorizationServerMetadata::Oidc(metadata)
            }
        };
        if !same_identifier(metadata.issuer(), issuer) {
            bail!(
                "authorization server metadata is for '{}', expected '{issuer}'",
                metadata.issuer()
            )
        }
        Ok(metadata)
    }
}

/// Insert `/.well-known/{suffix}` between the host and the path of `issuer`.
fn well_known(issuer: &Url, suffix: &str) -> Result<Url> {
    let path = issuer.path().trim_end_matches('/');
    let mut url = issuer.clone();
    url.set_path(&format!("/.well-known/{suffix}{path}"));
    url.set_query(None);
    Ok(url)
}

/// Append `/.well-known/openid-configuration` to the path of `issuer`.
fn openid_configuration(issuer: &Url) -> Result<Url> {
    let mut base = issuer.to_string();
    if !base.ends_with('/') {
        base += "/"
    }
    Url::parse(&base)?
        .join(OPENID_CONFIGURATION)
        .context("unable to build openid-configuration url")
}

fn same_identifier(a: &Url, b: &Url) -> bool {
    a.as_str().trim_end_matches('/') == b.as_str().trim_end_matches('/')
}
