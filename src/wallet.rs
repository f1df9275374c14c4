use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::{
    config::Config,
    core::{
        authorization::{AuthorizationOrchestrator, AuthorizedRequest, Client, Login},
        credential_offer::{CredentialOffer, CredentialOfferRequest},
        error::IssuanceError,
        issuance::{IssuanceOutcome, IssuanceStateMachine, TransactionId},
        metadata::{CredentialConfigurationId, HttpMetadataResolver},
        proof::BindingKey,
        util::AsyncHttpClient,
    },
};

#[async_trait]
pub trait Wallet: Login + Sync {
    type HttpClient: AsyncHttpClient + Send + Sync;

    fn config(&self) -> &Config;
    fn client(&self) -> &Client;
    fn http_client(&self) -> &Self::HttpClient;

    /// Parse a credential offer url and resolve the offer with the metadata
    /// of its issuer and authorization server.
    async fn resolve_offer(&self, url: &Url) -> Result<CredentialOffer, IssuanceError> {
        let request = CredentialOfferRequest::from_url(url)?;
        let resolver = HttpMetadataResolver::new(self.http_client());
        let offer = CredentialOffer::resolve(
            request,
            self.http_client(),
            &resolver,
            self.config().scope_preference,
        )
        .await?;
        info!(
            "resolved credential offer of {} ({} credential(s))",
            offer.credential_issuer,
            offer.credentials.len()
        );
        Ok(offer)
    }

    async fn authorize(&self, offer: &CredentialOffer) -> Result<AuthorizedRequest, IssuanceError> {
        AuthorizationOrchestrator::new(self.http_client(), self, self.client(), self.config())
            .authorize(offer)
            .await
    }

    async fn authorize_with_pre_authorized_code(
        &self,
        offer: &CredentialOffer,
        tx_code: Option<&str>,
    ) -> Result<AuthorizedRequest, IssuanceError> {
        AuthorizationOrchestrator::new(self.http_client(), self, self.client(), self.config())
            .authorize_with_pre_authorized_code(offer, tx_code)
            .await
    }

    async fn request_credential(
        &self,
        offer: &CredentialOffer,
        authorized: AuthorizedRequest,
        credential: &CredentialConfigurationId,
        binding_key: Option<&BindingKey>,
    ) -> Result<IssuanceOutcome, IssuanceError> {
        IssuanceStateMachine::new(
            self.http_client(),
            &offer.issuer_metadata,
            Some(self.client().id()),
        )
        .submit(authorized, credential, binding_key)
        .await
    }

    async fn poll_deferred(
        &self,
        offer: &CredentialOffer,
        authorized: AuthorizedRequest,
        transaction_id: &TransactionId,
    ) -> Result<IssuanceOutcome, IssuanceError> {
        IssuanceStateMachine::new(
            self.http_client(),
            &offer.issuer_metadata,
            Some(self.client().id()),
        )
        .poll_deferred(authorized, transaction_id)
        .await
    }
}
