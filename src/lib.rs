//! This library provides the wallet side of [OID4VCI 1.0].
//!
//! [OID4VCI 1.0]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
//!
//! # Wallet Usage
//!
//! Wallets can be implemented by using the [`Wallet`] trait:
//!
//! ```ignore
//! use openid4vci::wallet::Wallet;
//! use openid4vci::config::Config;
//! use openid4vci::core::authorization::{AuthorizationCode, Client, Login};
//! use openid4vci::core::issuance::IssuanceOutcome;
//! use openid4vci::core::proof::BindingKey;
//! use openid4vci::core::util::ReqwestClient;
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use url::Url;
//!
//! struct MyWallet {
//!     config: Config,
//!     client: Client,
//!     http_client: ReqwestClient,
//! }
//!
//! #[async_trait]
//! impl Wallet for MyWallet {
//!     type HttpClient = ReqwestClient;
//!
//!     fn config(&self) -> &Config {
//!         &self.config
//!     }
//!
//!     fn client(&self) -> &Client {
//!         &self.client
//!     }
//!
//!     fn http_client(&self) -> &Self::HttpClient {
//!         &self.http_client
//!     }
//! }
//!
//! // Drive the user through the authorization server's login page.
//! #[async_trait]
//! impl Login for MyWallet {
//!     async fn authorization_code(&self, url: Url, state: &str) -> Result<AuthorizationCode> {
//!         let redirect = open_browser_and_wait_for_redirect(url).await?;
//!         AuthorizationCode::from_redirect(&redirect, Some(state))
//!     }
//! }
//!
//! // Resolve the offer scanned from a QR code.
//! let offer = wallet.resolve_offer(&offer_url).await?;
//!
//! // Obtain an access token.
//! let authorized = wallet.authorize(&offer).await?;
//!
//! // Request the first offered credential, bound to the device key.
//! let binding_key = BindingKey::Jwk(device_signer);
//! let id = offer.credentials.first().configuration_id();
//! match wallet.request_credential(&offer, authorized, id, Some(&binding_key)).await? {
//!     IssuanceOutcome::Issued { credentials, .. } => store(credentials),
//!     IssuanceOutcome::Pending { authorized, transaction_id } => {
//!         schedule_poll(authorized, transaction_id)
//!     }
//! }
//! ```
//!
//! [`Wallet`]: crate::wallet::Wallet
//!
//! # Protocol Overview
//!
//! Here is a simplified overview of the OID4VCI protocol, referencing the
//! various types and methods implementing it.
//!
//! ## Credential Offer
//!
//! 1. *Issuer sends an offer*: The issuer hands the wallet a
//!    [`CredentialOfferRequest`], by value or by reference.
//! 2. *Wallet resolves the offer*: The wallet fetches the issuer and authorization
//!    server metadata and checks every offered credential configuration, producing
//!    a [`CredentialOffer`].
//!
//! [`CredentialOfferRequest`]: crate::core::credential_offer::CredentialOfferRequest
//! [`CredentialOffer`]: crate::core::credential_offer::CredentialOffer
//!
//! ## Authorization
//!
//! 3. *Authorization request*: The wallet pushes an authorization request (PAR) or
//!    builds an authorization url, and the user logs in through [`Login`].
//! 4. *Token request*: The authorization code, or the offer's pre-authorized code,
//!    is exchanged for an access token, yielding an [`AuthorizedRequest`].
//!
//! All the code related to authorization is located in the
//! [`core::authorization`] module.
//!
//! [`Login`]: crate::core::authorization::Login
//! [`AuthorizedRequest`]: crate::core::authorization::AuthorizedRequest
//! [`core::authorization`]: crate::core::authorization
//!
//! ## Credential Issuance
//!
//! 5. *Credential request*: The wallet requests the credential; when the issuer
//!    answers with a `c_nonce`, the request is repeated once with a proof of
//!    possession of the [`BindingKey`].
//! 6. *Deferred issuance*: An issuer that cannot issue right away returns a
//!    [`TransactionId`] the wallet polls later.
//!
//! All the code related to issuance is located in the [`core::issuance`] module.
//!
//! [`BindingKey`]: crate::core::proof::BindingKey
//! [`TransactionId`]: crate::core::issuance::TransactionId
//! [`core::issuance`]: crate::core::issuance

pub mod config;
pub mod core;
pub mod utils;
pub mod wallet;
