#![allow(dead_code)]

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use http::{HeaderMap, Request, Response};
use openid4vci::{
    config::{Config, ScopePreference},
    core::{
        authorization::{AuthorizationCode, Client, Login},
        credential_offer::{CredentialOffer, CredentialOfferObject},
        metadata::{AuthorizationServerMetadata, CredentialIssuerMetadata},
        proof::P256Signer,
        util::AsyncHttpClient,
    },
    wallet::Wallet,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as Json};
use url::Url;

pub const AUTHORIZATION_CODE: &str = "SplxlOBeZQQYbYS6WxSbIA";

/// A request the wallet sent.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn form(&self) -> BTreeMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }

    pub fn json(&self) -> Json {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Replays queued responses in order, checking each request goes to the
/// expected path.
#[derive(Default)]
pub struct MockHttpClient {
    queue: Mutex<VecDeque<(&'static str, Response<Vec<u8>>)>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockHttpClient {
    pub fn respond(&self, path: &'static str, status: u16, body: Json) -> &Self {
        let response = Response::builder()
            .status(status)
            .body(serde_json::to_vec(&body).unwrap())
            .unwrap();
        self.respond_with(path, response)
    }

    pub fn respond_with(&self, path: &'static str, response: Response<Vec<u8>>) -> &Self {
        self.queue.lock().unwrap().push_back((path, response));
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[async_trait]
impl AsyncHttpClient for MockHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let url: Url = request
            .uri()
            .to_string()
            .parse()
            .context("request uri is not a url")?;
        let (expected, response) = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .context(format!("unexpected request to {url}"))?;
        if url.path() != expected {
            bail!("expected a request to {expected}, got {url}")
        }

        let (parts, body) = request.into_parts();
        self.requests.lock().unwrap().push(Recorded {
            method: parts.method.to_string(),
            url,
            headers: parts.headers,
            body,
        });
        Ok(response)
    }
}

pub struct TestWallet {
    pub config: Config,
    pub client: Client,
    pub http_client: MockHttpClient,
    pub login_urls: Mutex<Vec<Url>>,
}

impl TestWallet {
    pub fn new(config: Config, client: Client) -> Self {
        Self {
            config,
            client,
            http_client: MockHttpClient::default(),
            login_urls: Mutex::default(),
        }
    }

    pub fn public() -> Self {
        Self::new(
            Config::new("eudi-wallet://authorize".parse().unwrap()),
            Client::Public {
                id: "wallet-dev".into(),
            },
        )
    }

    pub fn login_url(&self) -> Url {
        self.login_urls.lock().unwrap()[0].clone()
    }
}

#[async_trait]
impl Wallet for TestWallet {
    type HttpClient = MockHttpClient;

    fn config(&self) -> &Config {
        &self.config
    }

    fn client(&self) -> &Client {
        &self.client
    }

    fn http_client(&self) -> &Self::HttpClient {
        &self.http_client
    }
}

#[async_trait]
impl Login for TestWallet {
    async fn authorization_code(&self, url: Url, state: &str) -> Result<AuthorizationCode> {
        self.login_urls.lock().unwrap().push(url);
        let redirect = Url::parse_with_params(
            "eudi-wallet://authorize",
            &[("code", AUTHORIZATION_CODE), ("state", state)],
        )?;
        AuthorizationCode::from_redirect(&redirect, Some(state))
    }
}

pub fn parse<T: DeserializeOwned>(value: Json) -> T {
    serde_path_to_error::deserialize(value).unwrap()
}

pub fn issuer_metadata() -> CredentialIssuerMetadata {
    parse(issuer_metadata_json())
}

pub fn issuer_metadata_json() -> Json {
    json!({
        "credential_issuer": "https://issuer.example.com",
        "authorization_servers": ["https://as.example.com"],
        "credential_endpoint": "https://issuer.example.com/credential",
        "deferred_credential_endpoint": "https://issuer.example.com/deferred",
        "credential_configurations_supported": {
            "pid_sd_jwt": {
                "format": "dc+sd-jwt",
                "scope": "pid",
                "vct": "urn:eu.europa.ec.eudi:pid:1",
                "cryptographic_binding_methods_supported": ["jwk"],
                "proof_types_supported": {
                    "jwt": { "proof_signing_alg_values_supported": ["ES256"] }
                }
            },
            "mdl": {
                "format": "mso_mdoc",
                "doctype": "org.iso.18013.5.1.mDL",
                "proof_types_supported": {
                    "jwt": { "proof_signing_alg_values_supported": ["EdDSA"] }
                }
            }
        }
    })
}

pub fn authorization_server(with_par: bool) -> AuthorizationServerMetadata {
    AuthorizationServerMetadata::OAuth(parse(authorization_server_json(with_par)))
}

pub fn authorization_server_json(with_par: bool) -> Json {
    let mut metadata = json!({
        "issuer": "https://as.example.com",
        "authorization_endpoint": "https://as.example.com/authorize",
        "token_endpoint": "https://as.example.com/token",
    });
    if with_par {
        metadata["pushed_authorization_request_endpoint"] = json!("https://as.example.com/par");
    }
    metadata
}

pub fn offer(grants: Json, with_par: bool) -> CredentialOffer {
    let offer: CredentialOfferObject = parse(json!({
        "credential_issuer": "https://issuer.example.com",
        "credential_configuration_ids": ["pid_sd_jwt"],
        "grants": grants,
    }));
    CredentialOffer::from_parts(
        offer,
        issuer_metadata(),
        authorization_server(with_par),
        ScopePreference::PreferScope,
    )
    .unwrap()
}

pub fn signer() -> Arc<P256Signer> {
    let key = p256::SecretKey::random(&mut rand::thread_rng());
    Arc::new(P256Signer::new(key.into()).unwrap())
}
