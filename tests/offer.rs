use openid4vci::{
    core::{
        credential_offer::RequestedCredential,
        error::IssuanceError,
        metadata::{AuthorizationServerMetadata, HttpMetadataResolver, MetadataResolver},
    },
    wallet::Wallet,
};
use serde_json::{json, Value as Json};
use url::Url;

mod common;

use common::{authorization_server_json, issuer_metadata_json, MockHttpClient, TestWallet};

fn offer_json() -> Json {
    json!({
        "credential_issuer": "https://issuer.example.com",
        "credential_configuration_ids": ["pid_sd_jwt"],
        "grants": {"authorization_code": {"issuer_state": "eyJhbGciOiJSU0Et"}}
    })
}

fn offer_by_value() -> Url {
    Url::parse_with_params(
        "openid-credential-offer://",
        &[("credential_offer", offer_json().to_string())],
    )
    .unwrap()
}

fn oidc_configuration() -> Json {
    json!({
        "issuer": "https://as.example.com",
        "authorization_endpoint": "https://as.example.com/authorize",
        "token_endpoint": "https://as.example.com/token",
        "jwks_uri": "https://as.example.com/jwks",
    })
}

#[tokio::test]
async fn offer_by_reference_is_fetched_and_resolved() {
    let wallet = TestWallet::public();
    wallet
        .http_client
        .respond("/offer/1", 200, offer_json())
        .respond("/.well-known/openid-credential-issuer", 200, issuer_metadata_json())
        .respond(
            "/.well-known/oauth-authorization-server",
            200,
            authorization_server_json(true),
        );
    let url: Url =
        "openid-credential-offer://?credential_offer_uri=https%3A%2F%2Fissuer.example.com%2Foffer%2F1"
            .parse()
            .unwrap();

    let offer = wallet.resolve_offer(&url).await.unwrap();

    assert_eq!(offer.credential_issuer.as_str(), "https://issuer.example.com/");
    assert_eq!(offer.issuer_state(), Some("eyJhbGciOiJSU0Et"));
    assert_eq!(
        offer.credentials.first(),
        &RequestedCredential::Scope {
            scope: "pid".into(),
            configuration_id: "pid_sd_jwt".into()
        }
    );
    assert!(matches!(
        offer.authorization_server_metadata,
        AuthorizationServerMetadata::OAuth(_)
    ));

    let requests = wallet.http_client.requests();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_eq!(request.method, "GET");
        assert_eq!(request.header("accept"), Some("application/json"));
    }
}

#[tokio::test]
async fn issuer_without_metadata_is_rejected() {
    let wallet = TestWallet::public();
    wallet
        .http_client
        .respond("/.well-known/openid-credential-issuer", 404, json!({}));

    let err = wallet.resolve_offer(&offer_by_value()).await.unwrap_err();

    let IssuanceError::Validation(reason) = err else {
        panic!("expected a validation error, got {err:?}")
    };
    assert!(reason.contains("publishes no metadata"), "{reason}");
    assert_eq!(wallet.http_client.pending(), 0);
}

#[tokio::test]
async fn missing_issuer_metadata_resolves_to_none() {
    let client = MockHttpClient::default();
    client.respond("/.well-known/openid-credential-issuer", 404, json!({}));

    let metadata = HttpMetadataResolver::new(&client)
        .resolve_issuer_metadata(&"https://issuer.example.com".parse().unwrap())
        .await
        .unwrap();

    assert!(metadata.is_none());
}

#[tokio::test]
async fn issuer_metadata_for_another_issuer_is_rejected() {
    let client = MockHttpClient::default();
    let mut metadata = issuer_metadata_json();
    metadata["credential_issuer"] = json!("https://other.example.com");
    client.respond("/.well-known/openid-credential-issuer", 200, metadata);

    let err = HttpMetadataResolver::new(&client)
        .resolve_issuer_metadata(&"https://issuer.example.com".parse().unwrap())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("https://other.example.com"), "{err}");
}

#[tokio::test]
async fn oauth_discovery_falls_back_to_openid_configuration() {
    let client = MockHttpClient::default();
    client
        .respond("/.well-known/oauth-authorization-server", 404, json!({}))
        .respond("/.well-known/openid-configuration", 200, oidc_configuration());

    let metadata = HttpMetadataResolver::new(&client)
        .resolve_authorization_server_metadata(&"https://as.example.com".parse().unwrap())
        .await
        .unwrap();

    let AuthorizationServerMetadata::Oidc(oidc) = &metadata else {
        panic!("expected openid configuration, got {metadata:?}")
    };
    assert_eq!(oidc.jwks_uri.as_str(), "https://as.example.com/jwks");
    assert_eq!(
        metadata.token_endpoint().as_str(),
        "https://as.example.com/token"
    );
    assert_eq!(client.requests().len(), 2);
}

#[tokio::test]
async fn authorization_server_metadata_for_another_issuer_is_rejected() {
    let client = MockHttpClient::default();
    let mut metadata = authorization_server_json(false);
    metadata["issuer"] = json!("https://evil.example.com");
    client.respond("/.well-known/oauth-authorization-server", 200, metadata);

    let err = HttpMetadataResolver::new(&client)
        .resolve_authorization_server_metadata(&"https://as.example.com".parse().unwrap())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("https://evil.example.com"), "{err}");
}
