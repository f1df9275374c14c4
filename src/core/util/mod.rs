use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use http::{
    header::{ACCEPT, CONTENT_TYPE},
    Request, Response,
};

/// Generic HTTP client.
///
/// Implementations are shared by concurrent issuance attempts, so they must
/// not keep per-request state on `self`.
#[async_trait]
pub trait AsyncHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header(ACCEPT, "application/json")
}

pub(crate) fn form_request() -> http::request::Builder {
    base_request()
        .method("POST")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
}

pub(crate) fn json_request() -> http::request::Builder {
    base_request()
        .method("POST")
        .header(CONTENT_TYPE, "application/json")
}

#[derive(Debug, Clone)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            // Authorization codes are captured by the login collaborator, never by following
            // redirects here.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}
