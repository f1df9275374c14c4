use serde::Deserialize;
use url::Url;

/// Wallet-wide issuance settings.
/// ```
/// # use openid4vci::config::{Config, ParUsage, ScopePreference};
/// let config: Config = serde_json::from_str(r#"{
///     "redirect_uri": "eudi-wallet://authorize",
///     "par_usage": "required"
/// }"#).unwrap();
///
/// assert_eq!(config.par_usage, ParUsage::Required);
/// assert_eq!(config.scope_preference, ScopePreference::PreferScope);
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where the authorization server sends the user back with the authorization code.
    pub redirect_uri: Url,
    #[serde(default)]
    pub par_usage: ParUsage,
    #[serde(default)]
    pub scope_preference: ScopePreference,
}

impl Config {
    pub fn new(redirect_uri: Url) -> Self {
        Self {
            redirect_uri,
            par_usage: ParUsage::default(),
            scope_preference: ScopePreference::default(),
        }
    }
}

/// When to use Pushed Authorization Requests.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParUsage {
    /// Push when the authorization server advertises a PAR endpoint.
    #[default]
    IfSupported,
    /// Fail authorization when the authorization server has no PAR endpoint.
    Required,
    /// Always send the authorization request through the user agent.
    Never,
}

/// How requested credentials are named in the authorization request.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopePreference {
    /// Use the configuration's `scope` when it has one, `authorization_details` otherwise.
    #[default]
    PreferScope,
    /// Always use `authorization_details`.
    AuthorizationDetails,
}
