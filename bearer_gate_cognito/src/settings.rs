use std::time::Duration;

use bearer_gate::{AllowList, Authorizer, AuthorizerConfig};
use clap::{ArgAction, Parser};
use thiserror::Error;

use crate::{CognitoUserAttributes, UserPool};

/// Indicates that the settings cannot produce a working authorizer
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A required setting was present but empty
    #[error("{name} must not be empty")]
    Empty {
        /// The environment variable holding the setting
        name: &'static str,
    },
    /// The HTTP client could not be constructed
    #[error("unable to construct HTTP client")]
    HttpClient(#[from] reqwest::Error),
}

/// Settings for an authorizer in front of a Cognito user pool
///
/// Every setting may be given on the command line or through the
/// environment variable named in its help text.
#[derive(Clone, Debug, Parser)]
#[command(about = "Authorizes bearer tokens issued by a Cognito user pool")]
pub struct Settings {
    /// The region hosting the user pool
    #[arg(long, env = "AWS_REGION")]
    pub region: String,

    /// The ID of the user pool
    #[arg(long, env = "AWS_USER_POOL")]
    pub user_pool: String,

    /// Comma-separated IDs of the app clients whose tokens are accepted
    #[arg(long, env = "AWS_CLIENT_ID", default_value = "")]
    pub client_ids: AllowList,

    /// Comma-separated OAuth2 scopes that grant access
    #[arg(long, env = "ALLOWED_SCOPES", default_value = "")]
    pub allowed_scopes: AllowList,

    /// Comma-separated user roles that grant access
    #[arg(long, env = "ALLOWED_ROLES", default_value = "")]
    pub allowed_roles: AllowList,

    /// Seconds a fetched key set is used before it is fetched again; 0 keeps
    /// it until a token names an unknown key
    #[arg(long, env = "JWKS_CACHE_TTL_SECS", default_value_t = 3600)]
    pub jwks_cache_ttl_secs: u64,

    /// Time limit on calls to Cognito, in milliseconds
    #[arg(long, env = "HTTP_TIMEOUT_MS", default_value_t = 5000)]
    pub http_timeout_ms: u64,

    /// Allowance for clock skew when checking token lifetimes, in seconds
    #[arg(long, env = "TOKEN_LEEWAY_SECS", default_value_t = 0)]
    pub token_leeway_secs: u64,

    /// Whether tokens must name the user pool as their issuer
    #[arg(long, env = "VERIFY_ISSUER", default_value_t = true, action = ArgAction::Set)]
    pub verify_issuer: bool,
}

impl Settings {
    /// The configured user pool
    ///
    /// # Errors
    ///
    /// Returns an error if the region or pool ID is empty.
    pub fn user_pool(&self) -> Result<UserPool, SettingsError> {
        if self.region.trim().is_empty() {
            return Err(SettingsError::Empty { name: "AWS_REGION" });
        }
        if self.user_pool.trim().is_empty() {
            return Err(SettingsError::Empty {
                name: "AWS_USER_POOL",
            });
        }

        Ok(UserPool::new(self.region.trim(), self.user_pool.trim()))
    }

    /// The authorizer configuration for the user pool
    ///
    /// # Errors
    ///
    /// Returns an error if the region or pool ID is empty.
    pub fn authorizer_config(&self) -> Result<AuthorizerConfig, SettingsError> {
        let pool = self.user_pool()?;
        let max_age = match self.jwks_cache_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let config = AuthorizerConfig::new(pool.jwks_url())
            .with_clients(self.client_ids.clone())
            .with_scopes(self.allowed_scopes.clone())
            .with_roles(self.allowed_roles.clone())
            .with_jwks_max_age(max_age)
            .with_timeout(Duration::from_millis(self.http_timeout_ms))
            .with_leeway(Duration::from_secs(self.token_leeway_secs));

        Ok(if self.verify_issuer {
            config.require_issuer(pool.issuer())
        } else {
            config
        })
    }

    /// Builds an authorizer that looks up user roles in the user pool
    ///
    /// The key set and user lookups share a single HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are incomplete or the HTTP client
    /// cannot be constructed.
    pub fn into_authorizer(self) -> Result<Authorizer<CognitoUserAttributes>, SettingsError> {
        let pool = self.user_pool()?;
        let config = self.authorizer_config()?;
        let client = config.http_client()?;

        if config_is_closed(&self) {
            tracing::warn!("allow lists permit nothing; every request will be denied");
        }

        let lookup = CognitoUserAttributes::new(client.clone(), &pool);
        Ok(Authorizer::from_config_with_client(&config, client, lookup))
    }
}

fn config_is_closed(settings: &Settings) -> bool {
    settings.client_ids.is_empty()
        || (settings.allowed_scopes.is_empty() && settings.allowed_roles.is_empty())
}
