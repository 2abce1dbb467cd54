use std::time::Duration;

use aliri::jwt::Issuer;
use reqwest::Client;

use crate::{
    AllowList, AuthorizationPolicy, KeyResolver, TokenVerifier, DEFAULT_GROUP_CLAIM,
    DEFAULT_ROLES_ATTRIBUTE,
};

/// Everything needed to assemble an [`Authorizer`][crate::Authorizer]
///
/// All allow lists start out empty, which denies every request until they
/// are populated.
#[derive(Clone, Debug)]
#[must_use]
pub struct AuthorizerConfig {
    jwks_url: String,
    clients: AllowList,
    scopes: AllowList,
    roles: AllowList,
    issuer: Option<Issuer>,
    leeway: Duration,
    jwks_max_age: Option<Duration>,
    timeout: Duration,
    connect_timeout: Duration,
    group_claim: String,
    roles_attribute: String,
}

impl AuthorizerConfig {
    /// The default maximum age of a cached key set
    pub const DEFAULT_JWKS_MAX_AGE: Duration = Duration::from_secs(3600);

    /// The default time limit on a remote call
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// The default time limit on establishing a connection
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Starts a configuration that trusts keys published at the given URL
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            clients: AllowList::empty(),
            scopes: AllowList::empty(),
            roles: AllowList::empty(),
            issuer: None,
            leeway: Duration::ZERO,
            jwks_max_age: Some(Self::DEFAULT_JWKS_MAX_AGE),
            timeout: Self::DEFAULT_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            group_claim: DEFAULT_GROUP_CLAIM.to_owned(),
            roles_attribute: DEFAULT_ROLES_ATTRIBUTE.to_owned(),
        }
    }

    /// Sets the clients whose tokens are accepted
    pub fn with_clients(self, clients: AllowList) -> Self {
        Self { clients, ..self }
    }

    /// Sets the scopes that grant access
    pub fn with_scopes(self, scopes: AllowList) -> Self {
        Self { scopes, ..self }
    }

    /// Sets the roles that grant access
    pub fn with_roles(self, roles: AllowList) -> Self {
        Self { roles, ..self }
    }

    /// Requires tokens to be issued by the given issuer
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            issuer: Some(issuer),
            ..self
        }
    }

    /// Allows for clock skew when checking `exp` and `nbf`
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Sets how long a fetched key set is used before it is fetched again
    ///
    /// `None` keeps a key set until a token names a key it does not contain.
    pub fn with_jwks_max_age(self, max_age: Option<Duration>) -> Self {
        Self {
            jwks_max_age: max_age,
            ..self
        }
    }

    /// Sets the time limit on each remote call
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Sets the time limit on establishing a connection
    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    /// Sets the claim that marks a user token
    pub fn with_group_claim(self, claim: impl Into<String>) -> Self {
        Self {
            group_claim: claim.into(),
            ..self
        }
    }

    /// Sets the user attribute that carries the user's roles
    pub fn with_roles_attribute(self, attribute: impl Into<String>) -> Self {
        Self {
            roles_attribute: attribute.into(),
            ..self
        }
    }

    /// The URL of the trusted key set
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Builds an HTTP client honouring the configured timeouts
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .user_agent(concat!("bearer_gate/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()
    }

    /// Builds a key resolver fetching the key set with the given client
    pub fn key_resolver(&self, client: Client) -> KeyResolver {
        KeyResolver::from_url(self.jwks_url.clone(), client, self.jwks_max_age)
    }

    /// Builds a token verifier drawing keys from the given resolver
    pub fn token_verifier(&self, keys: KeyResolver) -> TokenVerifier {
        let verifier = TokenVerifier::new(keys, self.clients.clone()).with_leeway(self.leeway);

        match &self.issuer {
            Some(issuer) => verifier.require_issuer(issuer.clone()),
            None => verifier,
        }
    }

    /// Builds the authorization policy
    pub fn policy(&self) -> AuthorizationPolicy {
        AuthorizationPolicy::new(self.scopes.clone(), self.roles.clone())
            .with_group_claim(self.group_claim.clone())
            .with_roles_attribute(self.roles_attribute.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AuthorizerConfig::new("https://idp.test/jwks.json");

        assert_eq!(config.jwks_url(), "https://idp.test/jwks.json");
        assert_eq!(config.jwks_max_age, Some(Duration::from_secs(3600)));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert!(config.clients.is_empty());
        assert!(config.issuer.is_none());
    }

    #[test]
    fn policy_carries_configured_names() {
        let policy = AuthorizerConfig::new("https://idp.test/jwks.json")
            .with_scopes("read".parse().unwrap())
            .with_roles("admin,editor".parse().unwrap())
            .policy();

        assert!(policy.scopes().contains("read"));
        assert_eq!(policy.roles().len(), 2);
    }

    #[tokio::test]
    async fn resolver_points_at_configured_url() -> color_eyre::Result<()> {
        let config = AuthorizerConfig::new("https://idp.test/jwks.json");

        let resolver = config.key_resolver(config.http_client()?);

        assert_eq!(resolver.jwks_url(), Some("https://idp.test/jwks.json"));
        Ok(())
    }
}
