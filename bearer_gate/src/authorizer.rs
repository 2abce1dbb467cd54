use std::{any::Any, fmt, panic::AssertUnwindSafe, sync::Arc};

use ahash::AHashMap;
use aliri::Jwt;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    AuthorizationDecision, AuthorizationPolicy, AuthorizerConfig, Error, ErrorKind, TokenVerifier,
    UserAttributesLookup,
};

/// An inbound authorization request
///
/// Deserializes from an API gateway authorizer event, of which only the
/// `headers` are consumed. Header names are matched case-insensitively.
#[derive(Clone, Default, Deserialize)]
pub struct AuthorizerRequest {
    #[serde(default)]
    headers: AHashMap<String, String>,
}

impl AuthorizerRequest {
    /// A request without any headers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header to the request
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The value of the `authorization` header
    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
    }

    /// The bearer token carried by the `authorization` header
    #[must_use]
    pub fn bearer_token(&self) -> Option<Jwt> {
        self.authorization().and_then(extract_jwt)
    }
}

impl fmt::Debug for AuthorizerRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthorizerRequest")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn extract_jwt(auth: &str) -> Option<Jwt> {
    let (scheme, token) = auth.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(Jwt::from(token))
}

#[derive(Debug)]
struct Inner<L> {
    verifier: TokenVerifier,
    policy: AuthorizationPolicy,
    lookup: L,
}

/// Decides inbound requests, failing closed
///
/// The authorizer extracts the bearer token from a request, verifies it,
/// and evaluates the policy. Every error along the way, and any panic, is
/// logged and turned into a denial that carries no context.
#[derive(Debug)]
pub struct Authorizer<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for Authorizer<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L> Authorizer<L>
where
    L: UserAttributesLookup,
{
    /// Assembles an authorizer from its parts
    pub fn new(verifier: TokenVerifier, policy: AuthorizationPolicy, lookup: L) -> Self {
        Self {
            inner: Arc::new(Inner {
                verifier,
                policy,
                lookup,
            }),
        }
    }

    /// Assembles an authorizer from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &AuthorizerConfig, lookup: L) -> Result<Self, reqwest::Error> {
        Ok(Self::from_config_with_client(
            config,
            config.http_client()?,
            lookup,
        ))
    }

    /// Assembles an authorizer from configuration, fetching keys with the
    /// given HTTP client
    pub fn from_config_with_client(config: &AuthorizerConfig, client: Client, lookup: L) -> Self {
        let verifier = config.token_verifier(config.key_resolver(client));
        Self::new(verifier, config.policy(), lookup)
    }

    /// The verifier used for inbound tokens
    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }

    /// Decides the request
    ///
    /// Never fails and never panics. Access is granted only if the token was
    /// verified and the policy allowed it.
    pub async fn handle(&self, request: &AuthorizerRequest) -> AuthorizationDecision {
        let outcome = AssertUnwindSafe(self.evaluate(request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::unexpected(panic_message(&*panic))));

        match outcome {
            Ok(decision) => decision,
            Err(err) => {
                log_denial(&err);
                AuthorizationDecision::deny()
            }
        }
    }

    /// Decides the request, reporting why a decision could not be reached
    ///
    /// # Errors
    ///
    /// Returns an error if there is no bearer token, if the token fails
    /// verification, or if the user's attributes cannot be looked up.
    pub async fn evaluate(&self, request: &AuthorizerRequest) -> Result<AuthorizationDecision, Error> {
        let token = request.bearer_token().ok_or(Error::MissingBearer)?;
        let claims = self.inner.verifier.verify(&token).await?;
        self.inner
            .policy
            .authorize(&claims, &token, &self.inner.lookup)
            .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked while authorizing".to_owned()
    }
}

fn log_denial(err: &Error) {
    let kind = err.kind();
    let error: &dyn std::error::Error = err;

    match kind {
        ErrorKind::KeyResolution | ErrorKind::Lookup | ErrorKind::Unexpected => {
            tracing::warn!(error.kind = %kind, error, "request denied");
        }
        _ => {
            tracing::info!(error.kind = %kind, error, "request denied");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use aliri::JwtRef;
    use async_trait::async_trait;
    use color_eyre::Result;
    use serde_json::json;
    use tracing_test::traced_test;
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{
        test_util::{self, CountingLookup, TestIssuer},
        AllowList, KeyResolver, LookupError, UserAttributes,
    };

    fn authorizer<L: UserAttributesLookup>(issuer: &TestIssuer, lookup: L) -> Authorizer<L> {
        let verifier = TokenVerifier::new(
            KeyResolver::new(issuer.jwks()),
            AllowList::from_delimited("c1", ','),
        );
        let policy = AuthorizationPolicy::new(
            AllowList::from_delimited("read", ','),
            AllowList::from_delimited("admin", ','),
        );
        Authorizer::new(verifier, policy, lookup)
    }

    fn bearer(token: &JwtRef) -> AuthorizerRequest {
        AuthorizerRequest::new().with_header("Authorization", format!("Bearer {}", token.as_str()))
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_jwt("Bearer abc").as_deref().map(JwtRef::as_str), Some("abc"));
        assert_eq!(extract_jwt("bearer   abc ").as_deref().map(JwtRef::as_str), Some("abc"));
        assert_eq!(extract_jwt("BEARER abc").as_deref().map(JwtRef::as_str), Some("abc"));
        assert!(extract_jwt("Bearer").is_none());
        assert!(extract_jwt("Bearer ").is_none());
        assert!(extract_jwt("Basic abc").is_none());
        assert!(extract_jwt("abc").is_none());
        assert!(extract_jwt("").is_none());
        assert!(extract_jwt("Béarer abc").is_none());
    }

    #[test]
    fn request_deserializes_from_gateway_event() -> Result<()> {
        let request: AuthorizerRequest = serde_json::from_value(json!({
            "version": "2.0",
            "type": "REQUEST",
            "routeArn": "arn:aws:execute-api:eu-west-2:123456789012:api/$default/GET/orders",
            "identitySource": ["Bearer abc"],
            "headers": { "authorization": "Bearer abc", "host": "api.example.com" },
        }))?;

        assert_eq!(request.authorization(), Some("Bearer abc"));
        assert!(!format!("{request:?}").contains("abc"));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_headers_are_denied() {
        let authorizer = authorizer(test_util::issuer(), CountingLookup::with_roles("admin"));

        for request in [
            AuthorizerRequest::new(),
            AuthorizerRequest::new().with_header("authorization", "abc.def.ghi"),
            AuthorizerRequest::new().with_header("authorization", "Bearer "),
            AuthorizerRequest::new().with_header("authorization", "Bearer not-a-jwt"),
        ] {
            assert_eq!(authorizer.handle(&request).await, AuthorizationDecision::deny());
        }
    }

    #[tokio::test]
    async fn machine_token_is_authorized_by_scope() -> Result<()> {
        let issuer = test_util::issuer();
        let lookup = Arc::new(CountingLookup::with_roles("admin"));
        let authorizer = authorizer(issuer, Arc::clone(&lookup));
        let token = issuer.sign(&json!({ "client_id": "c1", "scope": "read write" }));

        let decision = authorizer.handle(&bearer(&token)).await;

        assert_eq!(
            serde_json::to_value(&decision)?,
            json!({ "isAuthorized": true, "context": { "scopes": "read write", "roles": null } })
        );
        assert_eq!(lookup.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn user_token_is_authorized_by_role() -> Result<()> {
        let issuer = test_util::issuer();
        let authorizer = authorizer(issuer, CountingLookup::with_roles("admin|editor"));
        let token = issuer.sign(&json!({ "client_id": "c1", "cognito:groups": ["g"] }));

        let decision = authorizer.handle(&bearer(&token)).await;

        assert_eq!(
            serde_json::to_value(&decision)?,
            json!({ "isAuthorized": true, "context": { "scopes": null, "roles": "admin|editor" } })
        );
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn unlisted_client_is_denied_regardless_of_claims() -> Result<()> {
        let issuer = test_util::issuer();
        let lookup = Arc::new(CountingLookup::with_roles("admin"));
        let authorizer = authorizer(issuer, Arc::clone(&lookup));
        let token = issuer.sign(&json!({
            "client_id": "other",
            "scope": "read",
            "cognito:groups": ["g"],
        }));

        let decision = authorizer.handle(&bearer(&token)).await;

        assert_eq!(serde_json::to_value(&decision)?, json!({ "isAuthorized": false }));
        assert_eq!(lookup.calls(), 0);
        assert!(logs_contain("invalid_client"));
        Ok(())
    }

    #[tokio::test]
    async fn token_from_unknown_key_is_denied() {
        let authorizer = authorizer(test_util::issuer(), CountingLookup::with_roles("admin"));
        let rogue = TestIssuer::generate("rogue");
        let token = rogue.sign(&json!({ "client_id": "c1", "scope": "read" }));

        assert_eq!(authorizer.handle(&bearer(&token)).await, AuthorizationDecision::deny());
    }

    #[tokio::test]
    #[traced_test]
    async fn slow_key_set_is_a_bare_denial() -> Result<()> {
        let issuer = test_util::issuer();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(issuer.jwks())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = AuthorizerConfig::new(format!("{}/jwks.json", server.uri()))
            .with_clients(AllowList::from_delimited("c1", ','))
            .with_scopes(AllowList::from_delimited("read", ','))
            .with_timeout(Duration::from_millis(200));
        let authorizer = Authorizer::from_config(&config, CountingLookup::with_roles("admin"))?;
        let token = issuer.sign(&json!({ "client_id": "c1", "scope": "read" }));

        assert_eq!(authorizer.handle(&bearer(&token)).await, AuthorizationDecision::deny());
        assert!(logs_contain("key_resolution"));
        Ok(())
    }

    #[tokio::test]
    async fn lookup_failure_is_a_bare_denial() {
        let issuer = test_util::issuer();
        let authorizer = authorizer(issuer, CountingLookup::failing());
        let token = issuer.sign(&json!({ "client_id": "c1", "cognito:groups": ["g"] }));

        assert_eq!(authorizer.handle(&bearer(&token)).await, AuthorizationDecision::deny());
    }

    #[tokio::test]
    async fn policy_mismatch_reports_context() {
        let issuer = test_util::issuer();
        let authorizer = authorizer(issuer, CountingLookup::with_roles("viewer"));
        let token = issuer.sign(&json!({
            "client_id": "c1",
            "scope": "write",
            "cognito:groups": ["g"],
        }));

        let decision = authorizer.handle(&bearer(&token)).await;

        assert_eq!(
            decision,
            AuthorizationDecision::deny_with_context(Some("write".into()), Some("viewer".into()))
        );
    }

    #[tokio::test]
    async fn evaluate_reports_the_failure() {
        let authorizer = authorizer(test_util::issuer(), CountingLookup::with_roles("admin"));

        let err = authorizer.evaluate(&AuthorizerRequest::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingBearer);
    }

    struct PanickingLookup;

    #[async_trait]
    impl UserAttributesLookup for PanickingLookup {
        async fn user_attributes(&self, _: &JwtRef) -> Result<UserAttributes, LookupError> {
            panic!("identity provider client exploded");
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn panic_is_contained_as_denial() {
        let issuer = test_util::issuer();
        let authorizer = authorizer(issuer, PanickingLookup);
        let token = issuer.sign(&json!({ "client_id": "c1", "cognito:groups": ["g"] }));

        let decision = authorizer.handle(&bearer(&token)).await;

        assert_eq!(decision, AuthorizationDecision::deny());
        assert!(logs_contain("identity provider client exploded"));
    }

    #[tokio::test]
    async fn identical_requests_yield_identical_decisions() {
        let issuer = test_util::issuer();
        let authorizer = authorizer(issuer, CountingLookup::with_roles("admin"));
        let token = issuer.sign(&json!({ "client_id": "c1", "cognito:groups": ["g"] }));
        let request = bearer(&token);

        let first = authorizer.handle(&request).await;
        let second = authorizer.clone().handle(&request).await;

        assert_eq!(first, second);
        assert!(first.is_authorized());
    }
}
