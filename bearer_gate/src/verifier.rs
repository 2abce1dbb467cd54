use std::{fmt, sync::Arc, time::Duration};

use aliri::{
    error::ClaimsRejected,
    jwa,
    jwt::{self, BasicHeaders, CoreClaims, CoreHeaders, HasAlgorithm, Issuer},
    JwtRef,
};
use aliri_clock::{Clock, System};

use crate::{AllowList, Claims, Error, KeyResolver};

/// The only signing algorithm accepted on a token
pub const ALGORITHM: jwa::Algorithm = jwa::Algorithm::RS256;

/// Checks `exp` and `nbf` only when the token carries them
#[derive(Clone)]
struct ValidityWindow {
    clock: Arc<dyn Clock + Send + Sync>,
    leeway: u64,
}

impl fmt::Debug for ValidityWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ValidityWindow")
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl jwt::ClaimsValidator<Claims, BasicHeaders> for ValidityWindow {
    fn validate(&self, _header: &BasicHeaders, claims: &Claims) -> Result<(), ClaimsRejected> {
        let now = self.clock.now();

        if let Some(exp) = claims.exp() {
            if exp.0 <= now.0.saturating_sub(self.leeway) {
                return Err(ClaimsRejected::TokenExpired);
            }
        }

        if let Some(nbf) = claims.nbf() {
            if nbf.0 > now.0.saturating_add(self.leeway) {
                return Err(ClaimsRejected::TokenNotYetValid);
            }
        }

        Ok(())
    }
}

/// Verifies bearer tokens and checks that they were issued to a known client
///
/// A token is accepted only if it is an RS256-signed JWT whose header names a
/// key ID that the [`KeyResolver`] can resolve, whose signature verifies
/// against that key, whose `exp` and `nbf` claims (when present) admit the
/// current time, whose issuer matches (when one is required), and whose
/// `client_id` claim is allow-listed. The audience is not checked.
#[derive(Clone, Debug)]
#[must_use]
pub struct TokenVerifier {
    keys: KeyResolver,
    clients: AllowList,
    validator: jwt::CoreValidator,
    window: ValidityWindow,
}

impl TokenVerifier {
    /// Constructs a verifier drawing keys from the given resolver and
    /// accepting tokens issued to the given clients
    pub fn new(keys: KeyResolver, clients: AllowList) -> Self {
        let validator = jwt::CoreValidator::default()
            .ignore_expiration()
            .ignore_not_before()
            .add_approved_algorithm(ALGORITHM);

        Self {
            keys,
            clients,
            validator,
            window: ValidityWindow {
                clock: Arc::new(System),
                leeway: 0,
            },
        }
    }

    /// Requires the `iss` claim to equal the given issuer
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            validator: self.validator.require_issuer(issuer),
            ..self
        }
    }

    /// Allows for clock skew when checking `exp` and `nbf`
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self {
            window: ValidityWindow {
                leeway: leeway.as_secs(),
                ..self.window
            },
            ..self
        }
    }

    /// Uses the given clock as the source of the current time
    pub fn with_clock<C>(self, clock: C) -> Self
    where
        C: Clock + Send + Sync + 'static,
    {
        Self {
            window: ValidityWindow {
                clock: Arc::new(clock),
                ..self.window
            },
            ..self
        }
    }

    /// The key resolver backing this verifier
    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    /// Verifies the token, returning its claims
    ///
    /// # Errors
    ///
    /// Returns an error if any check fails. Nothing in the payload is trusted
    /// until the signature has been verified.
    #[tracing::instrument(level = "debug", skip_all, fields(jwt.kid = tracing::field::Empty))]
    pub async fn verify(&self, token: &JwtRef) -> Result<Claims, Error> {
        let decomposed: jwt::Decomposed<BasicHeaders> =
            token.decompose().map_err(Error::MalformedToken)?;

        let kid = decomposed.kid().ok_or(Error::MissingKeyId)?.to_owned();
        tracing::Span::current().record("jwt.kid", kid.as_str());

        let alg = decomposed.alg();
        if alg != ALGORITHM {
            tracing::debug!(%alg, "rejecting token signed with unexpected algorithm");
            return Err(Error::UnsupportedAlgorithm { alg });
        }

        let key = self.keys.resolve(&kid).await?;

        let validated: jwt::Validated<Claims, BasicHeaders> = decomposed
            .verify_with_custom(&key, &self.validator, &self.window)
            .map_err(Error::from_jwt)?;
        let (_, claims) = validated.extract();

        match claims.client_id() {
            Some(client_id) if self.clients.contains(client_id.as_str()) => Ok(claims),
            client_id => {
                tracing::debug!(client_id = client_id.map(|c| c.as_str()), "client not allowed");
                Err(Error::InvalidClient {
                    client_id: client_id.map(ToOwned::to_owned),
                })
            }
        }
    }
}
