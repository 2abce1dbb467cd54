use aliri::JwtRef;

use crate::{AllowList, AuthorizationDecision, Claims, Error, UserAttributesLookup};

/// The claim whose presence marks a token as issued to a user rather than to
/// a machine client
pub const DEFAULT_GROUP_CLAIM: &str = "cognito:groups";

/// The user attribute holding the pipe-delimited list of the user's roles
pub const DEFAULT_ROLES_ATTRIBUTE: &str = "custom:roles";

/// Decides whether verified claims grant access
///
/// Machine-to-machine tokens are authorized by scope. Tokens that do not carry
/// an allowed scope but do carry the group claim are treated as user tokens
/// and authorized by the roles the identity provider reports for the user.
/// The scope path always takes precedence; once it matches, the identity
/// provider is not consulted.
#[derive(Clone, Debug)]
#[must_use]
pub struct AuthorizationPolicy {
    scopes: AllowList,
    roles: AllowList,
    group_claim: String,
    roles_attribute: String,
}

impl AuthorizationPolicy {
    /// Constructs a policy from the allowed scopes and roles
    pub fn new(scopes: AllowList, roles: AllowList) -> Self {
        Self {
            scopes,
            roles,
            group_claim: DEFAULT_GROUP_CLAIM.to_owned(),
            roles_attribute: DEFAULT_ROLES_ATTRIBUTE.to_owned(),
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

    /// The allowed scopes
    #[must_use]
    pub fn scopes(&self) -> &AllowList {
        &self.scopes
    }

    /// The allowed roles
    #[must_use]
    pub fn roles(&self) -> &AllowList {
        &self.roles
    }

    /// Evaluates the policy against verified claims
    ///
    /// A policy mismatch is not an error; it yields a denial that still
    /// reports the scopes and roles that were considered.
    ///
    /// # Errors
    ///
    /// Returns an error if the user's attributes had to be looked up and the
    /// lookup failed.
    pub async fn authorize<L>(
        &self,
        claims: &Claims,
        access_token: &JwtRef,
        lookup: &L,
    ) -> Result<AuthorizationDecision, Error>
    where
        L: UserAttributesLookup + ?Sized,
    {
        let scopes = claims.scope();
        let client_id = claims.client_id().map(|c| c.as_str()).unwrap_or_default();

        if self.scopes.intersects(claims.scopes()) {
            tracing::info!(client_id, "authorized by scope");
            return Ok(AuthorizationDecision::allow(scopes.map(ToOwned::to_owned), None));
        }

        if !claims.contains(&self.group_claim) {
            tracing::debug!(client_id, "no allowed scope and no group claim");
            return Ok(AuthorizationDecision::deny_with_context(
                scopes.map(ToOwned::to_owned),
                None,
            ));
        }

        let attributes = lookup.user_attributes(access_token).await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, client_id, "user attribute lookup failed");
            err
        })?;
        let roles = attributes.get_or_empty(&self.roles_attribute);

        if self.roles.intersects(roles.split('|')) {
            tracing::info!(client_id, roles, "authorized by role");
            Ok(AuthorizationDecision::allow(
                scopes.map(ToOwned::to_owned),
                Some(roles.to_owned()),
            ))
        } else {
            tracing::debug!(client_id, roles, "no allowed role");
            Ok(AuthorizationDecision::deny_with_context(
                scopes.map(ToOwned::to_owned),
                Some(roles.to_owned()),
            ))
        }
    }
}
