use serde::{Deserialize, Serialize};

/// The outcome of an authorization request
///
/// Serializes as `{"isAuthorized": <bool>, "context": {"scopes": …, "roles": …}}`,
/// with `context` omitted on a bare denial.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[must_use]
pub struct AuthorizationDecision {
    is_authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<DecisionContext>,
}

/// The raw scope and role strings that informed a decision
///
/// Absent values serialize as `null`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionContext {
    /// The token's `scope` claim, verbatim
    pub scopes: Option<String>,
    /// The user's roles attribute, verbatim
    pub roles: Option<String>,
}

impl AuthorizationDecision {
    /// A denial that reveals nothing
    pub const fn deny() -> Self {
        Self {
            is_authorized: false,
            context: None,
        }
    }

    /// A denial reached after the token was verified
    pub fn deny_with_context(scopes: Option<String>, roles: Option<String>) -> Self {
        Self {
            is_authorized: false,
            context: Some(DecisionContext { scopes, roles }),
        }
    }

    /// A grant, with the scopes and roles that justified it
    pub fn allow(scopes: Option<String>, roles: Option<String>) -> Self {
        Self {
            is_authorized: true,
            context: Some(DecisionContext { scopes, roles }),
        }
    }

    /// Whether access was granted
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.is_authorized
    }

    /// The context of the decision, if any
    #[must_use]
    pub fn context(&self) -> Option<&DecisionContext> {
        self.context.as_ref()
    }

    /// The scope string that informed the decision
    #[must_use]
    pub fn scopes(&self) -> Option<&str> {
        self.context.as_ref()?.scopes.as_deref()
    }

    /// The role string that informed the decision
    #[must_use]
    pub fn roles(&self) -> Option<&str> {
        self.context.as_ref()?.roles.as_deref()
    }
}
