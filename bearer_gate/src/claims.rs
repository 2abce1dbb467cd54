use aliri::jwt::{self, Audiences, Issuer, IssuerRef, Subject, SubjectRef};
use aliri_braid::braid;
use aliri_clock::UnixTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The identifier of the OAuth2 client a token was issued to
#[braid(serde)]
pub struct ClientId;

/// The payload of a verified access token
///
/// Only the claims this crate acts upon are typed. Everything else in the
/// payload is retained and may be inspected by name with [`Claims::get`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl Claims {
    /// The client the token was issued to
    #[must_use]
    pub fn client_id(&self) -> Option<&ClientIdRef> {
        self.client_id.as_deref()
    }

    /// The raw, space-separated `scope` claim
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// The individual scopes, with empty entries dropped
    pub fn scopes(&self) -> impl Iterator<Item = &str> + '_ {
        self.scope().into_iter().flat_map(str::split_whitespace)
    }

    /// Looks up a claim not covered by the typed accessors
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.other.get(name)
    }

    /// Whether the payload carries a claim with the given name, whatever its value
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        match name {
            "client_id" => self.client_id.is_some(),
            "scope" => self.scope.is_some(),
            "aud" => !self.aud.is_empty(),
            "iss" => self.iss.is_some(),
            "sub" => self.sub.is_some(),
            "exp" => self.exp.is_some(),
            "nbf" => self.nbf.is_some(),
            _ => self.other.contains_key(name),
        }
    }
}

impl jwt::CoreClaims for Claims {
    #[inline]
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    #[inline]
    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    #[inline]
    fn aud(&self) -> &Audiences {
        &self.aud
    }

    #[inline]
    fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    #[inline]
    fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }
}
