use std::{error::Error as StdError, sync::Arc};

use ahash::AHashMap;
use aliri::JwtRef;
use async_trait::async_trait;
use thiserror::Error;

/// Attributes of the user behind an access token, keyed by attribute name
///
/// Values are opaque strings as reported by the identity provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserAttributes(AHashMap<String, String>);

impl UserAttributes {
    /// An empty attribute set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an attribute, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// The value of the named attribute
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The value of the named attribute, or the empty string if it is absent
    #[must_use]
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or_default()
    }

    /// The number of attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attributes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for UserAttributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// An error raised while looking up a user's attributes
#[derive(Debug, Error)]
pub enum LookupError {
    /// The identity provider refused the request, for example because the
    /// access token was revoked
    #[error("identity provider rejected the lookup: {code}")]
    Rejected {
        /// The provider's error code
        code: String,
        /// The provider's description of the error
        message: String,
    },
    /// The identity provider could not be reached
    #[error("identity provider request failed")]
    Transport(#[source] Box<dyn StdError + Send + Sync + 'static>),
    /// The identity provider's response could not be understood
    #[error("identity provider response was not understood")]
    Decode(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl LookupError {
    /// Wraps a transport failure
    pub fn transport(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }

    /// Wraps a failure to decode the provider's response
    pub fn decode(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Decode(Box::new(err))
    }
}

/// A source of user attributes for role-based authorization
///
/// Implementations exchange the caller's access token for the attributes of
/// the user it was issued to, typically by calling the identity provider.
/// Lookups are only performed for tokens that passed verification.
#[async_trait]
pub trait UserAttributesLookup: Send + Sync {
    /// Fetches the attributes of the user the access token belongs to
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or rejects the token.
    async fn user_attributes(&self, access_token: &JwtRef) -> Result<UserAttributes, LookupError>;
}

macro_rules! delegate_impls {
    ($($ty:ty)*) => {
        $(
            #[async_trait]
            impl<T> UserAttributesLookup for $ty
            where
                T: UserAttributesLookup + ?Sized,
            {
                async fn user_attributes(
                    &self,
                    access_token: &JwtRef,
                ) -> Result<UserAttributes, LookupError> {
                    T::user_attributes(self, access_token).await
                }
            }
        )*
    };
}

delegate_impls!(Box<T> Arc<T>);
