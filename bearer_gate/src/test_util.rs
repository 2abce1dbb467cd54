//! Helpers for testing code that relies on bearer token authorization
//!
//! These helpers panic on failure and are not meant for production use.

use std::sync::atomic::{AtomicUsize, Ordering};

use aliri::{
    jwa,
    jwk::{KeyId, KeyIdRef},
    jwt::BasicHeaders,
    Jwk, Jwks, Jwt, JwtRef,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::{LookupError, UserAttributes, UserAttributesLookup, ALGORITHM, DEFAULT_ROLES_ATTRIBUTE};

/// A freshly generated RSA signing key that mints test tokens
#[derive(Debug)]
pub struct TestIssuer {
    signing_key: Jwk,
    key_id: KeyId,
}

impl TestIssuer {
    /// Generates a new 2048-bit RSA key with the given key ID
    ///
    /// # Panics
    ///
    /// Panics if the key cannot be generated.
    #[must_use]
    pub fn generate(key_id: &str) -> Self {
        let key_id = KeyId::from(key_id.to_owned());
        let rsa = jwa::Rsa::generate().expect("RSA key generation failed");

        Self {
            signing_key: Jwk::from(rsa).with_key_id(key_id.clone()),
            key_id,
        }
    }

    /// The ID of the key
    #[must_use]
    pub fn key_id(&self) -> &KeyIdRef {
        &self.key_id
    }

    /// The public half of the key, as published in a JWKS
    #[must_use]
    pub fn public_jwk(&self) -> Jwk {
        self.signing_key
            .clone()
            .public_only()
            .with_algorithm(ALGORITHM)
    }

    /// A key set containing only this issuer's public key
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        let mut jwks = Jwks::default();
        jwks.add_key(self.public_jwk());
        jwks
    }

    /// Signs the claims as an RS256 token naming this issuer's key
    ///
    /// # Panics
    ///
    /// Panics if the claims cannot be serialized or signed.
    pub fn sign<C: Serialize>(&self, claims: &C) -> Jwt {
        self.sign_with_header(&BasicHeaders::with_key_id(ALGORITHM, self.key_id.clone()), claims)
    }

    /// Signs the claims under an arbitrary header
    ///
    /// # Panics
    ///
    /// Panics if the claims cannot be serialized or if the key cannot sign
    /// with the header's algorithm.
    pub fn sign_with_header<C: Serialize>(&self, header: &BasicHeaders, claims: &C) -> Jwt {
        Jwt::try_from_parts_with_signature(header, claims, &self.signing_key)
            .expect("signing test token failed")
    }
}

static SHARED: Lazy<TestIssuer> = Lazy::new(|| TestIssuer::generate("test-key"));

/// A process-wide issuer with the key ID `test-key`
///
/// Generating RSA keys is slow, so tests that do not need a distinct key
/// should share this one.
#[must_use]
pub fn issuer() -> &'static TestIssuer {
    &SHARED
}

/// A [`UserAttributesLookup`] that returns canned attributes and counts calls
#[derive(Debug)]
pub struct CountingLookup {
    attributes: Option<UserAttributes>,
    calls: AtomicUsize,
}

impl CountingLookup {
    /// Returns the given attributes on every call
    #[must_use]
    pub fn returning(attributes: UserAttributes) -> Self {
        Self {
            attributes: Some(attributes),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the given pipe-delimited roles under the default roles attribute
    #[must_use]
    pub fn with_roles(roles: &str) -> Self {
        Self::returning([(DEFAULT_ROLES_ATTRIBUTE, roles)].into_iter().collect())
    }

    /// Fails every call as though the identity provider rejected the token
    #[must_use]
    pub fn failing() -> Self {
        Self {
            attributes: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// The number of lookups performed so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserAttributesLookup for CountingLookup {
    async fn user_attributes(&self, _access_token: &JwtRef) -> Result<UserAttributes, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.attributes.clone().ok_or_else(|| LookupError::Rejected {
            code: "NotAuthorizedException".to_owned(),
            message: "Access Token has been revoked".to_owned(),
        })
    }
}
