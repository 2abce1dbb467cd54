use std::fmt;

use aliri::{
    error::{ClaimsRejected, JwtVerifyError},
    jwa,
};
use thiserror::Error;

use crate::{ClientId, KeyResolutionError, LookupError};

/// An error raised while verifying a token or evaluating the policy
///
/// These errors never reach the caller of [`Authorizer::handle`][crate::Authorizer::handle];
/// they are logged and converted into a denial.
#[derive(Debug, Error)]
pub enum Error {
    /// The request carried no `authorization` header, or its value was not
    /// of the form `Bearer <token>`
    #[error("authorization header is missing or is not a bearer token")]
    MissingBearer,

    /// The token could not be decomposed into a header, payload, and signature
    #[error("malformed JWT")]
    MalformedToken(#[source] JwtVerifyError),

    /// The token header does not name the key used to sign it
    #[error("JWT header does not specify a key ID")]
    MissingKeyId,

    /// The signing key could not be resolved
    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),

    /// The token is signed with an algorithm other than RS256
    #[error("JWT algorithm '{alg}' is not accepted")]
    UnsupportedAlgorithm {
        /// The algorithm named in the token header
        alg: jwa::Algorithm,
    },

    /// The token signature did not verify against the resolved key
    #[error("JWT signature is invalid")]
    SignatureInvalid(#[source] JwtVerifyError),

    /// The token's `exp` claim is in the past
    #[error("token expired")]
    TokenExpired,

    /// The token's `nbf` claim is in the future
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// The token's `iss` claim is missing or names an untrusted issuer
    #[error("token issuer is not trusted")]
    InvalidIssuer,

    /// The token's `client_id` claim is missing or not allow-listed
    #[error("client is not allowed")]
    InvalidClient {
        /// The client ID claimed by the token, if any
        client_id: Option<ClientId>,
    },

    /// The identity provider could not supply the user's attributes
    #[error("user attribute lookup failed")]
    Lookup(#[from] LookupError),

    /// Something unexpected happened, such as a panic in a collaborator
    #[error("unexpected error: {message}")]
    Unexpected {
        /// A description of what went wrong
        message: String,
    },
}

impl Error {
    /// The kind of failure, suitable for use as a log field
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingBearer => ErrorKind::MissingBearer,
            Self::MalformedToken(_) | Self::MissingKeyId => ErrorKind::MalformedToken,
            Self::KeyResolution(KeyResolutionError::UnknownKeyId { .. }) => ErrorKind::KeyNotFound,
            Self::KeyResolution(KeyResolutionError::Fetch(_)) => ErrorKind::KeyResolution,
            Self::UnsupportedAlgorithm { .. } | Self::SignatureInvalid(_) => {
                ErrorKind::SignatureInvalid
            }
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::TokenNotYetValid => ErrorKind::TokenNotYetValid,
            Self::InvalidIssuer => ErrorKind::InvalidIssuer,
            Self::InvalidClient { .. } => ErrorKind::InvalidClient,
            Self::Lookup(_) => ErrorKind::Lookup,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// Whether the token itself failed verification, as opposed to being
    /// rejected by the policy or its collaborators
    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        !matches!(
            self,
            Self::MissingBearer | Self::InvalidClient { .. } | Self::Lookup(_) | Self::Unexpected { .. }
        )
    }

    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Sorts a failure reported by `aliri` into the matching error kind
    pub(crate) fn from_jwt(err: JwtVerifyError) -> Self {
        match err {
            JwtVerifyError::ClaimsRejected(ClaimsRejected::TokenExpired) => Self::TokenExpired,
            JwtVerifyError::ClaimsRejected(ClaimsRejected::TokenNotYetValid) => {
                Self::TokenNotYetValid
            }
            JwtVerifyError::ClaimsRejected(ClaimsRejected::InvalidIssuer)
            | JwtVerifyError::ClaimsRejected(ClaimsRejected::MissingRequiredClaim("iss")) => {
                Self::InvalidIssuer
            }
            err @ (JwtVerifyError::MalformedToken(_)
            | JwtVerifyError::MalformedTokenHeader(_)
            | JwtVerifyError::MalformedTokenPayload(_)
            | JwtVerifyError::MalformedTokenSignature(_)) => Self::MalformedToken(err),
            err => Self::SignatureInvalid(err),
        }
    }
}

/// The kind of an authorization [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// No bearer token was presented
    MissingBearer,
    /// The token is not a well-formed JWT with a key ID
    MalformedToken,
    /// No key in the key set matches the token's key ID
    KeyNotFound,
    /// The key set could not be fetched
    KeyResolution,
    /// The signature or algorithm was rejected
    SignatureInvalid,
    /// The token has expired
    TokenExpired,
    /// The token is not valid yet
    TokenNotYetValid,
    /// The token was issued by someone else
    InvalidIssuer,
    /// The client is not allow-listed
    InvalidClient,
    /// The identity provider lookup failed
    Lookup,
    /// Anything else
    Unexpected,
}

impl ErrorKind {
    /// A stable, snake-cased name for the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingBearer => "missing_bearer",
            Self::MalformedToken => "malformed_token",
            Self::KeyNotFound => "key_not_found",
            Self::KeyResolution => "key_resolution",
            Self::SignatureInvalid => "signature_invalid",
            Self::TokenExpired => "token_expired",
            Self::TokenNotYetValid => "token_not_yet_valid",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InvalidClient => "invalid_client",
            Self::Lookup => "lookup",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
