use aliri::jwt::Issuer;

/// An Amazon Cognito user pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserPool {
    region: String,
    pool_id: String,
}

impl UserPool {
    /// Identifies a user pool by its region and ID
    pub fn new(region: impl Into<String>, pool_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            pool_id: pool_id.into(),
        }
    }

    /// The region hosting the pool
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The ID of the pool, such as `eu-west-2_AbCdEf123`
    #[must_use]
    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    /// The regional identity provider endpoint
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("https://cognito-idp.{}.amazonaws.com/", self.region)
    }

    /// The issuer named in the `iss` claim of the pool's tokens
    #[must_use]
    pub fn issuer(&self) -> Issuer {
        Issuer::from(format!("{}{}", self.endpoint(), self.pool_id))
    }

    /// The URL of the pool's signing keys
    #[must_use]
    pub fn jwks_url(&self) -> String {
        format!("{}{}/.well-known/jwks.json", self.endpoint(), self.pool_id)
    }
}
