use aliri::JwtRef;
use async_trait::async_trait;
use bearer_gate::{LookupError, UserAttributes, UserAttributesLookup};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use crate::UserPool;

/// The `X-Amz-Target` naming the `GetUser` operation
pub const GET_USER_TARGET: &str = "AWSCognitoIdentityProviderService.GetUser";

const AMZ_JSON: &str = "application/x-amz-json-1.1";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserRequest<'a> {
    access_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserResponse {
    #[serde(default)]
    user_attributes: Vec<AttributeType>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttributeType {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    code: String,
    #[serde(default, alias = "Message")]
    message: String,
}

/// Looks up user attributes with the Cognito `GetUser` operation
///
/// The call is authenticated by the user's own access token, so no AWS
/// credentials are needed.
#[derive(Clone, Debug)]
pub struct CognitoUserAttributes {
    client: Client,
    endpoint: String,
}

impl CognitoUserAttributes {
    /// Calls the identity provider endpoint of the given pool's region
    pub fn new(client: Client, pool: &UserPool) -> Self {
        Self::with_endpoint(client, pool.endpoint())
    }

    /// Calls an explicit endpoint
    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UserAttributesLookup for CognitoUserAttributes {
    #[tracing::instrument(skip_all, fields(idp.endpoint = %self.endpoint))]
    async fn user_attributes(&self, access_token: &JwtRef) -> Result<UserAttributes, LookupError> {
        let body = serde_json::to_vec(&GetUserRequest {
            access_token: access_token.as_str(),
        })
        .map_err(LookupError::decode)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-amz-target", GET_USER_TARGET)
            .header(header::CONTENT_TYPE, AMZ_JSON)
            .body(body)
            .send()
            .await
            .map_err(LookupError::transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(LookupError::transport)?;

        if !status.is_success() {
            let ErrorBody { code, message } = serde_json::from_slice(&body).unwrap_or_default();
            let code = if code.is_empty() {
                status.to_string()
            } else {
                code
            };
            tracing::warn!(
                http.status_code = status.as_u16(),
                error.code = %code,
                "GetUser rejected",
            );
            return Err(LookupError::Rejected { code, message });
        }

        let response: GetUserResponse =
            serde_json::from_slice(&body).map_err(LookupError::decode)?;

        tracing::debug!(attributes = response.user_attributes.len(), "GetUser succeeded");

        Ok(response
            .user_attributes
            .into_iter()
            .map(|a| (a.name, a.value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, time::Duration};

    use color_eyre::Result;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    const TOKEN: &str = "eyJhbGciOiJSUzI1NiJ9.e30.c2ln";

    fn lookup(server: &MockServer) -> CognitoUserAttributes {
        CognitoUserAttributes::with_endpoint(Client::new(), format!("{}/", server.uri()))
    }

    #[tokio::test]
    async fn flattens_user_attributes() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-amz-target", GET_USER_TARGET))
            .and(header("content-type", AMZ_JSON))
            .and(body_json(json!({ "AccessToken": TOKEN })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Username": "someone",
                "UserAttributes": [
                    { "Name": "sub", "Value": "6f1c" },
                    { "Name": "custom:roles", "Value": "admin|editor" },
                    { "Name": "email_verified" },
                ],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let attributes = lookup(&server)
            .user_attributes(JwtRef::from_str(TOKEN))
            .await?;

        assert_eq!(attributes.get("custom:roles"), Some("admin|editor"));
        assert_eq!(attributes.get("email_verified"), Some(""));
        assert_eq!(attributes.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn error_body_is_surfaced_as_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "NotAuthorizedException",
                "message": "Access Token has been revoked",
            })))
            .mount(&server)
            .await;

        let err = lookup(&server)
            .user_attributes(JwtRef::from_str(TOKEN))
            .await
            .unwrap_err();

        match err {
            LookupError::Rejected { code, message } => {
                assert_eq!(code, "NotAuthorizedException");
                assert_eq!(message, "Access Token has been revoked");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_error_body_falls_back_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = lookup(&server)
            .user_attributes(JwtRef::from_str(TOKEN))
            .await
            .unwrap_err();

        assert!(matches!(err, LookupError::Rejected { code, .. } if code.starts_with("503")));
    }

    #[tokio::test]
    async fn unreadable_success_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = lookup(&server)
            .user_attributes(JwtRef::from_str(TOKEN))
            .await
            .unwrap_err();

        assert!(matches!(err, LookupError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let endpoint = format!("http://{}/", listener.local_addr()?);
        drop(listener);

        let err = CognitoUserAttributes::with_endpoint(Client::new(), endpoint)
            .user_attributes(JwtRef::from_str(TOKEN))
            .await
            .unwrap_err();

        assert!(matches!(err, LookupError::Transport(_)), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn slow_provider_times_out() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "UserAttributes": [] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()?;
        let err = CognitoUserAttributes::with_endpoint(client, format!("{}/", server.uri()))
            .user_attributes(JwtRef::from_str(TOKEN))
            .await
            .unwrap_err();

        assert!(matches!(err, LookupError::Transport(_)), "{err:?}");
        Ok(())
    }
}
