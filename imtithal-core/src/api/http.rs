//! reqwest-backed [`AuthorityClient`].
//!
//! Submission calls carry per-kind timeouts from [`EngineConfig`] and
//! fold every transport failure into a transient outcome. The base URL
//! defaults to the environment's endpoint and can be overridden through
//! `IMTITHAL_AUTHORITY_BASE_URL`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::api::{
    classify_response, AuthorityClient, AuthorityError, IssuedCredentials, SubmissionOutcome,
    SubmissionPayload, TransientCause,
};
use crate::certificate::ApiCredentials;
use crate::config::EngineConfig;

pub const BASE_URL_ENV: &str = "IMTITHAL_AUTHORITY_BASE_URL";

const CLEARANCE_PATH: &str = "invoices/clearance/single";
const REPORTING_PATH: &str = "invoices/reporting/single";
const COMPLIANCE_CHECK_PATH: &str = "compliance/invoices";
const COMPLIANCE_CSID_PATH: &str = "compliance";
const PRODUCTION_CSID_PATH: &str = "production/csids";

/// Renewal responses arrive either bare or wrapped in a `value` object,
/// depending on the gateway revision.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RenewalResponseBody {
    Direct(IssuedCredentials),
    Wrapped { value: IssuedCredentials },
}

pub struct HttpAuthorityClient {
    client: Client,
    base_url: String,
    config: EngineConfig,
}

impl HttpAuthorityClient {
    pub fn new(config: EngineConfig) -> Result<Self, AuthorityError> {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .unwrap_or_else(|| config.env().endpoint_url().to_string());
        Self::with_base_url(config, base_url)
    }

    /// Builds the client against an explicit base URL, bypassing both
    /// the environment default and the override variable.
    pub fn with_base_url(
        config: EngineConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, AuthorityError> {
        let client = Client::builder().build().map_err(AuthorityError::Http)?;
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn submission_request(
        &self,
        path: &str,
        credentials: &ApiCredentials,
        payload: &SubmissionPayload,
        timeout: Duration,
    ) -> RequestBuilder {
        self.client
            .post(self.endpoint(path))
            .timeout(timeout)
            .header("Accept", "application/json")
            .header("Accept-Language", "en")
            .header("Accept-Version", "V2")
            .header("Content-Type", "application/json")
            .basic_auth(
                credentials.security_token(),
                Some(credentials.secret().expose()),
            )
            .json(&payload.to_json())
    }

    async fn submit(&self, request: RequestBuilder, payload: &SubmissionPayload) -> SubmissionOutcome {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let cause = if e.is_timeout() {
                    TransientCause::Timeout
                } else {
                    TransientCause::Connection
                };
                return SubmissionOutcome::Transient { cause };
            }
        };
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(_) => {
                return SubmissionOutcome::Transient {
                    cause: TransientCause::MalformedResponse { status },
                }
            }
        };
        classify_response(status, &body, payload.uuid())
    }

    async fn parse_credentials(
        response: reqwest::Response,
    ) -> Result<IssuedCredentials, AuthorityError> {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            if status == 401 || status == 403 {
                return Err(AuthorityError::Unauthorized { status, body });
            }
            return Err(AuthorityError::InvalidResponse { status, body });
        }
        let parsed: RenewalResponseBody =
            serde_json::from_str(&body).map_err(|e| AuthorityError::InvalidResponse {
                status,
                body: format!("{e}: {body}"),
            })?;
        Ok(match parsed {
            RenewalResponseBody::Direct(value) => value,
            RenewalResponseBody::Wrapped { value } => value,
        })
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn clear(
        &self,
        credentials: &ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome {
        let request = self
            .submission_request(
                CLEARANCE_PATH,
                credentials,
                payload,
                self.config.clearance_timeout(),
            )
            .header("Clearance-Status", "1");
        self.submit(request, payload).await
    }

    async fn report(
        &self,
        credentials: &ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome {
        let request = self
            .submission_request(
                REPORTING_PATH,
                credentials,
                payload,
                self.config.reporting_timeout(),
            )
            .header("Clearance-Status", "0");
        self.submit(request, payload).await
    }

    async fn check_compliance(
        &self,
        credentials: &ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome {
        let request = self.submission_request(
            COMPLIANCE_CHECK_PATH,
            credentials,
            payload,
            self.config.reporting_timeout(),
        );
        self.submit(request, payload).await
    }

    async fn request_compliance_credentials(
        &self,
        csr_base64: &str,
        otp: &str,
    ) -> Result<IssuedCredentials, AuthorityError> {
        let response = self
            .client
            .post(self.endpoint(COMPLIANCE_CSID_PATH))
            .header("Accept", "application/json")
            .header("OTP", otp)
            .header("Accept-Version", "V2")
            .header("Content-Type", "application/json")
            .json(&json!({ "csr": csr_base64 }))
            .send()
            .await?;
        Self::parse_credentials(response).await
    }

    async fn request_production_credentials(
        &self,
        compliance: &IssuedCredentials,
    ) -> Result<IssuedCredentials, AuthorityError> {
        let response = self
            .client
            .post(self.endpoint(PRODUCTION_CSID_PATH))
            .header("Accept", "application/json")
            .header("Accept-Version", "V2")
            .header("Content-Type", "application/json")
            .basic_auth(compliance.security_token(), Some(compliance.secret()))
            .json(&json!({ "compliance_request_id": compliance.request_id() }))
            .send()
            .await?;
        Self::parse_credentials(response).await
    }

    async fn renew_credentials(
        &self,
        current: &ApiCredentials,
        csr_base64: &str,
        otp: Option<&str>,
    ) -> Result<IssuedCredentials, AuthorityError> {
        let mut request = self
            .client
            .patch(self.endpoint(PRODUCTION_CSID_PATH))
            .header("Accept", "application/json")
            .header("Accept-Version", "V2")
            .header("Content-Type", "application/json")
            .basic_auth(current.security_token(), Some(current.secret().expose()))
            .json(&json!({ "csr": csr_base64 }));
        if let Some(otp) = otp {
            request = request.header("OTP", otp);
        }
        let response = request.send().await?;
        Self::parse_credentials(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;
    use uuid::Uuid;

    use crate::config::EnvironmentType;

    fn client(server: &MockServer) -> HttpAuthorityClient {
        HttpAuthorityClient::with_base_url(
            EngineConfig::new(EnvironmentType::Sandbox),
            format!("{}/", server.base_url()),
        )
        .expect("client")
    }

    fn payload() -> SubmissionPayload {
        SubmissionPayload::for_test(
            Uuid::new_v4(),
            "aa".repeat(32),
            "<Invoice/>".to_string(),
        )
    }

    fn credentials() -> ApiCredentials {
        ApiCredentials::new("token", "secret")
    }

    async fn start_server() -> MockServer {
        MockServer::start_async().await
    }

    #[tokio::test]
    async fn clearance_posts_with_clearance_header_and_classifies() {
        let server = start_server().await;
        let body = r#"{
          "requestID": 42,
          "validationResults": {
            "warningMessages": [],
            "errorMessages": [],
            "status": "PASS"
          },
          "clearanceStatus": "CLEARED"
        }"#;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/invoices/clearance/single")
                .header("Accept-Version", "V2")
                .header("Clearance-Status", "1");
            then.status(200)
                .header("content-type", "application/json")
                .body(body);
        });

        let outcome = client(&server).clear(&credentials(), &payload()).await;

        mock.assert();
        assert_eq!(
            outcome,
            SubmissionOutcome::Accepted {
                authority_reference: "42".into()
            }
        );
    }

    #[tokio::test]
    async fn reporting_rejection_carries_authority_messages() {
        let server = start_server().await;
        let body = r#"{
          "validationResults": {
            "warningMessages": [],
            "errorMessages": [
              {
                "type": "ERROR",
                "code": "BR-KSA-37",
                "category": "KSA",
                "message": "bad address",
                "status": "ERROR"
              }
            ],
            "status": "ERROR"
          }
        }"#;
        server.mock(|when, then| {
            when.method(POST)
                .path("/invoices/reporting/single")
                .header("Clearance-Status", "0");
            then.status(400)
                .header("content-type", "application/json")
                .body(body);
        });

        let outcome = client(&server).report(&credentials(), &payload()).await;

        match outcome {
            SubmissionOutcome::Rejected { reasons } => {
                assert_eq!(reasons[0].code(), Some("BR-KSA-37"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_come_back_transient() {
        let server = start_server().await;
        server.mock(|when, then| {
            when.method(POST).path("/invoices/reporting/single");
            then.status(503).body("overloaded");
        });

        let outcome = client(&server).report(&credentials(), &payload()).await;

        assert_eq!(
            outcome,
            SubmissionOutcome::Transient {
                cause: TransientCause::ServerError { status: 503 }
            }
        );
    }

    #[tokio::test]
    async fn onboarding_flow_hits_csid_endpoints() {
        let server = start_server().await;
        let compliance_body = r#"{
          "requestID": 42,
          "binarySecurityToken": "ctoken",
          "secret": "csecret"
        }"#;
        let production_body = r#"{
          "requestID": 77,
          "binarySecurityToken": "ptoken",
          "secret": "psecret"
        }"#;
        let compliance_mock = server.mock(|when, then| {
            when.method(POST).path("/compliance").header("OTP", "123456");
            then.status(200)
                .header("content-type", "application/json")
                .body(compliance_body);
        });
        let production_mock = server.mock(|when, then| {
            when.method(POST).path("/production/csids");
            then.status(200)
                .header("content-type", "application/json")
                .body(production_body);
        });

        let client = client(&server);
        let compliance = client
            .request_compliance_credentials("Y3Ny", "123456")
            .await
            .expect("compliance credentials");
        assert_eq!(compliance.request_id(), Some(42));

        let production = client
            .request_production_credentials(&compliance)
            .await
            .expect("production credentials");
        assert_eq!(production.security_token(), "ptoken");

        compliance_mock.assert();
        production_mock.assert();
    }

    #[tokio::test]
    async fn renewal_accepts_wrapped_response_without_otp() {
        let server = start_server().await;
        let body = r#"{
          "value": {
            "requestID": 99,
            "binarySecurityToken": "rtoken",
            "secret": "rsecret"
          }
        }"#;
        let mock = server.mock(|when, then| {
            when.method(PATCH).path("/production/csids");
            then.status(200)
                .header("content-type", "application/json")
                .body(body);
        });

        let renewed = client(&server)
            .renew_credentials(&credentials(), "Y3Ny", None)
            .await
            .expect("renewed credentials");

        mock.assert();
        assert_eq!(renewed.request_id(), Some(99));
        assert_eq!(renewed.security_token(), "rtoken");
    }

    #[tokio::test]
    async fn unauthorized_onboarding_is_a_credentials_error() {
        let server = start_server().await;
        server.mock(|when, then| {
            when.method(POST).path("/compliance");
            then.status(401).body("bad otp");
        });

        let result = client(&server)
            .request_compliance_credentials("Y3Ny", "000000")
            .await;

        assert!(matches!(
            result,
            Err(AuthorityError::Unauthorized { status: 401, .. })
        ));
    }
}
