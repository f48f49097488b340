//! REST access to the managed client.

use crate::RequestError;
use rcgate_core::{ApiResponse, ConnectionParameters, ManagedClientError};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const READINESS_PATH: &str = "/riotclientapp/v1/command-line-args";

/// Everything needed to issue requests against one session.
#[derive(Clone)]
pub struct ApiContext {
    http: reqwest::Client,
    base_url: String,
    params: ConnectionParameters,
    timeout: Duration,
}

impl ApiContext {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: String,
        params: ConnectionParameters,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            params,
            timeout,
        }
    }

    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Issue a request. The body is only sent for methods other than GET
    /// and HEAD.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, RequestError> {
        let sends_body = method != Method::GET && method != Method::HEAD;
        let mut request = self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .header(AUTHORIZATION, self.params.auth_header())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout);
        if let (true, Some(body)) = (sends_body, body) {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let error = serde_json::from_str::<ManagedClientError>(&text)
                .unwrap_or_else(|_| ManagedClientError::from_status(status.as_u16(), &text));
            return Err(RequestError::Api(error));
        }
        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(ApiResponse::NoContent);
        }
        Ok(ApiResponse::Success(serde_json::from_str(&text)?))
    }

    /// GET `path` and decode the body as `T`. An empty body decodes from
    /// `null`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let value = self
            .send(Method::GET, path, None)
            .await?
            .into_json()
            .unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    /// Whether the REST endpoint answers 200 with a JSON array.
    pub(crate) async fn check_ready(&self) -> Result<bool, RequestError> {
        let response = self
            .http
            .get(format!("{}{READINESS_PATH}", self.base_url))
            .header(AUTHORIZATION, self.params.auth_header())
            .timeout(self.timeout)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            tracing::debug!(status = %response.status(), "REST endpoint not ready");
            return Ok(false);
        }
        let body: Value = response.json().await?;
        Ok(body.is_array())
    }
}

/// A typed client over [`ApiContext`], cached per session under `NAME`.
pub trait Api: Send + Sync + 'static {
    const NAME: &'static str;

    fn new(context: ApiContext) -> Self;
}

/// Calls shared by every managed-client product.
pub struct CoreSdkApi {
    context: ApiContext,
}

impl Api for CoreSdkApi {
    const NAME: &'static str = "core-sdk";

    fn new(context: ApiContext) -> Self {
        Self { context }
    }
}

impl CoreSdkApi {
    pub async fn command_line_args(&self) -> Result<Vec<String>, RequestError> {
        self.context.get(READINESS_PATH).await
    }

    /// Product sessions keyed by session id.
    pub async fn product_sessions(&self) -> Result<HashMap<String, Value>, RequestError> {
        self.context.get("/product-session/v1/sessions").await
    }

    pub async fn authentication(&self) -> Result<Value, RequestError> {
        self.context.get("/rso-authenticator/v1/authentication").await
    }

    pub async fn rso_auth_session(&self) -> Result<Value, RequestError> {
        self.context.get("/rso-auth/v1/session").await
    }

    /// Whether the multifactor notice was dismissed. `None` when unset.
    pub async fn mfa_notification_dismissed(&self) -> Result<Option<bool>, RequestError> {
        self.context
            .get("/data-store/v1/install-settings/mfa_notification_dismissed")
            .await
    }
}
