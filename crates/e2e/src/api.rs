//! HTTP access to the Open Supply Hub REST API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::error::E2eResult;
use crate::poll::{poll_until, PollOptions, Predicate};

/// Per-request options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Send the configured API token
    #[serde(default)]
    pub authenticate: bool,

    /// Query parameters; non-string values are rendered as JSON scalars
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl RequestOptions {
    pub fn authenticated() -> Self {
        Self {
            authenticate: true,
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    fn query(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(name, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), rendered)
            })
            .collect()
    }
}

/// Status and decoded body of one API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,

    /// JSON body; a non-JSON body is kept as a string value
    pub body: Value,
}

impl ApiResponse {
    /// Looks up a JSON pointer (e.g. `/features/0/id`) in the body
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.body.pointer(pointer)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Thin client over `reqwest` that knows the API's auth scheme
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl ApiClient {
    pub fn new(config: &HarnessConfig) -> E2eResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET {base_url}{path}`.
    ///
    /// Authenticated calls carry `Authorization: Token <token>`; anonymous
    /// calls send an empty `Authorization` header.
    pub async fn get(&self, path: &str, options: &RequestOptions) -> E2eResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        let authorization = if options.authenticate {
            format!("Token {}", self.auth_token)
        } else {
            String::new()
        };

        debug!(%url, authenticate = options.authenticate, "GET");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .query(&options.query())
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = match serde_json::from_str::<Value>(&text) {
            Ok(body) => body,
            Err(_) => Value::String(text),
        };
        debug!(%url, status, "Response received");

        Ok(ApiResponse { status, body })
    }

    /// Repeats a GET until `predicate` accepts the response
    pub async fn poll_get(
        &self,
        path: &str,
        options: &RequestOptions,
        predicate: &Predicate<ApiResponse>,
        poll: &PollOptions,
    ) -> E2eResult<ApiResponse> {
        let client = self;
        let response = poll_until(
            move || async move { client.get(path, options).await },
            predicate,
            poll,
        )
        .await?;
        Ok(response)
    }

    /// Waits until the application answers without a server error.
    ///
    /// Connection failures count as "not up yet" while polling.
    pub async fn wait_until_reachable(&self, poll: &PollOptions) -> E2eResult<u16> {
        let client = self;
        let anonymous = RequestOptions::anonymous();
        let anonymous = &anonymous;
        let poll = poll.clone().retry_on_error();
        let status = poll_until(
            move || async move { client.get("/", anonymous).await.map(|response| response.status) },
            &Predicate::satisfies(|status: &u16| *status < 500),
            &poll,
        )
        .await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_renders_scalars_without_quotes() {
        let options = RequestOptions::authenticated()
            .param("detail", true)
            .param("page", 2)
            .param("countries", "CN");
        assert_eq!(
            options.query(),
            vec![
                ("countries".to_string(), "CN".to_string()),
                ("detail".to_string(), "true".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn response_pointer_lookup() {
        let response = ApiResponse {
            status: 200,
            body: json!({"features": [{"id": "CN2019303BQ3FZP"}]}),
        };
        assert_eq!(response.pointer("/features/0/id"), Some(&json!("CN2019303BQ3FZP")));
        assert!(response.is_success());
    }
}
