use crate::remi_api::error::RemiError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;
use std::time::Duration;

pub const SERVER: &str = "https://remi2.urbanhello.com/parse";
pub const APPLICATION_ID: &str = "jf1a0bADt5fq";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues a single JSON request against the Parse backend.
/// `path` is relative to the server root, eg: `classes/Face`.
/// Implementations must report any status other than 200 as
/// `RemiError::Api`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        session_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, RemiError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    server: String,
    timeout: Duration,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(SERVER)
    }
}

impl ReqwestTransport {
    pub fn new<S: Into<String>>(server: S) -> Self {
        Self {
            server: server.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        session_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, RemiError> {
        let url = self.endpoint(path);
        log::trace!("{method} {url}");

        // A fresh client per call; nothing is pooled between requests
        let mut request = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()?
            .request(method, &url)
            .header("x-parse-application-id", APPLICATION_ID)
            .header("content-type", "application/json");
        if let Some(token) = session_token {
            request = request.header("x-parse-session-token", token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let data = response.bytes().await?;

        if status.as_u16() != 200 {
            return Err(RemiError::Api {
                path: path.to_string(),
                status: status.as_u16(),
                message: format!(
                    "{}. Response body: {}",
                    status.canonical_reason().unwrap_or(""),
                    String::from_utf8_lossy(&data)
                ),
            });
        }

        from_json(&data).map_err(|err| RemiError::Json(format!("parsing {url} response: {err}")))
    }
}

pub fn from_json<T: serde::de::DeserializeOwned, S: AsRef<[u8]>>(text: S) -> anyhow::Result<T> {
    let text = text.as_ref();
    serde_json_path_to_error::from_slice(text)
        .map_err(|err| anyhow::anyhow!("{err}. Input: {}", String::from_utf8_lossy(text)))
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: Method,
        pub path: String,
        pub session_token: Option<String>,
        pub body: Option<JsonValue>,
    }

    #[derive(Clone)]
    enum Canned {
        Json(JsonValue),
        Status(u16),
    }

    /// Answers from a table of canned responses and records every
    /// request it sees. Unknown routes answer 404.
    #[derive(Default)]
    pub struct MockTransport {
        routes: Mutex<HashMap<(Method, String), Canned>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, method: Method, path: &str, value: JsonValue) {
            self.routes
                .lock()
                .insert((method, path.to_string()), Canned::Json(value));
        }

        pub fn respond_status(&self, method: Method, path: &str, status: u16) {
            self.routes
                .lock()
                .insert((method, path.to_string()), Canned::Status(status));
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().clone()
        }

        pub fn clear_requests(&self) {
            self.requests.lock().clear();
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn request(
            &self,
            method: Method,
            path: &str,
            session_token: Option<&str>,
            body: Option<&JsonValue>,
        ) -> Result<JsonValue, RemiError> {
            self.requests.lock().push(RecordedRequest {
                method: method.clone(),
                path: path.to_string(),
                session_token: session_token.map(|s| s.to_string()),
                body: body.cloned(),
            });

            let canned = self
                .routes
                .lock()
                .get(&(method, path.to_string()))
                .cloned()
                .unwrap_or(Canned::Status(404));
            match canned {
                Canned::Json(value) => Ok(value),
                Canned::Status(status) => Err(RemiError::Api {
                    path: path.to_string(),
                    status,
                    message: "canned failure".to_string(),
                }),
            }
        }
    }
}
