//! HTTP implementation of [`ChatApi`].
//!
//! Request/response calls honor the configured timeout. The reply stream is
//! a long-lived `text/event-stream` response and never times out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::{ApiResult, ChatApi, PushSource};
use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult, TransportError};
use crate::sse::decode_events;
use crate::types::{Message, MessageRole, Session, UploadFile, UploadedDocument};

/// Chat backend client over reqwest.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Option<Duration>,
    access_token: Option<String>,
}

impl HttpChatClient {
    /// Create a client for `base_url` (including the API prefix, e.g. `http://host/api`).
    pub fn new(base_url: impl Into<String>) -> ChatResult<Self> {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ChatError::InvalidUrl(base_url));
        }

        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: trimmed.to_string(),
            timeout: None,
            access_token: None,
        })
    }

    /// Create a client from configuration.
    pub fn from_config(config: &ChatConfig) -> ChatResult<Self> {
        let mut client = Self::new(&config.api.base_url)?;
        client.timeout = config.request_timeout();
        client.access_token = config.api.access_token.clone();
        Ok(client)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request/response call with the configured timeout and decode the JSON body.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let mut request = self.authorize(request);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = check_status(request.send().await?).await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        response.json().await.map_err(|e| {
            TransportError::new(status, format!("Invalid response body: {}", e)).with_url(url)
        })
    }
}

/// Pass a successful response through, or turn the error body into a [`TransportError`].
async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let error = error_from_body(status.as_u16(), &body).with_url(url);
    warn!(status = error.status, message = %error.message, "Backend request failed");
    Err(error)
}

/// Parse a backend error body leniently.
///
/// Understands `{"message", "code", "details"}` and `{"detail": ...}`;
/// anything else becomes the message verbatim.
pub fn error_from_body(status: u16, body: &str) -> TransportError {
    let fallback = || {
        let text = body.trim();
        if text.is_empty() {
            format!("Request failed with status {}", status)
        } else {
            text.to_string()
        }
    };

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return TransportError::new(status, fallback());
    };

    let mut error = match (map.get("message"), map.get("detail")) {
        (Some(Value::String(message)), _) => TransportError::new(status, message.clone()),
        (_, Some(Value::String(detail))) => TransportError::new(status, detail.clone()),
        (_, Some(detail)) => {
            TransportError::new(status, fallback()).with_details(json!({ "detail": detail }))
        }
        _ => TransportError::new(status, fallback()),
    };

    if let Some(code) = map.get("code").and_then(Value::as_str) {
        error = error.with_code(code);
    }
    if let Some(details) = map.get("details") {
        error = error.with_details(details.clone());
    }
    error
}

/// Multipart part for an upload. An unparseable MIME type is left off.
fn file_part(file: &UploadFile) -> Part {
    let part = || Part::bytes(file.data.clone()).file_name(file.name.clone());
    match &file.content_type {
        Some(mime) => part().mime_str(mime).unwrap_or_else(|_| {
            debug!(file = %file.name, mime = %mime, "Ignoring invalid content type");
            part()
        }),
        None => part(),
    }
}

#[async_trait]
impl ChatApi for HttpChatClient {
    async fn create_session(&self, title: Option<&str>) -> ApiResult<Session> {
        let request = self
            .client
            .post(self.endpoint("chat/sessions"))
            .json(&json!({ "title": title }));
        self.call(request).await
    }

    async fn reset_session(&self, session_id: &str) -> ApiResult<Session> {
        let request = self
            .client
            .post(self.endpoint(&format!("chat/reset/{}", session_id)));
        self.call(request).await
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        role: MessageRole,
    ) -> ApiResult<Message> {
        let request = self.client.post(self.endpoint("chat/send")).json(&json!({
            "session_id": session_id,
            "content": content,
            "role": role,
        }));
        self.call(request).await
    }

    async fn open_stream(&self, session_id: &str, research_mode: bool) -> ApiResult<PushSource> {
        let request = self
            .client
            .get(self.endpoint(&format!("chat/stream/{}", session_id)))
            .query(&[("research_mode", research_mode)])
            .header(reqwest::header::ACCEPT, "text/event-stream");

        let response = check_status(self.authorize(request).send().await?).await?;
        debug!(session_id, url = %response.url(), "Reply stream connected");
        Ok(Box::pin(decode_events(Box::pin(response.bytes_stream()))))
    }

    async fn upload_file(
        &self,
        file: &UploadFile,
        session_id: Option<&str>,
    ) -> ApiResult<UploadedDocument> {
        let form = Form::new().part("file", file_part(file));
        let mut request = self.client.post(self.endpoint("files/upload")).multipart(form);
        if let Some(session_id) = session_id {
            request = request.query(&[("session_id", session_id)]);
        }
        self.call(request).await
    }

    async fn list_sessions(&self) -> ApiResult<Vec<Session>> {
        let request = self.client.get(self.endpoint("chat/sessions"));
        self.call(request).await
    }
}
