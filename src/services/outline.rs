//! Rate-limited Outline API client.
//!
//! Every outbound request acquires the shared [`RateBudget`] first, then
//! runs under the retry state machine in [`super::retry`]. Attachment
//! uploads follow Outline's two-step flow: `attachments.create` returns a
//! presigned URL plus form fields, and the bytes go to that URL in an
//! unauthenticated multipart POST.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{Attachment, AttachmentUpload, ClientConfig, Collection, Document, Envelope};

use super::retry::{self, Attempt, RetryPolicy};

/// Operations the migration drives against the destination system.
#[async_trait]
pub trait OutlineApi {
    /// Verify the credential, returning the connected user's name.
    async fn verify_auth(&self) -> Result<String>;

    /// Fetch an existing collection.
    async fn get_collection(&self, id: &str) -> Result<Collection>;

    /// Create a new collection.
    async fn create_collection(
        &self,
        name: &str,
        description: &str,
        color: &str,
    ) -> Result<Collection>;

    /// Create a document, optionally nested under a parent document.
    async fn create_document(
        &self,
        title: &str,
        text: &str,
        collection_id: &str,
        parent_document_id: Option<&str>,
    ) -> Result<Document>;

    /// Replace a document's content.
    async fn update_document(&self, id: &str, text: &str) -> Result<()>;

    /// Upload an attachment for a document. Rejects oversized payloads
    /// with `AttachmentTooLarge` before any network call.
    async fn upload_attachment(
        &self,
        document_id: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Attachment>;
}

/// Process-wide outgoing request pacing state.
///
/// Owned by the client behind a mutex; with the single sequential worker
/// this serializes nothing in practice, but keeps the budget correct if
/// independent root trees are ever migrated in parallel.
#[derive(Debug)]
pub struct RateBudget {
    min_interval: Duration,
    last_request: Option<Instant>,
    requests_issued: u64,
}

impl RateBudget {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
            requests_issued: 0,
        }
    }

    /// Wait until the pacing interval since the previous request has
    /// elapsed, then record this request.
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            tokio::time::sleep_until(last + self.min_interval).await;
        }
        self.last_request = Some(Instant::now());
        self.requests_issued += 1;
    }

    /// Total requests issued through this budget.
    pub fn requests_issued(&self) -> u64 {
        self.requests_issued
    }
}

/// HTTP client for the Outline REST API.
pub struct OutlineClient {
    http: Client,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
    budget: Mutex<RateBudget>,
    max_upload_bytes: u64,
}

impl OutlineClient {
    /// Create a client for the given Outline instance.
    pub fn new(
        base_url: &str,
        api_key: &str,
        max_upload_bytes: u64,
        config: &ClientConfig,
    ) -> Result<Self> {
        // Fail on a malformed URL before the first request is built.
        url::Url::parse(base_url)?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            policy: RetryPolicy::from_config(config),
            budget: Mutex::new(RateBudget::new(Duration::from_millis(
                config.request_delay_ms,
            ))),
            max_upload_bytes,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// POST a JSON payload to an API endpoint with pacing and retries.
    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: serde_json::Value,
        context: &str,
    ) -> Result<T> {
        let url = self.endpoint(path);
        retry::drive(&self.policy, context, move || {
            let payload = payload.clone();
            let url = url.clone();
            async move {
                self.budget.lock().await.acquire().await;
                let sent = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&payload)
                    .send()
                    .await;
                match sent {
                    Ok(response) => classify(response).await,
                    Err(e) => Ok(Attempt::Failed {
                        status: None,
                        message: e.to_string(),
                    }),
                }
            }
        })
        .await
    }
}

/// Classify a response into the retry machine's attempt outcomes.
async fn classify<T: DeserializeOwned>(response: reqwest::Response) -> Result<Attempt<T>> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(60.0)
            .max(0.0);
        return Ok(Attempt::RateLimited {
            retry_after: Duration::from_secs_f64(retry_after),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        return Ok(Attempt::Failed {
            status: Some(status.as_u16()),
            message: format!("HTTP {status}: {snippet}"),
        });
    }

    match response.json::<T>().await {
        Ok(value) => Ok(Attempt::Success(value)),
        Err(e) => Ok(Attempt::Failed {
            status: None,
            message: format!("invalid response body: {e}"),
        }),
    }
}

/// Reject attachments over the configured upload limit. Pure, so the gate
/// is testable without a client.
pub fn check_upload_size(name: &str, size: u64, max: u64) -> Result<()> {
    if size > max {
        return Err(AppError::AttachmentTooLarge {
            name: name.to_string(),
            size,
            max,
        });
    }
    Ok(())
}

#[async_trait]
impl OutlineApi for OutlineClient {
    async fn verify_auth(&self) -> Result<String> {
        let info: serde_json::Value = self.post_json("/auth.info", json!({}), "auth").await?;
        let name = info
            .pointer("/data/user/name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string();
        Ok(name)
    }

    async fn get_collection(&self, id: &str) -> Result<Collection> {
        let envelope: Envelope<Collection> = self
            .post_json(
                "/collections.info",
                json!({ "id": id }),
                &format!("collection {id}"),
            )
            .await?;
        Ok(envelope.data)
    }

    async fn create_collection(
        &self,
        name: &str,
        description: &str,
        color: &str,
    ) -> Result<Collection> {
        let envelope: Envelope<Collection> = self
            .post_json(
                "/collections.create",
                json!({
                    "name": name,
                    "description": description,
                    "color": color,
                }),
                &format!("collection {name}"),
            )
            .await?;
        Ok(envelope.data)
    }

    async fn create_document(
        &self,
        title: &str,
        text: &str,
        collection_id: &str,
        parent_document_id: Option<&str>,
    ) -> Result<Document> {
        let mut payload = json!({
            "title": title,
            "text": text,
            "collectionId": collection_id,
            "publish": true,
        });
        if let Some(parent) = parent_document_id {
            payload["parentDocumentId"] = json!(parent);
        }

        let envelope: Envelope<Document> = self
            .post_json(
                "/documents.create",
                payload,
                &format!("document {title}"),
            )
            .await?;
        Ok(envelope.data)
    }

    async fn update_document(&self, id: &str, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(
                "/documents.update",
                json!({ "id": id, "text": text }),
                &format!("document update {id}"),
            )
            .await?;
        Ok(())
    }

    async fn upload_attachment(
        &self,
        document_id: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Attachment> {
        check_upload_size(name, bytes.len() as u64, self.max_upload_bytes)?;
        let context = format!("attachment {name}");

        let envelope: Envelope<AttachmentUpload> = self
            .post_json(
                "/attachments.create",
                json!({
                    "name": name,
                    "contentType": content_type,
                    "size": bytes.len() as u64,
                    "preset": "documentAttachment",
                    "documentId": document_id,
                }),
                &context,
            )
            .await?;
        let upload = envelope.data;

        // Presigned storage upload: no bearer auth, form fields first,
        // then the file part.
        let mut form = reqwest::multipart::Form::new();
        for (key, value) in &upload.form {
            let text = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            form = form.text(key.clone(), text);
        }
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(content_type)
            .map_err(|e| {
                AppError::api(
                    context.as_str(),
                    format!("invalid content type {content_type}: {e}"),
                    None,
                )
            })?;
        form = form.part("file", part);

        self.budget.lock().await.acquire().await;
        // Transport failures here are per-attachment, not run-fatal.
        let response = self
            .http
            .post(&upload.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                AppError::api(
                    context.as_str(),
                    format!("storage upload failed: {e}"),
                    None,
                )
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(AppError::api(
                context.as_str(),
                format!("storage upload failed with HTTP {status}: {snippet}"),
                Some(status.as_u16()),
            ));
        }

        Ok(upload.attachment)
    }
}
