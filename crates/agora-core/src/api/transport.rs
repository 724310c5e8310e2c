//! HTTP transport used by the session controller.
//!
//! The `Transport` trait is the seam between the session logic and the
//! network. `HttpTransport` is the production implementation on top of
//! `reqwest`; tests substitute a scripted double.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::debug;

use super::request::{FormPart, PartValue, RequestBody};
use super::{ApiError, ApiRequest, ApiResponse};

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub trait Transport: Send + Sync {
    /// Send a request and buffer the response. Non-2xx statuses are returned
    /// as `Ok`; only failures to exchange a response at all are errors.
    fn send(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, ApiError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, ApiError>> + Send {
        (**self).send(request)
    }
}

/// Transport backed by a pooled `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        match request.body {
            Some(RequestBody::Json(ref body)) => builder = builder.json(body),
            Some(RequestBody::Multipart(ref parts)) => builder = builder.multipart(build_form(parts)?),
            None => {}
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(method = %request.method, url = %url, status = status.as_u16(), "Received response");
        Ok(ApiResponse::new(status, body))
    }
}

/// Rebuild a reqwest form from owned parts. `Form` is consumed by sending,
/// so this runs once per attempt.
fn build_form(parts: &[FormPart]) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for part in parts {
        form = match part.value {
            PartValue::Text(ref text) => form.text(part.name.clone(), text.clone()),
            PartValue::File(ref upload) => {
                let mut file = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
                if let Some(ref mime) = upload.mime {
                    file = file.mime_str(mime).map_err(|_| {
                        ApiError::InvalidResponse(format!("Invalid MIME type for upload: {}", mime))
                    })?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}
