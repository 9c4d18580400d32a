use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::*;

/// One deferred mutation to an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOption {
    /// Replace every value of a query parameter.
    SetQuery { key: String, value: String },
    /// Append another value to a (repeatable) query parameter.
    AddQuery { key: String, value: String },
    /// Replace a request header.
    SetHeader { name: String, value: String },
}

pub fn set_query_parameter(key: impl Into<String>, value: impl Into<String>) -> RequestOption {
    RequestOption::SetQuery {
        key: key.into(),
        value: value.into(),
    }
}

pub fn add_query_parameter(key: impl Into<String>, value: impl Into<String>) -> RequestOption {
    RequestOption::AddQuery {
        key: key.into(),
        value: value.into(),
    }
}

pub fn set_header(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    RequestOption::SetHeader {
        name: name.into(),
        value: value.into(),
    }
}

/// Ordered list of request options, realized at execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions(Vec<RequestOption>);

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, option: RequestOption) {
        self.0.push(option);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestOption> {
        self.0.iter()
    }

    /// Apply every option in order. Later `SetQuery`/`SetHeader` options
    /// replace earlier ones for the same key.
    pub fn resolve(&self) -> ResolvedRequest {
        let mut resolved = ResolvedRequest::default();
        for option in &self.0 {
            resolved.apply(option);
        }
        resolved
    }
}

impl FromIterator<RequestOption> for RequestOptions {
    fn from_iter<I: IntoIterator<Item = RequestOption>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<RequestOption> for RequestOptions {
    fn extend<I: IntoIterator<Item = RequestOption>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

/// Final query parameters and extra headers of a request.
///
/// Header names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub query: BTreeMap<String, Vec<String>>,
    pub headers: BTreeMap<String, String>,
}

impl ResolvedRequest {
    fn apply(&mut self, option: &RequestOption) {
        match option {
            RequestOption::SetQuery { key, value } => {
                self.query.insert(key.clone(), vec![value.clone()]);
            }
            RequestOption::AddQuery { key, value } => {
                self.query.entry(key.clone()).or_default().push(value.clone());
            }
            RequestOption::SetHeader { name, value } => {
                self.headers.insert(name.to_ascii_lowercase(), value.clone());
            }
        }
    }

    /// Last value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    /// Flattened `(key, value)` pairs in key order.
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
            .collect()
    }
}

/// Cancellation and deadline threaded through a single call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the call with [`TwitchError::Cancelled`] once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Abort the call with [`TwitchError::Timeout`] at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Drive `fut` to completion unless cancelled or past the deadline.
    /// The future (and any response body it holds) is dropped on abort.
    pub(super) async fn run<T>(
        &self,
        fut: impl Future<Output = Result<T, TwitchError>>,
    ) -> Result<T, TwitchError> {
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| TwitchError::Timeout)?,
                None => fut.await,
            }
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!("Helix call cancelled");
                        Err(TwitchError::Cancelled)
                    }
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }
}

/// One decoded page of a list endpoint.
#[derive(Debug, Clone)]
pub struct ListResponse<T> {
    pub header: HeaderMap,
    pub data: Vec<T>,
    /// Continuation cursor; empty when there are no further pages.
    pub cursor: String,
}

impl<T> ListResponse<T> {
    pub fn has_more(&self) -> bool {
        !self.cursor.is_empty()
    }
}

impl Client {
    /// Execute a request against `base_url + path` with the given options.
    ///
    /// Non-success statuses are turned into [`TwitchError::ApiError`] after
    /// the error body has been read.
    pub async fn do_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<reqwest::Response, TwitchError> {
        let resolved = options.resolve();
        let url = self.request_url(path, &resolved)?;
        let headers = self.request_headers(&resolved)?;

        let mut req = self.http.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            req = req.json(body);
        }

        tracing::debug!(%method, path, "Sending Helix request");
        let resp = req.send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await?;
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!(path, "Got 401, caller should refresh token and retry");
        } else {
            tracing::debug!(path, status = status.as_u16(), "Helix request failed");
        }
        Err(api_error(status.as_u16(), body))
    }

    /// GET a list endpoint and decode one page. Builder options are applied
    /// before `extra`, so call-time options win on duplicate keys.
    pub(super) async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
        ctx: &CallContext,
        extra: impl IntoIterator<Item = RequestOption>,
    ) -> Result<ListResponse<T>, TwitchError> {
        let mut merged = options.clone();
        merged.extend(extra);

        ctx.run(async {
            let resp = self
                .do_request(Method::GET, path, None::<&()>, &merged)
                .await?;
            let page = decode_response::<T>(resp).await?;
            tracing::debug!(path, count = page.data.len(), has_more = page.has_more(), "Decoded Helix page");
            Ok(page)
        })
        .await
    }

    fn request_url(&self, path: &str, resolved: &ResolvedRequest) -> Result<Url, TwitchError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        if !resolved.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in resolved.query_pairs() {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Client-Id and Bearer headers, then per-request overrides.
    fn request_headers(&self, resolved: &ResolvedRequest) -> Result<HeaderMap, TwitchError> {
        let mut headers = HeaderMap::new();
        headers.insert("Client-Id", header_value(&self.client_id)?);
        if let Some(token) = &self.access_token {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
        for (name, value) in &resolved.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TwitchError::InvalidHeader(e.to_string()))?;
            headers.insert(name, header_value(value)?);
        }
        Ok(headers)
    }
}

/// Consume the response body and decode the `{data, pagination}` envelope.
pub(super) async fn decode_response<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<ListResponse<T>, TwitchError> {
    let header = resp.headers().clone();
    let body = resp.bytes().await?;
    let envelope: HelixPaginatedResponse<T> = serde_json::from_slice(&body)?;

    Ok(ListResponse {
        header,
        data: envelope.data,
        cursor: envelope
            .pagination
            .and_then(|p| p.cursor)
            .unwrap_or_default(),
    })
}

pub(super) fn api_error(status: u16, body: String) -> TwitchError {
    let message = serde_json::from_str::<HelixError>(&body)
        .ok()
        .map(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or(body);
    TwitchError::ApiError { status, message }
}

fn header_value(value: &str) -> Result<HeaderValue, TwitchError> {
    HeaderValue::from_str(value).map_err(|e| TwitchError::InvalidHeader(e.to_string()))
}
