//! Twitch Helix REST API client.
//!
//! Resources hand out call builders that accumulate query parameters and
//! finish with `send`, which performs one GET and decodes the paginated
//! `{data, pagination}` envelope. Every request carries the Client-Id
//! header and, when configured, a Bearer token.

mod request;
mod search;
mod streams;
mod users;

pub mod models;


use std::time::Duration;

use url::Url;

pub use models::{
    HelixError, HelixPaginatedResponse, HelixPagination, SearchCategory, SearchChannel, Stream,
    User,
};
pub use request::{
    CallContext, ListResponse, RequestOption, RequestOptions, ResolvedRequest, add_query_parameter,
    set_header, set_query_parameter,
};
pub use search::{
    SearchCategoriesListCall, SearchCategoriesListResponse, SearchCategoriesResource,
    SearchChannelsListCall, SearchChannelsListResponse, SearchChannelsResource,
};
pub use streams::{StreamsListCall, StreamsListResponse, StreamsResource};
pub use users::{UsersListCall, UsersListResponse, UsersResource};

use crate::config::{DEFAULT_API_BASE_URL, TwitchConfig};
use crate::TwitchError;

/// Twitch Helix API client.
///
/// Immutable after construction and cheap to clone; share it by reference
/// with every resource.
#[derive(Debug, Clone)]
pub struct Client {
    pub(super) http: reqwest::Client,
    pub(super) client_id: String,
    pub(super) access_token: Option<String>,
    pub(super) base_url: String,
}

impl Client {
    /// Create a client against the public Helix endpoint with no token.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            access_token: None,
            base_url: DEFAULT_API_BASE_URL.into(),
        }
    }

    pub fn builder(client_id: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(client_id)
    }

    /// Create a client from a loaded [`TwitchConfig`].
    pub fn from_config(config: &TwitchConfig) -> Result<Self, TwitchError> {
        let mut builder = ClientBuilder::new(config.client_id.clone()).base_url(&config.api_base_url);
        if !config.access_token.is_empty() {
            builder = builder.access_token(config.access_token.clone());
        }
        builder.build()
    }

    /// Same transport and settings, different bearer token.
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..self.clone()
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn search_channels(&self) -> SearchChannelsResource<'_> {
        SearchChannelsResource::new(self)
    }

    pub fn search_categories(&self) -> SearchCategoriesResource<'_> {
        SearchCategoriesResource::new(self)
    }

    pub fn streams(&self) -> StreamsResource<'_> {
        StreamsResource::new(self)
    }

    pub fn users(&self) -> UsersResource<'_> {
        UsersResource::new(self)
    }
}

/// Options applied when constructing a [`Client`].
pub struct ClientBuilder {
    client_id: String,
    access_token: Option<String>,
    base_url: String,
    http: Option<reqwest::Client>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            access_token: None,
            base_url: DEFAULT_API_BASE_URL.into(),
            http: None,
            user_agent: None,
            timeout: None,
        }
    }

    /// Override the Helix base URL (e.g. a mock server).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    /// Use a preconfigured HTTP client. `user_agent` and `timeout` are
    /// ignored when this is set.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Per-request timeout applied by the transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Client, TwitchError> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(user_agent) = self.user_agent {
                    builder = builder.user_agent(user_agent);
                }
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build()?
            }
        };

        Ok(Client {
            http,
            client_id: self.client_id,
            access_token: self.access_token.filter(|t| !t.is_empty()),
            base_url,
        })
    }
}
