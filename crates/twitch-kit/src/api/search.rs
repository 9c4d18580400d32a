use super::*;

const SEARCH_CHANNELS_PATH: &str = "/search/channels";
const SEARCH_CATEGORIES_PATH: &str = "/search/categories";

pub type SearchChannelsListResponse = ListResponse<SearchChannel>;
pub type SearchCategoriesListResponse = ListResponse<SearchCategory>;

/// Channels matching a search query.
pub struct SearchChannelsResource<'a> {
    client: &'a Client,
}

impl<'a> SearchChannelsResource<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Create a request listing channels that match the query.
    ///
    /// Requires an app or user access token. No scope is required.
    pub fn list(&self) -> SearchChannelsListCall<'a> {
        SearchChannelsListCall {
            client: self.client,
            opts: RequestOptions::new(),
        }
    }
}

/// Pending GET /search/channels call.
#[derive(Debug, Clone)]
pub struct SearchChannelsListCall<'a> {
    client: &'a Client,
    opts: RequestOptions,
}

impl SearchChannelsListCall<'_> {
    /// The search string; the transport URI-encodes it.
    pub fn query(mut self, query: &str) -> Self {
        self.opts.push(set_query_parameter("query", query));
        self
    }

    /// Only return channels that are streaming live. The default is false.
    pub fn live_only(mut self, live_only: bool) -> Self {
        self.opts.push(set_query_parameter("live_only", live_only.to_string()));
        self
    }

    /// Maximum number of results per page.
    ///
    /// Maximum: 100 (default: 20). Not validated locally.
    pub fn first(mut self, n: u32) -> Self {
        self.opts.push(set_query_parameter("first", n.to_string()));
        self
    }

    /// Continue from the cursor of a previous page.
    pub fn after(mut self, cursor: &str) -> Self {
        self.opts.push(set_query_parameter("after", cursor));
        self
    }

    pub fn options(&self) -> &RequestOptions {
        &self.opts
    }

    /// Execute the request.
    pub async fn send(&self) -> Result<SearchChannelsListResponse, TwitchError> {
        self.send_with(&CallContext::default(), std::iter::empty()).await
    }

    /// Execute the request under `ctx`, applying `extra` after the builder's
    /// own options.
    pub async fn send_with(
        &self,
        ctx: &CallContext,
        extra: impl IntoIterator<Item = RequestOption>,
    ) -> Result<SearchChannelsListResponse, TwitchError> {
        self.client
            .get_list(SEARCH_CHANNELS_PATH, &self.opts, ctx, extra)
            .await
    }
}

/// Games and categories matching a search query.
pub struct SearchCategoriesResource<'a> {
    client: &'a Client,
}

impl<'a> SearchCategoriesResource<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub fn list(&self) -> SearchCategoriesListCall<'a> {
        SearchCategoriesListCall {
            client: self.client,
            opts: RequestOptions::new(),
        }
    }
}

/// Pending GET /search/categories call.
#[derive(Debug, Clone)]
pub struct SearchCategoriesListCall<'a> {
    client: &'a Client,
    opts: RequestOptions,
}

impl SearchCategoriesListCall<'_> {
    pub fn query(mut self, query: &str) -> Self {
        self.opts.push(set_query_parameter("query", query));
        self
    }

    pub fn first(mut self, n: u32) -> Self {
        self.opts.push(set_query_parameter("first", n.to_string()));
        self
    }

    pub fn after(mut self, cursor: &str) -> Self {
        self.opts.push(set_query_parameter("after", cursor));
        self
    }

    pub fn options(&self) -> &RequestOptions {
        &self.opts
    }

    pub async fn send(&self) -> Result<SearchCategoriesListResponse, TwitchError> {
        self.send_with(&CallContext::default(), std::iter::empty()).await
    }

    pub async fn send_with(
        &self,
        ctx: &CallContext,
        extra: impl IntoIterator<Item = RequestOption>,
    ) -> Result<SearchCategoriesListResponse, TwitchError> {
        self.client
            .get_list(SEARCH_CATEGORIES_PATH, &self.opts, ctx, extra)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_first_keeps_last_value() {
        let client = Client::new("cid");
        let call = client.search_channels().list().first(10).first(5);

        let resolved = call.options().resolve();
        assert_eq!(resolved.query_value("first"), Some("5"));
        assert_eq!(resolved.query["first"].len(), 1);
    }

    #[test]
    fn setter_order_does_not_change_parameters() {
        let client = Client::new("cid");
        let a = client.search_channels().list().query("a").live_only(true);
        let b = client.search_channels().list().live_only(true).query("a");

        assert_eq!(a.options().resolve(), b.options().resolve());
        assert_eq!(a.options().resolve().query_value("live_only"), Some("true"));
    }

    #[test]
    fn fresh_call_has_no_options() {
        let client = Client::new("cid");
        assert!(client.search_categories().list().options().is_empty());
    }
}
