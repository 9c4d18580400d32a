use super::*;

const STREAMS_PATH: &str = "/streams";

pub type StreamsListResponse = ListResponse<Stream>;

/// Live streams, most viewers first.
pub struct StreamsResource<'a> {
    client: &'a Client,
}

impl<'a> StreamsResource<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Create a request listing live streams, optionally filtered by
    /// broadcaster, game or language.
    ///
    /// Requires an app or user access token. No scope is required.
    pub fn list(&self) -> StreamsListCall<'a> {
        StreamsListCall {
            client: self.client,
            opts: RequestOptions::new(),
        }
    }
}

/// Pending GET /streams call.
#[derive(Debug, Clone)]
pub struct StreamsListCall<'a> {
    client: &'a Client,
    opts: RequestOptions,
}

impl StreamsListCall<'_> {
    /// Filter by broadcaster ID. Repeatable, up to 100 IDs.
    pub fn user_id(mut self, user_id: &str) -> Self {
        self.opts.push(add_query_parameter("user_id", user_id));
        self
    }

    /// Filter by broadcaster login. Repeatable, up to 100 logins.
    pub fn user_login(mut self, login: &str) -> Self {
        self.opts.push(add_query_parameter("user_login", login));
        self
    }

    /// Filter by game or category ID. Repeatable, up to 100 IDs.
    pub fn game_id(mut self, game_id: &str) -> Self {
        self.opts.push(add_query_parameter("game_id", game_id));
        self
    }

    /// Filter by ISO 639-1 language code, or "other". Repeatable.
    pub fn language(mut self, language: &str) -> Self {
        self.opts.push(add_query_parameter("language", language));
        self
    }

    /// "all" or "live". The default is "all".
    pub fn stream_type(mut self, stream_type: &str) -> Self {
        self.opts.push(set_query_parameter("type", stream_type));
        self
    }

    /// Maximum: 100 (default: 20).
    pub fn first(mut self, n: u32) -> Self {
        self.opts.push(set_query_parameter("first", n.to_string()));
        self
    }

    pub fn before(mut self, cursor: &str) -> Self {
        self.opts.push(set_query_parameter("before", cursor));
        self
    }

    pub fn after(mut self, cursor: &str) -> Self {
        self.opts.push(set_query_parameter("after", cursor));
        self
    }

    pub fn options(&self) -> &RequestOptions {
        &self.opts
    }

    pub async fn send(&self) -> Result<StreamsListResponse, TwitchError> {
        self.send_with(&CallContext::default(), std::iter::empty()).await
    }

    pub async fn send_with(
        &self,
        ctx: &CallContext,
        extra: impl IntoIterator<Item = RequestOption>,
    ) -> Result<StreamsListResponse, TwitchError> {
        self.client
            .get_list(STREAMS_PATH, &self.opts, ctx, extra)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_user_ids_are_all_sent() {
        let client = Client::new("cid");
        let call = client
            .streams()
            .list()
            .user_id("u1")
            .user_id("u2")
            .first(2);

        let resolved = call.options().resolve();
        assert_eq!(
            resolved.query_pairs(),
            vec![("first", "2"), ("user_id", "u1"), ("user_id", "u2")]
        );
    }

    #[test]
    fn stream_type_uses_type_key() {
        let client = Client::new("cid");
        let call = client.streams().list().stream_type("live");
        assert_eq!(call.options().resolve().query_value("type"), Some("live"));
    }
}
