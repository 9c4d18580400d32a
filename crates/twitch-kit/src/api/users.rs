use super::*;

const USERS_PATH: &str = "/users";

pub type UsersListResponse = ListResponse<User>;

pub struct UsersResource<'a> {
    client: &'a Client,
}

impl<'a> UsersResource<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Create a request looking up users by ID or login.
    ///
    /// With a user token and no filters, returns the token's own user.
    pub fn list(&self) -> UsersListCall<'a> {
        UsersListCall {
            client: self.client,
            opts: RequestOptions::new(),
        }
    }
}

/// Pending GET /users call. The endpoint is not paginated, so the
/// returned cursor is always empty.
#[derive(Debug, Clone)]
pub struct UsersListCall<'a> {
    client: &'a Client,
    opts: RequestOptions,
}

impl UsersListCall<'_> {
    pub fn id(mut self, user_id: &str) -> Self {
        self.opts.push(add_query_parameter("id", user_id));
        self
    }

    pub fn login(mut self, login: &str) -> Self {
        self.opts.push(add_query_parameter("login", login));
        self
    }

    pub fn options(&self) -> &RequestOptions {
        &self.opts
    }

    pub async fn send(&self) -> Result<UsersListResponse, TwitchError> {
        self.send_with(&CallContext::default(), std::iter::empty()).await
    }

    pub async fn send_with(
        &self,
        ctx: &CallContext,
        extra: impl IntoIterator<Item = RequestOption>,
    ) -> Result<UsersListResponse, TwitchError> {
        self.client
            .get_list(USERS_PATH, &self.opts, ctx, extra)
            .await
    }
}
