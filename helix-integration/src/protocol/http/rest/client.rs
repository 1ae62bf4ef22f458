use super::RestRequest;
use crate::{
    error::SocketError,
    protocol::http::{BuildStrategy, HttpParser},
};
use std::marker::PhantomData;
use tracing::debug;
use url::Url;

/// Thin, generic Http client that executes a [`RestRequest`] against a base [`Url`], delegating
/// request construction (headers, signing) to a [`BuildStrategy`].
#[derive(Debug, Clone)]
pub struct RestClient<Strategy, ErrorParser> {
    pub http_client: reqwest::Client,
    pub base_url: Url,
    pub build_strategy: Strategy,
    pub parser: ErrorParser,
}

impl<Strategy, ErrorParser> RestClient<Strategy, ErrorParser>
where
    Strategy: BuildStrategy,
    ErrorParser: HttpParser,
{
    pub fn new(base_url: Url, build_strategy: Strategy, parser: ErrorParser) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url,
            build_strategy,
            parser,
        }
    }

    pub async fn execute<Request>(
        &self,
        request: Request,
    ) -> Result<Request::Response, ErrorParser::OutputError>
    where
        Request: RestRequest,
    {
        let url = self
            .base_url
            .join(&request.path())
            .map_err(|error| ErrorParser::OutputError::from(SocketError::HttpBuilder(error.to_string())))?;

        let mut builder = self
            .http_client
            .request(Request::method(), url)
            .timeout(Request::timeout());

        if let Some(query) = request.query_params() {
            builder = builder.query(query);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let http_request = self
            .build_strategy
            .build(request, builder)
            .map_err(ErrorParser::OutputError::from)?;

        debug!(method = ?http_request.method(), url = %http_request.url(), "executing RestRequest");

        let response = self
            .http_client
            .execute(http_request)
            .await
            .map_err(|error| ErrorParser::OutputError::from(SocketError::from(error)))?;
        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| ErrorParser::OutputError::from(SocketError::from(error)))?;

        self.parser.parse::<Request::Response>(status, &payload)
    }
}

/// Zero-sized marker used where a [`RestRequest::QueryParams`] or [`RestRequest::Body`] is
/// unused by a particular request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParams<T = ()>(PhantomData<T>);

impl<T> serde::Serialize for NoParams<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_none()
    }
}
