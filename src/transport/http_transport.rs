use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::Method;

use crate::config::ServerConfig;
use crate::error::ProxyError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request headers that describe the client connection, not the request.
const REQUEST_HOP_HEADERS: [HeaderName; 4] = [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION];
/// Response headers recomputed for the downstream connection.
const RESPONSE_HOP_HEADERS: [HeaderName; 3] = [CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION];

fn build_reqwest_client(config: &ServerConfig) -> Result<reqwest::Client, reqwest::Error> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(config.timeout())
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
}

/// Pooled HTTP client bound to the single backend every request goes to.
pub struct HttpTransport {
    client: reqwest::Client,
    target_base: String,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let client = match build_reqwest_client(config) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            target_base: config.target_base().to_owned(),
        }
    }

    #[must_use]
    pub fn target_base(&self) -> &str {
        &self.target_base
    }

    /// Send a request to the backend with the same method, path and body.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::BackendUnavailable`] when the backend cannot be
    /// reached or drops the connection before sending response headers.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        mut headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        strip_request_hop_headers(&mut headers);
        let mut url = String::with_capacity(self.target_base.len() + path_and_query.len());
        url.push_str(&self.target_base);
        url.push_str(path_and_query);

        self.client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(ProxyError::BackendUnavailable)
    }
}

pub fn strip_request_hop_headers(headers: &mut HeaderMap) {
    for name in &REQUEST_HOP_HEADERS {
        headers.remove(name);
    }
}

pub fn strip_response_hop_headers(headers: &mut HeaderMap) {
    for name in &RESPONSE_HOP_HEADERS {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("proxy:7999"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("authorization", HeaderValue::from_static("Bearer x"));
        strip_request_hop_headers(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("authorization"));

        let mut response = HeaderMap::new();
        response.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        response.insert("content-type", HeaderValue::from_static("text/event-stream"));
        strip_response_hop_headers(&mut response);
        assert_eq!(response.len(), 1);
    }

    #[test]
    fn target_base_drops_trailing_slash() {
        let config = ServerConfig {
            target_url: "http://backend:8080/".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(HttpTransport::new(&config).target_base(), "http://backend:8080");
    }
}
