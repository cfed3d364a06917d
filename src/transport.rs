// =============================================================================
// transport.rs: ONE GET, NO SECOND CHANCES
// =============================================================================
//
// The transport does exactly one thing: GET a URL and hand back the body.
// It follows redirects by hand (reqwest's own redirect policy is switched
// off) so the hop count is ours to cap, and every hop gets the full timeout.
//
// There are no retries. A source that fails this run simply contributes
// nothing, and the orchestrator moves on. The sources will still be there
// next time someone runs us.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{ConfigError, TransportConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a fetch produced no response.
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connect, TLS, reset, broken body: anything below HTTP.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },

    #[error("gave up on {url} after {limit} redirects")]
    TooManyRedirects { url: String, limit: u32 },

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    pub fn network(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        FetchError::Network { url: url.into(), source: source.into() }
    }
}

/// A response that made it all the way back, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Where we ended up after redirects. Relative links resolve against this.
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    #[cfg(test)]
    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self { url: url.into(), status: 200, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-call extras. Headers here override the transport defaults on every hop.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: Vec<(String, String)>,
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<RawResponse, FetchError>;
}

/// The real thing, on top of reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    max_redirects: u32,
}

impl HttpTransport {
    /// A client that cannot be built is a configuration problem (a user agent
    /// that is not a valid header value, say), not a fetch failure.
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout,
            max_redirects: config.max_redirects,
        })
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string(), timeout: self.timeout }
        } else {
            FetchError::network(url, err)
        }
    }
}

#[async_trait]
impl Fetch for HttpTransport {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<RawResponse, FetchError> {
        let headers = build_headers(&options.headers)?;
        let mut current = parse_url(url)?;
        let mut hops = 0u32;

        loop {
            let response = self
                .client
                .get(current.clone())
                .headers(headers.clone())
                .send()
                .await
                .map_err(|e| self.classify(current.as_str(), e))?;

            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if let (true, Some(location)) = (status.is_redirection(), location) {
                if hops >= self.max_redirects {
                    return Err(FetchError::TooManyRedirects {
                        url: url.to_string(),
                        limit: self.max_redirects,
                    });
                }
                hops += 1;

                let next = current.join(&location).map_err(|e| FetchError::InvalidUrl {
                    url: location.clone(),
                    reason: e.to_string(),
                })?;
                debug!(from = %current, to = %next, status = status.as_u16(), hop = hops, "Following redirect");
                current = next;
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| self.classify(current.as_str(), e))?;

            debug!(url = %current, status = status.as_u16(), bytes = body.len(), "Fetched");

            return Ok(RawResponse {
                url: current.to_string(),
                status: status.as_u16(),
                body,
            });
        }
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn build_headers(pairs: &[(String, String)]) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let invalid = |reason: String| FetchError::InvalidUrl {
            url: format!("header {name}"),
            reason,
        };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

// =============================================================================
// A throwaway HTTP server for tests
// =============================================================================
// Raw TCP, canned responses, one per connection, served in order. Counts the
// connections so tests can prove a component never called out at all.
// =============================================================================

#[cfg(test)]
pub(crate) mod test_server {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::Mutex;

    pub(crate) enum Reply {
        /// Written verbatim after the request has been read.
        Raw(String),
        /// Read the request, then sit on the connection.
        Stall(Duration),
    }

    pub(crate) fn http(status: u16, reason: &str, headers: &[(&str, &str)], body: &str) -> Reply {
        let mut out = format!("HTTP/1.1 {status} {reason}\r\n");
        for (k, v) in headers {
            out.push_str(&format!("{k}: {v}\r\n"));
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ));
        Reply::Raw(out)
    }

    pub(crate) struct TestServer {
        pub addr: SocketAddr,
        pub hits: Arc<AtomicUsize>,
        pub requests: Arc<Mutex<Vec<String>>>,
    }

    impl TestServer {
        pub(crate) fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        pub(crate) fn hit_count(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    /// Serve `replies` in order, one per connection. When they run out the
    /// last one repeats.
    pub(crate) async fn serve(replies: Vec<Reply>) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let hits_task = Arc::clone(&hits);
        let requests_task = Arc::clone(&requests);
        tokio::spawn(async move {
            let replies = Arc::new(replies);
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let n = hits_task.fetch_add(1, Ordering::SeqCst);
                let replies = Arc::clone(&replies);
                let requests = Arc::clone(&requests_task);
                tokio::spawn(async move {
                    let idx = n.min(replies.len().saturating_sub(1));
                    handle(stream, &replies[idx], requests).await;
                });
            }
        });

        TestServer { addr, hits, requests }
    }

    async fn handle(mut stream: TcpStream, reply: &Reply, requests: Arc<Mutex<Vec<String>>>) {
        let request = read_request(&mut stream).await;
        requests.lock().await.push(request);
        match reply {
            Reply::Raw(raw) => {
                let _ = stream.write_all(raw.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
            Reply::Stall(d) => tokio::time::sleep(*d).await,
        }
    }

    /// Headers plus however much body Content-Length promised.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (k, v) = line.split_once(':')?;
                        k.trim()
                            .eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::{http, serve, Reply};
    use super::*;

    fn transport(timeout_ms: u64, max_redirects: u32) -> HttpTransport {
        HttpTransport::new(&TransportConfig {
            timeout: Duration::from_millis(timeout_ms),
            max_redirects,
            user_agent: "test-agent".to_string(),
        })
        .expect("client builds")
    }

    #[test]
    fn test_unusable_user_agent_is_a_config_error() {
        let result = HttpTransport::new(&TransportConfig {
            timeout: Duration::from_secs(1),
            max_redirects: 5,
            user_agent: "bad\nagent".to_string(),
        });
        assert!(matches!(result, Err(ConfigError::HttpClient(_))));
    }

    #[tokio::test]
    async fn test_plain_get_returns_body_and_status() {
        let server = serve(vec![http(200, "OK", &[], "hello")]).await;
        let resp = transport(2_000, 5)
            .fetch(&server.url("/"), &FetchOptions::default())
            .await
            .expect("fetch ok");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "hello");
        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn test_follows_relative_redirect() {
        let server = serve(vec![
            http(302, "Found", &[("Location", "/landing")], ""),
            http(200, "OK", &[], "landed"),
        ])
        .await;
        let resp = transport(2_000, 5)
            .fetch(&server.url("/start"), &FetchOptions::default())
            .await
            .expect("fetch ok");
        assert_eq!(resp.body, "landed");
        assert!(resp.url.ends_with("/landing"));
        assert_eq!(server.hit_count(), 2);
    }

    #[tokio::test]
    async fn test_redirect_loop_hits_the_cap() {
        // The single reply repeats forever.
        let server = serve(vec![http(301, "Moved", &[("Location", "/again")], "")]).await;
        let err = transport(2_000, 3)
            .fetch(&server.url("/again"), &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects { limit: 3, .. }));
        assert_eq!(server.hit_count(), 4);
    }

    #[tokio::test]
    async fn test_redirect_without_location_is_returned_as_is() {
        let server = serve(vec![http(304, "Not Modified", &[], "")]).await;
        let resp = transport(2_000, 5)
            .fetch(&server.url("/"), &FetchOptions::default())
            .await
            .expect("fetch ok");
        assert_eq!(resp.status, 304);
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = serve(vec![Reply::Stall(Duration::from_secs(5))]).await;
        let err = transport(200, 5)
            .fetch(&server.url("/"), &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_network_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = transport(2_000, 5)
            .fetch(&format!("http://127.0.0.1:{port}/"), &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_garbage_url_is_rejected_before_any_request() {
        let err = transport(2_000, 5)
            .fetch("not a url", &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_header_overrides_are_sent() {
        let server = serve(vec![http(200, "OK", &[], "ok")]).await;
        let options = FetchOptions {
            headers: vec![("X-Trace".to_string(), "42".to_string())],
        };
        transport(2_000, 5)
            .fetch(&server.url("/"), &options)
            .await
            .expect("fetch ok");
        let requests = server.requests.lock().await;
        let request = requests[0].to_lowercase();
        assert!(request.contains("x-trace: 42"));
        assert!(request.contains("user-agent: test-agent"));
    }
}
