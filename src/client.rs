use crate::error::ApiError;
use crate::rate_limit::TokenBucket;
use log::{debug, warn};
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// User agents to rotate through, one picked per request
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

fn random_user_agent() -> &'static str {
    let index = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

/// Sort direction for sortable list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub direction: Direction,
}

impl SortSpec {
    pub fn asc(field: &str) -> Self {
        SortSpec {
            field: field.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        SortSpec {
            field: field.to_string(),
            direction: Direction::Desc,
        }
    }

    fn to_param(&self) -> Result<String, ApiError> {
        if self.field.trim().is_empty() {
            return Err(ApiError::IllegalArgument(
                "sort spec must name a field".to_string(),
            ));
        }
        let dir = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        Ok(format!("{}:{}", self.field, dir))
    }
}

/// Query parameters for one API request.
///
/// `field_list` always ends up carrying `id`; without it the identity cache
/// has nothing to key on.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub field_list: Vec<String>,
    pub filter: Vec<String>,
    pub sort: Option<SortSpec>,
    pub query: Option<String>,
    pub resources: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub page: Option<u32>,
}

impl Params {
    pub fn with_fields(fields: &[&str]) -> Self {
        Params {
            field_list: fields.iter().map(|f| f.to_string()).collect(),
            ..Params::default()
        }
    }

    pub fn filtered(filter: Vec<String>, fields: &[&str]) -> Self {
        Params {
            filter,
            ..Params::with_fields(fields)
        }
    }

    pub(crate) fn to_query(&self, api_key: &str) -> Result<Vec<(String, String)>, ApiError> {
        let mut pairs = vec![
            ("format".to_string(), "json".to_string()),
            ("api_key".to_string(), api_key.to_string()),
        ];
        if !self.field_list.is_empty() {
            let mut fields = self.field_list.clone();
            if !fields.iter().any(|f| f == "id") {
                fields.insert(0, "id".to_string());
            }
            pairs.push(("field_list".to_string(), fields.join(",")));
        }
        if !self.filter.is_empty() {
            pairs.push(("filter".to_string(), self.filter.join(",")));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort".to_string(), sort.to_param()?));
        }
        if let Some(query) = &self.query {
            pairs.push(("query".to_string(), query.clone()));
        }
        if let Some(resources) = &self.resources {
            pairs.push(("resources".to_string(), resources.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        Ok(pairs)
    }
}

/// The JSON envelope every endpoint answers with. `results` is an object for
/// detail requests and an array for list/search requests.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub number_of_page_results: u32,
    #[serde(default)]
    pub number_of_total_results: u32,
    pub status_code: i64,
    #[serde(default)]
    pub results: Value,
}

const STATUS_OK: i64 = 1;

/// Decode an envelope, mapping non-success status codes to typed errors and
/// normalizing newline-joined `aliases` strings into lists.
pub(crate) fn parse_envelope(body: &str) -> Result<Envelope, ApiError> {
    let mut envelope: Envelope =
        serde_json::from_str(body).map_err(|e| ApiError::Json(e.to_string()))?;
    if envelope.status_code != STATUS_OK {
        return Err(ApiError::from_status(envelope.status_code, &envelope.error));
    }
    if let Value::Object(results) = &mut envelope.results {
        let aliases = match results.get("aliases") {
            Some(Value::String(aliases)) => Some(
                aliases
                    .split('\n')
                    .map(|a| Value::String(a.to_string()))
                    .collect::<Vec<Value>>(),
            ),
            _ => None,
        };
        if let Some(list) = aliases {
            results.insert("aliases".to_string(), Value::Array(list));
        }
    }
    Ok(envelope)
}

/// Issues one HTTP GET against the catalog API.
///
/// Cheap to clone; the underlying reqwest client pools connections and the
/// token bucket is shared.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    timeout: Option<Duration>,
    bucket: Arc<TokenBucket>,
}

impl ApiClient {
    pub fn new(
        api_base: String,
        api_key: String,
        timeout: Option<Duration>,
        bucket: Arc<TokenBucket>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;
        Ok(ApiClient {
            http,
            api_base,
            api_key,
            timeout,
            bucket,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Perform one GET and decode the envelope. Consumes a rate-limiter token
    /// before the request goes out.
    pub async fn execute(&self, url: &str, params: &Params) -> Result<Envelope, ApiError> {
        if self.api_key.is_empty() {
            return Err(ApiError::InvalidApiKey("no API key configured".to_string()));
        }
        let query = params.to_query(&self.api_key)?;
        self.bucket.consume().await;
        debug!("calling {}", url);
        let mut request = self
            .http
            .get(url)
            .query(&query)
            .header("User-Agent", random_user_agent());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let body = request.send().await?.text().await?;
        parse_envelope(&body)
    }
}

/// Bounded retry with jittered backoff around an API operation.
///
/// Fatal kinds (see `ApiError::is_retryable`) propagate on first occurrence;
/// anything else is retried and the last error re-raised unchanged on
/// exhaustion. The API can be a little flaky, so a retry makes sure an error
/// is real; the 100-600 ms sleep keeps us polite to busy servers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: usize,
}

impl RetryPolicy {
    pub fn new(attempts: usize) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
        }
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!("not retrying fatal error: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("attempt {}/{} failed: {}", attempt, self.attempts, e);
                    if attempt >= self.attempts {
                        return Err(e);
                    }
                    let backoff = rand::thread_rng().gen_range(100..600);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }
}
