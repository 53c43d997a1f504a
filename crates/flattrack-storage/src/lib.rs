//! Configuration, HTTP fetch with retry, message sources and the one-shot
//! record store behind the dashboard.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use flattrack_core::normalize::prepare_feed;
use flattrack_core::{parse_records, ListingRecord};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "flattrack-storage";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    api_url: Option<String>,
    web_port: Option<u16>,
    messages_path: Option<PathBuf>,
    http_timeout_secs: Option<u64>,
    http_max_retries: Option<usize>,
    user_agent: Option<String>,
}

/// Settings shared by the web service and the CLI. Values come from an
/// optional `flattracker.yaml` in the workspace root, then environment
/// variables.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Base URL serving `GET /messages`. `None` reads `messages_path` directly.
    pub api_url: Option<String>,
    pub web_port: u16,
    pub messages_path: PathBuf,
    pub http_timeout_secs: u64,
    pub http_max_retries: usize,
    pub user_agent: String,
    pub workspace_root: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            web_port: 8000,
            messages_path: PathBuf::from("fixtures/messages.json"),
            http_timeout_secs: 20,
            http_max_retries: 3,
            user_agent: "flattrack/0.1".to_string(),
            workspace_root: PathBuf::from("."),
        }
    }
}

impl TrackerConfig {
    pub const FILE_NAME: &'static str = "flattracker.yaml";

    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(".")
    }

    pub fn load(workspace_root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let mut config = Self {
            workspace_root: workspace_root.into(),
            ..Self::default()
        };
        let path = config.workspace_root.join(Self::FILE_NAME);
        if path.exists() {
            let yaml = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let file: ConfigFile = serde_yaml::from_str(&yaml)
                .with_context(|| format!("parsing {}", path.display()))?;
            config.apply_file(file);
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(url) = file.api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = Some(url);
        }
        if let Some(port) = file.web_port {
            self.web_port = port;
        }
        if let Some(path) = file.messages_path {
            self.messages_path = path;
        }
        if let Some(secs) = file.http_timeout_secs {
            self.http_timeout_secs = secs;
        }
        if let Some(retries) = file.http_max_retries {
            self.http_max_retries = retries;
        }
        if let Some(agent) = file.user_agent {
            self.user_agent = agent;
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FLATTRACKER_API_URL") {
            self.api_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(port) = lookup("FLATTRACKER_WEB_PORT").and_then(|v| v.parse().ok()) {
            self.web_port = port;
        }
        if let Some(path) = lookup("FLATTRACKER_MESSAGES_PATH") {
            self.messages_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup("FLATTRACKER_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.http_timeout_secs = secs;
        }
        if let Some(retries) = lookup("FLATTRACKER_HTTP_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.http_max_retries = retries;
        }
        if let Some(agent) = lookup("FLATTRACKER_USER_AGENT") {
            self.user_agent = agent;
        }
    }

    /// `messages_path` resolved against the workspace root.
    pub fn messages_file(&self) -> PathBuf {
        if self.messages_path.is_absolute() {
            self.messages_path.clone()
        } else {
            self.workspace_root.join(&self.messages_path)
        }
    }

    pub fn messages_url(&self) -> Option<String> {
        self.api_url.as_deref().map(messages_url)
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            backoff: BackoffPolicy {
                max_retries: self.http_max_retries,
                ..BackoffPolicy::default()
            },
        }
    }

    /// HTTP source when an API URL is configured, otherwise the local file.
    pub fn message_source(&self) -> anyhow::Result<Box<dyn MessageSource>> {
        match self.messages_url() {
            Some(url) => Ok(Box::new(HttpMessageSource::new(
                HttpFetcher::new(self.http_client_config())?,
                url,
            ))),
            None => Ok(Box::new(FeedFileSource::new(self.messages_file()))),
        }
    }
}

/// `{base}/messages`, tolerating a trailing slash on the base.
pub fn messages_url(api_url: &str) -> String {
    format!("{}/messages", api_url.trim_end_matches('/'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding messages from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    /// GET `url`, retrying timeouts, connect failures, 5xx and 429 with
    /// capped exponential backoff.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let span = info_span!("http_fetch", url);
        self.fetch_with_retry(url).instrument(span).await
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.bytes().await?.to_vec());
                    }
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(%status, attempt, "retrying after http status");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: resp.url().to_string(),
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(error = %err, attempt, "retrying after request error");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }
    }
}

/// Where the dashboard's records come from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Vec<ListingRecord>, FetchError>;
}

/// `GET {api}/messages` returning the JSON record array.
#[derive(Debug)]
pub struct HttpMessageSource {
    fetcher: HttpFetcher,
    url: String,
}

impl HttpMessageSource {
    pub fn new(fetcher: HttpFetcher, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Vec<ListingRecord>, FetchError> {
        let body = self.fetcher.fetch_bytes(&self.url).await?;
        decode_records(&body, &self.url)
    }
}

/// JSON record array on disk, in the same shape the API serves.
#[derive(Debug, Clone)]
pub struct FileMessageSource {
    path: PathBuf,
}

impl FileMessageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MessageSource for FileMessageSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<Vec<ListingRecord>, FetchError> {
        let body = tokio::fs::read(&self.path).await.map_err(|source| FetchError::Io {
            path: self.path.clone(),
            source,
        })?;
        decode_records(&body, &self.path.display().to_string())
    }
}

/// Messages file passed through the cleanup the `/messages` endpoint applies
/// before serving.
#[derive(Debug, Clone)]
pub struct FeedFileSource {
    inner: FileMessageSource,
}

impl FeedFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: FileMessageSource::new(path),
        }
    }
}

#[async_trait]
impl MessageSource for FeedFileSource {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn fetch(&self) -> Result<Vec<ListingRecord>, FetchError> {
        self.inner.fetch().await.map(prepare_feed)
    }
}

/// Elements that cannot become a record are skipped and counted in the log.
pub fn decode_records(body: &[u8], origin: &str) -> Result<Vec<ListingRecord>, FetchError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|source| FetchError::Decode {
            origin: origin.to_string(),
            source,
        })?;
    let parsed = parse_records(value);
    if parsed.rejected > 0 {
        warn!(origin, rejected = parsed.rejected, "skipped malformed message records");
    }
    Ok(parsed.records)
}

/// Records from a single load, held read-only until the next load.
#[derive(Debug, Clone)]
pub struct RecordStore {
    records: Vec<ListingRecord>,
    loading: bool,
    last_error: Option<String>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Empty store in the loading state, as before the startup fetch.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            loading: true,
            last_error: None,
        }
    }

    pub fn with_records(records: Vec<ListingRecord>) -> Self {
        Self {
            records,
            loading: false,
            last_error: None,
        }
    }

    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn begin_load(&mut self) {
        self.loading = true;
    }

    /// Single exit for every load: clears the loading flag on both paths and
    /// replaces the records, with an empty list on failure.
    pub fn finish_load(&mut self, result: Result<Vec<ListingRecord>, FetchError>) {
        self.loading = false;
        match result {
            Ok(records) => {
                info!(records = records.len(), "loaded messages");
                self.records = records;
                self.last_error = None;
            }
            Err(err) => {
                warn!(error = %err, "failed to load messages");
                self.records.clear();
                self.last_error = Some(err.to_string());
            }
        }
    }

    pub async fn load(&mut self, source: &dyn MessageSource) {
        self.begin_load();
        let result = source.fetch().await;
        self.finish_load(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Json, Router};
    use std::collections::HashMap;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    const SAMPLE: &str = r#"[
        {"id": 1, "raw_text": "2BHK", "time_created": "2025-03-01T10:00:00Z", "author": "a",
         "details": {"BHK": 2, "Gender": "Male", "Rent": 25000}},
        {"id": 2, "raw_text": "3BHK", "time_created": "2025-03-02T10:00:00Z", "author": "b",
         "details": {"BHK": 3, "Gender": ["Female"], "Rent": "ask"}},
        {"raw_text": "missing id"}
    ]"#;

    async fn spawn_server(app: Router) -> String {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn no_retry_fetcher() -> HttpFetcher {
        HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(5),
            user_agent: None,
            backoff: BackoffPolicy {
                max_retries: 0,
                ..BackoffPolicy::default()
            },
        })
        .unwrap()
    }

    struct FailingSource;

    #[async_trait]
    impl MessageSource for FailingSource {
        fn describe(&self) -> String {
            "failing".into()
        }

        async fn fetch(&self) -> Result<Vec<ListingRecord>, FetchError> {
            Err(FetchError::HttpStatus {
                status: 503,
                url: "http://test/messages".into(),
            })
        }
    }

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn only_server_errors_and_throttling_retry() {
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryDisposition::NonRetryable);
    }

    #[test]
    fn messages_url_joins_once() {
        assert_eq!(messages_url("http://localhost:8000"), "http://localhost:8000/messages");
        assert_eq!(messages_url("http://localhost:8000/"), "http://localhost:8000/messages");
    }

    #[test]
    fn config_layers_file_then_env() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(TrackerConfig::FILE_NAME),
            "api_url: http://api.local:9000\nweb_port: 9100\nhttp_max_retries: 1\n",
        )
        .unwrap();

        let mut config = TrackerConfig {
            workspace_root: dir.path().to_path_buf(),
            ..TrackerConfig::default()
        };
        let yaml = std::fs::read_to_string(dir.path().join(TrackerConfig::FILE_NAME)).unwrap();
        config.apply_file(serde_yaml::from_str(&yaml).unwrap());
        assert_eq!(config.messages_url().as_deref(), Some("http://api.local:9000/messages"));
        assert_eq!(config.web_port, 9100);
        assert_eq!(config.http_client_config().backoff.max_retries, 1);

        let env: HashMap<&str, &str> = [
            ("FLATTRACKER_WEB_PORT", "9200"),
            ("FLATTRACKER_API_URL", ""),
            ("FLATTRACKER_HTTP_TIMEOUT_SECS", "not-a-number"),
            ("FLATTRACKER_MESSAGES_PATH", "data/messages.json"),
        ]
        .into_iter()
        .collect();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.web_port, 9200);
        assert_eq!(config.api_url, None);
        assert_eq!(config.http_timeout_secs, 20);
        assert_eq!(config.messages_file(), dir.path().join("data/messages.json"));
    }

    #[test]
    fn config_rejects_broken_yaml() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(TrackerConfig::FILE_NAME), "web_port: [").unwrap();
        assert!(TrackerConfig::load(dir.path()).is_err());
    }

    #[tokio::test]
    async fn file_source_skips_malformed_elements() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("messages.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut store = RecordStore::new();
        assert!(store.is_loading());
        store.load(&FileMessageSource::new(&path)).await;
        assert!(!store.is_loading());
        assert_eq!(store.records().iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(store.records()[1].details.gender.contains("Female"));
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn feed_source_orders_newest_first() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("messages.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = TrackerConfig {
            messages_path: path.clone(),
            ..TrackerConfig::default()
        };
        let source = config.message_source().unwrap();
        assert_eq!(source.describe(), path.display().to_string());
        let ids: Vec<i64> = source.fetch().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn missing_file_leaves_store_empty_and_not_loading() {
        let dir = tempdir().expect("tempdir");
        let mut store = RecordStore::new();
        store.load(&FileMessageSource::new(dir.path().join("absent.json"))).await;
        assert!(!store.is_loading());
        assert!(store.records().is_empty());
        assert!(store.last_error().unwrap().contains("absent.json"));
    }

    #[tokio::test]
    async fn failed_reload_drops_stale_records() {
        let records = decode_records(SAMPLE.as_bytes(), "sample").unwrap();
        let mut store = RecordStore::with_records(records);
        assert_eq!(store.records().len(), 2);
        store.load(&FailingSource).await;
        assert!(store.records().is_empty());
        assert!(!store.is_loading());
        assert!(store.last_error().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn http_source_reads_messages_endpoint() {
        let body: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        let app = Router::new().route("/messages", get(move || async move { Json(body) }));
        let base = spawn_server(app).await;

        let source = HttpMessageSource::new(no_retry_fetcher(), messages_url(&base));
        let records = source.fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].details.rent.value(), Some(25000.0));
        assert_eq!(records[1].details.rent.value(), None);
    }

    #[tokio::test]
    async fn http_error_status_becomes_an_empty_store() {
        let app = Router::new().route(
            "/messages",
            get(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_server(app).await;

        let source = HttpMessageSource::new(no_retry_fetcher(), messages_url(&base));
        match source.fetch().await {
            Err(FetchError::HttpStatus { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut store = RecordStore::new();
        store.load(&source).await;
        assert!(store.records().is_empty());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let app = Router::new().route("/messages", get(|| async { "not json" }));
        let base = spawn_server(app).await;
        let source = HttpMessageSource::new(no_retry_fetcher(), messages_url(&base));
        assert!(matches!(source.fetch().await, Err(FetchError::Decode { .. })));
    }
}
