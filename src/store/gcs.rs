//! Google Cloud Storage adapter
//!
//! Talks to the GCS JSON API with `ureq`. Calls are blocking, so every request
//! runs on the blocking pool via `spawn_blocking`. A bucket handle carries the
//! access token minted when it was opened; reopening the bucket is how the
//! client re-authenticates.

use super::{Bucket, ConnectError, ObjectStore, RemoteError, RemoteObject};
use crate::config::schema::GcsConfig;
use crate::credentials::GcpCredentials;
use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;
use url::Url;

/// Environment variable pointing at a local storage emulator
pub const EMULATOR_HOST_ENV: &str = "STORAGE_EMULATOR_HOST";

/// GCS object store
pub struct GcsStore {
    config: GcsConfig,
}

impl GcsStore {
    pub fn new(config: GcsConfig) -> Self {
        Self { config }
    }

    fn emulator_host() -> Option<String> {
        std::env::var(EMULATOR_HOST_ENV)
            .ok()
            .filter(|h| !h.trim().is_empty())
    }

    /// Endpoint requests go to, honouring the emulator override
    fn endpoint(&self) -> Result<Url, ConnectError> {
        let raw = match Self::emulator_host() {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => host,
            Some(host) => format!("http://{}", host),
            None => self.config.endpoint.clone(),
        };

        let url = Url::parse(&raw)
            .map_err(|e| ConnectError::InvalidEndpoint(format!("{}: {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConnectError::InvalidEndpoint(format!(
                "{}: expected an http or https URL",
                raw
            )));
        }
        Ok(url)
    }

    fn anonymous(&self) -> bool {
        self.config.anonymous || Self::emulator_host().is_some()
    }

    fn agent(&self) -> Agent {
        let timeout = (self.config.timeout_secs > 0)
            .then(|| Duration::from_secs(self.config.timeout_secs));
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        config.into()
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn open_bucket(&self, name: &str) -> Result<Arc<dyn Bucket>, ConnectError> {
        let endpoint = self.endpoint()?;

        let token = if self.anonymous() {
            None
        } else {
            let token = GcpCredentials::access_token(&self.config)
                .await
                .map_err(credential_error)?;
            Some(token)
        };

        let bucket = GcsBucket {
            agent: self.agent(),
            endpoint,
            name: name.to_string(),
            token,
        };

        let lookup = bucket.clone();
        tokio::task::spawn_blocking(move || lookup.lookup())
            .await
            .map_err(|e| ConnectError::Transport(format!("bucket lookup task failed: {}", e)))??;

        debug!("Opened GCS bucket {} at {}", name, bucket.endpoint);
        Ok(Arc::new(bucket))
    }

    fn backend_name(&self) -> &'static str {
        "gcs"
    }
}

/// Keep "log in first" distinguishable from other credential failures
fn credential_error(err: CacheError) -> ConnectError {
    match err {
        CacheError::GcpNotAuthenticated => ConnectError::NotAuthenticated,
        other => ConnectError::Credentials(other.to_string()),
    }
}

#[derive(Clone)]
struct GcsBucket {
    agent: Agent,
    endpoint: Url,
    name: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectMetadata {
    #[serde(rename = "timeCreated")]
    time_created: String,
}

impl GcsBucket {
    fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    fn lookup(&self) -> Result<(), ConnectError> {
        let url = bucket_url(&self.endpoint, &self.name);
        let mut req = self.agent.get(url.as_str());
        if let Some(auth) = self.authorization() {
            req = req.header("Authorization", auth);
        }

        let resp = req
            .call()
            .map_err(|e| ConnectError::Transport(format!("transport error for {}: {}", url, e)))?;

        match resp.status().as_u16() {
            200..=299 => Ok(()),
            code @ (400 | 401 | 403 | 404) => Err(ConnectError::BucketUnavailable(format!(
                "{} (status {})",
                self.name, code
            ))),
            code => Err(ConnectError::Transport(format!(
                "server returned status {} for {}",
                code, url
            ))),
        }
    }

    fn put_blocking(&self, name: &str, payload: &[u8]) -> Result<(), RemoteError> {
        let url = upload_url(&self.endpoint, &self.name, name);
        let mut req = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/octet-stream");
        if let Some(auth) = self.authorization() {
            req = req.header("Authorization", auth);
        }

        let mut resp = req
            .send(payload)
            .map_err(|e| RemoteError::Transport(format!("transport error for {}: {}", url, e)))?;

        let code = resp.status().as_u16();
        if resp.status().is_success() {
            return Ok(());
        }
        let body = resp.body_mut().read_to_string().unwrap_or_default();
        Err(RemoteError::from_write_status(code, error_message(&body)))
    }

    fn get_blocking(&self, name: &str) -> Result<RemoteObject, RemoteError> {
        let meta_url = object_url(&self.endpoint, &self.name, name);
        let mut meta = self.call(&meta_url)?;
        let code = meta.status().as_u16();
        let body = meta
            .body_mut()
            .read_to_string()
            .map_err(|e| RemoteError::Transport(format!("reading {}: {}", meta_url, e)))?;
        if !meta.status().is_success() {
            return Err(RemoteError::from_read_status(code, error_message(&body)));
        }
        let created_at = parse_time_created(&body).ok_or_else(|| RemoteError::Other {
            code,
            message: format!("object {} has no readable timeCreated", name),
        })?;

        // The object can vanish between the two requests; that 404 arrives on
        // this leg and is normalized like any other.
        let mut media_url = meta_url;
        media_url.query_pairs_mut().append_pair("alt", "media");
        let mut media = self.call(&media_url)?;
        let code = media.status().as_u16();
        if !media.status().is_success() {
            let body = media.body_mut().read_to_string().unwrap_or_default();
            return Err(RemoteError::from_read_status(
                code,
                format!("media download returned {}: {}", code, error_message(&body)),
            ));
        }
        let payload = media
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(|e| RemoteError::Transport(format!("reading {}: {}", media_url, e)))?;

        Ok(RemoteObject {
            payload,
            created_at,
        })
    }

    fn call(&self, url: &Url) -> Result<ureq::http::Response<ureq::Body>, RemoteError> {
        let mut req = self.agent.get(url.as_str());
        if let Some(auth) = self.authorization() {
            req = req.header("Authorization", auth);
        }
        req.call()
            .map_err(|e| RemoteError::Transport(format!("transport error for {}: {}", url, e)))
    }
}

#[async_trait]
impl Bucket for GcsBucket {
    async fn put(&self, name: &str, payload: &[u8]) -> Result<(), RemoteError> {
        let bucket = self.clone();
        let name = name.to_string();
        let payload = payload.to_vec();
        tokio::task::spawn_blocking(move || bucket.put_blocking(&name, &payload))
            .await
            .map_err(|e| RemoteError::Transport(format!("upload task failed: {}", e)))?
    }

    async fn get(&self, name: &str) -> Result<RemoteObject, RemoteError> {
        let bucket = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || bucket.get_blocking(&name))
            .await
            .map_err(|e| RemoteError::Transport(format!("download task failed: {}", e)))?
    }
}

/// `endpoint` with `segments` appended; each segment is escaped on its own,
/// so a `/` inside an object name stays part of the name
fn with_segments(endpoint: &Url, segments: &[&str]) -> Url {
    let mut url = endpoint.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn bucket_url(endpoint: &Url, bucket: &str) -> Url {
    with_segments(endpoint, &["storage", "v1", "b", bucket])
}

fn object_url(endpoint: &Url, bucket: &str, name: &str) -> Url {
    with_segments(endpoint, &["storage", "v1", "b", bucket, "o", name])
}

fn upload_url(endpoint: &Url, bucket: &str, name: &str) -> Url {
    let mut url = with_segments(endpoint, &["upload", "storage", "v1", "b", bucket, "o"]);
    url.query_pairs_mut()
        .append_pair("uploadType", "media")
        .append_pair("name", name);
    url
}

fn parse_time_created(body: &str) -> Option<DateTime<Utc>> {
    let meta: ObjectMetadata = serde_json::from_str(body).ok()?;
    DateTime::parse_from_rfc3339(&meta.time_created)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Pull `error.message` out of a JSON API error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use serial_test::serial;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OBJECT_PATH: &str = "/storage/v1/b/cache-1/o/abc123";

    fn anonymous_store(server: &MockServer) -> GcsStore {
        GcsStore::new(GcsConfig {
            endpoint: server.uri(),
            anonymous: true,
            timeout_secs: 5,
            ..GcsConfig::default()
        })
    }

    async fn mount_bucket(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cache-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "cache-1"})))
            .mount(server)
            .await;
    }

    async fn open(server: &MockServer) -> Arc<dyn Bucket> {
        std::env::remove_var(EMULATOR_HOST_ENV);
        mount_bucket(server).await;
        anonymous_store(server)
            .open_bucket("cache-1")
            .await
            .unwrap()
    }

    fn api_error(code: u16, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(code)
            .set_body_json(json!({"error": {"code": code, "message": message}}))
    }

    #[tokio::test]
    #[serial]
    async fn open_looks_up_bucket() {
        let server = MockServer::start().await;
        std::env::remove_var(EMULATOR_HOST_ENV);
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cache-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "cache-1"})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(anonymous_store(&server).open_bucket("cache-1").await.is_ok());
    }

    #[tokio::test]
    #[serial]
    async fn missing_bucket_is_unavailable() {
        let server = MockServer::start().await;
        std::env::remove_var(EMULATOR_HOST_ENV);
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/nope"))
            .respond_with(api_error(404, "The specified bucket does not exist."))
            .mount(&server)
            .await;

        let err = anonymous_store(&server)
            .open_bucket("nope")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::BucketUnavailable(_)));
    }

    #[tokio::test]
    #[serial]
    async fn bucket_lookup_server_error_is_transport() {
        let server = MockServer::start().await;
        std::env::remove_var(EMULATOR_HOST_ENV);
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cache-1"))
            .respond_with(api_error(503, "backend unavailable"))
            .mount(&server)
            .await;

        let err = anonymous_store(&server)
            .open_bucket("cache-1")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::Transport(_)));
    }

    #[tokio::test]
    #[serial]
    async fn get_reads_metadata_then_media() {
        let server = MockServer::start().await;
        let bucket = open(&server).await;
        Mock::given(method("GET"))
            .and(path(OBJECT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "abc123",
                "timeCreated": "2024-01-01T12:00:00.000Z"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(OBJECT_PATH))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x01, 0x02, 0x03]))
            .with_priority(1)
            .mount(&server)
            .await;

        let obj = bucket.get("abc123").await.unwrap();
        assert_eq!(obj.payload, vec![0x01, 0x02, 0x03]);
        assert_eq!(
            obj.created_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    #[serial]
    async fn missing_object_metadata_is_not_found() {
        let server = MockServer::start().await;
        let bucket = open(&server).await;
        Mock::given(method("GET"))
            .and(path(OBJECT_PATH))
            .respond_with(api_error(404, "No such object: cache-1/abc123"))
            .mount(&server)
            .await;

        assert_eq!(bucket.get("abc123").await.unwrap_err(), RemoteError::NotFound);
    }

    #[tokio::test]
    #[serial]
    async fn object_gone_before_media_is_not_found() {
        let server = MockServer::start().await;
        let bucket = open(&server).await;
        Mock::given(method("GET"))
            .and(path(OBJECT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "abc123",
                "timeCreated": "2024-01-01T12:00:00Z"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(OBJECT_PATH))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .with_priority(1)
            .mount(&server)
            .await;

        assert_eq!(bucket.get("abc123").await.unwrap_err(), RemoteError::NotFound);
    }

    #[tokio::test]
    #[serial]
    async fn rejected_credentials_are_auth_failures() {
        for code in [401, 403] {
            let server = MockServer::start().await;
            let bucket = open(&server).await;
            Mock::given(method("GET"))
                .and(path(OBJECT_PATH))
                .respond_with(api_error(code, "Invalid Credentials"))
                .mount(&server)
                .await;

            let err = bucket.get("abc123").await.unwrap_err();
            assert!(
                matches!(err, RemoteError::AuthFailure { code: c, .. } if c == code),
                "{code}: {err:?}"
            );
        }
    }

    #[tokio::test]
    #[serial]
    async fn server_error_is_other() {
        let server = MockServer::start().await;
        let bucket = open(&server).await;
        Mock::given(method("GET"))
            .and(path(OBJECT_PATH))
            .respond_with(api_error(503, "backend unavailable"))
            .mount(&server)
            .await;

        let err = bucket.get("abc123").await.unwrap_err();
        assert_eq!(
            err,
            RemoteError::Other {
                code: 503,
                message: "backend unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    #[serial]
    async fn slashed_names_reach_the_object_path() {
        let server = MockServer::start().await;
        let bucket = open(&server).await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cache-1/o/gradle%2Fabc"))
            .respond_with(api_error(404, "No such object"))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            bucket.get("gradle/abc").await.unwrap_err(),
            RemoteError::NotFound
        );
    }

    #[tokio::test]
    #[serial]
    async fn put_uploads_bytes_with_bearer_token() {
        let server = MockServer::start().await;
        std::env::remove_var(EMULATOR_HOST_ENV);
        std::env::set_var(GcpCredentials::TOKEN_ENV, "ya29.test-token");

        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cache-1"))
            .and(header("authorization", "Bearer ya29.test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "cache-1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/cache-1/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "gradle/abc"))
            .and(header("authorization", "Bearer ya29.test-token"))
            .and(body_bytes(b"artifact".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "gradle/abc"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = GcsStore::new(GcsConfig {
            endpoint: server.uri(),
            timeout_secs: 5,
            ..GcsConfig::default()
        });
        let result = match store.open_bucket("cache-1").await {
            Ok(bucket) => bucket.put("gradle/abc", b"artifact").await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        std::env::remove_var(GcpCredentials::TOKEN_ENV);

        result.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn put_failure_mentioning_404_keeps_status() {
        let server = MockServer::start().await;
        let bucket = open(&server).await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/cache-1/o"))
            .respond_with(api_error(500, "backend error for object ab404cd"))
            .mount(&server)
            .await;

        let err = bucket.put("ab404cd", b"x").await.unwrap_err();
        assert_eq!(
            err,
            RemoteError::Other {
                code: 500,
                message: "backend error for object ab404cd".to_string()
            }
        );
    }

    #[tokio::test]
    #[serial]
    async fn put_with_rejected_token_is_auth_failure() {
        let server = MockServer::start().await;
        let bucket = open(&server).await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/cache-1/o"))
            .respond_with(api_error(401, "Invalid Credentials"))
            .mount(&server)
            .await;

        let err = bucket.put("abc123", b"x").await.unwrap_err();
        assert!(err.is_reauthentication_likely());
    }
}
