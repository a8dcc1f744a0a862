//! Supabase Storage access
//!
//! [`StorageClient`] covers the four REST calls the pipeline needs. The upload
//! itself goes through [`upload_with_fallback`], which walks
//! [`UploadStrategy::ORDERED`] and stops at the first success.

use crate::{
    error::{BgTrimError, Result},
    settings::StorageSettings,
    types::{UploadAttempt, UploadOutcome, UploadStrategy},
};
use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Content type of the uploaded artifact
pub const PNG_CONTENT_TYPE: &str = "image/png";

const PLACEHOLDER_CONTENT_TYPE: &str = "text/plain";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A bucket as returned by the listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public: bool,
}

/// Object storage operations used by the pipeline
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// List all buckets visible to the key
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Create an object, replacing it when `upsert` is set
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str, upsert: bool)
        -> Result<()>;

    /// Replace an existing object
    async fn update(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Public URL of an object
    fn public_url(&self, path: &str) -> String;
}

/// REST client for one Supabase bucket
pub struct SupabaseStorage {
    client: Client,
    base: Url,
    settings: StorageSettings,
}

impl std::fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SupabaseStorage {
    /// # Errors
    /// - `settings.url` is not an absolute http(s) URL
    /// - HTTP client construction failures
    pub fn new(settings: StorageSettings) -> Result<Self> {
        let base = Url::parse(&settings.url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                BgTrimError::invalid_config(format!("Invalid storage URL '{}'", settings.url))
            })?;

        let client = Client::builder()
            .user_agent(concat!("bgtrim/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BgTrimError::network_error("Failed to create HTTP client", e))?;
        Ok(Self {
            client,
            base,
            settings,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// `{url}/storage/v1/<segments>` with every segment percent-encoded
    fn storage_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["storage", "v1"]).extend(segments);
        }
        url
    }

    /// URL of an object; `/` in `path` separates segments, anything else is encoded
    fn object_url(&self, path: &str) -> Url {
        self.storage_url(
            ["object", self.settings.bucket.as_str()]
                .into_iter()
                .chain(path.split('/')),
        )
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.settings.key))
            .header("apikey", &self.settings.key)
    }

    async fn send_object(
        &self,
        method: Method,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        let url = self.object_url(path);
        debug!(%method, %url, size = bytes.len(), upsert, "Sending object");

        let response = self
            .request(method, url.clone())
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes)
            .send()
            .await
            .map_err(|e| BgTrimError::network_error(format!("Request to {url} failed"), e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, &body))
        }
    }
}

#[async_trait]
impl StorageClient for SupabaseStorage {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let url = self.storage_url(["bucket"]);
        let response = self
            .request(Method::GET, url.clone())
            .send()
            .await
            .map_err(|e| BgTrimError::network_error(format!("Request to {url} failed"), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BgTrimError::network_error("Failed to read bucket listing", e))?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            BgTrimError::storage(status.as_u16(), format!("Unexpected bucket listing: {e}"))
        })
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        self.send_object(Method::POST, path, bytes, content_type, upsert)
            .await
    }

    async fn update(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.send_object(Method::PUT, path, bytes, content_type, true)
            .await
    }

    fn public_url(&self, path: &str) -> String {
        self.storage_url(
            ["object", "public", self.settings.bucket.as_str()]
                .into_iter()
                .chain(path.split('/')),
        )
        .into()
    }
}

/// Turn an error response into a [`BgTrimError::Storage`], preferring the
/// `message` field of Supabase's JSON error body
fn status_error(status: StatusCode, body: &str) -> BgTrimError {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.to_string()
            }
        });
    BgTrimError::storage(status.as_u16(), message)
}

/// Result of the connectivity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub buckets: Vec<BucketInfo>,
    pub target_bucket_exists: bool,
}

/// List buckets and look for the target one
///
/// # Errors
/// - Any failure of the listing call
#[instrument(skip(client))]
pub async fn check_connection(client: &dyn StorageClient, bucket: &str) -> Result<ConnectionReport> {
    let buckets = client.list_buckets().await?;
    let target_bucket_exists = buckets.iter().any(|b| b.name == bucket || b.id == bucket);

    info!(
        bucket_count = buckets.len(),
        target = bucket,
        found = target_bucket_exists,
        "Storage connection verified"
    );

    Ok(ConnectionReport {
        buckets,
        target_bucket_exists,
    })
}

/// Publish `bytes` as `<prefix>/<name>.png`, trying each strategy in order
///
/// Never fails: exhausting every strategy is reported as
/// [`UploadOutcome::Failed`].
#[instrument(skip(client, settings, bytes), fields(size = bytes.len()))]
pub async fn upload_with_fallback(
    client: &dyn StorageClient,
    settings: &StorageSettings,
    name: &str,
    bytes: &[u8],
) -> UploadOutcome {
    let object_path = settings.object_path(name);
    let mut failed_attempts = Vec::new();

    for strategy in UploadStrategy::ORDERED {
        let result = match strategy {
            UploadStrategy::DirectUpsert => {
                client
                    .upload(&object_path, bytes.to_vec(), PNG_CONTENT_TYPE, true)
                    .await
            },
            UploadStrategy::EnsureDirectoryThenUpsert => {
                let placeholder = settings.placeholder_path();
                if let Err(e) = client
                    .upload(&placeholder, Vec::new(), PLACEHOLDER_CONTENT_TYPE, true)
                    .await
                {
                    warn!(path = %placeholder, error = %e, "Placeholder upload failed");
                }
                client
                    .upload(&object_path, bytes.to_vec(), PNG_CONTENT_TYPE, true)
                    .await
            },
            UploadStrategy::UpdateInPlace => {
                client
                    .update(&object_path, bytes.to_vec(), PNG_CONTENT_TYPE)
                    .await
            },
        };

        match result {
            Ok(()) => {
                let public_url = client.public_url(&object_path);
                info!(%strategy, path = %object_path, url = %public_url, "Upload succeeded");
                return UploadOutcome::Uploaded {
                    strategy,
                    object_path,
                    public_url,
                    failed_attempts,
                };
            },
            Err(e) => {
                warn!(%strategy, error = %e, "Upload attempt failed");
                failed_attempts.push(UploadAttempt {
                    strategy,
                    error: e.to_string(),
                });
            },
        }
    }

    UploadOutcome::Failed {
        object_path,
        attempts: failed_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::VecDeque, sync::Mutex};

    /// Storage fake that replays scripted results and records every call
    #[derive(Default)]
    struct ScriptedStorage {
        upload_results: Mutex<VecDeque<Result<()>>>,
        update_result: Mutex<Option<Result<()>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedStorage {
        fn with_uploads(results: Vec<Result<()>>) -> Self {
            Self {
                upload_results: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        fn failing_update(self) -> Self {
            *self.update_result.lock().unwrap() = Some(Err(BgTrimError::storage(404, "missing")));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StorageClient for ScriptedStorage {
        async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
            self.calls.lock().unwrap().push("list".to_string());
            Ok(vec![BucketInfo {
                id: "assets".to_string(),
                name: "assets".to_string(),
                public: true,
            }])
        }

        async fn upload(
            &self,
            path: &str,
            _bytes: Vec<u8>,
            content_type: &str,
            upsert: bool,
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("upload {path} {content_type} {upsert}"));
            self.upload_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }

        async fn update(&self, path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("update {path}"));
            self.update_result.lock().unwrap().take().unwrap_or(Ok(()))
        }

        fn public_url(&self, path: &str) -> String {
            format!("https://cdn.test/{path}")
        }
    }

    fn settings() -> StorageSettings {
        StorageSettings::new("https://project.supabase.co", "service-key")
    }

    fn denied() -> Result<()> {
        Err(BgTrimError::storage(403, "denied"))
    }

    #[tokio::test]
    async fn test_direct_upload_short_circuits() {
        let storage = ScriptedStorage::default();
        let outcome = upload_with_fallback(&storage, &settings(), "og-kush", b"png").await;

        match outcome {
            UploadOutcome::Uploaded {
                strategy,
                object_path,
                public_url,
                failed_attempts,
            } => {
                assert_eq!(strategy, UploadStrategy::DirectUpsert);
                assert_eq!(object_path, "assets/images/strains/og-kush.png");
                assert_eq!(public_url, "https://cdn.test/assets/images/strains/og-kush.png");
                assert!(failed_attempts.is_empty());
            },
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(storage.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_then_retry() {
        let storage = ScriptedStorage::with_uploads(vec![denied()]);
        let outcome = upload_with_fallback(&storage, &settings(), "og-kush", b"png").await;

        assert!(matches!(
            outcome,
            UploadOutcome::Uploaded {
                strategy: UploadStrategy::EnsureDirectoryThenUpsert,
                ..
            }
        ));
        assert_eq!(
            storage.calls(),
            vec![
                "upload assets/images/strains/og-kush.png image/png true",
                "upload assets/images/strains/.placeholder text/plain true",
                "upload assets/images/strains/og-kush.png image/png true",
            ]
        );
    }

    #[tokio::test]
    async fn test_placeholder_failure_does_not_stop_retry() {
        let storage = ScriptedStorage::with_uploads(vec![denied(), denied(), Ok(())]);
        let outcome = upload_with_fallback(&storage, &settings(), "og-kush", b"png").await;

        assert!(matches!(
            outcome,
            UploadOutcome::Uploaded {
                strategy: UploadStrategy::EnsureDirectoryThenUpsert,
                ..
            }
        ));
        assert_eq!(storage.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_update_is_last_resort() {
        let storage = ScriptedStorage::with_uploads(vec![denied(), Ok(()), denied()]);
        let outcome = upload_with_fallback(&storage, &settings(), "og-kush", b"png").await;

        match outcome {
            UploadOutcome::Uploaded {
                strategy,
                failed_attempts,
                ..
            } => {
                assert_eq!(strategy, UploadStrategy::UpdateInPlace);
                let order: Vec<_> = failed_attempts.iter().map(|a| a.strategy).collect();
                assert_eq!(
                    order,
                    vec![
                        UploadStrategy::DirectUpsert,
                        UploadStrategy::EnsureDirectoryThenUpsert
                    ]
                );
            },
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            storage.calls().last().map(String::as_str),
            Some("update assets/images/strains/og-kush.png")
        );
    }

    #[tokio::test]
    async fn test_all_strategies_exhausted() {
        let storage =
            ScriptedStorage::with_uploads(vec![denied(), denied(), denied()]).failing_update();
        let outcome = upload_with_fallback(&storage, &settings(), "og-kush", b"png").await;

        match outcome {
            UploadOutcome::Failed {
                object_path,
                attempts,
            } => {
                assert_eq!(object_path, "assets/images/strains/og-kush.png");
                assert_eq!(attempts.len(), 3);
                assert!(attempts[2].error.contains("missing"));
            },
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_connection_finds_bucket() {
        let storage = ScriptedStorage::default();
        let report = check_connection(&storage, "assets").await.unwrap();
        assert!(report.target_bucket_exists);
        assert_eq!(report.buckets.len(), 1);

        let report = check_connection(&storage, "other").await.unwrap();
        assert!(!report.target_bucket_exists);
    }

    #[test]
    fn test_supabase_urls() {
        let storage = SupabaseStorage::new(settings().with_bucket("media")).unwrap();
        assert_eq!(
            storage.object_url("a/b.png").as_str(),
            "https://project.supabase.co/storage/v1/object/media/a/b.png"
        );
        assert_eq!(
            storage.public_url("a/b.png"),
            "https://project.supabase.co/storage/v1/object/public/media/a/b.png"
        );
        assert_eq!(
            storage.storage_url(["bucket"]).as_str(),
            "https://project.supabase.co/storage/v1/bucket"
        );
    }

    #[test]
    fn test_object_names_are_percent_encoded() {
        let storage = SupabaseStorage::new(settings()).unwrap();
        let path = settings().object_path("Girl Scout Cookies #4?");

        let url = storage.object_url(&path);
        assert_eq!(
            url.as_str(),
            "https://project.supabase.co/storage/v1/object/assets/assets/images/strains/Girl%20Scout%20Cookies%20%234%3F.png"
        );
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), None);
        assert!(url.path().ends_with("%3F.png"));

        assert_eq!(
            storage.public_url(&path),
            "https://project.supabase.co/storage/v1/object/public/assets/assets/images/strains/Girl%20Scout%20Cookies%20%234%3F.png"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(SupabaseStorage::new(StorageSettings::new("not a url", "k")).is_err());
        assert!(SupabaseStorage::new(StorageSettings::new("mailto:ops@example.com", "k")).is_err());

        let nested = SupabaseStorage::new(StorageSettings::new("https://proxy.test/supabase/", "k")).unwrap();
        assert_eq!(
            nested.storage_url(["bucket"]).as_str(),
            "https://proxy.test/supabase/storage/v1/bucket"
        );
    }

    #[test]
    fn test_status_error_message() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"statusCode":"400","error":"Bad Request","message":"The resource already exists"}"#,
        );
        assert_eq!(err.to_string(), "Storage error (400): The resource already exists");

        let err = status_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "Storage error (502): Bad Gateway");

        let err = status_error(StatusCode::FORBIDDEN, "plain text");
        assert!(err.to_string().contains("plain text"));
    }

    #[test]
    fn test_bucket_listing_parses() {
        let buckets: Vec<BucketInfo> = serde_json::from_str(
            r#"[{"id":"assets","name":"assets","public":true,"owner":"","created_at":"2024-01-01"}]"#,
        )
        .unwrap();
        assert_eq!(buckets[0].name, "assets");
        assert!(buckets[0].public);
    }
}
