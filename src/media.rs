/*!
 * Media Storage
 * Signed Cloudinary upload/destroy calls for project and service images
 */
use once_cell::sync::Lazy;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const PROJECT_FOLDER: &str = "portfolio_projects";
pub const SERVICE_FOLDER: &str = "portfolio_services";

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media storage is not configured")]
    NotConfigured,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("media request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("media provider returned {status}: {message}")]
    Provider { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
}

impl CloudinaryConfig {
    /// Reads `CLOUDINARY_*`; `None` unless name, key and secret are all set.
    pub fn from_env() -> Option<Self> {
        let cloud_name = std::env::var("CLOUDINARY_CLOUD_NAME").ok()?;
        let api_key = std::env::var("CLOUDINARY_API_KEY").ok()?;
        let api_secret = std::env::var("CLOUDINARY_API_SECRET").ok()?;
        if cloud_name.is_empty() || api_key.is_empty() || api_secret.is_empty() {
            return None;
        }

        Some(Self {
            cloud_name,
            api_key,
            api_secret,
            api_base: std::env::var("CLOUDINARY_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.api_base.trim_end_matches('/'),
            self.cloud_name,
            action
        )
    }
}

lazy_static::lazy_static! {
    static ref CLOUDINARY: Option<CloudinaryConfig> = CloudinaryConfig::from_env();
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

pub fn is_configured() -> bool {
    CLOUDINARY.is_some()
}

/// Account read from the environment at first use
pub fn settings() -> Option<&'static CloudinaryConfig> {
    CLOUDINARY.as_ref()
}

/// Asset stored by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedAsset {
    pub secure_url: String,
    pub public_id: String,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResult {
    result: String,
}

/// Request signature: SHA-256 over the key-sorted `k=v&...` string followed by the
/// API secret. The account must have SHA-256 signatures enabled.
pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Detects the image type from its leading bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

/// Rejects empty, oversized or non-image payloads before anything leaves the process.
pub fn validate_image(bytes: &[u8]) -> Result<&'static str, MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::InvalidImage("empty file".to_string()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(MediaError::InvalidImage(format!(
            "file exceeds {} bytes",
            MAX_UPLOAD_BYTES
        )));
    }
    sniff_image(bytes).ok_or_else(|| {
        MediaError::InvalidImage("content is not JPEG, PNG, GIF or WebP".to_string())
    })
}

async fn provider_error(response: reqwest::Response) -> MediaError {
    let status = response.status().as_u16();
    let message = match response.json::<ProviderError>().await {
        Ok(body) => body.error.message,
        Err(_) => "unexpected response".to_string(),
    };
    MediaError::Provider { status, message }
}

impl CloudinaryConfig {
    /// Uploads one image into `folder` and returns its URL and asset id.
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> Result<UploadedAsset, MediaError> {
        let mime = validate_image(&bytes)?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[("folder", folder.to_string()), ("timestamp", timestamp.clone())],
            &self.api_secret,
        );

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_string())
            .text("signature", signature);

        let response = HTTP_CLIENT
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = provider_error(response).await;
            tracing::warn!(folder = %folder, error = %err, "image upload rejected");
            return Err(err);
        }

        let asset: UploadedAsset = response.json().await?;
        tracing::info!(public_id = %asset.public_id, folder = %folder, "image uploaded");
        Ok(asset)
    }

    /// Deletes an asset. An asset that is already gone counts as deleted.
    pub async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[
                ("public_id", public_id.to_string()),
                ("timestamp", timestamp.clone()),
            ],
            &self.api_secret,
        );

        let params = [
            ("public_id", public_id.to_string()),
            ("api_key", self.api_key.clone()),
            ("timestamp", timestamp),
            ("signature", signature),
        ];

        let response = HTTP_CLIENT
            .post(self.endpoint("destroy"))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let body: DestroyResult = response.json().await?;
        match body.result.as_str() {
            "ok" => {
                tracing::info!(public_id = %public_id, "image asset destroyed");
                Ok(())
            }
            "not found" => {
                tracing::warn!(public_id = %public_id, "image asset already absent");
                Ok(())
            }
            other => Err(MediaError::Provider {
                status: 200,
                message: format!("destroy returned '{}'", other),
            }),
        }
    }

    /// Best-effort removal used after a database commit; failures are only logged.
    pub async fn destroy_all(&self, public_ids: &[String]) {
        for public_id in public_ids {
            if let Err(e) = self.destroy(public_id).await {
                tracing::error!(public_id = %public_id, error = %e, "failed to destroy image asset");
            }
        }
    }
}

/// Post-commit cleanup with the configured account.
pub async fn destroy_all(public_ids: &[String]) {
    if public_ids.is_empty() {
        return;
    }
    match settings() {
        Some(cfg) => cfg.destroy_all(public_ids).await,
        None => tracing::error!(
            count = public_ids.len(),
            "media storage not configured, image assets left in place"
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        extract::{Form, Multipart, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::post,
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub(crate) const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    const STUB_SECRET: &str = "stub-secret";

    /// Ids starting with this prefix are answered with `not found` on destroy.
    pub(crate) const MISSING_PREFIX: &str = "missing/";

    #[derive(Default)]
    struct StubState {
        uploads: AtomicUsize,
        fail_upload_at: Option<usize>,
        fail_destroy: bool,
        destroyed: Mutex<Vec<String>>,
    }

    /// Local stand-in for the provider's upload and destroy endpoints
    pub(crate) struct MediaStub {
        pub config: CloudinaryConfig,
        state: Arc<StubState>,
    }

    impl MediaStub {
        pub fn uploads(&self) -> usize {
            self.state.uploads.load(Ordering::SeqCst)
        }

        pub fn destroyed(&self) -> Vec<String> {
            self.state.destroyed.lock().unwrap().clone()
        }
    }

    fn provider_failure(status: StatusCode, message: &str) -> Response {
        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }

    async fn stub_upload(State(state): State<Arc<StubState>>, mut multipart: Multipart) -> Response {
        let mut folder = String::new();
        let mut has_file = false;
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("folder") => folder = field.text().await.unwrap_or_default(),
                Some("file") => has_file = !field.bytes().await.unwrap_or_default().is_empty(),
                _ => {
                    let _ = field.bytes().await;
                }
            }
        }

        let n = state.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if !has_file || state.fail_upload_at == Some(n) {
            return provider_failure(StatusCode::BAD_REQUEST, "Invalid image file");
        }

        let public_id = format!("{}/asset_{}", folder, n);
        Json(json!({
            "secure_url": format!("https://res.example.test/{}.png", public_id),
            "public_id": public_id,
        }))
        .into_response()
    }

    async fn stub_destroy(
        State(state): State<Arc<StubState>>,
        Form(params): Form<HashMap<String, String>>,
    ) -> Response {
        if state.fail_destroy {
            return provider_failure(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }

        let public_id = params.get("public_id").cloned().unwrap_or_default();
        let timestamp = params.get("timestamp").cloned().unwrap_or_default();
        let expected = sign(
            &[("public_id", public_id.clone()), ("timestamp", timestamp)],
            STUB_SECRET,
        );
        if params.get("signature") != Some(&expected) {
            return provider_failure(StatusCode::UNAUTHORIZED, "Invalid Signature");
        }

        if public_id.starts_with(MISSING_PREFIX) {
            return Json(json!({ "result": "not found" })).into_response();
        }
        state.destroyed.lock().unwrap().push(public_id);
        Json(json!({ "result": "ok" })).into_response()
    }

    /// Serves the stub on an ephemeral port. `fail_upload_at` is the 1-based upload
    /// that gets rejected.
    pub(crate) async fn spawn_stub(fail_upload_at: Option<usize>, fail_destroy: bool) -> MediaStub {
        let state = Arc::new(StubState {
            fail_upload_at,
            fail_destroy,
            ..StubState::default()
        });

        let app = Router::new()
            .route("/v1_1/{cloud}/image/upload", post(stub_upload))
            .route("/v1_1/{cloud}/image/destroy", post(stub_destroy))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        MediaStub {
            config: CloudinaryConfig {
                cloud_name: "stub".to_string(),
                api_key: "stub-key".to_string(),
                api_secret: STUB_SECRET.to_string(),
                api_base: format!("http://{}/v1_1", addr),
            },
            state,
        }
    }

    #[test]
    fn test_sign_sorts_params_and_appends_secret() {
        let signature = sign(
            &[
                ("timestamp", "1315060510".to_string()),
                ("folder", "portfolio_projects".to_string()),
            ],
            "abcd",
        );
        assert_eq!(
            signature,
            "c39fcded2f62101982c7aca38ac948f31d276560a5941fe7da9d4e3f8c42a59e"
        );
    }

    #[test]
    fn test_sign_empty_params_hashes_secret_only() {
        assert_eq!(
            sign(&[], "abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sniff_image_types() {
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image(PNG_HEADER), Some("image/png"));
        assert_eq!(sniff_image(b"GIF89a"), Some("image/gif"));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image(b"%PDF-1.7"), None);
        assert_eq!(sniff_image(&[0xFF]), None);
    }

    #[test]
    fn test_validate_image_rejects_empty_and_oversized() {
        assert!(matches!(
            validate_image(&[]),
            Err(MediaError::InvalidImage(_))
        ));

        let mut big = PNG_HEADER.to_vec();
        big.resize(MAX_UPLOAD_BYTES + 1, 0);
        assert!(matches!(
            validate_image(&big),
            Err(MediaError::InvalidImage(_))
        ));

        assert_eq!(validate_image(PNG_HEADER).unwrap(), "image/png");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let cfg = CloudinaryConfig {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            api_base: "http://localhost:9000/v1_1/".to_string(),
        };
        assert_eq!(
            cfg.endpoint("destroy"),
            "http://localhost:9000/v1_1/demo/image/destroy"
        );
    }

    #[tokio::test]
    async fn test_settings_follow_environment() {
        assert_eq!(settings().is_some(), is_configured());
        if !is_configured() {
            // Nothing to reach; must return without panicking.
            destroy_all(&["portfolio_projects/a".to_string()]).await;
        }
    }

    #[tokio::test]
    async fn test_upload_returns_url_and_asset_id() {
        let stub = spawn_stub(None, false).await;
        let asset = stub
            .config
            .upload_image(PNG_HEADER.to_vec(), "a.png", PROJECT_FOLDER)
            .await
            .unwrap();

        assert_eq!(asset.public_id, "portfolio_projects/asset_1");
        assert!(asset.secure_url.ends_with("portfolio_projects/asset_1.png"));
        assert_eq!(stub.uploads(), 1);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_image_before_sending() {
        let stub = spawn_stub(None, false).await;
        let result = stub
            .config
            .upload_image(b"%PDF-1.7".to_vec(), "a.pdf", PROJECT_FOLDER)
            .await;

        assert!(matches!(result, Err(MediaError::InvalidImage(_))));
        assert_eq!(stub.uploads(), 0);
    }

    #[tokio::test]
    async fn test_destroy_signs_request_and_treats_not_found_as_done() {
        let stub = spawn_stub(None, false).await;

        stub.config.destroy("portfolio_services/a").await.unwrap();
        stub.config
            .destroy(&format!("{}gone", MISSING_PREFIX))
            .await
            .unwrap();

        assert_eq!(stub.destroyed(), vec!["portfolio_services/a"]);
    }

    #[tokio::test]
    async fn test_destroy_with_wrong_secret_is_provider_error() {
        let stub = spawn_stub(None, false).await;
        let mut config = stub.config.clone();
        config.api_secret = "wrong".to_string();

        let err = config.destroy("portfolio_services/a").await.unwrap_err();
        assert!(matches!(err, MediaError::Provider { status: 401, .. }));
        assert!(stub.destroyed().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_bad_gateway() {
        let stub = spawn_stub(Some(1), true).await;

        let err = stub.config.destroy("portfolio_services/a").await.unwrap_err();
        match &err {
            MediaError::Provider { status, message } => {
                assert_eq!(*status, 500);
                assert_eq!(message, "internal error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            crate::error::ApiError::from(err).status(),
            axum::http::StatusCode::BAD_GATEWAY
        );

        let err = stub
            .config
            .upload_image(PNG_HEADER.to_vec(), "a.png", SERVICE_FOLDER)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Provider { status: 400, .. }));
    }
}
