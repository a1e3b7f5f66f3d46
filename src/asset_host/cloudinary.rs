use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::{AssetHost, AssetHostError, StoredAsset};

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Cloudinary asset host using the signed upload and destroy APIs.
pub struct CloudinaryHost {
    api_base: String,
    api_key: String,
    api_secret: String,
    client: Client,
    cloud_name: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryHost {
    pub fn new(client: Client, cloud_name: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            client,
            cloud_name: cloud_name.to_string(),
        }
    }

    /// Point the client at a different API root (e.g. a local stand-in).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.api_base, self.cloud_name, action)
    }
}

#[async_trait]
impl AssetHost for CloudinaryHost {
    async fn store(
        &self,
        data: Bytes,
        namespace: &str,
        key: &str,
    ) -> Result<StoredAsset, AssetHostError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let folder = namespace.trim_matches('/');
        let params = [
            ("folder", folder),
            ("overwrite", "true"),
            ("public_id", key),
            ("timestamp", timestamp.as_str()),
        ];
        let signature = sign(&params, &self.api_secret);

        let mut form = Form::new().part(
            "file",
            Part::bytes(data.to_vec()).file_name(key.to_string()),
        );
        for (name, value) in params {
            form = form.text(name.to_string(), value.to_string());
        }
        let form = form
            .text("api_key", self.api_key.clone())
            .text("signature", signature);

        let resp = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AssetHostError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AssetHostError::Backend(format!(
                "Cloudinary upload failed ({status}): {body}"
            )));
        }

        let uploaded: UploadResponse = resp
            .json()
            .await
            .map_err(|e| AssetHostError::Backend(format!("Invalid upload response: {e}")))?;

        Ok(StoredAsset {
            asset_ref: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }

    async fn delete(&self, asset_ref: &str) -> Result<(), AssetHostError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [
            ("invalidate", "true"),
            ("public_id", asset_ref),
            ("timestamp", timestamp.as_str()),
        ];
        let signature = sign(&params, &self.api_secret);

        let mut fields: Vec<(&str, &str)> = params.to_vec();
        fields.push(("api_key", self.api_key.as_str()));
        fields.push(("signature", signature.as_str()));

        let resp = self
            .client
            .post(self.endpoint("destroy"))
            .form(&fields)
            .send()
            .await
            .map_err(|e| AssetHostError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AssetHostError::Backend(format!(
                "Cloudinary destroy failed ({status}): {body}"
            )));
        }

        let destroyed: DestroyResponse = resp
            .json()
            .await
            .map_err(|e| AssetHostError::Backend(format!("Invalid destroy response: {e}")))?;

        // "not found" means it is already gone
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(AssetHostError::Backend(format!(
                "Cloudinary destroy of '{asset_ref}' returned '{other}'"
            ))),
        }
    }
}

/// Cloudinary request signature: SHA-1 hex of the alphabetically sorted
/// `key=value` pairs joined by `&`, followed by the API secret.
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let digest = ring::digest::digest(
        &ring::digest::SHA1_FOR_LEGACY_USE_ONLY,
        format!("{to_sign}{api_secret}").as_bytes(),
    );
    digest.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_signature() {
        let params = [
            ("timestamp", "1700000000"),
            ("public_id", "proc_abc"),
            ("overwrite", "true"),
            ("folder", "demo/processed"),
        ];
        assert_eq!(
            sign(&params, "secret"),
            "de37e2a56812911f530893be23bd2a954fed7c22"
        );
    }

    #[test]
    fn test_destroy_signature() {
        let params = [
            ("invalidate", "true"),
            ("public_id", "demo/originals/orig_abc"),
            ("timestamp", "1700000000"),
        ];
        assert_eq!(
            sign(&params, "secret"),
            "571901041e11c8df6a9d4bea5e6da40a3d9c3bb4"
        );
    }

    #[test]
    fn test_endpoint() {
        let host = CloudinaryHost::new(Client::new(), "demo", "key", "secret")
            .with_api_base("http://127.0.0.1:9000/v1_1/");
        assert_eq!(
            host.endpoint("upload"),
            "http://127.0.0.1:9000/v1_1/demo/image/upload"
        );
    }
}
