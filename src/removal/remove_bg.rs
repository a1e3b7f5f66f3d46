use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};

use super::{BackgroundRemover, RemovalError};

/// Client for the remove.bg HTTP API.
pub struct RemoveBgClient {
    api_key: String,
    client: Client,
    endpoint: String,
}

impl RemoveBgClient {
    pub fn new(client: Client, api_key: &str, endpoint: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl BackgroundRemover for RemoveBgClient {
    async fn remove(&self, data: Bytes, mime_type: &str) -> Result<Bytes, RemovalError> {
        let part = Part::bytes(data.to_vec())
            .file_name(guess_filename(mime_type))
            .mime_str(mime_type)
            .map_err(|e| RemovalError::Transport(e.to_string()))?;
        let form = Form::new().part("image_file", part).text("size", "auto");

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemovalError::Transport(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = resp.bytes().await.unwrap_or_default();
            return Err(RemovalError::Rejected {
                status: status.as_u16(),
                detail: extract_detail(&content_type, &body),
            });
        }

        resp.bytes()
            .await
            .map_err(|e| RemovalError::Transport(e.to_string()))
    }
}

fn guess_filename(mime_type: &str) -> &'static str {
    if mime_type.contains("png") {
        "upload.png"
    } else if mime_type.contains("jpeg") || mime_type.contains("jpg") {
        "upload.jpg"
    } else if mime_type.contains("webp") {
        "upload.webp"
    } else {
        "upload"
    }
}

/// Pull a readable reason out of an error response.
///
/// JSON bodies yield `errors[0].title`, then `errors[0].detail`, then the raw
/// body; other bodies are returned as text.
fn extract_detail(content_type: &str, body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        return None;
    }

    if !content_type.contains("application/json") {
        return Some(text);
    }

    let json: serde_json::Value = serde_json::from_str(&text).ok()?;
    let first = &json["errors"][0];
    ["title", "detail"]
        .iter()
        .find_map(|key| first[*key].as_str().filter(|s| !s.is_empty()))
        .map(|s| s.to_string())
        .or(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_filename() {
        assert_eq!(guess_filename("image/png"), "upload.png");
        assert_eq!(guess_filename("image/jpeg"), "upload.jpg");
        assert_eq!(guess_filename("image/webp"), "upload.webp");
        assert_eq!(guess_filename("image/gif"), "upload");
    }

    #[test]
    fn test_detail_prefers_title() {
        let body = br#"{"errors":[{"title":"Insufficient credits","detail":"Top up"}]}"#;
        assert_eq!(
            extract_detail("application/json", body).as_deref(),
            Some("Insufficient credits")
        );
    }

    #[test]
    fn test_detail_falls_back_to_detail_then_body() {
        let body = br#"{"errors":[{"detail":"Image too small"}]}"#;
        assert_eq!(
            extract_detail("application/json; charset=utf-8", body).as_deref(),
            Some("Image too small")
        );

        let body = br#"{"message":"nope"}"#;
        assert_eq!(
            extract_detail("application/json", body).as_deref(),
            Some(r#"{"message":"nope"}"#)
        );
    }

    #[test]
    fn test_detail_plain_text_and_empty() {
        assert_eq!(
            extract_detail("text/plain", b"Service unavailable\n").as_deref(),
            Some("Service unavailable")
        );
        assert_eq!(extract_detail("text/plain", b"  "), None);
        assert_eq!(extract_detail("application/json", b"{not json"), None);
    }
}
