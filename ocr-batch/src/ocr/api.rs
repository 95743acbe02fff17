use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::{parse_ocr_provider_model, OcrConfig};
use crate::error::{OcrBatchError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_RETRIES: u32 = 3;
const EXTRACT_PROMPT: &str = "Extract all text from this image. Keep the original line breaks and blank lines between paragraphs. Return only the extracted text without any explanations or formatting.";

/// OCR through an OpenAI-compatible vision chat completion endpoint.
#[derive(Clone, Debug)]
pub struct VisionApiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

impl VisionApiClient {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            OcrBatchError::OcrUnavailable("API key required for vision OCR".to_string())
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let (_, model) = parse_ocr_provider_model(&config.model);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OcrBatchError::Ocr(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn ocr(&self, image_path: &Path, image_bytes: &[u8]) -> Result<String> {
        let mime = mime_guess::from_path(image_path).first_or_octet_stream();
        let data_url = format!("data:{};base64,{}", mime, STANDARD.encode(image_bytes));

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: EXTRACT_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 4096,
        };

        self.make_request(&request).await
    }

    async fn make_request(&self, request: &ChatRequest) -> Result<String> {
        let mut retries = 0;

        loop {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let chat_response: ChatResponse = resp.json().await.map_err(|e| {
                        OcrBatchError::Ocr(format!("Failed to parse response: {e}"))
                    })?;

                    return chat_response
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| OcrBatchError::Ocr("No response from API".to_string()));
                }
                Ok(resp) if resp.status().as_u16() == 429 || resp.status().is_server_error() => {
                    retries += 1;
                    if retries >= MAX_RETRIES {
                        return Err(OcrBatchError::Ocr(format!(
                            "API request failed after {} retries: {}",
                            MAX_RETRIES,
                            resp.status()
                        )));
                    }
                    tracing::debug!(status = %resp.status(), retries, "Retrying vision OCR request");
                    tokio::time::sleep(backoff_delay(retries)).await;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(OcrBatchError::Ocr(format!(
                        "API request failed: {status} - {body}"
                    )));
                }
                Err(e) => {
                    retries += 1;
                    if retries >= MAX_RETRIES {
                        return Err(OcrBatchError::Ocr(format!(
                            "API request failed after {MAX_RETRIES} retries: {e}"
                        )));
                    }
                    tokio::time::sleep(backoff_delay(retries)).await;
                }
            }
        }
    }
}

fn backoff_delay(retries: u32) -> Duration {
    Duration::from_millis(100 * 2_u64.pow(retries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(base_url: Option<String>) -> OcrConfig {
        OcrConfig {
            model: "openai/gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            base_url,
            languages: "fra".to_string(),
            timeout_secs: 5,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[test]
    fn test_vision_client_requires_api_key() {
        let mut config = create_test_config(None);
        config.api_key = None;
        let result = VisionApiClient::new(&config);
        assert!(matches!(result, Err(OcrBatchError::OcrUnavailable(_))));
    }

    #[test]
    fn test_default_base_url_and_model() {
        let client = VisionApiClient::new(&create_test_config(None)).unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_custom_base_url_trailing_slash_is_trimmed() {
        let config = create_test_config(Some("http://localhost:11434/v1/".to_string()));
        let client = VisionApiClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_ocr_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("infor-\nmation")))
            .expect(1)
            .mount(&server)
            .await;

        let client = VisionApiClient::new(&create_test_config(Some(server.uri()))).unwrap();
        let text = client
            .ocr(Path::new("scan.png"), &[0x89, 0x50, 0x4E, 0x47])
            .await
            .unwrap();

        assert_eq!(text, "infor-\nmation");
    }

    #[tokio::test]
    async fn test_ocr_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("page text")))
            .mount(&server)
            .await;

        let client = VisionApiClient::new(&create_test_config(Some(server.uri()))).unwrap();
        let text = client.ocr(Path::new("scan.jpg"), b"jpeg").await.unwrap();

        assert_eq!(text, "page text");
    }

    #[tokio::test]
    async fn test_ocr_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = VisionApiClient::new(&create_test_config(Some(server.uri()))).unwrap();
        let err = client
            .ocr(Path::new("scan.png"), b"png")
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("401"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_ocr_with_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let client = VisionApiClient::new(&create_test_config(Some(server.uri()))).unwrap();
        let result = client.ocr(Path::new("scan.png"), b"png").await;

        assert!(matches!(result, Err(OcrBatchError::Ocr(_))));
    }
}
