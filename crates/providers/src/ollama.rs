//! Ollama HTTP adapters.
//!
//! Talks to a local or hosted Ollama server:
//! - `POST /api/generate`   one non-streaming completion
//! - `POST /api/embeddings` one vector per request
//! - `GET  /api/tags`       installed models (health checks)

use async_trait::async_trait;
use evidex_config::OllamaConfig;
use evidex_core::error::{EmbeddingError, ProviderError};
use evidex_core::{Embedder, Generator};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_HOST: &str = "http://127.0.0.1:11434";

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        DEFAULT_HOST.to_string()
    } else if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("failed to create HTTP client: {e}"))
}

// ── Generation ────────────────────────────────────────────────────────────

/// Text generation through `POST /api/generate`.
pub struct OllamaGenerator {
    host: String,
    model: String,
    timeout: Duration,
    system: Option<String>,
    auth: Option<(String, String)>,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(
        host: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            host: normalize_host(host),
            model: model.into(),
            timeout,
            system: None,
            auth: None,
            client: build_client(timeout).map_err(ProviderError::Network)?,
        })
    }

    /// Build from the `services.ollama` section, using `llm_model`.
    pub fn from_config(config: &OllamaConfig) -> Result<Self, ProviderError> {
        let generator = Self::new(
            &config.host,
            config.llm_model.clone(),
            Duration::from_secs(config.generate_timeout_secs),
        )?;
        Ok(match &config.api_key {
            Some(key) if !key.trim().is_empty() => {
                generator.with_api_key(key, &config.auth_header, &config.auth_scheme)
            }
            _ => generator,
        })
    }

    /// Send `{header}: {scheme} {key}` with every request (scheme may be empty).
    pub fn with_api_key(mut self, key: &str, header: &str, scheme: &str) -> Self {
        let value = if scheme.trim().is_empty() {
            key.trim().to_string()
        } else {
            format!("{} {}", scheme.trim(), key.trim())
        };
        self.auth = Some((header.to_string(), value));
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((header, value)) => builder.header(header.as_str(), value.as_str()),
            None => builder,
        }
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.host);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            });
        }

        let tags: ApiTags = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the server answers at all.
    pub async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.host);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| {
                ProviderError::Network(format!(
                    "Ollama is not reachable at {} ({e}); start it with `ollama serve`",
                    self.host
                ))
            })?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.host);

        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": temperature },
        });
        if let Some(system) = &self.system {
            body["system"] = serde_json::json!(system);
        }

        debug!(
            provider = "ollama",
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "Sending generate request"
        );

        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        host: self.host.clone(),
                        model: self.model.clone(),
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiGenerate = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    host: self.host.clone(),
                    model: self.model.clone(),
                    secs: self.timeout.as_secs(),
                }
            } else {
                ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
            }
        })?;

        Ok(api_response.response.trim().to_string())
    }
}

// ── Embeddings ────────────────────────────────────────────────────────────

/// Embeddings through `POST /api/embeddings`, one request per input.
pub struct OllamaEmbedder {
    host: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(
        host: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        Ok(Self {
            host: normalize_host(host),
            model: model.into(),
            client: build_client(timeout).map_err(EmbeddingError::Request)?,
        })
    }

    /// Build from the `services.ollama` section, using `embed_model`.
    pub fn from_config(config: &OllamaConfig) -> Result<Self, EmbeddingError> {
        Self::new(
            &config.host,
            config.embed_model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.host);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request(format!(
                "status {status}: {error_body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidPayload(e.to_string()))?;

        let values = payload
            .get("embedding")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| {
                EmbeddingError::InvalidPayload("response has no 'embedding' list".into())
            })?;

        values
            .iter()
            .map(|v| {
                v.as_f64().map(|x| x as f32).ok_or_else(|| {
                    EmbeddingError::InvalidPayload(format!("non-numeric embedding value {v}"))
                })
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!(
            provider = "ollama",
            model = %self.model,
            count = texts.len(),
            "Sending embedding requests"
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            if text.trim().is_empty() {
                vectors.push(Vec::new());
                continue;
            }
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }
}

// ── API types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiGenerate {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct ApiTags {
    #[serde(default)]
    models: Vec<ApiModel>,
}

#[derive(Deserialize)]
struct ApiModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve `bodies` in order, one connection each; yields the request bodies.
    async fn serve(bodies: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                seen.push(read_request_body(&mut socket).await);
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            seen
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request_body(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).into_owned();
                }
            }
        }
        String::new()
    }

    #[test]
    fn host_is_normalized() {
        assert_eq!(normalize_host("localhost:11434/"), "http://localhost:11434");
        assert_eq!(normalize_host("https://ollama.com"), "https://ollama.com");
        assert_eq!(normalize_host("  "), DEFAULT_HOST);
    }

    #[test]
    fn from_config_uses_llm_model_and_key() {
        let config = OllamaConfig {
            api_key: Some("k-123".into()),
            ..OllamaConfig::default()
        };
        let generator = OllamaGenerator::from_config(&config).unwrap();
        assert_eq!(generator.model(), config.llm_model);
        assert_eq!(
            generator.auth,
            Some(("Authorization".to_string(), "Bearer k-123".to_string()))
        );
    }

    #[tokio::test]
    async fn generate_sends_non_streaming_request() {
        let (host, server) = serve(vec![(200, r#"{"response":"  <featureModel/>\n"}"#.into())]).await;
        let generator = OllamaGenerator::new(&host, "llama3.1:8b", Duration::from_secs(5))
            .unwrap()
            .with_system("Be terse.");

        let output = generator.generate("Describe the domain", 0.2).await.unwrap();
        assert_eq!(output, "<featureModel/>");

        let requests = server.await.unwrap();
        let sent: serde_json::Value = serde_json::from_str(&requests[0]).unwrap();
        assert_eq!(sent["model"], "llama3.1:8b");
        assert_eq!(sent["stream"], false);
        assert_eq!(sent["system"], "Be terse.");
        assert!((sent["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn generate_error_status_is_api_error() {
        let (host, _server) = serve(vec![(404, r#"{"error":"model not found"}"#.into())]).await;
        let generator = OllamaGenerator::new(&host, "missing", Duration::from_secs(5)).unwrap();

        let err = generator.generate("hi", 0.0).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 404, .. }));
    }

    #[tokio::test]
    async fn slow_server_is_a_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let generator =
            OllamaGenerator::new(&format!("http://{addr}"), "slow", Duration::from_millis(200))
                .unwrap();
        let err = generator.generate("hi", 0.0).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { ref model, .. } if model == "slow"));
        assert!(err.to_string().contains("lower the input size"));
    }

    #[tokio::test]
    async fn embed_is_sequential_and_skips_blank_inputs() {
        let (host, server) = serve(vec![
            (200, r#"{"embedding":[0.5,1.0]}"#.into()),
            (200, r#"{"embedding":[2.0,0.0]}"#.into()),
        ])
        .await;
        let embedder =
            OllamaEmbedder::new(&host, "nomic-embed-text", Duration::from_secs(5)).unwrap();

        let inputs = vec!["first".to_string(), "   ".to_string(), "second".to_string()];
        let vectors = embedder.embed(&inputs).await.unwrap();
        assert_eq!(vectors, vec![vec![0.5, 1.0], vec![], vec![2.0, 0.0]]);

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&requests[0]).unwrap();
        assert_eq!(first["prompt"], "first");
        assert_eq!(first["model"], "nomic-embed-text");
    }

    #[tokio::test]
    async fn embed_without_vector_is_invalid_payload() {
        let (host, _server) = serve(vec![(200, r#"{"embedding":"nope"}"#.into())]).await;
        let embedder = OllamaEmbedder::new(&host, "m", Duration::from_secs(5)).unwrap();

        let err = embedder.embed(&["text".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn list_models_reads_tags() {
        let (host, _server) = serve(vec![(
            200,
            r#"{"models":[{"name":"llama3.1:8b"},{"name":"nomic-embed-text:latest"}]}"#.into(),
        )])
        .await;
        let generator = OllamaGenerator::new(&host, "llama3.1:8b", Duration::from_secs(5)).unwrap();

        let models = generator.list_models().await.unwrap();
        assert_eq!(models, vec!["llama3.1:8b", "nomic-embed-text:latest"]);
    }

    #[tokio::test]
    async fn unreachable_server_fails_health_check() {
        let generator =
            OllamaGenerator::new("http://127.0.0.1:9", "m", Duration::from_millis(200)).unwrap();
        let err = generator.health_check().await.unwrap_err();
        assert!(err.to_string().contains("ollama serve"));
    }
}
