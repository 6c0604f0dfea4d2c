//! Ollama Embedder
//!
//! Provides semantic embeddings from a pretrained sentence-embedding model
//! (e.g. `nomic-embed-text`, `all-minilm`) served by a local Ollama daemon.
//!
//! # Features
//! - Neural semantic embeddings (dimension reported by the model)
//! - Local-first (no API costs, privacy-preserving)
//! - Startup verification so an unusable backend is detected once
//! - Automatic retry with exponential backoff
//! - L2-normalized output vectors
//!
//! # Example
//! ```no_run
//! use lore_knowledge::embeddings::{Embedder, EmbeddingConfig};
//! use lore_knowledge::embeddings::providers::ollama::OllamaEmbedder;
//!
//! let config = EmbeddingConfig {
//!     provider: "ollama".to_string(),
//!     model: "nomic-embed-text".to_string(),
//!     ..Default::default()
//! };
//!
//! let embedder = OllamaEmbedder::new(&config).unwrap();
//! let embedding = embedder.embed_one("Hello world").unwrap();
//! assert_eq!(embedding.len(), embedder.embedding_dim());
//! ```

use crate::embeddings::provider::{normalize_l2, Embedder};
use crate::embeddings::EmbeddingConfig;
use lore_core::{AppError, AppResult};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Ollama API endpoint for embeddings
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Maximum retry attempts for failed requests
const MAX_RETRIES: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Ollama embedder using the local HTTP API
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    /// HTTP client for API requests
    client: Client,
    /// Ollama API base URL
    base_url: String,
    /// Model name (e.g., "nomic-embed-text")
    model: String,
    /// Embedding dimensions, verified at startup
    dimensions: usize,
    /// Whether to L2-normalize returned vectors
    normalize: bool,
}

/// Request payload for Ollama embeddings API
#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response from Ollama embeddings API
#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Error response from Ollama API
#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder and verify the model answers.
    ///
    /// The base URL comes from `provider_config.base_url`, then the
    /// `OLLAMA_URL` environment variable, then the default local endpoint.
    ///
    /// # Errors
    /// * `AppError::EmbedderUnavailable` - If Ollama is not reachable, the model
    ///   is not installed, or the model's dimension disagrees with the config
    pub fn new(config: &EmbeddingConfig) -> AppResult<Self> {
        let timeout = config
            .provider_config
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(REQUEST_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| {
                AppError::EmbedderUnavailable(format!(
                    "Failed to create HTTP client for Ollama: {}",
                    e
                ))
            })?;

        let base_url = config
            .provider_option("base_url")
            .map(str::to_string)
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut embedder = Self {
            client,
            base_url,
            model: config.model.clone(),
            dimensions: config.dimensions,
            normalize: config.normalize,
        };

        embedder.dimensions = embedder.verify_connection(config.dimensions)?;

        Ok(embedder)
    }

    /// Verify Ollama connection and model availability.
    ///
    /// Returns the dimension reported by the model.
    #[instrument(skip(self), fields(model = %self.model))]
    fn verify_connection(&self, expected_dim: usize) -> AppResult<usize> {
        debug!("Verifying Ollama connection at {}", self.base_url);

        match self.embed_with_retries("test connection", MAX_RETRIES) {
            Ok(embedding) => {
                if expected_dim != 0 && embedding.len() != expected_dim {
                    return Err(AppError::EmbedderUnavailable(format!(
                        "Ollama model '{}' returned {} dimensions, expected {}",
                        self.model,
                        embedding.len(),
                        expected_dim
                    )));
                }
                debug!(
                    "Ollama connection verified, model '{}' ready ({} dimensions)",
                    self.model,
                    embedding.len()
                );
                Ok(embedding.len())
            }
            Err(e) => {
                error!("Failed to connect to Ollama: {}", e);
                Err(AppError::EmbedderUnavailable(format!(
                    "Ollama not available at {}. Ensure Ollama is running and model '{}' is installed. Run: ollama pull {}",
                    self.base_url, self.model, self.model
                )))
            }
        }
    }

    /// Embed single text with retry logic
    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    fn embed_with_retries(&self, text: &str, retries: u32) -> AppResult<Vec<f32>> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < retries {
            match self.embed_single(text) {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    attempt += 1;
                    last_error = Some(e);

                    if attempt < retries {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        warn!(
                            "Embedding failed (attempt {}/{}), retrying in {}ms",
                            attempt, retries, backoff_ms
                        );
                        std::thread::sleep(Duration::from_millis(backoff_ms));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Embedding("Unknown embedding error".to_string())))
    }

    /// Embed single text (no retries)
    fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| AppError::Embedding(format!("Failed to send request to Ollama: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(AppError::Embedding(format!(
                    "Ollama API error ({}): {}",
                    status, error_response.error
                )));
            }

            return Err(AppError::Embedding(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .map_err(|e| AppError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(AppError::Embedding(
                "Ollama returned an empty embedding".to_string(),
            ));
        }

        if self.dimensions != 0 && body.embedding.len() != self.dimensions {
            return Err(AppError::Embedding(format!(
                "Unexpected embedding dimensions: got {}, expected {}",
                body.embedding.len(),
                self.dimensions
            )));
        }

        if self.normalize {
            normalize_l2(&mut body.embedding);
        }

        Ok(body.embedding)
    }
}

impl Embedder for OllamaEmbedder {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn embedding_dim(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding batch of {} texts", texts.len());

        // The embeddings endpoint takes one prompt per request
        let mut embeddings = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                warn!("Embedding zero vector for empty text at index {}", i);
                embeddings.push(vec![0.0; self.dimensions]);
                continue;
            }

            embeddings.push(self.embed_with_retries(text, MAX_RETRIES)?);
        }

        Ok(embeddings)
    }
}
