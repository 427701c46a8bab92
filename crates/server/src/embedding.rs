// Text embeddings for semantic note search, backed by Cohere's embed API.
//
// Notes are embedded as documents when written; search queries are embedded
// with the matching query input type. With no API key configured the
// provider is disabled and search reports itself unavailable.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const COHERE_EMBED_URL: &str = "https://api.cohere.com/v2/embed";
const EMBED_MODEL: &str = "embed-v4.0";

/// Must match the `vector(n)` column width in the notes migration.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("no embedding provider is configured")]
    Unconfigured,
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("embedding response contained no vectors")]
    EmptyResponse,
}

#[derive(Clone)]
pub enum Embeddings {
    Cohere(CohereEmbeddings),
    Disabled,
    #[cfg(test)]
    Fixed(Arc<HashMap<String, Vec<f32>>>),
}

impl Embeddings {
    pub fn from_api_key(api_key: Option<String>) -> Self {
        match api_key {
            Some(key) if !key.trim().is_empty() => Self::Cohere(CohereEmbeddings::new(key)),
            _ => Self::Disabled,
        }
    }

    /// Test provider that maps exact texts to canned vectors. Unknown text
    /// embeds to an empty vector, which never ranks in a similarity search.
    #[cfg(test)]
    pub fn fixed(entries: &[(&str, Vec<f32>)]) -> Self {
        Self::Fixed(Arc::new(
            entries.iter().map(|(text, vector)| ((*text).to_owned(), vector.clone())).collect(),
        ))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub async fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            Self::Cohere(provider) => provider.embed(text, "search_document").await,
            Self::Disabled => Err(EmbeddingError::Unconfigured),
            #[cfg(test)]
            Self::Fixed(entries) => Ok(entries.get(text).cloned().unwrap_or_default()),
        }
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            Self::Cohere(provider) => provider.embed(text, "search_query").await,
            Self::Disabled => Err(EmbeddingError::Unconfigured),
            #[cfg(test)]
            Self::Fixed(entries) => Ok(entries.get(text).cloned().unwrap_or_default()),
        }
    }
}

#[derive(Clone)]
pub struct CohereEmbeddings {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: [&'a str; 1],
    input_type: &'a str,
    embedding_types: [&'a str; 1],
    output_dimension: usize,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbedVectors,
}

#[derive(Deserialize)]
struct EmbedVectors {
    float: Vec<Vec<f32>>,
}

impl CohereEmbeddings {
    fn new(api_key: String) -> Self {
        Self { client: reqwest::Client::new(), api_key }
    }

    async fn embed(&self, text: &str, input_type: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbedRequest {
            model: EMBED_MODEL,
            texts: [text],
            input_type,
            embedding_types: ["float"],
            output_dimension: EMBEDDING_DIMENSIONS,
        };

        let response = self
            .client
            .post(COHERE_EMBED_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let payload: EmbedResponse = response.json().await?;
        payload.embeddings.float.into_iter().next().ok_or(EmbeddingError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EmbedRequest, EmbedResponse, EmbeddingError, Embeddings, EMBED_MODEL};

    #[tokio::test]
    async fn fixed_provider_returns_the_configured_vector() {
        let embeddings = Embeddings::fixed(&[("buy milk", vec![1.0, 0.0])]);

        let vector = embeddings.embed_query("buy milk").await.expect("embed should succeed");
        assert_eq!(vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn unknown_text_embeds_to_an_empty_vector() {
        let embeddings = Embeddings::fixed(&[]);

        let vector = embeddings.embed_document("anything").await.expect("embed should succeed");
        assert!(vector.is_empty());
    }

    #[tokio::test]
    async fn disabled_provider_reports_unconfigured() {
        let embeddings = Embeddings::from_api_key(None);
        assert!(!embeddings.is_enabled());

        let error = embeddings.embed_query("anything").await.expect_err("must fail");
        assert!(matches!(error, EmbeddingError::Unconfigured));
    }

    #[test]
    fn blank_api_key_disables_the_provider() {
        assert!(!Embeddings::from_api_key(Some("   ".to_owned())).is_enabled());
        assert!(Embeddings::from_api_key(Some("key".to_owned())).is_enabled());
    }

    #[test]
    fn request_body_matches_the_embed_api_contract() {
        let request = EmbedRequest {
            model: EMBED_MODEL,
            texts: ["buy milk"],
            input_type: "search_document",
            embedding_types: ["float"],
            output_dimension: 1536,
        };

        let body = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(
            body,
            json!({
                "model": "embed-v4.0",
                "texts": ["buy milk"],
                "input_type": "search_document",
                "embedding_types": ["float"],
                "output_dimension": 1536,
            })
        );
    }

    #[test]
    fn response_parsing_takes_the_first_vector() {
        let payload = json!({
            "id": "ignored",
            "embeddings": { "float": [[0.25, -0.5, 1.0]] },
            "texts": ["buy milk"],
        });

        let response: EmbedResponse =
            serde_json::from_value(payload).expect("response should parse");
        assert_eq!(response.embeddings.float[0], vec![0.25, -0.5, 1.0]);
    }
}
