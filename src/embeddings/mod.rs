// Embeddings module
// Provider seam plus the Ollama-backed implementation

pub mod ollama;

pub use ollama::OllamaClient;

use anyhow::Result;

/// External embedding provider seam. Indexing and querying must go through
/// the same provider and model; vectors from different models are not
/// comparable.
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed output dimension of this provider's model
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts)?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Provider returned no embedding for text"))
    }
}
