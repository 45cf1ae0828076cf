//! Embedder/Persister: turns fetched content into stored records.
//!
//! For one item: chunk the body, embed every chunk (when a provider is
//! enabled), then hand the complete record set and the new fingerprint to
//! the store in one call. Nothing is written until every chunk has been
//! embedded, and the store commits records and fingerprint together, so a
//! failure at any chunk leaves the old fingerprint in place and the item is
//! retried wholesale on the next run.

use tracing::debug;

use crate::chunk::{chunk_text, sha256_hex};
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, SyncError};
use crate::models::{Fingerprint, ItemContent, PersistedRecord, RemoteItem};
use crate::store::SyncStore;

/// What a successful persist wrote.
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub chunks: usize,
    pub embedded: usize,
    /// The fingerprint committed with the records.
    pub fingerprint: Fingerprint,
}

pub struct Persister<'a> {
    source: &'a str,
    store: &'a dyn SyncStore,
    embedder: &'a dyn EmbeddingProvider,
    max_tokens: usize,
    batch_size: usize,
}

impl<'a> Persister<'a> {
    pub fn new(
        source: &'a str,
        store: &'a dyn SyncStore,
        embedder: &'a dyn EmbeddingProvider,
        max_tokens: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            store,
            embedder,
            max_tokens,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn persist(&self, item: &RemoteItem, content: &ItemContent) -> Result<PersistOutcome> {
        let chunks = chunk_text(&content.body, self.max_tokens);
        let title = content.title.clone().or_else(|| item.title.clone());

        let embeddings = if self.embedder.is_enabled() {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            Some(self.embed_all(&texts).await?)
        } else {
            None
        };

        let records: Vec<PersistedRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| PersistedRecord {
                source: self.source.to_string(),
                source_id: item.source_id.clone(),
                chunk_index: chunk.chunk_index,
                title: title.clone(),
                url: content.url.clone(),
                text: chunk.text,
                hash: chunk.hash,
                embedding: embeddings.as_ref().map(|e| e[i].clone()),
                embedding_model: embeddings
                    .as_ref()
                    .map(|_| self.embedder.model_name().to_string()),
            })
            .collect();

        let fingerprint = Fingerprint {
            source: self.source.to_string(),
            source_id: item.source_id.clone(),
            marker: item.marker,
            sub_count: item.sub_count,
            content_hash: sha256_hex(&content.body),
            chunk_count: records.len() as i64,
            synced_at: chrono::Utc::now().timestamp(),
        };

        self.store.persist_item(&records, &fingerprint).await?;

        debug!(
            source_id = %item.source_id,
            chunks = records.len(),
            "persisted item"
        );

        Ok(PersistOutcome {
            chunks: records.len(),
            embedded: embeddings.map(|e| e.len()).unwrap_or(0),
            fingerprint,
        })
    }

    /// Embed all chunk texts in batches, checking count and dimension.
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let dims = self.embedder.dims();
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let vectors = self
                .embedder
                .embed(batch)
                .await
                .map_err(|e| SyncError::Embedding(e.to_string()))?;

            if vectors.len() != batch.len() {
                return Err(SyncError::Embedding(format!(
                    "provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                return Err(SyncError::Embedding(format!(
                    "expected {}-dimensional vectors, got {}",
                    dims,
                    bad.len()
                )));
            }
            out.extend(vectors);
        }

        Ok(out)
    }
}
