//! Query-time retrieval and answer selection.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;

use crate::debug_log;
use crate::embedder::Embedder;
use crate::index::VectorIndex;

/// Answer returned when retrieval produces nothing usable.
pub const DEFAULT_FALLBACK_ANSWER: &str = "please wait doctor answers";

/// Retrieval tuning knobs.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Results requested per query.
    pub top_k: usize,
    /// Sentinel answer for empty/blank outcomes.
    pub fallback_answer: String,
    /// Cached query embeddings kept in memory (0 disables caching).
    pub query_cache_size: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            fallback_answer: DEFAULT_FALLBACK_ANSWER.to_string(),
            query_cache_size: 1024,
        }
    }
}

/// Answers free-text queries with the title of the closest indexed record.
///
/// Each query is stateless. The served index is an immutable snapshot
/// behind an `Arc`; [`Retriever::install`] swaps in a rebuilt index without
/// disturbing queries already in flight, which keep the snapshot they
/// started with.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: RwLock<Arc<VectorIndex>>,
    query_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
    config: RetrieverConfig,
}

impl Retriever {
    /// Builds a retriever serving the given index.
    pub fn new(embedder: Arc<dyn Embedder>, index: VectorIndex, config: RetrieverConfig) -> Self {
        let query_cache = NonZeroUsize::new(config.query_cache_size)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            embedder,
            index: RwLock::new(Arc::new(index)),
            query_cache,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Replaces the served index atomically.
    ///
    /// The cache of query embeddings survives the swap; it depends only on
    /// the embedding model, which is pinned per retriever.
    pub fn install(&self, index: VectorIndex) {
        let mut guard = self
            .index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(index);
    }

    /// Snapshot handle of the currently served index.
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Answers a query with the top-ranked record's title.
    ///
    /// Blank queries, an empty index, a blank top title, and exhausted
    /// embedding retries all yield the configured fallback sentinel. This
    /// is the only layer that emits the sentinel; internal stages report
    /// typed failures and never talk to the user.
    pub fn answer(&self, query: &str) -> String {
        if query.trim().is_empty() {
            return self.config.fallback_answer.clone();
        }
        let Some(vector) = self.query_embedding(query) else {
            return self.config.fallback_answer.clone();
        };

        let index = self.snapshot();
        let hits = index.search(&vector, self.config.top_k);
        let Some(best) = hits.first() else {
            return self.config.fallback_answer.clone();
        };

        // Top-1 policy: the remaining k-1 hits never influence the answer.
        let title = best.chunk.metadata.title.trim();
        if title.is_empty() {
            self.config.fallback_answer.clone()
        } else {
            title.to_string()
        }
    }

    fn query_embedding(&self, query: &str) -> Option<Vec<f32>> {
        if let Some(cache) = &self.query_cache {
            let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(vector) = cache.get(query) {
                return Some(vector.clone());
            }
        }

        match self.embedder.embed_query(query) {
            Ok(vector) => {
                if let Some(cache) = &self.query_cache {
                    let mut cache =
                        cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    cache.put(query.to_string(), vector.clone());
                }
                Some(vector)
            }
            Err(_err) => {
                debug_log!("query embedding failed after retries: {:#}", _err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunk;
    use crate::embedder::hashing::HashingEmbedder;
    use crate::record::{normalize, RawRecord};
    use anyhow::bail;
    use pretty_assertions::assert_eq;

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed_batch(&self, _inputs: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
            bail!("embedding service unavailable")
        }
    }

    fn corpus_chunk(text: &str, title: &str) -> Chunk {
        let mut metadata = normalize(&RawRecord::default()).metadata;
        metadata.title = title.to_string();
        Chunk {
            start_offset: 0,
            text: text.to_string(),
            metadata,
        }
    }

    fn index_of(embedder: &HashingEmbedder, chunks: Vec<Chunk>) -> VectorIndex {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedder.embed_batch(&texts).expect("hashing never fails");
        VectorIndex::build("hashing-test", chunks, vectors).expect("build")
    }

    #[test]
    fn answers_with_top_title() {
        let embedder = HashingEmbedder::default();
        let index = index_of(
            &embedder,
            vec![
                corpus_chunk("itchy skin rash", "Dermatitis"),
                corpus_chunk("sore throat and cough", "Flu"),
            ],
        );
        let retriever = Retriever::new(
            Arc::new(embedder),
            index,
            RetrieverConfig::default(),
        );
        assert_eq!(retriever.answer("itchy skin"), "Dermatitis");
    }

    #[test]
    fn blank_query_and_empty_index_fall_back() {
        let embedder = HashingEmbedder::default();
        let index = VectorIndex::build("hashing-test", Vec::new(), Vec::new()).expect("build");
        let retriever = Retriever::new(
            Arc::new(embedder),
            index,
            RetrieverConfig::default(),
        );
        assert_eq!(retriever.answer(""), DEFAULT_FALLBACK_ANSWER);
        assert_eq!(retriever.answer("   "), DEFAULT_FALLBACK_ANSWER);
        assert_eq!(retriever.answer("anything at all"), DEFAULT_FALLBACK_ANSWER);
    }

    #[test]
    fn blank_title_falls_back_even_with_a_match() {
        let embedder = HashingEmbedder::default();
        let index = index_of(&embedder, vec![corpus_chunk("stomach pain", "   ")]);
        let retriever = Retriever::new(
            Arc::new(embedder),
            index,
            RetrieverConfig::default(),
        );
        assert_eq!(retriever.answer("stomach pain"), DEFAULT_FALLBACK_ANSWER);
    }

    #[test]
    fn embedding_failure_becomes_the_fallback_answer() {
        let embedder = HashingEmbedder::default();
        let index = index_of(&embedder, vec![corpus_chunk("stomach pain", "Gastritis")]);
        let retriever = Retriever::new(
            Arc::new(FailingEmbedder),
            index,
            RetrieverConfig {
                query_cache_size: 0,
                ..RetrieverConfig::default()
            },
        );
        assert_eq!(retriever.answer("stomach pain"), DEFAULT_FALLBACK_ANSWER);
    }

    #[test]
    fn custom_fallback_is_honored() {
        let embedder = HashingEmbedder::default();
        let index = VectorIndex::build("hashing-test", Vec::new(), Vec::new()).expect("build");
        let retriever = Retriever::new(
            Arc::new(embedder),
            index,
            RetrieverConfig {
                fallback_answer: "no answer yet".to_string(),
                ..RetrieverConfig::default()
            },
        );
        assert_eq!(retriever.answer("headache"), "no answer yet");
    }

    #[test]
    fn install_swaps_the_served_index() {
        let embedder = HashingEmbedder::default();
        let first = index_of(&embedder, vec![corpus_chunk("itchy skin rash", "Old")]);
        let retriever = Retriever::new(
            Arc::new(embedder.clone()),
            first,
            RetrieverConfig {
                query_cache_size: 0,
                ..RetrieverConfig::default()
            },
        );
        assert_eq!(retriever.answer("itchy skin"), "Old");

        let held = retriever.snapshot();
        let second = index_of(&embedder, vec![corpus_chunk("itchy skin rash", "New")]);
        retriever.install(second);

        assert_eq!(retriever.answer("itchy skin"), "New");
        // The pre-swap snapshot is untouched for readers that held it.
        assert_eq!(held.len(), 1);
        let probe = embedder.embed_query("itchy skin").expect("query");
        assert_eq!(held.search(&probe, 1)[0].chunk.metadata.title, "Old");
    }
}
