//! Batch index construction: normalize, chunk, embed, assemble.

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded};

use crate::chunker::{self, Chunk, ChunkerConfig};
use crate::debug_log;
use crate::embedder::Embedder;
use crate::index::VectorIndex;
use crate::record::{self, RawRecord};

/// Build-time tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chunking parameters applied to every record.
    pub chunker: ChunkerConfig,
    /// Chunks sent per embedding request.
    pub batch_size: usize,
    /// Concurrent embedding workers.
    pub worker_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            batch_size: 32,
            worker_threads: 1,
        }
    }
}

/// Summary of one completed index build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Records ingested.
    pub records: usize,
    /// Chunks embedded and indexed.
    pub chunks: usize,
    /// Embedding batches dispatched.
    pub batches: usize,
    /// Wall-clock build time.
    pub elapsed: Duration,
}

/// Builds a fresh index from raw records.
///
/// Normalization and chunking run inline; embedding fans out over a worker
/// pool and is reassembled in input order, so the resulting index is
/// identical regardless of worker count. Any failed batch aborts the whole
/// build; nothing is produced until every batch succeeds, so a previously
/// served index is never disturbed by a failed rebuild.
pub fn build_index(
    records: &[RawRecord],
    embedder: &dyn Embedder,
    model: &str,
    config: &PipelineConfig,
) -> Result<(VectorIndex, BuildReport)> {
    let started = Instant::now();

    let mut chunks: Vec<Chunk> = Vec::new();
    for raw in records {
        let normalized = record::normalize(raw);
        for chunk in chunker::split(&normalized.canonical_text, &config.chunker, &normalized.metadata)
        {
            if chunk.text.is_empty() {
                continue;
            }
            chunks.push(chunk);
        }
    }

    let batch_size = config.batch_size.max(1);
    let batches = chunks.len().div_ceil(batch_size);
    let vectors = embed_all(&chunks, embedder, batch_size, config.worker_threads.max(1))?;

    let chunk_count = chunks.len();
    let index = VectorIndex::build(model, chunks, vectors)
        .context("embedded batch failed index validation")?;
    Ok((
        index,
        BuildReport {
            records: records.len(),
            chunks: chunk_count,
            batches,
            elapsed: started.elapsed(),
        },
    ))
}

fn embed_all(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    batch_size: usize,
    workers: usize,
) -> Result<Vec<Vec<f32>>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let batches: Vec<Vec<&str>> = chunks
        .chunks(batch_size)
        .map(|batch| batch.iter().map(|chunk| chunk.text.as_str()).collect())
        .collect();
    let total = batches.len();

    let (task_tx, task_rx) = bounded::<(usize, Vec<&str>)>(workers * 2);
    let (result_tx, result_rx) = unbounded::<(usize, Result<Vec<Vec<f32>>>)>();

    let collected = thread::scope(|scope| -> Result<BTreeMap<usize, Vec<Vec<f32>>>> {
        for _ in 0..workers {
            let worker_rx = task_rx.clone();
            let worker_tx = result_tx.clone();
            scope.spawn(move || {
                for (batch_id, inputs) in worker_rx.iter() {
                    let result = embedder.embed_batch(&inputs);
                    if worker_tx.send((batch_id, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        for (batch_id, batch) in batches.into_iter().enumerate() {
            task_tx
                .send((batch_id, batch))
                .map_err(|_| anyhow!("embedding workers exited early"))?;
            debug_log!("queued embedding batch {} of {}", batch_id + 1, total);
        }
        drop(task_tx);

        let mut ready = BTreeMap::new();
        let mut failure: Option<anyhow::Error> = None;
        for (batch_id, result) in result_rx.iter() {
            match result {
                Ok(vectors) => {
                    debug_log!("embedding batch {} of {} complete", batch_id + 1, total);
                    ready.insert(batch_id, vectors);
                }
                Err(err) => {
                    // Keep draining so workers can exit; report the first failure.
                    if failure.is_none() {
                        failure =
                            Some(err.context(format!("embedding batch {} failed", batch_id)));
                    }
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(ready),
        }
    })?;

    anyhow::ensure!(
        collected.len() == total,
        "received {} embedding batches, expected {}",
        collected.len(),
        total
    );
    let mut vectors = Vec::with_capacity(chunks.len());
    for (_, batch) in collected {
        vectors.extend(batch);
    }
    anyhow::ensure!(
        vectors.len() == chunks.len(),
        "embedded {} vectors for {} chunks",
        vectors.len(),
        chunks.len()
    );
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::hashing::HashingEmbedder;
    use anyhow::bail;
    use pretty_assertions::assert_eq;

    fn record(title: &str, symptom: &str) -> RawRecord {
        RawRecord {
            title: title.to_string(),
            detail_symptom: symptom.to_string(),
            gender: "female".to_string(),
            age: 30,
            ..RawRecord::default()
        }
    }

    struct PoisonedEmbedder {
        inner: HashingEmbedder,
    }

    impl Embedder for PoisonedEmbedder {
        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            if inputs.iter().any(|text| text.contains("poison")) {
                bail!("simulated embedding service outage");
            }
            self.inner.embed_batch(inputs)
        }
    }

    #[test]
    fn builds_a_searchable_index() {
        let embedder = HashingEmbedder::default();
        let records = vec![
            record("Dermatitis", "itchy skin rash"),
            record("Flu", "fever sore throat cough"),
        ];
        let (index, report) =
            build_index(&records, &embedder, "hashing-test", &PipelineConfig::default())
                .expect("build");

        assert_eq!(report.records, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(index.len(), 2);
        let probe = embedder.embed_query("itchy skin").expect("query");
        assert_eq!(index.search(&probe, 1)[0].chunk.metadata.title, "Dermatitis");
    }

    #[test]
    fn worker_count_does_not_change_the_result() {
        let embedder = HashingEmbedder::default();
        let records: Vec<RawRecord> = (0..40)
            .map(|i| record(&format!("T{}", i), &format!("symptom variant number {}", i)))
            .collect();

        let serial = PipelineConfig {
            batch_size: 4,
            worker_threads: 1,
            ..PipelineConfig::default()
        };
        let parallel = PipelineConfig {
            batch_size: 4,
            worker_threads: 4,
            ..PipelineConfig::default()
        };
        let (index_a, _) =
            build_index(&records, &embedder, "hashing-test", &serial).expect("serial build");
        let (index_b, _) =
            build_index(&records, &embedder, "hashing-test", &parallel).expect("parallel build");

        assert_eq!(index_a.len(), index_b.len());
        for i in 0..40 {
            let probe = embedder
                .embed_query(&format!("symptom variant number {}", i))
                .expect("query");
            assert_eq!(
                index_a.search(&probe, 1)[0].chunk.metadata.title,
                index_b.search(&probe, 1)[0].chunk.metadata.title,
            );
        }
    }

    #[test]
    fn long_records_chunk_with_overlap() {
        let embedder = HashingEmbedder::default();
        let long_symptom = "ache ".repeat(300);
        let records = vec![record("Long", long_symptom.trim())];
        let (index, report) =
            build_index(&records, &embedder, "hashing-test", &PipelineConfig::default())
                .expect("build");
        assert!(report.chunks > 1);
        assert_eq!(index.len(), report.chunks);
    }

    #[test]
    fn a_failed_batch_aborts_the_whole_build() {
        let embedder = PoisonedEmbedder {
            inner: HashingEmbedder::default(),
        };
        let records = vec![
            record("Ok", "plain symptom"),
            record("Bad", "poison symptom"),
        ];
        let config = PipelineConfig {
            batch_size: 1,
            worker_threads: 2,
            ..PipelineConfig::default()
        };
        let err = build_index(&records, &embedder, "hashing-test", &config).unwrap_err();
        assert!(format!("{:#}", err).contains("outage"));
    }

    #[test]
    fn empty_corpus_builds_an_empty_index() {
        let embedder = HashingEmbedder::default();
        let (index, report) =
            build_index(&[], &embedder, "hashing-test", &PipelineConfig::default())
                .expect("build");
        assert!(index.is_empty());
        assert_eq!(report.chunks, 0);
        assert_eq!(report.batches, 0);
    }
}
