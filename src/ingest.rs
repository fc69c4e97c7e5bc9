//! Offline ingestion: directory → documents → chunks → embeddings → index.
//!
//! One-shot and not incremental. By default chunk ids are random, so running
//! it twice over the same directory stores every chunk twice; `--dedup`
//! switches to content-hash ids, which makes a re-run overwrite instead.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::chunk::RecursiveSplitter;
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::{create_index, VectorIndex};
use crate::loader::{load_documents, Loaded};
use crate::models::{Chunk, IndexedEntry};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub root: PathBuf,
    pub dry_run: bool,
    /// Content-hash chunk ids, overriding `ingest.dedup`.
    pub dedup: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Loaded documents; a PDF counts once per non-empty page.
    pub documents: usize,
    /// Files that could not be read or extracted.
    pub skipped: usize,
    pub chunks: usize,
    pub upserted: usize,
}

/// Entry point for `medchat ingest`.
pub async fn run_ingest(config: &Config, options: IngestOptions) -> Result<()> {
    let dedup = options.dedup || config.ingest.dedup;

    if options.dry_run {
        let (loaded, chunks) = load_and_split(&options.root, config, dedup).await?;
        println!("ingest {} (dry-run)", options.root.display());
        println!("  documents: {}", loaded.documents.len());
        println!("  skipped: {}", loaded.skipped.len());
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    let embedder = create_provider(config)?;
    let index = create_index(config).await?;

    let report = ingest_directory(
        &options.root,
        config,
        embedder.as_ref(),
        index.as_ref(),
        dedup,
    )
    .await?;

    println!("ingest {}", options.root.display());
    println!("  documents: {}", report.documents);
    println!("  skipped: {}", report.skipped);
    println!("  chunks: {}", report.chunks);
    println!("  upserted: {}", report.upserted);
    println!("ok");
    Ok(())
}

/// Loads, splits, embeds and upserts everything under `root`.
///
/// Creates the index first if it does not exist.
pub async fn ingest_directory(
    root: &Path,
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    dedup: bool,
) -> Result<IngestReport> {
    if embedder.dims() != config.index.dimension {
        bail!(
            "Embedding model {} produces {} dims, index expects {}",
            embedder.model_name(),
            embedder.dims(),
            config.index.dimension
        );
    }

    let (loaded, chunks) = load_and_split(root, config, dedup).await?;

    index
        .ensure_index()
        .await
        .with_context(|| format!("Failed to prepare {} index", index.provider()))?;

    let total = chunks.len();
    let mut upserted = 0usize;

    for batch in chunks.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Embedding with {} failed", embedder.model_name()))?;
        if vectors.len() != batch.len() {
            bail!(
                "Embedding returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            );
        }

        let entries: Vec<IndexedEntry> = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedEntry { chunk, vector })
            .collect();

        upserted += index
            .upsert(&entries)
            .await
            .with_context(|| format!("Upsert into {} failed", index.provider()))?;

        tracing::info!(upserted, total, "ingest progress");
    }

    Ok(IngestReport {
        documents: loaded.documents.len(),
        skipped: loaded.skipped.len(),
        chunks: total,
        upserted,
    })
}

async fn load_and_split(root: &Path, config: &Config, dedup: bool) -> Result<(Loaded, Vec<Chunk>)> {
    let splitter = RecursiveSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    let loaded = load_documents(root, &config.ingest).await?;

    let chunks: Vec<Chunk> = loaded
        .documents
        .iter()
        .flat_map(|doc| splitter.split_document(doc, dedup))
        .collect();

    tracing::info!(
        root = %root.display(),
        documents = loaded.documents.len(),
        skipped = loaded.skipped.len(),
        chunks = chunks.len(),
        "documents split"
    );

    Ok((loaded, chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::index::InMemoryIndex;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct Constant(usize);

    #[async_trait]
    impl EmbeddingProvider for Constant {
        fn model_name(&self) -> &str {
            "constant"
        }
        fn dims(&self) -> usize {
            self.0
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![1.0; self.0]).collect())
        }
    }

    fn text_config(dims: usize) -> Config {
        let mut config = Config::default();
        config.embedding.dims = dims;
        config.index.dimension = dims;
        config.embedding.batch_size = 4;
        config.ingest.include_globs = vec!["**/*.txt".into()];
        config
    }

    fn write_corpus(tmp: &TempDir) {
        let paragraph = "Anemia is a condition in which the blood lacks healthy red cells. ";
        fs::write(tmp.path().join("anemia.txt"), paragraph.repeat(40)).unwrap();
        fs::write(tmp.path().join("short.txt"), "Fever is a raised body temperature.").unwrap();
        fs::write(tmp.path().join("ignored.csv"), "a,b,c").unwrap();
    }

    #[tokio::test]
    async fn test_ingest_reports_counts() {
        let tmp = TempDir::new().unwrap();
        write_corpus(&tmp);
        let config = text_config(3);
        let index = InMemoryIndex::new(3);

        let report = ingest_directory(tmp.path(), &config, &Constant(3), &index, false)
            .await
            .unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.skipped, 0);
        assert!(report.chunks > 2);
        assert_eq!(report.upserted, report.chunks);
        assert_eq!(index.count().await.unwrap(), report.chunks);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_before_writing() {
        let tmp = TempDir::new().unwrap();
        write_corpus(&tmp);
        let config = text_config(3);
        let index = InMemoryIndex::new(3);

        let err = ingest_directory(tmp.path(), &config, &Constant(8), &index, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("8 dims"));
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let config = text_config(3);
        let index = InMemoryIndex::new(3);
        let result = ingest_directory(&tmp.path().join("nope"), &config, &Constant(3), &index, false).await;
        assert!(result.is_err());
    }
}
