//! In-process stand-ins for the remote providers.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use medical_chatbot::embedding::EmbeddingProvider;
use medical_chatbot::error::ProviderError;
use medical_chatbot::llm::{ChatMessage, ChatModel};

/// Hashes words of three letters or more into buckets, so texts that share
/// vocabulary end up close under cosine similarity.
pub struct HashEmbedder {
    pub dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % self.dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embedder"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Answers every question with a canned sentence that quotes it.
#[derive(Default)]
pub struct CannedModel {
    pub calls: AtomicUsize,
}

impl CannedModel {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for CannedModel {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let question = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("Here is what the reference says about: {}", question))
    }
}

/// Minimal single-page PDF whose content stream draws `phrase`.
pub fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    minimal_pdf_with_pages(&[phrase])
}

/// Minimal PDF with one page per entry of `phrases`, each page drawing its
/// phrase. Builds the body first, then an xref with correct byte offsets
/// so pdf-extract can parse it.
pub fn minimal_pdf_with_pages(phrases: &[&str]) -> Vec<u8> {
    let n = phrases.len();
    // Objects: 1 catalog, 2 pages, 3 font, then a (page, content) pair per page.
    let page_id = |i: usize| 4 + 2 * i;
    let kids = (0..n)
        .map(|i| format!("{} 0 R", page_id(i)))
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!("2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n", kids, n).as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, phrase) in phrases.iter().enumerate() {
        let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_id(i),
                page_id(i) + 1
            )
            .as_bytes(),
        );
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                page_id(i) + 1,
                content.len(),
                content
            )
            .as_bytes(),
        );
    }

    let size = offsets.len() + 1;
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", size).as_bytes());
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
