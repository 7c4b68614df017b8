//! PDF ingestion: text extraction and fixed-window chunking.

use tracing::{info, warn};

use crate::index::{DocumentChunk, DocumentIndex};
use crate::{Error, Result};

/// Window size in characters.
pub const CHUNK_SIZE: usize = 1000;
/// Stride between window starts (200-character overlap).
pub const CHUNK_STRIDE: usize = 800;

/// Extract text from raw PDF bytes.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::IngestError(format!("PDF extraction failed: {}", e)))
}

/// Split extracted text into overlapping character windows.
///
/// Windows are `CHUNK_SIZE` characters with a `CHUNK_STRIDE` step; the last
/// window ends exactly at the end of the text. For text of L characters this
/// produces `ceil((L - 1000) / 800) + 1` chunks when L > 1000, one chunk for
/// 0 < L <= 1000, and none for empty text. Boundaries are character-based, so
/// a window never splits a code point.
pub fn chunk_text(text: &str, user_id: i64, filename: &str) -> Vec<DocumentChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + CHUNK_SIZE).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        chunks.push(DocumentChunk::new(user_id, filename, window));

        if end == chars.len() {
            break;
        }
        start += CHUNK_STRIDE;
    }

    chunks
}

/// Ingest one uploaded document into the index.
///
/// Returns the number of chunks created; 0 on empty extracted text or any
/// processing failure. Errors are logged, never surfaced.
pub async fn ingest_document(
    index: &DocumentIndex,
    bytes: &[u8],
    filename: &str,
    user_id: i64,
) -> usize {
    let text = match extract_pdf_text(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!("Ingest failed for '{}': {}", filename, err);
            return 0;
        }
    };

    let chunks = chunk_text(&text, user_id, filename);
    if chunks.is_empty() {
        warn!("Ingest for '{}' produced no text", filename);
        return 0;
    }

    match index.upsert_chunks(&chunks).await {
        Ok(count) => {
            info!("Ingested '{}' as {} chunks for user {}", filename, count, user_id);
            count
        }
        Err(err) => {
            warn!("Indexing failed for '{}': {}", filename, err);
            0
        }
    }
}
