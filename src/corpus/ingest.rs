//! Ingestion of the reference document into chunks.
//!
//! The document is scanned for code declarations in source order. Each chunk
//! spans from its code's match start to the next match start, or to the end of
//! the document for the last code. Spans are never truncated or re-split, so
//! the chunks tile the document from the first code onward.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::corpus::chapters::chapter_for_code;
use crate::corpus::chunk::{Chunk, ChunkId};
use crate::error::{CorpusError, CorpusResult};

/// Code occurrence anywhere in running text.
static CODE_OCCURRENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]\d{2}(?:\.\d{1,2})?\b").expect("valid code pattern"));

/// Markers that may follow a code declaration (dual coding dagger/asterisk).
const DECLARATION_MARKERS: &[char] = &['†', '*'];

/// Splits `document` into one chunk per code occurrence.
///
/// Duplicate codes are kept as separate chunks and the output preserves the
/// order of appearance.
///
/// # Errors
/// Returns [`CorpusError::MalformedCorpus`] when no code is found, which means
/// the document does not match the expected corpus format.
pub fn ingest(document: &str) -> CorpusResult<Vec<Chunk>> {
    let matches: Vec<_> = CODE_OCCURRENCE.find_iter(document).collect();

    if matches.is_empty() {
        return Err(CorpusError::MalformedCorpus {
            reason: format!(
                "no code matched in a document of {} bytes",
                document.len()
            ),
        });
    }

    let mut chunks = Vec::with_capacity(matches.len());
    for (position, found) in matches.iter().enumerate() {
        let start = found.start();
        let end = matches
            .get(position + 1)
            .map_or(document.len(), |next| next.start());

        let id = u32::try_from(position + 1)
            .ok()
            .and_then(ChunkId::new)
            .ok_or_else(|| CorpusError::MalformedCorpus {
                reason: "too many code occurrences to address".to_string(),
            })?;

        let code = found.as_str().to_string();
        let raw_context = document[start..end].to_string();
        let label = derive_label(&raw_context[code.len()..]);
        let (chapter, category) = chapter_for_code(&code);

        chunks.push(Chunk {
            id,
            code,
            label,
            raw_context,
            category: category.to_string(),
            chapter: chapter.to_string(),
            start,
            end,
        });
    }

    debug!("Ingested {} chunks", chunks.len());
    Ok(chunks)
}

/// Reads a plain-text document from disk and ingests it.
pub fn ingest_file(path: impl AsRef<Path>) -> CorpusResult<Vec<Chunk>> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let chunks = ingest(&document)?;
    info!(
        "Extracted {} code entries from {}",
        chunks.len(),
        path.display()
    );
    Ok(chunks)
}

/// First non-empty line after the code token.
fn derive_label(after_code: &str) -> String {
    after_code
        .trim_start_matches(|c: char| c.is_whitespace() || DECLARATION_MARKERS.contains(&c))
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_code_toy_document() {
        let doc = "R06.0 Dyspnée context... R07.1 Douleur context...";
        let chunks = ingest(doc).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].code, "R06.0");
        assert_eq!(chunks[1].code, "R07.1");
        assert_eq!(chunks[0].raw_context, "R06.0 Dyspnée context... ");
        assert_eq!(chunks[1].raw_context, "R07.1 Douleur context...");
        assert_eq!(chunks[0].label, "Dyspnée context...");
        assert_eq!(chunks[0].chapter, "XVIII");
    }

    #[test]
    fn test_spans_tile_the_document() {
        let doc = "Préambule\nR05\nToux\nR06.0\nDyspnée\nA l'effort\nR50\nFièvre\n";
        let chunks = ingest(doc).unwrap();

        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(chunks.last().unwrap().end, doc.len());
        for chunk in &chunks {
            assert!(!chunk.raw_context.is_empty());
            assert_eq!(&doc[chunk.start..chunk.end], chunk.raw_context);
        }
        assert_eq!(chunks[1].label, "Dyspnée");
        assert!(chunks[1].raw_context.contains("A l'effort"));
    }

    #[test]
    fn test_duplicates_kept_in_source_order() {
        let doc = "R07.1 Douleur\nR06.0 Dyspnée\nR07.1 Douleur thoracique, voir aussi";
        let chunks = ingest(doc).unwrap();

        let codes: Vec<&str> = chunks.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["R07.1", "R06.0", "R07.1"]);

        let ids: Vec<u32> = chunks.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_dagger_marker_is_not_part_of_label() {
        let chunks = ingest("A17.0 †\nMéningite tuberculeuse\n").unwrap();
        assert_eq!(chunks[0].code, "A17.0");
        assert_eq!(chunks[0].label, "Méningite tuberculeuse");
    }

    #[test]
    fn test_no_codes_is_malformed() {
        let result = ingest("Ce document ne contient aucun code.");
        assert!(matches!(result, Err(CorpusError::MalformedCorpus { .. })));

        let result = ingest("");
        assert!(matches!(result, Err(CorpusError::MalformedCorpus { .. })));
    }

    #[test]
    fn test_lowercase_and_embedded_tokens_are_ignored() {
        let chunks = ingest("r06.0 minuscule XR06 collé R06 valide").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].code, "R06");
    }

    #[test]
    fn test_ingest_file_missing() {
        let result = ingest_file("/definitely/not/here.txt");
        assert!(matches!(result, Err(CorpusError::Io { .. })));
    }
}
