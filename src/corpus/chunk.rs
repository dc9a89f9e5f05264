//! Chunk records produced by ingestion.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::LazyLock;

/// Coding grammar: one uppercase letter, two digits, optional `.` with one or two digits.
pub static CODE_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]\d{2}(?:\.\d{1,2})?$").expect("valid code grammar"));

/// Returns true when `code` is well-formed per the coding grammar.
pub fn is_valid_code(code: &str) -> bool {
    CODE_GRAMMAR.is_match(code)
}

/// Type-safe wrapper for chunk IDs.
///
/// IDs are assigned in source order starting at 1, so the ID doubles as the
/// stable tie-breaker for similarity ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(NonZeroU32);

impl ChunkId {
    /// Returns `None` if the provided ID is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.get().to_le_bytes()
    }

    /// Returns `None` if the bytes represent zero.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::new(u32::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One indexable unit of the reference corpus, scoped to one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,

    /// Code as declared in the source document, e.g. `R06.0`
    pub code: String,

    /// First line of descriptive text following the code
    pub label: String,

    /// Verbatim span from this code's declaration up to the next one
    pub raw_context: String,

    /// Chapter title of the code range this code belongs to
    pub category: String,

    /// Chapter number in roman numerals, empty when the code is out of range
    #[serde(default)]
    pub chapter: String,

    /// Byte offset of `raw_context` in the source document
    pub start: usize,

    /// Byte offset one past the end of `raw_context`
    pub end: usize,
}

impl Chunk {
    /// Text representation used for embedding.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![
            format!("Code CIM-10: {}", self.code),
            format!("Libellé: {}", self.label),
        ];
        if !self.category.is_empty() {
            parts.push(format!("Chapitre: {}", self.category));
        }
        parts.push(self.raw_context.clone());
        parts.join("\n")
    }
}
