use serde::{Deserialize, Serialize};

/// Stored in place of a region the model forgot to emit.
pub const EXTRACTION_FAILED: &str = "extraction failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    /// Newline separated "- " bullets explaining the summary.
    pub rationale: String,
    pub tags: Vec<String>,
}
