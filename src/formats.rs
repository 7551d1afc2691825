use serde::{Deserialize, Serialize};

use crate::extraction::{Category, ExtractionOutcome, FailureKind, Summary};
use crate::segment::Segment;

/// One JSON line written to stdout by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputLine {
    Segment(SegmentRecord),
    Outcome(OutcomeRecord),
    Summary(Summary),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub index: usize,
    pub source_url: String,
    pub captured_at: String,
    pub text: String,
}

impl SegmentRecord {
    pub fn new(index: usize, segment: &Segment) -> Self {
        Self {
            index,
            source_url: segment.source_url.clone(),
            captured_at: segment.captured_at_iso(),
            text: segment.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub index: usize,
    pub source_url: String,
    pub captured_at: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub text: String,
}

impl OutcomeRecord {
    pub fn new(index: usize, outcome: &ExtractionOutcome) -> Self {
        Self {
            index,
            source_url: outcome.source_url.clone(),
            captured_at: outcome.captured_at_iso(),
            category: outcome.category,
            failure: outcome.failure,
            text: outcome.text.clone(),
        }
    }
}
