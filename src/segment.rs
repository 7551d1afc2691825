use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use serde::{Deserialize, Serialize};

/// One unit of page text plus where and when it was captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub source_url: String,
    pub captured_at: DateTime<Utc>,
    pub text: String,
}

impl Segment {
    pub fn captured_at_iso(&self) -> String {
        self.captured_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Provenance shared by every segment cut from a single fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub source_url: String,
    pub captured_at: DateTime<Utc>,
}

impl Provenance {
    /// Stamps `source_url` with the current time, truncated to whole seconds.
    pub fn now(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            captured_at: Utc::now().trunc_subsecs(0),
        }
    }

    /// Blank pieces are dropped; a `Segment` never holds whitespace-only text.
    pub fn attach<I, S>(&self, pieces: I) -> Vec<Segment>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        pieces
            .into_iter()
            .map(Into::<String>::into)
            .filter(|text| !text.trim().is_empty())
            .map(|text| Segment {
                source_url: self.source_url.clone(),
                captured_at: self.captured_at,
                text,
            })
            .collect()
    }
}

/// Splits `text` on exact occurrences of `marker`, dropping blank pieces.
pub fn split_on_marker<'a>(text: &'a str, marker: &str) -> Vec<&'a str> {
    if marker.is_empty() {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed]
        };
    }

    text.split(marker)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Cuts `text` into pieces of at most `max_chars` characters, breaking on
/// whitespace where possible and hard-splitting words that do not fit.
pub fn chunk_by_length(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text.trim();
    if max_chars == 0 {
        if !rest.is_empty() {
            chunks.push(rest);
        }
        return chunks;
    }

    while !rest.is_empty() {
        let Some((limit, next)) = rest.char_indices().nth(max_chars) else {
            chunks.push(rest);
            break;
        };

        let split_at = if next.is_whitespace() {
            limit
        } else {
            rest[..limit]
                .rfind(char::is_whitespace)
                .filter(|idx| *idx > 0)
                .unwrap_or(limit)
        };

        let (head, tail) = rest.split_at(split_at);
        let head = head.trim_end();
        if !head.is_empty() {
            chunks.push(head);
        }
        rest = tail.trim_start();
    }

    chunks
}

/// Marker split followed by optional length-bounded chunking.
pub fn segment(cleaned_text: &str, marker: &str, max_length: Option<usize>) -> Vec<String> {
    let pieces = split_on_marker(cleaned_text, marker);
    let pieces: Vec<&str> = match max_length.filter(|max| *max > 0) {
        Some(max) => pieces
            .into_iter()
            .flat_map(|piece| chunk_by_length(piece, max))
            .collect(),
        None => pieces,
    };

    pieces.into_iter().map(str::to_owned).collect()
}
