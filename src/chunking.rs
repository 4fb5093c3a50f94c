use serde::{Deserialize, Serialize};

use crate::document::SourceDocument;
use crate::metadata::ChunkMetadata;

/// Separator inserted between page texts before splitting.
pub const PAGE_JOINER: &str = "\n\n";

/// Configuration for the recursive splitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of trailing characters of a chunk carried into the next one.
    pub chunk_overlap: usize,
    /// Separators in priority order, most specific first. An occurrence starts
    /// a new piece and stays attached to it, so a banner always heads its
    /// section. The empty string requests a hard character split.
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            chunk_size: 2048,
            chunk_overlap: 200,
            separators: vec![
                "\nCOMPANY #".to_string(),
                "\nCompany ".to_string(),
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                " ".to_string(),
            ],
        }
    }
}

/// A bounded span of document text stored as one retrievable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The text content, including the overlap carried from the previous chunk.
    pub text: String,
    /// Structured provenance, filled in by the tagger.
    pub metadata: ChunkMetadata,
}

/// Split the ordered page sequence into overlapping chunks.
///
/// Pages are joined with [`PAGE_JOINER`], split recursively along the
/// configured separators, and merged back up to `chunk_size`. Every chunk
/// after the first is prefixed with the trailing `chunk_overlap` characters of
/// its predecessor so a retrieval hit near a boundary still carries the
/// closing context of the previous unit. Concatenating the non-overlap
/// regions reproduces the joined page text exactly.
pub fn split_documents(documents: &[SourceDocument], config: &ChunkConfig) -> Vec<Chunk> {
    if documents.is_empty() {
        return Vec::new();
    }

    // Join pages, remembering where each page (plus the joiner that precedes
    // it) starts in the combined text.
    let mut text = String::new();
    let mut page_starts: Vec<(usize, u32)> = Vec::new();
    for (i, document) in documents.iter().enumerate() {
        page_starts.push((text.len(), document.page));
        if i > 0 {
            text.push_str(PAGE_JOINER);
        }
        text.push_str(&document.text);
    }
    let source = documents[0].source.clone();

    let pieces = split_recursive(&text, config.chunk_size, &config.separators);
    let merged = merge_pieces(pieces, config.chunk_size);

    let mut chunks = Vec::with_capacity(merged.len());
    let mut offset = 0usize;
    let mut prev_tail: Option<String> = None;
    for body in merged {
        let page = page_starts
            .iter()
            .take_while(|(start, _)| *start <= offset)
            .last()
            .map(|(_, page)| *page);

        let chunk_text = match prev_tail.take() {
            Some(tail) => {
                let mut combined = tail;
                combined.push_str(&body);
                combined
            }
            None => body.clone(),
        };
        prev_tail = Some(char_tail(&body, config.chunk_overlap).to_string());
        offset += body.len();

        chunks.push(Chunk {
            text: chunk_text,
            metadata: ChunkMetadata {
                page,
                source: Some(source.clone()),
                ..ChunkMetadata::default()
            },
        });
    }

    chunks
}

/// Split `text` into pieces no larger than `chunk_size` where possible, trying
/// each separator in priority order and recursing into oversized pieces with
/// the remaining separators only. Concatenating the pieces reproduces `text`.
fn split_recursive(text: &str, chunk_size: usize, separators: &[String]) -> Vec<String> {
    if text.len() <= chunk_size || text.is_empty() {
        return vec![text.to_string()];
    }

    for (idx, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            // Hard character split, last resort.
            return hard_split(text, chunk_size);
        }
        if !text.contains(separator.as_str()) {
            continue;
        }

        let remaining = &separators[idx + 1..];
        let mut pieces = Vec::new();
        for part in split_before(text, separator) {
            if part.len() > chunk_size {
                pieces.extend(split_recursive(part, chunk_size, remaining));
            } else {
                pieces.push(part.to_string());
            }
        }
        return pieces;
    }

    // No separator applies; an indivisible unit is kept whole rather than
    // destroyed mid-word.
    vec![text.to_string()]
}

/// Split so that every occurrence of `separator` starts a new piece and stays
/// attached to it. The concatenation of the pieces equals `text`.
fn split_before<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut boundaries: Vec<usize> = vec![0];
    boundaries.extend(
        text.match_indices(separator)
            .map(|(i, _)| i)
            .filter(|&i| i != 0),
    );
    boundaries.push(text.len());

    boundaries
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| &text[w[0]..w[1]])
        .collect()
}

/// Greedily merge adjacent pieces up to `chunk_size`. A single piece larger
/// than the target passes through as its own chunk.
fn merge_pieces(pieces: Vec<String>, chunk_size: usize) -> Vec<String> {
    let mut merged = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && current.len() + piece.len() > chunk_size {
            merged.push(std::mem::take(&mut current));
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        merged.push(current);
    }
    merged
}

/// Character-count split on char boundaries, used only when the separator
/// list contains the empty string.
fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if !current.is_empty() && current.len() + c.len_utf8() > chunk_size {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Trailing `overlap` characters of `s`, on a char boundary.
fn char_tail(s: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    let count = s.chars().count();
    if count <= overlap {
        return s;
    }
    let start = s
        .char_indices()
        .nth(count - overlap)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> SourceDocument {
        SourceDocument {
            page: number,
            text: text.to_string(),
            source: "questions.pdf".to_string(),
        }
    }

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            chunk_overlap,
            ..ChunkConfig::default()
        }
    }

    #[test]
    fn test_chunks_cover_the_full_text_without_gaps() {
        let documents = vec![
            page(1, "First page with a fair amount of text.\nAnother line here."),
            page(2, "Second page continues the document with more lines.\nAnd more."),
            page(3, "Third page wraps it up."),
        ];
        let chunks = split_documents(&documents, &config(40, 0));

        let joined = documents
            .iter()
            .map(|d| d.text.clone())
            .collect::<Vec<_>>()
            .join(PAGE_JOINER);
        let reassembled: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(reassembled, joined);
    }

    #[test]
    fn test_consecutive_chunks_share_the_configured_overlap() {
        let documents = vec![page(
            1,
            "Line one of the section.\nLine two of the section.\nLine three of the section.\nLine four of the section.",
        )];
        let overlap = 10;
        let chunks = split_documents(&documents, &config(30, overlap));

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .text
                .chars()
                .skip(pair[0].text.chars().count().saturating_sub(overlap))
                .collect();
            assert!(
                pair[1].text.starts_with(&tail),
                "chunk {:?} does not start with the previous tail {:?}",
                pair[1].text,
                tail
            );
        }
    }

    #[test]
    fn test_company_banner_splits_before_generic_separators() {
        let documents = vec![page(
            1,
            "COMPANY #1: Google\nTwo Sum\nValid Parentheses\n\nCOMPANY #2: Meta\nWord Break\nCoin Change",
        )];
        let chunks = split_documents(&documents, &config(60, 0));

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("COMPANY #1: Google"));
        assert!(chunks[1].text.starts_with("\nCOMPANY #2: Meta"));
    }

    #[test]
    fn test_indivisible_unit_is_kept_whole() {
        let long_word = "x".repeat(120);
        let documents = vec![page(1, &long_word)];
        let chunks = split_documents(&documents, &config(50, 0));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, long_word);
    }

    #[test]
    fn test_empty_separator_requests_hard_character_split() {
        let long_word = "y".repeat(100);
        let mut cfg = config(40, 0);
        cfg.separators.push(String::new());
        let documents = vec![page(1, &long_word)];
        let chunks = split_documents(&documents, &cfg);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.len() <= 40));
        let reassembled: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(reassembled, long_word);
    }

    #[test]
    fn test_chunks_record_the_page_they_start_on() {
        let documents = vec![
            page(1, "Alpha section on the first page."),
            page(2, "Beta section on the second page."),
        ];
        let chunks = split_documents(&documents, &config(40, 0));

        assert!(chunks.len() >= 2);
        assert_eq!(chunks.first().and_then(|c| c.metadata.page), Some(1));
        assert_eq!(chunks.last().and_then(|c| c.metadata.page), Some(2));
        assert!(chunks
            .iter()
            .all(|c| c.metadata.source.as_deref() == Some("questions.pdf")));
    }

    #[test]
    fn test_small_pieces_merge_up_to_the_target_size() {
        let documents = vec![page(1, "a b c d e f g h i j k l m n o p")];
        let chunks = split_documents(&documents, &config(1024, 0));

        assert_eq!(chunks.len(), 1);
    }
}
