use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::chunking::Chunk;

/// Companies recognized outside explicit banners, in detection priority order.
/// Shared with query-side signal detection so detected values line up with
/// stored metadata.
pub const KNOWN_COMPANIES: &[&str] = &[
    "goldman sachs",
    "morgan stanley",
    "google",
    "meta",
    "facebook",
    "amazon",
    "apple",
    "microsoft",
    "netflix",
    "nvidia",
    "uber",
    "lyft",
    "airbnb",
    "linkedin",
    "twitter",
    "stripe",
    "dropbox",
    "salesforce",
    "oracle",
    "adobe",
    "bloomberg",
    "tesla",
    "snap",
    "pinterest",
    "doordash",
    "palantir",
    "tiktok",
    "walmart",
    "paypal",
];

/// Question difficulty as stored in chunk metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Parse a stored metadata value back into a difficulty.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured provenance attached to every chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Normalized company the chunk belongs to (sticky across chunks).
    pub company: Option<String>,
    /// Difficulty banner found in the chunk itself (not sticky).
    pub difficulty: Option<Difficulty>,
    /// Currently only "overview" for summary sections.
    pub section_type: Option<String>,
    /// Recognized algorithm topics, deduplicated, in vocabulary order.
    pub topics: Vec<String>,
    /// 1-based page the chunk starts on.
    pub page: Option<u32>,
    /// Source file name.
    pub source: Option<String>,
}

/// Fixed topic vocabulary: canonical name and the pattern that recognizes it.
const TOPIC_PATTERNS: &[(&str, &str)] = &[
    ("array", r"\barrays?\b"),
    ("string", r"\bstrings?\b"),
    ("linked_list", r"\blinked[\s-]lists?\b"),
    ("tree", r"\btrees?\b"),
    ("graph", r"\bgraphs?\b"),
    ("dynamic_programming", r"\bdynamic\s+programming\b|\bdp\b"),
    ("hash_table", r"\bhash[\s-](?:tables?|maps?)\b|\bhashmaps?\b"),
    ("stack", r"\bstacks?\b"),
    ("queue", r"\bqueues?\b"),
    ("heap", r"\bheaps?\b|\bpriority\s+queues?\b"),
    ("sorting", r"\bsort(?:ing|ed)?\b"),
    ("search", r"\b(?:binary\s+)?search(?:ing)?\b"),
    ("recursion", r"\brecursions?\b|\brecursive\b"),
    ("backtracking", r"\bbacktracking\b"),
    ("greedy", r"\bgreedy\b"),
    ("two_pointers", r"\btwo[\s-]pointers?\b|\bsliding[\s-]windows?\b"),
    ("bit_manipulation", r"\bbit\s+manipulation\b|\bbitwise\b"),
    ("math", r"\bmath(?:s|ematics|ematical)?\b"),
];

/// Pattern set for chunk tagging. Compile once, tag many.
pub struct Tagger {
    company_banner: Regex,
    known_company: Regex,
    difficulty_banner: Regex,
    topics: Vec<(&'static str, Regex)>,
}

impl Tagger {
    pub fn new() -> Self {
        let company_banner = Regex::new(r"(?im)^\s*company\s*#?\s*\d+\s*:\s*(\S[^\r\n]*)")
            .expect("company banner pattern");
        let known_company = Regex::new(&format!(r"(?im)^\s*({})\b", KNOWN_COMPANIES.join("|")))
            .expect("known company pattern");
        let difficulty_banner = Regex::new(
            r"(?i)\b(easy|medium|hard|beginner|intermediate|advanced)\s+(?:questions|problems)\b",
        )
        .expect("difficulty banner pattern");
        let topics = TOPIC_PATTERNS
            .iter()
            .map(|(name, pattern)| {
                (
                    *name,
                    Regex::new(&format!("(?i){}", pattern)).expect("topic pattern"),
                )
            })
            .collect();

        Tagger {
            company_banner,
            known_company,
            difficulty_banner,
            topics,
        }
    }

    /// Tag every chunk, strictly in document order.
    ///
    /// Company metadata is sticky: once a banner is seen, later chunks without
    /// their own banner inherit it. The carry-over lives in the fold
    /// accumulator, so one tagging run never leaks state into another.
    pub fn tag(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        chunks
            .into_iter()
            .scan(None::<String>, |current_company, mut chunk| {
                if let Some(company) = self.detect_company(&chunk.text) {
                    *current_company = Some(company);
                }
                chunk.metadata.company = current_company.clone();
                chunk.metadata.difficulty = self.detect_difficulty(&chunk.text);
                chunk.metadata.topics = self.extract_topics(&chunk.text);
                chunk.metadata.section_type = detect_section(&chunk.text);
                Some(chunk)
            })
            .collect()
    }

    /// The company declared by this chunk, if any. The explicit banner pattern
    /// wins over a bare known-company line; the last occurrence wins so text
    /// carried in from the previous section cannot shadow the current banner.
    fn detect_company(&self, text: &str) -> Option<String> {
        if let Some(captures) = self.company_banner.captures_iter(text).last() {
            return Some(normalize_company(&captures[1]));
        }
        self.known_company
            .captures_iter(text)
            .last()
            .map(|captures| normalize_company(&captures[1]))
    }

    fn detect_difficulty(&self, text: &str) -> Option<Difficulty> {
        let captures = self.difficulty_banner.captures_iter(text).last()?;
        match captures[1].to_lowercase().as_str() {
            "easy" | "beginner" => Some(Difficulty::Easy),
            "medium" | "intermediate" => Some(Difficulty::Medium),
            "hard" | "advanced" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    fn extract_topics(&self, text: &str) -> Vec<String> {
        self.topics
            .iter()
            .filter(|(_, pattern)| pattern.is_match(text))
            .map(|(name, _)| (*name).to_string())
            .collect()
    }
}

impl Default for Tagger {
    fn default() -> Self {
        Tagger::new()
    }
}

fn detect_section(text: &str) -> Option<String> {
    if text.contains("Overview:") || text.contains("Top Topics") {
        Some("overview".to_string())
    } else {
        None
    }
}

/// Normalize a company name for storage: lowercase, internal whitespace
/// collapsed to single underscores, trailing punctuation dropped.
pub fn normalize_company(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}
