use std::io::{self, Write};
use std::sync::Arc;

use log::{debug, info};

use crate::embeddings::TextEmbedder;
use crate::error::QueryError;
use crate::index::{QueryFilter, RetrievedChunk, VectorStore};
use crate::lifecycle::IndexLifecycle;
use crate::metadata::{normalize_company, Difficulty, KNOWN_COMPANIES};
use crate::openai::OpenAiClient;

/// Returned when a filtered query legitimately matches nothing. Distinct from
/// an error so the caller can retry without the filter or respond gracefully:
/// a recognized-but-absent company should read differently from a retrieval
/// pipeline failure.
pub const NO_RESULTS: &str = "I couldn't find relevant information about that company or topic \
                              in the interview questions database.";

/// Default number of passages retrieved per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Detect at most one company in `text`: first known-company match,
/// case-insensitive substring, in list order. Returns the normalized form.
pub fn detect_company(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    KNOWN_COMPANIES
        .iter()
        .copied()
        .find(|company| lowered.contains(company))
        .map(normalize_company)
}

/// Detect at most one difficulty keyword in `text`. The earliest occurrence
/// wins; multiple difficulty words are never combined.
pub fn detect_difficulty(text: &str) -> Option<Difficulty> {
    let lowered = text.to_lowercase();
    [
        (Difficulty::Easy, "easy"),
        (Difficulty::Medium, "medium"),
        (Difficulty::Hard, "hard"),
    ]
    .into_iter()
    .filter_map(|(difficulty, keyword)| lowered.find(keyword).map(|pos| (pos, difficulty)))
    .min_by_key(|(pos, _)| *pos)
    .map(|(_, difficulty)| difficulty)
}

impl QueryFilter {
    /// Build the filter for a free-text question from the detected
    /// company/difficulty signals.
    pub fn detect(text: &str) -> Self {
        QueryFilter {
            company: detect_company(text),
            difficulty: detect_difficulty(text),
            topic: None,
        }
    }
}

/// Serves free-text questions against the managed index and formats the
/// retrieved passages for the conversational agent.
pub struct QueryService<S, E> {
    lifecycle: Arc<IndexLifecycle<S, E>>,
    llm: OpenAiClient,
}

impl<S: VectorStore, E: TextEmbedder> QueryService<S, E> {
    pub fn new(lifecycle: Arc<IndexLifecycle<S, E>>, llm: OpenAiClient) -> Self {
        QueryService { lifecycle, llm }
    }

    /// Retrieve the `k` most relevant passages for `text`, restricted by the
    /// company/difficulty signals detected in the question.
    pub async fn retrieve(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, QueryError> {
        let filter = QueryFilter::detect(text);
        if !filter.is_empty() {
            debug!("Detected query filter: {:?}", filter);
        }
        self.lifecycle.search(text, k, &filter).await
    }

    /// Agent tool target: the retrieved passages as numbered context blocks,
    /// or the [`NO_RESULTS`] sentinel when the filter matches nothing. Only
    /// genuine backend failures surface as errors.
    pub async fn query_company_questions(&self, text: &str) -> Result<String, QueryError> {
        let results = self.retrieve(text, DEFAULT_TOP_K).await?;

        if results.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        let context = results
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("[Context {}]\n{}", i + 1, chunk.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(context)
    }

    /// Synthesize an answer grounded in the retrieved passages.
    pub async fn answer(&self, question: &str, k: usize) -> Result<String, QueryError> {
        let results = self.retrieve(question, k).await?;

        if results.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        let context = results
            .iter()
            .map(|chunk| chunk.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = self.llm.generate_answer(&context, question).await?;
        Ok(answer)
    }

    /// Run the interactive question loop.
    pub async fn run_query_loop(&self) -> anyhow::Result<()> {
        info!("Ready to answer questions. Type 'exit' to quit.");

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut buffer = String::new();

        loop {
            print!("\nYour question: ");
            stdout.flush()?;

            buffer.clear();
            stdin.read_line(&mut buffer)?;

            let question = buffer.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case("exit") {
                info!("Goodbye!");
                break;
            }

            match self.answer(question, DEFAULT_TOP_K).await {
                Ok(answer) => println!("\n{}", answer),
                Err(e) => println!("\nI can't check the question database right now ({}).", e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::chunking::ChunkConfig;
    use crate::index::VectorIndex;
    use crate::openai::{OpenAiClient, OpenAiConfig};
    use crate::testing::{MemoryStore, SeededEmbedder};

    fn offline_llm() -> OpenAiClient {
        OpenAiClient::new(OpenAiConfig {
            api_key: "test-key".to_string(),
            base_url: "http://localhost:0".to_string(),
        })
    }

    fn service_over(
        content: &str,
    ) -> (
        QueryService<MemoryStore, SeededEmbedder>,
        Arc<IndexLifecycle<MemoryStore, SeededEmbedder>>,
        tempfile::NamedTempFile,
    ) {
        let mut file = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .expect("create temp file");
        file.write_all(content.as_bytes()).expect("write temp file");

        let store = MemoryStore::new();
        let index = VectorIndex::new(store, SeededEmbedder::new("test-model", 8));
        let config = ChunkConfig {
            chunk_size: 64,
            chunk_overlap: 0,
            ..ChunkConfig::default()
        };
        let lifecycle = Arc::new(IndexLifecycle::new(index, file.path(), config));
        let service = QueryService::new(lifecycle.clone(), offline_llm());
        (service, lifecycle, file)
    }

    #[test]
    fn test_company_detection_is_case_insensitive_substring() {
        assert_eq!(detect_company("top easy Meta questions"), Some("meta".to_string()));
        assert_eq!(
            detect_company("what does GOLDMAN SACHS ask?"),
            Some("goldman_sachs".to_string())
        );
        assert_eq!(detect_company("generic question about trees"), None);
    }

    #[test]
    fn test_difficulty_detection_first_match_wins() {
        assert_eq!(detect_difficulty("easy Meta questions"), Some(Difficulty::Easy));
        assert_eq!(
            detect_difficulty("show me easy then hard ones"),
            Some(Difficulty::Easy)
        );
        assert_eq!(detect_difficulty("HARD problems please"), Some(Difficulty::Hard));
        assert_eq!(detect_difficulty("any difficulty"), None);
    }

    #[test]
    fn test_filter_detection_combines_signals() {
        let both = QueryFilter::detect("top easy Meta questions");
        assert_eq!(both.company.as_deref(), Some("meta"));
        assert_eq!(both.difficulty, Some(Difficulty::Easy));

        let company_only = QueryFilter::detect("what does Google ask?");
        assert_eq!(company_only.company.as_deref(), Some("google"));
        assert_eq!(company_only.difficulty, None);

        let neither = QueryFilter::detect("tell me about binary trees");
        assert!(neither.is_empty());
    }

    #[tokio::test]
    async fn test_filtered_query_returns_matching_context() {
        let (service, lifecycle, _file) = service_over(
            "COMPANY #1: Google\nEASY QUESTIONS\nTwo Sum\n\nCOMPANY #2: Meta\nHARD QUESTIONS\nWord Break",
        );
        lifecycle.initialize().await.expect("initialize");

        let context = service
            .query_company_questions("what hard questions does Meta ask?")
            .await
            .expect("query");

        assert!(context.starts_with("[Context 1]"));
        assert!(context.contains("Word Break"));
        assert!(!context.contains("Two Sum"));
    }

    #[tokio::test]
    async fn test_recognized_but_absent_company_yields_sentinel() {
        let (service, lifecycle, _file) = service_over(
            "COMPANY #1: Google\nEASY QUESTIONS\nTwo Sum\n\nCOMPANY #2: Meta\nHARD QUESTIONS\nWord Break",
        );
        lifecycle.initialize().await.expect("initialize");

        // Meta exists in the index but has no easy section.
        let context = service
            .query_company_questions("top easy Meta questions")
            .await
            .expect("query");

        assert_eq!(context, NO_RESULTS);
    }

    #[tokio::test]
    async fn test_query_before_initialization_is_an_error() {
        let (service, _lifecycle, _file) = service_over("COMPANY #1: Google\nEASY QUESTIONS\nTwo Sum");

        let result = service.query_company_questions("Google questions").await;
        assert!(matches!(result, Err(QueryError::NotReady)));
    }
}
