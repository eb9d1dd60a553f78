//! Grounded question answering over the live snapshot.
//!
//! [`QueryService::answer`] obtains the live snapshot once, retrieves the
//! top-k chunks for the question, wraps them in a fixed prompt template,
//! and makes a single call to the [`Generator`]. Failures are returned as
//! [`QueryError`] values and never touch the registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embedding::{embed_one, Embedder};
use crate::error::QueryError;
use crate::generation::Generator;
use crate::index::SearchHit;
use crate::models::QueryResult;
use crate::registry::IndexRegistry;

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;

/// Prompt text before the context block.
const PROMPT_PREAMBLE: &str = "\
Using the information contained in the context, give a comprehensive answer to the question.
Respond only to the question asked; the response should be concise and relevant to the question.
The answer must include two parts:
part 1 - your answer,
part 2 - the list of related CVs provided to you (just their names).
If the answer cannot be deduced from the context, do not give an answer.

Context:
";

/// Prompt text between the context block and the question.
const PROMPT_QUESTION_INTRO: &str = "
---
Now here is the question you need to answer:

Question: ";

/// Render the retrieved chunks as a numbered context block.
pub fn build_context(hits: &[SearchHit]) -> String {
    let mut context = String::from("\nExtracted documents:\n");
    let entries: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Document {} ({}):\n{}",
                i + 1,
                hit.chunk.source_document_id,
                hit.chunk.text
            )
        })
        .collect();
    context.push_str(&entries.join("\n"));
    context
}

/// Fill the fixed prompt template.
pub fn build_prompt(question: &str, context: &str) -> String {
    let mut prompt = String::with_capacity(
        PROMPT_PREAMBLE.len() + context.len() + PROMPT_QUESTION_INTRO.len() + question.len(),
    );
    prompt.push_str(PROMPT_PREAMBLE);
    prompt.push_str(context);
    prompt.push_str(PROMPT_QUESTION_INTRO);
    prompt.push_str(question);
    prompt
}

pub struct QueryService {
    registry: Arc<IndexRegistry>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl QueryService {
    pub fn new(
        registry: Arc<IndexRegistry>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        top_k: usize,
    ) -> Self {
        Self {
            registry,
            embedder,
            generator,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` from the snapshot that is live when the call starts.
    pub async fn answer(&self, question: &str) -> Result<QueryResult, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::InvalidQuestion);
        }

        // Held until the answer is composed, so a concurrent publish cannot
        // change what this question sees.
        let snapshot = self.registry.current();
        if snapshot.is_empty() {
            return Err(QueryError::EmptyCollection);
        }

        let query_vec = embed_one(self.embedder.as_ref(), question)
            .await
            .map_err(|e| QueryError::Embedding(format!("{:#}", e)))?;

        let hits = snapshot.search(&query_vec, self.top_k);
        let prompt = build_prompt(question, &build_context(&hits));

        let answer_text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| QueryError::Generation(format!("{:#}", e)))?;

        let cited_sources: BTreeSet<String> = hits
            .into_iter()
            .map(|h| h.chunk.source_document_id)
            .collect();

        Ok(QueryResult {
            answer_text,
            cited_sources,
            snapshot_version: snapshot.version(),
        })
    }
}
