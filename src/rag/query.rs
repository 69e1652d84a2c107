use crate::rag::retriever::Retriever;
use crate::rag::synthesizer::AnswerSynthesizer;
use crate::types::{AppError, Answer, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Answers one question at a time: retrieve, then synthesize.
#[derive(Clone)]
pub struct QueryOrchestrator {
    retriever: Retriever,
    synthesizer: Arc<AnswerSynthesizer>,
}

impl QueryOrchestrator {
    pub fn new(retriever: Retriever, synthesizer: Arc<AnswerSynthesizer>) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }

    /// Answer `question` from the selected documents.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for a blank question or empty selection, before any
    /// remote call is made.
    pub async fn ask(
        &self,
        question: &str,
        document_names: &[String],
        top_k: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidQuery("question must not be empty".to_string()));
        }
        if document_names.is_empty() {
            return Err(AppError::InvalidQuery(
                "select at least one document".to_string(),
            ));
        }

        let started = Instant::now();
        let retrieval = self
            .retriever
            .retrieve(question, document_names, top_k, cancel)
            .await?;
        let answer = self.synthesizer.synthesize(question, retrieval, cancel).await?;

        info!(
            documents = document_names.len(),
            sources = answer.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answered question"
        );

        Ok(answer)
    }
}

/// Resolve a comma-separated list of 1-based menu numbers to document names.
///
/// Whitespace around numbers is ignored and repeats are collapsed, keeping
/// first-seen order.
///
/// # Errors
///
/// `InvalidQuery` for an empty selection, a non-numeric entry or a number
/// outside `1..=documents.len()`.
pub fn parse_selection(input: &str, documents: &[String]) -> Result<Vec<String>> {
    let mut selected: Vec<String> = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let index: usize = part
            .parse()
            .map_err(|_| AppError::InvalidQuery(format!("'{}' is not a document number", part)))?;

        let name = index
            .checked_sub(1)
            .and_then(|i| documents.get(i))
            .ok_or_else(|| {
                AppError::InvalidQuery(format!(
                    "document number {} is out of range (1-{})",
                    index,
                    documents.len()
                ))
            })?;

        if !selected.contains(name) {
            selected.push(name.clone());
        }
    }

    if selected.is_empty() {
        return Err(AppError::InvalidQuery(
            "select at least one document".to_string(),
        ));
    }
    Ok(selected)
}
