//! Answer generation: grounding context assembly and the chat-model call.
//!
//! The generator receives ranked retrieval results, packs as many of the
//! highest-scored chunks as fit the context budget, and asks the language
//! model to answer from that context alone. Citations are derived from
//! exactly the chunks that were packed; a chunk the model never saw is
//! never cited.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::config::LlmConfig;
use crate::embedding::RetryPolicy;
use crate::error::RagError;
use crate::models::{Answer, Citation, RetrievalResult};

/// System prompt keeping the model grounded in the provided context.
pub const SYSTEM_PROMPT: &str = "You are a helpful research assistant for studying documents.\n\
You help users understand and analyze the content of their uploaded documents.\n\
\n\
When answering:\n\
1. Use ONLY the provided CONTEXT to answer\n\
2. Cite specific documents and quote relevant passages\n\
3. If context is insufficient, clearly state what's missing\n\
4. Be precise and avoid speculation\n\
5. If the documents don't contain relevant information, say so";

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// A chat-completion backend. One implementation per provider; tests
/// supply deterministic doubles.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RagError>;
    fn model_name(&self) -> &str;
}

/// Chat provider for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: RetryPolicy::with_retries(config.max_retries),
        })
    }

    async fn complete_once(&self, system: &str, user: &str) -> Result<String, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let msg = format!("chat API error {}: {}", status, body_text);
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(RagError::Transient(msg));
            }
            return Err(RagError::Fatal(msg));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::Fatal(format!("invalid chat response: {}", e)))?;
        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| RagError::Fatal("chat response missing message content".to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RagError> {
        self.retry.run(|| self.complete_once(system, user)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    Ok(Arc::new(OpenAiChatModel::new(config)?))
}

/// Pack ranked results into a context block within `max_context_chars`.
///
/// Highest-scored results are kept first; a result that would overflow the
/// budget is dropped along with everything after it, except that the top
/// result is always included so the model is never called with an empty
/// context. Returns the block and the citations for exactly the packed
/// chunks.
pub fn build_context(
    results: &[RetrievalResult],
    max_context_chars: usize,
) -> (String, Vec<Citation>) {
    let mut context = String::new();
    let mut citations = Vec::new();

    for (i, result) in results.iter().enumerate() {
        let block = format!(
            "[{}] Document: {} (chunk {})\n{}",
            i + 1,
            result.filename,
            result.chunk_index,
            result.text
        );
        let added = if context.is_empty() {
            block.chars().count()
        } else {
            BLOCK_SEPARATOR.len() + block.chars().count()
        };
        if !citations.is_empty() && context.chars().count() + added > max_context_chars {
            break;
        }
        if !context.is_empty() {
            context.push_str(BLOCK_SEPARATOR);
        }
        context.push_str(&block);
        citations.push(Citation {
            filename: result.filename.clone(),
            chunk_index: result.chunk_index,
            score: result.score,
        });
    }

    (context, citations)
}

/// Assembles the grounding prompt and produces a cited [`Answer`].
pub struct AnswerGenerator {
    chat: Arc<dyn ChatModel>,
    max_context_chars: usize,
}

impl AnswerGenerator {
    pub fn new(chat: Arc<dyn ChatModel>, max_context_chars: usize) -> Self {
        Self {
            chat,
            max_context_chars,
        }
    }

    /// Generate a grounded answer for `query` from `results`.
    ///
    /// Callers must not pass an empty result set; the pipeline short-
    /// circuits that case before reaching the generator.
    pub async fn generate(
        &self,
        query: &str,
        results: &[RetrievalResult],
    ) -> Result<Answer, RagError> {
        let (context, citations) = build_context(results, self.max_context_chars);
        debug!(
            packed = citations.len(),
            retrieved = results.len(),
            context_chars = context.chars().count(),
            "assembled grounding context"
        );

        let user_prompt = format!(
            "QUESTION: {}\n\nCONTEXT:\n{}\n\nProvide a comprehensive answer based on the context above. Reference specific documents when possible.",
            query, context
        );

        let text = self
            .chat
            .complete(SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(|e| match e {
                RagError::GenerationFailed(m) => RagError::GenerationFailed(m),
                other => RagError::GenerationFailed(other.to_string()),
            })?;

        Ok(Answer { text, citations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(filename: &str, chunk_index: i64, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk_id: format!("{}-{}", filename, chunk_index),
            document_id: filename.to_string(),
            filename: filename.to_string(),
            chunk_index,
            text: text.to_string(),
            score,
        }
    }

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, RagError> {
            Ok(format!("echo: {}", user.len()))
        }
        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, RagError> {
            Err(RagError::Transient("socket closed".to_string()))
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn context_keeps_highest_scored_first_under_budget() {
        let results = vec![
            result("a.txt", 0, &"x".repeat(100), 0.9),
            result("b.txt", 1, &"y".repeat(100), 0.8),
            result("c.txt", 2, &"z".repeat(100), 0.7),
        ];
        let (context, citations) = build_context(&results, 300);
        // Only the first two fit.
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].filename, "a.txt");
        assert_eq!(citations[1].filename, "b.txt");
        assert!(context.contains("a.txt") && context.contains("b.txt"));
        assert!(!context.contains("c.txt"));
    }

    #[test]
    fn top_result_always_included_even_over_budget() {
        let results = vec![result("big.txt", 0, &"x".repeat(500), 0.9)];
        let (context, citations) = build_context(&results, 10);
        assert_eq!(citations.len(), 1);
        assert!(context.contains("big.txt"));
    }

    #[test]
    fn citations_match_packed_chunks_exactly() {
        let results = vec![
            result("a.txt", 3, "short", 0.9),
            result("b.txt", 7, &"long ".repeat(200), 0.5),
        ];
        let (context, citations) = build_context(&results, 100);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].chunk_index, 3);
        assert!(!context.contains("b.txt"));
    }

    #[tokio::test]
    async fn generate_returns_answer_with_citations() {
        let generator = AnswerGenerator::new(Arc::new(EchoModel), 3000);
        let results = vec![result("a.txt", 0, "grounding text", 0.95)];
        let answer = generator.generate("what is this?", &results).await.unwrap();
        assert!(answer.text.starts_with("echo:"));
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].filename, "a.txt");
    }

    #[tokio::test]
    async fn model_failure_surfaces_as_generation_failed() {
        let generator = AnswerGenerator::new(Arc::new(FailingModel), 3000);
        let results = vec![result("a.txt", 0, "text", 0.9)];
        let err = generator.generate("q", &results).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailed(_)));
    }
}
