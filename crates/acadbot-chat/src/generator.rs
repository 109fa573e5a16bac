//! Answer generation from retrieved context.

use std::sync::Arc;

use tracing::{info, warn};

use crate::prompt::{build_messages, NO_ANSWER};
use crate::providers::CompletionProvider;
use crate::types::{Answer, CompletionParams, SourceRef};
use acadbot_core::config::validate_temperature;
use acadbot_core::Result;
use acadbot_store::RetrievalResult;

/// Turns a question plus retrieved chunks into a grounded answer.
pub struct AnswerGenerator {
    provider: Arc<dyn CompletionProvider>,
    max_tokens: usize,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            max_tokens: CompletionParams::default().max_tokens,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Ask the provider to answer from `retrieval` only. No retries here.
    pub async fn generate(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
        temperature: f32,
    ) -> Result<Answer> {
        validate_temperature(temperature)?;

        if retrieval.is_empty() {
            info!("No context retrieved; answering without the model");
            return Ok(Answer {
                answer: NO_ANSWER.to_string(),
                sources: Vec::new(),
                model: None,
            });
        }

        let messages = build_messages(question, retrieval);
        let params = CompletionParams {
            temperature,
            max_tokens: self.max_tokens,
        };
        let text = self
            .provider
            .complete(&messages, &params)
            .await
            .map_err(|e| {
                warn!("Generation failed: {}", e);
                e
            })?;

        Ok(Answer {
            answer: text,
            sources: retrieval.hits.iter().map(SourceRef::from).collect(),
            model: Some(self.provider.model().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;
    use acadbot_core::{Error, ProviderFailure};
    use acadbot_store::{Chunk, RetrievalHit};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct EchoProvider {
        calls: AtomicUsize,
        last: Mutex<Vec<ChatMessage>>,
    }

    impl EchoProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                last: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _params: &CompletionParams,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = messages.to_vec();
            Ok("  It applies the chain rule.\n".into())
        }
        fn model(&self) -> &str {
            "echo"
        }
    }

    struct DownProvider;

    #[async_trait]
    impl CompletionProvider for DownProvider {
        async fn complete(&self, _: &[ChatMessage], _: &CompletionParams) -> Result<String> {
            Err(Error::generation(ProviderFailure::Unavailable, "503"))
        }
        fn model(&self) -> &str {
            "down"
        }
    }

    fn retrieval() -> RetrievalResult {
        RetrievalResult {
            hits: vec![RetrievalHit {
                chunk: Chunk {
                    id: "nn.pdf#0".into(),
                    source: "nn.pdf".into(),
                    page: 4,
                    chunk_index: 0,
                    start_token: 0,
                    end_token: 5,
                    char_start: 0,
                    char_end: 30,
                    text: "Backprop relies on the chain rule.".into(),
                },
                score: 0.9,
                rank: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_answer_is_verbatim_with_sources() {
        let provider = Arc::new(EchoProvider::new());
        let generator = AnswerGenerator::new(provider.clone());
        let answer = generator
            .generate("How does backprop work?", &retrieval(), 0.0)
            .await
            .unwrap();

        assert_eq!(answer.answer, "  It applies the chain rule.\n");
        assert_eq!(answer.model.as_deref(), Some("echo"));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].page, 4);
        let sent = provider.last.lock().unwrap().clone();
        assert!(sent[1].content.contains("[1] (nn.pdf, p.4)"));
    }

    #[tokio::test]
    async fn test_empty_retrieval_skips_provider() {
        let provider = Arc::new(EchoProvider::new());
        let generator = AnswerGenerator::new(provider.clone());
        let answer = generator
            .generate("Anything?", &RetrievalResult::default(), 0.0)
            .await
            .unwrap();
        assert_eq!(answer.answer, NO_ANSWER);
        assert!(answer.sources.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_temperature_range() {
        let provider = Arc::new(EchoProvider::new());
        let generator = AnswerGenerator::new(provider.clone());
        let err = generator.generate("q", &retrieval(), 2.5).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(generator.generate("q", &retrieval(), 2.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_provider_failure_is_generation_error() {
        let generator = AnswerGenerator::new(Arc::new(DownProvider));
        let err = generator.generate("q", &retrieval(), 0.0).await.unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));
        assert!(err.is_retryable());
    }
}
