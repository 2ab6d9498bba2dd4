//! The abstract streaming model client external collaborator
//! (`spec.md` §6, §4.7 `model` node).

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{Result, RuntimeError};
use crate::messages::{Message, ToolCall};

/// What the `model` node sends the client: the effective input
/// messages (`llmInputMessages`, falling back to `messages`).
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
}

/// The model's completed turn.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// One emission of a model's streaming response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// An incremental text token. Droppable on the event bus
    /// (`spec.md` §4.5); never emitted after `Final`.
    Token(String),
    /// The completed turn. A stream must emit exactly one of these.
    Final(ModelResponse),
}

/// `stream(request) -> lazy sequence of {token(text) | final(response)}`.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream(&self, request: ModelRequest) -> Result<BoxStream<'static, StreamEvent>>;
}

/// Drains a model stream, enforcing the contract: finite, at most one
/// `Final`, no emission after `Final`. Returns the tokens observed (in
/// order) and the final response.
pub async fn validate_stream(
    mut stream: BoxStream<'static, StreamEvent>,
) -> Result<(Vec<String>, ModelResponse)> {
    let mut tokens = Vec::new();
    let mut final_response = None;

    while let Some(event) = stream.next().await {
        if final_response.is_some() {
            return Err(RuntimeError::ModelStreamInvalid(
                "emission observed after final".to_string(),
            ));
        }
        match event {
            StreamEvent::Token(text) => tokens.push(text),
            StreamEvent::Final(response) => final_response = Some(response),
        }
    }

    match final_response {
        Some(response) => Ok((tokens, response)),
        None => Err(RuntimeError::ModelStreamInvalid("missing final".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn accepts_tokens_then_one_final() {
        let events = vec![
            StreamEvent::Token("he".to_string()),
            StreamEvent::Token("llo".to_string()),
            StreamEvent::Final(ModelResponse {
                content: "hello".to_string(),
                tool_calls: vec![],
            }),
        ];
        let (tokens, response) = validate_stream(Box::pin(stream::iter(events))).await.unwrap();
        assert_eq!(tokens, vec!["he", "llo"]);
        assert_eq!(response.content, "hello");
    }

    #[tokio::test]
    async fn rejects_missing_final() {
        let events = vec![StreamEvent::Token("hi".to_string())];
        let err = validate_stream(Box::pin(stream::iter(events))).await;
        assert!(matches!(err, Err(RuntimeError::ModelStreamInvalid(_))));
    }

    #[tokio::test]
    async fn rejects_emission_after_final() {
        let events = vec![
            StreamEvent::Final(ModelResponse::default()),
            StreamEvent::Token("late".to_string()),
        ];
        let err = validate_stream(Box::pin(stream::iter(events))).await;
        assert!(matches!(err, Err(RuntimeError::ModelStreamInvalid(_))));
    }
}
