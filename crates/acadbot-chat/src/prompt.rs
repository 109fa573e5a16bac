//! Context-only prompt construction.

use acadbot_store::RetrievalResult;

use crate::types::ChatMessage;

/// Reply used whenever the context does not contain the answer.
pub const NO_ANSWER: &str = "I don't know based on the provided context.";

pub fn system_instruction() -> String {
    format!(
        "You are a helpful assistant.\n\
         Answer the question using ONLY the Context below.\n\
         If the answer is not in the Context, say \"{}\"",
        NO_ANSWER
    )
}

/// Numbered context blocks, `[i] (source, p.N)` followed by the chunk text.
pub fn format_context(result: &RetrievalResult) -> String {
    result
        .hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] ({}, p.{})\n{}",
                i + 1,
                hit.chunk.source,
                hit.chunk.page,
                hit.chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System instruction, then the context and the question.
pub fn build_messages(question: &str, result: &RetrievalResult) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_instruction()),
        ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion: {}",
            format_context(result),
            question.trim()
        )),
    ]
}
