//! System prompt for the medical assistant.

use crate::models::{Role, ScoredChunk, Turn};

pub const SYSTEM_PROMPT: &str = "You are a medical assistant for question answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you dont know the answer, say that you dont know the answer. \
Use 3 sentences maximum and keep the answer concise.\n\n\
Previous Conversation:\n{chat_history}\n\n\
Retrieved Context:\n{context}";

/// Fills `{chat_history}` and `{context}` into [`SYSTEM_PROMPT`].
pub fn render_system_prompt(history: &[Turn], passages: &[ScoredChunk]) -> String {
    render(
        SYSTEM_PROMPT,
        &[
            ("chat_history", format_history(history)),
            ("context", format_context(passages)),
        ],
    )
}

/// One line per turn, `Human: …` or `Assistant: …`.
pub fn format_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::Human => "Human",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_context(passages: &[ScoredChunk]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Substitutes `{name}` placeholders in a single left-to-right pass, so
/// braces inside substituted values are never expanded again. Unknown
/// placeholders are left as written.
fn render(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
