//! Prompt assembly.
//!
//! Prompts carry Slack formatting rules because replies are posted
//! verbatim. Retrieved context is labelled with document names only; file
//! paths and similarity scores never reach the model or the user.

use crate::analysis::TimeWindow;
use crate::history::Turn;
use crate::retrieval::RetrievedChunk;

/// Sentence the document prompt asks the model to use when the context
/// does not answer the question.
pub const NO_INFO_SENTENCE: &str = "I don't find relevant information in the available documents";

const SLACK_FORMATTING: &str = "For Slack formatting:
- Use *text* for bold (not **text**)
- Use _text_ for italic
- Use `text` for inline code
- Use • or - for bullet points (not *)";

/// The question, preceded by recent turns when there are any.
pub fn with_history(question: &str, history: &[Turn]) -> String {
    if history.is_empty() {
        return question.to_string();
    }
    let mut lines = Vec::with_capacity(history.len() * 2);
    for turn in history {
        lines.push(format!("Previous Q: {}", turn.question));
        lines.push(format!("Previous A: {}", turn.answer));
    }
    format!(
        "Conversation context:\n{}\n\nCurrent question: {}",
        lines.join("\n"),
        question
    )
}

/// Answer strictly from retrieved context.
pub fn document_prompt(question: &str, context: &[RetrievedChunk], history: &[Turn]) -> String {
    let context_block = context
        .iter()
        .map(|c| format!("[{}]\n{}", c.document.name, c.chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful assistant with access to company documents.
Use only the provided context to answer questions accurately.

Guidelines:
1. Provide clear, accurate answers based on the context
2. Mention source documents by name when relevant
3. If the context does not contain the answer, say \"{no_info}\"
4. Keep responses concise but complete
5. Be conversational and friendly

{formatting}

Context:
{context}

Question: {question}
Answer: ",
        no_info = NO_INFO_SENTENCE,
        formatting = SLACK_FORMATTING,
        context = context_block,
        question = with_history(question, history),
    )
}

/// Open-ended conversation.
pub fn chat_prompt(bot_name: &str, message: &str, history: &[Turn]) -> String {
    format!(
        "You are {bot_name}, a friendly AI assistant for a team at work. Respond naturally and conversationally.
Be helpful, engaging, and personable.

{formatting}

User: {message}
Assistant: ",
        bot_name = bot_name,
        formatting = SLACK_FORMATTING,
        message = with_history(message, history),
    )
}

/// Summarize a channel transcript.
pub fn analysis_prompt(instruction: &str, transcript: &str, window: TimeWindow) -> String {
    format!(
        "Please provide a concise summary of the following Slack channel conversation ({window}).
The user asked: {instruction}

{transcript}

Focus on:
- Main topics discussed
- Key decisions or announcements
- Important questions or issues raised
- Action items mentioned

Do not repeat messages verbatim.

{formatting}",
        window = window.label(),
        instruction = instruction,
        transcript = transcript,
        formatting = SLACK_FORMATTING,
    )
}
