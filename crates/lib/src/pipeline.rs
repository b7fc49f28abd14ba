//! Answer pipeline for one inbound text message: retrieve → compose → generate → deliver.
//!
//! Each step owns its failure policy. Retrieval failure degrades to no context, completion
//! failure degrades to [`FALLBACK_ANSWER`], delivery failure is reported to the caller, which
//! logs it. Nothing is retried.

use crate::channels::{InboundMessage, LineError, ReplyChannel};
use crate::llm::{ChatMessage, CompletionParams, LlmBackend};
use crate::retrieval::Retriever;
use uuid::Uuid;

/// System instruction sent ahead of every prompt.
pub const SYSTEM_PROMPT: &str = "คุณเป็นผู้ช่วยส่วนตัวที่ใช้ฐานความรู้ของผู้ใช้";

/// Reply text used when no answer could be generated.
pub const FALLBACK_ANSWER: &str = "ขอโทษ, ขณะนี้ไม่สามารถตอบได้";

/// Separator placed between retrieved contexts in the prompt.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Contexts for `question`; empty when the retriever fails.
pub async fn retrieve_contexts(
    request_id: Uuid,
    retriever: &dyn Retriever,
    question: &str,
    top_k: u32,
) -> Vec<String> {
    match retriever.query(question, top_k).await {
        Ok(contexts) => {
            log::debug!("[{}] retrieval returned {} context(s)", request_id, contexts.len());
            contexts
        }
        Err(e) => {
            log::error!("[{}] retrieval error, continuing without context: {}", request_id, e);
            Vec::new()
        }
    }
}

/// Fixed-template prompt embedding the contexts and the question.
pub fn compose_prompt(contexts: &[String], question: &str) -> String {
    format!(
        "ใช้ความรู้ด้านล่างประกอบการตอบคำถามต่อไปนี้\n\nContext:\n{}\n\nคำถาม: {}\n\nตอบอย่างกระชับและเป็นประโยชน์:",
        contexts.join(CONTEXT_SEPARATOR),
        question
    )
}

/// Answer for `prompt`; [`FALLBACK_ANSWER`] when the backend fails or returns no content.
pub async fn generate_answer(
    request_id: Uuid,
    llm: &dyn LlmBackend,
    prompt: &str,
    params: &CompletionParams,
) -> String {
    let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
    match llm.complete(messages, params).await {
        Ok(answer) => answer,
        Err(e) => {
            log::error!("[{}] completion error, replying with fallback: {}", request_id, e);
            FALLBACK_ANSWER.to_string()
        }
    }
}

/// Send `answer` as the reply to `reply_token`.
pub async fn deliver_reply(
    channel: &dyn ReplyChannel,
    reply_token: &str,
    answer: &str,
) -> Result<(), LineError> {
    channel.reply(reply_token, answer).await
}

/// Collaborators and fixed parameters for running the pipeline. `request_id` tags every log line.
pub struct Pipeline<'a> {
    pub request_id: Uuid,
    pub retriever: &'a dyn Retriever,
    pub llm: &'a dyn LlmBackend,
    pub params: &'a CompletionParams,
    pub top_k: u32,
}

impl Pipeline<'_> {
    /// Retrieve, compose, and generate. Never fails: the worst case is the fallback answer.
    pub async fn answer(&self, question: &str) -> String {
        let contexts = retrieve_contexts(self.request_id, self.retriever, question, self.top_k).await;
        let prompt = compose_prompt(&contexts, question);
        generate_answer(self.request_id, self.llm, &prompt, self.params).await
    }

    /// Full chain for one message, including delivery. Returns the delivery outcome.
    pub async fn answer_and_reply(
        &self,
        channel: &dyn ReplyChannel,
        message: &InboundMessage,
    ) -> Result<(), LineError> {
        let answer = self.answer(&message.text).await;
        deliver_reply(channel, &message.reply_token, &answer).await
    }
}
