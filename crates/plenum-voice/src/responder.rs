//! Keyword-matched answer generation.

use crate::error::VoiceError;
use crate::pipeline::AnswerGenerator;
use async_trait::async_trait;

/// Answers questions by matching common phrasings against fixed responses.
///
/// Falls back to a generic answer that quotes the question, so the output is
/// never empty for a non-empty question.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextualResponder;

impl ContextualResponder {
    pub fn respond(&self, question: &str) -> String {
        let lower = question.to_lowercase();

        if lower.contains("hello") || lower.contains("hi") {
            return "Hello! Welcome to our interactive session. I'm here to help answer \
                    your questions. What would you like to know?"
                .to_string();
        }
        if lower.contains("how") && lower.contains("work") {
            return "This system listens to your spoken question, turns it into text, and \
                    produces an answer you can hear in real time. Simply speak your \
                    question and the moderator's assistant takes it from there."
                .to_string();
        }
        if lower.contains("what") && lower.contains("plenum") {
            return "Plenum is an interactive question and answer platform that combines \
                    voice recognition, generated answers, and speech synthesis to keep \
                    conversations flowing during live events and presentations."
                .to_string();
        }
        if lower.contains("technology") || lower.contains("tech") {
            return "Under the hood this uses speech recognition, keyword-matched answer \
                    generation, hosted voice synthesis, and live change notifications to \
                    keep everyone in the room on the same page."
                .to_string();
        }
        if lower.contains("feature") || lower.contains("capability") {
            return "Key features include live voice capture, spoken answers, QR code seat \
                    joining, and a moderation queue that updates for everyone the moment \
                    a question changes."
                .to_string();
        }
        if lower.contains("thank") {
            return "You're very welcome! Feel free to ask more questions anytime during \
                    this session."
                .to_string();
        }

        format!(
            "That's an interesting question about \"{question}\". In the context of this \
             session, the short answer is that better tools for listening and responding \
             make the conversation between a speaker and the room more direct. Would you \
             like me to elaborate on any specific aspect?"
        )
    }
}

#[async_trait]
impl AnswerGenerator for ContextualResponder {
    async fn generate(&self, question: &str) -> Result<String, VoiceError> {
        Ok(self.respond(question))
    }
}
