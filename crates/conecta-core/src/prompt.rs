//! Prompt assembly for question answering and topic extraction.
//!
//! The marker constants here are shared with [`crate::sanitize`], which
//! strips them back out of raw model output.
//!
//! QA prompt layout:
//!
//! ```text
//! <instruction block>
//!
//! Contexto:
//! <passage 1>
//!
//! ---
//!
//! <passage 2>
//!
//! Pergunta: <question>
//!
//! Resposta:
//! ```

use crate::models::ConversationMessage;

pub const CONTEXT_MARKER: &str = "Contexto:";
pub const QUESTION_MARKER: &str = "Pergunta:";
pub const ANSWER_MARKER: &str = "Resposta:";
pub const PASSAGE_DELIMITER: &str = "\n\n---\n\n";
pub const CONVERSATION_MARKER: &str = "Conversa:";
pub const TOPICS_MARKER: &str = "Tópicos Principais:";

pub const DEFAULT_LANGUAGE: &str = "português";

/// Fixed answer when retrieval finds nothing for the user.
pub const NO_RELEVANT_INFORMATION: &str =
    "Não consegui encontrar informações relevantes nos documentos carregados para responder a esta pergunta.";

/// Openings that models tend to echo back in front of the actual answer.
const COMMON_ECHO_PREFIXES: &[&str] = &[
    "Com base **apenas** no contexto fornecido, responda à pergunta **em português**.",
    "Com base **exclusivamente** no contexto fornecido, responda à seguinte pergunta.",
    "Com base exclusivamente no contexto fornecido,",
    "Com base no contexto fornecido,",
    "Aqui está a resposta:",
    "A resposta é:",
    "Resposta Concisa:",
    "Helpful answer:",
    "Here's the answer:",
    "The answer is:",
];

const STYLE_RULES: &str = "Seja claro, conciso e natural, sem introduções.\n\
Não repita a pergunta nem o contexto e não cite o contexto literalmente.";

const TOPIC_INSTRUCTION: &str = "Com base na seguinte conversa, identifique os 5 a 7 principais tópicos ou substantivos chave discutidos.\n\
Liste-os separados por vírgulas. Priorize substantivos ou frases nominais curtas.";

/// Instruction template for the question-answering prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    language: String,
    strict_context: bool,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE, false)
    }
}

impl PromptTemplate {
    /// `strict_context = true` forbids knowledge outside the retrieved passages.
    pub fn new(language: impl Into<String>, strict_context: bool) -> Self {
        Self {
            language: language.into(),
            strict_context,
        }
    }

    fn heading(&self) -> String {
        if self.strict_context {
            format!(
                "Com base **apenas** no contexto fornecido, responda à pergunta **em {}**.",
                self.language
            )
        } else {
            format!(
                "Com base no contexto fornecido, responda à pergunta em {}.",
                self.language
            )
        }
    }

    pub fn instruction(&self) -> String {
        let fallback = if self.strict_context {
            format!(
                "Se a resposta não estiver no contexto, responda exatamente: \"{}\"",
                NO_RELEVANT_INFORMATION
            )
        } else {
            "Se o contexto não for suficiente, complemente com o seu conhecimento geral.".to_string()
        };
        format!("{}\n{}\n{}", self.heading(), STYLE_RULES, fallback)
    }

    /// Prefixes the answer sanitizer strips from the start of an output.
    pub fn echo_prefixes(&self) -> Vec<String> {
        let mut prefixes = vec![self.heading()];
        prefixes.extend(COMMON_ECHO_PREFIXES.iter().map(|p| p.to_string()));
        prefixes
    }

    /// Assemble the QA prompt. Passage order is preserved.
    pub fn build_qa_prompt<S: AsRef<str>>(&self, passages: &[S], question: &str) -> String {
        let context = passages
            .iter()
            .map(|p| p.as_ref().trim())
            .collect::<Vec<_>>()
            .join(PASSAGE_DELIMITER);
        format!(
            "{}\n\n{}\n{}\n\n{} {}\n\n{}",
            self.instruction(),
            CONTEXT_MARKER,
            context,
            QUESTION_MARKER,
            question.trim(),
            ANSWER_MARKER
        )
    }
}

/// Render a transcript as `role: content` lines.
pub fn render_transcript(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_topic_prompt(messages: &[ConversationMessage]) -> String {
    format!(
        "{}\n\n{}\n{}\n\n{}",
        TOPIC_INSTRUCTION,
        CONVERSATION_MARKER,
        render_transcript(messages),
        TOPICS_MARKER
    )
}

/// Prefixes the topic sanitizer strips from the start of an output.
pub fn topic_echo_prefixes() -> Vec<String> {
    let heading = TOPIC_INSTRUCTION.lines().next().unwrap_or_default();
    vec![
        heading.to_string(),
        "Com base na seguinte conversa,".to_string(),
        "Tópicos:".to_string(),
        "Topics:".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qa_prompt_layout() {
        let template = PromptTemplate::default();
        let prompt = template.build_qa_prompt(&["Loja X vende eletrônicos", "Frete grátis"], "O que é a Loja X?");

        let ctx = prompt.find(CONTEXT_MARKER).unwrap();
        let q = prompt.find(QUESTION_MARKER).unwrap();
        let a = prompt.rfind(ANSWER_MARKER).unwrap();
        assert!(ctx < q && q < a);
        assert!(prompt.ends_with(ANSWER_MARKER));
        assert!(prompt.contains("Loja X vende eletrônicos\n\n---\n\nFrete grátis"));
        assert!(prompt.contains("Pergunta: O que é a Loja X?"));
        assert!(prompt.starts_with("Com base no contexto fornecido"));
    }

    #[test]
    fn test_strict_instruction_forbids_outside_knowledge() {
        let strict = PromptTemplate::new("português", true).instruction();
        assert!(strict.contains("**apenas**"));
        assert!(strict.contains(NO_RELEVANT_INFORMATION));

        let lenient = PromptTemplate::new("português", false).instruction();
        assert!(lenient.contains("conhecimento geral"));
        assert!(!lenient.contains(NO_RELEVANT_INFORMATION));
    }

    #[test]
    fn test_language_is_templated() {
        let template = PromptTemplate::new("inglês", true);
        assert!(template.instruction().contains("**em inglês**"));
        assert_eq!(template.echo_prefixes()[0], template.instruction().lines().next().unwrap());
    }

    #[test]
    fn test_topic_prompt() {
        let messages = vec![
            ConversationMessage::user("Qual o frete?"),
            ConversationMessage::assistant("O frete é grátis."),
        ];
        let prompt = build_topic_prompt(&messages);
        assert!(prompt.contains("Conversa:\nuser: Qual o frete?\nassistant: O frete é grátis."));
        assert!(prompt.ends_with(TOPICS_MARKER));
        assert!(prompt.contains("5 a 7"));
    }
}
