//! Prompt composition.
//!
//! Every tool builds its prompt through [`PromptComposer::compose`], so
//! layout and budgeting live in one place.
//!
//! # Layout
//!
//! ```text
//! <task preamble>
//!
//! Conversation so far:
//! User: ...
//! Assistant: ...
//!
//! Context:
//! [label]
//! <fragment 1>
//!
//! <fragment 2>
//!
//! <instruction label>:
//! <instruction>
//! ```
//!
//! Sections that would be empty are omitted. The budget is measured in
//! characters over the whole prompt. Preamble, turns and instruction are
//! fixed; context fragments fill the remaining room in rank order and
//! the first fragment that does not fit ends inclusion, so lower-ranked
//! fragments are always the ones dropped.

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::models::ConversationTurn;

const SECTION_SEPARATOR: &str = "\n\n";
const CONTEXT_HEADER: &str = "Context:";
const CONVERSATION_HEADER: &str = "Conversation so far:";

/// What the prompt asks the model to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Summarize,
    AnswerQuestion,
    GenerateSql,
    PreviewSqlOutput,
    ExplainSql,
    ExplainCode,
    GenerateBlog,
    Chat,
}

impl TaskType {
    pub fn preamble(&self) -> &'static str {
        match self {
            TaskType::Summarize => {
                "Summarize the content below in approximately 3-5 sentences. \
                 Use only information found in the context."
            }
            TaskType::AnswerQuestion => {
                "Answer the question using only the context below. \
                 If the context does not contain the answer, say that you do not know."
            }
            TaskType::GenerateSql => {
                "You are an expert SQL developer. Write one SQL query that fulfils the request. \
                 Return only the query inside a ```sql code block."
            }
            TaskType::PreviewSqlOutput => {
                "Show what the SQL query below would plausibly return, as a markdown table \
                 of a few sample rows. Return only the table."
            }
            TaskType::ExplainSql => {
                "Explain the SQL query below in plain language, clause by clause."
            }
            TaskType::ExplainCode => {
                "You are a senior software engineer. Explain what the code below does, \
                 step by step, and point out any bugs or risky constructs."
            }
            TaskType::GenerateBlog => {
                "You are a professional blog writer. Write an engaging, well-structured \
                 blog post in Markdown with a title, headings and a conclusion."
            }
            TaskType::Chat => "You are a helpful assistant. Reply to the user's latest message.",
        }
    }

    pub fn instruction_label(&self) -> &'static str {
        match self {
            TaskType::Summarize => "Task",
            TaskType::AnswerQuestion => "Question",
            TaskType::GenerateSql => "Request",
            TaskType::PreviewSqlOutput | TaskType::ExplainSql => "Query",
            TaskType::ExplainCode => "Code",
            TaskType::GenerateBlog => "Brief",
            TaskType::Chat => "User",
        }
    }
}

/// One unit of context, in retrieval-rank order when passed to the
/// composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFragment {
    pub label: Option<String>,
    pub text: String,
}

impl ContextFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            label: None,
            text: text.into(),
        }
    }

    pub fn labelled(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            text: text.into(),
        }
    }

    fn render(&self) -> String {
        match &self.label {
            Some(label) => format!("[{}]\n{}", label, self.text),
            None => self.text.clone(),
        }
    }
}

/// Inputs to one composition.
#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    pub task: TaskType,
    pub instruction: &'a str,
    pub fragments: &'a [ContextFragment],
    pub turns: &'a [ConversationTurn],
}

impl<'a> PromptRequest<'a> {
    pub fn new(task: TaskType, instruction: &'a str) -> Self {
        Self {
            task,
            instruction,
            fragments: &[],
            turns: &[],
        }
    }

    pub fn with_fragments(mut self, fragments: &'a [ContextFragment]) -> Self {
        self.fragments = fragments;
        self
    }

    pub fn with_turns(mut self, turns: &'a [ConversationTurn]) -> Self {
        self.turns = turns;
        self
    }
}

/// A complete prompt plus how many fragments made it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub text: String,
    /// Number of leading fragments included.
    pub included: usize,
    /// Number of trailing fragments dropped for budget.
    pub dropped: usize,
}

/// Builds budgeted prompts.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    budget_chars: usize,
}

impl PromptComposer {
    pub fn new(budget_chars: usize) -> Self {
        Self { budget_chars }
    }

    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    /// Compose a prompt that fits the character budget.
    ///
    /// Fails with [`PipelineError::InvalidInput`] when the instruction is
    /// blank or when the fixed parts alone exceed the budget; nothing is
    /// emitted in either case.
    pub fn compose(&self, request: &PromptRequest<'_>) -> Result<ComposedPrompt, PipelineError> {
        let instruction = request.instruction.trim();
        if instruction.is_empty() {
            return Err(PipelineError::InvalidInput(
                "instruction must not be empty".to_string(),
            ));
        }

        let preamble = request.task.preamble().to_string();
        let turns_block = render_turns(request.turns);
        let instruction_block = format!("{}:\n{}", request.task.instruction_label(), instruction);

        let mut fixed_len = char_len(&preamble) + char_len(&instruction_block) + sep_len();
        if let Some(block) = &turns_block {
            fixed_len += char_len(block) + sep_len();
        }
        if fixed_len > self.budget_chars {
            return Err(PipelineError::InvalidInput(format!(
                "prompt needs {} characters before any context, budget is {}",
                fixed_len, self.budget_chars
            )));
        }

        // Context block: header, then fragments joined by the separator.
        // The block itself costs one more section separator.
        let mut remaining = self.budget_chars - fixed_len;
        let mut context_block = String::new();
        let mut included = 0;
        for fragment in request.fragments {
            let rendered = fragment.render();
            let cost = if included == 0 {
                sep_len() + char_len(CONTEXT_HEADER) + 1 + char_len(&rendered)
            } else {
                sep_len() + char_len(&rendered)
            };
            if cost > remaining {
                break;
            }
            if included == 0 {
                context_block.push_str(CONTEXT_HEADER);
                context_block.push('\n');
            } else {
                context_block.push_str(SECTION_SEPARATOR);
            }
            context_block.push_str(&rendered);
            remaining -= cost;
            included += 1;
        }
        let dropped = request.fragments.len() - included;
        if dropped > 0 {
            warn!(
                included,
                dropped,
                budget = self.budget_chars,
                "context fragments dropped to fit prompt budget"
            );
        }

        let mut sections: Vec<&str> = vec![&preamble];
        if let Some(block) = &turns_block {
            sections.push(block);
        }
        if included > 0 {
            sections.push(&context_block);
        }
        sections.push(&instruction_block);
        let text = sections.join(SECTION_SEPARATOR);

        debug!(
            task = ?request.task,
            chars = char_len(&text),
            turns = request.turns.len(),
            included,
            "composed prompt"
        );

        Ok(ComposedPrompt {
            text,
            included,
            dropped,
        })
    }
}

fn render_turns(turns: &[ConversationTurn]) -> Option<String> {
    if turns.is_empty() {
        return None;
    }
    let mut block = String::from(CONVERSATION_HEADER);
    for turn in turns {
        block.push('\n');
        block.push_str(turn.role.label());
        block.push_str(": ");
        block.push_str(turn.content.trim());
    }
    Some(block)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn sep_len() -> usize {
    SECTION_SEPARATOR.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn fragments(n: usize, len: usize) -> Vec<ContextFragment> {
        (0..n)
            .map(|i| ContextFragment::new(format!("{}{}", i, "x".repeat(len - 1))))
            .collect()
    }

    #[test]
    fn layout_orders_sections() {
        let turns = vec![
            ConversationTurn::user("first question"),
            ConversationTurn::assistant("first answer"),
        ];
        let frags = vec![ContextFragment::labelled("page 1", "Rust is fast.")];
        let composer = PromptComposer::new(10_000);
        let prompt = composer
            .compose(
                &PromptRequest::new(TaskType::AnswerQuestion, "Is Rust fast?")
                    .with_fragments(&frags)
                    .with_turns(&turns),
            )
            .unwrap();

        let t = &prompt.text;
        let p = t.find("Answer the question").unwrap();
        let c = t.find("Conversation so far:").unwrap();
        let u = t.find("User: first question").unwrap();
        let a = t.find("Assistant: first answer").unwrap();
        let x = t.find("Context:\n[page 1]\nRust is fast.").unwrap();
        let q = t.find("Question:\nIs Rust fast?").unwrap();
        assert!(p < c && c < u && u < a && a < x && x < q);
        assert!(t.ends_with("Is Rust fast?"));
        assert_eq!(prompt.included, 1);
        assert_eq!(prompt.dropped, 0);
    }

    #[test]
    fn never_exceeds_budget() {
        let frags = fragments(10, 50);
        for budget in (150..800).step_by(7) {
            let composer = PromptComposer::new(budget);
            let req = PromptRequest::new(TaskType::Summarize, "Summarize.").with_fragments(&frags);
            match composer.compose(&req) {
                Ok(prompt) => {
                    assert!(prompt.text.chars().count() <= budget, "budget {}", budget);
                    assert_eq!(prompt.included + prompt.dropped, frags.len());
                }
                Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidInput),
            }
        }
    }

    #[test]
    fn drops_lowest_ranked_first() {
        let frags = fragments(5, 40);
        let base = PromptComposer::new(100_000)
            .compose(&PromptRequest::new(TaskType::Summarize, "Go."))
            .unwrap()
            .text
            .chars()
            .count();
        // Room for the header and exactly two fragments.
        let budget = base + 2 + "Context:\n".len() + 40 + 2 + 40 + 10;
        let prompt = PromptComposer::new(budget)
            .compose(&PromptRequest::new(TaskType::Summarize, "Go.").with_fragments(&frags))
            .unwrap();

        assert_eq!(prompt.included, 2);
        assert_eq!(prompt.dropped, 3);
        assert!(prompt.text.contains(&frags[0].text));
        assert!(prompt.text.contains(&frags[1].text));
        assert!(!prompt.text.contains(&frags[2].text));
    }

    #[test]
    fn oversized_fixed_parts_fail_without_output() {
        let turns: Vec<ConversationTurn> = (0..20)
            .map(|i| ConversationTurn::user(format!("a long message number {}", i)))
            .collect();
        let err = PromptComposer::new(200)
            .compose(&PromptRequest::new(TaskType::Chat, "hello").with_turns(&turns))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn blank_instruction_is_rejected() {
        let err = PromptComposer::new(1000)
            .compose(&PromptRequest::new(TaskType::ExplainCode, "   "))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let frags = vec![ContextFragment::new("é".repeat(100))];
        let base = PromptComposer::new(100_000)
            .compose(&PromptRequest::new(TaskType::Summarize, "Go."))
            .unwrap()
            .text
            .chars()
            .count();
        let budget = base + 2 + "Context:\n".len() + 100;
        let prompt = PromptComposer::new(budget)
            .compose(&PromptRequest::new(TaskType::Summarize, "Go.").with_fragments(&frags))
            .unwrap();
        assert_eq!(prompt.included, 1);
        assert_eq!(prompt.text.chars().count(), budget);
    }
}
