//! Task-specific tools built on the [`Pipeline`].
//!
//! Each tool validates its inputs, builds an instruction for the prompt
//! composer, and calls the generator. Validation failures are
//! `InvalidInput` and happen before any request is sent.
//!
//! | Tool | Calls | Session |
//! |------|-------|---------|
//! | [`Pipeline::generate_blog`] | 1 | none |
//! | [`Pipeline::generate_sql`] | 3 (query, sample output, explanation) | none |
//! | [`Pipeline::explain_code`] | 1 | none |
//! | [`Pipeline::load_csv`] / [`Pipeline::ask_csv`] | 0 / 1 | CSV table + Q&A turns |

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use tracing::info;

use llm_suite_core::models::SourceKind;
use llm_suite_core::prompt::{ContextFragment, PromptRequest, TaskType};
use llm_suite_core::session::{LoadedDocument, ToolSession};
use llm_suite_core::PipelineError;

use crate::extract::{extract_document, CsvTable};
use crate::pipeline::{require_text, Pipeline};

/// Accepted blog lengths, in words.
pub const BLOG_WORDS: RangeInclusive<u32> = 200..=2500;

/// Inputs for [`Pipeline::generate_blog`].
#[derive(Debug, Clone)]
pub struct BlogRequest {
    pub title: String,
    /// Comma-separated keywords to work into the post.
    pub keywords: String,
    pub words: u32,
}

/// SQL dialect the generated query must target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    #[default]
    Generic,
    PostgreSql,
    MySql,
    Sqlite,
}

impl SqlDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::Generic => "Generic SQL",
            SqlDialect::PostgreSql => "PostgreSQL",
            SqlDialect::MySql => "MySQL",
            SqlDialect::Sqlite => "SQLite",
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" | "sql" => Ok(SqlDialect::Generic),
            "postgres" | "postgresql" | "pg" => Ok(SqlDialect::PostgreSql),
            "mysql" => Ok(SqlDialect::MySql),
            "sqlite" => Ok(SqlDialect::Sqlite),
            other => Err(format!(
                "unknown SQL dialect '{}' (expected generic, postgresql, mysql or sqlite)",
                other
            )),
        }
    }
}

/// Inputs for [`Pipeline::generate_sql`].
#[derive(Debug, Clone, Default)]
pub struct SqlRequest {
    pub description: String,
    /// Optional table definitions or other database context.
    pub schema: Option<String>,
    pub dialect: SqlDialect,
}

/// The three parts of a SQL generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlAnswer {
    pub query: String,
    /// Plausible result rows as a Markdown table.
    pub sample_output: String,
    pub explanation: String,
}

impl SqlAnswer {
    /// Markdown rendering used for export.
    pub fn to_markdown(&self) -> String {
        format!(
            "## Query\n\n```sql\n{}\n```\n\n## Sample output\n\n{}\n\n## Explanation\n\n{}\n",
            self.query,
            self.sample_output.trim(),
            self.explanation.trim()
        )
    }
}

/// Shape of a loaded CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReport {
    pub columns: Vec<String>,
    pub rows: usize,
}

impl Pipeline {
    /// Write a blog post for the given title and keywords.
    pub async fn generate_blog(&self, request: &BlogRequest) -> Result<String, PipelineError> {
        let title = require_text(&request.title, "blog title")?;
        let keywords = require_text(&request.keywords, "keywords")?;
        if !BLOG_WORDS.contains(&request.words) {
            return Err(PipelineError::InvalidInput(format!(
                "word count must be between {} and {}, got {}",
                BLOG_WORDS.start(),
                BLOG_WORDS.end(),
                request.words
            )));
        }

        let brief = format!(
            "Title: {}\n\
             Keywords to include naturally: {}\n\
             Length: about {} words\n\
             Tone: professional yet accessible. Open with a captivating introduction, \
             keep the body informative, and close with a concise summary or call to action.",
            title, keywords, request.words
        );
        let prompt = self
            .composer
            .compose(&PromptRequest::new(TaskType::GenerateBlog, &brief))?;
        self.generator.generate(&prompt.text).await
    }

    /// Generate a query, a sample of its output and an explanation.
    ///
    /// The three calls run in sequence; the later two see the generated
    /// query with any code fence removed.
    pub async fn generate_sql(&self, request: &SqlRequest) -> Result<SqlAnswer, PipelineError> {
        let description = require_text(&request.description, "query description")?;

        let mut instruction = description.to_string();
        if request.dialect != SqlDialect::Generic {
            instruction.push_str(&format!(
                "\n\nThe query must be valid {}.",
                request.dialect
            ));
        }
        let fragments: Vec<ContextFragment> = request
            .schema
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|schema| ContextFragment::labelled("database schema", schema))
            .into_iter()
            .collect();

        let prompt = self.composer.compose(
            &PromptRequest::new(TaskType::GenerateSql, &instruction).with_fragments(&fragments),
        )?;
        let query = strip_code_fence(&self.generator.generate(&prompt.text).await?);
        if query.is_empty() {
            return Err(PipelineError::invalid_response(
                "the model returned no SQL query",
            ));
        }

        let preview = self
            .composer
            .compose(&PromptRequest::new(TaskType::PreviewSqlOutput, &query))?;
        let sample_output = self.generator.generate(&preview.text).await?;

        let explain = self
            .composer
            .compose(&PromptRequest::new(TaskType::ExplainSql, &query))?;
        let explanation = self.generator.generate(&explain.text).await?;

        info!(dialect = %request.dialect, query_chars = query.len(), "sql generated");
        Ok(SqlAnswer {
            query,
            sample_output,
            explanation,
        })
    }

    /// Explain a code snippet written in `language`.
    pub async fn explain_code(&self, language: &str, code: &str) -> Result<String, PipelineError> {
        if code.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "code must not be empty".to_string(),
            ));
        }
        let language = match language.trim() {
            "" => "unspecified",
            lang => lang,
        };
        let instruction = format!(
            "Language: {}\n\
             Start with the full code exactly as given, then an overview of what it does, \
             then a line-by-line explanation.\n\n\
             ```\n{}\n```",
            language,
            code.trim_end()
        );
        let prompt = self
            .composer
            .compose(&PromptRequest::new(TaskType::ExplainCode, &instruction))?;
        self.generator.generate(&prompt.text).await
    }

    // ============ CSV analyzer ============

    /// Parse an uploaded CSV file and make it the session's loaded table.
    pub fn load_csv(
        &self,
        session: &mut ToolSession,
        bytes: &[u8],
        origin: &str,
    ) -> Result<CsvReport, PipelineError> {
        let document = extract_document(bytes, SourceKind::Csv, origin)?;
        let table = CsvTable::parse(document.text())?;
        let report = CsvReport {
            columns: table.columns.clone(),
            rows: table.rows.len(),
        };
        info!(origin, columns = report.columns.len(), rows = report.rows, "csv loaded");
        session.replace_document(LoadedDocument::raw(document));
        Ok(report)
    }

    /// Answer a question about the loaded CSV table.
    ///
    /// Column names go in the instruction; rows are passed as blocks in
    /// file order, so the earliest rows survive a tight budget.
    pub async fn ask_csv(
        &self,
        session: &mut ToolSession,
        question: &str,
    ) -> Result<String, PipelineError> {
        let question = require_text(question, "question")?;
        let prompt = {
            let document = match session.document() {
                Some(loaded) if loaded.document.kind() == SourceKind::Csv => &loaded.document,
                _ => {
                    return Err(PipelineError::InvalidInput(
                        "no CSV file loaded".to_string(),
                    ))
                }
            };
            let table = CsvTable::parse(document.text())?;
            let fragments = row_fragments(&table, self.config.csv.rows_per_fragment);
            let instruction = format!(
                "{}\n\nThe table has these columns: {}.",
                question,
                table.columns.join(", ")
            );
            let request = PromptRequest::new(TaskType::AnswerQuestion, &instruction)
                .with_fragments(&fragments)
                .with_turns(session.conversation.recent(self.config.conversation.max_turns));
            let composed = self.composer.compose(&request)?;
            if composed.dropped > 0 {
                info!(
                    included = composed.included,
                    dropped = composed.dropped,
                    "csv rows truncated to fit the prompt"
                );
            }
            composed.text
        };

        let answer = self.generator.generate(&prompt).await?;
        session.conversation.append_exchange(question, answer.clone());
        session.set_last_output(answer.clone());
        Ok(answer)
    }
}

fn row_fragments(table: &CsvTable, rows_per_fragment: usize) -> Vec<ContextFragment> {
    let per = rows_per_fragment.max(1);
    let total = table.rows.len();
    table
        .row_blocks(per)
        .into_iter()
        .enumerate()
        .map(|(i, block)| {
            let first = i * per + 1;
            let last = ((i + 1) * per).min(total);
            ContextFragment::labelled(format!("rows {}-{}", first, last), block)
        })
        .collect()
}

/// Remove a surrounding Markdown code fence (with or without a language
/// tag) and trim.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string ("sql", "SQL", ...) on the opening line.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}
