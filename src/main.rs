//! # LLM Suite CLI (`llmsuite`)
//!
//! Command-line front end for the generation tools: blog writing, SQL
//! generation, code explanation, document and website summaries, CSV
//! question answering, and a streaming chat.
//!
//! ## Usage
//!
//! ```bash
//! llmsuite --config ./config/llmsuite.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `llmsuite blog` | Write a blog post from a title and keywords |
//! | `llmsuite sql "<description>"` | Generate a SQL query, sample output and explanation |
//! | `llmsuite explain` | Explain a code snippet (file or stdin) |
//! | `llmsuite doc <file>` | Summarize a PDF/DOCX file, optionally followed by Q&A |
//! | `llmsuite web <url>` | Summarize a web page |
//! | `llmsuite csv <file>` | Ask questions about a CSV file |
//! | `llmsuite chat` | Interactive chat with streamed replies |
//! | `llmsuite completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Blog post saved as Markdown
//! llmsuite blog --title "Zero-cost abstractions" --keywords "rust, performance" --output posts/
//!
//! # PostgreSQL query with a schema file
//! llmsuite sql "monthly revenue per customer" --schema-file schema.sql --dialect postgresql
//!
//! # Summarize a PDF, then keep asking questions about it
//! llmsuite doc report.pdf --ask
//! ```
//!
//! Credentials are read from the environment variable named in the config
//! (`GEMINI_API_KEY` by default).

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

use llm_suite::config::{self, Config};
use llm_suite::export::{export_text, ExportFormat};
use llm_suite::logging::init_tracing;
use llm_suite::pipeline::Pipeline;
use llm_suite::tools::{BlogRequest, SqlDialect, SqlRequest};
use llm_suite_core::models::SourceKind;
use llm_suite_core::session::ToolSession;

/// LLM Suite CLI: prompt-driven writing, analysis and summarization tools.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/llmsuite.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "llmsuite",
    about = "LLM Suite: blog, SQL, code, document, website, CSV and chat tools backed by a hosted model",
    version,
    long_about = "LLM Suite extracts text from documents and web pages, retrieves the passages \
    relevant to a question, composes a bounded prompt and sends it to a hosted generation \
    model. Replies can be streamed and exported as Markdown or plain text."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/llmsuite.toml`; built-in defaults are used
    /// when that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a blog post.
    Blog {
        #[arg(long)]
        title: String,

        /// Comma-separated keywords to include.
        #[arg(long)]
        keywords: String,

        /// Approximate length in words (200-2500).
        #[arg(long, default_value_t = 800)]
        words: u32,

        /// Save the post to this file or directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Generate a SQL query from a description.
    ///
    /// Prints the query, a plausible sample of its output and a short
    /// explanation.
    Sql {
        /// What the query should do.
        description: String,

        /// Inline schema or other database context.
        #[arg(long, conflicts_with = "schema_file")]
        schema: Option<String>,

        /// Read the schema from a file.
        #[arg(long)]
        schema_file: Option<PathBuf>,

        /// Target dialect: generic, postgresql, mysql or sqlite.
        #[arg(long, default_value = "generic")]
        dialect: SqlDialect,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Explain a code snippet.
    ///
    /// Reads the code from `--file`, or from stdin when no file is given.
    Explain {
        /// Language of the snippet (e.g. Python, Rust).
        #[arg(long, default_value = "")]
        language: String,

        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Summarize a PDF or DOCX document.
    Doc {
        path: PathBuf,

        /// Skip the summary.
        #[arg(long)]
        no_summary: bool,

        /// Ask this question after loading (repeatable).
        #[arg(long = "question", short = 'q')]
        questions: Vec<String>,

        /// Keep reading questions from stdin after the summary.
        #[arg(long)]
        ask: bool,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Summarize a web page.
    Web {
        url: String,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Ask questions about a CSV file.
    ///
    /// Without `--question`, questions are read interactively.
    Csv {
        path: PathBuf,

        #[arg(long = "question", short = 'q')]
        questions: Vec<String>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Chat with streamed replies.
    ///
    /// `/clear` forgets the conversation, `/exit` quits. Ctrl-C cancels
    /// the reply in progress.
    Chat,

    /// Print a shell completion script.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "llmsuite", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&config::config_path(cli.config))?;
    init_tracing(&cfg.logging);
    debug!(
        provider = %cfg.generation.provider,
        model = %cfg.generation.model,
        embedding = %cfg.embedding.provider,
        "configuration loaded"
    );

    match cli.command {
        Commands::Blog {
            title,
            keywords,
            words,
            output,
        } => {
            let pipeline = build_pipeline(cfg)?;
            let post = pipeline
                .generate_blog(&BlogRequest {
                    title: title.clone(),
                    keywords,
                    words,
                })
                .await?;
            println!("{}", post);
            save(output.as_deref(), &title, &post)?;
        }
        Commands::Sql {
            description,
            schema,
            schema_file,
            dialect,
            output,
        } => {
            let schema = match schema_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read schema file: {}", path.display()))?,
                ),
                None => schema,
            };
            let pipeline = build_pipeline(cfg)?;
            let answer = pipeline
                .generate_sql(&SqlRequest {
                    description,
                    schema,
                    dialect,
                })
                .await?;
            let markdown = answer.to_markdown();
            println!("{}", markdown);
            save(output.as_deref(), "sql_query", &markdown)?;
        }
        Commands::Explain {
            language,
            file,
            output,
        } => {
            let code = match &file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read code file: {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read code from stdin")?;
                    buf
                }
            };
            let pipeline = build_pipeline(cfg)?;
            let explanation = pipeline.explain_code(&language, &code).await?;
            println!("{}", explanation);
            let title = file
                .as_deref()
                .and_then(Path::file_stem)
                .and_then(|s| s.to_str())
                .map(|s| format!("{}_explanation", s))
                .unwrap_or_else(|| "code_explanation".to_string());
            save(output.as_deref(), &title, &explanation)?;
        }
        Commands::Doc {
            path,
            no_summary,
            questions,
            ask,
            output,
        } => {
            run_doc(cfg, &path, no_summary, questions, ask, output.as_deref()).await?;
        }
        Commands::Web { url, output } => {
            let pipeline = build_pipeline(cfg)?;
            let mut session = ToolSession::new();
            let summary = pipeline.summarize_website(&mut session, &url).await?;
            if let Some(title) = &summary.title {
                println!("# {}\n", title);
            }
            println!("{}", summary.summary);
            if summary.truncated {
                eprintln!("(page text was truncated before summarizing)");
            }
            let title = summary.title.as_deref().unwrap_or("website_summary");
            save(output.as_deref(), title, &summary.summary)?;
        }
        Commands::Csv {
            path,
            questions,
            output,
        } => {
            run_csv(cfg, &path, questions, output.as_deref()).await?;
        }
        Commands::Chat => {
            run_chat(cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

fn build_pipeline(cfg: Config) -> Result<Pipeline> {
    Ok(Pipeline::from_config(cfg)?)
}

/// Export `text` when `--output` was given.
fn save(output: Option<&Path>, title: &str, text: &str) -> Result<()> {
    let Some(path) = output else {
        return Ok(());
    };
    let format = ExportFormat::from_path(path).unwrap_or_default();
    let written = export_text(path, title, text, format)?;
    eprintln!("Saved {} to {}", format, written.display());
    Ok(())
}

async fn run_doc(
    cfg: Config,
    path: &Path,
    no_summary: bool,
    questions: Vec<String>,
    ask: bool,
    output: Option<&Path>,
) -> Result<()> {
    let kind = SourceKind::from_path(path)?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let origin = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document");

    let pipeline = build_pipeline(cfg)?;
    let mut session = ToolSession::new();
    let report = pipeline
        .load_document(&mut session, &bytes, kind, origin)
        .await?;
    eprintln!(
        "Loaded {} ({} characters, {} chunks)",
        origin, report.chars, report.chunks
    );

    if !no_summary {
        let summary = pipeline.summarize_document(&mut session).await?;
        println!("{}\n", summary);
    }
    for question in questions {
        let answer = pipeline.ask_document(&mut session, &question).await?;
        println!("Q: {}\nA: {}\n", question.trim(), answer);
    }
    if ask {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(question) = prompt_line(&mut lines, "question> ").await? {
            match pipeline.ask_document(&mut session, &question).await {
                Ok(answer) => println!("{}\n", answer),
                Err(e) => eprintln!("Error: {}", e),
            }
        }
    }

    if let Some(text) = session.last_output() {
        let title = report.title.as_deref().unwrap_or(origin);
        save(output, title, text)?;
    }
    Ok(())
}

async fn run_csv(
    cfg: Config,
    path: &Path,
    questions: Vec<String>,
    output: Option<&Path>,
) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let origin = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("data.csv");

    let pipeline = build_pipeline(cfg)?;
    let mut session = ToolSession::new();
    let report = pipeline.load_csv(&mut session, &bytes, origin)?;
    eprintln!(
        "Loaded {}: {} rows, columns: {}",
        origin,
        report.rows,
        report.columns.join(", ")
    );

    if questions.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(question) = prompt_line(&mut lines, "question> ").await? {
            match pipeline.ask_csv(&mut session, &question).await {
                Ok(answer) => println!("{}\n", answer),
                Err(e) => eprintln!("Error: {}", e),
            }
        }
    } else {
        for question in questions {
            let answer = pipeline.ask_csv(&mut session, &question).await?;
            println!("Q: {}\nA: {}\n", question.trim(), answer);
        }
    }

    if let Some(text) = session.last_output() {
        save(output, "csv_answer", text)?;
    }
    Ok(())
}

async fn run_chat(cfg: Config) -> Result<()> {
    let pipeline = build_pipeline(cfg)?;
    let mut session = ToolSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!(
        "Chatting with {}. /clear resets the conversation, /exit quits.",
        pipeline.generator().model_name()
    );

    while let Some(message) = prompt_line(&mut lines, "you> ").await? {
        match message.as_str() {
            "/exit" | "/quit" => break,
            "/clear" => {
                session.conversation.clear();
                eprintln!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        let mut reply = match pipeline.chat_stream(&mut session, &message).await {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("Error: {}", e);
                continue;
            }
        };
        loop {
            tokio::select! {
                item = reply.next() => match item {
                    Some(Ok(text)) => {
                        print!("{}", text);
                        std::io::stdout().flush()?;
                    }
                    Some(Err(e)) => {
                        eprintln!("\nError: {}", e);
                        break;
                    }
                    None => {
                        println!();
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\n(cancelled)");
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Print `prompt` and read the next non-empty line; `None` at end of input.
async fn prompt_line(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> Result<Option<String>> {
    loop {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        match lines.next_line().await? {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(Some(line.trim().to_string())),
            None => return Ok(None),
        }
    }
}
