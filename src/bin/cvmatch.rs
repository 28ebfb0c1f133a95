//! CLI binary for cvmatch.
//!
//! A thin shim over the library crate that maps CLI flags to `MatchConfig`,
//! runs one task and prints the resulting JSON on stdout.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cvmatch::{
    extract_text, tool_specs, Backend, MatchConfig, ModelEnv, ResumeInput, ResumeTools, ToolCall,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::future::Future;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Structure a résumé into JSON
  cvmatch structure CV.pdf

  # Compare a structured résumé with a job description
  cvmatch structure CV.pdf > cv.json
  cvmatch compare --resume cv.json --job "AI Engineer, 5 years, Python and Rust"

  # Draft a cover letter straight from the PDF
  cvmatch cover-letter --resume CV.pdf --job-file posting.txt

  # Everything at once: structure, compare, cover letter
  cvmatch run CV.pdf --job-file posting.txt

  # Many résumés, four at a time
  cvmatch batch --concurrency 4 cvs/*.pdf

  # Tool catalogue for an agent, and a tool call decided by one
  cvmatch tools
  echo '{"tool":"structure_resume","arguments":{"file_path":"CV.pdf"}}' | cvmatch call -

MODEL RESOLUTION (first match wins):
  1. --model / CVMATCH_MODEL (LITELLM_MODEL is read as a fallback)
  2. MISTRAL_API_KEY present  → mistral/mistral-small-latest
  3. otherwise                → gpt-4o-mini

ENVIRONMENT VARIABLES:
  CVMATCH_MODEL        Model identifier (provider/model, bare = openai)
  LITELLM_MODEL        Older name for CVMATCH_MODEL
  MISTRAL_API_KEY      Mistral key; its presence selects the Mistral default
  OPENAI_API_KEY       OpenAI key (read by the provider backend)
  CVMATCH_BACKEND      provider (default) or http
  CVMATCH_API_BASE     Base URL of an OpenAI-compatible gateway (http backend)
  CVMATCH_API_KEY      Bearer token for that gateway
  CVMATCH_PROMPT_DIR   Directory of <template>.json prompt overrides
  PDFIUM_LIB_PATH      libpdfium file or directory (default: system library)

  Variables in ./.env.local and ./.env are loaded first when present.
"#;

/// Structure PDF résumés and match them to job descriptions with LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "cvmatch",
    version,
    about = "Structure PDF résumés, compare them with job descriptions and draft cover letters",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Model identifier, e.g. mistral/mistral-small-latest or gpt-4o-mini.
    #[arg(long, global = true, env = "CVMATCH_MODEL")]
    model: Option<String>,

    /// Completion backend.
    #[arg(long, global = true, env = "CVMATCH_BACKEND", value_enum, default_value = "provider")]
    backend: BackendArg,

    /// Base URL of an OpenAI-compatible gateway (http backend).
    #[arg(long, global = true, env = "CVMATCH_API_BASE")]
    api_base: Option<String>,

    /// Bearer token for the gateway (http backend).
    #[arg(long, global = true, env = "CVMATCH_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Directory holding <template>.json prompt overrides.
    #[arg(long, global = true, env = "CVMATCH_PROMPT_DIR")]
    prompt_dir: Option<PathBuf>,

    /// libpdfium file or the directory containing it.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Max output tokens per model call.
    #[arg(long, global = true, env = "CVMATCH_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Fail instead of returning the raw response when a reply has no message content.
    #[arg(long, global = true, env = "CVMATCH_STRICT")]
    strict: bool,

    /// Print single-line JSON.
    #[arg(long, global = true)]
    compact: bool,

    /// Disable the spinner.
    #[arg(long, global = true, env = "CVMATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CVMATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, global = true, env = "CVMATCH_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a PDF résumé and structure it as JSON.
    Structure {
        /// Résumé PDF.
        pdf: PathBuf,
    },
    /// Print the text extracted from a PDF, without calling a model.
    Extract {
        /// Résumé PDF.
        pdf: PathBuf,
    },
    /// Compare a résumé with a job description.
    Compare {
        #[command(flatten)]
        inputs: ResumeJobArgs,
    },
    /// Draft a cover letter for a résumé and job description.
    CoverLetter {
        #[command(flatten)]
        inputs: ResumeJobArgs,
    },
    /// Structure a résumé, compare it with the job, then draft a cover letter.
    Run {
        /// Résumé PDF.
        pdf: PathBuf,
        #[command(flatten)]
        job: JobArgs,
    },
    /// Structure many résumés concurrently.
    Batch {
        /// Résumé PDFs.
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,
        /// Résumés processed at once.
        #[arg(short, long, env = "CVMATCH_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,
    },
    /// Print the tool catalogue (names, descriptions, JSON-schema parameters).
    Tools,
    /// Execute a JSON tool call, e.g. one decided by an agent. `-` reads stdin.
    Call {
        /// Tool call JSON, or `-` for stdin.
        call: String,
    },
}

#[derive(Args, Debug)]
struct ResumeJobArgs {
    /// Résumé: a .pdf (text is extracted), a .json (structured), or plain text.
    #[arg(long)]
    resume: PathBuf,
    #[command(flatten)]
    job: JobArgs,
    /// Prompt template to use instead of the task default.
    #[arg(long)]
    prompt: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct JobArgs {
    /// Job description text.
    #[arg(long)]
    job: Option<String>,
    /// File containing the job description.
    #[arg(long)]
    job_file: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Provider,
    Http,
}

impl From<BackendArg> for Backend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Provider => Backend::Provider,
            BackendArg::Http => Backend::Http,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before parsing so clap's `env =` fallbacks see the files.
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let tools = ResumeTools::new(&config);
    let progress = Progress::new(show_progress);

    let output: Value = match &cli.command {
        Command::Structure { pdf } => {
            let result = progress
                .run("Structuring résumé…", tools.structure_resume(pdf))
                .await
                .context("Failed to structure résumé")?;
            Value::Object(result)
        }
        Command::Extract { pdf } => {
            let text = extract_text(pdf, config.pdfium_lib_path.as_deref())
                .await
                .context("Failed to extract PDF text")?;
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            if !text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
            return Ok(());
        }
        Command::Compare { inputs } => {
            let call = resume_job_call(&config, inputs, true).await?;
            let result = progress
                .run("Comparing résumé with job…", tools.dispatch(&call))
                .await
                .context("Comparison failed")?;
            Value::Object(result)
        }
        Command::CoverLetter { inputs } => {
            let call = resume_job_call(&config, inputs, false).await?;
            let result = progress
                .run("Drafting cover letter…", tools.dispatch(&call))
                .await
                .context("Cover letter failed")?;
            Value::Object(result)
        }
        Command::Run { pdf, job } => {
            let job = read_job(job).await?;
            let resume = progress
                .run("Structuring résumé…", tools.structure_resume(pdf))
                .await
                .context("Failed to structure résumé")?;
            let resume_input = ResumeInput::from(resume.clone());
            let comparison = progress
                .run(
                    "Comparing résumé with job…",
                    tools.compare_resume_to_job(&resume_input, &job, None),
                )
                .await
                .context("Comparison failed")?;
            let letter = progress
                .run(
                    "Drafting cover letter…",
                    tools.draft_cover_letter(&resume_input, &job, None),
                )
                .await
                .context("Cover letter failed")?;
            json!({
                "resume": resume,
                "comparison": comparison,
                "cover_letter": letter,
            })
        }
        Command::Batch { pdfs, concurrency } => {
            let mut batch_config = config.clone();
            batch_config.concurrency = (*concurrency).max(1);
            let tools = ResumeTools::new(&batch_config);
            let items = progress
                .run(
                    &format!("Structuring {} résumés…", pdfs.len()),
                    tools.structure_many(pdfs),
                )
                .await;
            let failed = items.iter().filter(|i| i.result.is_err()).count();
            if !cli.quiet {
                let mark = if failed == 0 { green("✔") } else { yellow("⚠") };
                eprintln!("{mark} {}/{} résumés structured", items.len() - failed, items.len());
            }
            Value::Array(
                items
                    .into_iter()
                    .map(|item| match item.result {
                        Ok(result) => json!({"file": item.path, "result": result}),
                        Err(e) => json!({"file": item.path, "error": e.to_string()}),
                    })
                    .collect(),
            )
        }
        Command::Tools => serde_json::to_value(tool_specs()).context("Failed to serialise tools")?,
        Command::Call { call } => {
            let raw = if call == "-" {
                let mut buf = String::new();
                io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read tool call from stdin")?;
                buf
            } else {
                call.clone()
            };
            let call: ToolCall = serde_json::from_str(&raw).context("Invalid tool call JSON")?;
            let result = progress
                .run(&format!("Running {}…", call.name()), tools.dispatch(&call))
                .await
                .with_context(|| format!("Tool '{}' failed", call.name()))?;
            Value::Object(result)
        }
    };

    print_json(&output, cli.compact)?;

    if !cli.quiet {
        if let Value::Object(ref map) = output {
            if map.contains_key(cvmatch::LLM_OUTPUT_KEY) {
                eprintln!(
                    "{} {}",
                    yellow("⚠"),
                    dim("model reply was not JSON; raw text is under \"llm_output\"")
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `MatchConfig`.
fn build_config(cli: &Cli) -> Result<MatchConfig> {
    let mut env = ModelEnv::from_env();
    if let Some(ref model) = cli.model {
        if !model.is_empty() {
            env.model_override = Some(model.clone());
        }
    }

    let mut builder = MatchConfig::builder()
        .backend(cli.backend.into())
        .strict_reply(cli.strict)
        .env(env);

    if let Some(ref base) = cli.api_base {
        builder = builder.api_base(base.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref dir) = cli.prompt_dir {
        builder = builder.prompt_dir(dir.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }

    builder.build().context("Invalid configuration")
}

/// Build the compare / cover-letter tool call from CLI inputs.
async fn resume_job_call(
    config: &MatchConfig,
    inputs: &ResumeJobArgs,
    compare: bool,
) -> Result<ToolCall> {
    let resume = load_resume(&inputs.resume, config).await?;
    let job_description = read_job(&inputs.job).await?;
    let prompt_name = inputs.prompt.clone();
    Ok(if compare {
        ToolCall::CompareResume {
            resume,
            job_description,
            model: None,
            prompt_name,
        }
    } else {
        ToolCall::DraftCoverLetter {
            resume,
            job_description,
            model: None,
            prompt_name,
        }
    })
}

/// `.pdf` → extracted text, `.json` → structured, anything else → text.
async fn load_resume(path: &Path, config: &MatchConfig) -> Result<ResumeInput> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("pdf") => {
            let text = extract_text(path, config.pdfium_lib_path.as_deref())
                .await
                .with_context(|| format!("Failed to extract {}", path.display()))?;
            Ok(ResumeInput::Text(text))
        }
        Some("json") => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            Ok(ResumeInput::from(value))
        }
        _ => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(ResumeInput::Text(text))
        }
    }
}

async fn read_job(job: &JobArgs) -> Result<String> {
    match (&job.job, &job.job_file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job description from {:?}", path)),
        (None, None) => anyhow::bail!("Provide --job or --job-file"),
    }
}

fn print_json(value: &Value, compact: bool) -> Result<()> {
    let text = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
    .context("Failed to serialise output")?;
    println!("{text}");
    Ok(())
}

// ── Spinner ──────────────────────────────────────────────────────────────────

/// A spinner on stderr while a model call is in flight.
struct Progress {
    enabled: bool,
}

impl Progress {
    fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    async fn run<F: Future>(&self, message: &str, fut: F) -> F::Output {
        if !self.enabled {
            return fut.await;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        let out = fut.await;
        bar.finish_and_clear();
        out
    }
}
