//! # cvmatch
//!
//! Structure PDF résumés, compare them with job descriptions, and draft cover
//! letters with large language models.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF résumé
//!  │
//!  ├─ 1. Extract    page text via pdfium, blank pages dropped
//!  ├─ 2. Prompt     named template rendered with the task inputs
//!  ├─ 3. Invoke     one zero-temperature call (provider or HTTP backend)
//!  ├─ 4. Normalize  reply → JSON object; raw text under `llm_output` if needed
//!  └─ 5. Diagnose   on fallback, attach the inputs under `_`-prefixed keys
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cvmatch::{MatchConfig, ResumeInput, ResumeTools};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Model from CVMATCH_MODEL, else Mistral if MISTRAL_API_KEY is set, else gpt-4o-mini
//!     let tools = ResumeTools::new(&MatchConfig::from_env());
//!
//!     let resume = tools.structure_resume("CV.pdf").await?;
//!     let job = "AI Engineer with 5 years of experience in scalable web applications.";
//!     let fit = tools
//!         .compare_resume_to_job(&ResumeInput::from(resume), job, None)
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&fit)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cvmatch` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Choosing a Model
//!
//! Model identifiers use `provider/model` form (`mistral/mistral-small-latest`,
//! `anthropic/claude-3-5-haiku-latest`); a bare identifier goes to OpenAI.
//! With the `http` backend the identifier is sent unchanged to the gateway.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod tasks;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Backend, MatchConfig, MatchConfigBuilder, ModelEnv};
pub use error::{ClientLoadError, CvMatchError};
pub use pipeline::extract::{extract_text, extract_text_from_bytes};
pub use pipeline::llm::{CompletionRequest, CompletionService, ModelInvoker};
pub use pipeline::normalize::{normalize, NormalizedResult, LLM_OUTPUT_KEY};
pub use prompts::{Message, PromptLibrary, PromptTemplate, Role};
pub use tasks::{BatchItem, ResumeInput, ResumeTools};
pub use tools::{tool_specs, ToolCall, ToolSpec};
