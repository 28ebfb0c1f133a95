//! The three résumé operations.
//!
//! Every task has the same shape: render a named template, invoke the model
//! once, normalize the reply. When normalization falls back to `llm_output`,
//! the inputs are attached under underscore-prefixed keys so a caller can see
//! what the model was given. Those keys never appear on a parsed result.

use crate::config::MatchConfig;
use crate::error::CvMatchError;
use crate::pipeline::extract;
use crate::pipeline::llm::{CompletionService, ModelInvoker};
use crate::pipeline::normalize::{is_fallback, normalize, NormalizedResult};
use crate::prompts::{PromptLibrary, COMPARE_CV_TO_JOB, COVER_LETTER, RESUME_TO_DICT};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Diagnostic key for the extracted résumé text (structure task).
pub const RESUME_TEXT_KEY: &str = "_resume_text";

/// Diagnostic key for the résumé as embedded in the prompt.
pub const RESUME_INPUT_KEY: &str = "_resume_input";

/// Diagnostic key for the job description.
pub const JOB_DESCRIPTION_KEY: &str = "_job_description";

/// A résumé as handed to the comparison and cover-letter tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResumeInput {
    /// Structured résumé, e.g. the output of [`ResumeTools::structure_resume`].
    Structured(Map<String, Value>),
    /// Raw résumé text.
    Text(String),
}

impl ResumeInput {
    /// The text embedded into prompts: compact JSON for structured résumés.
    pub fn to_prompt_text(&self) -> String {
        match self {
            ResumeInput::Text(text) => text.clone(),
            // Display on a Value is compact JSON
            ResumeInput::Structured(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

impl From<String> for ResumeInput {
    fn from(text: String) -> Self {
        ResumeInput::Text(text)
    }
}

impl From<&str> for ResumeInput {
    fn from(text: &str) -> Self {
        ResumeInput::Text(text.to_string())
    }
}

impl From<Map<String, Value>> for ResumeInput {
    fn from(map: Map<String, Value>) -> Self {
        ResumeInput::Structured(map)
    }
}

impl From<Value> for ResumeInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => ResumeInput::Structured(map),
            Value::String(text) => ResumeInput::Text(text),
            other => ResumeInput::Text(other.to_string()),
        }
    }
}

/// Outcome of structuring one file in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub result: Result<NormalizedResult, CvMatchError>,
}

/// The task functions bound to one configuration.
#[derive(Clone)]
pub struct ResumeTools {
    invoker: ModelInvoker,
    prompts: PromptLibrary,
    pdfium_lib: Option<PathBuf>,
    concurrency: usize,
}

impl ResumeTools {
    /// Build the completion backend and prompt library from `config`.
    pub fn new(config: &MatchConfig) -> Self {
        Self::with_invoker(ModelInvoker::new(config), config)
    }

    /// Use a caller-supplied completion service.
    pub fn with_service(service: Arc<dyn CompletionService>, config: &MatchConfig) -> Self {
        Self::with_invoker(ModelInvoker::with_service(service, config), config)
    }

    fn with_invoker(invoker: ModelInvoker, config: &MatchConfig) -> Self {
        let prompts = match config.prompt_dir {
            Some(ref dir) => PromptLibrary::with_override_dir(dir),
            None => PromptLibrary::builtin(),
        };
        Self {
            invoker,
            prompts,
            pdfium_lib: config.pdfium_lib_path.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    pub fn invoker(&self) -> &ModelInvoker {
        &self.invoker
    }

    /// Extract a PDF résumé and have the model structure it as JSON.
    ///
    /// On fallback the result also carries `_resume_text`.
    pub async fn structure_resume(&self, file_path: impl AsRef<Path>) -> Result<NormalizedResult, CvMatchError> {
        let path = file_path.as_ref();
        info!("Structuring résumé: {}", path.display());
        let text = extract::extract_text(path, self.pdfium_lib.as_deref()).await?;
        self.structure_resume_text(&text).await
    }

    /// Same as [`structure_resume`](Self::structure_resume) for an in-memory PDF.
    pub async fn structure_resume_bytes(&self, bytes: &[u8]) -> Result<NormalizedResult, CvMatchError> {
        let text = extract::extract_text_from_bytes(bytes, self.pdfium_lib.as_deref()).await?;
        self.structure_resume_text(&text).await
    }

    /// Structure résumé text that has already been extracted.
    pub async fn structure_resume_text(&self, resume_text: &str) -> Result<NormalizedResult, CvMatchError> {
        self.run(
            RESUME_TO_DICT,
            &[("resume_text", resume_text)],
            None,
            &[(RESUME_TEXT_KEY, resume_text)],
        )
        .await
    }

    /// Compare a résumé with a job description.
    ///
    /// On fallback the result also carries `_resume_input` and `_job_description`.
    pub async fn compare_resume_to_job(
        &self,
        resume: &ResumeInput,
        job_description: &str,
        model_hint: Option<&str>,
    ) -> Result<NormalizedResult, CvMatchError> {
        self.resume_vs_job(COMPARE_CV_TO_JOB, resume, job_description, model_hint)
            .await
    }

    /// Draft a cover letter for a résumé and job description.
    pub async fn draft_cover_letter(
        &self,
        resume: &ResumeInput,
        job_description: &str,
        model_hint: Option<&str>,
    ) -> Result<NormalizedResult, CvMatchError> {
        self.resume_vs_job(COVER_LETTER, resume, job_description, model_hint)
            .await
    }

    /// Run a résumé-plus-job template by name, for callers with their own
    /// comparison or letter prompts. The template receives `resume_input` and
    /// `job_description`.
    pub async fn resume_vs_job(
        &self,
        template: &str,
        resume: &ResumeInput,
        job_description: &str,
        model_hint: Option<&str>,
    ) -> Result<NormalizedResult, CvMatchError> {
        let resume_input = resume.to_prompt_text();
        self.run(
            template,
            &[
                ("resume_input", resume_input.as_str()),
                ("job_description", job_description),
            ],
            model_hint,
            &[
                (RESUME_INPUT_KEY, resume_input.as_str()),
                (JOB_DESCRIPTION_KEY, job_description),
            ],
        )
        .await
    }

    /// Structure many résumés, at most `concurrency` at a time.
    ///
    /// Each file is independent: one failure does not stop the others.
    /// Results come back in input order.
    pub async fn structure_many(&self, paths: &[PathBuf]) -> Vec<BatchItem> {
        info!(
            "Structuring {} résumés, {} at a time",
            paths.len(),
            self.concurrency
        );
        let mut items: Vec<(usize, BatchItem)> = stream::iter(paths.iter().cloned().enumerate())
            .map(|(idx, path)| async move {
                let result = self.structure_resume(&path).await;
                if let Err(ref e) = result {
                    warn!("{}: {}", path.display(), e);
                }
                (idx, BatchItem { path, result })
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        items.sort_by_key(|(idx, _)| *idx);
        items.into_iter().map(|(_, item)| item).collect()
    }

    async fn run(
        &self,
        template: &str,
        substitutions: &[(&str, &str)],
        model_hint: Option<&str>,
        diagnostics: &[(&str, &str)],
    ) -> Result<NormalizedResult, CvMatchError> {
        let start = Instant::now();
        let messages = self.prompts.get(template)?.render_messages(substitutions)?;
        let reply = self.invoker.invoke(&messages, model_hint).await?;
        let mut result = normalize(&reply);

        if is_fallback(&result) {
            warn!(
                "'{}': reply held no JSON ({} chars); returning raw output",
                template,
                reply.len()
            );
            for (key, value) in diagnostics {
                result.insert(key.to_string(), Value::String(value.to_string()));
            }
        }

        info!(
            "'{}' finished in {}ms ({} keys)",
            template,
            start.elapsed().as_millis(),
            result.len()
        );
        Ok(result)
    }
}

// ── Blocking wrappers ────────────────────────────────────────────────────

fn block_on<F: Future>(fut: F) -> Result<F::Output, CvMatchError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CvMatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
    Ok(runtime.block_on(fut))
}

impl ResumeTools {
    /// Synchronous [`structure_resume`](Self::structure_resume).
    ///
    /// Creates a temporary tokio runtime; do not call from async code.
    pub fn structure_resume_blocking(&self, file_path: impl AsRef<Path>) -> Result<NormalizedResult, CvMatchError> {
        block_on(self.structure_resume(file_path))?
    }

    /// Synchronous [`compare_resume_to_job`](Self::compare_resume_to_job).
    pub fn compare_resume_to_job_blocking(
        &self,
        resume: &ResumeInput,
        job_description: &str,
        model_hint: Option<&str>,
    ) -> Result<NormalizedResult, CvMatchError> {
        block_on(self.compare_resume_to_job(resume, job_description, model_hint))?
    }

    /// Synchronous [`draft_cover_letter`](Self::draft_cover_letter).
    pub fn draft_cover_letter_blocking(
        &self,
        resume: &ResumeInput,
        job_description: &str,
        model_hint: Option<&str>,
    ) -> Result<NormalizedResult, CvMatchError> {
        block_on(self.draft_cover_letter(resume, job_description, model_hint))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_resume_is_compact_json() {
        let map = json!({"name": "Aksh", "skills": ["rust", "ml"]})
            .as_object()
            .cloned()
            .unwrap();
        let input = ResumeInput::from(map);
        assert_eq!(
            input.to_prompt_text(),
            r#"{"name":"Aksh","skills":["rust","ml"]}"#
        );
    }

    #[test]
    fn non_ascii_is_not_escaped() {
        let input = ResumeInput::from(json!({"name": "Zoë"}));
        assert_eq!(input.to_prompt_text(), r#"{"name":"Zoë"}"#);
    }

    #[test]
    fn text_resume_is_passed_through() {
        let input = ResumeInput::from("Five years of Rust");
        assert_eq!(input.to_prompt_text(), "Five years of Rust");
    }

    #[test]
    fn resume_input_deserializes_untagged() {
        let text: ResumeInput = serde_json::from_value(json!("plain text")).unwrap();
        assert_eq!(text, ResumeInput::Text("plain text".into()));
        let structured: ResumeInput = serde_json::from_value(json!({"name": "A"})).unwrap();
        assert!(matches!(structured, ResumeInput::Structured(_)));
    }

    #[test]
    fn non_object_values_become_text() {
        assert_eq!(
            ResumeInput::from(json!(["a", "b"])),
            ResumeInput::Text(r#"["a","b"]"#.into())
        );
    }
}
