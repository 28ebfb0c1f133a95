//! Tool surface for an external agent loop.
//!
//! An agent framework decides *which* task to run and in what order; this
//! module only describes the three tasks ([`tool_specs`]) and executes a
//! decided call ([`ResumeTools::dispatch`]). Calls arrive as JSON:
//!
//! ```json
//! {"tool": "compare_resume", "arguments": {"resume": {...}, "job_description": "..."}}
//! ```

use crate::error::CvMatchError;
use crate::pipeline::normalize::NormalizedResult;
use crate::prompts::{COMPARE_CV_TO_JOB, COVER_LETTER};
use crate::tasks::{ResumeInput, ResumeTools};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// A decided tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    /// Extract a PDF résumé and structure it as JSON.
    StructureResume { file_path: String },
    /// Compare a résumé (text or JSON) with a job description.
    CompareResume {
        resume: ResumeInput,
        job_description: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        prompt_name: Option<String>,
    },
    /// Draft a cover letter for a résumé and job description.
    DraftCoverLetter {
        resume: ResumeInput,
        job_description: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        prompt_name: Option<String>,
    },
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::StructureResume { .. } => "structure_resume",
            ToolCall::CompareResume { .. } => "compare_resume",
            ToolCall::DraftCoverLetter { .. } => "draft_cover_letter",
        }
    }
}

/// Name, description and JSON-schema parameters of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Descriptions of every tool, in the order an agent would usually call them.
pub fn tool_specs() -> Vec<ToolSpec> {
    let resume_vs_job = json!({
        "type": "object",
        "properties": {
            "resume": {
                "description": "Résumé as plain text or as the JSON object returned by structure_resume",
                "anyOf": [{"type": "string"}, {"type": "object"}]
            },
            "job_description": {"type": "string"},
            "model": {"type": "string", "description": "Optional model identifier, e.g. mistral/mistral-small-latest"},
            "prompt_name": {"type": "string", "description": "Optional prompt template override"}
        },
        "required": ["resume", "job_description"]
    });

    vec![
        ToolSpec {
            name: "structure_resume",
            description: "Extracts text from a PDF résumé and converts it into a JSON object. \
                Returns the parsed JSON, or {llm_output, _resume_text} when the model reply was not JSON.",
            parameters: json!({
                "type": "object",
                "properties": {"file_path": {"type": "string", "description": "Path to the PDF file"}},
                "required": ["file_path"]
            }),
        },
        ToolSpec {
            name: "compare_resume",
            description: "Compares résumé content with a job description. \
                Returns match score, matching and missing skills, strengths, gaps and recommendations.",
            parameters: resume_vs_job.clone(),
        },
        ToolSpec {
            name: "draft_cover_letter",
            description: "Drafts a cover letter tailored to the job description from the résumé content.",
            parameters: resume_vs_job,
        },
    ]
}

impl ResumeTools {
    /// Execute a tool call decided by an external agent.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<NormalizedResult, CvMatchError> {
        info!("Dispatching tool '{}'", call.name());
        match call {
            ToolCall::StructureResume { file_path } => self.structure_resume(file_path).await,
            ToolCall::CompareResume {
                resume,
                job_description,
                model,
                prompt_name,
            } => {
                let template = prompt_name.as_deref().unwrap_or(COMPARE_CV_TO_JOB);
                self.resume_vs_job(template, resume, job_description, model.as_deref())
                    .await
            }
            ToolCall::DraftCoverLetter {
                resume,
                job_description,
                model,
                prompt_name,
            } => {
                let template = prompt_name.as_deref().unwrap_or(COVER_LETTER);
                self.resume_vs_job(template, resume, job_description, model.as_deref())
                    .await
            }
        }
    }

    /// Parse a JSON tool call and execute it.
    pub async fn dispatch_json(&self, call: &Value) -> Result<NormalizedResult, CvMatchError> {
        let call: ToolCall = serde_json::from_value(call.clone())
            .map_err(|e| CvMatchError::InvalidToolCall(e.to_string()))?;
        self.dispatch(&call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_cover_every_call() {
        let names: Vec<&str> = tool_specs().iter().map(|s| s.name).collect();
        assert_eq!(names, ["structure_resume", "compare_resume", "draft_cover_letter"]);
    }

    #[test]
    fn tool_call_parses_from_agent_json() {
        let call: ToolCall = serde_json::from_value(json!({
            "tool": "compare_resume",
            "arguments": {"resume": {"name": "Aksh"}, "job_description": "AI Engineer"}
        }))
        .unwrap();
        match call {
            ToolCall::CompareResume {
                resume,
                job_description,
                model,
                prompt_name,
            } => {
                assert!(matches!(resume, ResumeInput::Structured(_)));
                assert_eq!(job_description, "AI Engineer");
                assert!(model.is_none() && prompt_name.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let parsed = serde_json::from_value::<ToolCall>(json!({"tool": "delete_everything", "arguments": {}}));
        assert!(parsed.is_err());
    }
}
