//! Error types for the cvmatch library.
//!
//! Only *hard* failures live here: a missing or corrupt PDF, an unknown prompt
//! template, a completion client that could not be loaded, or a provider call
//! that failed. *Soft* failures never become errors. A reply without the
//! expected envelope field is stringified, and a reply that holds no JSON is
//! wrapped under `llm_output` by [`crate::pipeline::normalize`], so callers
//! always receive a result object to branch on.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// All fatal errors returned by the cvmatch library.
#[derive(Debug, Error)]
pub enum CvMatchError {
    // ── Document errors ───────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The path exists but is a directory or other non-regular file.
    #[error("'{path}' is not a regular file\nPass the path of a PDF file, not a directory.")]
    NotAFile { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF is encrypted; résumé extraction does not take passwords.
    #[error("PDF '{path}' is encrypted and cannot be read without a password.")]
    PasswordRequired { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or point PDFIUM_LIB_PATH at the\n\
directory (or file) that contains it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Prompt errors ─────────────────────────────────────────────────────
    /// No built-in or override template is registered under this name.
    #[error("Prompt template '{name}' not found")]
    TemplateNotFound { name: String },

    /// An override template file exists but could not be read or parsed.
    #[error("Prompt template '{name}' is invalid: {detail}")]
    InvalidTemplate { name: String, detail: String },

    /// The template references a placeholder the caller did not supply.
    #[error("Prompt template '{template}' needs a value for '{{{key}}}'")]
    MissingSubstitution { template: String, key: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The completion client could not be constructed when the invoker was
    /// built. Reported on first use so unrelated operations keep working.
    #[error("Completion client '{backend}' is unavailable: {source}")]
    DependencyMissing {
        backend: String,
        #[source]
        source: Arc<ClientLoadError>,
    },

    /// The provider named by the model identifier could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Transport, authentication or provider-side failure. Never retried.
    #[error("Model call to '{model}' failed: {message}")]
    ModelInvocation { model: String, message: String },

    /// The reply envelope had no `choices[0].message.content` and strict
    /// reply handling is enabled.
    #[error("Reply from '{model}' has no choices[0].message.content")]
    UnexpectedReplyShape { model: String },

    // ── Tool errors ───────────────────────────────────────────────────────
    /// A tool call from an agent did not match any known tool signature.
    #[error("Invalid tool call: {0}")]
    InvalidToolCall(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a completion client could not be constructed.
#[derive(Debug, Error)]
pub enum ClientLoadError {
    /// The http backend was selected without a base URL.
    #[error("no API base URL configured (set CVMATCH_API_BASE or --api-base)")]
    MissingApiBase,

    /// reqwest could not build its client (TLS backend, resolver, ...).
    #[error("HTTP client initialisation failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn missing_substitution_display() {
        let e = CvMatchError::MissingSubstitution {
            template: "cover_letter".into(),
            key: "job_description".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("cover_letter"), "got: {msg}");
        assert!(msg.contains("{job_description}"), "got: {msg}");
    }

    #[test]
    fn dependency_missing_keeps_cause() {
        let e = CvMatchError::DependencyMissing {
            backend: "http".into(),
            source: Arc::new(ClientLoadError::MissingApiBase),
        };
        assert!(e.to_string().contains("http"));
        let cause = e.source().expect("source must be attached");
        assert!(cause.to_string().contains("CVMATCH_API_BASE"));
    }

    #[test]
    fn model_invocation_display() {
        let e = CvMatchError::ModelInvocation {
            model: "gpt-4o-mini".into(),
            message: "401 Unauthorized".into(),
        };
        assert!(e.to_string().contains("gpt-4o-mini"));
        assert!(e.to_string().contains("401"));
    }

    #[test]
    fn not_a_pdf_display_shows_magic() {
        let e = CvMatchError::NotAPdf {
            path: PathBuf::from("cv.docx"),
            magic: *b"PK\x03\x04",
        };
        assert!(e.to_string().contains("cv.docx"));
    }
}
