//! Pipeline stages shared by every résumé task.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ prompts ──▶ llm ──▶ normalize ──▶ diagnostics
//! (pdfium)    (render)    (call)  (JSON-ish)    (tasks.rs)
//! ```
//!
//! 1. [`extract`]: readable text from a PDF, blank pages dropped
//! 2. [`crate::prompts`]: named template rendered into role-tagged messages
//! 3. [`llm`]: model resolution and a single zero-temperature call; the only
//!    stage with network I/O
//! 4. [`normalize`]: reply text to a JSON object, never failing

pub mod extract;
pub mod llm;
pub mod normalize;
