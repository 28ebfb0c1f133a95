//! Prompt templates for the three résumé tasks.
//!
//! A template is a named list of role-tagged message bodies containing
//! `{identifier}` placeholders. [`PromptLibrary::get`] looks a template up by
//! name, preferring `<prompt_dir>/<name>.json` over the built-in defaults, and
//! [`PromptTemplate::render_messages`] substitutes the caller's values.
//!
//! Substitution is single-pass over the template text: braces inside the
//! substituted values (a résumé serialized as JSON, say) are never
//! re-interpreted. Only `{identifier}` tokens are placeholders, so literal
//! JSON examples such as `{"name": "..."}` inside a template are left alone.

use crate::error::CvMatchError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Template used to turn extracted résumé text into JSON.
pub const RESUME_TO_DICT: &str = "resume_to_dict";

/// Template used to compare a résumé with a job description.
pub const COMPARE_CV_TO_JOB: &str = "compare_cv_to_job";

/// Template used to draft a cover letter.
pub const COVER_LETTER: &str = "cover_letter";

/// Speaker of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A named, unrendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub name: String,
    pub messages: Vec<Message>,
}

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Template names are bare file stems: no separators, no `..`, never absolute.
static RE_TEMPLATE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

impl PromptTemplate {
    /// Render every message, replacing `{key}` with the matching value.
    ///
    /// A placeholder with no value is an error; unused values are ignored.
    pub fn render_messages(
        &self,
        substitutions: &[(&str, &str)],
    ) -> Result<Vec<Message>, CvMatchError> {
        self.messages
            .iter()
            .map(|m| {
                Ok(Message {
                    role: m.role,
                    content: self.substitute(&m.content, substitutions)?,
                })
            })
            .collect()
    }

    fn substitute(&self, text: &str, substitutions: &[(&str, &str)]) -> Result<String, CvMatchError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in RE_PLACEHOLDER.captures_iter(text) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let key = key.as_str();
            let value = substitutions
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .ok_or_else(|| CvMatchError::MissingSubstitution {
                    template: self.name.clone(),
                    key: key.to_string(),
                })?;
            out.push_str(&text[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

/// Template lookup by name: override directory first, then built-ins.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
}

impl PromptLibrary {
    /// Library with only the built-in templates.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Library that checks `dir/<name>.json` before the built-ins.
    pub fn with_override_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(dir.into()),
        }
    }

    /// Look up a template by name.
    ///
    /// Names must match `[A-Za-z0-9_-]+`; anything else (a path, `..`) is
    /// reported as [`CvMatchError::TemplateNotFound`] without touching the disk.
    pub fn get(&self, name: &str) -> Result<PromptTemplate, CvMatchError> {
        if !RE_TEMPLATE_NAME.is_match(name) {
            warn!("Rejected prompt template name {:?}", name);
            return Err(CvMatchError::TemplateNotFound {
                name: name.to_string(),
            });
        }
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{name}.json"));
            if path.is_file() {
                debug!("Loading prompt '{}' from {}", name, path.display());
                return load_template(name, &path);
            }
        }
        builtin(name).ok_or_else(|| CvMatchError::TemplateNotFound {
            name: name.to_string(),
        })
    }
}

fn load_template(name: &str, path: &Path) -> Result<PromptTemplate, CvMatchError> {
    let invalid = |detail: String| CvMatchError::InvalidTemplate {
        name: name.to_string(),
        detail,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| invalid(format!("{}: {e}", path.display())))?;
    let mut template: PromptTemplate =
        serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
    if template.messages.is_empty() {
        return Err(invalid("template has no messages".into()));
    }
    template.name = name.to_string();
    Ok(template)
}

fn builtin(name: &str) -> Option<PromptTemplate> {
    let (system, user) = match name {
        RESUME_TO_DICT => (RESUME_TO_DICT_SYSTEM, RESUME_TO_DICT_USER),
        COMPARE_CV_TO_JOB => (COMPARE_SYSTEM, COMPARE_USER),
        COVER_LETTER => (COVER_LETTER_SYSTEM, COVER_LETTER_USER),
        _ => return None,
    };
    Some(PromptTemplate {
        name: name.to_string(),
        messages: vec![Message::system(system), Message::user(user)],
    })
}

const RESUME_TO_DICT_SYSTEM: &str = r#"You are a precise résumé parser. Convert the résumé text you are given into a single JSON object.

Use these top-level keys (omit a key only if the résumé has nothing for it):
- "name": full name
- "contact": object with "email", "phone", "location", "links" (array of URLs)
- "summary": short professional summary
- "skills": array of strings
- "experience": array of objects with "title", "company", "start", "end", "highlights" (array of strings)
- "education": array of objects with "degree", "institution", "start", "end"
- "certifications": array of strings
- "languages": array of strings

Rules:
- Copy facts exactly; never invent employers, dates or skills.
- Keep dates as written in the résumé.
- Output ONLY the JSON object, with no commentary and no Markdown fences."#;

const RESUME_TO_DICT_USER: &str = "Résumé text:\n\n{resume_text}";

const COMPARE_SYSTEM: &str = r#"You are an experienced technical recruiter. Compare a candidate's résumé with a job description and answer with a single JSON object using these keys:
- "match_score": integer 0-100
- "matching_skills": array of strings found in both
- "missing_skills": array of strings the job asks for but the résumé lacks
- "strengths": array of short sentences
- "gaps": array of short sentences
- "recommendations": array of concrete résumé edits

Base every statement on the two documents only. Output ONLY the JSON object."#;

const COMPARE_USER: &str =
    "Résumé (plain text or JSON):\n\n{resume_input}\n\nJob description:\n\n{job_description}";

const COVER_LETTER_SYSTEM: &str = r#"You write concise, specific cover letters. Using the candidate's résumé and the job description, draft a cover letter of at most four paragraphs that links the candidate's real experience to the role.

Answer with a single JSON object using these keys:
- "subject": a one-line subject for the application email
- "cover_letter": the full letter text, paragraphs separated by blank lines
- "highlights": array of the résumé facts the letter relies on

Never invent experience. Output ONLY the JSON object."#;

const COVER_LETTER_USER: &str =
    "Résumé (plain text or JSON):\n\n{resume_input}\n\nJob description:\n\n{job_description}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_exist_for_every_task() {
        let lib = PromptLibrary::builtin();
        for name in [RESUME_TO_DICT, COMPARE_CV_TO_JOB, COVER_LETTER] {
            let t = lib.get(name).expect("built-in template");
            assert_eq!(t.name, name);
            assert_eq!(t.messages[0].role, Role::System);
        }
    }

    #[test]
    fn unknown_template_is_an_error() {
        let err = PromptLibrary::builtin().get("haiku").unwrap_err();
        assert!(matches!(err, CvMatchError::TemplateNotFound { ref name } if name == "haiku"));
    }

    #[test]
    fn render_substitutes_and_keeps_literal_json() {
        let t = PromptTemplate {
            name: "t".into(),
            messages: vec![Message::user(r#"Like {"name": "x"} for {who}"#)],
        };
        let msgs = t.render_messages(&[("who", "Aksh")]).unwrap();
        assert_eq!(msgs[0].content, r#"Like {"name": "x"} for Aksh"#);
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let t = PromptTemplate {
            name: "t".into(),
            messages: vec![Message::user("{a}")],
        };
        let msgs = t.render_messages(&[("a", "{b}")]).unwrap();
        assert_eq!(msgs[0].content, "{b}");
    }

    #[test]
    fn missing_value_is_reported() {
        let lib = PromptLibrary::builtin();
        let t = lib.get(COMPARE_CV_TO_JOB).unwrap();
        let err = t.render_messages(&[("resume_input", "cv")]).unwrap_err();
        assert!(
            matches!(err, CvMatchError::MissingSubstitution { ref key, .. } if key == "job_description")
        );
    }

    #[test]
    fn override_dir_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cover_letter.json"),
            r#"{"messages": [{"role": "user", "content": "Write for {job_description}"}]}"#,
        )
        .unwrap();
        let lib = PromptLibrary::with_override_dir(dir.path());

        let t = lib.get(COVER_LETTER).unwrap();
        assert_eq!(t.name, COVER_LETTER);
        assert_eq!(t.messages.len(), 1);
        // Names without an override still resolve to built-ins.
        assert_eq!(lib.get(RESUME_TO_DICT).unwrap().messages.len(), 2);
    }

    #[test]
    fn path_like_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let lib = PromptLibrary::with_override_dir(dir.path());
        for name in ["../cover_letter", "/etc/creds", "a/b", "..", "", "cover letter"] {
            let err = lib.get(name).unwrap_err();
            assert!(
                matches!(err, CvMatchError::TemplateNotFound { .. }),
                "name {name:?} gave {err:?}"
            );
        }
        assert!(lib.get("my-compare_v2").is_err());
    }

    #[test]
    fn malformed_override_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("resume_to_dict.json"), "not json").unwrap();
        let err = PromptLibrary::with_override_dir(dir.path())
            .get(RESUME_TO_DICT)
            .unwrap_err();
        assert!(matches!(err, CvMatchError::InvalidTemplate { .. }));
    }
}
