//! PDF text extraction via pdfium.
//!
//! The input path is validated before pdfium is touched (existence, regular
//! file, read permission, `%PDF` magic bytes) so callers get a precise error
//! instead of a generic parse failure. Extraction itself runs in `spawn_blocking` because
//! pdfium is a blocking C library.
//!
//! Pages whose text layer is blank are skipped; the remaining page texts are
//! joined with a blank line. A PDF with no text at all (a scanned image, for
//! instance) yields an empty string, not an error.

use crate::error::CvMatchError;
use pdfium_render::prelude::*;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Separator placed between the texts of consecutive non-blank pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Join per-page texts: blank pages dropped, rest joined by a blank line, trimmed.
///
/// `None` stands for a page that produced no text layer at all.
pub fn join_page_texts<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let parts: Vec<S> = pages
        .into_iter()
        .flatten()
        .filter(|text| !text.as_ref().trim().is_empty())
        .collect();
    let joined = parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);
    joined.trim().to_string()
}

/// Extract the readable text of a PDF file.
///
/// `pdfium_lib` is an explicit pdfium library file or the directory holding
/// it; `None` binds the system library.
pub async fn extract_text(path: &Path, pdfium_lib: Option<&Path>) -> Result<String, CvMatchError> {
    validate_pdf(path)?;

    let path = path.to_path_buf();
    let lib = pdfium_lib.map(Path::to_path_buf);
    tokio::task::spawn_blocking(move || extract_text_blocking(&path, lib.as_deref()))
        .await
        .map_err(|e| CvMatchError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Extract the readable text of an in-memory PDF.
///
/// pdfium reads from a managed temp file that is deleted on return.
pub async fn extract_text_from_bytes(
    bytes: &[u8],
    pdfium_lib: Option<&Path>,
) -> Result<String, CvMatchError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| CvMatchError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| CvMatchError::Internal(format!("tempfile write: {e}")))?;
    tmp.flush()
        .map_err(|e| CvMatchError::Internal(format!("tempfile flush: {e}")))?;
    // `tmp` lives until extraction has finished
    extract_text(tmp.path(), pdfium_lib).await
}

/// Check the path exists, is readable, and starts with the PDF magic bytes.
pub fn validate_pdf(path: &Path) -> Result<(), CvMatchError> {
    if !path.exists() {
        return Err(CvMatchError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(CvMatchError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic != b"%PDF" => {
                    return Err(CvMatchError::NotAPdf {
                        path: path.to_path_buf(),
                        magic,
                    });
                }
                Ok(()) => {}
                Err(e) => {
                    return Err(CvMatchError::CorruptPdf {
                        path: path.to_path_buf(),
                        detail: format!("too short to be a PDF: {e}"),
                    });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(CvMatchError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(CvMatchError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}

fn extract_text_blocking(pdf_path: &Path, pdfium_lib: Option<&Path>) -> Result<String, CvMatchError> {
    let pdfium = bind_pdfium(pdfium_lib)?;

    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            CvMatchError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        } else {
            CvMatchError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let texts: Vec<Option<String>> = pages
        .iter()
        .enumerate()
        .map(|(idx, page)| match page.text() {
            Ok(text) => Some(text.all()),
            Err(e) => {
                warn!("Page {}: no readable text layer ({:?})", idx + 1, e);
                None
            }
        })
        .collect();

    let text = join_page_texts(texts);
    debug!("Extracted {} chars from {}", text.len(), pdf_path.display());
    Ok(text)
}

fn bind_pdfium(lib: Option<&Path>) -> Result<Pdfium, CvMatchError> {
    let bindings = match lib {
        Some(path) => {
            let file = library_file(path);
            debug!("Binding pdfium from {}", file.display());
            Pdfium::bind_to_library(file.to_string_lossy().to_string())
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| CvMatchError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Accept either the library file itself or the directory that contains it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(PLATFORM_LIB_NAME)
    } else {
        path.to_path_buf()
    }
}

#[cfg(target_os = "macos")]
const PLATFORM_LIB_NAME: &str = "libpdfium.dylib";
#[cfg(target_os = "windows")]
const PLATFORM_LIB_NAME: &str = "pdfium.dll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PLATFORM_LIB_NAME: &str = "libpdfium.so";
