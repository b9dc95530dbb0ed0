use std::fmt;

/// Extensions accepted by the image staging area
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "heic", "heif"];

/// Extensions accepted by the document staging area
pub const DOCUMENT_EXTENSIONS: &[&str] = &["docx", "txt", "md", "rtf", "odt"];

/// Extensions accepted by the redaction staging area
pub const REDACT_EXTENSIONS: &[&str] = &["pdf"];

/// Fallback used when a requested output base name sanitizes to nothing
pub const DEFAULT_BASE_NAME: &str = "Output";

const MAX_FILENAME_BYTES: usize = 255;
const MAX_BASE_NAME_CHARS: usize = 120;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Lowercased extension of `filename`, without the dot
pub fn extension_of(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// True when the extension of `filename` is in `allowed`
pub fn has_allowed_extension(filename: &str, allowed: &[&str]) -> bool {
    extension_of(filename).is_some_and(|ext| allowed.contains(&ext.as_str()))
}

fn is_reserved_char(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';'
        )
}

/// Sanitizes filename to prevent path traversal and injection attacks.
/// Keeps the extension; returns an error for names that end up empty or hidden.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    // Only the last path component survives, for both separator styles
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("").trim();

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        });
    }

    let sanitized: String = name
        .chars()
        .map(|c| if is_reserved_char(c) { '_' } else { c })
        .collect();

    // Limit length safely for UTF-8, cutting the stem so the extension survives
    let sanitized = if sanitized.len() > MAX_FILENAME_BYTES {
        let ext = sanitized
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{}", ext))
            .unwrap_or_default();
        let mut end = MAX_FILENAME_BYTES.saturating_sub(ext.len());
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{}", &sanitized[..end], ext)
    } else {
        sanitized
    };

    // Prevent hidden files
    if sanitized.starts_with('.') {
        return Err(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        });
    }

    Ok(sanitized)
}

/// Base name embedded in output artifact names. Brackets are replaced so the
/// `[<seq>]` tag stays unambiguous.
pub fn sanitize_base_name(base_name: &str) -> String {
    let cleaned: String = base_name
        .trim()
        .chars()
        .map(|c| {
            if is_reserved_char(c) || c == '[' || c == ']' {
                '_'
            } else {
                c
            }
        })
        .take(MAX_BASE_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim().to_string();

    if cleaned.is_empty() {
        DEFAULT_BASE_NAME.to_string()
    } else {
        cleaned
    }
}

/// A name addressing a file directly inside one of the service directories
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(|c| c.is_control())
}

/// Checks if file content appears to be executable
pub fn is_executable_content(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false;
    }

    // ELF binary (Linux)
    if header.starts_with(&[0x7F, 0x45, 0x4C, 0x46]) {
        return true;
    }

    // PE/COFF (Windows .exe, .dll)
    if header.starts_with(&[0x4D, 0x5A]) {
        return true;
    }

    // Mach-O (macOS)
    if header.starts_with(&[0xFE, 0xED, 0xFA, 0xCE])
        || header.starts_with(&[0xFE, 0xED, 0xFA, 0xCF])
        || header.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
        || header.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
    {
        return true;
    }

    // Shebang (shell scripts)
    if header.starts_with(b"#!") {
        return true;
    }

    false
}

/// True when the bytes carry a PDF signature
pub fn is_pdf_content(header: &[u8]) -> bool {
    infer::get(header).is_some_and(|kind| kind.mime_type() == "application/pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("dir.d/file"), None);
    }

    #[test]
    fn test_has_allowed_extension() {
        assert!(has_allowed_extension("a.jpg", IMAGE_EXTENSIONS));
        assert!(has_allowed_extension("scan.HEIC", IMAGE_EXTENSIONS));
        assert!(!has_allowed_extension("b.exe", IMAGE_EXTENSIONS));
        assert!(has_allowed_extension("notes.md", DOCUMENT_EXTENSIONS));
        assert!(!has_allowed_extension("notes.doc", DOCUMENT_EXTENSIONS));
        assert!(has_allowed_extension("contract.pdf", REDACT_EXTENSIONS));
        assert!(!has_allowed_extension("contract.pdf.exe", REDACT_EXTENSIONS));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test.pdf").unwrap(), "test.pdf");
        assert_eq!(sanitize_filename("my file.docx").unwrap(), "my file.docx");
        assert_eq!(
            sanitize_filename("test<script>.pdf").unwrap(),
            "test_script_.pdf"
        );
        assert_eq!(sanitize_filename("测试.txt").unwrap(), "测试.txt");

        // Path traversal
        assert_eq!(sanitize_filename("../../../etc/passwd").unwrap(), "passwd");
        assert_eq!(
            sanitize_filename("..\\..\\windows\\system32.png").unwrap(),
            "system32.png"
        );

        // Empty and hidden names
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("uploads/").is_err());
        assert!(sanitize_filename(".htaccess").is_err());
    }

    #[test]
    fn test_sanitize_filename_keeps_extension_when_truncating() {
        let long = format!("{}.png", "a".repeat(400));
        let sanitized = sanitize_filename(&long).unwrap();
        assert!(sanitized.len() <= 255);
        assert!(sanitized.ends_with(".png"));
    }

    #[test]
    fn test_sanitize_base_name() {
        assert_eq!(sanitize_base_name("Report"), "Report");
        assert_eq!(sanitize_base_name("  Q3 [draft] "), "Q3 _draft_");
        assert_eq!(sanitize_base_name("../../etc"), "_.._etc");
        assert_eq!(sanitize_base_name("   "), DEFAULT_BASE_NAME);
        assert_eq!(sanitize_base_name(""), DEFAULT_BASE_NAME);
    }

    #[test]
    fn test_is_plain_file_name() {
        assert!(is_plain_file_name("report[1]_2024-01-01_10-00-00.pdf"));
        assert!(!is_plain_file_name("../secret.pdf"));
        assert!(!is_plain_file_name("a\\b.pdf"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(""));
    }

    #[test]
    fn test_is_executable_content() {
        assert!(is_executable_content(&[0x7F, 0x45, 0x4C, 0x46, 0x00]));
        assert!(is_executable_content(&[0x4D, 0x5A, 0x00, 0x00]));
        assert!(is_executable_content(b"#!/bin/bash"));
        assert!(!is_executable_content(b"Hello World"));
        assert!(!is_executable_content(&[0x89, 0x50, 0x4E, 0x47])); // PNG
    }

    #[test]
    fn test_is_pdf_content() {
        assert!(is_pdf_content(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3"));
        assert!(!is_pdf_content(b"GIF89a not a pdf"));
        assert!(!is_pdf_content(b""));
    }
}
