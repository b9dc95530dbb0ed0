//! Paragraph extraction for the supported document formats.

use crate::services::error::ServiceError;
use crate::services::pdf::metrics::decode_win_ansi;
use crate::utils::validation::extension_of;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Docx,
    Odt,
    Text,
    Markdown,
    Rtf,
}

impl DocumentFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match extension_of(name)?.as_str() {
            "docx" => Some(Self::Docx),
            "odt" => Some(Self::Odt),
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            "rtf" => Some(Self::Rtf),
            _ => None,
        }
    }
}

/// Editor lock files (`~$name.docx`) and dotfiles are never converted.
pub fn is_skipped(name: &str) -> bool {
    name.starts_with("~$") || name.starts_with('.')
}

/// Reads `path` and returns its paragraphs in document order.
pub fn extract_paragraphs(path: &Path) -> Result<Vec<String>, ServiceError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let format = DocumentFormat::from_name(&name)
        .ok_or_else(|| ServiceError::conversion(&name, "unsupported document format"))?;
    let bytes = std::fs::read(path)?;

    let paragraphs = match format {
        DocumentFormat::Docx => zip_entry(&bytes, "word/document.xml")
            .and_then(|xml| xml_paragraphs(&xml, Dialect::Word)),
        DocumentFormat::Odt => zip_entry(&bytes, "content.xml")
            .and_then(|xml| xml_paragraphs(&xml, Dialect::OpenDocument)),
        DocumentFormat::Text => Ok(split_lines(&decode_text(&bytes))),
        DocumentFormat::Markdown => Ok(split_lines(&markdown_to_plain(&decode_text(&bytes)))),
        DocumentFormat::Rtf => Ok(split_lines(&rtf_to_plain(&decode_text(&bytes)))),
    };

    paragraphs.map_err(|reason| ServiceError::conversion(name, reason))
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

fn zip_entry(bytes: &[u8], entry: &str) -> Result<String, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a valid archive: {}", e))?;
    let mut file = archive
        .by_name(entry)
        .map_err(|e| format!("missing {}: {}", entry, e))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| format!("unreadable {}: {}", entry, e))?;
    Ok(xml)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Word,
    OpenDocument,
}

impl Dialect {
    fn is_paragraph(&self, local: &[u8]) -> bool {
        match self {
            Dialect::Word => local == b"p",
            Dialect::OpenDocument => local == b"p" || local == b"h",
        }
    }

    /// Element whose character data is document text.
    fn is_text_run(&self, local: &[u8]) -> bool {
        match self {
            Dialect::Word => local == b"t",
            Dialect::OpenDocument => true,
        }
    }

    fn inline_char(&self, local: &[u8]) -> Option<char> {
        match (self, local) {
            (_, b"tab") => Some('\t'),
            (Dialect::Word, b"br" | b"cr") => Some('\n'),
            (Dialect::OpenDocument, b"line-break") => Some('\n'),
            (Dialect::OpenDocument, b"s") => Some(' '),
            _ => None,
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> Vec<u8> {
    e.local_name().as_ref().to_vec()
}

fn resolve_entity(name: &[u8]) -> Option<char> {
    match name {
        b"amp" => Some('&'),
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        _ => {
            let digits = std::str::from_utf8(name.strip_prefix(b"#")?).ok()?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Walks the XML part and collects one string per paragraph element. Text
/// boxes nested inside a paragraph become paragraphs of their own.
fn xml_paragraphs(xml: &str, dialect: Dialect) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut text_depth = 0usize;
    // Word keeps tab stop definitions in paragraph properties; only tabs inside runs count
    let mut run_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let local = local_name(&e);
                if dialect.is_paragraph(&local) {
                    open.push(String::new());
                } else if local == b"r" {
                    run_depth += 1;
                } else if dialect == Dialect::Word && dialect.is_text_run(&local) {
                    text_depth += 1;
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if dialect.is_paragraph(&local) {
                    if let Some(done) = open.pop() {
                        paragraphs.push(done);
                    }
                } else if local == b"r" {
                    run_depth = run_depth.saturating_sub(1);
                } else if dialect == Dialect::Word && dialect.is_text_run(&local) {
                    text_depth = text_depth.saturating_sub(1);
                }
            }
            Ok(Event::Empty(e)) => {
                let local = local_name(&e);
                if dialect.is_paragraph(&local) {
                    paragraphs.push(String::new());
                } else if let Some(c) = dialect.inline_char(&local) {
                    let in_run = dialect == Dialect::OpenDocument || run_depth > 0;
                    if let (true, Some(current)) = (in_run, open.last_mut()) {
                        current.push(c);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = collecting(&mut open, dialect, text_depth) {
                    current.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = collecting(&mut open, dialect, text_depth) {
                    current.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(current) = collecting(&mut open, dialect, text_depth) {
                    match resolve_entity(&e) {
                        Some(c) => current.push(c),
                        None => tracing::debug!(
                            "Unknown entity &{};",
                            String::from_utf8_lossy(&e)
                        ),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => (),
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn collecting(open: &mut [String], dialect: Dialect, text_depth: usize) -> Option<&mut String> {
    let current = open.last_mut()?;
    match dialect {
        Dialect::Word if text_depth == 0 => None,
        _ => Some(current),
    }
}

static MARKDOWN_INLINE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"!\[([^\]]*)\]\([^)]*\)", "$1"),
        (r"\[([^\]]+)\]\([^)]*\)", "$1"),
        (r"`([^`]+)`", "$1"),
        (r"\*\*([^*]+)\*\*", "$1"),
        (r"__([^_]+)__", "$1"),
        (r"\*([^*\s][^*]*)\*", "$1"),
        (r"(^|[^\w])_([^_\s][^_]*)_([^\w]|$)", "$1$2$3"),
        (r"~~([^~]+)~~", "$1"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            tracing::error!("Invalid markdown pattern {}: {}", pattern, e);
            None
        }
    })
    .collect()
});

fn strip_inline_markdown(line: &str) -> String {
    MARKDOWN_INLINE
        .iter()
        .fold(line.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}

fn strip_list_marker(line: &str) -> String {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return format!("• {}", rest);
        }
    }
    line.to_string()
}

fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|&m| compact.chars().all(|c| c == m))
}

/// Flattens Markdown to plain text, one output line per source line.
pub fn markdown_to_plain(text: &str) -> String {
    let mut lines = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            lines.push(line.to_string());
            continue;
        }

        let mut body = trimmed;
        while let Some(rest) = body.strip_prefix('>') {
            body = rest.trim_start();
        }
        if is_rule(body) {
            lines.push(String::new());
            continue;
        }
        let hashes = body.len() - body.trim_start_matches('#').len();
        if (1..=6).contains(&hashes) {
            let rest = &body[hashes..];
            if rest.is_empty() || rest.starts_with(' ') {
                body = rest.trim();
            }
        }

        lines.push(strip_inline_markdown(&strip_list_marker(body)));
    }

    lines.join("\n")
}

/// Groups whose content is metadata, never body text.
const RTF_SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "listtable",
    "listoverridetable",
    "rsidtbl",
    "generator",
    "header",
    "headerl",
    "headerr",
    "footer",
    "footerl",
    "footerr",
    "themedata",
    "colorschememapping",
    "latentstyles",
    "datastore",
    "xmlnstbl",
];

fn emit(out: &mut String, c: char, skipping: bool, pending: &mut usize) {
    if *pending > 0 {
        *pending -= 1;
    } else if !skipping {
        out.push(c);
    }
}

/// Strips RTF control words and groups down to the visible text.
pub fn rtf_to_plain(text: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut skip_stack: Vec<bool> = Vec::new();
    let mut skipping = false;
    // Characters still to drop after a \u escape (\ucN, default 1)
    let mut unicode_skip = 1usize;
    let mut pending_fallback = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                skip_stack.push(skipping);
                pending_fallback = 0;
                i += 1;
            }
            '}' => {
                skipping = skip_stack.pop().unwrap_or(false);
                pending_fallback = 0;
                i += 1;
            }
            '\r' | '\n' => i += 1,
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    break;
                };
                match next {
                    '\\' | '{' | '}' => {
                        emit(&mut out, next, skipping, &mut pending_fallback);
                        i += 2;
                    }
                    '~' => {
                        emit(&mut out, ' ', skipping, &mut pending_fallback);
                        i += 2;
                    }
                    '_' => {
                        emit(&mut out, '-', skipping, &mut pending_fallback);
                        i += 2;
                    }
                    '*' => {
                        skipping = true;
                        i += 2;
                    }
                    '\'' => {
                        let hex: String = chars.iter().skip(i + 2).take(2).collect();
                        if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                            emit(&mut out, decode_win_ansi(byte), skipping, &mut pending_fallback);
                        }
                        i += 2 + hex.len();
                    }
                    '\r' | '\n' => {
                        emit(&mut out, '\n', skipping, &mut pending_fallback);
                        i += 2;
                    }
                    n if n.is_ascii_alphabetic() => {
                        let start = i + 1;
                        let mut end = start;
                        while end < chars.len() && chars[end].is_ascii_alphabetic() {
                            end += 1;
                        }
                        let word: String = chars[start..end].iter().collect();

                        let param_start = end;
                        if end < chars.len() && chars[end] == '-' {
                            end += 1;
                        }
                        while end < chars.len() && chars[end].is_ascii_digit() {
                            end += 1;
                        }
                        let param: Option<i32> = chars[param_start..end]
                            .iter()
                            .collect::<String>()
                            .parse()
                            .ok();
                        // A single space delimits the control word
                        if end < chars.len() && chars[end] == ' ' {
                            end += 1;
                        }
                        i = end;

                        match word.as_str() {
                            "par" | "line" => emit(&mut out, '\n', skipping, &mut pending_fallback),
                            "tab" => emit(&mut out, '\t', skipping, &mut pending_fallback),
                            "emdash" => emit(&mut out, '—', skipping, &mut pending_fallback),
                            "endash" => emit(&mut out, '–', skipping, &mut pending_fallback),
                            "bullet" => emit(&mut out, '•', skipping, &mut pending_fallback),
                            "lquote" => emit(&mut out, '‘', skipping, &mut pending_fallback),
                            "rquote" => emit(&mut out, '’', skipping, &mut pending_fallback),
                            "ldblquote" => emit(&mut out, '“', skipping, &mut pending_fallback),
                            "rdblquote" => emit(&mut out, '”', skipping, &mut pending_fallback),
                            "uc" => unicode_skip = param.unwrap_or(1).max(0) as usize,
                            "u" => {
                                if let Some(code) = param {
                                    // Negative values encode code points above 0x7FFF
                                    let code = if code < 0 { code + 65536 } else { code };
                                    if let Some(ch) = char::from_u32(code as u32) {
                                        emit(&mut out, ch, skipping, &mut pending_fallback);
                                    }
                                    pending_fallback = unicode_skip;
                                }
                            }
                            w if RTF_SKIPPED_DESTINATIONS.contains(&w) => skipping = true,
                            _ => {}
                        }
                    }
                    _ => i += 2,
                }
            }
            _ => {
                emit(&mut out, c, skipping, &mut pending_fallback);
                i += 1;
            }
        }
    }

    out
}
