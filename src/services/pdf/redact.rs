//! Content-stream redaction over `lopdf` documents.
//!
//! Term redaction rewrites the string operands of text-showing operators,
//! in page content and in the form XObjects a page draws. Box redaction drops
//! text runs whose estimated extent overlaps a box and paints the box black.
//! Both work on single-byte encoded text; composite fonts are left as they are
//! and surface through the residual check.

use crate::services::error::ServiceError;
use crate::services::pdf::metrics::{decode_win_ansi, encode_win_ansi, text_width};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use utoipa::ToSchema;

/// Replacement written in place of every redacted term
pub const PLACEHOLDER: &str = "[REDACTED]";

/// A rectangle in PDF user space (points, origin bottom-left) on a 1-based page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RedactionBox {
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RedactionBox {
    /// Same area with non-negative extent, for boxes dragged up or left.
    fn normalized(&self) -> Self {
        Self {
            page: self.page,
            x: self.x.min(self.x + self.width),
            y: self.y.min(self.y + self.height),
            width: self.width.abs(),
            height: self.height.abs(),
        }
    }

    fn overlaps(&self, run: &TextRun) -> bool {
        run.min.0 < self.x + self.width
            && run.max.0 > self.x
            && run.min.1 < self.y + self.height
            && run.max.1 > self.y
    }

    fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermReport {
    pub replacements: usize,
    /// Pages whose re-extracted text or drawn forms still contain a term, or
    /// that could not be checked.
    pub residual_pages: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxReport {
    pub boxes: usize,
    pub removed_runs: usize,
}

/// Replaces every non-blank term inside the text operators of `doc`.
pub fn redact_terms(doc: &mut Document, terms: &[String]) -> Result<TermReport, ServiceError> {
    let terms: Vec<&str> = terms
        .iter()
        .map(String::as_str)
        .filter(|t| !t.trim().is_empty())
        .collect();
    let mut report = TermReport::default();
    if terms.is_empty() {
        return Ok(report);
    }

    let needles: Vec<Vec<u8>> = terms.iter().map(|t| encode_win_ansi(t)).collect();
    let placeholder = encode_win_ansi(PLACEHOLDER);

    // Forms can be shared between pages; each is rewritten once
    let mut rewritten: BTreeSet<ObjectId> = BTreeSet::new();

    for (page_number, page_id) in doc.get_pages() {
        let mut content = Content::decode(&doc.get_page_content(page_id)?)?;
        let mut page_replacements = 0;

        for operation in content.operations.iter_mut() {
            page_replacements += replace_in_operation(operation, &needles, &placeholder);
        }

        if page_replacements > 0 {
            replace_page_content(doc, page_id, &content)?;
        }

        for form_id in form_xobjects(doc, page_id) {
            if !rewritten.insert(form_id) {
                continue;
            }
            match redact_form(doc, form_id, &needles, &placeholder) {
                Ok(n) => page_replacements += n,
                Err(e) => tracing::warn!(
                    "⚠️ Could not rewrite form {:?} on page {}: {}",
                    form_id,
                    page_number,
                    e
                ),
            }
        }

        if page_replacements > 0 {
            tracing::debug!("Page {}: {} replacement(s)", page_number, page_replacements);
            report.replacements += page_replacements;
        }
    }
    doc.prune_objects();

    for (page_number, page_id) in doc.get_pages() {
        let residual = match doc.extract_text(&[page_number]) {
            Ok(text) => {
                terms.iter().any(|t| text.contains(t))
                    || form_xobjects(doc, page_id)
                        .into_iter()
                        .any(|form_id| form_shows_term(doc, form_id, &needles))
            }
            Err(e) => {
                tracing::warn!("⚠️ Could not verify page {}: {}", page_number, e);
                true
            }
        };
        if residual {
            tracing::warn!("⚠️ Page {} still shows a redacted term", page_number);
            report.residual_pages.push(page_number);
        }
    }

    Ok(report)
}

fn replace_in_operation(
    operation: &mut Operation,
    needles: &[Vec<u8>],
    placeholder: &[u8],
) -> usize {
    text_operands_mut(operation)
        .into_iter()
        .map(|operand| replace_in_string(operand, needles, placeholder))
        .sum()
}

fn redact_form(
    doc: &mut Document,
    form_id: ObjectId,
    needles: &[Vec<u8>],
    placeholder: &[u8],
) -> Result<usize, ServiceError> {
    let stream = doc.get_object_mut(form_id).and_then(Object::as_stream_mut)?;
    let mut content = form_content(stream)?;

    let count: usize = content
        .operations
        .iter_mut()
        .map(|operation| replace_in_operation(operation, needles, placeholder))
        .sum();
    if count > 0 {
        stream.set_plain_content(content.encode()?);
    }
    Ok(count)
}

/// True when the text shown by a form, joined across its runs, still holds a
/// term. A form that cannot be decoded counts as showing one.
fn form_shows_term(doc: &Document, form_id: ObjectId, needles: &[Vec<u8>]) -> bool {
    let content = doc
        .get_object(form_id)
        .and_then(Object::as_stream)
        .map_err(ServiceError::from)
        .and_then(form_content);
    let mut content = match content {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("⚠️ Could not verify form {:?}: {}", form_id, e);
            return true;
        }
    };

    let mut shown = Vec::new();
    for operation in content.operations.iter_mut() {
        for operand in text_operands_mut(operation) {
            if let Object::String(bytes, _) = operand {
                shown.extend_from_slice(bytes);
            }
        }
    }
    needles
        .iter()
        .any(|needle| shown.windows(needle.len()).any(|w| w == needle.as_slice()))
}

fn form_content(stream: &Stream) -> Result<Content, ServiceError> {
    let bytes = if stream.dict.has(b"Filter") {
        stream.decompressed_content()?
    } else {
        stream.content.clone()
    };
    Ok(Content::decode(&bytes)?)
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    dict.get(key)
        .ok()
        .and_then(|object| resolve(doc, object))
        .and_then(|object| object.as_dict().ok())
}

/// Resources of a page, inherited from the page tree when the page has none.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if node.has(b"Resources") {
            return resolve_dict(doc, node, b"Resources");
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

const MAX_TREE_DEPTH: usize = 64;

/// Form XObjects reachable from a page's resources, nested forms included.
fn form_xobjects(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let mut seen = BTreeSet::new();
    let mut forms = Vec::new();
    if let Some(resources) = page_resources(doc, page_id) {
        collect_forms(doc, resources, &mut seen, &mut forms);
    }
    forms
}

fn collect_forms(
    doc: &Document,
    resources: &Dictionary,
    seen: &mut BTreeSet<ObjectId>,
    forms: &mut Vec<ObjectId>,
) {
    let Some(xobjects) = resolve_dict(doc, resources, b"XObject") else {
        return;
    };

    for (_, entry) in xobjects.iter() {
        let Ok(id) = entry.as_reference() else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(id) else {
            continue;
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|name| name == b"Form")
            .unwrap_or(false);
        if !is_form {
            continue;
        }

        forms.push(id);
        if let Some(inner) = resolve_dict(doc, &stream.dict, b"Resources") {
            collect_forms(doc, inner, seen, forms);
        }
    }
}

/// Removes text runs whose estimated extent overlaps any box of their page,
/// then paints each box as an opaque black rectangle.
pub fn redact_boxes(doc: &mut Document, boxes: &[RedactionBox]) -> Result<BoxReport, ServiceError> {
    let pages = doc.get_pages();

    let mut by_page: BTreeMap<u32, Vec<RedactionBox>> = BTreeMap::new();
    for b in boxes {
        if !pages.contains_key(&b.page) {
            return Err(ServiceError::Validation(format!(
                "Page {} is outside the document ({} page(s))",
                b.page,
                pages.len()
            )));
        }
        if !b.is_finite() {
            return Err(ServiceError::Validation(format!(
                "Redaction box on page {} has non-numeric coordinates",
                b.page
            )));
        }
        by_page.entry(b.page).or_default().push(b.normalized());
    }

    let mut report = BoxReport {
        boxes: boxes.len(),
        removed_runs: 0,
    };

    for (page_number, page_boxes) in by_page {
        let page_id = pages[&page_number];
        let content = Content::decode(&doc.get_page_content(page_id)?)?;

        let mut tracker = TextTracker::default();
        let mut operations = Vec::with_capacity(content.operations.len() + page_boxes.len() * 6);
        operations.push(Operation::new("q", vec![]));

        for operation in content.operations {
            match tracker.observe(&operation) {
                Some(run) if page_boxes.iter().any(|b| b.overlaps(&run)) => {
                    report.removed_runs += 1;
                    // Keep the line advance that ' and " carry
                    if matches!(operation.operator.as_str(), "'" | "\"") {
                        operations.push(Operation::new("T*", vec![]));
                    }
                }
                _ => operations.push(operation),
            }
        }

        operations.push(Operation::new("Q", vec![]));
        for b in &page_boxes {
            operations.extend(black_box(b));
        }

        replace_page_content(doc, page_id, &Content { operations })?;
    }
    doc.prune_objects();

    Ok(report)
}

fn black_box(b: &RedactionBox) -> [Operation; 5] {
    [
        Operation::new("q", vec![]),
        Operation::new(
            "rg",
            vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
        ),
        Operation::new(
            "re",
            vec![b.x.into(), b.y.into(), b.width.into(), b.height.into()],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Writes `content` as a fresh stream and points the page at it. The old
/// stream, possibly filtered and shared, is left for pruning.
fn replace_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: &Content,
) -> Result<(), ServiceError> {
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)?
        .set("Contents", content_id);
    Ok(())
}

/// String operands carrying shown text for the text-showing operators.
fn text_operands_mut(operation: &mut Operation) -> Vec<&mut Object> {
    match operation.operator.as_str() {
        "Tj" | "'" => operation.operands.iter_mut().take(1).collect(),
        "\"" => operation.operands.iter_mut().skip(2).take(1).collect(),
        "TJ" => match operation.operands.first_mut() {
            Some(Object::Array(items)) => items.iter_mut().collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn replace_in_string(object: &mut Object, needles: &[Vec<u8>], placeholder: &[u8]) -> usize {
    let Object::String(bytes, _) = object else {
        return 0;
    };

    let mut count = 0;
    for needle in needles {
        let (replaced, n) = replace_bytes(bytes, needle, placeholder);
        if n > 0 {
            *bytes = replaced;
            count += n;
        }
    }
    count
}

fn replace_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> (Vec<u8>, usize) {
    if needle.is_empty() || haystack.len() < needle.len() {
        return (haystack.to_vec(), 0);
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut count = 0;
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
            count += 1;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    (out, count)
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(&operands[operands.len() - N..]) {
        *slot = number(operand)?;
    }
    Some(out)
}

/// Helvetica ascender and descender, as fractions of the font size
const ASCENT: f32 = 0.718;
const DESCENT: f32 = -0.207;

/// Where a text-showing operator draws, in device space.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TextRun {
    origin: (f32, f32),
    min: (f32, f32),
    max: (f32, f32),
}

/// Follows the graphics and text state far enough to place each text run.
/// Glyph advance is estimated with Helvetica widths at the current font size.
#[derive(Debug)]
struct TextTracker {
    ctm: Matrix,
    stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f32,
    font_size: f32,
}

impl Default for TextTracker {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            leading: 0.0,
            font_size: 0.0,
        }
    }
}

impl TextTracker {
    /// Updates state for `operation`. For text-showing operators, returns the
    /// run's placement before advancing past it.
    fn observe(&mut self, operation: &Operation) -> Option<TextRun> {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "q" => self.stack.push(self.ctm),
            "Q" => self.ctm = self.stack.pop().unwrap_or(IDENTITY),
            "cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.ctm = multiply(&m, &self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some([size]) = numbers::<1>(operands) {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    self.leading = leading;
                }
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" => return Some(self.show(operands.first())),
            "'" => {
                self.next_line(0.0, -self.leading);
                return Some(self.show(operands.first()));
            }
            "\"" => {
                self.next_line(0.0, -self.leading);
                return Some(self.show(operands.get(2)));
            }
            "TJ" => return Some(self.show(operands.first())),
            _ => {}
        }
        None
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translate(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn show(&mut self, operand: Option<&Object>) -> TextRun {
        let advance = operand.map(|o| self.advance(o)).unwrap_or(0.0);
        let m = multiply(&self.text_matrix, &self.ctm);
        let (low, high) = (DESCENT * self.font_size, ASCENT * self.font_size);

        let mut run = TextRun {
            origin: (m[4], m[5]),
            min: (f32::INFINITY, f32::INFINITY),
            max: (f32::NEG_INFINITY, f32::NEG_INFINITY),
        };
        for (x, y) in [(0.0, low), (advance, low), (0.0, high), (advance, high)] {
            let px = x * m[0] + y * m[2] + m[4];
            let py = x * m[1] + y * m[3] + m[5];
            run.min = (run.min.0.min(px), run.min.1.min(py));
            run.max = (run.max.0.max(px), run.max.1.max(py));
        }

        self.text_matrix = multiply(&translate(advance, 0.0), &self.text_matrix);
        run
    }

    fn advance(&self, operand: &Object) -> f32 {
        match operand {
            Object::String(bytes, _) => {
                let text: String = bytes.iter().map(|&b| decode_win_ansi(b)).collect();
                text_width(&text, self.font_size)
            }
            Object::Array(items) => items
                .iter()
                .map(|item| match item {
                    Object::String(..) => self.advance(item),
                    other => number(other)
                        .map(|adjust| -adjust / 1000.0 * self.font_size)
                        .unwrap_or(0.0),
                })
                .sum(),
            _ => 0.0,
        }
    }
}
