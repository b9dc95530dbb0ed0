use crate::services::error::ServiceError;
use crate::services::pdf::metrics::{encode_win_ansi, wrap_line};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::io::Write;

pub const A4_WIDTH: f32 = 595.2756;
pub const A4_HEIGHT: f32 = 841.8898;

const BODY_FONT: &str = "F1";
const TITLE_FONT: &str = "F2";

/// Page geometry and typography for rendered documents, in points.
#[derive(Debug, Clone, Copy)]
pub struct TextLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub title_size: f32,
    pub title_offset: f32,
    pub title_gap: f32,
    pub body_size: f32,
    pub leading: f32,
    pub paragraph_gap: f32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            page_width: A4_WIDTH,
            page_height: A4_HEIGHT,
            margin: 60.0,
            title_size: 16.0,
            title_offset: 80.0,
            title_gap: 30.0,
            body_size: 12.0,
            leading: 16.0,
            paragraph_gap: 10.0,
        }
    }
}

impl TextLayout {
    fn wrap_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }
}

/// Decoded 8-bit RGB pixels of one image page
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Accumulates pages under a single page tree.
struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn font_resources(&mut self) -> ObjectId {
        let body = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let title = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        self.doc.add_object(dictionary! {
            "Font" => dictionary! {
                BODY_FONT => body,
                TITLE_FONT => title,
            },
        })
    }

    fn add_page(
        &mut self,
        width: f32,
        height: f32,
        resources: Object,
        operations: Vec<Operation>,
    ) -> Result<(), ServiceError> {
        let content = Content { operations };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                width.into(),
                height.into(),
            ],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, ServiceError> {
        if self.kids.is_empty() {
            return Err(ServiceError::Pdf("document has no pages".to_string()));
        }

        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();
        save_document(&mut self.doc)
    }
}

/// Serializes `doc` into memory.
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>, ServiceError> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| ServiceError::Pdf(e.to_string()))?;
    Ok(output)
}

fn show_text(font: &str, size: f32, x: f32, y: f32, text: &str) -> [Operation; 5] {
    [
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Renders a titled document: bold title, then every non-blank paragraph
/// word-wrapped to the text column, flowing onto new pages as needed.
/// Line breaks inside a paragraph start a new line without the paragraph gap.
pub fn render_document(
    title: &str,
    paragraphs: &[String],
    layout: &TextLayout,
) -> Result<Vec<u8>, ServiceError> {
    let mut builder = PdfBuilder::new();
    let resources = builder.font_resources();

    let mut operations = Vec::new();
    let mut y = layout.page_height - layout.title_offset;
    operations.extend(show_text(
        TITLE_FONT,
        layout.title_size,
        layout.margin,
        y,
        title,
    ));
    y -= layout.title_gap;

    for paragraph in paragraphs {
        if paragraph.trim().is_empty() {
            continue;
        }

        for segment in paragraph.lines() {
            for line in wrap_line(segment, layout.body_size, layout.wrap_width()) {
                if y < layout.margin {
                    builder.add_page(
                        layout.page_width,
                        layout.page_height,
                        resources.into(),
                        std::mem::take(&mut operations),
                    )?;
                    y = layout.page_height - layout.margin;
                }
                operations.extend(show_text(
                    BODY_FONT,
                    layout.body_size,
                    layout.margin,
                    y,
                    &line,
                ));
                y -= layout.leading;
            }
        }
        y -= layout.paragraph_gap;
    }

    builder.add_page(
        layout.page_width,
        layout.page_height,
        resources.into(),
        operations,
    )?;
    builder.finish()
}

/// Renders one page per raster, each sized to the raster's pixel
/// dimensions at 72 dpi.
pub fn render_images(pages: &[RasterPage]) -> Result<Vec<u8>, ServiceError> {
    let mut builder = PdfBuilder::new();

    for page in pages {
        let expected = page.width as usize * page.height as usize * 3;
        if page.pixels.len() != expected {
            return Err(ServiceError::Pdf(format!(
                "raster is {} bytes, expected {} for {}x{} RGB",
                page.pixels.len(),
                expected,
                page.width,
                page.height
            )));
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&page.pixels)?;
        let compressed = encoder.finish()?;

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.width as i64,
                "Height" => page.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            },
            compressed,
        )
        .with_compression(false);
        let image_id = builder.doc.add_object(image);

        let mut xobjects = Dictionary::new();
        xobjects.set("Im1", image_id);
        let resources = dictionary! { "XObject" => xobjects };

        let (width, height) = (page.width as f32, page.height as f32);
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    height.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ];
        builder.add_page(width, height, resources.into(), operations)?;
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraphs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_document_single_page() {
        let bytes = render_document(
            "Quarterly report",
            &paragraphs(&["First paragraph.", "", "Second paragraph."]),
            &TextLayout::default(),
        )
        .unwrap();

        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("Quarterly report"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
    }

    #[test]
    fn test_render_document_flows_onto_new_pages() {
        let body: Vec<String> = (0..120).map(|i| format!("Paragraph number {}", i)).collect();
        let bytes = render_document("Long", &body, &TextLayout::default()).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
        let last = doc.get_pages().len() as u32;
        assert!(doc.extract_text(&[last]).unwrap().contains("Paragraph number 119"));
    }

    #[test]
    fn test_render_document_empty_body_still_has_title_page() {
        let bytes = render_document("Empty", &[], &TextLayout::default()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_render_images_one_page_per_raster() {
        let pages = vec![
            RasterPage {
                width: 4,
                height: 2,
                pixels: vec![255; 4 * 2 * 3],
            },
            RasterPage {
                width: 3,
                height: 5,
                pixels: vec![0; 3 * 5 * 3],
            },
        ];
        let bytes = render_images(&pages).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        assert_eq!(page_ids.len(), 2);

        let media_box = doc
            .get_object(page_ids[1])
            .and_then(Object::as_dict)
            .and_then(|page| page.get(b"MediaBox"))
            .and_then(Object::as_array)
            .unwrap();
        assert_eq!(media_box[2].as_float().unwrap(), 3.0);
        assert_eq!(media_box[3].as_float().unwrap(), 5.0);
    }

    #[test]
    fn test_render_images_rejects_short_raster() {
        let pages = vec![RasterPage {
            width: 10,
            height: 10,
            pixels: vec![0; 12],
        }];
        assert!(matches!(render_images(&pages), Err(ServiceError::Pdf(_))));
    }

    #[test]
    fn test_render_images_requires_a_page() {
        assert!(matches!(render_images(&[]), Err(ServiceError::Pdf(_))));
    }
}
