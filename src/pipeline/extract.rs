//! Document extraction: raw bytes + declared MIME type → plain text and
//! embedded raster images.
//!
//! ## Why spawn_blocking for PDF?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread so the Tokio workers never stall during CPU-heavy parsing.
//!
//! ## Failure isolation
//!
//! A document that cannot be opened at all is an [`DocumentError::ExtractionFailed`],
//! but inside a readable document every page's text and every embedded image
//! fails independently: one undecodable image is logged and skipped, never
//! aborting the rest of the extraction.

use crate::error::DocumentError;
use crate::model::{ExtractedImage, Extraction};
use image::DynamicImage;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Declared type for PDF input.
pub const MIME_PDF: &str = "application/pdf";
/// Declared type for DOCX input.
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
/// Declared type for plain-text input.
pub const MIME_TXT: &str = "text/plain";

/// Media extensions treated as raster images inside a DOCX container.
const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// Extract text and embedded images from one document.
///
/// Dispatches on the declared MIME type. Unknown types fail with
/// [`DocumentError::UnsupportedFormat`] so the caller can skip the document
/// without aborting the batch. Purely a transform over the input bytes; no
/// side effects.
pub async fn extract(bytes: &[u8], mime: &str) -> Result<Extraction, DocumentError> {
    match mime {
        MIME_PDF => extract_pdf(bytes.to_vec()).await,
        MIME_DOCX => extract_docx(bytes),
        MIME_TXT => extract_txt(bytes),
        other => Err(DocumentError::UnsupportedFormat { mime: other.into() }),
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────

async fn extract_pdf(bytes: Vec<u8>) -> Result<Extraction, DocumentError> {
    tokio::task::spawn_blocking(move || extract_pdf_blocking(&bytes))
        .await
        .map_err(|e| DocumentError::ExtractionFailed {
            detail: format!("extraction task panicked: {e}"),
        })?
}

/// Blocking implementation of PDF extraction.
///
/// Text is concatenated in page order, one newline per page boundary.
/// Images are every image page-object across every page, in document order,
/// re-encoded as PNG so downstream always deals with one raster format.
fn extract_pdf_blocking(bytes: &[u8]) -> Result<Extraction, DocumentError> {
    let pdfium = Pdfium::default();

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        DocumentError::ExtractionFailed {
            detail: format!("could not open PDF: {e:?}"),
        }
    })?;

    let mut text = String::new();
    let mut images: Vec<ExtractedImage> = Vec::new();

    for (page_index, page) in document.pages().iter().enumerate() {
        let page_num = page_index + 1;

        match page.text() {
            Ok(page_text) => {
                text.push_str(&page_text.all());
                text.push('\n');
            }
            Err(e) => warn!("page {page_num}: text extraction failed: {e:?}"),
        }

        let mut within_page = 0usize;
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };

            match image_object.get_raw_image() {
                Ok(raster) => match encode_png(&raster) {
                    Ok(png) => {
                        debug!(
                            "page {page_num} image {within_page}: {}x{} px",
                            raster.width(),
                            raster.height()
                        );
                        images.push(ExtractedImage {
                            bytes: png,
                            width: raster.width(),
                            height: raster.height(),
                            page: Some(page_num),
                            index: images.len(),
                            extension: "png".to_string(),
                        });
                    }
                    Err(e) => {
                        warn!("page {page_num} image {within_page}: PNG encoding failed: {e}")
                    }
                },
                Err(e) => warn!("page {page_num} image {within_page}: decode failed: {e:?}"),
            }
            within_page += 1;
        }
    }

    Ok(Extraction { text, images })
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

// ── DOCX ─────────────────────────────────────────────────────────────────

/// Extract the flattened text and media images from a DOCX container.
///
/// A DOCX file is a ZIP: text lives in `word/document.xml`, images under
/// `word/media/`. The container gives no positional link between media and
/// text offsets, so ordinal sequence position is the only anchor — images are
/// collected in container order.
fn extract_docx(bytes: &[u8]) -> Result<Extraction, DocumentError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| DocumentError::ExtractionFailed {
            detail: format!("not a DOCX container: {e}"),
        })?;

    let xml = {
        let mut file =
            archive
                .by_name("word/document.xml")
                .map_err(|e| DocumentError::ExtractionFailed {
                    detail: format!("missing word/document.xml: {e}"),
                })?;
        let mut s = String::new();
        file.read_to_string(&mut s)
            .map_err(|e| DocumentError::ExtractionFailed {
                detail: format!("unreadable word/document.xml: {e}"),
            })?;
        s
    };
    let text = flatten_document_xml(&xml);

    let mut images: Vec<ExtractedImage> = Vec::new();
    for i in 0..archive.len() {
        let mut file = match archive.by_index(i) {
            Ok(f) => f,
            Err(e) => {
                warn!("skipping unreadable archive entry {i}: {e}");
                continue;
            }
        };
        let name = file.name().to_string();
        if !name.starts_with("word/media/") {
            continue;
        }
        let Some(extension) = raster_extension(&name) else {
            continue;
        };

        let mut data = Vec::new();
        if let Err(e) = file.read_to_end(&mut data) {
            warn!("skipping unreadable media '{name}': {e}");
            continue;
        }

        match image::load_from_memory(&data) {
            Ok(decoded) => images.push(ExtractedImage {
                width: decoded.width(),
                height: decoded.height(),
                bytes: data,
                page: None,
                index: images.len(),
                extension,
            }),
            Err(e) => warn!("skipping undecodable media '{name}': {e}"),
        }
    }

    Ok(Extraction { text, images })
}

static RE_TEXT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").unwrap());

/// Flatten WordprocessingML to plain text: `<w:t>` runs joined within each
/// paragraph, one line per `</w:p>` boundary.
fn flatten_document_xml(xml: &str) -> String {
    let mut out = String::new();
    for paragraph in xml.split("</w:p>") {
        let mut line = String::new();
        for caps in RE_TEXT_RUN.captures_iter(paragraph) {
            line.push_str(&unescape_xml(&caps[1]));
        }
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            out.push_str(trimmed);
            out.push('\n');
        }
    }
    out
}

/// Minimal XML entity unescape for text runs. `&amp;` last so double-escaped
/// sequences decode once.
fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn raster_extension(name: &str) -> Option<String> {
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    if RASTER_EXTENSIONS.contains(&ext.as_str()) {
        Some(ext)
    } else {
        None
    }
}

// ── Plain text ───────────────────────────────────────────────────────────

fn extract_txt(bytes: &[u8]) -> Result<Extraction, DocumentError> {
    let text = String::from_utf8(bytes.to_vec()).map_err(|e| DocumentError::ExtractionFailed {
        detail: format!("text document is not valid UTF-8: {e}"),
    })?;
    Ok(Extraction {
        text,
        images: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn tiny_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 128, 255, 255])));
        encode_png(&img).expect("encode test png")
    }

    fn fixture_docx(image_count: usize) -> Vec<u8> {
        let mut zw = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zw.start_file("word/document.xml", options).unwrap();
        zw.write_all(
            br#"<w:document><w:body>
                <w:p><w:r><w:t>A 70-year-old woman presents with dyspnoea.</w:t></w:r></w:p>
                <w:p><w:r><w:t xml:space="preserve">Refer to the X-ray &amp; report.</w:t></w:r></w:p>
                </w:body></w:document>"#,
        )
        .unwrap();

        for i in 0..image_count {
            zw.start_file(format!("word/media/image{}.png", i + 1), options)
                .unwrap();
            zw.write_all(&tiny_png()).unwrap();
        }

        // Non-raster media must be ignored.
        zw.start_file("word/media/diagram.wmf", options).unwrap();
        zw.write_all(b"not a raster").unwrap();

        zw.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn plain_text_passes_through_with_no_images() {
        let out = extract(b"Scenario one.\nQ1: why?", MIME_TXT).await.unwrap();
        assert_eq!(out.text, "Scenario one.\nQ1: why?");
        assert!(out.images.is_empty());
    }

    #[tokio::test]
    async fn plain_text_rejects_invalid_utf8() {
        let err = extract(&[0xff, 0xfe, 0x00], MIME_TXT).await.unwrap_err();
        assert!(matches!(err, DocumentError::ExtractionFailed { .. }));
    }

    #[tokio::test]
    async fn unknown_mime_is_unsupported() {
        let err = extract(b"whatever", "application/vnd.ms-excel")
            .await
            .unwrap_err();
        match err {
            DocumentError::UnsupportedFormat { mime } => {
                assert_eq!(mime, "application/vnd.ms-excel")
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn docx_yields_text_and_images_in_container_order() {
        let out = extract(&fixture_docx(2), MIME_DOCX).await.unwrap();
        assert!(out.text.contains("A 70-year-old woman presents with dyspnoea."));
        assert!(out.text.contains("Refer to the X-ray & report."));
        assert_eq!(out.images.len(), 2);
        assert_eq!(out.images[0].index, 0);
        assert_eq!(out.images[1].index, 1);
        assert_eq!(out.images[0].extension, "png");
        assert_eq!(out.images[0].width, 4);
        assert_eq!(out.images[0].page, None);
    }

    #[tokio::test]
    async fn docx_with_no_media_yields_text_only() {
        let out = extract(&fixture_docx(0), MIME_DOCX).await.unwrap();
        assert!(!out.text.is_empty());
        assert!(out.images.is_empty());
    }

    #[tokio::test]
    async fn garbage_docx_fails_extraction() {
        let err = extract(b"PK garbage that is not a zip", MIME_DOCX)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::ExtractionFailed { .. }));
    }

    #[test]
    fn flatten_joins_runs_and_breaks_paragraphs() {
        let xml = "<w:p><w:r><w:t>He</w:t></w:r><w:r><w:t>llo</w:t></w:r></w:p>\
                   <w:p><w:r><w:t>world</w:t></w:r></w:p>";
        assert_eq!(flatten_document_xml(xml), "Hello\nworld\n");
    }

    #[test]
    fn unescape_handles_entities() {
        assert_eq!(unescape_xml("a &lt;b&gt; &amp; &quot;c&quot;"), "a <b> & \"c\"");
    }

    #[test]
    fn raster_extension_filters() {
        assert_eq!(raster_extension("word/media/image1.PNG").as_deref(), Some("png"));
        assert_eq!(raster_extension("word/media/pic.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(raster_extension("word/media/diagram.wmf"), None);
        assert_eq!(raster_extension("word/media/noext"), None);
    }
}
