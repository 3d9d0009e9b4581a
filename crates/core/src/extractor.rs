use crate::error::ExtractionError;
use crate::models::{Location, SourceFormat};
use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use std::io::{Cursor, Read};
use std::time::Duration;
use tracing::debug;
use zip::ZipArchive;

const DOCX_BODY_PART: &str = "word/document.xml";

/// Turns the bytes of one document format into plain text.
pub trait TextDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, String>;
}

#[derive(Default)]
pub struct LopdfDecoder;

impl TextDecoder for LopdfDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, String> {
        let document = Document::load_mem(bytes).map_err(|error| error.to_string())?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| format!("page {page_no}: {error}"))?;
            pages.push(text);
        }

        Ok(pages.join("\n"))
    }
}

#[derive(Default)]
pub struct DocxDecoder;

impl TextDecoder for DocxDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|error| error.to_string())?;
        let mut xml = String::new();
        archive
            .by_name(DOCX_BODY_PART)
            .map_err(|error| format!("{DOCX_BODY_PART}: {error}"))?
            .read_to_string(&mut xml)
            .map_err(|error| format!("{DOCX_BODY_PART}: {error}"))?;

        docx_body_text(&xml)
    }
}

/// Collects the visible text of a WordprocessingML body, one line per paragraph.
fn docx_body_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref element)) if element.name().as_ref() == b"w:t" => {
                in_text_run = true;
            }
            Ok(Event::End(ref element)) => match element.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref element)) => match element.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" | b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(ref content)) if in_text_run => {
                let value = content.unescape().map_err(|error| error.to_string())?;
                text.push_str(&value);
            }
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(format!(
                    "malformed xml at byte {}: {error}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }

    Ok(text.trim_end_matches('\n').to_string())
}

/// Decodes `bytes` as `format`. A zero-length input is an empty document.
pub fn decode_bytes(
    format: SourceFormat,
    location: &str,
    bytes: &[u8],
) -> Result<String, ExtractionError> {
    let decoded = match format {
        SourceFormat::Unsupported => {
            return Err(ExtractionError::UnsupportedFormat {
                location: location.to_string(),
            })
        }
        _ if bytes.is_empty() => Ok(String::new()),
        SourceFormat::Pdf => LopdfDecoder.decode(bytes),
        SourceFormat::Docx => DocxDecoder.decode(bytes),
    };

    decoded.map_err(|cause| ExtractionError::failed(location, cause))
}

#[derive(Clone)]
pub struct ContentExtractor {
    http: Client,
    timeout: Option<Duration>,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ContentExtractor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            http: Client::new(),
            timeout,
        }
    }

    pub fn with_client(http: Client, timeout: Option<Duration>) -> Self {
        Self { http, timeout }
    }

    /// Reads the whole document into memory and decodes it on the blocking pool.
    pub async fn extract(
        &self,
        location: &Location,
        format: SourceFormat,
    ) -> Result<String, ExtractionError> {
        if !format.is_supported() {
            return Err(ExtractionError::UnsupportedFormat {
                location: location.to_string(),
            });
        }

        let work = self.read_and_decode(location, format);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                ExtractionError::failed(location, format!("timed out after {limit:?}"))
            })?,
            None => work.await,
        }
    }

    async fn read_and_decode(
        &self,
        location: &Location,
        format: SourceFormat,
    ) -> Result<String, ExtractionError> {
        let bytes = self.read(location).await?;
        debug!(location = %location, bytes = bytes.len(), ?format, "decoding document");

        let label = location.to_string();
        tokio::task::spawn_blocking(move || decode_bytes(format, &label, &bytes))
            .await
            .map_err(|error| ExtractionError::failed(location, error))?
    }

    async fn read(&self, location: &Location) -> Result<Vec<u8>, ExtractionError> {
        match location {
            Location::File(path) => tokio::fs::read(path)
                .await
                .map_err(|error| ExtractionError::failed(location, error)),
            Location::Remote(url) => {
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|error| ExtractionError::failed(location, error))?;

                if !response.status().is_success() {
                    return Err(ExtractionError::failed(
                        location,
                        format!("download returned {}", response.status()),
                    ));
                }

                response
                    .bytes()
                    .await
                    .map(|body| body.to_vec())
                    .map_err(|error| ExtractionError::failed(location, error))
            }
        }
    }
}
