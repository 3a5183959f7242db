//! Request bodies and their wire form.

use crate::codec::{mime, Codecs};
use crate::error::ApiError;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::PathBuf;

/// Where a multipart file comes from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Read from disk when the request is sent.
    Path(PathBuf),
    /// In-memory contents.
    Bytes(Bytes),
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        FileSource::Path(path)
    }
}

impl From<&std::path::Path> for FileSource {
    fn from(path: &std::path::Path) -> Self {
        FileSource::Path(path.to_path_buf())
    }
}

impl From<&str> for FileSource {
    fn from(path: &str) -> Self {
        FileSource::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for FileSource {
    fn from(bytes: Vec<u8>) -> Self {
        FileSource::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for FileSource {
    fn from(bytes: Bytes) -> Self {
        FileSource::Bytes(bytes)
    }
}

/// Overrides for an uploaded file.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl FileOptions {
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One multipart field.
#[derive(Debug, Clone)]
pub enum MultipartPart {
    Field { name: String, value: String },
    File { name: String, source: FileSource, options: FileOptions },
}

/// Body of an outgoing request.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Structured data, serialized by content type at send time.
    Value(Value),
    /// Sent verbatim.
    Raw(Bytes),
    Multipart(Vec<MultipartPart>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Body::Multipart(_))
    }

    /// Replace a non-multipart body.
    pub(crate) fn replace(&mut self, body: Body) -> Result<(), ApiError> {
        if self.is_multipart() {
            return Err(ApiError::InvalidBody(
                "cannot combine a multipart body with another body".to_string(),
            ));
        }
        *self = body;
        Ok(())
    }

    /// Append a multipart field, turning an empty body into a multipart one.
    pub(crate) fn push_part(&mut self, part: MultipartPart) -> Result<(), ApiError> {
        match self {
            Body::Empty => {
                *self = Body::Multipart(vec![part]);
                Ok(())
            }
            Body::Multipart(parts) => {
                parts.push(part);
                Ok(())
            }
            _ => Err(ApiError::InvalidBody(
                "cannot add multipart fields to a request that already has a body".to_string(),
            )),
        }
    }

    /// Resolve the body into bytes, reading files from disk.
    ///
    /// `content_type` is the request's content type header, if any.
    pub(crate) async fn prepare(
        &self,
        content_type: Option<&str>,
        codecs: &Codecs,
    ) -> Result<PreparedBody, ApiError> {
        match self {
            Body::Empty => Ok(PreparedBody::Empty),
            Body::Raw(bytes) => Ok(PreparedBody::Bytes {
                bytes: bytes.clone(),
                default_content_type: None,
            }),
            Body::Value(value) => {
                let (content_type, default_content_type) = match content_type {
                    Some(ct) => (ct, None),
                    None => (mime::JSON, Some(mime::JSON)),
                };
                let bytes = codecs.encode(content_type, value)?;
                Ok(PreparedBody::Bytes {
                    bytes: Bytes::from(bytes),
                    default_content_type,
                })
            }
            Body::Multipart(parts) => {
                let mut prepared = Vec::with_capacity(parts.len());
                for part in parts {
                    prepared.push(prepare_part(part).await?);
                }
                Ok(PreparedBody::Multipart(prepared))
            }
        }
    }
}

async fn prepare_part(part: &MultipartPart) -> Result<PreparedPart, ApiError> {
    match part {
        MultipartPart::Field { name, value } => Ok(PreparedPart::Field {
            name: name.clone(),
            value: value.clone(),
        }),
        MultipartPart::File { name, source, options } => {
            let (bytes, detected_name) = match source {
                FileSource::Bytes(bytes) => (bytes.clone(), None),
                FileSource::Path(path) => {
                    let contents = tokio::fs::read(path).await.map_err(|source| ApiError::File {
                        path: path.clone(),
                        source,
                    })?;
                    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                    (Bytes::from(contents), file_name)
                }
            };

            Ok(PreparedPart::File {
                name: name.clone(),
                bytes,
                file_name: options.file_name.clone().or(detected_name),
                content_type: options.content_type.clone(),
            })
        }
    }
}

/// Body ready to be attached to each attempt.
#[derive(Debug, Clone)]
pub(crate) enum PreparedBody {
    Empty,
    Bytes {
        bytes: Bytes,
        /// Content type to send when the request did not set one.
        default_content_type: Option<&'static str>,
    },
    Multipart(Vec<PreparedPart>),
}

#[derive(Debug, Clone)]
pub(crate) enum PreparedPart {
    Field { name: String, value: String },
    File {
        name: String,
        bytes: Bytes,
        file_name: Option<String>,
        content_type: Option<String>,
    },
}

impl PreparedBody {
    /// Text shown when dumping the request.
    pub(crate) fn preview(&self) -> String {
        match self {
            PreparedBody::Empty => String::new(),
            PreparedBody::Bytes { bytes, .. } => String::from_utf8_lossy(bytes).into_owned(),
            PreparedBody::Multipart(parts) => parts
                .iter()
                .map(|part| match part {
                    PreparedPart::Field { name, value } => format!("{}={}", name, value),
                    PreparedPart::File { name, bytes, file_name, .. } => format!(
                        "{}=<file {} ({} bytes)>",
                        name,
                        file_name.as_deref().unwrap_or("blob"),
                        bytes.len()
                    ),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Build a multipart form. Forms are single-use, so one is built per attempt.
    pub(crate) fn to_form(parts: &[PreparedPart]) -> Result<Form, ApiError> {
        let mut form = Form::new();
        for part in parts {
            form = match part {
                PreparedPart::Field { name, value } => form.text(name.clone(), value.clone()),
                PreparedPart::File { name, bytes, file_name, content_type } => {
                    let mut file = Part::bytes(bytes.to_vec());
                    if let Some(file_name) = file_name {
                        file = file.file_name(file_name.clone());
                    }
                    if let Some(content_type) = content_type {
                        file = file
                            .mime_str(content_type)
                            .map_err(|e| ApiError::InvalidBody(format!("file {:?}: {}", name, e)))?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}
