//! Multipart form construction.
//!
//! # Design
//! Building happens in two steps. `MultipartForm::build` turns the caller's
//! parameters into a list of `FormPart` descriptions, which is plain data and
//! easy to assert on. `MultipartForm::into_transport` then hands those parts
//! to the transport, which owns the wire format. Every part is streamed in
//! zero-copy slices of the original buffer so a large upload is never
//! duplicated in memory, and each slice reports upload progress as the
//! transport pulls it.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use reqwest::multipart::{Form, Part};
use tokio::sync::watch;

use crate::error::EncodingError;

/// Size of the slices a streamed part is cut into.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// File metadata attached to a multipart value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileParameter {
    pub file_name: Option<String>,
    pub mime_type: String,
}

/// One multipart value: bytes, optionally described as a file.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartParameter {
    pub data: Bytes,
    pub file: Option<FileParameter>,
}

impl MultipartParameter {
    /// A plain form value.
    pub fn inline(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            file: None,
        }
    }

    /// A file part with a filename.
    pub fn file(data: impl Into<Bytes>, file_name: &str, mime_type: &str) -> Self {
        Self {
            data: data.into(),
            file: Some(FileParameter {
                file_name: Some(file_name.to_string()),
                mime_type: mime_type.to_string(),
            }),
        }
    }

    /// A value with a MIME type but no filename.
    pub fn typed(data: impl Into<Bytes>, mime_type: &str) -> Self {
        Self {
            data: data.into(),
            file: Some(FileParameter {
                file_name: None,
                mime_type: mime_type.to_string(),
            }),
        }
    }
}

/// Field name to value, in the order the parts are sent.
pub type MultipartParameters = Vec<(String, MultipartParameter)>;

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Inline {
        name: String,
        data: Bytes,
    },
    Typed {
        name: String,
        mime_type: String,
        data: Bytes,
    },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        length: u64,
        data: Bytes,
    },
}

impl FormPart {
    pub fn name(&self) -> &str {
        match self {
            FormPart::Inline { name, .. }
            | FormPart::Typed { name, .. }
            | FormPart::File { name, .. } => name,
        }
    }

    pub fn data(&self) -> &Bytes {
        match self {
            FormPart::Inline { data, .. }
            | FormPart::Typed { data, .. }
            | FormPart::File { data, .. } => data,
        }
    }
}

/// Ordered description of a multipart payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn build(parameters: &MultipartParameters) -> Self {
        let parts = parameters
            .iter()
            .map(|(name, parameter)| {
                let name = name.clone();
                let data = parameter.data.clone();
                match &parameter.file {
                    None => FormPart::Inline { name, data },
                    Some(FileParameter {
                        file_name: Some(file_name),
                        mime_type,
                    }) => FormPart::File {
                        name,
                        file_name: file_name.clone(),
                        mime_type: mime_type.clone(),
                        length: data.len() as u64,
                        data,
                    },
                    Some(FileParameter {
                        file_name: None,
                        mime_type,
                    }) => FormPart::Typed {
                        name,
                        mime_type: mime_type.clone(),
                        data,
                    },
                }
            })
            .collect();
        Self { parts }
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Payload bytes across all parts, excluding boundaries and part
    /// headers; the denominator for upload progress.
    pub fn payload_len(&self) -> u64 {
        self.parts
            .iter()
            .map(|part| part.data().len() as u64)
            .sum()
    }

    /// Converts the description into the transport's form. Every streamed
    /// slice adds its length to `sent` as the transport consumes it.
    pub fn into_transport(self, sent: Arc<watch::Sender<u64>>) -> Result<Form, EncodingError> {
        let mut form = Form::new();
        for part in self.parts {
            form = match part {
                FormPart::Inline { name, data } => form.part(name, streamed(data, &sent)),
                FormPart::Typed {
                    name,
                    mime_type,
                    data,
                } => {
                    let part = with_mime(streamed(data, &sent), &name, &mime_type)?;
                    form.part(name, part)
                }
                FormPart::File {
                    name,
                    file_name,
                    mime_type,
                    data,
                    ..
                } => {
                    let part = streamed(data, &sent).file_name(file_name);
                    let part = with_mime(part, &name, &mime_type)?;
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

fn with_mime(part: Part, field: &str, mime_type: &str) -> Result<Part, EncodingError> {
    part.mime_str(mime_type)
        .map_err(|_| EncodingError::InvalidMimeType {
            field: field.to_string(),
            mime_type: mime_type.to_string(),
        })
}

fn streamed(data: Bytes, sent: &Arc<watch::Sender<u64>>) -> Part {
    let length = data.len() as u64;
    let body = reqwest::Body::wrap_stream(chunked(data, sent.clone()));
    Part::stream_with_length(body, length)
}

fn chunked(
    data: Bytes,
    sent: Arc<watch::Sender<u64>>,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(STREAM_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + STREAM_CHUNK_SIZE).min(data.len())))
        .collect();
    stream::iter(chunks.into_iter().map(move |chunk| {
        sent.send_modify(|total| *total += chunk.len() as u64);
        Ok(chunk)
    }))
}
