use std::io::{Read, Seek};
use std::path::Path;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use log::debug;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::chunks::FormChunks;
use crate::escape;
use crate::part::Part;
use crate::FormError;

/// The main `Form` struct for assembling multipart/form-data request bodies
///
/// Parts are encoded in insertion order. Encoding is synchronous; a `Form`
/// never opens or closes a part's underlying source, it only seeks and
/// reads.
pub struct Form {
    boundary: String,
    parts: Vec<Part>,
}

impl Form {
    /// Construct a new empty Form with a randomly generated boundary
    pub fn new() -> Self {
        let boundary: String = thread_rng()
            .sample_iter(Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        Form {
            boundary,
            parts: Vec::new(),
        }
    }

    /// Construct a new Form with a given boundary
    ///
    /// The boundary is quoted into a valid wire token: spaces become `+`
    /// and reserved characters are percent-encoded.
    pub fn with_boundary<I: Into<String>>(boundary: I) -> Self {
        Form {
            boundary: escape::boundary_token(&boundary.into()),
            parts: Vec::new(),
        }
    }

    /// Construct a Form holding an initial ordered sequence of parts
    pub fn with_parts(parts: Vec<Part>) -> Self {
        let mut form = Form::new();
        form.parts = parts;
        form
    }

    /// Gets the boundary for the Form
    ///
    /// This is the wire token, after any quoting of the supplied value
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The parts added so far, in insertion order
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Add a text field to the Form
    pub fn add_field<I: Into<String>>(&mut self, name: I, value: I) -> Result<&Part, FormError> {
        let part = Part::text(name, value)?;

        Ok(self.push(part))
    }

    /// Add a file to the Form given a path on disk
    ///
    /// This will guess the Content Type based upon the path (i.e, .jpg will
    /// be `image/jpeg`) and use the path's file name as the part filename.
    pub fn add_file<I: Into<String>, P: AsRef<Path>>(
        &mut self,
        name: I,
        path: P,
    ) -> Result<&Part, FormError> {
        let part = Part::file(name, path)?;

        Ok(self.push(part))
    }

    /// Add a file-style part backed by any rewindable byte source
    pub fn add_reader<I, R>(
        &mut self,
        name: I,
        source: R,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<&Part, FormError>
    where
        I: Into<String>,
        R: Read + Seek + 'static,
    {
        let part = Part::reader(name, source, filename, content_type)?;

        Ok(self.push(part))
    }

    /// Add an already constructed Part to the Form
    pub fn add_part(&mut self, part: Part) -> &Part {
        self.push(part)
    }

    fn push(&mut self, part: Part) -> &Part {
        self.parts.push(part);

        &self.parts[self.parts.len() - 1]
    }

    /// Encode the Form into a complete body plus its `Content-Type` and
    /// `Content-Length` headers
    ///
    /// The body is every part's encoded chunk in insertion order followed by
    /// the closing `--<boundary>--`, with no trailing CRLF. `Content-Length`
    /// always equals the exact byte length of the returned body.
    ///
    /// Parts backed by byte sources are rewound before being read, so
    /// calling `encode` again re-renders the same body.
    pub fn encode(&mut self) -> Result<(Bytes, HeaderMap), FormError> {
        self.encode_with(|_, _, _| ())
    }

    /// Encode the Form, invoking `progress` after each part is written
    ///
    /// The callback receives the part just written, the cumulative bytes
    /// written so far and the total body length. It is called once per
    /// part, in insertion order.
    pub fn encode_with<F>(&mut self, mut progress: F) -> Result<(Bytes, HeaderMap), FormError>
    where
        F: FnMut(&Part, u64, u64),
    {
        let total = self.encoded_len();

        let mut body = BytesMut::with_capacity(total as usize);
        let mut written = 0u64;

        for part in self.parts.iter_mut() {
            debug!("Writing part: {}", part.name());

            let bytes = part.get_bytes(&self.boundary)?;
            written += bytes.len() as u64;
            body.extend_from_slice(&bytes);

            progress(part, written, total);
        }

        body.extend_from_slice(b"--");
        body.extend_from_slice(self.boundary.as_bytes());
        body.extend_from_slice(b"--");

        debug!("Encoded {} parts, total bytes: {}", self.parts.len(), body.len());

        let body = body.freeze();
        let headers = self.headers(body.len() as u64)?;

        Ok((body, headers))
    }

    /// Consume the Form into a streaming chunk iterator plus the headers
    ///
    /// The iterator yields the body block by block without buffering file
    /// payloads, and concatenates to exactly what [`encode`](Form::encode)
    /// returns. `Content-Length` is computed up front from the part sizes.
    pub fn into_chunks(self) -> Result<(FormChunks, HeaderMap), FormError> {
        let headers = self.headers(self.encoded_len())?;

        Ok((FormChunks::new(self.boundary, self.parts), headers))
    }

    /// The exact byte length of the encoded body, without rendering it
    pub fn encoded_len(&self) -> u64 {
        let closing = self.boundary.len() as u64 + 4;

        self.parts
            .iter()
            .map(|part| part.encoded_len(&self.boundary))
            .sum::<u64>()
            + closing
    }

    fn headers(&self, content_length: u64) -> Result<HeaderMap, FormError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&format!(
                "multipart/form-data; boundary=--{}",
                self.boundary
            ))?,
        );
        headers.insert(
            CONTENT_LENGTH,
            HeaderValue::from_str(&content_length.to_string())?,
        );

        Ok(headers)
    }
}

impl Default for Form {
    fn default() -> Self {
        Form::new()
    }
}
