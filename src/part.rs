use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::{Bytes, BytesMut};
use memchr::memchr_iter;

use crate::escape;
use crate::FormError;

/// Content type used when a part declares nothing and nothing can be guessed
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Block size used when streaming a part's payload out of its source
pub(crate) const BLOCK_SIZE: usize = 8192;

/// A rewindable byte source usable as a file part's payload.
///
/// Sources must be seekable so their size can be determined up front and so
/// the payload can be rewound before encoding.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// A single named entry of a multipart form, either a text field or a
/// file-style part backed by a byte source.
///
/// A `Part` does not know the boundary of the form that owns it; the
/// boundary is passed into the render operations by the [`Form`] during
/// encoding, so a part can never be rendered with a stale boundary.
///
/// [`Form`]: crate::Form
pub struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    body: PartBody,
}

enum PartBody {
    Text(String),
    Reader {
        source: Box<dyn ReadSeek>,
        len: u64,
    },
}

impl Part {
    /// Construct a text field part from a name and literal content
    pub fn text<I: Into<String>>(name: I, content: I) -> Result<Self, FormError> {
        let name = name.into();
        let content = content.into();

        if name.is_empty() {
            return Err(FormError::InvalidArgument("name must be a non-empty string"));
        }

        if content.is_empty() {
            return Err(FormError::InvalidArgument(
                "content must be a non-empty string",
            ));
        }

        scan_for_delimiter(content.as_bytes())?;

        Ok(Part {
            name: escape::header_name(&name),
            filename: None,
            content_type: None,
            body: PartBody::Text(content),
        })
    }

    /// Construct a file-style part from any rewindable byte source
    ///
    /// The size of the payload is determined by seeking to the end of the
    /// source and back. When no `content_type` is given it is guessed from
    /// `filename`; the `text/plain` default is only applied when the part's
    /// headers are rendered.
    pub fn reader<I, R>(
        name: I,
        mut source: R,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<Self, FormError>
    where
        I: Into<String>,
        R: Read + Seek + 'static,
    {
        let name = name.into();

        if name.is_empty() {
            return Err(FormError::InvalidArgument("name must be a non-empty string"));
        }

        let len = source_len(&mut source)?;
        scan_source(&mut source)?;

        let content_type = content_type
            .map(str::to_owned)
            .or_else(|| filename.and_then(guess_content_type));

        Ok(Part {
            name: escape::header_name(&name),
            filename: filename.map(escape::file_name),
            content_type,
            body: PartBody::Reader {
                source: Box::new(source),
                len,
            },
        })
    }

    /// Construct a file part from a path on disk
    ///
    /// The filename is taken from the last component of the path and the
    /// content type is guessed from its extension (i.e, `.jpg` will be
    /// `image/jpeg`). The size comes from the file metadata.
    pub fn file<I: Into<String>, P: AsRef<Path>>(name: I, path: P) -> Result<Self, FormError> {
        let name = name.into();
        let path = path.as_ref();

        if name.is_empty() {
            return Err(FormError::InvalidArgument("name must be a non-empty string"));
        }

        if !path.exists() {
            return Err(FormError::NotFound(path.to_path_buf()));
        }

        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        scan_source(&mut file)?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let content_type = mime_guess::from_path(path).first().map(|m| m.to_string());

        Ok(Part {
            name: escape::header_name(&name),
            filename: filename.map(|f| escape::file_name(&f)),
            content_type,
            body: PartBody::Reader {
                source: Box::new(file),
                len,
            },
        })
    }

    /// The part's name, as it will appear in the disposition header
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved filename, if any
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The resolved content type, if any was declared or guessed
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The byte length of the payload alone
    pub fn payload_len(&self) -> u64 {
        match self.body {
            PartBody::Text(ref content) => content.len() as u64,
            PartBody::Reader { len, .. } => len,
        }
    }

    /// The exact byte length of this part's encoded chunk for the given
    /// boundary, including the boundary line, headers, blank line, payload
    /// and trailing CRLF.
    ///
    /// `Content-Length` is derived from this, so it must match what
    /// [`get_bytes`](Part::get_bytes) produces byte for byte.
    pub fn encoded_len(&self, boundary: &str) -> u64 {
        self.write_header(boundary).len() as u64 + self.payload_len() + 2
    }

    /// Render the opening boundary line and header block for this part
    pub fn write_header(&self, boundary: &str) -> Bytes {
        let mut buf = BytesMut::new();
        self.put_header(&mut buf, boundary);
        buf.freeze()
    }

    fn put_header(&self, buf: &mut BytesMut, boundary: &str) {
        buf.extend_from_slice(b"--");
        buf.extend_from_slice(boundary.as_bytes());
        buf.extend_from_slice(b"\r\n");

        buf.extend_from_slice(b"Content-Disposition: form-data; name=\"");
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(b"\"");

        if let Some(ref filename) = self.filename {
            buf.extend_from_slice(b"; filename=\"");
            buf.extend_from_slice(filename.as_bytes());
            buf.extend_from_slice(b"\"");
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(b"Content-Type: ");
        buf.extend_from_slice(
            self.content_type
                .as_deref()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .as_bytes(),
        );
        buf.extend_from_slice(b"\r\n");

        buf.extend_from_slice(b"\r\n");
    }

    /// Render the full encoded chunk for this part
    ///
    /// Byte sources are rewound to their start first, so a seekable part can
    /// be encoded more than once.
    pub fn get_bytes(&mut self, boundary: &str) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        self.put_header(&mut buf, boundary);

        match self.body {
            PartBody::Text(ref content) => {
                buf.extend_from_slice(content.as_bytes());
            }
            PartBody::Reader {
                ref mut source, len,
            } => {
                source.seek(SeekFrom::Start(0))?;

                let mut payload = Vec::with_capacity(len as usize);
                source.read_to_end(&mut payload)?;

                buf.extend_from_slice(&payload);
            }
        }

        buf.extend_from_slice(b"\r\n");

        Ok(buf.freeze())
    }

    pub(crate) fn is_reader(&self) -> bool {
        matches!(self.body, PartBody::Reader { .. })
    }

    pub(crate) fn rewind(&mut self) -> io::Result<()> {
        if let PartBody::Reader { ref mut source, .. } = self.body {
            source.seek(SeekFrom::Start(0))?;
        }

        Ok(())
    }

    /// Read the next payload block from a reader part, `None` at the end
    pub(crate) fn read_block(&mut self) -> io::Result<Option<Bytes>> {
        match self.body {
            PartBody::Text(_) => Ok(None),
            PartBody::Reader { ref mut source, .. } => {
                let mut block = [0u8; BLOCK_SIZE];
                let read = source.read(&mut block)?;

                if read == 0 {
                    Ok(None)
                } else {
                    Ok(Some(Bytes::copy_from_slice(&block[..read])))
                }
            }
        }
    }
}

fn guess_content_type(filename: &str) -> Option<String> {
    mime_guess::from_path(Path::new(filename))
        .first()
        .map(|m| m.to_string())
}

/// Determine the size of a source by seeking to its end and rewinding
fn source_len<R: Seek>(source: &mut R) -> Result<u64, FormError> {
    let len = source
        .seek(SeekFrom::End(0))
        .map_err(|_| FormError::SizeUnavailable)?;

    source
        .seek(SeekFrom::Start(0))
        .map_err(|_| FormError::SizeUnavailable)?;

    Ok(len)
}

/// Read a source from the start and reject content containing a line that
/// looks like a multipart delimiter, rewinding afterwards.
///
/// The source is read in blocks rather than buffered whole; the trailing
/// partial line of each block is carried into the next, and dropped as soon
/// as it can no longer grow into a delimiter line.
///
/// This is a best effort safety check, not a guarantee against a
/// maliciously chosen boundary.
fn scan_source<R: Read + Seek>(source: &mut R) -> Result<(), FormError> {
    let mut block = [0u8; BLOCK_SIZE];
    let mut carry: Vec<u8> = Vec::new();
    let mut mid_line = false;

    loop {
        let read = source.read(&mut block)?;

        if read == 0 {
            break;
        }

        let chunk = &block[..read];
        let mut start = 0;

        for newline in memchr_iter(b'\n', chunk) {
            let line = &chunk[start..newline];

            let hit = if mid_line {
                false
            } else if carry.is_empty() {
                is_delimiter_line(line)
            } else {
                carry.extend_from_slice(line);
                is_delimiter_line(&carry)
            };

            if hit {
                return Err(FormError::BoundaryCollision);
            }

            carry.clear();
            mid_line = false;
            start = newline + 1;
        }

        if !mid_line {
            carry.extend_from_slice(&chunk[start..]);

            if !is_delimiter_prefix(&carry) {
                carry.clear();
                mid_line = true;
            }
        }
    }

    if !mid_line && is_delimiter_line(&carry) {
        return Err(FormError::BoundaryCollision);
    }

    source.seek(SeekFrom::Start(0))?;

    Ok(())
}

fn scan_for_delimiter(contents: &[u8]) -> Result<(), FormError> {
    let mut start = 0;

    for newline in memchr_iter(b'\n', contents) {
        if is_delimiter_line(&contents[start..newline]) {
            return Err(FormError::BoundaryCollision);
        }

        start = newline + 1;
    }

    if is_delimiter_line(&contents[start..]) {
        return Err(FormError::BoundaryCollision);
    }

    Ok(())
}

/// Could `line` still grow into a delimiter line with more bytes appended?
///
/// A trailing `\r` is allowed only as the last byte, since a delimiter line
/// may end `\r\n`.
fn is_delimiter_prefix(line: &[u8]) -> bool {
    line.iter().enumerate().all(|(i, b)| match i {
        0 | 1 => *b == b'-',
        _ => {
            b.is_ascii_alphanumeric() || *b == b'_' || (*b == b'\r' && i == line.len() - 1)
        }
    })
}

/// `--` followed by one or more word characters, spanning the whole line
fn is_delimiter_line(line: &[u8]) -> bool {
    let line = match line.split_last() {
        Some((&b'\r', rest)) => rest,
        _ => line,
    };

    line.len() > 2
        && line.starts_with(b"--")
        && line[2..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'_')
}
