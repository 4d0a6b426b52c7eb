use std::collections::VecDeque;
use std::io;

use bytes::{Bytes, BytesMut};
use log::debug;

use crate::part::Part;

/// A streaming encoder for a [`Form`], yielding the body block by block
///
/// Text fields are emitted as a single block; file payloads are read in
/// 8 KiB blocks so a large upload is never buffered whole. Concatenating
/// every yielded block reproduces exactly what [`Form::encode`] returns.
///
/// Obtained from [`Form::into_chunks`], which also hands back the headers
/// with the `Content-Length` computed up front.
///
/// [`Form`]: crate::Form
/// [`Form::encode`]: crate::Form::encode
/// [`Form::into_chunks`]: crate::Form::into_chunks
pub struct FormChunks {
    boundary: String,
    parts: VecDeque<Part>,
    state: Option<State>,
    written: u64,
}

enum State {
    WritingField(Part),
    WritingReaderHeader(Part),
    WritingReader(Part),
    Finished,
}

impl FormChunks {
    pub(crate) fn new(boundary: String, parts: Vec<Part>) -> Self {
        let mut chunks = FormChunks {
            boundary,
            parts: parts.into(),
            state: None,
            written: 0,
        };

        chunks.state = Some(chunks.next_item());

        chunks
    }

    /// Gets the boundary used by this body
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn next_item(&mut self) -> State {
        match self.parts.pop_front() {
            Some(part) if part.is_reader() => State::WritingReaderHeader(part),
            Some(part) => State::WritingField(part),
            None => State::Finished,
        }
    }

    fn write_ending(&self) -> Bytes {
        let mut buf = BytesMut::new();

        buf.extend_from_slice(b"--");
        buf.extend_from_slice(self.boundary.as_bytes());
        buf.extend_from_slice(b"--");

        buf.freeze()
    }

    fn emit(&mut self, bytes: Bytes) -> Option<io::Result<Bytes>> {
        self.written += bytes.len() as u64;

        Some(Ok(bytes))
    }
}

impl Iterator for FormChunks {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<io::Result<Bytes>> {
        match self.state.take()? {
            State::WritingField(mut field) => {
                debug!("Writing field: {}", field.name());

                let bytes = match field.get_bytes(&self.boundary) {
                    Ok(bytes) => bytes,
                    Err(err) => return Some(Err(err)),
                };

                self.state = Some(self.next_item());

                self.emit(bytes)
            }
            State::WritingReaderHeader(mut part) => {
                debug!("Writing reader header: {}", part.name());

                if let Err(err) = part.rewind() {
                    return Some(Err(err));
                }

                let bytes = part.write_header(&self.boundary);

                self.state = Some(State::WritingReader(part));

                self.emit(bytes)
            }
            State::WritingReader(mut part) => match part.read_block() {
                Ok(Some(bytes)) => {
                    self.state = Some(State::WritingReader(part));

                    self.emit(bytes)
                }
                Ok(None) => {
                    debug!("Reader finished: {}", part.name());

                    self.state = Some(self.next_item());

                    self.emit(Bytes::from_static(b"\r\n"))
                }
                Err(err) => Some(Err(err)),
            },
            State::Finished => {
                let bytes = self.write_ending();
                self.written += bytes.len() as u64;

                debug!("Finished body, total bytes: {}", self.written);

                Some(Ok(bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::BLOCK_SIZE;
    use crate::Form;
    use bytes::BytesMut;
    use http::header::CONTENT_LENGTH;
    use std::io::Cursor;

    fn collect(chunks: FormChunks) -> Bytes {
        let mut buf = BytesMut::new();

        for block in chunks {
            buf.extend_from_slice(&block.unwrap());
        }

        buf.freeze()
    }

    fn filled_form() -> Form {
        let mut form = Form::with_boundary("AaB03x");

        form.add_field("name1", "value1").unwrap();
        form.add_reader(
            "file",
            Cursor::new(b"Lorem Ipsum\n".to_vec()),
            Some("test.txt"),
            Some("text/plain"),
        )
        .unwrap();
        form.add_field("name2", "value2").unwrap();

        form
    }

    #[test]
    fn chunked_body_matches_buffered_encode() {
        let (buffered, buffered_headers) = filled_form().encode().unwrap();
        let (chunks, headers) = filled_form().into_chunks().unwrap();

        assert_eq!(headers, buffered_headers);
        assert_eq!(collect(chunks), buffered);
    }

    #[test]
    fn content_length_is_known_before_streaming() {
        let (chunks, headers) = filled_form().into_chunks().unwrap();

        let expected: u64 = headers
            .get(CONTENT_LENGTH)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();

        assert_eq!(collect(chunks).len() as u64, expected);
    }

    #[test]
    fn streams_large_payloads_in_blocks() {
        let payload = vec![0x42u8; BLOCK_SIZE * 2 + 100];

        let mut form = Form::with_boundary("AaB03x");
        form.add_reader(
            "file",
            Cursor::new(payload.clone()),
            Some("data.bin"),
            Some("application/octet-stream"),
        )
        .unwrap();

        let (chunks, _) = form.into_chunks().unwrap();
        let blocks: Vec<Bytes> = chunks.map(|block| block.unwrap()).collect();

        // header, three payload blocks, trailing CRLF, closing boundary
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks[1].len(), BLOCK_SIZE);
        assert_eq!(blocks[2].len(), BLOCK_SIZE);
        assert_eq!(blocks[3].len(), 100);

        let mut buf = BytesMut::new();
        for block in &blocks {
            buf.extend_from_slice(block);
        }
        let body = buf.freeze();

        assert!(body.ends_with(b"\r\n--AaB03x--"));
        assert_eq!(
            body.len(),
            blocks[0].len() + payload.len() + 2 + "--AaB03x--".len()
        );
    }

    #[test]
    fn empty_form_yields_only_the_closing_boundary() {
        let (mut chunks, _) = Form::with_boundary("AaB03x").into_chunks().unwrap();

        assert_eq!(&chunks.next().unwrap().unwrap()[..], b"--AaB03x--");
        assert!(chunks.next().is_none());
    }
}
