//! ## Synchronous multipart/form-data encoding
//!
//! This crate assembles named fields and file uploads into a
//! `multipart/form-data` body plus the `Content-Type` and `Content-Length`
//! headers a caller must send with it. It is only the encoder: sending the
//! body is left to whatever HTTP client you use.
//!
//! ```
//! use mpart_form::Form;
//!
//! # fn main() -> Result<(), mpart_form::FormError> {
//! let mut form = Form::with_boundary("AaB03x");
//! form.add_field("name", "value")?;
//!
//! let (body, headers) = form.encode()?;
//!
//! assert_eq!(headers["content-length"], body.len().to_string());
//! # Ok(())
//! # }
//! ```
//!
//! Large uploads can be streamed block by block instead of buffered, with
//! the headers still available up front:
//!
//! ```no_run
//! use mpart_form::Form;
//!
//! # fn main() -> Result<(), mpart_form::FormError> {
//! let mut form = Form::new();
//! form.add_file("upload", "/path/to/video.mp4")?;
//!
//! let (chunks, headers) = form.into_chunks()?;
//!
//! for block in chunks {
//!     let block = block?;
//!     // write the block to the transport
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

mod chunks;
mod escape;
mod form;
mod part;

pub use chunks::FormChunks;
pub use form::Form;
pub use part::{Part, ReadSeek, DEFAULT_CONTENT_TYPE};

/// Errors raised while building or encoding a form
///
/// Everything is raised synchronously at the offending call and nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum FormError {
    /// A name, content or source argument was empty or otherwise unusable
    #[error("Invalid Argument: {0}")]
    InvalidArgument(&'static str),

    /// The path given to a file constructor does not exist
    #[error("File '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    /// A line resembling a multipart delimiter was found in part contents
    #[error("Boundary was found in part contents")]
    BoundaryCollision,

    /// The size of a byte source could not be determined by seeking
    #[error("Unable to determine the size of the source")]
    SizeUnavailable,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Header(#[from] http::header::InvalidHeaderValue),
}
