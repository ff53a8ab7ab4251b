//! Client request bodies forwarded to the pack process.
//!
//! Git clients may gzip the body of a pack request. The body is decoded
//! chunk by chunk as it arrives so a large push never sits in memory.

use crate::{GitError, Result};
use bytes::Bytes;
use flate2::write::GzDecoder;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::io::{self, Write};

/// A lazily produced sequence of request body chunks.
pub type PayloadStream = BoxStream<'static, Result<Bytes>>;

/// Encoding of a request body, from its `Content-Encoding` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    /// The body is forwarded as-is.
    #[default]
    Identity,
    /// The body is gzip-compressed and decoded before forwarding.
    Gzip,
}

impl ContentEncoding {
    /// Parses a `Content-Encoding` header value.
    pub fn from_header(value: Option<&str>) -> Result<Self> {
        let Some(value) = value.map(str::trim) else {
            return Ok(Self::Identity);
        };

        if value.is_empty() || value.eq_ignore_ascii_case("identity") {
            Ok(Self::Identity)
        } else if value.eq_ignore_ascii_case("gzip") || value.eq_ignore_ascii_case("x-gzip") {
            Ok(Self::Gzip)
        } else {
            Err(GitError::UnsupportedEncoding(value.to_string()))
        }
    }
}

/// The body a client sent along with a pack request.
pub enum ClientPayload {
    /// Nothing to forward; ref advertisements carry no body.
    Empty,
    /// A streamed request body.
    Body {
        /// Raw body chunks as received.
        stream: PayloadStream,
        /// How the chunks are encoded.
        encoding: ContentEncoding,
    },
}

impl ClientPayload {
    /// Wraps a request body stream.
    pub fn from_stream<S>(stream: S, encoding: ContentEncoding) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self::Body {
            stream: stream.boxed(),
            encoding,
        }
    }

    /// Wraps a body that is already in memory.
    pub fn from_bytes(body: impl Into<Bytes>, encoding: ContentEncoding) -> Self {
        let body = body.into();
        Self::from_stream(stream::once(async move { Ok(body) }), encoding)
    }

    /// Returns true if there is nothing to forward.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the decoded body chunks.
    pub fn into_stream(self) -> PayloadStream {
        match self {
            Self::Empty => stream::empty().boxed(),
            Self::Body {
                stream,
                encoding: ContentEncoding::Identity,
            } => stream,
            Self::Body {
                stream,
                encoding: ContentEncoding::Gzip,
            } => decode_gzip(stream).boxed(),
        }
    }
}

impl std::fmt::Debug for ClientPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Body { encoding, .. } => f
                .debug_struct("Body")
                .field("encoding", encoding)
                .finish_non_exhaustive(),
        }
    }
}

/// Largest chunk [`decode_gzip`] yields.
pub const MAX_DECODED_CHUNK: usize = 64 * 1024;

struct GzipState {
    input: PayloadStream,
    /// Compressed bytes not yet accepted by the decoder.
    pending: Bytes,
    /// Decoded bytes not yet yielded.
    ready: Bytes,
    decoder: Option<GzDecoder<Vec<u8>>>,
}

/// Decodes a gzip stream incrementally, yielding output as soon as it is available.
///
/// Compressed chunks are fed to the decoder a window at a time and the
/// output is yielded in chunks of at most [`MAX_DECODED_CHUNK`] bytes, so a
/// highly compressed body never expands in memory all at once.
pub fn decode_gzip(input: PayloadStream) -> impl Stream<Item = Result<Bytes>> + Send {
    let state = GzipState {
        input,
        pending: Bytes::new(),
        ready: Bytes::new(),
        decoder: Some(GzDecoder::new(Vec::new())),
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if !state.ready.is_empty() {
                let len = state.ready.len().min(MAX_DECODED_CHUNK);
                let chunk = state.ready.split_to(len);
                return Ok(Some((chunk, state)));
            }

            let Some(decoder) = state.decoder.as_mut() else {
                return Ok(None);
            };

            if !state.pending.is_empty() {
                // Each write decodes at most one output window.
                let accepted = decoder.write(&state.pending).map_err(GitError::InvalidGzip)?;
                if accepted == 0 {
                    return Err(GitError::InvalidGzip(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "trailing data after gzip stream",
                    )));
                }
                let _ = state.pending.split_to(accepted);
                state.ready = Bytes::from(std::mem::take(decoder.get_mut()));
                continue;
            }

            match state.input.next().await {
                Some(chunk) => state.pending = chunk?,
                None => {
                    let Some(decoder) = state.decoder.take() else {
                        return Ok(None);
                    };
                    state.ready = Bytes::from(decoder.finish().map_err(GitError::InvalidGzip)?);
                }
            }
        }
    })
}
