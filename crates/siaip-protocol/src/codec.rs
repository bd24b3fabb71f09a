//! Tokio codec for SIA-IP chunk framing.
//!
//! Panels terminate every frame with `\r`. TCP does not preserve message
//! boundaries, so the decoder buffers bytes and yields one chunk per `\r`,
//! terminator included. Several frames in one read yield several chunks;
//! a frame split across reads is reassembled before it is yielded.
//!
//! # Architecture
//!
//! ```text
//! TCP Stream -> Decoder -> Bytes (one \r-terminated chunk)
//! ResponseFrame -> Encoder -> TCP Stream (\n...\r envelope)
//! Bytes (prebuilt panel frame) -> Encoder -> TCP Stream
//! ```
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use siaip_protocol::{ResponseFrame, SiaCodec};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> siaip_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:7000").await?;
//! let mut framed = Framed::new(stream, SiaCodec::new());
//!
//! if let Some(Ok(chunk)) = framed.next().await {
//!     println!("Received {} bytes", chunk.len());
//!     framed.send(ResponseFrame::ack("0001", "L0", "1234")).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # DoS Protection
//!
//! A chunk longer than the maximum frame size (default 64 KB) is an error;
//! the connection is expected to be closed by the caller.
//!
//! # End of stream
//!
//! Bytes left in the buffer when the peer closes are yielded as a final
//! chunk, unless they are only whitespace.

use bytes::{Bytes, BytesMut};
use siaip_core::constants::{DEFAULT_MAX_FRAME_SIZE, FRAME_END};
use siaip_core::{Error, Result};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::ResponseFrame;

/// Tokio codec splitting the inbound stream into `\r`-terminated chunks.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::Decoder;
/// use siaip_protocol::SiaCodec;
///
/// let mut codec = SiaCodec::new();
/// let mut buffer = BytesMut::from(&b"\nAAAA0004BODY\r\nBB"[..]);
///
/// let chunk = codec.decode(&mut buffer).unwrap().unwrap();
/// assert_eq!(&chunk[..], b"\nAAAA0004BODY\r");
/// assert!(codec.decode(&mut buffer).unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct SiaCodec {
    /// Maximum allowed chunk size in bytes, terminator included.
    max_frame_size: usize,

    /// Offset up to which the buffer is known to hold no terminator.
    scanned: usize,
}

impl SiaCodec {
    /// Create a codec with the default maximum frame size (64 KB).
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom maximum frame size.
    ///
    /// # Example
    ///
    /// ```
    /// use siaip_protocol::SiaCodec;
    ///
    /// let codec = SiaCodec::with_max_frame_size(1024);
    /// assert_eq!(codec.max_frame_size(), 1024);
    /// ```
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            scanned: 0,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn too_large(&self, size: usize) -> Error {
        Error::FrameTooLarge {
            size,
            max_size: self.max_frame_size,
        }
    }
}

impl Default for SiaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SiaCodec {
    type Item = Bytes;
    type Error = Error;

    /// Split the next `\r`-terminated chunk off `src`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(chunk))` - a complete chunk, terminator included
    /// - `Ok(None)` - no terminator buffered yet
    /// - `Err(Error::FrameTooLarge)` - the chunk exceeds the size limit
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let start = self.scanned.min(src.len());
        match src[start..].iter().position(|&b| b == FRAME_END) {
            Some(offset) => {
                let end = start + offset + 1;
                self.scanned = 0;
                if end > self.max_frame_size {
                    return Err(self.too_large(end));
                }
                Ok(Some(src.split_to(end).freeze()))
            }
            None => {
                self.scanned = src.len();
                if src.len() > self.max_frame_size {
                    return Err(self.too_large(src.len()));
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }

        self.scanned = 0;
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        Ok(Some(src.split().freeze()))
    }
}

impl Encoder<ResponseFrame> for SiaCodec {
    type Error = Error;

    /// Write the reply envelope to `dst`.
    fn encode(&mut self, item: ResponseFrame, dst: &mut BytesMut) -> Result<()> {
        let bytes = item.to_bytes();
        if bytes.len() > self.max_frame_size {
            return Err(self.too_large(bytes.len()));
        }
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

impl Encoder<Bytes> for SiaCodec {
    type Error = Error;

    /// Write an already built frame unchanged (panel side).
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.max_frame_size {
            return Err(self.too_large(item.len()));
        }
        dst.extend_from_slice(&item);
        Ok(())
    }
}
