//! JPEG boundary framing for an undelimited MJPEG byte stream.
//!
//! The transcoder writes back-to-back JPEG images with no length prefix.
//! [`JpegFrameCodec`] recovers them by scanning for the start-of-image
//! (`FF D8`) and end-of-image (`FF D9`) markers. A marker split across two
//! reads is never consumed early: a trailing `FF` stays in the buffer until
//! the following byte arrives.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ScreenflowError;

/// Largest encoded frame accepted before the stream is declared malformed.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const MARKER: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Dropping bytes until a start-of-image marker.
    SeekingStart,
    /// Inside a frame; `scanned` bytes from the buffer head are known not
    /// to begin an end-of-image marker.
    SeekingEnd { scanned: usize },
}

/// Splits an MJPEG byte stream into complete JPEG buffers.
#[derive(Debug)]
pub struct JpegFrameCodec {
    state: ParseState,
    max_frame_bytes: usize,
}

impl Default for JpegFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegFrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            state: ParseState::SeekingStart,
            max_frame_bytes,
        }
    }

    fn find_pair(buf: &[u8], from: usize, second: u8) -> Result<usize, usize> {
        let mut i = from;
        while i + 1 < buf.len() {
            if buf[i] == MARKER && buf[i + 1] == second {
                return Ok(i);
            }
            i += 1;
        }
        // `i` is the first position whose pair could not be checked yet.
        Err(i)
    }
}

impl tokio_util::codec::Decoder for JpegFrameCodec {
    type Item = Bytes;
    type Error = ScreenflowError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ParseState::SeekingStart => match Self::find_pair(src, 0, SOI) {
                    Ok(start) => {
                        src.advance(start);
                        self.state = ParseState::SeekingEnd { scanned: 2 };
                    }
                    Err(_) => {
                        let keep = usize::from(src.last() == Some(&MARKER));
                        let drop = src.len() - keep;
                        src.advance(drop);
                        return Ok(None);
                    }
                },
                ParseState::SeekingEnd { scanned } => match Self::find_pair(src, scanned, EOI) {
                    Ok(end) => {
                        let frame = src.split_to(end + 2).freeze();
                        self.state = ParseState::SeekingStart;
                        return Ok(Some(frame));
                    }
                    Err(next) => {
                        if src.len() > self.max_frame_bytes {
                            return Err(ScreenflowError::FrameTooLarge {
                                size: src.len(),
                                max: self.max_frame_bytes,
                            });
                        }
                        self.state = ParseState::SeekingEnd { scanned: next };
                        return Ok(None);
                    }
                },
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // A truncated trailing frame is discarded.
                buf.clear();
                self.state = ParseState::SeekingStart;
                Ok(None)
            }
        }
    }
}
