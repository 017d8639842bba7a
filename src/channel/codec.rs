//! Transport framing with optional Snappy compression.
//!
//! Frames stay length-delimited either way; compression only transforms the payload between the
//! length prefix and the serializer. Writers stream-encode through a Snappy frame encoder,
//! readers fully decompress into a buffer before handing the payload up.

use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};
use snap::read::FrameDecoder;
use snap::write::FrameEncoder;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Length-delimited frame codec, optionally Snappy-compressing every frame payload.
///
/// Both endpoints of a connection must agree on the mode; TLS connections negotiate it through
/// their ALPN token, plain TCP endpoints must simply be configured alike.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
    snappy: bool,
}

impl FrameCodec {
    pub fn new(compression: bool) -> FrameCodec {
        FrameCodec { inner: LengthDelimitedCodec::new(), snappy: compression }
    }

    pub fn plain() -> FrameCodec {
        FrameCodec::new(false)
    }

    pub fn snappy() -> FrameCodec {
        FrameCodec::new(true)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        if !self.snappy {
            return self.inner.encode(item, dst);
        }
        let mut encoder = FrameEncoder::new(Vec::with_capacity(item.len() / 2 + 8));
        encoder.write_all(&item)?;
        let compressed = encoder
            .into_inner()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.into_error()))?;
        self.inner.encode(Bytes::from(compressed), dst)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        let frame = match self.inner.decode(src)? {
            Some(frame) => frame,
            None => return Ok(None),
        };
        if !self.snappy {
            return Ok(Some(frame));
        }
        let mut payload = Vec::with_capacity(frame.len() * 2);
        FrameDecoder::new(frame.as_ref())
            .read_to_end(&mut payload)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(Some(BytesMut::from(payload.as_slice())))
    }
}
