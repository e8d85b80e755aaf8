use std::fmt;
use std::io;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use crate::varint::{self, decode_prefix, encode_u64, encode_usize, encoded_len};
use crate::error::Error;

/// Identifier of one stream within a session.
///
/// Odd numbers are allocated by the side that dialed the connection, even numbers by the side
/// that accepted it. Zero is never used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub fn is_odd(&self) -> bool {
        self.0 % 2 == 1
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Open,         // 0
    Data,         // 1
    WindowUpdate, // 2
    Close,        // 3
    Reset,        // 4
}

impl FrameKind {
    fn to_raw(self) -> u8 {
        match self {
            FrameKind::Open => 0,
            FrameKind::Data => 1,
            FrameKind::WindowUpdate => 2,
            FrameKind::Close => 3,
            FrameKind::Reset => 4,
        }
    }

    fn from_raw(num: u8) -> Result<Self, Error> {
        match num {
            0 => Ok(FrameKind::Open),
            1 => Ok(FrameKind::Data),
            2 => Ok(FrameKind::WindowUpdate),
            3 => Ok(FrameKind::Close),
            4 => Ok(FrameKind::Reset),
            _ => Err(Error::Protocol(format!("unknown frame kind {}", num))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub stream_id: StreamId,
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn open(stream_id: StreamId) -> Self {
        Frame { stream_id, kind: FrameKind::Open, payload: Bytes::new() }
    }

    pub fn data(stream_id: StreamId, payload: Bytes) -> Self {
        Frame { stream_id, kind: FrameKind::Data, payload }
    }

    pub fn window_update(stream_id: StreamId, increment: u64) -> Self {
        let mut payload = BytesMut::with_capacity(encoded_len(increment));
        encode_u64(increment, &mut payload);
        Frame { stream_id, kind: FrameKind::WindowUpdate, payload: payload.freeze() }
    }

    pub fn close(stream_id: StreamId) -> Self {
        Frame { stream_id, kind: FrameKind::Close, payload: Bytes::new() }
    }

    pub fn reset(stream_id: StreamId) -> Self {
        Frame { stream_id, kind: FrameKind::Reset, payload: Bytes::new() }
    }

    /// Credit increment carried by a `WindowUpdate` frame.
    pub fn window_increment(&self) -> Result<u64, Error> {
        varint::decode_u64(&self.payload)
            .map_err(|e| Error::Protocol(format!("bad window update on stream {}: {}", self.stream_id, e)))
    }
}

/// Frame layout: `varint(stream << 3 | kind) varint(len) payload`.
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        FrameCodec { max_frame_size }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        // Only consume bytes once the whole frame has arrived.
        let (header, header_len) = match decode_prefix(src).map_err(varint_error)? {
            Some(v) => v,
            None => return Ok(None),
        };
        let (payload_len, len_len) = match decode_prefix(&src[header_len..]).map_err(varint_error)? {
            Some(v) => v,
            None => return Ok(None),
        };
        let payload_len = payload_len as usize;
        if payload_len > self.max_frame_size {
            return Err(Error::Protocol(format!(
                "frame payload of {} bytes exceeds limit of {}", payload_len, self.max_frame_size)));
        }
        let offset = header_len + len_len;
        if src.len() < offset + payload_len {
            src.reserve(offset + payload_len - src.len());
            return Ok(None);
        }

        let kind = FrameKind::from_raw((header & 0x7) as u8)?;
        let stream_id = StreamId(header >> 3);
        if stream_id.0 == 0 {
            return Err(Error::Protocol(String::from("frame for stream 0")));
        }
        src.advance(offset);
        let payload = src.split_to(payload_len).freeze();
        Ok(Some(Frame { stream_id, kind, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(Error::Io(io::ErrorKind::UnexpectedEof.into())),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        if frame.payload.len() > self.max_frame_size {
            return Err(Error::Protocol(format!(
                "refusing to send {} byte frame, limit is {}", frame.payload.len(), self.max_frame_size)));
        }
        let header = (frame.stream_id.0 << 3) | (frame.kind.to_raw() as u64);
        dst.reserve(encoded_len(header) + encoded_len(frame.payload.len() as u64) + frame.payload.len());
        encode_u64(header, dst);
        encode_usize(frame.payload.len(), dst);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

fn varint_error(e: varint::DecodeError) -> Error {
    Error::Protocol(format!("bad varint in frame header: {}", e))
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};
    use super::{Frame, FrameCodec, FrameKind, StreamId};
    use crate::error::Error;

    fn encode(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new(1024).encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn data_frame_layout() {
        let buf = encode(Frame::data(StreamId(3), Bytes::from_static(b"hi")));
        assert_eq!(&buf[..], &[(3 << 3) | 1, 2, b'h', b'i']);
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let full = encode(Frame::data(StreamId(200), Bytes::from_static(b"hello")));
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        for (i, b) in full.iter().enumerate() {
            buf.extend_from_slice(&[*b]);
            let res = codec.decode(&mut buf).unwrap();
            if i + 1 < full.len() {
                assert!(res.is_none());
            }
            else {
                let frame = res.unwrap();
                assert_eq!(frame.stream_id, StreamId(200));
                assert_eq!(frame.kind, FrameKind::Data);
                assert_eq!(&frame.payload[..], b"hello");
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = encode(Frame::open(StreamId(2)));
        buf.extend_from_slice(&encode(Frame::window_update(StreamId(2), 70000)));
        buf.extend_from_slice(&encode(Frame::close(StreamId(2))));
        let mut codec = FrameCodec::new(1024);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().kind, FrameKind::Open);
        let update = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(update.window_increment().unwrap(), 70000);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().kind, FrameKind::Close);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        FrameCodec::new(4096).encode(Frame::data(StreamId(1), Bytes::from(vec![0; 2000])), &mut buf).unwrap();
        assert!(matches!(FrameCodec::new(1024).decode(&mut buf), Err(Error::Protocol(_))));
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut buf = BytesMut::from(&[(1 << 3) | 7, 0][..]);
        assert!(matches!(FrameCodec::new(1024).decode(&mut buf), Err(Error::Protocol(_))));
    }

    #[test]
    fn truncated_frame_at_eof() {
        let full = encode(Frame::data(StreamId(1), Bytes::from_static(b"abc")));
        let mut buf = BytesMut::from(&full[..full.len() - 1]);
        assert!(matches!(FrameCodec::new(1024).decode_eof(&mut buf), Err(Error::Io(_))));
        assert!(FrameCodec::new(1024).decode_eof(&mut BytesMut::new()).unwrap().is_none());
    }
}
