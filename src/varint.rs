use std::fmt;
use bytes::BufMut;

pub enum DecoderResult<T> {
    Finished(T),
    Overflow,
    Pending,
}

/// Incremental decoder, fed one byte at a time.
pub struct U64Decoder {
    res: u64,
    shift: u32,
}

impl U64Decoder {
    pub fn new() -> U64Decoder {
        U64Decoder {
            res: 0,
            shift: 0,
        }
    }

    pub fn input(&mut self, b: u8) -> DecoderResult<u64> {
        if self.shift >= 64 || (self.shift == 63 && (b & 0x7f) > 1) {
            return DecoderResult::Overflow;
        }
        self.res |= ((b & 0x7f) as u64) << self.shift;
        self.shift += 7;
        if (b & 0x80) == 0 {
            DecoderResult::Finished(self.res)
        }
        else {
            DecoderResult::Pending
        }
    }
}

impl Default for U64Decoder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode_usize<T>(value: usize, out: &mut T) where T : BufMut {
    encode_u64(value as u64, out);
}

pub fn encode_u64<T>(mut value: u64, out: &mut T) where T : BufMut {
    loop {
        let seven = value & 0x7f;
        value >>= 7;
        if value != 0 {
            out.put_u8((seven | 0x80) as u8);
        }
        else {
            out.put_u8(seven as u8);
            break;
        }
    }
}

pub fn encoded_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    ValueTooLarge(u8),
    MissingFinalByte,
    MisplacedFinalByte,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for DecodeError {}

/// Decodes a varint that must span exactly the whole of `data`.
pub fn decode_u64(data: &[u8]) -> Result<u64, DecodeError> {
    match decode_prefix(data)? {
        Some((value, len)) if len == data.len() => Ok(value),
        Some(_) => Err(DecodeError::MisplacedFinalByte),
        None => Err(DecodeError::MissingFinalByte),
    }
}

/// Decodes a varint at the start of `data`, which may hold further bytes after it.
///
/// Returns `Ok(None)` if `data` ends before the final byte of the varint, which is the
/// normal case when a frame header has only partially arrived.
pub fn decode_prefix(data: &[u8]) -> Result<Option<(u64, usize)>, DecodeError> {
    let mut decoder = U64Decoder::new();
    for (i, b) in data.iter().enumerate() {
        match decoder.input(*b) {
            DecoderResult::Finished(value) => return Ok(Some((value, i + 1))),
            DecoderResult::Overflow => return Err(DecodeError::ValueTooLarge(64)),
            DecoderResult::Pending => {}
        }
    }
    Ok(None)
}
