//! # Protocol Frames
//!
//! Request and response envelopes.
//!
//! ## Wire Format
//! - **Request**: `totalLen[4]` (bytes after this field), `callId[4]`, invocation.
//! - **Response**: `callId[4]`, `flag[1]`, `size[4]`, then `size - 9` payload bytes:
//!   `state[4]` followed by either `class[string]` + `message[string]` (error bit)
//!   or one tagged value.
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Size Arithmetic**: The declared `size` counts the 9-byte prefix. The payload
//!   length is `size - 9`, exactly; a smaller size is a protocol violation.

use hwire::Decoder;
use hwire::Encoder;
use hwire::Value;

use crate::error::Error;
use crate::error::Result;
use crate::flag::ResponseFlag;
use crate::invocation::Invocation;

/// Length of the fixed response prefix: call id, flag, size.
pub const PREFIX_LEN: usize = 9;

/// Encodes a request frame, backpatching the leading length.
pub fn encode_request(call_id: u32, invocation: &Invocation) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    let len_pos = enc.reserve_u32();
    enc.u32(call_id);
    invocation.write(&mut enc)?;

    let total = enc.len() - 4;
    let total = u32::try_from(total).map_err(|_| hwire::Error::BlobTooLarge(total))?;
    enc.patch_u32(len_pos, total);
    Ok(enc.into_bytes())
}

/// Decodes the body of a request frame (everything after `totalLen`).
pub fn decode_request(body: &[u8]) -> Result<(u32, Invocation)> {
    let mut dec = Decoder::new(body);
    let call_id = dec.u32()?;
    let invocation = Invocation::read(&mut dec)?;
    Ok((call_id, invocation))
}

/// The fixed-size head of every response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePrefix {
    pub call_id: u32,
    pub flag: ResponseFlag,
    pub size: u32,
}

impl ResponsePrefix {
    pub fn parse(buf: &[u8; PREFIX_LEN]) -> Self {
        let call_id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let flag = ResponseFlag::from_bits(buf[4]);
        let size = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);
        Self { call_id, flag, size }
    }

    pub fn to_bytes(&self) -> [u8; PREFIX_LEN] {
        let mut out = [0u8; PREFIX_LEN];
        out[0..4].copy_from_slice(&self.call_id.to_be_bytes());
        out[4] = self.flag.bits();
        out[5..9].copy_from_slice(&self.size.to_be_bytes());
        out
    }

    /// Bytes still to read after the prefix.
    pub fn payload_len(&self) -> Result<usize> {
        (self.size as usize).checked_sub(PREFIX_LEN).ok_or_else(|| {
            Error::Protocol(format!("declared size {} is smaller than the response prefix", self.size))
        })
    }
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Value(Value),
    Remote { class: String, message: String },
}

impl ResponseBody {
    /// Decodes a payload of exactly `size - 9` bytes.
    ///
    /// The leading state word is reserved and skipped.
    pub fn decode(flag: ResponseFlag, payload: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(payload);
        let _state = dec.i32()?;

        if flag.is_error() {
            let class = dec.string()?.unwrap_or_default().to_string();
            let message = dec.string()?.unwrap_or_default().to_string();
            Ok(Self::Remote { class, message })
        } else {
            Ok(Self::Value(dec.value()?))
        }
    }

    /// Encodes a complete response frame for `call_id`. Peers and test servers use this.
    pub fn encode_frame(&self, call_id: u32) -> Result<Vec<u8>> {
        let mut payload = Encoder::new();
        payload.i32(0);
        let flag = match self {
            Self::Value(v) => {
                payload.value(v)?;
                ResponseFlag::success()
            }
            Self::Remote { class, message } => {
                payload.string(Some(class))?;
                payload.string(Some(message))?;
                ResponseFlag::error()
            }
        };

        let payload = payload.into_bytes();
        let size = PREFIX_LEN + payload.len();
        let size = u32::try_from(size).map_err(|_| hwire::Error::BlobTooLarge(size))?;

        let prefix = ResponsePrefix { call_id, flag, size };
        let mut out = Vec::with_capacity(size as usize);
        out.extend_from_slice(&prefix.to_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_length_is_backpatched() {
        let inv = Invocation::new("echo", vec![]);
        let bytes = encode_request(7, &inv).unwrap();

        let total = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(total, bytes.len() - 4);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 7]);
        assert_eq!(&bytes[8..], &[0x04, b'e', b'c', b'h', b'o', 0, 0, 0, 0]);
    }

    #[test]
    fn test_request_id_survives_into_response_prefix() {
        for id in [0u32, 1, 0x0102_0304, u32::MAX] {
            let req = encode_request(id, &Invocation::new("m", vec![Value::Int(1)])).unwrap();
            let (decoded_id, inv) = decode_request(&req[4..]).unwrap();
            assert_eq!(decoded_id, id);
            assert_eq!(inv.params, vec![Value::Int(1)]);

            let resp = ResponseBody::Value(Value::Null).encode_frame(decoded_id).unwrap();
            let prefix = ResponsePrefix::parse(resp[..PREFIX_LEN].try_into().unwrap());
            assert_eq!(prefix.call_id, id);
        }
    }

    #[test]
    fn test_response_size_counts_prefix() {
        let frame = ResponseBody::Value(Value::from("pong")).encode_frame(0).unwrap();
        let prefix = ResponsePrefix::parse(frame[..PREFIX_LEN].try_into().unwrap());
        assert_eq!(prefix.size as usize, frame.len());
        assert_eq!(prefix.payload_len().unwrap(), frame.len() - PREFIX_LEN);
    }

    #[test]
    fn test_size_smaller_than_prefix_is_protocol_error() {
        let prefix = ResponsePrefix { call_id: 1, flag: ResponseFlag::success(), size: 4 };
        assert!(matches!(prefix.payload_len(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_error_bit_yields_remote_never_value() {
        let frame = ResponseBody::Remote {
            class: "java.io.IOException".into(),
            message: "region offline".into(),
        }
        .encode_frame(3)
        .unwrap();

        let prefix = ResponsePrefix::parse(frame[..PREFIX_LEN].try_into().unwrap());
        let body = ResponseBody::decode(prefix.flag, &frame[PREFIX_LEN..]).unwrap();
        assert_eq!(body, ResponseBody::Remote {
            class: "java.io.IOException".into(),
            message: "region offline".into(),
        });
    }

    #[test]
    fn test_null_remote_strings_become_empty() {
        let mut payload = Encoder::new();
        payload.i32(0);
        payload.string(None).unwrap();
        payload.string(None).unwrap();

        let body = ResponseBody::decode(ResponseFlag::error(), payload.as_bytes()).unwrap();
        assert_eq!(body, ResponseBody::Remote { class: String::new(), message: String::new() });
    }
}
