//! # Handshake
//!
//! The bytes written once, immediately after the socket connects and before any
//! call frame.
//!
//! ## Wire Format
//! - `magic[4]` = `"hrpc"`
//! - `version[1]` = `3`
//! - `headerLen[4]` (big-endian)
//! - `header[headerLen]` = protocol name (text) + credential presence byte

use hwire::Encoder;

use crate::error::Result;

pub const MAGIC: &[u8; 4] = b"hrpc";
pub const VERSION: u8 = 3;

/// The connection header: which protocol this connection speaks, and who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionHeader {
    protocol: Option<String>,
}

impl ConnectionHeader {
    pub fn new(protocol: Option<String>) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Encodes the header body.
    ///
    /// A missing protocol name is sent as the empty string. The credential slot
    /// always encodes as absent.
    pub fn write(&self, out: &mut Encoder) -> Result<()> {
        out.text(self.protocol.as_deref().unwrap_or(""))?;
        out.bool(false);
        Ok(())
    }
}

/// Encodes the complete handshake preamble for `header`.
pub fn encode_preamble(header: &ConnectionHeader) -> Result<Vec<u8>> {
    let mut body = Encoder::new();
    header.write(&mut body)?;
    let body = body.into_bytes();

    let mut out = Encoder::new();
    out.bytes(MAGIC);
    out.u8(VERSION);
    out.count(body.len())?;
    out.bytes(&body);
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_with_protocol() {
        let mut enc = Encoder::new();
        ConnectionHeader::new(Some("Region".into())).write(&mut enc).unwrap();
        assert_eq!(enc.as_bytes(), &[0x06, b'R', b'e', b'g', b'i', b'o', b'n', 0x00]);
    }

    #[test]
    fn test_header_without_protocol_writes_empty_text() {
        let mut enc = Encoder::new();
        ConnectionHeader::default().write(&mut enc).unwrap();
        assert_eq!(enc.as_bytes(), &[0x00, 0x00]);
    }

    #[test]
    fn test_preamble_layout() {
        let bytes = encode_preamble(&ConnectionHeader::new(Some("p".into()))).unwrap();
        assert_eq!(bytes, vec![
            b'h', b'r', b'p', b'c',
            3,
            0, 0, 0, 3,
            0x01, b'p', 0x00,
        ]);
    }
}
