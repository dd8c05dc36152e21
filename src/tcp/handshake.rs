use bytes::BufMut;

use crate::error::TransportError;

/// The one-shot handshake that opens every connection: the connecting side's
/// listening port, as ASCII digits zero-padded left to exactly ten
/// characters. Nothing else precedes application packets on the wire.
pub struct PortAnnouncement {
    pub port: u16,
}

impl PortAnnouncement {
    pub const SERIALIZED_LEN: usize = 10;

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_slice(format!("{:010}", self.port).as_bytes());
    }

    /// Ten ASCII digits, nothing else. Ten digits can encode values beyond
    /// any real port; those are rejected as invalid rather than truncated.
    pub fn deser(raw: &[u8; Self::SERIALIZED_LEN]) -> Result<PortAnnouncement, TransportError> {
        if !raw.iter().all(u8::is_ascii_digit) {
            return Err(TransportError::HandshakeInvalid(
                String::from_utf8_lossy(raw).into_owned(),
            ));
        }

        // all-digit input is valid UTF-8 and fits a u64
        let text = std::str::from_utf8(raw).expect("ASCII digits are valid UTF-8");
        let value: u64 = text.parse().expect("10 ASCII digits fit a u64");

        let port = u16::try_from(value)
            .map_err(|_| TransportError::HandshakeInvalid(text.to_owned()))?;
        Ok(PortAnnouncement { port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use rstest::rstest;

    #[rstest]
    #[case::wire_example(4000, b"0000004000")]
    #[case::short(1440, b"0000001440")]
    #[case::zero(0, b"0000000000")]
    #[case::max(65535, b"0000065535")]
    fn test_ser(#[case] port: u16, #[case] expected: &[u8; 10]) {
        let mut buf = BytesMut::new();
        PortAnnouncement { port }.ser(&mut buf);
        assert_eq!(buf.as_ref(), expected);
    }

    #[rstest]
    #[case(0)]
    #[case(80)]
    #[case(1440)]
    #[case(65535)]
    fn test_roundtrip(#[case] port: u16) {
        let mut buf = BytesMut::new();
        PortAnnouncement { port }.ser(&mut buf);

        let raw: [u8; 10] = buf.as_ref().try_into().unwrap();
        assert_eq!(PortAnnouncement::deser(&raw).unwrap().port, port);
    }

    #[rstest]
    #[case::letters(b"00000abc00")]
    #[case::space_padded(b"      4000")]
    #[case::signed(b"-000004000")]
    #[case::port_out_of_range(b"0000070000")]
    #[case::way_out_of_range(b"9999999999")]
    fn test_deser_invalid(#[case] raw: &[u8; 10]) {
        assert!(matches!(
            PortAnnouncement::deser(raw),
            Err(TransportError::HandshakeInvalid(_))
        ));
    }
}
