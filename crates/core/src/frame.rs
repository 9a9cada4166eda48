use bytes::{BufMut, Bytes, BytesMut};
use probehub_shared::{HubError, HubResult};

/// Size of the two big-endian u32 length fields.
pub const HEADER_LEN: usize = 8;

/// Codec for the binary transfer frame pushed to agents:
///
/// ```text
/// u32 controlLen (BE) | u32 artifactLen (BE) | control bytes | artifact bytes
/// ```
///
/// A frame always travels as a single binary message on the duplex channel,
/// so the decoder assumes message boundaries align with frame boundaries.
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a control message plus an optional artifact into one frame.
    /// An empty artifact degenerates to a pure control message
    /// (artifactLen = 0, no artifact bytes appended).
    pub fn encode(control: &[u8], artifact: &[u8]) -> HubResult<Bytes> {
        let control_len = u32::try_from(control.len())
            .map_err(|_| HubError::MalformedFrame("control message exceeds u32 length".into()))?;
        let artifact_len = u32::try_from(artifact.len())
            .map_err(|_| HubError::MalformedFrame("artifact exceeds u32 length".into()))?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + control.len() + artifact.len());
        buf.put_u32(control_len);
        buf.put_u32(artifact_len);
        buf.put_slice(control);
        buf.put_slice(artifact);
        Ok(buf.freeze())
    }

    /// Decode a frame back into `(control, artifact)`.
    ///
    /// Fails with `TruncatedFrame` when fewer bytes are available than the
    /// header declares, and with `TrailingData` when bytes remain beyond the
    /// declared total. Decoding never partially consumes the buffer.
    pub fn decode(buf: &[u8]) -> HubResult<(Bytes, Bytes)> {
        if buf.len() < HEADER_LEN {
            return Err(HubError::TruncatedFrame {
                declared: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let control_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let artifact_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;

        let declared = control_len
            .checked_add(artifact_len)
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| HubError::MalformedFrame("declared lengths overflow".into()))?;

        if buf.len() < declared {
            return Err(HubError::TruncatedFrame {
                declared,
                actual: buf.len(),
            });
        }
        if buf.len() > declared {
            return Err(HubError::TrailingData {
                declared,
                actual: buf.len(),
            });
        }

        let control = Bytes::copy_from_slice(&buf[HEADER_LEN..HEADER_LEN + control_len]);
        let artifact = Bytes::copy_from_slice(&buf[HEADER_LEN + control_len..declared]);
        Ok((control, artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_control_and_artifact() {
        let control = b"load:coverage";
        let artifact = vec![0xCAu8, 0xFE, 0xBA, 0xBE, 0x00, 0x01];
        let frame = FrameCodec::encode(control, &artifact).unwrap();
        let (c, a) = FrameCodec::decode(&frame).unwrap();
        assert_eq!(c.as_ref(), control);
        assert_eq!(a.as_ref(), artifact.as_slice());
    }

    #[test]
    fn round_trip_empty_artifact() {
        let frame = FrameCodec::encode(b"ping", &[]).unwrap();
        assert_eq!(frame.len(), HEADER_LEN + 4);
        let (c, a) = FrameCodec::decode(&frame).unwrap();
        assert_eq!(c.as_ref(), b"ping");
        assert!(a.is_empty());
    }

    #[test]
    fn known_layout() {
        // artifact = 10 bytes [0..9], control = "load:demo" (9 bytes):
        // total 8+9+10 = 27, header [0,0,0,9, 0,0,0,10].
        let artifact: Vec<u8> = (0u8..10).collect();
        let frame = FrameCodec::encode(b"load:demo", &artifact).unwrap();
        assert_eq!(frame.len(), 27);
        assert_eq!(&frame[..8], &[0, 0, 0, 9, 0, 0, 0, 10]);
        assert_eq!(&frame[8..17], b"load:demo");
        assert_eq!(&frame[17..], artifact.as_slice());

        let (c, a) = FrameCodec::decode(&frame).unwrap();
        assert_eq!(c.as_ref(), b"load:demo");
        assert_eq!(a.as_ref(), artifact.as_slice());
    }

    #[test]
    fn truncated_header() {
        let err = FrameCodec::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, HubError::TruncatedFrame { actual: 3, .. }));
    }

    #[test]
    fn truncated_body() {
        let mut frame = FrameCodec::encode(b"load:demo", &[1, 2, 3]).unwrap().to_vec();
        frame.truncate(frame.len() - 1);
        let err = FrameCodec::decode(&frame).unwrap_err();
        assert_eq!(
            err,
            HubError::TruncatedFrame {
                declared: 20,
                actual: 19
            }
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut frame = FrameCodec::encode(b"x", &[9]).unwrap().to_vec();
        frame.push(0xFF);
        let err = FrameCodec::decode(&frame).unwrap_err();
        assert_eq!(
            err,
            HubError::TrailingData {
                declared: 10,
                actual: 11
            }
        );
    }

    #[test]
    fn overflowing_lengths_are_malformed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u32::MAX.to_be_bytes());
        buf.extend_from_slice(&u32::MAX.to_be_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        let err = FrameCodec::decode(&buf).unwrap_err();
        // On 64-bit the sum fits in usize and reads as truncated instead.
        assert!(matches!(
            err,
            HubError::MalformedFrame(_) | HubError::TruncatedFrame { .. }
        ));
    }
}
