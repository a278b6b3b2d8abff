//! Frame codec: length prefix, nonce and ciphertext

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    FRAME_OVERHEAD, LENGTH_PREFIX_SIZE, NONCE_SIZE, ProtocolError, ProtocolResult, TAG_SIZE,
};

/// Largest ciphertext a frame may carry for a given plaintext limit
pub const fn max_ciphertext_len(max_plaintext: usize) -> usize {
    max_plaintext + TAG_SIZE
}

/// Total on-wire size of a frame carrying `plaintext_len` bytes
pub const fn frame_len(plaintext_len: usize) -> usize {
    FRAME_OVERHEAD + plaintext_len
}

/// Encode one frame into a single contiguous buffer
///
/// The caller writes the returned buffer in one `write_all` so that a frame
/// is never interleaved with another.
pub fn encode_frame(nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> ProtocolResult<Bytes> {
    if ciphertext.len() < TAG_SIZE {
        return Err(ProtocolError::FrameTooShort {
            size: ciphertext.len(),
            min: TAG_SIZE,
        });
    }

    let len = u32::try_from(ciphertext.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: ciphertext.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + NONCE_SIZE + ciphertext.len());
    buf.put_u32(len);
    buf.put_slice(nonce);
    buf.put_slice(ciphertext);

    Ok(buf.freeze())
}

/// Decode a length prefix and check it against the receiver's limit
///
/// Returns the number of ciphertext bytes that follow the nonce.
pub fn decode_frame_len(
    prefix: [u8; LENGTH_PREFIX_SIZE],
    max_ciphertext: usize,
) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(prefix) as usize;

    if len < TAG_SIZE {
        return Err(ProtocolError::FrameTooShort {
            size: len,
            min: TAG_SIZE,
        });
    }

    if len > max_ciphertext {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: max_ciphertext,
        });
    }

    Ok(len)
}

/// Split a frame body (everything after the length prefix) into nonce and ciphertext
pub fn split_frame_body(body: &[u8]) -> ProtocolResult<([u8; NONCE_SIZE], &[u8])> {
    if body.len() < NONCE_SIZE + TAG_SIZE {
        return Err(ProtocolError::FrameTooShort {
            size: body.len(),
            min: NONCE_SIZE + TAG_SIZE,
        });
    }

    let (nonce, ciphertext) = body.split_at(NONCE_SIZE);
    let nonce: [u8; NONCE_SIZE] = nonce
        .try_into()
        .map_err(|_| ProtocolError::InvalidFrameLength(format!("nonce of {} bytes", nonce.len())))?;

    Ok((nonce, ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_overhead() {
        assert_eq!(FRAME_OVERHEAD, 44);
        assert_eq!(frame_len(0), FRAME_OVERHEAD);
        assert_eq!(frame_len(1000), 1044);
    }

    #[test]
    fn test_encode_frame_layout() {
        let nonce = [7u8; NONCE_SIZE];
        let ciphertext = vec![0xAB; 5 + TAG_SIZE];

        let frame = encode_frame(&nonce, &ciphertext).unwrap();

        assert_eq!(frame.len(), frame_len(5));
        assert_eq!(&frame[..LENGTH_PREFIX_SIZE], &21u32.to_be_bytes());
        assert_eq!(&frame[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + NONCE_SIZE], &nonce);
        assert_eq!(&frame[LENGTH_PREFIX_SIZE + NONCE_SIZE..], ciphertext.as_slice());
    }

    #[test]
    fn test_encode_rejects_ciphertext_without_tag() {
        let err = encode_frame(&[0u8; NONCE_SIZE], &[1, 2, 3]).unwrap_err();
        assert_eq!(err, ProtocolError::FrameTooShort { size: 3, min: TAG_SIZE });
    }

    #[test]
    fn test_decode_frame_len_bounds() {
        let max = max_ciphertext_len(1024);

        assert_eq!(decode_frame_len((TAG_SIZE as u32).to_be_bytes(), max), Ok(TAG_SIZE));
        assert_eq!(decode_frame_len((max as u32).to_be_bytes(), max), Ok(max));

        assert_eq!(
            decode_frame_len(((max + 1) as u32).to_be_bytes(), max),
            Err(ProtocolError::FrameTooLarge { size: max + 1, max })
        );
        assert_eq!(
            decode_frame_len(15u32.to_be_bytes(), max),
            Err(ProtocolError::FrameTooShort { size: 15, min: TAG_SIZE })
        );
        // A hostile prefix must not translate into a huge allocation
        assert!(decode_frame_len(u32::MAX.to_be_bytes(), max).is_err());
    }

    #[test]
    fn test_split_frame_body() {
        let mut body = vec![9u8; NONCE_SIZE];
        body.extend_from_slice(&[1u8; TAG_SIZE + 3]);

        let (nonce, ciphertext) = split_frame_body(&body).unwrap();
        assert_eq!(nonce, [9u8; NONCE_SIZE]);
        assert_eq!(ciphertext.len(), TAG_SIZE + 3);

        assert!(split_frame_body(&body[..NONCE_SIZE + TAG_SIZE - 1]).is_err());
    }
}
