//! Binary layout of a session archive.
//!
//! ```text
//! header   "TSAR" | version: u32 BE | entry count: u32 BE | content version: [u8; 32]
//! entry    varint name len | name (UTF-8) | varint raw len | varint compressed len
//!          | crc32 of compressed: u32 BE | zstd-compressed content
//! trailer  BLAKE3 of everything above: [u8; 32]
//! ```

use std::collections::BTreeMap;

use tether_types::{ArchiveVersion, CredentialState};

use crate::error::{CodecError, CodecResult};
use crate::names::validate_entry_name;

pub(crate) const MAGIC: &[u8; 4] = b"TSAR";
pub(crate) const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 32;
const TRAILER_LEN: usize = 32;

/// Encode a non-empty credential state.
pub(crate) fn encode(state: &CredentialState, level: i32) -> CodecResult<(Vec<u8>, ArchiveVersion)> {
    if state.is_empty() {
        return Err(CodecError::EmptyInput);
    }
    let version = state.version();

    let mut out = Vec::with_capacity(HEADER_LEN + state.total_bytes() as usize / 2 + TRAILER_LEN);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&(state.len() as u32).to_be_bytes());
    out.extend_from_slice(version.as_bytes());

    for (name, content) in state.iter() {
        validate_entry_name(name)?;
        let compressed = zstd::encode_all(content, level)
            .map_err(|e| CodecError::CompressionFailed(e.to_string()))?;

        encode_varint(&mut out, name.len() as u64);
        out.extend_from_slice(name.as_bytes());
        encode_varint(&mut out, content.len() as u64);
        encode_varint(&mut out, compressed.len() as u64);
        out.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
        out.extend_from_slice(&compressed);
    }

    let checksum = *blake3::hash(&out).as_bytes();
    out.extend_from_slice(&checksum);
    Ok((out, version))
}

/// Decode and fully verify an archive.
pub(crate) fn decode(data: &[u8]) -> CodecResult<CredentialState> {
    if data.len() < HEADER_LEN + TRAILER_LEN {
        return Err(CodecError::Truncated {
            offset: data.len() as u64,
            reason: "archive shorter than header and trailer".into(),
        });
    }
    if &data[0..4] != MAGIC {
        return Err(CodecError::InvalidMagic {
            expected: String::from_utf8_lossy(MAGIC).into(),
            actual: String::from_utf8_lossy(&data[0..4]).into(),
        });
    }
    let version = read_u32(data, 4)?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let body_end = data.len() - TRAILER_LEN;
    let computed = blake3::hash(&data[..body_end]);
    if computed.as_bytes() != &data[body_end..] {
        return Err(CodecError::ChecksumMismatch);
    }

    let count = read_u32(data, 8)? as usize;
    if count == 0 {
        return Err(CodecError::EmptyInput);
    }
    let mut header_version = [0u8; 32];
    header_version.copy_from_slice(&data[12..HEADER_LEN]);
    let header_version = ArchiveVersion::from_hash(header_version);

    let body = &data[..body_end];
    let mut pos = HEADER_LEN;
    let mut files = BTreeMap::new();

    for _ in 0..count {
        let name_len = read_varint(body, &mut pos)? as usize;
        let name_bytes = take(body, &mut pos, name_len, "entry name")?;
        let name = String::from_utf8(name_bytes.to_vec()).map_err(|_| {
            CodecError::InvalidEntryName {
                name: String::from_utf8_lossy(name_bytes).into(),
                reason: "not valid UTF-8".into(),
            }
        })?;
        validate_entry_name(&name)?;

        let raw_len = read_varint(body, &mut pos)?;
        let compressed_len = read_varint(body, &mut pos)? as usize;
        let crc = read_u32(body, pos)?;
        pos += 4;
        let compressed = take(body, &mut pos, compressed_len, "entry content")?;

        if crc32fast::hash(compressed) != crc {
            return Err(CodecError::CrcMismatch { name });
        }
        let content = zstd::decode_all(compressed)
            .map_err(|e| CodecError::DecompressionFailed(e.to_string()))?;
        if content.len() as u64 != raw_len {
            return Err(CodecError::DecompressionFailed(format!(
                "entry {name}: expected {raw_len} bytes, got {}",
                content.len()
            )));
        }
        if files.insert(name.clone(), content).is_some() {
            return Err(CodecError::DuplicateEntry(name));
        }
    }

    if pos != body_end {
        return Err(CodecError::Truncated {
            offset: pos as u64,
            reason: format!("{} unexpected bytes after last entry", body_end - pos),
        });
    }

    let state: CredentialState = files.into_iter().collect();
    let actual = state.version();
    if actual != header_version {
        return Err(CodecError::VersionMismatch {
            expected: header_version.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(state)
}

fn read_u32(data: &[u8], offset: usize) -> CodecResult<u32> {
    let bytes = data.get(offset..offset + 4).ok_or_else(|| CodecError::Truncated {
        offset: offset as u64,
        reason: "truncated u32".into(),
    })?;
    let mut arr = [0u8; 4];
    arr.copy_from_slice(bytes);
    Ok(u32::from_be_bytes(arr))
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize, what: &str) -> CodecResult<&'a [u8]> {
    let end = pos.checked_add(len).filter(|end| *end <= data.len()).ok_or_else(|| {
        CodecError::Truncated {
            offset: *pos as u64,
            reason: format!("{what} runs past end of archive"),
        }
    })?;
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}

fn read_varint(data: &[u8], pos: &mut usize) -> CodecResult<u64> {
    let rest = data.get(*pos..).unwrap_or_default();
    let (value, consumed) = decode_varint(rest).map_err(|reason| CodecError::Truncated {
        offset: *pos as u64,
        reason: reason.into(),
    })?;
    *pos += consumed;
    Ok(value)
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8]) -> Result<(u64, usize), &'static str> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if shift >= 64 {
            return Err("varint overflow");
        }
    }
    Err("truncated varint")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CredentialState {
        CredentialState::new()
            .with_file("creds.json", br#"{"noiseKey":"abc"}"#.to_vec())
            .with_file("app-state-sync-key-AAA.json", b"key".to_vec())
    }

    #[test]
    fn varint_roundtrip() {
        for value in [0u64, 1, 127, 128, 300, 1_000_000, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            let (decoded, consumed) = decode_varint(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn decode_varint_truncated() {
        assert_eq!(decode_varint(&[0x80]), Err("truncated varint"));
    }

    #[test]
    fn header_layout() {
        let state = sample();
        let (bytes, version) = encode(&state, 3).unwrap();
        assert_eq!(&bytes[0..4], b"TSAR");
        assert_eq!(&bytes[4..8], &1u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &2u32.to_be_bytes());
        assert_eq!(&bytes[12..44], version.as_bytes());
    }

    #[test]
    fn bad_magic() {
        let (mut bytes, _) = encode(&sample(), 3).unwrap();
        bytes[0..4].copy_from_slice(b"PK\x03\x04");
        assert!(matches!(decode(&bytes), Err(CodecError::InvalidMagic { .. })));
    }

    #[test]
    fn bad_version() {
        let (mut bytes, _) = encode(&sample(), 3).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_be_bytes());
        assert!(matches!(decode(&bytes), Err(CodecError::UnsupportedVersion(99))));
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let (mut bytes, _) = encode(&sample(), 3).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(decode(&bytes), Err(CodecError::ChecksumMismatch)));
    }

    #[test]
    fn truncated_stream() {
        let (bytes, _) = encode(&sample(), 3).unwrap();
        assert!(matches!(decode(&bytes[..10]), Err(CodecError::Truncated { .. })));
        // Cutting the tail removes the real trailer, so the checksum no longer matches.
        assert!(decode(&bytes[..bytes.len() - 5]).is_err());
    }

    #[test]
    fn empty_state_rejected() {
        assert!(matches!(
            encode(&CredentialState::new(), 3),
            Err(CodecError::EmptyInput)
        ));
    }

    #[test]
    fn forged_entry_count_detected() {
        let (mut bytes, _) = encode(&sample(), 3).unwrap();
        bytes[8..12].copy_from_slice(&3u32.to_be_bytes());
        let end = bytes.len() - TRAILER_LEN;
        let checksum = *blake3::hash(&bytes[..end]).as_bytes();
        bytes[end..].copy_from_slice(&checksum);
        assert!(matches!(decode(&bytes), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn forged_header_version_detected() {
        let (mut bytes, _) = encode(&sample(), 3).unwrap();
        bytes[12] ^= 0x01;
        let end = bytes.len() - TRAILER_LEN;
        let checksum = *blake3::hash(&bytes[..end]).as_bytes();
        bytes[end..].copy_from_slice(&checksum);
        assert!(matches!(decode(&bytes), Err(CodecError::VersionMismatch { .. })));
    }
}
