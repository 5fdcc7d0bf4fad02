use nom::{
    IResult,
    bytes::complete::{tag, take},
    combinator::rest,
    number::complete::{be_u32, be_u64},
};

use crate::error::{Error, Result};

/// Payload file format versions this tool understands.
const SUPPORTED_VERSIONS: [u64; 2] = [1, 2];

/// Android/Chrome OS update payload container.
///
/// The binary layout is:
/// - Magic bytes: "CrAU" (4 bytes)
/// - File format version (8 bytes, big-endian)
/// - Manifest size (8 bytes, big-endian)
/// - [Optional] Metadata signature size (4 bytes, big-endian, only if version >= 2)
/// - Manifest data (variable length, protobuf serialized)
/// - [Optional] Metadata signature (variable length, only if version >= 2)
/// - Payload data (remaining bytes)
#[derive(Debug)]
pub struct Payload<'a> {
    /// Major version of the payload file format.
    pub file_format_version: u64,

    /// Size in bytes of the manifest data that follows.
    manifest_size: u64,

    /// Size of the metadata signature in bytes.
    /// Only present if file_format_version >= 2.
    metadata_signature_size: Option<u32>,

    /// Serialized DeltaArchiveManifest protobuf message.
    pub manifest: &'a [u8],

    /// Cryptographic signature over the metadata (magic bytes through
    /// manifest), as a serialized Signatures protobuf message. Surfaced for
    /// callers to verify externally; this tool does not check it.
    pub metadata_signature: Option<&'a [u8]>,

    /// The data section. Every operation's data_offset is relative to the
    /// start of this slice.
    pub data: &'a [u8],
}

impl<'a> Payload<'a> {
    fn parse_inner(input: &'a [u8]) -> IResult<&'a [u8], Payload<'a>> {
        // Magic must be exactly "CrAU"
        let (input, _magic) = tag(&b"CrAU"[..])(input)?;

        let (input, file_format_version) = be_u64(input)?;
        let (input, manifest_size) = be_u64(input)?;

        // Metadata signature size only exists in version 2+
        let (input, metadata_signature_size) = if file_format_version > 1 {
            let (input, size) = be_u32(input)?;
            (input, Some(size))
        } else {
            (input, None)
        };

        let (input, manifest) = take(manifest_size)(input)?;

        let (input, metadata_signature) = match metadata_signature_size {
            Some(size) => {
                let (input, sig) = take(size)(input)?;
                (input, Some(sig))
            }
            None => (input, None),
        };

        // Everything remaining is the data section
        let (input, data) = rest(input)?;

        Ok((
            input,
            Payload {
                file_format_version,
                manifest_size,
                metadata_signature_size,
                manifest,
                metadata_signature,
                data,
            },
        ))
    }

    /// Parse a payload container from raw bytes.
    ///
    /// Fails with [`Error::MalformedContainer`] on a magic mismatch, an
    /// unsupported format version, or declared lengths that run past the end
    /// of the input.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let payload = match Self::parse_inner(bytes) {
            Ok((_, payload)) => payload,
            Err(e) => return Err(Error::MalformedContainer(e.to_string())),
        };
        if !SUPPORTED_VERSIONS.contains(&payload.file_format_version) {
            return Err(Error::MalformedContainer(format!(
                "unsupported payload version {}",
                payload.file_format_version
            )));
        }
        Ok(payload)
    }

    /// Container-relative byte offset at which the data section begins.
    pub fn data_offset(&self) -> u64 {
        let sig = self.metadata_signature_size.map_or(0, |s| s as u64 + 4);
        4 + 8 + 8 + sig + self.manifest_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(version: u64, manifest: &[u8], sig: Option<&[u8]>, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"CrAU");
        out.extend_from_slice(&version.to_be_bytes());
        out.extend_from_slice(&(manifest.len() as u64).to_be_bytes());
        if version > 1 {
            out.extend_from_slice(&(sig.map_or(0, |s| s.len()) as u32).to_be_bytes());
        }
        out.extend_from_slice(manifest);
        if let Some(sig) = sig {
            out.extend_from_slice(sig);
        }
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn parses_version_2() {
        let bytes = build(2, b"manifest", Some(b"sig"), b"datadata");
        let payload = Payload::parse(&bytes).unwrap();
        assert_eq!(payload.file_format_version, 2);
        assert_eq!(payload.manifest, b"manifest");
        assert_eq!(payload.metadata_signature, Some(&b"sig"[..]));
        assert_eq!(payload.data, b"datadata");
        assert_eq!(payload.data_offset(), 4 + 8 + 8 + 4 + 8 + 3);
    }

    #[test]
    fn parses_version_1_without_signature_field() {
        let bytes = build(1, b"m", None, b"d");
        let payload = Payload::parse(&bytes).unwrap();
        assert_eq!(payload.metadata_signature, None);
        assert_eq!(payload.data, b"d");
        assert_eq!(payload.data_offset(), 4 + 8 + 8 + 1);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = build(2, b"manifest", None, b"");
        bytes[0] = b'X';
        assert!(matches!(
            Payload::parse(&bytes),
            Err(Error::MalformedContainer(_))
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let bytes = build(9, b"manifest", None, b"");
        assert!(matches!(
            Payload::parse(&bytes),
            Err(Error::MalformedContainer(_))
        ));
    }

    #[test]
    fn rejects_truncated_manifest() {
        let mut bytes = build(2, b"manifest", None, b"");
        // Declare a manifest longer than the remaining input.
        bytes[12..20].copy_from_slice(&1000u64.to_be_bytes());
        assert!(matches!(
            Payload::parse(&bytes),
            Err(Error::MalformedContainer(_))
        ));
    }
}
