//! One adapter per operation kind, behind a single dispatch point.
//!
//! Isolating every transform behind one call keeps the operation executor
//! oblivious to which of the kinds it is running. The match below is
//! exhaustive over [`OpKind`], so a new kind will not compile until it is
//! handled here.

use std::borrow::Cow;
use std::io::Read;

use bzip2::read::BzDecoder;
use xz2::read::XzDecoder;

use crate::error::{Error, Result};
use crate::manifest::OpKind;
use crate::patch;

/// What an adapter wants done to the destination extents.
#[derive(Debug)]
pub enum Transform<'a> {
    /// Place these bytes across the destination extents in listed order.
    Bytes(Cow<'a, [u8]>),
    /// Fill every destination byte with this value.
    Fill(u8),
    /// Leave the destination in its current state.
    Skip,
}

/// Run one operation's payload transform.
///
/// `input` is the operation's data blob (empty when the kind carries none)
/// and `source` the concatenated bytes of its source extents, present only
/// for source-reading kinds. `dst_capacity` sizes decompression buffers; the
/// caller enforces the capacity contract when placing the result.
pub fn apply<'a>(
    kind: OpKind,
    input: &'a [u8],
    source: Option<Vec<u8>>,
    dst_capacity: usize,
) -> Result<Transform<'a>> {
    match kind {
        OpKind::Replace => Ok(Transform::Bytes(Cow::Borrowed(input))),
        OpKind::ReplaceBz => {
            decompress(BzDecoder::new(input), dst_capacity, "bzip2").map(owned)
        }
        OpKind::ReplaceXz => decompress(XzDecoder::new(input), dst_capacity, "xz").map(owned),
        OpKind::Zero => Ok(Transform::Fill(0)),
        OpKind::Discard => Ok(Transform::Skip),
        OpKind::SourceCopy => Ok(owned(require_source(kind, source)?)),
        OpKind::SourceBsdiff | OpKind::BrotliBsdiff => {
            let source = require_source(kind, source)?;
            patch::bspatch(&source, input).map(owned)
        }
        OpKind::Puffdiff => {
            let source = require_source(kind, source)?;
            patch::puffpatch(&source, input).map(owned)
        }
    }
}

fn owned<'a>(bytes: Vec<u8>) -> Transform<'a> {
    Transform::Bytes(Cow::Owned(bytes))
}

fn require_source(kind: OpKind, source: Option<Vec<u8>>) -> Result<Vec<u8>> {
    source.ok_or_else(|| {
        Error::MissingSourceData(format!("{} operation has no source bytes", kind.name()))
    })
}

fn decompress(mut reader: impl Read, capacity_hint: usize, codec: &'static str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(capacity_hint);
    reader
        .read_to_end(&mut out)
        .map_err(|source| Error::CodecError { codec, source })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replace_is_identity() {
        let data = b"identity law";
        match apply(OpKind::Replace, data, None, data.len()).unwrap() {
            Transform::Bytes(out) => assert_eq!(out.as_ref(), data),
            other => panic!("unexpected transform: {other:?}"),
        }
    }

    #[test]
    fn zero_fills_regardless_of_input() {
        match apply(OpKind::Zero, b"ignored", None, 64).unwrap() {
            Transform::Fill(0) => {}
            other => panic!("unexpected transform: {other:?}"),
        }
    }

    #[test]
    fn discard_is_a_distinct_no_op() {
        assert!(matches!(
            apply(OpKind::Discard, &[], None, 64).unwrap(),
            Transform::Skip
        ));
    }

    #[test]
    fn bz_round_trip() {
        let plain = vec![7u8; 10000];
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        enc.write_all(&plain).unwrap();
        let packed = enc.finish().unwrap();
        match apply(OpKind::ReplaceBz, &packed, None, plain.len()).unwrap() {
            Transform::Bytes(out) => assert_eq!(out.as_ref(), plain.as_slice()),
            other => panic!("unexpected transform: {other:?}"),
        }
    }

    #[test]
    fn xz_round_trip() {
        let plain: Vec<u8> = (0..10000u32).map(|i| (i % 256) as u8).collect();
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(&plain).unwrap();
        let packed = enc.finish().unwrap();
        match apply(OpKind::ReplaceXz, &packed, None, plain.len()).unwrap() {
            Transform::Bytes(out) => assert_eq!(out.as_ref(), plain.as_slice()),
            other => panic!("unexpected transform: {other:?}"),
        }
    }

    #[test]
    fn malformed_bz_stream_is_a_codec_error() {
        assert!(matches!(
            apply(OpKind::ReplaceBz, b"not bzip2 at all", None, 16),
            Err(Error::CodecError { codec: "bzip2", .. })
        ));
    }

    #[test]
    fn source_copy_passes_bytes_through() {
        let source = vec![3u8, 1, 4, 1, 5];
        match apply(OpKind::SourceCopy, &[], Some(source.clone()), 5).unwrap() {
            Transform::Bytes(out) => assert_eq!(out.as_ref(), source.as_slice()),
            other => panic!("unexpected transform: {other:?}"),
        }
    }

    #[test]
    fn source_kinds_demand_source_bytes() {
        assert!(matches!(
            apply(OpKind::SourceCopy, &[], None, 5),
            Err(Error::MissingSourceData(_))
        ));
    }
}
