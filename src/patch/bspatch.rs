//! bsdiff patch application.
//!
//! Two framings share the same control/diff/extra layout:
//! - "BSDIFF40": all three streams bzip2 compressed (classic bsdiff 4.x,
//!   used by SOURCE_BSDIFF operations).
//! - "BSDF2" + three compressor ids: per-stream raw/bzip2/brotli compression
//!   (used by BROTLI_BSDIFF operations).
//!
//! The header is 8 magic bytes followed by three 8-byte sign-magnitude
//! little-endian integers: compressed control length, compressed diff length,
//! and output length. The control stream is a sequence of triples
//! (diff length, extra length, source seek).

use std::io::Read;

use bzip2::read::BzDecoder;

use crate::error::{Error, Result};

const MAGIC_BSDIFF40: &[u8; 8] = b"BSDIFF40";
const MAGIC_BSDF2: &[u8; 5] = b"BSDF2";
const HEADER_LEN: usize = 32;

/// Per-stream compression in a BSDF2 patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamCodec {
    Raw,
    Bz2,
    Brotli,
}

impl StreamCodec {
    fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(StreamCodec::Raw),
            1 => Ok(StreamCodec::Bz2),
            2 => Ok(StreamCodec::Brotli),
            other => Err(Error::PatchApplyError(format!(
                "unknown BSDF2 compressor id {other}"
            ))),
        }
    }

    fn decode(self, input: &[u8]) -> Result<Vec<u8>> {
        let corrupt = |e: std::io::Error| {
            Error::PatchApplyError(format!("corrupt patch stream: {e}"))
        };
        match self {
            StreamCodec::Raw => Ok(input.to_vec()),
            StreamCodec::Bz2 => {
                let mut out = Vec::new();
                BzDecoder::new(input)
                    .read_to_end(&mut out)
                    .map_err(corrupt)?;
                Ok(out)
            }
            StreamCodec::Brotli => {
                let mut out = Vec::new();
                brotli::Decompressor::new(input, 4096)
                    .read_to_end(&mut out)
                    .map_err(corrupt)?;
                Ok(out)
            }
        }
    }
}

/// Sign-magnitude little-endian integer, as written by bsdiff.
fn read_offt(buf: &[u8]) -> i64 {
    let mut value = (buf[7] & 0x7f) as i64;
    for &byte in buf[..7].iter().rev() {
        value = (value << 8) | byte as i64;
    }
    if buf[7] & 0x80 != 0 { -value } else { value }
}

struct PatchStreams {
    control: Vec<u8>,
    diff: Vec<u8>,
    extra: Vec<u8>,
    new_size: usize,
}

fn split_patch(patch: &[u8]) -> Result<PatchStreams> {
    if patch.len() < HEADER_LEN {
        return Err(Error::PatchApplyError(format!(
            "patch of {} bytes is shorter than the {HEADER_LEN}-byte header",
            patch.len()
        )));
    }

    let codecs = if patch.starts_with(MAGIC_BSDIFF40) {
        [StreamCodec::Bz2; 3]
    } else if patch.starts_with(MAGIC_BSDF2) {
        [
            StreamCodec::from_id(patch[5])?,
            StreamCodec::from_id(patch[6])?,
            StreamCodec::from_id(patch[7])?,
        ]
    } else {
        return Err(Error::PatchApplyError(
            "unrecognized patch magic".into(),
        ));
    };

    let control_len = read_offt(&patch[8..16]);
    let diff_len = read_offt(&patch[16..24]);
    let new_size = read_offt(&patch[24..32]);
    if control_len < 0 || diff_len < 0 || new_size < 0 {
        return Err(Error::PatchApplyError(
            "negative length in patch header".into(),
        ));
    }
    let (control_len, diff_len, new_size) =
        (control_len as usize, diff_len as usize, new_size as usize);

    let diff_start = HEADER_LEN
        .checked_add(control_len)
        .ok_or_else(|| Error::PatchApplyError("patch header lengths overflow".into()))?;
    let extra_start = diff_start
        .checked_add(diff_len)
        .ok_or_else(|| Error::PatchApplyError("patch header lengths overflow".into()))?;
    if extra_start > patch.len() {
        return Err(Error::PatchApplyError(format!(
            "patch declares {control_len}+{diff_len} stream bytes but only {} remain",
            patch.len() - HEADER_LEN
        )));
    }

    Ok(PatchStreams {
        control: codecs[0].decode(&patch[HEADER_LEN..diff_start])?,
        diff: codecs[1].decode(&patch[diff_start..extra_start])?,
        extra: codecs[2].decode(&patch[extra_start..])?,
        new_size,
    })
}

/// Apply a bsdiff patch to `old`, producing the new bytes.
pub fn bspatch(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let streams = split_patch(patch)?;
    let PatchStreams {
        control,
        diff,
        extra,
        new_size,
    } = streams;

    let mut out = Vec::with_capacity(new_size);
    let mut old_pos: i64 = 0;
    let mut diff_pos = 0usize;
    let mut extra_pos = 0usize;
    let mut ctrl = control.as_slice();

    while out.len() < new_size {
        if ctrl.len() < 24 {
            return Err(Error::PatchApplyError(
                "control stream ended before the output was complete".into(),
            ));
        }
        let diff_len = read_offt(&ctrl[0..8]);
        let extra_len = read_offt(&ctrl[8..16]);
        let seek = read_offt(&ctrl[16..24]);
        ctrl = &ctrl[24..];

        if diff_len < 0 || extra_len < 0 {
            return Err(Error::PatchApplyError(
                "negative length in control triple".into(),
            ));
        }
        let (diff_len, extra_len) = (diff_len as usize, extra_len as usize);

        if out.len() + diff_len + extra_len > new_size {
            return Err(Error::PatchApplyError(
                "control stream writes past the declared output size".into(),
            ));
        }
        if diff_pos + diff_len > diff.len() || extra_pos + extra_len > extra.len() {
            return Err(Error::PatchApplyError(
                "control triple reads past its data stream".into(),
            ));
        }
        if old_pos < 0 {
            return Err(Error::PatchApplyError(
                "patch seeks before the start of the source".into(),
            ));
        }

        // Diff block: add source bytes to diff bytes. Source reads past the
        // end act as zeros, matching the reference patcher.
        let base = old_pos as usize;
        for (i, &diff_byte) in diff[diff_pos..diff_pos + diff_len].iter().enumerate() {
            let old_byte = old.get(base + i).copied().unwrap_or(0);
            out.push(old_byte.wrapping_add(diff_byte));
        }
        diff_pos += diff_len;
        old_pos += diff_len as i64;

        // Extra block: verbatim new bytes.
        out.extend_from_slice(&extra[extra_pos..extra_pos + extra_len]);
        extra_pos += extra_len;

        old_pos = old_pos
            .checked_add(seek)
            .ok_or_else(|| Error::PatchApplyError("source seek overflows".into()))?;
    }

    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    use bzip2::Compression;
    use bzip2::write::BzEncoder;

    pub(crate) fn write_offt(value: i64) -> [u8; 8] {
        let magnitude = value.unsigned_abs();
        let mut buf = magnitude.to_le_bytes();
        if value < 0 {
            buf[7] |= 0x80;
        }
        buf
    }

    fn bz(data: &[u8]) -> Vec<u8> {
        let mut enc = BzEncoder::new(Vec::new(), Compression::best());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// Build a BSDIFF40 patch from control triples and raw streams.
    pub(crate) fn make_bsdiff40(
        triples: &[(i64, i64, i64)],
        diff: &[u8],
        extra: &[u8],
        new_size: i64,
    ) -> Vec<u8> {
        let mut control = Vec::new();
        for &(d, e, s) in triples {
            control.extend_from_slice(&write_offt(d));
            control.extend_from_slice(&write_offt(e));
            control.extend_from_slice(&write_offt(s));
        }
        let control = bz(&control);
        let diff = bz(diff);
        let extra = bz(extra);

        let mut patch = Vec::new();
        patch.extend_from_slice(MAGIC_BSDIFF40);
        patch.extend_from_slice(&write_offt(control.len() as i64));
        patch.extend_from_slice(&write_offt(diff.len() as i64));
        patch.extend_from_slice(&write_offt(new_size));
        patch.extend_from_slice(&control);
        patch.extend_from_slice(&diff);
        patch.extend_from_slice(&extra);
        patch
    }

    #[test]
    fn offt_round_trips() {
        for value in [0i64, 1, -1, 255, -4096, i64::MAX / 2] {
            assert_eq!(read_offt(&write_offt(value)), value);
        }
    }

    #[test]
    fn identity_patch_reproduces_source() {
        let old = b"the quick brown fox jumps over the lazy dog";
        let diff = vec![0u8; old.len()];
        let patch = make_bsdiff40(&[(old.len() as i64, 0, 0)], &diff, &[], old.len() as i64);
        assert_eq!(bspatch(old, &patch).unwrap(), old);
    }

    #[test]
    fn diff_and_extra_blocks_combine() {
        let old = [10u8, 20, 30, 40];
        // Add one to each source byte, then append two literal bytes.
        let patch = make_bsdiff40(&[(4, 2, 0)], &[1, 1, 1, 1], &[7, 8], 6);
        assert_eq!(bspatch(&old, &patch).unwrap(), vec![11, 21, 31, 41, 7, 8]);
    }

    #[test]
    fn negative_seek_revisits_source() {
        let old = [5u8, 6];
        // Two triples, the second rewinding the source to the start.
        let patch = make_bsdiff40(&[(2, 0, -2), (2, 0, 0)], &[0, 0, 1, 1], &[], 4);
        assert_eq!(bspatch(&old, &patch).unwrap(), vec![5, 6, 6, 7]);
    }

    #[test]
    fn bsdf2_with_raw_streams() {
        let mut patch = Vec::new();
        patch.extend_from_slice(MAGIC_BSDF2);
        patch.extend_from_slice(&[0, 0, 0]); // raw, raw, raw
        let control: Vec<u8> = [write_offt(0), write_offt(3), write_offt(0)].concat();
        patch.extend_from_slice(&write_offt(control.len() as i64));
        patch.extend_from_slice(&write_offt(0));
        patch.extend_from_slice(&write_offt(3));
        patch.extend_from_slice(&control);
        patch.extend_from_slice(b"abc");
        assert_eq!(bspatch(b"", &patch).unwrap(), b"abc");
    }

    #[test]
    fn bsdf2_with_brotli_streams() {
        let brotli_compress = |data: &[u8]| {
            let mut out = Vec::new();
            {
                let mut w = brotli::CompressorWriter::new(&mut out, 4096, 9, 22);
                w.write_all(data).unwrap();
            }
            out
        };
        let control: Vec<u8> = [write_offt(2), write_offt(1), write_offt(0)].concat();
        let (control, diff, extra) = (
            brotli_compress(&control),
            brotli_compress(&[1, 1]),
            brotli_compress(b"z"),
        );
        let mut patch = Vec::new();
        patch.extend_from_slice(MAGIC_BSDF2);
        patch.extend_from_slice(&[2, 2, 2]);
        patch.extend_from_slice(&write_offt(control.len() as i64));
        patch.extend_from_slice(&write_offt(diff.len() as i64));
        patch.extend_from_slice(&write_offt(3));
        patch.extend_from_slice(&control);
        patch.extend_from_slice(&diff);
        patch.extend_from_slice(&extra);
        assert_eq!(bspatch(&[1, 2], &patch).unwrap(), vec![2, 3, b'z']);
    }

    #[test]
    fn rejects_unknown_magic() {
        let patch = vec![0u8; 40];
        assert!(matches!(
            bspatch(b"", &patch),
            Err(Error::PatchApplyError(_))
        ));
    }

    #[test]
    fn rejects_truncated_patch() {
        let old = b"abcd";
        let diff = vec![0u8; 4];
        let mut patch = make_bsdiff40(&[(4, 0, 0)], &diff, &[], 4);
        patch.truncate(patch.len() / 2);
        assert!(matches!(
            bspatch(old, &patch),
            Err(Error::PatchApplyError(_))
        ));
    }

    #[test]
    fn rejects_control_overrun() {
        // Output size says 8 but the control stream only produces 4.
        let patch = make_bsdiff40(&[(4, 0, 0)], &[0, 0, 0, 0], &[], 8);
        assert!(matches!(
            bspatch(b"abcd", &patch),
            Err(Error::PatchApplyError(_))
        ));
    }
}
