//! Puffdiff patch application.
//!
//! A puffin patch wraps an ordinary bsdiff patch in a container that can
//! additionally describe deflate streams to re-expand ("puff") on both sides
//! before diffing: 4 magic bytes "PUF1", a big-endian u32 header length, the
//! protobuf patch header, then the inner bsdiff patch.
//!
//! When the header lists no deflate streams the puffed data is the raw data
//! and the patch degenerates to plain bsdiff, which is applied here. Patches
//! that do require deflate re-expansion are rejected; see DESIGN.md.

use prost::Message;

use crate::error::{Error, Result};
use crate::patch::bspatch;
use crate::proto::puffin::{PatchHeader, patch_header::PatchType};

const MAGIC: &[u8; 4] = b"PUF1";

/// Apply a puffin patch to `old`, producing the new bytes.
pub fn puffpatch(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    if patch.len() < 8 || &patch[..4] != MAGIC {
        return Err(Error::PatchApplyError(
            "not a puffin patch (bad magic)".into(),
        ));
    }
    let header_len = u32::from_be_bytes(patch[4..8].try_into().unwrap()) as usize;
    let body_start = 8usize
        .checked_add(header_len)
        .filter(|&end| end <= patch.len())
        .ok_or_else(|| {
            Error::PatchApplyError(format!(
                "puffin header of {header_len} bytes runs past the patch"
            ))
        })?;

    let header = PatchHeader::decode(&patch[8..body_start])
        .map_err(|e| Error::PatchApplyError(format!("puffin header decode failed: {e}")))?;

    match header.r#type() {
        PatchType::Bsdiff => {}
        PatchType::Zucchini => {
            return Err(Error::PatchApplyError(
                "puffin patch carries a zucchini payload, which is not supported".into(),
            ));
        }
    }
    if !header.src_deflates.is_empty() || !header.dst_deflates.is_empty() {
        return Err(Error::PatchApplyError(
            "puffin patch requires deflate re-expansion, which is not supported".into(),
        ));
    }

    let out = bspatch(old, &patch[body_start..])?;
    if header.dst_puff_size != 0 && out.len() as u64 != header.dst_puff_size {
        return Err(Error::PatchApplyError(format!(
            "puffin patch produced {} bytes, header declares {}",
            out.len(),
            header.dst_puff_size
        )));
    }
    Ok(out)
}
