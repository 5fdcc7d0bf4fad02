//! Validated, crate-owned view of the payload manifest.
//!
//! The protobuf message is decoded with prost and immediately converted into
//! the types below. Conversion is the single place schema violations are
//! caught; after it succeeds the manifest is immutable and can be shared by
//! reference across every worker.

use std::collections::HashSet;

use prost::Message;

use crate::error::{Error, Result};
use crate::extent::{Extent, PSEUDO_EXTENT_MARKER};
use crate::payload::Payload;
use crate::proto::chromeos_update_engine::{self as proto, install_operation::Type};

/// The operation kinds this tool executes. Closed on purpose: the executor
/// matches exhaustively, so adding a variant forces handling it everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Replace,
    ReplaceBz,
    ReplaceXz,
    Zero,
    Discard,
    SourceCopy,
    SourceBsdiff,
    BrotliBsdiff,
    Puffdiff,
}

impl OpKind {
    /// Kinds that read bytes from the old partition image.
    pub fn reads_source(self) -> bool {
        matches!(
            self,
            OpKind::SourceCopy | OpKind::SourceBsdiff | OpKind::BrotliBsdiff | OpKind::Puffdiff
        )
    }

    /// Kinds that carry a data blob in the payload's data section.
    pub fn needs_blob(self) -> bool {
        !matches!(self, OpKind::Zero | OpKind::Discard | OpKind::SourceCopy)
    }

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Replace => "REPLACE",
            OpKind::ReplaceBz => "REPLACE_BZ",
            OpKind::ReplaceXz => "REPLACE_XZ",
            OpKind::Zero => "ZERO",
            OpKind::Discard => "DISCARD",
            OpKind::SourceCopy => "SOURCE_COPY",
            OpKind::SourceBsdiff => "SOURCE_BSDIFF",
            OpKind::BrotliBsdiff => "BROTLI_BSDIFF",
            OpKind::Puffdiff => "PUFFDIFF",
        }
    }
}

/// Byte range of an operation's data blob within the data section.
#[derive(Debug, Clone, Copy)]
pub struct Blob {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone)]
pub struct InstallOp {
    pub kind: OpKind,
    pub blob: Option<Blob>,
    /// SHA-256 the blob must hash to, when the manifest declares one.
    pub blob_hash: Option<[u8; 32]>,
    pub dst_extents: Vec<Extent>,
    pub src_extents: Vec<Extent>,
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub name: String,
    /// Declared size of the new image in bytes.
    pub size: u64,
    /// Expected SHA-256 of the finished image.
    pub new_hash: Option<[u8; 32]>,
    /// Expected SHA-256 of the old image (diff payloads).
    pub old_hash: Option<[u8; 32]>,
    pub operations: Vec<InstallOp>,
}

impl Partition {
    /// True if any operation needs bytes from the old image.
    pub fn reads_source(&self) -> bool {
        self.operations.iter().any(|op| op.kind.reads_source())
    }
}

#[derive(Debug, Clone)]
pub struct Manifest {
    /// Bytes per block. Power of two, typically 4096.
    pub block_size: u64,
    pub minor_version: u32,
    pub partitions: Vec<Partition>,
    /// Location of the payload signature blob within the data section.
    pub signatures_offset: Option<u64>,
    pub signatures_size: Option<u64>,
}

impl Manifest {
    /// Decode and validate the manifest carried by `payload`.
    pub fn parse(payload: &Payload) -> Result<Self> {
        let raw = proto::DeltaArchiveManifest::decode(payload.manifest)
            .map_err(|e| Error::MalformedManifest(format!("protobuf decode failed: {e}")))?;
        Self::validate(raw, payload.data.len() as u64)
    }

    fn validate(raw: proto::DeltaArchiveManifest, data_len: u64) -> Result<Self> {
        let block_size = raw.block_size() as u64;
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(Error::MalformedManifest(format!(
                "block size {block_size} is not a power of two"
            )));
        }

        let mut names = HashSet::new();
        let mut partitions = Vec::with_capacity(raw.partitions.len());
        for update in &raw.partitions {
            let partition = convert_partition(update, data_len)?;
            if !names.insert(partition.name.clone()) {
                return Err(Error::MalformedManifest(format!(
                    "duplicate partition name {:?}",
                    partition.name
                )));
            }
            partitions.push(partition);
        }

        Ok(Manifest {
            block_size,
            minor_version: raw.minor_version(),
            partitions,
            signatures_offset: raw.signatures_offset,
            signatures_size: raw.signatures_size,
        })
    }

    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }
}

fn convert_partition(update: &proto::PartitionUpdate, data_len: u64) -> Result<Partition> {
    let name = update.partition_name.clone();
    if name.is_empty() {
        return Err(Error::MalformedManifest("empty partition name".into()));
    }

    let size = update
        .new_partition_info
        .as_ref()
        .and_then(|info| info.size)
        .ok_or_else(|| Error::MalformedManifest(format!("partition {name:?} has no size")))?;

    let new_hash = convert_hash(&name, update.new_partition_info.as_ref())?;
    let old_hash = convert_hash(&name, update.old_partition_info.as_ref())?;

    let mut operations = Vec::with_capacity(update.operations.len());
    for (index, op) in update.operations.iter().enumerate() {
        operations.push(
            convert_operation(op, data_len).map_err(|e| match e {
                Error::MalformedManifest(msg) => Error::MalformedManifest(format!(
                    "partition {name:?}, operation #{index}: {msg}"
                )),
                other => other,
            })?,
        );
    }

    Ok(Partition {
        name,
        size,
        new_hash,
        old_hash,
        operations,
    })
}

fn convert_hash(name: &str, info: Option<&proto::PartitionInfo>) -> Result<Option<[u8; 32]>> {
    match info.and_then(|info| info.hash.as_deref()) {
        None => Ok(None),
        Some(hash) => Ok(Some(hash.try_into().map_err(|_| {
            Error::MalformedManifest(format!(
                "partition {name:?} declares a hash of {} bytes, expected 32",
                hash.len()
            ))
        })?)),
    }
}

fn convert_operation(op: &proto::InstallOperation, data_len: u64) -> Result<InstallOp> {
    let kind = match Type::try_from(op.r#type) {
        Ok(Type::Replace) => OpKind::Replace,
        Ok(Type::ReplaceBz) => OpKind::ReplaceBz,
        Ok(Type::ReplaceXz) => OpKind::ReplaceXz,
        Ok(Type::Zero) => OpKind::Zero,
        Ok(Type::Discard) => OpKind::Discard,
        Ok(Type::SourceCopy) => OpKind::SourceCopy,
        Ok(Type::SourceBsdiff) => OpKind::SourceBsdiff,
        Ok(Type::BrotliBsdiff) => OpKind::BrotliBsdiff,
        Ok(Type::Puffdiff) => OpKind::Puffdiff,
        Ok(other) => {
            return Err(Error::MalformedManifest(format!(
                "unsupported operation type {other:?}"
            )));
        }
        Err(_) => {
            return Err(Error::MalformedManifest(format!(
                "unknown operation type value {}",
                op.r#type
            )));
        }
    };

    let blob = match (op.data_offset, op.data_length) {
        (Some(offset), Some(length)) if length > 0 => {
            let end = offset.checked_add(length).ok_or_else(|| {
                Error::MalformedManifest(format!("blob range {offset}+{length} overflows"))
            })?;
            if end > data_len {
                return Err(Error::MalformedManifest(format!(
                    "blob range {offset}+{length} runs past the data section ({data_len} bytes)"
                )));
            }
            Some(Blob { offset, length })
        }
        _ => None,
    };
    if kind.needs_blob() && blob.is_none() {
        return Err(Error::MalformedManifest(format!(
            "{} operation without a data blob",
            kind.name()
        )));
    }

    let blob_hash = match op.data_sha256_hash.as_deref() {
        None => None,
        Some(hash) => Some(hash.try_into().map_err(|_| {
            Error::MalformedManifest(format!(
                "operation data hash of {} bytes, expected 32",
                hash.len()
            ))
        })?),
    };

    let dst_extents: Vec<Extent> = op.dst_extents.iter().map(convert_extent).collect::<Result<_>>()?;
    if dst_extents.is_empty() {
        return Err(Error::MalformedManifest(format!(
            "{} operation without destination extents",
            kind.name()
        )));
    }
    let src_extents: Vec<Extent> = op.src_extents.iter().map(convert_extent).collect::<Result<_>>()?;
    if kind.reads_source() && src_extents.is_empty() {
        return Err(Error::MalformedManifest(format!(
            "{} operation without source extents",
            kind.name()
        )));
    }

    Ok(InstallOp {
        kind,
        blob,
        blob_hash,
        dst_extents,
        src_extents,
    })
}

fn convert_extent(extent: &proto::Extent) -> Result<Extent> {
    let num_blocks = extent
        .num_blocks
        .ok_or_else(|| Error::MalformedManifest("extent without a block count".into()))?;
    if num_blocks == PSEUDO_EXTENT_MARKER {
        return Ok(Extent::Pseudo);
    }
    let start_block = extent
        .start_block
        .ok_or_else(|| Error::MalformedManifest("extent without a start block".into()))?;
    Ok(Extent::Real {
        start_block,
        num_blocks,
    })
}
