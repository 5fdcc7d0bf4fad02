//! The extraction engine: per-operation executor, per-partition pipeline,
//! and the scheduler that fans partitions out across a worker pool.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crossbeam_channel::unbounded;
use memmap2::{Mmap, MmapMut};
use rayon::ThreadPoolBuilder;
use sha2::{Digest, Sha256};

use crate::codec::{self, Transform};
use crate::error::{Error, Result};
use crate::extent::{ExtentsWriter, carve_extents, coalesce_extents, extents_capacity};
use crate::manifest::{InstallOp, Manifest, OpKind, Partition};
use crate::payload::Payload;
use crate::progress::ProgressSink;

/// Caller-chosen knobs for one extraction run.
#[derive(Debug, Default)]
pub struct ExtractOptions {
    /// Partition names to extract; empty means all.
    pub partitions: Vec<String>,
    /// Worker pool bound; `None` uses the hardware concurrency.
    pub threads: Option<usize>,
    /// Apply source-reading operations against old images.
    pub diff_mode: bool,
    /// Directory of `<name>.img` old images, required in diff mode.
    pub old_dir: Option<PathBuf>,
    /// Check blob, source, and output hashes. On by default.
    pub verify: bool,
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self {
            verify: true,
            ..Self::default()
        }
    }
}

/// What happened to one partition.
#[derive(Debug)]
pub struct PartitionReport {
    pub name: String,
    /// Path of the output image. Present even on failure; a partially
    /// written image is kept for diagnosis.
    pub path: PathBuf,
    pub bytes: u64,
    pub result: Result<(), PartitionError>,
}

/// A failure scoped to one partition, with the operation that raised it.
#[derive(Debug)]
pub struct PartitionError {
    /// Index of the failing operation in manifest order, when the failure
    /// happened inside one.
    pub op_index: Option<usize>,
    pub error: Error,
}

impl std::fmt::Display for PartitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.op_index {
            Some(index) => write!(f, "operation #{index}: {}", self.error),
            None => self.error.fmt(f),
        }
    }
}

impl std::error::Error for PartitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs one pipeline per selected partition on a bounded worker pool.
///
/// Partitions have no data dependency on one another; the payload and
/// manifest are shared read-only, and each task exclusively owns its output
/// file. One partition's failure never cancels its siblings.
pub struct Extractor<'a> {
    payload: &'a Payload<'a>,
    manifest: &'a Manifest,
    options: &'a ExtractOptions,
}

impl<'a> Extractor<'a> {
    pub fn new(payload: &'a Payload<'a>, manifest: &'a Manifest, options: &'a ExtractOptions) -> Self {
        Self {
            payload,
            manifest,
            options,
        }
    }

    /// Extract the selected partitions into `output_dir`.
    ///
    /// Fails up front with [`Error::UnknownPartition`] if the selection names
    /// a partition the manifest does not have; per-partition failures are
    /// carried in the returned reports instead. Reports come back in
    /// manifest order.
    pub fn run(
        &self,
        output_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<PartitionReport>> {
        for name in &self.options.partitions {
            if self.manifest.partition(name).is_none() {
                return Err(Error::UnknownPartition(name.clone()));
            }
        }

        let selected: Vec<(usize, &Partition)> = self
            .manifest
            .partitions
            .iter()
            .filter(|p| {
                self.options.partitions.is_empty()
                    || self.options.partitions.iter().any(|name| *name == p.name)
            })
            .enumerate()
            .collect();

        let mut builder = ThreadPoolBuilder::new();
        if let Some(threads) = self.options.threads {
            if threads > 0 {
                builder = builder.num_threads(threads);
            }
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let (sender, receiver) = unbounded();
        pool.scope(|scope| {
            for (index, partition) in &selected {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    progress.partition_started(&partition.name, partition.operations.len() as u64);
                    let report = self.run_partition(partition, output_dir, progress);
                    progress.partition_finished(&partition.name);
                    let _ = sender.send((*index, report));
                });
            }
        });
        drop(sender);

        let mut reports: Vec<(usize, PartitionReport)> = receiver.iter().collect();
        reports.sort_by_key(|&(index, _)| index);
        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }

    /// The pipeline for one partition: old-image verification, every
    /// operation strictly in manifest order, then output verification.
    fn run_partition(
        &self,
        partition: &Partition,
        output_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> PartitionReport {
        let path = output_dir.join(format!("{}.img", partition.name));
        let result = self.extract_partition(partition, &path, progress);
        PartitionReport {
            name: partition.name.clone(),
            path,
            bytes: partition.size,
            result,
        }
    }

    fn extract_partition(
        &self,
        partition: &Partition,
        path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<(), PartitionError> {
        let fatal = |error: Error| PartitionError {
            op_index: None,
            error,
        };

        // Pre-sized, zero-filled output, exclusively ours for the whole run.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| fatal(e.into()))?;
        file.set_len(partition.size).map_err(|e| fatal(e.into()))?;
        let mut output = unsafe { MmapMut::map_mut(&file) }.map_err(|e| fatal(e.into()))?;

        let old = self.open_old_image(partition).map_err(fatal)?;
        if self.options.verify {
            if let (Some(old), Some(expected)) = (old.as_ref(), partition.old_hash.as_ref()) {
                // Hash the old image once, before any operation runs.
                let actual: [u8; 32] = Sha256::digest(&old[..]).into();
                if actual != *expected {
                    return Err(fatal(Error::SourceVerificationFailed {
                        expected: hex::encode(expected),
                        actual: hex::encode(actual),
                    }));
                }
            }
        }

        for (index, op) in partition.operations.iter().enumerate() {
            self.run_op(op, &mut output[..], old.as_ref().map(|m| &m[..]))
                .map_err(|error| PartitionError {
                    op_index: Some(index),
                    error,
                })?;
            progress.operation_finished(&partition.name);
        }

        // Flush before verifying so a mismatching image still lands on disk.
        output.flush().map_err(|e| fatal(e.into()))?;

        if self.options.verify {
            if let Some(expected) = partition.new_hash.as_ref() {
                let actual: [u8; 32] = Sha256::digest(&output[..]).into();
                if actual != *expected {
                    return Err(fatal(Error::PartitionVerificationFailed {
                        expected: hex::encode(expected),
                        actual: hex::encode(actual),
                    }));
                }
            }
        }
        Ok(())
    }

    /// Map the old image for a partition, when the run needs one.
    fn open_old_image(&self, partition: &Partition) -> Result<Option<Mmap>> {
        let needed = partition.reads_source();
        if !needed {
            return Ok(None);
        }
        if !self.options.diff_mode {
            return Err(Error::MissingSourceData(format!(
                "partition {:?} contains source-reading operations; re-run in diff mode \
                 with a directory of old images",
                partition.name
            )));
        }
        let old_dir = self.options.old_dir.as_ref().ok_or_else(|| {
            Error::MissingSourceData("diff mode requires an old-image directory".into())
        })?;
        let path = old_dir.join(format!("{}.img", partition.name));
        let file = File::open(&path).map_err(|e| {
            Error::MissingSourceData(format!("cannot open old image {path:?}: {e}"))
        })?;
        let map = unsafe { Mmap::map(&file) }?;
        Ok(Some(map))
    }

    /// Execute one install operation: fetch, transform, place.
    fn run_op(&self, op: &InstallOp, output: &mut [u8], old: Option<&[u8]>) -> Result<()> {
        // Fetch: the data blob, checked against its declared hash before any
        // transform runs. The container is immutable for the whole run, so a
        // mismatch is never retried.
        let input = match op.blob {
            Some(blob) => self
                .payload
                .data
                .get(blob.offset as usize..(blob.offset + blob.length) as usize)
                .ok_or_else(|| {
                    Error::MalformedManifest("blob range outside the data section".into())
                })?,
            None => &[],
        };
        if self.options.verify {
            if let Some(expected) = op.blob_hash.as_ref() {
                let actual: [u8; 32] = Sha256::digest(input).into();
                if actual != *expected {
                    return Err(Error::DataIntegrityError {
                        expected: hex::encode(expected),
                        actual: hex::encode(actual),
                    });
                }
            }
        }

        // Fetch: source bytes, for the kinds that diff against the old image.
        let source = if op.kind.reads_source() {
            let old = old.ok_or_else(|| {
                Error::MissingSourceData(format!(
                    "{} operation without an old image",
                    op.kind.name()
                ))
            })?;
            Some(gather_source(old, op, self.manifest.block_size)?)
        } else {
            None
        };

        // Pseudo-extents carry no address; only ZERO and DISCARD may list
        // them, and for those they mean "nothing to do here".
        let dst: Vec<_> = match op.kind {
            OpKind::Zero | OpKind::Discard => op
                .dst_extents
                .iter()
                .copied()
                .filter(|e| !e.is_pseudo())
                .collect(),
            _ => {
                if op.dst_extents.iter().any(|e| e.is_pseudo()) {
                    return Err(Error::InvalidExtent(format!(
                        "pseudo-extent in {} destination list",
                        op.kind.name()
                    )));
                }
                op.dst_extents.clone()
            }
        };
        if dst.is_empty() {
            return Ok(());
        }

        let block_size = self.manifest.block_size;
        let capacity = extents_capacity(&dst, block_size, output.len() as u64)?;

        // Transform, then place across the destination extents.
        match codec::apply(op.kind, input, source, capacity as usize)? {
            Transform::Skip => Ok(()),
            Transform::Fill(byte) => {
                for window in carve_extents(output, block_size, &dst)? {
                    window.fill(byte);
                }
                Ok(())
            }
            Transform::Bytes(data) => {
                let produced = data.len() as u64;
                // The output must fill the extents exactly, allowing only a
                // short tail inside the final block.
                let aligned = produced.div_ceil(block_size) * block_size;
                if produced != capacity && aligned != capacity {
                    return Err(Error::ExtentLengthMismatch {
                        expected: capacity,
                        actual: produced,
                    });
                }
                let mut windows = carve_extents(output, block_size, &dst)?;
                coalesce_extents(&mut windows);
                let mut writer = ExtentsWriter::new(windows.as_mut_slice());
                writer.write_all(&data)?;
                Ok(())
            }
        }
    }
}

/// Concatenate the bytes of an operation's source extents, in listed order.
fn gather_source(old: &[u8], op: &InstallOp, block_size: u64) -> Result<Vec<u8>> {
    let mut total = 0usize;
    let mut ranges = Vec::with_capacity(op.src_extents.len());
    for extent in &op.src_extents {
        if extent.is_pseudo() {
            return Err(Error::InvalidExtent(format!(
                "pseudo-extent in {} source list",
                op.kind.name()
            )));
        }
        let (offset, len) = extent.byte_range(block_size)?;
        let end = offset + len;
        if end > old.len() as u64 {
            return Err(Error::MissingSourceData(format!(
                "source extent ends at byte {end} but the old image has {}",
                old.len()
            )));
        }
        ranges.push((offset as usize, len as usize));
        total += len as usize;
    }
    let mut out = Vec::with_capacity(total);
    for (offset, len) in ranges {
        out.extend_from_slice(&old[offset..offset + len]);
    }
    Ok(out)
}
