use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use std::{env, process};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, ValueHint};
use console::Style;
use indicatif::{
    HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressFinish, ProgressStyle,
};
use memmap2::Mmap;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::extract::{ExtractOptions, Extractor, PartitionReport};
use crate::manifest::Manifest;
use crate::payload::Payload;
use crate::progress::ProgressSink;

// Hz for progress redraws; fewer partitions redraw faster without flicker.
const PROGRESS_UPDATE_FREQUENCY_HIGH: u8 = 2;
const PROGRESS_UPDATE_FREQUENCY_LOW: u8 = 1;

#[derive(Debug, Parser)]
#[clap(
    about,
    author,
    disable_help_subcommand = true,
    help_template = FRIENDLY_HELP,
    propagate_version = true,
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cmd {
    /// OTA file, either a .zip file or a payload.bin.
    #[clap(short = 'p', long = "path", value_hint = ValueHint::FilePath, value_name = "PATH")]
    payload: Option<PathBuf>,

    /// List partitions instead of extracting them
    #[clap(
        conflicts_with = "threads",
        conflicts_with = "output_dir",
        conflicts_with = "partitions",
        conflicts_with = "no_verify",
        long,
        short
    )]
    list: bool,

    /// Number of threads to use during extraction
    #[clap(long, short, value_name = "NUMBER")]
    threads: Option<usize>,

    /// Set output directory
    #[clap(long, short, value_hint = ValueHint::DirPath, value_name = "PATH")]
    output_dir: Option<PathBuf>,

    /// Dump only selected partitions (comma-separated)
    #[clap(long, value_delimiter = ',', value_name = "PARTITIONS")]
    partitions: Vec<String>,

    /// Extract a differential OTA against old partition images
    #[clap(long, short)]
    diff: bool,

    /// Directory with the old partition images for a differential OTA
    #[clap(long, value_hint = ValueHint::DirPath, value_name = "PATH", default_value = "old")]
    old: PathBuf,

    /// Skip hash verification (dangerous!)
    #[clap(long)]
    no_verify: bool,

    /// Positional argument for the payload file
    #[clap(value_hint = ValueHint::FilePath)]
    #[clap(index = 1, value_name = "PATH")]
    positional_payload: Option<PathBuf>,
}

pub enum PayloadSource {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

// Lets PayloadSource be treated like a byte slice regardless of whether the
// payload was memory-mapped or inflated out of a zip archive.
impl Deref for PayloadSource {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            PayloadSource::Mapped(mmap) => mmap,
            PayloadSource::Owned(vec) => vec,
        }
    }
}

/// Per-partition progress bars, shared with the worker pool.
struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ConsoleProgress {
    fn new(partition_count: usize) -> Self {
        let hz = if partition_count > 32 {
            PROGRESS_UPDATE_FREQUENCY_LOW
        } else {
            PROGRESS_UPDATE_FREQUENCY_HIGH
        };
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(hz)),
            bars: Mutex::new(HashMap::new()),
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn partition_started(&self, name: &str, total_ops: u64) {
        let style = ProgressStyle::with_template(
            "{prefix:>16!.green.bold} [{wide_bar:.white.dim}] {percent:>3.white}%",
        )
        .expect("progress bar template is valid")
        .progress_chars("=> ");
        let bar = ProgressBar::new(total_ops)
            .with_finish(ProgressFinish::AndLeave)
            .with_prefix(name.to_string())
            .with_style(style);
        let bar = self.multi.add(bar);
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(name.to_string(), bar);
        }
    }

    fn operation_finished(&self, name: &str) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(name) {
                bar.inc(1);
            }
        }
    }

    fn partition_finished(&self, name: &str) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(name) {
                bar.finish();
            }
        }
    }
}

impl Cmd {
    pub fn run(&self) -> Result<()> {
        if let Some(t) = self.threads {
            if t > 256 {
                bail!(
                    "Thread count must be between 1 and 256, got {}. \
                    Use 0 or omit -t to use all available CPU cores (recommended).",
                    t
                );
            }
        }

        let payload_path = self
            .payload
            .as_ref()
            .or(self.positional_payload.as_ref())
            .context(
                "No payload file specified. Provide one with -p/--path or as a positional \
                 argument, e.g. `oxidump payload.bin` or `oxidump -p ota.zip`.",
            )?
            .clone();

        let payload = self.open_payload_file(&payload_path)?;
        let payload = Payload::parse(&payload)?;
        let manifest = Manifest::parse(&payload).context("unable to parse manifest")?;

        if self.list {
            let mut partitions: Vec<_> = manifest.partitions.iter().collect();
            partitions.sort_unstable_by(|p1, p2| p1.name.cmp(&p2.name));
            let bold_green = Style::new().bold().green();
            for partition in partitions {
                println!(
                    "{} ({})",
                    bold_green.apply_to(&partition.name),
                    HumanBytes(partition.size)
                );
            }
            return Ok(());
        }

        let selected_count = if self.partitions.is_empty() {
            manifest.partitions.len()
        } else {
            self.partitions.len()
        };

        let (partition_dir, created_new_dir) = self.create_partition_dir()?;

        // Ctrl+C removes whatever this run has produced so far.
        let cleanup_state = Arc::new(Mutex::new((partition_dir.clone(), created_new_dir)));
        let cleanup_state_ctrlc = Arc::clone(&cleanup_state);
        ctrlc::set_handler(move || {
            eprintln!("\n\nReceived interrupt signal (Ctrl+C). Cleaning up and exiting...");
            if let Ok(state) = cleanup_state_ctrlc.lock() {
                let (dir, dir_is_new) = &*state;
                if *dir_is_new {
                    let _ = fs::remove_dir_all(dir);
                }
            }
            process::exit(130); // 128 + SIGINT
        })
        .context("Failed to set up Ctrl+C handler")?;

        let bold_yellow = Style::new().bold().yellow();
        let bold_bright_green = Style::new().bold().green();
        eprintln!(
            "\n{}: use {} to cancel safely.",
            bold_yellow.apply_to("Extraction in progress"),
            bold_bright_green.apply_to("Ctrl+C")
        );
        eprintln!("Processing {selected_count} partitions...");
        eprintln!();

        let options = ExtractOptions {
            partitions: self.partitions.clone(),
            threads: self.threads.filter(|&t| t > 0),
            diff_mode: self.diff,
            old_dir: self.diff.then(|| self.old.clone()),
            verify: !self.no_verify,
        };

        let progress = ConsoleProgress::new(selected_count);
        let started = Instant::now();
        let extractor = Extractor::new(&payload, &manifest, &options);
        let reports = extractor.run(&partition_dir, &progress)?;

        // Everything this run created is now accounted for; Ctrl+C after
        // this point must not delete finished images.
        if let Ok(mut state) = cleanup_state.lock() {
            state.1 = false;
        }

        self.report(&reports, &partition_dir, started)
    }

    /// Print the outcome of every partition and fail if any of them failed.
    fn report(
        &self,
        reports: &[PartitionReport],
        partition_dir: &Path,
        started: Instant,
    ) -> Result<()> {
        let bold_red = Style::new().bold().red();
        let failures: Vec<&PartitionReport> =
            reports.iter().filter(|r| r.result.is_err()).collect();
        for report in &failures {
            if let Err(e) = &report.result {
                eprintln!(
                    "{} {}: {}",
                    bold_red.apply_to("FAILED"),
                    report.name,
                    e
                );
            }
        }

        if failures.is_empty() {
            let total: u64 = reports.iter().map(|r| r.bytes).sum();
            println!("\nExtraction completed successfully!");
            println!("Output directory: {}", partition_dir.display());
            println!(
                "Total extracted size: {} in {:.1?}",
                HumanBytes(total),
                started.elapsed()
            );
            Ok(())
        } else {
            bail!(
                "{} of {} partitions failed to extract; the failing images were kept in {} \
                 for inspection",
                failures.len(),
                reports.len(),
                partition_dir.display()
            );
        }
    }

    /// In-memory zip handling: returns a `PayloadSource` enum. If the input
    /// is a zip file, `payload.bin` is read directly into memory instead of
    /// a temp file.
    fn open_payload_file(&self, path: &Path) -> Result<PayloadSource> {
        let file = File::open(path)
            .with_context(|| format!("unable to open file for reading: {path:?}"))?;

        // Attempt to open as a zip archive. If it fails with InvalidArchive,
        // we assume it's a raw payload.bin file.
        match ZipArchive::new(&file) {
            Ok(mut archive) => {
                let mut zipfile = archive
                    .by_name("payload.bin")
                    .context("could not find payload.bin file in archive")?;

                let mut buffer = Vec::with_capacity(zipfile.size() as usize);
                zipfile
                    .read_to_end(&mut buffer)
                    .context("failed to decompress payload.bin from archive")?;
                Ok(PayloadSource::Owned(buffer))
            }
            Err(ZipError::InvalidArchive(_)) => {
                // Not a zip file, so memory-map it directly.
                let mmap = unsafe { Mmap::map(&file) }
                    .with_context(|| format!("failed to mmap file: {path:?}"))?;
                Ok(PayloadSource::Mapped(mmap))
            }
            Err(e) => Err(e).context("failed to open zip archive"),
        }
    }

    fn create_partition_dir(&self) -> Result<(PathBuf, bool)> {
        let base = match &self.output_dir {
            Some(output_base) => output_base.clone(),
            None => env::current_dir().context(
                "Failed to determine current directory. Please specify --output-dir explicitly.",
            )?,
        };
        let dir = base.join(format!("{}", Utc::now().format("extracted_%Y%m%d_%H%M%S")));
        let existed = dir.exists();
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create output directory: {dir:?}"))?;
        Ok((dir, !existed))
    }
}

// Friendlier, task-oriented help template shown for -h/--help
const FRIENDLY_HELP: &str = color_print::cstr!(
    "\
{before-help}<bold><underline>{name} {version}</underline></bold>
{about}

Quick start:
  - Run against an OTA .zip or a bare payload.bin:
    oxidump [path-to-ota.zip|payload.bin]

Common tasks:
  - List partitions only:
    oxidump -l [ota.zip]
  - Extract everything into a timestamped folder:
    oxidump [ota.zip]
  - Extract specific partition(s):
    oxidump [ota.zip] --partitions boot,init_boot
  - Apply a differential OTA against old images in ./old:
    oxidump [ota.zip] --diff --old old
  - Choose output directory and threads:
    oxidump [ota.zip] -o out -t 8

Safety and integrity:
  - Verification is on by default (SHA-256).
  - On a per-partition error the other partitions keep extracting; failing
    images are kept on disk for inspection.

{usage-heading}
{usage}

Options:
{all-args}

{after-help}"
);
