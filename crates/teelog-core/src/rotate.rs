//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Size-rotated append-only log files."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

const MEGABYTE: u64 = 1024 * 1024;
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const GZIP_SUFFIX: &str = ".gz";

/// Limits applied to every rotated log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Size in bytes after which the active file is rotated out.
    pub max_bytes: u64,
    /// Number of rotated backups retained.
    pub max_backups: usize,
    /// Backups older than this are removed.
    pub max_age: Duration,
    /// Gzip rotated-out backups.
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * MEGABYTE,
            max_backups: 20,
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            compress: true,
        }
    }
}

/// Append-only file that rotates itself once it grows past the policy limit.
///
/// Cloning shares the underlying file; every record is written under one lock
/// so concurrent writers never interleave partial records.
#[derive(Debug, Clone)]
pub struct RotatingFile {
    inner: Arc<Mutex<RotatingState>>,
}

#[derive(Debug)]
struct RotatingState {
    path: PathBuf,
    policy: RotationPolicy,
    file: Option<File>,
    size: u64,
}

impl RotatingFile {
    /// Rotating file at `path` with the fixed default policy.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_policy(path, RotationPolicy::default())
    }

    /// Rotating file at `path` with an explicit policy.
    pub fn with_policy(path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RotatingState {
                path: path.into(),
                policy,
                file: None,
                size: 0,
            })),
        }
    }

    /// Path of the active file.
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Append one whole record, rotating first if it would overflow the file.
    pub fn append(&self, record: &[u8]) -> io::Result<()> {
        self.inner.lock().append(record)
    }
}

impl RotatingState {
    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        let incoming = record.len() as u64;
        if self.file.is_none() {
            self.open()?;
        }
        if self.size > 0 && self.size + incoming > self.policy.max_bytes {
            self.rotate()?;
        }
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(record)?;
                self.size += incoming;
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "log file not open")),
        }
    }

    fn open(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        let stamp = Local::now().format(BACKUP_TIME_FORMAT).to_string();
        let backup = unused_backup_path(&self.path, &stamp);
        fs::rename(&self.path, &backup)?;
        self.open()?;
        if self.policy.compress {
            if let Err(err) = compress(&backup) {
                eprintln!("unable to compress rotated log {} ({err})", backup.display());
            }
        }
        if let Err(err) = prune_backups(&self.path, &self.policy) {
            eprintln!(
                "unable to prune rotated logs for {} ({err})",
                self.path.display()
            );
        }
        Ok(())
    }
}

fn split_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    (stem, extension)
}

/// Name a rotated-out copy of `path`; `seq` disambiguates equal stamps.
fn backup_path(path: &Path, stamp: &str, seq: u32) -> PathBuf {
    let (stem, extension) = split_name(path);
    let name = match seq {
        0 => format!("{stem}-{stamp}{extension}"),
        seq => format!("{stem}-{stamp}-{seq}{extension}"),
    };
    path.with_file_name(name)
}

/// First backup name for `stamp` not taken by a plain or compressed backup.
fn unused_backup_path(path: &Path, stamp: &str) -> PathBuf {
    let mut seq = 0;
    loop {
        let candidate = backup_path(path, stamp, seq);
        if !candidate.exists() && !gzip_path(&candidate).exists() {
            return candidate;
        }
        seq += 1;
    }
}

fn gzip_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(GZIP_SUFFIX);
    PathBuf::from(name)
}

/// Replace `path` with a gzip copy next to it.
fn compress(path: &Path) -> io::Result<PathBuf> {
    let target = gzip_path(path);
    let mut input = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&target)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)?;
    Ok(target)
}

/// Ordering key of a backup stamp: the timestamp, then the collision counter.
fn stamp_key(stamp: &str) -> (String, u32) {
    match stamp.rsplit_once('-') {
        Some((base, seq)) => match seq.parse() {
            Ok(seq) => (base.to_owned(), seq),
            Err(_) => (stamp.to_owned(), 0),
        },
        None => (stamp.to_owned(), 0),
    }
}

/// Rotated-out copies of `path`, compressed or not, newest first.
fn backups(path: &Path) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let (stem, extension) = split_name(path);
    let prefix = format!("{stem}-");
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        let rest = rest.strip_suffix(GZIP_SUFFIX).unwrap_or(rest);
        let Some(stamp) = rest.strip_suffix(&extension) else {
            continue;
        };
        // Timestamp stamps start with a digit; anything else is a sibling stream.
        if !stamp.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        found.push((stamp_key(stamp), entry.path(), modified));
    }
    found.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(found
        .into_iter()
        .map(|(_, path, modified)| (path, modified))
        .collect())
}

fn prune_backups(path: &Path, policy: &RotationPolicy) -> io::Result<()> {
    let now = SystemTime::now();
    for (index, (backup, modified)) in backups(path)?.into_iter().enumerate() {
        let expired = now
            .duration_since(modified)
            .map(|age| age > policy.max_age)
            .unwrap_or(false);
        if index >= policy.max_backups || expired {
            fs::remove_file(&backup)?;
        }
    }
    Ok(())
}

/// Per-record writer handed out to the formatting layer.
pub struct RotatingWriter {
    file: RotatingFile,
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Runs inside the dispatcher, so failures can only go to stderr.
        if let Err(err) = self.file.append(buf) {
            eprintln!(
                "dropping log record for {} ({err})",
                self.file.path().display()
            );
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriter { file: self.clone() }
    }
}
