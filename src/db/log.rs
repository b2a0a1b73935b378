//! Append-only commit log backing the store file.
//!
//! The whole store lives in one file: a short header followed by one frame
//! per committed write transaction. Replaying every frame in order rebuilds
//! the bucket tree.
//!
//! ```text
//! header: magic "BKV\0" (4) | version (1)
//! frame:  len u32 LE | rmp-serde Commit (len) | crc32 u32 LE
//! ```

use crate::error::{Result, StoreError};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Magic bytes for the store file.
const STORE_MAGIC: &[u8; 4] = b"BKV\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Header size: magic + version.
pub(crate) const HEADER_SIZE: u64 = 5;

/// Upper bound for a single frame (sanity check against garbage lengths).
const MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// A single mutation, addressed by the raw bucket path it applies to.
///
/// `Put` shares its value with the bucket tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    CreateBucket { path: Vec<Vec<u8>>, name: Vec<u8> },
    DeleteBucket { path: Vec<Vec<u8>>, name: Vec<u8> },
    Put { path: Vec<Vec<u8>>, key: Vec<u8>, value: Arc<[u8]> },
    Delete { path: Vec<Vec<u8>>, key: Vec<u8> },
}

/// All operations of one committed write transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commit {
    pub seq: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub ops: Vec<LogOp>,
}

impl Commit {
    pub fn new(seq: u64, ops: Vec<LogOp>) -> Self {
        Self {
            seq,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            ops,
        }
    }
}

/// What `CommitLog::open` found on disk.
pub(crate) struct Recovered {
    pub commits: Vec<Commit>,
    /// Bytes dropped from a torn trailing frame.
    pub discarded_bytes: u64,
}

/// Exclusive writer for the store file.
pub(crate) struct CommitLog {
    path: PathBuf,
    file: File,
    len: u64,
    sync_on_commit: bool,
}

impl CommitLog {
    /// Open (or create) the store file, lock it, and read back every
    /// committed frame. A torn trailing frame is cut off.
    pub fn open(
        path: &Path,
        create_if_missing: bool,
        sync_on_commit: bool,
    ) -> Result<(Self, Recovered)> {
        if !path.exists() && !create_if_missing {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("store file {} does not exist", path.display()),
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create_if_missing)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| StoreError::Locked)?;

        let mut contents = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut contents)?;

        // Empty, or a crash cut the header short
        if contents.len() < HEADER_SIZE as usize && header_bytes().starts_with(&contents) {
            file.set_len(0)?;
            Self::write_header(&mut file)?;
            file.sync_all()?;
            contents = header_bytes().to_vec();
        }

        Self::verify_header(&contents)?;

        let (commits, good_len) = Self::read_frames(&contents)?;
        let discarded_bytes = contents.len() as u64 - good_len;
        if discarded_bytes > 0 {
            file.set_len(good_len)?;
            file.sync_all()?;
        }

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                len: good_len,
                sync_on_commit,
            },
            Recovered {
                commits,
                discarded_bytes,
            },
        ))
    }

    /// Append one commit frame. On failure the file is cut back to its
    /// previous length so later appends start from a clean tail.
    pub fn append(&mut self, commit: &Commit) -> Result<()> {
        let frame = Self::encode_frame(commit)?;

        if let Err(e) = self.write_at_tail(&frame) {
            let _ = self.file.set_len(self.len);
            return Err(StoreError::Transaction(format!(
                "failed to append commit {}: {}",
                commit.seq, e
            )));
        }

        self.len += frame.len() as u64;
        Ok(())
    }

    /// Replace the whole file with a header and a single frame.
    ///
    /// The new contents are written next to the store file, locked, synced,
    /// and then renamed over it.
    pub fn rewrite(&mut self, commit: &Commit) -> Result<()> {
        let frame = Self::encode_frame(commit)?;

        let mut tmp_name = OsString::from(self.path.as_os_str());
        tmp_name.push(".compact");
        let tmp_path = PathBuf::from(tmp_name);

        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.try_lock_exclusive().map_err(|_| StoreError::Locked)?;

        Self::write_header(&mut tmp)?;
        tmp.write_all(&frame)?;
        tmp.sync_all()?;

        fs::rename(&tmp_path, &self.path)?;
        sync_parent_dir(&self.path)?;

        self.file = tmp;
        self.len = HEADER_SIZE + frame.len() as u64;
        Ok(())
    }

    /// Current file length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn write_at_tail(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(frame)?;
        self.file.flush()?;
        if self.sync_on_commit {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn write_header(file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header_bytes())?;
        Ok(())
    }

    fn verify_header(contents: &[u8]) -> Result<()> {
        if contents.len() < HEADER_SIZE as usize || &contents[0..4] != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }
        if contents[4] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                contents[4]
            )));
        }
        Ok(())
    }

    fn encode_frame(commit: &Commit) -> Result<Vec<u8>> {
        let encoded = rmp_serde::to_vec(commit)?;
        if encoded.len() > MAX_FRAME_SIZE {
            return Err(StoreError::Transaction(format!(
                "commit of {} bytes exceeds the frame limit",
                encoded.len()
            )));
        }

        let mut frame = Vec::with_capacity(encoded.len() + 8);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());
        Ok(frame)
    }

    /// Decode frames after the header. Returns the commits and the offset
    /// just past the last intact frame.
    ///
    /// Only the final frame may be torn: one that runs past the end of the
    /// file, or that ends exactly at it with a bad checksum. A damaged frame
    /// with more data after it is `Corruption`.
    fn read_frames(contents: &[u8]) -> Result<(Vec<Commit>, u64)> {
        let mut commits = Vec::new();
        let mut offset = HEADER_SIZE as usize;

        while offset < contents.len() {
            let rest = &contents[offset..];
            if rest.len() < 4 {
                break;
            }

            let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            if rest.len() < 4 + len + 4 {
                break;
            }
            if len > MAX_FRAME_SIZE {
                return Err(StoreError::Corruption(format!(
                    "frame at offset {offset} declares {len} bytes"
                )));
            }

            let encoded = &rest[4..4 + len];
            let stored = u32::from_le_bytes([
                rest[4 + len],
                rest[5 + len],
                rest[6 + len],
                rest[7 + len],
            ]);
            if crc32fast::hash(encoded) != stored {
                if offset + 4 + len + 4 == contents.len() {
                    break;
                }
                return Err(StoreError::Corruption(format!(
                    "checksum mismatch in frame at offset {offset}"
                )));
            }

            let commit: Commit = rmp_serde::from_slice(encoded).map_err(|e| {
                StoreError::Corruption(format!("frame at offset {offset} does not decode: {e}"))
            })?;
            commits.push(commit);
            offset += 4 + len + 4;
        }

        Ok((commits, offset as u64))
    }
}

fn header_bytes() -> [u8; HEADER_SIZE as usize] {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[..4].copy_from_slice(STORE_MAGIC);
    header[4] = STORE_VERSION;
    header
}

/// Persist a rename by syncing the directory that holds `path`.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
