//! Sidecar index files (`.isc`).
//!
//! A sidecar caches the sequence-pointer table produced by one full parse of
//! a source file, so later opens can page the file without re-scanning it.
//! It is a cache, not a source of truth: deleting it costs only a rescan.
//!
//! # Format
//!
//! ```text
//! - Magic: "ISC\1" (4 bytes)
//! - Format version (uint32)
//! - Source file length (uint64)        \ validity marker: if either differs
//! - Source file mtime, unix secs (uint64) / from the source, the sidecar is stale
//! - Record count (uint64)
//! - Per record (21 bytes, fixed):
//!   - start virtual offset (uint64)
//!   - end virtual offset (uint64)
//!   - starting line (int32)
//!   - alphabet code (uint8)
//! ```
//!
//! Entries are fixed-size so a record's pointer is one multiplication away;
//! pointers loaded from a sidecar therefore carry no id string.
//!
//! # Failure policy
//!
//! A present-but-invalid sidecar is never fatal: it logs a warning and the
//! caller rescans and regenerates it. Any I/O failure while persisting
//! degrades the session to a non-persistent in-memory pointer table.

use crate::alphabet::SequenceEncoding;
use crate::virt::pointer::SequencePointer;
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Extension appended to the source filename (`reads.bam` -> `reads.bam.isc`).
pub const SIDECAR_EXTENSION: &str = "isc";

const SIDECAR_MAGIC: &[u8; 4] = b"ISC\x01";
const FORMAT_VERSION: u32 = 1;
const ENTRY_SIZE: usize = 8 + 8 + 4 + 1;

/// In-memory pointer table backed (when possible) by a persisted `.isc` file.
#[derive(Debug)]
pub struct SidecarIndex {
    pointers: Vec<SequencePointer>,
    /// False when persisting failed and the table lives only in memory
    persistent: bool,
}

impl SidecarIndex {
    /// Conventional sidecar path for a source file.
    pub fn path_for<P: AsRef<Path>>(source: P) -> PathBuf {
        let mut path = source.as_ref().as_os_str().to_os_string();
        path.push(".");
        path.push(SIDECAR_EXTENSION);
        path.into()
    }

    /// Load the sidecar for `source` if one exists and is valid.
    ///
    /// Returns `Ok(None)` when no sidecar exists, or when one exists but is
    /// stale or corrupt — the latter cases log a warning, and the caller is
    /// expected to rescan and regenerate. Only the source file being
    /// unreadable is an error.
    pub fn load<P: AsRef<Path>>(source: P) -> io::Result<Option<Self>> {
        let source = source.as_ref();
        let sidecar_path = Self::path_for(source);

        if !sidecar_path.exists() {
            return Ok(None);
        }

        let (source_len, source_mtime) = source_marker(source)?;

        match read_sidecar(&sidecar_path, source_len, source_mtime) {
            Ok(pointers) => {
                debug!(
                    "loaded sidecar {} ({} pointers)",
                    sidecar_path.display(),
                    pointers.len()
                );
                Ok(Some(Self {
                    pointers,
                    persistent: true,
                }))
            }
            Err(e) => {
                warn!(
                    "sidecar {} is invalid ({}); falling back to full rescan",
                    sidecar_path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Build a sidecar from a freshly scanned pointer table and try to
    /// persist it next to `source`.
    ///
    /// Persisting writes to a temporary file and renames it into place, so a
    /// crash mid-write never leaves a corrupt sidecar. If any step fails the
    /// table is kept in memory only and a warning is logged.
    pub fn create<P: AsRef<Path>>(
        source: P,
        pointers: Vec<SequencePointer>,
        encoding: SequenceEncoding,
    ) -> Self {
        let source = source.as_ref();
        let persistent = match persist(source, &pointers, encoding) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "could not persist sidecar for {} ({}); using in-memory pointers for this session",
                    source.display(),
                    e
                );
                false
            }
        };
        Self {
            pointers,
            persistent,
        }
    }

    /// Number of pointers (equals the source file's record count).
    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    /// Pointer for the record at `index`.
    pub fn get(&self, index: usize) -> Option<&SequencePointer> {
        self.pointers.get(index)
    }

    /// The full pointer table, in record order.
    pub fn pointers(&self) -> &[SequencePointer] {
        &self.pointers
    }

    /// Whether the table was persisted to disk (false = in-memory session).
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

/// Validity marker for a source file: (length, mtime in unix seconds).
fn source_marker(source: &Path) -> io::Result<(u64, u64)> {
    let metadata = fs::metadata(source)?;
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok((metadata.len(), mtime))
}

fn read_sidecar(
    sidecar_path: &Path,
    expected_len: u64,
    expected_mtime: u64,
) -> io::Result<Vec<SequencePointer>> {
    let mut reader = BufReader::new(File::open(sidecar_path)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != SIDECAR_MAGIC {
        return Err(invalid(format!("bad magic {:?}", magic)));
    }

    let version = read_u32(&mut reader)?;
    if version != FORMAT_VERSION {
        return Err(invalid(format!("unsupported version {}", version)));
    }

    let source_len = read_u64(&mut reader)?;
    let source_mtime = read_u64(&mut reader)?;
    if source_len != expected_len || source_mtime != expected_mtime {
        return Err(invalid(format!(
            "stale validity marker (recorded {} bytes @ {}, source is {} bytes @ {})",
            source_len, source_mtime, expected_len, expected_mtime
        )));
    }

    let count = read_u64(&mut reader)? as usize;
    let mut entries = vec![0u8; count.checked_mul(ENTRY_SIZE).ok_or_else(|| {
        invalid(format!("record count too large: {}", count))
    })?];
    reader.read_exact(&mut entries)?;

    // A valid sidecar ends exactly after the entry table.
    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(invalid(String::from("trailing bytes after entry table")));
    }

    let mut pointers = Vec::with_capacity(count);
    for entry in entries.chunks_exact(ENTRY_SIZE) {
        let start = u64::from_le_bytes(entry[0..8].try_into().unwrap());
        let end = u64::from_le_bytes(entry[8..16].try_into().unwrap());
        let starting_line = i32::from_le_bytes(entry[16..20].try_into().unwrap());
        let encoding = SequenceEncoding::from_code(entry[20])
            .ok_or_else(|| invalid(format!("unknown alphabet code {}", entry[20])))?;
        pointers.push(SequencePointer {
            alphabet_name: encoding.alphabet_name().to_string(),
            id: None,
            index_offsets: (start as i64, end as i64),
            starting_line,
        });
    }

    Ok(pointers)
}

fn persist(
    source: &Path,
    pointers: &[SequencePointer],
    encoding: SequenceEncoding,
) -> io::Result<()> {
    let (source_len, source_mtime) = source_marker(source)?;
    let sidecar_path = SidecarIndex::path_for(source);
    let tmp_path = sidecar_path.with_extension(format!("{}.tmp", SIDECAR_EXTENSION));

    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(SIDECAR_MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&source_len.to_le_bytes())?;
        writer.write_all(&source_mtime.to_le_bytes())?;
        writer.write_all(&(pointers.len() as u64).to_le_bytes())?;
        for pointer in pointers {
            writer.write_all(&(pointer.index_offsets.0 as u64).to_le_bytes())?;
            writer.write_all(&(pointer.index_offsets.1 as u64).to_le_bytes())?;
            writer.write_all(&pointer.starting_line.to_le_bytes())?;
            writer.write_all(&[encoding.code()])?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp_path, &sidecar_path)?;
    debug!(
        "persisted sidecar {} ({} pointers)",
        sidecar_path.display(),
        pointers.len()
    );
    Ok(())
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
