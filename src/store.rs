use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::record::{Header, Record, Version, HEADER_LEN};
use crate::{Error, Result};

/// One named store: an append-only file of records plus the in-memory
/// keydir mapping each key to the offset of its latest record.
pub struct Store {
    path: PathBuf,
    inner: Mutex<Inner>,
}

/// File handle, parsed header and keydir move as one unit under the store
/// mutex: the file offset is shared mutable state (`seek` + `read`/`write`
/// is not atomic) and the keydir must stay consistent with the file.
struct Inner {
    file: File,
    header: Header,
    keydir: HashMap<String, u64>,
}

impl Store {
    /// Open the store file at `path` and rebuild the keydir by scanning
    /// every record. A new or empty file is initialized with a fresh
    /// header; an existing file must start with one, and its major format
    /// version must match ours.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Store> {
        let path = path.into();
        let fresh = match fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let header = if fresh {
            let header = Header::new(Version::CURRENT);
            header.write_to(&mut file)?;
            file.flush()?;
            debug!("initialized new store file at {}", path.display());
            header
        } else {
            file.seek(SeekFrom::Start(0))?;
            let header = Header::read_from(&mut file)?;
            if header.version.major != Version::CURRENT.major {
                return Err(Error::VersionMismatch {
                    ours: Version::CURRENT.major,
                    file: header.version.major,
                });
            }
            header
        };

        let store = Store {
            path,
            inner: Mutex::new(Inner {
                file,
                header,
                keydir: HashMap::new(),
            }),
        };
        store.index()?;
        Ok(store)
    }

    /// Append a record for `key` and point the keydir at it.
    pub fn put(&self, key: &str, value: &[u8], mime: &str) -> Result<()> {
        let record = Record::new(key, value, mime)?;
        self.append(&record)
    }

    /// Append one already-validated record. The keydir is only updated once
    /// the record is fully on disk; a failed write leaves at most a torn
    /// record at the tail, which the next index run cuts off.
    fn append(&self, record: &Record) -> Result<()> {
        let mut inner = self.inner.lock();
        let pos = inner.file.seek(SeekFrom::End(0))?;
        record.write_to(&mut inner.file)?;
        inner.file.flush()?;
        inner.keydir.insert(record.key.clone(), pos);
        Ok(())
    }

    /// Read the latest value and mime for `key`.
    pub fn get(&self, key: &str) -> Result<(Vec<u8>, String)> {
        let mut inner = self.inner.lock();
        let pos = *inner.keydir.get(key).ok_or(Error::NotFound)?;
        inner.file.seek(SeekFrom::Start(pos))?;
        match Record::read_from(&mut inner.file)? {
            // The stored key matches the lookup key by the keydir invariant.
            Some(record) => Ok((record.value, record.mime)),
            None => Err(Error::ShortRead),
        }
    }

    /// Snapshot of the keys currently in the keydir, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keydir.keys().cloned().collect()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.inner.lock().keydir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current size of the backing file in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.inner.lock().file.metadata()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format version parsed from (or written into) the file header.
    pub fn version(&self) -> Version {
        self.inner.lock().header.version
    }

    /// Rebuild the keydir by scanning every record from byte 12.
    ///
    /// A torn record at the tail, left by an interrupted write, is cut off
    /// with the file truncated to the last good boundary; the records
    /// before it stay authoritative. Any other read failure aborts.
    pub fn index(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.index_locked(&mut inner)
    }

    fn index_locked(&self, inner: &mut Inner) -> Result<()> {
        inner.file.seek(SeekFrom::Start(HEADER_LEN))?;
        inner.keydir.clear();
        loop {
            let pos = inner.file.stream_position()?;
            match Record::read_from(&mut inner.file) {
                Ok(Some(record)) => {
                    inner.keydir.insert(record.key, pos);
                }
                Ok(None) => break,
                Err(Error::ShortRead) => {
                    warn!(
                        "{}: torn record at offset {pos}, truncating to last good boundary",
                        self.path.display()
                    );
                    inner.file.set_len(pos)?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        debug!(
            "indexed {} records from {}",
            inner.keydir.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Rewrite the file so it holds only the latest record for every key.
    ///
    /// The latest records are appended to a scratch store in the OS temp
    /// directory, the live file is copied to a `.bak` sibling of the
    /// scratch file, and the scratch file is copied over the live path, so
    /// at any crash point at least one of the three files is complete.
    /// When the rewritten entry count does not match the keydir, the backup
    /// and scratch files are kept for post-mortem recovery and the merge
    /// still reports success.
    pub fn merge(&self) -> Result<()> {
        // The keydir must reflect the file before rewriting from it.
        self.index()?;

        let mut inner = self.inner.lock();
        let temp = self.scratch_path();
        info!("merge: writing latest records to {}", temp.display());

        let written = {
            let scratch = Store::open(&temp)?;
            let Inner { file, keydir, .. } = &mut *inner;
            let mut written = 0usize;
            for &pos in keydir.values() {
                file.seek(SeekFrom::Start(pos))?;
                match Record::read_from(file)? {
                    Some(record) => {
                        scratch.append(&record)?;
                        written += 1;
                    }
                    None => break,
                }
            }
            written
            // scratch drops here, closing the temporary file
        };

        let backup = PathBuf::from(format!("{}.bak", temp.display()));
        debug!(
            "merge: copying {} -> {}",
            self.path.display(),
            backup.display()
        );
        fs::copy(&self.path, &backup)?;
        debug!(
            "merge: copying {} -> {}",
            temp.display(),
            self.path.display()
        );
        fs::copy(&temp, &self.path)?;

        // Swap in a handle onto the rewritten file; the old handle closes
        // on assignment.
        inner.file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        if written != inner.keydir.len() {
            warn!(
                "merge: wrote {written} records but keydir holds {}, keeping {} and {} for recovery",
                inner.keydir.len(),
                backup.display(),
                temp.display()
            );
        } else {
            fs::remove_file(&backup)?;
            fs::remove_file(&temp)?;
            info!("merge: rewrote {written} records");
        }

        drop(inner);
        self.index()
    }

    /// Pick a non-existing scratch path in the OS temp directory, suffixing
    /// a counter when a previous merge left files behind.
    fn scratch_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("store");
        let base = std::env::temp_dir().join(format!("{name}.merge"));
        let mut candidate = base.clone();
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}.{}", base.display(), n));
            n += 1;
        }
        candidate
    }
}
