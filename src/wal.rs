use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Entries claiming a larger payload are treated as a corrupt tail.
const MAX_ENTRY_LEN: usize = 1 << 20;

/// Frame one event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the file ended first.
fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// The file under a [`Wal`]: appendable, syncable and truncatable.
pub trait LogFile: Write + Send {
    fn sync(&mut self) -> io::Result<()>;
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

fn poisoned_error() -> io::Error {
    io::Error::other("wal poisoned by an unrecoverable write failure")
}

/// Append-only reservation log.
///
/// Each entry is `[u32 LE: payload len][bincode: Event][u32 LE: crc32 of payload]`.
/// Appends are staged in memory and written by `flush_sync` in one go. A failed
/// flush truncates the file back to its last synced length, so the log only
/// ever holds acknowledged entries. If that truncation fails too, the log is
/// poisoned and refuses appends until compaction rewrites it.
pub struct Wal<F: LogFile = File> {
    file: F,
    path: PathBuf,
    pending: Vec<u8>,
    pending_count: u64,
    synced_len: u64,
    poisoned: bool,
    appends_since_compact: u64,
}

impl Wal<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::with_file(file, path)
    }

    /// Replay `path`, cut off any torn tail so later appends stay reachable,
    /// and open the log for appending.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = Self::scan(path)?;
        let mut wal = Self::open(path)?;
        if wal.synced_len > valid_len {
            warn!(
                "wal {}: truncating {} bytes of torn tail",
                path.display(),
                wal.synced_len - valid_len
            );
            wal.file.truncate(valid_len)?;
            wal.file.sync()?;
            wal.synced_len = valid_len;
        }
        Ok((wal, events))
    }

    /// Second half of compaction: rename the temp file over the log and reopen.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.synced_len = file.size()?;
        self.file = file;
        self.pending.clear();
        self.pending_count = 0;
        self.poisoned = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }
}

impl<F: LogFile> Wal<F> {
    /// Wrap an already opened log file positioned for appending.
    pub fn with_file(file: F, path: &Path) -> io::Result<Self> {
        Ok(Self {
            synced_len: file.size()?,
            file,
            path: path.to_path_buf(),
            pending: Vec::new(),
            pending_count: 0,
            poisoned: false,
            appends_since_compact: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Stage an entry. Nothing reaches the file until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        encode_event(&mut self.pending, event)?;
        self.pending_count += 1;
        Ok(())
    }

    /// Drop staged entries without writing them.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_count = 0;
    }

    /// Write and fsync staged entries. On failure none of them stay in the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.poisoned {
            self.discard_pending();
            return Err(poisoned_error());
        }
        if self.pending.is_empty() {
            return Ok(());
        }

        let written = self
            .file
            .write_all(&self.pending)
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync());
        let staged = self.pending.len() as u64;
        let count = self.pending_count;
        self.discard_pending();

        match written {
            Ok(()) => {
                self.synced_len += staged;
                self.appends_since_compact += count;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.file.truncate(self.synced_len).and_then(|()| self.file.sync()) {
                    warn!(
                        "wal {}: rollback to {} bytes failed, refusing further appends: {rollback}",
                        self.path.display(),
                        self.synced_len
                    );
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

impl Wal {
    /// First half of compaction: write `events` to `<path>.tmp` and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path.with_extension("wal.tmp"))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Read every intact entry. A missing file is an empty log; a truncated or
    /// corrupt entry ends the replay.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Self::scan(path).map(|(events, _)| events)
    }

    /// Intact entries and the byte length they span.
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_ENTRY_LEN {
                warn!("wal {}: entry {} claims {len} bytes, dropping tail", path.display(), events.len());
                break;
            }

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut payload)? || !read_frame_part(&mut reader, &mut crc_buf)? {
                warn!("wal {}: truncated entry after {} events", path.display(), events.len());
                break;
            }

            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                warn!("wal {}: crc mismatch after {} events", path.display(), events.len());
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => {
                    events.push(event);
                    valid_len += 8 + len as u64;
                }
                Err(e) => {
                    warn!("wal {}: undecodable entry after {} events: {e}", path.display(), events.len());
                    break;
                }
            }
        }

        Ok((events, valid_len))
    }
}
