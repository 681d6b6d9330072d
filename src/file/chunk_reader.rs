use crate::config::types::InitialReadPosition;
use crate::file::splitters::ChunkSplitter;
use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Result of a single [`ChunkReader::read_next`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Complete records extracted from newly read bytes, in file order.
    Records(Vec<Vec<u8>>),
    /// No new bytes beyond the current offset.
    Eof,
    /// The path now refers to a different file than this handle (or the
    /// file shrank below the read offset). The handle itself stays readable.
    RotatedAway,
}

/// Reads new bytes from one open file handle and splits them into records.
///
/// The undelimited tail of the last read is carried across calls and is
/// only emitted once its delimiter arrives, or as a final record when a
/// detached (rotated-away) handle is fully drained.
pub struct ChunkReader {
    path: PathBuf,
    file: File,
    file_id: u64,
    splitter: Arc<dyn ChunkSplitter>,
    read_offset: u64,
    pending: Vec<u8>,
    detached: bool,
}

impl ChunkReader {
    pub fn open(
        path: &Path,
        splitter: Arc<dyn ChunkSplitter>,
        position: InitialReadPosition,
    ) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let metadata = file.metadata()?;
        let read_offset = match position {
            InitialReadPosition::Start => 0,
            InitialReadPosition::End => file.seek(SeekFrom::End(0))?,
        };

        Ok(Self {
            path: path.to_path_buf(),
            file_id: file_id(&metadata),
            file,
            splitter,
            read_offset,
            pending: Vec::new(),
            detached: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset up to which this handle has consumed the file.
    pub fn offset(&self) -> u64 {
        self.read_offset
    }

    /// Byte offset of the boundary after the last complete record. Bytes
    /// sitting in the undelivered tail are excluded, so resuming a read at
    /// this offset re-covers the partial record instead of losing its head.
    pub fn delivered_offset(&self) -> u64 {
        self.read_offset - self.pending.len() as u64
    }

    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Marks this handle as rotated away from the live path. A detached
    /// reader reports plain `Eof` at end of file instead of re-checking
    /// rotation, and yields its remaining tail as a final record since the
    /// file can no longer grow.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Reads available bytes since the last offset and splits them into
    /// records. The pending tail survives an `Err` return, so a caller may
    /// retry against the same handle without losing data.
    pub fn read_next(&mut self) -> io::Result<ReadOutcome> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut records = Vec::new();

        loop {
            let n = self.file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            let tail = std::mem::take(&mut self.pending);
            let (mut complete, new_tail) = self.splitter.split(tail, &buf[..n]);
            self.pending = new_tail;
            self.read_offset += n as u64;
            records.append(&mut complete);
        }

        if !records.is_empty() {
            return Ok(ReadOutcome::Records(records));
        }

        if self.detached {
            if !self.pending.is_empty() {
                let last = std::mem::take(&mut self.pending);
                return Ok(ReadOutcome::Records(vec![last]));
            }
            return Ok(ReadOutcome::Eof);
        }

        if self.rotated_away()? {
            return Ok(ReadOutcome::RotatedAway);
        }

        Ok(ReadOutcome::Eof)
    }

    /// A fresh stat of the path decides whether this handle has been
    /// rotated away: a different file identity, or a length below the read
    /// offset (truncate-then-shrink). A missing path is not rotation; the
    /// writer may simply not have created the replacement yet.
    fn rotated_away(&self) -> io::Result<bool> {
        match std::fs::metadata(&self.path) {
            Ok(metadata) => {
                if file_id(&metadata) != self.file_id {
                    return Ok(true);
                }
                Ok(metadata.len() < self.read_offset)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Stable identity of an already-open file, used to tell rotation apart
/// from growth of the same file.
pub fn path_file_id(path: &Path) -> io::Result<u64> {
    std::fs::metadata(path).map(|metadata| file_id(&metadata))
}

#[cfg(unix)]
fn file_id(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn file_id(metadata: &Metadata) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    metadata.len().hash(&mut hasher);
    if let Ok(created) = metadata.created() {
        created.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::splitters::NewlineChunkSplitter;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn open_reader(path: &Path, position: InitialReadPosition) -> ChunkReader {
        ChunkReader::open(path, Arc::new(NewlineChunkSplitter), position).unwrap()
    }

    fn append(path: &Path, bytes: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn reads_complete_lines_and_tracks_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"one\ntwo\n").unwrap();

        let mut reader = open_reader(&path, InitialReadPosition::Start);
        assert_eq!(
            reader.read_next().unwrap(),
            ReadOutcome::Records(vec![b"one".to_vec(), b"two".to_vec()])
        );
        assert_eq!(reader.offset(), 8);
        assert_eq!(reader.read_next().unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn partial_line_held_until_delimiter_arrives() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"begin").unwrap();

        let mut reader = open_reader(&path, InitialReadPosition::Start);
        assert_eq!(reader.read_next().unwrap(), ReadOutcome::Eof);
        assert_eq!(reader.pending_len(), 5);
        assert_eq!(reader.offset(), 5);
        assert_eq!(reader.delivered_offset(), 0);

        append(&path, b"ning\n");
        assert_eq!(
            reader.read_next().unwrap(),
            ReadOutcome::Records(vec![b"beginning".to_vec()])
        );
        assert_eq!(reader.pending_len(), 0);
        assert_eq!(reader.delivered_offset(), reader.offset());
    }

    #[test]
    fn end_position_skips_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"old line\n").unwrap();

        let mut reader = open_reader(&path, InitialReadPosition::End);
        assert_eq!(reader.read_next().unwrap(), ReadOutcome::Eof);

        append(&path, b"new line\n");
        assert_eq!(
            reader.read_next().unwrap(),
            ReadOutcome::Records(vec![b"new line".to_vec()])
        );
    }

    #[test]
    fn rotation_detected_when_path_identity_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"line\n").unwrap();

        let mut reader = open_reader(&path, InitialReadPosition::Start);
        assert!(matches!(
            reader.read_next().unwrap(),
            ReadOutcome::Records(_)
        ));

        fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        // Replacement not created yet: not rotation, just quiet.
        assert_eq!(reader.read_next().unwrap(), ReadOutcome::Eof);

        fs::write(&path, b"").unwrap();
        assert_eq!(reader.read_next().unwrap(), ReadOutcome::RotatedAway);
    }

    #[test]
    fn truncation_below_offset_reported_as_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"a long line of content\n").unwrap();

        let mut reader = open_reader(&path, InitialReadPosition::Start);
        assert!(matches!(
            reader.read_next().unwrap(),
            ReadOutcome::Records(_)
        ));

        fs::write(&path, b"").unwrap();
        assert_eq!(reader.read_next().unwrap(), ReadOutcome::RotatedAway);
    }

    #[test]
    fn detached_reader_emits_final_partial_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"complete\nunfinished").unwrap();

        let mut reader = open_reader(&path, InitialReadPosition::Start);
        reader.detach();

        assert_eq!(
            reader.read_next().unwrap(),
            ReadOutcome::Records(vec![b"complete".to_vec()])
        );
        assert_eq!(
            reader.read_next().unwrap(),
            ReadOutcome::Records(vec![b"unfinished".to_vec()])
        );
        assert_eq!(reader.read_next().unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn detached_reader_never_reports_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"line\n").unwrap();

        let mut reader = open_reader(&path, InitialReadPosition::Start);
        fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        fs::write(&path, b"replacement\n").unwrap();

        reader.detach();
        assert!(matches!(
            reader.read_next().unwrap(),
            ReadOutcome::Records(_)
        ));
        assert_eq!(reader.read_next().unwrap(), ReadOutcome::Eof);
    }
}
