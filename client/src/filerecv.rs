//! Reassembly of chunked file transfers.
//!
//! Chunks arrive as ordinary messages carrying the total size, chunk size,
//! absolute offset and filename. On the first chunk (offset zero) the
//! receiver checks whether a local file of identical size already exists
//! and, if so, short-circuits the transfer. Declined filenames are
//! remembered for the rest of the session so a repeated offer can never
//! turn into a download loop; the guard dies with the session, and a fresh
//! join re-evaluates the local file.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use shared::{MessageReader, MsgType, NetError, NetMessage, FILE_CHUNK_SIZE, MAX_FILENAME_LEN};

/// Outcome of handling one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum FileProgress {
    /// A file of identical size already exists locally; transfer skipped.
    AlreadyHave { name: String },
    InProgress { name: String, percent: f32 },
    /// Final chunk written; signalled exactly once per transfer.
    Complete { name: String },
}

#[derive(Debug)]
struct Transfer {
    name: String,
    total: u32,
    file: File,
}

#[derive(Debug)]
pub struct FileReceiver {
    dir: PathBuf,
    current: Option<Transfer>,
    /// Session-scoped loop guard for short-circuited transfers.
    declined: HashSet<String>,
}

impl FileReceiver {
    pub fn new(dir: PathBuf) -> Self {
        FileReceiver {
            dir,
            current: None,
            declined: HashSet::new(),
        }
    }

    /// Handles one file message. Malformed chunks are protocol errors; a
    /// chunk for an unknown transfer (other than offset zero) likewise.
    pub fn handle(&mut self, msg: &NetMessage) -> Result<FileProgress, NetError> {
        let (total, size, offset, name, data) = parse_file_chunk(msg)?;

        if offset == 0 {
            if self.declined.contains(&name) {
                debug!("repeated offer of {} ignored; already declined", name);
                return Ok(FileProgress::AlreadyHave { name });
            }

            let path = self.dir.join(&name);
            if let Ok(meta) = fs::metadata(&path) {
                if meta.len() == total as u64 {
                    info!("{} already present with matching size, skipping download", name);
                    self.declined.insert(name.clone());
                    return Ok(FileProgress::AlreadyHave { name });
                }
            }

            fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            info!("receiving {} ({} bytes)", name, total);
            self.current = Some(Transfer { name: name.clone(), total, file });
        }

        let Some(transfer) = self.current.as_mut() else {
            if self.declined.contains(&name) {
                // Tail chunks of a transfer we short-circuited.
                return Ok(FileProgress::AlreadyHave { name });
            }
            return Err(NetError::Malformed("file chunk without an active transfer"));
        };
        if transfer.name != name {
            return Err(NetError::Malformed("file chunk for a different file"));
        }
        let end = offset
            .checked_add(size)
            .ok_or(NetError::Malformed("file chunk offset overflow"))?;
        if transfer.total != total || end > total {
            return Err(NetError::Malformed("file chunk outside the declared size"));
        }

        transfer.file.seek(SeekFrom::Start(offset as u64))?;
        transfer.file.write_all(&data)?;

        if end == total {
            let transfer = self.current.take();
            if let Some(t) = transfer {
                drop(t.file);
                info!("{} complete", t.name);
            }
            return Ok(FileProgress::Complete { name });
        }

        let percent = (end as f32 / total as f32) * 100.0;
        Ok(FileProgress::InProgress { name, percent })
    }

    /// True while a transfer is mid-flight.
    pub fn receiving(&self) -> bool {
        self.current.is_some()
    }
}

fn parse_file_chunk(msg: &NetMessage) -> Result<(u32, u32, u32, String, Vec<u8>), NetError> {
    let mut r = MessageReader::begin(msg, MsgType::File)?;
    let total = r.u32()?;
    let size = r.u32()?;
    let offset = r.u32()?;
    let name = r.string(MAX_FILENAME_LEN)?;
    let data = r.bytes(FILE_CHUNK_SIZE)?;
    r.end()?;

    if data.len() != size as usize {
        return Err(NetError::Malformed("chunk size disagrees with payload"));
    }
    if name.is_empty() || !safe_filename(&name) {
        warn!("refusing file chunk with unsafe name {:?}", name);
        return Err(NetError::Malformed("unsafe filename in file chunk"));
    }
    Ok((total, size, offset, name, data))
}

/// Plain filenames only; anything that could escape the download directory
/// is refused outright.
fn safe_filename(name: &str) -> bool {
    !name.contains('/') && !name.contains('\\') && name != "." && name != ".." && Path::new(name).components().count() == 1
}
