//! Chunked file distribution from host to a joining client.
//!
//! A file travels as a sequence of ordinary addressed messages, each
//! carrying the total size, this chunk's size, its absolute offset and the
//! filename. Call [`FileSender::next_chunk`] until it reports completion;
//! the file handle is closed exactly when the offset reaches the total.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;

use shared::{MessageWriter, MsgType, NetError, NetMessage, FILE_CHUNK_SIZE, MAX_FILENAME_LEN};

pub struct FileSender {
    file: Option<File>,
    name: String,
    destination: u8,
    total: u32,
    offset: u32,
}

impl FileSender {
    /// Opens `path` for transfer to one player slot.
    pub fn open(path: &Path, destination: u8) -> Result<Self, NetError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(NetError::Malformed("cannot transfer an empty file"));
        }
        if len > u32::MAX as u64 {
            return Err(NetError::Malformed("file too large to transfer"));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(NetError::Malformed("filename is not valid utf-8"))?
            .to_string();
        if name.len() > MAX_FILENAME_LEN {
            return Err(NetError::Malformed("filename exceeds field width"));
        }

        debug!("sending {} ({} bytes) to slot {}", name, len, destination);
        Ok(FileSender {
            file: Some(file),
            name,
            destination,
            total: len as u32,
            offset: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_complete(&self) -> bool {
        self.offset == self.total
    }

    pub fn percent(&self) -> f32 {
        (self.offset as f32 / self.total as f32) * 100.0
    }

    /// Produces the next chunk message, or `None` once the transfer is
    /// complete. The returned percentage includes the produced chunk.
    pub fn next_chunk(&mut self) -> Result<Option<(NetMessage, f32)>, NetError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        let mut buf = [0u8; FILE_CHUNK_SIZE];
        let want = (self.total - self.offset).min(FILE_CHUNK_SIZE as u32) as usize;
        let mut read = 0;
        while read < want {
            let n = file.read(&mut buf[read..want])?;
            if n == 0 {
                return Err(NetError::Malformed("file shrank during transfer"));
            }
            read += n;
        }

        let mut w = MessageWriter::begin(MsgType::File, self.destination);
        w.u32(self.total);
        w.u32(read as u32);
        w.u32(self.offset);
        w.string(&self.name, MAX_FILENAME_LEN);
        w.bytes(&buf[..read]);
        let msg = w.end();

        self.offset += read as u32;
        if self.offset == self.total {
            // Close exactly at completion.
            self.file = None;
        }

        Ok(Some((msg, self.percent())))
    }
}
