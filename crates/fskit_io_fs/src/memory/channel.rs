use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use super::store::{EnumInodeData, MemoryStore, SpecInode, lock_store};
use crate::fs::SeekableByteChannel;
use crate::util::SpecOpenFlags;

/// Positioned handle on one memory file inode.
///
/// Serves as input stream, output stream and byte channel; the open flags
/// decide which directions are allowed.
#[derive(Debug)]
pub(crate) struct MemoryByteChannel {
    store: Arc<Mutex<MemoryStore>>,
    n_inode: u64,
    n_position: u64,
    spec_flags: SpecOpenFlags,
}

impl MemoryByteChannel {
    pub(crate) fn new(store: Arc<Mutex<MemoryStore>>, n_inode: u64, spec_flags: SpecOpenFlags) -> Self {
        Self {
            store,
            n_inode,
            n_position: 0,
            spec_flags,
        }
    }

    fn _with_data<T>(
        &self,
        func: impl FnOnce(&mut Vec<u8>, &mut SpecInode) -> T,
    ) -> io::Result<T> {
        let mut store = lock_store(&self.store);
        let Some(inode) = store.inode_mut(self.n_inode) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file was deleted"));
        };
        let EnumInodeData::File(data) = &mut inode.data else {
            return Err(io::Error::from(io::ErrorKind::IsADirectory));
        };
        let mut data_taken = std::mem::take(data);
        let res = func(&mut data_taken, inode);
        if let EnumInodeData::File(data) = &mut inode.data {
            *data = data_taken;
        }
        Ok(res)
    }
}

impl Read for MemoryByteChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.spec_flags.if_read {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "channel not open for reading",
            ));
        }
        let n_position = self.n_position;
        let n_read = self._with_data(|data, inode| {
            inode.time_accessed = SystemTime::now();
            let n_start = (n_position as usize).min(data.len());
            let n_read = buf.len().min(data.len() - n_start);
            buf[..n_read].copy_from_slice(&data[n_start..n_start + n_read]);
            n_read
        })?;
        self.n_position += n_read as u64;
        Ok(n_read)
    }
}

impl Write for MemoryByteChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.spec_flags.if_write {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "channel not open for writing",
            ));
        }
        let if_append = self.spec_flags.if_append;
        let n_position = self.n_position;
        self.n_position = self._with_data(|data, inode| {
            let n_start = if if_append {
                data.len()
            } else {
                n_position as usize
            };
            if data.len() < n_start {
                data.resize(n_start, 0);
            }
            let n_overlap = buf.len().min(data.len() - n_start);
            data[n_start..n_start + n_overlap].copy_from_slice(&buf[..n_overlap]);
            data.extend_from_slice(&buf[n_overlap..]);
            inode.time_modified = SystemTime::now();
            (n_start + buf.len()) as u64
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryByteChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let n_size = self.size()?;
        let n_target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(n) => n_size.checked_add_signed(n),
            SeekFrom::Current(n) => self.n_position.checked_add_signed(n),
        };
        let Some(n_target) = n_target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        };
        self.n_position = n_target;
        Ok(n_target)
    }
}

impl SeekableByteChannel for MemoryByteChannel {
    fn size(&mut self) -> io::Result<u64> {
        self._with_data(|data, _| data.len() as u64)
    }

    fn truncate(&mut self, n_size: u64) -> io::Result<()> {
        if !self.spec_flags.if_write {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "channel not open for writing",
            ));
        }
        self._with_data(|data, inode| {
            if (n_size as usize) < data.len() {
                data.truncate(n_size as usize);
                inode.time_modified = SystemTime::now();
            }
        })?;
        self.n_position = self.n_position.min(n_size);
        Ok(())
    }
}
