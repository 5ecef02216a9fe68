//! L2: the virtual-file layer (spec sec. 3.3 / 4.3), grounded on
//! `examples/original_source/virtual_file.c`.
//!
//! A [`VirtualFile`] is a `(file, start_offset, total_length)` triple that
//! makes a byte range inside a real file behave like a standalone file: no
//! read or seek through a handle can observe bytes outside
//! `[start_offset, start_offset + total_length)`. A fixed-size slot pool
//! (`Vfs`) owns every live virtual file, mirroring the original's
//! `MAX_VIRTUAL_FILE`-sized array of `struct virtual_file`.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Mirrors `MAX_VIRTUAL_FILE` from the original global-data layout.
pub const MAX_VIRTUAL_FILE: usize = 32;

/// A single virtual-file record: a duplicated or freshly opened handle,
/// clamped to `[start_offset, start_offset + total_length)`.
pub struct VirtualFile {
    file: File,
    start_offset: u64,
    total_length: u64,
}

impl VirtualFile {
    fn from_file(file: File, start_offset: u64) -> io::Result<Self>
    {
        let raw_length = file.metadata()?.len();
        let total_length = raw_length.saturating_sub(start_offset);
        let mut vf = Self { file, start_offset, total_length };
        vf.file.seek(SeekFrom::Start(start_offset))?;

        Ok(vf)
    }

    pub fn open(path: &Path, start_offset: u64) -> io::Result<Self>
    {
        Self::from_file(File::open(path)?, start_offset)
    }

    pub fn open_rw(path: &Path, start_offset: u64) -> io::Result<Self>
    {
        let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(path)?;
        Self::from_file(file, start_offset)
    }

    /// Duplicates the underlying fd. `extra_offset` composes with this
    /// handle's own `start_offset` (not its current seek position), and
    /// the new length is measured against the *raw* underlying file, not
    /// this handle's logical window — matching `virtual_file_dup`.
    pub fn dup(&self, extra_offset: u64) -> io::Result<Self>
    {
        let file = self.file.try_clone()?;
        Self::from_file(file, self.start_offset + extra_offset)
    }

    pub fn filestart(&self) -> u64
    {
        self.start_offset
    }

    pub fn filelength(&self) -> u64
    {
        self.total_length
    }

    /// Absolute seek mapped through `start_offset`.
    pub fn fileseek(&mut self, offset: u64) -> io::Result<u64>
    {
        let abs = self.file.seek(SeekFrom::Start(self.start_offset + offset))?;
        Ok(abs - self.start_offset)
    }

    /// Loops until `buf` is fully read or EOF; returns the number of bytes
    /// actually read (short of `buf.len()` only at EOF).
    pub fn fileread(&mut self, buf: &mut [u8]) -> io::Result<usize>
    {
        let mut n = 0;
        while n < buf.len() {
            let r = self.read(&mut buf[n..])?;
            if r == 0 {
                break;
            }
            n += r;
        }
        Ok(n)
    }

    fn relative_pos(&mut self) -> io::Result<u64>
    {
        Ok(self.file.stream_position()?.saturating_sub(self.start_offset))
    }
}

impl Read for VirtualFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>
    {
        let rel = self.relative_pos()?;
        if rel >= self.total_length {
            return Ok(0);
        }

        let remaining = self.total_length - rel;
        let cap = remaining.min(buf.len() as u64) as usize;
        self.file.read(&mut buf[..cap])
    }
}

impl Seek for VirtualFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>
    {
        let target: i128 = match pos {
            SeekFrom::Start(off) => self.start_offset as i128 + off as i128,
            SeekFrom::End(off) => {
                self.start_offset as i128 + self.total_length as i128 + off as i128
            }
            SeekFrom::Current(off) => self.file.stream_position()? as i128 + off as i128,
        };

        if target < self.start_offset as i128 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start of virtual file"));
        }

        let abs = self.file.seek(SeekFrom::Start(target as u64))?;
        Ok(abs - self.start_offset)
    }
}

/// Opaque handle into a [`Vfs`] slot pool. Cheap to copy, invalid once the
/// slot has been closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VfHandle(usize);

/// The fixed slot pool backing every active virtual file (spec sec. 3.3/3.4).
pub struct Vfs {
    slots: Vec<Option<VirtualFile>>,
}

impl Vfs {
    pub fn new() -> Self
    {
        let mut slots = Vec::with_capacity(MAX_VIRTUAL_FILE);
        slots.resize_with(MAX_VIRTUAL_FILE, || None);
        Self { slots }
    }

    fn alloc(&mut self, vf: VirtualFile) -> io::Result<VfHandle>
    {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(vf);
                return Ok(VfHandle(i));
            }
        }

        Err(io::Error::new(io::ErrorKind::Other, "virtual-file slot pool exhausted"))
    }

    pub fn open(&mut self, path: &Path, start_offset: u64) -> io::Result<VfHandle>
    {
        self.alloc(VirtualFile::open(path, start_offset)?)
    }

    pub fn open_rw(&mut self, path: &Path, start_offset: u64) -> io::Result<VfHandle>
    {
        self.alloc(VirtualFile::open_rw(path, start_offset)?)
    }

    pub fn dup(&mut self, handle: VfHandle, extra_offset: u64) -> io::Result<VfHandle>
    {
        let vf = self.get(handle)?.dup(extra_offset)?;
        self.alloc(vf)
    }

    pub fn close(&mut self, handle: VfHandle)
    {
        self.slots[handle.0] = None;
    }

    pub fn get(&self, handle: VfHandle) -> io::Result<&VirtualFile>
    {
        self.slots[handle.0]
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stale virtual-file handle"))
    }

    pub fn get_mut(&mut self, handle: VfHandle) -> io::Result<&mut VirtualFile>
    {
        self.slots[handle.0]
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stale virtual-file handle"))
    }

    pub fn filelength(&self, handle: VfHandle) -> io::Result<u64>
    {
        Ok(self.get(handle)?.filelength())
    }

    pub fn filestart(&self, handle: VfHandle) -> io::Result<u64>
    {
        Ok(self.get(handle)?.filestart())
    }

    pub fn fileseek(&mut self, handle: VfHandle, offset: u64) -> io::Result<u64>
    {
        self.get_mut(handle)?.fileseek(offset)
    }

    pub fn fileread(&mut self, handle: VfHandle, buf: &mut [u8]) -> io::Result<usize>
    {
        self.get_mut(handle)?.fileread(buf)
    }
}

impl Default for Vfs {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile
    {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    /// Spec sec. 8.2: virtual-file transparency.
    #[test]
    fn transparency()
    {
        let data: Vec<u8> = (0..64u8).collect();
        let file = fixture(&data);
        let mut vfs = Vfs::new();
        let h = vfs.open(file.path(), 10).unwrap();

        assert_eq!(vfs.filestart(h).unwrap(), 10);

        let mut buf = [0u8; 8];
        vfs.fileread(h, &mut buf).unwrap();
        assert_eq!(&buf, &data[10..18]);

        vfs.fileseek(h, 5).unwrap();
        let mut buf2 = [0u8; 4];
        vfs.fileread(h, &mut buf2).unwrap();
        assert_eq!(&buf2, &data[15..19]);
    }

    /// Spec sec. 8.3: virtual-file containment.
    #[test]
    fn containment()
    {
        let data: Vec<u8> = (0..32u8).collect();
        let file = fixture(&data);
        let mut vfs = Vfs::new();
        let h = vfs.open(file.path(), 20).unwrap();

        assert_eq!(vfs.filelength(h).unwrap(), 12);

        vfs.fileseek(h, 12).unwrap();
        let mut buf = [0u8; 16];
        let n = vfs.fileread(h, &mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn dup_composes_offsets()
    {
        let data: Vec<u8> = (0..40u8).collect();
        let file = fixture(&data);
        let mut vfs = Vfs::new();
        let h = vfs.open(file.path(), 10).unwrap();
        let dup = vfs.dup(h, 5).unwrap();

        assert_eq!(vfs.filestart(dup).unwrap(), 15);
        let mut buf = [0u8; 4];
        vfs.fileread(dup, &mut buf).unwrap();
        assert_eq!(&buf, &data[15..19]);
    }

    #[test]
    fn close_releases_slot()
    {
        let data = vec![0u8; 8];
        let file = fixture(&data);
        let mut vfs = Vfs::new();
        let h = vfs.open(file.path(), 0).unwrap();
        vfs.close(h);

        assert!(vfs.get(h).is_err());
    }
}
