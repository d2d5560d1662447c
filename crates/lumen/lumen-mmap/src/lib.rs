use memmap2::{Mmap, MmapMut};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

pub struct MmapFileMut {
    _file: File,
    mmap: MmapMut,
}

/// Read-only shared mapping of a whole file.
///
/// The mapping is `MAP_SHARED`, so writes made by other processes through
/// their own mappings of the same file become visible here. Contents are only
/// reachable through the raw pointer; callers are responsible for bounds
/// checking against [`MmapFile::len`].
pub struct MmapFile {
    _file: File,
    mmap: Mmap,
}

impl MmapFileMut {
    /// Create a new file to `size_bytes` and map it read-write
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Return raw pointer to start of memory mapped file data
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl MmapFile {
    /// Open an existing file read-only and map all of it
    pub fn open_ro<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(file)
    }

    /// Map an already opened file read-only, taking ownership of the descriptor.
    ///
    /// Lets callers tell open/stat failures apart from mapping failures.
    pub fn from_file(file: File) -> io::Result<Self> {
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Return raw pointer to start of memory mapped file data
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rw_sizes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("region");

        let mm = MmapFileMut::create_rw(&path, 4096).expect("create");
        assert_eq!(mm.len(), 4096);
        assert_eq!(std::fs::metadata(&path).expect("stat").len(), 4096);
    }

    #[test]
    fn read_only_mapping_sees_writer_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("region");

        let mut rw = MmapFileMut::create_rw(&path, 128).expect("create");
        unsafe { rw.as_mut_ptr().add(10).write(0xAB) };

        let ro = MmapFile::open_ro(&path).expect("open");
        assert_eq!(ro.len(), 128);
        assert_eq!(unsafe { ro.as_ptr().add(10).read() }, 0xAB);

        // Shared mapping: later writes are visible without remapping.
        unsafe { rw.as_mut_ptr().add(11).write(0xCD) };
        assert_eq!(unsafe { ro.as_ptr().add(11).read_volatile() }, 0xCD);
    }

    #[test]
    fn open_ro_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = MmapFile::open_ro(dir.path().join("nope")).err().expect("must fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
