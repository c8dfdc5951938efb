use super::{check_range, ResourceClient, ResourceError};
use std::fs::File;
use std::path::Path;

#[cfg(not(unix))]
use parking_lot::Mutex;

/// Positioned reads from a local file.
///
/// On unix the reads are position independent (`pread`) and run in parallel.
/// Elsewhere a seek followed by a read is done under a lock.
#[derive(Debug)]
pub struct FileClient {
    #[cfg(unix)]
    file: File,
    #[cfg(not(unix))]
    file: Mutex<File>,
    len: u64,
}

impl FileClient {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            #[cfg(unix)]
            file,
            #[cfg(not(unix))]
            file: Mutex::new(file),
            len,
        })
    }

    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

impl ResourceClient for FileClient {
    fn len(&self) -> u64 {
        self.len
    }

    fn get_range(&self, offset: u64, length: usize) -> Result<Vec<u8>, ResourceError> {
        check_range(offset, length, self.len)?;
        let mut bytes = vec![0; length];
        self.read_at(offset, &mut bytes)?;
        Ok(bytes)
    }
}
