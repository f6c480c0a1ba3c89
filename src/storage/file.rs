use crate::error::Error;
use crate::storage::{File, Storage};
use crate::IResult;
use fs2::FileExt;
use std::fs::File as SysFile;
use std::fs::{create_dir_all, read_dir, remove_file, rename, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Copy)]
pub struct FileStorage;

impl Storage for FileStorage {
    type F = SysFile;

    fn create<P: AsRef<Path>>(&self, name: P) -> IResult<Self::F> {
        Ok(OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(name)?)
    }

    fn open<P: AsRef<Path>>(&self, name: P) -> IResult<Self::F> {
        Ok(OpenOptions::new().read(true).open(name)?)
    }

    fn remove<P: AsRef<Path>>(&self, name: P) -> IResult<()> {
        Ok(remove_file(name)?)
    }

    fn exists<P: AsRef<Path>>(&self, name: P) -> bool {
        name.as_ref().exists()
    }

    fn list<P: AsRef<Path>>(&self, dir: P) -> IResult<Vec<PathBuf>> {
        if !dir.as_ref().is_dir() {
            return Ok(vec![]);
        }
        let mut v = vec![];
        for entry in read_dir(dir)? {
            v.push(entry?.path());
        }
        Ok(v)
    }

    fn rename<P: AsRef<Path>>(&self, src: P, target: P) -> IResult<()> {
        Ok(rename(src, target)?)
    }

    fn mkdir_all<P: AsRef<Path>>(&self, dir: P) -> IResult<()> {
        Ok(create_dir_all(dir)?)
    }
}

impl File for SysFile {
    fn lock_file(&self) -> IResult<()> {
        SysFile::try_lock_exclusive(self).map_err(Error::IO)
    }

    fn unlock_file(&self) -> IResult<()> {
        FileExt::unlock(self).map_err(Error::IO)
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> IResult<usize> {
        std::os::unix::prelude::FileExt::read_at(self, buf, offset).map_err(Error::IO)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> IResult<usize> {
        std::os::windows::prelude::FileExt::seek_read(self, buf, offset).map_err(Error::IO)
    }

    fn sync(&self) -> IResult<()> {
        SysFile::sync_all(self).map_err(Error::IO)
    }

    fn len(&self) -> IResult<u64> {
        Ok(SysFile::metadata(self)?.len())
    }
}
