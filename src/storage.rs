use crate::error::Error;
use crate::IResult;
use std::path::{Path, PathBuf};

mod file;

pub use file::FileStorage;

pub trait Storage: Sync + Send {
    type F: File + 'static;

    /// Create the specified path file, truncating an existing one.
    fn create<P: AsRef<Path>>(&self, name: P) -> IResult<Self::F>;

    /// Open a file for reading.
    fn open<P: AsRef<Path>>(&self, name: P) -> IResult<Self::F>;

    /// Delete the named file
    fn remove<P: AsRef<Path>>(&self, name: P) -> IResult<()>;

    /// Returns true iff the name file or dir exists.
    fn exists<P: AsRef<Path>>(&self, name: P) -> bool;

    /// Returns a list of the path to each file in given directory, or an
    /// empty list if the directory doesn't exist.
    fn list<P: AsRef<Path>>(&self, dir: P) -> IResult<Vec<PathBuf>>;

    /// Rename a file or directory to a new name, replacing the original file if
    /// `new` already exists.
    fn rename<P: AsRef<Path>>(&self, src: P, target: P) -> IResult<()>;

    /// Recursively create a directory and all of its parent components if they
    /// are missing.
    fn mkdir_all<P: AsRef<Path>>(&self, dir: P) -> IResult<()>;
}

pub trait File: Sync + Send {
    /// Lock the file for exclusive usage, failing if the file is currently locked.
    fn lock_file(&self) -> IResult<()>;

    /// UnLock the file
    fn unlock_file(&self) -> IResult<()>;

    /// Reads bytes from an offset in this source into a buffer, returning how
    /// many bytes were read.
    ///
    /// This function may yield fewer bytes than the size of `buf`, if it was
    /// interrupted or hit the "EOF".
    fn read_at(&self, buf: &mut [u8], offset: u64) -> IResult<usize>;

    /// Reads the exact number of bytes required to fill `buf` from an `offset`.
    ///
    /// Errors if the "EOF" is encountered before filling the buffer.
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> IResult<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => break,
                Ok(n) => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                    offset += n as u64;
                }
                Err(Error::IO(err)) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        if !buf.is_empty() {
            return Err(Error::IO(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "failed to fill whole buffer.",
            )));
        }
        Ok(())
    }

    /// Flush data and metadata of the file to disk.
    fn sync(&self) -> IResult<()>;

    fn len(&self) -> IResult<u64>;
}

/// Removes the named file, a file which is already gone is not an error.
pub fn remove_if_exists<S: Storage, P: AsRef<Path>>(env: &S, name: P) -> IResult<()> {
    match env.remove(name) {
        Err(Error::IO(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        r => r,
    }
}
