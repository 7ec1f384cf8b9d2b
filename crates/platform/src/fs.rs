//! Filesystem collaborator traits
//!
//! The recorder writes WAV files through a FAT-style volume layer that is
//! not part of this workspace. These traits pin down exactly what the core
//! relies on: mount/create/unmount on the volume, write/seek/sync/close on
//! an open file. The core only ever checks success or failure — it never
//! inspects the error payload.

/// An open, writable file.
pub trait File {
    /// Error type
    type Error: core::fmt::Debug;

    /// Write from `buf` at the current position, returning the number of
    /// bytes actually written (may be short on a full volume).
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Move the read/write position to `pos` bytes from the start.
    fn seek(&mut self, pos: u32) -> Result<(), Self::Error>;

    /// Flush cached data and directory state to the medium.
    fn sync(&mut self) -> Result<(), Self::Error>;

    /// Close the file, flushing any remaining state.
    fn close(self) -> Result<(), Self::Error>;
}

/// A mountable volume that can create files.
pub trait Filesystem {
    /// Error type
    type Error: core::fmt::Debug;
    /// File handle type
    type File: File;

    /// Mount the volume.
    fn mount(&mut self) -> Result<(), Self::Error>;

    /// Create `path`, truncating any existing file, opened for writing.
    fn create(&mut self, path: &str) -> Result<Self::File, Self::Error>;

    /// Unmount the volume.
    fn unmount(&mut self) -> Result<(), Self::Error>;
}
