//! Async filesystem helpers re-exported from Tokio.
//!
//! The scanner and uploader only need metadata, directory listing and file
//! handles, but the full surface is exposed so callers stay off `tokio::fs`.

pub use tokio::fs::{
    canonicalize, copy, create_dir, create_dir_all, metadata, read, read_dir, read_link,
    read_to_string, remove_dir, remove_dir_all, remove_file, rename, symlink_metadata, write,
    DirBuilder, DirEntry, File, OpenOptions, ReadDir,
};
