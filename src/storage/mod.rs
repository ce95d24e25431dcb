//! Persistence of finalized recordings

pub mod library;

pub use library::{FolderLibrary, MediaLibrary};
