//! Path handling for the render pipeline.
//!
//! - [`mapper`] derives output locations from input locations (pure, no I/O).
//! - [`discover`] enumerates target documents and directories on disk.

pub mod discover;
pub mod mapper;

pub use discover::{
    directories, is_hidden_path, is_target_file, resolve_paths, target_files, ResolvedPaths,
};
pub use mapper::{change_extension, mirror_dir, output_path, OUTPUT_EXTENSION};
