//! Output bundle assembly.

pub mod assembler;

pub use assembler::{copy_shell, prepare_output_dir, write_manifest, DEFAULT_SHELL_DIR};
