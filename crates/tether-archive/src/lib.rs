//! Session archive codec for tether.
//!
//! Packs a credential directory into a single self-verifying blob and
//! restores it, all-or-nothing, on another machine or after a restart.
//!
//! # Architecture
//!
//! - **Archive format**: header with content version, zstd-compressed entries
//!   with CRC32, BLAKE3 trailer over the whole body (see [`format`])
//! - **[`ArchiveCodec`]**: `pack` / `decode` / `unpack` / `materialize`
//! - **Tree helpers**: [`read_tree`] captures a directory, [`materialize`]
//!   swaps a new tree into place, [`write_file_atomic`] replaces one file
//!
//! Entry names are relative, `/`-separated paths. Absolute paths, `..`
//! segments and the reserved `.tether-` prefix are rejected on both pack and
//! unpack, so an archive can never write outside its destination.

pub mod codec;
pub mod error;
pub mod format;
pub mod names;
pub mod tree;

pub use codec::{ArchiveCodec, DEFAULT_COMPRESSION_LEVEL};
pub use error::{CodecError, CodecResult};
pub use names::{validate_entry_name, RESERVED_PREFIX};
pub use tree::{materialize, read_tree, write_file_atomic};
