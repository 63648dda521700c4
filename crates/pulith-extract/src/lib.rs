//! Safe extraction of tar, zip and compressed archives.
//!
//! Every entry name is joined onto the destination lexically and dropped when the
//! result would land outside it. Links are created only after all regular entries,
//! with each symlink path first claimed by a placeholder file so that one link
//! can't be used to write through another.
//!
//! # Architecture
//!
//! - `format.rs` - Format detection
//! - `sanitize.rs` - Path containment (zip-slip prevention)
//! - `extract/` - Dispatch and per-format entry loops
//! - `links.rs` - Deferred link creation
//! - `fs.rs` - Filesystem capabilities
//! - `cancel.rs` - Cooperative cancellation

use std::io::{Read, Seek};
use std::path::Path;

pub use cancel::{CancelToken, CancelableReader, CopyError, copy_cancelable, is_cancelled_error};
pub use entry::{ArchiveEntry, EntryKind, LinkKind, PendingLink};
pub use error::{Error, FsOp, Result};
pub use extract::{Extractor, SINGLE_FILE_MODE};
pub use format::{ArchiveFormat, Compression, SNIFF_LEN, detect_format};
pub use fs::{ChrootFs, FileInfo, Filesystem, OpenFlags, OsFs};
pub use links::LinkResolver;
pub use options::{ExtractOptions, Progress, ProgressCallback, Renamer};
pub use sanitize::safe_join;

pub mod cancel;
pub mod entry;
mod error;
mod extract;
pub mod format;
pub mod fs;
mod links;
pub mod options;
pub mod sanitize;

/// Extract `reader` into `dest` on the real filesystem.
///
/// `format` of `None` detects the archive type from its leading bytes.
pub fn extract<R: Read>(
    format: Option<ArchiveFormat>,
    reader: R,
    dest: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<()> {
    Extractor::os().extract(format, reader, dest, options)
}

/// Extract a seekable `reader` into `dest` on the real filesystem.
pub fn extract_seekable<R: Read + Seek>(
    format: Option<ArchiveFormat>,
    reader: R,
    dest: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<()> {
    Extractor::os().extract_seekable(format, reader, dest, options)
}
