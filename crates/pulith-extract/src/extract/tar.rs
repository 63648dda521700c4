use std::io::Read;

use tar::EntryType;
use tracing::debug;

use super::Session;
use crate::entry::EntryKind;
use crate::error::Result;
use crate::fs::Filesystem;

const DEFAULT_MODE: u32 = 0o644;

pub(crate) fn unpack<F, R>(session: &mut Session<'_, F>, reader: R) -> Result<()>
where
    F: Filesystem + ?Sized,
    R: Read,
{
    let mut archive = tar::Archive::new(reader);
    let entries = archive.entries().map_err(|e| session.malformed(e))?;

    for entry in entries {
        session.check_cancel()?;
        let mut entry = entry.map_err(|e| session.malformed(e))?;

        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let link_name = entry
            .link_name_bytes()
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .unwrap_or_default();
        let header = entry.header();
        let mode = header.mode().unwrap_or(DEFAULT_MODE);
        let entry_type = header.entry_type();

        let kind = match entry_type {
            t if t.is_dir() => EntryKind::Directory,
            EntryType::Regular | EntryType::Continuous => EntryKind::File,
            EntryType::Link => EntryKind::HardLink { target: link_name },
            EntryType::Symlink => EntryKind::Symlink { target: link_name },
            other => {
                debug!(name = %raw_name, entry_type = ?other, "skipping unsupported tar entry");
                continue;
            }
        };

        let Some(prepared) = session.prepare(&raw_name, kind, mode) else {
            continue;
        };
        session.materialize(prepared, &mut entry)?;
    }

    Ok(())
}
