use std::io::{self, Read, Seek};

use super::Session;
use crate::entry::EntryKind;
use crate::error::Result;
use crate::fs::Filesystem;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

pub(crate) fn unpack<F, R>(session: &mut Session<'_, F>, reader: R) -> Result<()>
where
    F: Filesystem + ?Sized,
    R: Read + Seek,
{
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| session.malformed(io::Error::from(e)))?;

    for index in 0..archive.len() {
        session.check_cancel()?;
        let mut file = archive
            .by_index(index)
            .map_err(|e| session.malformed(io::Error::from(e)))?;

        // Archives written on Windows may use `\` as separator.
        let mut raw_name = file.name().to_string();
        let mut force_dir = false;
        if raw_name.contains('\\') {
            force_dir = raw_name.ends_with('\\');
            raw_name = raw_name.replace('\\', "/");
        }

        let unix_mode = file.unix_mode();
        let is_dir = force_dir || file.is_dir();
        let mode = match unix_mode {
            Some(mode) => mode,
            None if is_dir => DEFAULT_DIR_MODE,
            None => DEFAULT_FILE_MODE,
        };

        let kind = if is_dir {
            EntryKind::Directory
        } else if unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
            let mut target = Vec::new();
            file.read_to_end(&mut target)
                .map_err(|e| session.malformed(e))?;
            EntryKind::Symlink {
                target: String::from_utf8_lossy(&target).into_owned(),
            }
        } else {
            EntryKind::File
        };

        let Some(prepared) = session.prepare(&raw_name, kind, mode) else {
            continue;
        };
        session.materialize(prepared, &mut file)?;
    }

    Ok(())
}
