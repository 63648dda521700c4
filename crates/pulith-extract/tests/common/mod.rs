#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use pulith_extract::{FileInfo, Filesystem, OpenFlags};
use zip::write::SimpleFileOptions;

/// A capability call recorded by [`JournalFs`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    MkdirAll { path: PathBuf, mode: u32 },
    Open { path: PathBuf, mode: u32 },
    Link { original: PathBuf, link: PathBuf },
    Symlink { target: PathBuf, link: PathBuf },
    Remove { path: PathBuf },
    Stat { path: PathBuf },
    Chmod { path: PathBuf, mode: u32 },
}

/// Records every call before forwarding it to `inner`.
pub struct JournalFs<F> {
    inner: F,
    journal: RefCell<Vec<Op>>,
}

impl<F: Filesystem> JournalFs<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            journal: RefCell::new(Vec::new()),
        }
    }

    pub fn journal(&self) -> Vec<Op> {
        self.journal.borrow().clone()
    }

    fn record(&self, op: Op) {
        self.journal.borrow_mut().push(op);
    }
}

impl<F: Filesystem> Filesystem for JournalFs<F> {
    type File = F::File;

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.record(Op::MkdirAll {
            path: path.to_path_buf(),
            mode,
        });
        self.inner.mkdir_all(path, mode)
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<F::File> {
        self.record(Op::Open {
            path: path.to_path_buf(),
            mode,
        });
        self.inner.open_file(path, flags, mode)
    }

    fn link(&self, original: &Path, link: &Path) -> io::Result<()> {
        self.record(Op::Link {
            original: original.to_path_buf(),
            link: link.to_path_buf(),
        });
        self.inner.link(original, link)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.record(Op::Symlink {
            target: target.to_path_buf(),
            link: link.to_path_buf(),
        });
        self.inner.symlink(target, link)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.record(Op::Remove {
            path: path.to_path_buf(),
        });
        self.inner.remove(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        self.record(Op::Stat {
            path: path.to_path_buf(),
        });
        self.inner.stat(path)
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.record(Op::Chmod {
            path: path.to_path_buf(),
            mode,
        });
        self.inner.chmod(path, mode)
    }
}

/// One member of a generated archive. Names are stored verbatim, unsafe ones included.
#[derive(Clone, Copy, Debug)]
pub enum Member<'a> {
    Dir(&'a str, u32),
    File(&'a str, &'a [u8], u32),
    HardLink(&'a str, &'a str),
    Symlink(&'a str, &'a str),
}

pub fn tar_archive(members: &[Member<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for member in members {
        let (header, data): (tar::Header, &[u8]) = match *member {
            Member::Dir(name, mode) => (
                raw_header(name, "", tar::EntryType::Directory, 0, mode),
                b"",
            ),
            Member::File(name, data, mode) => (
                raw_header(name, "", tar::EntryType::Regular, data.len() as u64, mode),
                data,
            ),
            Member::HardLink(name, target) => {
                (raw_header(name, target, tar::EntryType::Link, 0, 0o777), b"")
            }
            Member::Symlink(name, target) => {
                (raw_header(name, target, tar::EntryType::Symlink, 0, 0o777), b"")
            }
        };
        builder.append(&header, data).unwrap();
    }
    builder.into_inner().unwrap()
}

// `Header::set_path` refuses `..` and absolute names, so fill the fields directly.
fn raw_header(
    name: &str,
    link: &str,
    entry_type: tar::EntryType,
    size: u64,
    mode: u32,
) -> tar::Header {
    assert!(name.len() <= 100 && link.len() <= 100, "name too long for a ustar header");
    let mut header = tar::Header::new_ustar();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.as_old_mut().linkname[..link.len()].copy_from_slice(link.as_bytes());
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_cksum();
    header
}

/// Zip has no hard links: they are stored as a copy of the file they point to.
pub fn zip_archive(members: &[Member<'_>]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for member in members {
        match *member {
            Member::Dir(name, mode) => {
                zip.add_directory(name, options.unix_permissions(mode)).unwrap();
            }
            Member::File(name, data, mode) => {
                zip.start_file(name, options.unix_permissions(mode)).unwrap();
                zip.write_all(data).unwrap();
            }
            Member::HardLink(name, target) => {
                let data = members
                    .iter()
                    .find_map(|m| match *m {
                        Member::File(n, data, _) if n == target => Some(data),
                        _ => None,
                    })
                    .expect("hard link target must be a file of the archive");
                zip.start_file(name, options.unix_permissions(0o644)).unwrap();
                zip.write_all(data).unwrap();
            }
            Member::Symlink(name, target) => {
                zip.add_symlink(name, target, options).unwrap();
            }
        }
    }
    zip.finish().unwrap().into_inner()
}

/// Archive container and compression used to pack the same members.
#[derive(Clone, Copy, Debug)]
pub enum Packing {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    TarZst,
    Zip,
}

impl Packing {
    pub fn pack(self, members: &[Member<'_>]) -> Vec<u8> {
        match self {
            Self::Tar => tar_archive(members),
            Self::TarGz => gzip(&tar_archive(members)),
            Self::TarBz2 => bzip2(&tar_archive(members)),
            Self::TarXz => xz(&tar_archive(members)),
            Self::TarZst => zstd(&tar_archive(members)),
            Self::Zip => zip_archive(members),
        }
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn xz(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn zstd(data: &[u8]) -> Vec<u8> {
    zstd::stream::encode_all(data, 0).unwrap()
}

/// Snapshot of a directory: relative path to `dir`, `link` or the file content.
pub fn tree(root: &Path) -> BTreeMap<String, String> {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let file_type = entry.file_type();
            let value = if file_type.is_symlink() {
                "link".to_string()
            } else if file_type.is_dir() {
                "dir".to_string()
            } else {
                std::fs::read_to_string(entry.path()).unwrap()
            };
            (relative, value)
        })
        .collect()
}

pub fn expected(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(path, value)| (path.to_string(), value.to_string()))
        .collect()
}

/// Members of the reference archive used by most tests.
pub const STANDARD: &[Member<'static>] = &[
    Member::Dir("archive/", 0o755),
    Member::Dir("archive/folder/", 0o755),
    Member::File("archive/folder/file1.txt", b"folder/File1", 0o644),
    Member::File("archive/file1.txt", b"File1", 0o644),
    Member::File("archive/file2.txt", b"File2", 0o644),
    Member::HardLink("archive/link.txt", "archive/file1.txt"),
    Member::Symlink("archive/folderlink", "folder"),
];

pub fn standard_tree() -> BTreeMap<String, String> {
    expected(&[
        ("", "dir"),
        ("archive", "dir"),
        ("archive/folder", "dir"),
        ("archive/folderlink", "link"),
        ("archive/folder/file1.txt", "folder/File1"),
        ("archive/file1.txt", "File1"),
        ("archive/file2.txt", "File2"),
        ("archive/link.txt", "File1"),
    ])
}
