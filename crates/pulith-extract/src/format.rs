use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use crate::error::{Error, Result};

/// Number of leading bytes inspected when sniffing a stream.
pub const SNIFF_LEN: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Tar,
    Zip,
    Compressed(Compression),
}

/// Compression wrapper around a tar archive or a single file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compression {
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
            Self::Compressed(codec) => codec.extension(),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl Compression {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
            Self::Zstd => "zst",
        }
    }

    /// Wrap `reader` in the decoder for this codec.
    ///
    /// Decoders validate their header lazily, so a malformed wrapper usually
    /// surfaces on the first read rather than here.
    pub fn decoder<'a, R: Read + 'a>(self, reader: R) -> Result<Box<dyn Read + 'a>> {
        match self {
            #[cfg(feature = "gzip")]
            Self::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(reader))),
            #[cfg(feature = "bzip2")]
            Self::Bzip2 => Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader))),
            #[cfg(feature = "xz")]
            Self::Xz => Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader))),
            #[cfg(feature = "zstd")]
            Self::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(reader).map_err(|source| {
                    Error::Decode {
                        format: ArchiveFormat::Compressed(self),
                        source,
                    }
                })?;
                Ok(Box::new(decoder))
            }
            #[allow(unreachable_patterns)]
            _ => Err(Error::UnsupportedFormat {
                kind: self.extension().to_string(),
            }),
        }
    }
}

pub fn detect_format(data: &[u8]) -> Option<ArchiveFormat> {
    match data {
        [0x50, 0x4B, 0x03, 0x04, ..]
        | [0x50, 0x4B, 0x05, 0x06, ..]
        | [0x50, 0x4B, 0x07, 0x08, ..] => Some(ArchiveFormat::Zip),
        [0x1F, 0x8B, ..] => Some(ArchiveFormat::Compressed(Compression::Gzip)),
        [b'B', b'Z', b'h', ..] => Some(ArchiveFormat::Compressed(Compression::Bzip2)),
        [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, ..] => {
            Some(ArchiveFormat::Compressed(Compression::Xz))
        }
        [0x28, 0xB5, 0x2F, 0xFD, ..] => Some(ArchiveFormat::Compressed(Compression::Zstd)),
        _ if is_tar_header(data) => Some(ArchiveFormat::Tar),
        _ => None,
    }
}

// Matches both the POSIX ("ustar\0") and the GNU ("ustar  \0") magic.
fn is_tar_header(data: &[u8]) -> bool {
    data.len() >= SNIFF_LEN && data[257..262] == *b"ustar"
}

/// Best-effort name for a header that is not a supported archive.
pub fn describe_kind(data: &[u8]) -> &'static str {
    infer::get(data).map_or("unknown", |kind| kind.extension())
}

/// Stream returned by [`sniff`]: the sniffed bytes followed by the rest of the source.
pub type Replay<R> = io::Chain<Cursor<Vec<u8>>, R>;

/// A stream whose leading bytes were classified without losing them.
#[derive(Debug)]
pub struct Sniffed<R> {
    pub reader: R,
    pub format: Option<ArchiveFormat>,
    kind: &'static str,
}

impl<R> Sniffed<R> {
    fn new(reader: R, header: &[u8]) -> Self {
        let format = detect_format(header);
        let kind = format.map_or_else(|| describe_kind(header), ArchiveFormat::extension);
        Self {
            reader,
            format,
            kind,
        }
    }

    fn map<T>(self, f: impl FnOnce(R) -> T) -> Sniffed<T> {
        Sniffed {
            reader: f(self.reader),
            format: self.format,
            kind: self.kind,
        }
    }

    /// Extension of the detected format, or a description of the unknown content.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn unsupported(&self) -> Error {
        Error::UnsupportedFormat {
            kind: self.kind.to_string(),
        }
    }
}

fn read_header<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    reader
        .by_ref()
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

/// Classify a forward-only stream, prepending the consumed bytes to the returned reader.
pub fn sniff<R: Read>(mut reader: R) -> io::Result<Sniffed<Replay<R>>> {
    let header = read_header(&mut reader)?;
    let sniffed = Sniffed::new((), &header);
    Ok(sniffed.map(|()| Cursor::new(header).chain(reader)))
}

/// Classify a seekable stream and rewind it to where sniffing started.
pub fn sniff_seekable<R: Read + Seek>(mut reader: R) -> io::Result<Sniffed<R>> {
    let start = reader.stream_position()?;
    let header = read_header(&mut reader)?;
    reader.seek(SeekFrom::Start(start))?;
    Ok(Sniffed::new(reader, &header))
}
