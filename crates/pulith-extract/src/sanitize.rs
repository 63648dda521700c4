use std::path::{self, Path, PathBuf, MAIN_SEPARATOR};

use crate::error::{Error, Result};

/// Join `candidate` onto `root` and reject the result unless it stays inside `root`.
///
/// The join is purely lexical: `..` segments are collapsed before the containment
/// check and nothing on disk is consulted. An absolute `candidate` is appended to
/// `root` rather than replacing it. When `root` is the filesystem root, `..` segments
/// collapse back onto it and are accepted.
pub fn safe_join(root: impl AsRef<Path>, candidate: &str) -> Result<PathBuf> {
    let root = root.as_ref();
    let unsafe_path = || Error::UnsafePath {
        root: root.to_path_buf(),
        candidate: candidate.to_string(),
    };

    if candidate.contains('\0') {
        return Err(unsafe_path());
    }

    let root_str = clean(&root.to_string_lossy());
    let joined = clean(&format!("{root_str}{MAIN_SEPARATOR}{candidate}"));

    if split_volume(&joined).0 != split_volume(&root_str).0 {
        return Err(unsafe_path());
    }

    let inside = if root_str == "." {
        joined != "." && joined != ".." && !joined.starts_with(&format!("..{MAIN_SEPARATOR}"))
    } else if ends_in_parent(&root_str) {
        // A `..` right after the root climbs above it.
        let depth = root_str.split(MAIN_SEPARATOR).count();
        joined.starts_with(&format!("{root_str}{MAIN_SEPARATOR}"))
            && joined
                .split(MAIN_SEPARATOR)
                .nth(depth)
                .is_some_and(|segment| segment != "..")
    } else if root_str.ends_with(path::is_separator) {
        joined.starts_with(&root_str)
    } else {
        joined.starts_with(&format!("{root_str}{MAIN_SEPARATOR}"))
    };

    if inside {
        Ok(PathBuf::from(joined))
    } else {
        Err(unsafe_path())
    }
}

// A cleaned path can only end in `..` when it is made of `..` segments alone.
fn ends_in_parent(cleaned: &str) -> bool {
    let rest = split_volume(cleaned).1;
    rest == ".." || rest.ends_with(&format!("{MAIN_SEPARATOR}.."))
}

/// Lexically normalize a path string.
///
/// Repeated separators and `.` segments are dropped, `..` removes the previous
/// segment (or is dropped at the root of an absolute path) and an empty result
/// becomes `.`. The platform separator is used in the output.
pub fn clean(path: &str) -> String {
    let (volume, rest) = split_volume(path);
    let rooted = rest.starts_with(path::is_separator);

    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split(path::is_separator) {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(&last) if last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            part => parts.push(part),
        }
    }

    let mut out = String::with_capacity(path.len());
    out.push_str(volume);
    if rooted {
        out.push(MAIN_SEPARATOR);
    }
    out.push_str(&parts.join(path::MAIN_SEPARATOR_STR));
    if out.len() == volume.len() {
        out.push('.');
    }
    out
}

#[cfg(windows)]
fn split_volume(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        path.split_at(2)
    } else {
        ("", path)
    }
}

#[cfg(not(windows))]
fn split_volume(path: &str) -> (&str, &str) {
    ("", path)
}
