use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cancel::CancelToken;

/// Maps an archive name to its output name. An empty result skips the entry.
pub type Renamer = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ExtractOptions {
    pub strip_components: usize,
    pub renamer: Option<Renamer>,
    pub cancel: CancelToken,
    pub on_progress: Option<ProgressCallback>,
}

/// Reported after every regular file written.
#[derive(Clone, Debug)]
pub struct Progress {
    /// Bytes of file content written so far in this extraction.
    pub bytes_processed: u64,
    pub current_file: PathBuf,
}

impl ExtractOptions {
    pub fn strip_components(mut self, n: usize) -> Self {
        self.strip_components = n;
        self
    }

    pub fn renamer(mut self, renamer: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.renamer = Some(Arc::new(renamer));
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Output name for an archive member, or `None` when it must be skipped.
    ///
    /// Leading components are stripped first, then the renamer runs on what remains.
    pub fn rename(&self, name: &str) -> Option<String> {
        let stripped = if self.strip_components > 0 {
            strip_components(name, self.strip_components)?
        } else {
            name.to_string()
        };

        let renamed = match &self.renamer {
            Some(renamer) => renamer(&stripped),
            None => stripped,
        };
        (!renamed.is_empty()).then_some(renamed)
    }

    pub(crate) fn report(&self, bytes_processed: u64, current_file: PathBuf) {
        if let Some(callback) = &self.on_progress {
            callback(Progress {
                bytes_processed,
                current_file,
            });
        }
    }
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("strip_components", &self.strip_components)
            .field("renamer", &self.renamer.is_some())
            .field("cancel", &self.cancel)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

fn strip_components(name: &str, count: usize) -> Option<String> {
    let parts: Vec<&str> = name
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if parts.len() <= count {
        return None;
    }
    Some(parts[count..].join("/"))
}
