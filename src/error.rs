use std::{io, path::PathBuf};

use thiserror::Error;

/// The real allocator could not satisfy a request.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("out of memory: failed to allocate {size} bytes")]
pub struct OutOfMemory {
    pub size: usize,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to access leak report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed leak report {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
