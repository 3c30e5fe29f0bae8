use std::{
    borrow::Cow,
    fmt::{self, Display, Formatter},
};

use serde::{Deserialize, Serialize};

use crate::provenance::Provenance;

/// One outstanding allocation: where it lives, how big it is and which line
/// of code asked for it.
///
/// Records compare field by field in the order address, size, file, line.
/// A record with no file sorts before one with a file.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Leak {
    address: usize,
    size: usize,
    file: Option<Cow<'static, str>>,
    line: u32,
}

impl Leak {
    pub fn new(address: usize, size: usize, provenance: Option<Provenance>) -> Self {
        match provenance {
            Some(p) => Leak {
                address,
                size,
                file: Some(Cow::Borrowed(p.file)),
                line: p.line,
            },
            None => Leak {
                address,
                size,
                file: None,
                line: 0,
            },
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

/// `<size> bytes at <address> allocated by <file>(<line>)`
impl Display for Leak {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes at {:#x} allocated by ",
            self.size, self.address
        )?;
        match self.file() {
            Some(file) if !file.is_empty() => write!(f, "{}({})", file, self.line),
            _ => f.write_str("unknown"),
        }
    }
}
