//! Logging policy: which allocator events are written to which sink.
//!
//! Each event belongs to exactly one category (a failed allocation, a
//! successful allocation or a deallocation).  A [`LogPolicy`] carries two
//! independent [`OutputFlags`] sets, one for the routine sink and one for the
//! error sink, and an event is written to every sink whose set contains its
//! category.

use std::{
    fmt::{self, Display, Formatter},
    ops::{BitOr, BitOrAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// A set of event categories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputFlags(u8);

impl OutputFlags {
    pub const NONE: OutputFlags = OutputFlags(0);

    pub const FAILED_ALLOCATIONS: OutputFlags = OutputFlags(1 << 0);
    pub const SUCCESSFUL_ALLOCATIONS: OutputFlags = OutputFlags(1 << 1);
    pub const DEALLOCATIONS: OutputFlags = OutputFlags(1 << 2);

    pub const ALLOCATIONS: OutputFlags =
        OutputFlags(Self::FAILED_ALLOCATIONS.0 | Self::SUCCESSFUL_ALLOCATIONS.0);
    pub const SUCCESSES: OutputFlags =
        OutputFlags(Self::SUCCESSFUL_ALLOCATIONS.0 | Self::DEALLOCATIONS.0);
    pub const FAILURES: OutputFlags = Self::FAILED_ALLOCATIONS;
    pub const ALL: OutputFlags = OutputFlags(Self::SUCCESSES.0 | Self::FAILURES.0);

    // Composite names come first so that `Display` prefers them.
    const NAMES: [(&'static str, OutputFlags); 8] = [
        ("ALL", Self::ALL),
        ("ALLOCATIONS", Self::ALLOCATIONS),
        ("SUCCESSES", Self::SUCCESSES),
        ("FAILURES", Self::FAILURES),
        ("FAILED_ALLOCATIONS", Self::FAILED_ALLOCATIONS),
        ("SUCCESSFUL_ALLOCATIONS", Self::SUCCESSFUL_ALLOCATIONS),
        ("DEALLOCATIONS", Self::DEALLOCATIONS),
        ("NONE", Self::NONE),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u8) -> Self {
        OutputFlags(bits & Self::ALL.0)
    }

    /// Returns `true` if every category in `other` is also in `self`.
    pub const fn contains(self, other: OutputFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for OutputFlags {
    type Output = OutputFlags;

    fn bitor(self, rhs: OutputFlags) -> OutputFlags {
        OutputFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OutputFlags {
    fn bitor_assign(&mut self, rhs: OutputFlags) {
        self.0 |= rhs.0;
    }
}

impl Display for OutputFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut rest = *self;
        let mut first = true;
        for (name, flags) in Self::NAMES.iter() {
            if rest.contains(*flags) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
                rest = OutputFlags(rest.0 & !flags.0);
            }
        }
        Ok(())
    }
}

/// Error returned when a flag name is not recognized.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("unknown output flag `{0}`")]
pub struct UnknownFlag(pub String);

impl FromStr for OutputFlags {
    type Err = UnknownFlag;

    /// Parses `|`- or `,`-separated flag names, e.g. `FAILURES|DEALLOCATIONS`.
    /// Names are case-insensitive; an empty string means `NONE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = OutputFlags::NONE;
        for part in s.split(|c: char| c == '|' || c == ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (_, f) = Self::NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .ok_or_else(|| UnknownFlag(part.to_string()))?;
            flags |= *f;
        }
        Ok(flags)
    }
}

/// Routes each event category to the routine sink, the error sink, both or
/// neither.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogPolicy {
    pub routine: OutputFlags,
    pub error: OutputFlags,
}

impl LogPolicy {
    /// Log nothing.
    pub const QUIET: LogPolicy = LogPolicy::new(OutputFlags::NONE, OutputFlags::NONE);

    pub const fn new(routine: OutputFlags, error: OutputFlags) -> Self {
        LogPolicy { routine, error }
    }
}

/// Successes go to the routine sink, failures to the error sink.
impl Default for LogPolicy {
    fn default() -> Self {
        LogPolicy::new(OutputFlags::SUCCESSES, OutputFlags::FAILURES)
    }
}
