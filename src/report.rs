//! Leak reports saved to disk and read back by `ld_print`.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    fs,
    path::{Path, PathBuf},
    process,
};

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

use crate::{error::ReportError, leak::Leak, ledger::Leaks};

/// Outstanding allocations of one or more processes.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Report {
    /// Ids of the processes whose leaks are included.
    pub processes: Vec<u32>,
    pub leaks: Vec<Leak>,
}

// Leaks attributed to one call site: (count, bytes).
type SiteTotals = (usize, usize);

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// A report of `leaks` for the current process.
    pub fn capture(leaks: &Leaks) -> Self {
        Report {
            processes: vec![process::id()],
            leaks: leaks.to_vec(),
        }
    }

    /// `leak_debug.<pid>.yaml`
    pub fn file_name(pid: u32) -> String {
        format!("leak_debug.{}.yaml", pid)
    }

    /// Writes the report into `dir`, creating it if needed.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, ReportError> {
        let dir = dir.as_ref();
        let pid = self.processes.first().copied().unwrap_or_else(process::id);
        let path = dir.join(Self::file_name(pid));

        let yaml = serde_yaml::to_string(self).map_err(|source| ReportError::Yaml {
            path: path.clone(),
            source,
        })?;
        fs::create_dir_all(dir).map_err(|source| ReportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        fs::write(&path, yaml).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        log::debug!("wrote {} leaks to {}", self.leaks.len(), path.display());
        Ok(path)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_slice(&bytes).map_err(|source| ReportError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    // Merge two reports.
    pub fn merge(&mut self, other: &Report) {
        for pid in other.processes.iter() {
            if !self.processes.contains(pid) {
                self.processes.push(*pid);
            }
        }
        self.leaks.extend(other.leaks.iter().cloned());
        self.leaks.sort();
    }

    pub fn total_bytes(&self) -> usize {
        self.leaks.iter().map(Leak::size).sum()
    }

    fn format_totals<W: fmt::Write>(count: usize, bytes: usize, f: &mut W) -> fmt::Result {
        write!(
            f,
            "{} leaks, {}B",
            count.to_formatted_string(&Locale::en),
            bytes.to_formatted_string(&Locale::en)
        )
    }

    // Group leaks by call site; leaks with no provenance share one site.
    fn sites(&self) -> Vec<(String, SiteTotals)> {
        let mut sites: HashMap<String, SiteTotals> = HashMap::new();
        for leak in self.leaks.iter() {
            let site = match leak.file() {
                Some(file) if !file.is_empty() => format!("{}({})", file, leak.line()),
                _ => "unknown".to_string(),
            };
            let totals = sites.entry(site).or_insert((0, 0));
            totals.0 += 1;
            totals.1 += leak.size();
        }
        let mut sites: Vec<_> = sites.into_iter().collect();
        sites.sort_by(|(s1, (_, b1)), (s2, (_, b2))| b2.cmp(b1).then_with(|| s1.cmp(s2)));
        sites
    }

    /// Per-call-site summary, largest first.  Sites holding less than
    /// `threshold` percent of the leaked bytes are folded into one line.
    pub fn fmt_with_threshold<W: fmt::Write>(&self, threshold: f64, f: &mut W) -> fmt::Result {
        let total = self.total_bytes();
        let mut below_threshold: SiteTotals = (0, 0);
        for (site, (count, bytes)) in self.sites() {
            if total > 0 && 100.0 * (bytes as f64) / (total as f64) < threshold {
                below_threshold.0 += count;
                below_threshold.1 += bytes;
                continue;
            }
            f.write_str(" ->")?;
            Self::format_totals(count, bytes, f)?;
            writeln!(f, ": {}", site)?;
        }
        if below_threshold.0 > 0 {
            f.write_str(" ->")?;
            Self::format_totals(below_threshold.0, below_threshold.1, f)?;
            writeln!(f, " in places below ld_print threshold ({}%)", threshold)?;
        }
        f.write_str("Total: ")?;
        Self::format_totals(self.leaks.len(), total, f)
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for leak in self.leaks.iter() {
            writeln!(f, "{}", leak)?;
        }
        Self::format_totals(self.leaks.len(), self.total_bytes(), f)
    }
}
