//! Dream artifacts on disk: `dream_NNNN.md` per cycle plus `latest_dream.md`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use miette::Diagnostic;
use thiserror::Error;

use crate::experience::NarrativeResult;

/// File always overwritten with the newest artifact.
pub const LATEST_FILE: &str = "latest_dream.md";

const PREFIX: &str = "dream_";
const EXTENSION: &str = "md";

/// Errors from writing or pruning artifacts.
#[derive(Debug, Error, Diagnostic)]
pub enum OutputError {
    #[error("failed to create output directory: {path}")]
    #[diagnostic(
        code(sleepwalker::output::create_dir),
        help("Check that the parent directory exists and is writable, or pass --output-dir.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write dream: {path}")]
    #[diagnostic(
        code(sleepwalker::output::write),
        help("Check free disk space and permissions on the output directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list output directory: {path}")]
    #[diagnostic(code(sleepwalker::output::list))]
    List {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Header fields written above each narrative.
#[derive(Debug, Clone)]
pub struct DreamHeader<'a> {
    pub cycle: u64,
    pub generated_at: DateTime<Local>,
    pub explored: &'a Path,
    pub discoveries: usize,
}

/// Render an artifact: metadata header, separator, narrative.
pub fn render_dream(header: &DreamHeader<'_>, result: &NarrativeResult) -> String {
    format!(
        "# Dream #{}\nGenerated: {}\nExplored: {}\nDiscoveries: {}\n\n---\n\n{}\n",
        header.cycle,
        header.generated_at.format("%Y-%m-%d %H:%M:%S"),
        header.explored.display(),
        header.discoveries,
        result.content
    )
}

/// Name of the artifact for `cycle`.
pub fn dream_file_name(cycle: u64) -> String {
    format!("{PREFIX}{cycle:04}.{EXTENSION}")
}

/// Cycle number of an artifact file name, if it is one.
pub fn parse_cycle(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(PREFIX)?
        .strip_suffix(&format!(".{EXTENSION}"))?
        .parse()
        .ok()
}

/// Writes dream artifacts into one directory.
#[derive(Debug, Clone)]
pub struct DreamWriter {
    dir: PathBuf,
}

impl DreamWriter {
    /// Create the output directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> OutputResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| OutputError::CreateDir {
            path: dir.display().to_string(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// Write the cycle artifact and refresh the latest pointer. Returns the artifact path.
    pub fn write(&self, header: &DreamHeader<'_>, result: &NarrativeResult) -> OutputResult<PathBuf> {
        let body = render_dream(header, result);
        let path = self.dir.join(dream_file_name(header.cycle));
        write_file(&path, &body)?;
        write_file(&self.latest_path(), &body)?;
        Ok(path)
    }

    /// Artifacts present on disk, oldest cycle first.
    pub fn artifacts(&self) -> OutputResult<Vec<(u64, PathBuf)>> {
        let list_err = |e: std::io::Error| OutputError::List {
            path: self.dir.display().to_string(),
            source: e,
        };
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let name = entry.file_name();
            if let Some(cycle) = name.to_str().and_then(parse_cycle) {
                found.push((cycle, entry.path()));
            }
        }
        found.sort();
        Ok(found)
    }

    /// Delete the oldest artifacts beyond `retention`. Returns how many were removed.
    pub fn prune(&self, retention: usize) -> OutputResult<usize> {
        let artifacts = self.artifacts()?;
        if artifacts.len() <= retention {
            return Ok(0);
        }
        let excess = artifacts.len() - retention;
        let mut removed = 0;
        for (_, path) in artifacts.into_iter().take(excess) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to prune dream"),
            }
        }
        Ok(removed)
    }
}

fn write_file(path: &Path, body: &str) -> OutputResult<()> {
    std::fs::write(path, body).map_err(|e| OutputError::Write {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experience::ExperienceMode;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn result(content: &str) -> NarrativeResult {
        let now = Utc::now();
        NarrativeResult {
            kind: ExperienceMode::Dream,
            session_start: now,
            session_end: now,
            observation_count: 2,
            content: content.into(),
            metadata: BTreeMap::new(),
            output_format: NarrativeResult::MARKDOWN.into(),
        }
    }

    fn header(cycle: u64, explored: &Path) -> DreamHeader<'_> {
        DreamHeader {
            cycle,
            generated_at: Local.with_ymd_and_hms(2025, 6, 1, 3, 4, 5).unwrap(),
            explored,
            discoveries: 2,
        }
    }

    #[test]
    fn file_names_are_zero_padded() {
        assert_eq!(dream_file_name(7), "dream_0007.md");
        assert_eq!(dream_file_name(12345), "dream_12345.md");
        assert_eq!(parse_cycle("dream_0007.md"), Some(7));
        assert_eq!(parse_cycle("latest_dream.md"), None);
        assert_eq!(parse_cycle("dream_abc.md"), None);
    }

    #[test]
    fn rendered_header_precedes_content() {
        let body = render_dream(&header(3, Path::new("/home/me/Documents")), &result("a dream"));
        assert_eq!(
            body,
            "# Dream #3\nGenerated: 2025-06-01 03:04:05\nExplored: /home/me/Documents\nDiscoveries: 2\n\n---\n\na dream\n"
        );
    }

    #[test]
    fn write_updates_latest() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = DreamWriter::create(dir.path().join("dreams")).unwrap();
        let explored = dir.path().to_path_buf();
        writer.write(&header(1, &explored), &result("first")).unwrap();
        let second = writer.write(&header(2, &explored), &result("second")).unwrap();

        assert!(second.ends_with("dream_0002.md"));
        let latest = std::fs::read_to_string(writer.latest_path()).unwrap();
        assert_eq!(latest, std::fs::read_to_string(second).unwrap());
        assert!(latest.contains("second"));
    }

    #[test]
    fn prune_keeps_newest_by_cycle_number() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = DreamWriter::create(dir.path()).unwrap();
        let explored = dir.path().to_path_buf();
        for cycle in [9, 10, 11, 100] {
            writer.write(&header(cycle, &explored), &result("x")).unwrap();
        }
        assert_eq!(writer.prune(2).unwrap(), 2);
        let left: Vec<u64> = writer.artifacts().unwrap().into_iter().map(|(c, _)| c).collect();
        assert_eq!(left, vec![11, 100]);
        assert!(writer.latest_path().exists());
        assert_eq!(writer.prune(5).unwrap(), 0);
    }

    #[test]
    fn unwritable_output_dir_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = DreamWriter::create(blocker.join("dreams")).unwrap_err();
        assert!(matches!(err, OutputError::CreateDir { .. }));
    }
}
