//! Bounded random-walk exploration of the allowed directories.
//!
//! The [`Explorer`] keeps a single position inside the allowed roots and a
//! visited set. Each [`Explorer::wander`] call takes one step:
//!
//! 1. resolve where to start (the current position, or a random root),
//! 2. look around: a file is its own discovery, a directory offers its safe entries,
//! 3. pick an entry (favoring unvisited ones and preview-worthy files) or,
//!    sometimes, the directory itself,
//! 4. record the discovery and move: into directories, beside files.
//!
//! Filesystem errors never escape a step. They turn into "nothing found this
//! attempt", and the walk retries from a fresh random root.

pub mod classify;
pub mod safety;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use classify::FileClassifier;
use safety::{PathSafety, Placement};

// ---------------------------------------------------------------------------
// Discoveries
// ---------------------------------------------------------------------------

/// Whether a discovery is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryKind {
    File,
    Directory,
}

impl DiscoveryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryKind::File => "file",
            DiscoveryKind::Directory => "directory",
        }
    }
}

impl std::fmt::Display for DiscoveryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filesystem item surfaced by a single wander step.
///
/// Directories never carry a size or a preview; use the constructors to keep
/// that shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    /// Canonical path of the item.
    pub path: PathBuf,
    pub name: String,
    pub kind: DiscoveryKind,
    /// File size in bytes, when the stat succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Condensed content for preview-worthy files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Last modification time reported by the filesystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
}

impl Discovery {
    pub fn file(
        path: PathBuf,
        size_bytes: Option<u64>,
        preview: Option<String>,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: display_name(&path),
            path,
            kind: DiscoveryKind::File,
            size_bytes,
            preview,
            modified_at,
            discovered_at: Utc::now(),
        }
    }

    pub fn directory(path: PathBuf, modified_at: Option<DateTime<Utc>>) -> Self {
        Self {
            name: display_name(&path),
            path,
            kind: DiscoveryKind::Directory,
            size_bytes: None,
            preview: None,
            modified_at,
            discovered_at: Utc::now(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == DiscoveryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == DiscoveryKind::Directory
    }
}

/// The final path component, or the whole path for roots like `/`.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the random walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Deepest directory level below a root that may be entered.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Discoveries allowed per explorer before `wander` stops yielding.
    #[serde(default = "default_max_discoveries")]
    pub max_discoveries: usize,
    /// Chance of reporting the surrounding directory instead of an entry in it.
    #[serde(default = "default_directory_pick_probability")]
    pub directory_pick_probability: f64,
    /// Chance of restricting the choice to unvisited entries when any exist.
    #[serde(default = "default_prefer_unvisited_probability")]
    pub prefer_unvisited_probability: f64,
    /// Fresh-root retries inside one `wander` call.
    #[serde(default = "default_attempts_per_wander")]
    pub attempts_per_wander: usize,
    /// Bytes read when building a file preview.
    #[serde(default = "default_preview_max_bytes")]
    pub preview_max_bytes: usize,
    /// Smallest file (bytes) considered for preview.
    #[serde(default = "default_min_preview_size")]
    pub min_preview_size: u64,
    /// Largest file (bytes) considered for preview.
    #[serde(default = "default_max_preview_size")]
    pub max_preview_size: u64,
    /// Entry names never entered or reported (VCS, caches, virtualenvs).
    #[serde(default = "default_skip_names")]
    pub skip_names: Vec<String>,
}

fn default_max_depth() -> usize {
    3
}
fn default_max_discoveries() -> usize {
    100
}
fn default_directory_pick_probability() -> f64 {
    0.3
}
fn default_prefer_unvisited_probability() -> f64 {
    0.8
}
fn default_attempts_per_wander() -> usize {
    3
}
fn default_preview_max_bytes() -> usize {
    2048
}
fn default_min_preview_size() -> u64 {
    50
}
fn default_max_preview_size() -> u64 {
    1024 * 1024
}
fn default_skip_names() -> Vec<String> {
    [
        ".git",
        "__pycache__",
        ".cache",
        "node_modules",
        ".venv",
        "venv",
        ".pytest_cache",
        ".mypy_cache",
        ".DS_Store",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_discoveries: default_max_discoveries(),
            directory_pick_probability: default_directory_pick_probability(),
            prefer_unvisited_probability: default_prefer_unvisited_probability(),
            attempts_per_wander: default_attempts_per_wander(),
            preview_max_bytes: default_preview_max_bytes(),
            min_preview_size: default_min_preview_size(),
            max_preview_size: default_max_preview_size(),
            skip_names: default_skip_names(),
        }
    }
}

impl ExplorerConfig {
    pub fn classifier(&self) -> FileClassifier {
        FileClassifier {
            min_size: self.min_preview_size,
            max_size: self.max_preview_size,
            preview_max_bytes: self.preview_max_bytes,
        }
    }

    /// Whether `path` names an entry the walk should ignore.
    pub fn is_skipped(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.skip_names.iter().any(|s| s == name))
    }
}

/// `gen_bool` panics outside [0, 1]; a bad value degrades to "never".
fn probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Mutable walk state, owned by exactly one [`Explorer`].
#[derive(Debug, Clone, Default)]
pub struct ExplorationState {
    /// Canonical roots the walk is confined to.
    pub allowed_roots: Vec<PathBuf>,
    /// Where the next step starts; always inside a root when set.
    pub current_position: Option<PathBuf>,
    pub discoveries_made: usize,
    /// Canonical paths already discovered this session.
    pub visited: HashSet<PathBuf>,
}

/// A safe directory entry that may be chosen.
#[derive(Debug, Clone)]
struct Candidate {
    path: PathBuf,
    is_dir: bool,
    size: u64,
}

/// What one look around a location produced.
#[derive(Debug)]
enum Sighting {
    /// A file, or an entry picked inside a directory.
    Item(PathBuf),
    /// The directory itself, chosen on purpose.
    Room(PathBuf),
    /// The directory itself, because nothing inside it was reachable.
    DeadEnd(PathBuf),
}

// ---------------------------------------------------------------------------
// Explorer
// ---------------------------------------------------------------------------

/// Random-walk engine confined to a set of allowed roots.
pub struct Explorer {
    state: ExplorationState,
    config: ExplorerConfig,
    safety: PathSafety,
    classifier: FileClassifier,
    rng: StdRng,
}

impl Explorer {
    /// Create an explorer seeded from the clock, so restarts don't replay a walk.
    pub fn new<I, P>(allowed_dirs: I, config: ExplorerConfig) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
            ^ u64::from(std::process::id()).rotate_left(32);
        Self::with_seed(allowed_dirs, config, seed)
    }

    /// Create an explorer with a fixed seed (reproducible walks).
    pub fn with_seed<I, P>(allowed_dirs: I, config: ExplorerConfig, seed: u64) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = safety::resolve_roots(allowed_dirs);
        let mut rng = StdRng::seed_from_u64(seed);
        let current_position = roots.choose(&mut rng).cloned();
        if roots.is_empty() {
            tracing::warn!("explorer created without any resolvable allowed directory");
        }
        Self {
            safety: PathSafety::new(roots.clone(), config.max_depth),
            classifier: config.classifier(),
            state: ExplorationState {
                allowed_roots: roots,
                current_position,
                discoveries_made: 0,
                visited: HashSet::new(),
            },
            config,
            rng,
        }
    }

    pub fn state(&self) -> &ExplorationState {
        &self.state
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.state.allowed_roots
    }

    pub fn discoveries_made(&self) -> usize {
        self.state.discoveries_made
    }

    /// Has the session discovery cap been reached?
    pub fn is_exhausted(&self) -> bool {
        self.state.discoveries_made >= self.config.max_discoveries
    }

    /// Move the walk to `path` if it lies inside the allowed roots.
    ///
    /// Returns `false` (leaving the position unchanged) otherwise.
    pub fn relocate(&mut self, path: &Path) -> bool {
        match self.safety.locate(path) {
            Some(placement) => {
                self.state.current_position = Some(placement.resolved);
                true
            }
            None => false,
        }
    }

    /// Take one exploration step.
    ///
    /// Returns `None` when the session cap is reached, when there is nowhere
    /// to explore, or when every attempt came up empty.
    ///
    /// Found directories are entered, except dead ends (empty, unreadable, or
    /// with nothing safe inside): those are reported and the next step starts
    /// from their parent instead, so the walk never parks in one. Entries
    /// named in [`ExplorerConfig::skip_names`] are neither entered nor reported.
    pub fn wander(&mut self) -> Option<Discovery> {
        if self.is_exhausted() {
            tracing::debug!(limit = self.config.max_discoveries, "discovery limit reached");
            return None;
        }
        if self.state.allowed_roots.is_empty() {
            tracing::debug!("no allowed roots available for exploration");
            return None;
        }

        let mut location = self.resolve_start()?;
        let attempts = self.config.attempts_per_wander.max(1);
        for attempt in 1..=attempts {
            if let Some(discovery) = self.attempt(&location) {
                return Some(discovery);
            }
            tracing::debug!(attempt, location = %location.display(), "nothing found, trying another root");
            if attempt < attempts {
                location = self.random_root()?;
                self.state.current_position = Some(location.clone());
            }
        }
        None
    }

    /// The current position if it still exists, else a fresh random root.
    fn resolve_start(&mut self) -> Option<PathBuf> {
        if let Some(pos) = &self.state.current_position {
            if pos.exists() {
                return Some(pos.clone());
            }
            tracing::debug!(position = %pos.display(), "current position vanished");
        }
        let root = self.random_root()?;
        self.state.current_position = Some(root.clone());
        Some(root)
    }

    fn random_root(&mut self) -> Option<PathBuf> {
        self.state.allowed_roots.choose(&mut self.rng).cloned()
    }

    /// One attempt: look around `location`, then record whatever was seen.
    fn attempt(&mut self, location: &Path) -> Option<Discovery> {
        let sighting = self.look_around(location)?;
        self.record(sighting)
    }

    fn look_around(&mut self, location: &Path) -> Option<Sighting> {
        let meta = fs::metadata(location).ok()?;
        let here = self.safety.locate(location)?;

        if meta.is_file() {
            return Some(Sighting::Item(here.resolved));
        }
        if !meta.is_dir() {
            return None;
        }

        let entries = match list_dir(&here.resolved) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %here.resolved.display(), error = %e, "unreadable directory");
                return Some(Sighting::DeadEnd(here.resolved));
            }
        };

        let safe: Vec<Candidate> = entries
            .iter()
            .filter_map(|entry| self.safe_candidate(entry))
            .collect();
        if safe.is_empty() {
            return Some(Sighting::DeadEnd(here.resolved));
        }

        let unvisited: Vec<&Candidate> = safe
            .iter()
            .filter(|c| !self.state.visited.contains(&c.path))
            .collect();
        let pool: Vec<&Candidate> = if !unvisited.is_empty()
            && self
                .rng
                .gen_bool(probability(self.config.prefer_unvisited_probability))
        {
            unvisited
        } else {
            safe.iter().collect()
        };

        let preferred: Vec<&Candidate> = pool
            .iter()
            .copied()
            .filter(|c| c.is_dir || self.classifier.qualifies(&c.path, c.size))
            .collect();
        let choices = if preferred.is_empty() { pool } else { preferred };

        if self
            .rng
            .gen_bool(probability(self.config.directory_pick_probability))
        {
            return Some(Sighting::Room(here.resolved));
        }
        choices
            .choose(&mut self.rng)
            .map(|c| Sighting::Item(c.path.clone()))
    }

    /// Resolve an entry and keep it only if it is not noise, contained, and
    /// depth-limited.
    fn safe_candidate(&self, entry: &Path) -> Option<Candidate> {
        if self.config.is_skipped(entry) {
            return None;
        }
        let meta = fs::metadata(entry).ok()?;
        let placement: Placement = self.safety.locate(entry)?;
        if !self.safety.placement_within_limit(&placement, meta.is_file()) {
            return None;
        }
        Some(Candidate {
            path: placement.resolved,
            is_dir: meta.is_dir(),
            size: meta.len(),
        })
    }

    fn record(&mut self, sighting: Sighting) -> Option<Discovery> {
        let (path, dead_end) = match sighting {
            Sighting::Item(p) | Sighting::Room(p) => (p, false),
            Sighting::DeadEnd(p) => (p, true),
        };
        let meta = fs::metadata(&path).ok()?;
        let modified_at = meta.modified().ok().map(DateTime::<Utc>::from);

        let discovery = if meta.is_file() {
            let size = meta.len();
            let preview = self.classifier.preview(&path, size);
            Discovery::file(path, Some(size), preview, modified_at)
        } else {
            Discovery::directory(path, modified_at)
        };

        self.state.visited.insert(discovery.path.clone());
        self.state.discoveries_made += 1;
        self.advance(&discovery, dead_end);

        tracing::debug!(
            name = %discovery.name,
            kind = %discovery.kind,
            path = %discovery.path.display(),
            count = self.state.discoveries_made,
            "discovery made"
        );
        Some(discovery)
    }

    /// Choose where the next step starts.
    ///
    /// Directories are entered, files keep the walk in their parent, and a
    /// dead end backs out to its parent so the walk cannot get stuck there.
    fn advance(&mut self, discovery: &Discovery, dead_end: bool) {
        let next = match discovery.kind {
            DiscoveryKind::Directory if !dead_end => self.contained(&discovery.path),
            _ => discovery
                .path
                .parent()
                .and_then(|parent| self.contained(parent)),
        };
        self.state.current_position = next.or_else(|| self.random_root());
    }

    fn contained(&self, path: &Path) -> Option<PathBuf> {
        self.safety
            .locate_resolved(path.to_path_buf())
            .map(|p| p.resolved)
    }
}

impl std::fmt::Debug for Explorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explorer")
            .field("roots", &self.state.allowed_roots)
            .field("position", &self.state.current_position)
            .field("discoveries_made", &self.state.discoveries_made)
            .field("visited", &self.state.visited.len())
            .finish()
    }
}

fn list_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExplorerConfig {
        ExplorerConfig::default()
    }

    #[test]
    fn new_explorer_starts_at_a_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let explorer = Explorer::with_seed([dir.path()], config(), 7);
        let root = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(explorer.allowed_roots().to_vec(), vec![root.clone()]);
        assert_eq!(explorer.state().current_position, Some(root));
        assert_eq!(explorer.discoveries_made(), 0);
    }

    #[test]
    fn no_roots_means_no_discoveries() {
        let mut explorer = Explorer::with_seed(Vec::<PathBuf>::new(), config(), 7);
        assert!(explorer.state().current_position.is_none());
        assert!(explorer.wander().is_none());
    }

    #[test]
    fn missing_roots_are_dropped() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut explorer = Explorer::with_seed([dir.path().join("gone")], config(), 7);
        assert!(explorer.allowed_roots().is_empty());
        assert!(explorer.wander().is_none());
    }

    #[test]
    fn empty_root_yields_itself() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut explorer = Explorer::with_seed([dir.path()], config(), 11);
        let d = explorer.wander().unwrap();
        assert_eq!(d.kind, DiscoveryKind::Directory);
        assert_eq!(d.path, fs::canonicalize(dir.path()).unwrap());
        assert!(d.size_bytes.is_none() && d.preview.is_none());
    }

    #[test]
    fn file_root_is_its_own_discovery() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("single.txt");
        fs::write(&file, "only me").unwrap();
        let mut explorer = Explorer::with_seed([&file], config(), 3);
        let d = explorer.wander().unwrap();
        assert!(d.is_file());
        assert_eq!(d.name, "single.txt");
        assert_eq!(d.size_bytes, Some(7));
    }

    #[test]
    fn directory_pick_probability_one_always_reports_the_room() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let cfg = ExplorerConfig {
            directory_pick_probability: 1.0,
            ..config()
        };
        let mut explorer = Explorer::with_seed([dir.path()], cfg, 5);
        for _ in 0..10 {
            assert!(explorer.wander().unwrap().is_directory());
        }
    }

    #[test]
    fn directory_pick_probability_zero_prefers_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let cfg = ExplorerConfig {
            directory_pick_probability: 0.0,
            ..config()
        };
        let mut explorer = Explorer::with_seed([dir.path()], cfg, 5);
        let d = explorer.wander().unwrap();
        assert_eq!(d.name, "a.txt");
        // The walk stays beside the file.
        assert_eq!(
            explorer.state().current_position,
            Some(fs::canonicalize(dir.path()).unwrap())
        );
    }

    #[test]
    fn unvisited_entries_come_first_when_always_preferred() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            fs::write(dir.path().join(name), "tiny").unwrap();
        }
        let cfg = ExplorerConfig {
            directory_pick_probability: 0.0,
            prefer_unvisited_probability: 1.0,
            ..config()
        };
        let mut explorer = Explorer::with_seed([dir.path()], cfg, 99);
        let mut names: Vec<String> = (0..3).map(|_| explorer.wander().unwrap().name).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn preview_worthy_files_and_directories_are_preferred() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("tiny.txt"), "x").unwrap();
        fs::write(dir.path().join("image.png"), vec![0u8; 4096]).unwrap();
        fs::write(
            dir.path().join("journal.md"),
            "Dear diary, today the build finally passed and I celebrated with tea.\n",
        )
        .unwrap();
        let cfg = ExplorerConfig {
            directory_pick_probability: 0.0,
            prefer_unvisited_probability: 0.0,
            ..config()
        };
        let mut explorer = Explorer::with_seed([dir.path()], cfg, 1);
        for _ in 0..10 {
            let d = explorer.wander().unwrap();
            assert_eq!(d.name, "journal.md");
            assert!(d.preview.as_deref().unwrap().starts_with("Dear diary"));
        }
    }

    #[test]
    fn dead_end_directory_backs_out_to_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let mut explorer = Explorer::with_seed([dir.path()], config(), 2);
        assert!(explorer.relocate(&root.join("empty")));
        let d = explorer.wander().unwrap();
        assert_eq!(d.name, "empty");
        assert_eq!(explorer.state().current_position, Some(root));
    }

    #[test]
    fn relocate_refuses_outside_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let other = tempfile::TempDir::new().unwrap();
        let mut explorer = Explorer::with_seed([dir.path()], config(), 2);
        let before = explorer.state().current_position.clone();
        assert!(!explorer.relocate(other.path()));
        assert_eq!(explorer.state().current_position, before);
    }

    #[test]
    fn vanished_position_falls_back_to_a_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let mut explorer = Explorer::with_seed([dir.path()], config(), 4);
        assert!(explorer.relocate(&sub));
        fs::remove_dir(&sub).unwrap();
        let d = explorer.wander().unwrap();
        assert!(d.path.starts_with(fs::canonicalize(dir.path()).unwrap()));
    }

    #[test]
    fn cap_stops_the_walk() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let cfg = ExplorerConfig {
            max_discoveries: 4,
            ..config()
        };
        let mut explorer = Explorer::with_seed([dir.path()], cfg, 8);
        let found = (0..20).filter_map(|_| explorer.wander()).count();
        assert_eq!(found, 4);
        assert!(explorer.is_exhausted());
        assert_eq!(explorer.state().discoveries_made, 4);
    }

    #[test]
    fn skip_names_match_the_entry_name_only() {
        let cfg = config();
        assert!(cfg.is_skipped(Path::new("/home/me/project/.git")));
        assert!(cfg.is_skipped(Path::new("node_modules")));
        assert!(!cfg.is_skipped(Path::new("/home/me/.git/notes.md")));
        assert!(!cfg.is_skipped(Path::new("/home/me/gitnotes")));
    }

    #[test]
    fn bad_probabilities_do_not_panic() {
        assert_eq!(probability(f64::NAN), 0.0);
        assert_eq!(probability(4.0), 1.0);
        assert_eq!(probability(-1.0), 0.0);
    }
}
