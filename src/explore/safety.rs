//! Containment and depth predicates for the random walk.
//!
//! Every candidate is canonicalized (symlinks resolved) before it is compared
//! against the allowed roots, so a link pointing outside the roots is never
//! considered safe. Resolution failures answer `false`; nothing here errors.

use std::path::{Path, PathBuf};

/// Canonicalize roots, dropping any that cannot be resolved and duplicates.
pub fn resolve_roots<I, P>(roots: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut resolved: Vec<PathBuf> = Vec::new();
    for root in roots {
        let root = root.as_ref();
        match std::fs::canonicalize(root) {
            Ok(path) => {
                if !resolved.contains(&path) {
                    resolved.push(path);
                }
            }
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "dropping unresolvable root");
            }
        }
    }
    resolved
}

/// Is `candidate` equal to or beneath at least one of `allowed_roots`?
pub fn is_contained(candidate: &Path, allowed_roots: &[PathBuf]) -> bool {
    PathSafety::new(resolve_roots(allowed_roots), usize::MAX).is_contained(candidate)
}

/// Is `candidate` contained and no deeper than `max_depth` below its nearest root?
///
/// A file's own name does not count as a level.
pub fn depth_within_limit(
    candidate: &Path,
    allowed_roots: &[PathBuf],
    max_depth: usize,
    is_file: bool,
) -> bool {
    PathSafety::new(resolve_roots(allowed_roots), max_depth).depth_within_limit(candidate, is_file)
}

/// Where a resolved path sits relative to the allowed roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// The canonical form of the candidate.
    pub resolved: PathBuf,
    /// Fewest path segments between the candidate and a containing root.
    pub segments: usize,
}

/// Pre-resolved roots plus the depth limit.
#[derive(Debug, Clone)]
pub struct PathSafety {
    roots: Vec<PathBuf>,
    max_depth: usize,
}

impl PathSafety {
    /// `roots` must already be canonical (see [`resolve_roots`]).
    pub fn new(roots: Vec<PathBuf>, max_depth: usize) -> Self {
        Self { roots, max_depth }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolve `candidate` and find its nearest containing root.
    pub fn locate(&self, candidate: &Path) -> Option<Placement> {
        let resolved = std::fs::canonicalize(candidate).ok()?;
        self.locate_resolved(resolved)
    }

    /// Like [`locate`](Self::locate) for a path that is already canonical.
    pub fn locate_resolved(&self, resolved: PathBuf) -> Option<Placement> {
        let segments = self
            .roots
            .iter()
            .filter_map(|root| resolved.strip_prefix(root).ok())
            .map(|rel| rel.components().count())
            .min()?;
        Some(Placement { resolved, segments })
    }

    pub fn is_contained(&self, candidate: &Path) -> bool {
        self.locate(candidate).is_some()
    }

    pub fn depth_within_limit(&self, candidate: &Path, is_file: bool) -> bool {
        self.locate(candidate)
            .is_some_and(|p| self.placement_within_limit(&p, is_file))
    }

    pub fn placement_within_limit(&self, placement: &Placement, is_file: bool) -> bool {
        effective_depth(placement.segments, is_file) <= self.max_depth
    }
}

/// Depth levels a path occupies: a file's own name is not a level.
pub fn effective_depth(segments: usize, is_file: bool) -> usize {
    if is_file {
        segments.saturating_sub(1)
    } else {
        segments
    }
}
