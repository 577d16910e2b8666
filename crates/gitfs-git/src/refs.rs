//! Git reference types and ref selection.

use std::fmt;

use serde::Serialize;

/// Kind of a mirrored reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// A branch (`refs/heads/*`).
    Branch,
    /// A tag (`refs/tags/*`).
    Tag,
}

/// A reference in a mirror, peeled to the commit it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RefEntry {
    /// Full reference name (e.g., "refs/heads/main").
    pub name: String,
    /// Branch or tag.
    pub kind: RefKind,
    /// Hex id of the commit the reference points at.
    pub commit: String,
    /// Committer timestamp of that commit, in seconds since the epoch.
    pub time: i64,
}

impl RefEntry {
    /// Builds an entry from a full reference name.
    ///
    /// Returns `None` for anything outside `refs/heads/` and `refs/tags/`.
    pub fn from_full_name(name: &str, commit: impl Into<String>, time: i64) -> Option<Self> {
        let kind = if name.starts_with("refs/heads/") {
            RefKind::Branch
        } else if name.starts_with("refs/tags/") {
            RefKind::Tag
        } else {
            return None;
        };

        Some(Self {
            name: name.to_string(),
            kind,
            commit: commit.into(),
            time,
        })
    }

    /// Returns the reference name without prefix.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix("refs/heads/")
            .or_else(|| self.name.strip_prefix("refs/tags/"))
            .unwrap_or(&self.name)
    }
}

impl fmt::Display for RefEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = &self.commit[..8.min(self.commit.len())];
        match self.kind {
            RefKind::Branch => write!(f, "{}@{}", self.short_name(), short),
            RefKind::Tag => write!(f, "tags/{}@{}", self.short_name(), short),
        }
    }
}

/// Outcome of choosing one ref among several pattern matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The winning ref.
    pub chosen: RefEntry,
    /// Refs on diverged commits with the same timestamp as the winner.
    pub ambiguous_with: Vec<String>,
}

impl Selection {
    /// Returns true if the choice fell back to ref-name order.
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguous_with.is_empty()
    }
}

/// Picks the most recent ref among `candidates`.
///
/// Refs on the same commit collapse to the earliest candidate. Commits that
/// are ancestors of another candidate's commit are dropped, leaving the
/// heads. The head with the newest commit timestamp wins; other heads with
/// that same timestamp are reported as ambiguous and the earliest candidate
/// is kept.
///
/// `is_ancestor(a, b)` answers whether commit `a` is an ancestor of commit `b`.
/// Returns `None` when there are no candidates.
pub fn select_newest<E, F>(candidates: &[RefEntry], mut is_ancestor: F) -> Result<Option<Selection>, E>
where
    F: FnMut(&str, &str) -> Result<bool, E>,
{
    let mut distinct: Vec<&RefEntry> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !distinct.iter().any(|d| d.commit == candidate.commit) {
            distinct.push(candidate);
        }
    }

    let mut heads: Vec<&RefEntry> = Vec::with_capacity(distinct.len());
    for &candidate in &distinct {
        let mut superseded = false;
        for other in &distinct {
            if other.commit != candidate.commit && is_ancestor(&candidate.commit, &other.commit)? {
                superseded = true;
                break;
            }
        }
        if !superseded {
            heads.push(candidate);
        }
    }

    let Some(newest) = heads.iter().map(|h| h.time).max() else {
        return Ok(None);
    };
    let mut newest_heads = heads.into_iter().filter(|h| h.time == newest);
    let Some(chosen) = newest_heads.next() else {
        return Ok(None);
    };

    Ok(Some(Selection {
        chosen: chosen.clone(),
        ambiguous_with: newest_heads.map(|h| h.short_name().to_string()).collect(),
    }))
}
