//! Three-way tree merging.
//!
//! Conduit does not attempt content-level merges here — structured
//! append-only file reconciliation lives in the core engine's merger, and
//! prose/code conflicts are the operator's problem. This layer does
//! path-level three-way merge: a path that changed on only one side (or
//! identically on both) merges cleanly; a path that changed differently on
//! both sides is a conflict, resolved only if a whole-side [`MergeStrategy`]
//! was requested.

use crate::diff_impl::flatten;
use crate::error::GitError;
use crate::types::{ConflictEntry, GitOid, MergeOutcome, MergeStrategy, TreeEdit};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

fn oid_to_gix(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn gix_to_oid(id: gix::ObjectId) -> GitOid {
    let bytes: [u8; 20] = id
        .as_bytes()
        .try_into()
        .unwrap_or_else(|_| panic!("non-SHA1 object id"));
    GitOid::from_bytes(bytes)
}

struct ThreeWay {
    base: BTreeMap<String, GitOid>,
    ours: BTreeMap<String, GitOid>,
    theirs: BTreeMap<String, GitOid>,
}

fn flatten_all(
    repo: &gix::Repository,
    base: GitOid,
    ours: GitOid,
    theirs: GitOid,
) -> Result<ThreeWay, GitError> {
    let mut base_files = BTreeMap::new();
    if !base.is_zero() {
        flatten(repo, oid_to_gix(base), "", &mut base_files)?;
    }
    let mut ours_files = BTreeMap::new();
    flatten(repo, oid_to_gix(ours), "", &mut ours_files)?;
    let mut theirs_files = BTreeMap::new();
    flatten(repo, oid_to_gix(theirs), "", &mut theirs_files)?;
    Ok(ThreeWay {
        base: base_files,
        ours: ours_files,
        theirs: theirs_files,
    })
}

/// Resolve every path present in any side, returning clean resolutions and
/// unresolved conflicts separately.
fn resolve_paths(tw: &ThreeWay) -> (BTreeMap<String, Option<GitOid>>, Vec<ConflictEntry>) {
    let mut paths: BTreeSet<&String> = BTreeSet::new();
    paths.extend(tw.base.keys());
    paths.extend(tw.ours.keys());
    paths.extend(tw.theirs.keys());

    let mut resolved = BTreeMap::new();
    let mut conflicts = Vec::new();

    for path in paths {
        let base = tw.base.get(path).copied();
        let ours = tw.ours.get(path).copied();
        let theirs = tw.theirs.get(path).copied();

        if ours == theirs {
            // Both sides agree (including both-deleted): not a conflict.
            resolved.insert(path.clone(), ours);
            continue;
        }
        if ours == base {
            // Only theirs changed it.
            resolved.insert(path.clone(), theirs);
            continue;
        }
        if theirs == base {
            // Only ours changed it.
            resolved.insert(path.clone(), ours);
            continue;
        }
        // Both sides changed it differently: conflict.
        conflicts.push(ConflictEntry {
            path: path.clone(),
            ours_oid: ours.unwrap_or(GitOid::ZERO),
            theirs_oid: theirs.unwrap_or(GitOid::ZERO),
            base_oid: base.unwrap_or(GitOid::ZERO),
        });
    }

    (resolved, conflicts)
}

pub(crate) fn detect_conflicts(
    repo: &Mutex<gix::Repository>,
    base: GitOid,
    ours: GitOid,
    theirs: GitOid,
) -> Result<Vec<ConflictEntry>, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let tw = flatten_all(&repo, base, ours, theirs)?;
    let (_, conflicts) = resolve_paths(&tw);
    Ok(conflicts)
}

pub(crate) fn merge_trees(
    repo: &Mutex<gix::Repository>,
    base: GitOid,
    ours: GitOid,
    theirs: GitOid,
    strategy: MergeStrategy,
) -> Result<MergeOutcome, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let tw = flatten_all(&repo, base, ours, theirs)?;
    let (mut resolved, mut conflicts) = resolve_paths(&tw);

    if !conflicts.is_empty() {
        match strategy {
            MergeStrategy::Strict => {
                return Ok(MergeOutcome {
                    tree: None,
                    conflicts,
                });
            }
            MergeStrategy::FavorOurs => {
                for c in conflicts.drain(..) {
                    let value = if c.ours_oid.is_zero() { None } else { Some(c.ours_oid) };
                    resolved.insert(c.path, value);
                }
            }
            MergeStrategy::FavorTheirs => {
                for c in conflicts.drain(..) {
                    let value = if c.theirs_oid.is_zero() { None } else { Some(c.theirs_oid) };
                    resolved.insert(c.path, value);
                }
            }
        }
    }

    // Build the merged tree from an empty root using upserts, since we
    // already have the fully-resolved flat file list.
    let empty_tree = repo.empty_tree();
    let mut editor = empty_tree.edit().map_err(GitError::backend)?;
    for (path, oid) in &resolved {
        match oid {
            Some(oid) => {
                editor
                    .upsert(path.as_str(), gix::objs::tree::EntryKind::Blob, oid_to_gix(*oid))
                    .map_err(GitError::backend)?;
            }
            None => {
                editor.remove(path.as_str()).map_err(GitError::backend)?;
            }
        }
    }
    let tree = editor.write().map_err(GitError::backend)?;

    Ok(MergeOutcome {
        tree: Some(gix_to_oid(tree.detach())),
        conflicts: Vec::new(),
    })
}
