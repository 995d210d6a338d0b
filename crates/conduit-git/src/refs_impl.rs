//! Ref resolution and atomic ref transactions.

use crate::error::GitError;
use crate::types::{GitOid, RefEdit, RefName};
use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit as GixRefEdit, RefLog};
use gix::refs::Target;
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

pub(crate) fn resolve_ref(repo: &Mutex<gix::Repository>, name: &RefName) -> Result<GitOid, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let mut reference = repo.find_reference(name.as_str()).map_err(|_| GitError::RefNotFound {
        name: name.as_str().to_owned(),
    })?;
    let id = reference
        .peel_to_id_in_place()
        .map_err(GitError::backend)?;
    Ok(gix_to_oid(id.detach()))
}

pub(crate) fn list_refs(
    repo: &Mutex<gix::Repository>,
    prefix: &str,
) -> Result<Vec<(RefName, GitOid)>, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let platform = repo.references().map_err(GitError::backend)?;
    let iter = platform.all().map_err(GitError::backend)?;
    let mut out = Vec::new();
    for result in iter {
        let mut reference = result.map_err(GitError::backend)?;
        let full = reference.name().as_bstr().to_string();
        if !full.starts_with(prefix) {
            continue;
        }
        let id = reference.peel_to_id_in_place().map_err(GitError::backend)?;
        let Ok(name) = RefName::new(&full) else { continue };
        out.push((name, gix_to_oid(id.detach())));
    }
    Ok(out)
}

pub(crate) fn update_refs(repo: &Mutex<gix::Repository>, edits: &[RefEdit]) -> Result<(), GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let gix_edits: Vec<GixRefEdit> = edits
        .iter()
        .map(|edit| -> Result<GixRefEdit, GitError> {
            let expected = if edit.expected_old_oid.is_zero() {
                PreviousValue::MustNotExist
            } else {
                PreviousValue::MustExistAndMatch(Target::Object(oid_to_gix(edit.expected_old_oid)))
            };
            Ok(GixRefEdit {
                change: Change::Update {
                    log: LogChange {
                        mode: RefLog::AndReference,
                        force_create_reflog: false,
                        message: "conduit: update ref".into(),
                    },
                    expected,
                    new: Target::Object(oid_to_gix(edit.new_oid)),
                },
                name: edit.name.as_str().try_into().map_err(GitError::backend)?,
                deref: false,
            })
        })
        .collect::<Result<Vec<_>, GitError>>()?;

    repo.edit_references(gix_edits).map_err(|e| {
        let name = edits.first().map_or("<unknown>", |e| e.name.as_str());
        GitError::classify_ref_failure(name, e)
    })?;
    Ok(())
}

pub(crate) fn delete_ref(
    repo: &Mutex<gix::Repository>,
    name: &RefName,
    expected_oid: GitOid,
) -> Result<(), GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let edit = GixRefEdit {
        change: Change::Delete {
            expected: PreviousValue::MustExistAndMatch(Target::Object(oid_to_gix(expected_oid))),
            log: RefLog::AndReference,
        },
        name: name.as_str().try_into().map_err(GitError::backend)?,
        deref: false,
    };
    repo.edit_reference(edit)
        .map_err(|e| GitError::classify_ref_failure(name.as_str(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_roundtrips_through_gix() {
        let oid: GitOid = "a".repeat(40).parse().unwrap();
        let gix_id = oid_to_gix(oid);
        assert_eq!(gix_to_oid(gix_id), oid);
    }
}
