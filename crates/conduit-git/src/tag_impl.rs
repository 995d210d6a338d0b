//! Lightweight tag creation and listing, used for safety tags.

use crate::error::GitError;
use crate::types::{GitOid, TagInfo};
use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit, RefLog};
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

pub(crate) fn create_tag(
    repo: &Mutex<gix::Repository>,
    name: &str,
    target: GitOid,
) -> Result<TagInfo, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    repo.find_object(oid_to_gix(target))
        .map_err(|_| GitError::ObjectNotFound { oid: target })?;

    let full_name = format!("refs/tags/{name}");
    let edit = RefEdit {
        change: Change::Update {
            log: LogChange {
                mode: RefLog::AndReference,
                force_create_reflog: false,
                message: format!("conduit: tag {name}").into(),
            },
            expected: PreviousValue::Any,
            new: Target::Object(oid_to_gix(target)),
        },
        name: full_name.as_str().try_into().map_err(GitError::backend)?,
        deref: false,
    };
    repo.edit_reference(edit).map_err(GitError::backend)?;

    Ok(TagInfo {
        name: name.to_owned(),
        target,
    })
}

pub(crate) fn list_tags(repo: &Mutex<gix::Repository>) -> Result<Vec<TagInfo>, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let platform = repo.references().map_err(GitError::backend)?;
    let iter = platform.prefixed("refs/tags/").map_err(GitError::backend)?;
    let mut out = Vec::new();
    for result in iter {
        let mut reference = result.map_err(GitError::backend)?;
        let full = reference.name().as_bstr().to_string();
        let short = full.strip_prefix("refs/tags/").unwrap_or(&full).to_owned();
        let id = reference.peel_to_id_in_place().map_err(GitError::backend)?;
        out.push(TagInfo {
            name: short,
            target: gix_to_oid(id.detach()),
        });
    }
    Ok(out)
}
