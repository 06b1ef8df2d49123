use std::collections::HashSet;

use super::tree::{RemoteNode, RemoteTree};

/// Picks a name for an upload into `folder` that does not collide with an
/// existing child. Upload links are requested with `overwrite=false`, so a
/// taken name would otherwise fail the transfer on every run.
pub(crate) fn available_name(tree: &RemoteTree, folder: &RemoteNode, name: &str) -> String {
    let taken: HashSet<String> = tree
        .children(folder)
        .into_iter()
        .map(|child| child.name.to_lowercase())
        .collect();
    if !taken.contains(&name.to_lowercase()) {
        return name.to_string();
    }
    (1u32..)
        .map(|n| numbered_name(name, n))
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
        .unwrap_or_else(|| name.to_string())
}

fn numbered_name(name: &str, n: u32) -> String {
    if let Some((stem, ext)) = name.rsplit_once('.')
        && !stem.is_empty()
    {
        return format!("{stem} ({n}).{ext}");
    }
    format!("{name} ({n})")
}
