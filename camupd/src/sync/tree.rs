use std::collections::HashMap;

use camup_core::{Resource, ResourceType};

use super::fingerprint::Fingerprint;

pub const ROOT_PATH: &str = "disk:/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    File,
}

/// A folder or file in the account, identified by its normalized remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub path: String,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<String>,
    pub fingerprint: Option<Fingerprint>,
}

impl RemoteNode {
    pub fn from_resource(resource: &Resource) -> Self {
        let path = normalize_path(&resource.path);
        Self {
            parent: parent_path(&path),
            path,
            name: resource.name.clone(),
            kind: match resource.resource_type {
                ResourceType::Dir => NodeKind::Folder,
                ResourceType::File => NodeKind::File,
            },
            fingerprint: Fingerprint::from_resource(resource),
        }
    }

    pub fn file(parent: &str, name: &str, fingerprint: Fingerprint) -> Self {
        let parent = normalize_path(parent);
        Self {
            path: join_path(&parent, name),
            name: name.to_string(),
            kind: NodeKind::File,
            parent: Some(parent),
            fingerprint: Some(fingerprint),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// Snapshot of the remote account taken at bootstrap.
///
/// The agent is the only writer during an invocation, so nodes it creates are
/// inserted here instead of re-fetching the whole account.
#[derive(Debug, Clone)]
pub struct RemoteTree {
    root: String,
    nodes: HashMap<String, RemoteNode>,
    children: HashMap<String, Vec<String>>,
    by_fingerprint: HashMap<Fingerprint, String>,
}

impl RemoteTree {
    pub fn new(root: &str) -> Self {
        let root = normalize_path(root);
        let mut tree = Self {
            root: root.clone(),
            nodes: HashMap::new(),
            children: HashMap::new(),
            by_fingerprint: HashMap::new(),
        };
        tree.nodes.insert(
            root.clone(),
            RemoteNode {
                name: root.clone(),
                path: root,
                kind: NodeKind::Folder,
                parent: None,
                fingerprint: None,
            },
        );
        tree
    }

    pub fn root(&self) -> &RemoteNode {
        // The root entry is inserted in `new` and never removed.
        &self.nodes[&self.root]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, path: &str) -> Option<&RemoteNode> {
        self.nodes.get(&normalize_path(path))
    }

    /// Immediate children of `parent`, in insertion order.
    pub fn children(&self, parent: &RemoteNode) -> Vec<&RemoteNode> {
        self.children
            .get(&parent.path)
            .map(|paths| paths.iter().filter_map(|p| self.nodes.get(p)).collect())
            .unwrap_or_default()
    }

    /// Account-wide lookup; the node may live in any folder.
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&RemoteNode> {
        self.by_fingerprint
            .get(fingerprint)
            .and_then(|path| self.nodes.get(path))
    }

    pub fn insert(&mut self, node: RemoteNode) {
        if let Some(parent) = node.parent.clone() {
            self.ensure_folder(&parent);
            let siblings = self.children.entry(parent).or_default();
            if !siblings.contains(&node.path) {
                siblings.push(node.path.clone());
            }
        }
        if let Some(fingerprint) = node.fingerprint.clone() {
            self.by_fingerprint
                .entry(fingerprint)
                .or_insert_with(|| node.path.clone());
        }
        self.nodes.insert(node.path.clone(), node);
    }

    pub fn insert_resource(&mut self, resource: &Resource) {
        self.insert(RemoteNode::from_resource(resource));
    }

    /// Intermediate folders only known from file paths are synthesized so that
    /// parent references always resolve.
    fn ensure_folder(&mut self, path: &str) {
        if self.nodes.contains_key(path) {
            return;
        }
        let parent = parent_path(path);
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        self.insert(RemoteNode {
            path: path.to_string(),
            name,
            kind: NodeKind::Folder,
            parent,
            fingerprint: None,
        });
    }
}

/// Maps `/a/b` and `disk:/a/b/` to `disk:/a/b`.
pub fn normalize_path(path: &str) -> String {
    let rest = path
        .strip_prefix("disk:")
        .unwrap_or(path)
        .trim_start_matches('/')
        .trim_end_matches('/');
    format!("{ROOT_PATH}{rest}")
}

pub fn parent_path(path: &str) -> Option<String> {
    let normalized = normalize_path(path);
    let rest = normalized.strip_prefix(ROOT_PATH)?;
    if rest.is_empty() {
        return None;
    }
    match rest.rsplit_once('/') {
        Some((dir, _)) => Some(format!("{ROOT_PATH}{dir}")),
        None => Some(ROOT_PATH.to_string()),
    }
}

pub fn join_path(parent: &str, name: &str) -> String {
    let parent = normalize_path(parent);
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}
