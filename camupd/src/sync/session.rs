use std::path::Path;

use camup_core::{AccountInfo, ApiErrorClass, RemoteClient, RemoteError};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use super::fingerprint::Fingerprint;
use super::naming::available_name;
use super::transfer::{TransferClient, TransferError};
use super::tree::{RemoteNode, RemoteTree, join_path};

const CHILD_FIELDS: &[&str] = &[
    "_embedded.items.path",
    "_embedded.items.name",
    "_embedded.items.type",
    "_embedded.items.size",
    "_embedded.items.sha256",
    "_embedded.total",
    "_embedded.limit",
    "_embedded.offset",
];
const FILE_FIELDS: &[&str] = &[
    "items.path",
    "items.name",
    "items.type",
    "items.size",
    "items.sha256",
];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("credential was rejected: {0}")]
    CredentialRejected(#[source] RemoteError),
    #[error("authentication failed: {0}")]
    Authenticate(#[source] RemoteError),
    #[error("fetching remote tree failed: {0}")]
    FetchTree(#[source] RemoteError),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("requesting upload link failed: {0}")]
    Link(#[from] RemoteError),
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub remote_root: String,
    pub page_size: u32,
}

/// Authenticated connection plus the tree fetched for this invocation.
///
/// Owned by one invocation and dropped with it; nothing here outlives the run.
pub struct RemoteSession {
    client: RemoteClient,
    transfer: TransferClient,
    tree: RemoteTree,
    account: AccountInfo,
    page_size: u32,
}

impl RemoteSession {
    /// Authenticates, then fetches the tree. The fetch is never attempted when
    /// authentication fails, and neither step is retried here.
    pub async fn bootstrap(
        client: RemoteClient,
        options: &SessionOptions,
    ) -> Result<Self, BootstrapError> {
        let account = Self::authenticate(&client).await?;
        let tree = Self::fetch_tree(&client, options).await?;
        Ok(Self {
            client,
            transfer: TransferClient::new(),
            tree,
            account,
            page_size: options.page_size.max(1),
        })
    }

    async fn authenticate(client: &RemoteClient) -> Result<AccountInfo, BootstrapError> {
        client.get_account_info().await.map_err(|err| {
            if matches!(err.classification(), Some(ApiErrorClass::Auth)) {
                BootstrapError::CredentialRejected(err)
            } else {
                BootstrapError::Authenticate(err)
            }
        })
    }

    async fn fetch_tree(
        client: &RemoteClient,
        options: &SessionOptions,
    ) -> Result<RemoteTree, BootstrapError> {
        let mut tree = RemoteTree::new(&options.remote_root);
        let root_path = tree.root().path.clone();
        let children = client
            .list_directory_all(&root_path, options.page_size, Some(CHILD_FIELDS))
            .await
            .map_err(BootstrapError::FetchTree)?;
        for child in &children {
            tree.insert_resource(child);
        }
        let files = client
            .list_files_all(options.page_size, Some(FILE_FIELDS))
            .await
            .map_err(BootstrapError::FetchTree)?;
        for file in &files {
            tree.insert_resource(file);
        }
        Ok(tree)
    }

    pub fn tree(&self) -> &RemoteTree {
        &self.tree
    }

    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    /// Re-lists `folder` from the server and merges its children into the tree.
    pub async fn refresh_children(&mut self, folder: &str) -> Result<usize, RemoteError> {
        let children = self
            .client
            .list_directory_all(folder, self.page_size, Some(CHILD_FIELDS))
            .await?;
        for child in &children {
            self.tree.insert_resource(child);
        }
        Ok(children.len())
    }

    /// Returns `false` when the folder already existed.
    pub async fn create_folder(
        &self,
        name: &str,
        parent: &RemoteNode,
    ) -> Result<bool, RemoteError> {
        match self.client.create_folder(&join_path(&parent.path, name)).await {
            Ok(_) => Ok(true),
            Err(err) if err.status() == Some(StatusCode::CONFLICT) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Uploads one staged file into `destination` and waits for it to finish.
    ///
    /// On success the new node is added to the tree so later fingerprint lookups
    /// in this run see it.
    pub async fn upload(
        &mut self,
        source: &Path,
        name: &str,
        fingerprint: Fingerprint,
        destination: &RemoteNode,
    ) -> Result<RemoteNode, UploadError> {
        let mut target_name = available_name(&self.tree, destination, name);
        let mut target_path = join_path(&destination.path, &target_name);
        let link = match self.client.get_upload_link(&target_path, false).await {
            Ok(link) => link,
            Err(err) if err.status() == Some(StatusCode::CONFLICT) => {
                // Folders inside the destination are not in the flat file listing.
                debug!(path = %target_path, "upload target taken, re-listing destination");
                self.refresh_children(&destination.path).await?;
                target_name = available_name(&self.tree, destination, name);
                target_path = join_path(&destination.path, &target_name);
                self.client.get_upload_link(&target_path, false).await?
            }
            Err(err) => return Err(err.into()),
        };
        self.transfer
            .upload_from_path(link.href.as_str(), source)
            .await?;
        let node = RemoteNode::file(&destination.path, &target_name, fingerprint);
        self.tree.insert(node.clone());
        Ok(node)
    }
}
