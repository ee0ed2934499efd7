//! The naming server's directory tree.
//!
//! Every known path maps to an [`Entry`]. The root is implicit and always a
//! directory. Each file belongs to exactly one storage node; a directory
//! remembers the node that first created it so new files beneath it land
//! on the same node.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::path::Path;
use crate::rpc::Fault;
use crate::storage::{CommandStub, StorageStub};

/// A registered storage node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNode {
    pub storage: StorageStub,
    pub command: CommandStub,
}

type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Directory { owner: Option<NodeId> },
    File { owner: NodeId },
}

#[derive(Debug, Default)]
pub struct NamingStore {
    entries: BTreeMap<Path, Entry>,
    nodes: Vec<StorageNode>,
    next_node: usize,
}

impl NamingStore {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a storage node and the files it holds.
    ///
    /// Returns the paths that were not added: those already known, and those
    /// with a file among their ancestors. Missing ancestors of added files
    /// become directories owned by the new node.
    pub fn register(&mut self, node: StorageNode, files: Vec<Path>) -> Result<Vec<Path>, Fault> {
        let known = self
            .nodes
            .iter()
            .any(|n| n.storage == node.storage || n.command == node.command);
        if known {
            return Err(Fault::illegal_state(format!(
                "storage node {} is already registered",
                node.storage.address()
            )));
        }

        let id = self.nodes.len();
        self.nodes.push(node);

        let mut duplicates = Vec::new();
        for file in files {
            if file.is_root() {
                continue;
            }
            if self.entries.contains_key(&file) || self.has_file_ancestor(&file) {
                duplicates.push(file);
                continue;
            }

            let mut ancestors: Vec<Path> = file.ancestors().collect();
            ancestors.reverse();
            for ancestor in ancestors {
                self.entries
                    .entry(ancestor)
                    .or_insert(Entry::Directory { owner: Some(id) });
            }
            self.entries.insert(file, Entry::File { owner: id });
        }

        info!(
            node = %self.nodes[id].storage.address(),
            duplicates = duplicates.len(),
            "Registered storage node"
        );
        Ok(duplicates)
    }

    pub fn is_directory(&self, path: &Path) -> Result<bool, Fault> {
        if path.is_root() {
            return Ok(true);
        }
        match self.entries.get(path) {
            Some(Entry::Directory { .. }) => Ok(true),
            Some(Entry::File { .. }) => Ok(false),
            None => Err(not_found(path)),
        }
    }

    pub fn list(&self, directory: &Path) -> Result<Vec<String>, Fault> {
        if !self.is_directory(directory)? {
            return Err(Fault::file_not_found(format!("{} is not a directory", directory)));
        }

        // Descendants sort directly after the directory itself.
        let children = self
            .entries
            .range(directory.clone()..)
            .take_while(|(path, _)| path.is_subpath(directory))
            .filter(|(path, _)| path.parent().as_ref() == Some(directory))
            .filter_map(|(path, _)| path.last().map(str::to_string))
            .collect();
        Ok(children)
    }

    /// Claim `file` for a storage node ahead of creating it there.
    ///
    /// Returns `None` if the path is the root or already exists.
    pub fn reserve_file(&mut self, file: &Path) -> Result<Option<CommandStub>, Fault> {
        let Some(parent) = file.parent() else {
            return Ok(None);
        };
        if self.entries.contains_key(file) {
            return Ok(None);
        }
        let parent_owner = self.directory_owner(&parent)?;
        if self.nodes.is_empty() {
            return Err(Fault::illegal_state("no storage nodes are registered"));
        }

        let owner = match parent_owner {
            Some(owner) => owner,
            None => self.next_node(),
        };
        self.entries.insert(file.clone(), Entry::File { owner });
        debug!(path = %file, node = %self.nodes[owner].storage.address(), "Reserved file");
        Ok(Some(self.nodes[owner].command.clone()))
    }

    /// Undo a reservation whose creation failed on the storage node.
    pub fn release_file(&mut self, file: &Path) {
        if let Some(Entry::File { .. }) = self.entries.get(file) {
            self.entries.remove(file);
            debug!(path = %file, "Released file");
        }
    }

    pub fn create_directory(&mut self, directory: &Path) -> Result<bool, Fault> {
        let Some(parent) = directory.parent() else {
            return Ok(false);
        };
        if self.entries.contains_key(directory) {
            return Ok(false);
        }
        let owner = match self.directory_owner(&parent)? {
            Some(owner) => Some(owner),
            None if self.nodes.is_empty() => None,
            None => Some(self.next_node()),
        };
        self.entries
            .insert(directory.clone(), Entry::Directory { owner });
        debug!(path = %directory, "Created directory");
        Ok(true)
    }

    pub fn storage_for(&self, file: &Path) -> Result<StorageStub, Fault> {
        match self.entries.get(file) {
            Some(Entry::File { owner }) => Ok(self.nodes[*owner].storage.clone()),
            Some(Entry::Directory { .. }) => {
                Err(Fault::file_not_found(format!("{} is a directory", file)))
            }
            None => Err(not_found(file)),
        }
    }

    fn has_file_ancestor(&self, path: &Path) -> bool {
        path.ancestors()
            .any(|a| matches!(self.entries.get(&a), Some(Entry::File { .. })))
    }

    /// Owner of an existing directory. The root has no owner.
    fn directory_owner(&self, directory: &Path) -> Result<Option<NodeId>, Fault> {
        if directory.is_root() {
            return Ok(None);
        }
        match self.entries.get(directory) {
            Some(Entry::Directory { owner }) => Ok(*owner),
            Some(Entry::File { .. }) => Err(Fault::file_not_found(format!(
                "{} is not a directory",
                directory
            ))),
            None => Err(not_found(directory)),
        }
    }

    fn next_node(&mut self) -> NodeId {
        let id = self.next_node % self.nodes.len();
        self.next_node = self.next_node.wrapping_add(1);
        id
    }
}

fn not_found(path: &Path) -> Fault {
    Fault::file_not_found(format!("{} does not exist", path))
}
