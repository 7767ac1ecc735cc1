//! Project lookup.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use hlx_models::ProjectId;

/// Answers whether a project exists.
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    async fn project_exists(&self, id: &ProjectId) -> bool;
}

/// Catalog backed by an in-memory set of ids.
#[derive(Debug, Default)]
pub struct InMemoryProjectCatalog {
    projects: RwLock<HashSet<ProjectId>>,
}

impl InMemoryProjectCatalog {
    pub fn new<I, P>(projects: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProjectId>,
    {
        Self {
            projects: RwLock::new(projects.into_iter().map(Into::into).collect()),
        }
    }

    pub async fn insert(&self, id: impl Into<ProjectId>) {
        self.projects.write().await.insert(id.into());
    }
}

#[async_trait]
impl ProjectCatalog for InMemoryProjectCatalog {
    async fn project_exists(&self, id: &ProjectId) -> bool {
        self.projects.read().await.contains(id)
    }
}

/// Catalog where each project is a directory under a root.
#[derive(Debug, Clone)]
pub struct DirectoryProjectCatalog {
    root: PathBuf,
}

impl DirectoryProjectCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ProjectCatalog for DirectoryProjectCatalog {
    async fn project_exists(&self, id: &ProjectId) -> bool {
        let name = id.as_str();
        // Ids are single path components; anything else could escape the root.
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return false;
        }
        tokio::fs::metadata(self.root.join(name))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}
