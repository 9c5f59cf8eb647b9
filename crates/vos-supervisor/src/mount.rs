//! File trees mounted into the VFS.
//!
//! ```text
//!   MountTree                        VFS
//!   ├── "etc"  ─ Directory ──►       /etc/
//!   │   └── "motd" ─ File ───►       /etc/motd
//!   └── "README" ─ File ─────►       /README
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;
use vos_vfs::{join_path, normalize_path, Vfs};

use crate::error::{EnvError, EnvResult};

/// A node of a mount tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountNode {
    File(Vec<u8>),
    Directory(MountTree),
}

/// Nested name to node mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountTree {
    entries: BTreeMap<String, MountNode>,
}

impl MountTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file.
    pub fn file(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.entries
            .insert(name.into(), MountNode::File(content.into()));
        self
    }

    /// Add a subdirectory.
    pub fn dir(mut self, name: impl Into<String>, tree: MountTree) -> Self {
        self.entries.insert(name.into(), MountNode::Directory(tree));
        self
    }

    pub fn entries(&self) -> &BTreeMap<String, MountNode> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of files in the whole tree.
    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                MountNode::File(_) => 1,
                MountNode::Directory(tree) => tree.file_count(),
            })
            .sum()
    }

    /// Build from a JSON object: strings are files, objects are directories.
    pub fn from_json(value: &Value) -> EnvResult<Self> {
        let Value::Object(map) = value else {
            return Err(EnvError::Config(String::from("mount tree must be a JSON object")));
        };
        let mut tree = MountTree::new();
        for (name, node) in map {
            check_name(name)?;
            tree = match node {
                Value::String(text) => tree.file(name.clone(), text.as_bytes()),
                Value::Object(_) => tree.dir(name.clone(), MountTree::from_json(node)?),
                other => {
                    return Err(EnvError::Config(format!(
                        "mount entry '{}' must be a string or an object, got {}",
                        name, other
                    )))
                }
            };
        }
        Ok(tree)
    }

    pub fn from_json_str(json: &str) -> EnvResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json(&value)
    }

    /// Snapshot a host directory.
    pub async fn from_host_dir(path: &Path) -> EnvResult<Self> {
        read_host_dir(path.to_path_buf()).await
    }
}

fn check_name(name: &str) -> EnvResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(EnvError::Config(format!("invalid mount entry name: '{}'", name)));
    }
    Ok(())
}

fn read_host_dir(path: std::path::PathBuf) -> BoxFuture<'static, EnvResult<MountTree>> {
    Box::pin(async move {
        let io_err = |e: std::io::Error| EnvError::Config(format!("{}: {}", path.display(), e));

        let mut tree = MountTree::new();
        let mut dir = tokio::fs::read_dir(&path).await.map_err(io_err)?;
        while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(target: "vos::supervisor", path = ?entry.path(), "skipping non-UTF-8 name");
                continue;
            };
            let file_type = entry.file_type().await.map_err(io_err)?;
            if file_type.is_dir() {
                tree = tree.dir(name, read_host_dir(entry.path()).await?);
            } else if file_type.is_file() {
                let content = tokio::fs::read(entry.path()).await.map_err(io_err)?;
                tree = tree.file(name, content);
            }
        }
        Ok(tree)
    })
}

/// Write `tree` under `base`, depth-first. Returns the number of files written.
pub(crate) async fn mount_into(vfs: &Vfs, base: &str, tree: &MountTree) -> EnvResult<usize> {
    let base = normalize_path(base);
    vfs.mkdir(&base, true).await?;
    let written = mount_dir(vfs, base.clone(), tree).await?;
    debug!(target: "vos::supervisor", base = %base, files = written, "mounted");
    Ok(written)
}

fn mount_dir<'a>(
    vfs: &'a Vfs,
    dir: String,
    tree: &'a MountTree,
) -> BoxFuture<'a, EnvResult<usize>> {
    Box::pin(async move {
        let mut written = 0;
        for (name, node) in &tree.entries {
            let path = join_path(&dir, name);
            match node {
                MountNode::File(content) => {
                    vfs.write_file(&path, content.clone()).await?;
                    written += 1;
                }
                MountNode::Directory(sub) => {
                    vfs.mkdir(&path, true).await?;
                    written += mount_dir(vfs, path, sub).await?;
                }
            }
        }
        Ok(written)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let tree = MountTree::from_json(&json!({
            "etc": { "motd": "hello" },
            "README": "read me",
            "empty": {}
        }))
        .unwrap();

        let expected = MountTree::new()
            .dir("etc", MountTree::new().file("motd", "hello"))
            .file("README", "read me")
            .dir("empty", MountTree::new());
        assert_eq!(tree, expected);
        assert_eq!(tree.file_count(), 2);
    }

    #[test]
    fn test_from_json_rejects_bad_nodes() {
        assert!(matches!(
            MountTree::from_json(&json!({ "n": 3 })),
            Err(EnvError::Config(_))
        ));
        assert!(matches!(
            MountTree::from_json(&json!(["a"])),
            Err(EnvError::Config(_))
        ));
        assert!(matches!(
            MountTree::from_json(&json!({ "a/b": "x" })),
            Err(EnvError::Config(_))
        ));
        assert!(matches!(
            MountTree::from_json_str("{ not json"),
            Err(EnvError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_from_host_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.txt"), b"main").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();

        let tree = MountTree::from_host_dir(dir.path()).await.unwrap();

        let expected = MountTree::new()
            .dir("src", MountTree::new().file("main.txt", "main"))
            .file("top.txt", "top");
        assert_eq!(tree, expected);
    }

    #[tokio::test]
    async fn test_from_missing_host_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = MountTree::from_host_dir(&dir.path().join("nope")).await;
        assert!(matches!(result, Err(EnvError::Config(_))));
    }
}
