//! In-memory `/proc` and `/sys` tree for tests.
//!
//! `MockFs` is a shared handle: clones see the same tree, so a test can give
//! a clone to a probe and keep changing files between samples.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::collector::traits::{DiskUsage, FileSystem};

#[derive(Debug, Clone)]
enum Node {
    File(String),
    Dir,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: BTreeMap<PathBuf, Node>,
    /// statvfs figures by mount point.
    mounts: BTreeMap<PathBuf, DiskUsage>,
}

impl Tree {
    fn insert(&mut self, path: PathBuf, node: Node) {
        for dir in path.ancestors().skip(1) {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.nodes.insert(dir.to_path_buf(), Node::Dir);
        }
        self.nodes.insert(path, node);
    }
}

fn not_found(what: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} {} does not exist", what, path.display()),
    )
}

#[derive(Debug, Clone, Default)]
pub struct MockFs {
    tree: Arc<RwLock<Tree>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes a file, creating its parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.write()
            .insert(path.as_ref().to_path_buf(), Node::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.write().insert(path.as_ref().to_path_buf(), Node::Dir);
    }

    /// Deletes `path` and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.write().nodes.retain(|p, _| !p.starts_with(path));
    }

    pub fn set_disk_usage(&self, mount: impl AsRef<Path>, usage: DiskUsage) {
        self.write()
            .mounts
            .insert(mount.as_ref().to_path_buf(), usage);
    }

    /// Adds `/proc/<pid>/stat` and `/proc/<pid>/comm` for one process.
    ///
    /// `utime` and `stime` are jiffies, `starttime` is jiffies after boot and
    /// `rss_pages` is in pages; every other stat column is a fixed filler.
    pub fn add_process(
        &self,
        pid: u32,
        comm: &str,
        utime: u64,
        stime: u64,
        starttime: u64,
        rss_pages: u64,
    ) {
        let stat = format!(
            "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194560 250 0 0 0 {utime} {stime} 0 0 20 0 1 0 \
             {starttime} 8388608 {rss_pages} 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0\n"
        );
        self.add_file(format!("/proc/{}/stat", pid), stat);
        self.add_file(format!("/proc/{}/comm", pid), format!("{}\n", comm));
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match self.read().nodes.get(path) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            )),
            None => Err(not_found("file", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.read().nodes.contains_key(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let tree = self.read();
        if !matches!(tree.nodes.get(path), Some(Node::Dir)) {
            return Err(not_found("directory", path));
        }
        Ok(tree
            .nodes
            .range(path.to_path_buf()..)
            .skip(1)
            .map(|(p, _)| p)
            .take_while(|p| p.starts_with(path))
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        self.read()
            .mounts
            .get(path)
            .copied()
            .ok_or_else(|| not_found("mount point", path))
    }
}
