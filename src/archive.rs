//! The mock host-filesystem abstraction: a trait-over-`Path` style, where
//! the trait (`MockFs`) stands in for the whole host filesystem rather than
//! adding a few convenience methods to `std::path::Path`.
//!
//! `archive`/`restore`/`clear_dir` are the three operations `crate::ops`
//! drives at `unmount`/`mount`/`snapshot`/`clone` time to move a dataset's
//! simulated file content in and out of the host tree.
use crate::error::{Error, Result};
use std::{collections::HashMap, path::{Path, PathBuf}};

/// Sentinel `dev` value every node produced by [`InMemoryFs`] carries,
/// letting a caller confirm it's talking to the mock rather than a real
/// filesystem.
pub const MOCK_FS_DEV: u64 = 8675309;

/// Largest file `archive` will capture; anything bigger is rejected rather
/// than silently truncated.
pub const MAX_ARCHIVED_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, Copy)]
pub struct LStat {
    pub dev: u64,
    pub file_type: FileType,
    pub mode: u32,
    pub size: u64,
    /// Seconds since the epoch.
    pub mtime: i64,
}

/// A host filesystem the engine can archive from, restore to, and clear.
/// `archive`/`restore`/`clear_dir` are generic over this trait so a
/// consumer can supply its own backing store; this crate ships
/// [`InMemoryFs`] as the default.
pub trait MockFs {
    fn lstat(&self, path: &Path) -> std::io::Result<LStat>;
    fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>>;
    fn readlink(&self, path: &Path) -> std::io::Result<PathBuf>;
    fn read_dir(&self, path: &Path) -> std::io::Result<Vec<String>>;
    fn write_file(&mut self, path: &Path, mode: u32, data: &[u8]) -> std::io::Result<()>;
    fn symlink(&mut self, target: &Path, link: &Path, mode: u32) -> std::io::Result<()>;
    fn mkdir(&mut self, path: &Path, mode: u32) -> std::io::Result<()>;
    fn rmdir(&mut self, path: &Path) -> std::io::Result<()>;
    fn chmod(&mut self, path: &Path, mode: u32) -> std::io::Result<()>;
    fn utimes(&mut self, path: &Path, mtime: i64) -> std::io::Result<()>;
    fn unlink(&mut self, path: &Path) -> std::io::Result<()>;
}

/// An archived subtree, as produced by [`archive`] and consumed by
/// [`restore`]. Opaque to everything outside this module except for its
/// `name`, which `crate::dataset::Dataset` never inspects.
#[derive(Debug, Clone)]
pub enum ArchivedEntry {
    File { name: String, mode: u32, mtime: i64, data: Vec<u8> },
    Symlink { name: String, mode: u32, mtime: i64, target: PathBuf },
    Dir { name: String, mode: u32, mtime: i64, children: Vec<ArchivedEntry> },
}

impl ArchivedEntry {
    pub fn name(&self) -> &str {
        match self {
            ArchivedEntry::File { name, .. }
            | ArchivedEntry::Symlink { name, .. }
            | ArchivedEntry::Dir { name, .. } => name,
        }
    }
}

/// Recursively capture `path` into an opaque tree value. Stops (without
/// erroring) at any directory whose `dev` differs from `path`'s own, since
/// that marks a separate mount underneath: archiving/restoring a directory
/// never crosses into a nested mount-point.
pub fn archive(fs: &dyn MockFs, path: &Path) -> Result<ArchivedEntry> {
    let root_stat = fs.lstat(path).map_err(|_| Error::InvalidFileType(path.to_owned()))?;
    archive_at(fs, path, root_stat.dev)
}

fn archive_at(fs: &dyn MockFs, path: &Path, boundary_dev: u64) -> Result<ArchivedEntry> {
    let stat = fs.lstat(path).map_err(|_| Error::InvalidFileType(path.to_owned()))?;
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    match stat.file_type {
        FileType::Regular => {
            if stat.size > MAX_ARCHIVED_FILE_SIZE {
                return Err(Error::InvalidArgument(format!(
                    "'{}' is larger than the {} byte archive limit",
                    path.display(),
                    MAX_ARCHIVED_FILE_SIZE
                )));
            }
            let data =
                fs.read_file(path).map_err(|_| Error::InvalidFileType(path.to_owned()))?;
            Ok(ArchivedEntry::File { name, mode: stat.mode, mtime: stat.mtime, data })
        },
        FileType::Symlink => {
            let target =
                fs.readlink(path).map_err(|_| Error::InvalidFileType(path.to_owned()))?;
            Ok(ArchivedEntry::Symlink { name, mode: stat.mode, mtime: stat.mtime, target })
        },
        FileType::Directory => {
            if stat.dev != boundary_dev {
                return Ok(ArchivedEntry::Dir { name, mode: stat.mode, mtime: stat.mtime,
                                                children: Vec::new() });
            }
            let entries =
                fs.read_dir(path).map_err(|_| Error::InvalidFileType(path.to_owned()))?;
            let mut children = Vec::with_capacity(entries.len());
            for entry in entries {
                children.push(archive_at(fs, &path.join(&entry), boundary_dev)?);
            }
            Ok(ArchivedEntry::Dir { name, mode: stat.mode, mtime: stat.mtime, children })
        },
    }
}

/// Recreate `tree` under `base`, which must already exist as a directory.
pub fn restore(fs: &mut dyn MockFs, base: &Path, tree: &ArchivedEntry) -> Result<()> {
    match tree {
        ArchivedEntry::File { mode, mtime, data, .. } => {
            fs.write_file(base, *mode, data)
              .and_then(|_| fs.utimes(base, *mtime))
              .map_err(|_| Error::InvalidFileType(base.to_owned()))
        },
        ArchivedEntry::Symlink { mode, mtime, target, .. } => {
            fs.symlink(target, base, *mode)
              .and_then(|_| fs.utimes(base, *mtime))
              .map_err(|_| Error::InvalidFileType(base.to_owned()))
        },
        ArchivedEntry::Dir { mode, mtime, children, .. } => {
            fs.mkdir(base, *mode).map_err(|_| Error::InvalidFileType(base.to_owned()))?;
            for child in children {
                restore(fs, &base.join(child.name()), child)?;
            }
            fs.utimes(base, *mtime).map_err(|_| Error::InvalidFileType(base.to_owned()))
        },
    }
}

/// Like [`restore`], but `base` already exists as a directory (typically a
/// freshly mounted mount-point) so its own entry in `tree` is not recreated
/// -- only its children are restored into it. Used by `crate::ops::mount`
/// when repopulating a filesystem from its `fscontent`.
pub fn restore_contents(fs: &mut dyn MockFs, base: &Path, tree: &ArchivedEntry) -> Result<()> {
    match tree {
        ArchivedEntry::Dir { children, mtime, .. } => {
            for child in children {
                restore(fs, &base.join(child.name()), child)?;
            }
            fs.utimes(base, *mtime).map_err(|_| Error::InvalidFileType(base.to_owned()))
        },
        _ => restore(fs, base, tree),
    }
}

/// Recursively delete the contents of `dir`, refusing to cross mount-points:
/// an entry whose `dev` differs from `dir`'s own is left in place instead of
/// being descended into.
pub fn clear_dir(fs: &mut dyn MockFs, dir: &Path) -> Result<()> {
    let boundary =
        fs.lstat(dir).map_err(|_| Error::InvalidFileType(dir.to_owned()))?.dev;
    clear_dir_at(fs, dir, boundary)
}

fn clear_dir_at(fs: &mut dyn MockFs, dir: &Path, boundary_dev: u64) -> Result<()> {
    let entries = fs.read_dir(dir).map_err(|_| Error::InvalidFileType(dir.to_owned()))?;
    for entry in entries {
        let path = dir.join(&entry);
        let stat = fs.lstat(&path).map_err(|_| Error::InvalidFileType(path.clone()))?;
        if stat.file_type == FileType::Directory {
            if stat.dev != boundary_dev {
                continue;
            }
            clear_dir_at(fs, &path, boundary_dev)?;
            fs.rmdir(&path).map_err(|_| Error::InvalidFileType(path.clone()))?;
        } else {
            fs.unlink(&path).map_err(|_| Error::InvalidFileType(path.clone()))?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Node {
    File { mode: u32, mtime: i64, data: Vec<u8> },
    Symlink { mode: u32, mtime: i64, target: PathBuf },
    Dir { mode: u32, mtime: i64 },
}

/// A self-contained, in-process host filesystem: every path lives in one
/// `HashMap`, keyed by its normalized absolute path. Good enough to drive
/// this crate's own tests and to stand in for a consumer who has no real
/// disk to mount onto.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    nodes: HashMap<PathBuf, Node>,
    /// Per-subtree device number, assigned at `mount_boundary` and removed
    /// at `unmount_boundary`; everything else inherits its nearest
    /// ancestor's `dev`, defaulting to [`MOCK_FS_DEV`].
    devs: HashMap<PathBuf, u64>,
    next_dev: u64,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(PathBuf::from("/"), Node::Dir { mode: 0o755, mtime: 0 });
        InMemoryFs { nodes, devs: HashMap::new(), next_dev: MOCK_FS_DEV + 1 }
    }

    fn dev_for(&self, path: &Path) -> u64 {
        let mut cur = path;
        loop {
            if let Some(dev) = self.devs.get(cur) {
                return *dev;
            }
            match cur.parent() {
                Some(parent) => cur = parent,
                None => return MOCK_FS_DEV,
            }
        }
    }

    /// Mark `path` as the root of a freshly mounted subtree, giving it a
    /// `dev` distinct from its parent so `archive`/`clear_dir` treat it as
    /// a boundary. Used by `crate::ops::mount`.
    pub fn mount_boundary(&mut self, path: &Path) -> u64 {
        let dev = self.next_dev;
        self.next_dev += 1;
        self.devs.insert(path.to_owned(), dev);
        dev
    }

    /// Undo [`InMemoryFs::mount_boundary`]; `path` reverts to inheriting
    /// its parent's `dev`. Used by `crate::ops::unmount`.
    pub fn unmount_boundary(&mut self, path: &Path) { self.devs.remove(path); }

    fn exists_as(&self, path: &Path, want: FileType) -> bool {
        matches!((self.nodes.get(path), want),
                 (Some(Node::File { .. }), FileType::Regular)
                 | (Some(Node::Symlink { .. }), FileType::Symlink)
                 | (Some(Node::Dir { .. }), FileType::Directory))
    }
}

fn not_found(path: &Path) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, format!("no such path: {}", path.display()))
}

impl MockFs for InMemoryFs {
    fn lstat(&self, path: &Path) -> std::io::Result<LStat> {
        let node = self.nodes.get(path).ok_or_else(|| not_found(path))?;
        let dev = self.dev_for(path);
        Ok(match node {
            Node::File { mode, mtime, data } => {
                LStat { dev, file_type: FileType::Regular, mode: *mode, size: data.len() as u64,
                        mtime: *mtime }
            },
            Node::Symlink { mode, mtime, target } => {
                LStat { dev, file_type: FileType::Symlink, mode: *mode,
                        size: target.as_os_str().len() as u64, mtime: *mtime }
            },
            Node::Dir { mode, mtime } => {
                LStat { dev, file_type: FileType::Directory, mode: *mode, size: 0, mtime: *mtime }
            },
        })
    }

    fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        match self.nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            _ => Err(not_found(path)),
        }
    }

    fn readlink(&self, path: &Path) -> std::io::Result<PathBuf> {
        match self.nodes.get(path) {
            Some(Node::Symlink { target, .. }) => Ok(target.clone()),
            _ => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> std::io::Result<Vec<String>> {
        if !self.exists_as(path, FileType::Directory) {
            return Err(not_found(path));
        }
        let mut names: Vec<String> = self.nodes
            .keys()
            .filter_map(|p| {
                if p.parent() == Some(path) {
                    p.file_name().map(|n| n.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn write_file(&mut self, path: &Path, mode: u32, data: &[u8]) -> std::io::Result<()> {
        self.nodes.insert(path.to_owned(), Node::File { mode, mtime: 0, data: data.to_owned() });
        Ok(())
    }

    fn symlink(&mut self, target: &Path, link: &Path, mode: u32) -> std::io::Result<()> {
        self.nodes.insert(link.to_owned(),
                           Node::Symlink { mode, mtime: 0, target: target.to_owned() });
        Ok(())
    }

    fn mkdir(&mut self, path: &Path, mode: u32) -> std::io::Result<()> {
        if self.nodes.contains_key(path) {
            return Err(std::io::Error::new(std::io::ErrorKind::AlreadyExists,
                                            format!("{} already exists", path.display())));
        }
        self.nodes.insert(path.to_owned(), Node::Dir { mode, mtime: 0 });
        Ok(())
    }

    fn rmdir(&mut self, path: &Path) -> std::io::Result<()> {
        if !self.exists_as(path, FileType::Directory) {
            return Err(not_found(path));
        }
        self.nodes.remove(path);
        self.devs.remove(path);
        Ok(())
    }

    fn chmod(&mut self, path: &Path, mode: u32) -> std::io::Result<()> {
        match self.nodes.get_mut(path) {
            Some(Node::File { mode: m, .. })
            | Some(Node::Symlink { mode: m, .. })
            | Some(Node::Dir { mode: m, .. }) => {
                *m = mode;
                Ok(())
            },
            None => Err(not_found(path)),
        }
    }

    fn utimes(&mut self, path: &Path, mtime: i64) -> std::io::Result<()> {
        match self.nodes.get_mut(path) {
            Some(Node::File { mtime: m, .. })
            | Some(Node::Symlink { mtime: m, .. })
            | Some(Node::Dir { mtime: m, .. }) => {
                *m = mtime;
                Ok(())
            },
            None => Err(not_found(path)),
        }
    }

    fn unlink(&mut self, path: &Path) -> std::io::Result<()> {
        match self.nodes.get(path) {
            Some(Node::Dir { .. }) => {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "is a directory"))
            },
            Some(_) => {
                self.nodes.remove(path);
                Ok(())
            },
            None => Err(not_found(path)),
        }
    }
}
