//! Core operations: `create`, `destroy`, `snapshot`, `clone`,
//! `rename`, `mount`, `unmount`, `hold`, `release`. Implemented as `impl
//! Engine` methods rather than `impl Dataset` methods, because a `Dataset`
//! here is a value living inside `Engine`'s arena (`crate::dataset` module
//! doc): the entity that actually owns the graph and can walk/mutate
//! siblings by full name is the registry.
//!
//! Request bundles (`MountOptions`, `SnapshotOptions`, `CloneOptions`,
//! `DestroyOptions`, `HoldOptions`) are small `derive_builder` structs with
//! `#[builder(default)]` fields.
use crate::{archive,
            dataset::{Dataset, DatasetKind, DatasetState},
            engine::Engine,
            error::{Error, ErrorKind, Result},
            name,
            property::{self, MountPointValue, PropertyValue},
            walk::{self, DatasetTypes}};
use std::{collections::HashMap,
          path::{Path, PathBuf}};

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct MountOptions {
    /// "Not mountable" reasons (wrong type, already mounted, `canmount=off`,
    /// non-absolute mountpoint) return silently instead of raising
    /// [`Error::Unmountable`] from `mount`.
    pub ignore_not_mountable: bool,
}

impl MountOptions {
    pub fn builder() -> MountOptionsBuilder { MountOptionsBuilder::default() }
}

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct SnapshotOptions {
    pub recursive: bool,
}

impl SnapshotOptions {
    pub fn builder() -> SnapshotOptionsBuilder { SnapshotOptionsBuilder::default() }
}

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct CloneOptions {
    /// Create missing ancestor filesystems of the clone's target name
    /// instead of failing, when `opts.parents` is set on `clone`.
    pub create_parents: bool,
}

impl CloneOptions {
    pub fn builder() -> CloneOptionsBuilder { CloneOptionsBuilder::default() }
}

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct DestroyOptions {
    pub recursive: bool,
}

impl DestroyOptions {
    pub fn builder() -> DestroyOptionsBuilder { DestroyOptionsBuilder::default() }
}

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct HoldOptions {
    pub recursive: bool,
}

impl HoldOptions {
    pub fn builder() -> HoldOptionsBuilder { HoldOptionsBuilder::default() }
}

impl Engine {
    /// Compute the effective mountpoint of a filesystem by walking toward
    /// the pools root collecting name segments until an ancestor carries a
    /// local `mountpoint`. Volumes and snapshots return `None`.
    pub fn mountpoint_for(&self, fullname: &str) -> Result<Option<MountPointValue>> {
        let ds = self.get(fullname)?;
        if !ds.is_filesystem() {
            return Ok(None);
        }
        let mut segments: Vec<String> = Vec::new();
        let mut cur = fullname.to_owned();
        loop {
            let node = self.get(&cur)?;
            if let Some(PropertyValue::MountPoint(v)) = node.local_properties().get("mountpoint") {
                return Ok(Some(prefix_with_segments(v, &segments)));
            }
            segments.push(name::short_name(&cur).to_owned());
            match node.parent() {
                Some(parent) => cur = parent.to_owned(),
                None => return Ok(Some(MountPointValue::Path(join_segments("/", &segments)))),
            }
        }
    }

    fn mount_path_of(&self, fullname: &str) -> Option<PathBuf> {
        self.mount_table()
            .iter()
            .find(|(_, name)| name.as_str() == fullname)
            .map(|(path, _)| PathBuf::from(path))
    }

    /// Create a new filesystem or volume under `parent`.
    pub fn create(
        &mut self,
        parent: Option<&str>,
        name: &str,
        kind: DatasetKind,
        props: &HashMap<String, String>,
    ) -> Result<String> {
        debug!(self.logger(), "executing";
               "op" => "create", "parent" => parent.unwrap_or("-"), "name" => name,
               "kind" => format_args!("{}", kind));
        name::namecheck(name).map_err(|e| Error::DatasetName(e.to_string()))?;
        if kind == DatasetKind::Snapshot {
            return Err(Error::DatasetType("filesystem or volume", name.to_owned()));
        }
        if parent.is_none() && kind != DatasetKind::Filesystem {
            return Err(Error::InvalidArgument(
                "only a filesystem may be a top-level dataset".to_owned(),
            ));
        }

        let full = match parent {
            Some(p) => {
                let parent_ds = self.get(p)?;
                if !parent_ds.is_active() {
                    return Err(Error::InactiveDataset(p.to_owned()));
                }
                if !parent_ds.is_filesystem() {
                    return Err(Error::DatasetType("filesystem", p.to_owned()));
                }
                format!("{}/{}", p, name)
            },
            None => name.to_owned(),
        };

        let exists = match parent {
            Some(p) => self.get(p)?.children().iter().any(|c| c == &full),
            None => self.pool_exists(&full),
        };
        if exists {
            return Err(Error::DatasetExists(full));
        }

        let txg = self.next_txg();
        let mut ds = Dataset::new(full.clone(), parent.map(str::to_owned), kind, txg);
        for (k, v) in props {
            let value = property::validate_and_parse(k, v, kind, true)?;
            if let PropertyValue::VolBlockSize(size) = value {
                ds.set_volblocksize(size);
            }
            ds.set_local(k.clone(), value);
        }
        ds.set_state(DatasetState::Active);
        self.insert(ds);
        match parent {
            Some(p) => self.get_mut(p)?.children.push(full.clone()),
            None => self.register_pool(full.clone()),
        }

        if kind == DatasetKind::Filesystem {
            let (canmount, _) = self.get_property(&full, "canmount")?;
            if canmount == "on" {
                let opts = MountOptions::builder().ignore_not_mountable(true).build().unwrap();
                self.mount(&full, &opts)?;
            }
        }
        Ok(full)
    }

    /// Mount a filesystem at its computed mountpoint. Filesystem-only.
    pub fn mount(&mut self, fullname: &str, opts: &MountOptions) -> Result<()> {
        debug!(self.logger(), "executing";
               "op" => "mount", "dataset" => fullname, "ignore_not_mountable" => opts.ignore_not_mountable);
        let ds = self.get(fullname)?.clone();
        if !ds.is_active() {
            return Err(Error::InactiveDataset(fullname.to_owned()));
        }

        let not_mountable = if !ds.is_filesystem() {
            Some(format!("'{}' is not a filesystem", fullname))
        } else if ds.mounted() {
            Some(format!("'{}' is already mounted", fullname))
        } else {
            let (canmount, _) = self.get_property(fullname, "canmount")?;
            if canmount == "off" { Some(format!("canmount is off for '{}'", fullname)) } else { None }
        };
        if let Some(reason) = not_mountable {
            return if opts.ignore_not_mountable { Ok(()) } else { Err(Error::Unmountable(reason)) };
        }

        let mountpoint = match self.mountpoint_for(fullname)?.unwrap() {
            MountPointValue::Path(p) => p,
            other => {
                let reason = format!("'{}' has mountpoint '{}'", fullname, other);
                return if opts.ignore_not_mountable {
                    Ok(())
                } else {
                    Err(Error::Unmountable(reason))
                };
            },
        };

        let mp_str = mountpoint.to_string_lossy().into_owned();
        if self.mount_table().contains_key(&mp_str) {
            let reason = format!("mount-point '{}' is already in use", mp_str);
            return if opts.ignore_not_mountable { Ok(()) } else { Err(Error::Unmountable(reason)) };
        }

        match self.fs().lstat(&mountpoint) {
            Ok(stat) if stat.file_type == archive::FileType::Directory => {
                let entries = self.fs().read_dir(&mountpoint).unwrap_or_default();
                if !entries.is_empty() {
                    return Err(Error::OverlayMount(mountpoint));
                }
            },
            Ok(_) => return Err(Error::OverlayMount(mountpoint)),
            Err(_) => {
                self.fs_mut()
                    .mkdir(&mountpoint, 0o755)
                    .map_err(|_| Error::Unmountable(format!("cannot create '{}'", mountpoint.display())))?;
            },
        }

        self.fs_mut().mount_boundary(&mountpoint);
        self.mount_table_mut().insert(mp_str, fullname.to_owned());

        if let Some(tree) = ds.fscontent.clone() {
            archive::restore_contents(self.fs_mut(), &mountpoint, &tree)?;
        }
        let ds = self.get_mut(fullname)?;
        ds.fscontent = None;
        ds.set_mounted(true);
        Ok(())
    }

    /// Unmount a filesystem. No-op if not mounted.
    pub fn unmount(&mut self, fullname: &str) -> Result<()> {
        debug!(self.logger(), "executing"; "op" => "unmount", "dataset" => fullname);
        let ds = self.get(fullname)?;
        if !ds.mounted() {
            return Ok(());
        }
        let mountpoint = self.mount_path_of(fullname).ok_or_else(|| {
            Error::InvalidArgument(format!("'{}' is marked mounted but has no mount-table entry",
                                            fullname))
        })?;

        let busy = self.mount_table().keys().any(|mp| {
            mp != &mountpoint.to_string_lossy() && Path::new(mp).starts_with(&mountpoint)
        });
        if busy {
            return Err(Error::FilesystemBusy(fullname.to_owned()));
        }

        let archived = archive::archive(self.fs(), &mountpoint)?;
        archive::clear_dir(self.fs_mut(), &mountpoint)?;
        self.fs_mut().unmount_boundary(&mountpoint);
        self.mount_table_mut().remove(&mountpoint.to_string_lossy().into_owned());

        let ds = self.get_mut(fullname)?;
        ds.fscontent = Some(archived);
        ds.set_mounted(false);
        Ok(())
    }

    /// Take a snapshot, optionally recursive. Returns the full name of the
    /// new snapshot.
    pub fn snapshot(
        &mut self,
        fullname: &str,
        snapname: &str,
        opts: &SnapshotOptions,
        props: &HashMap<String, String>,
    ) -> Result<String> {
        debug!(self.logger(), "executing";
               "op" => "snapshot", "dataset" => fullname, "snapname" => snapname,
               "recursive" => opts.recursive);
        let ds = self.get(fullname)?;
        if ds.is_snapshot() {
            return Err(Error::DatasetType("filesystem or volume", fullname.to_owned()));
        }
        name::namecheck(snapname).map_err(|e| Error::DatasetName(e.to_string()))?;

        let targets = if opts.recursive {
            walk::iter_descendants(self.datasets(), fullname,
                                    DatasetTypes::FILESYSTEM | DatasetTypes::VOLUME)?
        } else {
            vec![fullname.to_owned()]
        };

        for t in &targets {
            let tds = self.get(t)?;
            if tds.snapshots().iter().any(|s| name::short_name(s) == snapname) {
                return Err(Error::DatasetExists(format!("{}@{}", t, snapname)));
            }
        }

        let txg = self.next_txg();
        for t in &targets {
            let full = format!("{}@{}", t, snapname);
            let parent_ds = self.get(t)?.clone();
            let mut snap = Dataset::new(full.clone(), Some(t.clone()), DatasetKind::Snapshot, txg);
            for (k, v) in props {
                let value = property::validate_and_parse(k, v, DatasetKind::Snapshot, true)?;
                snap.set_local(k.clone(), value);
            }
            snap.fscontent = match &parent_ds.fscontent {
                Some(content) => Some(content.clone()),
                None => match self.mount_path_of(t) {
                    Some(mp) if parent_ds.mounted() => Some(archive::archive(self.fs(), &mp)?),
                    _ => None,
                },
            };
            snap.set_state(DatasetState::Active);
            self.insert(snap);
            self.get_mut(t)?.snapshots.push(full);
        }
        Ok(format!("{}@{}", fullname, snapname))
    }

    /// Clone a snapshot into a new filesystem or volume.
    pub fn clone_snapshot(
        &mut self,
        snap_name: &str,
        newname: &str,
        opts: &CloneOptions,
        props: &HashMap<String, String>,
    ) -> Result<String> {
        debug!(self.logger(), "executing";
               "op" => "clone", "snapshot" => snap_name, "newname" => newname);
        let snap = self.get(snap_name)?.clone();
        if !snap.is_snapshot() {
            return Err(Error::DatasetType("snapshot", snap_name.to_owned()));
        }
        if name::poolname_of_str(snap_name) != name::poolname_of_str(newname) {
            return Err(Error::InvalidArgument(format!(
                "cannot clone '{}' to '{}': pools differ", snap_name, newname
            )));
        }
        if self.contains(newname) {
            return Err(Error::DatasetExists(newname.to_owned()));
        }

        let (parent_name, leaf) = match newname.rsplit_once('/') {
            Some((p, l)) => (Some(p.to_owned()), l.to_owned()),
            None => (None, newname.to_owned()),
        };
        name::namecheck(&leaf).map_err(|e| Error::DatasetName(e.to_string()))?;

        if let Some(parent) = &parent_name {
            if !self.contains(parent) {
                if opts.create_parents {
                    self.create_missing_parents(parent)?;
                } else {
                    return Err(Error::InactiveDataset(parent.clone()));
                }
            }
        }

        let origin_parent = snap.parent()
                                .ok_or_else(|| Error::InvalidArgument("snapshot has no parent".to_owned()))?;
        let kind = *self.get(origin_parent)?.kind();

        let txg = self.next_txg();
        let mut clone_ds = Dataset::new(newname.to_owned(), parent_name.clone(), kind, txg);
        for (k, v) in props {
            let value = property::validate_and_parse(k, v, kind, true)?;
            if let PropertyValue::VolBlockSize(size) = value {
                clone_ds.set_volblocksize(size);
            }
            clone_ds.set_local(k.clone(), value);
        }
        clone_ds.fscontent = snap.fscontent.clone();
        clone_ds.origin = Some(snap_name.to_owned());
        clone_ds.set_state(DatasetState::Active);
        self.insert(clone_ds);
        match &parent_name {
            Some(p) => self.get_mut(p)?.children.push(newname.to_owned()),
            None => self.register_pool(newname.to_owned()),
        }
        self.get_mut(snap_name)?.clones.push(newname.to_owned());
        Ok(newname.to_owned())
    }

    fn create_missing_parents(&mut self, fullname: &str) -> Result<()> {
        if self.contains(fullname) {
            return Ok(());
        }
        let (parent, leaf) = match fullname.rsplit_once('/') {
            Some((p, l)) => (Some(p.to_owned()), l.to_owned()),
            None => (None, fullname.to_owned()),
        };
        if let Some(p) = &parent {
            self.create_missing_parents(p)?;
        }
        self.create(parent.as_deref(), &leaf, DatasetKind::Filesystem, &HashMap::new())?;
        Ok(())
    }

    /// Rename a dataset or snapshot. Returns the new full name.
    pub fn rename(&mut self, fullname: &str, newname: &str) -> Result<String> {
        debug!(self.logger(), "executing"; "op" => "rename", "from" => fullname, "to" => newname);
        if self.contains(newname) {
            return Err(Error::DatasetExists(newname.to_owned()));
        }
        let ds = self.get(fullname)?.clone();
        if !ds.is_active() {
            return Err(Error::InactiveDataset(fullname.to_owned()));
        }

        let renaming_to_snap = newname.contains('@');
        if renaming_to_snap != ds.is_snapshot() {
            let expected = if renaming_to_snap { "snapshot" } else { "filesystem or volume" };
            return Err(Error::DatasetType(expected, fullname.to_owned()));
        }

        let new_parent = if renaming_to_snap {
            let (prefix, snapname) = name::split_snap(newname);
            let snapname = snapname.ok_or_else(|| {
                Error::InvalidArgument(format!("'{}' is not a valid snapshot name", newname))
            })?;
            name::namecheck(snapname).map_err(|e| Error::DatasetName(e.to_string()))?;
            let current_parent = ds.parent()
                                    .ok_or_else(|| Error::InvalidArgument("snapshot has no parent".to_owned()))?;
            if prefix != current_parent {
                return Err(Error::InvalidArgument(format!(
                    "cannot rename '{}' to '{}': snapshots can only be renamed within the same \
                     filesystem or volume",
                    fullname, newname
                )));
            }
            current_parent.to_owned()
        } else {
            if name::poolname_of_str(fullname) != name::poolname_of_str(newname) {
                return Err(Error::InvalidArgument(format!(
                    "cannot rename '{}' to '{}': pools differ", fullname, newname
                )));
            }
            let (prefix, leaf) = newname.rsplit_once('/').ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "cannot rename '{}' to '{}': datasets cannot become top-level", fullname, newname
                ))
            })?;
            name::namecheck(leaf).map_err(|e| Error::DatasetName(e.to_string()))?;
            if !self.contains(prefix) {
                return Err(Error::InactiveDataset(prefix.to_owned()));
            }
            prefix.to_owned()
        };

        let was_mounted = ds.mounted();
        if was_mounted {
            self.unmount(fullname)?;
        }

        match ds.parent() {
            Some(p) if ds.is_snapshot() => self.get_mut(p)?.snapshots.retain(|s| s != fullname),
            Some(p) => self.get_mut(p)?.children.retain(|c| c != fullname),
            None => { /* top-level filesystem, removed from pools below */ },
        }
        if ds.parent().is_none() {
            self.remove_from_pools(fullname);
        }

        self.rename_subtree(fullname, newname)?;

        if ds.is_snapshot() {
            self.get_mut(&new_parent)?.snapshots.push(newname.to_owned());
        } else {
            self.get_mut(&new_parent)?.children.push(newname.to_owned());
        }

        if was_mounted {
            let opts = MountOptions::builder().ignore_not_mountable(true).build().unwrap();
            self.mount(newname, &opts)?;
        }
        Ok(newname.to_owned())
    }

    fn remove_from_pools(&mut self, fullname: &str) { self.pools_mut().retain(|p| p != fullname); }

    /// Rewrite every descendant of `old_root` (inclusive) so its full name's
    /// `old_root` prefix becomes `new_root`, fixing up every internal
    /// full-name reference along the way: `parent`, `children`, `snapshots`,
    /// clone `origin` back-edges, the mount table, and the pools list.
    fn rename_subtree(&mut self, old_root: &str, new_root: &str) -> Result<()> {
        let affected = walk::iter_descendants(self.datasets(), old_root, DatasetTypes::ALL)?;
        let rename_map: HashMap<String, String> = affected
            .iter()
            .map(|old| (old.clone(), format!("{}{}", new_root, &old[old_root.len()..])))
            .collect();

        let mut moved: Vec<Dataset> = Vec::with_capacity(affected.len());
        for old in &affected {
            moved.push(self.remove(old).expect("affected dataset must exist"));
        }
        for ds in moved.iter_mut() {
            let new_name = rename_map.get(ds.name()).expect("every moved dataset is in rename_map").clone();
            let old_parent = ds.parent().map(str::to_owned);
            ds.set_name(new_name);
            if let Some(p) = old_parent {
                if let Some(new_p) = rename_map.get(&p) {
                    ds.set_parent(Some(new_p.clone()));
                }
            }
            for child in ds.children.iter_mut() {
                if let Some(new_c) = rename_map.get(child) {
                    *child = new_c.clone();
                }
            }
            for snap in ds.snapshots.iter_mut() {
                if let Some(new_s) = rename_map.get(snap) {
                    *snap = new_s.clone();
                }
            }
        }
        for ds in moved {
            self.insert(ds);
        }

        for (old, new) in &rename_map {
            let clones = match self.datasets().get(new) {
                Some(ds) if ds.is_snapshot() => ds.clones().to_owned(),
                _ => continue,
            };
            for clone in clones {
                if let Some(cd) = self.get_mut(&clone).ok() {
                    if cd.origin().map(str::to_owned).as_deref() == Some(old.as_str()) {
                        cd.origin = Some(new.clone());
                    }
                }
            }
        }
        for path in self.mount_table_mut().values_mut() {
            if let Some(new) = rename_map.get(path) {
                *path = new.clone();
            }
        }
        for p in self.pools_mut().iter_mut() {
            if let Some(new) = rename_map.get(p) {
                *p = new.clone();
            }
        }
        Ok(())
    }

    fn hold_targets(&self, snap_name: &str, recursive: bool) -> Result<Vec<String>> {
        if !recursive {
            return Ok(vec![snap_name.to_owned()]);
        }
        let snap = self.get(snap_name)?;
        if !snap.is_snapshot() {
            return Err(Error::DatasetType("snapshot", snap_name.to_owned()));
        }
        let parent = snap.parent()
                         .ok_or_else(|| Error::InvalidArgument("snapshot has no parent".to_owned()))?
                         .to_owned();
        let leaf_snapname = name::split_snap(snap_name)
            .1
            .ok_or_else(|| Error::InvalidArgument(format!("'{}' is not a snapshot", snap_name)))?
            .to_owned();
        let fs_names =
            walk::iter_descendants(self.datasets(), &parent, DatasetTypes::FILESYSTEM | DatasetTypes::VOLUME)?;
        Ok(fs_names
            .into_iter()
            .filter_map(|fs_name| {
                let full = format!("{}@{}", fs_name, leaf_snapname);
                if self.contains(&full) { Some(full) } else { None }
            })
            .collect())
    }

    /// Place a hold tag on a snapshot. Snapshot-only; rejects a tag collision.
    pub fn hold(&mut self, snap_name: &str, reason: &str, opts: &HoldOptions) -> Result<()> {
        debug!(self.logger(), "executing";
               "op" => "hold", "snapshot" => snap_name, "tag" => reason, "recursive" => opts.recursive);
        let targets = self.hold_targets(snap_name, opts.recursive)?;
        for t in &targets {
            let ds = self.get(t)?;
            if !ds.is_snapshot() {
                return Err(Error::DatasetType("snapshot", t.clone()));
            }
            if ds.holds().contains(reason) {
                return Err(Error::InvalidArgument(format!("tag '{}' already exists on '{}'", reason, t)));
            }
        }
        for t in &targets {
            self.get_mut(t)?.holds.insert(reason.to_owned());
        }
        Ok(())
    }

    /// The inverse of [`Engine::hold`]. A plain, non-recursive release of a
    /// tag that was never held returns an [`Error`] from the check-phase.
    /// Under `opts.recursive`, `hold_targets` has already swept in every
    /// matching snapshot across the subtree without checking which of them
    /// actually carry `reason`; a missing tag there means the walk produced
    /// a target that shouldn't have held it, so the do-phase treats it as a
    /// fatal assertion instead of a recoverable error.
    pub fn release(&mut self, snap_name: &str, reason: &str, opts: &HoldOptions) -> Result<()> {
        debug!(self.logger(), "executing";
               "op" => "release", "snapshot" => snap_name, "tag" => reason, "recursive" => opts.recursive);
        let targets = self.hold_targets(snap_name, opts.recursive)?;
        for t in &targets {
            let ds = self.get(t)?;
            if !ds.is_snapshot() {
                return Err(Error::DatasetType("snapshot", t.clone()));
            }
            if !opts.recursive && !ds.holds().contains(reason) {
                return Err(Error::InvalidArgument(format!(
                    "no such tag '{}' on '{}'",
                    reason, t
                )));
            }
        }
        for t in &targets {
            let ds = self.get_mut(t)?;
            if opts.recursive {
                assert!(ds.holds.remove(reason), "release: tag '{}' is not held on '{}'", reason, t);
            } else {
                ds.holds.remove(reason);
            }
        }
        Ok(())
    }

    /// Returns a copy of the snapshot's hold set.
    pub fn holds(&self, snap_name: &str) -> Result<std::collections::HashSet<String>> {
        let ds = self.get(snap_name)?;
        if !ds.is_snapshot() {
            return Err(Error::DatasetType("snapshot", snap_name.to_owned()));
        }
        Ok(ds.holds().clone())
    }

    /// Destroy a dataset (and its subtree, if `opts.recursive`). Two-phase
    /// descent over `iterDescendants(['all'])`
    /// when `opts.recursive`, else self only.
    pub fn destroy(&mut self, fullname: &str, opts: &DestroyOptions) -> Result<()> {
        debug!(self.logger(), "executing";
               "op" => "destroy", "dataset" => fullname, "recursive" => opts.recursive);
        let order = if opts.recursive {
            walk::iter_descendants(self.datasets(), fullname, DatasetTypes::ALL)?
        } else {
            vec![fullname.to_owned()]
        };

        for n in &order {
            let ds = self.get(n)?;
            if ds.is_snapshot() {
                if !ds.holds().is_empty() {
                    return Err(Error::SnapshotHold(n.clone()));
                }
                for clone in ds.clones() {
                    if !order.contains(clone) {
                        return Err(Error::Dependant(n.clone(), clone.clone()));
                    }
                }
            } else if !opts.recursive && (!ds.children().is_empty() || !ds.snapshots().is_empty()) {
                return Err(Error::Descendant(n.clone()));
            }
        }

        for n in order.iter().rev() {
            self.destroy_one(n)?;
        }
        Ok(())
    }

    fn destroy_one(&mut self, fullname: &str) -> Result<()> {
        let ds = self.get(fullname)?.clone();
        if ds.mounted() {
            self.unmount(fullname)?;
        }
        if ds.is_snapshot() {
            if let Some(parent) = ds.parent() {
                if let Ok(p) = self.get_mut(parent) {
                    p.snapshots.retain(|s| s != fullname);
                }
            }
        } else {
            if let Some(origin) = ds.origin() {
                if let Ok(o) = self.get_mut(origin) {
                    o.clones.retain(|c| c != fullname);
                }
            }
            match ds.parent() {
                Some(parent) => {
                    if let Ok(p) = self.get_mut(parent) {
                        p.children.retain(|c| c != fullname);
                    }
                },
                None => self.remove_from_pools(fullname),
            }
        }
        self.get_mut(fullname)?.set_state(DatasetState::Destroyed);
        Ok(())
    }
}

fn join_segments(base: &str, segments: &[String]) -> PathBuf {
    let mut p = PathBuf::from(base);
    for seg in segments.iter().rev() {
        p = p.join(seg);
    }
    p
}

fn prefix_with_segments(v: &MountPointValue, segments: &[String]) -> MountPointValue {
    match v {
        MountPointValue::Path(p) => MountPointValue::Path(join_segments(&p.to_string_lossy(), segments)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_top_level_must_be_filesystem() {
        let mut e = Engine::new();
        let err = e.create(None, "tank", DatasetKind::Volume, &HashMap::new()).unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
    }

    #[test]
    fn create_rejects_duplicate_sibling() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        let err = e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap_err();
        assert_eq!(ErrorKind::DatasetExists, err.kind());
    }

    #[test]
    fn create_mounts_filesystem_with_canmount_on() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        assert!(e.get("tank").unwrap().mounted());
        assert!(e.mount_table().contains_key("/tank"));
    }

    #[test]
    fn snapshot_then_clone_round_trips_content() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        e.fs_mut().write_file(Path::new("/tank/a"), 0o644, b"hello").unwrap();

        let snap_opts = SnapshotOptions::builder().build().unwrap();
        e.snapshot("tank", "snap1", &snap_opts, &HashMap::new()).unwrap();

        let clone_opts = CloneOptions::builder().build().unwrap();
        e.clone_snapshot("tank@snap1", "tank2", &clone_opts, &HashMap::new()).unwrap();
        let mount_opts = MountOptions::builder().build().unwrap();
        e.mount("tank2", &mount_opts).unwrap();

        assert_eq!(b"hello".to_vec(), e.fs().read_file(Path::new("/tank2/a")).unwrap());
        assert_eq!(vec!["tank2".to_owned()], e.get("tank@snap1").unwrap().clones().to_owned());
    }

    #[test]
    fn destroy_rejects_held_snapshot() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        let snap_opts = SnapshotOptions::builder().build().unwrap();
        e.snapshot("tank", "snap1", &snap_opts, &HashMap::new()).unwrap();
        let hold_opts = HoldOptions::builder().build().unwrap();
        e.hold("tank@snap1", "tag1", &hold_opts).unwrap();

        let destroy_opts = DestroyOptions::builder().build().unwrap();
        let err = e.destroy("tank@snap1", &destroy_opts).unwrap_err();
        assert_eq!(ErrorKind::SnapshotHold, err.kind());

        e.release("tank@snap1", "tag1", &hold_opts).unwrap();
        e.destroy("tank@snap1", &destroy_opts).unwrap();
    }

    #[test]
    fn destroy_rejects_dangling_clone() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        let snap_opts = SnapshotOptions::builder().build().unwrap();
        e.snapshot("tank", "snap1", &snap_opts, &HashMap::new()).unwrap();
        let clone_opts = CloneOptions::builder().build().unwrap();
        e.clone_snapshot("tank@snap1", "tank2", &clone_opts, &HashMap::new()).unwrap();

        let destroy_opts = DestroyOptions::builder().recursive(true).build().unwrap();
        let err = e.destroy("tank", &destroy_opts).unwrap_err();
        assert_eq!(ErrorKind::Dependant, err.kind());
    }

    #[test]
    fn rename_filesystem_carries_children_and_mount() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        e.create(Some("tank"), "a", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        e.fs_mut().write_file(Path::new("/tank/a/file1"), 0o644, b"data").unwrap();

        e.rename("tank/a", "tank/b").unwrap();

        assert!(e.get("tank/b").is_ok());
        assert!(e.get("tank/a").is_err() || !e.get("tank/a").unwrap().is_active());
        assert_eq!(vec!["tank/b".to_owned()], e.get("tank").unwrap().children().to_owned());
        assert_eq!(b"data".to_vec(), e.fs().read_file(Path::new("/tank/b/file1")).unwrap());
    }

    #[test]
    fn rename_then_rename_back_restores_identity() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        e.create(Some("tank"), "a", DatasetKind::Filesystem, &HashMap::new()).unwrap();

        e.rename("tank/a", "tank/b").unwrap();
        e.rename("tank/b", "tank/a").unwrap();

        assert!(e.get("tank/a").unwrap().is_active());
        assert_eq!(vec!["tank/a".to_owned()], e.get("tank").unwrap().children().to_owned());
    }

    #[test]
    fn hold_then_release_leaves_hold_set_unchanged() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        let snap_opts = SnapshotOptions::builder().build().unwrap();
        e.snapshot("tank", "snap1", &snap_opts, &HashMap::new()).unwrap();

        let before = e.holds("tank@snap1").unwrap();
        let hold_opts = HoldOptions::builder().build().unwrap();
        e.hold("tank@snap1", "tag1", &hold_opts).unwrap();
        e.release("tank@snap1", "tag1", &hold_opts).unwrap();
        let after = e.holds("tank@snap1").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn release_of_unheld_tag_returns_error() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        let snap_opts = SnapshotOptions::builder().build().unwrap();
        e.snapshot("tank", "snap1", &snap_opts, &HashMap::new()).unwrap();
        let hold_opts = HoldOptions::builder().build().unwrap();
        let err = e.release("tank@snap1", "never-held", &hold_opts).unwrap_err();
        assert_eq!(crate::error::ErrorKind::InvalidArgument, err.kind());
    }

    #[test]
    #[should_panic]
    fn recursive_release_of_unheld_tag_on_swept_target_panics() {
        let mut e = Engine::new();
        e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        e.create(Some("tank"), "a", DatasetKind::Filesystem, &HashMap::new()).unwrap();
        let snap_opts = SnapshotOptions::builder().recursive(true).build().unwrap();
        e.snapshot("tank", "snap1", &snap_opts, &HashMap::new()).unwrap();
        e.hold("tank@snap1", "tag1", &HoldOptions::builder().build().unwrap()).unwrap();

        let recursive_opts = HoldOptions::builder().recursive(true).build().unwrap();
        e.release("tank@snap1", "tag1", &recursive_opts).unwrap();
    }
}
