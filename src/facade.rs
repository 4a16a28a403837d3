//! The `zpool.*`/`zfs.*` callback-style façade. There's no subprocess here,
//! so the façade calls straight into `crate::engine`/`crate::ops` and maps
//! `crate::error::Error` variants onto the exact user-visible message
//! fragments a caller of the real command-line tools
//! would have seen, instead of parsing stderr text.
//!
//! `Callback<T>` keeps the continuation shape of the system this mocks:
//! every façade function takes a closure invoked exactly once with either
//! an error or a result, never both, never neither.
use crate::{dataset::DatasetKind,
            engine::Engine,
            error::Error,
            name,
            ops::{CloneOptions, DestroyOptions, HoldOptions, MountOptions, SnapshotOptions},
            walk::{self, DatasetTypes}};
use std::{collections::HashMap, fmt};

pub type Callback<T> = Box<dyn FnOnce(Option<FacadeError>, Option<T>)>;

/// A plain string error as seen by a façade caller: structured
/// `crate::error::Error` values never cross this boundary, only plain
/// strings do, matching a callback API that can't express a typed error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacadeError(pub String);

impl fmt::Display for FacadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl std::error::Error for FacadeError {}

fn translate(e: Error) -> FacadeError { FacadeError(e.to_string()) }

fn not_implemented() -> FacadeError { FacadeError("not implemented".to_owned()) }

/// Default `zfs list` columns.
pub const DEFAULT_DATASET_FIELDS: &[&str] = &["name", "used", "avail", "refer", "type", "mountpoint"];
/// Default `zpool list` columns.
pub const DEFAULT_POOL_FIELDS: &[&str] =
    &["name", "size", "allocated", "free", "cap", "health", "altroot"];

pub mod zpool {
    use super::*;

    /// `config` is applied as properties on the pool's root filesystem;
    /// this crate has no vdev layer to hand it to (see `crate::topology`
    /// for the independent disk-layout planner).
    pub fn create(pool: &str, config: &HashMap<String, String>, cb: Callback<()>) {
        let mut engine = Engine::global();
        match engine.create(None, pool, DatasetKind::Filesystem, config) {
            Ok(_) => cb(None, Some(())),
            Err(Error::DatasetExists(_)) => {
                cb(Some(FacadeError(format!("cannot create '{}': pool already exists", pool))), None)
            },
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    pub fn destroy(pool: &str, cb: Callback<()>) {
        let mut engine = Engine::global();
        match engine.destroy_pool(pool) {
            Ok(_) => cb(None, Some(())),
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    /// Only `fields = ["name"]` is supported.
    pub fn list(pool: Option<&str>, fields: Option<&[&str]>,
                cb: Callback<(Vec<String>, Vec<Vec<String>>)>) {
        if let Some(f) = fields {
            if f != ["name"] {
                cb(Some(not_implemented()), None);
                return;
            }
        }
        let engine = Engine::global();
        let names: Vec<String> = match pool {
            Some(p) if engine.pool_exists(p) => vec![p.to_owned()],
            Some(_) => Vec::new(),
            None => engine.pools().to_owned(),
        };
        let rows = names.into_iter().map(|n| vec![n]).collect();
        cb(None, Some((vec!["name".to_owned()], rows)));
    }

    /// `"UNKNOWN"` rather than an error for a missing pool -- preserved
    /// verbatim rather than raising.
    pub fn status(pool: &str, cb: Callback<String>) {
        let engine = Engine::global();
        let status = if engine.pool_exists(pool) { "ONLINE" } else { "UNKNOWN" };
        cb(None, Some(status.to_owned()));
    }

    pub fn upgrade(cb: Callback<()>) { cb(Some(not_implemented()), None) }

    pub fn list_disks(cb: Callback<Vec<String>>) { cb(Some(not_implemented()), None) }
}

/// `type`/`recursive`/`fields`/`parseable`, mirroring `zfs.list`'s options.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub dataset_type: DatasetTypes,
    pub recursive: bool,
    pub fields: Vec<String>,
    pub parseable: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions { dataset_type: DatasetTypes::FILESYSTEM | DatasetTypes::VOLUME,
                      recursive: false,
                      fields: DEFAULT_DATASET_FIELDS.iter().map(|s| s.to_string()).collect(),
                      parseable: true }
    }
}

pub mod zfs {
    use super::*;

    /// Always creates a filesystem; there's no `type` argument because
    /// `zfs.create`'s signature doesn't carry one.
    pub fn create(name: &str, cb: Callback<String>) {
        let (parent, leaf) = match name.rsplit_once('/') {
            Some((p, l)) => (Some(p), l.to_owned()),
            None => (None, name.to_owned()),
        };
        let parent = match parent {
            Some(p) => p,
            None => {
                cb(Some(FacadeError("missing dataset name".to_owned())), None);
                return;
            },
        };
        let mut engine = Engine::global();
        if !engine.contains(parent) {
            cb(Some(FacadeError("parent does not exist".to_owned())), None);
            return;
        }
        match engine.create(Some(parent), &leaf, DatasetKind::Filesystem, &HashMap::new()) {
            Ok(full) => cb(None, Some(full)),
            Err(Error::DatasetExists(_)) => {
                cb(Some(FacadeError("dataset already exists".to_owned())), None)
            },
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    pub fn snapshot(full: &str, cb: Callback<String>) {
        let (fs, snapname) = name::split_snap(full);
        let snapname = match snapname {
            Some(s) if !s.is_empty() => s,
            _ => {
                cb(Some(FacadeError(
                    "empty component or misplaced '@' or '#' delimiter in name".to_owned(),
                )),
                   None);
                return;
            },
        };
        let mut engine = Engine::global();
        if !engine.contains(fs) {
            cb(Some(FacadeError("dataset does not exist".to_owned())), None);
            return;
        }
        let opts = SnapshotOptions::builder().build().unwrap();
        match engine.snapshot(fs, snapname, &opts, &HashMap::new()) {
            Ok(full) => cb(None, Some(full)),
            Err(Error::DatasetExists(_)) => {
                cb(Some(FacadeError("dataset already exists".to_owned())), None)
            },
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    pub fn clone(snap: &str, newname: &str, props: Option<&HashMap<String, String>>,
                 cb: Callback<String>) {
        if newname.contains('@') {
            cb(Some(FacadeError("snapshot delimiter '@' is not expected here".to_owned())), None);
            return;
        }
        let mut engine = Engine::global();
        if !engine.contains(snap) {
            cb(Some(FacadeError("dataset does not exist".to_owned())), None);
            return;
        }
        let opts = CloneOptions::builder().build().unwrap();
        let empty = HashMap::new();
        match engine.clone_snapshot(snap, newname, &opts, props.unwrap_or(&empty)) {
            Ok(full) => cb(None, Some(full)),
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    fn destroy_impl(name: &str, recursive: bool, cb: Callback<()>) {
        let mut engine = Engine::global();
        let opts = DestroyOptions::builder().recursive(recursive).build().unwrap();
        match engine.destroy(name, &opts) {
            Ok(_) => cb(None, Some(())),
            Err(Error::SnapshotHold(n)) => {
                cb(Some(FacadeError(format!("cannot destroy '{}': dataset is busy", n))), None)
            },
            Err(Error::Descendant(n)) => {
                cb(Some(FacadeError(format!("cannot destroy '{}': has children", n))), None)
            },
            Err(Error::Dependant(snap, _)) => cb(Some(FacadeError(format!(
                "cannot destroy '{}': has dependent clones", snap
            ))),
                                                  None),
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    pub fn destroy(name: &str, cb: Callback<()>) { destroy_impl(name, false, cb) }

    pub fn destroy_all(name: &str, cb: Callback<()>) { destroy_impl(name, true, cb) }

    pub fn set(name: &str, props: &HashMap<String, String>, cb: Callback<()>) {
        let mut engine = Engine::global();
        for (k, v) in props {
            if let Err(e) = engine.set_property(name, k, v) {
                cb(Some(translate(e)), None);
                return;
            }
        }
        cb(None, Some(()));
    }

    /// `parseable = false` isn't supported: it falls into the same
    /// "not implemented" bucket as `send`/`receive`/`rollback`.
    pub fn get(name: &str, prop_names: &[&str], parseable: bool,
               cb: Callback<Vec<(String, String, String)>>) {
        if !parseable {
            cb(Some(not_implemented()), None);
            return;
        }
        let engine = Engine::global();
        let mut rows = Vec::with_capacity(prop_names.len());
        for prop in prop_names {
            match engine.get_inheritable_value(name, prop) {
                Ok((value, _source)) => rows.push((name.to_owned(), (*prop).to_owned(), value)),
                Err(e) => {
                    cb(Some(translate(e)), None);
                    return;
                },
            }
        }
        cb(None, Some(rows));
    }

    pub fn list(name: Option<&str>, opts: Option<&ListOptions>,
                cb: Callback<(Vec<String>, Vec<Vec<String>>)>) {
        let opts = opts.cloned().unwrap_or_default();
        if !opts.parseable {
            cb(Some(not_implemented()), None);
            return;
        }
        let engine = Engine::global();

        let roots: Vec<String> = match name {
            Some(n) => {
                if !engine.contains(n) {
                    cb(Some(FacadeError("dataset does not exist".to_owned())), None);
                    return;
                }
                vec![n.to_owned()]
            },
            None => engine.pools().to_owned(),
        };

        let mut rows = Vec::new();
        for root in &roots {
            collect_rows(&engine, root, &opts, &mut rows);
        }
        cb(None, Some((opts.fields.clone(), rows)));
    }

    /// `zfs.list(name, {type: 'snapshot'})`.
    pub fn list_snapshots(name: Option<&str>, cb: Callback<(Vec<String>, Vec<Vec<String>>)>) {
        let opts = ListOptions { dataset_type: DatasetTypes::SNAPSHOT, ..ListOptions::default() };
        list(name, Some(&opts), cb)
    }

    pub fn hold(snap: &str, tag: &str, cb: Callback<()>) {
        let mut engine = Engine::global();
        let opts = HoldOptions::builder().build().unwrap();
        match engine.hold(snap, tag, &opts) {
            Ok(_) => cb(None, Some(())),
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    pub fn release_hold(snap: &str, tag: &str, cb: Callback<()>) {
        let mut engine = Engine::global();
        let opts = HoldOptions::builder().build().unwrap();
        match engine.release(snap, tag, &opts) {
            Ok(_) => cb(None, Some(())),
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    pub fn holds(snap: &str, cb: Callback<Vec<String>>) {
        let engine = Engine::global();
        match engine.holds(snap) {
            Ok(set) => {
                let mut tags: Vec<String> = set.into_iter().collect();
                tags.sort();
                cb(None, Some(tags));
            },
            Err(e) => cb(Some(translate(e)), None),
        }
    }

    pub fn send(_snapshot: &str, cb: Callback<Vec<u8>>) { cb(Some(not_implemented()), None) }

    pub fn receive(_name: &str, _stream: &[u8], cb: Callback<()>) {
        cb(Some(not_implemented()), None)
    }

    pub fn rollback(_snapshot: &str, cb: Callback<()>) { cb(Some(not_implemented()), None) }

    pub fn upgrade(_name: &str, cb: Callback<()>) { cb(Some(not_implemented()), None) }

    fn collect_rows(engine: &Engine, root: &str, opts: &ListOptions, rows: &mut Vec<Vec<String>>) {
        let names: Vec<String> = if opts.recursive {
            walk::iter_descendants(engine.datasets(), root, opts.dataset_type).unwrap_or_default()
        } else {
            let mut candidates = vec![root.to_owned()];
            if opts.dataset_type.contains(DatasetTypes::SNAPSHOT) {
                if let Ok(ds) = engine.get(root) {
                    candidates.extend(ds.snapshots().iter().cloned());
                }
            }
            candidates
                .into_iter()
                .filter(|n| {
                    engine.get(n).map(|d| opts.dataset_type.matches(*d.kind())).unwrap_or(false)
                })
                .collect()
        };
        for full in names {
            rows.push(opts.fields.iter().map(|f| field_value(engine, &full, f)).collect());
        }
    }

    fn field_value(engine: &Engine, full: &str, field: &str) -> String {
        match field {
            "name" => full.to_owned(),
            "type" => engine.get(full).map(|d| d.kind().to_string()).unwrap_or_default(),
            "mountpoint" => engine.mountpoint_for(full)
                                  .ok()
                                  .flatten()
                                  .map(|v| v.to_string())
                                  .unwrap_or_else(|| "-".to_owned()),
            _ => "-".to_owned(),
        }
    }
}
