//! The dataset entity: a `#[derive(Getters)]` value type mutated in place
//! rather than rebuilt, so it carries plain fields plus `&mut self` mutators
//! instead of a builder.
//!
//! The dataset graph is an arena: [`crate::engine::Engine`] owns every
//! `Dataset` in one `name -> Dataset` map, and a `Dataset` only ever refers
//! to siblings by full name (`parent`, `children`, `snapshots`, `clones`,
//! `origin`) rather than holding them directly. That keeps the snapshot ->
//! clone -> snapshot cycle representable
//! without `Rc`/`RefCell`.
use crate::property::PropertyValue;
use chrono::{DateTime, Utc};
use getset::Getters;
use std::collections::{HashMap, HashSet};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(AsRefStr, EnumString, Display, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DatasetKind {
    #[strum(serialize = "filesystem")]
    Filesystem,
    #[strum(serialize = "volume")]
    Volume,
    #[strum(serialize = "snapshot")]
    Snapshot,
}

/// A dataset's lifecycle state.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DatasetState {
    /// Being constructed; not yet linked into its parent's child list.
    Creating,
    Active,
    /// Destroyed individually (`destroy`); still resolvable by name for
    /// error messages but inert for every other operation.
    Destroyed,
    /// Its whole pool was destroyed (`destroyPool`); distinguished from
    /// [`DatasetState::Destroyed`] so error messages can say which.
    PoolDestroyed,
}

#[derive(Debug, Clone, Getters)]
pub struct Dataset {
    #[get = "pub"]
    name: String,
    #[get = "pub"]
    parent: Option<String>,
    #[get = "pub"]
    kind: DatasetKind,
    #[get = "pub"]
    creation: DateTime<Utc>,
    #[get = "pub"]
    createtxg: u64,
    #[get = "pub"]
    guid: u64,
    #[get = "pub"]
    state: DatasetState,
    #[get = "pub"]
    mounted: bool,

    /// Explicitly-set properties, keyed by property name. Anything absent
    /// here inherits.
    pub(crate) local: HashMap<String, PropertyValue>,

    /// The archived subtree captured at `unmount`/`snapshot` time, restored
    /// at `mount`/`clone` time. `None` means "never populated" (e.g. a
    /// never-mounted filesystem).
    pub(crate) fscontent: Option<crate::archive::ArchivedEntry>,

    /// Filesystem/volume: child filesystems and volumes directly beneath
    /// this one, in creation order.
    pub(crate) children: Vec<String>,
    /// Filesystem/volume: snapshots of this dataset, in creation order.
    pub(crate) snapshots: Vec<String>,
    /// Volume only.
    pub(crate) volblocksize: u64,

    /// Snapshot only: datasets holding this snapshot via `hold`.
    pub(crate) holds: HashSet<String>,
    /// Snapshot only: clones made from this snapshot, in creation order.
    pub(crate) clones: Vec<String>,

    /// Filesystem/volume only, when it was created via `clone`: the
    /// snapshot it originated from.
    pub(crate) origin: Option<String>,
}

impl Dataset {
    /// Build a not-yet-linked filesystem or volume, state `Creating`. The
    /// caller (`crate::ops::create`) is responsible for linking it into its
    /// parent's `children` and flipping it to `Active`.
    pub fn new(name: String, parent: Option<String>, kind: DatasetKind, createtxg: u64) -> Self {
        Dataset { name,
                  parent,
                  kind,
                  creation: Utc::now(),
                  createtxg,
                  guid: rand::random(),
                  state: DatasetState::Creating,
                  mounted: false,
                  local: HashMap::new(),
                  fscontent: None,
                  children: Vec::new(),
                  snapshots: Vec::new(),
                  volblocksize: 8192,
                  holds: HashSet::new(),
                  clones: Vec::new(),
                  origin: None }
    }

    pub fn is_filesystem(&self) -> bool { self.kind == DatasetKind::Filesystem }

    pub fn is_volume(&self) -> bool { self.kind == DatasetKind::Volume }

    pub fn is_snapshot(&self) -> bool { self.kind == DatasetKind::Snapshot }

    pub fn is_clone(&self) -> bool { self.origin.is_some() }

    pub fn is_active(&self) -> bool { self.state == DatasetState::Active }

    pub fn children(&self) -> &[String] { &self.children }

    pub fn snapshots(&self) -> &[String] { &self.snapshots }

    pub fn clones(&self) -> &[String] { &self.clones }

    pub fn holds(&self) -> &HashSet<String> { &self.holds }

    pub fn origin(&self) -> Option<&str> { self.origin.as_deref() }

    pub fn volblocksize(&self) -> u64 { self.volblocksize }

    pub fn local_properties(&self) -> &HashMap<String, PropertyValue> { &self.local }

    pub(crate) fn set_state(&mut self, state: DatasetState) { self.state = state; }

    pub(crate) fn set_name(&mut self, name: String) { self.name = name; }

    pub(crate) fn set_parent(&mut self, parent: Option<String>) { self.parent = parent; }

    pub(crate) fn set_mounted(&mut self, mounted: bool) { self.mounted = mounted; }

    pub(crate) fn set_local(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.local.insert(name.into(), value);
    }

    pub(crate) fn set_volblocksize(&mut self, size: u64) { self.volblocksize = size; }

    pub(crate) fn local_raw(&self, name: &str) -> Option<String> {
        self.local.get(name).map(|v| v.to_string())
    }
}
