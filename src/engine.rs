//! The dataset registry: pools root, mount table, txg counter. A single
//! process-wide instance reached through `crate::log::GlobalLogger`'s
//! `OnceCell` singleton pattern.
use crate::{archive::InMemoryFs,
            dataset::{Dataset, DatasetKind, DatasetState},
            error::{Error, Result},
            name,
            property::{self, PropertySource, READONLY_PROPERTIES, WRITABLE_PROPERTIES},
            walk::{self, DatasetTypes},
            GlobalLogger};
use once_cell::sync::OnceCell;
use slog::Logger;
use std::{collections::HashMap, sync::{Mutex, MutexGuard}};

static GLOBAL_ENGINE: OnceCell<Mutex<Engine>> = OnceCell::new();

/// The whole mock world: every dataset ever created (including destroyed
/// ones, so error messages and `get` keep working on them), the pool list,
/// the mountpoint -> dataset table, the monotonic txg counter, and the
/// in-memory host filesystem datasets are mounted onto.
pub struct Engine {
    datasets: HashMap<String, Dataset>,
    pools: Vec<String>,
    mount_table: HashMap<String, String>,
    txg: u64,
    fs: InMemoryFs,
    logger: Logger,
}

impl Engine {
    /// Build an empty, standalone engine. Test-only entry point for
    /// scenarios that need isolation from the shared [`Engine::global`]
    /// instance rather than `reset`-between-tests on it.
    pub(crate) fn new() -> Self {
        let logger = GlobalLogger::get().new(o!("zetta_module" => "engine"));
        Engine { datasets: HashMap::new(), pools: Vec::new(), mount_table: HashMap::new(),
                 txg: 1, fs: InMemoryFs::new(), logger }
    }

    pub fn logger(&self) -> &Logger { &self.logger }

    /// Borrow the process-wide engine, initializing it empty on first
    /// access.
    pub fn global() -> MutexGuard<'static, Engine> {
        GLOBAL_ENGINE.get_or_init(|| Mutex::new(Engine::new()))
                     .lock()
                     .expect("engine mutex poisoned")
    }

    /// Wipe every pool, dataset, mount, and the txg counter. Intended for
    /// test isolation between scenarios.
    pub fn reset(&mut self) {
        debug!(self.logger, "executing"; "op" => "reset");
        self.datasets.clear();
        self.pools.clear();
        self.mount_table.clear();
        self.txg = 1;
        self.fs = InMemoryFs::new();
    }

    pub fn next_txg(&mut self) -> u64 {
        let txg = self.txg;
        self.txg += 1;
        txg
    }

    pub fn fs(&self) -> &InMemoryFs { &self.fs }

    pub fn fs_mut(&mut self) -> &mut InMemoryFs { &mut self.fs }

    pub fn datasets(&self) -> &HashMap<String, Dataset> { &self.datasets }

    pub fn contains(&self, fullname: &str) -> bool { self.datasets.contains_key(fullname) }

    pub fn get(&self, fullname: &str) -> Result<&Dataset> {
        self.datasets.get(fullname).ok_or_else(|| Error::InactiveDataset(fullname.to_owned()))
    }

    pub fn get_mut(&mut self, fullname: &str) -> Result<&mut Dataset> {
        self.datasets.get_mut(fullname).ok_or_else(|| Error::InactiveDataset(fullname.to_owned()))
    }

    /// Insert a dataset that isn't linked to anything yet (`state ==
    /// Creating`); the caller still has to push it onto a parent's
    /// `children`/`snapshots` list and, for a pool root, onto
    /// [`Engine::pools`].
    pub(crate) fn insert(&mut self, dataset: Dataset) { self.datasets.insert(dataset.name().clone(), dataset); }

    pub(crate) fn remove(&mut self, fullname: &str) -> Option<Dataset> {
        self.datasets.remove(fullname)
    }

    pub fn pools(&self) -> &[String] { &self.pools }

    pub(crate) fn pools_mut(&mut self) -> &mut Vec<String> { &mut self.pools }

    pub fn get_pools(&self) -> Vec<&Dataset> {
        self.pools.iter().filter_map(|p| self.datasets.get(p)).collect()
    }

    pub(crate) fn register_pool(&mut self, name: String) { self.pools.push(name); }

    pub fn pool_exists(&self, name: &str) -> bool { self.pools.iter().any(|p| p == name) }

    /// `poolname(x)` for an already-resolved dataset: walk
    /// `parent` links to the pools root rather than splitting a string.
    pub fn poolname_of(&self, dataset: &Dataset) -> String {
        let mut cur = dataset;
        loop {
            match cur.parent() {
                Some(parent_name) => match self.datasets.get(parent_name) {
                    Some(parent_ds) => cur = parent_ds,
                    None => return parent_name.clone(),
                },
                None => return cur.name().clone(),
            }
        }
    }

    pub fn poolname_of_str(full: &str) -> &str { name::poolname_of_str(full) }

    pub fn mount_table(&self) -> &HashMap<String, String> { &self.mount_table }

    pub(crate) fn mount_table_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.mount_table
    }

    /// Walk `name`'s ancestors looking for an explicit value of `prop`,
    /// falling back to the pools-root default map.
    /// Works for any property name present in the
    /// default map, not just the small typed set `get_property` exposes:
    /// this is the routine a façade's `zfs.get(propNames)` would call for
    /// an arbitrary caller-supplied property list.
    pub fn get_inheritable_value(&self, name: &str, prop: &str) -> Result<(String, PropertySource)> {
        self.get(name)?;
        let mut cur = name.to_owned();
        let mut first = true;
        loop {
            let ds = self.get(&cur)?;
            if let Some(raw) = ds.local_raw(prop) {
                let source =
                    if first { PropertySource::Local } else { PropertySource::Inherited(cur) };
                return Ok((raw, source));
            }
            match ds.parent() {
                Some(parent) => {
                    cur = parent.clone();
                    first = false;
                },
                None => break,
            }
        }
        property::DEFAULT_PROPERTIES
            .get(prop)
            .map(|v| (v.to_string(), PropertySource::Default))
            .ok_or_else(|| Error::Unimplemented(prop.to_owned()))
    }

    /// The typed accessor API: only the 8 writable plus 7
    /// read-only properties are reachable here; anything else is
    /// `Unimplemented` even though it may well have a value in
    /// [`Engine::get_inheritable_value`]'s default map.
    pub fn get_property(&self, name: &str, prop: &str) -> Result<(String, PropertySource)> {
        let ds = self.get(name)?;
        if READONLY_PROPERTIES.contains(&prop) {
            let value = match prop {
                "type" => ds.kind().to_string(),
                "name" => ds.name().clone(),
                "guid" => ds.guid().to_string(),
                "creation" => ds.creation().to_rfc3339(),
                "createtxg" => ds.createtxg().to_string(),
                "mounted" => ds.mounted().to_string(),
                "origin" => ds.origin().unwrap_or("-").to_owned(),
                _ => unreachable!("READONLY_PROPERTIES and this match must stay in sync"),
            };
            return Ok((value, PropertySource::Local));
        }
        if !WRITABLE_PROPERTIES.contains(&prop) {
            return Err(Error::Unimplemented(prop.to_owned()));
        }
        self.get_inheritable_value(name, prop)
    }

    /// Setting `mountpoint` on a filesystem unmounts (if mounted), rewrites
    /// the local value, then remounts with not-mountable errors swallowed
    /// so an unmountable new mountpoint doesn't raise. Every other property
    /// is a plain local-map write.
    pub fn set_property(&mut self, fullname: &str, prop: &str, raw: &str) -> Result<()> {
        debug!(self.logger, "executing";
               "op" => "set_property", "dataset" => fullname, "prop" => prop, "value" => raw);
        let ds = self.get(fullname)?;
        let kind = *ds.kind();
        let creating = *ds.state() == DatasetState::Creating;
        let value = property::validate_and_parse(prop, raw, kind, creating)?;

        if prop == "mountpoint" && kind == DatasetKind::Filesystem {
            let was_mounted = self.get(fullname)?.mounted();
            if was_mounted {
                self.unmount(fullname)?;
            }
            self.get_mut(fullname)?.set_local(prop, value);
            if was_mounted {
                let opts = crate::ops::MountOptions::builder()
                    .ignore_not_mountable(true)
                    .build()
                    .expect("MountOptions has only a bool field with a default");
                self.mount(fullname, &opts)?;
            }
            return Ok(());
        }

        self.get_mut(fullname)?.set_local(prop, value);
        Ok(())
    }

    /// Destroy every dataset in `pool_name`'s tree unconditionally: no
    /// two-phase check, no busy/dependent-clone refusal, the whole pool
    /// simply stops existing.
    pub fn destroy_pool(&mut self, pool_name: &str) -> Result<()> {
        debug!(self.logger, "executing"; "op" => "destroy_pool", "pool" => pool_name);
        if !self.pool_exists(pool_name) {
            return Err(Error::NoSuchPool(pool_name.to_owned()));
        }
        let order = walk::iter_descendants(&self.datasets, pool_name, DatasetTypes::ALL)?;
        for fullname in &order {
            if let Some(ds) = self.datasets.get_mut(fullname) {
                ds.set_state(DatasetState::PoolDestroyed);
                ds.set_mounted(false);
            }
        }
        self.mount_table.retain(|_, ds_name| !order.contains(ds_name));
        self.pools.retain(|p| p != pool_name);
        Ok(())
    }
}
