//! Recursive traversal and the two-phase descent pattern. `DatasetTypes`
//! replaces a stringly-typed `-t
//! filesystem,volume,snapshot` CLI flag (`zpool`/`zfs` shell out with a
//! comma list; here it's a `bitflags!` set instead, since there's no
//! command line to build).
use crate::{dataset::{Dataset, DatasetKind}, error::{Error, Result}};
use bitflags::bitflags;
use std::collections::{HashMap, HashSet};

bitflags! {
    pub struct DatasetTypes: u8 {
        const FILESYSTEM = 0b0001;
        const VOLUME     = 0b0010;
        const SNAPSHOT   = 0b0100;
        /// Follow snapshot -> clone edges too. Meaningless on its own:
        /// must be combined with at least one real dataset type.
        const CLONES     = 0b1000;
        const ALL = Self::FILESYSTEM.bits | Self::VOLUME.bits | Self::SNAPSHOT.bits;
    }
}

impl DatasetTypes {
    pub fn matches(self, kind: DatasetKind) -> bool {
        match kind {
            DatasetKind::Filesystem => self.contains(DatasetTypes::FILESYSTEM),
            DatasetKind::Volume => self.contains(DatasetTypes::VOLUME),
            DatasetKind::Snapshot => self.contains(DatasetTypes::SNAPSHOT),
        }
    }
}

/// Deterministic pre-order walk of `root` and everything beneath it:
/// children, then each child's own snapshots, then (if `types` includes
/// [`DatasetTypes::CLONES`]) each snapshot's clones, recursively, with a
/// visited set so the snapshot <-> clone cycle never loops. Only names
/// whose kind is in `types` are returned,
/// but the walk still *descends* through filtered-out nodes so e.g.
/// `FILESYSTEM` alone still reaches grandchildren.
pub fn iter_descendants(
    datasets: &HashMap<String, Dataset>,
    root: &str,
    types: DatasetTypes,
) -> Result<Vec<String>> {
    if types.contains(DatasetTypes::CLONES)
        && !types.intersects(DatasetTypes::FILESYSTEM | DatasetTypes::VOLUME
                              | DatasetTypes::SNAPSHOT)
    {
        return Err(Error::InvalidArgument(
            "CLONES must be combined with at least one dataset type".to_owned(),
        ));
    }
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    visit(datasets, root, types, &mut visited, &mut out);
    Ok(out)
}

fn visit(
    datasets: &HashMap<String, Dataset>,
    name: &str,
    types: DatasetTypes,
    visited: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    if !visited.insert(name.to_owned()) {
        return;
    }
    let ds = match datasets.get(name) {
        Some(ds) => ds,
        None => return,
    };
    if types.matches(*ds.kind()) {
        out.push(name.to_owned());
    }
    for snap in ds.snapshots() {
        visit(datasets, snap, types, visited, out);
        if types.contains(DatasetTypes::CLONES) {
            if let Some(snap_ds) = datasets.get(snap) {
                for clone in snap_ds.clones().to_owned() {
                    visit(datasets, &clone, types, visited, out);
                }
            }
        }
    }
    for child in ds.children() {
        visit(datasets, child, types, visited, out);
    }
}

/// Run `check` over every name in `order`, then only if every check
/// succeeded, run `do_` over every name in `order`: a
/// recursive destroy/rename/etc. either fully applies or fully refuses, it
/// never partially commits.
pub fn two_phase<C, D>(order: &[String], mut check: C, mut do_: D) -> Result<()>
where
    C: FnMut(&str) -> Result<()>,
    D: FnMut(&str) -> Result<()>,
{
    for name in order {
        check(name)?;
    }
    for name in order {
        do_(name)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dataset::DatasetKind;

    fn fixture() -> HashMap<String, Dataset> {
        let mut m = HashMap::new();
        let mut tank = Dataset::new("tank".into(), None, DatasetKind::Filesystem, 1);
        tank.children.push("tank/a".into());
        tank.snapshots.push("tank@0".into());
        m.insert("tank".into(), tank);
        m.insert("tank@0".into(),
                 Dataset::new("tank@0".into(), Some("tank".into()), DatasetKind::Snapshot, 0));

        let mut a = Dataset::new("tank/a".into(), Some("tank".into()), DatasetKind::Filesystem, 2);
        a.snapshots.push("tank/a@1".into());
        m.insert("tank/a".into(), a);

        let mut snap =
            Dataset::new("tank/a@1".into(), Some("tank/a".into()), DatasetKind::Snapshot, 3);
        snap.clones.push("tank/clone".into());
        m.insert("tank/a@1".into(), snap);

        let mut clone =
            Dataset::new("tank/clone".into(), None, DatasetKind::Filesystem, 4);
        clone.origin = Some("tank/a@1".into());
        m.insert("tank/clone".into(), clone);
        m
    }

    #[test]
    fn descends_through_children_and_snapshots() {
        let m = fixture();
        let names = iter_descendants(&m, "tank", DatasetTypes::ALL).unwrap();
        assert_eq!(vec!["tank", "tank@0", "tank/a", "tank/a@1"],
                   names.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn own_snapshots_precede_child_filesystems() {
        let m = fixture();
        let names = iter_descendants(&m, "tank", DatasetTypes::ALL).unwrap();
        let snap_idx = names.iter().position(|n| n == "tank@0").unwrap();
        let child_idx = names.iter().position(|n| n == "tank/a").unwrap();
        assert!(snap_idx < child_idx, "own snapshots must be visited before child filesystems");
    }

    #[test]
    fn clones_flag_follows_snapshot_to_clone_edge() {
        let m = fixture();
        let names =
            iter_descendants(&m, "tank", DatasetTypes::ALL | DatasetTypes::CLONES).unwrap();
        assert!(names.contains(&"tank/clone".to_owned()));
    }

    #[test]
    fn clones_alone_is_rejected() {
        let m = fixture();
        assert!(iter_descendants(&m, "tank", DatasetTypes::CLONES).is_err());
    }

    #[test]
    fn filesystem_only_filters_snapshots_but_still_descends() {
        let m = fixture();
        let names = iter_descendants(&m, "tank", DatasetTypes::FILESYSTEM).unwrap();
        assert_eq!(vec!["tank", "tank/a"], names.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn two_phase_runs_all_checks_before_any_do() {
        let order = vec!["a".to_owned(), "b".to_owned()];
        let mut log = Vec::new();
        two_phase(&order,
                  |n| {
                      log.push(format!("check:{}", n));
                      Ok(())
                  },
                  |n| {
                      log.push(format!("do:{}", n));
                      Ok(())
                  })
            .unwrap();
        assert_eq!(vec!["check:a", "check:b", "do:a", "do:b"], log);
    }

    #[test]
    fn two_phase_does_no_do_work_if_any_check_fails() {
        let order = vec!["a".to_owned(), "b".to_owned()];
        let mut did_any = false;
        let result = two_phase(&order,
                                |n| {
                                    if n == "b" {
                                        Err(Error::InvalidArgument("nope".into()))
                                    } else {
                                        Ok(())
                                    }
                                },
                                |_| {
                                    did_any = true;
                                    Ok(())
                                });
        assert!(result.is_err());
        assert!(!did_any);
    }
}
