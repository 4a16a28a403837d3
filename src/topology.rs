//! Disk-layout planner: an independent pure function over a disk inventory,
//! run in the opposite direction from a `zpool create` argument builder:
//! instead of turning an already-decided topology into CLI arguments, this
//! module looks at an inventory of raw disks and decides the topology. It
//! never touches [`crate::engine`]: a plan is a value, not a mutation.
use std::collections::BTreeMap;

/// One disk as reported by whatever inventories the host (`zpool
/// listDisks`'s raw material, not its output).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInfo {
    pub name: String,
    pub vid: String,
    pub pid: String,
    /// Capacity in megabytes.
    pub size_mb: u64,
    #[allow(dead_code)]
    pub kind: String,
    pub removable: bool,
    pub solid_state: bool,
}

impl DiskInfo {
    pub fn new(name: impl Into<String>, size_mb: u64, solid_state: bool) -> Self {
        DiskInfo { name: name.into(),
                   vid: String::new(),
                   pid: String::new(),
                   size_mb,
                   kind: String::new(),
                   removable: false,
                   solid_state }
    }
}

/// `single|mirror|raidz2`, matching [`crate::error::ErrorKind::Unimplemented`]
/// territory for anything this planner doesn't know: there's no `raidz`/
/// `raidz3` here because the planner never chooses them and callers can't
/// ask for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Single,
    Mirror,
    RaidZ2,
}

impl LayoutKind {
    /// `single` for 1 disk, `mirror` for <= 16, `raidz2` otherwise.
    pub fn auto_choose(storage_disk_count: usize) -> LayoutKind {
        match storage_disk_count {
            0 | 1 => LayoutKind::Single,
            n if n <= 16 => LayoutKind::Mirror,
            _ => LayoutKind::RaidZ2,
        }
    }
}

/// A single vdev in the produced plan: disks identified by name rather than
/// by [`std::path::PathBuf`], since the planner's inventory has no paths,
/// only the `{name, vid, pid, ...}` tuple this inventory shape specifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdevPlan {
    SingleDisk(String),
    Mirror(Vec<String>),
    RaidZ2(Vec<String>),
}

impl VdevPlan {
    pub fn disks(&self) -> Vec<&str> {
        match self {
            VdevPlan::SingleDisk(d) => vec![d.as_str()],
            VdevPlan::Mirror(ds) | VdevPlan::RaidZ2(ds) => ds.iter().map(String::as_str).collect(),
        }
    }
}

/// The planner's whole output: `{vdevs, capacity, spares?, logs?, cache?}`.
/// `spares` is always empty: the first-four-SSDs rule only
/// distributes disks across `storage`/`slog`/`cache`, it never designates a
/// hot spare, and nothing else in this inventory shape implies one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub vdevs: Vec<VdevPlan>,
    pub capacity_mb: u64,
    pub spares: Vec<String>,
    pub logs: Vec<VdevPlan>,
    pub cache: Vec<String>,
}

/// Rounded-capacity buckets, in MB, with a +/-5% acceptance window.
/// A disk outside every window buckets to its own raw size,
/// so wildly nonstandard disks never get lumped in with a threshold class
/// they don't belong to.
const CAPACITY_THRESHOLDS_MB: [u64; 6] = [500_000, 150_000, 80_000, 20_000, 4_500, 1_000];

fn bucket_capacity_mb(size_mb: u64) -> u64 {
    for &threshold in CAPACITY_THRESHOLDS_MB.iter() {
        let window = threshold / 20; // 5%
        if size_mb.abs_diff(threshold) <= window {
            return threshold;
        }
    }
    size_mb
}

/// First-four-SSDs rule: walk the inventory in order, the first two solid
/// state disks become `slog` candidates, the next two become `cache`
/// candidates, and every other disk (spinning or the fifth-and-later SSD)
/// is `storage`.
fn assign_roles(disks: &[DiskInfo]) -> (Vec<&DiskInfo>, Vec<&DiskInfo>, Vec<&DiskInfo>) {
    let mut storage = Vec::new();
    let mut slog = Vec::new();
    let mut cache = Vec::new();
    let mut ssd_seen = 0usize;
    for disk in disks {
        if disk.solid_state {
            if ssd_seen < 2 {
                slog.push(disk);
            } else if ssd_seen < 4 {
                cache.push(disk);
            } else {
                storage.push(disk);
            }
            ssd_seen += 1;
        } else {
            storage.push(disk);
        }
    }
    (storage, slog, cache)
}

/// Group disks by rounded capacity, preserving first-seen order of the
/// buckets so the resulting vdev list stays deterministic across runs with
/// the same inventory.
fn group_by_bucket<'a>(disks: &[&'a DiskInfo]) -> Vec<Vec<&'a DiskInfo>> {
    let mut buckets: BTreeMap<u64, Vec<&DiskInfo>> = BTreeMap::new();
    for disk in disks {
        buckets.entry(bucket_capacity_mb(disk.size_mb)).or_default().push(disk);
    }
    buckets.into_values().collect()
}

/// Turn one capacity-bucketed group of disks into vdevs under `layout`. A
/// `Mirror` group with an odd leftover disk contributes that disk as a
/// trailing `SingleDisk` vdev rather than silently dropping it: single
/// disks are still storage capacity, just unmirrored. A `RaidZ2` group
/// becomes one vdev regardless of its size; this planner doesn't
/// second-guess an undersized group, since `auto_choose` only picks
/// `RaidZ2` once there are more than 16 storage disks, which makes an
/// undersized group a caller-forced case.
fn build_vdevs(groups: Vec<Vec<&DiskInfo>>, layout: LayoutKind) -> Vec<VdevPlan> {
    let mut vdevs = Vec::new();
    for group in groups {
        match layout {
            LayoutKind::Single => {
                for disk in group {
                    vdevs.push(VdevPlan::SingleDisk(disk.name.clone()));
                }
            },
            LayoutKind::Mirror => {
                let mut iter = group.into_iter();
                loop {
                    let pair: Vec<String> = iter.by_ref().take(2).map(|d| d.name.clone()).collect();
                    match pair.len() {
                        2 => vdevs.push(VdevPlan::Mirror(pair)),
                        1 => vdevs.push(VdevPlan::SingleDisk(pair.into_iter().next().unwrap())),
                        _ => break,
                    }
                }
            },
            LayoutKind::RaidZ2 => {
                if !group.is_empty() {
                    vdevs.push(VdevPlan::RaidZ2(group.iter().map(|d| d.name.clone()).collect()));
                }
            },
        }
    }
    vdevs
}

/// Pair up `slog`/`cache` candidates into their own vdevs. Log devices can
/// be mirrored; cache devices cannot, so they're always flattened to single
/// disk names.
fn build_logs(slog: &[&DiskInfo]) -> Vec<VdevPlan> {
    build_vdevs(group_by_bucket(slog), LayoutKind::Mirror)
}

/// Plan a topology for `disks`. `requested` overrides the auto-chosen
/// layout when present; the storage-disk count still drives bucketing and
/// role assignment regardless of which layout ends up applied.
pub fn plan(disks: &[DiskInfo], requested: Option<LayoutKind>) -> LayoutPlan {
    let (storage, slog, cache) = assign_roles(disks);
    let layout = requested.unwrap_or_else(|| LayoutKind::auto_choose(storage.len()));
    let capacity_mb = storage.iter().map(|d| d.size_mb).sum();
    let vdevs = build_vdevs(group_by_bucket(&storage), layout);
    let logs = build_logs(&slog);
    let cache = cache.into_iter().map(|d| d.name.clone()).collect();
    LayoutPlan { vdevs, capacity_mb, spares: Vec::new(), logs, cache }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hdd(name: &str, size_mb: u64) -> DiskInfo { DiskInfo::new(name, size_mb, false) }

    fn ssd(name: &str, size_mb: u64) -> DiskInfo { DiskInfo::new(name, size_mb, true) }

    #[test]
    fn single_disk_auto_chooses_single_layout() {
        let disks = vec![hdd("da0", 500_000)];
        let plan = plan(&disks, None);
        assert_eq!(vec![VdevPlan::SingleDisk("da0".into())], plan.vdevs);
        assert_eq!(500_000, plan.capacity_mb);
    }

    #[test]
    fn small_fleet_auto_chooses_mirror_layout() {
        let disks = vec![hdd("da0", 1_000_000), hdd("da1", 1_000_000)];
        let plan = plan(&disks, None);
        assert_eq!(vec![VdevPlan::Mirror(vec!["da0".into(), "da1".into()])], plan.vdevs);
    }

    #[test]
    fn mirror_layout_leaves_odd_disk_as_single() {
        let disks = vec![hdd("da0", 500_000), hdd("da1", 500_000), hdd("da2", 500_000)];
        let plan = plan(&disks, Some(LayoutKind::Mirror));
        assert_eq!(vec![VdevPlan::Mirror(vec!["da0".into(), "da1".into()]),
                        VdevPlan::SingleDisk("da2".into())],
                   plan.vdevs);
    }

    #[test]
    fn large_fleet_auto_chooses_raidz2_layout() {
        let disks: Vec<DiskInfo> = (0 .. 17).map(|i| hdd(&format!("da{}", i), 500_000)).collect();
        let plan = plan(&disks, None);
        assert_eq!(1, plan.vdevs.len());
        assert!(matches!(plan.vdevs[0], VdevPlan::RaidZ2(_)));
        assert_eq!(17, plan.vdevs[0].disks().len());
    }

    #[test]
    fn raidz2_forced_on_undersized_inventory_still_builds_one_vdev() {
        let disks: Vec<DiskInfo> = (0 .. 3).map(|i| hdd(&format!("da{}", i), 500_000)).collect();
        let plan = plan(&disks, Some(LayoutKind::RaidZ2));
        assert_eq!(1, plan.vdevs.len());
        assert_eq!(3, plan.vdevs[0].disks().len());
    }

    #[test]
    fn raidz2_splits_by_capacity_bucket() {
        let mut disks: Vec<DiskInfo> = (0 .. 6).map(|i| hdd(&format!("da{}", i), 500_000)).collect();
        disks.extend((0 .. 6).map(|i| hdd(&format!("db{}", i), 20_000)));
        let plan = plan(&disks, Some(LayoutKind::RaidZ2));
        assert_eq!(2, plan.vdevs.len());
    }

    #[test]
    fn capacity_bucketing_keeps_distinct_sizes_in_distinct_vdevs() {
        let disks =
            vec![hdd("da0", 500_000), hdd("da1", 500_000), hdd("da2", 20_000), hdd("da3", 20_000)];
        let plan = plan(&disks, Some(LayoutKind::Mirror));
        assert_eq!(2, plan.vdevs.len());
    }

    #[test]
    fn capacity_bucket_accepts_five_percent_window() {
        assert_eq!(500_000, bucket_capacity_mb(512_000));
        assert_eq!(500_000, bucket_capacity_mb(487_600));
        assert_ne!(500_000, bucket_capacity_mb(400_000));
    }

    #[test]
    fn first_four_ssds_rule_fills_slog_then_cache_then_storage() {
        let disks = vec![ssd("s0", 500_000),
                          ssd("s1", 500_000),
                          ssd("s2", 500_000),
                          ssd("s3", 500_000),
                          ssd("s4", 500_000),
                          hdd("da0", 1_000_000)];
        let plan = plan(&disks, Some(LayoutKind::Single));
        assert_eq!(vec!["s4", "da0"],
                   plan.vdevs.iter().flat_map(VdevPlan::disks).collect::<Vec<_>>());
        assert_eq!(vec!["s2", "s3"], plan.cache);
        assert_eq!(1, plan.logs.len());
        assert_eq!(vec!["s0", "s1"], plan.logs[0].disks());
    }

    #[test]
    fn plan_never_assigns_spares() {
        let disks = vec![hdd("da0", 500_000)];
        assert!(plan(&disks, None).spares.is_empty());
    }
}
