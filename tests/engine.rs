//! Engine-level integration tests against the shared [`zfs_mock::Engine`]
//! singleton, exercising whole-graph scenarios (multi-dataset trees,
//! recursive operations, inheritance) rather than one operation at a time.
//! Each test calls `reset()` first since there's no kernel pool to set up
//! once and reuse.
use serial_test::serial;
use std::{collections::HashMap, path::Path};
use zfs_mock::{engine::Engine,
               ops::{CloneOptions, DestroyOptions, MountOptions, SnapshotOptions},
               DatasetKind};

fn fresh() -> std::sync::MutexGuard<'static, Engine> {
    let mut e = Engine::global();
    e.reset();
    e
}

#[test]
#[serial]
fn mount_create_snapshot_clone_round_trips_file_content() {
    let mut e = fresh();
    e.create(None, "test123", DatasetKind::Filesystem, &HashMap::new()).unwrap();

    e.create(Some("test123"), "fs1", DatasetKind::Filesystem, &HashMap::new()).unwrap();
    e.fs_mut().write_file(Path::new("/test123/fs1/file1"), 0o644, b"original bytes").unwrap();

    let snap_opts = SnapshotOptions::builder().build().unwrap();
    e.snapshot("test123/fs1", "snap1", &snap_opts, &HashMap::new()).unwrap();

    let clone_opts = CloneOptions::builder().build().unwrap();
    e.clone_snapshot("test123/fs1@snap1", "test123/fs2", &clone_opts, &HashMap::new()).unwrap();
    let mount_opts = MountOptions::builder().build().unwrap();
    e.mount("test123/fs2", &mount_opts).unwrap();

    assert_eq!(b"original bytes".to_vec(),
               e.fs().read_file(Path::new("/test123/fs2/file1")).unwrap());

    e.rename("test123/fs2", "test123/fs2a").unwrap();
    assert_eq!(b"original bytes".to_vec(),
               e.fs().read_file(Path::new("/test123/fs2a/file1")).unwrap());
    assert!(e.fs().read_file(Path::new("/test123/fs2/file1")).is_err());
}

#[test]
#[serial]
fn overwrite_after_snapshot_leaves_origin_equal_to_archive() {
    let mut e = fresh();
    e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
    e.fs_mut().write_file(Path::new("/tank/data"), 0o644, b"v1").unwrap();

    let snap_opts = SnapshotOptions::builder().build().unwrap();
    e.snapshot("tank", "snap1", &snap_opts, &HashMap::new()).unwrap();

    e.fs_mut().write_file(Path::new("/tank/data"), 0o644, b"v2").unwrap();

    let clone_opts = CloneOptions::builder().build().unwrap();
    e.clone_snapshot("tank@snap1", "clone1", &clone_opts, &HashMap::new()).unwrap();
    let mount_opts = MountOptions::builder().build().unwrap();
    e.mount("clone1", &mount_opts).unwrap();

    let destroy_opts = DestroyOptions::builder().build().unwrap();
    e.destroy("clone1", &destroy_opts).unwrap();

    assert_eq!(b"v2".to_vec(), e.fs().read_file(Path::new("/tank/data")).unwrap());
}

#[test]
#[serial]
fn iter_descendants_visits_every_dataset_once_through_a_clone_cycle() {
    let mut e = fresh();
    e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
    let snap_opts = SnapshotOptions::builder().build().unwrap();
    e.snapshot("tank", "snap1", &snap_opts, &HashMap::new()).unwrap();
    let clone_opts = CloneOptions::builder().build().unwrap();
    e.clone_snapshot("tank@snap1", "clone1", &clone_opts, &HashMap::new()).unwrap();
    e.snapshot("clone1", "snap2", &snap_opts, &HashMap::new()).unwrap();

    let names = zfs_mock::walk::iter_descendants(e.datasets(), "tank",
                                                  zfs_mock::walk::DatasetTypes::ALL
                                                  | zfs_mock::walk::DatasetTypes::CLONES)
        .unwrap();
    let unique: std::collections::HashSet<&String> = names.iter().collect();
    assert_eq!(names.len(), unique.len());
    assert!(names.contains(&"clone1".to_owned()));
    assert!(names.contains(&"clone1@snap2".to_owned()));
}

#[test]
#[serial]
fn setting_mountpoint_unmounts_and_remounts_at_the_new_path() {
    let mut e = fresh();
    e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
    e.fs_mut().write_file(Path::new("/tank/file1"), 0o644, b"payload").unwrap();

    e.set_property("tank", "mountpoint", "/elsewhere").unwrap();

    assert!(e.get("tank").unwrap().mounted());
    assert!(e.mount_table().contains_key("/elsewhere"));
    assert!(!e.mount_table().contains_key("/tank"));
    assert_eq!(b"payload".to_vec(), e.fs().read_file(Path::new("/elsewhere/file1")).unwrap());
}

#[test]
#[serial]
fn destroy_subtree_leaves_the_rest_of_the_graph_untouched() {
    let mut e = fresh();
    e.create(None, "tank", DatasetKind::Filesystem, &HashMap::new()).unwrap();
    e.create(Some("tank"), "keep", DatasetKind::Filesystem, &HashMap::new()).unwrap();
    e.create(Some("tank"), "gone", DatasetKind::Filesystem, &HashMap::new()).unwrap();

    let destroy_opts = DestroyOptions::builder().build().unwrap();
    e.destroy("tank/gone", &destroy_opts).unwrap();

    assert!(e.get("tank/keep").unwrap().is_active());
    assert_eq!(vec!["tank/keep".to_owned()], e.get("tank").unwrap().children().to_owned());
    assert_eq!(zfs_mock::dataset::DatasetState::Destroyed, *e.get("tank/gone").unwrap().state());
}
