//! End-to-end scenarios against the callback façade, run through the public
//! `zfs_mock::facade` API the way a real consumer would, rather than through
//! `Engine` directly. `#[serial]` here for the same reason `facade.rs`'s own
//! unit tests need it: every test drives the shared `Engine::global()`
//! singleton.
use serial_test::serial;
use std::{cell::RefCell, collections::HashMap, rc::Rc};
use zfs_mock::{engine::Engine,
               facade::{zfs, zpool, Callback, FacadeError},
               slog::{self, *}};

// Only used for debugging.
#[allow(dead_code)]
fn get_logger() -> Logger {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    Logger::root(slog_term::FullFormat::new(plain).use_original_order().build().fuse(), o!())
}

fn capture<T: 'static>() -> (Callback<T>, Rc<RefCell<Option<(Option<FacadeError>, Option<T>)>>>) {
    let slot = Rc::new(RefCell::new(None));
    let slot2 = slot.clone();
    let cb: Callback<T> = Box::new(move |err, ok| *slot2.borrow_mut() = Some((err, ok)));
    (cb, slot)
}

fn take<T>(slot: &Rc<RefCell<Option<(Option<FacadeError>, Option<T>)>>>)
-> (Option<FacadeError>, Option<T>) {
    slot.borrow_mut().take().unwrap()
}

#[test]
#[serial]
fn zpool_status_reports_online_then_unknown_after_destroy() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, _) = capture();
    zpool::create("tank", &HashMap::new(), cb);

    let (cb, slot) = capture();
    zpool::status("tank", cb);
    let (err, status) = take(&slot);
    assert!(err.is_none());
    assert_eq!("ONLINE", status.unwrap());

    let (cb, _) = capture();
    zpool::destroy("tank", cb);

    let (cb, slot) = capture();
    zpool::status("tank", cb);
    let (err, status) = take(&slot);
    assert!(err.is_none());
    assert_eq!("UNKNOWN", status.unwrap());
}

#[test]
#[serial]
fn zpool_destroy_missing_pool_reports_no_such_pool() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, slot) = capture();
    zpool::destroy("ghost", cb);
    let (err, _) = take(&slot);
    assert!(err.unwrap().0.contains("no such pool"));
}

#[test]
#[serial]
fn zfs_snapshot_of_missing_dataset_reports_does_not_exist() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, slot) = capture();
    zfs::snapshot("ghost@snap1", cb);
    let (err, _) = take(&slot);
    assert!(err.unwrap().0.contains("dataset does not exist"));
}

#[test]
#[serial]
fn zfs_snapshot_empty_name_reports_delimiter_error() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, _) = capture();
    zpool::create("tank", &HashMap::new(), cb);

    let (cb, slot) = capture();
    zfs::snapshot("tank@", cb);
    let (err, _) = take(&slot);
    assert!(err.unwrap().0.contains("misplaced '@'"));
}

#[test]
#[serial]
fn zfs_clone_rejects_at_sign_in_target_name() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, _) = capture();
    zpool::create("tank", &HashMap::new(), cb);
    let (cb, _) = capture();
    zfs::snapshot("tank@snap1", cb);

    let (cb, slot) = capture();
    zfs::clone("tank@snap1", "tank@bad", None, cb);
    let (err, _) = take(&slot);
    assert!(err.unwrap().0.contains("is not expected here"));
}

#[test]
#[serial]
fn zfs_get_roundtrips_a_set_property() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, _) = capture();
    zpool::create("tank", &HashMap::new(), cb);

    let mut props = HashMap::new();
    props.insert("compression".to_owned(), "on".to_owned());
    let (cb, slot) = capture();
    zfs::set("tank", &props, cb);
    assert!(take(&slot).0.is_none());

    let (cb, slot) = capture();
    zfs::get("tank", &["compression"], true, cb);
    let (err, rows) = take(&slot);
    assert!(err.is_none());
    assert_eq!(vec![("tank".to_owned(), "compression".to_owned(), "on".to_owned())], rows.unwrap());
}

#[test]
#[serial]
fn zfs_get_with_parseable_false_is_not_implemented() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, _) = capture();
    zpool::create("tank", &HashMap::new(), cb);

    let (cb, slot) = capture();
    zfs::get("tank", &["compression"], false, cb);
    let (err, _) = take(&slot);
    assert!(err.unwrap().0.contains("not implemented"));
}

#[test]
#[serial]
fn zfs_send_receive_rollback_upgrade_are_not_implemented() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, slot) = capture();
    zfs::send("tank@snap1", cb);
    assert!(take(&slot).0.unwrap().0.contains("not implemented"));

    let (cb, slot) = capture();
    zfs::receive("tank", &[], cb);
    assert!(take(&slot).0.unwrap().0.contains("not implemented"));

    let (cb, slot) = capture();
    zfs::rollback("tank@snap1", cb);
    assert!(take(&slot).0.unwrap().0.contains("not implemented"));

    let (cb, slot) = capture();
    zfs::upgrade("tank", cb);
    assert!(take(&slot).0.unwrap().0.contains("not implemented"));

    let (cb, slot) = capture();
    zpool::upgrade(cb);
    assert!(take(&slot).0.unwrap().0.contains("not implemented"));

    let (cb, slot) = capture();
    zpool::list_disks(cb);
    assert!(take(&slot).0.unwrap().0.contains("not implemented"));
}

#[test]
#[serial]
fn zfs_holds_lists_tags_sorted() {
    let mut e = Engine::global();
    e.reset();
    drop(e);

    let (cb, _) = capture();
    zpool::create("tank", &HashMap::new(), cb);
    let (cb, _) = capture();
    zfs::snapshot("tank@snap1", cb);
    let (cb, _) = capture();
    zfs::hold("tank@snap1", "zebra", cb);
    let (cb, _) = capture();
    zfs::hold("tank@snap1", "alpha", cb);

    let (cb, slot) = capture();
    zfs::holds("tank@snap1", cb);
    let (err, tags) = take(&slot);
    assert!(err.is_none());
    assert_eq!(vec!["alpha".to_owned(), "zebra".to_owned()], tags.unwrap());
}
