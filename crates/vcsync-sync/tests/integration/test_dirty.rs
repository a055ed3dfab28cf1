//! Dirty indicator computation, caching and propagation

use vcsync_core::domain::{DirtyIndicator, Resource, ResourceSyncInfo};

use crate::common::{base_time, file_record, later_time, path, Fixture};

fn managed_tree(fx: &Fixture) {
    fx.managed_folder("proj", None);
    fx.managed_folder("proj/src", None);
    fx.entries("proj", &[ResourceSyncInfo::folder("src").unwrap()]);
    fx.entries("proj/src", &[file_record("a.c", "1.1"), file_record("b.c", "1.4")]);
    fx.clean_file("proj/src/a.c");
    fx.clean_file("proj/src/b.c");
}

#[test]
fn test_unknown_count_scans_once() {
    let fx = Fixture::new();
    managed_tree(&fx);
    let mut coord = fx.coordinator();
    let src = Resource::Folder(path("proj/src"));

    assert_eq!(coord.dirty_indicator(&src).unwrap(), DirtyIndicator::Clean);
    assert_eq!(coord.dirty_scans(), 1);

    assert_eq!(coord.dirty_indicator(&src).unwrap(), DirtyIndicator::Clean);
    assert_eq!(coord.dirty_scans(), 1);
}

#[test]
fn test_modified_file_marks_ancestors_dirty() {
    let fx = Fixture::new();
    managed_tree(&fx);
    fx.wc.touch("proj/src/b.c", later_time());
    let mut coord = fx.coordinator();

    assert!(!coord.is_modified(&Resource::File(path("proj/src/a.c"))).unwrap());
    assert!(coord.is_modified(&Resource::File(path("proj/src/b.c"))).unwrap());
    assert_eq!(
        coord.peek_dirty_indicator(&path("proj/src")),
        DirtyIndicator::Dirty
    );
    assert_eq!(coord.peek_dirty_indicator(&path("proj")), DirtyIndicator::Dirty);
    assert_eq!(
        coord.dirty_indicator(&Resource::Folder(path("proj"))).unwrap(),
        DirtyIndicator::Dirty
    );
    assert_eq!(coord.dirty_scans(), 0);
}

#[test]
fn test_set_dirty_propagation_is_asymmetric() {
    let fx = Fixture::new();
    managed_tree(&fx);
    let mut coord = fx.coordinator();
    let src = Resource::Folder(path("proj/src"));
    let a = Resource::File(path("proj/src/a.c"));

    assert_eq!(coord.dirty_indicator(&src).unwrap(), DirtyIndicator::Clean);
    let scans = coord.dirty_scans();

    coord.set_dirty(&a, DirtyIndicator::Dirty).unwrap();
    assert_eq!(coord.peek_dirty_indicator(&path("proj/src")), DirtyIndicator::Dirty);
    assert_eq!(coord.peek_dirty_indicator(&path("proj")), DirtyIndicator::Dirty);
    // the cached count answers without a scan
    assert_eq!(coord.dirty_indicator(&src).unwrap(), DirtyIndicator::Dirty);
    assert_eq!(coord.dirty_scans(), scans);

    coord.set_dirty(&a, DirtyIndicator::Clean).unwrap();
    assert_eq!(
        coord.peek_dirty_indicator(&path("proj/src")),
        DirtyIndicator::NeedsRecompute
    );
    assert_eq!(
        coord.peek_dirty_indicator(&path("proj")),
        DirtyIndicator::NeedsRecompute
    );
    assert_eq!(coord.dirty_indicator(&src).unwrap(), DirtyIndicator::Clean);
    assert_eq!(coord.dirty_scans(), scans + 1);
}

#[test]
fn test_unmanaged_file_is_dirty_unless_ignored() {
    let fx = Fixture::new();
    managed_tree(&fx);
    fx.clean_file("proj/src/new.c");
    fx.clean_file("proj/src/new.o");
    let mut coord = fx.coordinator();

    assert_eq!(
        coord
            .dirty_indicator(&Resource::File(path("proj/src/new.c")))
            .unwrap(),
        DirtyIndicator::Dirty
    );
    assert_eq!(
        coord
            .dirty_indicator(&Resource::File(path("proj/src/new.o")))
            .unwrap(),
        DirtyIndicator::Clean
    );
    assert_eq!(
        coord.dirty_indicator(&Resource::Folder(path("proj"))).unwrap(),
        DirtyIndicator::Dirty
    );
}

#[test]
fn test_missing_managed_file_is_dirty() {
    let fx = Fixture::new();
    managed_tree(&fx);
    fx.wc.remove("proj/src/a.c");
    let mut coord = fx.coordinator();

    assert_eq!(
        coord.dirty_indicator(&Resource::Folder(path("proj/src"))).unwrap(),
        DirtyIndicator::Dirty
    );
}

#[test]
fn test_folder_cannot_be_marked_clean_with_dirty_child() {
    let fx = Fixture::new();
    managed_tree(&fx);
    fx.wc.touch("proj/src/a.c", later_time());
    let mut coord = fx.coordinator();

    assert!(!coord.set_folder_modified(&path("proj/src"), false).unwrap());

    fx.wc.touch("proj/src/a.c", base_time());
    coord.flush(&path("proj/src"), false).unwrap();
    assert!(coord.set_folder_modified(&path("proj/src"), false).unwrap());
    assert_eq!(coord.peek_dirty_indicator(&path("proj/src")), DirtyIndicator::Clean);
}

#[test]
fn test_record_change_invalidates_cached_state() {
    let fx = Fixture::new();
    managed_tree(&fx);
    let mut coord = fx.coordinator();
    let a = Resource::File(path("proj/src/a.c"));
    assert_eq!(coord.dirty_indicator(&a).unwrap(), DirtyIndicator::Clean);

    coord
        .set_resource_sync(&a, &file_record("a.c", "1.1").to_deletion())
        .unwrap();
    assert_eq!(coord.peek_dirty_indicator(a.path()), DirtyIndicator::NeedsRecompute);
    assert_eq!(coord.dirty_indicator(&a).unwrap(), DirtyIndicator::Dirty);
}
