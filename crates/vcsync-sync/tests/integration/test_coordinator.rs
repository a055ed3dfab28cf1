//! Transactions, persistence failures and lifecycle hooks

use std::sync::Arc;

use vcsync_core::domain::{DirtyIndicator, KeywordMode, Resource, ResourceSyncInfo};
use vcsync_core::ports::ISyncStore;
use vcsync_sync::SyncError;

use crate::common::{base_time, file_record, later_time, path, Fixture, RecordingListener};

#[test]
fn test_nested_operations_commit_once() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.1"), file_record("b.c", "1.1")]);
    fx.clean_file("proj/a.c");
    fx.clean_file("proj/b.c");

    let listener = Arc::new(RecordingListener::default());
    let mut coord = fx.coordinator();
    coord.add_listener(listener.clone());
    let writes_before = fx.store.entries_writes();

    coord.begin_operation();
    coord
        .set_resource_sync(&Resource::File(path("proj/a.c")), &file_record("a.c", "1.2"))
        .unwrap();
    coord.begin_operation();
    coord
        .set_resource_sync(&Resource::File(path("proj/b.c")), &file_record("b.c", "1.2"))
        .unwrap();
    coord.end_operation().unwrap();
    assert_eq!(fx.store.entries_writes(), writes_before);
    assert_eq!(coord.commit_count(), 0);
    assert!(coord.in_operation());
    coord.end_operation().unwrap();

    assert!(!coord.in_operation());
    assert_eq!(coord.commit_count(), 1);
    assert_eq!(fx.store.entries_writes(), writes_before + 1);

    let batches = listener.batches();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].contains(&Resource::File(path("proj/a.c"))));
    assert!(batches[0].contains(&Resource::File(path("proj/b.c"))));

    let lines = fx.store.entry_lines(&path("proj")).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line.contains("/1.2/")));
}

#[test]
fn test_unbalanced_end_operation_fails() {
    let fx = Fixture::new();
    let mut coord = fx.coordinator();
    assert!(matches!(
        coord.end_operation(),
        Err(SyncError::CacheInconsistency(_))
    ));
}

#[test]
fn test_read_only_operation_does_not_commit() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.1")]);
    fx.clean_file("proj/a.c");
    let mut coord = fx.coordinator();

    let record = coord.resource_sync(&path("proj/a.c")).unwrap().unwrap();
    assert_eq!(record.revision(), "1.1");
    assert_eq!(coord.commit_count(), 0);
}

#[test]
fn test_partial_commit_failure_is_aggregated() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.managed_folder("proj/a", None);
    fx.managed_folder("proj/b", None);
    fx.entries(
        "proj",
        &[
            ResourceSyncInfo::folder("a").unwrap(),
            ResourceSyncInfo::folder("b").unwrap(),
        ],
    );
    fx.clean_file("proj/a/x.c");
    fx.clean_file("proj/b/y.c");
    fx.store.set_failing(&path("proj/a"), true);

    let mut coord = fx.coordinator();
    coord.begin_operation();
    coord
        .set_resource_sync(&Resource::File(path("proj/a/x.c")), &file_record("x.c", "1.1"))
        .unwrap();
    coord
        .set_resource_sync(&Resource::File(path("proj/b/y.c")), &file_record("y.c", "1.1"))
        .unwrap();
    let err = coord.end_operation().unwrap_err();

    match err {
        SyncError::Aggregate(failures) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(
                &failures[0],
                SyncError::PersistenceFailure { folder, .. } if *folder == path("proj/a")
            ));
        }
        other => panic!("expected an aggregate error, got {other}"),
    }

    // the healthy folder was written, the failed one reloads from the store
    assert_eq!(fx.store.entry_lines(&path("proj/b")).unwrap().len(), 1);
    assert_eq!(coord.resource_sync(&path("proj/a/x.c")).unwrap(), None);
    assert_eq!(
        coord.resource_sync(&path("proj/b/y.c")).unwrap(),
        Some(file_record("y.c", "1.1"))
    );
}

#[test]
fn test_locked_entries_fall_back_to_single_record() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.3"), file_record("b.c", "1.2")]);
    fx.clean_file("proj/a.c");
    fx.store.set_locked(&path("proj"), true);

    let mut coord = fx.coordinator();
    let present = coord.resource_sync(&path("proj/a.c")).unwrap().unwrap();
    assert_eq!(present.revision(), "1.3");
    assert!(!present.is_deleted());

    let missing = coord.resource_sync(&path("proj/b.c")).unwrap().unwrap();
    assert!(missing.is_deleted());
    assert_eq!(missing.entry_revision(), "-1.2");

    assert_eq!(
        coord.members(&path("proj")).unwrap(),
        vec![Resource::File(path("proj/a.c"))]
    );
    assert_eq!(fx.store.bulk_reads(), 0);

    fx.store.set_locked(&path("proj"), false);
    assert_eq!(
        coord.members(&path("proj")).unwrap(),
        vec![
            Resource::File(path("proj/a.c")),
            Resource::File(path("proj/b.c")),
        ]
    );
}

#[test]
fn test_record_for_root_is_rejected() {
    let fx = Fixture::new();
    let mut coord = fx.coordinator();
    let root = Resource::Folder(path(""));
    let err = coord
        .set_sync_bytes(&root, ResourceSyncInfo::folder("x").unwrap().to_bytes())
        .unwrap_err();
    assert!(matches!(err, SyncError::NotVersioned(_)));
}

#[test]
fn test_record_name_must_match_resource() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.clean_file("proj/a.c");
    let mut coord = fx.coordinator();
    let err = coord
        .set_resource_sync(&Resource::File(path("proj/a.c")), &file_record("b.c", "1.1"))
        .unwrap_err();
    assert!(matches!(err, SyncError::Domain(_)));
}

#[test]
fn test_delete_folder_sync_removes_metadata() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.managed_folder("proj/lib", None);
    fx.entries("proj", &[ResourceSyncInfo::folder("lib").unwrap()]);
    fx.entries("proj/lib", &[file_record("util.c", "1.1")]);
    fx.clean_file("proj/lib/util.c");

    let mut coord = fx.coordinator();
    coord.delete_folder_sync(&path("proj/lib")).unwrap();

    assert_eq!(coord.folder_sync(&path("proj/lib")).unwrap(), None);
    assert_eq!(fx.store.folder_deletes(), 1);
    assert_eq!(fx.store.read_folder_sync(&path("proj/lib")).unwrap(), None);
    assert_eq!(coord.resource_sync(&path("proj/lib/util.c")).unwrap(), None);
}

#[test]
fn test_deletion_and_recreation_cycle() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.1")]);
    fx.clean_file("proj/a.c");
    let a = Resource::File(path("proj/a.c"));

    let mut coord = fx.coordinator();
    coord.prepare_for_deletion(&a).unwrap();
    fx.wc.remove("proj/a.c");
    coord.handle_deleted(&a).unwrap();

    let deleted = coord.resource_sync(a.path()).unwrap().unwrap();
    assert!(deleted.is_deleted());
    assert_eq!(deleted.entry_revision(), "-1.1");
    assert!(coord.was_phantom(a.path()));
    assert!(fx.store.entry_lines(&path("proj")).unwrap()[0].starts_with("/a.c/-1.1/"));

    fx.wc.add_file("proj/a.c", later_time());
    coord.handle_added(&a).unwrap();

    let restored = coord.resource_sync(a.path()).unwrap().unwrap();
    assert!(!restored.is_deleted());
    assert_eq!(restored.revision(), "1.1");
    assert!(!coord.was_phantom(a.path()));
    assert!(fx.store.entry_lines(&path("proj")).unwrap()[0].starts_with("/a.c/1.1/"));
    // new content on disk
    assert!(coord.is_modified(&a).unwrap());
}

#[test]
fn test_deleting_an_addition_forgets_it() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.clean_file("proj/new.c");
    let new = Resource::File(path("proj/new.c"));

    let mut coord = fx.coordinator();
    let addition = ResourceSyncInfo::new_addition("new.c", KeywordMode::text(), None).unwrap();
    coord.set_resource_sync(&new, &addition).unwrap();

    coord.prepare_for_deletion(&new).unwrap();
    fx.wc.remove("proj/new.c");
    coord.handle_deleted(&new).unwrap();

    assert_eq!(coord.resource_sync(new.path()).unwrap(), None);
    assert!(fx.store.entry_lines(&path("proj")).unwrap().is_empty());
}

#[test]
fn test_added_ignore_pattern_is_persisted() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.wc.add_file("proj/build.log", base_time());
    let listener = Arc::new(RecordingListener::default());
    let mut coord = fx.coordinator();
    coord.add_listener(listener.clone());
    let log = Resource::File(path("proj/build.log"));

    assert!(!coord.is_ignored(log.path()).unwrap());
    assert_eq!(coord.dirty_indicator(&log).unwrap(), DirtyIndicator::Dirty);

    coord.add_ignored(&path("proj"), "*.log").unwrap();
    assert!(coord.is_ignored(log.path()).unwrap());
    assert_eq!(
        fx.store.read_ignores(&path("proj")).unwrap(),
        Some(vec!["*.log".to_string()])
    );
    assert_eq!(coord.dirty_indicator(&log).unwrap(), DirtyIndicator::Clean);
    // reported without rewriting any entries
    assert_eq!(listener.batches(), vec![vec![log.clone()]]);
    assert_eq!(fx.store.entries_writes(), 0);
}

#[test]
fn test_global_ignores_apply_everywhere() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.wc.add_file("proj/core", base_time());
    fx.wc.add_file("proj/notes.tmp", base_time());
    let mut coord = fx.coordinator().with_global_ignores(["*.tmp"]);

    assert!(coord.is_ignored(&path("proj/core")).unwrap());
    assert!(coord.is_ignored(&path("proj/notes.tmp")).unwrap());
    assert!(!coord.is_ignored(&path("proj")).unwrap());
    assert!(!coord.is_ignored(&path("proj/missing.tmp")).unwrap());
}

#[test]
fn test_malformed_entry_line_is_skipped() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.store
        .write_entries(
            &path("proj"),
            &[b"/broken/1.1".to_vec(), file_record("b.c", "1.3").to_bytes()],
        )
        .unwrap();
    fx.clean_file("proj/b.c");

    let mut coord = fx.coordinator();
    let b = coord.resource_sync(&path("proj/b.c")).unwrap().unwrap();
    assert_eq!(b.revision(), "1.3");
    assert!(coord.resource_sync(&path("proj/broken")).unwrap().is_none());
}
