//! Reconciliation of remote trees against local records

use vcsync_conflict::{ChangeKind, ConflictResolver, SyncDirection, SyncTransition};
use vcsync_core::domain::{EntryTag, EntryTimestamp, Resource};
use vcsync_sync::{RemoteFile, RemoteFolder, RemoteNode, RemoteTree, RemoteTreeBuilder};

use crate::common::{base_time, file_record, later_time, path, Fixture, REPOSITORY_ROOT};

#[test]
fn test_local_addition_and_deletion_are_outgoing() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries(
        "proj",
        &[file_record("keep.c", "1.1"), file_record("x.txt", "1.4")],
    );
    fx.clean_file("proj/keep.c");
    fx.clean_file("proj/new.txt");

    let mut coord = fx.coordinator();
    let base = RemoteTreeBuilder::build_base_tree(&mut coord, &path("proj"))
        .unwrap()
        .unwrap();
    let resolver = ConflictResolver::default();
    let mut reconciler = vcsync_sync::Reconciler::new(&mut coord, &resolver);

    let plan = reconciler.plan(&path("proj"), Some(&base)).unwrap();
    assert_eq!(plan.len(), 2);
    let added = plan
        .iter()
        .find(|e| e.resource.name() == "new.txt")
        .unwrap();
    assert_eq!(added.classification.direction, SyncDirection::Outgoing);
    assert_eq!(added.classification.change, ChangeKind::Addition);
    let deleted = plan.iter().find(|e| e.resource.name() == "x.txt").unwrap();
    assert_eq!(deleted.classification.change, ChangeKind::Deletion);

    assert_eq!(reconciler.apply(&plan).unwrap(), 2);

    let new = coord.resource_sync(&path("proj/new.txt")).unwrap().unwrap();
    assert!(new.is_added());
    assert_eq!(new.revision(), "0");
    let x = coord.resource_sync(&path("proj/x.txt")).unwrap().unwrap();
    assert!(x.is_deleted());
    assert_eq!(x.entry_revision(), "-1.4");
    assert_eq!(fx.store.entry_lines(&path("proj")).unwrap().len(), 3);
}

#[test]
fn test_in_sync_tree_plans_nothing() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.1")]);
    fx.clean_file("proj/a.c");
    fx.clean_file("proj/a.o");

    let mut coord = fx.coordinator();
    let base = RemoteTreeBuilder::build_base_tree(&mut coord, &path("proj"))
        .unwrap()
        .unwrap();
    let resolver = ConflictResolver::default();
    let plan = vcsync_sync::Reconciler::new(&mut coord, &resolver)
        .reconcile(&path("proj"), Some(&base))
        .unwrap();
    assert!(plan.is_empty());
    assert_eq!(coord.commit_count(), 0);
}

#[test]
fn test_conflict_adopts_remote_revision() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("x.c", "1.4")]);
    fx.wc.add_file("proj/x.c", later_time());

    let mut remote = RemoteTree::new(RemoteFolder::new("proj", "proj/proj", REPOSITORY_ROOT, None));
    let root = remote.root();
    remote
        .insert(root, RemoteNode::File(RemoteFile::new("x.c", Some("1.5".into()))))
        .unwrap();

    let mut coord = fx.coordinator();
    let resolver = ConflictResolver::default();
    let plan = vcsync_sync::Reconciler::new(&mut coord, &resolver)
        .reconcile(&path("proj"), Some(&remote))
        .unwrap();

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].classification.direction, SyncDirection::Conflicting);
    let x = Resource::File(path("proj/x.c"));
    let record = coord.resource_sync(x.path()).unwrap().unwrap();
    assert_eq!(record.revision(), "1.5");
    assert_eq!(record.timestamp(), &EntryTimestamp::At(base_time()));
    assert!(coord.is_modified(&x).unwrap());
}

#[test]
fn test_remote_change_is_deferred() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.1")]);
    fx.clean_file("proj/a.c");

    let mut remote = RemoteTree::new(RemoteFolder::new("proj", "proj/proj", REPOSITORY_ROOT, None));
    let root = remote.root();
    remote
        .insert(root, RemoteNode::File(RemoteFile::new("a.c", Some("1.2".into()))))
        .unwrap();

    let mut coord = fx.coordinator();
    let resolver = ConflictResolver::default();
    let mut reconciler = vcsync_sync::Reconciler::new(&mut coord, &resolver);
    let plan = reconciler.plan(&path("proj"), Some(&remote)).unwrap();

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].classification.direction, SyncDirection::Incoming);
    assert_eq!(plan[0].transition, SyncTransition::DeferToUpdate);
    assert_eq!(reconciler.apply(&plan).unwrap(), 0);
    assert_eq!(
        coord.resource_sync(&path("proj/a.c")).unwrap().unwrap().revision(),
        "1.1"
    );
}

#[test]
fn test_remote_only_folder_inherits_parent_tag() {
    let fx = Fixture::new();
    let stable = EntryTag::Branch("stable".into());
    fx.managed_folder("proj", Some(stable.clone()));

    let mut remote = RemoteTree::new(RemoteFolder::new(
        "proj",
        "proj/proj",
        REPOSITORY_ROOT,
        Some(stable.clone()),
    ));
    let root = remote.root();
    remote
        .insert(
            root,
            RemoteNode::Folder(RemoteFolder::new("lib", "proj/proj/lib", REPOSITORY_ROOT, None)),
        )
        .unwrap();

    let mut coord = fx.coordinator();
    let resolver = ConflictResolver::default();
    let plan = vcsync_sync::Reconciler::new(&mut coord, &resolver)
        .reconcile(&path("proj"), Some(&remote))
        .unwrap();

    assert_eq!(plan.len(), 1);
    let SyncTransition::SetFolderSync(info) = &plan[0].transition else {
        panic!("expected a folder mapping, got {:?}", plan[0].transition);
    };
    assert_eq!(info.repository(), "proj/proj/lib");
    assert_eq!(info.tag(), Some(&stable));

    let mapped = coord.folder_sync(&path("proj/lib")).unwrap().unwrap();
    assert_eq!(mapped.tag(), Some(&stable));
    let lines = fx.store.entry_lines(&path("proj")).unwrap();
    assert!(lines.iter().any(|line| line.starts_with("D/lib/")));
}

#[test]
fn test_unmanaged_root_cannot_be_reconciled() {
    let fx = Fixture::new();
    fx.wc.add_folder("loose");
    let mut coord = fx.coordinator();
    let resolver = ConflictResolver::default();
    let err = vcsync_sync::Reconciler::new(&mut coord, &resolver)
        .plan(&path("loose"), None)
        .unwrap_err();
    assert!(matches!(err, vcsync_sync::SyncError::NotVersioned(_)));
}
