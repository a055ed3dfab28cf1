//! Remote tree construction against a scripted connection

use tokio_util::sync::CancellationToken;

use vcsync_core::domain::{EntryTag, ResourceSyncInfo};
use vcsync_core::ports::{
    CompareEvent, CompareOption, CompareResponse, FileClassification, ResponseStatus,
};
use vcsync_conflict::ConflictResolver;
use vcsync_sync::{BuildOptions, Reconciler, RemoteTreeBuilder, SyncError};

use crate::common::{file_record, later_time, path, Fixture, ScriptedConnection};

fn changed(p: &str) -> CompareEvent {
    CompareEvent::File {
        path: p.to_string(),
        classification: FileClassification::RemoteChanged,
    }
}

fn file_event(p: &str, classification: FileClassification) -> CompareEvent {
    CompareEvent::File {
        path: p.to_string(),
        classification,
    }
}

fn rejected(status: ResponseStatus) -> CompareResponse {
    CompareResponse {
        events: Vec::new(),
        status,
    }
}

#[tokio::test]
async fn test_revisions_fetched_in_batches() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    let mut conn = ScriptedConnection::new();
    let names: Vec<String> = (0..1300).map(|i| format!("f{i:04}.c")).collect();
    conn.on_compare(".", CompareResponse::ok(names.iter().map(|n| changed(n)).collect()));
    for name in &names {
        conn.revision(name, "1.2");
    }

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(conn.status_batches, vec![1024, 276]);
    assert_eq!(tree.file_count(), 1300);
    assert!(tree.files().all(|(_, f)| f.revision.as_deref() == Some("1.2")));
    assert!(tree.is_complete());
}

#[tokio::test]
async fn test_unchanged_files_keep_base_revision() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.3"), file_record("b.c", "1.7")]);
    fx.clean_file("proj/a.c");
    fx.clean_file("proj/b.c");
    let mut conn = ScriptedConnection::new();
    conn.on_compare(".", CompareResponse::ok(vec![changed("./b.c")]));
    conn.revision("b.c", "1.8");

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    let a = tree.find("a.c").and_then(|id| tree.file(id)).unwrap();
    let b = tree.find("b.c").and_then(|id| tree.file(id)).unwrap();
    assert_eq!(a.revision.as_deref(), Some("1.3"));
    assert_eq!(b.revision.as_deref(), Some("1.8"));
    assert_eq!(b.classification, Some(FileClassification::RemoteChanged));
    assert_eq!(conn.status_batches, vec![1]);
}

#[tokio::test]
async fn test_remote_deletion_and_new_folder() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("old.c", "1.1"), file_record("keep.c", "1.1")]);
    fx.clean_file("proj/old.c");
    fx.clean_file("proj/keep.c");
    let mut conn = ScriptedConnection::new();
    conn.on_compare(
        ".",
        CompareResponse::ok(vec![
            CompareEvent::File {
                path: "old.c".to_string(),
                classification: FileClassification::RemotelyDeleted,
            },
            CompareEvent::NewDirectory("lib".to_string()),
        ]),
    );
    conn.on_compare("lib", CompareResponse::ok(vec![changed("lib/util.c")]));
    conn.revision("lib/util.c", "1.1");

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    assert!(tree.find("old.c").is_none());
    assert!(tree.find("keep.c").is_some());
    let lib = tree.find("lib").and_then(|id| tree.folder(id)).unwrap();
    assert_eq!(lib.repository, "proj/proj/lib");
    let util = tree.find("lib/util.c").and_then(|id| tree.file(id)).unwrap();
    assert_eq!(util.revision.as_deref(), Some("1.1"));

    let scopes: Vec<&str> = conn.requests.iter().map(|r| r.scope.as_str()).collect();
    assert_eq!(scopes, vec![".", "lib"]);
    assert!(conn
        .requests
        .iter()
        .all(|r| r.do_not_change && r.options.contains(&CompareOption::RetrieveAbsentDirectories)));
}

#[tokio::test]
async fn test_unknown_tag_retried_without_tag_for_folder_only_subtree() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.managed_folder("proj/docs", None);
    fx.entries("proj", &[ResourceSyncInfo::folder("docs").unwrap()]);
    let mut conn = ScriptedConnection::new();
    conn.on_compare(".", rejected(ResponseStatus::NoSuchTag("no such tag".into())));
    conn.on_compare(".", CompareResponse::ok(vec![changed("docs/readme.txt")]));

    let mut coord = fx.coordinator();
    let options = BuildOptions::default().with_tag(Some(EntryTag::Branch("gone".into())));
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, options)
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(conn.requests.len(), 2);
    assert_eq!(
        conn.requests[0].tag(),
        Some(&EntryTag::Branch("gone".into()))
    );
    assert_eq!(conn.requests[1].tag(), None);
    assert!(conn.status_batches.is_empty());

    let readme = tree
        .find("docs/readme.txt")
        .and_then(|id| tree.file(id))
        .unwrap();
    assert_eq!(readme.revision, None);
}

#[tokio::test]
async fn test_unknown_tag_with_local_files_means_root_missing() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.1")]);
    fx.clean_file("proj/a.c");
    let mut conn = ScriptedConnection::new();
    conn.on_compare(".", rejected(ResponseStatus::NoSuchTag("no such tag".into())));

    let mut coord = fx.coordinator();
    let options = BuildOptions::default().with_tag(Some(EntryTag::Version("v1".into())));
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, options)
        .build_tree(&path("proj"))
        .await
        .unwrap();

    assert!(tree.is_none());
    assert_eq!(conn.requests.len(), 1);
}

#[tokio::test]
async fn test_head_tag_clears_sticky_option() {
    let fx = Fixture::new();
    fx.managed_folder("proj", Some(EntryTag::Branch("stable".into())));
    let mut conn = ScriptedConnection::new();

    let mut coord = fx.coordinator();
    let options = BuildOptions::default().with_tag(Some(EntryTag::Head));
    RemoteTreeBuilder::new(&mut coord, &mut conn, options)
        .build_tree(&path("proj"))
        .await
        .unwrap();

    assert!(conn.requests[0].options.contains(&CompareOption::ClearSticky));
    assert_eq!(conn.requests[0].tag(), None);
}

#[tokio::test]
async fn test_server_error_without_events_fails() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    let mut conn = ScriptedConnection::new();
    conn.on_compare(".", rejected(ResponseStatus::ServerError("cannot read".into())));

    let mut coord = fx.coordinator();
    let err = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Protocol { scope, .. } if scope == "proj"));
}

#[tokio::test]
async fn test_failed_root_compare_keeps_local_state() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.3")]);
    fx.clean_file("proj/a.c");
    let mut conn = ScriptedConnection::new();
    conn.on_compare(".", rejected(ResponseStatus::ServerError("cannot read".into())));

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    let a = tree.find("a.c").and_then(|id| tree.file(id)).unwrap();
    assert_eq!(a.revision.as_deref(), Some("1.3"));
    assert_eq!(tree.failures().len(), 1);
    assert_eq!(tree.failures()[0].path, "");
    assert!(conn.status_batches.is_empty());
}

#[tokio::test]
async fn test_failed_new_folder_leaves_partial_tree() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("keep.c", "1.1")]);
    fx.clean_file("proj/keep.c");
    let mut conn = ScriptedConnection::new();
    conn.on_compare(
        ".",
        CompareResponse::ok(vec![
            CompareEvent::NewDirectory("lib".to_string()),
            CompareEvent::NewDirectory("doc".to_string()),
        ]),
    );
    conn.on_compare("lib", rejected(ResponseStatus::ServerError("permission denied".into())));
    conn.on_compare("doc", CompareResponse::ok(vec![changed("doc/guide.txt")]));
    conn.revision("doc/guide.txt", "1.1");

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    assert!(!tree.is_complete());
    assert_eq!(tree.failures().len(), 1);
    assert_eq!(tree.failures()[0].path, "lib");
    let lib = tree.find("lib").unwrap();
    assert!(tree.children(lib).is_empty());
    let guide = tree.find("doc/guide.txt").and_then(|id| tree.file(id)).unwrap();
    assert_eq!(guide.revision.as_deref(), Some("1.1"));
    assert!(tree.find("keep.c").is_some());
}

#[tokio::test]
async fn test_new_folder_ignores_deletion_events() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    let mut conn = ScriptedConnection::new();
    conn.on_compare(".", CompareResponse::ok(vec![CompareEvent::NewDirectory("lib".to_string())]));
    conn.on_compare(
        "lib",
        CompareResponse::ok(vec![
            file_event("lib/x.c", FileClassification::RemotelyDeleted),
            CompareEvent::DirectoryMissing("lib/old".to_string()),
            changed("lib/x.c"),
        ]),
    );
    conn.revision("lib/x.c", "1.2");

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    let lib = tree.find("lib").unwrap();
    assert_eq!(tree.children(lib).len(), 1);
    let x = tree.find("lib/x.c").and_then(|id| tree.file(id)).unwrap();
    assert_eq!(x.revision.as_deref(), Some("1.2"));
}

fn empty_subfolders(fx: &Fixture, conn: &mut ScriptedConnection) {
    fx.managed_folder("proj", None);
    fx.managed_folder("proj/empty", None);
    fx.entries(
        "proj",
        &[ResourceSyncInfo::folder("empty").unwrap(), file_record("a.c", "1.1")],
    );
    fx.clean_file("proj/a.c");
    conn.on_compare(".", CompareResponse::ok(vec![CompareEvent::NewDirectory("gen".to_string())]));
}

#[tokio::test]
async fn test_prune_drops_empty_folders() {
    let fx = Fixture::new();
    let mut conn = ScriptedConnection::new();
    empty_subfolders(&fx, &mut conn);

    let mut coord = fx.coordinator();
    let options = BuildOptions {
        prune_empty: true,
        ..BuildOptions::default()
    };
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, options)
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    assert!(tree.find("empty").is_none());
    assert!(tree.find("gen").is_none());
    assert!(tree.find("a.c").is_some());
    assert_eq!(tree.folder_count(), 1);
}

#[tokio::test]
async fn test_empty_folders_kept_without_prune() {
    let fx = Fixture::new();
    let mut conn = ScriptedConnection::new();
    empty_subfolders(&fx, &mut conn);

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    assert!(tree.find("empty").is_some());
    assert!(tree.find("gen").is_some());
    assert_eq!(tree.folder_count(), 3);
}

#[tokio::test]
async fn test_prune_drops_folders_on_another_tag() {
    let fx = Fixture::new();
    let v2 = EntryTag::Version("v2".into());
    fx.managed_folder("proj", None);
    fx.managed_folder("proj/docs", None);
    fx.managed_folder("proj/src", Some(v2.clone()));
    fx.entries(
        "proj",
        &[
            ResourceSyncInfo::folder("docs").unwrap(),
            ResourceSyncInfo::folder("src").unwrap(),
        ],
    );
    fx.entries("proj/docs", &[file_record("a.txt", "1.1")]);
    fx.entries("proj/src", &[file_record("s.c", "1.1")]);
    fx.clean_file("proj/docs/a.txt");
    fx.clean_file("proj/src/s.c");
    let mut conn = ScriptedConnection::new();
    conn.on_compare(
        ".",
        CompareResponse::ok(vec![
            file_event("docs/a.txt", FileClassification::RemotelyDeleted),
            file_event("src/s.c", FileClassification::RemotelyDeleted),
        ]),
    );

    let mut coord = fx.coordinator();
    let options = BuildOptions {
        prune_empty: true,
        ..BuildOptions::default()
    }
    .with_tag(Some(v2));
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, options)
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    assert!(tree.find("docs").is_none());
    let src = tree.find("src").unwrap();
    assert!(tree.children(src).is_empty());
}

#[tokio::test]
async fn test_remote_file_with_remote_change() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.3")]);
    fx.clean_file("proj/a.c");
    let mut conn = ScriptedConnection::new();
    conn.on_compare("a.c", CompareResponse::ok(vec![changed("a.c")]));
    conn.revision("a.c", "1.4");

    let mut coord = fx.coordinator();
    let file = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_remote_file(&path("proj/a.c"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(file.name, "a.c");
    assert_eq!(file.revision.as_deref(), Some("1.4"));
    assert_eq!(file.classification, Some(FileClassification::RemoteChanged));
    assert_eq!(conn.status_batches, vec![1]);
    assert_eq!(conn.requests[0].scope, "a.c");
}

#[tokio::test]
async fn test_remote_file_unchanged_or_deleted() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.3"), file_record("b.c", "1.1")]);
    fx.clean_file("proj/a.c");
    fx.clean_file("proj/b.c");
    let mut conn = ScriptedConnection::new();
    conn.on_compare(
        "b.c",
        CompareResponse::ok(vec![file_event("b.c", FileClassification::RemotelyDeleted)]),
    );

    let mut coord = fx.coordinator();
    let a = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_remote_file(&path("proj/a.c"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.revision.as_deref(), Some("1.3"));
    assert!(conn.status_batches.is_empty());

    let b = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_remote_file(&path("proj/b.c"))
        .await
        .unwrap();
    assert!(b.is_none());
}

#[tokio::test]
async fn test_failed_status_batch_does_not_block_reconciliation() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.entries("proj", &[file_record("a.c", "1.1"), file_record("b.c", "1.1")]);
    fx.clean_file("proj/a.c");
    fx.wc.add_file("proj/b.c", later_time());
    let mut conn = ScriptedConnection::new();
    conn.on_compare(
        ".",
        CompareResponse::ok(vec![
            changed("a.c"),
            file_event("b.c", FileClassification::Conflict),
        ]),
    );
    conn.fail_status("a.c");

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("proj"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(conn.status_batches, vec![2]);
    let mut failed: Vec<&str> = tree.failures().iter().map(|f| f.path.as_str()).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec!["a.c", "b.c"]);

    let resolver = ConflictResolver::default();
    let plan = Reconciler::new(&mut coord, &resolver)
        .plan(&path("proj"), Some(&tree))
        .unwrap();
    assert!(plan.is_empty());
}

#[tokio::test]
async fn test_unmanaged_root_is_rejected() {
    let fx = Fixture::new();
    fx.wc.add_folder("loose");
    let mut conn = ScriptedConnection::new();

    let mut coord = fx.coordinator();
    let err = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .build_tree(&path("loose"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotVersioned(_)));
    assert!(conn.requests.is_empty());
}

#[tokio::test]
async fn test_cancelled_build_stops() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    let mut conn = ScriptedConnection::new();
    conn.on_compare(".", CompareResponse::ok(vec![changed("a.c")]));

    let token = CancellationToken::new();
    token.cancel();
    let mut coord = fx.coordinator();
    let err = RemoteTreeBuilder::new(&mut coord, &mut conn, BuildOptions::default())
        .with_cancellation(token)
        .build_tree(&path("proj"))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_base_tree_uses_recorded_revisions() {
    let fx = Fixture::new();
    fx.managed_folder("proj", None);
    fx.managed_folder("proj/src", None);
    fx.entries(
        "proj",
        &[
            ResourceSyncInfo::folder("src").unwrap(),
            file_record("README", "1.2"),
        ],
    );
    fx.entries("proj/src", &[file_record("main.c", "1.9")]);
    fx.clean_file("proj/README");
    fx.clean_file("proj/src/main.c");

    let mut coord = fx.coordinator();
    let tree = RemoteTreeBuilder::build_base_tree(&mut coord, &path("proj"))
        .unwrap()
        .unwrap();

    assert_eq!(tree.file_count(), 2);
    assert_eq!(tree.folder_count(), 2);
    let main = tree.find("src/main.c").and_then(|id| tree.file(id)).unwrap();
    assert_eq!(main.revision.as_deref(), Some("1.9"));
}
