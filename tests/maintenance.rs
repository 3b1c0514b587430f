mod common;

use anyhow::Result;
use tenderlake::config::SwiftAuth;
use tenderlake::storage::{BlobBackend, DiskBackend, SwiftBackend};
use tenderlake::{
    IdRange, MemoryRecordStore, PurgeOptions, RetentionManager, StorageBackend, SyncMode,
    SyncReconciler, ValidationError,
};

async fn seed(backend: &dyn StorageBackend, names: &[&str]) -> Result<()> {
    for name in names {
        backend.store(name, name.as_bytes()).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_sync_plan_and_apply() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let origin = DiskBackend::open(dir.path().join("origin"))?;
    let destination = BlobBackend::open(dir.path().join("blobs")).await?;
    seed(&origin, &["ntp00000001_a.pdf", "ntp00000002_a.pdf", "ntp00000003_a.pdf"]).await?;
    seed(&destination, &["ntp00000002_a.pdf", "ntp00000004_a.pdf"]).await?;

    let reconciler = SyncReconciler::new(&origin, &destination)?;

    let plan = reconciler.plan(&IdRange::All, SyncMode::default()).await?;
    assert_eq!(plan.to_add, vec!["ntp00000001_a.pdf", "ntp00000003_a.pdf"]);
    assert!(plan.to_update.is_empty());
    assert!(plan.to_delete.is_empty());
    assert_eq!(plan.unchanged, vec!["ntp00000002_a.pdf"]);
    // Planning alone changes neither side
    assert_eq!(origin.list(&IdRange::All).await?.len(), 3);
    assert_eq!(destination.list(&IdRange::All).await?.len(), 2);

    let mode = SyncMode {
        delete: true,
        replace: true,
    };
    let plan = reconciler.plan(&IdRange::All, mode).await?;
    assert_eq!(plan.to_update, vec!["ntp00000002_a.pdf"]);
    assert_eq!(plan.to_delete, vec!["ntp00000004_a.pdf"]);
    assert_eq!(plan.existing(), 1);

    let mut steps = Vec::new();
    let summary = reconciler.apply(&plan, |done| steps.push(done)).await;
    assert_eq!(summary.transferred, 3);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(steps, vec![1, 2, 3, 4]);

    assert_eq!(
        destination.list(&IdRange::All).await?,
        origin.list(&IdRange::All).await?
    );
    assert!(reconciler.plan(&IdRange::All, SyncMode::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sync_respects_id_range() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let origin = DiskBackend::open(dir.path().join("origin"))?;
    let destination = DiskBackend::open(dir.path().join("destination"))?;
    seed(&origin, &["ntp00000001_a.pdf", "ntp00000005_a.pdf"]).await?;
    seed(&destination, &["ntp00000009_a.pdf"]).await?;

    let range = IdRange::from_selectors(None, Some("ntp00000004"), Some("ntp00000006"))?;
    let mode = SyncMode {
        delete: true,
        replace: false,
    };
    let reconciler = SyncReconciler::new(&origin, &destination)?;
    let plan = reconciler.plan(&range, mode).await?;

    assert_eq!(plan.to_add, vec!["ntp00000005_a.pdf"]);
    assert!(plan.to_delete.is_empty());
    assert_eq!(plan.render(), "ADD ntp00000005_a.pdf\n");
    Ok(())
}

#[tokio::test]
async fn test_sync_refuses_same_storage() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let a = DiskBackend::open(dir.path().join("docs"))?;
    let b = DiskBackend::open(dir.path().join("docs"))?;
    assert!(matches!(
        SyncReconciler::new(&a, &b),
        Err(ValidationError::SameStorage(_))
    ));

    let server = common::start_swift_server().await?;
    let swift_a = SwiftBackend::connect(&server.token_config("ESPROC", "documentos")).await?;
    let swift_b = SwiftBackend::connect(&server.token_config("ESPROC", "documentos")).await?;
    assert!(SyncReconciler::new(&swift_a, &swift_b).is_err());
    let other_container = SwiftBackend::connect(&server.token_config("ESPROC_OLD", "documentos")).await?;
    assert!(SyncReconciler::new(&swift_a, &other_container).is_ok());
    Ok(())
}

#[tokio::test]
async fn test_sync_disk_to_swift() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let origin = DiskBackend::open(dir.path().join("origin"))?;
    seed(&origin, &["ntp00000001_a.pdf", "ntp00000002_b.docx"]).await?;
    let server = common::start_swift_server().await?;
    let swift = SwiftBackend::connect(&server.token_config("ESPROC", "documentos")).await?;

    let reconciler = SyncReconciler::new(&origin, &swift)?;
    let plan = reconciler.plan(&IdRange::All, SyncMode::default()).await?;
    let summary = reconciler.apply(&plan, |_| {}).await;

    assert_eq!(summary.transferred, 2);
    assert_eq!(
        server.paths(),
        vec![
            "ESPROC/documentos/ntp00000001_a.pdf",
            "ESPROC/documentos/ntp00000002_b.docx"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_purge_into_blob_backup_and_recover() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let primary = DiskBackend::open(dir.path().join("documents"))?;
    let backup = BlobBackend::open(dir.path().join("backup")).await?;
    seed(
        &primary,
        &["ntp00000001_pliego.pdf", "ntp00000001_anexos-0.zip", "ntp00000002_pliego.pdf"],
    )
    .await?;

    let store = MemoryRecordStore::from_records(vec![
        common::record(1, "T1", None).obsolete_stub(&common::id(2)),
        common::record(2, "T1", Some("2024-05-01 00:00:00")),
    ]);
    let retention = RetentionManager::new(&primary, &backup, 1);

    let summary = retention
        .purge(&store, &IdRange::All, &PurgeOptions::default())
        .await?;
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.purged, 1);
    assert_eq!(summary.backed_up, 2);
    assert_eq!(summary.deleted, 2);
    assert_eq!(primary.list(&IdRange::All).await?, vec!["ntp00000002_pliego.pdf"]);
    assert_eq!(
        backup.list(&IdRange::All).await?,
        vec!["ntp00000001_anexos-0.zip", "ntp00000001_pliego.pdf"]
    );

    let recovered = retention.recover(&IdRange::All).await?;
    assert_eq!(recovered.recovered, 2);
    assert_eq!(primary.list(&IdRange::All).await?.len(), 3);
    assert_eq!(
        primary.read("ntp00000001_anexos-0.zip").await?,
        b"ntp00000001_anexos-0.zip"
    );
    Ok(())
}

#[tokio::test]
async fn test_purge_without_backup_deletes_only() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let primary = DiskBackend::open(dir.path().join("documents"))?;
    let backup = DiskBackend::open(dir.path().join("backup"))?;
    seed(&primary, &["ntp00000001_pliego.pdf"]).await?;
    let store = MemoryRecordStore::from_records(vec![
        common::record(1, "T1", None).obsolete_stub(&common::id(2)),
    ]);

    let options = PurgeOptions {
        no_backup: true,
        ..Default::default()
    };
    let summary = RetentionManager::new(&primary, &backup, 10)
        .purge(&store, &IdRange::All, &options)
        .await?;

    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.backed_up, 0);
    assert!(primary.list(&IdRange::All).await?.is_empty());
    assert!(backup.list(&IdRange::All).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_backup_keeps_primary_object() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let primary = DiskBackend::open(dir.path().join("documents"))?;
    seed(&primary, &["ntp00000001_pliego.pdf"]).await?;

    let server = common::start_swift_server().await?;
    let mut config = server.token_config("ESPROC", "backup");
    config.auth = SwiftAuth::Token {
        storage_url: server.storage_url(),
        token: "revoked".to_string(),
    };
    let backup = SwiftBackend::connect(&config).await?;

    let store = MemoryRecordStore::from_records(vec![
        common::record(1, "T1", None).obsolete_stub(&common::id(2)),
    ]);
    let summary = RetentionManager::new(&primary, &backup, 10)
        .purge(&store, &IdRange::All, &PurgeOptions::default())
        .await?;

    assert_eq!(summary.purged, 1);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.deleted, 0);
    assert!(primary.exists("ntp00000001_pliego.pdf", false).await?);
    Ok(())
}
