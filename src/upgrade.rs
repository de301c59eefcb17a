use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::{
    app_state::AppState,
    database::{
        load_database, needs_migration, save_database, DatabaseCodec, DatabaseEnvelope,
        MigrationReport, Migrator, MsgPackLz4Codec, CURRENT_VERSION,
    },
    events::MigrationEvent,
    files,
    logging::logger,
    reconcile::{current_ids, reconcile_stores, IdMigrationMap, ReconcileSummary},
    stores::PendingReconciliation,
};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeResult {
    pub database_found: bool,
    pub migration: Option<MigrationReport>,
    pub backup_path: Option<PathBuf>,
    pub reconciliation: Option<ReconcileSummary>,
}

/// Where the database stands without changing anything.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    pub version: u32,
    pub current_version: u32,
    pub needs_migration: bool,
    pub stations: usize,
    pub fingerprint: String,
}

pub async fn database_status(path: &Path) -> anyhow::Result<Option<DatabaseStatus>> {
    let Some(envelope) = load_database(path)
        .await
        .context("failed to read station database")?
    else {
        return Ok(None);
    };
    Ok(Some(DatabaseStatus {
        version: envelope.version,
        current_version: CURRENT_VERSION,
        needs_migration: needs_migration(&envelope),
        stations: envelope.stations.len(),
        fingerprint: envelope.fingerprint()?,
    }))
}

/// Brings the database to the current version and re-keys user data.
///
/// The pending reconciliation is recorded before the migrated database is
/// written and cleared only after every store is saved, so a run interrupted
/// in between finishes the reconciliation on the next start.
pub async fn run_upgrade(state: &mut AppState) -> anyhow::Result<UpgradeResult> {
    let database_path = state.config.database_path.clone();
    let Some(envelope) = load_database(&database_path)
        .await
        .context("failed to read station database")?
    else {
        if let Some(log) = logger() {
            log.info(
                "upgrade.no_database",
                json!({ "path": database_path.display().to_string() }),
            );
        }
        return Ok(UpgradeResult::default());
    };

    if envelope.version > CURRENT_VERSION {
        bail!(
            "station database version {} is newer than supported version {}",
            envelope.version,
            CURRENT_VERSION
        );
    }

    let mut result = UpgradeResult {
        database_found: true,
        ..UpgradeResult::default()
    };

    let envelope = if needs_migration(&envelope) {
        result.backup_path = write_backup(state, &envelope).await?;

        let now = Utc::now();
        let (mut migrated, report) = Migrator::at(now).migrate(envelope);
        if report.identity_changed() {
            state.upgrade_state.set_pending(PendingReconciliation {
                from_version: report.from_version,
                to_version: report.to_version,
            });
            state
                .upgrade_state
                .save()
                .await
                .context("failed to record pending reconciliation")?;
        }

        migrated.touch(now);
        save_database(&database_path, &migrated)
            .await
            .context("failed to write migrated station database")?;

        if let Some(log) = logger() {
            log.info("migration.completed", &report);
        }
        state.events.publish(MigrationEvent::MigrationCompleted {
            from_version: report.from_version,
            to_version: report.to_version,
            steps: report.applied_steps.clone(),
        });
        result.migration = Some(report);
        migrated
    } else {
        envelope
    };

    if let Some(pending) = state.upgrade_state.pending() {
        result.reconciliation = finish_reconciliation(state, &envelope, pending).await?;
    }

    Ok(result)
}

async fn finish_reconciliation(
    state: &mut AppState,
    envelope: &DatabaseEnvelope,
    pending: PendingReconciliation,
) -> anyhow::Result<Option<ReconcileSummary>> {
    if state.upgrade_state.is_done(&pending.key()) {
        state.upgrade_state.complete(pending);
        state
            .upgrade_state
            .save()
            .await
            .context("failed to clear pending reconciliation")?;
        return Ok(None);
    }

    let map = IdMigrationMap::legacy(&envelope.stations);
    let ids = current_ids(&envelope.stations);
    let summary = reconcile_stores(&mut state.keyed_stores(), &map, &ids, Utc::now());
    state.save_stores().await?;

    state.upgrade_state.complete(pending);
    state
        .upgrade_state
        .save()
        .await
        .context("failed to record completed reconciliation")?;

    if let Some(log) = logger() {
        log.info(
            "reconcile.completed",
            json!({
                "key": pending.key(),
                "mappings": summary.mappings,
                "collisions": summary.collisions,
                "remapped": summary.remapped(),
                "orphaned": summary.orphaned(),
            }),
        );
    }
    state.events.publish(MigrationEvent::IdsRemapped {
        from_version: pending.from_version,
        to_version: pending.to_version,
        summary: summary.clone(),
    });

    Ok(Some(summary))
}

/// Snapshots the pre-migration database. A snapshot of identical content is
/// never written twice.
async fn write_backup(
    state: &AppState,
    envelope: &DatabaseEnvelope,
) -> anyhow::Result<Option<PathBuf>> {
    let backup = &state.config.backup;
    if !backup.enabled {
        return Ok(None);
    }

    let codec = MsgPackLz4Codec;
    let fingerprint = envelope.fingerprint()?;
    let path = backup.dir.join(format!(
        "stations-v{}-{}.{}",
        envelope.version,
        &fingerprint[..12],
        codec.extension()
    ));
    if tokio::fs::try_exists(&path).await? {
        return Ok(Some(path));
    }

    let bytes = codec.encode(envelope)?;
    files::write_atomic(&path, &bytes)
        .await
        .with_context(|| format!("failed to write backup {}", path.display()))?;

    if let Some(log) = logger() {
        log.info(
            "backup.written",
            json!({
                "path": path.display().to_string(),
                "version": envelope.version,
                "stations": envelope.stations.len(),
            }),
        );
    }
    Ok(Some(path))
}
