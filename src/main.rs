use std::env;

use anyhow::Context;
use serde_json::json;

use station_db::app_state::AppState;
use station_db::config::Config;
use station_db::logging::init_logger;
use station_db::upgrade::{database_status, run_upgrade};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = init_logger("station-db-rs");

    let config = Config::load().context("failed to load configuration")?;

    match env::args().nth(1).as_deref() {
        Some("check-config") => {
            logger.info(
                "config.check_passed",
                serde_json::to_value(&config).unwrap_or_else(|_| json!({ "status": "ok" })),
            );
            Ok(())
        }
        Some("status") => {
            match database_status(&config.database_path).await? {
                Some(status) => logger.info("database.status", &status),
                None => logger.info(
                    "database.status",
                    json!({ "path": config.database_path.display().to_string(), "exists": false }),
                ),
            }
            Ok(())
        }
        None | Some("upgrade") => {
            let mut state = AppState::initialize(config)
                .await
                .context("failed to initialize application state")?;
            let result = match run_upgrade(&mut state).await {
                Ok(result) => result,
                Err(err) => {
                    logger.error("upgrade.failed", json!({ "error": format!("{err:#}") }));
                    return Err(err.context("station database upgrade failed"));
                }
            };
            logger.info(
                "upgrade.finished",
                json!({
                    "databaseFound": result.database_found,
                    "migrated": result.migration.as_ref().is_some_and(|report| report.migrated()),
                    "backup": result.backup_path.map(|path| path.display().to_string()),
                    "remapped": result.reconciliation.as_ref().map(|summary| summary.remapped()),
                    "orphaned": result.reconciliation.as_ref().map(|summary| summary.orphaned()),
                }),
            );
            Ok(())
        }
        Some(other) => anyhow::bail!("unknown command: {other}"),
    }
}
