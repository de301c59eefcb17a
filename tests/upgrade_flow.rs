use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use station_db::app_state::AppState;
use station_db::config::Config;
use station_db::database::{encode_database, DatabaseEnvelope, CURRENT_VERSION};
use station_db::events::MigrationEvent;
use station_db::stations::{generate_id, resolve, Station};
use station_db::stores::{PendingReconciliation, UpgradeState};
use station_db::upgrade::run_upgrade;

struct Fixture {
    _dir: tempfile::TempDir,
    config: Config,
    low: Station,
    high: Station,
    other: Station,
}

/// A v9 database where two bitrates of one stream share a URL-only id.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::in_dir(dir.path());

    let low = Station::new("Jazz Low", "http://jazz.example.com/live").with_codec("mp3", 64);
    let high = Station::new("Jazz High", "https://jazz.example.com/live/").with_codec("mp3", 320);
    let other = Station::new("News", "http://news.example.com/stream").with_codec("aac", 128);

    let envelope = DatabaseEnvelope {
        version: 9,
        stations: vec![low.clone(), high.clone(), other.clone()],
        metadata: None,
    };
    std::fs::write(&config.database_path, encode_database(&envelope).unwrap()).unwrap();

    Fixture {
        _dir: dir,
        config,
        low,
        high,
        other,
    }
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn favorite_ids(config: &Config) -> Vec<String> {
    read_json(&config.stores.favorites_path)["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn colliding_legacy_favorite_moves_to_first_station() {
    let fx = fixture();
    let shared_v9 = generate_id("http://jazz.example.com/live");
    let other_v9 = generate_id("http://news.example.com/stream");
    std::fs::write(
        &fx.config.stores.favorites_path,
        serde_json::to_vec(&json!([shared_v9, "no-longer-exists"])).unwrap(),
    )
    .unwrap();
    std::fs::write(
        &fx.config.stores.recents_path,
        serde_json::to_vec(&json!([{ "id": other_v9, "playedAt": 1_700_000_000_000i64 }])).unwrap(),
    )
    .unwrap();
    std::fs::create_dir_all(&fx.config.stores.favicon_cache_dir).unwrap();
    std::fs::write(
        fx.config.stores.favicon_cache_dir.join(format!("{shared_v9}.png")),
        b"png",
    )
    .unwrap();

    let mut state = AppState::initialize(fx.config.clone()).await.unwrap();
    let mut events = state.events.subscribe();
    let result = run_upgrade(&mut state).await.unwrap();

    let low_v10 = resolve(&fx.low);
    let high_v10 = resolve(&fx.high);
    let other_v10 = resolve(&fx.other);
    assert_ne!(low_v10, high_v10);

    let migration = result.migration.unwrap();
    assert_eq!(migration.from_version, 9);
    assert_eq!(migration.to_version, CURRENT_VERSION);
    assert_eq!(migration.applied_steps, vec!["migrate_9_to_10"]);

    let summary = result.reconciliation.unwrap();
    assert_eq!(summary.mappings, 2);
    assert_eq!(summary.collisions, 1);
    assert_eq!(summary.orphaned(), 1);

    assert_eq!(favorite_ids(&fx.config), vec![low_v10.clone(), "no-longer-exists".into()]);
    assert_eq!(
        read_json(&fx.config.stores.recents_path)[0]["id"],
        json!(other_v10)
    );
    assert!(fx
        .config
        .stores
        .favicon_cache_dir
        .join(format!("{low_v10}.png"))
        .exists());

    let database = read_json(&fx.config.database_path);
    assert_eq!(database["version"], json!(CURRENT_VERSION));
    let persisted: Vec<&str> = database["stations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|station| station["persistentID"].as_str().unwrap())
        .collect();
    assert_eq!(persisted, vec![low_v10.as_str(), high_v10.as_str(), other_v10.as_str()]);

    match events.try_recv().unwrap() {
        MigrationEvent::MigrationCompleted { from_version, .. } => assert_eq!(from_version, 9),
        other => panic!("unexpected event {other:?}"),
    }
    match events.try_recv().unwrap() {
        MigrationEvent::IdsRemapped { summary: sent, .. } => assert_eq!(sent, summary),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let fx = fixture();
    std::fs::write(
        &fx.config.stores.favorites_path,
        serde_json::to_vec(&json!([generate_id("http://news.example.com/stream")])).unwrap(),
    )
    .unwrap();

    let mut first = AppState::initialize(fx.config.clone()).await.unwrap();
    run_upgrade(&mut first).await.unwrap();
    let database = std::fs::read(&fx.config.database_path).unwrap();
    let favorites = std::fs::read(&fx.config.stores.favorites_path).unwrap();

    let mut second = AppState::initialize(fx.config.clone()).await.unwrap();
    let result = run_upgrade(&mut second).await.unwrap();

    assert!(result.database_found);
    assert!(result.migration.is_none());
    assert!(result.reconciliation.is_none());
    assert_eq!(std::fs::read(&fx.config.database_path).unwrap(), database);
    assert_eq!(std::fs::read(&fx.config.stores.favorites_path).unwrap(), favorites);
    assert!(second.upgrade_state.is_done("9->10"));
}

#[tokio::test]
async fn interrupted_reconciliation_resumes_on_next_start() {
    let fx = fixture();
    let legacy = generate_id("http://news.example.com/stream");
    std::fs::write(
        &fx.config.stores.favorites_path,
        serde_json::to_vec(&json!([legacy])).unwrap(),
    )
    .unwrap();

    // Database already written at the current version, stores never re-keyed.
    let mut migrated = DatabaseEnvelope {
        version: CURRENT_VERSION,
        stations: vec![fx.low.clone(), fx.high.clone(), fx.other.clone()],
        metadata: None,
    };
    for station in migrated.stations.iter_mut() {
        station.persistent_id = Some(resolve(station));
    }
    std::fs::write(&fx.config.database_path, encode_database(&migrated).unwrap()).unwrap();
    std::fs::write(
        &fx.config.stores.upgrade_state_path,
        serde_json::to_vec(&json!({ "pending": { "fromVersion": 9, "toVersion": 10 } })).unwrap(),
    )
    .unwrap();

    let mut state = AppState::initialize(fx.config.clone()).await.unwrap();
    let result = run_upgrade(&mut state).await.unwrap();

    assert!(result.migration.is_none());
    assert_eq!(result.reconciliation.unwrap().remapped(), 1);
    assert_eq!(favorite_ids(&fx.config), vec![resolve(&fx.other)]);
    assert_eq!(state.upgrade_state.pending(), None);
}

#[tokio::test]
async fn url_only_favorite_follows_a_station_with_a_country() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::in_dir(dir.path());
    let low = Station::new("Jazz Low", "http://jazz.example.com/live")
        .with_country("de")
        .with_codec("mp3", 64);
    let high = Station::new("Jazz High", "http://jazz.example.com/live")
        .with_country("de")
        .with_codec("mp3", 320);
    let envelope = DatabaseEnvelope {
        version: 9,
        stations: vec![low.clone(), high],
        metadata: None,
    };
    std::fs::write(&config.database_path, encode_database(&envelope).unwrap()).unwrap();
    std::fs::write(
        &config.stores.favorites_path,
        serde_json::to_vec(&json!([generate_id("http://jazz.example.com/live")])).unwrap(),
    )
    .unwrap();

    let mut state = AppState::initialize(config.clone()).await.unwrap();
    let summary = run_upgrade(&mut state).await.unwrap().reconciliation.unwrap();

    assert_eq!(summary.remapped(), 1);
    assert_eq!(summary.orphaned(), 0);
    assert_eq!(favorite_ids(&config), vec![resolve(&low)]);
}

#[tokio::test]
async fn unapplied_favicon_rename_keeps_reconciliation_pending() {
    let fx = fixture();
    let legacy = generate_id("http://news.example.com/stream");
    let cache_dir = &fx.config.stores.favicon_cache_dir;
    std::fs::create_dir_all(cache_dir).unwrap();
    std::fs::write(cache_dir.join(format!("{legacy}.png")), b"png").unwrap();
    let blocker = cache_dir.join(format!("{}.png", resolve(&fx.other)));
    std::fs::create_dir(&blocker).unwrap();
    std::fs::write(blocker.join("keep"), b"x").unwrap();

    let mut state = AppState::initialize(fx.config.clone()).await.unwrap();
    assert!(run_upgrade(&mut state).await.is_err());

    let upgrade_state = UpgradeState::load(&fx.config.stores.upgrade_state_path)
        .await
        .unwrap();
    assert_eq!(
        upgrade_state.pending(),
        Some(PendingReconciliation {
            from_version: 9,
            to_version: CURRENT_VERSION,
        })
    );
    assert!(!upgrade_state.is_done("9->10"));
    assert!(cache_dir.join(format!("{legacy}.png")).exists());
}
