use chrono::NaiveDate;
use inventory_etl::extract::{memory::MemoryExtractor, RunWindow};
use inventory_etl::load::{DirectoryStaging, InMemoryWarehouse, WarehouseLoader};
use inventory_etl::prelude::*;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const DAY: u64 = 24 * 60 * 60;

const REGISTRY_JSON: &str = r#"{
    "daily_log": {
        "fields": [
            {"name": "ID", "type": "INTEGER"},
            {"name": "BackupDate", "type": "TIMESTAMP"},
            {"name": "Server", "type": "STRING"},
            {"name": "Database", "type": "STRING"},
            {"name": "Size", "type": "INTEGER"},
            {"name": "State", "type": "STRING"},
            {"name": "LastUpdate", "type": "TIMESTAMP"}
        ]
    },
    "backup_log": [
        {"name": "id", "type": "INTEGER"},
        {"name": "server", "type": "STRING"},
        {"name": "backup_date", "type": "TIMESTAMP"}
    ],
    "servers_temp": [
        {"name": "name", "type": "STRING"},
        {"name": "ssl", "type": "BOOLEAN"},
        {"name": "active", "type": "BOOLEAN"}
    ]
}"#;

fn load_registry() -> Arc<SchemaRegistry> {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(REGISTRY_JSON.as_bytes()).unwrap();
    Arc::new(SchemaRegistry::load(file.path()).unwrap())
}

fn run_at(mode: RunMode) -> RunWindow {
    let started = NaiveDate::from_ymd_opt(2025, 3, 15)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    RunWindow::new(mode, started)
}

fn daily_log_row(id: i64, date: &str) -> DataRow {
    let mut row = DataRow::new();
    row.insert("ID".to_string(), DataValue::Integer(id));
    row.insert("backup_date".to_string(), DataValue::from(format!("{} 02:00:00", date)));
    row.insert("server".to_string(), DataValue::from("db01"));
    row.insert("database".to_string(), DataValue::from("sales"));
    row.insert("size".to_string(), DataValue::Integer(4096));
    row.insert("state".to_string(), DataValue::from("OK"));
    row.insert("last_update".to_string(), DataValue::from("0000-00-00 00:00:00"));
    row.insert("fileName".to_string(), DataValue::from("sales.sql.gz"));
    row
}

fn backup_log_row(id: i64) -> DataRow {
    let mut row = DataRow::new();
    row.insert("id".to_string(), DataValue::Integer(id));
    row.insert("server".to_string(), DataValue::from("db01"));
    row.insert("backup_date".to_string(), DataValue::from("2025-03-14 01:00:00"));
    row
}

fn source() -> MemoryExtractor {
    MemoryExtractor::new()
        .with_table(
            "daily_log",
            vec![
                daily_log_row(1, "2025-03-13"),
                daily_log_row(2, "2025-03-14"),
                daily_log_row(3, "2025-03-14"),
                daily_log_row(4, "2025-03-15"),
            ],
        )
        .with_table("backup_log", vec![backup_log_row(1), backup_log_row(2)])
        .with_table("servers_temp", vec![])
        .with_table("users", vec![backup_log_row(9)])
}

fn pipeline(
    mode: RunMode,
    extractor: MemoryExtractor,
    warehouse: &InMemoryWarehouse,
    staging_dir: &Path,
    emitter: &InMemoryEventEmitter,
) -> Pipeline {
    let registry = load_registry();
    let staging = Arc::new(DirectoryStaging::new(staging_dir));
    let loader = WarehouseLoader::new(Arc::new(warehouse.clone()))
        .with_staging(staging.clone())
        .with_timeout(Some(Duration::from_secs(5)));

    let context = RunContext::builder(run_at(mode), registry.clone())
        .allow_list(["backup_log", "daily_log", "servers_temp", "database_list"])
        .extractor(extractor)
        .transformer(RuleTransformer::new(registry))
        .loader(loader)
        .staging(staging)
        .event_emitter(emitter.clone())
        .build()
        .unwrap();
    Pipeline::new(context)
}

#[tokio::test]
async fn test_full_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = InMemoryWarehouse::new();
    let emitter = InMemoryEventEmitter::new();

    let first = pipeline(RunMode::Full, source(), &warehouse, dir.path(), &emitter)
        .execute()
        .await
        .unwrap();
    let daily_after_first = warehouse.rows("daily_log").len();
    let backup_after_first = warehouse.rows("backup_log").len();

    let second = pipeline(RunMode::Full, source(), &warehouse, dir.path(), &emitter)
        .execute()
        .await
        .unwrap();

    assert!(first.is_success() && second.is_success());
    assert_eq!(daily_after_first, 4);
    assert_eq!(warehouse.rows("daily_log").len(), daily_after_first);
    assert_eq!(warehouse.rows("backup_log").len(), backup_after_first);
    assert!(warehouse
        .requests()
        .iter()
        .all(|r| r.write_mode == WriteMode::TruncateAndReplace));

    // artefatos de staging são apagados depois do uso
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_incremental_loads_only_yesterday() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = InMemoryWarehouse::new();
    let emitter = InMemoryEventEmitter::new();

    let summary = pipeline(RunMode::Incremental, source(), &warehouse, dir.path(), &emitter)
        .execute()
        .await
        .unwrap();
    assert!(summary.is_success());

    let ids: Vec<i64> = warehouse
        .rows("daily_log")
        .iter()
        .filter_map(|r| r["ID"].as_i64())
        .collect();
    assert_eq!(ids, vec![2, 3]);

    let daily_request = warehouse
        .requests()
        .into_iter()
        .find(|r| r.table == "daily_log")
        .unwrap();
    assert_eq!(daily_request.write_mode, WriteMode::Append);
    assert_eq!(daily_request.partition_field.as_deref(), Some("BackupDate"));
}

#[tokio::test]
async fn test_daily_log_is_reshaped_before_load() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = InMemoryWarehouse::new();
    let emitter = InMemoryEventEmitter::new();

    let summary = pipeline(RunMode::Full, source(), &warehouse, dir.path(), &emitter)
        .execute()
        .await
        .unwrap();

    let rows = warehouse.rows("daily_log");
    let row = rows[0].as_object().unwrap();
    assert!(!row.contains_key("fileName"));
    for column in ["BackupDate", "Server", "Database", "Size", "State", "LastUpdate"] {
        assert!(row.contains_key(column), "coluna {} ausente", column);
    }
    assert_eq!(row["BackupDate"], "2025-03-13 02:00:00");
    // data zerada na origem vira nulo sem derrubar a carga
    assert!(row["LastUpdate"].is_null());

    let daily = summary
        .tables
        .iter()
        .find(|t| t.table() == "daily_log")
        .unwrap();
    match daily {
        TableOutcome::Loaded { nulled_timestamps, .. } => assert_eq!(*nulled_timestamps, 4),
        other => panic!("desfecho inesperado: {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_table_is_skipped_without_loading() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = InMemoryWarehouse::new();
    let emitter = InMemoryEventEmitter::new();

    let summary = pipeline(RunMode::Full, source(), &warehouse, dir.path(), &emitter)
        .execute()
        .await
        .unwrap();

    assert_eq!(summary.skipped(), vec!["servers_temp"]);
    assert!(summary.is_success());
    assert!(warehouse.requests().iter().all(|r| r.table != "servers_temp"));
    assert!(emitter.get_events().iter().any(|e| matches!(
        e,
        RunEvent::TableSkipped { table, .. } if table == "servers_temp"
    )));
    // a tabela seguinte ainda foi processada
    assert_eq!(summary.succeeded(), vec!["backup_log", "daily_log"]);
    // fora da allow-list nunca é tocada
    assert!(warehouse.rows("users").is_empty());
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let now = SystemTime::now();
    let expired = dir.path().join("daily_log_20250301_020000.json");
    let recent = dir.path().join("daily_log_20250309_020000.json");

    for (path, age_days) in [(&expired, 8), (&recent, 6)] {
        std::fs::write(path, b"{}\n").unwrap();
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(now - Duration::from_secs(age_days * DAY))
            .unwrap();
    }

    let warehouse = InMemoryWarehouse::new();
    let emitter = InMemoryEventEmitter::new();
    let summary = pipeline(RunMode::Incremental, source(), &warehouse, dir.path(), &emitter)
        .execute_at(now)
        .await
        .unwrap();

    assert_eq!(summary.artifacts_deleted, 1);
    assert!(!expired.exists());
    assert!(recent.exists());
}

#[tokio::test]
async fn test_table_failure_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = InMemoryWarehouse::new().failing_table("daily_log");
    let emitter = InMemoryEventEmitter::new();
    let extractor = source().with_broken_table("database_list");

    let summary = pipeline(RunMode::Full, extractor, &warehouse, dir.path(), &emitter)
        .execute()
        .await
        .unwrap();

    assert!(!summary.is_success());
    assert_eq!(summary.succeeded(), vec!["backup_log"]);
    assert_eq!(summary.failed(), vec!["daily_log", "database_list"]);

    let codes: Vec<&str> = summary
        .tables
        .iter()
        .filter_map(|t| match t {
            TableOutcome::Failed { code, .. } => Some(*code),
            _ => None,
        })
        .collect();
    // database_list não está no registro de schemas
    assert_eq!(codes, vec!["LOAD_JOB_ERROR", "SCHEMA_NOT_FOUND"]);
    assert_eq!(warehouse.rows("backup_log").len(), 2);
}
