use criterion::{black_box, criterion_group, criterion_main, Criterion};
use inventory_etl::load::ndjson;
use inventory_etl::prelude::*;
use std::sync::Arc;

const DAILY_LOG_SCHEMA: &str = r#"{
    "daily_log": [
        {"name": "ID", "type": "INTEGER"},
        {"name": "BackupDate", "type": "TIMESTAMP"},
        {"name": "Server", "type": "STRING"},
        {"name": "Database", "type": "STRING"},
        {"name": "Size", "type": "INTEGER"},
        {"name": "State", "type": "STRING"},
        {"name": "LastUpdate", "type": "TIMESTAMP"}
    ]
}"#;

fn daily_log_rows(count: i64) -> Relation {
    (0..count)
        .map(|i| {
            let mut row = DataRow::new();
            row.insert("ID".to_string(), DataValue::Integer(i));
            row.insert(
                "backup_date".to_string(),
                DataValue::from(format!("2025-03-14 {:02}:00:00", i % 24)),
            );
            row.insert("server".to_string(), DataValue::from(format!("db{:02}", i % 40)));
            row.insert("database".to_string(), DataValue::from("sales"));
            row.insert("size".to_string(), DataValue::Integer(1024 * i));
            row.insert("state".to_string(), DataValue::from("OK"));
            // uma linha a cada dez com data zerada
            let last_update = if i % 10 == 0 {
                "0000-00-00 00:00:00"
            } else {
                "2025-03-14 23:59:59"
            };
            row.insert("last_update".to_string(), DataValue::from(last_update));
            row.insert("fileName".to_string(), DataValue::from(format!("dump_{}.sql.gz", i)));
            row
        })
        .collect()
}

fn benchmark_daily_log_transform(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let registry = Arc::new(SchemaRegistry::from_json_str(DAILY_LOG_SCHEMA).unwrap());
    let transformer = RuleTransformer::new(registry);
    let rows = daily_log_rows(1000);

    c.bench_function("daily_log_transform_1000_rows", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let result = transformer
                    .transform_with_report(rows.clone(), "daily_log")
                    .await
                    .unwrap();
                black_box(result);
            });
        })
    });
}

fn benchmark_ndjson_encode(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let registry = Arc::new(SchemaRegistry::from_json_str(DAILY_LOG_SCHEMA).unwrap());
    let transformer = RuleTransformer::new(registry.clone());
    let spec = registry.get_schema("daily_log").unwrap();
    let (rows, _) = runtime
        .block_on(transformer.transform_with_report(daily_log_rows(1000), "daily_log"))
        .unwrap();

    c.bench_function("daily_log_ndjson_encode_1000_rows", |b| {
        b.iter(|| black_box(ndjson::encode(&rows, spec).unwrap()))
    });
}

criterion_group!(benches, benchmark_daily_log_transform, benchmark_ndjson_encode);
criterion_main!(benches);
