//! # BigQuery
//!
//! Cliente do warehouse sobre a API REST do BigQuery.
//!
//! Os registros NDJSON são enviados em um upload `multipart/related` que cria um
//! job de carga; o job é consultado em intervalos fixos até o estado `DONE`.
//! Toda carga declara o particionamento diário quando a tabela tem campo de partição.

use async_trait::async_trait;
use chrono::Utc;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use crate::config::WarehouseConfig;
use crate::error::{ConfigError, ETLError, LoadError, Result};
use crate::traits::{JobHandle, JobOutcome, LoadJobRequest, Warehouse};

const API_ROOT: &str = "https://bigquery.googleapis.com/bigquery/v2";
const UPLOAD_ROOT: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery"];
const BOUNDARY: &str = "inventory_etl_load_boundary";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(default)]
    num_rows: Option<String>,
}

/// Projeto, dataset e região de destino
#[derive(Debug, Clone, PartialEq, Eq)]
struct Destination {
    project_id: String,
    dataset_id: String,
    location: Option<String>,
}

impl Destination {
    fn job_configuration(&self, job_id: &str, request: &LoadJobRequest) -> serde_json::Value {
        let fields: Vec<serde_json::Value> = request
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "type": f.field_type.as_str(), "mode": "NULLABLE" }))
            .collect();

        let mut load = json!({
            "destinationTable": {
                "projectId": self.project_id,
                "datasetId": self.dataset_id,
                "tableId": request.table,
            },
            "sourceFormat": "NEWLINE_DELIMITED_JSON",
            "writeDisposition": request.write_mode.as_disposition(),
            "createDisposition": "CREATE_IF_NEEDED",
            "schema": { "fields": fields },
        });
        if let Some(field) = &request.partition_field {
            load["timePartitioning"] = json!({ "type": "DAY", "field": field });
        }

        let mut reference = json!({ "projectId": self.project_id, "jobId": job_id });
        if let Some(location) = &self.location {
            reference["location"] = json!(location);
        }

        json!({ "jobReference": reference, "configuration": { "load": load } })
    }
}

/// Warehouse BigQuery autenticado por conta de serviço
pub struct BigQueryWarehouse {
    client: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
    destination: Destination,
    poll_interval: Duration,
}

impl std::fmt::Debug for BigQueryWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryWarehouse")
            .field("destination", &self.destination)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl BigQueryWarehouse {
    /// Cria o cliente a partir do arquivo de chave da conta de serviço
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let account = CustomServiceAccount::from_file(&config.key_file)?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| {
                ETLError::Config(ConfigError::InvalidConfig(format!("cliente HTTP: {}", e)))
            })?;

        Ok(Self {
            client,
            auth: Arc::new(account),
            destination: Destination {
                project_id: config.project_id.clone(),
                dataset_id: config.dataset_id.clone(),
                location: config.location.clone(),
            },
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        })
    }

    async fn bearer(&self) -> Result<String> {
        let token = self.auth.token(SCOPES).await?;
        Ok(format!("Bearer {}", token.as_str()))
    }

    fn multipart_body(metadata: &serde_json::Value, records: Vec<u8>) -> Vec<u8> {
        let mut body = Vec::with_capacity(records.len() + 1024);
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = BOUNDARY,
                m = metadata
            )
            .as_bytes(),
        );
        body.extend_from_slice(&records);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn fetch_job(&self, job: &JobHandle) -> Result<JobResource> {
        let url = format!("{}/projects/{}/jobs/{}", API_ROOT, self.destination.project_id, job.job_id);
        let mut call = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?);
        if let Some(location) = &job.location {
            call = call.query(&[("location", location)]);
        }

        let response = call.send().await.map_err(|e| job_error(&job.job_id, e))?;
        decode_response(&job.job_id, response).await
    }
}

fn job_error(context: &str, err: impl std::fmt::Display) -> ETLError {
    ETLError::Load(LoadError::Job {
        table: context.to_string(),
        message: err.to_string(),
    })
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    context: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(job_error(context, format!("HTTP {}: {}", status, text)));
    }
    response.json::<T>().await.map_err(|e| job_error(context, e))
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn submit_load_job(&self, records: Vec<u8>, request: &LoadJobRequest) -> Result<JobHandle> {
        let job_id = format!(
            "inventory_etl_{}_{}",
            request.table,
            Utc::now().format("%Y%m%d%H%M%S%f")
        );
        let metadata = self.destination.job_configuration(&job_id, request);
        let body = Self::multipart_body(&metadata, records);

        let url = format!(
            "{}/projects/{}/jobs?uploadType=multipart",
            UPLOAD_ROOT, self.destination.project_id
        );
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| job_error(&request.table, e))?;

        let job: JobResource = decode_response(&request.table, response).await?;
        Ok(JobHandle {
            job_id: job.job_reference.job_id,
            location: job
                .job_reference
                .location
                .or_else(|| self.destination.location.clone()),
        })
    }

    async fn await_job(&self, job: &JobHandle) -> Result<JobOutcome> {
        loop {
            let resource = self.fetch_job(job).await?;
            if resource.status.state != "DONE" {
                tracing::debug!(job_id = %job.job_id, state = %resource.status.state, "Aguardando job");
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            return Ok(match resource.status.error_result {
                None => JobOutcome::Succeeded,
                Some(result) => {
                    let mut errors: Vec<String> = resource
                        .status
                        .errors
                        .into_iter()
                        .map(|e| e.message)
                        .collect();
                    if errors.is_empty() {
                        errors.push(result.message);
                    }
                    JobOutcome::Failed { errors }
                }
            });
        }
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            API_ROOT, self.destination.project_id, self.destination.dataset_id, table
        );
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await?)
            .send()
            .await
            .map_err(|e| job_error(table, e))?;

        let resource: TableResource = decode_response(table, response).await?;
        Ok(resource
            .num_rows
            .and_then(|n| n.parse().ok())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};
    use crate::types::WriteMode;

    fn destination() -> Destination {
        Destination {
            project_id: "proj".to_string(),
            dataset_id: "ti_db_inventory".to_string(),
            location: Some("US".to_string()),
        }
    }

    fn request(partition: Option<&str>, write_mode: WriteMode) -> LoadJobRequest {
        LoadJobRequest {
            table: "daily_log".to_string(),
            fields: vec![
                FieldSpec::new("Server", FieldType::String),
                FieldSpec::new("BackupDate", FieldType::Timestamp),
            ],
            write_mode,
            partition_field: partition.map(str::to_string),
        }
    }

    #[test]
    fn test_job_configuration_declares_partitioning() {
        let config = destination().job_configuration(
            "job-1",
            &request(Some("BackupDate"), WriteMode::Append),
        );
        let load = &config["configuration"]["load"];
        assert_eq!(load["writeDisposition"], "WRITE_APPEND");
        assert_eq!(load["sourceFormat"], "NEWLINE_DELIMITED_JSON");
        assert_eq!(load["destinationTable"]["tableId"], "daily_log");
        assert_eq!(load["timePartitioning"]["type"], "DAY");
        assert_eq!(load["timePartitioning"]["field"], "BackupDate");
        assert_eq!(load["schema"]["fields"][1]["type"], "TIMESTAMP");
        assert_eq!(config["jobReference"]["location"], "US");
    }

    #[test]
    fn test_job_configuration_without_partition() {
        let config = destination()
            .job_configuration("job-2", &request(None, WriteMode::TruncateAndReplace));
        let load = &config["configuration"]["load"];
        assert_eq!(load["writeDisposition"], "WRITE_TRUNCATE");
        assert!(load.get("timePartitioning").is_none());
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = BigQueryWarehouse::multipart_body(&json!({"a": 1}), b"{\"x\":1}\n".to_vec());
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with(&format!("--{}\r\n", BOUNDARY)));
        assert!(text.contains("{\"a\":1}"));
        assert!(text.contains("{\"x\":1}\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", BOUNDARY)));
    }

    #[test]
    fn test_job_status_parsing() {
        let resource: JobResource = serde_json::from_value(json!({
            "jobReference": {"projectId": "proj", "jobId": "j1", "location": "US"},
            "status": {
                "state": "DONE",
                "errorResult": {"reason": "invalid", "message": "bad row"},
                "errors": [{"message": "row 3: bad"}]
            }
        }))
        .unwrap();
        assert_eq!(resource.job_reference.job_id, "j1");
        assert_eq!(resource.status.state, "DONE");
        assert_eq!(resource.status.errors[0].message, "row 3: bad");

        let table: TableResource = serde_json::from_value(json!({"numRows": "42"})).unwrap();
        assert_eq!(table.num_rows.as_deref(), Some("42"));
    }
}
