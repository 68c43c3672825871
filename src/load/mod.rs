pub mod memory;
pub mod ndjson;
pub mod staging;
pub mod warehouse;

#[cfg(feature = "bigquery")]
pub mod bigquery;

pub use memory::InMemoryWarehouse;
pub use staging::{DirectoryStaging, MemoryStaging};
pub use warehouse::WarehouseLoader;
