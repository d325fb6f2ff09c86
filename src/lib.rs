pub mod config;
pub mod db {
    pub mod connection;
    pub mod constraints;
    pub mod models;
}
pub mod error;
pub mod schema;
pub mod services {
    pub mod alerts;
    pub mod export;
    pub mod ingest;
    pub mod maintenance;
    pub mod query;
    pub mod reports;
    pub mod retention;
    pub mod seed;
    pub mod views;
}
pub mod store;

pub use error::StoreError;
pub use store::TelemetryStore;
