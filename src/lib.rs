// Library for tests to access modules

pub mod aggregation_worker;
pub mod backfill;
pub mod bucket;
pub mod cleanup_worker;
pub mod config;
pub mod metrics_repo;
pub mod models;
pub mod routes;
pub mod stats;
