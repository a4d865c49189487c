// Library for tests to access modules

pub mod config;
pub mod docker_repo;
pub mod error;
pub mod history_repo;
pub mod models;
pub mod query;
pub mod rollup_worker;
pub mod routes;
pub mod sampler;
pub mod sysinfo_repo;
pub mod worker;
