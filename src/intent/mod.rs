pub mod cancellation;
pub mod intake;
pub mod model;
pub mod processor;
pub mod query;
pub mod repository;
pub mod repository_sqlx;
pub mod types;
