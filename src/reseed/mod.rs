pub mod audit;
pub mod catalog;
pub mod config;
pub mod local;
pub mod lock;
pub mod manifest;
pub mod metadata;
pub mod migrate;
pub mod paths;
pub mod pipeline;
pub mod query;
pub mod reconcile;
pub mod registration;
pub mod util;
pub mod warn;
