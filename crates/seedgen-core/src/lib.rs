pub mod config;
pub mod generation;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod scheduling;
pub mod sqlite;
