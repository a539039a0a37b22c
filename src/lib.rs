pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod forecaster;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;
