// Public API - only expose the runner module
pub mod runner;

// Internal modules - organized by subsystem
mod book;
mod catalog;
mod config;
mod db;
mod query;
mod seed;
mod telemetry;
