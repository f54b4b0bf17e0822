//! ERP Gateway Kernel Library
//!
//! Paginated, dynamically filtered list queries over ADempiere tables,
//! plus the HTTP surface that exposes them. The main entry point for
//! running the server is the `erpgate` binary.

pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod routes;
pub mod state;
