//! # MDS API Library
//!
//! Backend for the mine regulation information system: mines, permits, parties,
//! mine reports and party appointments, exposed as a REST API over PostgreSQL.
//!
//! ## Architecture
//!
//! The application is built using:
//! - **Axum**: HTTP server, routing and request extractors
//! - **SQLx**: asynchronous PostgreSQL access (`pg_trgm` for fuzzy search)
//! - **Tokio**: async runtime and the bounded task fan-out
//! - **jsonwebtoken**: bearer-token validation against the realm's signing key
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration (embedded defaults, files, environment)
//! - [`db`]: schema bootstrap and constraint classification
//! - [`error`]: centralized error type and JSON error envelope
//! - [`metrics`]: request and task counters
//! - [`middleware`]: authentication, rate limiting, validation and security headers
//! - [`routes`]: HTTP endpoint handlers and the router
//! - [`search`]: ranked multi-entity search and the mine activity feed
//! - [`state`]: shared application state
//! - [`types`]: entities, request bodies and response envelopes
//!
//! ## Features
//!
//! - Role-checked CRUD for mine reports and party appointments
//! - Overlap-free appointment date ranges enforced by an exclusion constraint
//! - Trigram-similarity search across mines, contacts, permits and documents
//! - Per-mine activity feed assembled from concurrent table queries
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod search;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;
