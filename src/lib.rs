//! `agriflow`: crop analytics and recommendations from soil sensor readings.
//!
//! The crate is split along the Explicit Module Boundary Pattern (EMBP):
//! - `engine` – pure analytics and recommendation logic (no I/O)
//! - `models` – typed records shared by every layer
//! - `store` / `schema` – PostgreSQL persistence
//! - `routes` – axum HTTP gateway
//! - `config` – environment configuration
//!
//! `main.rs` only wires these together.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
pub use error::{AnalyticsError, AnalyticsResult};
pub use models::{Alert, AlertKind, RawReading, Reading, Severity};
pub use routes::{router, AppState};
