//! Modal session protocol
//!
//! Opens server-tracked modal forms, and routes their submissions through
//! identifier decoding, the pilot gate, payload validation and an atomic
//! claim before handing them to the owning flow.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use modal::channel::{ChannelConfig, DiscordChannel};
//! use modal::feature_gate::{FeatureGate, GateConfig};
//! use modal::repositories::InMemorySessionStore;
//! use modal::router::{FlowRegistry, SessionRouter};
//!
//! # async fn run(event: serde_json::Value) -> anyhow::Result<()> {
//! let router = SessionRouter::new(
//!     Arc::new(InMemorySessionStore::new()),
//!     Arc::new(DiscordChannel::new(ChannelConfig::new("1234"))),
//!     Arc::new(FeatureGate::new(GateConfig::load()?)),
//!     FlowRegistry::new(),
//! );
//!
//! if !router.route(&event).await?.handled() {
//!     // fall through to the legacy handlers
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod custom_id;
pub mod error;
pub mod feature_gate;
pub mod models;
pub mod repositories;
pub mod router;
pub mod routes;
pub mod state;
pub mod sweeper;
pub mod validation;
