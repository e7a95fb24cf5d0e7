//! Vertex Providers: remote model connections.
//!
//! The connection document maps provider names to base URLs and auth
//! material. Clients are hydrated lazily into a TTL pool; requests are shaped
//! by a per-format strategy table (OpenAI-compatible, Anthropic, Google).

pub mod client;
pub mod config;
pub mod formats;
pub mod types;

pub use client::{ProviderClient, ProviderGateway, ProviderHydrator};
pub use config::ProviderRegistry;
pub use formats::{ApiFormat, FormatStrategy, RenderedRequest};
pub use types::{ChatMessage, ProviderConfig, ProviderSummary};
