//! Network side of the ops console: snapshot fetchers, the push connection
//! client and endpoint configuration.

pub mod api;
pub mod config;
pub mod error;
pub mod push;

pub use api::{ApiClient, DEFAULT_LOG_LIMIT};
pub use config::{ApiBase, ClientConfig, ConfigOverrides, Environment};
pub use error::{ClientError, Result};
pub use push::{ConnectionState, PushClient, PushConfig, PushEvent, DEFAULT_RECONNECT_DELAY};
