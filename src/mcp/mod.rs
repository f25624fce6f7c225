//! Tool server access: registry, discovery and invocation.
//!
//! Tool servers are configured in the `tool_servers` section:
//!
//! ```yaml
//! tool_servers:
//!   - id: echo-ping
//!     name: Echo Test
//!     url: http://localhost:5007/mcp
//!     type: http+streaming
//!     credential: ${ECHO_PING_TOKEN}
//!   - id: customer-query
//!     name: Customer Query
//!     url: http://localhost:5001
//!     type: http
//! ```
//!
//! # Tool Namespacing
//!
//! Bound tools are keyed by `(server_id, tool_name)` and exposed to decision
//! providers as `server_id__tool_name` (e.g. `echo-ping__ping`).

pub mod client;
pub mod config;
pub mod discovery;
pub mod http;
pub mod invocation;
pub mod streamable;
pub mod types;

pub use client::{ToolServerClient, TransportError, TransportRouter};
pub use config::{ToolServerDefinition, ToolServerRegistry, TransportKind};
pub use discovery::{DiscoveryService, discover, discover_all};
pub use invocation::invoke;
pub use types::{DiscoveryResult, ServerToolListing, ToolDescriptor, ToolKey};
