//! hall-chat: streaming assistant chat client for the hall admin backend
//!
//! - `api`: REST transport and stream opening (`ChatBackend`, `ApiClient`)
//! - `stream`: SSE push channel and the per-stream reducer
//! - `store`: conversation list and history cache
//! - `chat`: message list reducer and the chat view controller
//! - `session`: per-session wiring of the above

pub mod api;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod session;
pub mod store;
pub mod stream;
pub mod types;

pub use api::{ApiClient, ChatBackend};
pub use chat::{ChatController, ChatStatus, ConnectionStatus, StreamProgress, SubmitOutcome};
pub use config::{ChatSettings, Config};
pub use error::{HallChatError, Result, TransportError, TransportErrorKind};
pub use session::Session;
