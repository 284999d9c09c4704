//! Slack adapter: Web API client, Socket Mode loop, and the event
//! dispatch table.

pub mod api;
pub mod dispatch;
pub mod events;
pub mod socket;

pub use api::SlackClient;
pub use dispatch::Dispatcher;
pub use socket::SocketModeClient;
