pub mod api;
pub mod console;
pub mod error;

pub use error::{ConsoleError, ConsoleResult};

// Re-export the HTTP / push clients for convenience
pub use api::client::{ApiError, ConsoleApi, HttpConsoleApi};
pub use api::models::{Channel, ChannelStatus, HistoryEntry};
pub use api::push::{LogPushChannel, PushError, ReconnectPolicy, WebSocketPushClient};

// Re-export the engine surface
pub use console::engine::Console;
pub use console::events::ConsoleEvent;
pub use console::view::ConsoleView;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        assert!(std::any::type_name::<Console>().contains("Console"));
        assert!(std::any::type_name::<HttpConsoleApi>().contains("HttpConsoleApi"));
    }

    #[test]
    fn test_error_types_re_exported() {
        let err: ConsoleError = ApiError::Unauthorized.into();
        assert!(err.to_string().contains("API error"));

        let err: ConsoleError = PushError::Closed.into();
        assert!(err.to_string().contains("Push channel"));
    }
}
