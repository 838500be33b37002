//! MCP method name constants.

// Lifecycle
pub const INITIALIZE: &str = "initialize";
pub const PING: &str = "ping";

// Notifications
pub const INITIALIZED: &str = "notifications/initialized";
pub const CANCELLED: &str = "notifications/cancelled";

// Tools
pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";
