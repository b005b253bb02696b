//! Constants for the Concierge engine and CLI.

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// API key for the Anthropic backend
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Model override for the Anthropic backend
pub const ENV_MODEL: &str = "CONCIERGE_MODEL";

/// Path to a TOML configuration file
pub const ENV_CONFIG_PATH: &str = "CONCIERGE_CONFIG";

/// Emit JSON log lines when "true" or "1"
pub const ENV_LOG_JSON: &str = "CONCIERGE_LOG_JSON";

/// Service name reported at startup
pub const ENV_SERVICE_NAME: &str = "CONCIERGE_SERVICE_NAME";

/// Bearer token forwarded to capabilities on behalf of the CLI user
pub const ENV_USER_TOKEN: &str = "CONCIERGE_USER_TOKEN";

// ============================================================================
// SESSIONS
// ============================================================================

/// Session used by the CLI when none is given
pub const DEFAULT_SESSION_ID: &str = "cli";

// ============================================================================
// CLI COMMANDS
// ============================================================================

/// Prefix accepting a parked proposal: `accept <proposal id>`
pub const ACCEPT_COMMAND: &str = "accept";

/// Prefix rejecting a parked proposal: `reject <proposal id>`
pub const REJECT_COMMAND: &str = "reject";
