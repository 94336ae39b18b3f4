//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract - scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, unknown user) |
//! | 40-49   | hub              | Hub registration and call codes          |

use sitehub_client::HubError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown user, invalid JSON argument.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Hub (40-49)
// =============================================================================

/// Site or user has not completed registration with the hub.
pub const EXIT_HUB_NOT_REGISTERED: u8 = 40;

/// Hub could not be reached (connection refused, DNS, timeout).
pub const EXIT_HUB_NETWORK: u8 = 42;

/// Hub answered, but rejected the request or sent a malformed response.
pub const EXIT_HUB_PROTOCOL: u8 = 43;

/// Local settings or user records unreadable/unwritable.
pub const EXIT_HUB_CONFIG: u8 = 44;

/// Map a hub error to its exit code.
pub fn hub_exit_code(err: &HubError) -> u8 {
    match err {
        HubError::NotRegistered(_) => EXIT_HUB_NOT_REGISTERED,
        HubError::Transport(_) => EXIT_HUB_NETWORK,
        HubError::Http(..) | HubError::Protocol(_) => EXIT_HUB_PROTOCOL,
        HubError::Configuration(_) => EXIT_HUB_CONFIG,
    }
}
