//! Process exit codes for the sshprof CLI.
//!
//! - 0: Success (including a cancelled confirmation)
//! - 1: User error (bad arguments, unknown profile, invalid config)
//! - 2: Fatal apply (the global SSH config may be partially written)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Bad arguments, missing profile, failed validation or any other ordinary error.
pub const USER_ERROR: i32 = 1;

/// Copying the profile over the global SSH config (or committing the pointer
/// afterwards) failed.
pub const APPLY_FAILURE: i32 = 2;
