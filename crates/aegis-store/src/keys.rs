//! Key layout shared with other processes using the same backend.
//!
//! `rl:` rate-limit windows, `cd:` cooldown stamps, `wl:`/`bl:`
//! allow/deny flags. Window-start companions live under the rate-limit
//! key with a `:win` suffix.

/// Rate-limit window counter for a `(user, job_type, job_name)` trigger.
pub fn rate_limit(user_id: &str, job_type: &str, job_name: &str) -> String {
    format!("rl:{user_id}:{job_type}:{job_name}")
}

/// Window-start companion to [`rate_limit`].
pub fn rate_limit_window(user_id: &str, job_type: &str, job_name: &str) -> String {
    format!("rl:{user_id}:{job_type}:{job_name}:win")
}

/// Cooldown stamp for a `(user, job_type, job_name)` trigger.
pub fn cooldown(user_id: &str, job_type: &str, job_name: &str) -> String {
    format!("cd:{user_id}:{job_type}:{job_name}")
}

/// Whitelist flag for a user.
pub fn whitelist(user_id: &str) -> String {
    format!("wl:{user_id}")
}

/// Blacklist flag for a user.
pub fn blacklist(user_id: &str) -> String {
    format!("bl:{user_id}")
}
