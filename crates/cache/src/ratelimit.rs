//! Per-user token-bucket rate limiting (§4.1, §8 property 5): every
//! rate-limit KV entry always has a positive TTL. A Lua script makes
//! `INCR` + `EXPIRE` atomic so a crash between the two calls can never
//! leave a counter with no expiry (which would turn it into a permanent
//! block).

use redis::Script;

use relay_domain::{Error, Result};

use crate::kv::Kv;

/// `KEYS[1]` = bucket key, `ARGV[1]` = window in seconds.
/// Only sets the expiry on the first increment in a window (`INCR` returning
/// 1); subsequent increments within the window keep the original TTL.
const INCR_EXPIRE_LUA: &str = r#"
local count = redis.call("INCR", KEYS[1])
if count == 1 then
    redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return count
"#;

pub struct RateLimiter {
    kv: Kv,
}

pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: i64,
    pub limit: i64,
    /// Seconds until the window resets; surfaced as `retryAfter` (§7).
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    /// Checks and increments the bucket identified by `surface` + `subject`
    /// (e.g. `"generate"` + user id, or `"credential-write"` + user id — the
    /// spec calls out separate buckets per surface).
    pub async fn check(
        &self,
        surface: &str,
        subject: &str,
        limit: i64,
        window_secs: u64,
    ) -> Result<RateLimitDecision> {
        let key = format!("ratelimit:{surface}:{subject}");
        let mut conn = self.kv.raw();
        let count: i64 = Script::new(INCR_EXPIRE_LUA)
            .key(&key)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Other(format!("rate limit script for {key}: {e}")))?;
        Ok(RateLimitDecision {
            allowed: count <= limit,
            count,
            limit,
            retry_after_secs: window_secs,
        })
    }
}

/// Default bucket for sensitive operations (§4.1, e.g. credential writes):
/// 10 requests / 15 min.
pub const SENSITIVE_OP_LIMIT: i64 = 10;
pub const SENSITIVE_OP_WINDOW_SECS: u64 = 15 * 60;

/// Default bucket for the `generate` surface (§4.1): a separate, much
/// looser bucket than sensitive operations since this is the hot path every
/// conversational turn goes through.
pub const GENERATE_LIMIT: i64 = 30;
pub const GENERATE_WINDOW_SECS: u64 = 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lua_script_compiles() {
        // `Script::new` only parses/stores the source; this guards against a
        // typo turning the atomicity guarantee into a runtime-only failure.
        let _ = Script::new(INCR_EXPIRE_LUA);
    }
}
