use std::sync::atomic::{AtomicI64, Ordering};

use mflow_core::{NodeError, ParameterValue};

pub const PROCESS_GID: &str = "process_gid";
pub const PROCESS_UID: &str = "process_uid";
pub const N_MESSAGES: &str = "n_messages";

pub fn is_reserved(name: &str) -> bool {
    matches!(name, PROCESS_GID | PROCESS_UID | N_MESSAGES)
}

/// Tracks the `n_messages` stop-after-N counter. `-1` means unset (no
/// limit). Owned by the Processor Worker.
#[derive(Default)]
pub struct MessageLimit {
    remaining: AtomicI64,
}

impl MessageLimit {
    pub fn new() -> Self {
        MessageLimit {
            remaining: AtomicI64::new(-1),
        }
    }

    pub fn set(&self, n: i64) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    /// Called once per processed message; returns `true` once the limit has
    /// just been reached (the caller should clear the live-flag).
    pub fn record_one_processed(&self) -> bool {
        let prev = self.remaining.load(Ordering::SeqCst);
        if prev < 0 {
            return false;
        }
        if prev == 0 {
            return true;
        }
        let next = prev - 1;
        self.remaining.store(next, Ordering::SeqCst);
        next == 0
    }
}

fn as_integer(value: &ParameterValue) -> Option<i64> {
    value.as_i64()
}

/// Applies `process_gid` / `process_uid` (gid always before uid — the
/// original source swaps these; that is a bug, not the intended order) or
/// `n_messages`. Any other reserved-looking misuse is `InvalidParameter`.
pub fn apply_reserved(
    name: &str,
    value: &ParameterValue,
    limit: &MessageLimit,
) -> Result<(), NodeError> {
    match name {
        N_MESSAGES => {
            let n = as_integer(value).ok_or_else(|| NodeError::InvalidParameter {
                name: name.to_string(),
                reason: "expected a non-negative integer".to_string(),
            })?;
            if n < 0 {
                return Err(NodeError::InvalidParameter {
                    name: name.to_string(),
                    reason: "n_messages must not be negative".to_string(),
                });
            }
            limit.set(n);
            Ok(())
        }
        PROCESS_GID => apply_gid(value),
        PROCESS_UID => apply_uid(value),
        other => Err(NodeError::InvalidParameter {
            name: other.to_string(),
            reason: "not a recognized reserved parameter".to_string(),
        }),
    }
}

#[cfg(unix)]
fn apply_gid(value: &ParameterValue) -> Result<(), NodeError> {
    let gid = as_integer(value).ok_or_else(|| NodeError::InvalidParameter {
        name: PROCESS_GID.to_string(),
        reason: "expected an integer gid".to_string(),
    })?;
    // SAFETY: setgid with a value obtained from validated input; failure is
    // reported, not ignored.
    let rc = unsafe { libc::setgid(gid as libc::gid_t) };
    if rc != 0 {
        return Err(NodeError::InvalidParameter {
            name: PROCESS_GID.to_string(),
            reason: format!("setgid({gid}) failed: {}", std::io::Error::last_os_error()),
        });
    }
    Ok(())
}

#[cfg(unix)]
fn apply_uid(value: &ParameterValue) -> Result<(), NodeError> {
    let uid = as_integer(value).ok_or_else(|| NodeError::InvalidParameter {
        name: PROCESS_UID.to_string(),
        reason: "expected an integer uid".to_string(),
    })?;
    // SAFETY: setuid with a value obtained from validated input; failure is
    // reported, not ignored. Must run after apply_gid — dropping uid first
    // would remove the privilege needed to still change gid.
    let rc = unsafe { libc::setuid(uid as libc::uid_t) };
    if rc != 0 {
        return Err(NodeError::InvalidParameter {
            name: PROCESS_UID.to_string(),
            reason: format!("setuid({uid}) failed: {}", std::io::Error::last_os_error()),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_gid(_value: &ParameterValue) -> Result<(), NodeError> {
    Err(NodeError::InvalidParameter {
        name: PROCESS_GID.to_string(),
        reason: "process identity parameters are only supported on unix targets".to_string(),
    })
}

#[cfg(not(unix))]
fn apply_uid(_value: &ParameterValue) -> Result<(), NodeError> {
    Err(NodeError::InvalidParameter {
        name: PROCESS_UID.to_string(),
        reason: "process identity parameters are only supported on unix targets".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn n_messages_counts_down_and_signals_at_zero() {
        let limit = MessageLimit::new();
        limit.set(2);
        assert!(!limit.record_one_processed());
        assert!(limit.record_one_processed());
    }

    #[test]
    fn unset_limit_never_signals() {
        let limit = MessageLimit::new();
        for _ in 0..1000 {
            assert!(!limit.record_one_processed());
        }
    }

    #[test]
    fn n_messages_rejects_negative() {
        let limit = MessageLimit::new();
        let err = apply_reserved(N_MESSAGES, &json!(-1), &limit).unwrap_err();
        assert!(matches!(err, NodeError::InvalidParameter { .. }));
    }

    #[test]
    fn unknown_reserved_name_is_invalid_parameter() {
        let limit = MessageLimit::new();
        let err = apply_reserved("process_nice", &json!(5), &limit).unwrap_err();
        assert!(matches!(err, NodeError::InvalidParameter { .. }));
    }

    #[test]
    fn is_reserved_matches_exactly_the_three_names() {
        assert!(is_reserved("process_uid"));
        assert!(is_reserved("process_gid"));
        assert!(is_reserved("n_messages"));
        assert!(!is_reserved("threshold"));
    }
}
