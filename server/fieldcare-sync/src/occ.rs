//! Version gate: per-entity optimistic concurrency control.
//!
//! The stored version is authoritative. A client that lost a race must
//! re-pull, re-resolve, and re-submit with the refreshed version; the
//! engine never merges.

/// Outcome of comparing a client-supplied base version against the
/// stored version of an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Mutation may proceed
    Proceed,
    /// The client's view is stale; surface a conflict with server state
    Stale { server_version: i64 },
}

/// Gate a mutation of a record currently at `current_version`.
///
/// An absent `base_version` means "no base known" and always proceeds
/// (create-or-blind-upsert).
pub fn check(base_version: Option<i64>, current_version: i64) -> Gate {
    match base_version {
        None => Gate::Proceed,
        Some(base) if base == current_version => Gate::Proceed,
        Some(_) => Gate::Stale {
            server_version: current_version,
        },
    }
}

/// Versions increase by exactly 1 per accepted update, never skipped or
/// reused.
pub fn next_version(current_version: i64) -> i64 {
    current_version + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_base_proceeds() {
        assert_eq!(check(None, 7), Gate::Proceed);
    }

    #[test]
    fn test_matching_base_proceeds() {
        assert_eq!(check(Some(3), 3), Gate::Proceed);
    }

    #[test]
    fn test_stale_base_is_rejected() {
        assert_eq!(check(Some(1), 2), Gate::Stale { server_version: 2 });
    }

    #[test]
    fn test_future_base_is_rejected() {
        // A base the server never issued is just as stale.
        assert_eq!(check(Some(9), 2), Gate::Stale { server_version: 2 });
    }

    #[test]
    fn test_next_version_increments_by_one() {
        assert_eq!(next_version(1), 2);
        assert_eq!(next_version(41), 42);
    }
}
