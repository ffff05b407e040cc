//! Derived, read-only health status.
use serde::{Deserialize, Serialize};

/// Four-valued derived health, used by every entity in the tree.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    Nok,
    Warning,
    Stopped,
}

/// Roll a set of child statuses up into one parent status.
///
/// Rule: if every child is `STOPPED`, the rollup is `STOPPED`; else if every
/// child is `OK`, the rollup is `OK`; else if any child is `NOK`, the rollup
/// is `NOK`; otherwise `WARNING`. An empty slice rolls up to `STOPPED`
/// (vacuously "all children stopped").
pub fn rollup(children: impl IntoIterator<Item = Status>) -> Status {
    let children: Vec<Status> = children.into_iter().collect();
    if children.iter().all(|s| *s == Status::Stopped) {
        return Status::Stopped;
    }
    if children.iter().all(|s| *s == Status::Ok) {
        return Status::Ok;
    }
    if children.iter().any(|s| *s == Status::Nok) {
        return Status::Nok;
    }
    Status::Warning
}

/// A parent currently mid-transition (STARTING, STOPPING, SCALING_UP, ...)
/// contributes an extra WARNING into its own rollup, on top of whatever its
/// children report.
pub fn rollup_with_transient(children: impl IntoIterator<Item = Status>, is_transient: bool) -> Status {
    if is_transient {
        let mut all = children.into_iter().collect::<Vec<_>>();
        all.push(Status::Warning);
        rollup(all)
    } else {
        rollup(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![Status::Stopped, Status::Stopped], Status::Stopped)]
    #[case(vec![Status::Ok, Status::Ok], Status::Ok)]
    #[case(vec![Status::Ok, Status::Nok], Status::Nok)]
    #[case(vec![Status::Ok, Status::Warning], Status::Warning)]
    #[case(vec![Status::Stopped, Status::Ok], Status::Warning)]
    #[case(vec![], Status::Stopped)]
    fn rollup_matches_rule(#[case] children: Vec<Status>, #[case] expected: Status) {
        assert_eq!(rollup(children), expected);
    }

    #[test]
    fn transient_parent_forces_at_least_warning() {
        assert_eq!(
            rollup_with_transient(vec![Status::Ok, Status::Ok], true),
            Status::Warning
        );
    }
}
