//! Field merge decision table.

/// Which side of a three-way comparison should supply a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeOutcome {
    /// Keep the client value.
    ClientWins,
    /// Take the server value.
    ServerWins,
    /// Both sides changed since the common ancestor.
    ThreeWayMerge,
}

/// Decides how a field should be merged.
///
/// With a known ancestor, an unchanged (or absent) server value lets the
/// client win, a cleared client value loses to a concurrent server edit,
/// and anything else needs a three-way merge. Without an ancestor the
/// server wins whenever it has a value at all.
pub fn resolve<T: PartialEq>(
    client: Option<&T>,
    ancestor: Option<&T>,
    server: Option<&T>,
) -> MergeOutcome {
    match ancestor {
        Some(ancestor) => match server {
            None => MergeOutcome::ClientWins,
            Some(server) if server == ancestor => MergeOutcome::ClientWins,
            Some(_) if client.is_none() => MergeOutcome::ServerWins,
            Some(_) => MergeOutcome::ThreeWayMerge,
        },
        None => match server {
            None => MergeOutcome::ClientWins,
            Some(_) => MergeOutcome::ServerWins,
        },
    }
}
