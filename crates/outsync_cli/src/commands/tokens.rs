//! Change-token commands.

use super::{emit, hex, open, CliResult};
use crate::Format;
use outsync_engine::ChangeTokenStore;
use outsync_protocol::ZoneId;
use serde::Serialize;
use std::path::Path;

/// Stored tokens, rendered for output.
#[derive(Debug, Serialize)]
pub struct TokensView {
    /// Shared-scope token, hex encoded.
    pub shared: Option<String>,
    /// Per-zone tokens, hex encoded.
    pub zones: Vec<ZoneTokenView>,
    /// Zones no longer synced.
    pub disabled: Vec<String>,
}

/// One zone's token.
#[derive(Debug, Serialize)]
pub struct ZoneTokenView {
    /// Zone, as `name@owner`.
    pub zone: String,
    /// Token bytes, hex encoded.
    pub token: String,
}

/// Outcome of a maintenance command.
#[derive(Debug, Serialize)]
pub struct ChangeResult {
    /// What was done.
    pub action: String,
    /// Whether anything changed.
    pub changed: bool,
}

/// Reads the stored tokens.
pub fn view(path: &Path) -> CliResult<TokensView> {
    let snapshot = ChangeTokenStore::load(open(path)?).snapshot();
    Ok(TokensView {
        shared: snapshot.shared.as_ref().map(|t| hex(t.as_bytes())),
        zones: snapshot
            .zones
            .iter()
            .map(|(zone, token)| ZoneTokenView {
                zone: zone.to_string(),
                token: hex(token.as_bytes()),
            })
            .collect(),
        disabled: snapshot.disabled.iter().map(ToString::to_string).collect(),
    })
}

/// Runs the tokens command.
pub fn list(path: &Path, format: Format) -> CliResult<()> {
    let tokens = view(path)?;
    emit(&tokens, format, |tokens| {
        println!("shared: {}", tokens.shared.as_deref().unwrap_or("(none)"));
        for zone in &tokens.zones {
            println!("{:<32} {}", zone.zone, zone.token);
        }
        for zone in &tokens.disabled {
            println!("{zone:<32} (disabled)");
        }
    })
}

/// Runs the reset-tokens command.
pub fn reset(path: &Path, zone: Option<&ZoneId>, format: Format) -> CliResult<()> {
    let tokens = ChangeTokenStore::load(open(path)?);
    let result = match zone {
        Some(zone) => ChangeResult {
            action: format!("reset token of {zone}"),
            changed: tokens.reset_zone(zone),
        },
        None => {
            tokens.reset_all();
            ChangeResult {
                action: "reset all tokens".to_string(),
                changed: true,
            }
        }
    };
    emit(&result, format, print_change)
}

/// Runs the enable-zone command.
pub fn enable(path: &Path, zone: &ZoneId, format: Format) -> CliResult<()> {
    let tokens = ChangeTokenStore::load(open(path)?);
    let result = ChangeResult {
        action: format!("enable {zone}"),
        changed: tokens.enable_zone(zone),
    };
    emit(&result, format, print_change)
}

fn print_change(result: &ChangeResult) {
    if result.changed {
        println!("Done: {}", result.action);
    } else {
        println!("Nothing to do: {}", result.action);
    }
}
