//! CLI command implementations.

pub mod queue;
pub mod status;
pub mod tokens;

use outsync_engine::SyncDir;
use outsync_protocol::ZoneId;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::Format;

/// Result type shared by the commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Parses `name@owner`, or a bare name in the default owner's scope.
pub fn parse_zone(value: &str) -> CliResult<ZoneId> {
    let default = ZoneId::default_zone();
    let (name, owner) = match value.rsplit_once('@') {
        Some((name, owner)) => (name, owner),
        None => (value, default.owner.as_str()),
    };
    if name.is_empty() || owner.is_empty() {
        return Err(format!("invalid zone {value:?}, expected name@owner").into());
    }
    Ok(ZoneId::new(name, owner))
}

/// Opens an existing state directory, taking its lock.
pub fn open(path: &Path) -> CliResult<Arc<SyncDir>> {
    let dir = SyncDir::open(path, false)
        .map_err(|e| format!("cannot open state directory {}: {e}", path.display()))?;
    debug!(path = %path.display(), "opened state directory");
    Ok(Arc::new(dir))
}

/// Lowercase hex rendering of opaque token bytes.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Prints a JSON rendering, or the text rendering built by `text`.
pub fn emit<T, F>(value: &T, format: Format, text: F) -> CliResult<()>
where
    T: Serialize,
    F: FnOnce(&T),
{
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => text(value),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_with_owner() {
        let zone = parse_zone("Shared@alice").unwrap();
        assert_eq!(zone, ZoneId::new("Shared", "alice"));
    }

    #[test]
    fn bare_zone_uses_default_owner() {
        let zone = parse_zone("Outlines").unwrap();
        assert_eq!(zone, ZoneId::default_zone());
    }

    #[test]
    fn empty_parts_are_rejected() {
        assert!(parse_zone("@alice").is_err());
        assert!(parse_zone("Shared@").is_err());
        assert!(parse_zone("").is_err());
    }

    #[test]
    fn hex_is_lowercase() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
    }
}
