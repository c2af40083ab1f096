//! `MaximumVolumeMemory` parsing and the system memory probe.

use crate::error::ConfigError;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

/// Resolves a `MaximumVolumeMemory` value to bytes.
///
/// `Automatic` leaves 1 GB of headroom below the machine's total memory,
/// with a 512 MB floor. Explicit values take the form `<N>MB` or `<N>GB`.
pub fn resolve_memory_limit(spec: &str) -> Result<u64, ConfigError> {
    if spec == "Automatic" {
        let total = system_total_memory();
        return Ok((total.saturating_sub(GB)).max(512 * MB));
    }
    parse_with_units(spec)
}

fn parse_with_units(spec: &str) -> Result<u64, ConfigError> {
    let key = "Software.MaximumVolumeMemory";
    let (number, factor) = if let Some(n) = spec.strip_suffix("MB") {
        (n, MB)
    } else if let Some(n) = spec.strip_suffix("GB") {
        (n, GB)
    } else {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("'{spec}' must be Automatic or specify MB or GB"),
        });
    };
    let value: u64 = number.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("cannot parse '{spec}' as a number of {}", if factor == MB { "MB" } else { "GB" }),
    })?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be positive".to_string(),
        });
    }
    Ok(value * factor)
}

fn system_total_memory() -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.total_memory()
}
