//! Shared defaults, guardrails and environment overrides.

// Height thresholds (millimetres)
pub const DEFAULT_BOTTOM_THRESHOLD: f64 = 0.5;
pub const DEFAULT_TOP_THRESHOLD: f64 = -7.0;

// Protocol discovery
pub const PROTOCOL_EXTENSION: &str = "py";
pub const INIT_FILE_NAME: &str = "__init__.py";

// Output layout
pub const AUDITED_DIR_NAME: &str = "Z_Test_Audited";
pub const AUDITED_FILE_PREFIX: &str = "AUDIT_";
pub const COMBINATION_DUMP_FILE: &str = "output.txt";
pub const DEFAULT_VARIANT_DIR: &str = "generated_protocols";

// External simulator
pub const SIMULATOR_COMMAND: &str = "opentrons_simulate";

// Parameter entry point
pub const PARAMETER_ENTRY_POINT: &str = "add_parameters";

// Environment variables
pub const ENV_BOTTOM_THRESHOLD: &str = "PROTOSCAN_BOTTOM_THRESHOLD";
pub const ENV_TOP_THRESHOLD: &str = "PROTOSCAN_TOP_THRESHOLD";
pub const ENV_CLAMP_TOP: &str = "PROTOSCAN_CLAMP_TOP";
pub const ENV_INSPECT_TOP_KEYWORD: &str = "PROTOSCAN_INSPECT_TOP_KEYWORD";
pub const ENV_MAX_COMBINATIONS: &str = "PROTOSCAN_MAX_COMBINATIONS";

/// Interpret a flag value; unset or unrecognized values yield `default`.
pub fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

pub fn env_flag(name: &str, default: bool) -> bool {
    parse_flag(std::env::var(name).ok().as_deref(), default)
}

/// A finite float from the environment, or `default`.
pub fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Optional cap on generated combinations. Zero or garbage disables it.
pub fn combination_limit_from_env() -> Option<usize> {
    parse_limit(std::env::var(ENV_MAX_COMBINATIONS).ok().as_deref())
}

pub fn parse_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}
