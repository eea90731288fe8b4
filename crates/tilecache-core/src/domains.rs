//! Map-tile domains routed through the local reverse proxy.

/// Domains redirected to localhost while running.
///
/// Each one also appears as a `#domain#` token in the config template, where
/// it is replaced by the address the domain resolved to before the override.
pub const INTERCEPTED_DOMAINS: &[&str] = &[
    "kh.ssl.ak.tiles.virtualearth.net",
    "khstorelive.azureedge.net",
];

/// Returns the intercepted domains as owned strings.
pub fn intercepted_domains() -> Vec<String> {
    INTERCEPTED_DOMAINS.iter().map(|d| d.to_string()).collect()
}
