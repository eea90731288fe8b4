//! Reverse-proxy config generation.
//!
//! The template carries two token families:
//!
//! - `#feature#` prefixes an nginx rule that blocks a feature. Removing the
//!   token activates the rule, so disabled features have their token removed.
//! - `#domain#` stands where the domain's original (pre-override) address is
//!   needed and is replaced by that address.
//!
//! Tokens with no matching flag or address are left as they are.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::collaborators::OriginalIps;
use crate::error::SystemError;

/// Feature name → disabled.
pub type FeatureFlags = BTreeMap<String, bool>;

/// Features the orchestrator disables on every run.
const DISABLED_FEATURES: &[&str] = &[
    "tsom_cc_activation_masks",
    "coverage_maps",
    "texture_synthesis_online_map_high_res",
    "color_corrected_images",
    "bing_aerial",
];

/// Returns the fixed feature flag set.
pub fn default_feature_flags() -> FeatureFlags {
    DISABLED_FEATURES
        .iter()
        .map(|name| (name.to_string(), true))
        .collect()
}

fn token(name: &str) -> String {
    format!("#{}#", name)
}

/// Renders `template`.
///
/// Disabled feature tokens are removed, then every domain token with a known
/// address is replaced by it.
pub fn render(template: &str, features: &FeatureFlags, original_ips: &OriginalIps) -> String {
    let mut out = template.to_string();

    for (feature, disabled) in features {
        if *disabled {
            out = out.replace(&token(feature), "");
        }
    }

    for (domain, ip) in original_ips {
        out = out.replace(&token(domain), ip);
    }

    out
}

/// Renders the template file into the reverse-proxy config file.
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    template_path: PathBuf,
    output_path: PathBuf,
    features: FeatureFlags,
}

impl ConfigGenerator {
    /// Creates a generator with the default feature flags.
    pub fn new(template_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            output_path: output_path.into(),
            features: default_feature_flags(),
        }
    }

    /// Reads and renders the template without writing anything.
    pub fn render_template(&self, original_ips: &OriginalIps) -> Result<String, SystemError> {
        if !self.template_path.exists() {
            return Err(SystemError::NotFound(
                self.template_path.display().to_string(),
            ));
        }
        let template = fs::read_to_string(&self.template_path)?;
        Ok(render(&template, &self.features, original_ips))
    }

    /// Renders the template and overwrites the output file.
    pub fn generate(&self, original_ips: &OriginalIps) -> Result<(), SystemError> {
        let output = self.render_template(original_ips)?;

        if let Some(parent) = self.output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.output_path, output)?;

        tracing::debug!("Wrote reverse-proxy config to {:?}", self.output_path);
        Ok(())
    }
}
