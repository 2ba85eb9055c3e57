use std::fmt;

use serde::Serialize;

/// Compile-time build metadata, populated by `build.rs`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub build_target: &'static str,
    pub rust_version: &'static str,
    pub version: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "version:   {}", self.version)?;
        writeln!(f, "profile:   {}", self.build_profile)?;
        writeln!(f, "features:  {}", self.build_features)?;
        writeln!(f, "target:    {}", self.build_target)?;
        writeln!(f, "built at:  {}", self.build_timestamp)?;
        write!(f, "rustc:     {}", self.rust_version)
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: env!("BUILD_PROFILE"),
        build_features: env!("BUILD_FEATURES"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        build_target: env!("BUILD_TARGET"),
        rust_version: env!("RUST_VERSION"),
        version: env!("REPO_VERSION"),
    }
}
