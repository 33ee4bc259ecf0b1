// SPDX-License-Identifier: Apache-2.0

//! Command-line argument definitions.

use std::path::PathBuf;

/// Static analysis and style linting for SELinux reference policy source.
#[derive(Debug, clap::Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Policy source files or directories to check
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Path to a configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Minimum severity to report (convention, style, warning, error, fatal)
    #[arg(short, long, value_name = "SEVERITY")]
    pub severity: Option<String>,

    /// Declaration ordering strictness (ref, light, lax)
    #[arg(long, value_name = "ORDER")]
    pub order: Option<String>,

    /// Emit findings as JSON instead of human-readable text
    #[arg(short, long)]
    pub json: bool,

    /// Set output coloring ('always', 'never', or 'auto')
    #[arg(short = 'k', long, default_value = "auto", value_name = "WHEN")]
    pub color: String,

    /// Exit with a nonzero status if any findings are reported
    #[arg(long)]
    pub fail_on_finding: bool,

    /// Enable a check id even if disabled by configuration
    #[arg(long = "enable", value_name = "ID")]
    pub enable: Vec<String>,

    /// Disable a check id
    #[arg(long = "disable", value_name = "ID")]
    pub disable: Vec<String>,

    /// Only run explicitly enabled checks
    #[arg(long)]
    pub only_enabled: bool,

    /// Increase logging verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Silence all but error-level logging
    #[arg(short, long)]
    pub quiet: bool,
}
