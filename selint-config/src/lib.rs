// SPDX-License-Identifier: Apache-2.0

//! The configuration record consumed by the analysis core.
//!
//! The core never reads a configuration file itself; it consumes a
//! populated [`Config`]. Parsing TOML into that record is the one piece of
//! "reading configuration from a file format" this crate owns, kept small
//! and isolated in [`Config::load_from`] / [`Config::load_or_default`].

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use selint_error::{Error, ErrorKind, Result};

/// One of the five severity bands a finding (or a check-id) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Severity {
    Convention,
    Style,
    Warning,
    Error,
    Fatal,
}

impl TryFrom<String> for Severity {
    type Error = Error;

    fn try_from(value: String) -> Result<Severity> {
        value.parse()
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> String {
        value.code().to_string()
    }
}

impl Severity {
    /// The single-letter code used in finding output and check ids.
    pub fn code(self) -> char {
        match self {
            Severity::Convention => 'C',
            Severity::Style => 'S',
            Severity::Warning => 'W',
            Severity::Error => 'E',
            Severity::Fatal => 'F',
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Severity> {
        match s.to_ascii_uppercase().as_str() {
            "C" => Ok(Severity::Convention),
            "S" => Ok(Severity::Style),
            "W" => Ok(Severity::Warning),
            "E" => Ok(Severity::Error),
            "F" => Ok(Severity::Fatal),
            other => Err(Error::with_kind(
                ErrorKind::ConfigParseError,
                format!("unrecognized severity '{other}', expected one of C, S, W, E, F"),
            )),
        }
    }
}

/// A check identifier of the form `<severity letter>-<number>`, e.g. `S-010`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckId(String);

impl CheckId {
    pub fn new(id: impl Into<String>) -> Result<CheckId> {
        let id = id.into();
        let valid = {
            let mut chars = id.chars();
            let sev = chars.next();
            let dash = chars.next();
            let rest: String = chars.collect();
            matches!(sev, Some('C' | 'S' | 'W' | 'E' | 'F'))
                && dash == Some('-')
                && !rest.is_empty()
                && rest.chars().all(|c| c.is_ascii_digit())
        };

        if !valid {
            return Err(Error::with_kind(
                ErrorKind::ConfigParseError,
                format!("'{id}' is not a valid check id (expected e.g. 'S-010')"),
            ));
        }

        Ok(CheckId(id))
    }

    pub fn severity(&self) -> Severity {
        // `new` already validated the first character is one of these.
        match self.0.as_bytes()[0] {
            b'C' => Severity::Convention,
            b'S' => Severity::Style,
            b'W' => Severity::Warning,
            b'E' => Severity::Error,
            _ => Severity::Fatal,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CheckId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three style-guide strictness levels the ordering engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderConf {
    #[default]
    Ref,
    Light,
    Lax,
}

impl FromStr for OrderConf {
    type Err = Error;

    fn from_str(s: &str) -> Result<OrderConf> {
        match s.to_ascii_lowercase().as_str() {
            "ref" => Ok(OrderConf::Ref),
            "light" => Ok(OrderConf::Light),
            "lax" => Ok(OrderConf::Lax),
            other => Err(Error::with_kind(
                ErrorKind::ConfigParseError,
                format!("unrecognized order_conf '{other}', expected ref, light, or lax"),
            )),
        }
    }
}

impl TryFrom<String> for OrderConf {
    type Error = Error;

    fn try_from(value: String) -> Result<OrderConf> {
        value.parse()
    }
}

impl From<OrderConf> for String {
    fn from(value: OrderConf) -> String {
        match value {
            OrderConf::Ref => "ref",
            OrderConf::Light => "light",
            OrderConf::Lax => "lax",
        }
        .to_string()
    }
}

/// The declaration kinds C-006 expects to see required in a fixed relative
/// order inside a `gen_require`/`require` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Bool,
    Class,
    Role,
    RoleAttribute,
    Attribute,
    Type,
}

fn default_order_requires() -> Vec<DeclKind> {
    use DeclKind::*;
    vec![Bool, Class, Role, RoleAttribute, Attribute, Type]
}

#[derive(Debug, Clone, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    #[default(Severity::Convention)]
    pub severity_threshold: Severity,
}

#[derive(Debug, Clone, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingConfig {
    #[default(OrderConf::Ref)]
    pub order_conf: OrderConf,
    #[default(_code = "default_order_requires()")]
    pub order_requires: Vec<DeclKind>,
    #[default(false)]
    pub ordering_requires_same_flavor: bool,
}

#[derive(Debug, Clone, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    #[default(false)]
    pub skip_checking_generated_fcs: bool,
    pub custom_fc_macros: Vec<String>,
    pub custom_te_simple_macros: Vec<String>,
}

#[derive(Debug, Clone, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct AssumeConfig {
    pub users: Vec<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
    #[default(false)]
    pub only_enabled: bool,
}

/// The full configuration record the analysis core consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub ordering: OrderingConfig,
    pub files: FilesConfig,
    pub assume: AssumeConfig,
    pub checks: ChecksConfig,
}

impl Config {
    /// Load a configuration from a TOML file. A missing file is not an
    /// error; defaults apply. A present-but-invalid file aborts the run.
    pub fn load_from(path: &Path) -> Result<Config> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config file at {}, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(err) => return Err(Error::new(err).with_kind_override(ErrorKind::Io).context(format!(
                "failed to read config file {}",
                path.display()
            ))),
        };

        toml::from_str(&raw).map_err(|err| {
            Error::with_kind(ErrorKind::ConfigParseError, err.to_string())
                .context(format!("failed to parse config file {}", path.display()))
        })
    }

    /// Load from `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Config::load_from(path),
            None => Ok(Config::default()),
        }
    }

    pub fn enabled_check_ids(&self) -> Result<Vec<CheckId>> {
        self.checks.enabled.iter().map(|s| CheckId::new(s.clone())).collect()
    }

    pub fn disabled_check_ids(&self) -> Result<Vec<CheckId>> {
        self.checks.disabled.iter().map(|s| CheckId::new(s.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_convention_threshold() {
        let config = Config::default();
        assert_eq!(config.general.severity_threshold, Severity::Convention);
        assert_eq!(config.ordering.order_conf, OrderConf::Ref);
    }

    #[test]
    fn default_order_requires_matches_spec_order() {
        let config = Config::default();
        assert_eq!(
            config.ordering.order_requires,
            vec![
                DeclKind::Bool,
                DeclKind::Class,
                DeclKind::Role,
                DeclKind::RoleAttribute,
                DeclKind::Attribute,
                DeclKind::Type,
            ]
        );
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.general.severity_threshold, Severity::Convention);
    }

    #[test]
    fn parses_a_populated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selint.toml");
        std::fs::write(
            &path,
            r#"
            [general]
            severity_threshold = "W"

            [ordering]
            order_conf = "light"

            [checks]
            enabled = ["S-010"]
            "#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.general.severity_threshold, Severity::Warning);
        assert_eq!(config.ordering.order_conf, OrderConf::Light);
        assert_eq!(config.checks.enabled, vec!["S-010".to_string()]);
    }

    #[test]
    fn invalid_file_is_a_config_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selint.toml");
        std::fs::write(&path, "not valid toml = = =").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigParseError);
    }

    #[test]
    fn check_id_validates_shape() {
        assert!(CheckId::new("S-010").is_ok());
        assert!(CheckId::new("bogus").is_err());
        assert!(CheckId::new("S010").is_err());
        assert_eq!(CheckId::new("W-007").unwrap().severity(), Severity::Warning);
    }
}
