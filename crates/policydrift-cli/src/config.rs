//! `policydrift.toml` loading and flag merging.
//!
//! Precedence: command-line flags, then the config file, then built-in
//! defaults. Repeatable `--fail-on` / `--ignore` flags extend the file's
//! lists instead of replacing them.

use crate::cli::CompareArgs;
use policydrift_kernel::{ClassificationRules, MatchStrategy, RunSettings};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "policydrift.toml";

/// Volatile metadata ignored when no ignore list is configured anywhere.
pub const DEFAULT_IGNORE: [&str; 5] = [
    "id",
    "createdDateTime",
    "modifiedDateTime",
    "templateId",
    "@odata",
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub matching: MatchingSection,
    pub classification: ClassificationSection,
    pub run: RunSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingSection {
    pub strategy: Option<MatchStrategy>,
    pub case_sensitive: Option<bool>,
    pub mapping: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassificationSection {
    /// Replaces the built-in critical table when present.
    pub critical: Option<Vec<String>>,
    pub fail_on: Vec<String>,
    /// `Some(vec![])` disables the default ignore list.
    pub ignore: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub max_differences: Option<usize>,
    pub jobs: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: I/O error: {message}")]
    Io { path: String, message: String },

    #[error("{path}: invalid config: {message}")]
    Parse { path: String, message: String },
}

impl FileConfig {
    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(path, &text)
    }

    /// Load the explicit config, or `./policydrift.toml` when it exists.
    ///
    /// Returns the file that was read so relative paths inside it can be
    /// resolved against its directory.
    pub fn discover(explicit: Option<&str>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(path) => PathBuf::from(path),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok((Self::default(), None));
                }
                default
            }
        };
        let config = Self::load(&path)?;
        Ok((config, Some(path)))
    }
}

/// Everything a compare run needs besides the policy documents.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareSettings {
    pub strategy: MatchStrategy,
    pub case_sensitive: bool,
    pub mapping: Option<PathBuf>,
    pub rules: ClassificationRules,
    pub run: RunSettings,
}

pub fn resolve(
    args: &CompareArgs,
    file: &FileConfig,
    config_path: Option<&Path>,
) -> CompareSettings {
    let strategy = args
        .strategy
        .or(file.matching.strategy)
        .unwrap_or_default();
    let case_sensitive = args
        .case_sensitivity()
        .or(file.matching.case_sensitive)
        .unwrap_or(false);

    let config_dir = config_path.and_then(Path::parent);
    let mapping = match (&args.mapping, &file.matching.mapping) {
        (Some(flag), _) => Some(PathBuf::from(flag)),
        (None, Some(from_file)) => Some(match config_dir {
            Some(dir) if from_file.is_relative() => dir.join(from_file),
            _ => from_file.clone(),
        }),
        (None, None) => None,
    };

    let mut rules = ClassificationRules::default();
    if let Some(critical) = &file.classification.critical {
        rules = rules.with_critical(critical);
    }
    let fail_on = file
        .classification
        .fail_on
        .iter()
        .chain(args.fail_on.iter());
    rules = rules.with_fail_on(fail_on);

    let ignore: Vec<&str> = match &file.classification.ignore {
        Some(configured) => configured
            .iter()
            .chain(args.ignore.iter())
            .map(String::as_str)
            .collect(),
        None if args.ignore.is_empty() => DEFAULT_IGNORE.to_vec(),
        None => args.ignore.iter().map(String::as_str).collect(),
    };
    rules = rules.with_ignore(ignore);

    let jobs = args.jobs.or(file.run.jobs).unwrap_or_else(default_jobs);
    let run = RunSettings {
        max_differences: args.max_differences.or(file.run.max_differences),
        concurrency: jobs.max(1),
    };

    CompareSettings {
        strategy,
        case_sensitive,
        mapping,
        rules,
        run,
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CompareArgs {
        CompareArgs {
            live: "live.json".into(),
            reference: "baseline".into(),
            ..CompareArgs::default()
        }
    }

    #[test]
    fn parses_every_section() {
        let text = r#"
            [matching]
            strategy = "custom-mapping"
            case_sensitive = true
            mapping = "mapping.json"

            [classification]
            critical = ["grantControls"]
            fail_on = ["state"]
            ignore = ["modifiedDateTime"]

            [run]
            max_differences = 10
            jobs = 4
        "#;
        let config = FileConfig::parse(Path::new("policydrift.toml"), text).expect("valid config");
        assert_eq!(config.matching.strategy, Some(MatchStrategy::CustomMapping));
        assert_eq!(config.matching.case_sensitive, Some(true));
        assert_eq!(config.classification.fail_on, vec!["state".to_string()]);
        assert_eq!(config.run.max_differences, Some(10));
        assert_eq!(config.run.jobs, Some(4));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = FileConfig::parse(Path::new("p.toml"), "[matching]\nstratgy = \"by-id\"\n")
            .expect_err("typo should fail");
        assert!(err.to_string().contains("p.toml"), "{err}");
    }

    #[test]
    fn defaults_apply_without_config() {
        let settings = resolve(&args(), &FileConfig::default(), None);
        assert_eq!(settings.strategy, MatchStrategy::ByName);
        assert!(!settings.case_sensitive);
        assert_eq!(settings.run.max_differences, None);
        assert!(settings.run.concurrency >= 1);
        assert!(settings.rules.ignore.matches("modifiedDateTime"));
        assert!(settings.rules.ignore.matches("@odata.context"));
        assert!(settings.rules.critical_path_prefixes.matches("state"));
    }

    #[test]
    fn flags_override_and_extend_file_values() {
        let file = FileConfig {
            matching: MatchingSection {
                strategy: Some(MatchStrategy::ById),
                case_sensitive: None,
                mapping: Some(PathBuf::from("mapping.json")),
            },
            classification: ClassificationSection {
                critical: None,
                fail_on: vec!["conditions.locations".into()],
                ignore: Some(vec!["description".into()]),
            },
            run: RunSection {
                max_differences: Some(10),
                jobs: Some(4),
            },
        };
        let mut args = args();
        args.strategy = Some(MatchStrategy::ByName);
        args.fail_on = vec!["displayName".into()];
        args.ignore = vec!["templateId".into()];
        args.max_differences = Some(2);

        let settings = resolve(&args, &file, Some(Path::new("conf/policydrift.toml")));
        assert_eq!(settings.strategy, MatchStrategy::ByName);
        assert_eq!(settings.mapping, Some(PathBuf::from("conf/mapping.json")));
        assert!(settings.rules.fail_on.matches("conditions.locations"));
        assert!(settings.rules.fail_on.matches("displayName"));
        assert!(settings.rules.ignore.matches("description"));
        assert!(settings.rules.ignore.matches("templateId"));
        assert!(!settings.rules.ignore.matches("modifiedDateTime"));
        assert_eq!(settings.run.max_differences, Some(2));
        assert_eq!(settings.run.concurrency, 4);
    }

    #[test]
    fn case_sensitivity_flags_override_the_file_both_ways() {
        let sensitive_file = FileConfig {
            matching: MatchingSection {
                case_sensitive: Some(true),
                ..MatchingSection::default()
            },
            ..FileConfig::default()
        };
        assert!(resolve(&args(), &sensitive_file, None).case_sensitive);

        let mut insensitive = args();
        insensitive.case_insensitive = true;
        assert!(!resolve(&insensitive, &sensitive_file, None).case_sensitive);

        let mut sensitive = args();
        sensitive.case_sensitive = true;
        assert!(resolve(&sensitive, &FileConfig::default(), None).case_sensitive);
    }

    #[test]
    fn empty_ignore_list_disables_defaults() {
        let file = FileConfig {
            classification: ClassificationSection {
                ignore: Some(Vec::new()),
                ..ClassificationSection::default()
            },
            ..FileConfig::default()
        };
        let settings = resolve(&args(), &file, None);
        assert!(settings.rules.ignore.is_empty());
    }

    #[test]
    fn replacing_the_critical_table() {
        let file = FileConfig {
            classification: ClassificationSection {
                critical: Some(vec!["conditions.locations".into()]),
                ..ClassificationSection::default()
            },
            ..FileConfig::default()
        };
        let settings = resolve(&args(), &file, None);
        assert!(!settings.rules.critical_path_prefixes.matches("state"));
        assert!(settings.rules.critical_path_prefixes.matches("conditions.locations"));
    }
}
