//! Process type classification for sources that only see raw OS processes.
//!
//! Rules come from an embedded TOML table and may be extended by
//! `/etc/herakles/process-types.toml` and `./process-types.toml`. Rules from
//! those files are consulted before the built-in ones.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::snapshot::ProcessType;

/// System-wide extra rules.
pub const SYSTEM_RULES_PATH: &str = "/etc/herakles/process-types.toml";
/// Extra rules in the working directory.
pub const LOCAL_RULES_PATH: &str = "./process-types.toml";

/// One classification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRule {
    #[serde(rename = "type")]
    pub process_type: String,
    /// Exact comm names that select this type.
    #[serde(default)]
    pub names: Vec<String>,
    /// Command-line arguments that select this type.
    #[serde(default)]
    pub args: Vec<String>,
}

impl TypeRule {
    fn matches(&self, comm: &str, cmdline: &[String]) -> bool {
        self.names.iter().any(|n| n == comm)
            || cmdline.iter().any(|arg| self.args.iter().any(|a| a == arg))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<TypeRule>,
}

/// Ordered list of classification rules.
#[derive(Debug, Clone, Default)]
pub struct TypeRules {
    rules: Vec<TypeRule>,
}

impl TypeRules {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let parsed: RulesFile = toml::from_str(content)?;
        Ok(Self {
            rules: parsed.rules,
        })
    }

    /// Built-in rules plus any rules found in the well-known files.
    pub fn load() -> Self {
        let mut rules = Self::default();
        for path in [LOCAL_RULES_PATH, SYSTEM_RULES_PATH] {
            rules.extend_from_file(Path::new(path));
        }
        match Self::from_toml_str(include_str!("../../data/process_types.toml")) {
            Ok(builtin) => rules.rules.extend(builtin.rules),
            Err(e) => warn!("Failed to parse built-in process type rules: {}", e),
        }
        rules
    }

    fn extend_from_file(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        match fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(extra) => {
                    debug!(
                        "Loaded {} process type rules from {}",
                        extra.rules.len(),
                        path.display()
                    );
                    self.rules.extend(extra.rules);
                }
                Err(e) => warn!("Failed to parse process type rules {}: {}", path.display(), e),
            },
            Err(e) => warn!("Failed to read process type rules {}: {}", path.display(), e),
        }
    }

    /// Classifies a descendant of the root process.
    ///
    /// Falls back to the comm name as an "other" type.
    pub fn classify(&self, comm: &str, cmdline: &[String]) -> ProcessType {
        self.rules
            .iter()
            .find(|r| r.matches(comm, cmdline))
            .map(|r| ProcessType::from(r.process_type.as_str()))
            .unwrap_or_else(|| ProcessType::Other(comm.to_string()))
    }

    pub fn rules(&self) -> &[TypeRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Rules used by the procfs source.
pub static TYPE_RULES: Lazy<TypeRules> = Lazy::new(TypeRules::load);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_parse() {
        let rules =
            TypeRules::from_toml_str(include_str!("../../data/process_types.toml")).unwrap();
        assert!(!rules.is_empty());
        assert!(rules.rules().iter().any(|r| r.process_type == "web"));
    }

    #[test]
    fn classify_by_name_then_args() {
        let rules = TypeRules::from_toml_str(
            r#"
            [[rules]]
            type = "webIsolated"
            names = ["Isolated Web Co"]

            [[rules]]
            type = "web"
            args = ["--type=renderer"]
            "#,
        )
        .unwrap();

        assert_eq!(
            rules.classify("Isolated Web Co", &[]),
            ProcessType::WebIsolated
        );
        assert_eq!(
            rules.classify("chrome", &["chrome".into(), "--type=renderer".into()]),
            ProcessType::Web
        );
        assert_eq!(
            rules.classify("bash", &["bash".into()]),
            ProcessType::Other("bash".into())
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = TypeRules::from_toml_str(
            r#"
            [[rules]]
            type = "preallocated"
            names = ["Web Content"]

            [[rules]]
            type = "web"
            names = ["Web Content"]
            "#,
        )
        .unwrap();
        assert_eq!(rules.classify("Web Content", &[]), ProcessType::Preallocated);
    }
}
