//! # Configuration
//!
//! Settings are read from a YAML file that is first rendered as a `tera`
//! template, so values can come from the environment:
//!
//! ```yaml
//! logger:
//!   level: info
//!   format: compact
//! ontology:
//!   languages: [en, fr]
//!   prefixes:
//!     vocabulary: http://www.opensilex.org/vocabulary/oeso#
//! sparql:
//!   endpoint: {{ get_env(name="SPARQL_ENDPOINT", default="http://localhost:7200/repositories/ontology") }}
//! ```
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ontology::hierarchy::MAX_GRAPH_PATH_LENGTH, Error, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logger: Logger,
    pub ontology: OntologySettings,
    pub sparql: SparqlSettings,
}

/// Logger configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Logger {
    pub enable: bool,

    /// Pretty backtrace on errors
    pub pretty_backtrace: bool,

    /// Level as an `EnvFilter` directive, e.g. `info` or `ontology_store=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,

    pub format: LogFormat,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            enable: true,
            pretty_backtrace: false,
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum LogFormat {
    #[default]
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "pretty")]
    Pretty,
    #[serde(rename = "json")]
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OntologySettings {
    /// Languages whose label and comment translations are loaded. Must not be empty.
    pub languages: Vec<String>,

    /// Namespace prefixes on top of the built-in `rdf`, `rdfs`, `owl` and `xsd`.
    pub prefixes: BTreeMap<String, String>,

    /// Longest subclass path followed when resolving ancestors.
    pub max_ancestor_path: usize,
}

impl Default for OntologySettings {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string(), "fr".to_string()],
            prefixes: BTreeMap::new(),
            max_ancestor_path: MAX_GRAPH_PATH_LENGTH,
        }
    }
}

impl OntologySettings {
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(Error::Config(
                "ontology.languages must list at least one language".to_string(),
            ));
        }
        if self.max_ancestor_path == 0 {
            return Err(Error::Config(
                "ontology.max_ancestor_path must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SparqlSettings {
    /// SPARQL 1.1 query endpoint.
    pub endpoint: String,

    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SparqlSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7200/repositories/ontology".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Reads, renders and validates the configuration file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Checks settings that deserialization alone cannot.
    ///
    /// # Errors
    /// [`Error::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.ontology.validate()?;
        if self.sparql.endpoint.is_empty() {
            return Err(Error::Config("sparql.endpoint cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = Error;

    /// Renders `content` through `tera` and parses the resulting YAML.
    fn from_str(content: &str) -> Result<Self> {
        let rendered = render_string(content, &serde_json::json!({}))?;
        let config: Self = serde_yaml::from_str(&rendered)?;
        config.validate()?;
        Ok(config)
    }
}

/// Renders a one-off template with the `get_env` function registered.
fn render_string(template: &str, locals: &serde_json::Value) -> Result<String> {
    let mut tera = tera::Tera::default();
    tera.register_function("get_env", get_env);
    let context = tera::Context::from_serialize(locals)?;
    Ok(tera.render_str(template, &context)?)
}

fn get_env(args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
    let name = args
        .get("name")
        .and_then(tera::Value::as_str)
        .ok_or_else(|| tera::Error::msg("get_env requires a `name` argument"))?;
    match std::env::var(name) {
        Ok(value) => Ok(tera::Value::String(value)),
        Err(_) => args
            .get("default")
            .cloned()
            .ok_or_else(|| tera::Error::msg(format!("environment variable `{name}` is not set"))),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, LogFormat};
    use crate::Error;

    #[test]
    fn renders_environment_defaults() {
        let config: Config = r#"
logger:
  format: json
ontology:
  languages: [en]
  prefixes:
    vocabulary: http://example.org/vocabulary#
sparql:
  endpoint: {{ get_env(name="ONTOLOGY_STORE_TEST_UNSET_ENDPOINT", default="http://localhost:3030/ds") }}
"#
        .parse()
        .expect("valid configuration");

        assert_eq!(config.logger.format, LogFormat::Json);
        assert_eq!(config.ontology.languages, vec!["en".to_string()]);
        assert_eq!(config.ontology.max_ancestor_path, 20);
        assert_eq!(config.sparql.endpoint, "http://localhost:3030/ds");
        assert_eq!(config.sparql.timeout_ms, 30_000);
    }

    #[test]
    fn rejects_empty_language_list() {
        let err = "ontology:\n  languages: []\n"
            .parse::<Config>()
            .expect_err("no languages");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_environment_without_default_fails() {
        let err = "sparql:\n  endpoint: {{ get_env(name=\"ONTOLOGY_STORE_TEST_UNSET_ENDPOINT\") }}\n"
            .parse::<Config>()
            .expect_err("unset variable");
        assert!(matches!(err, Error::Template(_)));
    }
}
