//! Parameter catalog and layered parameter resolution.
//!
//! A parameter is identified by a logical key (`ApiKey`). Outside the
//! process it is known by its external argument name (`api-key`, passed as
//! `--api-key`) and its environment name (`API_KEY`).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// The sources a parameter may be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSources {
    /// Command line arguments
    pub cli: bool,
    /// Process environment
    pub env: bool,
    /// `[params]` table of the configuration file
    pub config: bool,
    /// Secret provider
    pub vault: bool,
}

impl ParamSources {
    /// Every source, including the secret provider.
    pub const ALL: Self = Self {
        cli: true,
        env: true,
        config: true,
        vault: true,
    };
}

impl Default for ParamSources {
    fn default() -> Self {
        Self {
            vault: false,
            ..Self::ALL
        }
    }
}

/// Declaration of a build parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDefinition {
    /// Logical key used by targets
    pub key: String,
    /// Name used on the command line and in generated pipelines
    pub external_name: String,
    /// Human readable description, rendered as input description
    pub description: Option<String>,
    /// Whether the value must be treated as a secret
    pub secret: bool,
    /// Allowed sources
    pub sources: ParamSources,
}

impl ParamDefinition {
    /// Declare a plain parameter with the default external name.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            external_name: to_kebab_case(&key),
            key,
            description: None,
            secret: false,
            sources: ParamSources::default(),
        }
    }

    /// Declare a secret parameter, also resolvable from the secret provider.
    pub fn secret(key: impl Into<String>) -> Self {
        Self {
            secret: true,
            sources: ParamSources::ALL,
            ..Self::new(key)
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the external argument name.
    #[must_use]
    pub fn external_name(mut self, name: impl Into<String>) -> Self {
        self.external_name = name.into();
        self
    }

    /// Restrict the allowed sources.
    #[must_use]
    pub const fn sources(mut self, sources: ParamSources) -> Self {
        self.sources = sources;
        self
    }

    /// Environment variable form of the external name (`API_KEY`).
    #[must_use]
    pub fn env_name(&self) -> String {
        to_env_name(&self.external_name)
    }
}

/// Name to definition lookup table for parameters.
///
/// Keys that were never declared still resolve, using the default naming,
/// so variables (which are parameters by name) need no declaration.
#[derive(Debug, Clone, Default)]
pub struct ParamCatalog {
    definitions: BTreeMap<String, ParamDefinition>,
}

impl ParamCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any earlier one with the same key.
    pub fn insert(&mut self, definition: ParamDefinition) {
        self.definitions.insert(definition.key.clone(), definition);
    }

    /// Look up a declared parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamDefinition> {
        self.definitions.get(key)
    }

    /// Whether the key was declared.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    /// External argument name of a key.
    #[must_use]
    pub fn external_arg_name(&self, key: &str) -> String {
        self.get(key)
            .map_or_else(|| to_kebab_case(key), |def| def.external_name.clone())
    }

    /// Environment variable name of a key.
    #[must_use]
    pub fn env_name(&self, key: &str) -> String {
        to_env_name(&self.external_arg_name(key))
    }

    /// Whether the key is a secret.
    #[must_use]
    pub fn is_secret(&self, key: &str) -> bool {
        self.get(key).is_some_and(|def| def.secret)
    }

    /// Sources the key may be resolved from.
    #[must_use]
    pub fn required_sources(&self, key: &str) -> ParamSources {
        self.get(key).map_or_else(ParamSources::default, |def| def.sources)
    }

    /// All declared definitions ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = &ParamDefinition> {
        self.definitions.values()
    }
}

impl FromIterator<ParamDefinition> for ParamCatalog {
    fn from_iter<I: IntoIterator<Item = ParamDefinition>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for definition in iter {
            catalog.insert(definition);
        }
        catalog
    }
}

/// Read access to parameter values.
pub trait ParamResolution: Send + Sync {
    /// Resolve a parameter by logical key. Empty values count as missing.
    fn get_param(&self, key: &str) -> Option<String>;

    /// Store a value with top precedence for the rest of the run.
    fn cache_param(&self, key: &str, value: String);
}

/// Last-resort lookup for secret parameters.
pub trait SecretProvider: Send + Sync {
    /// Fetch a secret by its environment-style name.
    fn get_secret(&self, name: &str) -> Option<String>;
}

/// Parameter resolution over cache, CLI, environment, config and secrets.
///
/// Precedence, highest first: in-memory cache, command line, environment,
/// configuration file, secret provider (secret parameters only).
pub struct LayeredParams {
    catalog: Arc<ParamCatalog>,
    cache: RwLock<HashMap<String, String>>,
    cli: HashMap<String, String>,
    config: BTreeMap<String, String>,
    secrets: Option<Arc<dyn SecretProvider>>,
}

impl LayeredParams {
    /// Create a resolver over the given catalog with no sources filled in.
    #[must_use]
    pub fn new(catalog: Arc<ParamCatalog>) -> Self {
        Self {
            catalog,
            cache: RwLock::new(HashMap::new()),
            cli: HashMap::new(),
            config: BTreeMap::new(),
            secrets: None,
        }
    }

    /// Command line values keyed by external argument name.
    #[must_use]
    pub fn with_cli_args(mut self, args: HashMap<String, String>) -> Self {
        self.cli = args;
        self
    }

    /// Configuration file values keyed by logical key or external name.
    #[must_use]
    pub fn with_config(mut self, values: BTreeMap<String, String>) -> Self {
        self.config = values;
        self
    }

    /// Secret provider consulted for secret parameters.
    #[must_use]
    pub fn with_secret_provider(mut self, provider: Arc<dyn SecretProvider>) -> Self {
        self.secrets = Some(provider);
        self
    }

    /// The catalog backing this resolver.
    #[must_use]
    pub fn catalog(&self) -> &ParamCatalog {
        &self.catalog
    }

    fn from_cache(&self, key: &str) -> Option<String> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    fn from_cli(&self, external: &str) -> Option<String> {
        self.cli.get(external).cloned()
    }

    fn from_env(&self, external: &str) -> Option<String> {
        std::env::var(to_env_name(external))
            .ok()
            .or_else(|| std::env::var(external).ok())
    }

    fn from_config(&self, key: &str, external: &str) -> Option<String> {
        self.config
            .get(key)
            .or_else(|| self.config.get(external))
            .cloned()
    }

    fn from_secrets(&self, key: &str, external: &str, sources: ParamSources) -> Option<String> {
        if !(sources.vault && self.catalog.is_secret(key)) {
            return None;
        }
        self.secrets.as_ref()?.get_secret(&to_env_name(external))
    }
}

impl ParamResolution for LayeredParams {
    fn get_param(&self, key: &str) -> Option<String> {
        if let Some(value) = self.from_cache(key).filter(|v| !v.is_empty()) {
            return Some(value);
        }

        let external = self.catalog.external_arg_name(key);
        let sources = self.catalog.required_sources(key);

        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        let value = non_empty(sources.cli.then(|| self.from_cli(&external)).flatten())
            .or_else(|| non_empty(sources.env.then(|| self.from_env(&external)).flatten()))
            .or_else(|| {
                non_empty(
                    sources
                        .config
                        .then(|| self.from_config(key, &external))
                        .flatten(),
                )
            })
            .or_else(|| non_empty(self.from_secrets(key, &external, sources)))?;

        if self.catalog.is_secret(key) {
            keel_events::register_secret(value.clone());
        }
        tracing::trace!(param = %key, "Resolved parameter");
        Some(value)
    }

    fn cache_param(&self, key: &str, value: String) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), value);
        }
    }
}

/// Secret provider reading from a fixed map, typically filled by a vault
/// integration before the run starts.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    /// Create a provider from name/value pairs.
    pub fn new(values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl SecretProvider for StaticSecrets {
    fn get_secret(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Convert a logical key to kebab-case (`NuGetApiKey` becomes `nu-get-api-key`).
#[must_use]
pub fn to_kebab_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with('-') {
                out.push('-');
            }
        }
        out.extend(c.to_lowercase());
    }
    out.trim_end_matches('-').to_string()
}

/// Convert an external name to its environment variable form (`api-key` becomes `API_KEY`).
#[must_use]
pub fn to_env_name(external: &str) -> String {
    external
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
