//! Typed configuration loading.
//!
//! Loading order (later sources override earlier):
//! 1. the configuration file (or inline contents)
//! 2. sources added by `before_load` hooks (defaults, extra files)
//! 3. environment variables `PREFIX__SECTION__KEY`, when a prefix is set
//!
//! Keys registered with [`ConfigLoader::env_list_key`] are split on commas when
//! they come from the environment, so `APP__UPLOADS__ALLOWED_TYPES=a,b` fills a
//! `Vec<String>`.
//!
//! After merging, `${VAR}` and `$VAR` placeholders in string values are
//! replaced from the process environment, the result is deserialized into
//! `T`, and `after_load` hooks run on the typed value.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;

use config::{
    builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File, FileFormat,
    Source as _, Value, ValueKind,
};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

/// Separator between prefix, section and key in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Separator between items of a list-valued environment variable.
pub const LIST_SEPARATOR: &str = ",";

lazy_static! {
    static ref ENV_PLACEHOLDER_REGEX: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Configuration loading error
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Configuration file does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Hook(String),
}

type BeforeHook =
    Box<dyn FnOnce(ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>, ConfigError>>;
type AfterHook<T> = Box<dyn FnOnce(&mut T) -> Result<(), String>>;

enum Origin {
    Path(PathBuf),
    Inline(String, FileFormat),
}

/// Builder that loads a configuration struct of type `T`.
///
/// ```no_run
/// use bootstrap::config::ConfigLoader;
/// use bootstrap::logging::LoggingConfig;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Settings {
///     logging: LoggingConfig,
/// }
///
/// let settings: Settings = ConfigLoader::new("config/default.toml")
///     .with_dotenv()
///     .env_prefix("APP")
///     .before_load(|builder| builder.set_default("logging.level", "debug"))
///     .load()
///     .unwrap();
/// ```
pub struct ConfigLoader<T> {
    origin: Origin,
    env_prefix: Option<String>,
    list_keys: Vec<String>,
    dotenv: bool,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook<T>>,
}

impl<T: DeserializeOwned + 'static> ConfigLoader<T> {
    /// Loads from a file; the format is taken from its extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_origin(Origin::Path(path.into()))
    }

    /// Loads from in-memory contents.
    pub fn inline(contents: &str, format: FileFormat) -> Self {
        Self::with_origin(Origin::Inline(contents.to_string(), format))
    }

    fn with_origin(origin: Origin) -> Self {
        Self {
            origin,
            env_prefix: None,
            list_keys: Vec::new(),
            dotenv: false,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Overlays environment variables named `PREFIX__SECTION__KEY`.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Splits the environment value for `key` (dotted path, e.g. `uploads.allowed_types`)
    /// on commas.
    pub fn env_list_key(mut self, key: &str) -> Self {
        self.list_keys.push(key.to_string());
        self
    }

    /// Loads a `.env` file into the process environment first, if present.
    pub fn with_dotenv(mut self) -> Self {
        self.dotenv = true;
        self
    }

    /// Adds a hook that can register defaults or extra sources.
    pub fn before_load<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>, ConfigError>
            + 'static,
    {
        self.before.push(Box::new(hook));
        self
    }

    /// Adds a hook that runs on the deserialized value. An error aborts loading.
    pub fn after_load<F, E>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut T) -> Result<(), E> + 'static,
        E: Display,
    {
        self.after.push(Box::new(move |config: &mut T| {
            hook(config).map_err(|e| e.to_string())
        }));
        self
    }

    pub fn load(self) -> Result<T, LoadError> {
        if self.dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!(path = %path.display(), "loaded .env file"),
                Err(e) => debug!(error = %e, "no .env file loaded"),
            }
        }

        let mut builder = Config::builder();
        builder = match self.origin {
            Origin::Path(path) => {
                if !path.is_file() {
                    return Err(LoadError::NotFound(path));
                }
                info!(path = %path.display(), "loading configuration");
                builder.add_source(File::from(path.as_path()))
            }
            Origin::Inline(contents, format) => {
                builder.add_source(File::from_str(&contents, format))
            }
        };

        for hook in self.before {
            builder = hook(builder)?;
        }

        if let Some(prefix) = &self.env_prefix {
            let mut environment = Environment::with_prefix(prefix).separator(ENV_SEPARATOR);
            if !self.list_keys.is_empty() {
                environment = environment
                    .try_parsing(true)
                    .list_separator(LIST_SEPARATOR);
                for key in &self.list_keys {
                    environment = environment.with_list_parse_key(key);
                }
            }
            builder = builder.add_source(environment);
        }

        let mut table = builder.build()?.collect()?;
        for value in table.values_mut() {
            expand_value(value);
        }

        let mut loaded: T = Value::new(None, ValueKind::Table(table)).try_deserialize()?;

        for hook in self.after {
            hook(&mut loaded).map_err(LoadError::Hook)?;
        }

        Ok(loaded)
    }
}

/// Replaces `${VAR}` and `$VAR` with the variable's value; unset variables become empty.
pub fn expand_env(input: &str) -> String {
    ENV_PLACEHOLDER_REGEX
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            env::var(name).unwrap_or_default()
        })
        .into_owned()
}

fn expand_value(value: &mut Value) {
    match &mut value.kind {
        ValueKind::String(s) => {
            if s.contains('$') {
                *s = expand_env(s);
            }
        }
        ValueKind::Table(table) => table.values_mut().for_each(expand_value),
        ValueKind::Array(items) => items.iter_mut().for_each(expand_value),
        _ => {}
    }
}
