// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The optional `polyglot.toml` configuration file.
//!
//! ```toml
//! search_paths = ["/srv/lino"]
//!
//! [packages]
//! lino_xl = "/srv/lino_xl/lino_xl"
//!
//! [translator]
//! model = "gemini-2.5-flash"
//! api_key_env = "GEMINI_API_KEY"
//! batch_size = 200
//! retries = 1
//! ```
//!
//! Relative paths are resolved against the directory of the file.
//! Command line flags take precedence over the values here.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::gemini::{GeminiOptions, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::modules::ModuleResolver;
use crate::translate::TranslatorOptions;

pub const DEFAULT_CONFIG_FILE: &str = "polyglot.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorSettings {
    pub model: String,
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub batch_size: usize,
    pub retries: usize,
    pub timeout_secs: u64,
    pub source_language: String,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        let options = TranslatorOptions::default();
        Self {
            model: String::from(DEFAULT_MODEL),
            endpoint: String::from(DEFAULT_ENDPOINT),
            api_key_env: String::from("GEMINI_API_KEY"),
            batch_size: options.batch_size,
            retries: options.retries,
            timeout_secs: 120,
            source_language: String::from("en"),
        }
    }
}

impl TranslatorSettings {
    /// Read the API key from the environment.
    pub fn api_key(&self) -> Result<String> {
        match env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::Configuration(format!(
                "environment variable {} with the translation API key is not set",
                self.api_key_env
            ))),
        }
    }

    pub fn translator_options(&self) -> TranslatorOptions {
        TranslatorOptions {
            batch_size: self.batch_size,
            retries: self.retries,
        }
    }

    pub fn gemini_options(&self) -> GeminiOptions {
        GeminiOptions {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            source_language: self.source_language.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub search_paths: Vec<PathBuf>,
    /// Package directories by dotted identifier.
    pub packages: BTreeMap<String, PathBuf>,
    pub translator: TranslatorSettings,
}

impl Config {
    /// Parse a configuration, resolving relative paths against `base`.
    pub fn parse(text: &str, base: &Path) -> Result<Config> {
        let mut config: Config = toml::from_str(text)
            .map_err(|err| Error::Configuration(format!("invalid configuration: {err}")))?;
        for path in &mut config.search_paths {
            *path = base.join(&*path);
        }
        for path in config.packages.values_mut() {
            *path = base.join(&*path);
        }
        Ok(config)
    }

    /// Load the configuration.
    ///
    /// An explicitly given file must exist. Otherwise
    /// `polyglot.toml` in the working directory is used when present,
    /// and the defaults when not.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Config::default());
                }
                default
            }
        };
        let text = fs::read_to_string(&path).map_err(|err| {
            Error::Configuration(format!("could not read {}: {err}", path.display()))
        })?;
        debug!("Loaded configuration from {}", path.display());
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Config::parse(&text, &base)
    }

    /// Search paths in lookup order: `extra`, the configured paths,
    /// the entries of `pythonpath`, and the working directory.
    pub fn search_paths(&self, extra: &[PathBuf], pythonpath: Option<OsString>) -> Vec<PathBuf> {
        let mut paths = extra.to_vec();
        paths.extend(self.search_paths.iter().cloned());
        if let Some(pythonpath) = pythonpath {
            paths.extend(env::split_paths(&pythonpath).filter(|path| !path.as_os_str().is_empty()));
        }
        paths.push(PathBuf::from("."));
        paths
    }

    /// Build a resolver from the configuration and `PYTHONPATH`.
    pub fn resolver(&self, extra: &[PathBuf]) -> ModuleResolver {
        ModuleResolver::new(
            self.packages.clone(),
            self.search_paths(extra, env::var_os("PYTHONPATH")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_defaults() -> anyhow::Result<()> {
        let config = Config::parse("", Path::new("/etc/polyglot"))?;
        assert_eq!(config, Config::default());
        assert_eq!(config.translator.batch_size, 200);
        assert_eq!(config.translator.retries, 1);
        assert_eq!(config.translator.model, "gemini-2.5-flash");
        Ok(())
    }

    #[test]
    fn test_parse_full() -> anyhow::Result<()> {
        let config = Config::parse(
            "search_paths = [\"src\", \"/srv/lino\"]\n\
             \n\
             [packages]\n\
             lino_xl = \"vendor/lino_xl\"\n\
             \n\
             [translator]\n\
             model = \"gemini-2.5-pro\"\n\
             batch_size = 50\n\
             retries = 0\n\
             timeout_secs = 30\n",
            Path::new("/home/me/project"),
        )?;
        assert_eq!(
            config.search_paths,
            vec![PathBuf::from("/home/me/project/src"), PathBuf::from("/srv/lino")]
        );
        assert_eq!(
            config.packages["lino_xl"],
            PathBuf::from("/home/me/project/vendor/lino_xl")
        );
        assert_eq!(
            config.translator.translator_options(),
            TranslatorOptions {
                batch_size: 50,
                retries: 0,
            }
        );
        let gemini = config.translator.gemini_options();
        assert_eq!(gemini.model, "gemini-2.5-pro");
        assert_eq!(gemini.timeout, Duration::from_secs(30));
        assert_eq!(config.translator.api_key_env, "GEMINI_API_KEY");
        Ok(())
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let err = Config::parse("[translator]\nbatchsize = 10\n", Path::new(".")).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_load_explicit_missing() {
        let err = Config::load(Some(Path::new("/nonexistent/polyglot.toml"))).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_explicit() -> anyhow::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("custom.toml");
        fs::write(&path, "search_paths = [\"lib\"]\n")?;
        let config = Config::load(Some(&path))?;
        assert_eq!(config.search_paths, vec![tmpdir.path().join("lib")]);
        Ok(())
    }

    #[test]
    fn test_search_path_order() {
        let config = Config {
            search_paths: vec![PathBuf::from("/configured")],
            ..Config::default()
        };
        let pythonpath = env::join_paths(["/py/one", "/py/two"]).unwrap();
        assert_eq!(
            config.search_paths(&[PathBuf::from("/extra")], Some(pythonpath)),
            vec![
                PathBuf::from("/extra"),
                PathBuf::from("/configured"),
                PathBuf::from("/py/one"),
                PathBuf::from("/py/two"),
                PathBuf::from("."),
            ]
        );
    }

    #[test]
    fn test_missing_api_key() {
        let settings = TranslatorSettings {
            api_key_env: String::from("POLYGLOT_TEST_UNSET_API_KEY"),
            ..TranslatorSettings::default()
        };
        let err = settings.api_key().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: environment variable POLYGLOT_TEST_UNSET_API_KEY \
             with the translation API key is not set"
        );
    }
}
