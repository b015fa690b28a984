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

//! Resolving package identifiers to the set of source paths they own.
//!
//! A package such as `lino_xl.lib.cal` is looked up first in the
//! configured registry and then under each search path, the same
//! way the Python import system would find it on disk.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::error::{Error, Result};

/// Normalize a path as written in an occurrence comment.
///
/// Backslashes become forward slashes, `.` components are dropped
/// and `..` components are resolved lexically.
///
/// # Examples
///
/// ```
/// use polyglot_po::modules::normalize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(normalize_path("./app/../app\\models.py"), PathBuf::from("app/models.py"));
/// ```
pub fn normalize_path(path: &str) -> PathBuf {
    let path = path.replace('\\', "/");
    let mut result = PathBuf::new();
    for component in Path::new(&path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Path prefixes which belong to an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleScope {
    prefixes: Vec<PathBuf>,
}

impl ModuleScope {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut scope = ModuleScope::default();
        for prefix in prefixes {
            scope.insert(normalize_path(prefix.as_ref()));
        }
        scope
    }

    fn insert(&mut self, prefix: PathBuf) {
        if !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
    }

    /// Add all prefixes of `other` to this scope.
    pub fn extend(&mut self, other: ModuleScope) {
        for prefix in other.prefixes {
            self.insert(prefix);
        }
    }

    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }

    /// Check if `file_path` is equal to or nested under a prefix.
    ///
    /// The comparison is done per path component, so the prefix
    /// `app` does not match `application/models.py`.
    pub fn contains(&self, file_path: &str) -> bool {
        let path = normalize_path(file_path);
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// A package found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub name: String,
    /// Directory of the package.
    pub root: PathBuf,
    /// The package directory relative to the search path, i.e. the
    /// dotted name written as a path.
    pub relative: PathBuf,
}

impl ResolvedModule {
    /// The scope covers both relative and absolute occurrence paths.
    pub fn scope(&self) -> ModuleScope {
        let mut scope = ModuleScope::default();
        scope.insert(normalize_path(&self.relative.to_string_lossy()));
        scope.insert(normalize_path(&self.root.to_string_lossy()));
        scope
    }

    /// Location of the Django catalog for `lang`.
    pub fn catalog_path(&self, lang: &str) -> PathBuf {
        self.root
            .join("locale")
            .join(lang)
            .join("LC_MESSAGES")
            .join("django.po")
    }
}

fn is_package_name(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("well-formed regex")
    });
    re.is_match(name)
}

/// Finds packages in a registry and on the search paths.
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    registry: BTreeMap<String, PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl ModuleResolver {
    pub fn new(registry: BTreeMap<String, PathBuf>, search_paths: Vec<PathBuf>) -> Self {
        Self {
            registry,
            search_paths,
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve a dotted package identifier.
    pub fn resolve(&self, name: &str) -> Result<ResolvedModule> {
        if !is_package_name(name) {
            return Err(self.not_found(name));
        }
        let relative = name.split('.').collect::<PathBuf>();

        if let Some(root) = self.registry.get(name) {
            if root.is_dir() {
                debug!("Resolved {name} to {} via registry", root.display());
                return Ok(ResolvedModule {
                    name: String::from(name),
                    root: absolute(root),
                    relative,
                });
            }
            debug!("Registry entry for {name} is not a directory: {}", root.display());
        }

        for search_path in &self.search_paths {
            let candidate = search_path.join(&relative);
            if candidate.is_dir() {
                debug!("Resolved {name} to package {}", candidate.display());
                return Ok(ResolvedModule {
                    name: String::from(name),
                    root: absolute(&candidate),
                    relative,
                });
            }
            if candidate.with_extension("py").is_file() {
                // A plain module: its containing directory is the scope.
                let parent = relative.parent().map(Path::to_path_buf).unwrap_or_default();
                let root = search_path.join(&parent);
                debug!("Resolved {name} to module in {}", root.display());
                return Ok(ResolvedModule {
                    name: String::from(name),
                    root: absolute(&root),
                    relative: parent,
                });
            }
        }

        Err(self.not_found(name))
    }

    fn not_found(&self, name: &str) -> Error {
        let mut searched = self
            .registry
            .contains_key(name)
            .then(|| String::from("registry"))
            .into_iter()
            .chain(self.search_paths.iter().map(|path| path.display().to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        if searched.is_empty() {
            searched = String::from("no search paths");
        }
        Error::ModuleNotFound {
            name: String::from(name),
            searched,
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
