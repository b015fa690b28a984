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

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by the pipeline stages.
///
/// Every variant maps to a distinct process exit code, see
/// [`Error::exit_code`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not parse catalog {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("Could not resolve module {name:?} (searched: {searched})")]
    ModuleNotFound { name: String, searched: String },
    #[error("Translation of batch {batch} failed: {message}")]
    TranslationProvider { batch: usize, message: String },
    #[error("Could not update catalog {}: {message}", path.display())]
    CatalogWrite { path: PathBuf, message: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Could not process artifact {}: {message}", path.display())]
    Artifact { path: PathBuf, message: String },
}

impl Error {
    /// Process exit code for this kind of error.
    ///
    /// Code 2 is left to `clap`, which uses it for usage errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Configuration(_) => 3,
            Error::Parse { .. } => 4,
            Error::ModuleNotFound { .. } => 5,
            Error::TranslationProvider { .. } => 6,
            Error::CatalogWrite { .. } => 7,
            Error::Artifact { .. } => 8,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
