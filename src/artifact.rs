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

//! The JSON files handed from one stage to the next.
//!
//! Both artifacts are JSON arrays of flat objects. They are written
//! once, at the end of a stage, through a temporary file which is
//! renamed into place. An interrupted run therefore never leaves a
//! truncated artifact behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

fn artifact_error(path: &Path, message: impl ToString) -> Error {
    Error::Artifact {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Read an artifact.
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = fs::read_to_string(path).map_err(|err| artifact_error(path, err))?;
    serde_json::from_str(&contents).map_err(|err| artifact_error(path, err))
}

/// Read an artifact, or return an empty list if the file does not
/// exist.
pub fn read_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match path.try_exists() {
        Ok(true) => read(path),
        Ok(false) => Ok(Vec::new()),
        Err(err) => Err(artifact_error(path, err)),
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

/// Write an artifact as pretty-printed JSON.
pub fn write<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut json = serde_json::to_string_pretty(records).map_err(|err| artifact_error(path, err))?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| artifact_error(path, err))?;
    }
    let tmp_path = temporary_path(path);
    fs::write(&tmp_path, json).map_err(|err| artifact_error(&tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| artifact_error(path, err))
}
