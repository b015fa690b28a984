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

//! Selecting the catalog entries which need a translation.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEntry, Occurrence};
use crate::modules::ModuleScope;

/// An untranslated message referenced from an in-scope file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub msgid: String,
    /// The plural msgid of a plural entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgid_plural: Option<String>,
    pub source_file: String,
    pub source_line: usize,
    pub locale: String,
}

/// Decides which occurrences make an entry extractable.
pub trait OccurrenceFilter {
    fn matches(&self, occurrence: &Occurrence) -> bool;
}

impl OccurrenceFilter for ModuleScope {
    fn matches(&self, occurrence: &Occurrence) -> bool {
        self.contains(&occurrence.file_path)
    }
}

/// Matches occurrences in files with a given extension, such as
/// HTML templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceExtension(String);

impl SourceExtension {
    pub fn new(extension: &str) -> Self {
        SourceExtension(extension.trim_start_matches('.').to_ascii_lowercase())
    }
}

impl OccurrenceFilter for SourceExtension {
    fn matches(&self, occurrence: &Occurrence) -> bool {
        occurrence
            .file_path
            .rsplit_once('.')
            .is_some_and(|(_, extension)| extension.eq_ignore_ascii_case(&self.0))
    }
}

/// Extract the entries which should be sent for translation.
///
/// An entry is extracted if it lacks a translation (for a plural
/// entry: any of its forms), is not marked fuzzy, and at least one of
/// its occurrences is accepted by `filter`. The first accepted
/// occurrence is recorded as provenance. The records follow the
/// order of `entries` and each msgid appears at most once.
pub fn extract(
    entries: &[CatalogEntry],
    filter: &dyn OccurrenceFilter,
    locale: &str,
) -> Vec<ExtractionRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for entry in entries {
        if entry.is_translated() || entry.msgid.is_empty() {
            continue;
        }
        if entry.is_fuzzy {
            debug!("Skipping fuzzy entry {:?}", entry.msgid);
            continue;
        }
        let Some(occurrence) = entry.occurrences.iter().find(|occ| filter.matches(occ)) else {
            continue;
        };
        if !seen.insert(entry.msgid.as_str()) {
            continue;
        }
        debug!(
            "Found untranslated {:?} in {}:{}",
            entry.msgid, occurrence.file_path, occurrence.line
        );
        records.push(ExtractionRecord {
            msgid: entry.msgid.clone(),
            msgid_plural: entry.msgid_plural.clone(),
            source_file: occurrence.file_path.clone(),
            source_line: occurrence.line,
            locale: String::from(locale),
        });
    }

    records
}
