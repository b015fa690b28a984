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

//! Merging translations back into catalogs.
//!
//! Only the msgstr lines of the translated entries change. The rest
//! of the file, including comments and obsolete entries, is written
//! back exactly as it was read.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use polib::catalog::Catalog;
use polib::mo_file;

use crate::artifact;
use crate::catalog;
use crate::error::{Error, Result};
use crate::po_text::PoText;
use crate::translate::{Translation, TranslationRecord};

/// Translations by msgid.
pub type Translations = BTreeMap<String, Translation>;

/// Read translation artifacts for `locale`.
///
/// Later files override earlier ones. Records for other locales are
/// ignored.
pub fn load_translations(paths: &[PathBuf], locale: &str) -> Result<Translations> {
    let mut translations = Translations::new();
    for path in paths {
        let records = artifact::read::<TranslationRecord>(path)?;
        let total = records.len();
        let mut used = 0;
        for record in records {
            if record.locale != locale {
                debug!("Ignoring {:?} for locale {}", record.msgid, record.locale);
                continue;
            }
            translations.insert(record.msgid.clone(), record.translation());
            used += 1;
        }
        info!("Loaded {used} of {total} translations from {}", path.display());
    }
    Ok(translations)
}

/// What happened to the translations applied to one catalog.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub updated: usize,
    /// The catalog already had this translation.
    pub unchanged: usize,
    /// Empty translations, and translations whose forms do not fit
    /// the entry.
    pub skipped: usize,
    /// Msgids which are not in the catalog.
    pub missing: Vec<String>,
}

/// The msgstr forms to write for an entry, or why there are none.
fn forms_for(
    msgid: &str,
    msgid_plural: Option<&str>,
    translation: &Translation,
    nplurals: Option<usize>,
    current_forms: usize,
) -> std::result::Result<Vec<String>, String> {
    let forms = match (msgid_plural, translation) {
        (None, Translation::Singular(text)) => vec![text.clone()],
        (Some(_), Translation::Plural(forms)) => {
            let expected = nplurals.unwrap_or(current_forms);
            if forms.len() != expected {
                return Err(format!(
                    "{msgid:?} needs {expected} plural forms, the translation has {}",
                    forms.len()
                ));
            }
            forms.clone()
        }
        (Some(_), Translation::Singular(_)) => {
            return Err(format!("{msgid:?} is a plural message, the translation is not"));
        }
        (None, Translation::Plural(_)) => {
            return Err(format!("{msgid:?} is not a plural message, the translation is"));
        }
    };
    if forms.iter().any(|form| form.trim().is_empty()) {
        return Err(format!("empty translation for {msgid:?}"));
    }
    Ok(forms)
}

/// Set the msgstr of every entry which has a translation.
///
/// Entries without a translation are not touched, neither are flags:
/// the pipeline never marks anything fuzzy, so an existing fuzzy
/// flag was set by a human and stays. Plural translations must have
/// as many forms as the `Plural-Forms` header asks for.
pub fn apply(text: &mut PoText, translations: &Translations) -> UpdateReport {
    let mut report = UpdateReport::default();
    let mut found = HashSet::new();
    let nplurals = text.nplurals();

    for idx in 0..text.entries().len() {
        let entry = &text.entries()[idx];
        if entry.is_header() {
            continue;
        }
        let Some(translation) = translations.get(&entry.msgid) else {
            continue;
        };
        found.insert(entry.msgid.clone());

        let forms = match forms_for(
            &entry.msgid,
            entry.msgid_plural.as_deref(),
            translation,
            nplurals,
            entry.msgstr.len(),
        ) {
            Ok(forms) => forms,
            Err(reason) => {
                warn!("Skipping translation: {reason}");
                report.skipped += 1;
                continue;
            }
        };
        if entry.msgstr.iter().map(|field| &field.value).eq(forms.iter()) {
            report.unchanged += 1;
            continue;
        }
        debug!("Updating {:?} -> {:?}", entry.msgid, forms);
        text.set_msgstr(idx, &forms);
        report.updated += 1;
    }

    report.missing = translations
        .keys()
        .filter(|msgid| !found.contains(*msgid))
        .cloned()
        .collect();
    report
}

fn write_error(path: &Path, message: impl ToString) -> Error {
    Error::CatalogWrite {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn compile_to(catalog: &Catalog, mo_path: &Path) -> Result<()> {
    mo_file::write(catalog, mo_path).map_err(|err| write_error(mo_path, err))?;
    info!("Compiled {}", mo_path.display());
    Ok(())
}

/// Apply `translations` to the catalog at `path`.
///
/// The catalog is read fresh from disk. The result is written to
/// `output`, or back to `path`. A catalog without changes is not
/// rewritten; when `output` is a different file the input is copied
/// there. With `compile`, a `.mo` file is written next to the output.
pub fn update_file(
    path: &Path,
    output: Option<&Path>,
    translations: &Translations,
    compile: bool,
) -> Result<UpdateReport> {
    let mut text = catalog::open(path).map_err(|err| write_error(path, err))?.text;
    let report = apply(&mut text, translations);
    for msgid in &report.missing {
        warn!("msgid not found in {}: {msgid:?}", path.display());
    }

    let target = output.unwrap_or(path);
    if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| write_error(target, err))?;
    }
    if text.is_modified() {
        fs::write(target, text.to_string()).map_err(|err| write_error(target, err))?;
        info!("Wrote {} updated messages to {}", report.updated, target.display());
    } else if target != path {
        fs::copy(path, target).map_err(|err| write_error(target, err))?;
        info!("No changes, copied {} to {}", path.display(), target.display());
    } else {
        info!("No changes to {}", path.display());
    }

    if compile {
        let catalog = catalog::load(target).map_err(|err| write_error(target, err))?;
        compile_to(&catalog, &target.with_extension("mo"))?;
    }
    Ok(report)
}

/// Compile a PO file into a binary MO file.
pub fn compile(po_path: &Path, mo_path: &Path) -> Result<()> {
    let catalog = catalog::load(po_path)?;
    compile_to(&catalog, mo_path)
}
