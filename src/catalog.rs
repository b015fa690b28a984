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

//! Reading Gettext catalogs into a flat list of entries.
//!
//! The PO grammar itself is handled by [`polib`]. This module only
//! turns the parsed messages into [`CatalogEntry`] values which keep
//! the occurrence comments (`#: path:line`) in a structured form.

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::panic;
use std::path::Path;

use log::{debug, warn};
use polib::catalog::Catalog;
use polib::po_file;

use crate::error::{Error, Result};
use crate::po_text::PoText;

/// A source reference from a `#:` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub file_path: String,
    /// Line number, or 0 when the reference has none.
    pub line: usize,
}

/// One message of a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogEntry {
    pub msgid: String,
    pub msgid_plural: Option<String>,
    /// Empty for untranslated and for plural entries.
    pub msgstr: String,
    /// The forms of a plural entry.
    pub msgstr_plural: Vec<String>,
    pub occurrences: Vec<Occurrence>,
    pub flags: Vec<String>,
    pub is_fuzzy: bool,
}

impl CatalogEntry {
    pub fn is_plural(&self) -> bool {
        self.msgid_plural.is_some()
    }

    /// A plural entry is translated only when every form is.
    pub fn is_translated(&self) -> bool {
        if self.is_plural() {
            !self.msgstr_plural.is_empty() && self.msgstr_plural.iter().all(|form| !form.is_empty())
        } else {
            !self.msgstr.is_empty()
        }
    }
}

/// Parse the occurrences stored in a message source.
///
/// The source holds whitespace separated `path:line` references, one
/// or more per `#:` line. File names containing spaces are wrapped
/// in Unicode isolation marks by GNU Gettext, these are removed.
///
/// # Examples
///
/// ```
/// use polyglot_po::catalog::{parse_occurrences, Occurrence};
///
/// assert_eq!(
///     parse_occurrences("app/models.py:10\ntemplates/base.html"),
///     vec![
///         Occurrence { file_path: "app/models.py".into(), line: 10 },
///         Occurrence { file_path: "templates/base.html".into(), line: 0 },
///     ]
/// );
/// ```
pub fn parse_occurrences(source: &str) -> Vec<Occurrence> {
    source
        .split_whitespace()
        .map(|reference| reference.trim_matches(|c| c == '\u{2068}' || c == '\u{2069}'))
        .filter(|reference| !reference.is_empty())
        .map(|reference| match reference.rsplit_once(':') {
            Some((path, line)) if !path.is_empty() => match line.parse() {
                Ok(line) => Occurrence {
                    file_path: String::from(path),
                    line,
                },
                Err(_) => Occurrence {
                    file_path: String::from(reference),
                    line: 0,
                },
            },
            _ => Occurrence {
                file_path: String::from(reference),
                line: 0,
            },
        })
        .collect()
}

/// Header fields which [`po_file::parse`] cannot do without.
const REQUIRED_HEADER_FIELDS: [&str; 8] = [
    "POT-Creation-Date",
    "PO-Revision-Date",
    "Language-Team",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Language",
    "Plural-Forms",
];

/// A parsed catalog together with the text it was parsed from.
pub struct CatalogFile {
    pub catalog: Catalog,
    pub text: PoText,
}

fn parse_error(path: &Path, message: impl ToString) -> Error {
    Error::Parse {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown error")
}

/// Read a catalog from disk.
///
/// The file is checked line by line first, including the header
/// fields `polib` requires, so a malformed file is reported as an
/// error instead of aborting inside the parser.
pub fn open(path: &Path) -> Result<CatalogFile> {
    let contents = fs::read_to_string(path).map_err(|err| parse_error(path, err))?;
    let text = PoText::parse(&contents).map_err(|err| parse_error(path, err))?;
    if text.header().is_some() {
        let missing = REQUIRED_HEADER_FIELDS
            .iter()
            .copied()
            .filter(|name| text.header_field(name).is_none())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(parse_error(
                path,
                format!("header lacks the fields {}", missing.join(", ")),
            ));
        }
    }

    let catalog = match panic::catch_unwind(|| po_file::parse(path)) {
        Ok(result) => result.map_err(|err| parse_error(path, err))?,
        Err(payload) => return Err(parse_error(path, panic_message(payload.as_ref()))),
    };
    Ok(CatalogFile { catalog, text })
}

/// Load a catalog from disk.
pub fn load(path: &Path) -> Result<Catalog> {
    open(path).map(|file| file.catalog)
}

/// Convert the messages of `catalog` into entries, in file order.
///
/// A msgid which occurs more than once (for example under two
/// different contexts) keeps the position where it was first seen,
/// the values of the last occurrence win.
pub fn entries(catalog: &Catalog) -> Vec<CatalogEntry> {
    let mut result: Vec<CatalogEntry> = Vec::new();
    let mut positions = HashMap::new();

    for message in catalog.messages() {
        let (msgid_plural, msgstr_plural) = if message.is_plural() {
            (
                message.msgid_plural().ok().map(String::from),
                message.msgstr_plural().map(|forms| forms.to_vec()).unwrap_or_default(),
            )
        } else {
            (None, Vec::new())
        };
        let entry = CatalogEntry {
            msgid: String::from(message.msgid()),
            msgid_plural,
            msgstr: message.msgstr().map(String::from).unwrap_or_default(),
            msgstr_plural,
            occurrences: parse_occurrences(message.source()),
            flags: message.flags().iter().map(|flag| flag.to_string()).collect(),
            is_fuzzy: message.is_fuzzy(),
        };
        match positions.get(&entry.msgid) {
            Some(&idx) => {
                warn!("Duplicate msgid {:?}, keeping the last definition", entry.msgid);
                result[idx] = entry;
            }
            None => {
                positions.insert(entry.msgid.clone(), result.len());
                result.push(entry);
            }
        }
    }

    result
}

/// Load a catalog and return its entries.
pub fn read_entries(path: &Path) -> Result<Vec<CatalogEntry>> {
    let catalog = load(path)?;
    let entries = entries(&catalog);
    debug!("Read {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Combine the entries of several catalogs.
///
/// Entries are deduplicated by msgid with the same rule as
/// [`entries`]: first-seen position, last-seen values.
pub fn merge(catalogs: Vec<Vec<CatalogEntry>>) -> Vec<CatalogEntry> {
    let mut result: Vec<CatalogEntry> = Vec::new();
    let mut positions = HashMap::new();
    for entry in catalogs.into_iter().flatten() {
        match positions.get(&entry.msgid) {
            Some(&idx) => result[idx] = entry,
            None => {
                positions.insert(entry.msgid.clone(), result.len());
                result.push(entry);
            }
        }
    }
    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    pub(crate) const HEADER: &str = "\
msgid \"\"
msgstr \"\"
\"Project-Id-Version: demo\\n\"
\"Report-Msgid-Bugs-To: \\n\"
\"POT-Creation-Date: 2024-01-01 00:00+0000\\n\"
\"PO-Revision-Date: 2024-01-02 00:00+0000\\n\"
\"Last-Translator: Jane Doe <jane@example.com>\\n\"
\"Language-Team: French <fr@example.com>\\n\"
\"Language: fr\\n\"
\"MIME-Version: 1.0\\n\"
\"Content-Type: text/plain; charset=UTF-8\\n\"
\"Content-Transfer-Encoding: 8bit\\n\"
\"Plural-Forms: nplurals=2; plural=(n > 1);\\n\"
";

    /// Write a catalog consisting of `HEADER` followed by `body`.
    pub(crate) fn write_po(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("{HEADER}\n{body}")).expect("Could not write catalog");
        path
    }

    fn occurrence(file_path: &str, line: usize) -> Occurrence {
        Occurrence {
            file_path: String::from(file_path),
            line,
        }
    }

    #[test]
    fn test_parse_occurrences_empty() {
        assert_eq!(parse_occurrences(""), vec![]);
    }

    #[test]
    fn test_parse_occurrences_multiple_per_line() {
        assert_eq!(
            parse_occurrences("app/models.py:10 app/views.py:3\nother/models.py:5"),
            vec![
                occurrence("app/models.py", 10),
                occurrence("app/views.py", 3),
                occurrence("other/models.py", 5),
            ]
        );
    }

    #[test]
    fn test_parse_occurrences_isolated_file_name() {
        assert_eq!(
            parse_occurrences("\u{2068}app/help.html\u{2069}:7"),
            vec![occurrence("app/help.html", 7)]
        );
    }

    #[test]
    fn test_parse_occurrences_windows_drive() {
        assert_eq!(
            parse_occurrences("C:\\src\\app\\models.py:12"),
            vec![occurrence("C:\\src\\app\\models.py", 12)]
        );
    }

    #[test]
    fn test_read_entries() -> anyhow::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = write_po(
            tmpdir.path(),
            "fr.po",
            "#: app/models.py:10\n\
             msgid \"Save\"\n\
             msgstr \"\"\n\
             \n\
             #: app/models.py:12\n\
             #, python-format\n\
             msgid \"Cancel %s\"\n\
             msgstr \"Annuler %s\"\n\
             \n\
             #, fuzzy\n\
             msgid \"Delete\"\n\
             msgstr \"\"\n",
        );

        let entries = read_entries(&path)?;
        assert_eq!(
            entries
                .iter()
                .map(|entry| (entry.msgid.as_str(), entry.msgstr.as_str(), entry.is_fuzzy))
                .collect::<Vec<_>>(),
            vec![
                ("Save", "", false),
                ("Cancel %s", "Annuler %s", false),
                ("Delete", "", true),
            ]
        );
        assert_eq!(entries[0].occurrences, vec![occurrence("app/models.py", 10)]);
        assert_eq!(entries[1].flags, vec![String::from("python-format")]);
        assert!(entries[2].occurrences.is_empty());
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let err = read_entries(Path::new("does/not/exist.po")).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_incomplete_header() -> anyhow::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("fr.po");
        let header = HEADER.replace("\"Language-Team: French <fr@example.com>\\n\"\n", "");
        std::fs::write(&path, format!("{header}\nmsgid \"Save\"\nmsgstr \"\"\n"))?;

        let err = read_entries(&path).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("Language-Team"), "{err}");
        Ok(())
    }

    #[test]
    fn test_malformed_catalog() -> anyhow::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = write_po(tmpdir.path(), "fr.po", "msgid \"Save\"\nmsgstr \"\"\nbogus\n");
        let err = read_entries(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("line "), "{err}");
        Ok(())
    }

    #[test]
    fn test_read_plural_entries() -> anyhow::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = write_po(
            tmpdir.path(),
            "fr.po",
            "#: app/models.py:20\n\
             msgid \"%d item\"\n\
             msgid_plural \"%d items\"\n\
             msgstr[0] \"%d élément\"\n\
             msgstr[1] \"\"\n",
        );

        let entries = read_entries(&path)?;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_plural());
        assert_eq!(entries[0].msgid_plural.as_deref(), Some("%d items"));
        assert_eq!(
            entries[0].msgstr_plural,
            vec![String::from("%d élément"), String::new()]
        );
        assert!(!entries[0].is_translated());
        Ok(())
    }

    #[test]
    fn test_merge_keeps_first_position() {
        let entry = |msgid: &str, msgstr: &str| CatalogEntry {
            msgid: String::from(msgid),
            msgstr: String::from(msgstr),
            ..CatalogEntry::default()
        };
        let merged = merge(vec![
            vec![entry("Save", ""), entry("Cancel", "")],
            vec![entry("Delete", ""), entry("Save", "Sauvegarder")],
        ]);
        assert_eq!(
            merged
                .iter()
                .map(|entry| (entry.msgid.as_str(), entry.msgstr.as_str()))
                .collect::<Vec<_>>(),
            vec![("Save", "Sauvegarder"), ("Cancel", ""), ("Delete", "")]
        );
    }
}
