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

//! Line-level view of a PO file.
//!
//! [`polib`] rewrites a whole catalog when saving it: comments,
//! obsolete `#~` entries, header fields and line wrapping all come
//! out normalized. [`PoText`] keeps the input lines of a file and
//! only replaces the `msgstr` lines of the entries given a new
//! translation, so everything else is written back byte for byte.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// A line which does not fit the PO grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

/// A `msgstr` or `msgstr[n]` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgstrField {
    /// The plural index, `None` for a singular `msgstr`.
    pub index: Option<usize>,
    pub value: String,
}

/// An entry as it appears in the file. Obsolete `#~` entries are
/// comments and never show up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    pub msgctxt: Option<String>,
    pub msgid: String,
    pub msgid_plural: Option<String>,
    pub msgstr: Vec<MsgstrField>,
    /// Lines holding the msgstr fields.
    region: Range<usize>,
}

impl TextEntry {
    pub fn is_header(&self) -> bool {
        self.msgctxt.is_none() && self.msgid.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Msgctxt,
    Msgid,
    MsgidPlural,
    Msgstr,
}

#[derive(Default)]
struct Pending {
    msgctxt: Option<String>,
    msgid: Option<String>,
    msgid_plural: Option<String>,
    msgstr: Vec<MsgstrField>,
    region: Option<Range<usize>>,
    field: Option<Field>,
}

impl Pending {
    fn finish(&mut self, entries: &mut Vec<TextEntry>, line: usize) -> Result<(), SyntaxError> {
        let pending = std::mem::take(self);
        let Some(msgid) = pending.msgid else {
            if pending.msgctxt.is_some() {
                return Err(syntax_error(line, "msgctxt without msgid"));
            }
            return Ok(());
        };
        let Some(region) = pending.region else {
            return Err(syntax_error(line, "msgid without msgstr"));
        };
        entries.push(TextEntry {
            msgctxt: pending.msgctxt,
            msgid,
            msgid_plural: pending.msgid_plural,
            msgstr: pending.msgstr,
            region,
        });
        Ok(())
    }

    fn has_msgstr(&self) -> bool {
        !self.msgstr.is_empty()
    }

    fn append(&mut self, value: &str, idx: usize) -> Result<(), SyntaxError> {
        let target = match self.field {
            Some(Field::Msgctxt) => self.msgctxt.as_mut(),
            Some(Field::Msgid) => self.msgid.as_mut(),
            Some(Field::MsgidPlural) => self.msgid_plural.as_mut(),
            Some(Field::Msgstr) => {
                if let Some(region) = self.region.as_mut() {
                    region.end = idx + 1;
                }
                self.msgstr.last_mut().map(|field| &mut field.value)
            }
            None => None,
        };
        match target {
            Some(target) => {
                target.push_str(value);
                Ok(())
            }
            None => Err(syntax_error(idx + 1, "string without a keyword")),
        }
    }

    fn push_msgstr(&mut self, index: Option<usize>, value: String, idx: usize) -> Result<(), SyntaxError> {
        if self.msgid.is_none() {
            return Err(syntax_error(idx + 1, "msgstr without msgid"));
        }
        if index.is_none() && self.has_msgstr() {
            return Err(syntax_error(idx + 1, "duplicate msgstr"));
        }
        self.msgstr.push(MsgstrField { index, value });
        match self.region.as_mut() {
            Some(region) => region.end = idx + 1,
            None => self.region = Some(idx..idx + 1),
        }
        self.field = Some(Field::Msgstr);
        Ok(())
    }
}

fn syntax_error(line: usize, message: &str) -> SyntaxError {
    SyntaxError {
        line,
        message: String::from(message),
    }
}

/// Decode a quoted PO string such as `"a \"b\"\n"`.
fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => result.push(match chars.next()? {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                'a' => '\u{07}',
                'b' => '\u{08}',
                'f' => '\u{0c}',
                'v' => '\u{0b}',
                other => other,
            }),
            '"' => return None,
            c => result.push(c),
        }
    }
    Some(result)
}

fn quote(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 2);
    result.push('"');
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            '\r' => result.push_str("\\r"),
            c => result.push(c),
        }
    }
    result.push('"');
    result
}

/// Format one field the way `msgmerge` does: a string with embedded
/// newlines starts with an empty string and continues with one line
/// per newline.
fn format_field(keyword: &str, value: &str, eol: &str) -> Vec<String> {
    let parts = value.split_inclusive('\n').collect::<Vec<_>>();
    if parts.len() <= 1 {
        return vec![format!("{keyword} {}{eol}", quote(value))];
    }
    let mut lines = vec![format!("{keyword} \"\"{eol}")];
    lines.extend(parts.iter().map(|part| format!("{}{eol}", quote(part))));
    lines
}

fn line_ending(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// The lines of a PO file and the entries found in them.
#[derive(Debug, Clone)]
pub struct PoText {
    lines: Vec<String>,
    entries: Vec<TextEntry>,
    /// Replacement lines by first replaced line, with the end of the
    /// replaced range.
    edits: BTreeMap<usize, (usize, Vec<String>)>,
}

impl PoText {
    pub fn parse(text: &str) -> Result<PoText, SyntaxError> {
        let lines = text.split_inclusive('\n').map(String::from).collect::<Vec<_>>();
        let mut entries = Vec::new();
        let mut pending = Pending::default();

        for (idx, line) in lines.iter().enumerate() {
            let content = line.trim();
            if content.is_empty() {
                pending.finish(&mut entries, idx + 1)?;
                continue;
            }
            if content.starts_with('#') {
                // A comment after the msgstr belongs to the next entry.
                if pending.has_msgstr() {
                    pending.finish(&mut entries, idx + 1)?;
                }
                continue;
            }
            if content.starts_with('"') {
                let value = unquote(content).ok_or_else(|| syntax_error(idx + 1, "invalid string"))?;
                pending.append(&value, idx)?;
                continue;
            }

            let (keyword, rest) = content
                .split_once(char::is_whitespace)
                .ok_or_else(|| syntax_error(idx + 1, "expected a keyword and a string"))?;
            let value =
                unquote(rest.trim()).ok_or_else(|| syntax_error(idx + 1, "invalid string"))?;
            match keyword {
                "msgctxt" => {
                    if pending.msgid.is_some() {
                        pending.finish(&mut entries, idx + 1)?;
                    }
                    if pending.msgctxt.is_some() {
                        return Err(syntax_error(idx + 1, "duplicate msgctxt"));
                    }
                    pending.msgctxt = Some(value);
                    pending.field = Some(Field::Msgctxt);
                }
                "msgid" => {
                    if pending.msgid.is_some() {
                        pending.finish(&mut entries, idx + 1)?;
                    }
                    pending.msgid = Some(value);
                    pending.field = Some(Field::Msgid);
                }
                "msgid_plural" => {
                    if pending.msgid.is_none() || pending.has_msgstr() {
                        return Err(syntax_error(idx + 1, "misplaced msgid_plural"));
                    }
                    pending.msgid_plural = Some(value);
                    pending.field = Some(Field::MsgidPlural);
                }
                "msgstr" => pending.push_msgstr(None, value, idx)?,
                keyword => {
                    let index = keyword
                        .strip_prefix("msgstr[")
                        .and_then(|rest| rest.strip_suffix(']'))
                        .and_then(|index| index.parse().ok())
                        .ok_or_else(|| syntax_error(idx + 1, "unknown keyword"))?;
                    pending.push_msgstr(Some(index), value, idx)?;
                }
            }
        }
        pending.finish(&mut entries, lines.len())?;

        Ok(PoText {
            lines,
            entries,
            edits: BTreeMap::new(),
        })
    }

    pub fn entries(&self) -> &[TextEntry] {
        &self.entries
    }

    pub fn header(&self) -> Option<&TextEntry> {
        self.entries.iter().find(|entry| entry.is_header())
    }

    /// Look up a header field such as `Language`.
    pub fn header_field(&self, name: &str) -> Option<String> {
        let header = self.header()?;
        let value = &header.msgstr.first()?.value;
        value.split('\n').find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == name).then(|| String::from(value.trim()))
        })
    }

    /// The number of plural forms from the `Plural-Forms` header.
    pub fn nplurals(&self) -> Option<usize> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r"nplurals\s*=\s*(\d+)").expect("well-formed regex"));
        let plural_forms = self.header_field("Plural-Forms")?;
        re.captures(&plural_forms)?.get(1)?.as_str().parse().ok()
    }

    /// Replace the msgstr fields of entry `idx`.
    ///
    /// A singular entry takes exactly one form, a plural entry takes
    /// one `msgstr[n]` per form.
    pub fn set_msgstr(&mut self, idx: usize, forms: &[String]) {
        let entry = &mut self.entries[idx];
        let region = entry.region.clone();
        let eol = match line_ending(&self.lines[region.start]) {
            "" => "\n",
            eol => eol,
        };

        let fields = if entry.msgid_plural.is_some() {
            forms
                .iter()
                .enumerate()
                .map(|(index, value)| MsgstrField {
                    index: Some(index),
                    value: value.clone(),
                })
                .collect::<Vec<_>>()
        } else {
            vec![MsgstrField {
                index: None,
                value: forms.concat(),
            }]
        };
        let mut lines = fields
            .iter()
            .flat_map(|field| match field.index {
                Some(index) => format_field(&format!("msgstr[{index}]"), &field.value, eol),
                None => format_field("msgstr", &field.value, eol),
            })
            .collect::<Vec<_>>();
        // Keep the ending of the last replaced line, it may be the
        // last line of a file without a final newline.
        let last_ending = line_ending(&self.lines[region.end - 1]);
        if let Some(last) = lines.last_mut() {
            last.truncate(last.len() - eol.len());
            last.push_str(last_ending);
        }

        entry.msgstr = fields;
        self.edits.insert(region.start, (region.end, lines));
    }

    pub fn is_modified(&self) -> bool {
        !self.edits.is_empty()
    }
}

impl fmt::Display for PoText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut idx = 0;
        while idx < self.lines.len() {
            match self.edits.get(&idx) {
                Some((end, replacement)) => {
                    for line in replacement {
                        f.write_str(line)?;
                    }
                    idx = *end;
                }
                None => {
                    f.write_str(&self.lines[idx])?;
                    idx += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CATALOG: &str = "\
# French translation of the demo application.
# Copyright (C) 2024 Jane Doe
#
#, fuzzy
msgid \"\"
msgstr \"\"
\"Project-Id-Version: demo\\n\"
\"Report-Msgid-Bugs-To: \\n\"
\"Language: fr\\n\"
\"Plural-Forms: nplurals=2; plural=(n > 1);\\n\"

# translator note
#: app/models.py:10
#| msgid \"Old\"
msgid \"Save\"
msgstr \"\"

#: app/models.py:12
msgid \"\"
\"A long message which somebody \"
\"wrapped by hand\"
msgstr \"\"

msgctxt \"menu\"
msgid \"File\"
msgstr \"Fichier\"

#: app/models.py:20
msgid \"%d item\"
msgid_plural \"%d items\"
msgstr[0] \"\"
msgstr[1] \"\"

#~ msgid \"Gone\"
#~ msgstr \"Parti\"
";

    fn forms(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| String::from(*value)).collect()
    }

    #[test]
    fn test_parse_entries() -> anyhow::Result<()> {
        let text = PoText::parse(CATALOG)?;
        let msgids = text
            .entries()
            .iter()
            .map(|entry| entry.msgid.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            msgids,
            vec![
                "",
                "Save",
                "A long message which somebody wrapped by hand",
                "File",
                "%d item"
            ]
        );
        assert_eq!(text.entries()[3].msgctxt.as_deref(), Some("menu"));
        assert_eq!(text.entries()[3].msgstr[0].value, "Fichier");
        let plural = &text.entries()[4];
        assert_eq!(plural.msgid_plural.as_deref(), Some("%d items"));
        assert_eq!(
            plural.msgstr.iter().map(|field| field.index).collect::<Vec<_>>(),
            vec![Some(0), Some(1)]
        );
        Ok(())
    }

    #[test]
    fn test_render_unchanged() -> anyhow::Result<()> {
        let text = PoText::parse(CATALOG)?;
        assert!(!text.is_modified());
        assert_eq!(text.to_string(), CATALOG);
        Ok(())
    }

    #[test]
    fn test_header_fields() -> anyhow::Result<()> {
        let text = PoText::parse(CATALOG)?;
        assert_eq!(text.header_field("Language").as_deref(), Some("fr"));
        assert_eq!(text.header_field("Report-Msgid-Bugs-To").as_deref(), Some(""));
        assert_eq!(text.header_field("Language-Team"), None);
        assert_eq!(text.nplurals(), Some(2));
        Ok(())
    }

    #[test]
    fn test_set_msgstr_touches_only_the_entry() -> anyhow::Result<()> {
        let mut text = PoText::parse(CATALOG)?;
        text.set_msgstr(1, &forms(&["Sauvegarder"]));
        assert!(text.is_modified());
        assert_eq!(
            text.to_string(),
            CATALOG.replacen(
                "msgid \"Save\"\nmsgstr \"\"\n",
                "msgid \"Save\"\nmsgstr \"Sauvegarder\"\n",
                1
            )
        );
        Ok(())
    }

    #[test]
    fn test_set_msgstr_replaces_wrapped_msgstr() -> anyhow::Result<()> {
        let input = "msgid \"Hello\"\nmsgstr \"\"\n\"Bon\"\n\"jour\"\n\nmsgid \"Bye\"\nmsgstr \"\"\n";
        let mut text = PoText::parse(input)?;
        assert_eq!(text.entries()[0].msgstr[0].value, "Bonjour");
        text.set_msgstr(0, &forms(&["Salut \"toi\""]));
        assert_eq!(
            text.to_string(),
            "msgid \"Hello\"\nmsgstr \"Salut \\\"toi\\\"\"\n\nmsgid \"Bye\"\nmsgstr \"\"\n"
        );
        Ok(())
    }

    #[test]
    fn test_set_msgstr_multiline() -> anyhow::Result<()> {
        let mut text = PoText::parse("msgid \"a\\nb\"\nmsgstr \"\"")?;
        text.set_msgstr(0, &forms(&["x\ny"]));
        assert_eq!(text.to_string(), "msgid \"a\\nb\"\nmsgstr \"\"\n\"x\\n\"\n\"y\"");
        Ok(())
    }

    #[test]
    fn test_set_msgstr_plural() -> anyhow::Result<()> {
        let mut text = PoText::parse(CATALOG)?;
        text.set_msgstr(4, &forms(&["%d élément", "%d éléments"]));
        assert_eq!(
            text.to_string(),
            CATALOG.replacen(
                "msgstr[0] \"\"\nmsgstr[1] \"\"\n",
                "msgstr[0] \"%d élément\"\nmsgstr[1] \"%d éléments\"\n",
                1
            )
        );
        assert_eq!(text.entries()[4].msgstr[1].value, "%d éléments");
        Ok(())
    }

    #[test]
    fn test_crlf_line_endings() -> anyhow::Result<()> {
        let input = "msgid \"Save\"\r\nmsgstr \"\"\r\n\r\nmsgid \"Cancel\"\r\nmsgstr \"\"\r\n";
        let mut text = PoText::parse(input)?;
        text.set_msgstr(1, &forms(&["Annuler"]));
        assert_eq!(
            text.to_string(),
            "msgid \"Save\"\r\nmsgstr \"\"\r\n\r\nmsgid \"Cancel\"\r\nmsgstr \"Annuler\"\r\n"
        );
        Ok(())
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(
            PoText::parse("msgid \"Save\"\nmsgstr \"\"\nbogus\n").unwrap_err(),
            SyntaxError {
                line: 3,
                message: String::from("expected a keyword and a string"),
            }
        );
        assert_eq!(PoText::parse("msgid \"Save\"\n\n").unwrap_err().line, 2);
        assert_eq!(PoText::parse("msgid \"Sa\"ve\"\n").unwrap_err().line, 1);
        assert_eq!(PoText::parse("\"orphan\"\n").unwrap_err().line, 1);
    }
}
