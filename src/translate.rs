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

//! Sending extracted messages to a translation provider in batches.
//!
//! The provider is anything implementing [`TranslationProvider`]:
//! a function from a list of messages to a list of translations in
//! the same order. [`Translator`] splits the work into batches and
//! keeps the results of the batches which succeeded even when others
//! fail.

use std::collections::HashSet;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::extract::ExtractionRecord;

/// A translated message.
///
/// `translated_text` holds the translation of a singular message, or
/// the first form of a plural one. `translated_plural` holds every
/// form of a plural message and is omitted for singular messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub msgid: String,
    pub translated_text: String,
    pub locale: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translated_plural: Vec<String>,
}

impl TranslationRecord {
    pub fn new(msgid: String, translation: Translation, locale: &str) -> Self {
        let (translated_text, translated_plural) = match translation {
            Translation::Singular(text) => (text, Vec::new()),
            Translation::Plural(forms) => (forms.first().cloned().unwrap_or_default(), forms),
        };
        Self {
            msgid,
            translated_text,
            locale: String::from(locale),
            translated_plural,
        }
    }

    pub fn translation(&self) -> Translation {
        if self.translated_plural.is_empty() {
            Translation::Singular(self.translated_text.clone())
        } else {
            Translation::Plural(self.translated_plural.clone())
        }
    }
}

/// A message sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub msgid: String,
    pub msgid_plural: Option<String>,
}

/// The provider's answer for one message: a string, or all plural
/// forms of the target language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Translation {
    Singular(String),
    Plural(Vec<String>),
}

/// Failure of a single provider call.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("provider returned HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("expected {expected} translations, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// An external translation service.
pub trait TranslationProvider {
    /// Translate `messages` into `target_locale`.
    ///
    /// The result must contain one translation per message, in the
    /// same order, with plural forms for the plural messages.
    fn translate_batch(
        &self,
        messages: &[SourceMessage],
        target_locale: &str,
    ) -> Result<Vec<Translation>, ProviderError>;
}

impl<P: TranslationProvider + ?Sized> TranslationProvider for Box<P> {
    fn translate_batch(
        &self,
        messages: &[SourceMessage],
        target_locale: &str,
    ) -> Result<Vec<Translation>, ProviderError> {
        (**self).translate_batch(messages, target_locale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorOptions {
    /// Number of messages per provider request.
    pub batch_size: usize,
    /// Additional attempts for a failed batch.
    pub retries: usize,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            batch_size: 200,
            retries: 1,
        }
    }
}

/// A batch which could not be translated.
#[derive(Debug)]
pub struct BatchFailure {
    /// 1-based batch number.
    pub batch: usize,
    pub msgids: Vec<String>,
    pub error: ProviderError,
}

/// The outcome of [`Translator::translate`].
#[derive(Debug, Default)]
pub struct TranslationRun {
    pub records: Vec<TranslationRecord>,
    pub failures: Vec<BatchFailure>,
    pub batches: usize,
}

impl TranslationRun {
    /// Summarize the failed batches as an error, if there are any.
    pub fn error(&self) -> Option<Error> {
        let first = self.failures.first()?;
        let omitted = self
            .failures
            .iter()
            .map(|failure| failure.msgids.len())
            .sum::<usize>();
        Some(Error::TranslationProvider {
            batch: first.batch,
            message: format!(
                "{} ({} of {} batches failed, {omitted} messages left untranslated)",
                first.error,
                self.failures.len(),
                self.batches,
            ),
        })
    }
}

/// The messages of `records` which still need a translation into
/// `target_locale`.
///
/// Records for other locales, repeated msgids and msgids in `skip`
/// are left out.
pub fn pending_messages(
    records: &[ExtractionRecord],
    target_locale: &str,
    skip: &HashSet<String>,
) -> Vec<SourceMessage> {
    let mut seen = HashSet::new();
    let mut pending = Vec::new();
    for record in records {
        if record.locale != target_locale {
            warn!(
                "Skipping {:?}: extracted for locale {}, not {target_locale}",
                record.msgid, record.locale
            );
            continue;
        }
        if skip.contains(&record.msgid) || !seen.insert(record.msgid.as_str()) {
            continue;
        }
        pending.push(SourceMessage {
            msgid: record.msgid.clone(),
            msgid_plural: record.msgid_plural.clone(),
        });
    }
    pending
}

/// Check that `translations` answers `messages` one to one.
fn validate(messages: &[SourceMessage], translations: &[Translation]) -> Result<(), ProviderError> {
    if translations.len() != messages.len() {
        return Err(ProviderError::CountMismatch {
            expected: messages.len(),
            actual: translations.len(),
        });
    }
    for (message, translation) in messages.iter().zip(translations) {
        match (&message.msgid_plural, translation) {
            (None, Translation::Singular(_)) => {}
            (Some(_), Translation::Plural(forms)) if !forms.is_empty() => {}
            (None, Translation::Plural(_)) => {
                return Err(ProviderError::InvalidResponse(format!(
                    "expected a single translation for {:?}",
                    message.msgid
                )));
            }
            (Some(_), _) => {
                return Err(ProviderError::InvalidResponse(format!(
                    "expected plural forms for {:?}",
                    message.msgid
                )));
            }
        }
    }
    Ok(())
}

pub struct Translator<P> {
    provider: P,
    options: TranslatorOptions,
}

impl<P: TranslationProvider> Translator<P> {
    pub fn new(provider: P, options: TranslatorOptions) -> Result<Self, Error> {
        if options.batch_size == 0 {
            return Err(Error::Configuration(String::from(
                "batch size must be at least 1",
            )));
        }
        Ok(Self { provider, options })
    }

    fn translate_with_retries(
        &self,
        batch: usize,
        messages: &[SourceMessage],
        target_locale: &str,
    ) -> Result<Vec<Translation>, ProviderError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .provider
                .translate_batch(messages, target_locale)
                .and_then(|translations| {
                    validate(messages, &translations)?;
                    Ok(translations)
                });
            match result {
                Ok(translations) => return Ok(translations),
                Err(err) if attempt <= self.options.retries => {
                    warn!("Batch {batch}, attempt {attempt} failed: {err}; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Translate the extracted messages for `target_locale`.
    ///
    /// See [`pending_messages`] for the records which are sent.
    pub fn translate(
        &self,
        records: &[ExtractionRecord],
        target_locale: &str,
        skip: &HashSet<String>,
    ) -> TranslationRun {
        self.translate_messages(&pending_messages(records, target_locale, skip), target_locale)
    }

    /// Translate `messages` batch by batch.
    ///
    /// A batch is accepted only if the provider returns exactly one
    /// translation of the right kind per message, otherwise none of
    /// its messages appear in the result.
    pub fn translate_messages(&self, messages: &[SourceMessage], target_locale: &str) -> TranslationRun {
        let mut run = TranslationRun {
            batches: messages.len().div_ceil(self.options.batch_size),
            ..TranslationRun::default()
        };
        if messages.is_empty() {
            info!("Nothing to translate");
            return run;
        }

        for (idx, batch_messages) in messages.chunks(self.options.batch_size).enumerate() {
            let batch = idx + 1;
            info!(
                "Translating batch {batch}/{} ({} messages)",
                run.batches,
                batch_messages.len()
            );
            match self.translate_with_retries(batch, batch_messages, target_locale) {
                Ok(translations) => {
                    run.records.extend(batch_messages.iter().zip(translations).map(
                        |(message, translation)| {
                            TranslationRecord::new(message.msgid.clone(), translation, target_locale)
                        },
                    ));
                }
                Err(error) => {
                    warn!("Batch {batch} failed: {error}");
                    run.failures.push(BatchFailure {
                        batch,
                        msgids: batch_messages
                            .iter()
                            .map(|message| message.msgid.clone())
                            .collect(),
                        error,
                    });
                }
            }
        }

        run
    }
}
