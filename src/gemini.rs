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

//! Translation provider backed by the Gemini `generateContent` API.

use std::sync::OnceLock;
use std::time::Duration;

use log::debug;
use regex::Regex;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::translate::{ProviderError, SourceMessage, Translation, TranslationProvider};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiOptions {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    /// Language of the msgids, used in the prompt.
    pub source_language: String,
}

impl Default for GeminiOptions {
    fn default() -> Self {
        Self {
            endpoint: String::from(DEFAULT_ENDPOINT),
            model: String::from(DEFAULT_MODEL),
            timeout: Duration::from_secs(120),
            source_language: String::from("en"),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// A message as it appears in the prompt.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PromptItem<'a> {
    Text(&'a str),
    Plural { singular: &'a str, plural: &'a str },
}

/// Build the prompt for one batch.
///
/// The messages are embedded as a JSON array and the model is asked
/// for an array of the same length and order.
pub fn build_prompt(messages: &[SourceMessage], target_locale: &str, source_language: &str) -> String {
    let items = messages
        .iter()
        .map(|message| match &message.msgid_plural {
            Some(plural) => PromptItem::Plural {
                singular: &message.msgid,
                plural,
            },
            None => PromptItem::Text(&message.msgid),
        })
        .collect::<Vec<_>>();
    let json = serde_json::to_string_pretty(&items).unwrap_or_else(|_| String::from("[]"));
    let plurals = if messages.iter().any(|message| message.msgid_plural.is_some()) {
        format!(
            "An input given as an object with \"singular\" and \"plural\" is a \
             message with plural forms: translate it into a JSON array holding \
             every plural form of the language \"{target_locale}\", in the order \
             of its Gettext Plural-Forms rule.\n"
        )
    } else {
        String::new()
    };
    format!(
        "Translate the following user interface strings of a web application \
         from the language with code \"{source_language}\" into the language \
         with locale code \"{target_locale}\".\n\
         Return ONLY a JSON array: exactly one translation per input, in the \
         same order as the input ({count} inputs). Do not add explanations or \
         Markdown formatting.\n\
         {plurals}\
         Keep format placeholders exactly as they appear: %s, %d, %(name)s, \
         {{}}, {{0}}, {{name}} and HTML tags must be copied unchanged.\n\
         \n\
         Strings to translate:\n\
         {json}\n",
        count = messages.len(),
    )
}

/// Strip a Markdown code fence around a model reply.
fn strip_code_fence(text: &str) -> &str {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$").expect("well-formed regex")
    });
    match re.captures(text).and_then(|captures| captures.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Parse the translations from a model reply.
///
/// Each element is a string, or an array of strings for a message
/// with plural forms.
pub fn parse_translations(text: &str) -> Result<Vec<Translation>, ProviderError> {
    serde_json::from_str(strip_code_fence(text)).map_err(|err| {
        ProviderError::InvalidResponse(format!("expected a JSON array of translations: {err}"))
    })
}

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    options: GeminiOptions,
}

impl GeminiProvider {
    /// Create a provider using `api_key`.
    pub fn new(api_key: String, options: GeminiOptions) -> Result<Self, Error> {
        if api_key.trim().is_empty() {
            return Err(Error::Configuration(String::from("the Gemini API key is empty")));
        }
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| Error::Configuration(format!("could not create HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_key,
            options,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.options.endpoint.trim_end_matches('/'),
            self.options.model
        )
    }
}

impl TranslationProvider for GeminiProvider {
    fn translate_batch(
        &self,
        messages: &[SourceMessage],
        target_locale: &str,
    ) -> Result<Vec<Translation>, ProviderError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some(String::from("user")),
                parts: vec![Part {
                    text: build_prompt(messages, target_locale, &self.options.source_language),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.2,
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .map_err(|err| ProviderError::Http(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let response: GenerateResponse = response
            .json()
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;

        let text = response
            .candidates
            .into_iter()
            .find_map(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .ok_or_else(|| ProviderError::InvalidResponse(String::from("no candidates in response")))?;
        debug!("Gemini replied with {} bytes", text.len());
        parse_translations(&text)
    }
}
