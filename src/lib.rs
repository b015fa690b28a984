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

//! Helpers for translating the strings an application actually uses.
//!
//! A Django project typically shares one large Gettext catalog
//! between many applications. Translating all of it is wasteful when
//! only a few applications are deployed. The functions here implement
//! a three stage workflow:
//!
//! 1. [`extract`]: find the untranslated messages whose occurrence
//!    comments (`#: path:line`) point into the source tree of a chosen
//!    package, and save them as a JSON artifact.
//! 2. [`translate`]: send the messages in batches to a translation
//!    provider, such as [`gemini::GeminiProvider`], and save the
//!    results as a second JSON artifact.
//! 3. [`update`]: write the translations back into the catalogs,
//!    leaving every other message alone.
//!
//! Each stage is a subcommand of the `polyglot-po` binary. The binary
//! exits with these codes:
//!
//! | code | meaning                                  |
//! |------|------------------------------------------|
//! | 0    | success                                  |
//! | 2    | invalid command line                     |
//! | 3    | configuration error, e.g. missing API key |
//! | 4    | a catalog could not be parsed            |
//! | 5    | a package could not be resolved          |
//! | 6    | the translation provider failed          |
//! | 7    | a catalog could not be updated           |
//! | 8    | an artifact could not be read or written |

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod modules;
pub mod po_text;
pub mod translate;
pub mod update;

pub use error::{Error, Result};
