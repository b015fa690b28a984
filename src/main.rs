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

//! Translate only the strings your application uses.
//!
//! This program extracts untranslated messages from Gettext catalogs,
//! restricted to the messages referenced by the source files of
//! chosen packages, translates them with Gemini and merges the
//! translations back into the catalogs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;
use polyglot_po::config::Config;
use polyglot_po::extract::{self, ExtractionRecord, OccurrenceFilter, SourceExtension};
use polyglot_po::gemini::GeminiProvider;
use polyglot_po::modules::{ModuleResolver, ModuleScope};
use polyglot_po::translate::{pending_messages, TranslationRecord, Translator};
use polyglot_po::{artifact, catalog, update, Error, Result};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file, defaults to polyglot.toml if present.
    #[arg(long, global = true, value_name = "polyglot.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract untranslated messages referenced from the given packages.
    #[command(name = "generate-helptexts", visible_alias = "modules")]
    GenerateHelptexts {
        /// Package whose source files define the scope, e.g. lino_xl.lib.cal.
        #[arg(short, long = "package", required = true)]
        packages: Vec<String>,
        /// Package holding the catalog, defaults to the first package.
        #[arg(short, long)]
        locale_root: Option<String>,
        /// Target language of the catalog.
        #[arg(short = 'L', long, visible_alias = "locale-target")]
        lang: String,
        /// Read these catalogs instead of the one of the locale root.
        #[arg(short, long = "catalog", value_name = "django.po")]
        catalogs: Vec<PathBuf>,
        /// Additional directories to search for packages.
        #[arg(long = "search-path")]
        search_paths: Vec<PathBuf>,
        #[arg(short, long, default_value = "translateables.json")]
        output: PathBuf,
    },
    /// Extract untranslated messages referenced from HTML templates.
    ExtractHtml {
        /// Package holding the catalog.
        #[arg(short, long, required_unless_present = "catalogs")]
        locale_root: Option<String>,
        #[arg(short = 'L', long, visible_alias = "locale-target")]
        lang: String,
        #[arg(short, long = "catalog", value_name = "django.po")]
        catalogs: Vec<PathBuf>,
        #[arg(long = "search-path")]
        search_paths: Vec<PathBuf>,
        /// Extension of the template files.
        #[arg(long, default_value = "html")]
        extension: String,
        #[arg(short, long, default_value = "translateables_html.json")]
        output: PathBuf,
    },
    /// Translate an extraction artifact.
    Translate {
        #[arg(short, long, value_name = "translateables.json")]
        input: PathBuf,
        #[arg(short, long, default_value = "translated.json")]
        output: PathBuf,
        /// Target locale, defaults to the locale of the extracted messages.
        #[arg(short, long)]
        lang: Option<String>,
        /// Language of the msgids.
        #[arg(long)]
        source_lang: Option<String>,
        #[arg(short = 'n', long)]
        batch_size: Option<usize>,
        /// Additional attempts for a failed batch.
        #[arg(long)]
        retries: Option<usize>,
        #[arg(long)]
        model: Option<String>,
        /// Ignore translations already present in the output file.
        #[arg(long)]
        fresh: bool,
    },
    /// Merge translation artifacts into catalogs.
    UpdatePo {
        #[arg(short, long, required = true, num_args = 1.., value_name = "translated.json")]
        translated: Vec<PathBuf>,
        /// Package holding the catalog.
        #[arg(
            short,
            long,
            visible_alias = "locale-root",
            required_unless_present = "catalogs"
        )]
        package: Option<String>,
        #[arg(short = 'L', long)]
        lang: String,
        #[arg(short, long = "catalog", value_name = "django.po")]
        catalogs: Vec<PathBuf>,
        #[arg(long = "search-path")]
        search_paths: Vec<PathBuf>,
        /// Write the result here instead of updating the catalog in place.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also compile a .mo file next to each catalog.
        #[arg(long)]
        compile: bool,
    },
    /// Compile a catalog into a binary .mo file.
    Compile {
        #[arg(value_name = "django.po")]
        po_file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Catalogs given explicitly, or the one of the `locale_root` package.
fn catalog_paths(
    resolver: &ModuleResolver,
    catalogs: Vec<PathBuf>,
    locale_root: Option<&str>,
    lang: &str,
) -> Result<Vec<PathBuf>> {
    if !catalogs.is_empty() {
        return Ok(catalogs);
    }
    let locale_root = locale_root
        .ok_or_else(|| Error::Configuration(String::from("no catalog or package given")))?;
    let module = resolver.resolve(locale_root)?;
    Ok(vec![module.catalog_path(lang)])
}

fn extract_to(
    catalog_paths: &[PathBuf],
    filter: &dyn OccurrenceFilter,
    lang: &str,
    output: &Path,
) -> Result<()> {
    let catalogs = catalog_paths
        .iter()
        .map(|path| {
            info!("Loading catalog {}", path.display());
            catalog::read_entries(path)
        })
        .collect::<Result<Vec<_>>>()?;
    let entries = catalog::merge(catalogs);
    let records = extract::extract(&entries, filter, lang);
    artifact::write(output, &records)?;
    info!(
        "Found {} untranslated messages out of {}, written to {}",
        records.len(),
        entries.len(),
        output.display()
    );
    Ok(())
}

/// The single locale of `records`, `None` when there are no records.
fn artifact_locale(records: &[ExtractionRecord]) -> Result<Option<String>> {
    let locales = records
        .iter()
        .map(|record| record.locale.as_str())
        .collect::<HashSet<_>>();
    match locales.into_iter().collect::<Vec<_>>().as_slice() {
        [] => Ok(None),
        [locale] => Ok(Some(String::from(*locale))),
        _ => Err(Error::Configuration(String::from(
            "the extraction artifact contains several locales, use --lang to pick one",
        ))),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::GenerateHelptexts {
            packages,
            locale_root,
            lang,
            catalogs,
            search_paths,
            output,
        } => {
            let resolver = config.resolver(&search_paths);
            let mut scope = ModuleScope::default();
            for package in &packages {
                let module = resolver.resolve(package)?;
                info!("Package {package} is at {}", module.root.display());
                scope.extend(module.scope());
            }
            let locale_root = locale_root.as_deref().or(packages.first().map(String::as_str));
            let paths = catalog_paths(&resolver, catalogs, locale_root, &lang)?;
            extract_to(&paths, &scope, &lang, &output)
        }
        Command::ExtractHtml {
            locale_root,
            lang,
            catalogs,
            search_paths,
            extension,
            output,
        } => {
            let resolver = config.resolver(&search_paths);
            let paths = catalog_paths(&resolver, catalogs, locale_root.as_deref(), &lang)?;
            extract_to(&paths, &SourceExtension::new(&extension), &lang, &output)
        }
        Command::Translate {
            input,
            output,
            lang,
            source_lang,
            batch_size,
            retries,
            model,
            fresh,
        } => {
            let records = artifact::read::<ExtractionRecord>(&input)?;
            let mut translations = if fresh {
                Vec::new()
            } else {
                artifact::read_if_exists::<TranslationRecord>(&output)?
            };
            let Some(lang) = lang.map_or_else(|| artifact_locale(&records), |lang| Ok(Some(lang)))?
            else {
                info!("{} is empty, nothing to translate", input.display());
                return artifact::write(&output, &translations);
            };

            let known = translations
                .iter()
                .filter(|record| record.locale == lang)
                .map(|record| record.msgid.clone())
                .collect::<HashSet<_>>();
            if !known.is_empty() {
                info!("Keeping {} translations from {}", known.len(), output.display());
            }
            let pending = pending_messages(&records, &lang, &known);
            if pending.is_empty() {
                info!("Nothing left to translate into {lang}");
                return artifact::write(&output, &translations);
            }

            let mut settings = config.translator;
            if let Some(source_lang) = source_lang {
                settings.source_language = source_lang;
            }
            if let Some(batch_size) = batch_size {
                settings.batch_size = batch_size;
            }
            if let Some(retries) = retries {
                settings.retries = retries;
            }
            if let Some(model) = model {
                settings.model = model;
            }
            let provider = GeminiProvider::new(settings.api_key()?, settings.gemini_options())?;
            let translator = Translator::new(provider, settings.translator_options())?;

            let run = translator.translate_messages(&pending, &lang);
            let error = run.error();
            let translated = run.records.len();
            translations.extend(run.records);
            artifact::write(&output, &translations)?;
            info!(
                "Translated {translated} messages, {} in total, written to {}",
                translations.len(),
                output.display()
            );
            match error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
        Command::UpdatePo {
            translated,
            package,
            lang,
            catalogs,
            search_paths,
            output,
            compile,
        } => {
            let resolver = config.resolver(&search_paths);
            let paths = catalog_paths(&resolver, catalogs, package.as_deref(), &lang)?;
            if output.is_some() && paths.len() > 1 {
                return Err(Error::Configuration(String::from(
                    "--output can only be used with a single catalog",
                )));
            }
            let translations = update::load_translations(&translated, &lang)?;
            info!("{} translations to apply", translations.len());
            for path in &paths {
                let report = update::update_file(path, output.as_deref(), &translations, compile)?;
                info!(
                    "{}: {} updated, {} unchanged, {} skipped, {} not found",
                    path.display(),
                    report.updated,
                    report.unchanged,
                    report.skipped,
                    report.missing.len()
                );
            }
            Ok(())
        }
        Command::Compile { po_file, output } => {
            let output = output.unwrap_or_else(|| po_file.with_extension("mo"));
            update::compile(&po_file, &output)
        }
    }
}

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"));
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate_helptexts() {
        let cli = Cli::try_parse_from([
            "polyglot-po",
            "generate-helptexts",
            "--package",
            "lino_xl.lib.cal",
            "-p",
            "lino_xl.lib.contacts",
            "--locale-target",
            "bn",
        ])
        .unwrap();
        match cli.command {
            Command::GenerateHelptexts {
                packages,
                locale_root,
                lang,
                output,
                ..
            } => {
                assert_eq!(packages, vec!["lino_xl.lib.cal", "lino_xl.lib.contacts"]);
                assert_eq!(locale_root, None);
                assert_eq!(lang, "bn");
                assert_eq!(output, PathBuf::from("translateables.json"));
            }
            command => panic!("unexpected command {command:?}"),
        }
    }

    #[test]
    fn test_parse_update_po_requires_target() {
        assert!(Cli::try_parse_from(["polyglot-po", "update-po", "-t", "t.json", "-L", "fr"]).is_err());
        assert!(Cli::try_parse_from([
            "polyglot-po",
            "update-po",
            "-t",
            "a.json",
            "b.json",
            "--catalog",
            "fr.po",
            "-L",
            "fr"
        ])
        .is_ok());
    }

    fn record(locale: &str) -> ExtractionRecord {
        ExtractionRecord {
            msgid: String::from("Save"),
            msgid_plural: None,
            source_file: String::from("app/models.py"),
            source_line: 1,
            locale: String::from(locale),
        }
    }

    #[test]
    fn test_artifact_locale() {
        assert_eq!(
            artifact_locale(&[record("fr"), record("fr")]).unwrap(),
            Some(String::from("fr"))
        );
        assert_eq!(artifact_locale(&[]).unwrap(), None);
        assert!(artifact_locale(&[record("fr"), record("de")]).is_err());
    }

    /// Configuration whose API key variable is never set.
    fn keyless_config(dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join("polyglot.toml");
        std::fs::write(
            &path,
            "[translator]\napi_key_env = \"POLYGLOT_TEST_UNSET_KEY\"\n",
        )?;
        Ok(path)
    }

    fn translate_command(dir: &Path, extra: &[&str]) -> anyhow::Result<Cli> {
        let config = keyless_config(dir)?;
        let mut args = vec![
            String::from("polyglot-po"),
            String::from("translate"),
            String::from("--config"),
            config.display().to_string(),
            String::from("-i"),
            dir.join("translateables.json").display().to_string(),
            String::from("-o"),
            dir.join("translated.json").display().to_string(),
        ];
        args.extend(extra.iter().map(|arg| String::from(*arg)));
        Ok(Cli::try_parse_from(args)?)
    }

    #[test]
    fn test_translate_empty_artifact() -> anyhow::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        artifact::write::<ExtractionRecord>(&tmpdir.path().join("translateables.json"), &[])?;

        run(translate_command(tmpdir.path(), &[])?)?;
        assert_eq!(
            std::fs::read_to_string(tmpdir.path().join("translated.json"))?,
            "[]\n"
        );
        Ok(())
    }

    #[test]
    fn test_translate_nothing_pending_needs_no_key() -> anyhow::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        artifact::write(&tmpdir.path().join("translateables.json"), &[record("fr")])?;
        let done = vec![TranslationRecord::new(
            String::from("Save"),
            polyglot_po::translate::Translation::Singular(String::from("Sauvegarder")),
            "fr",
        )];
        artifact::write(&tmpdir.path().join("translated.json"), &done)?;

        run(translate_command(tmpdir.path(), &[])?)?;
        let translated = artifact::read::<TranslationRecord>(&tmpdir.path().join("translated.json"))?;
        assert_eq!(translated, done);

        // With work to do the missing key is reported.
        let err = run(translate_command(tmpdir.path(), &["--fresh"])?).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        Ok(())
    }
}
