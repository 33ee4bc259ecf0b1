// SPDX-License-Identifier: Apache-2.0

//! Command-line front end: collect policy source files, parse them, run
//! the analysis core, and render the resulting findings.

mod cli;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use walkdir::WalkDir;

use selint_config::Config;
use selint_core::ast::FileTree;
use selint_core::symtab::ModuleStatus;
use selint_core::{layer_of_path, loader, module_of_path, parser, AnalysisContext};
use selint_report::{ColorMode, Format};

use cli::Args;

const AUX_FILENAMES: &[&str] = &["access_vectors", "modules.conf", "obj_perm_sets.spt"];

fn init_logging(args: &Args) {
    let default_filter = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };

    env_logger::Builder::from_env(Env::new().filter_or("SELINT_LOG", default_filter)).init();
}

/// Resolve `--color`/`-k` into a [`ColorMode`], exiting with a usage error
/// on an unrecognized value.
fn resolve_color(value: &str) -> Result<ColorMode, ExitCode> {
    match value.to_ascii_lowercase().as_str() {
        "always" => Ok(ColorMode::Always),
        "never" => Ok(ColorMode::Never),
        "auto" => Ok(ColorMode::Auto),
        other => {
            eprintln!("error: unrecognized --color value '{other}', expected always, never, or auto");
            Err(ExitCode::from(2))
        }
    }
}

/// Recognize a source file's role from its extension or (for the fixed
/// auxiliary filenames) its bare name. `modules.conf` is deliberately not
/// a [`FileKind`]: it carries no AST, only module-status overrides, and
/// is read by [`read_module_statuses`] instead of [`parse_files`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Te,
    If,
    Fc,
    Av,
}

fn classify(path: &Path) -> Option<FileKind> {
    if let Some(name) = path.file_name().and_then(OsStr::to_str) {
        if name == "obj_perm_sets.spt" {
            return Some(FileKind::If);
        }
        if name == "access_vectors" {
            return Some(FileKind::Av);
        }
        if name == "modules.conf" {
            return None;
        }
    }

    match path.extension().and_then(OsStr::to_str) {
        Some("te") => Some(FileKind::Te),
        Some("if") => Some(FileKind::If),
        Some("fc") => Some(FileKind::Fc),
        _ => None,
    }
}

/// Walk `args.paths`, collecting every candidate source file. A path the
/// user named directly is always included; a directory is walked and
/// filtered to `.te`/`.if`/`.fc` plus the fixed auxiliary filenames.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let entry_path = entry.path();
            let name = entry_path.file_name().and_then(OsStr::to_str).unwrap_or_default();
            let is_recognized_ext = matches!(
                entry_path.extension().and_then(OsStr::to_str),
                Some("te") | Some("if") | Some("fc")
            );
            if is_recognized_ext || AUX_FILENAMES.contains(&name) {
                files.push(entry_path.to_path_buf());
            }
        }
    }

    files
}

fn read_to_string(path: &Path) -> selint_error::Result<String> {
    std::fs::read_to_string(path).map_err(|err| {
        selint_error::Error::new(err)
            .with_kind_override(selint_error::ErrorKind::Io)
            .context(format!("reading {}", path.display()))
    })
}

fn parse_files(files: &[PathBuf]) -> selint_error::Result<HashMap<String, FileTree>> {
    let mut trees = HashMap::new();

    for path in files {
        let Some(kind) = classify(path) else {
            log::debug!("skipping unrecognized file {}", path.display());
            continue;
        };

        let source = read_to_string(path)?;
        let key = path.to_string_lossy().into_owned();

        let tree = match kind {
            FileKind::Te => parser::parse_te_file(&key, &source)?,
            FileKind::If => parser::parse_if_file(&key, &source)?,
            FileKind::Fc => parser::parse_fc_file(&key, &source)?,
            FileKind::Av => parser::parse_access_vectors_file(&key, &source)?,
        };

        trees.insert(key, tree);
    }

    Ok(trees)
}

/// Read every `modules.conf` among `files` and merge their `name =
/// base|module|off` entries into one status map. A later file wins on a
/// duplicate module name, matching a plain last-insert-wins merge.
fn read_module_statuses(files: &[PathBuf]) -> selint_error::Result<HashMap<String, ModuleStatus>> {
    let mut statuses = HashMap::new();

    for path in files {
        if path.file_name().and_then(OsStr::to_str) != Some("modules.conf") {
            continue;
        }
        let source = read_to_string(path)?;
        statuses.extend(loader::parse_modules_conf(&source));
    }

    Ok(statuses)
}

fn apply_cli_overrides(config: &mut Config, args: &Args) -> Result<(), String> {
    if let Some(severity) = &args.severity {
        config.general.severity_threshold = severity.parse().map_err(|e: selint_error::Error| e.to_string())?;
    }
    if let Some(order) = &args.order {
        config.ordering.order_conf = order.parse().map_err(|e: selint_error::Error| e.to_string())?;
    }
    config.checks.enabled.extend(args.enable.iter().cloned());
    config.checks.disabled.extend(args.disable.iter().cloned());
    config.checks.only_enabled = config.checks.only_enabled || args.only_enabled;

    Ok(())
}

fn run(args: Args) -> Result<ExitCode, ExitCode> {
    let color = resolve_color(&args.color)?;

    let config_path = args.config.clone().or_else(|| {
        let default = PathBuf::from("selint.toml");
        default.is_file().then_some(default)
    });

    let mut config = Config::load_or_default(config_path.as_deref()).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(4)
    })?;

    apply_cli_overrides(&mut config, &args).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(2)
    })?;

    let files = collect_files(&args.paths);
    if files.is_empty() {
        eprintln!("error: no policy source files found in the given paths");
        return Err(ExitCode::from(2));
    }

    let trees = parse_files(&files).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(3)
    })?;

    let module_statuses = read_module_statuses(&files).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(3)
    })?;

    // `loader::register_modules` calls its `layer_of` closure with the
    // *module name*, not the path, so the path -> layer mapping has to be
    // precomputed here, before the module name is the only thing left.
    let mut module_layers = HashMap::new();
    for key in trees.keys() {
        module_layers.entry(module_of_path(key)).or_insert_with(|| layer_of_path(key));
    }

    let ctx = AnalysisContext::build(
        trees,
        module_of_path,
        move |module: &str| module_layers.get(module).cloned().unwrap_or_default(),
        &module_statuses,
        &config,
    )
    .map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(3)
    })?;

    let report = ctx.analyze(&config).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(3)
    })?;

    let format = if args.json { Format::Json } else { Format::Human };
    let stream_is_tty = console::Term::stdout().is_term();
    print!("{}", report.render(format, color, stream_is_tty));

    if args.fail_on_finding && !report.is_empty() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args) {
        Ok(code) => code,
        Err(code) => code,
    }
}
