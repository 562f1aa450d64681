use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use tern::{CancellationToken, Configuration, Program};
use tern_python_semantic::diagnostic::DiagnosticSettings;
use tern_python_semantic::{PythonPlatform, PythonVersion};

mod args;
mod logging;

use args::Args;

fn main() -> ExitCode {
    let args = Args::parse();
    logging::setup_tracing(args.verbose);

    match run(&args) {
        Ok(error_count) if error_count > 0 => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<usize> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("failed to determine the current directory")?,
    };

    let mut config = Configuration::new(root);
    if let Some(version) = &args.python_version {
        config.python_version = PythonVersion::try_from(version.as_str())
            .with_context(|| format!("invalid Python version '{version}'"))?;
    }
    if let Some(platform) = &args.python_platform {
        config.python_platform = PythonPlatform::from_name(platform)
            .with_context(|| format!("unknown platform '{platform}'"))?;
    }
    config.typeshed_path = args.typeshed.clone();
    config.typings_path = args.typings.clone();
    config.extra_paths = args.extra_paths.clone();
    config.venv_path = args.venv_path.clone();
    config.venv = args.venv.clone();
    if args.strict {
        config.diagnostic_settings = DiagnosticSettings::strict();
    }

    let paths: Vec<PathBuf> = args
        .files
        .iter()
        .map(|path| path.canonicalize().unwrap_or_else(|_| path.clone()))
        .collect();

    let mut program = Program::new(config);
    let results = program
        .check_paths(&paths, &CancellationToken::new())
        .context("check failed")?;

    let mut error_count = 0;
    for result in &results {
        if result.diagnostics.is_empty() {
            continue;
        }
        println!("{}", result.path.display());
        let file = program.file_id(&result.path);
        let line_index = file.and_then(|file| program.line_index_for(file));
        for diagnostic in &result.diagnostics {
            if diagnostic.is_error() {
                error_count += 1;
            }
            match line_index {
                Some(index) => {
                    let (start, _) = diagnostic.locations(index);
                    println!(
                        "  {}:{} - {diagnostic}",
                        start.line + 1,
                        start.column + 1
                    );
                }
                None => println!("  {diagnostic}"),
            }
        }
    }

    let checked = results.len();
    tracing::info!("checked {checked} file(s), {error_count} error(s)");
    Ok(error_count)
}
