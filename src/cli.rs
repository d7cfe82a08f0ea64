//! distill - CLI for the structural distiller
//!
//! # Usage
//!
//! ```bash
//! # Outline one file
//! distill file app/models.py
//!
//! # Distill a whole tree as JSON, eight files at a time
//! distill dir ./src --jobs 8 --json
//!
//! # Print the JSON Schema of the output (needs the `schema` feature)
//! distill schema
//! ```
//!
//! Results go to stdout, logs and errors to stderr. Exit codes: 0 = success,
//! 1 = a file could not be distilled.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use code_distiller::{
    Diagnostic, Dialect, DistillOptions, Distillation, FileDiscovery, Symbol, SymbolKind,
    Visibility, distill,
};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "distill")]
#[command(version)]
#[command(about = "Extract language-agnostic symbol trees from source files")]
#[command(long_about = r#"
distill parses Python, Rust, TypeScript and TSX files and prints their
structure: classes, functions, methods, fields, constants and imports with
visibility, signatures, decorators and docstrings.

Malformed files still yield every well-formed definition; problems are
reported as diagnostics. Use --json for machine-readable output.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output JSON instead of an outline
    #[arg(long, global = true)]
    json: bool,

    /// Drop private symbols from the output
    #[arg(long, global = true)]
    public_only: bool,

    /// Leave import symbols out of the outline
    #[arg(long, global = true)]
    no_imports: bool,

    /// Leave docstrings and doc comments out of the output
    #[arg(long, global = true)]
    no_docstrings: bool,

    /// Maximum definition nesting before the parse is cut short
    #[arg(long, global = true, default_value = "64")]
    max_depth: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Distill a single file
    File {
        path: PathBuf,

        /// Language override: python, rust, typescript, tsx
        #[arg(short, long)]
        lang: Option<String>,
    },

    /// Distill every supported file under a directory
    Dir {
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Glob that overrides the excludes (repeatable)
        #[arg(long)]
        include: Vec<String>,

        /// Glob to skip (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Only distill this language
        #[arg(short, long)]
        lang: Option<String>,

        /// Files distilled concurrently
        #[arg(short, long, default_value = "4")]
        jobs: usize,
    },

    /// Print the JSON Schema of the output format
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr to keep stdout clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match run_command(&cli).await {
        Ok(output) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_human_readable(&output);
            }
            if output.has_errors() {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            if cli.json {
                let err = serde_json::json!({
                    "error": format!("{e:#}")
                });
                eprintln!("{}", serde_json::to_string_pretty(&err)?);
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}

async fn run_command(cli: &Cli) -> Result<Output> {
    let options = DistillOptions::new()
        .with_include_private(!cli.public_only)
        .with_include_imports(!cli.no_imports)
        .with_include_docstrings(!cli.no_docstrings)
        .with_max_recursion_depth(cli.max_depth);

    match &cli.command {
        Commands::File { path, lang } => {
            let result = distill(path, lang.as_deref(), &options)?;
            Ok(Output::File(Box::new(result)))
        }

        Commands::Dir {
            root,
            include,
            exclude,
            lang,
            jobs,
        } => {
            let mut discovery = FileDiscovery::new();
            if let Some(lang) = lang {
                let dialect = Dialect::from_hint(lang)
                    .with_context(|| format!("Unsupported language: {lang}"))?;
                discovery = discovery.with_dialects(&[dialect]);
            }
            for pattern in include {
                discovery = discovery.with_include(pattern);
            }
            for pattern in exclude {
                discovery = discovery.with_exclude(pattern);
            }

            let files = discovery
                .discover(root)
                .with_context(|| format!("Failed to scan {}", root.display()))?;
            let (mut results, mut errors) = distill_all(files, options, *jobs).await;
            results.sort_by(|a, b| a.path.cmp(&b.path));
            errors.sort_by(|a, b| a.path.cmp(&b.path));

            Ok(Output::Dir {
                root: root.display().to_string(),
                files: results,
                errors,
            })
        }

        Commands::Schema => schema_output(),
    }
}

/// Fan files out over blocking workers, `jobs` at a time.
async fn distill_all(
    files: Vec<PathBuf>,
    options: DistillOptions,
    jobs: usize,
) -> (Vec<Distillation>, Vec<FileError>) {
    let outcomes: Vec<(PathBuf, Result<Distillation>)> = stream::iter(files)
        .map(|path| {
            let options = options.clone();
            async move {
                let worker_path = path.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    distill(&worker_path, None, &options).map_err(anyhow::Error::from)
                })
                .await
                .context("Worker panicked")
                .and_then(|r| r);
                (path, outcome)
            }
        })
        .buffer_unordered(jobs.max(1))
        .collect()
        .await;

    let mut results = Vec::new();
    let mut errors = Vec::new();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to distill");
                errors.push(FileError {
                    path: path.display().to_string(),
                    error: format!("{e:#}"),
                });
            }
        }
    }
    (results, errors)
}

#[cfg(feature = "schema")]
fn schema_output() -> Result<Output> {
    Ok(Output::Schema(code_distiller::schema::json_schema()))
}

#[cfg(not(feature = "schema"))]
fn schema_output() -> Result<Output> {
    anyhow::bail!("This build does not include the `schema` feature")
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum Output {
    File(Box<Distillation>),
    Dir {
        root: String,
        files: Vec<Distillation>,
        errors: Vec<FileError>,
    },
    Schema(serde_json::Value),
}

impl Output {
    fn has_errors(&self) -> bool {
        matches!(self, Output::Dir { errors, .. } if !errors.is_empty())
    }
}

#[derive(serde::Serialize)]
struct FileError {
    path: String,
    error: String,
}

// ============================================================================
// Human-readable output
// ============================================================================

fn print_human_readable(output: &Output) {
    match output {
        Output::File(result) => print_distillation(result),
        Output::Dir {
            root,
            files,
            errors,
        } => {
            println!("Distilled {} files under {}", files.len(), root);
            for result in files {
                println!();
                print_distillation(result);
            }
            if !errors.is_empty() {
                println!();
                println!("Failed ({}):", errors.len());
                for e in errors {
                    println!("  {}: {}", e.path, e.error);
                }
            }
        }
        Output::Schema(schema) => {
            println!(
                "{}",
                serde_json::to_string_pretty(schema).unwrap_or_default()
            );
        }
    }
}

fn print_distillation(result: &Distillation) {
    let path = result.path.as_deref().map(Path::new);
    println!(
        "{} ({})",
        path.map(|p| p.display().to_string()).unwrap_or_default(),
        result.dialect
    );

    let mut stack: Vec<(&Symbol, usize)> =
        result.root.children.iter().rev().map(|s| (s, 1)).collect();
    while let Some((symbol, indent)) = stack.pop() {
        if symbol.kind != SymbolKind::Import {
            println!("{}{}", "  ".repeat(indent), outline_line(symbol));
        }
        stack.extend(symbol.children.iter().rev().map(|c| (c, indent + 1)));
    }

    if !result.imports.is_empty() {
        println!("  imports:");
        for import in &result.imports {
            let mut flags = Vec::new();
            if !import.is_used {
                flags.push("unused");
            }
            if import.is_type_only {
                flags.push("type-only");
            }
            if import.is_conditional {
                flags.push("conditional");
            }
            let name = match &import.imported_name {
                Some(name) => format!("{} from {}", name, import.source_module),
                None => import.source_module.clone(),
            };
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            println!("    {} = {}{}", import.local_alias, name, flags);
        }
    }

    if !result.diagnostics.is_empty() {
        println!("  diagnostics:");
        for diagnostic in &result.diagnostics {
            println!("    {}", diagnostic_line(diagnostic));
        }
    }
}

fn outline_line(symbol: &Symbol) -> String {
    let marker = match symbol.visibility {
        Some(Visibility::Public) | None => '+',
        Some(Visibility::Protected) => '#',
        Some(Visibility::Private) => '-',
    };
    let mut line = format!("{} {} {}", marker, symbol.kind.as_str(), symbol.name);
    if let Some(signature) = &symbol.signature {
        let params: Vec<&str> = signature.parameters.iter().map(|p| p.name.as_str()).collect();
        line.push_str(&format!("({})", params.join(", ")));
        if let Some(ret) = &signature.return_type {
            line.push_str(&format!(" -> {ret}"));
        }
    }
    if !symbol.bases.is_empty() {
        line.push_str(&format!(" : {}", symbol.bases.join(", ")));
    }
    if symbol.is_abstract {
        line.push_str(" [abstract]");
    }
    line.push_str(&format!("  L{}", symbol.span.start_line));
    line
}

fn diagnostic_line(diagnostic: &Diagnostic) -> String {
    let code = serde_json::to_value(diagnostic.code)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let severity = match diagnostic.severity {
        code_distiller::Severity::Error => "error",
        code_distiller::Severity::Warning => "warning",
    };
    let recovered = if diagnostic.recovered {
        ""
    } else {
        " (unrecovered)"
    };
    format!(
        "{}[{}] L{}: {}{}",
        severity, code, diagnostic.span.start_line, diagnostic.message, recovered
    )
}
