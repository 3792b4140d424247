use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use jsonnet_analysis::check::{self, FileResult};
use jsonnet_analysis::diagnostic::ToolDiagnostic;
use jsonnet_analysis::discover::{self, Config};
use jsonnet_analysis::output::{self, Format, Summary};

#[derive(Parser)]
#[command(name = "jsonnet-ls", version, about = "Jsonnet language server and linter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the language server over stdio
    Lsp,

    /// Parse and lint Jsonnet files
    Check(CheckArgs),

    /// Manage jsonnet-ls configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved configuration
    Print(ConfigPrintArgs),

    /// Print the JSON Schema for jsonnet-ls.json config files
    Schema,
}

#[derive(clap::Args)]
struct ConfigPrintArgs {
    /// Path to config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// File or directory paths to check
    files: Vec<PathBuf>,

    /// Additional import search path (repeatable)
    #[arg(short = 'p', long = "search-path")]
    search_path: Vec<PathBuf>,

    /// Path to config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "human")]
    format: Format,

    /// Number of concurrent jobs (1..=256)
    #[arg(short = 'j', long, default_value = "10", value_parser = clap::value_parser!(u16).range(1..=256))]
    jobs: u16,

    /// Print verbose diagnostic information to stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Lsp => {
            jsonnet_analysis::lsp::run_server();
            ExitCode::SUCCESS
        }
        Commands::Check(args) => run_check(args),
        Commands::Config { command } => match command {
            ConfigCommands::Print(args) => run_config_print(args),
            ConfigCommands::Schema => run_config_schema(),
        },
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "jsonnet-ls", &mut std::io::stdout());
            ExitCode::SUCCESS
        }
    }
}

fn run_config_print(args: ConfigPrintArgs) -> ExitCode {
    let mut stderr = std::io::stderr().lock();

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            let diag = ToolDiagnostic::error(format!("cannot determine current directory: {e}"));
            let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
            return ExitCode::from(2);
        }
    };

    let (loaded_config, _project_root) = match load_config(&args.config, &cwd) {
        Ok(result) => result,
        Err(e) => {
            let diag = ToolDiagnostic::error(format!("failed to load config: {e}"));
            let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
            return ExitCode::from(2);
        }
    };

    let config = loaded_config.unwrap_or_else(Config::default_config);
    println!("{}", serde_json::to_string_pretty(&config).unwrap());
    ExitCode::SUCCESS
}

fn run_config_schema() -> ExitCode {
    let schema = schemars::schema_for!(jsonnet_analysis::discover::Config);
    let mut value = serde_json::to_value(&schema).unwrap();

    rename_definitions(&mut value);

    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "$schema".to_string(),
            serde_json::json!("https://json-schema.org/draft/2020-12/schema"),
        );
    }

    println!("{}", serde_json::to_string_pretty(&value).unwrap());
    ExitCode::SUCCESS
}

fn rename_definitions(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(defs) = map.remove("definitions") {
                map.insert("$defs".to_string(), defs);
            }
            if let Some(serde_json::Value::String(ref_str)) = map.get_mut("$ref")
                && let Some(name) = ref_str.strip_prefix("#/definitions/")
            {
                *ref_str = format!("#/$defs/{name}");
            }
            for v in map.values_mut() {
                rename_definitions(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for v in arr {
                rename_definitions(v);
            }
        }
        _ => {}
    }
}

fn run_check(args: CheckArgs) -> ExitCode {
    let start = Instant::now();
    let mut stderr = std::io::stderr().lock();
    let mut warnings = Vec::new();
    let verbose = args.verbose;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs as usize)
        .build_global()
        .ok();

    if verbose && args.format == Format::Human {
        output::verbose_log(&mut stderr, &format!("jobs: {}", args.jobs));
    }

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            let diag = ToolDiagnostic::error(format!("cannot determine current directory: {e}"));
            let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
            return ExitCode::from(2);
        }
    };
    let (loaded_config, project_root) = match load_config(&args.config, &cwd) {
        Ok(result) => result,
        Err(e) => {
            let diag = ToolDiagnostic::error(format!("failed to load config: {e}"));
            let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
            return ExitCode::from(2);
        }
    };
    let project_root = std::fs::canonicalize(&project_root).unwrap_or(project_root);
    let config = loaded_config.unwrap_or_else(Config::default_config);

    if verbose && args.format == Format::Human {
        output::verbose_log(
            &mut stderr,
            &format!("project root: {}", project_root.display()),
        );
    }

    let mut search_paths = config.resolved_search_paths(&project_root);
    search_paths.extend(args.search_path.iter().cloned());

    let files_to_check = if args.files.is_empty() {
        match discover::discover_files(&project_root, std::slice::from_ref(&cwd), &config) {
            Ok((files, walk_warnings)) => {
                warnings.extend(walk_warnings);
                files
            }
            Err(e) => {
                let diag = ToolDiagnostic::error(format!("failed to discover files: {e}"));
                let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
                return ExitCode::from(2);
            }
        }
    } else {
        let mut walk_roots: Vec<PathBuf> = Vec::new();
        let mut explicit_files: Vec<PathBuf> = Vec::new();

        for path in &args.files {
            let resolved = if path.is_absolute() { path.clone() } else { cwd.join(path) };
            if resolved.is_dir() {
                walk_roots.push(resolved);
            } else {
                explicit_files.push(path.clone());
            }
        }

        if !walk_roots.is_empty() {
            match discover::discover_files(&project_root, &walk_roots, &config) {
                Ok((files, walk_warnings)) => {
                    warnings.extend(walk_warnings);
                    explicit_files.extend(files);
                }
                Err(e) => {
                    let diag = ToolDiagnostic::error(format!("failed to discover files: {e}"));
                    let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
                    return ExitCode::from(2);
                }
            }
        }

        explicit_files
    };

    if files_to_check.is_empty() {
        if args.format == Format::Human {
            let diag = ToolDiagnostic::warning("no files to check".to_string());
            let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
        }
        return ExitCode::SUCCESS;
    }

    let mut has_file_read_error = false;
    let file_contents: Vec<(String, String)> = files_to_check
        .iter()
        .filter_map(|path| {
            let path_str = path.display().to_string();
            match std::fs::read_to_string(path) {
                Ok(content) => Some((path_str, content)),
                Err(e) => {
                    let diag = ToolDiagnostic::error(format!("could not read {path_str}: {e}"));
                    let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
                    has_file_read_error = true;
                    None
                }
            }
        })
        .collect();

    let sources: HashMap<&str, &str> = file_contents
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();

    let results: Vec<FileResult> = file_contents
        .par_iter()
        .map(|(path, content)| check::check_file(path, content, search_paths.clone()))
        .collect();

    let summary = Summary::from_results(&results, args.jobs as usize, start.elapsed());

    match args.format {
        Format::Human => {
            output::render_human(&results, &warnings, &summary, &sources, &mut stderr);
        }
        Format::Json => {
            let mut stdout = std::io::stdout().lock();
            output::render_json(&results, &warnings, &summary, &mut stdout);
        }
    }

    if has_file_read_error {
        ExitCode::from(2)
    } else if summary.files_with_errors > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

/// Load config, returning an error if the config fails to parse.
fn load_config(
    config_path: &Option<PathBuf>,
    cwd: &Path,
) -> Result<(Option<Config>, PathBuf), discover::ConfigError> {
    if let Some(path) = config_path {
        let cfg = Config::load(path)?;
        let abs_path = if path.is_absolute() { path.clone() } else { cwd.join(path) };
        let root = abs_path.parent().unwrap_or(cwd).to_path_buf();
        Ok((Some(cfg), root))
    } else {
        match discover::find_config_file(cwd) {
            Some(path) => match Config::load(&path) {
                Ok(cfg) => {
                    let root = path.parent().unwrap_or(cwd).to_path_buf();
                    Ok((Some(cfg), root))
                }
                Err(e) => Err(e),
            },
            None => Ok((None, cwd.to_path_buf())),
        }
    }
}
