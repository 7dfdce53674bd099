//! procsync command-line tool.
//!
//! Provides the `procsync` binary: `check` loads a block workspace saved as
//! XML and reports procedure problems, `emit` generates C source from it.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use procsync_codegen::{generate, EmitOptions};
use procsync_core::{read_workspace, CallState, Workspace};

/// Procedure-aware block workspace tools.
#[derive(Parser)]
#[command(name = "procsync", about = "Check block workspaces and emit C from them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Report duplicate parameters and calls to unknown procedures.
    Check {
        /// Path to the workspace XML file.
        #[arg(short, long)]
        input: PathBuf,

        /// Also print the loaded workspace as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate C source for a workspace.
    Emit {
        /// Path to the workspace XML file.
        #[arg(short, long)]
        input: PathBuf,

        /// JSON file with emit options.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Type used for parameters and return values.
        #[arg(long)]
        numeric_type: Option<String>,

        /// Text emitted for empty argument slots.
        #[arg(long)]
        null_placeholder: Option<String>,

        /// Print the generated units as JSON instead of C.
        #[arg(long)]
        json: bool,

        /// Write the output here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Check { input, json } => run_check(&input, json),
        Commands::Emit {
            input,
            config,
            numeric_type,
            null_placeholder,
            json,
            output,
        } => run_emit(&input, config.as_deref(), numeric_type, null_placeholder, json, output.as_deref()),
    };
    process::exit(exit_code);
}

fn load(path: &Path) -> Result<Workspace, i32> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })?;
    read_workspace(&text).map_err(|e| {
        eprintln!("Error: failed to load '{}': {}", path.display(), e);
        3
    })
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 = clean, 1 = JSON serialization failed,
/// 2 = problems found, 3 = I/O or parse error.
fn run_check(input: &Path, json: bool) -> i32 {
    let ws = match load(input) {
        Ok(ws) => ws,
        Err(code) => return code,
    };
    if json {
        match serde_json::to_string_pretty(&ws) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: failed to serialize workspace: {}", e);
                return 1;
            }
        }
    }

    let mut problems = 0;
    for decl in ws.declarations() {
        let Ok(d) = ws.declaration(decl) else {
            continue;
        };
        if let Some(warning) = d.warning() {
            eprintln!("  - {} ({}): {}", d.name(), decl, warning);
            problems += 1;
        }
    }
    for id in ws.block_ids() {
        let Ok(call) = ws.call(id) else {
            continue;
        };
        if call.state() == CallState::Orphaned {
            eprintln!("  - call {} refers to unknown procedure '{}'", id, call.target());
            problems += 1;
        }
    }

    let (without, with) = ws.all_procedures();
    for sig in without.iter().chain(&with) {
        let ret = if sig.has_return { " -> value" } else { "" };
        println!("{}({}){}", sig.name, sig.params.join(", "), ret);
    }
    if problems > 0 {
        eprintln!("{} problem(s) found", problems);
        2
    } else {
        0
    }
}

/// Execute the emit subcommand.
///
/// Returns exit code: 0 = success, 1 = some units failed to emit,
/// 3 = I/O or parse error.
fn run_emit(
    input: &Path,
    config: Option<&Path>,
    numeric_type: Option<String>,
    null_placeholder: Option<String>,
    json: bool,
    output: Option<&Path>,
) -> i32 {
    let mut options = match config {
        Some(path) => match load_options(path) {
            Ok(options) => options,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return 3;
            }
        },
        None => EmitOptions::default(),
    };
    if let Some(numeric_type) = numeric_type {
        options.numeric_type = numeric_type;
    }
    if let Some(null_placeholder) = null_placeholder {
        options.null_placeholder = null_placeholder;
    }

    let ws = match load(input) {
        Ok(ws) => ws,
        Err(code) => return code,
    };
    let program = generate(&ws, &options);

    let text = if json {
        match serde_json::to_string_pretty(&program) {
            Ok(text) => text + "\n",
            Err(e) => {
                eprintln!("Error: failed to serialize program: {}", e);
                return 1;
            }
        }
    } else {
        program.render()
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &text) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                return 3;
            }
        }
        None => print!("{}", text),
    }

    if program.is_ok() {
        0
    } else {
        eprintln!("Emission failed for {} unit(s):", program.errors.len());
        for err in &program.errors {
            eprintln!("  - {}", err);
        }
        1
    }
}

/// Read [`EmitOptions`] from a JSON file. Missing keys keep their defaults.
fn load_options(path: &Path) -> Result<EmitOptions, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid config '{}': {}", path.display(), e))
}
