use chrono::NaiveDate;
use clap::Parser;
use log::debug;
use serde_yaml::Value as YamlValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use nfq::config::{Limits, DEFAULT_MAX_CLAUSES, DEFAULT_NESTING_DEPTH, DEFAULT_WIRE_DEPTH};
use nfq::filter::editor::EditCommand;
use nfq::filter::eval::{matches_wire, EvalContext};
use nfq::filter::model::{CompoundFilter, FilterNode};
use nfq::filter::negate::validate_for_negation;
use nfq::filter::validate::validate_structure;
use nfq::filter::wire::WireFilter;
use nfq::query;
use nfq::session::FilterSession;

#[derive(Parser)]
#[command(
    name = "nfq",
    about = "Build compound database filters and rewrite them for a depth-limited query API"
)]
struct Cli {
    #[arg(long, help = "Read the draft filter tree from a YAML or JSON file")]
    file: Option<PathBuf>,

    #[arg(long, help = "Apply a list of edit commands (YAML or JSON) to the draft")]
    edits: Option<PathBuf>,

    #[arg(long, help = "Print the indices of rows (YAML or JSON list) matched by the filter")]
    rows: Option<PathBuf>,

    #[arg(long, env = "NFQ_MAX_DEPTH", default_value_t = DEFAULT_NESTING_DEPTH)]
    max_depth: usize,

    #[arg(long, env = "NFQ_WIRE_DEPTH", default_value_t = DEFAULT_WIRE_DEPTH)]
    wire_depth: usize,

    #[arg(long, env = "NFQ_MAX_CLAUSES", default_value_t = DEFAULT_MAX_CLAUSES)]
    max_clauses: usize,

    #[arg(long, help = "Validate the draft without converting it")]
    check: bool,

    #[arg(long, help = "Print the draft tree as YAML instead of converting it")]
    show_draft: bool,

    #[arg(long, help = "Reference date for relative date windows (YYYY-MM-DD)")]
    today: Option<NaiveDate>,

    #[arg(short, long, help = "Enable debug logging")]
    verbose: bool,

    #[arg(help = "Filter in query syntax, e.g. 'Price:number < 10 AND NOT Done:checkbox = true'")]
    query: Option<String>,
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let limits = match Limits::new(cli.max_depth, cli.wire_depth, cli.max_clauses) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    let draft = match load_draft(&cli) {
        Ok(d) => d,
        Err(message) => {
            eprintln!("Error: {}", message);
            return ExitCode::from(2);
        }
    };

    let mut session = FilterSession::with_draft(draft, limits);

    if let Some(path) = &cli.edits {
        let commands: Vec<EditCommand> = match read_document(path) {
            Ok(c) => c,
            Err(message) => {
                eprintln!("Error: {}", message);
                return ExitCode::from(2);
            }
        };
        for command in &commands {
            session.edit(command);
        }
        debug!("applied {} edit commands", commands.len());
    }

    if cli.show_draft {
        return run_show_draft(&session);
    }

    if cli.check {
        return run_check_mode(session.draft());
    }

    let wire = match session.apply() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Filter error: {}", e);
            return ExitCode::from(2);
        }
    };

    match &cli.rows {
        Some(path) => {
            let today = cli
                .today
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            run_rows_mode(wire.as_ref(), path, &EvalContext::new(today))
        }
        None => {
            let json = wire.map_or(serde_json::Value::Null, |w| w.to_json());
            match serde_json::to_string_pretty(&json) {
                Ok(text) => {
                    println!("{}", text);
                    ExitCode::from(0)
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::from(2)
                }
            }
        }
    }
}

fn load_draft(cli: &Cli) -> Result<CompoundFilter, String> {
    match (&cli.query, &cli.file) {
        (Some(_), Some(_)) => Err("Pass either a query or --file, not both".to_string()),
        (Some(q), None) => query::parse(q)
            .map(Some)
            .map_err(|e| format!("Query error: {}", e)),
        (None, Some(path)) => read_document::<FilterNode>(path).map(Some),
        (None, None) => Ok(None),
    }
}

fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_yaml::from_str(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

fn run_show_draft(session: &FilterSession) -> ExitCode {
    match serde_yaml::to_string(&session.draft()) {
        Ok(text) => {
            print!("{}", text);
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run_check_mode(draft: Option<&FilterNode>) -> ExitCode {
    if let Err(e) = validate_structure(draft) {
        eprintln!("Invalid filter: {}", e);
        return ExitCode::from(2);
    }
    let unsupported = validate_for_negation(draft);
    if !unsupported.is_empty() {
        let names: Vec<&str> = unsupported.iter().map(|op| op.as_str()).collect();
        eprintln!("Negation not supported for: {}", names.join(", "));
        return ExitCode::from(2);
    }
    println!("ok");
    ExitCode::from(0)
}

fn run_rows_mode(
    wire: Option<&WireFilter>,
    path: &Path,
    ctx: &EvalContext,
) -> ExitCode {
    let rows: Vec<YamlValue> = match read_document(path) {
        Ok(r) => r,
        Err(message) => {
            eprintln!("Error: {}", message);
            return ExitCode::from(2);
        }
    };

    let mut found = false;

    for (index, row) in rows.iter().enumerate() {
        if wire.map_or(true, |w| matches_wire(w, row, ctx)) {
            found = true;
            println!("{}", index);
        }
    }

    if found {
        ExitCode::from(0)
    } else {
        ExitCode::from(1)
    }
}
