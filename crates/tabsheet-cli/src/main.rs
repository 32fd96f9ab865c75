//! tabsheet CLI
//!
//! Command-line tool for merging, editing, consolidating and querying
//! ID-indexed delimited-text sheets.

mod lock;

use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use lock::{default_lock_path, fallback_output, LockGuard, Locker};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tabsheet_core::{
    chunk_pairs, chunk_writes, parse_delimiter, read_cell, removed_text, scan_inputs,
    ConsolidationGroup, EditScript, IdColumn, LoadOptions, MergeMode, SaveOptions, Sheet,
    SheetConfig,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Input and output name standing for the standard streams
const STDIN: &str = "stdin";
const STDOUT: &str = "stdout";

#[derive(Parser, Debug)]
#[command(name = "tabsheet")]
#[command(about = "Merge, edit, consolidate and query ID-indexed delimited-text sheets", long_about = None)]
#[command(version, arg_required_else_help = true)]
struct Cli {
    /// Input files (`stdin` reads standard input)
    #[arg(short = 'd', long, num_args = 1.., value_name = "FILE")]
    data: Vec<String>,

    /// Directories searched recursively for .csv, .tsv and .txt inputs
    #[arg(long, num_args = 1.., value_name = "DIR")]
    data_dir: Vec<PathBuf>,

    /// Input delimiters, one per file (`\t` and `\s` for tab and space)
    #[arg(short = 'D', long, num_args = 1.., default_value = ",")]
    delim: Vec<String>,

    /// ID column per file, counted from 0; negative generates IDs
    #[arg(short = 'i', long, num_args = 1.., allow_negative_numbers = true, default_value = "0")]
    id_col: Vec<i64>,

    /// Inputs have no header row (optionally yes/no per file)
    #[arg(short = 'n', long, num_args = 0.., value_parser = parse_switch)]
    no_header: Option<Vec<bool>>,

    /// Leading lines to skip, per file
    #[arg(short = 's', long, num_args = 1.., default_value = "0")]
    skip: Vec<usize>,

    /// Transpose inputs (optionally yes/no per file)
    #[arg(short = 't', long, num_args = 0.., value_parser = parse_switch)]
    trans: Option<Vec<bool>>,

    /// Inputs are pieces of one table stacked by rows
    #[arg(long)]
    vstack: bool,

    /// Inputs are pieces of one table stacked by columns
    #[arg(long)]
    hstack: bool,

    /// JSON file overriding the reserved names
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file (`stdout` writes to standard output)
    #[arg(short = 'o', long, value_name = "FILE")]
    out: Option<String>,

    /// Output delimiter
    #[arg(short = 'O', long, default_value = ",")]
    out_delim: String,

    /// Replacement output headers
    #[arg(short = 'H', long, num_args = 1..)]
    out_header: Option<Vec<String>>,

    /// Do not write the header row
    #[arg(short = 'N', long)]
    out_no_header: bool,

    /// Transpose the output
    #[arg(short = 'T', long)]
    out_trans: bool,

    /// Cells to write: ID HEADER VALUE ...
    #[arg(short = 'w', long, num_args = 1.., allow_negative_numbers = true)]
    write: Vec<String>,

    /// Cells to read: ID HEADER ... (`none` reads the whole row)
    #[arg(short = 'r', long, num_args = 1..)]
    read: Vec<String>,

    /// Cells to remove: ID HEADER ... (`none` removes the whole row)
    #[arg(short = 'R', long, num_args = 1..)]
    remove: Vec<String>,

    /// JSON edit script with writes and removals
    #[arg(long, value_name = "FILE")]
    edits: Option<PathBuf>,

    /// Lock the output while working (default lock file: <out>.lock)
    #[arg(short = 'L', long, num_args = 0..=1, value_name = "FILE")]
    lock: Option<Option<PathBuf>>,

    /// Fold columns matching keywords into HEADER (repeatable)
    #[arg(short = 'c', long, num_args = 1.., action = ArgAction::Append, value_name = "HEADER KEYWORD")]
    consolidate: Vec<String>,

    /// Like --consolidate, then remove the folded columns
    #[arg(short = 'C', long, num_args = 1.., action = ArgAction::Append, value_name = "HEADER KEYWORD")]
    clean: Vec<String>,

    /// Merge mode: overwrite, append, smart_append or add
    #[arg(short = 'e', long, default_value = "smart_append")]
    mode: MergeMode,

    /// Keep only these columns (column specifications)
    #[arg(short = 'k', long, num_args = 0..)]
    columns: Option<Vec<String>>,

    /// Print the sorted IDs of rows matching these column specifications
    #[arg(short = 'q', long, num_args = 1..)]
    query: Option<Vec<String>>,

    /// Print the column headers with their indices
    #[arg(short = 'P', long)]
    print_headers: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Sheet(#[from] tabsheet_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Sheet(e) if e.is_engine_error() => 3,
            _ => 1,
        }
    }

    fn is_broken_pipe(&self) -> bool {
        match self {
            CliError::Sheet(e) => e.is_broken_pipe(),
            CliError::Io(e) => e.kind() == io::ErrorKind::BrokenPipe,
            CliError::Usage(_) => false,
        }
    }
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    fn from_arg(arg: &str) -> Self {
        if arg == STDIN {
            Input::Stdin
        } else {
            Input::File(PathBuf::from(arg))
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            Input::Stdin => None,
            Input::File(path) => Some(path),
        }
    }
}

fn main() {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli, &matches) {
        if e.is_broken_pipe() {
            return;
        }
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: &Cli, matches: &ArgMatches) -> CliResult<()> {
    let config = match &cli.config {
        Some(path) => SheetConfig::load(path)?,
        None => SheetConfig::default(),
    };
    let clean_groups = consolidation_groups(matches, "clean")?;
    let groups = consolidation_groups(matches, "consolidate")?;

    let inputs = collect_inputs(cli)?;
    let options = load_options(cli, inputs.len())?;

    let mut out_path = cli.out.clone();
    // Held until run returns, on success or error
    let _guard = take_lock(cli, &mut out_path, &inputs)?;
    warn_on_overwrite(out_path.as_deref(), &inputs);

    let mut out = BufWriter::new(io::stdout().lock());

    let mut sheet = cmd_load(&inputs, &options, &config, cli.mode)?;
    cmd_edit(&mut sheet, cli, &mut out)?;

    if let Some(groups) = clean_groups {
        sheet.consolidate(&groups, true, cli.mode)?;
    }
    if let Some(groups) = groups {
        sheet.consolidate(&groups, false, cli.mode)?;
    }

    if let Some(spec) = &cli.columns {
        sheet = cmd_extract(sheet, spec, &config)?;
        let other_output = cli.query.is_some() || !cli.read.is_empty() || cli.print_headers;
        if out_path.is_none() && !other_output {
            out_path = Some(STDOUT.to_string());
        }
    }
    if cli.print_headers {
        cmd_print_headers(&sheet, &mut out)?;
    }
    if let Some(spec) = &cli.query {
        cmd_query(&sheet, spec, &mut out)?;
    }
    cmd_read(&sheet, &cli.read, &mut out)?;

    if let Some(target) = &out_path {
        cmd_save(&sheet, cli, target, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Ok(true),
        "n" | "no" | "false" | "0" => Ok(false),
        _ => Err(format!("expected yes or no, got '{}'", s)),
    }
}

/// Spread per-file values over `count` files
///
/// A single value applies to every file. With fewer values than files the
/// last one is repeated; extra values are ignored.
fn per_file<T: Clone>(name: &str, values: &[T], count: usize) -> CliResult<Vec<T>> {
    let last = values
        .last()
        .ok_or_else(|| CliError::Usage(format!("no value given for {}", name)))?;
    if values.len() > 1 && values.len() < count {
        warn!("fewer {} values than input files, repeating the last one", name);
    }
    if count > 0 && values.len() > count {
        warn!("more {} values than input files, ignoring the extra ones", name);
    }
    Ok((0..count)
        .map(|i| values.get(i).unwrap_or(last).clone())
        .collect())
}

/// Per-file yes/no flags: absent means no, given without values means yes
fn switches(name: &str, values: Option<&[bool]>, count: usize) -> CliResult<Vec<bool>> {
    match values {
        None => Ok(vec![false; count]),
        Some([]) => Ok(vec![true; count]),
        Some(values) => per_file(name, values, count),
    }
}

fn load_options(cli: &Cli, count: usize) -> CliResult<Vec<LoadOptions>> {
    let delims = per_file("--delim", &cli.delim, count)?;
    let id_cols = per_file("--id-col", &cli.id_col, count)?;
    let skips = per_file("--skip", &cli.skip, count)?;
    let no_header = switches("--no-header", cli.no_header.as_deref(), count)?;
    let trans = switches("--trans", cli.trans.as_deref(), count)?;

    (0..count)
        .map(|i| {
            Ok(LoadOptions {
                delimiter: parse_delimiter(&delims[i])?,
                id_column: IdColumn::from_signed(id_cols[i]),
                skip: skips[i],
                no_header: no_header[i],
                transpose: trans[i],
                vstack: cli.vstack,
                hstack: cli.hstack,
            })
        })
        .collect()
}

fn collect_inputs(cli: &Cli) -> CliResult<Vec<Input>> {
    let mut inputs: Vec<Input> = cli.data.iter().map(|d| Input::from_arg(d)).collect();
    if !cli.data_dir.is_empty() {
        let scan = scan_inputs(&cli.data_dir)?;
        info!(
            roots = scan.roots.len(),
            files = scan.total_files(),
            "scanned input directories"
        );
        inputs.extend(scan.files.into_iter().map(Input::File));
    }
    let stdin_count = inputs.iter().filter(|i| **i == Input::Stdin).count();
    if stdin_count > 1 {
        return Err(CliError::Usage(
            "stdin can only be given once as input".to_string(),
        ));
    }
    Ok(inputs)
}

fn consolidation_groups(matches: &ArgMatches, id: &str) -> CliResult<Option<Vec<ConsolidationGroup>>> {
    let Some(occurrences) = matches.get_occurrences::<String>(id) else {
        return Ok(None);
    };
    let groups = occurrences
        .map(|tokens| ConsolidationGroup::from_tokens(&tokens.collect::<Vec<_>>()))
        .collect::<tabsheet_core::Result<Vec<_>>>()?;
    Ok(Some(groups))
}

/// True if both paths name the same file, resolving links where they exist
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn take_lock(cli: &Cli, out_path: &mut Option<String>, inputs: &[Input]) -> CliResult<Option<LockGuard>> {
    let Some(requested) = &cli.lock else {
        return Ok(None);
    };
    let target = match out_path.as_deref() {
        Some(out) if out != STDOUT => out.to_string(),
        _ => {
            warn!("locking needs an output file, not locking");
            return Ok(None);
        }
    };

    let lock_path = match requested {
        Some(path) => path.clone(),
        None => {
            let resolved = fs::canonicalize(&target).unwrap_or_else(|_| PathBuf::from(&target));
            default_lock_path(&resolved)
        }
    };
    let clashes_with_input = inputs
        .first()
        .and_then(Input::path)
        .is_some_and(|first| same_file(&lock_path, first));
    if same_file(&lock_path, Path::new(&target)) || clashes_with_input {
        return Err(CliError::Usage(format!(
            "lock file {} cannot be the output or the first input file",
            lock_path.display()
        )));
    }

    match Locker::new(&lock_path).acquire()? {
        Some(guard) => Ok(Some(guard)),
        None => {
            let fallback = fallback_output(&target, std::process::id());
            error!(
                "could not get lock {}, writing output to {} instead; merge it back with: tabsheet -d {} {} -o {}",
                lock_path.display(),
                fallback,
                target,
                fallback,
                target
            );
            *out_path = Some(fallback);
            Ok(None)
        }
    }
}

fn warn_on_overwrite(out_path: Option<&str>, inputs: &[Input]) {
    let Some(target) = out_path.filter(|out| *out != STDOUT) else {
        return;
    };
    let path = Path::new(target);
    let is_input = inputs
        .iter()
        .filter_map(Input::path)
        .any(|input| same_file(input, path));
    if path.exists() && !is_input {
        warn!("output file {} exists and is not an input, overwriting", target);
    }
}

fn load_input(input: &Input, options: &LoadOptions, config: &SheetConfig) -> CliResult<Sheet> {
    let mut sheet = Sheet::with_config(config.clone());
    let report = match input {
        Input::Stdin => sheet.read_from(io::stdin().lock(), options, STDIN)?,
        Input::File(path) => sheet.read_csv(path, options)?,
    };
    debug!(?input, rows = report.rows, columns = report.columns, "loaded input");
    Ok(sheet)
}

fn cmd_load(
    inputs: &[Input],
    options: &[LoadOptions],
    config: &SheetConfig,
    mode: MergeMode,
) -> CliResult<Sheet> {
    let Some((first, rest)) = inputs.split_first() else {
        warn!("no input data, creating blank sheet");
        return Ok(Sheet::with_config(config.clone()));
    };

    let mut sheet = load_input(first, &options[0], config)?;
    for (input, opts) in rest.iter().zip(&options[1..]) {
        let other = load_input(input, opts, config)?;
        sheet.combine(other)?;
        sheet.contract(mode)?;
    }
    if !rest.is_empty() {
        info!(
            files = inputs.len(),
            rows = sheet.row_count(),
            columns = sheet.column_count(),
            "merged inputs"
        );
    }
    Ok(sheet)
}

fn cmd_edit<W: Write>(sheet: &mut Sheet, cli: &Cli, out: &mut W) -> CliResult<()> {
    let mut script = match &cli.edits {
        Some(path) => EditScript::load(path)?,
        None => EditScript::default(),
    };
    script.extend(EditScript {
        writes: chunk_writes(&cli.write)?,
        removals: chunk_pairs(&cli.remove)?,
    });
    if script.is_empty() {
        return Ok(());
    }

    let report = script.apply(sheet, cli.mode)?;
    if report.missing > 0 {
        warn!("{} cell(s) to remove were not found", report.missing);
    }
    for removed in &report.removed {
        writeln!(out, "{}", removed_text(removed))?;
    }
    Ok(())
}

/// Replace the sheet by the selected columns of its matching rows
///
/// Without tokens the sheet is kept whole, locked columns included.
fn cmd_extract(sheet: Sheet, spec: &[String], config: &SheetConfig) -> CliResult<Sheet> {
    if spec.is_empty() {
        return Ok(sheet);
    }
    let records = sheet.get_columns(spec, true, false)?;
    let mut extracted = Sheet::with_config(config.clone());
    extracted.load(records, &LoadOptions::default())?;
    Ok(extracted)
}

fn cmd_print_headers<W: Write>(sheet: &Sheet, out: &mut W) -> CliResult<()> {
    for (i, header) in sheet.headers().iter().enumerate() {
        writeln!(out, "{} {}", i, header)?;
    }
    Ok(())
}

fn cmd_query<W: Write>(sheet: &Sheet, spec: &[String], out: &mut W) -> CliResult<()> {
    let records = sheet.get_columns(spec, false, true)?;
    let mut ids: Vec<&str> = records
        .iter()
        .skip(1)
        .filter_map(|record| record.first())
        .map(String::as_str)
        .collect();
    ids.sort_unstable();
    for id in ids {
        writeln!(out, "{}", id)?;
    }
    Ok(())
}

fn cmd_read<W: Write>(sheet: &Sheet, tokens: &[String], out: &mut W) -> CliResult<()> {
    for edit in chunk_pairs(tokens)? {
        match read_cell(sheet, &edit)? {
            Some(value) => writeln!(out, "{}", value)?,
            None => warn!(
                "nothing to read at {} {}",
                edit.id,
                edit.header.as_deref().unwrap_or_default()
            ),
        }
    }
    Ok(())
}

fn cmd_save<W: Write>(sheet: &Sheet, cli: &Cli, target: &str, out: &mut W) -> CliResult<()> {
    let options = SaveOptions {
        delimiter: parse_delimiter(&cli.out_delim)?,
        headers: !cli.out_no_header,
        replace_headers: cli.out_header.clone(),
        transpose: cli.out_trans,
    };
    if target == STDOUT {
        sheet.write_to(out, &options)?;
    } else {
        sheet.save(target, &options)?;
        info!(path = target, rows = sheet.row_count(), "saved sheet");
    }
    Ok(())
}
