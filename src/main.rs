use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// A tool to remove duplicate files from a directory tree and flatten the
/// survivors into the top-level directory.
/// Duplicates are detected by name, size, or both; no file content is read.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to clean up. Prompted for interactively if not given.
    directory: Option<PathBuf>,

    /// Which files count as duplicates of each other. Prompted for interactively if not given.
    #[arg(short = 'c', long, value_enum)]
    criterion: Option<Criterion>,

    /// Apply changes without confirmation (dangerous!)
    #[arg(short = 'f', long)]
    force: bool,

    /// Stop after removing duplicates; leave the directory structure in place.
    #[arg(long)]
    no_flatten: bool,

    /// Follow symbolic links when scanning directories.
    #[arg(long)]
    follow_symlinks: bool,

    /// Suppress duplicate group listings and per-file progress output.
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Logging verbosity for duplicate listings and per-file operations.
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Summary format to emit after processing.
    #[arg(long, value_enum, default_value = "text")]
    summary_format: SummaryFormat,

    /// Optional path to write the final summary output.
    #[arg(long)]
    summary_path: Option<PathBuf>,

    /// Suppress printing the final summary lines to stdout (file/JSON output still generated).
    #[arg(long)]
    summary_silent: bool,
}

/// The rule deciding that two files are duplicates of each other.
#[derive(Copy, Clone, Debug, Serialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum Criterion {
    /// Files with the same base name are duplicates.
    Name,
    /// Files with the same size in bytes are duplicates.
    Size,
    /// Files with the same base name and the same size are duplicates.
    NameSize,
}

#[derive(Copy, Clone, Debug, Serialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum SummaryFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum LogLevel {
    Info,
    Warn,
    Error,
    None,
}

/// Grouping dimension derived from the selected criterion. Name-based
/// criteria group on the base name only; size equality under `NameSize`
/// is re-checked per candidate at deletion time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Name(OsString),
    Size(u64),
}

/// A file discovered during the scan. Ephemeral; never persisted.
#[derive(Debug, Clone)]
struct FileRecord {
    path: PathBuf,
    size: u64,
}

#[derive(Clone, Serialize)]
struct OpFailure {
    path: PathBuf,
    size: u64,
    error: String,
}

#[derive(Clone, Default, Serialize)]
struct DedupeReport {
    scanned: usize,
    duplicate_groups: usize,
    deleted: usize,
    bytes_reclaimed: u64,
    failures: Vec<OpFailure>,
}

#[derive(Clone, Default, Serialize)]
struct FlattenReport {
    moved: usize,
    already_at_top: usize,
    failures: Vec<OpFailure>,
}

#[derive(Serialize)]
struct JsonSummary {
    directory: String,
    criterion: Criterion,
    scanned_files: usize,
    duplicate_groups: usize,
    deleted_files: usize,
    deleted_bytes: u64,
    flattened_files: Option<usize>,
    elapsed_seconds: f64,
    delete_failures: Vec<OpFailure>,
    move_failures: Vec<OpFailure>,
}

/// How a run ended. Every variant other than `Completed` is a clean early
/// exit requested by the user or forced by a missing target, not an error.
#[derive(Debug, PartialEq, Eq)]
enum RunStatus {
    Completed,
    SelectionCancelled,
    NoCriterionChosen,
    NoDirectoryChosen,
    MissingDirectory,
    ConfirmationDeclined,
}

/// Answer classes of the criterion prompt. Cancelling and giving no usable
/// answer both stop the run but are reported with distinct messages.
#[derive(Debug, PartialEq, Eq)]
enum CriterionChoice {
    Chosen(Criterion),
    Cancelled,
    NoChoice,
}

/// Converts a file size in bytes to a human‐readable string with appropriate units.
fn human_readable(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Formats a Duration into a human‐readable string.
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let mins = secs / 60;
    let secs = secs % 60;
    if mins > 0 {
        format!("{} min {} sec", mins, secs)
    } else {
        format!("{} sec", secs)
    }
}

fn ansi_fixed(code: u8, text: impl AsRef<str>) -> String {
    format!("\x1b[38;5;{}m{}\x1b[0m", code, text.as_ref())
}

fn ansi_rgb(r: u8, g: u8, b: u8, text: impl AsRef<str>) -> String {
    format!("\x1b[38;2;{};{};{}m{}\x1b[0m", r, g, b, text.as_ref())
}

fn describe_key(key: &GroupKey) -> String {
    match key {
        GroupKey::Name(name) => format!("name: {}", Path::new(name).display()),
        GroupKey::Size(size) => format!("size: {}", human_readable(*size)),
    }
}

/// Scans the directory tree and removes duplicate files according to the
/// criterion, keeping the first file encountered in traversal order of each
/// duplicate group. Individual deletion failures are reported and skipped;
/// a missing root directory is reported and yields an empty report.
fn remove_duplicates(
    root: &Path,
    criterion: Criterion,
    follow_symlinks: bool,
    info_logs: bool,
    error_logs: bool,
) -> DedupeReport {
    let mut report = DedupeReport::default();
    if !root.exists() {
        if error_logs {
            eprintln!("Directory {} does not exist.", root.display());
        }
        return report;
    }

    // Stage 1: walk the tree and group files by the criterion's key.
    // Vec order within a group is discovery order; it decides the survivor.
    let mut groups: HashMap<GroupKey, Vec<FileRecord>> = HashMap::new();
    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                if error_logs {
                    eprintln!("Error reading entry: {}", e);
                }
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        report.scanned += 1;
        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                if error_logs {
                    eprintln!("Error reading metadata for {}: {}", entry.path().display(), e);
                }
                continue;
            }
        };
        let key = match criterion {
            Criterion::Size => GroupKey::Size(size),
            Criterion::Name | Criterion::NameSize => {
                GroupKey::Name(entry.file_name().to_os_string())
            }
        };
        groups
            .entry(key)
            .or_default()
            .push(FileRecord { path: entry.into_path(), size });
    }

    // Stage 2: delete every group member except the survivor. Under NameSize
    // the grouping key was name-only, so a same-named file whose size differs
    // from the survivor's must be left untouched.
    for (key, group) in &groups {
        if group.len() <= 1 {
            continue;
        }
        let survivor = &group[0];
        let candidates: Vec<&FileRecord> = group[1..]
            .iter()
            .filter(|record| criterion != Criterion::NameSize || record.size == survivor.size)
            .collect();
        if candidates.is_empty() {
            continue;
        }
        report.duplicate_groups += 1;
        if info_logs {
            println!(
                "{}",
                ansi_fixed(8, format!("Duplicate group ({}):", describe_key(key)))
            );
            for (i, record) in group.iter().enumerate() {
                println!(
                    "  {}: {} ({})",
                    i + 1,
                    record.path.display(),
                    human_readable(record.size)
                );
            }
        }
        for record in candidates {
            match fs::remove_file(&record.path) {
                Ok(()) => {
                    report.deleted += 1;
                    report.bytes_reclaimed += record.size;
                    if info_logs {
                        println!("Deleted duplicate {}", record.path.display());
                    }
                }
                Err(err) => {
                    if error_logs {
                        eprintln!("Error deleting {}: {}", record.path.display(), err);
                    }
                    report.failures.push(OpFailure {
                        path: record.path.clone(),
                        size: record.size,
                        error: err.to_string(),
                    });
                }
            }
        }
    }
    report
}

/// Returns a free destination path in `dest` for `file_name`. If the name is
/// taken, appends a counter before the extension until the name is free.
fn unique_destination(dest: &Path, file_name: &OsStr) -> PathBuf {
    let initial_dest = dest.join(file_name);
    if !initial_dest.exists() {
        return initial_dest;
    }
    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .unwrap_or(file_name)
        .to_string_lossy()
        .into_owned();
    let ext = name.extension().and_then(|s| s.to_str()).unwrap_or("");
    let mut counter = 1;
    loop {
        let new_name = if ext.is_empty() {
            format!("{}({})", stem, counter)
        } else {
            format!("{}({}).{}", stem, counter, ext)
        };
        let new_dest = dest.join(new_name);
        if !new_dest.exists() {
            return new_dest;
        }
        counter += 1;
    }
}

/// Moves every file found under `root` directly into `root`, renaming on
/// collision. Files already at the top level are skipped; subdirectories are
/// emptied but left in place. A failed move is reported and skipped.
fn flatten_tree(
    root: &Path,
    follow_symlinks: bool,
    info_logs: bool,
    error_logs: bool,
) -> FlattenReport {
    let mut report = FlattenReport::default();

    // Collect the full file list up front so files moved into the root are
    // not visited a second time by the walk.
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                if error_logs {
                    eprintln!("Error reading entry: {}", e);
                }
            }
        }
    }

    for path in files {
        if path.parent() == Some(root) {
            report.already_at_top += 1;
            continue;
        }
        let file_name = match path.file_name() {
            Some(name) => name,
            None => continue,
        };
        let dest = unique_destination(root, file_name);
        match fs::rename(&path, &dest) {
            Ok(()) => {
                report.moved += 1;
                if info_logs {
                    println!("Moved {} to {}", path.display(), dest.display());
                }
            }
            Err(err) => {
                if error_logs {
                    eprintln!("Error moving {}: {}", path.display(), err);
                }
                let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                report.failures.push(OpFailure {
                    path: path.clone(),
                    size,
                    error: err.to_string(),
                });
            }
        }
    }
    report
}

fn prompt_criterion<R: BufRead>(input: &mut R) -> io::Result<CriterionChoice> {
    println!("Select which duplicates to remove:");
    println!("  0) keep one file per name");
    println!("  1) keep one file per size");
    println!("  2) keep one file per name and size");
    print!("Choice [0-2] (c to cancel): ");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(CriterionChoice::NoChoice);
    }
    Ok(match line.trim() {
        "0" => CriterionChoice::Chosen(Criterion::Name),
        "1" => CriterionChoice::Chosen(Criterion::Size),
        "2" => CriterionChoice::Chosen(Criterion::NameSize),
        "c" | "C" | "q" | "Q" => CriterionChoice::Cancelled,
        _ => CriterionChoice::NoChoice,
    })
}

fn prompt_directory<R: BufRead>(input: &mut R) -> io::Result<Option<PathBuf>> {
    print!("Target directory: ");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(trimmed)))
    }
}

fn write_summary_to_path(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut data = contents.to_string();
    if !data.ends_with('\n') {
        data.push('\n');
    }
    fs::write(path, data)
}

fn run_app<R: BufRead>(args: Args, mut input: R) -> io::Result<RunStatus> {
    let summary_stdout = args.summary_format == SummaryFormat::Text && !args.summary_silent;
    let info_logs = !args.quiet && matches!(args.log_level, LogLevel::Info);
    let warn_logs = !args.quiet && matches!(args.log_level, LogLevel::Info | LogLevel::Warn);
    let error_logs = matches!(
        args.log_level,
        LogLevel::Info | LogLevel::Warn | LogLevel::Error
    );

    let criterion = match args.criterion {
        Some(criterion) => criterion,
        None => match prompt_criterion(&mut input)? {
            CriterionChoice::Chosen(criterion) => criterion,
            CriterionChoice::Cancelled => {
                println!("Selection cancelled.");
                return Ok(RunStatus::SelectionCancelled);
            }
            CriterionChoice::NoChoice => {
                println!("No deletion criterion chosen.");
                return Ok(RunStatus::NoCriterionChosen);
            }
        },
    };

    let directory = match args.directory.clone() {
        Some(directory) => directory,
        None => match prompt_directory(&mut input)? {
            Some(directory) => directory,
            None => {
                println!("No folder selected.");
                return Ok(RunStatus::NoDirectoryChosen);
            }
        },
    };

    if !directory.exists() {
        println!("Directory {} does not exist.", directory.display());
        return Ok(RunStatus::MissingDirectory);
    }

    if !args.force {
        print!(
            "WARNING: duplicate files under {} will be permanently deleted. Do you wish to proceed? (y/N): ",
            directory.display()
        );
        io::stdout().flush()?;
        let mut confirmation = String::new();
        input.read_line(&mut confirmation)?;
        if !confirmation.trim().eq_ignore_ascii_case("y") {
            println!("Operation cancelled.");
            return Ok(RunStatus::ConfirmationDeclined);
        }
    }

    let mut summary_lines: Vec<String> = Vec::new();
    if summary_stdout {
        println!(
            "Starting duplicate removal in directory: {}",
            directory.display()
        );
    }
    let start = Instant::now();

    let dedupe = remove_duplicates(
        &directory,
        criterion,
        args.follow_symlinks,
        info_logs,
        error_logs,
    );
    let dedupe_plain = format!(
        "{} files scanned, {} duplicates deleted ({} reclaimed).",
        dedupe.scanned,
        dedupe.deleted,
        human_readable(dedupe.bytes_reclaimed)
    );
    summary_lines.push(format!("Deduplication summary: {}", dedupe_plain));
    if summary_stdout {
        println!(
            "{} {}",
            ansi_rgb(173, 216, 230, "Deduplication summary:"),
            ansi_rgb(255, 255, 224, &dedupe_plain)
        );
    }
    if !dedupe.failures.is_empty() {
        if warn_logs {
            eprintln!("The following files could not be deleted:");
            for failure in &dedupe.failures {
                eprintln!(
                    "  {} ({}): {}",
                    failure.path.display(),
                    human_readable(failure.size),
                    failure.error
                );
            }
        }
        for failure in &dedupe.failures {
            summary_lines.push(format!(
                "Delete failure: {} ({}): {}",
                failure.path.display(),
                human_readable(failure.size),
                failure.error
            ));
        }
    }

    let flatten = if args.no_flatten {
        summary_lines.push("Flatten skipped.".to_string());
        if summary_stdout {
            println!("Flatten skipped.");
        }
        None
    } else {
        let report = flatten_tree(&directory, args.follow_symlinks, info_logs, error_logs);
        let flatten_plain = format!(
            "{} files moved to the top level, {} already there.",
            report.moved, report.already_at_top
        );
        summary_lines.push(format!("Flatten summary: {}", flatten_plain));
        if summary_stdout {
            println!(
                "{} {}",
                ansi_rgb(173, 216, 230, "Flatten summary:"),
                ansi_rgb(255, 255, 224, &flatten_plain)
            );
        }
        if !report.failures.is_empty() {
            if warn_logs {
                eprintln!("The following files could not be moved:");
                for failure in &report.failures {
                    eprintln!("  {}: {}", failure.path.display(), failure.error);
                }
            }
            for failure in &report.failures {
                summary_lines.push(format!(
                    "Move failure: {}: {}",
                    failure.path.display(),
                    failure.error
                ));
            }
        }
        Some(report)
    };

    let elapsed = start.elapsed();
    summary_lines.push(format!("Run completed in {}.", format_duration(elapsed)));
    if summary_stdout {
        println!("Run completed in {}.", format_duration(elapsed));
    }

    let mut json_summary_output: Option<String> = None;
    if args.summary_format == SummaryFormat::Json {
        let json_summary = JsonSummary {
            directory: directory.display().to_string(),
            criterion,
            scanned_files: dedupe.scanned,
            duplicate_groups: dedupe.duplicate_groups,
            deleted_files: dedupe.deleted,
            deleted_bytes: dedupe.bytes_reclaimed,
            flattened_files: flatten.as_ref().map(|report| report.moved),
            elapsed_seconds: elapsed.as_secs_f64(),
            delete_failures: dedupe.failures.clone(),
            move_failures: flatten
                .as_ref()
                .map(|report| report.failures.clone())
                .unwrap_or_default(),
        };
        let json_output = serde_json::to_string_pretty(&json_summary)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
        println!("{}", json_output);
        json_summary_output = Some(json_output);
    }

    if let Some(path) = &args.summary_path {
        let contents = match args.summary_format {
            SummaryFormat::Json => json_summary_output
                .clone()
                .unwrap_or_else(|| String::from("{}")),
            SummaryFormat::Text => summary_lines.join("\n"),
        };
        write_summary_to_path(path, &contents)?;
    }

    Ok(RunStatus::Completed)
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let stdin = io::stdin();
    let stdin_lock = stdin.lock();
    run_app(args, stdin_lock).map(|_| ())
}
