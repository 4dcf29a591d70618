use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use mapprune_core::{
    Coord3, CoreError, CoreErrorCode, MapDb, PruneOptions, PrunePlan, PruneReport, VerifyReport,
    execute_prune, map_to_overmap, missing_keep_overmaps, parse_keep_items, split_keep_text,
    verify,
};

/// Missing edges printed per grid field before truncating.
const MISSING_EDGE_PRINT_LIMIT: usize = 50;

#[derive(Debug, Parser)]
#[command(
    name = "bn-mapprune",
    version,
    about = "Prune a Bright Nights map.sqlite3 down to chosen coordinates, \
             keeping the grids of surviving overmaps intact",
    group(clap::ArgGroup::new("keep_source").required(true))
)]
struct Cli {
    /// Path to map.sqlite3 (default: ./map.sqlite3)
    #[arg(value_name = "MAP.SQLITE3")]
    db: Option<PathBuf>,
    /// Comma-separated coordinates to keep, e.g. "119.183.10,119.183.9"
    #[arg(long, value_name = "COORDS", group = "keep_source")]
    keep: Option<String>,
    /// File of coordinates to keep (one or more per line, # comments ok)
    #[arg(long = "keep-file", value_name = "FILE", group = "keep_source")]
    keep_file: Option<PathBuf>,
    /// Prompt for the keep coordinates interactively
    #[arg(long, group = "keep_source")]
    interactive: bool,
    /// Overmap coordinate span for x/y
    #[arg(long, default_value_t = 180)]
    span: i64,
    /// Show the plan without modifying the database
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Skip the Y/N confirmation
    #[arg(long)]
    force: bool,
    /// Skip VACUUM after the prune (faster, but the file stays larger)
    #[arg(long = "no-vacuum")]
    no_vacuum: bool,
    /// Wipe the electric/fluid grid fields of kept overmaps instead of
    /// restoring them
    #[arg(long = "remove-grids")]
    remove_grids: bool,
    /// Original database to verify kept-coordinate edges against
    #[arg(long = "verify-against", value_name = "ORIGINAL_DB")]
    verify_against: Option<PathBuf>,
    /// Only run verification; never modify the database
    #[arg(long = "verify-only", requires = "verify_against")]
    verify_only: bool,
}

fn main() {
    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db.as_deref());

    let keep_items = read_keep_items(&cli);
    let keep_coords = parse_keep_items(&keep_items).unwrap_or_else(|e| fail(e));
    if cli.span <= 0 {
        eprintln!("Error: --span must be a positive integer");
        process::exit(2);
    }

    print_input_summary(&keep_coords, cli.span, cli.remove_grids);

    if cli.verify_only {
        let original = cli.verify_against.as_ref().expect("required by clap");
        let code = run_verification(original, &db_path, &keep_coords, cli.span);
        process::exit(code);
    }

    let mut db = MapDb::open(&db_path).unwrap_or_else(|e| fail(e));
    let plan = PrunePlan::build(
        &keep_coords,
        cli.span,
        &db.map_paths().unwrap_or_else(|e| fail(e)),
        &db.overmap_paths().unwrap_or_else(|e| fail(e)),
    )
    .unwrap_or_else(|e| fail(e));

    print_plan(&db_path, &plan);

    let missing = missing_keep_overmaps(&db, &plan).unwrap_or_else(|e| fail(e));
    if !missing.is_empty() {
        eprintln!("Warning: these keep-overmaps are not in the database:");
        for path in &missing {
            eprintln!("  {path}");
        }
        eprintln!("  (the span may be wrong for this save, or the overmap never existed)");
        eprintln!();
    }

    if cli.dry_run {
        println!("[DRY RUN] database left unmodified.");
        return;
    }

    if !cli.force && !prompt_yes_no("Delete/patch the database as planned? (Y/N): ") {
        println!("Cancelled; database left unmodified.");
        return;
    }

    // The backup must land before any destructive step; a failed copy aborts
    // the whole run.
    let backup = make_backup(&db_path).unwrap_or_else(|e| {
        eprintln!("Error creating backup copy: {e}");
        process::exit(1);
    });
    println!("Backup written to {}", backup.display());

    let options = PruneOptions {
        wipe_grids: cli.remove_grids,
        vacuum: !cli.no_vacuum,
    };
    let report = execute_prune(&mut db, &plan, &options).unwrap_or_else(|e| fail(e));
    print_report(&db_path, &report);

    if let Some(original) = cli.verify_against.as_ref() {
        let code = run_verification(original, &db_path, &keep_coords, cli.span);
        process::exit(code);
    }
}

fn fail(error: CoreError) -> ! {
    eprintln!("Error: {error}");
    let code = match error.code {
        CoreErrorCode::Config => 2,
        _ => 1,
    };
    process::exit(code);
}

// ---------------------------------------------------------------------------
// Input handling
// ---------------------------------------------------------------------------

fn resolve_db_path(arg: Option<&Path>) -> PathBuf {
    match arg {
        Some(path) => {
            if !path.exists() {
                eprintln!("Error: database file not found: {}", path.display());
                process::exit(2);
            }
            path.to_path_buf()
        }
        None => {
            let candidate = PathBuf::from("map.sqlite3");
            if !candidate.exists() {
                eprintln!("Error: no map.sqlite3 in the current directory.");
                eprintln!("       Pass the database path explicitly, e.g.:");
                eprintln!("       bn-mapprune /path/to/map.sqlite3 --keep 119.183.10");
                process::exit(2);
            }
            println!("Using ./map.sqlite3 from the current directory.");
            candidate
        }
    }
}

fn read_keep_items(cli: &Cli) -> Vec<String> {
    if cli.interactive {
        println!("Enter coordinates to keep, e.g. 119.183.10, 119.183.9");
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            eprintln!("Error: failed to read from stdin");
            process::exit(2);
        }
        split_keep_text(&line)
    } else if let Some(file) = cli.keep_file.as_ref() {
        let text = fs::read_to_string(file).unwrap_or_else(|e| {
            eprintln!("Error reading {}: {e}", file.display());
            process::exit(2);
        });
        split_keep_text(&text)
    } else {
        let keep = cli.keep.as_deref().expect("required by clap");
        split_keep_text(keep)
    }
}

fn prompt_yes_no(prompt: &str) -> bool {
    let stdin = io::stdin();
    loop {
        print!("{prompt}");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            return false;
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return true,
            "n" | "no" => return false,
            _ => println!("Please answer Y or N."),
        }
    }
}

/// Copy the database aside before mutating it. Never overwrites an earlier
/// backup; falls back to `.bak1`, `.bak2`, ...
fn make_backup(db_path: &Path) -> io::Result<PathBuf> {
    let mut backup = PathBuf::from(format!("{}.bak", db_path.display()));
    let mut index = 1;
    while backup.exists() {
        backup = PathBuf::from(format!("{}.bak{index}", db_path.display()));
        index += 1;
    }
    fs::copy(db_path, &backup)?;
    Ok(backup)
}

// ---------------------------------------------------------------------------
// Output formatting
// ---------------------------------------------------------------------------

fn print_input_summary(keep_coords: &[Coord3], span: i64, remove_grids: bool) {
    println!("=== INPUT SUMMARY ===");
    println!("Keep coords (span {span}):");
    for coord in keep_coords {
        let mapped = map_to_overmap(coord.x, coord.y, span);
        println!(
            "  {coord} -> {}  (local {}.{}.{})",
            mapped.id.path(),
            mapped.local_x,
            mapped.local_y,
            coord.z
        );
    }
    let mode = if remove_grids {
        "REMOVE ALL (no restore)"
    } else {
        "SNAPSHOT+RESTORE (default)"
    };
    println!("Grid handling: {mode}");
    println!("=====================");
    println!();
}

fn print_plan(db_path: &Path, plan: &PrunePlan) {
    let total_maps =
        plan.kept_map_paths.len() + plan.delete_map_paths.len() + plan.ignored_map_paths.len();
    let total_overmaps = plan.kept_overmap_paths.len()
        + plan.delete_overmap_paths.len()
        + plan.ignored_overmap_paths.len();

    println!("=== PLAN ===");
    println!("DB: {}", db_path.display());
    println!("Total map entries: {total_maps}");
    println!("  Will keep:   {}", plan.kept_map_paths.len());
    println!("  Will delete: {}", plan.delete_map_paths.len());
    if !plan.ignored_map_paths.is_empty() {
        println!("  Untouched:   {}", plan.ignored_map_paths.len());
    }
    println!("Total overmap entries: {total_overmaps}");
    println!("  Will keep:   {}", plan.kept_overmap_paths.len());
    println!("  Will delete: {}", plan.delete_overmap_paths.len());
    if !plan.ignored_overmap_paths.is_empty() {
        println!("  Untouched:   {}", plan.ignored_overmap_paths.len());
    }
    println!("============");
    println!();
}

fn print_report(db_path: &Path, report: &PruneReport) {
    println!();
    println!("=== DONE ===");
    println!("Deleted map entries:       {}", report.deleted_map_entries);
    println!("Deleted overmap entries:   {}", report.deleted_overmap_entries);
    if report.restored_overmaps > 0 {
        println!("Overmaps restored:         {}", report.restored_overmaps);
    }
    if report.wiped_overmaps > 0 {
        println!("Overmaps wiped:            {}", report.wiped_overmaps);
    }
    println!("Remaining map entries:     {}", report.remaining_map_entries);
    println!(
        "Remaining overmap entries: {}",
        report.remaining_overmap_entries
    );
    println!(
        "Total remaining entries:   {}",
        report.remaining_total_entries
    );
    println!("Modified DB: {}", db_path.display());
    println!("============");
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

fn run_verification(
    original_db: &Path,
    target_db: &Path,
    keep_coords: &[Coord3],
    span: i64,
) -> i32 {
    let keep_set = keep_coords.iter().copied().collect();
    let keep_overmaps = keep_coords
        .iter()
        .map(|c| map_to_overmap(c.x, c.y, span).id)
        .collect();

    let report = verify(original_db, target_db, &keep_set, &keep_overmaps, span)
        .unwrap_or_else(|e| fail(e));
    print_verify_report(original_db, target_db, keep_coords.len(), &report);
    if report.passed() { 0 } else { 1 }
}

fn print_verify_report(
    original_db: &Path,
    target_db: &Path,
    kept_coords: usize,
    report: &VerifyReport,
) {
    println!();
    println!("=== VERIFY (kept coords only) ===");
    println!("Original DB: {}", original_db.display());
    println!("Target DB:   {}", target_db.display());
    println!("Kept coords: {kept_coords}");
    println!(
        "Electric edges: original {}, target {}, missing {}",
        report.electric.original,
        report.electric.target,
        report.electric.missing.len()
    );
    println!(
        "Fluid edges:    original {}, target {}, missing {}",
        report.fluid.original,
        report.fluid.target,
        report.fluid.missing.len()
    );

    print_missing_edges("Electric", report.electric.missing.iter());
    print_missing_edges("Fluid", report.fluid.missing.iter());

    if report.passed() {
        println!();
        println!("VERIFY: PASS");
    } else {
        println!();
        println!("VERIFY: FAIL");
    }
}

fn print_missing_edges<'a>(label: &str, edges: impl ExactSizeIterator<Item = &'a (Coord3, Coord3)>) {
    if edges.len() == 0 {
        return;
    }
    println!();
    println!("[Missing {label} edges] (showing up to {MISSING_EDGE_PRINT_LIMIT})");
    for (a, b) in edges.take(MISSING_EDGE_PRINT_LIMIT) {
        println!("  {a}  <->  {b}");
    }
}
