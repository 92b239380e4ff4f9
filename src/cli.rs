// ============================================================================
// pixelstack CLI: headless batch filtering via command-line arguments
// ============================================================================
//
// Usage examples:
//   pixelstack -i photo.png -f sepia -o result.png
//   pixelstack -i photo.jpg -f blur:radius=3 -f noise:amount=10,seed=4 -o out.jpg
//   pixelstack -i "shots/*.png" -f grayscale --output-dir processed/ --format jpeg
//   pixelstack -i project.json --output flat.png
//   pixelstack -i photo.png -f oil-painting --format json   (writes photo.json)
//
// Filters run in order on the active layer. Raster output is the flattened
// composite; JSON output keeps every layer.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;

use crate::io::{self, ExportFormat};
use crate::ops::dispatch::{FilterKind, FilterOptions};
use crate::project::Project;
use crate::settings::Settings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// pixelstack headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "pixelstack",
    version,
    about = "Apply layer filters to images and projects from the command line",
    long_about = "Load raster images or JSON layer projects, run filters on the active\n\
                  layer, and write either the flattened image (PNG, JPEG, BMP, TGA) or\n\
                  the JSON project.\n\n\
                  Example:\n  \
                  pixelstack -i photo.png -f sharpen -f vintage:seed=7 -o result.png\n  \
                  pixelstack -i \"*.jpg\" -f grayscale --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    /// JSON project files keep all layers; other formats load as one layer.
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Filter to apply, as NAME or NAME:key=value,key=value. Repeat for a
    /// chain; filters run in the order given.
    #[arg(short = 'f', long = "filter", value_name = "NAME[:OPTS]")]
    pub filters: Vec<FilterSpec>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tga, json.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100). Defaults to the jpeg_quality setting.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// Print per-file timing and mirror log lines to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

/// One `--filter` argument.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub options: FilterOptions,
}

impl FromStr for FilterSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, opts) = match s.split_once(':') {
            Some((n, o)) => (n, o),
            None => (s, ""),
        };
        let kind = name.parse::<FilterKind>().map_err(|e| e.to_string())?;
        let options = opts.parse::<FilterOptions>()?;
        Ok(Self { kind, options })
    }
}

/// Where a processed document ends up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Image(ExportFormat),
    Project,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Image(f) => f.extension(),
            OutputFormat::Project => "json",
        }
    }

    fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "json" => OutputFormat::Project,
            other => OutputFormat::Image(
                ExportFormat::from_extension(other).unwrap_or(ExportFormat::Png),
            ),
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing with the user's saved settings and return an OS
/// exit code. `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = Settings::load();
    if !settings.parallel
        && let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(1).build_global()
    {
        log_warn!("Could not restrict the thread pool: {}", e);
    }
    run_with_settings(args, &settings)
}

pub fn run_with_settings(args: CliArgs, settings: &Settings) -> ExitCode {
    crate::logger::set_echo(args.verbose);

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let format = parse_format(args.format.as_deref(), args.output.as_deref());
    let mut settings = settings.clone();
    if let Some(q) = args.quality {
        settings.jpeg_quality = q.clamp(1, 100);
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            format,
        ) else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &args.filters, format, &settings) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  -> {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    filters: &[FilterSpec],
    format: OutputFormat,
    settings: &Settings,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut project =
        Project::open(input, settings).map_err(|e| format!("load failed: {}", e))?;

    // -- Step 2: Filters -------------------------------------------------
    for spec in filters {
        project
            .apply_filter(spec.kind.name(), &spec.options)
            .map_err(|e| format!("{} failed: {}", spec.kind.label(), e))?;
    }

    // -- Step 3: Save ----------------------------------------------------
    match format {
        OutputFormat::Project => project
            .save(output)
            .map_err(|e| format!("project save failed: {}", e)),
        OutputFormat::Image(f) => {
            let bytes = project
                .export(f.mime())
                .map_err(|e| format!("encode failed: {}", e))?;
            io::write_bytes(output, &bytes).map_err(|e| format!("save failed: {}", e))
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the output format from `--format` or the output file extension.
/// Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> OutputFormat {
    if let Some(f) = format_arg {
        return OutputFormat::from_name(f);
    }
    if let Some(ext) = output.and_then(|o| o.extension()).and_then(|e| e.to_str()) {
        return OutputFormat::from_name(ext);
    }
    OutputFormat::Image(ExportFormat::Png)
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Never overwrite the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
