use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ldifconv::config::{self, Settings};
use ldifconv::fold::DEFAULT_WIDTH;
use ldifconv::{
    convert, reader_for, writer_for, ControlRegistry, Format, LdifError, Result, SchemaOracle,
    WriterOptions,
};

/// Convert directory records between LDIF, DSML and JSON.
#[derive(Clone, Debug, Parser)]
#[command(name = "ldifconv", version)]
struct Opts {
    /// Input file; standard input when omitted or "-".
    input: Option<PathBuf>,

    /// Output file; standard output when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: ldif, dsml1, dsml2 or json.
    #[arg(short, long)]
    format: Option<Format>,

    /// Input format: ldif or dsml2.
    #[arg(short, long)]
    input_format: Option<Format>,

    /// LDIF line width, 0 to disable folding.
    #[arg(short, long)]
    width: Option<usize>,

    /// Write attribute names without values.
    #[arg(long)]
    attributes_only: bool,

    /// Skip server-maintained attributes.
    #[arg(long)]
    omit_readonly: bool,

    /// Do not start LDIF output with "version: 1".
    #[arg(long)]
    no_version: bool,

    /// Write LDIF values to numbered files in this directory.
    #[arg(long)]
    spill_dir: Option<PathBuf>,

    /// Configuration profile to use.
    #[arg(short, long)]
    profile: Option<String>,

    /// More logging; repeat for debug output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(p) if p != Path::new("-") => {
            let file = File::open(p).map_err(|source| LdifError::File {
                path: p.to_path_buf(),
                source,
            })?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(io::stdin().lock())),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) => {
            let file = File::create(p).map_err(|source| LdifError::File {
                path: p.to_path_buf(),
                source,
            })?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn run(opts: &Opts) -> Result<u64> {
    let settings = match config::load_profile(opts.profile.as_deref())? {
        Some(profile) => Settings::from_profile(&profile)?,
        None => Settings::default(),
    };

    let output_format = opts.format.or(settings.format).unwrap_or(Format::Ldif);
    let input_format = opts.input_format.or(settings.input_format).unwrap_or(Format::Ldif);

    let mut options = WriterOptions::default()
        .width(opts.width.or(settings.width).unwrap_or(DEFAULT_WIDTH))
        .attributes_only(opts.attributes_only || settings.attributes_only)
        .omit_readonly(opts.omit_readonly || settings.omit_readonly)
        .version_line(!opts.no_version && settings.version_line.unwrap_or(true));
    if let Some(dir) = opts.spill_dir.clone().or(settings.spill_dir.clone()) {
        options = options.spill_dir(dir);
    }

    let schema: Arc<dyn SchemaOracle> = Arc::new(settings.schema());
    let registry = Arc::new(ControlRegistry::with_defaults());

    let input = open_input(opts.input.as_deref())?;
    let output = open_output(opts.output.as_deref())?;
    let mut reader = reader_for(input_format, input, schema.clone(), registry)?;
    let mut writer = writer_for(output_format, output, options, schema);

    let count = convert(reader.as_mut(), writer.as_mut())?;
    info!(records = count, from = %input_format, to = %output_format, "conversion finished");
    Ok(count)
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    match run(&opts) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ldifconv: {}", e);
            ExitCode::FAILURE
        }
    }
}
