use archive_to_images::{
    CarverCommand, ExtensionSets, ExtractionOptions, Extractor, IndexWindow, OutputCompression,
    DEFAULT_CARVER_TIMEOUT,
};
use byte_unit::Byte;
use clap::{Parser, ValueEnum};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARN")]
    Warn,
    #[value(name = "ERROR")]
    Error,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(version, about)]
struct Args {
    /// Any mixture of office documents, zip and tar archives, or directories
    /// containing them
    #[clap(required = true)]
    inputs: Vec<PathBuf>,
    /// Zip file to append extracted images to, created if necessary
    #[clap(long)]
    output: PathBuf,
    /// Number of images to skip before saving
    #[clap(long, default_value_t = 0)]
    start: u64,
    /// How many images to save
    #[clap(long)]
    count: Option<u64>,
    #[clap(long, alias = "image_extensions", num_args = 0.., value_delimiter = ',', default_values = [".jpg", ".jpeg", ".png"])]
    image_extensions: Vec<String>,
    #[clap(long, alias = "zip_extensions", num_args = 0.., value_delimiter = ',', default_values = [".zip", ".xlsx", ".pptx"])]
    zip_extensions: Vec<String>,
    /// Legacy binary documents, handed to the carving tool
    #[clap(long, alias = "old_extensions", num_args = 0.., value_delimiter = ',', default_values = [".ppt", ".xls"])]
    old_extensions: Vec<String>,
    #[clap(long, alias = "tar_extensions", num_args = 0.., value_delimiter = ',', default_values = [".tar", ".tgz", ".tbz2", ".tar.bz2", ".tar.gz"])]
    tar_extensions: Vec<String>,
    #[clap(long, alias = "log_level", value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    /// How many levels of nested containers to open.
    /// Unlimited if not given
    #[clap(long)]
    max_depth: Option<NonZeroUsize>,
    /// Largest entry to buffer in memory.
    /// Larger entries are logged and skipped
    #[clap(long)]
    max_entry_size: Option<Byte>,
    /// Only classify tar archives by extension
    #[clap(long)]
    no_sniff_tar: bool,
    /// Carving tool used for legacy documents
    #[clap(long, default_value = "python3")]
    carver_program: String,
    /// Argument passed to the carving tool before the input file and output
    /// directory. Repeat for multiple arguments
    #[clap(long = "carver-arg", allow_hyphen_values = true, default_values = ["-m", "hachoir.subfile", "--category", "image"])]
    carver_args: Vec<String>,
    /// Seconds before a hung carving tool is killed, 0 disables the timeout
    #[clap(long, default_value_t = DEFAULT_CARVER_TIMEOUT.as_secs())]
    carver_timeout: u64,
    /// Compression for newly written entries
    #[clap(long, value_enum, default_value_t)]
    compression: OutputCompression,
}

impl Args {
    fn options(&self) -> ExtractionOptions {
        let timeout = match self.carver_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        ExtractionOptions {
            extensions: ExtensionSets::new(
                &self.zip_extensions,
                &self.tar_extensions,
                &self.old_extensions,
                &self.image_extensions,
            ),
            window: IndexWindow::from_start_count(self.start, self.count),
            max_depth: self.max_depth,
            max_entry_size: self.max_entry_size,
            sniff_tar: !self.no_sniff_tar,
            carver: CarverCommand::new(&self.carver_program, &self.carver_args)
                .with_timeout(timeout),
            compression: self.compression,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::from(args.log_level).into())
        .from_env()?;
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_file(false))
        .with(env_filter)
        .init();

    let options = args.options();
    info!("Starting with {options}");

    let mut extractor = Extractor::with_path(args.output.clone(), options)?;
    for path in args.inputs {
        extractor.add_path(path)?;
    }
    let counts = extractor.extract_with_callback(|name, counts| {
        info!("Processed top-level file {name}: {counts}");
    })?;
    let counter = extractor.counter();
    extractor.finish()?;
    info!(
        "All done. Classified {counter} images, wrote {} to {}",
        counts.written,
        args.output.display()
    );
    Ok(())
}
