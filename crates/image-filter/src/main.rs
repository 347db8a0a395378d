use archive_image_filter::{FilterOptions, ImageFilter};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(version, about)]
struct Args {
    /// Archive written by archive-to-images
    #[clap(long)]
    input: PathBuf,
    /// Archive to write the kept images to, replaced if it exists
    #[clap(long)]
    output: PathBuf,
    #[clap(long, alias = "minimum_entropy", default_value_t = 6.0)]
    minimum_entropy: f64,
    #[clap(long, alias = "minimum_width", default_value_t = 200)]
    minimum_width: u32,
    #[clap(long, alias = "minimum_height", default_value_t = 200)]
    minimum_height: u32,
    /// Copy entries ending in pdf without decoding them
    #[clap(long, alias = "include_pdfs")]
    include_pdfs: bool,
    /// Keep entries with "thumb" in their name
    #[clap(long, alias = "include_thumbnails")]
    include_thumbnails: bool,
}

impl Args {
    fn options(&self) -> FilterOptions {
        FilterOptions {
            min_entropy: self.minimum_entropy,
            min_width: self.minimum_width,
            min_height: self.minimum_height,
            include_pdfs: self.include_pdfs,
            include_thumbnails: self.include_thumbnails,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env()?;
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_file(false))
        .with(env_filter)
        .init();

    let input = BufReader::new(File::open(&args.input)?);
    let output = File::create(&args.output)?;
    let mut filter = ImageFilter::new(output, args.options());
    info!("Filtering {} with {}", args.input.display(), filter.options());
    let counts = filter.filter(input)?;
    filter.finish()?;
    info!("All done, wrote {}: {counts}", args.output.display());
    Ok(())
}
