//! Post-processing for archives written by `archive-to-images`.
//!
//! Every entry of the input archive is decoded and only images that are both
//! large and detailed enough are copied into a new archive. Detail is
//! measured as the Shannon entropy of the pixel histogram.

use foldhash::HashSet;
use image::DynamicImage;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::io::{Read, Seek, Write};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

// Header sizes are untrusted
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FilterOptions {
    pub min_entropy: f64,
    pub min_width: u32,
    pub min_height: u32,
    pub include_pdfs: bool,
    pub include_thumbnails: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            min_entropy: 6.0,
            min_width: 200,
            min_height: 200,
            include_pdfs: false,
            include_thumbnails: false,
        }
    }
}

impl Display for FilterOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FilterOptions(min_entropy={}, min_size={}x{}, pdfs={}, thumbnails={})",
            self.min_entropy,
            self.min_width,
            self.min_height,
            self.include_pdfs,
            self.include_thumbnails
        )
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FilterCounts {
    pub kept: u64,
    pub pdfs: u64,
    pub rejected: u64,
    pub thumbnails: u64,
    pub unreadable: u64,
    pub collisions: u64,
}

impl Display for FilterCounts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "kept={} pdfs={} rejected={} thumbnails={} unreadable={} collisions={}",
            self.kept, self.pdfs, self.rejected, self.thumbnails, self.unreadable, self.collisions
        )
    }
}

/// Nested composite paths become a single flat file name.
pub fn flatten_name(name: &str) -> String {
    name.replace('/', "_")
}

/// Entropy in bits of the histogram of every channel value. Each channel has
/// its own 256 bins, so an RGB image can reach `log2(768)`.
pub fn entropy(image: &DynamicImage) -> f64 {
    let (channels, raw): (usize, Cow<'_, [u8]>) = match image {
        DynamicImage::ImageLuma8(i) => (1, Cow::Borrowed(i.as_raw())),
        DynamicImage::ImageLumaA8(i) => (2, Cow::Borrowed(i.as_raw())),
        DynamicImage::ImageRgb8(i) => (3, Cow::Borrowed(i.as_raw())),
        DynamicImage::ImageRgba8(i) => (4, Cow::Borrowed(i.as_raw())),
        other if other.color().has_alpha() => (4, Cow::Owned(other.to_rgba8().into_raw())),
        other => (3, Cow::Owned(other.to_rgb8().into_raw())),
    };
    if raw.is_empty() {
        return 0.0;
    }
    let mut histogram = vec![0u64; channels * 256];
    for (i, value) in raw.iter().enumerate() {
        histogram[(i % channels) * 256 + *value as usize] += 1;
    }
    let total = raw.len() as f64;
    histogram
        .into_iter()
        .filter(|count| *count > 0)
        .map(|count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Verdict {
    Keep,
    Pdf,
    Reject,
    Unreadable,
}

/// Copies the entries of `input` that pass `options` into `output`.
pub struct ImageFilter<W: Write + Seek> {
    options: FilterOptions,
    writer: ZipWriter<W>,
    names: HashSet<String>,
}

impl<W: Write + Seek> ImageFilter<W> {
    pub fn new(output: W, options: FilterOptions) -> Self {
        Self {
            options,
            writer: ZipWriter::new(output),
            names: HashSet::default(),
        }
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn judge(&self, name: &str, data: &[u8]) -> Verdict {
        if name.ends_with("pdf") {
            return match self.options.include_pdfs {
                true => Verdict::Pdf,
                false => Verdict::Reject,
            };
        }
        let image = match image::load_from_memory(data) {
            Ok(image) => image,
            Err(e) => {
                info!(name, error = %e, "couldn't read image file");
                return Verdict::Unreadable;
            }
        };
        let entropy = entropy(&image);
        let (width, height) = (image.width(), image.height());
        debug!(name, entropy, width, height, "measured");
        if entropy >= self.options.min_entropy
            && width >= self.options.min_width
            && height >= self.options.min_height
        {
            Verdict::Keep
        } else {
            Verdict::Reject
        }
    }

    /// Filters every entry of `input`, in archive order.
    pub fn filter<R: Read + Seek>(&mut self, input: R) -> Result<FilterCounts, FilterError> {
        let mut archive = ZipArchive::new(input)?;
        let mut counts = FilterCounts::default();
        for index in 0..archive.len() {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(index, error = %e, "failed to open entry");
                    counts.unreadable += 1;
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if name.contains("thumb") && !self.options.include_thumbnails {
                debug!(name, "skipping thumbnail");
                counts.thumbnails += 1;
                continue;
            }
            let mut data = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
            if let Err(e) = entry.read_to_end(&mut data) {
                warn!(name, error = %e, "failed to read entry");
                counts.unreadable += 1;
                continue;
            }
            drop(entry);

            match self.judge(&name, &data) {
                Verdict::Reject => counts.rejected += 1,
                Verdict::Unreadable => counts.unreadable += 1,
                verdict => {
                    if !self.write(&name, &data)? {
                        counts.collisions += 1;
                    } else if verdict == Verdict::Pdf {
                        counts.pdfs += 1;
                    } else {
                        counts.kept += 1;
                    }
                }
            }
        }
        Ok(counts)
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<bool, FilterError> {
        let flat = flatten_name(name);
        if !self.names.insert(flat.clone()) {
            warn!(name, flat, "flattened name already written, skipping");
            return Ok(false);
        }
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(data.len() as u64 >= u32::MAX as u64);
        self.writer.start_file(flat.as_str(), options)?;
        self.writer.write_all(data)?;
        Ok(true)
    }

    pub fn finish(self) -> Result<W, FilterError> {
        Ok(self.writer.finish()?)
    }
}
