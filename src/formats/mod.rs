use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::trace;

mod common;
pub(crate) mod tar;
pub(crate) mod zip;

pub(crate) use common::{composite_path, peek_head, read_entry};

// Tar requires ~260 bytes to detect, gz and bz2 require a lot less
const SNIFF_SIZE: usize = 512;

/// What the walker does with a named entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    Zip,
    Tar,
    Legacy,
    Image,
    Skip,
}

/// The four configurable extension sets used for name based classification.
/// Extensions are stored lowercased with a leading dot.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExtensionSets {
    zip: Vec<String>,
    tar: Vec<String>,
    legacy: Vec<String>,
    image: Vec<String>,
}

impl Default for ExtensionSets {
    fn default() -> Self {
        Self::new(
            [".zip", ".xlsx", ".pptx"],
            [".tar", ".tgz", ".tbz2", ".tar.gz", ".tar.bz2"],
            [".ppt", ".xls"],
            [".jpg", ".jpeg", ".png"],
        )
    }
}

fn normalize_extensions(extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    extensions
        .into_iter()
        .filter_map(|ext| {
            let ext = ext.as_ref().trim().to_lowercase();
            match ext.trim_start_matches('.') {
                "" => None,
                stripped => Some(format!(".{stripped}")),
            }
        })
        .collect()
}

impl ExtensionSets {
    pub fn new(
        zip: impl IntoIterator<Item = impl AsRef<str>>,
        tar: impl IntoIterator<Item = impl AsRef<str>>,
        legacy: impl IntoIterator<Item = impl AsRef<str>>,
        image: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            zip: normalize_extensions(zip),
            tar: normalize_extensions(tar),
            legacy: normalize_extensions(legacy),
            image: normalize_extensions(image),
        }
    }

    pub fn extensions(&self, kind: EntryKind) -> &[String] {
        match kind {
            EntryKind::Zip => &self.zip,
            EntryKind::Tar => &self.tar,
            EntryKind::Legacy => &self.legacy,
            EntryKind::Image => &self.image,
            EntryKind::Skip => &[],
        }
    }

    fn iter(&self) -> impl Iterator<Item = (EntryKind, &str)> {
        [
            EntryKind::Zip,
            EntryKind::Legacy,
            EntryKind::Image,
            EntryKind::Tar,
        ]
        .into_iter()
        .flat_map(move |kind| {
            self.extensions(kind)
                .iter()
                .map(move |ext| (kind, ext.as_str()))
        })
    }

    /// Longest matching suffix wins. On equal length the earlier set in
    /// zip, legacy, image, tar order wins.
    pub fn match_name(&self, name: &str) -> Option<EntryKind> {
        let lower = name.to_lowercase();
        self.iter()
            .filter(|(_, ext)| lower.ends_with(ext))
            .fold(None, |best: Option<(EntryKind, &str)>, candidate| match best {
                Some((_, ext)) if ext.len() >= candidate.1.len() => best,
                _ => Some(candidate),
            })
            .map(|(kind, _)| kind)
    }
}

/// Classifies entries by name, with an optional content sniff for tar streams
/// that carry no conventional suffix.
#[derive(Debug, Clone, derive_new::new)]
pub struct FormatDispatcher {
    extensions: ExtensionSets,
    sniff_tar: bool,
}

impl FormatDispatcher {
    pub fn is_directory(name: &str) -> bool {
        name.is_empty() || name.ends_with('/') || name.ends_with('\\')
    }

    /// True when [`Self::classify`] would look at the head of the entry, so the
    /// caller knows to peek it first.
    pub fn wants_content(&self, name: &str) -> bool {
        self.sniff_tar && !Self::is_directory(name) && self.extensions.match_name(name).is_none()
    }

    pub fn classify(&self, name: &str, content: Option<&[u8]>) -> EntryKind {
        if Self::is_directory(name) {
            return EntryKind::Skip;
        }
        if let Some(kind) = self.extensions.match_name(name) {
            return kind;
        }
        match content {
            Some(data) if self.sniff_tar && is_tar_stream(data) => {
                trace!(name, "sniffed tar stream");
                EntryKind::Tar
            }
            _ => EntryKind::Skip,
        }
    }
}

fn read_head(mut reader: impl Read, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) | Err(_) => break,
            Ok(read) => filled += read,
        }
    }
    filled
}

/// Magic byte detection of plain, gzip and bzip2 wrapped tar streams from the
/// first bytes of an entry. A bzip2 block rarely decodes from a short head,
/// so bzip2 wrapped tars are usually only found by name.
pub fn is_tar_stream(data: &[u8]) -> bool {
    let head = &data[..data.len().min(SNIFF_SIZE)];
    if infer::archive::is_tar(head) {
        return true;
    }
    let mut buf = [0u8; SNIFF_SIZE];
    let read = if infer::archive::is_gz(head) {
        read_head(GzDecoder::new(data), &mut buf)
    } else if infer::archive::is_bz2(head) {
        read_head(BzDecoder::new(data), &mut buf)
    } else {
        return false;
    };
    infer::archive::is_tar(&buf[..read])
}
