use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign};

/// Totals gathered while walking. `images` counts every image classified,
/// whether or not the window let it through.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Counts {
    pub images: u64,
    pub written: u64,
    pub discarded: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub containers: u64,
    pub fragments: u64,
    pub errors: u64,
}

impl Display for Counts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "images={} written={} discarded={} duplicates={} skipped={} containers={} fragments={} errors={}",
            self.images,
            self.written,
            self.discarded,
            self.duplicates,
            self.skipped,
            self.containers,
            self.fragments,
            self.errors
        )
    }
}

impl Add for Counts {
    type Output = Counts;

    fn add(self, rhs: Self) -> Self::Output {
        Counts {
            images: self.images + rhs.images,
            written: self.written + rhs.written,
            discarded: self.discarded + rhs.discarded,
            duplicates: self.duplicates + rhs.duplicates,
            skipped: self.skipped + rhs.skipped,
            containers: self.containers + rhs.containers,
            fragments: self.fragments + rhs.fragments,
            errors: self.errors + rhs.errors,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
