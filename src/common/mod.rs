//! Common functionality.

use byte_unit::{Byte, UnitType};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss {
        Ok(rss) => tracing::debug!(
            "RSS now: {:.2}",
            Byte::from_u64(rss).get_appropriate_unit(UnitType::Binary)
        ),
        Err(e) => tracing::debug!("could not determine RSS: {}", e),
    }
}

/// Definition of canonical chromosome names.
pub const CHROMS: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "MT",
];

/// Return the canonical name of the given chromosome, e.g., `"chr1"` becomes `"1"` and
/// `"chrM"` becomes `"MT"`.
///
/// Returns `None` if the name does not describe a canonical chromosome.
pub fn canonical_chrom(name: &str) -> Option<&'static str> {
    let stripped = name
        .strip_prefix("chr")
        .or_else(|| name.strip_prefix("CHR"))
        .unwrap_or(name);
    let upper = stripped.to_ascii_uppercase();
    let upper = if upper == "M" { "MT".to_string() } else { upper };
    CHROMS.iter().find(|chrom| **chrom == upper).copied()
}

/// Select the genome release to use.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
    Clone,
    Copy,
    Debug,
    strum::Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum GenomeRelease {
    /// GRCh37 / hg19
    #[strum(serialize = "GRCh37")]
    #[serde(rename = "GRCh37")]
    Grch37,
    /// GRCh38 / hg38
    #[strum(serialize = "GRCh38")]
    #[serde(rename = "GRCh38")]
    Grch38,
}

impl GenomeRelease {
    /// Return the other release, i.e., the target of a liftover.
    pub fn other(&self) -> Self {
        match self {
            GenomeRelease::Grch37 => GenomeRelease::Grch38,
            GenomeRelease::Grch38 => GenomeRelease::Grch37,
        }
    }
}

impl std::str::FromStr for GenomeRelease {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        if s.starts_with("grch37") || s == "hg19" {
            Ok(GenomeRelease::Grch37)
        } else if s.starts_with("grch38") || s == "hg38" {
            Ok(GenomeRelease::Grch38)
        } else {
            Err(anyhow::anyhow!("Unknown genome release: {}", s))
        }
    }
}

/// The version of `mme-matcher` package.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Return the version of the `mme-matcher` crate and `x.y.z` in tests.
pub fn worker_version() -> &'static str {
    if cfg!(test) {
        "x.y.z"
    } else {
        VERSION
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::GenomeRelease;

    #[test]
    fn trace_rss_now_smoke() {
        super::trace_rss_now();
    }

    #[rstest::rstest]
    #[case("1", Some("1"))]
    #[case("chr1", Some("1"))]
    #[case("chrX", Some("X"))]
    #[case("x", Some("X"))]
    #[case("chrM", Some("MT"))]
    #[case("MT", Some("MT"))]
    #[case("chr23", None)]
    #[case("GL000220.1", None)]
    fn canonical_chrom(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(expected, super::canonical_chrom(name));
    }

    #[rstest::rstest]
    #[case("GRCh37", GenomeRelease::Grch37)]
    #[case("GRCh37.p13", GenomeRelease::Grch37)]
    #[case("hg19", GenomeRelease::Grch37)]
    #[case("grch38", GenomeRelease::Grch38)]
    #[case("hg38", GenomeRelease::Grch38)]
    fn genome_release_from_str(
        #[case] s: &str,
        #[case] expected: GenomeRelease,
    ) -> Result<(), anyhow::Error> {
        let res: GenomeRelease = s.parse()?;

        assert_eq!(res, expected);

        Ok(())
    }

    #[test]
    fn genome_release_from_str_unknown() {
        assert!("NCBI36".parse::<GenomeRelease>().is_err());
    }

    #[rstest::rstest]
    #[case(GenomeRelease::Grch37, "GRCh37", GenomeRelease::Grch38)]
    #[case(GenomeRelease::Grch38, "GRCh38", GenomeRelease::Grch37)]
    fn genome_release_display_and_other(
        #[case] release: GenomeRelease,
        #[case] name: &str,
        #[case] other: GenomeRelease,
    ) {
        assert_eq!(name, release.to_string());
        assert_eq!(other, release.other());
    }
}
