// src/config.rs

use anyhow::{bail, Result};
use chrono::{Datelike, Local};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// First year requested when the caller does not say otherwise.
pub const DEFAULT_MIN_YEAR: i32 = 1960;

/// Public dataset the awards are pushed to by default.
pub const DEFAULT_REPO_ID: &str = "davidheineman/nsf-awards";

/// NSF award search bulk download, one ZIP of JSON records per year.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://www.nsf.gov/awardsearch/download?DownloadFileName={year}&All=true&isJson=true";

pub const DEFAULT_PARQUET_NAME: &str = "nsf.parquet";
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

/// Name of the staging directory under the root.
pub const DATA_DIR_NAME: &str = "data";

const PLAUSIBLE_YEARS: RangeInclusive<i32> = 1900..=2100;

pub fn current_year() -> i32 {
    Local::now().year()
}

/// `root/data`, parent of every year bucket.
pub fn data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR_NAME)
}

/// Inclusive range of calendar years. `min > max` is an empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    /// Resolve an optional upper bound to the current year and reject
    /// bounds that cannot be calendar years.
    pub fn resolve(min: i32, max: Option<i32>) -> Result<Self> {
        let max = max.unwrap_or_else(current_year);
        for year in [min, max] {
            if !PLAUSIBLE_YEARS.contains(&year) {
                bail!(
                    "year {} is outside the supported range {}..={}",
                    year,
                    PLAUSIBLE_YEARS.start(),
                    PLAUSIBLE_YEARS.end()
                );
            }
        }
        Ok(Self { min, max })
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.min..=self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.max.abs_diff(self.min) as usize + 1
        }
    }
}

/// Everything one run of the pipeline needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of the staging tree; archives land in `root/data/<year>/`.
    pub root: PathBuf,
    /// Where the aggregate Parquet file is written and later read back from.
    pub output: PathBuf,
    pub years: YearRange,
    /// Hub dataset id, `namespace/name`.
    pub repo_id: String,
    /// Archive URL with a `{year}` placeholder.
    pub url_template: String,
    pub preview_rows: usize,
    /// Treat an archive that downloads fine but fails to unpack like a failed download.
    pub skip_corrupt_archives: bool,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>, years: YearRange) -> Self {
        let root = root.into();
        Self {
            output: root.join(DEFAULT_PARQUET_NAME),
            root,
            years,
            repo_id: DEFAULT_REPO_ID.to_string(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            skip_corrupt_archives: false,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        data_dir(&self.root)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(
            ".",
            YearRange {
                min: DEFAULT_MIN_YEAR,
                max: current_year(),
            },
        )
    }
}
