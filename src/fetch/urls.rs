// src/fetch/urls.rs
use anyhow::{bail, Context, Result};
use url::Url;

pub const YEAR_PLACEHOLDER: &str = "{year}";

/// Substitute `year` into the archive URL template.
pub fn year_url(template: &str, year: i32) -> Result<Url> {
    if !template.contains(YEAR_PLACEHOLDER) {
        bail!("URL template {:?} has no {} placeholder", template, YEAR_PLACEHOLDER);
    }
    let raw = template.replace(YEAR_PLACEHOLDER, &year.to_string());
    Url::parse(&raw).with_context(|| format!("parsing archive URL {}", raw))
}
