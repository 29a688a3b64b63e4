// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::{self, YearRange};

pub mod urls;
pub mod zips;

pub use zips::Download;

/// Blocking HTTP client shared by the fetch and publish stages.
/// Requests run without a deadline; a slow archive is waited for.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(None::<Duration>)
        .build()
        .context("building HTTP client")
}

/// Where yearly archives come from.
pub struct ArchiveSource {
    client: Client,
    url_template: String,
}

impl ArchiveSource {
    pub fn new(client: Client, url_template: impl Into<String>) -> Result<Self> {
        let url_template = url_template.into();
        // fail on a bad template before the year loop starts
        urls::year_url(&url_template, config::DEFAULT_MIN_YEAR)?;
        Ok(Self {
            client,
            url_template,
        })
    }

    pub fn year_url(&self, year: i32) -> Result<Url> {
        urls::year_url(&self.url_template, year)
    }

    pub fn download(&self, year: i32) -> Result<Download> {
        let url = self.year_url(year)?;
        zips::download_archive(&self.client, &url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Log and continue when a downloaded archive cannot be unpacked,
    /// instead of aborting the run.
    pub skip_corrupt_archives: bool,
}

/// What a fetch pass did, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub attempted: usize,
    pub extracted: usize,
    pub failed: Vec<i32>,
    pub files: usize,
}

/// Download and unpack the archive of every year in `years`, ascending,
/// into `root/data/<year>/`.
///
/// A year whose request fails or comes back with a non-success status is
/// logged and skipped; its directory is still created and keeps whatever a
/// previous run left there. An archive that downloads but cannot be unpacked
/// aborts the pass unless `opts.skip_corrupt_archives` is set.
#[instrument(level = "info", skip(source, root, opts), fields(root = %root.as_ref().display()))]
pub fn fetch_all<P: AsRef<Path>>(
    source: &ArchiveSource,
    root: P,
    years: YearRange,
    opts: &FetchOptions,
) -> Result<FetchSummary> {
    let start = Instant::now();
    let data_dir = config::data_dir(root.as_ref());
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating staging directory {}", data_dir.display()))?;

    let mut summary = FetchSummary::default();
    info!(years = years.len(), "downloading NSF awards");

    for year in years.years() {
        summary.attempted += 1;

        // ─── 1) year bucket ──────────────────────────────────────────
        let year_dir = data_dir.join(year.to_string());
        fs::create_dir_all(&year_dir)
            .with_context(|| format!("creating {}", year_dir.display()))?;

        // ─── 2) download ─────────────────────────────────────────────
        let body = match source.download(year) {
            Ok(Download::Archive(body)) => body,
            Ok(Download::Unavailable(status)) => {
                warn!(year, %status, "failed to download data for year");
                summary.failed.push(year);
                continue;
            }
            Err(e) => {
                warn!(year, error = %format!("{:#}", e), "failed to download data for year");
                summary.failed.push(year);
                continue;
            }
        };

        // ─── 3) unpack ───────────────────────────────────────────────
        match zips::extract_archive(&body, &year_dir) {
            Ok(files) => {
                info!(year, files, "extracted archive");
                summary.extracted += 1;
                summary.files += files;
            }
            Err(e) if opts.skip_corrupt_archives => {
                warn!(year, error = %format!("{:#}", e), "skipping corrupt archive");
                summary.failed.push(year);
            }
            Err(e) => return Err(e.context(format!("unpacking archive for year {}", year))),
        }
    }

    info!(
        attempted = summary.attempted,
        extracted = summary.extracted,
        failed = summary.failed.len(),
        files = summary.files,
        elapsed = ?start.elapsed(),
        "fetch complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{init_test_logging, mock_runtime, zip_bytes};
    use tempfile::tempdir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn nsf_like_template(server: &MockServer) -> String {
        format!(
            "{}/awardsearch/download?DownloadFileName={{year}}&All=true&isJson=true",
            server.uri()
        )
    }

    fn mount_year(rt: &tokio::runtime::Runtime, server: &MockServer, year: i32, resp: ResponseTemplate) {
        rt.block_on(
            Mock::given(method("GET"))
                .and(path("/awardsearch/download"))
                .and(query_param("DownloadFileName", year.to_string()))
                .respond_with(resp)
                .expect(1)
                .mount(server),
        );
    }

    fn year_files(root: &Path, year: i32) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(root.join("data").join(year.to_string()))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn inverted_range_processes_no_years() -> Result<()> {
        let root = tempdir()?;
        // nothing listens here; any request would fail loudly in the summary
        let source = ArchiveSource::new(http_client()?, "http://127.0.0.1:9/{year}.zip")?;
        let years = YearRange { min: 2021, max: 2020 };

        let summary = fetch_all(&source, root.path(), years, &FetchOptions::default())?;

        assert_eq!(summary, FetchSummary::default());
        assert_eq!(fs::read_dir(root.path().join("data"))?.count(), 0);
        Ok(())
    }

    #[test]
    fn failed_year_leaves_empty_directory_and_continues() -> Result<()> {
        init_test_logging();
        let rt = mock_runtime();
        let server = rt.block_on(MockServer::start());
        mount_year(&rt, &server, 2019, ResponseTemplate::new(404));
        mount_year(
            &rt,
            &server,
            2020,
            ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[
                ("2000001.json", r#"{"AwardID":"2000001"}"#),
                ("2000002.json", r#"{"AwardID":"2000002"}"#),
            ])),
        );
        let root = tempdir()?;
        let source = ArchiveSource::new(http_client()?, nsf_like_template(&server))?;

        let summary = fetch_all(
            &source,
            root.path(),
            YearRange { min: 2019, max: 2020 },
            &FetchOptions::default(),
        )?;

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.failed, vec![2019]);
        assert_eq!(summary.files, 2);
        assert!(root.path().join("data/2019").is_dir());
        assert!(year_files(root.path(), 2019).is_empty());
        assert_eq!(year_files(root.path(), 2020), vec!["2000001.json", "2000002.json"]);
        Ok(())
    }

    #[test]
    fn unreachable_server_is_logged_per_year() -> Result<()> {
        let root = tempdir()?;
        let source = ArchiveSource::new(http_client()?, "http://127.0.0.1:9/{year}.zip")?;

        let summary = fetch_all(
            &source,
            root.path(),
            YearRange { min: 1990, max: 1992 },
            &FetchOptions::default(),
        )?;

        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.failed, vec![1990, 1991, 1992]);
        for year in 1990..=1992 {
            assert!(year_files(root.path(), year).is_empty());
        }
        Ok(())
    }

    #[test]
    fn stale_files_from_a_previous_run_are_kept() -> Result<()> {
        let rt = mock_runtime();
        let server = rt.block_on(MockServer::start());
        mount_year(&rt, &server, 2018, ResponseTemplate::new(503));
        let root = tempdir()?;
        fs::create_dir_all(root.path().join("data/2018"))?;
        fs::write(root.path().join("data/2018/old.json"), "{}")?;
        let source = ArchiveSource::new(http_client()?, nsf_like_template(&server))?;

        fetch_all(
            &source,
            root.path(),
            YearRange { min: 2018, max: 2018 },
            &FetchOptions::default(),
        )?;

        assert_eq!(year_files(root.path(), 2018), vec!["old.json"]);
        Ok(())
    }

    #[test]
    fn corrupt_archive_aborts_by_default() -> Result<()> {
        let rt = mock_runtime();
        let server = rt.block_on(MockServer::start());
        mount_year(&rt, &server, 2010, ResponseTemplate::new(200).set_body_string("not a zip"));
        let root = tempdir()?;
        let source = ArchiveSource::new(http_client()?, nsf_like_template(&server))?;

        let err = fetch_all(
            &source,
            root.path(),
            YearRange { min: 2010, max: 2010 },
            &FetchOptions::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("year 2010"));
        Ok(())
    }

    #[test]
    fn corrupt_archive_can_be_skipped() -> Result<()> {
        let rt = mock_runtime();
        let server = rt.block_on(MockServer::start());
        mount_year(&rt, &server, 2010, ResponseTemplate::new(200).set_body_string("not a zip"));
        mount_year(
            &rt,
            &server,
            2011,
            ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("1100001.json", "{}")])),
        );
        let root = tempdir()?;
        let source = ArchiveSource::new(http_client()?, nsf_like_template(&server))?;
        let opts = FetchOptions {
            skip_corrupt_archives: true,
        };

        let summary = fetch_all(&source, root.path(), YearRange { min: 2010, max: 2011 }, &opts)?;

        assert_eq!(summary.failed, vec![2010]);
        assert_eq!(summary.extracted, 1);
        assert_eq!(year_files(root.path(), 2011), vec!["1100001.json"]);
        Ok(())
    }

    #[test]
    fn bad_template_is_rejected_up_front() {
        assert!(ArchiveSource::new(reqwest::blocking::Client::new(), "https://www.nsf.gov/").is_err());
    }
}
