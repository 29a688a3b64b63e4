// src/test_support.rs

use std::io::{Cursor, Write};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Route `tracing` output through the test harness.
pub fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Build an in-memory ZIP from `(name, contents)` pairs. Names ending in `/`
/// become directory entries.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buf));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, contents) in entries {
            if let Some(dir) = name.strip_suffix('/') {
                zip.add_directory(dir, options).expect("add directory");
            } else {
                zip.start_file(*name, options).expect("start file");
                zip.write_all(contents.as_bytes()).expect("write entry");
            }
        }
        zip.finish().expect("finish zip");
    }
    buf
}

/// Runtime that hosts `wiremock` servers while the blocking client under
/// test runs on the test thread.
pub fn mock_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("tokio runtime")
}
