//! Newline-delimited JSON export of in-memory fetch results

use crate::fetch::FetchedPayload;
use crate::state::Payload;
use crate::ColetaError;
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes one JSON document per line to `dest`
///
/// JSON payloads are written as fetched. HTML pages become
/// `{"url", "title", "html"}` objects. Parent directories are created and an
/// existing file is replaced.
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path of the written file
/// * `Err(ColetaError)` - Failed to create or write the file
pub fn save_ndjson(payloads: &[FetchedPayload], dest: &Path) -> Result<PathBuf, ColetaError> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(dest)?);
    for fetched in payloads {
        serde_json::to_writer(&mut writer, &to_document(fetched))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} record(s) to {}", payloads.len(), dest.display());
    Ok(dest.to_path_buf())
}

fn to_document(fetched: &FetchedPayload) -> Value {
    match &fetched.payload {
        Payload::Json(value) => value.clone(),
        Payload::Html(page) => json!({
            "url": fetched.url,
            "title": page.title,
            "html": page.html,
        }),
    }
}
