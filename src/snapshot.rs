//! Snapshot files: one JSON document per `(language, resource)` pair.
//!
//! A fetch run persists each resource's complete per-repository mapping
//! before the next resource starts, so an interrupted run keeps everything
//! already written. Writes replace the whole file; snapshots are never
//! merged with prior state.

use camino::{Utf8Path, Utf8PathBuf};
use ohno::IntoAppError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use crate::Result;

const LOG_TARGET: &str = "  snapshot";

/// Where the snapshot for one `(language, resource)` pair lives.
#[must_use]
pub fn snapshot_path(out_dir: &Utf8Path, language: &str, resource: &str) -> Utf8PathBuf {
    let language = sanitize_component(language);
    let resource = sanitize_component(resource);
    out_dir.join(format!("{language}_{resource}.json"))
}

/// Sanitize a string for use inside a file name. Replaces path traversal
/// sequences and separator characters, keeping everything else (language
/// names like "Jupyter Notebook" or "C++" stay readable).
fn sanitize_component(s: &str) -> String {
    let s = s.replace("..", "__");
    s.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

/// Serialize `data` to `path`, creating parent directories as needed.
/// Pretty JSON in debug builds for easier inspection, compact in release.
pub fn save<T>(data: &T, path: &Utf8Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{parent}'"))?;
    }

    let file = File::create(path).into_app_err_with(|| format!("unable to create snapshot file '{path}'"))?;
    let mut writer = BufWriter::new(file);

    #[cfg(debug_assertions)]
    let written = serde_json::to_writer_pretty(&mut writer, data);
    #[cfg(not(debug_assertions))]
    let written = serde_json::to_writer(&mut writer, data);

    written.into_app_err_with(|| format!("unable to write snapshot file '{path}'"))?;
    writer.flush().into_app_err_with(|| format!("unable to flush snapshot file '{path}'"))?;

    log::debug!(target: LOG_TARGET, "Wrote snapshot '{path}'");
    Ok(())
}

/// Read a snapshot back.
pub fn load<T>(path: &Utf8Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let file = File::open(path).into_app_err_with(|| format!("unable to open snapshot file '{path}'"))?;
    let reader = BufReader::new(file);
    let data = serde_json::from_reader(reader).into_app_err_with(|| format!("unable to parse snapshot file '{path}'"))?;

    log::debug!(target: LOG_TARGET, "Loaded snapshot '{path}'");
    Ok(data)
}

/// Save one resource's data under its canonical snapshot name and report
/// where it went.
pub fn write_snapshot<T>(out_dir: &Utf8Path, language: &str, resource: &str, data: &T) -> Result<Utf8PathBuf>
where
    T: Serialize,
{
    let path = snapshot_path(out_dir, language, resource);
    save(data, &path)?;
    log::info!(target: LOG_TARGET, "Snapshot for {resource} written to '{path}'");
    Ok(path)
}
