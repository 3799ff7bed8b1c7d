use bincode::{deserialize_from, serialize_into};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;

use crate::context::Session;
use crate::error::Result;

/// What goes into the session file
///
/// The host and project are stored with the session so a token issued by one
/// server is never replayed against another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub host: String,
    pub project_path: String,
    pub session: Session,
}

/// Write the session as gzip-compressed bincode
pub fn save_session(saved: &SavedSession, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, saved)?;
    writer.into_inner().map_err(|e| e.into_error())?.finish()?;
    log::debug!("saved session for '{}' to {}", saved.session.username, path.display());
    Ok(())
}

/// Read a session file back
///
/// # Returns
/// * `Ok(None)` when there is no file or the stored session has expired
///
/// # Errors
/// * `StudioError::Persist` for a corrupt file, `StudioError::Io` for other read failures
pub fn load_session(path: &Path, now: DateTime<Utc>) -> Result<Option<SavedSession>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);

    let saved: SavedSession = deserialize_from(&mut reader)?;
    if saved.session.is_expired(now) {
        log::info!("stored session for '{}' has expired", saved.session.username);
        return Ok(None);
    }
    Ok(Some(saved))
}

/// Remove the session file; a missing file is not an error
pub fn clear_session(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
