//! Persistent peer identity.
//!
//! The id is a random UUID v4 kept in one file with mode 0600. It doubles as
//! the peer's credential for `delist`/`heartbeat`/`disconnect`, so it is never
//! logged in full.

use std::fs;
use std::path::Path;

use uuid::Uuid;

use catalog_core::PeerId;

use crate::error::{io_err, PeerError};

/// Read the identity at `path`, generating and saving one if the file is
/// missing or blank.
pub fn load_or_create(path: &Path) -> Result<PeerId, PeerError> {
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => {
            return Ok(PeerId(contents.trim().to_string()));
        }
        Ok(_) => tracing::warn!(path = %path.display(), "peer identity file is empty; regenerating"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(path, err)),
    }

    let id = PeerId(Uuid::new_v4().to_string());
    save(path, &id)?;
    tracing::info!(peer = id.short(), path = %path.display(), "generated peer identity");
    Ok(id)
}

fn save(path: &Path, id: &PeerId) -> Result<(), PeerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, format!("{id}\n")).map_err(|e| io_err(&tmp, e))?;
    restrict_permissions(&tmp)?;
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), PeerError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), PeerError> {
    Ok(())
}
