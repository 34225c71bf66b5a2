//! Resolve the requested mailbox set into concrete mailbox names.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::Result;
use crate::session::MailboxSession;

/// Token meaning "every selectable folder on the server".
pub const WILDCARD: &str = "*";

/// Resolve the mailboxes to scan.
///
/// * `requested` contains `*`: every selectable folder, in server order,
///   without duplicates. An empty listing falls back to `defaults`.
/// * `requested` is empty: `defaults`.
/// * otherwise: `requested` unchanged and unvalidated. Nonexistent names
///   surface later as per-mailbox selection failures.
pub fn resolve(
    requested: &[String],
    defaults: &[String],
    session: &mut dyn MailboxSession,
) -> Result<Vec<String>> {
    if requested.iter().any(|m| m == WILDCARD) {
        let folders = session.list_folders()?;
        let total = folders.len();
        let mut seen = HashSet::new();
        let selectable: Vec<String> = folders
            .into_iter()
            .filter(|f| f.selectable)
            .map(|f| f.name)
            .filter(|name| seen.insert(name.clone()))
            .collect();

        if selectable.is_empty() {
            warn!("Server listed no selectable mailbox, using the default set");
            return Ok(defaults.to_vec());
        }
        info!(
            listed = total,
            selectable = selectable.len(),
            "Resolved all mailboxes"
        );
        return Ok(selectable);
    }

    if requested.is_empty() {
        return Ok(defaults.to_vec());
    }
    Ok(requested.to_vec())
}
