//! Merge engine: combine this replica's unsynced state with the shared state.
//!
//! Strokes are append-only, identity-addressed facts, so the merge is a union
//! of local additions onto the remote set:
//! - remote strokes are kept as-is (remote is authoritative for deletions)
//! - local strokes whose id the remote lacks are appended in local order
//! - layers, canvas size and schema version come from the remote wholesale
//! - `last_modified` is the max of both sides
//!
//! Layer metadata edits made concurrently on two replicas are not reconciled:
//! the last fetched remote wins. Pushing local layer edits is the writer's job.

use crate::document::Document;

/// Produce the converged document that should become the new shared state.
pub fn merge(local: &Document, remote: &Document) -> Document {
    let remote_ids = remote.stroke_ids();

    let mut strokes = remote.strokes.clone();
    strokes.extend(
        local
            .strokes
            .iter()
            .filter(|s| !remote_ids.contains(&s.id))
            .cloned(),
    );

    Document {
        version: remote.version,
        layers: remote.layers.clone(),
        strokes,
        canvas_width: remote.canvas_width,
        canvas_height: remote.canvas_height,
        last_modified: local.last_modified.max(remote.last_modified),
    }
}

/// Whether `local` holds strokes that have not reached `remote` yet.
pub fn has_unpushed_strokes(local: &Document, remote: &Document) -> bool {
    let remote_ids = remote.stroke_ids();
    local.strokes.iter().any(|s| !remote_ids.contains(&s.id))
}
