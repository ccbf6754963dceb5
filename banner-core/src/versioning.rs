//! Version history retention

use crate::entities::{Banner, VersionSnapshot};
use crate::identity::Version;

/// Number of past snapshots kept per banner, on top of the current state.
pub const RETENTION: Version = 3;

/// First version assigned to a new banner.
pub const INITIAL_VERSION: Version = 1;

/// Snapshot that falls out of the window once `latest_snapshot` is stored.
///
/// With `latest_snapshot = current - 1`, the retained snapshots are
/// `current - 3 ..= current - 1`.
pub fn prune_target(latest_snapshot: Version) -> Option<Version> {
    let target = latest_snapshot - RETENTION;
    (target >= INITIAL_VERSION).then_some(target)
}

/// Current state followed by retained snapshots, newest first.
pub fn version_listing(current: Banner, snapshots: Vec<VersionSnapshot>) -> Vec<Banner> {
    let mut listing: Vec<Banner> = Vec::with_capacity(snapshots.len() + 1);
    listing.push(current);
    listing.extend(snapshots.into_iter().map(VersionSnapshot::into_state));
    listing.sort_by(|a, b| b.version.cmp(&a.version));
    listing
}
