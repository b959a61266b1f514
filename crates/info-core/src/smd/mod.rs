//! SMD-mediated commands: `sindex-create`/`-delete`, `roster-set`,
//! `truncate` all follow the same snapshot-classify-apply shape against an
//! external metadata-distribution service, rather than mutating local
//! state directly.
//!
//! Each command looks up current state, classifies the request against it
//! (already-exists is success, not error; conflicting definition is an
//! error), then hands the effective change to the metadata layer, which
//! itself decides idempotently whether to apply it.

pub mod roster;
pub mod sindex;
pub mod truncate;

use crate::error::Result;
use std::time::Duration;

/// What the command does after classifying the request against current
/// state. `Idempotent` covers the "already in the requested state" case,
/// reported as success without touching the metadata layer at all.
/// `MaxCount` is the per-namespace definition cap (sindex-create only).
pub enum Classification<T> {
    Apply(T),
    Idempotent,
    Conflict(String),
    MaxCount,
}

/// Abstraction over the external secondary-metadata-distribution service
/// that actually durably persists and propagates sindex/roster/truncate
/// state across the cluster. The info plane only classifies requests and
/// forwards the resulting write; it never owns SMD storage itself.
pub trait SmdClient: Send + Sync {
    /// Invokes `visitor` once per currently known `(key, value)` pair in
    /// `module`, in whatever order the metadata layer holds them.
    fn get_all(&self, module: &str, visitor: &mut dyn FnMut(&str, &str)) -> Result<()>;

    /// Durably sets `key` to `value` within `module`, blocking until the
    /// local copy (not necessarily the whole cluster) has accepted it or
    /// `timeout` elapses.
    fn blocking_set(&self, module: &str, key: &str, value: &str, timeout: Duration) -> Result<()>;

    /// Durably removes `key` from `module`.
    fn blocking_delete(&self, module: &str, key: &str, timeout: Duration) -> Result<()>;
}

pub const DEFAULT_SMD_TIMEOUT: Duration = Duration::from_secs(5);

/// Zero is the caller-specified-timeout convention's "unbounded" sentinel
/// (spec.md §5). `sindex-create`'s final `blocking_set` uses this rather
/// than `DEFAULT_SMD_TIMEOUT`: the index build it durably records must not
/// be abandoned by a client-side timeout partway through.
pub const UNBOUNDED_SMD_TIMEOUT: Duration = Duration::from_secs(0);
