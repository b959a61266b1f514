//! `context=namespace;id=<ns>` keys. Grounded in `thr_info.c`'s
//! namespace config-set branch, which validates `memory-size` against the
//! namespace's current index footprint and gates `default-ttl` on whether
//! the reaper is enabled.

use super::ConfigKey;
use crate::buf::DynBuf;
use crate::error::{Error, ErrorKind, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Live per-namespace configuration, looked up by name from
/// `ConfigMutator::namespaces`.
pub struct NamespaceConfig {
    pub memory_size: AtomicU64,
    pub default_ttl: AtomicU32,
    pub enable_xdr: AtomicBool,
    pub reject_non_xdr_writes: AtomicBool,
    pub stop_writes_pct: AtomicU32,
    /// Set by `quiesce`, cleared by `quiesce-undo`, on every namespace at
    /// once (spec.md §8 scenario 4) -- tells the partition rebalancer this
    /// node should be treated as voluntarily leaving write eligibility
    /// ahead of a planned shutdown, without actually stopping.
    pub pending_quiesce: AtomicBool,
}

impl NamespaceConfig {
    pub fn new(memory_size: u64) -> NamespaceConfig {
        NamespaceConfig {
            memory_size: AtomicU64::new(memory_size),
            default_ttl: AtomicU32::new(0),
            enable_xdr: AtomicBool::new(false),
            reject_non_xdr_writes: AtomicBool::new(false),
            stop_writes_pct: AtomicU32::new(90),
            pending_quiesce: AtomicBool::new(false),
        }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        NamespaceConfig::new(1024 * 1024 * 1024)
    }
}

fn parse_bool(value: &str, name: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::new(ErrorKind::BadParam, format!("'{}' must be true or false", name))),
    }
}

/// `memory-size` may only ever be raised, or lowered to no less than half
/// its current value in one step -- shrinking further risks dropping the
/// namespace's resident index before a rebalance can react.
struct MemorySize;
impl ConfigKey<NamespaceConfig> for MemorySize {
    fn name(&self) -> &'static str {
        "memory-size"
    }
    fn validate(&self, state: &NamespaceConfig, value: &str) -> Result<()> {
        let v: u64 = value
            .parse()
            .map_err(|_| Error::new(ErrorKind::BadParam, "'memory-size' must be an integer"))?;
        let current = state.memory_size.load(Ordering::Relaxed);
        if v < current / 2 {
            return Err(Error::new(
                ErrorKind::BadParam,
                format!("'memory-size' cannot drop below half its current value ({})", current),
            ));
        }
        Ok(())
    }
    fn apply(&self, state: &NamespaceConfig, value: &str) {
        state.memory_size.store(value.parse().expect("validated"), Ordering::Relaxed);
    }
    fn describe(&self, state: &NamespaceConfig, out: &mut DynBuf) {
        out.append_u64(state.memory_size.load(Ordering::Relaxed));
    }
}

/// `default-ttl` of zero (never expire) is only legal when XDR shipping is
/// disabled for the namespace -- a non-expiring record can't be reconciled
/// against a remote cluster that does expire it.
struct DefaultTtl;
impl ConfigKey<NamespaceConfig> for DefaultTtl {
    fn name(&self) -> &'static str {
        "default-ttl"
    }
    fn validate(&self, state: &NamespaceConfig, value: &str) -> Result<()> {
        let v: u32 = value
            .parse()
            .map_err(|_| Error::new(ErrorKind::BadParam, "'default-ttl' must be an integer"))?;
        if v == 0 && state.enable_xdr.load(Ordering::Relaxed) {
            return Err(Error::new(
                ErrorKind::Conflict,
                "'default-ttl' cannot be zero while 'enable-xdr' is true",
            ));
        }
        Ok(())
    }
    fn apply(&self, state: &NamespaceConfig, value: &str) {
        state.default_ttl.store(value.parse().expect("validated"), Ordering::Relaxed);
    }
    fn describe(&self, state: &NamespaceConfig, out: &mut DynBuf) {
        out.append_u64(state.default_ttl.load(Ordering::Relaxed) as u64);
    }
}

struct EnableXdr;
impl ConfigKey<NamespaceConfig> for EnableXdr {
    fn name(&self) -> &'static str {
        "enable-xdr"
    }
    fn validate(&self, state: &NamespaceConfig, value: &str) -> Result<()> {
        let v = parse_bool(value, self.name())?;
        if v && state.default_ttl.load(Ordering::Relaxed) == 0 {
            return Err(Error::new(
                ErrorKind::Conflict,
                "'enable-xdr' cannot be true while 'default-ttl' is zero",
            ));
        }
        Ok(())
    }
    fn apply(&self, state: &NamespaceConfig, value: &str) {
        state.enable_xdr.store(value == "true", Ordering::Relaxed);
    }
    fn describe(&self, state: &NamespaceConfig, out: &mut DynBuf) {
        out.append_bool(state.enable_xdr.load(Ordering::Relaxed));
    }
}

struct RejectNonXdrWrites;
impl ConfigKey<NamespaceConfig> for RejectNonXdrWrites {
    fn name(&self) -> &'static str {
        "reject-non-xdr-writes"
    }
    fn validate(&self, _state: &NamespaceConfig, value: &str) -> Result<()> {
        parse_bool(value, self.name()).map(|_| ())
    }
    fn apply(&self, state: &NamespaceConfig, value: &str) {
        state.reject_non_xdr_writes.store(value == "true", Ordering::Relaxed);
    }
    fn describe(&self, state: &NamespaceConfig, out: &mut DynBuf) {
        out.append_bool(state.reject_non_xdr_writes.load(Ordering::Relaxed));
    }
}

struct StopWritesPct;
impl ConfigKey<NamespaceConfig> for StopWritesPct {
    fn name(&self) -> &'static str {
        "stop-writes-pct"
    }
    fn validate(&self, _state: &NamespaceConfig, value: &str) -> Result<()> {
        let v: u32 = value
            .parse()
            .map_err(|_| Error::new(ErrorKind::BadParam, "'stop-writes-pct' must be an integer"))?;
        if v > 100 {
            return Err(Error::new(ErrorKind::BadParam, "'stop-writes-pct' must be between 0 and 100"));
        }
        Ok(())
    }
    fn apply(&self, state: &NamespaceConfig, value: &str) {
        state.stop_writes_pct.store(value.parse().expect("validated"), Ordering::Relaxed);
    }
    fn describe(&self, state: &NamespaceConfig, out: &mut DynBuf) {
        out.append_u64(state.stop_writes_pct.load(Ordering::Relaxed) as u64);
    }
}

pub(super) fn keys() -> Vec<Box<dyn ConfigKey<NamespaceConfig>>> {
    vec![
        Box::new(MemorySize),
        Box::new(DefaultTtl),
        Box::new(EnableXdr),
        Box::new(RejectNonXdrWrites),
        Box::new(StopWritesPct),
    ]
}

#[cfg(test)]
mod tests {
    use super::super::ConfigMutator;
    use super::*;

    fn mutator() -> ConfigMutator {
        let m = ConfigMutator::new(false);
        m.add_namespace("test", NamespaceConfig::new(1024 * 1024 * 1024));
        m
    }

    #[test]
    fn memory_size_can_be_raised_freely() {
        let m = mutator();
        assert!(m.set("context=namespace;id=test;memory-size=2147483648").is_ok());
    }

    #[test]
    fn memory_size_cannot_drop_below_half() {
        let m = mutator();
        assert!(m.set("context=namespace;id=test;memory-size=1").is_err());
    }

    #[test]
    fn default_ttl_zero_conflicts_with_enable_xdr() {
        let m = mutator();
        m.set("context=namespace;id=test;enable-xdr=true;default-ttl=60").unwrap();
        assert!(m.set("context=namespace;id=test;default-ttl=0").is_err());
    }

    #[test]
    fn stop_writes_pct_rejects_over_100() {
        let m = mutator();
        assert!(m.set("context=namespace;id=test;stop-writes-pct=150").is_err());
    }

    /// Drives `memory-size` through a long run of random candidate values and
    /// checks the accept/reject outcome against the half-of-current rule
    /// directly, rather than against a handful of hand-picked cases.
    #[test]
    fn memory_size_never_accepts_a_drop_past_half_under_random_load() {
        use rand::Rng;

        let m = mutator();
        let mut rng = rand::thread_rng();
        let mut current = 1024u64 * 1024 * 1024;

        for _ in 0..500 {
            let candidate: u64 = rng.gen_range(0..=current * 2);
            let should_accept = candidate >= current / 2;

            let result = m.set(&format!("context=namespace;id=test;memory-size={}", candidate));
            assert_eq!(result.is_ok(), should_accept, "candidate={} current={}", candidate, current);

            if should_accept {
                current = candidate;
            }
        }
    }
}
