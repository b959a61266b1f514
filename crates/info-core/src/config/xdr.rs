//! `context=xdr` keys: cross-datacenter replication shipping knobs.

use super::ConfigKey;
use crate::buf::DynBuf;
use crate::error::{Error, ErrorKind, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct XdrConfig {
    pub enabled: AtomicBool,
    pub max_recs_inflight: AtomicU32,
    pub forward_xdr_writes: AtomicBool,
}

impl Default for XdrConfig {
    fn default() -> Self {
        XdrConfig {
            enabled: AtomicBool::new(false),
            max_recs_inflight: AtomicU32::new(100),
            forward_xdr_writes: AtomicBool::new(false),
        }
    }
}

fn parse_bool(value: &str, name: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::new(ErrorKind::BadParam, format!("'{}' must be true or false", name))),
    }
}

struct Enabled;
impl ConfigKey<XdrConfig> for Enabled {
    fn name(&self) -> &'static str {
        "enabled"
    }
    fn enterprise_only(&self) -> bool {
        true
    }
    fn validate(&self, _state: &XdrConfig, value: &str) -> Result<()> {
        parse_bool(value, self.name()).map(|_| ())
    }
    fn apply(&self, state: &XdrConfig, value: &str) {
        state.enabled.store(value == "true", Ordering::Relaxed);
    }
    fn describe(&self, state: &XdrConfig, out: &mut DynBuf) {
        out.append_bool(state.enabled.load(Ordering::Relaxed));
    }
}

struct MaxRecsInflight;
impl ConfigKey<XdrConfig> for MaxRecsInflight {
    fn name(&self) -> &'static str {
        "max-recs-inflight"
    }
    fn enterprise_only(&self) -> bool {
        true
    }
    fn validate(&self, _state: &XdrConfig, value: &str) -> Result<()> {
        let v: u32 = value
            .parse()
            .map_err(|_| Error::new(ErrorKind::BadParam, "'max-recs-inflight' must be an integer"))?;
        if v == 0 {
            return Err(Error::new(ErrorKind::BadParam, "'max-recs-inflight' must be positive"));
        }
        Ok(())
    }
    fn apply(&self, state: &XdrConfig, value: &str) {
        state.max_recs_inflight.store(value.parse().expect("validated"), Ordering::Relaxed);
    }
    fn describe(&self, state: &XdrConfig, out: &mut DynBuf) {
        out.append_u64(state.max_recs_inflight.load(Ordering::Relaxed) as u64);
    }
}

struct ForwardXdrWrites;
impl ConfigKey<XdrConfig> for ForwardXdrWrites {
    fn name(&self) -> &'static str {
        "forward-xdr-writes"
    }
    fn enterprise_only(&self) -> bool {
        true
    }
    fn validate(&self, _state: &XdrConfig, value: &str) -> Result<()> {
        parse_bool(value, self.name()).map(|_| ())
    }
    fn apply(&self, state: &XdrConfig, value: &str) {
        state.forward_xdr_writes.store(value == "true", Ordering::Relaxed);
    }
    fn describe(&self, state: &XdrConfig, out: &mut DynBuf) {
        out.append_bool(state.forward_xdr_writes.load(Ordering::Relaxed));
    }
}

pub(super) fn keys() -> Vec<Box<dyn ConfigKey<XdrConfig>>> {
    vec![Box::new(Enabled), Box::new(MaxRecsInflight), Box::new(ForwardXdrWrites)]
}

#[cfg(test)]
mod tests {
    use super::super::ConfigMutator;

    #[test]
    fn max_recs_inflight_rejects_zero_on_enterprise() {
        let m = ConfigMutator::new(true);
        assert!(m.set("context=xdr;max-recs-inflight=0").is_err());
    }
}
