//! `roster`/`roster-set`: the observed and desired node roster for a
//! namespace, mediated through SMD the same way sindex definitions are.
//!
//! Follows the same classify-then-apply shape as the sindex handlers;
//! roster membership has no "conflicting definition" case, only
//! idempotent re-application of the same set.

use super::{Classification, SmdClient, DEFAULT_SMD_TIMEOUT};
use crate::error::{Error, ErrorKind, Result};
use crate::params::{self, Outcome};

/// Parses a `roster-set:ns=<ns>;roster=<id1,id2,...>` request into a
/// namespace and an ordered list of node IDs. Order is preserved because
/// roster membership order can matter for deterministic partition
/// assignment downstream.
pub fn parse_roster_set(params: &str) -> Result<(String, Vec<String>)> {
    let namespace = match params::extract_default(params, "ns") {
        Outcome::Found(v) => v.to_string(),
        _ => return Err(Error::new(ErrorKind::BadParam, "missing 'ns'")),
    };

    let roster = match params::extract_default(params, "roster") {
        Outcome::Found(v) => v,
        _ => return Err(Error::new(ErrorKind::BadParam, "missing 'roster'")),
    };

    let nodes: Vec<String> = roster.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect();
    if nodes.is_empty() {
        return Err(Error::new(ErrorKind::BadParam, "'roster' must name at least one node"));
    }

    Ok((namespace, nodes))
}

fn classify(smd: &dyn SmdClient, namespace: &str, nodes: &[String]) -> Result<Classification<String>> {
    let want = nodes.join(",");
    let mut current: Option<String> = None;

    smd.get_all("roster", &mut |k, v| {
        if k == namespace {
            current = Some(v.to_string());
        }
    })?;

    match current {
        Some(existing) if existing == want => Ok(Classification::Idempotent),
        _ => Ok(Classification::Apply(want)),
    }
}

pub fn set(smd: &dyn SmdClient, params: &str) -> Result<()> {
    let (namespace, nodes) = parse_roster_set(params)?;

    match classify(smd, &namespace, &nodes)? {
        Classification::Apply(value) => smd.blocking_set("roster", &namespace, &value, DEFAULT_SMD_TIMEOUT),
        Classification::Idempotent => Ok(()),
        Classification::Conflict(detail) => Err(Error::new(ErrorKind::Conflict, detail)),
        // Roster membership has no per-namespace count limit to exceed.
        Classification::MaxCount => unreachable!("roster classify never returns MaxCount"),
    }
}

/// `roster:ns=<ns>` read-back. Returns an empty vec for a namespace with no
/// roster set yet, rather than an error -- an unset roster is a valid,
/// observable state, not a failure.
pub fn get(smd: &dyn SmdClient, namespace: &str) -> Result<Vec<String>> {
    let mut found = None;
    smd.get_all("roster", &mut |k, v| {
        if k == namespace {
            found = Some(v.to_string());
        }
    })?;

    Ok(found.map(|v| v.split(',').map(str::to_string).collect()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSmd {
        store: RefCell<HashMap<String, String>>,
    }

    impl SmdClient for FakeSmd {
        fn get_all(&self, _module: &str, visitor: &mut dyn FnMut(&str, &str)) -> Result<()> {
            for (k, v) in self.store.borrow().iter() {
                visitor(k, v);
            }
            Ok(())
        }
        fn blocking_set(&self, _module: &str, key: &str, value: &str, _timeout: Duration) -> Result<()> {
            self.store.borrow_mut().insert(key.to_string(), value.to_string());
            Ok(())
        }
        fn blocking_delete(&self, _module: &str, key: &str, _timeout: Duration) -> Result<()> {
            self.store.borrow_mut().remove(key);
            Ok(())
        }
    }

    #[test]
    fn set_then_get_round_trips_node_order() {
        let smd = FakeSmd::default();
        set(&smd, "ns=test;roster=a,b,c").unwrap();
        assert_eq!(get(&smd, "test").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unset_roster_reads_back_empty() {
        let smd = FakeSmd::default();
        assert!(get(&smd, "test").unwrap().is_empty());
    }

    #[test]
    fn re_setting_the_same_roster_is_idempotent() {
        let smd = FakeSmd::default();
        set(&smd, "ns=test;roster=a,b").unwrap();
        assert!(set(&smd, "ns=test;roster=a,b").is_ok());
    }
}
