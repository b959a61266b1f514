//! `truncate`/`truncate-undo`: records a namespace (or namespace/set)
//! truncation cutoff time through SMD, classified the same way sindex and
//! roster changes are.
//!
//! `truncate-undo` clears the cutoff, which is modeled here as a plain SMD
//! delete rather than a separate command path, since "no truncation in
//! effect" and "cutoff never set" are the same observable state.

use super::{Classification, SmdClient, DEFAULT_SMD_TIMEOUT};
use crate::error::{Error, ErrorKind, Result};
use crate::params::{self, Outcome};

fn truncate_key(namespace: &str, set: Option<&str>) -> String {
    format!("{}|{}", namespace, set.unwrap_or(""))
}

/// A later truncation request for the same namespace/set may only raise the
/// cutoff, never lower it -- rolling the cutoff backward would resurrect
/// records a client already observed as gone.
fn classify(smd: &dyn SmdClient, key: &str, new_cutoff: u64) -> Result<Classification<u64>> {
    let mut current: Option<u64> = None;
    smd.get_all("truncate", &mut |k, v| {
        if k == key {
            current = v.parse().ok();
        }
    })?;

    match current {
        Some(existing) if new_cutoff < existing => Ok(Classification::Conflict(format!(
            "truncate cutoff cannot move backward (current {}, requested {})",
            existing, new_cutoff
        ))),
        Some(existing) if existing == new_cutoff => Ok(Classification::Idempotent),
        _ => Ok(Classification::Apply(new_cutoff)),
    }
}

/// `truncate:ns=<ns>[;set=<set>][;lut=<cutoff>]`. When `lut` (last-update-time
/// cutoff) is omitted the cutoff defaults to "now" at the caller's clock,
/// passed in explicitly since this module has no wall-clock access of its
/// own.
pub fn truncate(smd: &dyn SmdClient, params: &str, now: u64) -> Result<()> {
    let namespace = match params::extract_default(params, "ns") {
        Outcome::Found(v) => v.to_string(),
        _ => return Err(Error::new(ErrorKind::BadParam, "missing 'ns'")),
    };
    let set = match params::extract_default(params, "set") {
        Outcome::Found(v) if !v.is_empty() => Some(v.to_string()),
        _ => None,
    };
    let cutoff = match params::extract_default(params, "lut") {
        Outcome::Found(v) => {
            v.parse().map_err(|_| Error::new(ErrorKind::BadParam, "'lut' must be an integer"))?
        }
        Outcome::Missing => now,
        Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'lut' too long")),
    };

    let key = truncate_key(&namespace, set.as_deref());

    match classify(smd, &key, cutoff)? {
        Classification::Apply(cutoff) => {
            smd.blocking_set("truncate", &key, &cutoff.to_string(), DEFAULT_SMD_TIMEOUT)
        }
        Classification::Idempotent => Ok(()),
        Classification::Conflict(detail) => Err(Error::new(ErrorKind::Conflict, detail)),
        // A truncation cutoff has no per-namespace count limit to exceed.
        Classification::MaxCount => unreachable!("truncate classify never returns MaxCount"),
    }
}

pub fn truncate_undo(smd: &dyn SmdClient, params: &str) -> Result<()> {
    let namespace = match params::extract_default(params, "ns") {
        Outcome::Found(v) => v.to_string(),
        _ => return Err(Error::new(ErrorKind::BadParam, "missing 'ns'")),
    };
    let set = match params::extract_default(params, "set") {
        Outcome::Found(v) if !v.is_empty() => Some(v.to_string()),
        _ => None,
    };

    let key = truncate_key(&namespace, set.as_deref());
    smd.blocking_delete("truncate", &key, DEFAULT_SMD_TIMEOUT)
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
    fn truncate_then_undo_clears_the_cutoff() {
        let smd = FakeSmd::default();
        truncate(&smd, "ns=test", 1000).unwrap();
        assert!(smd.store.borrow().contains_key("test|"));

        truncate_undo(&smd, "ns=test").unwrap();
        assert!(!smd.store.borrow().contains_key("test|"));
    }

    #[test]
    fn cutoff_cannot_move_backward() {
        let smd = FakeSmd::default();
        truncate(&smd, "ns=test;lut=1000", 0).unwrap();
        assert!(truncate(&smd, "ns=test;lut=500", 0).is_err());
    }

    #[test]
    fn re_applying_the_same_cutoff_is_idempotent() {
        let smd = FakeSmd::default();
        truncate(&smd, "ns=test;lut=1000", 0).unwrap();
        assert!(truncate(&smd, "ns=test;lut=1000", 0).is_ok());
    }
}
