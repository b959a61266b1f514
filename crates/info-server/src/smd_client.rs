//! A local, in-process stand-in for the cluster-wide metadata distribution
//! service (spec.md §4.G's `SmdClient` collaborator). Real deployments
//! replicate this state to every node in the cluster; this node-local
//! implementation satisfies the same trait so the command modules above
//! never need to know the difference.

use info_core::error::Result;
use info_core::smd::SmdClient;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct LocalSmdClient {
    modules: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl LocalSmdClient {
    pub fn new() -> LocalSmdClient {
        LocalSmdClient::default()
    }
}

impl SmdClient for LocalSmdClient {
    fn get_all(&self, module: &str, visitor: &mut dyn FnMut(&str, &str)) -> Result<()> {
        let modules = self.modules.lock().expect("smd store poisoned");
        if let Some(entries) = modules.get(module) {
            for (k, v) in entries {
                visitor(k, v);
            }
        }
        Ok(())
    }

    fn blocking_set(&self, module: &str, key: &str, value: &str, _timeout: Duration) -> Result<()> {
        let mut modules = self.modules.lock().expect("smd store poisoned");
        modules.entry(module.to_string()).or_default().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn blocking_delete(&self, module: &str, key: &str, _timeout: Duration) -> Result<()> {
        let mut modules = self.modules.lock().expect("smd store poisoned");
        if let Some(entries) = modules.get_mut(module) {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_all_round_trips() {
        let smd = LocalSmdClient::new();
        smd.blocking_set("sindex", "k", "v", Duration::from_secs(1)).unwrap();

        let mut seen = Vec::new();
        smd.get_all("sindex", &mut |k, v| seen.push((k.to_string(), v.to_string()))).unwrap();

        assert_eq!(seen, vec![("k".to_string(), "v".to_string())]);
    }
}
