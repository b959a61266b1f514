//! The Config Mutator (spec.md §4.D): validates and applies a
//! `context=...;key=value` parameter tuple against live configuration.
//!
//! Grounded in `thr_info.c`'s `info_command_config_set`/`info_command_config_get`
//! switch on `context` (`service` | `network` | `namespace` | `security` |
//! `xdr`), reworked per spec.md §9's redesign note: the giant `goto Error`
//! switch becomes a table of per-key `{validate, apply, describe}` handlers,
//! with early-return on failure rather than gotos.

mod namespace;
mod security;
mod service;
mod xdr;

pub use namespace::NamespaceConfig;
pub use security::SecurityConfig;
pub use service::ServiceConfig;
pub use xdr::XdrConfig;

use crate::buf::DynBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::params;
use indexmap::IndexMap;
use std::sync::{Mutex, RwLock};

/// A single recognized key within a context: how to validate a candidate
/// value against current state, how to apply it, and how to render the
/// current value back for `config-get`.
pub trait ConfigKey<S>: Send + Sync {
    fn name(&self) -> &'static str;
    /// Returns `Ok(())` if `value` may be applied; never mutates state.
    fn validate(&self, state: &S, value: &str) -> Result<()>;
    /// Applies an already-validated value. Infallible by construction: the
    /// dispatcher only calls this after `validate` succeeded.
    fn apply(&self, state: &S, value: &str);
    fn describe(&self, state: &S, out: &mut DynBuf);
    /// Keys gated to the enterprise edition refuse to mutate otherwise.
    fn enterprise_only(&self) -> bool {
        false
    }
}

pub struct KeyTable<S> {
    keys: IndexMap<&'static str, Box<dyn ConfigKey<S>>>,
}

impl<S> KeyTable<S> {
    pub fn new(keys: Vec<Box<dyn ConfigKey<S>>>) -> KeyTable<S> {
        let mut map = IndexMap::new();
        for key in keys {
            map.insert(key.name(), key);
        }
        KeyTable { keys: map }
    }

    /// Applies every recognized key present in `params` against `state`.
    /// Validates all present keys before applying any of them, so a
    /// multi-key `config-set` either fully succeeds or changes nothing.
    fn set(&self, state: &S, params: &str, enterprise: bool) -> Result<()> {
        let mut to_apply: Vec<(&dyn ConfigKey<S>, &str)> = Vec::new();

        for (key_name, value) in params::pairs(params) {
            if key_name == "context" || key_name == "id" {
                continue;
            }
            let key = self.keys.get(key_name).ok_or_else(|| {
                Error::new(ErrorKind::BadParam, format!("unrecognized key '{}'", key_name))
            })?;
            if key.enterprise_only() && !enterprise {
                return Err(Error::new(
                    ErrorKind::EnterpriseOnly,
                    format!("'{}' requires the enterprise edition", key_name),
                ));
            }
            key.validate(state, value)?;
            to_apply.push((key.as_ref(), value));
        }

        for (key, value) in to_apply {
            key.apply(state, value);
        }

        Ok(())
    }

    fn get(&self, state: &S, out: &mut DynBuf) {
        for key in self.keys.values() {
            out.append_str(key.name());
            out.append_char(b'=');
            key.describe(state, out);
            out.append_char(b';');
        }
        out.chomp(b';');
    }
}

/// The five configuration contexts `config-set`/`config-get` dispatch over.
pub enum Context {
    Service,
    Network,
    Namespace,
    Security,
    Xdr,
}

impl Context {
    fn parse(s: &str) -> Result<Context> {
        match s {
            "service" => Ok(Context::Service),
            "network" => Ok(Context::Network),
            "namespace" => Ok(Context::Namespace),
            "security" => Ok(Context::Security),
            "xdr" => Ok(Context::Xdr),
            other => Err(Error::new(ErrorKind::BadParam, format!("unknown context '{}'", other))),
        }
    }
}

/// Top-level mutator: one global lock serializes every `config-set` request
/// across all contexts (spec.md §4.D's concurrency contract), while reads
/// (`config-get`, and every other handler reading configuration) never
/// block on it.
pub struct ConfigMutator {
    write_lock: Mutex<()>,
    pub service: ServiceConfig,
    pub network: RwLock<NetworkConfig>,
    pub namespaces: RwLock<IndexMap<String, NamespaceConfig>>,
    pub security: SecurityConfig,
    pub xdr: XdrConfig,
    enterprise: bool,
    service_keys: KeyTable<ServiceConfig>,
    namespace_keys: KeyTable<NamespaceConfig>,
    security_keys: KeyTable<SecurityConfig>,
    xdr_keys: KeyTable<XdrConfig>,
}

/// Network context currently exposes no mutable keys worth modeling beyond
/// read-only identity (heartbeat mode, fabric port) -- it is read via
/// `config-get:context=network` but is not a `config-set` target in this
/// implementation. Kept as a plain struct rather than folded into
/// `ServiceConfig` because the wire context name is distinct.
#[derive(Clone)]
pub struct NetworkConfig {
    pub heartbeat_interval_ms: u64,
    pub fabric_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig { heartbeat_interval_ms: 150, fabric_port: 3001 }
    }
}

impl ConfigMutator {
    pub fn new(enterprise: bool) -> ConfigMutator {
        ConfigMutator {
            write_lock: Mutex::new(()),
            service: ServiceConfig::default(),
            network: RwLock::new(NetworkConfig::default()),
            namespaces: RwLock::new(IndexMap::new()),
            security: SecurityConfig::default(),
            xdr: XdrConfig::default(),
            enterprise,
            service_keys: KeyTable::new(service::keys()),
            namespace_keys: KeyTable::new(namespace::keys()),
            security_keys: KeyTable::new(security::keys()),
            xdr_keys: KeyTable::new(xdr::keys()),
        }
    }

    pub fn add_namespace(&self, name: impl Into<String>, config: NamespaceConfig) {
        self.namespaces.write().expect("namespace table poisoned").insert(name.into(), config);
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.read().expect("namespace table poisoned").keys().cloned().collect()
    }

    /// `config-set:context=<ctx>[;id=<ns>];key=value;...`
    pub fn set(&self, params: &str) -> Result<()> {
        let context_str = match params::extract_default(params, "context") {
            params::Outcome::Found(v) => v,
            params::Outcome::Missing => {
                return Err(Error::new(ErrorKind::BadParam, "missing 'context'"))
            }
            params::Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'context' too long")),
        };
        let context = Context::parse(context_str)?;

        let _guard = self.write_lock.lock().expect("config write lock poisoned");

        match context {
            Context::Service => self.service_keys.set(&self.service, params, self.enterprise),
            Context::Security => self.security_keys.set(&self.security, params, self.enterprise),
            Context::Xdr => self.xdr_keys.set(&self.xdr, params, self.enterprise),
            Context::Network => Err(Error::new(ErrorKind::BadParam, "network context is read-only")),
            Context::Namespace => {
                let id = match params::extract_default(params, "id") {
                    params::Outcome::Found(v) => v,
                    _ => return Err(Error::new(ErrorKind::BadParam, "missing 'id'")),
                };
                let namespaces = self.namespaces.read().expect("namespace table poisoned");
                let ns = namespaces
                    .get(id)
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("unknown namespace '{}'", id)))?;
                self.namespace_keys.set(ns, params, self.enterprise)
            }
        }
    }

    /// `config-get:context=<ctx>[;id=<ns>]`
    pub fn get(&self, params: &str) -> Result<Vec<u8>> {
        let context_str = match params::extract_default(params, "context") {
            params::Outcome::Found(v) => v,
            _ => return Err(Error::new(ErrorKind::BadParam, "missing 'context'")),
        };
        let context = Context::parse(context_str)?;
        let mut out = DynBuf::new();

        match context {
            Context::Service => self.service_keys.get(&self.service, &mut out),
            Context::Security => self.security_keys.get(&self.security, &mut out),
            Context::Xdr => self.xdr_keys.get(&self.xdr, &mut out),
            Context::Network => {
                let net = self.network.read().expect("network config poisoned");
                out.append_pair_u64("heartbeat-interval", net.heartbeat_interval_ms);
                out.append_pair_u64("fabric-port", net.fabric_port as u64);
                out.chomp(b';');
            }
            Context::Namespace => {
                let id = match params::extract_default(params, "id") {
                    params::Outcome::Found(v) => v,
                    _ => return Err(Error::new(ErrorKind::BadParam, "missing 'id'")),
                };
                let namespaces = self.namespaces.read().expect("namespace table poisoned");
                let ns = namespaces
                    .get(id)
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("unknown namespace '{}'", id)))?;
                self.namespace_keys.get(ns, &mut out);
            }
        }

        Ok(out.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutator() -> ConfigMutator {
        let m = ConfigMutator::new(false);
        m.add_namespace("test", NamespaceConfig::new(1024 * 1024 * 1024));
        m
    }

    #[test]
    fn round_trip_leaves_snapshot_byte_identical() {
        let m = mutator();
        m.set("context=service;ticker-interval=10").unwrap();

        let before = m.get("context=service").unwrap();

        // Re-applying the value read back must not change anything.
        let ticker_interval =
            String::from_utf8(before.clone()).unwrap().split(';').find(|p| p.starts_with("ticker-interval=")).unwrap().to_string();
        let (_, value) = ticker_interval.split_once('=').unwrap();
        m.set(&format!("context=service;ticker-interval={}", value)).unwrap();

        let after = m.get("context=service").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn unknown_context_is_rejected() {
        let m = mutator();
        assert!(m.set("context=bogus;foo=1").is_err());
    }

    #[test]
    fn rejected_set_leaves_value_unchanged() {
        let m = mutator();
        m.set("context=namespace;id=test;memory-size=1073741824").unwrap();

        let before = m.get("context=namespace;id=test").unwrap();
        assert!(m.set("context=namespace;id=test;memory-size=1").is_err());
        let after = m.get("context=namespace;id=test").unwrap();

        assert_eq!(before, after);
    }
}
