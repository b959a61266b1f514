//! The Dispatcher and worker pool (spec.md §4.H): decodes a wire frame,
//! routes its body through the Endpoint Registry, and writes back a reply
//! frame.
//!
//! Grounded in the teacher's worker-pool shape (`t51server/src/main.rs`'s
//! fixed thread pool pulling off a shared queue) generalized to the elastic
//! resize spec.md calls for, plus `as_info_parameter_get`'s reply-tuple
//! grammar (`name\tvalue\n`) for the multi-request body format.

pub mod auth;
pub mod pool;

use crate::buf::DynBuf;
use crate::error::{Error, ErrorKind};
use crate::registry::{Lookup, Registry};
use auth::Principal;
use slog::{info, warn, Logger};

/// Splits a request body into individual request lines (newline-terminated)
/// and dispatches each through the registry, writing a `name\tvalue\n` reply
/// line for each. A body with no newline-delimited lines at all (the
/// "dump all defaults" convention) is treated as the single empty request.
/// Preallocated reply buffer capacity (spec.md §4.H step 1): large enough
/// that a typical `statistics`/`namespace/<n>` reply never reallocates.
const REPLY_BUF_CAPACITY: usize = 128 * 1024;

pub fn dispatch_body(registry: &Registry, principal: &Principal, body: &str, logger: &Logger) -> Vec<u8> {
    let mut out = DynBuf::with_capacity(REPLY_BUF_CAPACITY);

    if body.is_empty() {
        emit_defaults(registry, &mut out);
        return out.into_vec();
    }

    for line in body.split('\n').filter(|l| !l.is_empty()) {
        dispatch_line(registry, principal, line, &mut out, logger);
    }

    out.into_vec()
}

fn emit_defaults(registry: &Registry, out: &mut DynBuf) {
    for (name, value) in registry.defaults() {
        out.append_str(&name);
        out.append_char(b'\t');
        match value {
            crate::registry::DefaultValue::Static(bytes) => out.append_bytes(&bytes),
            crate::registry::DefaultValue::Dynamic(produce) => {
                let mut scratch = DynBuf::new();
                if produce("", &mut scratch).is_ok() {
                    out.append_bytes(scratch.as_slice());
                }
            }
        }
        out.append_char(b'\n');
    }
}

/// Splits one request line into its bare name and its `key=value;...`
/// parameter string, separated by the first `:`.
fn split_name_params(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((name, params)) => (name, params),
        None => (line, ""),
    }
}

fn dispatch_line(
    registry: &Registry,
    principal: &Principal,
    line: &str,
    out: &mut DynBuf,
    logger: &Logger,
) {
    let (name, params) = split_name_params(line);

    out.append_str(name);
    out.append_char(b'\t');

    let result = match registry.lookup(name) {
        Some(Lookup::Static(value)) => {
            out.append_bytes(&value);
            Ok(())
        }
        Some(Lookup::Dynamic(produce)) => produce(params, out),
        Some(Lookup::Tree(produce)) => {
            let (_base, subtree) = name.split_once('/').unwrap_or((name, ""));
            produce(params, subtree, out)
        }
        None => match registry.lookup_command(name) {
            Some(Lookup::Command { produce, permission }) => {
                let outcome = if !principal.allows(permission) {
                    Err(Error::new(ErrorKind::Auth, format!("role violation for '{}'", permission)))
                } else {
                    produce(name, params, out)
                };
                info!(logger, "command dispatch";
                    "command" => name,
                    "principal" => principal.name(),
                    "permission" => permission,
                    "ok" => outcome.is_ok());
                outcome
            }
            _ => Err(Error::new(ErrorKind::NotFound, format!("unknown command '{}'", name))),
        },
        _ => unreachable!(),
    };

    if let Err(err) = result {
        warn!(logger, "info command failed"; "command" => name, "error" => %err);
        out.append_str(&wire_error(name, &err));
    }

    out.append_char(b'\n');
}

/// Four distinct wire error shapes coexist, grounded in `thr_info.c`'s
/// `INFO_FAIL_RESPONSE` macro and its permission-denial branches, plus
/// spec.md §4.D's deliberately opaque config-mutation failure: the modern
/// `ERROR:<code>:<detail>` form, the legacy `FAIL:<code>:<detail>` form
/// sindex commands still use, the UDF-admin `error=role_violation`
/// key-value form for permission denials, and the bare literal `error` that
/// `config-set` alone uses -- its wire reply carries no code or detail by
/// design, to discourage clients from parsing a config-rejection taxonomy;
/// the rejected key is still named in the warning logged just above.
fn wire_error(name: &str, err: &Error) -> String {
    if name == "config-set" {
        "error".to_string()
    } else if err.kind() == ErrorKind::Auth && name.starts_with("udf-") {
        "error=role_violation".to_string()
    } else if name.starts_with("sindex-") {
        format!("FAIL:{}:{}", err.kind().code(), err.detail())
    } else {
        err.wire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use slog::Logger;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn splits_name_and_params_on_first_colon() {
        assert_eq!(split_name_params("sindex-create:ns=test;indexname=x"), ("sindex-create", "ns=test;indexname=x"));
        assert_eq!(split_name_params("version"), ("version", ""));
    }

    #[test]
    fn dispatch_body_renders_tab_separated_replies() {
        let registry = Registry::new();
        registry.register_static("version", b"1.0.0".to_vec(), true);
        let principal = Principal::root();

        let out = dispatch_body(&registry, &principal, "version", &test_logger());
        assert_eq!(out, b"version\t1.0.0\n");
    }

    #[test]
    fn unknown_command_reports_error_wire_shape() {
        let registry = Registry::new();
        let principal = Principal::root();

        let out = dispatch_body(&registry, &principal, "bogus", &test_logger());
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("bogus\tERROR:"));
    }

    #[test]
    fn permission_denied_uses_role_violation_shape() {
        let registry = Registry::new();
        registry.register_command("udf-put", "udf-admin", |_, _, out| {
            out.append_str("ok");
            Ok(())
        });
        let principal = Principal::anonymous();

        let out = dispatch_body(&registry, &principal, "udf-put", &test_logger());
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "udf-put\terror=role_violation\n");
    }

    #[test]
    fn config_set_failure_is_the_bare_error_literal() {
        let registry = Registry::new();
        registry.register_command("config-set", "config-admin", |_, _, _| {
            Err(Error::new(ErrorKind::BadParam, "unrecognized key 'bogus'"))
        });
        let principal = Principal::root();

        let out = dispatch_body(&registry, &principal, "config-set:bogus=1", &test_logger());
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "config-set:bogus=1\terror\n");
    }

    #[test]
    fn sindex_failure_uses_fail_code_colon_detail_shape() {
        let registry = Registry::new();
        registry.register_command("sindex-delete", "sindex-admin", |_, _, _| {
            Err(Error::new(ErrorKind::Conflict, "'indexname' is not unique"))
        });
        let principal = Principal::root();

        let out = dispatch_body(&registry, &principal, "sindex-delete:ns=ns1;indexname=idx_a", &test_logger());
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("\tFAIL:22:'indexname' is not unique\n"));
    }
}
