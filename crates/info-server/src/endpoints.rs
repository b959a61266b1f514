//! Bootstrap registration of every built-in Info endpoint against a fresh
//! `NodeContext`'s registry. Grounded in spec.md §4.C's endpoint table;
//! each `register_*` call here corresponds to one row of it.

use info_core::dispatch::auth;
use info_core::error::{Error, ErrorKind};
use info_core::node::NodeContext;
use info_core::smd::{roster, sindex, truncate};
use info_core::stats::{render_namespace, render_statistics};
use std::sync::Arc;

pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn register_all(ctx: &Arc<NodeContext>) {
    register_static(ctx);
    register_dynamic(ctx);
    register_trees(ctx);
    register_commands(ctx);
}

fn register_static(ctx: &Arc<NodeContext>) {
    ctx.registry.register_static("version", format!("info-server-{}", BUILD_VERSION).into_bytes(), true);
    ctx.registry.register_static("build", ctx.build.as_bytes().to_vec(), true);
    ctx.registry.register_static("edition", if ctx.config.service.downgrading.load(std::sync::atomic::Ordering::Relaxed) {
        b"downgrading".to_vec()
    } else {
        b"current".to_vec()
    }, false);
}

fn register_dynamic(ctx: &Arc<NodeContext>) {
    {
        let ctx = ctx.clone();
        ctx.registry.register_dynamic("statistics", true, move |_params, out| {
            render_statistics(&ctx.stats, &ctx.config, out);
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_dynamic("services", false, move |_params, out| {
            let names = ctx.config.namespace_names();
            out.append_str(&names.join(","));
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_dynamic("config-get", false, move |params, out| {
            let body = ctx.config.get(params)?;
            out.append_bytes(&body);
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_dynamic("cluster-stable", false, move |_params, out| {
            // Reads the cluster key before and after enumerating every
            // namespace (the "collection"); a change in between means
            // membership moved mid-request and the snapshot is torn, even
            // if every namespace individually looked migrated (spec.md §8
            // boundary behavior).
            let before = ctx.cluster_key.get();
            let _namespaces = ctx.config.namespace_names();
            let after = ctx.cluster_key.get();

            if before != after {
                return Err(Error::new(ErrorKind::Conflict, "unstable-cluster"));
            }
            out.append_u64(before);
            Ok(())
        });
    }
}

fn register_trees(ctx: &Arc<NodeContext>) {
    let ctx_ref = ctx.clone();
    ctx.registry.register_tree("namespace", move |_params, subtree, out| {
        let namespaces = ctx_ref.config.namespaces.read().expect("namespace table poisoned");
        let ns = namespaces
            .get(subtree)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("unknown namespace '{}'", subtree)))?;
        let memory_size = ns.memory_size.load(std::sync::atomic::Ordering::Relaxed);
        let pending_quiesce = ns.pending_quiesce.load(std::sync::atomic::Ordering::Relaxed);
        // Per-namespace live counters are owned by the caller's stats table
        // in a full deployment; this bootstrap renders configuration only
        // when no counter set has been wired in for the namespace.
        let stats = info_core::stats::NamespaceStats::default();
        render_namespace(memory_size, pending_quiesce, &stats, out);
        Ok(())
    });
}

fn register_commands(ctx: &Arc<NodeContext>) {
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("config-set", "config-admin", move |_name, params, out| {
            match ctx.config.set(params) {
                Ok(()) => {
                    // `info-threads` is published to `ServiceConfig` by the
                    // generic key-table apply above; the live pool only
                    // learns about it here, since a `ConfigKey<ServiceConfig>`
                    // has no handle to the `WorkerPool` (spec.md §4.H).
                    if info_core::params::pairs(params).any(|(k, _)| k == "info-threads") {
                        let target = ctx.config.service.info_threads.load(std::sync::atomic::Ordering::Relaxed);
                        ctx.pool.resize(target as usize);
                    }
                    out.append_str("ok");
                    Ok(())
                }
                Err(err) => Err(err),
            }
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("sindex-create", "sindex-admin", move |_name, params, out| {
            sindex::create(ctx.smd.as_ref(), params)?;
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("sindex-delete", "sindex-admin", move |_name, params, out| {
            sindex::delete(ctx.smd.as_ref(), params)?;
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("sindex-exists", "sindex-admin", move |_name, params, out| {
            let found = sindex::exists(ctx.smd.as_ref(), params)?;
            out.append_bool(found);
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("roster-set", "roster-admin", move |_name, params, out| {
            roster::set(ctx.smd.as_ref(), params)?;
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("truncate", "truncate-admin", move |_name, params, out| {
            let now = chrono::Utc::now().timestamp() as u64;
            truncate::truncate(ctx.smd.as_ref(), params, now)?;
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("truncate-undo", "truncate-admin", move |_name, params, out| {
            truncate::truncate_undo(ctx.smd.as_ref(), params)?;
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("tip", "service-admin", move |_name, params, out| {
            use info_core::params::{extract_default, Outcome};

            let host = match extract_default(params, "host") {
                Outcome::Found(v) if !v.is_empty() => v,
                _ => return Err(Error::new(ErrorKind::BadParam, "missing 'host'")),
            };
            let port: u16 = match extract_default(params, "port") {
                Outcome::Found(v) => v
                    .parse()
                    .ok()
                    .filter(|p| *p >= 1)
                    .ok_or_else(|| Error::new(ErrorKind::BadParam, "'port' must be an integer in 1..=65535"))?,
                _ => return Err(Error::new(ErrorKind::BadParam, "missing 'port'")),
            };
            let tls = match extract_default(params, "tls") {
                Outcome::Found("true") => true,
                Outcome::Found("false") => false,
                Outcome::Found(_) => return Err(Error::new(ErrorKind::BadParam, "'tls' must be true or false")),
                Outcome::Missing => false,
                Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'tls' too long")),
            };

            let seed = if tls { format!("{}:{}:tls", host, port) } else { format!("{}:{}", host, port) };
            ctx.tip_list.lock().expect("tip list poisoned").push(seed);
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("tip-clear", "service-admin", move |_name, _params, out| {
            ctx.tip_list.lock().expect("tip list poisoned").clear();
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("quiesce", "service-admin", move |_name, _params, out| {
            set_pending_quiesce(&ctx, true);
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("quiesce-undo", "service-admin", move |_name, _params, out| {
            set_pending_quiesce(&ctx, false);
            out.append_str("ok");
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("roster", "roster-admin", move |_name, params, out| {
            use info_core::params::{extract_default, Outcome};
            let namespace = match extract_default(params, "ns") {
                Outcome::Found(v) => v.to_string(),
                _ => return Err(Error::new(ErrorKind::BadParam, "missing 'ns'")),
            };
            let nodes = roster::get(ctx.smd.as_ref(), &namespace)?;
            out.append_str(&nodes.join(","));
            Ok(())
        });
    }
    {
        let ctx = ctx.clone();
        ctx.registry.register_command("sindex-list", "sindex-admin", move |_name, params, out| {
            use info_core::params::{extract_default, Outcome};
            let namespace = match extract_default(params, "ns") {
                Outcome::Found(v) => v.to_string(),
                _ => return Err(Error::new(ErrorKind::BadParam, "missing 'ns'")),
            };
            let lines = sindex::list(ctx.smd.as_ref(), &namespace)?;
            out.append_str(&lines.join(";"));
            Ok(())
        });
    }
}

/// Flips `pending_quiesce` on every known namespace at once, per spec.md §8
/// scenario 4 ("`quiesce:` -> `ok` and every namespace's `pending_quiesce`
/// flag is true").
fn set_pending_quiesce(ctx: &Arc<NodeContext>, value: bool) {
    let namespaces = ctx.config.namespaces.read().expect("namespace table poisoned");
    for ns in namespaces.values() {
        ns.pending_quiesce.store(value, std::sync::atomic::Ordering::Relaxed);
    }
}

pub fn root_principal() -> auth::Principal {
    auth::Principal::root()
}
