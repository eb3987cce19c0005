use std::sync::Arc;

use replica_selector::{CounterStore, InvocationHook, SelectorConfig};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const FIELDS: [&str; 4] = ["A", "B", "C", "D"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Config file location from env, fallback to built-in defaults.
    let config = match std::env::var("REPLICA_SELECTOR_CONFIG") {
        Ok(path) => SelectorConfig::from_file(path)?,
        Err(_) => SelectorConfig::default(),
    };
    let reads: usize = std::env::var("REPLICA_SELECTOR_READS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(64);

    let hook = Arc::new(InvocationHook::new(config)?);
    let store = Arc::new(CounterStore::in_memory());
    info!(
        policy = hook.policy_name(),
        hosts = ?hook.config().hosts,
        reads,
        "starting replica selection"
    );

    let mut handles = Vec::with_capacity(reads);
    for i in 0..reads {
        let hook = Arc::clone(&hook);
        let store = Arc::clone(&store);
        let field = FIELDS[i % FIELDS.len()];
        handles.push(tokio::task::spawn_blocking(move || {
            hook.invoke(&Value::Null, field, &store)
        }));
    }

    for handle in handles {
        match handle.await? {
            Ok(replica) => info!(%replica, "read served"),
            Err(e) => error!(error = %e, "read failed"),
        }
    }

    let state = store.state()?;
    for (host, load) in state.load.iter() {
        info!(
            host,
            replica = hook.config().hosts.get(host).map_or("?", String::as_str),
            load,
            cost = state.cost.get(host),
            "host counters"
        );
    }
    if !state.selected.is_empty() {
        info!(selected = ?state.selected.iter().collect::<Vec<_>>(), "active regions");
    }
    info!(invocations = hook.invocations(), "done");

    Ok(())
}
