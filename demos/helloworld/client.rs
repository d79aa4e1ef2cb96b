// SPDX-License-Identifier: AGPL-3.0-or-later

use rapidrpc::{Client, Meta, cfg::config::ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = rapidrpc::cfg::logger::init_default_logger();

    let client = Client::with_defaults(ClientConfig::default(), "echo", vec!["127.0.0.1:9090".to_string()]);

    let mut meta = Meta::new();
    meta.set("trace", "a");

    let reply = client
        .invoke(None, None, "Echo", &serde_json::json!({"x": 1}), Some(meta))
        .await
        .map_err(|e| anyhow::anyhow!("invoke failed: {e}"))?;

    println!("{reply}");
    Ok(())
}
