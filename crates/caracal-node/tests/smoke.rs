//! End-to-end smoke test for caracal-node.
//!
//! Registers a principal and budget policy directly against the on-disk
//! stores, starts a real gateway process pointed at them, proxies a request
//! through to a throwaway upstream, and asserts the ledger, budget and
//! replay-defense behavior the pipeline promises.
//!
//! Run with:
//!   cargo test -p caracal-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use caracal_core::Money;
use caracal_identity::PrincipalRegistry;
use caracal_mandate::MandateManager;
use caracal_policy::{PolicyStore, TimeWindow, WindowType};
use rust_decimal_macros::dec;

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn wait_for_health(client: &reqwest::Client, base_url: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.get(format!("{base_url}/health")).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

/// A trivial upstream that echoes back a fixed cost header, standing in for
/// a real metered API the gateway would otherwise proxy to.
async fn spawn_upstream() -> (u16, tokio::task::JoinHandle<()>) {
    let port = free_port();
    let app = Router::new().route(
        "/v1/echo",
        get(|| async { ([("x-actual-cost", "0.05")], "upstream ok") }),
    );
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (port, handle)
}

#[tokio::test]
async fn smoke_proxied_call_meters_and_enforces_budget() {
    let data_dir = std::env::temp_dir().join(format!("caracal_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let registry_path = data_dir.join("registry.json");
    let mandate_path = data_dir.join("mandates.json");
    let policy_path = data_dir.join("policies.json");
    let ledger_path = data_dir.join("ledger.jsonl");

    // ── 1. Seed a principal, an API key, a mandate and a tight daily budget ──
    let registry = std::sync::Arc::new(PrincipalRegistry::open(&registry_path).unwrap());
    let issuer = registry.register("gateway-root", "ops", None, true).unwrap();
    let caller = registry.register("agent-smoke", "team-smoke", None, false).unwrap();

    let api_key = "sk-smoke-test-key";
    let hash = caracal_crypto::hash_api_key(api_key).unwrap();
    registry.set_metadata(caller.id, "api_key_hash", Some(hash)).unwrap();

    let mandate_manager = MandateManager::open(registry.clone(), &mandate_path).unwrap();
    let (mandate, _token) = mandate_manager
        .issue(
            issuer.id,
            caller.id,
            vec!["get".to_string()],
            vec!["*".to_string()],
            Money::from_decimal(dec!(10.00)),
            "USD".to_string(),
            3600,
            1,
            None,
            None,
        )
        .unwrap();

    let policy_store = PolicyStore::open(&policy_path).unwrap();
    policy_store
        .create(
            &registry,
            caller.id,
            Money::from_decimal(dec!(1.00)),
            "USD",
            TimeWindow::Daily,
            WindowType::Rolling,
            None,
        )
        .unwrap();

    // ── 2. Start a throwaway upstream and the gateway in front of it ─────────
    let (upstream_port, _upstream_handle) = spawn_upstream().await;
    let gateway_port = free_port();
    let gateway_url = format!("http://127.0.0.1:{gateway_port}");

    let node_bin = env!("CARGO_BIN_EXE_caracal-node");
    let child = Command::new(node_bin)
        .args([
            "--listen-addr",
            &format!("127.0.0.1:{gateway_port}"),
            "--auth-mode",
            "api_key",
            "--registry-path",
            registry_path.to_str().unwrap(),
            "--policy-path",
            policy_path.to_str().unwrap(),
            "--ledger-path",
            ledger_path.to_str().unwrap(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn caracal-node");

    let _guard = NodeGuard { child, data_dir: data_dir.clone() };

    let http = reqwest::Client::new();
    assert!(
        wait_for_health(&http, &gateway_url, Duration::from_secs(10)).await,
        "caracal-node did not become ready within 10 seconds"
    );

    // ── 3. A well-formed proxied call succeeds and meters into the ledger ────
    let target_url = format!("http://127.0.0.1:{upstream_port}/v1/echo");
    let resp = http
        .get(format!("{gateway_url}/v1/echo"))
        .header("x-api-key", api_key)
        .header("x-mandate-id", mandate.id().to_string())
        .header("x-target-url", &target_url)
        .header("x-nonce", "smoke-nonce-1")
        .header("x-timestamp", chrono::Utc::now().timestamp().to_string())
        .header("x-estimated-cost", "0.05")
        .send()
        .await
        .expect("proxied request failed");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "upstream ok");

    // ── 4. Replaying the same nonce is rejected ───────────────────────────────
    let replay = http
        .get(format!("{gateway_url}/v1/echo"))
        .header("x-api-key", api_key)
        .header("x-mandate-id", mandate.id().to_string())
        .header("x-target-url", &target_url)
        .header("x-nonce", "smoke-nonce-1")
        .header("x-timestamp", chrono::Utc::now().timestamp().to_string())
        .send()
        .await
        .expect("replay request failed to send");
    assert_eq!(replay.status(), reqwest::StatusCode::FORBIDDEN);

    // ── 5. A call that would blow through the daily budget is denied ─────────
    let over_budget = http
        .get(format!("{gateway_url}/v1/echo"))
        .header("x-api-key", api_key)
        .header("x-mandate-id", mandate.id().to_string())
        .header("x-target-url", &target_url)
        .header("x-nonce", "smoke-nonce-2")
        .header("x-timestamp", chrono::Utc::now().timestamp().to_string())
        .header("x-estimated-cost", "5.00")
        .send()
        .await
        .expect("over-budget request failed to send");
    assert_eq!(over_budget.status(), reqwest::StatusCode::FORBIDDEN);

    // ── 6. A bad API key is an opaque auth failure, not a lookup error ───────
    let bad_key = http
        .get(format!("{gateway_url}/v1/echo"))
        .header("x-api-key", "sk-not-a-real-key")
        .header("x-mandate-id", mandate.id().to_string())
        .header("x-target-url", &target_url)
        .send()
        .await
        .expect("bad-key request failed to send");
    assert_eq!(bad_key.status(), reqwest::StatusCode::UNAUTHORIZED);

    // ── 7. Stats reflect at least the one allowed and the denials above ──────
    let stats: serde_json::Value = http
        .get(format!("{gateway_url}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(stats["gateway"]["total"].as_u64().unwrap() >= 4);
    assert!(stats["gateway"]["allowed"].as_u64().unwrap() >= 1);
}
