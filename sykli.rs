//! Sykli CI pipeline for dualserve
//!
//! Run locally: sykli run
//! Or: cargo run --bin sykli --features sykli -- --emit | sykli run -

use sykli::{Condition, Pipeline, Template};

fn main() {
    let mut p = Pipeline::new();

    // === RESOURCES ===
    let src = p.dir(".");
    let cargo_registry = p.cache("cargo-registry");
    let cargo_git = p.cache("cargo-git");
    let target_cache = p.cache("target");

    // === TEMPLATE ===
    // Common Rust container configuration
    let rust = Template::new()
        .container("rust:1.85")
        .mount_dir(&src, "/src")
        .mount_cache(&cargo_registry, "/usr/local/cargo/registry")
        .mount_cache(&cargo_git, "/usr/local/cargo/git")
        .mount_cache(&target_cache, "/src/target")
        .workdir("/src");

    // === TASKS ===

    // Test - run all tests
    let _ = p
        .task("test")
        .from(&rust)
        .run("cargo test --all-features")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    // Lint - run clippy with strict warnings
    let _ = p
        .task("lint")
        .from(&rust)
        .run("cargo clippy --all-targets --all-features -- -D warnings")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    // Format check - verify code formatting
    let _ = p
        .task("fmt")
        .from(&rust)
        .run("cargo fmt -- --check")
        .inputs(&["**/*.rs"]);

    // Build release binary (depends on test, lint, fmt)
    let _ = p
        .task("build")
        .from(&rust)
        .run("cargo build --release --bin dualserve")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"])
        .output("binary", "target/release/dualserve")
        .after(&["test", "lint", "fmt"]);

    // Smoke test: start the binary, hit the gateway, then drain on SIGTERM
    // Only run on push events (not draft PRs)
    let _ = p
        .task("smoke-test")
        .from(&rust)
        .run(
            r#"#!/bin/bash
set -e

DUALSERVE_ADDRESS=127.0.0.1:18080 RUST_LOG=info ./target/release/dualserve 2>&1 | tee /tmp/dualserve-log.txt &
sleep 2
SERVER_PID=$(pgrep -f target/release/dualserve)

# Gateway over HTTP/1.1
RESPONSE=$(curl -sf -X POST http://127.0.0.1:18080/v1/generate \
  -H 'content-type: application/json' \
  -d '{"input":"hello","parameters":{"topK":"3","topP":0.9,"doSample":true}}')
TEXTS=$(echo "$RESPONSE" | grep -o '"hello' | wc -l)
if [ "$TEXTS" != "3" ]; then
  echo "ERROR: expected 3 candidates, got: $RESPONSE"
  cat /tmp/dualserve-log.txt
  exit 1
fi

# Unknown routes answer with the error envelope
STATUS=$(curl -s -o /dev/null -w '%{http_code}' http://127.0.0.1:18080/v1/missing)
if [ "$STATUS" != "404" ]; then
  echo "ERROR: expected 404 for unknown route, got $STATUS"
  exit 1
fi

# Graceful shutdown
kill -TERM $SERVER_PID
wait $SERVER_PID || true
grep -q "shut down gracefully" /tmp/dualserve-log.txt

echo "Smoke test passed"
"#,
        )
        .input_from("build", "binary", "/src/target/release/dualserve")
        .when_cond(Condition::event("push").or(Condition::negate(Condition::branch("*"))))
        .timeout(300);

    p.emit();
}
