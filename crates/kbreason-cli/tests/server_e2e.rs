#![cfg(unix)]

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use url::form_urlencoded;

const FIXTURE_KIF: &str = r#"
(subclass Dog Animal)
(instance Fido Dog)
(documentation Object EnglishLanguage "The top class.")
"#;

/// Stands in for Vampire: answers every problem with two derivations, except
/// problems mentioning `slowQuery`, which take longer than any test budget.
const FAKE_PROVER: &str = r#"#!/bin/sh
for last; do :; done
if grep -q 's__slowQuery' "$last"; then
  sleep 3
fi
cat <<'OUT'
% SZS status Theorem for kbreason_query
% SZS answers Tuple [[s__Animal],[s__Plant]|_] for kbreason_query
% SZS output start Proof for kbreason_query
fof(f1,axiom,(
  s__subclass(s__Animal,s__Object)),
  file('problem.tptp',kb_SUMO_1)).
fof(f2,axiom,(
  s__subclass(s__Plant,s__Object)),
  file('problem.tptp',kb_SUMO_2)).
% SZS output end Proof for kbreason_query
OUT
"#;

fn kbreason_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_kbreason"))
}

struct ChildGuard {
    child: Child,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn http_get(addr: &str, path_and_query: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .ok();
    stream
        .set_write_timeout(Some(Duration::from_secs(5)))
        .ok();

    let request =
        format!("GET {path_and_query} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).expect("write request");
    stream.flush().ok();

    let mut response_bytes = Vec::new();
    stream
        .read_to_end(&mut response_bytes)
        .expect("read response");
    let response = String::from_utf8_lossy(&response_bytes);

    let status = response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);
    let (_, body) = response
        .split_once("\r\n\r\n")
        .unwrap_or(("", response.as_ref()));
    (status, body.to_string())
}

fn http_get_json(addr: &str, path_and_query: &str) -> (u16, serde_json::Value) {
    let (status, body) = http_get(addr, path_and_query);
    let json = serde_json::from_str(&body)
        .unwrap_or_else(|e| panic!("parse JSON response from {path_and_query}: {e}: {body}"));
    (status, json)
}

fn with_params(path: &str, params: &[(&str, &str)]) -> String {
    let query: String = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{path}?{query}")
}

fn write_fake_prover(dir: &Path) -> PathBuf {
    let path = dir.join("fake_vampire.sh");
    fs::write(&path, FAKE_PROVER).expect("write fake prover");
    let mut perms = fs::metadata(&path).expect("stat fake prover").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod fake prover");
    path
}

fn start_server(dir: &Path) -> (ChildGuard, String) {
    let kif = dir.join("base.kif");
    fs::write(&kif, FIXTURE_KIF).expect("write kif fixture");
    let prover = write_fake_prover(dir);
    let work = dir.join("work");
    let ready_file = dir.join("build/ready.json");

    let child = Command::new(kbreason_bin())
        .arg("serve")
        .arg("--kif")
        .arg(&kif)
        .arg("--prover-bin")
        .arg(&prover)
        .arg("--work-dir")
        .arg(&work)
        .arg("--listen")
        .arg("127.0.0.1:0")
        .arg("--ready-file")
        .arg(&ready_file)
        .stdout(Stdio::null())
        .spawn()
        .expect("spawn kbreason serve");
    let guard = ChildGuard { child };

    let deadline = Instant::now() + Duration::from_secs(10);
    while !ready_file.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(ready_file.exists(), "server did not write ready file");

    let ready_text = fs::read_to_string(&ready_file).expect("read ready file");
    let ready_json: serde_json::Value = serde_json::from_str(&ready_text).expect("parse ready json");
    let addr = ready_json["addr"]
        .as_str()
        .expect("ready.addr is string")
        .to_string();
    (guard, addr)
}

#[test]
fn e2e_ask_returns_first_binding_and_full_proof() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_guard, addr) = start_server(dir.path());

    let (status, body) = http_get(&addr, "/healthz");
    assert_eq!(status, 200);
    assert_eq!(body.trim(), "ok");

    let (status, doc) = http_get_json(&addr, &with_params("/ask", &[("query", "(subclass ?X Object)"), ("timeout", "30")]));
    assert_eq!(status, 200, "{doc}");
    assert_eq!(doc["bindings"], serde_json::json!({"X": "Animal"}));
    let proof = doc["proof"].as_array().expect("proof array");
    assert_eq!(proof.len(), 2);
    assert!(proof[0].as_str().unwrap().contains("s__Animal"));
    assert!(proof[1].as_str().unwrap().contains("s__Plant"));
    assert!(doc["time"].as_f64().unwrap() < 30.0);
    assert!(doc.get("error").is_none());

    // Defaults: `(subclass ?X Object)` with a 30 s budget.
    let (status, doc) = http_get_json(&addr, "/ask");
    assert_eq!(status, 200, "{doc}");
    assert_eq!(doc["bindings"]["X"], "Animal");

    let leftovers = fs::read_dir(dir.path().join("work"))
        .expect("work dir")
        .filter_map(|e| e.ok())
        .count();
    assert_eq!(leftovers, 0, "problem files should be cleaned up");
}

#[test]
fn e2e_slow_prover_times_out_within_budget() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_guard, addr) = start_server(dir.path());

    let (status, body) = http_get(&addr, "/init");
    assert_eq!(status, 200);
    assert_eq!(body, "Sigma init completed");

    let started = Instant::now();
    let (status, doc) = http_get_json(&addr, &with_params("/ask", &[("query", "(slowQuery ?X)"), ("timeout", "1")]));
    assert_eq!(status, 500, "{doc}");
    assert_eq!(doc["error"], "timeout");
    assert!(doc["time"].as_f64().unwrap() >= 1.0);
    assert!(started.elapsed() < Duration::from_millis(2500), "prover was not cut off");

    let (status, doc) = http_get_json(&addr, &with_params("/ask", &[("timeout", "0")]));
    assert_eq!(status, 400, "{doc}");
    let (status, _) = http_get_json(&addr, &with_params("/ask", &[("timeout", "soon")]));
    assert_eq!(status, 400);

    let (status, doc) = http_get_json(&addr, &with_params("/ask", &[("query", "(subclass ?X")]));
    assert_eq!(status, 500);
    assert!(doc["error"].as_str().unwrap().starts_with("invalid statement"), "{doc}");
}

#[test]
fn e2e_term_tell_and_reset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_guard, addr) = start_server(dir.path());

    let (status, doc) = http_get_json(&addr, &with_params("/term", &[("term", "NonexistentThing")]));
    assert_eq!(status, 500);
    assert_eq!(doc["error"], "no such term in KB: NonexistentThing");

    let (status, doc) = http_get_json(&addr, &with_params("/term", &[("term", "Object")]));
    assert_eq!(status, 500);
    assert_eq!(doc["error"], "no results for term: Object");

    let (status, doc) = http_get_json(&addr, "/term");
    assert_eq!(status, 500, "default term is Object");
    assert_eq!(doc["error"], "no results for term: Object");

    let (status, doc) = http_get_json(&addr, &with_params("/term", &[("term", "Animal")]));
    assert_eq!(status, 200);
    assert_eq!(doc, serde_json::json!(["Dog"]));

    let (status, body) = http_get(&addr, &with_params("/tell", &[("statement", "(subclass Cat Animal)")]));
    assert_eq!(status, 200);
    assert!(body.starts_with("statement added to SUMO"), "{body}");
    let (_, body) = http_get(&addr, &with_params("/tell", &[("statement", "(subclass Cat Animal)")]));
    assert!(body.starts_with("statement already in SUMO"), "{body}");
    let (status, doc) = http_get_json(&addr, &with_params("/tell", &[("statement", "(subclass Cat")]));
    assert_eq!(status, 400, "{doc}");

    let (_, doc) = http_get_json(&addr, &with_params("/term", &[("term", "Animal")]));
    assert_eq!(doc, serde_json::json!(["Cat", "Dog"]));

    let (_, doc) = http_get_json(&addr, "/status");
    assert_eq!(doc["loaded"], true);
    assert_eq!(doc["status"]["user_statements"], 1);

    let (status, body) = http_get(&addr, "/reset");
    assert_eq!(status, 200);
    assert_eq!(body, "Sigma reset completed");
    let (_, doc) = http_get_json(&addr, &with_params("/term", &[("term", "Animal")]));
    assert_eq!(doc, serde_json::json!(["Dog"]));

    let (status, doc) = http_get_json(&addr, "/nope");
    assert_eq!(status, 404);
    assert_eq!(doc["error"], "not found");
}
