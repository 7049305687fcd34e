// Integration tests for Surveyor

use std::fs;
use std::path::{Path, PathBuf};
use surveyor::{
    AnalysisResult, Analyzer, BoundaryKind, ComponentRef, Config, HttpMethod, NodeRef,
    RelationshipKind,
};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

const ORDER_VIEWS: &str = r#"
from flask import Blueprint, jsonify
from flask_login import login_required

orders_bp = Blueprint("orders", __name__, url_prefix="/orders")

@orders_bp.route("/", methods=["GET", "POST"])
def list_orders():
    return jsonify([])

@orders_bp.route("/<int:order_id>")
@login_required
def show_order(order_id):
    return jsonify({})

@orders_bp.delete("/<int:order_id>")
@roles_required("admin")
def delete_order(order_id):
    return "", 204
"#;

const ORDER_SERVICE: &str = r#"
import requests


def place_order(order):
    order.save()
    requests.post("https://api.stripe.com/v1/charges", json={"amount": order.total})
    return order
"#;

const ORDER_MODELS: &str = r#"
from app import db


class Order(db.Model):
    id = db.Column(db.Integer, primary_key=True)
    total = db.Column(db.Numeric, nullable=False)
    email = db.Column(db.String(120), unique=True)
"#;

const TEST_FIXTURE: &str = r#"
import stripe
import requests


@app.route("/test-only")
@roles_required("auditor")
def fake():
    requests.get("https://evil.example.com/leak")
"#;

/// A small Flask shop with one test file that must be ignored
fn flask_shop() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "requirements.txt", "Flask==3.0.2\nrequests==2.31.0\n");
    write(
        root,
        "app.py",
        "from flask import Flask\n\napp = Flask(__name__)\n\n\n@app.route(\"/health\")\ndef health():\n    return \"ok\"\n",
    );
    write(root, "orders/views.py", ORDER_VIEWS);
    write(root, "orders/service.py", ORDER_SERVICE);
    write(root, "orders/models.py", ORDER_MODELS);
    write(root, "tests/test_orders.py", TEST_FIXTURE);
    dir
}

fn uncached(config: Config) -> Config {
    let mut config = config;
    config.cache.enabled = false;
    config
}

fn sequential() -> Config {
    uncached(Config::default().with_parallel(false))
}

fn parallel() -> Config {
    let mut config = uncached(Config::default().with_parallel(true));
    config.parallel.threshold = 0;
    config.parallel.workers = Some(4);
    config
}

fn analyze(root: &Path, config: Config) -> AnalysisResult {
    Analyzer::new(config).expect("Failed to create analyzer").analyze(root)
}

/// Entity content of a result, without run statistics
fn entities(result: &AnalysisResult) -> String {
    serde_json::to_string(&(
        &result.tech_stack.framework_id,
        &result.endpoints,
        &result.models,
        &result.services,
        &result.actors,
        &result.boundaries,
        &result.relationships,
        &result.use_cases,
    ))
    .unwrap()
}

// ============================================================================
// Pipeline
// ============================================================================

#[test]
fn test_analyze_flask_shop() {
    let repo = flask_shop();
    let result = analyze(repo.path(), sequential());

    assert_eq!(result.tech_stack.framework_id, "flask");
    assert_eq!(result.tech_stack.version.as_deref(), Some("3.0.2"));
    assert!(result.report.errors.is_empty(), "{:?}", result.report.errors);

    let keys: Vec<String> = result.endpoints.iter().map(|e| e.key().to_string()).collect();
    assert_eq!(
        keys,
        vec![
            "GET /health",
            "GET /orders",
            "POST /orders",
            "GET /orders/{order_id}",
            "DELETE /orders/{order_id}",
        ]
    );

    assert_eq!(result.models.len(), 1);
    assert_eq!(result.models[0].name, "Order");
    assert_eq!(result.services.len(), 1);
    assert_eq!(result.services[0].name, "OrderService");

    let actors: Vec<&str> = result.actors.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(actors, vec!["Admin", "Authenticated User", "Public User"]);

    let boundaries: Vec<(&str, BoundaryKind)> =
        result.boundaries.iter().map(|b| (b.name.as_str(), b.kind)).collect();
    assert_eq!(
        boundaries,
        vec![
            ("Application", BoundaryKind::Internal),
            ("Order", BoundaryKind::Internal),
            ("Data Store", BoundaryKind::Data),
            ("api.stripe.com", BoundaryKind::External),
        ]
    );

    let order = NodeRef::Boundary("Order".to_string());
    assert!(result.relationships.iter().any(|r| r.from == order
        && r.to == NodeRef::Boundary("api.stripe.com".to_string())
        && r.kind == RelationshipKind::Calls));
    assert!(result.relationships.iter().any(|r| r.from == order
        && r.to == NodeRef::Boundary("Data Store".to_string())
        && r.kind == RelationshipKind::Persists));

    let ids: Vec<&str> = result.use_cases.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["UC-001", "UC-002", "UC-003", "UC-004", "UC-005"]);
    assert_eq!(result.use_cases[0].boundary, "Application");

    assert_eq!(result.summary.endpoints, 5);
    assert_eq!(result.summary.use_cases, 5);
    assert_eq!(result.summary.relationships, result.relationships.len());
}

#[test]
fn test_result_is_plain_data() {
    let repo = flask_shop();
    let result = analyze(repo.path(), sequential());

    let json = serde_json::to_string(&result).unwrap();
    let back: AnalysisResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, result);
}

// ============================================================================
// Testable properties
// ============================================================================

#[test]
fn test_parallel_matches_sequential() {
    let repo = flask_shop();
    let sequential = analyze(repo.path(), sequential());
    let parallel = analyze(repo.path(), parallel());

    assert_eq!(entities(&sequential), entities(&parallel));
    assert_eq!(sequential.summary, parallel.summary);
}

#[test]
fn test_second_run_is_fully_cached() {
    let repo = flask_shop();
    let config = Config::default();

    let first = analyze(repo.path(), config.clone());
    assert!(first.report.cache.misses > 0);
    assert!(first.report.cache.writes > 0);

    let second = analyze(repo.path(), config);
    assert_eq!(second.report.cache.misses, 0);
    assert!(second.report.cache.hits > 0);
    assert_eq!(second.report.cache.corrupt, 0);
    assert_eq!(entities(&first), entities(&second));
}

#[test]
fn test_touch_without_edit_stays_cached() {
    let repo = flask_shop();
    let first = analyze(repo.path(), Config::default());

    // Rewrite identical content so only the mtime changes
    write(repo.path(), "orders/views.py", ORDER_VIEWS);
    let second = analyze(repo.path(), Config::default());

    assert_eq!(second.report.cache.misses, 0);
    assert_eq!(entities(&first), entities(&second));
}

#[test]
fn test_edit_invalidates_only_changed_file() {
    let repo = flask_shop();
    analyze(repo.path(), Config::default());

    write(
        repo.path(),
        "app.py",
        "@app.route(\"/health\")\ndef health():\n    return \"ok\"\n\n@app.route(\"/version\")\ndef version():\n    return \"1\"\n",
    );
    let second = analyze(repo.path(), Config::default());

    assert!(second.report.cache.misses > 0);
    assert!(second.report.cache.hits > second.report.cache.misses);
    assert!(second.endpoints.iter().any(|e| e.path == "/version"));
}

#[test]
fn test_test_files_are_excluded() {
    let repo = flask_shop();
    let result = analyze(repo.path(), sequential());
    let in_tests = |path: &Path| path.starts_with("tests");

    assert!(!result.endpoints.iter().any(|e| e.path == "/test-only"));
    assert!(!result.actors.iter().any(|a| a.name == "Auditor"));
    assert!(result
        .actors
        .iter()
        .flat_map(|a| a.provenance.iter())
        .all(|p| !in_tests(p.file.as_path())));
    assert!(result.services.iter().all(|s| !in_tests(s.location.file.as_path())));
    assert!(!result
        .boundaries
        .iter()
        .any(|b| b.name == "evil.example.com" || b.name == "Stripe"));
    assert!(!result
        .relationships
        .iter()
        .any(|r| r.to == NodeRef::Boundary("evil.example.com".to_string())));
    assert!(result
        .use_cases
        .iter()
        .flat_map(|u| u.provenance.iter())
        .all(|p| !in_tests(p.as_path())));
}

#[test]
fn test_malformed_files_are_recorded_not_fatal() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "app.py", "@app.route('/ping')\ndef ping():\n    return 'pong'\n");
    write(root, "unclosed.py", "def broken(:\n    x = (\n");
    write(root, "nul.py", b"x = 1\0\n".as_slice());
    write(root, "latin1.py", b"name = '\xe9t\xe9'\n".as_slice());
    write(root, "empty.py", b"".as_slice());

    let result = analyze(root, sequential().with_framework("flask"));

    assert!(!result.report.aborted);
    let failed: Vec<PathBuf> = result.report.errors.iter().map(|e| e.path.clone()).collect();
    assert_eq!(
        failed,
        vec![
            PathBuf::from("empty.py"),
            PathBuf::from("latin1.py"),
            PathBuf::from("nul.py"),
            PathBuf::from("unclosed.py"),
        ]
    );
    assert_eq!(result.summary.errors, 4);
    assert_eq!(result.endpoints.len(), 1);
    assert_eq!(result.endpoints[0].method, HttpMethod::Get);
    assert_eq!(result.endpoints[0].path, "/ping");
}

#[test]
fn test_references_are_never_dangling() {
    let repo = flask_shop();
    let result = analyze(repo.path(), sequential());

    let exists = |node: &NodeRef| match node {
        NodeRef::Actor(name) => result.actors.iter().any(|a| &a.name == name),
        NodeRef::Boundary(name) => result.boundaries.iter().any(|b| &b.name == name),
    };
    assert!(!result.relationships.is_empty());
    for relationship in &result.relationships {
        assert!(exists(&relationship.from), "{:?}", relationship);
        assert!(exists(&relationship.to), "{:?}", relationship);
        assert_ne!(relationship.from, relationship.to);
    }

    for boundary in &result.boundaries {
        for component in &boundary.components {
            let found = match component {
                ComponentRef::Endpoint(key) => result.endpoints.iter().any(|e| &e.key() == key),
                ComponentRef::Model(name) => result.models.iter().any(|m| &m.name == name),
                ComponentRef::Service(name) => result.services.iter().any(|s| &s.name == name),
            };
            assert!(found, "{:?} in {}", component, boundary.name);
        }
    }

    for use_case in &result.use_cases {
        assert!(result.actors.iter().any(|a| a.name == use_case.primary_actor));
        assert!(result.boundaries.iter().any(|b| b.name == use_case.boundary));
    }
}

#[test]
fn test_detection_from_manifest_only() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "requirements.txt", "django>=4.2\ncelery==5.3\n");

    let config = uncached(Config::default());
    let min_confidence = config.detection.min_confidence;
    let result = analyze(dir.path(), config);

    assert_eq!(result.tech_stack.framework_id, "django");
    assert_eq!(result.tech_stack.language, "python");
    assert!(result.tech_stack.confidence >= min_confidence);
    assert!(result.report.warnings.is_empty(), "{:?}", result.report.warnings);
}

#[test]
fn test_unknown_stack_degrades_to_generic() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "main.go",
        "package main\n\nfunc main() {\n\tr := gin.Default()\n\tr.GET(\"/ping\", handlers.Ping)\n}\n",
    );

    let result = analyze(dir.path(), uncached(Config::default()));

    assert_eq!(result.tech_stack.framework_id, "generic");
    assert_eq!(result.report.warnings.len(), 1);
    assert_eq!(result.endpoints.len(), 1);
    assert_eq!(result.endpoints[0].path, "/ping");
}

#[test]
fn test_error_ceiling_aborts_batch() {
    let dir = TempDir::new().unwrap();
    for i in 0..11 {
        write(dir.path(), &format!("bad_{:02}.py", i), "x = (\n");
    }
    for i in 0..4 {
        write(
            dir.path(),
            &format!("ok_{}.py", i),
            format!("@app.route('/ok{}')\ndef ok{}():\n    return ''\n", i, i),
        );
    }

    let mut config = sequential().with_framework("flask");
    config.parallel.max_errors = 10;
    let result = analyze(dir.path(), config);

    assert!(result.report.aborted);
    assert_eq!(result.report.errors.len(), 11);
    assert!(result.endpoints.is_empty());
    assert!(result
        .report
        .warnings
        .iter()
        .any(|w| w.contains("11 of 15 files processed")));
}

#[test]
fn test_error_ceiling_aborts_parallel_batch() {
    let dir = TempDir::new().unwrap();
    for i in 0..60 {
        write(dir.path(), &format!("bad_{:02}.py", i), "x = (\n");
    }

    let mut config = parallel().with_framework("flask");
    config.parallel.max_errors = 10;
    let result = analyze(dir.path(), config);

    assert!(result.report.aborted);
    assert!(result.report.errors.len() > 10);
    assert!(result.report.errors.len() < 60);
    assert!(result
        .report
        .warnings
        .iter()
        .any(|w| w.contains("of 60 files processed")));
}
