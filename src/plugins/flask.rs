// Flask analyzer

use super::{python, FrameworkAnalyzer};
use crate::analysis::FrameworkSignature;
use crate::error::Result;
use crate::model::HttpMethod;
use crate::parser::{Role, RuleSet};
use std::path::{Path, PathBuf};

const RULES: &[(Role, &str)] = &[
    (
        Role::RouteMarker(Some(HttpMethod::Get)),
        r#"@\w+\.route\(\s*["'](?P<path>[^"']*)["'](?:[^)]*\bmethods\s*=\s*[\[(](?P<method>[^\])]*)[\])])?"#,
    ),
    (
        Role::RouteMarker(None),
        r#"@\w+\.(?P<method>get|post|put|patch|delete)\(\s*["'](?P<path>[^"']*)["']"#,
    ),
    (
        Role::FilePrefix,
        r#"\bBlueprint\([^)]*\burl_prefix\s*=\s*["'](?P<path>[^"']*)["']"#,
    ),
    (
        Role::RouteMount,
        r#"\.register_blueprint\(\s*(?P<target>[\w.]+)(?:[^)]*\burl_prefix\s*=\s*["'](?P<path>[^"']*)["'])?"#,
    ),
    (
        Role::AuthRequired,
        r"@(?:\w+\.)?(?:login_required|jwt_required|auth_required|token_required|fresh_login_required)\b",
    ),
    (Role::RoleRequirement, r"@(?P<role>admin)_required\b"),
    (Role::RoleRequirement, r"@roles_(?:required|accepted)\((?P<role>[^)]*)\)"),
];

/// Analyzer for Flask applications
pub struct FlaskAnalyzer {
    rules: RuleSet,
}

impl FlaskAnalyzer {
    /// Create a new Flask analyzer
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: python::compile(&[RULES, python::SQLALCHEMY, python::COMMON])?,
        })
    }
}

impl FrameworkAnalyzer for FlaskAnalyzer {
    fn id(&self) -> &'static str {
        "flask"
    }

    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn signature(&self) -> Option<FrameworkSignature> {
        Some(FrameworkSignature {
            id: self.id(),
            language: self.language(),
            manifests: python::MANIFESTS,
            dependency_patterns: &[
                r#"(?im)(?:^\s*|["'])flask(?:\s*\[[^\]]*\])?\s*(?:(?:==|>=|~=|=)\s*["']?\^?(?P<version>\d+(?:\.\d+)*)|[<>!"',;]|$)"#,
            ],
            layout: &["app.py", "wsgi.py", "templates"],
        })
    }

    fn module_candidates(&self, from: &Path, module: &str, binding: Option<&str>) -> Vec<PathBuf> {
        python::module_candidates(from, module, binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{scan_file, FileScan, MountTarget, Signal};

    fn scan(path: &str, source: &str) -> FileScan {
        let analyzer = FlaskAnalyzer::new().unwrap();
        scan_file(analyzer.rules(), Path::new(path), source)
    }

    #[test]
    fn test_blueprint_routes() {
        let source = r#"
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
    order.delete()
    return "", 204
"#;
        let scan = scan("app/orders/views.py", source);
        let keys: Vec<String> = scan.endpoints.iter().map(|e| e.key().to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "GET /orders",
                "POST /orders",
                "GET /orders/{order_id}",
                "DELETE /orders/{order_id}",
            ]
        );
        assert!(!scan.endpoints[0].requires_auth);
        assert!(scan.endpoints[2].requires_auth);
        assert_eq!(scan.endpoints[3].roles, vec!["ADMIN".to_string()]);
        assert_eq!(scan.endpoints[3].handler, "delete_order");
    }

    #[test]
    fn test_register_blueprint() {
        let source = "from .users.views import users_bp\n\ndef create_app():\n    app = Flask(__name__)\n    app.register_blueprint(users_bp, url_prefix=\"/api\")\n    return app\n";
        let scan = scan("app/__init__.py", source);
        let mount = scan
            .signals
            .iter()
            .find(|s| matches!(s, Signal::RouteMount { .. }))
            .unwrap();
        match mount {
            Signal::RouteMount { prefix, target, .. } => {
                assert_eq!(prefix, "/api");
                assert_eq!(target, &MountTarget::Binding("users_bp".to_string()));
            }
            _ => unreachable!(),
        }

        let analyzer = FlaskAnalyzer::new().unwrap();
        let candidates =
            analyzer.module_candidates(Path::new("app/__init__.py"), ".users.views", Some("users_bp"));
        assert!(candidates.contains(&PathBuf::from("app/users/views.py")));
    }

    #[test]
    fn test_single_route_app() {
        let scan = scan("app.py", "@app.route('/ping')\ndef ping():\n    return 'pong'\n");
        assert_eq!(scan.endpoints.len(), 1);
        assert_eq!(scan.endpoints[0].path, "/ping");
        assert_eq!(scan.endpoints[0].method, HttpMethod::Get);
    }

    #[test]
    fn test_signature() {
        let analyzer = FlaskAnalyzer::new().unwrap();
        let signature = analyzer.signature().unwrap();
        let pattern = regex::Regex::new(signature.dependency_patterns[0]).unwrap();
        assert!(pattern.is_match("Flask==3.0.2\n"));
        assert!(pattern.is_match("flask\n"));
        assert!(!pattern.is_match("flask-cors==4.0\n"));
    }
}
