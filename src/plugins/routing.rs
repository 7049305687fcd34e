// Cross-file endpoint resolution
//
// Per-file scans cannot see route mounts declared in other files, URL-level
// security rules or authentication attached to a handler away from its
// route. This pass applies all three and deduplicates the result.

use super::FrameworkAnalyzer;
use crate::analysis::AnalysisContext;
use crate::model::{Endpoint, Parameter, ParameterSource};
use crate::parser::{join_paths, path_parameters, Access, FileScan, MountTarget, Signal};
use glob::{MatchOptions, Pattern};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mount chains deeper than this are treated as cycles
const MAX_MOUNT_DEPTH: usize = 8;

#[derive(Debug, Clone)]
struct Mount {
    source: PathBuf,
    prefix: String,
    requires_auth: bool,
}

#[derive(Debug, Clone)]
struct SecurityRule {
    pattern: Option<Pattern>,
    raw: String,
    access: Access,
    roles: Vec<String>,
}

impl SecurityRule {
    fn matches(&self, path: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        if let Some(base) = self.raw.strip_suffix("/**") {
            let base = if base.is_empty() { "/" } else { base };
            if path == base {
                return true;
            }
        }
        self.pattern
            .as_ref()
            .map(|p| p.matches_with(path, options))
            .unwrap_or(false)
    }
}

/// Finish endpoint discovery for a plugin's per-file scans
pub fn finish_endpoints<P: FrameworkAnalyzer + ?Sized>(
    plugin: &P,
    ctx: &AnalysisContext<'_>,
    scans: &[(PathBuf, FileScan)],
) -> Vec<Endpoint> {
    let mounts = resolve_mounts(plugin, ctx, scans);
    let rules = security_rules(scans);
    let protected = protected_handlers(scans);

    let mut endpoints = Vec::new();
    for (file, scan) in scans {
        let prefixes = prefixes_for(file, &mounts, 0);
        for endpoint in &scan.endpoints {
            for (prefix, mount_auth) in &prefixes {
                let mut endpoint = endpoint.clone();
                if !prefix.is_empty() {
                    endpoint.path = join_paths(&[Some(prefix.as_str()), Some(endpoint.path.as_str())]);
                    add_path_parameters(&mut endpoint);
                }
                endpoint.requires_auth |= *mount_auth;
                endpoints.push(endpoint);
            }
        }
    }

    for endpoint in &mut endpoints {
        apply_security(endpoint, &rules);
        apply_protection(endpoint, &protected);
    }

    dedupe(endpoints)
}

/// Mounts keyed by the file they mount
fn resolve_mounts<P: FrameworkAnalyzer + ?Sized>(
    plugin: &P,
    ctx: &AnalysisContext<'_>,
    scans: &[(PathBuf, FileScan)],
) -> HashMap<PathBuf, Vec<Mount>> {
    let mut mounts: HashMap<PathBuf, Vec<Mount>> = HashMap::new();

    for (file, scan) in scans {
        for signal in &scan.signals {
            let Signal::RouteMount {
                prefix,
                target,
                requires_auth,
                ..
            } = signal
            else {
                continue;
            };

            let (module, binding) = match target {
                MountTarget::Module(module) => (Some(module.clone()), None),
                MountTarget::Binding(binding) => {
                    let head = binding.split('.').next().unwrap_or(binding);
                    match scan.signals.iter().find_map(|s| imported_as(s, head)) {
                        Some((module, original)) => (Some(module), Some(original)),
                        None => (None, None),
                    }
                }
            };
            let Some(module) = module else {
                debug!("Unresolved mount target {:?} in {}", target, file.display());
                continue;
            };

            let resolved = plugin
                .module_candidates(file, &module, binding.as_deref())
                .into_iter()
                .find(|candidate| ctx.contains(candidate));
            match resolved {
                Some(target_file) if &target_file != file => {
                    mounts.entry(target_file).or_default().push(Mount {
                        source: file.clone(),
                        prefix: prefix.clone(),
                        requires_auth: *requires_auth,
                    });
                }
                _ => debug!("Cannot resolve module {} from {}", module, file.display()),
            }
        }
    }

    mounts
}

/// Module and original name behind a local binding
///
/// Import bindings may list several names (`users, items as item_routes`).
fn imported_as(signal: &Signal, local: &str) -> Option<(String, String)> {
    let Signal::ModuleImport { binding, module, .. } = signal else {
        return None;
    };
    binding.split(',').find_map(|part| {
        let part = part.trim();
        let (original, alias) = match part.split_once(" as ") {
            Some((original, alias)) => (original.trim(), alias.trim()),
            None => (part, part),
        };
        (alias == local).then(|| (module.clone(), original.to_string()))
    })
}

/// Every (prefix, auth) a file's routes are reachable under
fn prefixes_for(
    file: &Path,
    mounts: &HashMap<PathBuf, Vec<Mount>>,
    depth: usize,
) -> Vec<(String, bool)> {
    let root = vec![(String::new(), false)];
    if depth >= MAX_MOUNT_DEPTH {
        return root;
    }
    let Some(incoming) = mounts.get(file) else {
        return root;
    };

    let mut prefixes = Vec::new();
    for mount in incoming {
        for (outer, outer_auth) in prefixes_for(&mount.source, mounts, depth + 1) {
            let joined = join_paths(&[Some(outer.as_str()), Some(mount.prefix.as_str())]);
            let entry = (
                if joined == "/" { String::new() } else { joined },
                outer_auth || mount.requires_auth,
            );
            if !prefixes.contains(&entry) {
                prefixes.push(entry);
            }
        }
    }
    prefixes
}

fn add_path_parameters(endpoint: &mut Endpoint) {
    for name in path_parameters(&endpoint.path) {
        if !endpoint.parameters.iter().any(|p| p.name == name) {
            endpoint.parameters.push(Parameter {
                name,
                source: ParameterSource::Path,
                type_name: None,
            });
        }
    }
}

/// Security rules in declaration order across files
fn security_rules(scans: &[(PathBuf, FileScan)]) -> Vec<SecurityRule> {
    scans
        .iter()
        .flat_map(|(_, scan)| scan.signals.iter())
        .filter_map(|signal| match signal {
            Signal::SecurityRule {
                pattern,
                access,
                roles,
                ..
            } => Some(SecurityRule {
                pattern: Pattern::new(pattern).ok(),
                raw: pattern.clone(),
                access: *access,
                roles: roles.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// First matching rule wins
fn apply_security(endpoint: &mut Endpoint, rules: &[SecurityRule]) {
    let Some(rule) = rules.iter().find(|r| r.matches(&endpoint.path)) else {
        return;
    };
    match rule.access {
        Access::Public => {}
        Access::Authenticated => endpoint.requires_auth = true,
        Access::Roles => {
            endpoint.requires_auth = true;
            for role in &rule.roles {
                if !endpoint.roles.contains(role) {
                    endpoint.roles.push(role.clone());
                }
            }
            endpoint.roles.sort();
        }
    }
}

/// Handler or class names with authentication, and their roles
fn protected_handlers(scans: &[(PathBuf, FileScan)]) -> HashMap<String, Vec<String>> {
    let mut protected: HashMap<String, Vec<String>> = HashMap::new();
    for (_, scan) in scans {
        for signal in &scan.signals {
            if let Signal::ProtectedHandler { name, roles, .. } = signal {
                let entry = protected.entry(name.clone()).or_default();
                for role in roles {
                    if !entry.contains(role) {
                        entry.push(role.clone());
                    }
                }
            }
        }
    }
    protected
}

fn apply_protection(endpoint: &mut Endpoint, protected: &HashMap<String, Vec<String>>) {
    let roles = endpoint
        .controller
        .as_ref()
        .and_then(|c| protected.get(c))
        .or_else(|| protected.get(&endpoint.handler));
    let Some(roles) = roles else {
        return;
    };
    endpoint.requires_auth = true;
    for role in roles {
        if !endpoint.roles.contains(role) {
            endpoint.roles.push(role.clone());
        }
    }
    endpoint.roles.sort();
}

/// One endpoint per (method, path), sorted by path then method
fn dedupe(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut unique: BTreeMap<(String, crate::model::HttpMethod), Endpoint> = BTreeMap::new();
    for endpoint in endpoints {
        let key = (endpoint.path.clone(), endpoint.method);
        match unique.get_mut(&key) {
            Some(existing) => {
                existing.requires_auth |= endpoint.requires_auth;
                for role in endpoint.roles {
                    if !existing.roles.contains(&role) {
                        existing.roles.push(role);
                    }
                }
                existing.roles.sort();
                for parameter in endpoint.parameters {
                    if !existing.parameters.iter().any(|p| p.name == parameter.name) {
                        existing.parameters.push(parameter);
                    }
                }
            }
            None => {
                unique.insert(key, endpoint);
            }
        }
    }
    unique.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{NullCache, ParallelProcessor};
    use crate::config::ParallelConfig;
    use crate::model::{HttpMethod, SourceLocation};
    use crate::plugins::express::ExpressAnalyzer;
    use std::sync::Arc;

    fn endpoint(method: HttpMethod, path: &str, controller: Option<&str>, handler: &str) -> Endpoint {
        Endpoint {
            method,
            path: path.to_string(),
            location: SourceLocation::new("x", 1),
            controller: controller.map(str::to_string),
            handler: handler.to_string(),
            requires_auth: false,
            roles: Vec::new(),
            parameters: Vec::new(),
        }
    }

    fn rule(pattern: &str, access: Access, roles: &[&str]) -> SecurityRule {
        SecurityRule {
            pattern: Pattern::new(pattern).ok(),
            raw: pattern.to_string(),
            access,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_security_rule_matching() {
        let admin = rule("/api/admin/**", Access::Roles, &["ADMIN"]);
        assert!(admin.matches("/api/admin"));
        assert!(admin.matches("/api/admin/users/{id}"));
        assert!(!admin.matches("/api/administrators"));

        let single = rule("/api/*/status", Access::Authenticated, &[]);
        assert!(single.matches("/api/orders/status"));
        assert!(!single.matches("/api/orders/1/status"));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = vec![
            rule("/public/**", Access::Public, &[]),
            rule("/**", Access::Authenticated, &[]),
        ];
        let mut open = endpoint(HttpMethod::Get, "/public/health", None, "health");
        apply_security(&mut open, &rules);
        assert!(!open.requires_auth);

        let mut closed = endpoint(HttpMethod::Get, "/orders", None, "list");
        apply_security(&mut closed, &rules);
        assert!(closed.requires_auth);
    }

    #[test]
    fn test_protection_by_controller_or_handler() {
        let mut protected = HashMap::new();
        protected.insert("OrdersController".to_string(), vec!["ADMIN".to_string()]);
        protected.insert("dashboard".to_string(), Vec::new());

        let mut by_controller = endpoint(HttpMethod::Post, "/orders", Some("OrdersController"), "create");
        apply_protection(&mut by_controller, &protected);
        assert!(by_controller.requires_auth);
        assert_eq!(by_controller.roles, vec!["ADMIN".to_string()]);

        let mut by_handler = endpoint(HttpMethod::Get, "/dash", Some("views"), "dashboard");
        apply_protection(&mut by_handler, &protected);
        assert!(by_handler.requires_auth);

        let mut open = endpoint(HttpMethod::Get, "/", Some("views"), "index");
        apply_protection(&mut open, &protected);
        assert!(!open.requires_auth);
    }

    #[test]
    fn test_dedupe_merges_and_sorts() {
        let mut secured = endpoint(HttpMethod::Get, "/b", None, "b");
        secured.requires_auth = true;
        let merged = dedupe(vec![
            endpoint(HttpMethod::Post, "/b", None, "b"),
            endpoint(HttpMethod::Get, "/b", None, "b"),
            secured,
            endpoint(HttpMethod::Get, "/a", None, "a"),
        ]);
        let keys: Vec<String> = merged.iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys, vec!["GET /a", "GET /b", "POST /b"]);
        assert!(merged[1].requires_auth);
    }

    #[test]
    fn test_imported_as() {
        let import = Signal::ModuleImport {
            binding: "users, items as item_routes".to_string(),
            module: "app.routers".to_string(),
            location: SourceLocation::new("app/main.py", 1),
        };
        assert_eq!(
            imported_as(&import, "item_routes"),
            Some(("app.routers".to_string(), "items".to_string()))
        );
        assert_eq!(
            imported_as(&import, "users"),
            Some(("app.routers".to_string(), "users".to_string()))
        );
        assert_eq!(imported_as(&import, "items"), None);
    }

    #[test]
    fn test_mount_chain_prefixes() {
        let mut mounts: HashMap<PathBuf, Vec<Mount>> = HashMap::new();
        mounts.insert(
            PathBuf::from("routes/api.js"),
            vec![Mount {
                source: PathBuf::from("app.js"),
                prefix: "/api".to_string(),
                requires_auth: false,
            }],
        );
        mounts.insert(
            PathBuf::from("routes/users.js"),
            vec![Mount {
                source: PathBuf::from("routes/api.js"),
                prefix: "/users".to_string(),
                requires_auth: true,
            }],
        );

        assert_eq!(prefixes_for(Path::new("app.js"), &mounts, 0), vec![(String::new(), false)]);
        assert_eq!(
            prefixes_for(Path::new("routes/users.js"), &mounts, 0),
            vec![("/api/users".to_string(), true)]
        );
    }

    #[test]
    fn test_mount_cycle_terminates() {
        let mut mounts: HashMap<PathBuf, Vec<Mount>> = HashMap::new();
        mounts.insert(
            PathBuf::from("a.js"),
            vec![Mount {
                source: PathBuf::from("b.js"),
                prefix: "/a".to_string(),
                requires_auth: false,
            }],
        );
        mounts.insert(
            PathBuf::from("b.js"),
            vec![Mount {
                source: PathBuf::from("a.js"),
                prefix: "/b".to_string(),
                requires_auth: false,
            }],
        );
        let prefixes = prefixes_for(Path::new("a.js"), &mounts, 0);
        assert_eq!(prefixes.len(), 1);
    }

    #[test]
    fn test_finish_endpoints_resolves_imports() {
        let plugin = ExpressAnalyzer::new().unwrap();
        let app = FileScan {
            signals: vec![
                Signal::ModuleImport {
                    binding: "usersRouter".to_string(),
                    module: "./routes/users".to_string(),
                    location: SourceLocation::new("src/app.js", 2),
                },
                Signal::RouteMount {
                    prefix: "/api/users".to_string(),
                    target: MountTarget::Binding("usersRouter".to_string()),
                    requires_auth: false,
                    location: SourceLocation::new("src/app.js", 5),
                },
            ],
            ..FileScan::default()
        };
        let users = FileScan {
            endpoints: vec![endpoint(HttpMethod::Get, "/{id}", Some("userController"), "show")],
            ..FileScan::default()
        };
        let files = vec![PathBuf::from("src/app.js"), PathBuf::from("src/routes/users.js")];
        let processor = ParallelProcessor::new(&ParallelConfig::default());
        let ctx = AnalysisContext::new("/repo", files.clone(), Arc::new(NullCache), &processor, 1024);

        let scans = vec![(files[0].clone(), app), (files[1].clone(), users)];
        let endpoints = finish_endpoints(&plugin, &ctx, &scans);

        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].path, "/api/users/{id}");
        assert_eq!(endpoints[0].parameters[0].name, "id");
    }
}
