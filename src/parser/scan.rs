// Per-file scanner
//
// Walks a file line by line, feeding rule matches through a small state
// machine: markers collect in a pending set, declarations consume them, and
// body signals attach to the innermost open class or method.

use super::rules::{ConstraintRule, MarkerScope, Role, RuleMatch, RuleSet};
use crate::analysis::modules::{humanize, pascal_case, singularize};
use crate::model::{
    Association, AssociationKind, Constraint, Endpoint, Field, HttpMethod, Model, Parameter,
    ParameterSource, Service, ServiceKind, ServiceMethod, SourceLocation,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Handler name used for inline route callbacks
pub const ANONYMOUS_HANDLER: &str = "anonymous";

/// Words that look like method declarations in C-like languages
const KEYWORDS: [&str; 16] = [
    "if", "for", "while", "switch", "catch", "return", "new", "throw", "else", "elif",
    "except", "with", "super", "function", "constructor", "__init__",
];

/// Access granted by a security rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Authenticated,
    Roles,
}

/// What a route mount points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MountTarget {
    /// A local binding, resolved through the file's imports
    Binding(String),
    /// A module path
    Module(String),
}

/// Non-entity facts found in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    SecurityRule {
        pattern: String,
        access: Access,
        roles: Vec<String>,
        location: SourceLocation,
    },
    RouteMount {
        prefix: String,
        target: MountTarget,
        requires_auth: bool,
        location: SourceLocation,
    },
    ModuleImport {
        binding: String,
        module: String,
        location: SourceLocation,
    },
    /// Authentication declared on a handler or class away from its route
    ProtectedHandler {
        name: String,
        roles: Vec<String>,
        location: SourceLocation,
    },
    RoleRequirement {
        role: String,
        location: SourceLocation,
    },
    HttpCall {
        target: String,
        component: String,
        location: SourceLocation,
    },
    Publish {
        topic: String,
        component: String,
        location: SourceLocation,
    },
    Subscribe {
        topic: String,
        component: String,
        location: SourceLocation,
    },
    ExternalSdk {
        name: String,
        component: String,
        location: SourceLocation,
    },
}

impl Signal {
    pub fn location(&self) -> &SourceLocation {
        match self {
            Signal::SecurityRule { location, .. }
            | Signal::RouteMount { location, .. }
            | Signal::ModuleImport { location, .. }
            | Signal::ProtectedHandler { location, .. }
            | Signal::RoleRequirement { location, .. }
            | Signal::HttpCall { location, .. }
            | Signal::Publish { location, .. }
            | Signal::Subscribe { location, .. }
            | Signal::ExternalSdk { location, .. } => location,
        }
    }

    /// Signals needed to finish endpoint discovery
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            Signal::SecurityRule { .. }
                | Signal::RouteMount { .. }
                | Signal::ModuleImport { .. }
                | Signal::ProtectedHandler { .. }
        )
    }
}

/// Everything extracted from one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileScan {
    pub endpoints: Vec<Endpoint>,
    pub models: Vec<Model>,
    pub services: Vec<Service>,
    pub signals: Vec<Signal>,
}

impl FileScan {
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
            && self.models.is_empty()
            && self.services.is_empty()
            && self.signals.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Plain,
    Model,
    Service(Option<ServiceKind>),
    Controller,
}

#[derive(Debug, Default)]
struct Pending {
    routes: Vec<(HttpMethod, Option<String>)>,
    prefix: Option<String>,
    auth: bool,
    roles: Vec<String>,
    kind: Option<ScopeKind>,
    constraints: Vec<Constraint>,
    associations: Vec<AssociationKind>,
    transactional: bool,
    is_async: bool,
    scheduled: bool,
    retry: bool,
    parameters: Vec<Parameter>,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    indent: usize,
    model: Model,
    prefix: Option<String>,
    auth: bool,
    roles: Vec<String>,
    transactional: bool,
    is_async: bool,
    dependencies: Vec<String>,
    methods: Vec<ServiceMethod>,
    has_routes: bool,
}

#[derive(Debug, Clone, Copy)]
enum MethodSlot {
    Scope(usize),
    Module(usize),
}

struct Scanner<'a> {
    rules: &'a RuleSet,
    path: &'a Path,
    scan: FileScan,
    pending: Pending,
    scope: Option<Scope>,
    file_prefix: Option<String>,
    file_auth: bool,
    file_roles: Vec<String>,
    module_file: Option<String>,
    module_service: Option<Service>,
    current_method: Option<MethodSlot>,
    /// Indices of the endpoints emitted for the current method
    method_endpoints: Vec<usize>,
}

/// Scan one file with a rule set
///
/// `path` is the repository-relative path recorded in source locations.
pub fn scan_file(rules: &RuleSet, path: &Path, text: &str) -> FileScan {
    let mut scanner = Scanner::new(rules, path);

    for (index, line) in text.lines().enumerate() {
        let matches = rules.match_line(index + 1, line);
        if !matches.is_empty() {
            let indent = line.len() - line.trim_start().len();
            scanner.apply_line(&matches, indent);
        }
        if rules.marker_scope() == MarkerScope::Line {
            scanner.pending = Pending::default();
        }
    }

    scanner.finish()
}

impl<'a> Scanner<'a> {
    fn new(rules: &'a RuleSet, path: &'a Path) -> Self {
        let module_file = if rules.module_services() {
            module_service_name(path)
        } else {
            None
        };

        Self {
            rules,
            path,
            scan: FileScan::default(),
            pending: Pending::default(),
            scope: None,
            file_prefix: None,
            file_auth: false,
            file_roles: Vec::new(),
            module_file,
            module_service: None,
            current_method: None,
            method_endpoints: Vec::new(),
        }
    }

    fn location(&self, line: usize) -> SourceLocation {
        SourceLocation::new(self.path, line)
    }

    fn apply_line(&mut self, matches: &[RuleMatch], indent: usize) {
        // Only the most specific scope opener on a line counts
        let opener = matches
            .iter()
            .filter(|m| m.role.opens_scope())
            .min_by_key(|m| (m.role == Role::ClassDecl, m.column, m.rule_index))
            .map(|m| (m.column, m.rule_index));
        let mut method_seen = false;

        for m in matches {
            if m.role.opens_scope() && Some((m.column, m.rule_index)) != opener {
                continue;
            }
            if m.role == Role::MethodDecl {
                if method_seen {
                    continue;
                }
                method_seen = true;
            }
            self.apply(m, indent);
        }
    }

    fn apply(&mut self, m: &RuleMatch, indent: usize) {
        match m.role {
            Role::ScopeEnd => {
                if self.scope.as_ref().map(|s| indent <= s.indent).unwrap_or(false) {
                    self.close_scope();
                }
            }
            Role::RouteMarker(default) => {
                let path = m.get("path").map(str::to_string);
                for method in methods_of(m, default) {
                    self.pending.routes.push((method, path.clone()));
                }
            }
            Role::RoutePrefix => self.pending.prefix = m.get("path").map(str::to_string),
            Role::AuthRequired => {
                self.pending.auth = true;
                if let Some(raw) = m.get("role") {
                    self.pending.roles.extend(parse_roles(raw));
                }
            }
            Role::RoleRequirement => {
                let roles = m.get("role").map(parse_roles).unwrap_or_default();
                for role in &roles {
                    self.scan.signals.push(Signal::RoleRequirement {
                        role: role.clone(),
                        location: self.location(m.line),
                    });
                }
                self.pending.roles.extend(roles);
            }
            Role::ModelMarker => self.pending.kind = Some(ScopeKind::Model),
            Role::ServiceMarker(kind) => self.pending.kind = Some(ScopeKind::Service(kind)),
            Role::ControllerMarker => self.pending.kind = Some(ScopeKind::Controller),
            Role::Constraint(rule) => self.constraint(m, rule),
            Role::Association(kind) => self.association(m, kind),
            Role::Transactional => self.pending.transactional = true,
            Role::Async => self.pending.is_async = true,
            Role::Scheduled => self.scheduled(m),
            Role::Retry => self.pending.retry = true,
            Role::Parameter(source) => {
                if let Some(name) = m.get("name") {
                    self.pending.parameters.push(Parameter {
                        name: name.to_string(),
                        source,
                        type_name: m.get("type").map(clean_type),
                    });
                }
            }
            Role::ClassDecl | Role::ModelDecl | Role::ServiceDecl(_) | Role::ControllerDecl => {
                self.open_scope(m, indent)
            }
            Role::MethodDecl => self.method(m),
            Role::FieldDecl => self.field(m),
            Role::RouteStatement(default) => self.route_statement(m, default),
            Role::ResourceRoutes => self.resource_routes(m),
            Role::Dependency => self.dependency(m),
            Role::PersistenceMutation => {
                let call = m.get("call").unwrap_or("save").to_string();
                if let Some(method) = self.current_method_mut() {
                    if !method.persistence_calls.contains(&call) {
                        method.persistence_calls.push(call);
                    }
                }
            }
            Role::TransactionBlock => {
                if let Some(method) = self.current_method_mut() {
                    method.transactional = true;
                }
            }
            Role::HttpClient => {
                if let Some(target) = m.get("target") {
                    let signal = Signal::HttpCall {
                        target: strip_quotes(target).to_string(),
                        component: self.component(),
                        location: self.location(m.line),
                    };
                    self.scan.signals.push(signal);
                }
            }
            Role::MessagePublish => {
                let signal = Signal::Publish {
                    topic: m.get("topic").map(strip_quotes).unwrap_or("events").to_string(),
                    component: self.component(),
                    location: self.location(m.line),
                };
                self.scan.signals.push(signal);
            }
            Role::MessageSubscribe => {
                let signal = Signal::Subscribe {
                    topic: m.get("topic").map(strip_quotes).unwrap_or("events").to_string(),
                    component: self.component(),
                    location: self.location(m.line),
                };
                self.scan.signals.push(signal);
                self.pending.is_async = true;
            }
            Role::SecurityRule => self.security_rule(m),
            Role::AuthScope => {
                let roles = m.get("role").map(parse_roles).unwrap_or_default();
                match self.scope.as_mut() {
                    Some(scope) => {
                        scope.auth = true;
                        extend_unique(&mut scope.roles, roles);
                    }
                    None => {
                        self.file_auth = true;
                        extend_unique(&mut self.file_roles, roles);
                    }
                }
            }
            Role::HandlerAuth => {
                let roles = m.get("role").map(parse_roles).unwrap_or_default();
                for &index in &self.method_endpoints {
                    if let Some(endpoint) = self.scan.endpoints.get_mut(index) {
                        endpoint.requires_auth = true;
                        extend_unique(&mut endpoint.roles, roles.clone());
                        endpoint.roles.sort();
                    }
                }
            }
            Role::FilePrefix => {
                // Nested namespaces accumulate
                if let Some(path) = m.get("path") {
                    let joined = join_paths(&[self.file_prefix.as_deref(), Some(path)]);
                    self.file_prefix = Some(joined);
                }
            }
            Role::RouteMount => self.route_mount(m),
            Role::ModuleImport => {
                if let (Some(binding), Some(module)) = (m.get("name"), m.get("module")) {
                    self.scan.signals.push(Signal::ModuleImport {
                        binding: binding.to_string(),
                        module: module.to_string(),
                        location: self.location(m.line),
                    });
                }
            }
            Role::ExternalSdk => {
                if let Some(name) = m.get("name") {
                    let signal = Signal::ExternalSdk {
                        name: sdk_display_name(name),
                        component: self.component(),
                        location: self.location(m.line),
                    };
                    self.scan.signals.push(signal);
                }
            }
        }
    }

    fn open_scope(&mut self, m: &RuleMatch, indent: usize) {
        let Some(raw_name) = m.get("name") else {
            return;
        };
        self.close_scope();
        let pending = std::mem::take(&mut self.pending);

        let kind = match m.role {
            Role::ModelDecl => ScopeKind::Model,
            Role::ServiceDecl(kind) => ScopeKind::Service(kind),
            Role::ControllerDecl => ScopeKind::Controller,
            _ => pending.kind.unwrap_or_else(|| kind_from_name(raw_name)),
        };
        let name = match kind {
            ScopeKind::Model => model_name(raw_name),
            _ => raw_name.to_string(),
        };
        let prefix = pending
            .prefix
            .or_else(|| pending.routes.first().and_then(|(_, path)| path.clone()));

        self.scope = Some(Scope {
            kind,
            indent,
            model: Model::new(name, self.location(m.line)),
            prefix,
            auth: pending.auth || !pending.roles.is_empty(),
            roles: normalize_roles(pending.roles),
            transactional: pending.transactional,
            is_async: pending.is_async,
            dependencies: Vec::new(),
            methods: Vec::new(),
            has_routes: false,
        });
    }

    fn close_scope(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };
        if matches!(self.current_method, Some(MethodSlot::Scope(_))) {
            self.current_method = None;
        }
        self.method_endpoints.clear();

        let is_service = matches!(scope.kind, ScopeKind::Service(_));
        if scope.auth && !scope.has_routes && !is_service {
            self.scan.signals.push(Signal::ProtectedHandler {
                name: scope.model.name.clone(),
                roles: scope.roles.clone(),
                location: scope.model.location.clone(),
            });
        }

        match scope.kind {
            ScopeKind::Model => self.scan.models.push(scope.model),
            ScopeKind::Plain => {
                let constrained = scope.model.fields.iter().any(|f| !f.constraints.is_empty());
                if constrained || !scope.model.associations.is_empty() {
                    self.scan.models.push(scope.model);
                }
            }
            ScopeKind::Service(kind) => {
                let name = scope.model.name;
                self.scan.services.push(Service {
                    kind: kind.unwrap_or_else(|| ServiceKind::classify(&name)),
                    name,
                    location: scope.model.location,
                    dependencies: scope.dependencies,
                    methods: scope.methods,
                });
            }
            ScopeKind::Controller => {}
        }
    }

    fn method(&mut self, m: &RuleMatch) {
        let Some(name) = m.get("name") else {
            return;
        };
        if KEYWORDS.contains(&name) {
            return;
        }
        if self.scope.as_ref().map(|s| s.model.name == name).unwrap_or(false) {
            // constructor
            self.pending = Pending::default();
            return;
        }

        let pending = std::mem::take(&mut self.pending);
        let owner = self.scope.as_ref().map(|s| s.model.name.clone());

        let first = self.scan.endpoints.len();
        for (method, path) in &pending.routes {
            let raw = path.as_deref().unwrap_or("");
            self.emit_endpoint(*method, raw, name, owner.clone(), m.line, &pending, true);
        }
        self.method_endpoints = (first..self.scan.endpoints.len()).collect();

        let protected = pending.auth || !pending.roles.is_empty();
        if pending.routes.is_empty() && protected && self.scope.is_none() {
            self.scan.signals.push(Signal::ProtectedHandler {
                name: name.to_string(),
                roles: normalize_roles(pending.roles.clone()),
                location: self.location(m.line),
            });
        }

        let mut method = ServiceMethod::new(name, m.line);
        method.transactional = pending.transactional;
        method.is_async = pending.is_async;
        method.scheduled = pending.scheduled;
        method.retry = pending.retry;

        match self.scope.as_mut() {
            Some(scope) if matches!(scope.kind, ScopeKind::Service(_)) => {
                method.transactional |= scope.transactional;
                method.is_async |= scope.is_async;
                scope.methods.push(method);
                self.current_method = Some(MethodSlot::Scope(scope.methods.len() - 1));
            }
            Some(_) => self.current_method = None,
            None => {
                let background = method.is_async || method.scheduled || method.retry;
                if self.module_file.is_some() || background || method.transactional {
                    let service = self.module_service();
                    service.methods.push(method);
                    let index = service.methods.len() - 1;
                    self.current_method = Some(MethodSlot::Module(index));
                } else {
                    self.current_method = None;
                }
            }
        }
    }

    fn field(&mut self, m: &RuleMatch) {
        let pending = std::mem::take(&mut self.pending);
        let Some(name) = m.get("name") else {
            return;
        };
        let Some(scope) = self.scope.as_mut() else {
            return;
        };
        if !matches!(scope.kind, ScopeKind::Model | ScopeKind::Plain) {
            return;
        }

        let type_name = m.get("type").map(clean_type);
        let mut field = Field::new(name, type_name.clone());
        for constraint in pending.constraints {
            field.add_constraint(constraint);
        }
        scope.model.add_field(field);

        if let Some(type_name) = type_name {
            for kind in pending.associations {
                scope.model.add_association(Association {
                    kind,
                    target: association_target(&type_name),
                });
            }
        }
    }

    fn constraint(&mut self, m: &RuleMatch, rule: ConstraintRule) {
        let Some(constraint) = build_constraint(rule, m) else {
            return;
        };
        match (m.get("name"), self.scope.as_mut()) {
            (Some(name), Some(scope)) => {
                let mut field = Field::new(name.trim_start_matches(':'), None);
                field.add_constraint(constraint);
                scope.model.add_field(field);
            }
            (Some(_), None) => {}
            (None, _) => self.pending.constraints.push(constraint),
        }
    }

    fn association(&mut self, m: &RuleMatch, kind: AssociationKind) {
        let Some(target) = m.get("target") else {
            self.pending.associations.push(kind);
            return;
        };
        let association = Association {
            kind,
            target: association_target(target),
        };

        if let Some(owner) = m.get("name") {
            // `User.hasMany(Order)` style, declared outside the model body
            let mut model = Model::new(model_name(owner), self.location(m.line));
            model.add_association(association);
            self.scan.models.push(model);
        } else if let Some(scope) = self.scope.as_mut() {
            scope.model.add_association(association);
        }
    }

    fn scheduled(&mut self, m: &RuleMatch) {
        if self.rules.marker_scope() == MarkerScope::Line {
            // Scheduler registrations rarely sit on a declaration line
            let name = m
                .get("name")
                .map(str::to_string)
                .unwrap_or_else(|| format!("scheduled_job_{}", m.line));
            let mut method = ServiceMethod::new(name, m.line);
            method.scheduled = true;
            let service = self.module_service();
            service.methods.push(method);
            let index = service.methods.len() - 1;
            self.current_method = Some(MethodSlot::Module(index));
        } else {
            self.pending.scheduled = true;
        }
    }

    fn route_statement(&mut self, m: &RuleMatch, default: Option<HttpMethod>) {
        let pending = std::mem::take(&mut self.pending);
        let path = m.get("path").unwrap_or("");
        let (controller, handler) = parse_handler(m.get("handler"));

        for method in methods_of(m, default) {
            self.emit_endpoint(method, path, &handler, controller.clone(), m.line, &pending, false);
        }
    }

    fn resource_routes(&mut self, m: &RuleMatch) {
        let Some(name) = m.get("name").map(strip_quotes) else {
            return;
        };
        let name = name.trim_start_matches(':').trim_matches('/');
        let singular = m.get("kind") == Some("resource");
        let only: Option<Vec<String>> = m.get("only").map(|raw| {
            raw.split(',')
                .map(|s| s.trim().trim_matches(|c: char| c == ':' || c == '\'' || c == '"'))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        });
        let controller = match m.get("handler") {
            Some(handler) => handler.rsplit('.').next().unwrap_or(handler).to_string(),
            None => format!("{}Controller", pascal_case(name)),
        };

        let base = format!("/{}", name);
        let member = if singular {
            base.clone()
        } else {
            format!("{}/{{id}}", base)
        };

        let mut actions = Vec::new();
        if !singular {
            actions.push(("index", HttpMethod::Get, base.clone()));
        }
        actions.push(("create", HttpMethod::Post, base.clone()));
        actions.push(("show", HttpMethod::Get, member.clone()));
        actions.push(("update", HttpMethod::Put, member.clone()));
        actions.push(("destroy", HttpMethod::Delete, member.clone()));
        if let Some(only) = &only {
            if only.iter().any(|a| a == "new") {
                actions.push(("new", HttpMethod::Get, format!("{}/new", base)));
            }
            if only.iter().any(|a| a == "edit") {
                actions.push(("edit", HttpMethod::Get, format!("{}/edit", member)));
            }
        }

        let pending = std::mem::take(&mut self.pending);
        for (action, method, path) in actions {
            let allowed = only
                .as_ref()
                .map(|o| o.iter().any(|a| a == action))
                .unwrap_or(true);
            if allowed {
                let controller = Some(controller.clone());
                self.emit_endpoint(method, &path, action, controller, m.line, &pending, false);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_endpoint(
        &mut self,
        method: HttpMethod,
        raw_path: &str,
        handler: &str,
        controller: Option<String>,
        line: usize,
        pending: &Pending,
        in_scope: bool,
    ) {
        let mut roles = pending.roles.clone();
        roles.extend(self.file_roles.iter().cloned());
        let mut requires_auth = pending.auth || self.file_auth;
        let mut scope_prefix = None;
        let mut controller = controller;

        if in_scope {
            if let Some(scope) = self.scope.as_mut() {
                scope.has_routes = true;
                requires_auth |= scope.auth;
                roles.extend(scope.roles.iter().cloned());
                scope_prefix = scope.prefix.clone();
                if controller.is_none() {
                    controller = Some(scope.model.name.clone());
                }
            }
        }

        let roles = normalize_roles(roles);
        requires_auth |= !roles.is_empty();

        let path = join_paths(&[
            self.file_prefix.as_deref(),
            scope_prefix.as_deref(),
            Some(raw_path),
        ]);

        let mut parameters = pending.parameters.clone();
        for name in path_parameters(&path) {
            if !parameters.iter().any(|p| p.name == name) {
                parameters.push(Parameter {
                    name,
                    source: ParameterSource::Path,
                    type_name: None,
                });
            }
        }

        self.scan.endpoints.push(Endpoint {
            method,
            path,
            location: self.location(line),
            controller,
            handler: handler.to_string(),
            requires_auth,
            roles,
            parameters,
        });
    }

    fn dependency(&mut self, m: &RuleMatch) {
        let Some(raw) = m.get("type").or_else(|| m.get("name")) else {
            return;
        };
        let name = dependency_name(raw);
        if name.is_empty() {
            return;
        }

        if let Some(scope) = self.scope.as_mut() {
            extend_unique(&mut scope.dependencies, vec![name]);
        } else if self.module_file.is_some() {
            let service = self.module_service();
            extend_unique(&mut service.dependencies, vec![name]);
        }
    }

    fn security_rule(&mut self, m: &RuleMatch) {
        let pattern = normalize_path(m.get("path").unwrap_or("/**"));
        let roles = m.get("role").map(parse_roles).unwrap_or_default();
        let access_word = m.get("access").unwrap_or("authenticated").to_ascii_lowercase();

        let access = if !roles.is_empty() {
            Access::Roles
        } else if access_word.contains("permit") || access_word.contains("anonymous") {
            Access::Public
        } else {
            Access::Authenticated
        };

        self.scan.signals.push(Signal::SecurityRule {
            pattern,
            access,
            roles,
            location: self.location(m.line),
        });
    }

    fn route_mount(&mut self, m: &RuleMatch) {
        let target = match (m.get("module"), m.get("target")) {
            (Some(module), _) => MountTarget::Module(module.to_string()),
            (None, Some(binding)) => MountTarget::Binding(binding.to_string()),
            (None, None) => return,
        };
        self.scan.signals.push(Signal::RouteMount {
            prefix: normalize_path(m.get("path").unwrap_or("/")),
            target,
            requires_auth: self.pending.auth || self.file_auth,
            location: self.location(m.line),
        });
    }

    fn current_method_mut(&mut self) -> Option<&mut ServiceMethod> {
        match self.current_method? {
            MethodSlot::Scope(index) => self.scope.as_mut()?.methods.get_mut(index),
            MethodSlot::Module(index) => self.module_service.as_mut()?.methods.get_mut(index),
        }
    }

    fn module_service(&mut self) -> &mut Service {
        let name = self
            .module_file
            .clone()
            .unwrap_or_else(|| file_component(self.path));
        let location = self.location(1);
        self.module_service.get_or_insert_with(|| Service {
            kind: ServiceKind::classify(&name),
            name,
            location,
            dependencies: Vec::new(),
            methods: Vec::new(),
        })
    }

    /// Name of the component the current line belongs to
    fn component(&self) -> String {
        if let Some(scope) = &self.scope {
            return scope.model.name.clone();
        }
        if let Some(service) = &self.module_service {
            return service.name.clone();
        }
        self.module_file
            .clone()
            .unwrap_or_else(|| file_component(self.path))
    }

    fn finish(mut self) -> FileScan {
        self.close_scope();
        if let Some(service) = self.module_service.take() {
            if !service.methods.is_empty() || !service.dependencies.is_empty() {
                self.scan.services.push(service);
            }
        }
        self.scan
    }
}

fn methods_of(m: &RuleMatch, default: Option<HttpMethod>) -> Vec<HttpMethod> {
    let mut methods: Vec<HttpMethod> = m
        .get("method")
        .map(|raw| {
            raw.split(|c: char| c == ',' || c == '|' || c.is_whitespace())
                .filter_map(|part| HttpMethod::parse(part.rsplit('.').next().unwrap_or(part)))
                .collect()
        })
        .unwrap_or_default();
    methods.dedup();
    if methods.is_empty() {
        methods.push(default.unwrap_or(HttpMethod::Any));
    }
    methods
}

fn kind_from_name(name: &str) -> ScopeKind {
    const CONTROLLER: [&str; 6] = ["controller", "resource", "viewset", "view", "handler", "api"];
    const SERVICE: [&str; 15] = [
        "service", "repository", "repo", "dao", "manager", "client", "gateway", "provider",
        "worker", "job", "consumer", "producer", "listener", "publisher", "store",
    ];

    let mut parts = crate::analysis::modules::words(name);
    if parts.last().map(|w| w == "impl").unwrap_or(false) {
        parts.pop();
    }
    if parts.len() < 2 {
        return ScopeKind::Plain;
    }
    match parts.last().map(String::as_str) {
        Some(last) if CONTROLLER.contains(&last) => ScopeKind::Controller,
        Some(last) if SERVICE.contains(&last) => ScopeKind::Service(None),
        _ => ScopeKind::Plain,
    }
}

/// Canonical model name: `users` -> `User`, `userSchema` -> `User`
fn model_name(raw: &str) -> String {
    let raw = strip_quotes(raw);
    let trimmed = raw
        .strip_suffix("Schema")
        .filter(|s| !s.is_empty())
        .unwrap_or(raw);
    if trimmed.chars().next().map(|c| c.is_lowercase()).unwrap_or(false) || trimmed.contains('_') {
        singularize(&pascal_case(trimmed))
    } else {
        trimmed.to_string()
    }
}

fn association_target(raw: &str) -> String {
    let raw = strip_quotes(raw.trim());
    let inner = match (raw.rfind('<'), raw.find('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    let inner = inner
        .split(',')
        .last()
        .unwrap_or(inner)
        .trim()
        .trim_matches(|c: char| c == ':' || c == '[' || c == ']' || c == '?' || c == '*');
    let inner = strip_quotes(inner);
    let last = inner.rsplit(|c: char| c == '.' || c == ':').next().unwrap_or(inner);
    singularize(&pascal_case(last))
}

fn dependency_name(raw: &str) -> String {
    let raw = strip_quotes(raw.trim());
    let last = raw.rsplit(|c: char| c == '/' || c == '.').next().unwrap_or(raw);
    pascal_case(last)
}

fn clean_type(raw: &str) -> String {
    raw.trim().trim_end_matches(',').trim().to_string()
}

fn strip_quotes(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c: char| c == '\'' || c == '"' || c == '`')
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Name of the implicit service for function-style service files
fn module_service_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?.to_lowercase();
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let service_file = stem.contains("service")
        || ["tasks", "jobs", "workers"].contains(&stem.as_str())
        || ["services", "tasks", "jobs", "workers"].contains(&parent.as_str());
    if !service_file {
        return None;
    }

    // `orders/services.py` -> `OrderService`, `billing/tasks.py` -> `BillingTasks`
    let generic_stem = match stem.as_str() {
        "services" | "service" => Some("Service"),
        "tasks" => Some("Tasks"),
        "jobs" => Some("Jobs"),
        "workers" => Some("Workers"),
        _ => None,
    };
    if let Some(suffix) = generic_stem {
        let owner = pascal_case(&singularize(&parent));
        if !owner.is_empty() && !["services", "tasks", "jobs", "workers", "src", "app"].contains(&parent.as_str()) {
            return Some(format!("{}{}", owner, suffix));
        }
    }

    let name = file_component(path);
    if parent == "services" && !name.ends_with("Service") {
        Some(format!("{}Service", name))
    } else {
        Some(name)
    }
}

fn file_component(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module");
    let name = pascal_case(stem);
    if name.is_empty() {
        "Module".to_string()
    } else {
        name
    }
}

fn build_constraint(rule: ConstraintRule, m: &RuleMatch) -> Option<Constraint> {
    let number = |name: &str| m.get(name).and_then(|v| v.parse::<i64>().ok());
    let unsigned = |name: &str| m.get(name).and_then(|v| v.parse::<u64>().ok());

    Some(match rule {
        ConstraintRule::NotNull => Constraint::NotNull,
        ConstraintRule::NotBlank => Constraint::NotBlank,
        ConstraintRule::Unique => Constraint::Unique,
        ConstraintRule::Email => Constraint::Email,
        ConstraintRule::Positive => Constraint::Positive,
        ConstraintRule::Past => Constraint::Past,
        ConstraintRule::Future => Constraint::Future,
        ConstraintRule::Size => {
            let (mut min, mut max) = (unsigned("min"), unsigned("max"));
            if let Some(args) = m.get("args") {
                min = min.or_else(|| named_number(args, "min"));
                max = max.or_else(|| named_number(args, "max"));
            }
            if min.is_none() && max.is_none() {
                return None;
            }
            Constraint::Size { min, max }
        }
        ConstraintRule::MinLength => Constraint::Size {
            min: Some(unsigned("value").or_else(|| unsigned("min"))?),
            max: None,
        },
        ConstraintRule::MaxLength => Constraint::Size {
            min: None,
            max: Some(unsigned("value").or_else(|| unsigned("max"))?),
        },
        ConstraintRule::Min => Constraint::Min {
            value: number("value")?,
        },
        ConstraintRule::Max => Constraint::Max {
            value: number("value")?,
        },
        ConstraintRule::Pattern => Constraint::Pattern {
            regex: strip_quotes(m.get("value")?).to_string(),
        },
    })
}

/// `min = 2, max = 40` -> value of `key`
fn named_number(args: &str, key: &str) -> Option<u64> {
    args.split(',').find_map(|part| {
        let (k, v) = part.split_once(|c: char| c == '=' || c == ':')?;
        if k.trim() == key {
            v.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Normalize a role name: `'ROLE_admin'` -> `ADMIN`
pub fn normalize_role(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
    let upper = cleaned.to_uppercase();
    let role = upper.strip_prefix("ROLE_").unwrap_or(&upper);
    let valid = role
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false)
        && role
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Some(role.to_string())
    } else {
        None
    }
}

/// Parse a role list such as `'ADMIN', 'ROLE_SUPPORT'` or `{"A","B"}`
pub fn parse_roles(raw: &str) -> Vec<String> {
    let roles: Vec<String> = raw
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.'))
        .filter(|s| !s.is_empty())
        .filter_map(normalize_role)
        .collect();
    normalize_roles(roles)
}

fn normalize_roles(mut roles: Vec<String>) -> Vec<String> {
    roles.sort();
    roles.dedup();
    roles
}

static DJANGO_REGEX_GROUP: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\(\?P<(\w+)>[^)]*\)").ok());
static ANGLE_PARAM: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<(?:\w+:)?(\w+)>").ok());
static BRACE_PARAM: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\{(\w+)(?::[^}]*)?\}").ok());

fn rewrite_params(raw: String, pattern: &Lazy<Option<Regex>>) -> String {
    match &**pattern {
        Some(regex) => regex.replace_all(&raw, "{$1}").into_owned(),
        None => raw,
    }
}

/// Normalize a route path template
///
/// Ensures a leading `/`, collapses repeated slashes, drops a trailing
/// slash and rewrites every parameter syntax (`:id`, `<int:id>`,
/// `(?P<id>...)`, `{id:\d+}`) to `{id}`.
pub fn normalize_path(raw: &str) -> String {
    let raw = strip_quotes(raw);
    let raw = raw.trim_start_matches('^').trim_end_matches('$');
    let raw = raw.replace("(.:format)", "");
    let raw = rewrite_params(raw, &DJANGO_REGEX_GROUP);
    let raw = rewrite_params(raw, &ANGLE_PARAM);
    let raw = rewrite_params(raw, &BRACE_PARAM);

    let segments: Vec<String> = raw
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{}}}", name),
            _ => s.to_string(),
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Join route fragments into one normalized path
pub fn join_paths(parts: &[Option<&str>]) -> String {
    let joined = parts
        .iter()
        .flatten()
        .map(|p| strip_quotes(p))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    normalize_path(&joined)
}

/// Parameter names in a normalized path template
pub fn path_parameters(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|s| s.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
        .map(str::to_string)
        .collect()
}

/// Split a route handler expression into controller and handler names
pub fn parse_handler(raw: Option<&str>) -> (Option<String>, String) {
    let anonymous = (None, ANONYMOUS_HANDLER.to_string());
    let Some(raw) = raw else {
        return anonymous;
    };

    let segment = raw.rsplit(',').next().unwrap_or(raw).trim();
    let segment = strip_quotes(segment.trim_end_matches(|c: char| c == ';' || c == ' '));
    let segment = segment.strip_prefix("to:").map(str::trim).unwrap_or(segment);
    let segment = strip_quotes(segment);

    if let Some((controller, action)) = segment.split_once('#') {
        return (
            Some(format!("{}Controller", pascal_case(controller))),
            action.to_string(),
        );
    }

    let segment = segment.trim_end_matches(')').trim_end_matches('(');
    let (segment, class_view) = match segment.strip_suffix(".as_view") {
        Some(rest) => (rest, true),
        None => (segment, false),
    };
    let inline = segment.is_empty()
        || segment.contains("=>")
        || segment.contains('(')
        || segment.contains('{')
        || segment.starts_with("function")
        || segment.starts_with("async");
    if inline {
        return anonymous;
    }

    let parts: Vec<&str> = segment.split('.').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [] => anonymous,
        [.., last] if class_view => (Some(last.to_string()), last.to_string()),
        [single] => (None, single.to_string()),
        [.., owner, last] => (Some(owner.to_string()), last.to_string()),
    }
}

/// Display name of an SDK package: `@aws-sdk/client-s3` -> `AWS`
pub fn sdk_display_name(raw: &str) -> String {
    let raw = strip_quotes(raw).trim_start_matches('@');
    let base = raw.split(|c: char| c == '/' || c == '.').next().unwrap_or(raw);
    let lower = base.to_lowercase();

    match lower.as_str() {
        "aws-sdk" | "boto3" | "botocore" | "aws" | "amazonaws" | "amazon" | "software" => {
            "AWS".to_string()
        }
        "sendgrid" | "sendgrid-ruby" => "SendGrid".to_string(),
        "twilio" | "twilio-ruby" => "Twilio".to_string(),
        "stripe" => "Stripe".to_string(),
        "openai" => "OpenAI".to_string(),
        "firebase-admin" | "firebase_admin" => "Firebase".to_string(),
        "slack" | "slack_sdk" | "slack-ruby-client" => "Slack".to_string(),
        "google" => "Google Cloud".to_string(),
        "nodemailer" => "SMTP".to_string(),
        _ => {
            let trimmed = lower
                .trim_end_matches("-sdk")
                .trim_end_matches("_sdk")
                .trim_end_matches("-ruby");
            humanize(trimmed)
        }
    }
}
