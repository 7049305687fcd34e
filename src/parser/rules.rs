// Declarative pattern rules
//
// A plugin describes its framework as a table of (role, pattern) pairs. The
// table is compiled once into a `RuleSet`; the scanner only ever sees roles
// and named captures, never framework-specific control flow.
//
// Capture names understood by the scanner:
// - `path`    route path or security pattern
// - `method`  HTTP method name
// - `name`    declared identifier (class, method, field, resource)
// - `type`    declared type
// - `handler` route handler expression
// - `target`  association target, HTTP call target, mount target
// - `role`    role list
// - `access`  security rule access keyword
// - `topic`   message topic or queue
// - `module`  imported module path
// - `value`, `args`, `min`, `max`, `only`, `kind`  constraint / expansion details

use crate::error::{Error, Result};
use crate::model::{AssociationKind, HttpMethod, ParameterSource, ServiceKind};
use regex::{Regex, RegexSet};

/// Semantic role of a pattern match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    // Markers: collected and applied to the next declaration
    /// Ends the current class scope
    ScopeEnd,
    /// Route annotation or decorator; `None` reads the `method` capture
    RouteMarker(Option<HttpMethod>),
    /// Class-level route prefix
    RoutePrefix,
    AuthRequired,
    RoleRequirement,
    ModelMarker,
    ServiceMarker(Option<ServiceKind>),
    ControllerMarker,
    Constraint(ConstraintRule),
    /// Model association; applied directly when a `target` is captured
    Association(AssociationKind),
    Transactional,
    Async,
    Scheduled,
    Retry,
    Parameter(ParameterSource),

    // Declarations
    ClassDecl,
    ModelDecl,
    ServiceDecl(Option<ServiceKind>),
    ControllerDecl,
    MethodDecl,
    FieldDecl,
    /// Self-contained route registration; `None` reads the `method` capture
    RouteStatement(Option<HttpMethod>),
    /// RESTful resource registration expanding into several routes
    ResourceRoutes,

    // Body and file-level signals
    Dependency,
    PersistenceMutation,
    TransactionBlock,
    HttpClient,
    MessagePublish,
    MessageSubscribe,
    SecurityRule,
    /// Authentication applied to everything after it in the class or file
    AuthScope,
    /// Authentication inside a handler signature or body; applies to the
    /// routes of the current method
    HandlerAuth,
    /// Route prefix applied to every route in the file
    FilePrefix,
    RouteMount,
    ModuleImport,
    ExternalSdk,
}

/// Constraint produced by a `Role::Constraint` rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintRule {
    NotNull,
    NotBlank,
    Unique,
    Email,
    Positive,
    Past,
    Future,
    /// Reads `min`/`max` captures or `min = n` / `max = n` inside `args`
    Size,
    MinLength,
    MaxLength,
    Min,
    Max,
    Pattern,
}

impl Role {
    /// Processing phase within a single line
    pub fn phase(&self) -> u8 {
        match self {
            Role::ScopeEnd
            | Role::RouteMarker(_)
            | Role::RoutePrefix
            | Role::AuthRequired
            | Role::RoleRequirement
            | Role::ModelMarker
            | Role::ServiceMarker(_)
            | Role::ControllerMarker
            | Role::Constraint(_)
            | Role::Association(_)
            | Role::Transactional
            | Role::Async
            | Role::Scheduled
            | Role::Retry
            | Role::Parameter(_) => 0,
            Role::ClassDecl
            | Role::ModelDecl
            | Role::ServiceDecl(_)
            | Role::ControllerDecl
            | Role::MethodDecl
            | Role::FieldDecl
            | Role::RouteStatement(_)
            | Role::ResourceRoutes => 1,
            _ => 2,
        }
    }

    /// Declarations that open a class scope
    pub fn opens_scope(&self) -> bool {
        matches!(
            self,
            Role::ClassDecl | Role::ModelDecl | Role::ServiceDecl(_) | Role::ControllerDecl
        )
    }

    /// Short label used in error messages
    pub fn label(&self) -> String {
        format!("{:?}", self)
    }
}

/// How long collected markers stay alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerScope {
    /// Annotations and decorators carry over to the next declaration
    NextDeclaration,
    /// Markers only apply to declarations on the same line
    Line,
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub role: Role,
    pub regex: Regex,
}

/// A rule match on one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub role: Role,
    /// 1-based line number
    pub line: usize,
    /// Byte offset of the match within the line
    pub column: usize,
    /// Index of the rule in its table
    pub rule_index: usize,
    captures: Vec<(String, String)>,
}

impl RuleMatch {
    /// Get a named capture, ignoring empty captures
    pub fn get(&self, name: &str) -> Option<&str> {
        self.captures
            .iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

/// A compiled rule table
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    prefilter: RegexSet,
    marker_scope: MarkerScope,
    module_services: bool,
}

impl RuleSet {
    /// Compile a `(role, pattern)` table
    pub fn compile(table: &[(Role, &str)]) -> Result<Self> {
        let mut rules = Vec::with_capacity(table.len());
        for (role, pattern) in table {
            let regex =
                Regex::new(pattern).map_err(|e| Error::rule(role.label(), *pattern, e))?;
            rules.push(Rule { role: *role, regex });
        }
        let prefilter = RegexSet::new(table.iter().map(|(_, p)| *p))
            .map_err(|e| Error::rule("prefilter", "<rule set>", e))?;

        Ok(Self {
            rules,
            prefilter,
            marker_scope: MarkerScope::NextDeclaration,
            module_services: false,
        })
    }

    /// Set how long markers stay pending
    pub fn with_marker_scope(mut self, scope: MarkerScope) -> Self {
        self.marker_scope = scope;
        self
    }

    /// Treat top-level functions in service-like files as service methods
    pub fn with_module_services(mut self, enabled: bool) -> Self {
        self.module_services = enabled;
        self
    }

    pub fn marker_scope(&self) -> MarkerScope {
        self.marker_scope
    }

    pub fn module_services(&self) -> bool {
        self.module_services
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate over the rules
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// All matches on one line, ordered by phase, then column, then rule order
    pub fn match_line(&self, line_number: usize, text: &str) -> Vec<RuleMatch> {
        let mut matches = Vec::new();

        for index in self.prefilter.matches(text).iter() {
            let rule = &self.rules[index];
            let names: Vec<&str> = rule.regex.capture_names().flatten().collect();
            for caps in rule.regex.captures_iter(text) {
                let column = caps.get(0).map(|m| m.start()).unwrap_or(0);
                let captures = names
                    .iter()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.to_string(), m.as_str().trim().to_string()))
                    })
                    .collect();
                matches.push(RuleMatch {
                    role: rule.role,
                    line: line_number,
                    column,
                    rule_index: index,
                    captures,
                });
            }
        }

        matches.sort_by_key(|m| (m.role.phase(), m.column, m.rule_index));
        matches
    }

    /// Roles matching a piece of text; handy for checking rule tables
    pub fn roles_matching(&self, text: &str) -> Vec<Role> {
        self.match_line(1, text).into_iter().map(|m| m.role).collect()
    }
}
