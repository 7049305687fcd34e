// Architecture model produced by an analysis run
//
// Every type here is a plain serializable record. Entities are created during
// a discovery pass and never mutated afterwards; the rendering layer consumes
// them without depending on any analysis code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where an entity was found
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// File path relative to the repository root
    pub file: PathBuf,
    /// 1-based line number
    pub line: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// The discovery signal that justified an entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Human-readable signal name, e.g. `security rule /admin/**`
    pub signal: String,
    pub file: PathBuf,
    pub line: usize,
}

impl Provenance {
    pub fn new(signal: impl Into<String>, location: &SourceLocation) -> Self {
        Self {
            signal: signal.into(),
            file: location.file.clone(),
            line: location.line,
        }
    }
}

/// HTTP method of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    /// Route accepts any method (e.g. Django `path()` entries)
    Any,
}

impl HttpMethod {
    /// Parse a method name case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().trim_matches(|c| c == '\'' || c == '"').to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" | "DESTROY" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            "ANY" | "ALL" | "MATCH" => Some(Self::Any),
            _ => None,
        }
    }

    /// Whether requests with this method change server state
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request parameter comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSource {
    Path,
    Query,
    Body,
    Header,
}

/// A declared endpoint parameter
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub source: ParameterSource,
    /// Declared type, when the framework states one
    pub type_name: Option<String>,
}

/// An HTTP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: HttpMethod,
    /// Normalized path template, always starting with `/`
    pub path: String,
    pub location: SourceLocation,
    /// Controller or class owning the handler, if any
    pub controller: Option<String>,
    /// Handler function or action name
    pub handler: String,
    pub requires_auth: bool,
    /// Roles required to call the endpoint (upper case, no `ROLE_` prefix)
    pub roles: Vec<String>,
    pub parameters: Vec<Parameter>,
}

impl Endpoint {
    /// Stable identity used for deduplication and boundary membership
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            method: self.method,
            path: self.path.clone(),
        }
    }
}

/// Identity of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub method: HttpMethod,
    pub path: String,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A constraint declared on a model field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    NotNull,
    NotBlank,
    Unique,
    Email,
    Positive,
    Past,
    Future,
    Size { min: Option<u64>, max: Option<u64> },
    Min { value: i64 },
    Max { value: i64 },
    Pattern { regex: String },
}

/// A field of a data model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub type_name: Option<String>,
    pub constraints: Vec<Constraint>,
}

impl Field {
    pub fn new(name: impl Into<String>, type_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            type_name,
            constraints: Vec::new(),
        }
    }

    /// Add a constraint, folding size bounds into a single entry
    pub fn add_constraint(&mut self, constraint: Constraint) {
        if let Constraint::Size { min, max } = &constraint {
            if let Some(Constraint::Size {
                min: existing_min,
                max: existing_max,
            }) = self
                .constraints
                .iter_mut()
                .find(|c| matches!(c, Constraint::Size { .. }))
            {
                if min.is_some() {
                    *existing_min = *min;
                }
                if max.is_some() {
                    *existing_max = *max;
                }
                return;
            }
        }
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }
}

/// Cardinality of a model association
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    HasMany,
    HasOne,
    BelongsTo,
    ManyToMany,
}

/// An association between two models
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Association {
    pub kind: AssociationKind,
    /// Target model name
    pub target: String,
}

/// A persisted data model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub location: SourceLocation,
    /// Fields; names are unique within a model
    pub fields: Vec<Field>,
    pub associations: Vec<Association>,
}

impl Model {
    pub fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            location,
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Add a field unless one with the same name exists; constraints are merged
    pub fn add_field(&mut self, field: Field) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => {
                if existing.type_name.is_none() {
                    existing.type_name = field.type_name;
                }
                for constraint in field.constraints {
                    existing.add_constraint(constraint);
                }
            }
            None => self.fields.push(field),
        }
    }

    pub fn add_association(&mut self, association: Association) {
        if !self.associations.contains(&association) {
            self.associations.push(association);
        }
    }
}

/// Service classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    BusinessLogic,
    Infrastructure,
}

impl ServiceKind {
    /// Classify a service by its name
    pub fn classify(name: &str) -> Self {
        const INFRASTRUCTURE: [&str; 14] = [
            "repository", "repo", "dao", "client", "gateway", "adapter", "config",
            "configuration", "cache", "producer", "consumer", "publisher", "store", "mapper",
        ];
        let lower = name.to_ascii_lowercase();
        if INFRASTRUCTURE.iter().any(|suffix| lower.ends_with(suffix)) {
            ServiceKind::Infrastructure
        } else {
            ServiceKind::BusinessLogic
        }
    }
}

/// An operation exposed by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMethod {
    pub name: String,
    pub line: usize,
    /// Declared transactional (annotation, decorator or transaction block)
    pub transactional: bool,
    /// Runs asynchronously (fire-and-forget)
    pub is_async: bool,
    /// Runs on a schedule
    pub scheduled: bool,
    /// Retried on failure
    pub retry: bool,
    /// Persistence mutation calls found in the body, in order
    pub persistence_calls: Vec<String>,
}

impl ServiceMethod {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
            transactional: false,
            is_async: false,
            scheduled: false,
            retry: false,
            persistence_calls: Vec::new(),
        }
    }
}

/// A service component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub location: SourceLocation,
    /// Names of injected collaborators
    pub dependencies: Vec<String>,
    pub kind: ServiceKind,
    pub methods: Vec<ServiceMethod>,
}

/// What kind of party an actor is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Human,
    System,
    External,
}

/// Someone or something interacting with the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub kind: ActorKind,
    pub requires_auth: bool,
    /// Role key granting access, when the actor stems from a role requirement
    pub access_role: Option<String>,
    pub provenance: Vec<Provenance>,
}

/// Kind of system boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    External,
    Internal,
    Data,
}

/// A component that belongs to a boundary
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ComponentRef {
    Endpoint(EndpointKey),
    Model(String),
    Service(String),
}

/// A named architectural subsystem or external system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBoundary {
    pub name: String,
    pub kind: BoundaryKind,
    pub components: Vec<ComponentRef>,
}

/// One end of a relationship
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum NodeRef {
    Actor(String),
    Boundary(String),
}

/// Meaning of a relationship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// An actor uses a subsystem
    Uses,
    /// A subsystem calls another one synchronously
    Calls,
    /// A subsystem sends messages consumed by another
    Publishes,
    /// A subsystem reads and writes a data store
    Persists,
    /// A subsystem depends on another in-process
    DependsOn,
    /// A system actor starts work in a subsystem
    Triggers,
}

/// How two nodes communicate
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum Mechanism {
    Http,
    MessageQueue(String),
    Database,
    InProcess,
    Schedule,
    Sdk(String),
}

/// A directed edge between actors and boundaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: NodeRef,
    pub to: NodeRef,
    pub kind: RelationshipKind,
    pub mechanism: Mechanism,
}

/// Whether a step waits for its work to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    Awaited,
    FireAndForget,
}

/// Whether a step happens once or repeatedly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    OneShot,
    Recurring,
}

/// One step of a main scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// 1-based position within the scenario
    pub number: usize,
    pub description: String,
    pub execution: Execution,
    pub recurrence: Recurrence,
    pub retried: bool,
}

/// An alternate flow branching from a main-scenario step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Identifier such as `2a`
    pub id: String,
    pub condition: String,
    pub outcome: String,
}

/// A business process synthesized from code signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseCase {
    /// Stable identifier, e.g. `UC-001`
    pub id: String,
    pub name: String,
    pub primary_actor: String,
    pub secondary_actors: Vec<String>,
    /// Boundary the use case runs in
    pub boundary: String,
    pub preconditions: Vec<String>,
    pub postconditions: Vec<String>,
    pub main_scenario: Vec<ScenarioStep>,
    pub extensions: Vec<Extension>,
    /// Source files the use case was derived from
    pub provenance: Vec<PathBuf>,
}

/// Detected implementation stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    pub framework_id: String,
    pub language: String,
    pub version: Option<String>,
    /// Weighted detection score in `[0, 1]`
    pub confidence: f64,
}

impl TechStack {
    /// Fallback stack used when no framework is recognized
    pub fn generic(confidence: f64) -> Self {
        Self {
            framework_id: crate::plugins::GENERIC_ID.to_string(),
            language: "unknown".to_string(),
            version: None,
            confidence,
        }
    }
}
