// Domain grouping
//
// Groups components into business domains based on their names and the
// directories they live in, stripping conventional layer words
// ("controllers", "UserService", "order_routes") to get at the domain noun.

use std::path::Path;

/// Name used when no domain can be derived at all
pub const FALLBACK_DOMAIN: &str = "Application";

/// Conventional architectural layer of a directory or name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layer {
    /// Data models (models/, schemas/, entities/)
    Models,
    /// View/presentation layer (views/, templates/, pages/)
    Views,
    /// Service/business logic (services/, handlers/, controllers/)
    Services,
    /// Utility functions (utils/, helpers/, lib/)
    Utils,
    /// API endpoints (api/, routes/, endpoints/)
    Api,
    /// Tests (tests/, test/, testing/)
    Tests,
    /// Configuration (config/, settings/, conf/)
    Config,
    /// Source roots and entry points (src/, main/, app/)
    Core,
    /// Anything else, usually a domain name
    #[default]
    Generic,
}

impl Layer {
    /// Detect layer from a directory name or name part
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        match lower.as_str() {
            "models" | "model" | "schemas" | "schema" | "entities" | "entity" | "domain"
            | "dto" | "dtos" | "serializers" | "serializer" | "migrate" | "db" => Layer::Models,
            "views" | "view" | "viewset" | "viewsets" | "templates" | "pages" | "ui" => {
                Layer::Views
            }
            "services" | "service" | "impl" | "handlers" | "handler" | "controllers"
            | "controller" | "actions" | "repository" | "repositories" | "repo" | "dao"
            | "manager" | "client" | "gateway" | "jobs" | "job" | "workers" | "worker"
            | "tasks" | "task" | "listeners" | "listener" | "consumer" | "producer" => {
                Layer::Services
            }
            "utils" | "util" | "helpers" | "helper" | "lib" | "common" | "shared" => Layer::Utils,
            "api" | "routes" | "route" | "routers" | "router" | "endpoints" | "endpoint"
            | "resources" | "resource" | "urls" | "rest" | "web" | "http" => Layer::Api,
            "tests" | "test" | "testing" | "specs" | "spec" | "__tests__" => Layer::Tests,
            "config" | "settings" | "conf" | "configuration" | "initializers" => Layer::Config,
            "core" | "main" | "app" | "apps" | "application" | "src" | "java" | "kotlin"
            | "com" | "org" | "net" | "io" | "index" | "server" | "module" | "modules"
            | "init" | "__init__" | "internal" | "pkg" => Layer::Core,
            // API versions (v1, v2)
            v if v.len() > 1
                && v.starts_with('v')
                && v[1..].chars().all(|c| c.is_ascii_digit()) =>
            {
                Layer::Api
            }
            _ => Layer::Generic,
        }
    }

    /// Whether the name carries domain meaning
    pub fn is_domain(&self) -> bool {
        matches!(self, Layer::Generic)
    }
}

/// Split an identifier into lower-case words
///
/// Handles `snake_case`, `kebab-case`, dotted names, `camelCase` and
/// acronyms (`HTTPClient` -> `http`, `client`).
pub fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = name.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            let prev_upper = chars[i - 1].is_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Singular form of an English noun, good enough for identifiers
pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.len() > 3 && lower.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if lower.ends_with("sses")
        || lower.ends_with("xes")
        || lower.ends_with("ches")
        || lower.ends_with("shes")
    {
        word[..word.len() - 2].to_string()
    } else if lower.len() > 2
        && lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
    {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `user_service` -> `UserService`
pub fn pascal_case(name: &str) -> String {
    words(name).iter().map(|w| capitalize(w)).collect()
}

/// `OrderItem` -> `Order Item`
pub fn humanize(name: &str) -> String {
    words(name)
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Domain noun of a component name, e.g. `OrderItemsController` -> `Order Item`
pub fn domain_of(name: &str) -> Option<String> {
    let mut parts = words(name);
    while parts
        .last()
        .map(|w| !Layer::from_name(w).is_domain())
        .unwrap_or(false)
    {
        parts.pop();
    }
    while parts
        .first()
        .map(|w| !Layer::from_name(w).is_domain())
        .unwrap_or(false)
    {
        parts.remove(0);
    }
    if parts.is_empty() {
        return None;
    }
    if let Some(last) = parts.last_mut() {
        *last = singularize(last);
    }
    Some(
        parts
            .iter()
            .map(|w| capitalize(w))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Domain derived from a file location, walking from the file stem upwards
pub fn domain_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    // `user.service.ts` -> `user`
    let stem = stem.split('.').next().unwrap_or(stem);
    if let Some(domain) = domain_of(stem) {
        return Some(domain);
    }

    path.parent()?
        .components()
        .rev()
        .filter_map(|c| c.as_os_str().to_str())
        .find_map(domain_of)
}

/// Boundary name for a component: its own name first, then its location
pub fn domain_for(component: Option<&str>, path: &Path) -> String {
    component
        .and_then(domain_of)
        .or_else(|| domain_from_path(path))
        .unwrap_or_else(|| FALLBACK_DOMAIN.to_string())
}
