// FastAPI analyzer

use super::{python, FrameworkAnalyzer};
use crate::analysis::FrameworkSignature;
use crate::error::Result;
use crate::model::ParameterSource;
use crate::parser::{ConstraintRule, Role, RuleSet};
use std::path::{Path, PathBuf};

const RULES: &[(Role, &str)] = &[
    (
        Role::RouteMarker(None),
        r#"@\w+\.(?P<method>get|post|put|patch|delete|head|options)\(\s*["'](?P<path>[^"']*)["']"#,
    ),
    (
        Role::RouteMarker(None),
        r#"@\w+\.api_route\(\s*["'](?P<path>[^"']*)["'][^)]*\bmethods\s*=\s*\[(?P<method>[^\]]*)\]"#,
    ),
    (
        Role::FilePrefix,
        r#"\bAPIRouter\([^)]*\bprefix\s*=\s*["'](?P<path>[^"']*)["']"#,
    ),
    (
        Role::AuthScope,
        r"\bAPIRouter\([^)]*\bdependencies\s*=\s*\[[^\]]*\b(?:Depends|Security)\(\s*(?:get_current_\w+|oauth2_scheme|verify_\w+|require_\w+|auth\w*)",
    ),
    (
        Role::RouteMount,
        r#"\.include_router\(\s*(?P<target>[\w.]+)(?:[^)]*\bprefix\s*=\s*["'](?P<path>[^"']*)["'])?"#,
    ),
    // Dependencies in the handler signature
    (
        Role::HandlerAuth,
        r"\b(?:Depends|Security)\(\s*(?:get_current_\w+|oauth2_scheme|verify_\w+|require_\w+|auth\w*)\b(?:\s*,\s*scopes\s*=\s*\[(?P<role>[^\]]*)\])?",
    ),
    (
        Role::Parameter(ParameterSource::Body),
        r"^\s*(?:async\s+)?def\s+\w+\s*\(.*?\b(?P<name>\w+)\s*:\s*(?P<type>[A-Z]\w*)\s*(?:=\s*Body\(|[,)])",
    ),
    (
        Role::Parameter(ParameterSource::Query),
        r"\b(?P<name>\w+)\s*:\s*(?P<type>[\w\[\]|]+)\s*=\s*Query\(",
    ),
    (
        Role::Parameter(ParameterSource::Header),
        r"\b(?P<name>\w+)\s*:\s*(?P<type>[\w\[\]|]+)\s*=\s*Header\(",
    ),
    // Pydantic schemas
    (
        Role::ModelDecl,
        r"^class\s+(?P<name>\w+)\s*\([^)]*\b(?:BaseModel|SQLModel)\b",
    ),
    (
        Role::FieldDecl,
        r"^\s+(?P<name>[a-z_]\w*)\s*:\s*(?P<type>[A-Z][\w\[\], |.]*?|int|str|float|bool|list\[[^\]]*\]|dict\[[^\]]*\])\s*(?:=|$)",
    ),
    (Role::Constraint(ConstraintRule::Email), r":\s*EmailStr\b"),
    (Role::Constraint(ConstraintRule::MinLength), r"\bmin_length\s*=\s*(?P<value>\d+)"),
    (Role::Constraint(ConstraintRule::MaxLength), r"\bmax_length\s*=\s*(?P<value>\d+)"),
    (Role::Constraint(ConstraintRule::Min), r"\bge\s*=\s*(?P<value>-?\d+)"),
    (Role::Constraint(ConstraintRule::Max), r"\ble\s*=\s*(?P<value>-?\d+)"),
    (Role::Constraint(ConstraintRule::Positive), r"\bgt\s*=\s*0\b"),
    (
        Role::Constraint(ConstraintRule::Pattern),
        r#"\b(?:pattern|regex)\s*=\s*r?(?P<value>"[^"]*"|'[^']*')"#,
    ),
];

/// Analyzer for FastAPI applications
pub struct FastApiAnalyzer {
    rules: RuleSet,
}

impl FastApiAnalyzer {
    /// Create a new FastAPI analyzer
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: python::compile(&[RULES, python::SQLALCHEMY, python::COMMON])?,
        })
    }
}

impl FrameworkAnalyzer for FastApiAnalyzer {
    fn id(&self) -> &'static str {
        "fastapi"
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
                r#"(?im)(?:^\s*|["'])fastapi(?:\s*\[[^\]]*\])?\s*(?:(?:==|>=|~=|=)\s*["']?\^?(?P<version>\d+(?:\.\d+)*)|[<>!"',;]|$)"#,
            ],
            layout: &["main.py", "app/main.py", "*/routers"],
        })
    }

    fn module_candidates(&self, from: &Path, module: &str, binding: Option<&str>) -> Vec<PathBuf> {
        python::module_candidates(from, module, binding)
    }
}
