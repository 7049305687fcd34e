// Rules and module resolution shared by the Python plugins

use super::lexical_join;
use crate::error::Result;
use crate::model::AssociationKind;
use crate::parser::{ConstraintRule, Role, RuleSet};
use std::path::{Path, PathBuf};

/// Manifests Python projects declare dependencies in
pub(crate) const MANIFESTS: &[&str] = &["requirements.txt", "pyproject.toml", "Pipfile", "setup.py"];

/// Structure, workflow and integration rules every Python framework shares
pub(crate) const COMMON: &[(Role, &str)] = &[
    // Anything at column zero ends a class body
    (Role::ScopeEnd, r"^[^\s#)\]}]"),
    (Role::ClassDecl, r"^class\s+(?P<name>\w+)"),
    (Role::MethodDecl, r"^\s*(?:async\s+)?def\s+(?P<name>\w+)\s*\("),
    (Role::Transactional, r"@(?:transaction\.atomic|transactional)\b"),
    (
        Role::TransactionBlock,
        r"\bwith\s+(?:transaction\.atomic\(|(?:db\.)?session\.begin\()",
    ),
    (Role::Async, r"@(?:shared_task|\w+\.task|dramatiq\.actor|job)\b"),
    (
        Role::Scheduled,
        r"@(?:periodic_task|\w+\.scheduled_job|repeat_every|scheduler\.task)\b",
    ),
    (Role::Retry, r"@(?:retry|backoff\.on_exception|tenacity\.retry)\b"),
    (Role::Retry, r"^\s*@.*\b(?:autoretry_for|max_retries|retry_backoff)\s*="),
    (
        Role::PersistenceMutation,
        r"\.objects\.(?P<call>create|update|delete|bulk_create|bulk_update|get_or_create|update_or_create)\w*\(",
    ),
    (Role::PersistenceMutation, r"\.(?P<call>save|delete)\(\s*\)"),
    (
        Role::PersistenceMutation,
        r"\b(?:db\.)?session\.(?P<call>add|add_all|delete|merge|commit)\(",
    ),
    (
        Role::HttpClient,
        r#"\b(?:requests|httpx|session|client)\.(?:get|post|put|patch|delete|request)\(\s*(?:["'](?:GET|POST|PUT|PATCH|DELETE)["']\s*,\s*)?f?["'](?P<target>https?://[^"']+)["']"#,
    ),
    (Role::MessagePublish, r"\b(?P<topic>\w+)\.(?:delay|apply_async)\("),
    (
        Role::MessagePublish,
        r#"\b\w*producer\.send(?:_and_wait)?\(\s*["'](?P<topic>[^"']+)["']"#,
    ),
    (
        Role::MessagePublish,
        r#"\bbasic_publish\([^)]*\brouting_key\s*=\s*["'](?P<topic>[^"']+)["']"#,
    ),
    (Role::MessageSubscribe, r#"\bKafkaConsumer\(\s*["'](?P<topic>[^"']+)["']"#),
    (
        Role::MessageSubscribe,
        r#"\bbasic_consume\([^)]*\bqueue\s*=\s*["'](?P<topic>[^"']+)["']"#,
    ),
    (
        Role::ExternalSdk,
        r"^\s*(?:import|from)\s+(?P<name>boto3|stripe|twilio|sendgrid|openai|firebase_admin|slack_sdk|google\.cloud)\b",
    ),
    (
        Role::Dependency,
        r"\bself\.\w+\s*(?::\s*\w+)?\s*=\s*(?P<type>[A-Z]\w*(?:Service|Repository|Client|Gateway|Repo|Dao))\b",
    ),
    (
        Role::ModuleImport,
        r"^from\s+(?P<module>[\w.]+)\s+import\s+\(?\s*(?P<name>\w+(?:\s+as\s+\w+)?(?:\s*,\s*\w+(?:\s+as\s+\w+)?)*)",
    ),
];

/// SQLAlchemy declarative models
pub(crate) const SQLALCHEMY: &[(Role, &str)] = &[
    (
        Role::ModelDecl,
        r"^class\s+(?P<name>\w+)\s*\([^)]*\b(?:db\.Model|Base|DeclarativeBase|SQLModel)\b",
    ),
    (
        Role::FieldDecl,
        r"^\s+(?P<name>\w+)\s*=\s*(?:db\.|sa\.)?Column\(\s*(?P<type>(?:db\.|sa\.)?[A-Z]\w*)?",
    ),
    (Role::FieldDecl, r"^\s+(?P<name>\w+)\s*:\s*Mapped\[(?P<type>[^\]]+)\]"),
    (Role::Constraint(ConstraintRule::NotNull), r"\bnullable\s*=\s*False\b"),
    (Role::Constraint(ConstraintRule::Unique), r"\bunique\s*=\s*True\b"),
    (Role::Constraint(ConstraintRule::MaxLength), r"\bString\(\s*(?P<value>\d+)"),
    (
        Role::Association(AssociationKind::HasMany),
        r#"=\s*(?:db\.)?relationship\(\s*["'](?P<target>\w+)["']"#,
    ),
    (
        Role::Association(AssociationKind::BelongsTo),
        r#"\bForeignKey\(\s*["'](?P<target>\w+)\."#,
    ),
];

/// Compile a Python rule table from its parts
pub(crate) fn compile(parts: &[&[(Role, &'static str)]]) -> Result<RuleSet> {
    let table: Vec<(Role, &str)> = parts.concat();
    Ok(RuleSet::compile(&table)?.with_module_services(true))
}

/// Files a Python import may refer to, best first
///
/// Relative imports resolve from the importing file's package; absolute ones
/// are tried against every enclosing directory up to the repository root.
/// `from pkg import name` prefers `pkg/name.py` over `pkg.py`.
pub(crate) fn module_candidates(from: &Path, module: &str, binding: Option<&str>) -> Vec<PathBuf> {
    let dir = from.parent().unwrap_or_else(|| Path::new(""));
    let dots = module.chars().take_while(|c| *c == '.').count();
    let rest = module[dots..].replace('.', "/");

    let bases: Vec<PathBuf> = if dots > 0 {
        let up = "../".repeat(dots - 1);
        vec![lexical_join(dir, &format!("{}{}", up, rest))]
    } else {
        dir.ancestors().map(|ancestor| lexical_join(ancestor, &rest)).collect()
    };

    let mut candidates = Vec::new();
    for base in bases {
        let mut push = |path: PathBuf| {
            if !path.as_os_str().is_empty() && !candidates.contains(&path) {
                candidates.push(path);
            }
        };
        if let Some(name) = binding {
            push(base.join(format!("{}.py", name)));
            push(base.join(name).join("__init__.py"));
        }
        if !rest.is_empty() {
            push(PathBuf::from(format!("{}.py", base.display())));
        }
        push(base.join("__init__.py"));
    }
    candidates
}
