// Cross-framework fallback analyzer
//
// Used when detection is inconclusive or names an unsupported framework. The
// rules only cover conventions shared by many stacks, so results are partial.

use super::FrameworkAnalyzer;
use crate::error::Result;
use crate::parser::{ConstraintRule, Role, RuleSet};

const RULES: &[(Role, &str)] = &[
    (Role::ScopeEnd, r"^[^\s#/*@)\]]"),
    // Declarations
    (
        Role::ClassDecl,
        r"^\s*(?:(?:public|private|protected|internal|abstract|final|export|default|data|open|sealed|static)\s+)*class\s+(?P<name>[A-Za-z_]\w*)",
    ),
    (Role::ClassDecl, r"^type\s+(?P<name>[A-Z]\w*)\s+struct\s*\{"),
    (
        Role::ModelDecl,
        r"^\s*class\s+(?P<name>\w+)\s*(?:\(|<|extends)\s*[^{:]*\b(?:Model|ApplicationRecord|DeclarativeBase|BaseModel)\b",
    ),
    (Role::ModelMarker, r"@(?:Entity|Document)\b|^\s*\[Table\("),
    (Role::MethodDecl, r"^\s*(?:async\s+)?def\s+(?:self\.)?(?P<name>\w+)"),
    (
        Role::MethodDecl,
        r"^\s*(?:export\s+)?(?:async\s+)?function\s+(?P<name>\w+)\s*\(",
    ),
    (Role::MethodDecl, r"^func\s+(?:\([^)]*\)\s*)?(?P<name>\w+)\s*\("),
    (
        Role::MethodDecl,
        r"^\s*(?:(?:public|private|protected|static)\s+)*function\s+(?P<name>\w+)\s*\(",
    ),
    (
        Role::MethodDecl,
        r"^\s+(?:(?:public|private|protected|internal|static|final|async|override|virtual|suspend)\s+)+[\w<>\[\], ?]*?\s*(?:fun\s+)?(?P<name>\w+)\s*\([^;]*$",
    ),
    (
        Role::FieldDecl,
        r"^\s+(?:private|protected|public)\s+(?:final\s+)?(?P<type>[\w<>, ?]+?)\s+(?P<name>\w+)\s*(?:=[^;]*)?;",
    ),
    (
        Role::FieldDecl,
        r"^\s+(?P<name>[A-Z]\w*)\s+(?P<type>[\w.*\[\]]+)\s+`",
    ),
    (
        Role::FieldDecl,
        r"^\s+(?P<name>[a-z_]\w*)\s*(?::\s*(?P<type>[\w\[\]., ]+?))?\s*=\s*(?:\w+\.)?(?:Column|Field|models\.\w+)\(",
    ),
    // Constraints
    (Role::Constraint(ConstraintRule::NotNull), r"@NotNull\b"),
    (Role::Constraint(ConstraintRule::NotNull), r"\bnullable\s*=\s*False\b"),
    (
        Role::Constraint(ConstraintRule::NotNull),
        r#"\b(?:validate|binding):"[^"]*\brequired\b"#,
    ),
    (Role::Constraint(ConstraintRule::NotBlank), r"@NotBlank\b"),
    (Role::Constraint(ConstraintRule::Email), r"@Email\b|\bEmailField\(|\bEmailStr\b"),
    (
        Role::Constraint(ConstraintRule::Email),
        r#"\b(?:validate|binding):"[^"]*\bemail\b"#,
    ),
    (Role::Constraint(ConstraintRule::Unique), r"\bunique\s*[=:]\s*[Tt]rue\b"),
    (Role::Constraint(ConstraintRule::Size), r"@Size\((?P<args>[^)]*)\)"),
    (
        Role::Constraint(ConstraintRule::MaxLength),
        r"\bmax_length\s*=\s*(?P<value>\d+)",
    ),
    // Routes
    (
        Role::RouteMarker(None),
        r#"@(?P<method>GET|POST|PUT|PATCH|DELETE|Get|Post|Put|Patch|Delete)(?:Mapping)?\(\s*["'](?P<path>[^"']*)["']"#,
    ),
    (
        Role::RouteMarker(None),
        r#"\[Http(?P<method>Get|Post|Put|Patch|Delete)(?:\(\s*"(?P<path>[^"]*)"\s*\))?\]"#,
    ),
    (
        Role::RouteStatement(None),
        r#"\b(?:app|router|r|e|g|api|group|Route|mux|server|http)(?:\.|::)(?P<method>get|post|put|patch|delete|GET|POST|PUT|PATCH|DELETE|Get|Post|Put|Patch|Delete|HandleFunc)\(\s*['"`](?P<path>/[^'"`]*)['"`](?:\s*,\s*(?P<handler>[\w.]+)\s*[,)])?"#,
    ),
    (
        Role::AuthRequired,
        r"@(?:login_required|jwt_required|Authorize|authenticated|RolesAllowed|PreAuthorize)\b|^\s*\[Authorize\b",
    ),
    (
        Role::RoleRequirement,
        r#"\[Authorize\(Roles\s*=\s*"(?P<role>[^"]+)""#,
    ),
    // Workflow markers
    (
        Role::Transactional,
        r"@(?:Transactional|transaction\.atomic)\b|^\s*\[Transaction\]",
    ),
    (Role::Async, r"@(?:Async|shared_task|celery\.task|job)\b"),
    (Role::Scheduled, r"@(?:Scheduled|periodic_task|cron)\b"),
    (Role::Retry, r"@(?:Retryable|retry)\b"),
    // Service behavior
    (
        Role::Dependency,
        r"\b(?P<type>[A-Z]\w*(?:Service|Repository|Client|Gateway))\s+\w+\s*[;,)=]",
    ),
    (
        Role::Dependency,
        r"\bself\.\w+\s*=\s*(?P<type>[A-Z]\w*(?:Service|Repository|Client|Gateway))\(",
    ),
    (
        Role::PersistenceMutation,
        r"\.(?P<call>save|create|insert|insertOne|update|updateOne|delete|deleteOne|destroy|persist|merge|remove|commit|Save|Create|Update|Delete|SaveChanges)\(",
    ),
    (
        Role::HttpClient,
        r#"\b(?:requests|httpx|axios|fetch|got|http|https|HTTParty|Faraday|RestClient|restTemplate|webClient|client|httpClient|HttpClient)\b(?:\.\w+)*\(\s*(?:\w+\s*,\s*)?[`'"](?P<target>https?://[^`'"]+)[`'"]"#,
    ),
    (
        Role::MessagePublish,
        r#"\b(?:publish|send_message|sendToQueue|produce|basic_publish)\(\s*['"](?P<topic>[^'"]+)['"]"#,
    ),
    (
        Role::MessagePublish,
        r"\b(?P<topic>\w+)\.(?:delay|apply_async|perform_later|perform_async)\b",
    ),
    (
        Role::MessageSubscribe,
        r#"\b(?:subscribe|consume|basic_consume)\(\s*['"](?P<topic>[^'"]+)['"]"#,
    ),
    (
        Role::ExternalSdk,
        r#"(?:import|require|from|using)\s*\(?\s*['"]?(?P<name>boto3|stripe|twilio|sendgrid|@sendgrid/mail|openai|aws-sdk|@aws-sdk/[\w-]+|firebase[-_]admin|slack_sdk|Stripe|Amazon)\b"#,
    ),
];

/// Fallback analyzer for unrecognized stacks
pub struct GenericAnalyzer {
    rules: RuleSet,
}

impl GenericAnalyzer {
    /// Create a new generic analyzer
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: RuleSet::compile(RULES)?.with_module_services(true),
        })
    }
}

impl FrameworkAnalyzer for GenericAnalyzer {
    fn id(&self) -> &'static str {
        super::GENERIC_ID
    }

    fn language(&self) -> &'static str {
        "unknown"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "js", "ts", "java", "kt", "rb", "go", "php", "cs"]
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }
}
