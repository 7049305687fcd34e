// Express analyzer (JavaScript and TypeScript)

use super::{lexical_join, FrameworkAnalyzer};
use crate::analysis::FrameworkSignature;
use crate::error::Result;
use crate::model::AssociationKind;
use crate::parser::{ConstraintRule, MarkerScope, Role, RuleSet};
use std::path::{Path, PathBuf};

const RULES: &[(Role, &str)] = &[
    (Role::ScopeEnd, r"^\s*\}\s*(?:[),;]|$)"),
    // Middleware in route arguments
    (
        Role::AuthRequired,
        r"\b(?:authenticate|requireAuth|isAuthenticated|ensureAuthenticated|verifyToken|authMiddleware|auth|protect)\b\s*(?:\(|,)",
    ),
    (Role::AuthRequired, r"\bpassport\.authenticate\("),
    (
        Role::RoleRequirement,
        r"\b(?:authorize|requireRoles?|hasRole|checkRole|permit)\(\s*(?P<role>[^)]*)\)",
    ),
    (
        Role::AuthScope,
        r"^\s*(?:app|router|\w+Router)\.use\(\s*(?:authenticate|requireAuth|isAuthenticated|ensureAuthenticated|verifyToken|authMiddleware|auth|protect|passport\.authenticate\([^)]*\))\s*\)",
    ),
    // Routing
    (
        Role::RouteStatement(None),
        r#"^\s*(?:app|router|\w+Router|api)\.(?P<method>get|post|put|patch|delete|head|options|all)\(\s*['"`](?P<path>[^'"`]*)['"`]\s*(?:,\s*(?P<handler>.+?))?\)?\s*;?\s*$"#,
    ),
    (
        Role::RouteMount,
        r#"^\s*(?:app|router|\w+Router|api)\.use\(\s*['"`](?P<path>[^'"`]*)['"`]\s*,(?:.*?,)?\s*require\(\s*['"](?P<module>[^'"]+)['"]\s*\)"#,
    ),
    (
        Role::RouteMount,
        r#"^\s*(?:app|router|\w+Router|api)\.use\(\s*['"`](?P<path>[^'"`]*)['"`]\s*,(?:.*,)?\s*(?P<target>[A-Za-z_$][\w$.]*)\s*\)\s*;?\s*$"#,
    ),
    (
        Role::ModuleImport,
        r#"\b(?:const|let|var)\s+(?P<name>[\w$]+)\s*=\s*require\(\s*['"](?P<module>[^'"]+)['"]\s*\)"#,
    ),
    (
        Role::ModuleImport,
        r#"\b(?:const|let|var)\s+\{\s*(?P<name>[^}]+?)\s*\}\s*=\s*require\(\s*['"](?P<module>[^'"]+)['"]"#,
    ),
    (
        Role::ModuleImport,
        r#"^\s*import\s+(?P<name>[\w$]+)\s+from\s+['"](?P<module>[^'"]+)['"]"#,
    ),
    (
        Role::ModuleImport,
        r#"^\s*import\s+\{\s*(?P<name>[^}]+?)\s*\}\s+from\s+['"](?P<module>[^'"]+)['"]"#,
    ),
    // Mongoose and Sequelize models
    (
        Role::ModelDecl,
        r"\b(?:const|let|var)\s+(?P<name>\w+)\s*=\s*new\s+(?:mongoose\.)?Schema\(",
    ),
    (
        Role::ModelDecl,
        r#"\b(?:sequelize|db)\.define\(\s*['"](?P<name>\w+)['"]"#,
    ),
    (
        Role::ModelDecl,
        r"^\s*(?:export\s+)?(?:default\s+)?class\s+(?P<name>\w+)\s+extends\s+(?:Sequelize\.)?Model\b",
    ),
    (
        Role::FieldDecl,
        r"^\s+(?P<name>\w+)\s*:\s*\[?\s*\{\s*type\s*:\s*(?P<type>[\w.\[\]]+)",
    ),
    (
        Role::FieldDecl,
        r"^\s+(?P<name>\w+)\s*:\s*(?P<type>String|Number|Boolean|Date|Buffer|ObjectId|Array|Map|Schema\.Types\.\w+|DataTypes\.\w+|Sequelize\.\w+|\[\w+\])\s*,?\s*$",
    ),
    (
        Role::Constraint(ConstraintRule::NotNull),
        r"\brequired\s*:\s*\[?\s*true\b",
    ),
    (Role::Constraint(ConstraintRule::NotNull), r"\ballowNull\s*:\s*false\b"),
    (Role::Constraint(ConstraintRule::Unique), r"\bunique\s*:\s*true\b"),
    (
        Role::Constraint(ConstraintRule::MinLength),
        r"(?i)\bminlength\s*:\s*\[?\s*(?P<value>\d+)",
    ),
    (
        Role::Constraint(ConstraintRule::MaxLength),
        r"(?i)\bmaxlength\s*:\s*\[?\s*(?P<value>\d+)",
    ),
    (Role::Constraint(ConstraintRule::Min), r"\bmin\s*:\s*\[?\s*(?P<value>-?\d+)"),
    (Role::Constraint(ConstraintRule::Max), r"\bmax\s*:\s*\[?\s*(?P<value>-?\d+)"),
    (
        Role::Constraint(ConstraintRule::Pattern),
        r"\bmatch\s*:\s*\[?\s*(?P<value>/[^/]+/)",
    ),
    (Role::Constraint(ConstraintRule::Email), r"\bisEmail\s*:\s*true\b"),
    (
        Role::Constraint(ConstraintRule::Size),
        r"\blen\s*:\s*\[\s*(?P<min>\d+)\s*,\s*(?P<max>\d+)\s*\]",
    ),
    (
        Role::Association(AssociationKind::HasMany),
        r"\b(?P<name>[A-Z]\w*)\.hasMany\(\s*(?:models\.)?(?P<target>\w+)",
    ),
    (
        Role::Association(AssociationKind::HasOne),
        r"\b(?P<name>[A-Z]\w*)\.hasOne\(\s*(?:models\.)?(?P<target>\w+)",
    ),
    (
        Role::Association(AssociationKind::BelongsTo),
        r"\b(?P<name>[A-Z]\w*)\.belongsTo\(\s*(?:models\.)?(?P<target>\w+)",
    ),
    (
        Role::Association(AssociationKind::ManyToMany),
        r"\b(?P<name>[A-Z]\w*)\.belongsToMany\(\s*(?:models\.)?(?P<target>\w+)",
    ),
    (
        Role::Association(AssociationKind::BelongsTo),
        r#"^\s+\w+\s*:\s*\{[^}]*\bref\s*:\s*['"](?P<target>\w+)['"]"#,
    ),
    (
        Role::Association(AssociationKind::HasMany),
        r#"^\s+\w+\s*:\s*\[\s*\{[^}]*\bref\s*:\s*['"](?P<target>\w+)['"]"#,
    ),
    // Code structure
    (
        Role::ClassDecl,
        r"^\s*(?:export\s+)?(?:default\s+)?class\s+(?P<name>\w+)",
    ),
    (
        Role::MethodDecl,
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s+(?P<name>\w+)\s*\(",
    ),
    (
        Role::MethodDecl,
        r"^\s*(?:export\s+)?(?:const|let)\s+(?P<name>\w+)\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*=>",
    ),
    (
        Role::MethodDecl,
        r"^\s*(?:module\.)?exports\.(?P<name>\w+)\s*=\s*(?:async\s+)?(?:function\b|\()",
    ),
    (
        Role::MethodDecl,
        r"^\s+(?P<name>\w+)\s*:\s*(?:async\s+)?(?:function\s*)?\([^)]*\)\s*(?:=>|\{)",
    ),
    (
        Role::MethodDecl,
        r"^\s+(?:static\s+)?(?:async\s+)?(?P<name>[a-zA-Z_]\w*)\s*\([^)]*\)\s*\{",
    ),
    // Background work
    (Role::Scheduled, r"\bcron\.schedule\("),
    (Role::Scheduled, r"\b(?:schedule\.scheduleJob|new\s+CronJob|agenda\.every)\("),
    (Role::Scheduled, r"\bsetInterval\("),
    // Service behavior
    (
        Role::Dependency,
        r"\b(?:const|let|var)\s+(?P<name>\w+(?:Service|Repository|Client|Gateway))\s*=\s*require\(",
    ),
    (
        Role::Dependency,
        r"^\s*import\s+(?P<name>\w+(?:Service|Repository|Client|Gateway))\s+from\b",
    ),
    (
        Role::Dependency,
        r"\bnew\s+(?P<type>[A-Z]\w*(?:Service|Repository|Client|Gateway))\(",
    ),
    (
        Role::PersistenceMutation,
        r"\.(?P<call>save|create|insertMany|updateOne|updateMany|findByIdAndUpdate|findOneAndUpdate|deleteOne|deleteMany|findByIdAndDelete|destroy|bulkCreate|upsert|update|remove)\(",
    ),
    (
        Role::TransactionBlock,
        r"\b(?:sequelize\.transaction|prisma\.\$transaction|session\.startTransaction|withTransaction)\(",
    ),
    (
        Role::HttpClient,
        r#"\b(?:axios|got|superagent|needle)(?:\.(?:get|post|put|patch|delete|request))?\(\s*[`'"](?P<target>https?://[^`'"]+)[`'"]"#,
    ),
    (
        Role::HttpClient,
        r#"\bfetch\(\s*[`'"](?P<target>https?://[^`'"]+)[`'"]"#,
    ),
    (
        Role::MessagePublish,
        r#"\b(?:sendToQueue|publish)\(\s*['"](?P<topic>[^'"]+)['"]"#,
    ),
    (
        Role::MessagePublish,
        r#"\bproducer\.send\(\s*\{\s*topic\s*:\s*['"](?P<topic>[^'"]+)['"]"#,
    ),
    (Role::MessagePublish, r"\b(?P<topic>[a-z]\w*)Queue\.add\("),
    (
        Role::MessageSubscribe,
        r#"\bconsume\(\s*['"](?P<topic>[^'"]+)['"]"#,
    ),
    (
        Role::MessageSubscribe,
        r#"\bconsumer\.subscribe\(\s*\{\s*topics?\s*:\s*\[?\s*['"](?P<topic>[^'"]+)['"]"#,
    ),
    (
        Role::MessageSubscribe,
        r#"\bnew\s+Worker\(\s*['"](?P<topic>[^'"]+)['"]"#,
    ),
    (Role::MessageSubscribe, r"\b(?P<topic>[a-z]\w*)Queue\.process\("),
    (
        Role::ExternalSdk,
        r#"(?:require\(\s*|from\s+)['"](?P<name>@aws-sdk/[\w-]+|aws-sdk|stripe|twilio|@sendgrid/mail|nodemailer|openai|firebase-admin|@slack/web-api)['"]"#,
    ),
];

/// Extensions tried for an extensionless relative import
const RESOLVE_EXTENSIONS: [&str; 4] = ["js", "ts", "mjs", "cjs"];

/// Analyzer for Express applications
pub struct ExpressAnalyzer {
    rules: RuleSet,
}

impl ExpressAnalyzer {
    /// Create a new Express analyzer
    pub fn new() -> Result<Self> {
        let rules = RuleSet::compile(RULES)?
            .with_marker_scope(MarkerScope::Line)
            .with_module_services(true);
        Ok(Self { rules })
    }
}

impl FrameworkAnalyzer for ExpressAnalyzer {
    fn id(&self) -> &'static str {
        "express"
    }

    fn language(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "mjs", "cjs", "ts"]
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn signature(&self) -> Option<FrameworkSignature> {
        Some(FrameworkSignature {
            id: self.id(),
            language: self.language(),
            manifests: &["package.json"],
            dependency_patterns: &[
                r#""express"\s*:\s*"[~^>=\s]*(?P<version>\d+(?:\.\d+)*)"#,
                r#""express"\s*:"#,
            ],
            layout: &["routes", "src/routes", "app.js"],
        })
    }

    /// Only relative imports point into the repository
    fn module_candidates(&self, from: &Path, module: &str, _binding: Option<&str>) -> Vec<PathBuf> {
        if !module.starts_with('.') {
            return Vec::new();
        }
        let dir = from.parent().unwrap_or_else(|| Path::new(""));
        let base = lexical_join(dir, module);

        let mut candidates = Vec::new();
        if base.extension().is_some() {
            candidates.push(base.clone());
        }
        for ext in RESOLVE_EXTENSIONS {
            candidates.push(PathBuf::from(format!("{}.{}", base.display(), ext)));
        }
        candidates.push(base.join("index.js"));
        candidates.push(base.join("index.ts"));
        candidates
    }
}
