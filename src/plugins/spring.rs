// Spring Boot analyzer (Java and Kotlin)

use super::FrameworkAnalyzer;
use crate::analysis::FrameworkSignature;
use crate::error::Result;
use crate::model::{AssociationKind, ParameterSource, ServiceKind};
use crate::parser::{ConstraintRule, Role, RuleSet};

const RULES: &[(Role, &str)] = &[
    (Role::ScopeEnd, r"^\s*[})]\s*;?\s*$"),
    // Stereotypes
    (Role::ControllerMarker, r"@(?:Rest)?Controller\b"),
    (Role::ServiceMarker(None), r"@(?:Service|Component)\b"),
    (Role::ServiceMarker(Some(ServiceKind::Infrastructure)), r"@Repository\b"),
    (Role::ModelMarker, r"@(?:Entity|Document|Embeddable)\b"),
    // Routes
    (
        Role::RouteMarker(None),
        r#"@(?P<method>Get|Post|Put|Patch|Delete)Mapping\b(?:\(\s*(?:(?:value|path)\s*=\s*)?\{?\s*"(?P<path>[^"]*)")?"#,
    ),
    (
        Role::RouteMarker(None),
        r#"@RequestMapping\b(?:\(\s*(?:(?:value|path)\s*=\s*)?\{?\s*"(?P<path>[^"]*)"(?:[^)]*?method\s*=\s*\[?\s*RequestMethod\.(?P<method>\w+))?)?"#,
    ),
    (
        Role::Parameter(ParameterSource::Path),
        r"@PathVariable(?:\([^)]*\))?\s+(?:final\s+)?(?P<type>[\w<>]+)\s+(?P<name>\w+)",
    ),
    (
        Role::Parameter(ParameterSource::Query),
        r"@RequestParam(?:\([^)]*\))?\s+(?:final\s+)?(?P<type>[\w<>]+)\s+(?P<name>\w+)",
    ),
    (
        Role::Parameter(ParameterSource::Body),
        r"@RequestBody\s+(?:@Valid\s+)?(?:final\s+)?(?P<type>[\w<>]+)\s+(?P<name>\w+)",
    ),
    (
        Role::Parameter(ParameterSource::Header),
        r"@RequestHeader(?:\([^)]*\))?\s+(?:final\s+)?(?P<type>[\w<>]+)\s+(?P<name>\w+)",
    ),
    (
        Role::Parameter(ParameterSource::Path),
        r"@PathVariable(?:\([^)]*\))?\s+(?P<name>\w+)\s*:\s*(?P<type>[\w<>?]+)",
    ),
    (
        Role::Parameter(ParameterSource::Body),
        r"@RequestBody\s+(?:@Valid\s+)?(?P<name>\w+)\s*:\s*(?P<type>[\w<>?]+)",
    ),
    // Method security
    (Role::AuthRequired, r#"@PreAuthorize\(\s*"isAuthenticated\(\)"#),
    (
        Role::RoleRequirement,
        r"@PreAuthorize\(.*?has(?:Any)?(?:Role|Authority)\(\s*(?P<role>[^)]*)\)",
    ),
    (Role::RoleRequirement, r"@(?:Secured|RolesAllowed)\(\s*(?P<role>[^)]*)\)"),
    // Workflow markers
    (Role::Transactional, r"@Transactional\b"),
    (Role::Async, r"@Async\b"),
    (Role::Scheduled, r"@Scheduled\b"),
    (Role::Retry, r"@Retryable\b"),
    // Bean validation and JPA
    (Role::Constraint(ConstraintRule::NotNull), r"@(?:NotNull|NonNull)\b"),
    (Role::Constraint(ConstraintRule::NotNull), r"@Column\([^)]*\bnullable\s*=\s*false"),
    (Role::Constraint(ConstraintRule::NotBlank), r"@(?:NotBlank|NotEmpty)\b"),
    (Role::Constraint(ConstraintRule::Unique), r"@Column\([^)]*\bunique\s*=\s*true"),
    (Role::Constraint(ConstraintRule::Email), r"@Email\b"),
    (Role::Constraint(ConstraintRule::Positive), r"@Positive(?:OrZero)?\b"),
    (Role::Constraint(ConstraintRule::Past), r"@Past(?:OrPresent)?\b"),
    (Role::Constraint(ConstraintRule::Future), r"@Future(?:OrPresent)?\b"),
    (Role::Constraint(ConstraintRule::Size), r"@(?:Size|Length)\((?P<args>[^)]*)\)"),
    (
        Role::Constraint(ConstraintRule::Min),
        r#"@(?:Min|DecimalMin)\(\s*(?:value\s*=\s*)?"?(?P<value>-?\d+)"#,
    ),
    (
        Role::Constraint(ConstraintRule::Max),
        r#"@(?:Max|DecimalMax)\(\s*(?:value\s*=\s*)?"?(?P<value>-?\d+)"#,
    ),
    (
        Role::Constraint(ConstraintRule::Pattern),
        r#"@Pattern\(\s*(?:regexp\s*=\s*)?(?P<value>"(?:[^"\\]|\\.)*")"#,
    ),
    (Role::Association(AssociationKind::HasMany), r"@OneToMany\b"),
    (Role::Association(AssociationKind::BelongsTo), r"@ManyToOne\b"),
    (Role::Association(AssociationKind::HasOne), r"@OneToOne\b"),
    (Role::Association(AssociationKind::ManyToMany), r"@ManyToMany\b"),
    // Declarations
    (
        Role::ClassDecl,
        r"^\s*(?:@\w+(?:\([^)]*\))?\s+)*(?:(?:public|private|protected|internal|abstract|final|open|data|sealed|static)\s+)*(?:class|interface|object)\s+(?P<name>[A-Z]\w*)",
    ),
    (
        Role::MethodDecl,
        r"^\s*(?:(?:public|protected|private|static|final|synchronized|abstract|default)\s+)+(?:<[^>]+>\s+)?[\w<>\[\], ?]+?\s+(?P<name>\w+)\s*\(",
    ),
    (
        Role::MethodDecl,
        r"^\s*(?:(?:public|private|protected|internal|override|open|suspend)\s+)*fun\s+(?:<[^>]+>\s+)?(?P<name>\w+)\s*\(",
    ),
    (
        Role::FieldDecl,
        r"^\s*(?:private|protected|public)\s+(?:(?:final|transient)\s+)*(?P<type>\w+(?:<[\w<>, ?]+>)?(?:\[\])?)\s+(?P<name>\w+)\s*(?:=[^;]*)?;",
    ),
    (
        Role::FieldDecl,
        r"^\s*(?:(?:private|protected|public|internal|override|lateinit)\s+)*va[lr]\s+(?P<name>\w+)\s*:\s*(?P<type>[\w.]+(?:<[\w<>, ?.]+>)?\??)\s*(?:[=,)]|$)",
    ),
    // Collaborators
    (Role::Dependency, r"^\s*private\s+final\s+(?P<type>[A-Z]\w*)\s+\w+\s*;"),
    (
        Role::Dependency,
        r"^\s*private\s+(?P<type>[A-Z]\w*(?:Repository|Service|Client|Gateway|Template|Publisher|Producer|Dao))\s+\w+\s*;",
    ),
    (
        Role::Dependency,
        r"\bva[lr]\s+\w+\s*:\s*(?P<type>[A-Z]\w*(?:Repository|Service|Client|Gateway|Template|Publisher|Producer|Dao))\b",
    ),
    (
        Role::PersistenceMutation,
        r"(?:[Rr]epository|[Rr]epo|Dao|dao|entityManager)\.(?P<call>save|delete|update|insert|persist|merge|remove)\w*\s*\(",
    ),
    (Role::TransactionBlock, r"\btransactionTemplate\.execute\w*\("),
    (
        Role::HttpClient,
        r#"(?:restTemplate|RestTemplate\(\))\.\w+\(\s*"(?P<target>[^"]+)""#,
    ),
    (
        Role::HttpClient,
        r#"(?:WebClient\.create|\.baseUrl|\.uri)\(\s*"(?P<target>https?://[^"]+)""#,
    ),
    (
        Role::HttpClient,
        r#"@FeignClient\([^)]*\burl\s*=\s*"(?P<target>[^"]+)""#,
    ),
    (
        Role::MessagePublish,
        r#"\b(?:kafkaTemplate|rabbitTemplate|jmsTemplate|streamBridge)\.(?:send|convertAndSend)\(\s*(?:"(?P<topic>[^"]+)")?"#,
    ),
    (Role::MessagePublish, r"[Pp]ublisher\.publishEvent\("),
    (
        Role::MessageSubscribe,
        r#"@(?:KafkaListener|RabbitListener|JmsListener|SqsListener)\b(?:\([^)]*?(?:topics|queues|destination|value)\s*=\s*\{?\s*"(?P<topic>[^"]+)")?"#,
    ),
    // Web security configuration
    (
        Role::SecurityRule,
        r#"\.(?:requestMatchers|antMatchers|mvcMatchers)\(\s*(?:HttpMethod\.\w+\s*,\s*)?"(?P<path>[^"]+)"[^)]*\)\s*\.(?P<access>permitAll|authenticated|hasRole|hasAnyRole|hasAuthority|hasAnyAuthority|denyAll|anonymous)\(\s*(?P<role>[^)]*)\)"#,
    ),
    (
        Role::SecurityRule,
        r"\.anyRequest\(\)\s*\.(?P<access>permitAll|authenticated|denyAll)\(",
    ),
    (
        Role::ExternalSdk,
        r"^import\s+(?:com|software)\.(?P<name>stripe|amazonaws|amazon|twilio|sendgrid|google\.cloud|slack)\b",
    ),
];

/// Analyzer for Spring Boot applications
pub struct SpringAnalyzer {
    rules: RuleSet,
}

impl SpringAnalyzer {
    /// Create a new Spring analyzer
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: RuleSet::compile(RULES)?,
        })
    }
}

impl FrameworkAnalyzer for SpringAnalyzer {
    fn id(&self) -> &'static str {
        "spring"
    }

    fn language(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["java", "kt"]
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn signature(&self) -> Option<FrameworkSignature> {
        Some(FrameworkSignature {
            id: self.id(),
            language: self.language(),
            manifests: &["pom.xml", "build.gradle", "build.gradle.kts"],
            dependency_patterns: &[
                r"(?s)spring-boot-starter-parent</artifactId>\s*<version>(?P<version>\d+(?:\.\d+)*)",
                r#"org\.springframework\.boot['"]\)?\s+version\s+['"](?P<version>\d+(?:\.\d+)*)"#,
                r"org\.springframework\.boot|spring-boot-starter",
            ],
            layout: &["src/main/java", "src/main/resources"],
        })
    }
}
