// Django and Django REST framework analyzer

use super::{python, FrameworkAnalyzer};
use crate::analysis::FrameworkSignature;
use crate::error::Result;
use crate::model::{AssociationKind, HttpMethod};
use crate::parser::{ConstraintRule, Role, RuleSet};
use std::path::{Path, PathBuf};

const RULES: &[(Role, &str)] = &[
    // Models
    (
        Role::ModelDecl,
        r"^class\s+(?P<name>\w+)\s*\([^)]*\b(?:models\.Model|Model|AbstractUser|AbstractBaseUser)\b",
    ),
    (
        Role::FieldDecl,
        r"^\s+(?P<name>\w+)\s*=\s*models\.(?P<type>\w+)\(",
    ),
    (Role::Constraint(ConstraintRule::Unique), r"\bunique\s*=\s*True\b"),
    (
        Role::Constraint(ConstraintRule::MaxLength),
        r"\bmax_length\s*=\s*(?P<value>\d+)",
    ),
    (Role::Constraint(ConstraintRule::Email), r"models\.EmailField\("),
    (Role::Constraint(ConstraintRule::Positive), r"models\.Positive\w*Field\("),
    (Role::Constraint(ConstraintRule::NotBlank), r"\bblank\s*=\s*False\b"),
    (Role::Constraint(ConstraintRule::NotNull), r"\bnull\s*=\s*False\b"),
    (
        Role::Constraint(ConstraintRule::Min),
        r"\bMinValueValidator\(\s*(?P<value>-?\d+)",
    ),
    (
        Role::Constraint(ConstraintRule::Max),
        r"\bMaxValueValidator\(\s*(?P<value>-?\d+)",
    ),
    (
        Role::Constraint(ConstraintRule::MinLength),
        r"\bMinLengthValidator\(\s*(?P<value>\d+)",
    ),
    (
        Role::Constraint(ConstraintRule::Pattern),
        r#"\bRegexValidator\(\s*(?:regex\s*=\s*)?r?(?P<value>"[^"]*"|'[^']*')"#,
    ),
    (
        Role::Association(AssociationKind::BelongsTo),
        r#"models\.ForeignKey\(\s*(?P<target>["']?[\w.]+["']?)"#,
    ),
    (
        Role::Association(AssociationKind::HasOne),
        r#"models\.OneToOneField\(\s*(?P<target>["']?[\w.]+["']?)"#,
    ),
    (
        Role::Association(AssociationKind::ManyToMany),
        r#"models\.ManyToManyField\(\s*(?P<target>["']?[\w.]+["']?)"#,
    ),
    // Authentication
    (
        Role::AuthRequired,
        r"@(?:login_required|staff_member_required|user_passes_test|api_view.*\bIsAuthenticated)\b",
    ),
    (
        Role::RoleRequirement,
        r#"@permission_required\(\s*["'](?:\w+\.)?(?P<role>\w+)["']"#,
    ),
    (
        Role::AuthRequired,
        r"^class\s+\w+\s*\([^)]*\b(?:LoginRequiredMixin|PermissionRequiredMixin|UserPassesTestMixin)\b",
    ),
    (
        Role::AuthScope,
        r"^\s+permission_classes\s*=\s*[\[(][^\])]*\bIs(?:Authenticated|AuthenticatedOrReadOnly)\b",
    ),
    (
        Role::AuthScope,
        r"^\s+permission_classes\s*=\s*[\[(][^\])]*\bIs(?P<role>Admin)User\b",
    ),
    (
        Role::AuthScope,
        r#"^\s+permission_required\s*=\s*\(?\s*["'](?:\w+\.)?(?P<role>\w+)["']"#,
    ),
    (
        Role::SecurityRule,
        r#"["']DEFAULT_PERMISSION_CLASSES["']\s*:\s*[\[(][^\])]*\bIsAuthenticated\b"#,
    ),
    // URL configuration
    (
        Role::RouteStatement(Some(HttpMethod::Any)),
        r#"^\s*(?:re_)?path\(\s*r?["'](?P<path>[^"']*)["']\s*,\s*(?P<handler>[\w.]+(?:\.as_view\(\))?)\s*[,)]"#,
    ),
    (
        Role::RouteStatement(Some(HttpMethod::Any)),
        r#"^\s*url\(\s*r?["'](?P<path>[^"']*)["']\s*,\s*(?P<handler>[\w.]+(?:\.as_view\(\))?)\s*[,)]"#,
    ),
    (
        Role::RouteMount,
        r#"^\s*(?:re_)?(?:path|url)\(\s*r?["'](?P<path>[^"']*)["']\s*,\s*include\(\s*["'](?P<module>[\w.]+)["']"#,
    ),
    (
        Role::ResourceRoutes,
        r#"\brouter\.register\(\s*r?["'](?P<name>[^"']+)["']\s*,\s*(?P<handler>[\w.]+)"#,
    ),
];

/// Analyzer for Django projects
pub struct DjangoAnalyzer {
    rules: RuleSet,
}

impl DjangoAnalyzer {
    /// Create a new Django analyzer
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: python::compile(&[RULES, python::COMMON])?,
        })
    }
}

impl FrameworkAnalyzer for DjangoAnalyzer {
    fn id(&self) -> &'static str {
        "django"
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
                r#"(?im)(?:^\s*|["'])django(?:\s*\[[^\]]*\])?\s*(?:(?:==|>=|~=|=)\s*["']?\^?(?P<version>\d+(?:\.\d+)*)|[<>!"',;]|$)"#,
            ],
            layout: &["manage.py", "*/settings.py", "*/urls.py"],
        })
    }

    fn module_candidates(&self, from: &Path, module: &str, binding: Option<&str>) -> Vec<PathBuf> {
        python::module_candidates(from, module, binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Constraint;
    use crate::parser::{scan_file, Access, FileScan, MountTarget, Signal};

    fn scan(path: &str, source: &str) -> FileScan {
        let analyzer = DjangoAnalyzer::new().unwrap();
        scan_file(analyzer.rules(), Path::new(path), source)
    }

    #[test]
    fn test_models() {
        let source = r#"
from django.db import models


class Customer(models.Model):
    email = models.EmailField(unique=True)
    name = models.CharField(max_length=100, blank=False)
    age = models.PositiveIntegerField(validators=[MinValueValidator(18)])

    def __str__(self):
        return self.name


class Order(models.Model):
    customer = models.ForeignKey(Customer, on_delete=models.CASCADE)
    tags = models.ManyToManyField("catalog.Tag")
"#;
        let scan = scan("shop/models.py", source);
        assert_eq!(scan.models.len(), 2);

        let customer = &scan.models[0];
        assert_eq!(customer.name, "Customer");
        assert_eq!(customer.fields.len(), 3);
        assert_eq!(
            customer.field("email").unwrap().constraints,
            vec![Constraint::Email, Constraint::Unique]
        );
        assert_eq!(customer.field("email").unwrap().type_name.as_deref(), Some("EmailField"));
        assert_eq!(
            customer.field("name").unwrap().constraints,
            vec![
                Constraint::Size {
                    min: None,
                    max: Some(100)
                },
                Constraint::NotBlank
            ]
        );
        assert_eq!(
            customer.field("age").unwrap().constraints,
            vec![Constraint::Positive, Constraint::Min { value: 18 }]
        );

        let order = &scan.models[1];
        let targets: Vec<&str> = order.associations.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(targets, vec!["Customer", "Tag"]);
        assert_eq!(order.associations[1].kind, AssociationKind::ManyToMany);
    }

    #[test]
    fn test_urlconf() {
        let source = r#"
from django.urls import include, path
from rest_framework.routers import DefaultRouter

from . import views

router = DefaultRouter()
router.register(r"orders", views.OrderViewSet)

urlpatterns = [
    path("", views.index, name="index"),
    path("customers/<int:pk>/", views.CustomerDetail.as_view(), name="customer-detail"),
    path("api/", include("shop.api.urls")),
]
"#;
        let scan = scan("shop/urls.py", source);

        let index = scan.endpoints.iter().find(|e| e.path == "/").unwrap();
        assert_eq!(index.handler, "index");
        assert_eq!(index.method, HttpMethod::Any);
        assert_eq!(index.controller.as_deref(), Some("views"));

        let detail = scan.endpoints.iter().find(|e| e.path == "/customers/{pk}").unwrap();
        assert_eq!(detail.controller.as_deref(), Some("CustomerDetail"));

        let orders: Vec<_> = scan.endpoints.iter().filter(|e| e.path.starts_with("/orders")).collect();
        assert_eq!(orders.len(), 5);
        assert!(orders.iter().all(|e| e.controller.as_deref() == Some("OrderViewSet")));

        assert!(scan.signals.iter().any(|s| matches!(
            s,
            Signal::RouteMount { prefix, target: MountTarget::Module(m), .. }
                if prefix == "/api" && m == "shop.api.urls"
        )));
    }

    #[test]
    fn test_view_protection() {
        let source = r#"
@login_required
def dashboard(request):
    return render(request, "dashboard.html")


class ReportView(LoginRequiredMixin, View):
    def get(self, request):
        return HttpResponse()


class OrderViewSet(viewsets.ModelViewSet):
    permission_classes = [IsAdminUser]
    queryset = Order.objects.all()
"#;
        let scan = scan("shop/views.py", source);
        let protected: Vec<(&str, &[String])> = scan
            .signals
            .iter()
            .filter_map(|s| match s {
                Signal::ProtectedHandler { name, roles, .. } => Some((name.as_str(), roles.as_slice())),
                _ => None,
            })
            .collect();
        assert_eq!(protected.len(), 3);
        assert_eq!(protected[0].0, "dashboard");
        assert_eq!(protected[1].0, "ReportView");
        assert_eq!(protected[2], ("OrderViewSet", &["ADMIN".to_string()][..]));
    }

    #[test]
    fn test_default_permission_setting() {
        let source = "REST_FRAMEWORK = {\n    \"DEFAULT_PERMISSION_CLASSES\": [\"rest_framework.permissions.IsAuthenticated\"],\n}\n";
        let scan = scan("config/settings.py", source);
        assert!(matches!(
            &scan.signals[0],
            Signal::SecurityRule { pattern, access: Access::Authenticated, .. } if pattern == "/**"
        ));
    }
}
