// Ruby on Rails analyzer

use super::FrameworkAnalyzer;
use crate::analysis::FrameworkSignature;
use crate::error::Result;
use crate::model::{AssociationKind, HttpMethod};
use crate::parser::{ConstraintRule, Role, RuleSet};

const RULES: &[(Role, &str)] = &[
    (Role::ScopeEnd, r"^\s*end\b"),
    // Classes
    (
        Role::ModelDecl,
        r"^\s*class\s+(?:\w+::)*(?P<name>\w+)\s*<\s*(?:ApplicationRecord|ActiveRecord::Base)\b",
    ),
    (
        Role::ControllerDecl,
        r"^\s*class\s+(?:\w+::)*(?P<name>\w+Controller)\s*<",
    ),
    (
        Role::ServiceDecl(None),
        r"^\s*class\s+(?:\w+::)*(?P<name>\w+)\s*<\s*(?:ApplicationJob|ActiveJob::Base)\b",
    ),
    (Role::Async, r"<\s*(?:ApplicationJob|ActiveJob::Base)\b"),
    (Role::Async, r"^\s*include\s+Sidekiq::(?:Worker|Job)\b"),
    (Role::ClassDecl, r"^\s*class\s+(?:\w+::)*(?P<name>\w+)"),
    (Role::MethodDecl, r"^\s*def\s+(?:self\.)?(?P<name>\w+[?!]?)"),
    // Validations
    (
        Role::Constraint(ConstraintRule::NotNull),
        r"^\s*validates\s+:(?P<name>\w+).*\bpresence:\s*true\b",
    ),
    (
        Role::Constraint(ConstraintRule::NotNull),
        r"^\s*validates_presence_of\s+:(?P<name>\w+)",
    ),
    (
        Role::Constraint(ConstraintRule::Unique),
        r"^\s*validates\s+:(?P<name>\w+).*\buniqueness:",
    ),
    (
        Role::Constraint(ConstraintRule::Unique),
        r"^\s*validates_uniqueness_of\s+:(?P<name>\w+)",
    ),
    (
        Role::Constraint(ConstraintRule::Email),
        r"^\s*validates\s+:(?P<name>\w+).*\bEMAIL_REGEXP\b",
    ),
    (
        Role::Constraint(ConstraintRule::MinLength),
        r"^\s*validates\s+:(?P<name>\w+).*\bminimum:\s*(?P<value>\d+)",
    ),
    (
        Role::Constraint(ConstraintRule::MaxLength),
        r"^\s*validates\s+:(?P<name>\w+).*\bmaximum:\s*(?P<value>\d+)",
    ),
    (
        Role::Constraint(ConstraintRule::Min),
        r"^\s*validates\s+:(?P<name>\w+).*\bgreater_than_or_equal_to:\s*(?P<value>-?\d+)",
    ),
    (
        Role::Constraint(ConstraintRule::Max),
        r"^\s*validates\s+:(?P<name>\w+).*\bless_than_or_equal_to:\s*(?P<value>-?\d+)",
    ),
    (
        Role::Constraint(ConstraintRule::Positive),
        r"^\s*validates\s+:(?P<name>\w+).*\bgreater_than:\s*0\b",
    ),
    (
        Role::Constraint(ConstraintRule::Pattern),
        r"^\s*validates\s+:(?P<name>\w+).*\bformat:\s*\{\s*with:\s*(?P<value>/[^/]+/)",
    ),
    (
        Role::Association(AssociationKind::HasMany),
        r"^\s*has_many\s+(?P<target>:\w+)",
    ),
    (
        Role::Association(AssociationKind::HasOne),
        r"^\s*has_one\s+(?P<target>:\w+)",
    ),
    (
        Role::Association(AssociationKind::BelongsTo),
        r"^\s*belongs_to\s+(?P<target>:\w+)",
    ),
    (
        Role::Association(AssociationKind::ManyToMany),
        r"^\s*has_and_belongs_to_many\s+(?P<target>:\w+)",
    ),
    // db/schema.rb and migrations
    (
        Role::ModelDecl,
        r#"^\s*create_table\s+["':](?P<name>\w+)"#,
    ),
    (
        Role::FieldDecl,
        r#"^\s*t\.(?P<type>string|text|integer|bigint|float|decimal|boolean|date|datetime|time|timestamp|json|jsonb|uuid|binary)\s+["':](?P<name>\w+)"#,
    ),
    (Role::Constraint(ConstraintRule::NotNull), r"^\s*t\.\w+\s.*\bnull:\s*false\b"),
    (
        Role::Association(AssociationKind::BelongsTo),
        r#"^\s*t\.(?:references|belongs_to)\s+["':](?P<target>\w+)"#,
    ),
    // config/routes.rb
    (
        Role::ResourceRoutes,
        r"^\s*(?P<kind>resources?)\s+:(?P<name>\w+)(?:.*\bonly:\s*\[(?P<only>[^\]]*)\])?",
    ),
    (
        Role::RouteStatement(None),
        r#"^\s*(?P<method>get|post|put|patch|delete|match)\s+["'](?P<path>[^"']+)["']\s*(?:,\s*(?:to:\s*|=>\s*)?["'](?P<handler>[\w/]+#\w+)["'])?"#,
    ),
    (
        Role::RouteStatement(Some(HttpMethod::Get)),
        r#"^\s*root\s+(?:to:\s*)?["'](?P<handler>[\w/]+#\w+)["']"#,
    ),
    (
        Role::FilePrefix,
        r#"^\s*(?:namespace|scope)\s+(?:path:\s*)?["':](?P<path>[\w/]+)"#,
    ),
    // Authentication
    (
        Role::AuthScope,
        r"^\s*before_action\s+:(?:authenticate\w*|require_login|require_user|authorize_request|logged_in_user)!?",
    ),
    (
        Role::AuthScope,
        r"^\s*before_action\s+:(?:require|ensure|check)_(?P<role>admin|manager|staff|moderator)\b",
    ),
    (Role::AuthScope, r"^\s*http_basic_authenticate_with\b"),
    // Service behavior
    (
        Role::Dependency,
        r"\b(?P<type>[A-Z]\w*(?:Service|Client|Gateway|Repository))\.(?:new|call)\b",
    ),
    (
        Role::PersistenceMutation,
        r"\.(?P<call>save|create|update|destroy|delete|update_all|delete_all|destroy_all|insert_all|upsert_all|upsert|touch)!?(?:\(|\s|$)",
    ),
    (Role::TransactionBlock, r"\btransaction\s+do\b"),
    (
        Role::HttpClient,
        r#"\b(?:HTTParty|Faraday|RestClient|Net::HTTP)\.(?:get|post|put|patch|delete|new|get_response)\(?\s*(?:URI\(\s*)?["'](?P<target>https?://[^"']+)["']"#,
    ),
    (
        Role::HttpClient,
        r#"\bURI(?:\.parse)?\(\s*["'](?P<target>https?://[^"']+)["']"#,
    ),
    (
        Role::MessagePublish,
        r"\b(?P<topic>[A-Z]\w*(?:Job|Worker))\.(?:perform_later|perform_async|perform_in|perform_at|set)\b",
    ),
    (
        Role::MessagePublish,
        r#"\bActionCable\.server\.broadcast\(?\s*["'](?P<topic>[^"']+)["']"#,
    ),
    (Role::Retry, r"^\s*retry_on\b"),
    (Role::Retry, r"^\s*sidekiq_options\b.*\bretry:\s*(?:\d+|true)"),
    (
        Role::ExternalSdk,
        r#"^\s*require\s+["'](?P<name>aws-sdk[\w-]*|stripe|twilio-ruby|sendgrid-ruby|slack-ruby-client|openai)["']"#,
    ),
    (
        Role::ExternalSdk,
        r"\b(?P<name>Stripe|Twilio|Aws|SendGrid|OpenAI)::\w+(?:::\w+)*\.(?:new|create|retrieve|call)\b",
    ),
];

/// Analyzer for Ruby on Rails applications
pub struct RailsAnalyzer {
    rules: RuleSet,
}

impl RailsAnalyzer {
    /// Create a new Rails analyzer
    pub fn new() -> Result<Self> {
        Ok(Self {
            rules: RuleSet::compile(RULES)?,
        })
    }
}

impl FrameworkAnalyzer for RailsAnalyzer {
    fn id(&self) -> &'static str {
        "rails"
    }

    fn language(&self) -> &'static str {
        "ruby"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rb", "rake"]
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn signature(&self) -> Option<FrameworkSignature> {
        Some(FrameworkSignature {
            id: self.id(),
            language: self.language(),
            manifests: &["Gemfile", "Gemfile.lock"],
            dependency_patterns: &[
                r"(?m)^\s{4}rails \((?P<version>\d+(?:\.\d+)*)\)",
                r#"(?m)^\s*gem\s+["']rails["']\s*,\s*["'][~>=\s]*(?P<version>\d+(?:\.\d+)*)"#,
                r#"(?m)^\s*gem\s+["']rails["']"#,
            ],
            layout: &["app/controllers", "app/models", "config/routes.rb"],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constraint, ServiceKind};
    use crate::parser::{scan_file, FileScan, Signal};
    use std::path::Path;

    fn scan(path: &str, source: &str) -> FileScan {
        let analyzer = RailsAnalyzer::new().unwrap();
        scan_file(analyzer.rules(), Path::new(path), source)
    }

    #[test]
    fn test_model() {
        let source = r##"
class User < ApplicationRecord
  has_many :orders, dependent: :destroy
  belongs_to :company
  validates :email, presence: true, uniqueness: true, format: { with: URI::MailTo::EMAIL_REGEXP }
  validates :name, length: { minimum: 2, maximum: 50 }

  def full_name
    "#{first_name} #{last_name}"
  end
end
"##;
        let scan = scan("app/models/user.rb", source);
        assert_eq!(scan.models.len(), 1);
        let user = &scan.models[0];
        assert_eq!(user.name, "User");
        assert_eq!(
            user.field("email").unwrap().constraints,
            vec![Constraint::NotNull, Constraint::Unique, Constraint::Email]
        );
        assert_eq!(
            user.field("name").unwrap().constraints,
            vec![Constraint::Size {
                min: Some(2),
                max: Some(50)
            }]
        );
        let targets: Vec<&str> = user.associations.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(targets, vec!["Order", "Company"]);
    }

    #[test]
    fn test_schema() {
        let source = r#"
ActiveRecord::Schema[7.1].define(version: 2024_01_01_000000) do
  create_table "orders", force: :cascade do |t|
    t.references "user", null: false, foreign_key: true
    t.decimal "total", precision: 10, scale: 2, null: false
    t.string "status"
    t.timestamps
  end
end
"#;
        let scan = scan("db/schema.rb", source);
        assert_eq!(scan.models.len(), 1);
        let order = &scan.models[0];
        assert_eq!(order.name, "Order");
        assert_eq!(order.fields.len(), 2);
        assert_eq!(order.field("total").unwrap().constraints, vec![Constraint::NotNull]);
        assert!(order.field("status").unwrap().constraints.is_empty());
        assert_eq!(order.associations[0].target, "User");
        assert_eq!(order.associations[0].kind, AssociationKind::BelongsTo);
    }

    #[test]
    fn test_routes() {
        let source = r#"
Rails.application.routes.draw do
  root "home#index"
  resources :products, only: [:index, :show]

  namespace :api do
    namespace :v1 do
      resources :orders
      get "reports/:year", to: "reports#show"
    end
  end
end
"#;
        let scan = scan("config/routes.rb", source);
        let keys: Vec<String> = scan.endpoints.iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys[0], "GET /");
        assert_eq!(scan.endpoints[0].controller.as_deref(), Some("HomeController"));
        assert!(keys.contains(&"GET /products/{id}".to_string()));
        assert!(keys.contains(&"DELETE /api/v1/orders/{id}".to_string()));
        assert!(keys.contains(&"GET /api/v1/reports/{year}".to_string()));
        assert_eq!(keys.len(), 1 + 2 + 5 + 1);
    }

    #[test]
    fn test_controller_protection() {
        let source = r#"
module Admin
  class OrdersController < ApplicationController
    before_action :authenticate_user!
    before_action :require_admin

    def index
      @orders = Order.all
    end
  end
end
"#;
        let scan = scan("app/controllers/admin/orders_controller.rb", source);
        assert!(matches!(
            &scan.signals[0],
            Signal::ProtectedHandler { name, roles, .. }
                if name == "OrdersController" && roles == &vec!["ADMIN".to_string()]
        ));
        assert!(scan.services.is_empty());
    }

    #[test]
    fn test_jobs_and_services() {
        let job = r#"
class SendReceiptJob < ApplicationJob
  queue_as :default
  retry_on Net::OpenTimeout, wait: 5.seconds

  def perform(order_id)
    order = Order.find(order_id)
    HTTParty.post("https://mail.example.com/send", body: { id: order.id })
  end
end
"#;
        let job_scan = scan("app/jobs/send_receipt_job.rb", job);
        let service = &job_scan.services[0];
        assert_eq!(service.name, "SendReceiptJob");
        assert!(service.methods[0].is_async);
        assert!(service.methods[0].retry);
        assert!(job_scan.signals.iter().any(|s| matches!(s, Signal::HttpCall { .. })));

        let checkout = r#"
class CheckoutService
  def call(cart)
    ActiveRecord::Base.transaction do
      order = Order.create!(cart.to_h)
      Stripe::Charge.create(amount: order.total_cents)
      SendReceiptJob.perform_later(order.id)
    end
  end
end
"#;
        let checkout_scan = scan("app/services/checkout_service.rb", checkout);
        let service = &checkout_scan.services[0];
        assert_eq!(service.kind, ServiceKind::BusinessLogic);
        assert!(service.methods[0].transactional);
        assert_eq!(service.methods[0].persistence_calls, vec!["create".to_string()]);
        assert!(checkout_scan.signals.iter().any(|s| matches!(
            s,
            Signal::ExternalSdk { name, component, .. } if name == "Stripe" && component == "CheckoutService"
        )));
        assert!(checkout_scan.signals.iter().any(|s| matches!(
            s,
            Signal::Publish { topic, .. } if topic == "SendReceiptJob"
        )));
    }
}
