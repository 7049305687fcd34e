// Use case synthesis
//
// One use case per endpoint and one per scheduled method. Ids follow a fixed
// order (internal boundary by name, endpoints by path then method, then
// scheduled methods by service and line) so unchanged sources keep their ids.

use super::actors::{is_webhook, role_actor_name, AUTHENTICATED_USER, PUBLIC_USER, SCHEDULER, WEBHOOK_CALLER};
use super::{is_transactional, step_tags, validation_rules, StepTags, PERSISTED_CHANGE};
use crate::analysis::modules::{domain_of, humanize, singularize, words};
use crate::model::{
    ActorKind, BoundaryKind, ComponentRef, Endpoint, EndpointKey, Execution, Extension, HttpMethod,
    Model, ParameterSource, Recurrence, ScenarioStep, Service, ServiceMethod, SystemBoundary,
    UseCase,
};
use crate::parser::ANONYMOUS_HANDLER;
use crate::plugins::Discovered;
use std::collections::{BTreeSet, HashMap};

/// Handler names that carry no meaning beyond the HTTP method
const GENERIC_HANDLERS: [&str; 17] = [
    "index", "list", "show", "retrieve", "get", "create", "new", "store", "update", "edit",
    "destroy", "delete", "remove", "handle", "handler", "call", ANONYMOUS_HANDLER,
];

/// Builds use cases from a complete discovery state
#[derive(Debug, Default)]
pub struct UseCaseBuilder;

/// Scenario under construction
#[derive(Default)]
struct Scenario {
    steps: Vec<ScenarioStep>,
    extensions: Vec<Extension>,
}

impl Scenario {
    fn step(&mut self, description: impl Into<String>, tags: StepTags) -> usize {
        let number = self.steps.len() + 1;
        self.steps.push(ScenarioStep {
            number,
            description: description.into(),
            execution: tags.execution,
            recurrence: tags.recurrence,
            retried: tags.retried,
        });
        number
    }

    /// Add an alternate flow; letters count up per step
    fn extend(&mut self, step: usize, condition: impl Into<String>, outcome: impl Into<String>) {
        let prefix = step.to_string();
        let taken = self
            .extensions
            .iter()
            .filter_map(|e| e.id.strip_prefix(&prefix))
            .filter(|rest| rest.len() == 1 && rest.chars().all(|c| c.is_ascii_lowercase()))
            .count();
        let letter = (b'a' + taken.min(25) as u8) as char;
        self.extensions.push(Extension {
            id: format!("{}{}", step, letter),
            condition: condition.into(),
            outcome: outcome.into(),
        });
    }
}

/// Literal path segments, last one first
fn literal_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && !s.starts_with('{'))
        .rev()
        .collect()
}

/// Singular resource noun of a path, skipping segments named like `skip`
fn resource_noun(path: &str, skip: &str) -> Option<String> {
    literal_segments(path)
        .into_iter()
        .find(|s| !s.eq_ignore_ascii_case(skip) && domain_of(s).is_some())
        .map(|s| humanize(&singularize(s)))
}

fn collection_noun(path: &str) -> Option<String> {
    literal_segments(path)
        .into_iter()
        .find(|s| domain_of(s).is_some())
        .map(humanize)
}

/// Readable name of the use case behind an endpoint
///
/// `POST /orders` -> `Create Order`, `GET /orders/{id}` -> `View Order`,
/// handler `cancel` on `/orders/{id}/cancel` -> `Cancel Order`.
pub fn use_case_name(endpoint: &Endpoint) -> String {
    let handler_words = words(&endpoint.handler);
    let generic = handler_words.len() == 1 && GENERIC_HANDLERS.contains(&handler_words[0].as_str());

    if !generic && !handler_words.is_empty() {
        let action = humanize(&endpoint.handler);
        if handler_words.len() > 1 {
            return action;
        }
        return match resource_noun(&endpoint.path, &endpoint.handler) {
            Some(noun) => format!("{} {}", action, noun),
            None => action,
        };
    }

    let item = endpoint.path.ends_with('}');
    let singular = resource_noun(&endpoint.path, "").unwrap_or_else(|| "Home".to_string());
    let plural = collection_noun(&endpoint.path).unwrap_or_else(|| "Home".to_string());
    match endpoint.method {
        HttpMethod::Post => format!("Create {}", singular),
        HttpMethod::Put | HttpMethod::Patch => format!("Update {}", singular),
        HttpMethod::Delete => format!("Delete {}", singular),
        HttpMethod::Any if item => format!("Access {}", singular),
        HttpMethod::Any => format!("Access {}", plural),
        _ if item || plural == "Home" => format!("View {}", singular),
        _ => format!("List {}", plural),
    }
}

/// Indexes over one discovery state
struct Lookup<'a> {
    state: &'a Discovered,
    endpoints: HashMap<EndpointKey, &'a Endpoint>,
    services: HashMap<&'a str, &'a Service>,
    actors: BTreeSet<(&'a str, ActorKind)>,
}

impl<'a> Lookup<'a> {
    fn new(state: &'a Discovered) -> Self {
        Self {
            state,
            endpoints: state.endpoints.iter().map(|e| (e.key(), e)).collect(),
            services: state.services.iter().map(|s| (s.name.as_str(), s)).collect(),
            actors: state.actors().iter().map(|a| (a.name.as_str(), a.kind)).collect(),
        }
    }

    fn has_actor(&self, name: &str) -> bool {
        self.actors.iter().any(|(n, _)| *n == name)
    }

    /// First existing candidate is primary, the others secondary
    fn pick_actors(&self, candidates: Vec<String>) -> Option<(String, Vec<String>)> {
        let mut existing = candidates.into_iter().filter(|c| self.has_actor(c));
        match existing.next() {
            Some(primary) => Some((primary, existing.collect())),
            None => self
                .state
                .actors()
                .first()
                .map(|a| (a.name.clone(), Vec::new())),
        }
    }

    fn services_of(&self, boundary: &SystemBoundary) -> Vec<&'a Service> {
        boundary
            .components
            .iter()
            .filter_map(|c| match c {
                ComponentRef::Service(name) => self.services.get(name.as_str()).copied(),
                _ => None,
            })
            .collect()
    }

    /// Models an endpoint writes: its domain's models and declared body types
    fn models_for(&self, boundary: &SystemBoundary, endpoint: &Endpoint) -> Vec<&'a Model> {
        let body_types: Vec<&str> = endpoint
            .parameters
            .iter()
            .filter(|p| p.source == ParameterSource::Body)
            .filter_map(|p| p.type_name.as_deref())
            .collect();
        self.state
            .models
            .iter()
            .filter(|m| {
                body_types.contains(&m.name.as_str())
                    || domain_of(&m.name).as_deref() == Some(boundary.name.as_str())
            })
            .collect()
    }
}

impl UseCaseBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build use cases; each references an existing actor and boundary
    pub fn build(&self, state: &Discovered) -> Vec<UseCase> {
        let lookup = Lookup::new(state);
        let mut internal: Vec<&SystemBoundary> = state
            .boundaries()
            .iter()
            .filter(|b| b.kind == BoundaryKind::Internal)
            .collect();
        internal.sort_by(|a, b| a.name.cmp(&b.name));

        let mut use_cases = Vec::new();
        for boundary in internal {
            let mut endpoints: Vec<&Endpoint> = boundary
                .components
                .iter()
                .filter_map(|c| match c {
                    ComponentRef::Endpoint(key) => lookup.endpoints.get(key).copied(),
                    _ => None,
                })
                .filter(|e| !matches!(e.method, HttpMethod::Head | HttpMethod::Options))
                .collect();
            endpoints.sort_by(|a, b| (&a.path, a.method).cmp(&(&b.path, b.method)));

            for endpoint in endpoints {
                if let Some(use_case) = self.endpoint_use_case(&lookup, boundary, endpoint) {
                    use_cases.push(use_case);
                }
            }

            let mut services = lookup.services_of(boundary);
            services.sort_by(|a, b| a.name.cmp(&b.name));
            for service in services {
                let mut scheduled: Vec<&ServiceMethod> =
                    service.methods.iter().filter(|m| m.scheduled).collect();
                scheduled.sort_by(|a, b| (a.line, &a.name).cmp(&(b.line, &b.name)));
                for method in scheduled {
                    if let Some(use_case) = self.scheduled_use_case(&lookup, boundary, service, method) {
                        use_cases.push(use_case);
                    }
                }
            }
        }

        for (index, use_case) in use_cases.iter_mut().enumerate() {
            use_case.id = format!("UC-{:03}", index + 1);
        }
        use_cases
    }

    fn endpoint_use_case(
        &self,
        lookup: &Lookup<'_>,
        boundary: &SystemBoundary,
        endpoint: &Endpoint,
    ) -> Option<UseCase> {
        let candidates = if is_webhook(endpoint) {
            vec![WEBHOOK_CALLER.to_string()]
        } else if !endpoint.requires_auth {
            vec![PUBLIC_USER.to_string()]
        } else if endpoint.roles.is_empty() {
            vec![AUTHENTICATED_USER.to_string()]
        } else {
            endpoint.roles.iter().map(|r| role_actor_name(r)).collect()
        };
        let (primary, secondary) = lookup.pick_actors(candidates)?;

        let mutating = endpoint.method.is_mutating();
        let services = lookup.services_of(boundary);
        let models = if mutating {
            lookup.models_for(boundary, endpoint)
        } else {
            Vec::new()
        };
        let persisted = mutating
            && (!models.is_empty()
                || services.iter().flat_map(|s| s.methods.iter()).any(is_transactional));

        let mut provenance = vec![endpoint.location.file.clone()];
        let mut preconditions = Vec::new();
        let mut postconditions = Vec::new();
        let mut scenario = Scenario::default();
        let once = StepTags::default();

        scenario.step(format!("The {} sends {}", primary, endpoint.key()), once);

        if endpoint.requires_auth {
            preconditions.push("The caller is authenticated".to_string());
            let step = scenario.step(format!("The system authenticates the {}", primary), once);
            scenario.extend(
                step,
                "The credentials are missing or invalid",
                "The system rejects the request with 401 Unauthorized",
            );
            if !endpoint.roles.is_empty() {
                for role in &endpoint.roles {
                    preconditions.push(format!("The caller has the {} role", role));
                }
                scenario.extend(
                    step,
                    format!("The caller lacks the {} role", endpoint.roles.join(" or ")),
                    "The system rejects the request with 403 Forbidden",
                );
            }
        }

        let rules: Vec<String> = models.iter().flat_map(|m| validation_rules(m)).collect();
        if !rules.is_empty() {
            preconditions.extend(rules);
            provenance.extend(models.iter().map(|m| m.location.file.clone()));
            let step = scenario.step("The system validates the submitted data", once);
            scenario.extend(
                step,
                "The submitted data violates a validation rule",
                "The system rejects the request with 400 Bad Request",
            );
        }

        let handler = match &endpoint.controller {
            Some(controller) => format!("{}.{}", controller, endpoint.handler),
            None => endpoint.handler.clone(),
        };
        let step = scenario.step(format!("The system handles the request in {}", handler), once);
        if endpoint.path.contains('{') {
            let noun = resource_noun(&endpoint.path, "").unwrap_or_else(|| "resource".to_string());
            scenario.extend(
                step,
                format!("The requested {} does not exist", noun.to_lowercase()),
                "The system responds with 404 Not Found",
            );
        }

        if mutating {
            let mut background = false;
            for service in &services {
                for method in service.methods.iter().filter(|m| (m.is_async || m.retry) && !m.scheduled) {
                    let tags = step_tags(method);
                    background |= tags.execution == Execution::FireAndForget;
                    let name = format!("{}.{}", service.name, method.name);
                    let step = scenario.step(format!("The system runs {}", name), tags);
                    if tags.retried {
                        scenario.extend(step, format!("{} fails", name), "The system retries the operation");
                    }
                    provenance.push(service.location.file.clone());
                }
            }
            if persisted {
                scenario.step("The system persists the changes", once);
                postconditions.push(PERSISTED_CHANGE.to_string());
            } else {
                postconditions.push("The request has been processed".to_string());
            }
            if background {
                postconditions.push("Background work has been started".to_string());
            }
        } else {
            postconditions.push(format!("The requested data is returned to the {}", primary));
        }

        scenario.step(format!("The system returns the response to the {}", primary), once);

        provenance.sort();
        provenance.dedup();
        Some(UseCase {
            id: String::new(),
            name: use_case_name(endpoint),
            primary_actor: primary,
            secondary_actors: secondary,
            boundary: boundary.name.clone(),
            preconditions,
            postconditions,
            main_scenario: scenario.steps,
            extensions: scenario.extensions,
            provenance,
        })
    }

    fn scheduled_use_case(
        &self,
        lookup: &Lookup<'_>,
        boundary: &SystemBoundary,
        service: &Service,
        method: &ServiceMethod,
    ) -> Option<UseCase> {
        let mut candidates = vec![SCHEDULER.to_string()];
        candidates.extend(
            lookup
                .actors
                .iter()
                .filter(|(_, kind)| *kind == ActorKind::System)
                .map(|(name, _)| name.to_string()),
        );
        let (primary, _) = lookup.pick_actors(candidates)?;

        let qualified = format!("{}.{}", service.name, method.name);
        let name = if words(&method.name).len() > 1 {
            humanize(&method.name)
        } else {
            format!("{} {}", humanize(&method.name), boundary.name)
        };

        let recurring = StepTags {
            recurrence: Recurrence::Recurring,
            ..StepTags::default()
        };
        let mut scenario = Scenario::default();
        scenario.step(format!("The {} triggers {}", primary, qualified), recurring);
        let tags = StepTags {
            recurrence: Recurrence::Recurring,
            ..step_tags(method)
        };
        let run = scenario.step(format!("The system runs {}", qualified), tags);
        if tags.retried {
            scenario.extend(run, format!("{} fails", qualified), "The system retries the job");
        }

        let postconditions = if is_transactional(method) {
            scenario.step("The system persists the changes", recurring);
            vec![PERSISTED_CHANGE.to_string()]
        } else {
            vec!["The scheduled work has completed".to_string()]
        };

        Some(UseCase {
            id: String::new(),
            name,
            primary_actor: primary,
            secondary_actors: Vec::new(),
            boundary: boundary.name.clone(),
            preconditions: vec![format!("The schedule for {} is due", qualified)],
            postconditions,
            main_scenario: scenario.steps,
            extensions: scenario.extensions,
            provenance: vec![service.location.file.clone()],
        })
    }
}
