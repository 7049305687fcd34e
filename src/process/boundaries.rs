// System boundary discovery
//
// Internal boundaries group endpoints and services by business domain. All
// models share one data boundary. External systems become boundaries of
// their own, named after the host or SDK used to reach them.

use crate::analysis::modules::domain_for;
use crate::model::{BoundaryKind, ComponentRef, Endpoint, Service, SystemBoundary};
use crate::parser::Signal;
use crate::plugins::Discovered;
use std::collections::{BTreeMap, BTreeSet};

pub const DATA_STORE: &str = "Data Store";
pub const MESSAGE_BROKER: &str = "Message Broker";

/// Domain boundary an endpoint belongs to
pub fn endpoint_domain(endpoint: &Endpoint) -> String {
    domain_for(endpoint.controller.as_deref(), &endpoint.location.file)
}

/// Domain boundary a service belongs to
pub fn service_domain(service: &Service) -> String {
    domain_for(Some(&service.name), &service.location.file)
}

/// Host part of an absolute URL: `https://api.stripe.com/v1` -> `api.stripe.com`
pub fn url_host(target: &str) -> Option<String> {
    let rest = target.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?.to_lowercase();
    let templated = host.contains('{') || host.contains('$');
    if host.is_empty() || templated {
        None
    } else {
        Some(host)
    }
}

/// Boundary name of an external system, kept apart from internal names
pub fn external_name(raw: &str, internal: &BTreeSet<String>) -> String {
    if internal.contains(raw) {
        format!("{} (external)", raw)
    } else {
        raw.to_string()
    }
}

/// Names of the internal boundaries of a boundary list
pub fn internal_names(boundaries: &[SystemBoundary]) -> BTreeSet<String> {
    boundaries
        .iter()
        .filter(|b| b.kind == BoundaryKind::Internal)
        .map(|b| b.name.clone())
        .collect()
}

/// Raw external system name a signal points at, if any
pub fn external_target(signal: &Signal) -> Option<String> {
    match signal {
        Signal::HttpCall { target, .. } => url_host(target),
        Signal::ExternalSdk { name, .. } => Some(name.clone()),
        Signal::Publish { .. } | Signal::Subscribe { .. } => Some(MESSAGE_BROKER.to_string()),
        _ => None,
    }
}

/// Discover boundaries: internal ones by name, then data, then external
pub fn discover_boundaries(state: &Discovered, signals: &[Signal]) -> Vec<SystemBoundary> {
    let mut internal: BTreeMap<String, Vec<ComponentRef>> = BTreeMap::new();
    for endpoint in &state.endpoints {
        internal
            .entry(endpoint_domain(endpoint))
            .or_default()
            .push(ComponentRef::Endpoint(endpoint.key()));
    }
    for service in &state.services {
        internal
            .entry(service_domain(service))
            .or_default()
            .push(ComponentRef::Service(service.name.clone()));
    }

    let internal_set: BTreeSet<String> = internal.keys().cloned().collect();
    let mut boundaries: Vec<SystemBoundary> = internal
        .into_iter()
        .map(|(name, mut components)| {
            components.sort();
            components.dedup();
            SystemBoundary {
                name,
                kind: BoundaryKind::Internal,
                components,
            }
        })
        .collect();

    let persists = state
        .services
        .iter()
        .flat_map(|s| s.methods.iter())
        .any(super::is_transactional);
    if !state.models.is_empty() || persists {
        boundaries.push(SystemBoundary {
            name: DATA_STORE.to_string(),
            kind: BoundaryKind::Data,
            components: state
                .models
                .iter()
                .map(|m| ComponentRef::Model(m.name.clone()))
                .collect(),
        });
    }

    let external: BTreeSet<String> = signals
        .iter()
        .filter_map(external_target)
        .map(|raw| external_name(&raw, &internal_set))
        .filter(|name| name != DATA_STORE)
        .collect();
    boundaries.extend(external.into_iter().map(|name| SystemBoundary {
        name,
        kind: BoundaryKind::External,
        components: Vec::new(),
    }));

    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, Model, ServiceKind, ServiceMethod, SourceLocation};

    fn endpoint(path: &str, controller: Option<&str>, file: &str) -> Endpoint {
        Endpoint {
            method: HttpMethod::Get,
            path: path.to_string(),
            location: SourceLocation::new(file, 1),
            controller: controller.map(str::to_string),
            handler: "index".to_string(),
            requires_auth: false,
            roles: Vec::new(),
            parameters: Vec::new(),
        }
    }

    fn service(name: &str, file: &str) -> Service {
        Service {
            name: name.to_string(),
            location: SourceLocation::new(file, 1),
            dependencies: Vec::new(),
            kind: ServiceKind::classify(name),
            methods: Vec::new(),
        }
    }

    fn located(component: &str) -> SourceLocation {
        SourceLocation::new(format!("{}.py", component.to_lowercase()), 1)
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://api.stripe.com/v1/charges").as_deref(), Some("api.stripe.com"));
        assert_eq!(url_host("http://user:pw@Inventory:8080/items").as_deref(), Some("inventory"));
        assert_eq!(url_host("https://${HOST}/x"), None);
        assert_eq!(url_host("/relative/path"), None);
    }

    #[test]
    fn test_boundaries_group_by_domain() {
        let state = Discovered {
            endpoints: vec![
                endpoint("/orders", Some("OrderController"), "src/OrderController.java"),
                endpoint("/orders/{id}", Some("OrderController"), "src/OrderController.java"),
                endpoint("/users", None, "users/views.py"),
            ],
            services: vec![service("OrderService", "src/OrderService.java")],
            models: vec![Model::new("Order", SourceLocation::new("src/Order.java", 1))],
            ..Discovered::default()
        };
        let signals = vec![
            Signal::HttpCall {
                target: "https://api.stripe.com/v1/charges".to_string(),
                component: "OrderService".to_string(),
                location: located("OrderService"),
            },
            Signal::Publish {
                topic: "orders".to_string(),
                component: "OrderService".to_string(),
                location: located("OrderService"),
            },
        ];
        let boundaries = discover_boundaries(&state, &signals);

        let names: Vec<(&str, BoundaryKind)> =
            boundaries.iter().map(|b| (b.name.as_str(), b.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("Order", BoundaryKind::Internal),
                ("User", BoundaryKind::Internal),
                (DATA_STORE, BoundaryKind::Data),
                ("Message Broker", BoundaryKind::External),
                ("api.stripe.com", BoundaryKind::External),
            ]
        );
        assert_eq!(boundaries[0].components.len(), 3);
        assert!(boundaries[0]
            .components
            .contains(&ComponentRef::Service("OrderService".to_string())));
        assert_eq!(boundaries[2].components, vec![ComponentRef::Model("Order".to_string())]);
    }

    #[test]
    fn test_external_names_do_not_shadow_internal() {
        let state = Discovered {
            services: vec![service("StripeService", "billing/stripe_service.py")],
            ..Discovered::default()
        };
        let signals = vec![Signal::ExternalSdk {
            name: "Stripe".to_string(),
            component: "StripeService".to_string(),
            location: located("StripeService"),
        }];
        let boundaries = discover_boundaries(&state, &signals);

        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].name, "Stripe");
        assert_eq!(boundaries[1].name, "Stripe (external)");
        assert_eq!(boundaries[1].kind, BoundaryKind::External);
    }

    #[test]
    fn test_data_store_from_persistence_only() {
        let mut billing = service("BillingService", "billing/service.py");
        let mut charge = ServiceMethod::new("charge", 3);
        charge.persistence_calls.push("save".to_string());
        billing.methods.push(charge);
        let state = Discovered {
            services: vec![billing],
            ..Discovered::default()
        };
        let boundaries = discover_boundaries(&state, &[]);

        assert_eq!(boundaries[1].name, DATA_STORE);
        assert!(boundaries[1].components.is_empty());
    }
}
