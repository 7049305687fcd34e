// Relationship synthesis
//
// Actor edges come from endpoint authentication matched against the way
// each actor was discovered. Boundary edges come from call signals (HTTP
// clients, SDKs, message queues), service dependencies and persistence.

use super::actors::{is_webhook, AUTHENTICATED_USER, PUBLIC_USER, SCHEDULER, WEBHOOK_CALLER};
use super::boundaries::{external_name, external_target, internal_names, DATA_STORE, MESSAGE_BROKER};
use super::is_transactional;
use crate::analysis::modules::{domain_for, domain_of};
use crate::model::{
    Actor, ActorKind, BoundaryKind, ComponentRef, Endpoint, Mechanism, NodeRef, Relationship,
    RelationshipKind,
};
use crate::parser::Signal;
use crate::plugins::Discovered;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Derives actor and boundary relationships from discovered entities
#[derive(Debug, Default)]
pub struct RelationshipMapper;

/// Lookup tables over one set of discovered boundaries
struct Index<'a> {
    state: &'a Discovered,
    members: HashMap<&'a ComponentRef, &'a str>,
    internal: BTreeSet<String>,
    nodes: BTreeSet<NodeRef>,
}

impl<'a> Index<'a> {
    fn new(state: &'a Discovered) -> Self {
        let mut members = HashMap::new();
        for boundary in state.boundaries() {
            for component in &boundary.components {
                members.entry(component).or_insert(boundary.name.as_str());
            }
        }
        let nodes = state
            .actors()
            .iter()
            .map(|a| NodeRef::Actor(a.name.clone()))
            .chain(state.boundaries().iter().map(|b| NodeRef::Boundary(b.name.clone())))
            .collect();

        Self {
            state,
            members,
            internal: internal_names(state.boundaries()),
            nodes,
        }
    }

    fn boundary_of(&self, component: &ComponentRef) -> Option<&'a str> {
        self.members.get(component).copied()
    }

    /// Boundary of a signal's component, falling back to its file's domain
    fn boundary_of_signal(&self, signal: &Signal, component: &str) -> Option<String> {
        if let Some(name) = self.boundary_of(&ComponentRef::Service(component.to_string())) {
            return Some(name.to_string());
        }
        let domain = domain_for(Some(component), &signal.location().file);
        self.internal.contains(&domain).then_some(domain)
    }

    fn external(&self, signal: &Signal) -> Option<String> {
        external_target(signal).map(|raw| external_name(&raw, &self.internal))
    }
}

fn boundary(name: impl Into<String>) -> NodeRef {
    NodeRef::Boundary(name.into())
}

impl RelationshipMapper {
    pub fn new() -> Self {
        Self
    }

    /// Map relationships: sorted, deduplicated by (from, to, kind), no
    /// self-loops and no references to unknown nodes
    pub fn map(&self, state: &Discovered, signals: &[Signal]) -> Vec<Relationship> {
        let index = Index::new(state);
        let mut edges: Vec<Relationship> = Vec::new();

        self.actor_edges(&index, &mut edges);
        self.signal_edges(&index, signals, &mut edges);
        self.service_edges(&index, &mut edges);

        let mut merged: BTreeMap<(NodeRef, NodeRef, RelationshipKind), Mechanism> = BTreeMap::new();
        for edge in edges {
            if edge.from == edge.to {
                continue;
            }
            if !index.nodes.contains(&edge.from) || !index.nodes.contains(&edge.to) {
                debug!("Dropping relationship to unknown node: {:?} -> {:?}", edge.from, edge.to);
                continue;
            }
            // Smallest mechanism wins
            match merged.entry((edge.from, edge.to, edge.kind)) {
                Entry::Occupied(mut existing) => {
                    if edge.mechanism < *existing.get() {
                        existing.insert(edge.mechanism);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(edge.mechanism);
                }
            }
        }

        merged
            .into_iter()
            .map(|((from, to, kind), mechanism)| Relationship {
                from,
                to,
                kind,
                mechanism,
            })
            .collect()
    }

    /// Which actors can reach an endpoint
    fn reaches(actor: &Actor, endpoint: &Endpoint) -> bool {
        if is_webhook(endpoint) {
            return actor.name == WEBHOOK_CALLER;
        }
        if let Some(role) = &actor.access_role {
            return endpoint.requires_auth
                && (endpoint.roles.is_empty() || endpoint.roles.contains(role));
        }
        match actor.name.as_str() {
            PUBLIC_USER => !endpoint.requires_auth,
            AUTHENTICATED_USER => endpoint.requires_auth && endpoint.roles.is_empty(),
            _ => false,
        }
    }

    fn actor_edges(&self, index: &Index<'_>, edges: &mut Vec<Relationship>) {
        let state = index.state;
        for endpoint in &state.endpoints {
            let Some(target) = index.boundary_of(&ComponentRef::Endpoint(endpoint.key())) else {
                continue;
            };
            for actor in state.actors().iter().filter(|a| Self::reaches(a, endpoint)) {
                edges.push(Relationship {
                    from: NodeRef::Actor(actor.name.clone()),
                    to: boundary(target),
                    kind: RelationshipKind::Uses,
                    mechanism: Mechanism::Http,
                });
            }
        }

        let scheduler = state
            .actors()
            .iter()
            .any(|a| a.name == SCHEDULER && a.kind == ActorKind::System);
        if !scheduler {
            return;
        }
        for service in &state.services {
            if !service.methods.iter().any(|m| m.scheduled) {
                continue;
            }
            if let Some(target) = index.boundary_of(&ComponentRef::Service(service.name.clone())) {
                edges.push(Relationship {
                    from: NodeRef::Actor(SCHEDULER.to_string()),
                    to: boundary(target),
                    kind: RelationshipKind::Triggers,
                    mechanism: Mechanism::Schedule,
                });
            }
        }
    }

    fn signal_edges(&self, index: &Index<'_>, signals: &[Signal], edges: &mut Vec<Relationship>) {
        // topic -> subscribing boundaries
        let mut subscribers: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for signal in signals {
            if let Signal::Subscribe { topic, component, .. } = signal {
                if let Some(from) = index.boundary_of_signal(signal, component) {
                    subscribers.entry(topic.as_str()).or_default().insert(from);
                }
            }
        }

        for signal in signals {
            let (component, kind, mechanism) = match signal {
                Signal::HttpCall { component, .. } => {
                    (component, RelationshipKind::Calls, Mechanism::Http)
                }
                Signal::ExternalSdk { component, name, .. } => {
                    (component, RelationshipKind::Calls, Mechanism::Sdk(name.clone()))
                }
                Signal::Publish { component, topic, .. } => (
                    component,
                    RelationshipKind::Publishes,
                    Mechanism::MessageQueue(topic.clone()),
                ),
                Signal::Subscribe { component, topic, .. } => {
                    // broker -> consumer
                    if let Some(consumer) = index.boundary_of_signal(signal, component) {
                        edges.push(Relationship {
                            from: boundary(MESSAGE_BROKER),
                            to: boundary(consumer),
                            kind: RelationshipKind::Publishes,
                            mechanism: Mechanism::MessageQueue(topic.clone()),
                        });
                    }
                    continue;
                }
                _ => continue,
            };
            let (Some(from), Some(to)) = (index.boundary_of_signal(signal, component), index.external(signal))
            else {
                continue;
            };

            if let Signal::Publish { topic, .. } = signal {
                for consumer in subscribers.get(topic.as_str()).into_iter().flatten() {
                    edges.push(Relationship {
                        from: boundary(from.clone()),
                        to: boundary(consumer.clone()),
                        kind: RelationshipKind::Publishes,
                        mechanism: mechanism.clone(),
                    });
                }
            }
            edges.push(Relationship {
                from: boundary(from),
                to: boundary(to),
                kind,
                mechanism,
            });
        }
    }

    fn service_edges(&self, index: &Index<'_>, edges: &mut Vec<Relationship>) {
        let state = index.state;
        let data_store = state
            .boundaries()
            .iter()
            .any(|b| b.name == DATA_STORE && b.kind == BoundaryKind::Data);

        for service in &state.services {
            let Some(from) = index.boundary_of(&ComponentRef::Service(service.name.clone())) else {
                continue;
            };
            for dependency in &service.dependencies {
                if let Some(to) = index.boundary_of(&ComponentRef::Service(dependency.clone())) {
                    edges.push(Relationship {
                        from: boundary(from),
                        to: boundary(to),
                        kind: RelationshipKind::DependsOn,
                        mechanism: Mechanism::InProcess,
                    });
                }
            }
            if data_store && service.methods.iter().any(is_transactional) {
                edges.push(Relationship {
                    from: boundary(from),
                    to: boundary(DATA_STORE),
                    kind: RelationshipKind::Persists,
                    mechanism: Mechanism::Database,
                });
            }
        }

        // Domains owning a model read and write it
        if data_store {
            for model in &state.models {
                if let Some(domain) = domain_of(&model.name).filter(|d| index.internal.contains(d)) {
                    edges.push(Relationship {
                        from: boundary(domain),
                        to: boundary(DATA_STORE),
                        kind: RelationshipKind::Persists,
                        mechanism: Mechanism::Database,
                    });
                }
            }
        }
    }
}
