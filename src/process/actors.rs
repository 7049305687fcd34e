// Actor discovery
//
// Actors come from independent signals: endpoint authentication, role
// requirements, schedules and inbound webhooks. Signals naming the same
// (name, kind) collapse into one actor carrying all of their provenance.

use crate::analysis::modules::{humanize, words};
use crate::model::{Actor, ActorKind, Endpoint, Provenance, SourceLocation};
use crate::parser::Signal;
use crate::plugins::Discovered;
use std::collections::BTreeMap;

pub const PUBLIC_USER: &str = "Public User";
pub const AUTHENTICATED_USER: &str = "Authenticated User";
pub const SCHEDULER: &str = "Scheduler";
pub const WEBHOOK_CALLER: &str = "Webhook Caller";

/// Role words that denote machine callers rather than people
const SYSTEM_ROLE_WORDS: [&str; 8] = [
    "system", "service", "api", "internal", "machine", "bot", "integration", "client",
];

/// Actor name for a role key: `SUPER_ADMIN` -> `Super Admin`
pub fn role_actor_name(role: &str) -> String {
    humanize(&role.to_lowercase())
}

/// Human unless the role reads like a machine account
pub fn role_actor_kind(role: &str) -> ActorKind {
    if words(&role.to_lowercase())
        .iter()
        .any(|w| SYSTEM_ROLE_WORDS.contains(&w.as_str()))
    {
        ActorKind::System
    } else {
        ActorKind::Human
    }
}

/// Endpoints called by third parties rather than users
pub fn is_webhook(endpoint: &Endpoint) -> bool {
    let path = endpoint.path.to_lowercase();
    path.contains("webhook") || path.contains("callback")
}

#[derive(Default)]
struct ActorSet {
    actors: BTreeMap<(ActorKind, String), Actor>,
}

impl ActorSet {
    fn add(
        &mut self,
        name: &str,
        kind: ActorKind,
        requires_auth: bool,
        access_role: Option<&str>,
        provenance: Provenance,
    ) {
        let actor = self
            .actors
            .entry((kind, name.to_string()))
            .or_insert_with(|| Actor {
                name: name.to_string(),
                kind,
                requires_auth,
                access_role: None,
                provenance: Vec::new(),
            });
        actor.requires_auth |= requires_auth;
        if actor.access_role.is_none() {
            actor.access_role = access_role.map(str::to_string);
        }
        if !actor.provenance.contains(&provenance) {
            actor.provenance.push(provenance);
        }
    }

    fn add_role(&mut self, role: &str, provenance: Provenance) {
        self.add(
            &role_actor_name(role),
            role_actor_kind(role),
            true,
            Some(role),
            provenance,
        );
    }

    fn finish(self) -> Vec<Actor> {
        self.actors
            .into_values()
            .map(|mut actor| {
                actor.provenance.sort();
                actor
            })
            .collect()
    }
}

/// Discover the actors of a system, ordered by kind then name
pub fn discover_actors(state: &Discovered, signals: &[Signal]) -> Vec<Actor> {
    let mut set = ActorSet::default();

    for endpoint in &state.endpoints {
        let key = endpoint.key();
        if is_webhook(endpoint) {
            set.add(
                WEBHOOK_CALLER,
                ActorKind::External,
                endpoint.requires_auth,
                None,
                Provenance::new(format!("webhook endpoint {}", key), &endpoint.location),
            );
            continue;
        }

        if !endpoint.requires_auth {
            set.add(
                PUBLIC_USER,
                ActorKind::Human,
                false,
                None,
                Provenance::new(format!("public endpoint {}", key), &endpoint.location),
            );
        } else if endpoint.roles.is_empty() {
            set.add(
                AUTHENTICATED_USER,
                ActorKind::Human,
                true,
                None,
                Provenance::new(format!("authenticated endpoint {}", key), &endpoint.location),
            );
        }
        for role in &endpoint.roles {
            set.add_role(
                role,
                Provenance::new(format!("role {} on {}", role, key), &endpoint.location),
            );
        }
    }

    for signal in signals {
        if let Signal::RoleRequirement { role, location } = signal {
            set.add_role(role, Provenance::new(format!("role requirement {}", role), location));
        }
    }

    for service in &state.services {
        for method in service.methods.iter().filter(|m| m.scheduled) {
            let location = SourceLocation::new(service.location.file.clone(), method.line);
            set.add(
                SCHEDULER,
                ActorKind::System,
                false,
                None,
                Provenance::new(
                    format!("scheduled method {}.{}", service.name, method.name),
                    &location,
                ),
            );
        }
    }

    set.finish()
}
