// Merging of per-file extraction results
//
// The same model or service can show up in several files (a Rails model and
// `db/schema.rb`, an association declared outside the model body). Results
// are accumulated by name, so the outcome does not depend on file order
// beyond which location is kept.

use crate::model::{Model, Service};
use crate::parser::FileScan;
use std::collections::BTreeMap;

/// Merge models by name; fields stay unique, the first location wins
pub fn merge_models<'a>(scans: impl IntoIterator<Item = &'a FileScan>) -> Vec<Model> {
    let mut merged: BTreeMap<String, Model> = BTreeMap::new();

    for model in scans.into_iter().flat_map(|s| s.models.iter()) {
        match merged.get_mut(&model.name) {
            Some(existing) => {
                // A stub created from an external association has no fields;
                // prefer a real declaration's location
                if existing.fields.is_empty() && !model.fields.is_empty() {
                    existing.location = model.location.clone();
                }
                for field in &model.fields {
                    existing.add_field(field.clone());
                }
                for association in &model.associations {
                    existing.add_association(association.clone());
                }
            }
            None => {
                merged.insert(model.name.clone(), model.clone());
            }
        }
    }

    merged.into_values().collect()
}

/// Merge services by name; methods are unique by name
pub fn merge_services<'a>(scans: impl IntoIterator<Item = &'a FileScan>) -> Vec<Service> {
    let mut merged: BTreeMap<String, Service> = BTreeMap::new();

    for service in scans.into_iter().flat_map(|s| s.services.iter()) {
        match merged.get_mut(&service.name) {
            Some(existing) => {
                for dependency in &service.dependencies {
                    if !existing.dependencies.contains(dependency) {
                        existing.dependencies.push(dependency.clone());
                    }
                }
                for method in &service.methods {
                    match existing.methods.iter_mut().find(|m| m.name == method.name) {
                        Some(known) => {
                            known.transactional |= method.transactional;
                            known.is_async |= method.is_async;
                            known.scheduled |= method.scheduled;
                            known.retry |= method.retry;
                            for call in &method.persistence_calls {
                                if !known.persistence_calls.contains(call) {
                                    known.persistence_calls.push(call.clone());
                                }
                            }
                        }
                        None => existing.methods.push(method.clone()),
                    }
                }
            }
            None => {
                merged.insert(service.name.clone(), service.clone());
            }
        }
    }

    merged.into_values().collect()
}
