// Framework detection
//
// Each plugin registers a signature: the manifests its ecosystem uses, the
// dependency declarations that name the framework, and the directory layout
// it conventionally produces. Scores are weighted and the best candidate
// above the confidence floor wins.

use crate::error::{Error, Result};
use crate::model::TechStack;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

const MANIFEST_WEIGHT: f64 = 0.30;
const DEPENDENCY_WEIGHT: f64 = 0.50;
const LAYOUT_WEIGHT: f64 = 0.20;

/// Upper bound on bytes read from a single manifest
pub const MAX_MANIFEST_BYTES: u64 = 256 * 1024;

/// Scores closer than this are reported as ambiguous
const AMBIGUITY_MARGIN: f64 = 0.1;

/// How to recognize a framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkSignature {
    pub id: &'static str,
    pub language: &'static str,
    /// Manifest files at the repository root
    pub manifests: &'static [&'static str],
    /// Patterns matched against manifest contents; a `version` capture is
    /// used as the detected version
    pub dependency_patterns: &'static [&'static str],
    /// Files or directories typical for the framework; `*/name` matches
    /// `name` inside any top-level directory
    pub layout: &'static [&'static str],
}

/// Score of one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub language: String,
    pub version: Option<String>,
    pub manifest: f64,
    pub dependency: f64,
    pub layout: f64,
}

impl Candidate {
    /// Weighted score in `[0, 1]`
    pub fn score(&self) -> f64 {
        MANIFEST_WEIGHT * self.manifest + DEPENDENCY_WEIGHT * self.dependency + LAYOUT_WEIGHT * self.layout
    }
}

/// Detection outcome with the evidence behind it
#[derive(Debug, Clone)]
pub struct Detection {
    pub stack: TechStack,
    /// All candidates, best first
    pub candidates: Vec<Candidate>,
    /// Low-confidence or ambiguity notes
    pub warnings: Vec<String>,
}

struct CompiledSignature {
    signature: FrameworkSignature,
    patterns: Vec<Regex>,
}

/// Scores registered framework signatures against a repository
pub struct FrameworkDetector {
    signatures: Vec<CompiledSignature>,
    min_confidence: f64,
}

impl FrameworkDetector {
    /// Compile signatures; registration order breaks ties
    pub fn new(signatures: Vec<FrameworkSignature>, min_confidence: f64) -> Result<Self> {
        let mut compiled = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let patterns = signature
                .dependency_patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| Error::rule(format!("{} dependency", signature.id), *p, e))
                })
                .collect::<Result<Vec<_>>>()?;
            compiled.push(CompiledSignature { signature, patterns });
        }
        Ok(Self {
            signatures: compiled,
            min_confidence,
        })
    }

    /// Detect the framework of a repository
    pub fn detect(&self, root: &Path) -> TechStack {
        self.assess(root).stack
    }

    /// Detect the framework and keep the scoring evidence
    ///
    /// Only the manifests named by signatures are read, each capped at
    /// [`MAX_MANIFEST_BYTES`].
    pub fn assess(&self, root: &Path) -> Detection {
        let mut candidates: Vec<(usize, Candidate)> = self
            .signatures
            .iter()
            .enumerate()
            .map(|(order, compiled)| (order, score_signature(compiled, root)))
            .collect();

        // Stable sort keeps registration order for equal scores
        candidates.sort_by(|(ao, a), (bo, b)| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ao.cmp(bo))
        });
        let candidates: Vec<Candidate> = candidates.into_iter().map(|(_, c)| c).collect();

        for candidate in &candidates {
            debug!(
                "Framework {} scored {:.2} (manifest {:.0}, dependency {:.0}, layout {:.2})",
                candidate.id,
                candidate.score(),
                candidate.manifest,
                candidate.dependency,
                candidate.layout
            );
        }

        let mut warnings = Vec::new();
        let stack = match candidates.first() {
            Some(best) if best.score() >= self.min_confidence => {
                if let Some(runner_up) = candidates.get(1) {
                    if runner_up.score() >= self.min_confidence
                        && best.score() - runner_up.score() < AMBIGUITY_MARGIN
                    {
                        warnings.push(format!(
                            "Ambiguous framework detection: {} ({:.2}) vs {} ({:.2}); using {}",
                            best.id,
                            best.score(),
                            runner_up.id,
                            runner_up.score(),
                            best.id
                        ));
                    }
                }
                TechStack {
                    framework_id: best.id.clone(),
                    language: best.language.clone(),
                    version: best.version.clone(),
                    confidence: best.score(),
                }
            }
            best => {
                let (id, score) = best
                    .map(|c| (c.id.as_str(), c.score()))
                    .unwrap_or(("none", 0.0));
                warnings.push(format!(
                    "No framework reached confidence {:.2} (best: {} at {:.2}); using generic analysis",
                    self.min_confidence, id, score
                ));
                TechStack::generic(0.0)
            }
        };

        for warning in &warnings {
            warn!("{}", warning);
        }

        Detection {
            stack,
            candidates,
            warnings,
        }
    }
}

fn score_signature(compiled: &CompiledSignature, root: &Path) -> Candidate {
    let signature = &compiled.signature;
    let manifests: Vec<String> = signature
        .manifests
        .iter()
        .filter_map(|name| read_manifest(&root.join(name)))
        .collect();

    let mut version = None;
    let dependency_found = compiled.patterns.iter().any(|pattern| {
        manifests.iter().any(|contents| match pattern.captures(contents) {
            Some(caps) => {
                version = caps.name("version").map(|m| m.as_str().to_string());
                true
            }
            None => false,
        })
    });

    let layout = if signature.layout.is_empty() {
        0.0
    } else {
        let present = signature
            .layout
            .iter()
            .filter(|marker| layout_present(root, marker))
            .count();
        present as f64 / signature.layout.len() as f64
    };

    Candidate {
        id: signature.id.to_string(),
        language: signature.language.to_string(),
        version,
        manifest: if manifests.is_empty() { 0.0 } else { 1.0 },
        dependency: if dependency_found { 1.0 } else { 0.0 },
        layout,
    }
}

/// Read at most [`MAX_MANIFEST_BYTES`] of a manifest
fn read_manifest(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    let mut buffer = Vec::new();
    File::open(path)
        .ok()?
        .take(MAX_MANIFEST_BYTES)
        .read_to_end(&mut buffer)
        .ok()?;
    Some(String::from_utf8_lossy(&buffer).into_owned())
}

fn layout_present(root: &Path, marker: &str) -> bool {
    match marker.strip_prefix("*/") {
        Some(rest) => std::fs::read_dir(root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                    .any(|e| e.path().join(rest).exists())
            })
            .unwrap_or(false),
        None => root.join(marker).exists(),
    }
}
