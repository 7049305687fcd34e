// Parser module for extracting architecture facts from source text
//
// There is no AST here: each framework supplies a table of pattern rules and
// the scanner runs them over raw lines.

pub mod decode;
pub mod rules;
pub mod scan;

pub use decode::{check_structure, decode, CommentStyle};
pub use rules::{ConstraintRule, MarkerScope, Role, RuleMatch, RuleSet};
pub use scan::{
    join_paths, normalize_path, parse_handler, parse_roles, path_parameters, scan_file, Access,
    FileScan, MountTarget, Signal, ANONYMOUS_HANDLER,
};
