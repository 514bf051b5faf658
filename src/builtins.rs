//! Functions provided by the Skript runtime itself
//!
//! Calls to these names never need a declaration in the workspace.

use phf::phf_set;

pub static BUILTIN_FUNCTIONS: phf::Set<&'static str> = phf_set! {
    // math
    "abs",
    "acos",
    "asin",
    "atan",
    "atan2",
    "ceil",
    "ceiling",
    "clamp",
    "cos",
    "exp",
    "floor",
    "isNaN",
    "ln",
    "log",
    "max",
    "min",
    "mod",
    "product",
    "round",
    "sin",
    "sqrt",
    "sum",
    "tan",
    // conversion
    "fromBase",
    "toBase",
    "formatNumber",
    // text
    "caseEquals",
    "concat",
    "join",
    // constructors
    "date",
    "location",
    "offlineplayer",
    "player",
    "rgb",
    "vector",
    "world",
    "quaternion",
    "axisAngle",
    "calcExperience",
    "uuid",
};

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_FUNCTIONS.contains(name)
}
