pub mod rules;

pub use rules::{coerce_boolean, RuleTransformer};
