//! Completion Evaluator (§4.F) and Stagnation Detector (§4.G): two pure functions over
//! session history, with no I/O and no hidden state.

mod evaluator;
mod stagnation;

pub use evaluator::{evaluate, KillSwitchConfig};
pub use stagnation::{is_stagnant, pairwise_jaccard};
