//! Outcome tracking and the learning flywheel.
//!
//! Immutable outcome records close the loop on decisions: they feed the
//! accuracy and ROI reports and drive Bayesian prior updates back into the
//! risk engine.

pub mod accuracy;
pub mod flywheel;
pub mod recorder;
pub mod roi;

pub use accuracy::{AccuracyCalculator, AccuracyReport};
pub use flywheel::{FlywheelEngine, FlywheelState, PriorStore};
pub use recorder::{OutcomeRecord, OutcomeRecorder, OutcomeStore, OutcomeType};
pub use roi::{RoiCalculator, RoiReport};
