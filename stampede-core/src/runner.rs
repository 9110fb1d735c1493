mod gate;
mod ids;
mod pacer;
mod phase;
mod schedule;
mod scheduler;
mod signal;
mod vu;

pub use gate::IterationGate;
pub use pacer::ArrivalPacer;
pub use phase::{PhaseTransition, ScenarioPhase};
pub use schedule::RampingU64Schedule;
pub use scheduler::{ScenarioSummary, StopReason, VuFailure};
pub use signal::Signal;
pub use vu::Vu;

pub(crate) use ids::VuIdPool;
pub(crate) use scheduler::{ScenarioLaunch, spawn_scenario};
pub(crate) use vu::RunShared;
