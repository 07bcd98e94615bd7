mod config;
mod controller;
mod error;
mod gate;
mod ramp;
mod result;
mod scenario;
mod signal;
mod state;
mod worker;

pub use config::{DEFAULT_REQUEST_TIMEOUT, RunnerConfig};
pub use controller::TestExecutionController;
pub use error::{Error, FailureKind, Result};
pub use gate::HoldGate;
pub use ramp::RampSchedule;
pub use result::{FailureReason, RunReport, ScenarioResult};
pub use scenario::ScenarioRunner;
pub use signal::AbortHandle;
pub use state::ScenarioState;
