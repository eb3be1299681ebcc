use crate::support::simulation_test::{Simulation, SimulationBehavior};

pub fn base_simulation() -> Simulation {
    Simulation {
        name: "base",
        behavior: SimulationBehavior::Base,
    }
}
