use crate::support::simulation_test::{Simulation, SimulationBehavior};

pub fn timestamp_shuffle_simulation() -> Simulation {
    let mut simulation = super::base::base_simulation();
    simulation.name = "timestamp_shuffle";
    simulation.behavior = SimulationBehavior::TimestampShuffle;
    simulation
}
