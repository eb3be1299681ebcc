use crate::support::simulation_test::{Simulation, SimulationBehavior};

pub fn materialization_simulation() -> Simulation {
    let mut simulation = super::base::base_simulation();
    simulation.name = "materialization";
    simulation.behavior = SimulationBehavior::Rematerialization;
    simulation
}
