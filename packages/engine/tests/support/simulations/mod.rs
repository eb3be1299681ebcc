mod base;
mod materialization;
mod timestamp_shuffle;

use crate::support::simulation_test::Simulation;

pub use base::base_simulation;
pub use materialization::materialization_simulation;
pub use timestamp_shuffle::timestamp_shuffle_simulation;

pub fn default_simulations() -> Vec<Simulation> {
    vec![
        base_simulation(),
        materialization_simulation(),
        timestamp_shuffle_simulation(),
    ]
}
