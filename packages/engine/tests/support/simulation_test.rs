#![allow(dead_code)]

use std::any::Any;
use std::sync::{Arc, Mutex};

use lix_state::sql::{classify_statements, StatementKind};
use lix_state::{
    boot, BootArgs, BootKeyValue, Engine, LixError, MaterializationRequest, Plugin, QueryResult,
    Session, StateCacheRow, StateFilter, Value,
};
use serde_json::json;

use super::simulations::default_simulations;

pub struct Simulation {
    pub name: &'static str,
    pub behavior: SimulationBehavior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationBehavior {
    Base,
    /// Repopulates the whole state cache before every read.
    Rematerialization,
    TimestampShuffle,
}

#[derive(Default)]
pub struct SimulationBootArgs {
    pub key_values: Vec<BootKeyValue>,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

pub struct SimulationArgs {
    name: &'static str,
    behavior: SimulationBehavior,
    expect: ExpectDeterministic,
}

impl SimulationArgs {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Boots a deterministic engine configured for this simulation.
    pub fn boot_simulated_engine(
        &self,
        args: Option<SimulationBootArgs>,
    ) -> Result<SimulationEngine, LixError> {
        super::init_tracing();
        let args = args.unwrap_or_default();
        let mut boot_args = BootArgs::new().with_key_value(
            "lix_deterministic_mode",
            json!({
                "enabled": true,
                "timestamp_shuffle": self.behavior == SimulationBehavior::TimestampShuffle,
            }),
        );
        boot_args.key_values.extend(args.key_values);
        boot_args.plugins = args.plugins;
        Ok(SimulationEngine {
            engine: boot(boot_args)?,
            behavior: self.behavior,
        })
    }

    pub fn assert_deterministic<T>(&self, actual: T)
    where
        T: PartialEq + std::fmt::Debug + Clone + Send + Sync + 'static,
    {
        self.expect.assert_deterministic(actual);
    }
}

pub struct SimulationEngine {
    engine: Engine,
    behavior: SimulationBehavior,
}

impl SimulationEngine {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn session(&self) -> Result<SimulationSession, LixError> {
        Ok(SimulationSession {
            session: self.engine.session()?,
            behavior: self.behavior,
        })
    }
}

pub struct SimulationSession {
    session: Session,
    behavior: SimulationBehavior,
}

impl SimulationSession {
    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, LixError> {
        let read_only = classify_statements(sql)?
            .iter()
            .all(|statement| statement.kind == StatementKind::Select);
        if read_only {
            self.rematerialize_before_read()?;
        }
        self.session.execute(sql, params)
    }

    pub fn resolve_state(&mut self, filter: &StateFilter) -> Result<Vec<StateCacheRow>, LixError> {
        self.rematerialize_before_read()?;
        self.session.resolve_state(filter)
    }

    fn rematerialize_before_read(&mut self) -> Result<(), LixError> {
        if self.behavior != SimulationBehavior::Rematerialization {
            return Ok(());
        }
        self.session
            .populate_state_cache(&MaterializationRequest::full())?;
        Ok(())
    }
}

/// Runs `body` under `simulation_name`. Non-base simulations first replay the
/// base simulation to record the values `assert_deterministic` compares
/// against.
pub fn run_simulation_test<F>(simulation_name: &str, case_id: &str, body: F)
where
    F: Fn(SimulationArgs),
{
    let simulations = default_simulations();
    let expect = ExpectDeterministic::new();

    let Some(simulation) = simulations
        .iter()
        .find(|simulation| simulation.name == simulation_name)
    else {
        panic!("unknown simulation `{simulation_name}` for case `{case_id}`");
    };

    if simulation.behavior != SimulationBehavior::Base {
        let baseline = simulations
            .iter()
            .find(|simulation| simulation.behavior == SimulationBehavior::Base)
            .expect("base simulation registered");
        expect.start_simulation(true);
        body(SimulationArgs {
            name: baseline.name,
            behavior: baseline.behavior,
            expect: expect.clone(),
        });
        expect.start_simulation(false);
    } else {
        expect.start_simulation(true);
    }

    body(SimulationArgs {
        name: simulation.name,
        behavior: simulation.behavior,
        expect: expect.clone(),
    });
    expect.finish(case_id);
}

#[derive(Clone)]
struct ExpectDeterministic {
    inner: Arc<Mutex<ExpectDeterministicState>>,
}

struct ExpectDeterministicState {
    expected_values: Vec<Box<dyn Any + Send + Sync>>,
    is_first: bool,
    call_index: usize,
}

impl ExpectDeterministic {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ExpectDeterministicState {
                expected_values: Vec::new(),
                is_first: true,
                call_index: 0,
            })),
        }
    }

    fn start_simulation(&self, is_first: bool) {
        let mut state = self
            .inner
            .lock()
            .expect("expect_deterministic mutex poisoned");
        state.is_first = is_first;
        state.call_index = 0;
    }

    fn assert_deterministic<T>(&self, actual: T)
    where
        T: PartialEq + std::fmt::Debug + Clone + Send + Sync + 'static,
    {
        let mut state = self
            .inner
            .lock()
            .expect("expect_deterministic mutex poisoned");
        let idx = state.call_index;
        state.call_index += 1;

        if state.is_first {
            state.expected_values.push(Box::new(actual));
            return;
        }

        let expected = state
            .expected_values
            .get(idx)
            .expect("expect_deterministic called more times than in baseline")
            .downcast_ref::<T>()
            .expect("expect_deterministic type mismatch across simulations");
        if &actual != expected {
            panic!(
                "SIMULATION DETERMINISM VIOLATION\n\nCall #{idx}: values differ across simulations\nactual: {actual:?}\nexpected: {expected:?}"
            );
        }
    }

    fn finish(&self, case_id: &str) {
        let state = self
            .inner
            .lock()
            .expect("expect_deterministic mutex poisoned");
        if !state.is_first && state.call_index != state.expected_values.len() {
            panic!(
                "SIMULATION DETERMINISM VIOLATION\n\nCase `{case_id}` made {} deterministic calls, baseline made {}",
                state.call_index,
                state.expected_values.len()
            );
        }
    }
}
