// CADENCE STATE APPLIER
// THE HOST'S HANDLE ON REAL CONFIGURATION. THE CORE NEVER TOUCHES HARDWARE:
// IT PICKS A CATALOG ENTRY AND HANDS IT HERE.

use crate::catalog::ControlState;
use crate::error::ApplyError;

pub trait StateApplier {
    // MAKE `state` ACTIVE. MUST BE A NO-OP WHEN state.id IS ALREADY ACTIVE.
    // THE WHOLE ENTRY IS PASSED SO THE APPLIER CAN READ ITS KNOBS.
    fn apply(&mut self, state: &ControlState) -> Result<(), ApplyError>;

    // ID OF THE STATE CURRENTLY IN EFFECT
    fn query(&self) -> u32;
}

impl<A: StateApplier + ?Sized> StateApplier for &mut A {
    fn apply(&mut self, state: &ControlState) -> Result<(), ApplyError> {
        (**self).apply(state)
    }

    fn query(&self) -> u32 {
        (**self).query()
    }
}

impl<A: StateApplier + ?Sized> StateApplier for Box<A> {
    fn apply(&mut self, state: &ControlState) -> Result<(), ApplyError> {
        (**self).apply(state)
    }

    fn query(&self) -> u32 {
        (**self).query()
    }
}

// DRY-RUN APPLIER: REMEMBERS THE ACTIVE ID, NEVER FAILS
pub struct NoopApplier {
    active:  u32,
    applied: u64,
}

impl NoopApplier {
    pub fn new(active: u32) -> Self {
        Self { active, applied: 0 }
    }

    // NUMBER OF APPLY CALLS THAT CHANGED THE ACTIVE STATE
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

impl StateApplier for NoopApplier {
    fn apply(&mut self, state: &ControlState) -> Result<(), ApplyError> {
        if state.id != self.active {
            self.active = state.id;
            self.applied += 1;
        }
        Ok(())
    }

    fn query(&self) -> u32 {
        self.active
    }
}
