//! Compile-time-checked job state machine, the same use of the
//! `state-machines` crate as the teacher's
//! `ingestion-pipeline::pipeline::state::IngestionMachine`. This mirrors the
//! persisted `JobStatus` transitions; the worker pool drives it alongside
//! (not instead of) the actual SurrealDB row update, so an attempt to apply
//! an illegal transition (e.g. completing an already-dead job) is caught by
//! the type system in the pool's own bookkeeping even before the database
//! round-trip would reject it.

use state_machines::state_machine;

state_machine! {
    name: JobMachine,
    state: JobMachineState,
    initial: Pending,
    states: [Pending, Processing, Completed, Dead],
    events {
        claim { transition: { from: Pending, to: Processing } }
        complete { transition: { from: Processing, to: Completed } }
        retry { transition: { from: Processing, to: Pending } }
        kill { transition: { from: Processing, to: Dead } }
    }
}

pub fn pending() -> JobMachine<(), Pending> {
    JobMachine::new(())
}
