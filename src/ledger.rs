//! Id generators, row counters and the event log's per-kind counts.
//!
//! Ids are handed out in increasing order and given back in reverse order,
//! so a rolled back block leaves every counter where it found it and the
//! same ids are reused when blocks are applied again.
//!
//! Ids are unique among the rows present at any time, not over the life of
//! the index: a row removed by a rollback may see its id go to a different
//! row of the replacing branch. Consumers caching ids across reorgs have to
//! drop them when they get a rollback message for the level that created them.
use crate::core::types::OperationId;
use crate::engine::Inconsistency;
use crate::schema::AppState;
use crate::schema::Counter;
use crate::schema::OperationKind;

/// Issues the next id of an id generating counter.
pub fn allocate(app: &mut AppState, counter: Counter) -> i64 {
    let value = app.counter_mut(counter);
    *value += 1;
    *value
}

/// Gives back the last id issued by `counter`.
pub fn release(app: &mut AppState, counter: Counter, id: i64) -> Result<(), Inconsistency> {
    let last = app.counter(counter);
    if id != last {
        return Err(Inconsistency::NonLifoRelease { counter, id, last });
    }
    decrement(app, counter)
}

/// Counts a row of a table without id generator.
pub fn increment(app: &mut AppState, counter: Counter) {
    *app.counter_mut(counter) += 1;
}

pub fn decrement(app: &mut AppState, counter: Counter) -> Result<(), Inconsistency> {
    let value = app.counter_mut(counter);
    if *value <= 0 {
        return Err(Inconsistency::CounterUnderflow(counter));
    }
    *value -= 1;
    Ok(())
}

/// Assigns the id of a new event log entry and counts it.
pub fn append(app: &mut AppState, kind: OperationKind) -> OperationId {
    app.ops_counts.add(kind, 1);
    allocate(app, Counter::Operation)
}

/// Removes the last event log entry.
pub fn remove(app: &mut AppState, kind: OperationKind, id: OperationId) -> Result<(), Inconsistency> {
    release(app, Counter::Operation, id)?;
    if !app.ops_counts.add(kind, -1) {
        return Err(Inconsistency::CounterUnderflow(Counter::Operation));
    }
    Ok(())
}
