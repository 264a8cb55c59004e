//! Protocol activations, block rows, baking rewards and the head.
use super::accounts;
use super::cycles;
use super::error::Inconsistency;
use super::error::MutationError;
use super::unit::Unit;
use super::Direction;
use crate::ledger;
use crate::schema::AppState;
use crate::schema::Block;
use crate::schema::Counter;
use crate::schema::DecodedBlock;
use crate::schema::Protocol;
use crate::schema::RowKey;
use crate::store::Store;

/// Checks that a block extends the current head.
///
/// Any block is accepted on an empty index.
pub(super) fn validate(app: &AppState, block: &DecodedBlock) -> Result<(), Inconsistency> {
    if app.head().is_initial() {
        return Ok(());
    }
    if block.level != app.level + 1 {
        return Err(Inconsistency::UnexpectedLevel {
            expected: app.level + 1,
            got: block.level,
        });
    }
    if block.predecessor != app.hash {
        return Err(Inconsistency::PredecessorMismatch {
            expected: app.hash.clone(),
            got: block.predecessor.clone(),
        });
    }
    Ok(())
}

/// Registers the block's protocol if it differs from the current one.
pub(super) async fn activate_protocol<S: Store>(
    unit: &mut Unit<'_, S>,
    block: &DecodedBlock,
    first_cycle: i32,
) -> Result<(), MutationError> {
    if block.protocol == unit.app.protocol {
        return Ok(());
    }
    let level = unit.level;
    if unit.app.proto_code > 0 {
        let mut previous: Protocol = unit.require(RowKey::Protocol(unit.app.proto_code)).await?;
        previous.last_level = Some(level - 1);
        unit.put(previous);
    }
    let code = unit.allocate(Counter::Protocol) as i32;
    tracing::info!("protocol {} activated at level {level}", block.protocol);
    unit.put(Protocol {
        code,
        hash: block.protocol.clone(),
        first_level: level,
        first_cycle,
        last_level: None,
    });
    unit.app.protocol = block.protocol.clone();
    unit.app.proto_code = code;
    Ok(())
}

/// Drops a protocol activated at the current level, reopening the previous one.
pub(super) async fn revert_protocol<S: Store>(unit: &mut Unit<'_, S>) -> Result<(), MutationError> {
    for protocol in unit.rows_at::<Protocol>().await?.into_iter().rev() {
        unit.drop_row(RowKey::Protocol(protocol.code), Counter::Protocol)
            .await?;
        if protocol.code > 1 {
            let mut previous: Protocol = unit.require(RowKey::Protocol(protocol.code - 1)).await?;
            previous.last_level = None;
            unit.put(previous);
        }
    }
    Ok(())
}

/// Inserts the block row and credits baking rewards.
pub(super) async fn insert<S: Store>(
    unit: &mut Unit<'_, S>,
    block: &DecodedBlock,
) -> Result<Block, MutationError> {
    let proposer_id = accounts::resolve(unit, &block.proposer).await?;
    let producer_id = accounts::resolve(unit, block.producer()).await?;
    let row = Block {
        level: block.level,
        hash: block.hash.clone(),
        cycle: unit.app.cycle,
        timestamp: block.timestamp,
        proto_code: unit.app.proto_code,
        payload_round: block.payload_round,
        proposer_id,
        producer_id,
        reward: block.reward,
        bonus: block.bonus,
        fees: 0,
        operations_count: block.operations.len() as i32,
        validations: 0,
    };
    unit.put(row.clone());
    ledger::increment(&mut unit.app, Counter::Block);
    baking(unit, &row, Direction::Apply).await?;
    Ok(row)
}

/// Rewards of the proposer and producer.
pub(super) async fn baking<S: Store>(
    unit: &mut Unit<'_, S>,
    block: &Block,
    dir: Direction,
) -> Result<(), MutationError> {
    let s = dir.sign();
    accounts::change_balance(unit, block.proposer_id, s * block.reward).await?;
    accounts::change_balance(unit, block.producer_id, s * block.bonus).await?;
    unit.app.total_created += s * (block.reward + block.bonus);

    let (reward, bonus) = (block.reward, block.bonus);
    cycles::update_baker(unit, block.proposer_id, dir, move |bc| {
        bc.blocks += dir.step();
        bc.block_rewards += s * reward;
    })
    .await?;
    cycles::update_baker(unit, block.producer_id, dir, move |bc| {
        bc.block_bonuses += s * bonus;
    })
    .await?;

    accounts::mark_active(unit, block.proposer_id, dir).await?;
    accounts::mark_active(unit, block.producer_id, dir).await
}

/// Applies `f` to the row of the current block.
pub(super) async fn update_current<S: Store, F: FnOnce(&mut Block) + Send>(
    unit: &mut Unit<'_, S>,
    f: F,
) -> Result<(), MutationError> {
    let mut block: Block = unit.require(RowKey::Block(unit.level)).await?;
    f(&mut block);
    unit.put(block);
    Ok(())
}

/// Deletes the current block and moves the head to its predecessor.
pub(super) async fn remove<S: Store>(unit: &mut Unit<'_, S>) -> Result<(), MutationError> {
    let level = unit.level;
    unit.delete(RowKey::Block(level)).await?;
    let res = ledger::decrement(&mut unit.app, Counter::Block);
    unit.check(res)?;

    let previous: Option<Block> = unit.get(RowKey::Block(level - 1)).await?;
    if previous.is_none() && unit.app.blocks_count > 0 {
        return Err(unit.fail(Inconsistency::MissingRow(RowKey::Block(level - 1))));
    }
    let app = &mut unit.app;
    match previous {
        Some(previous) => {
            app.level = previous.level;
            app.hash = previous.hash;
            app.timestamp = previous.timestamp;
            app.cycle = previous.cycle;
            app.proto_code = previous.proto_code;
        }
        None => {
            let initial = AppState::initial();
            app.level = initial.level;
            app.hash = initial.hash;
            app.timestamp = initial.timestamp;
            app.cycle = initial.cycle;
            app.proto_code = initial.proto_code;
        }
    }
    let protocol = match unit.app.proto_code {
        0 => String::new(),
        code => unit.require::<Protocol>(RowKey::Protocol(code)).await?.hash,
    };
    unit.app.protocol = protocol;
    Ok(())
}
