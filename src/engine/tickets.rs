//! Ticket ledger: transfers folded into tickets and per-holder balances.
use num_bigint::BigInt;
use num_bigint::Sign;

use super::accounts;
use super::error::Inconsistency;
use super::error::MutationError;
use super::unit::Unit;
use super::Direction;
use crate::core::types::AccountId;
use crate::schema::Counter;
use crate::schema::IndexKey;
use crate::schema::RowKey;
use crate::schema::Subject;
use crate::schema::Ticket;
use crate::schema::TicketBalance;
use crate::schema::TicketMovement;
use crate::schema::TicketTransfer;
use crate::schema::TicketTransferCause;
use crate::store::Store;

/// Appends a ticket transfer and folds it into the ticket and both balances.
pub(super) async fn apply<S: Store>(
    unit: &mut Unit<'_, S>,
    movement: &TicketMovement,
    cause: TicketTransferCause,
) -> Result<(), MutationError> {
    if movement.amount.sign() == Sign::Minus {
        return Err(unit.fail(Inconsistency::InvalidInput(format!(
            "negative ticket amount {}",
            movement.amount
        ))));
    }
    if movement.from.is_none() && movement.to.is_none() {
        return Err(unit.fail(Inconsistency::InvalidInput(String::from(
            "ticket transfer without sender nor receiver",
        ))));
    }
    let level = unit.level;
    let ticketer_id = accounts::resolve(unit, &movement.ticketer).await?;
    let key = IndexKey::Ticket {
        ticketer_id,
        content_hash: movement.content_hash.clone(),
    };
    let mut ticket = match unit.find::<Ticket>(&key).await? {
        Some(ticket) => ticket,
        None => {
            let mut ticketer = accounts::get(unit, ticketer_id).await?;
            ticketer.tickets_count += 1;
            unit.put(ticketer);
            Ticket {
                id: unit.allocate(Counter::Ticket),
                ticketer_id,
                content_hash: movement.content_hash.clone(),
                content_type: movement.content_type.clone(),
                content: movement.content.clone(),
                first_level: level,
                last_level: level,
                transfers_count: 0,
                balances_count: 0,
                holders_count: 0,
                total_minted: BigInt::default(),
                total_burned: BigInt::default(),
                total_supply: BigInt::default(),
            }
        }
    };
    let from_id = accounts::resolve_holder(unit, &movement.from).await?;
    let to_id = accounts::resolve_holder(unit, &movement.to).await?;

    let amount = &movement.amount;
    match from_id {
        Some(from_id) => credit(unit, &mut ticket, from_id, &-amount, Direction::Apply).await?,
        None => ticket.total_minted += amount,
    }
    match to_id {
        Some(to_id) => credit(unit, &mut ticket, to_id, amount, Direction::Apply).await?,
        None => ticket.total_burned += amount,
    }
    ticket.total_supply = &ticket.total_minted - &ticket.total_burned;
    ticket.transfers_count += 1;
    ticket.last_level = level;

    let id = unit.allocate(Counter::TicketTransfer);
    unit.put(TicketTransfer {
        id,
        level,
        ticket_id: ticket.id,
        from_id,
        to_id,
        amount: amount.clone(),
        cause,
    });
    unit.put(ticket);
    Ok(())
}

/// Reverses a transfer and removes it, along with rows it brought to life.
pub(super) async fn unfold<S: Store>(
    unit: &mut Unit<'_, S>,
    transfer: &TicketTransfer,
) -> Result<(), MutationError> {
    let mut ticket: Ticket = unit.require(RowKey::Ticket(transfer.ticket_id)).await?;
    let amount = &transfer.amount;
    match transfer.to_id {
        Some(to_id) => credit(unit, &mut ticket, to_id, &-amount, Direction::Revert).await?,
        None => ticket.total_burned -= amount,
    }
    match transfer.from_id {
        Some(from_id) => credit(unit, &mut ticket, from_id, amount, Direction::Revert).await?,
        None => ticket.total_minted -= amount,
    }
    ticket.total_supply = &ticket.total_minted - &ticket.total_burned;
    ticket.transfers_count -= 1;
    unit.drop_row(RowKey::TicketTransfer(transfer.id), Counter::TicketTransfer)
        .await?;

    if ticket.transfers_count == 0 {
        unit.drop_row(RowKey::Ticket(ticket.id), Counter::Ticket)
            .await?;
        let mut ticketer = accounts::get(unit, ticket.ticketer_id).await?;
        ticketer.tickets_count -= 1;
        unit.put(ticketer);
    } else {
        unit.touch(Subject::Ticket(ticket.id));
        unit.put(ticket);
    }
    Ok(())
}

/// Adds `delta` to a holder's balance of `ticket`.
///
/// Balances are created by their first transfer and dropped with it.
async fn credit<S: Store>(
    unit: &mut Unit<'_, S>,
    ticket: &mut Ticket,
    account_id: AccountId,
    delta: &BigInt,
    dir: Direction,
) -> Result<(), MutationError> {
    let key = IndexKey::TicketBalance {
        ticket_id: ticket.id,
        account_id,
    };
    let mut account = accounts::get(unit, account_id).await?;
    let mut balance = match (unit.find::<TicketBalance>(&key).await?, dir) {
        (Some(balance), _) => balance,
        (None, Direction::Apply) => {
            ticket.balances_count += 1;
            account.ticket_balances_count += 1;
            TicketBalance {
                id: unit.allocate(Counter::TicketBalance),
                ticket_id: ticket.id,
                ticketer_id: ticket.ticketer_id,
                account_id,
                balance: BigInt::default(),
                first_level: unit.level,
                last_level: unit.level,
                transfers_count: 0,
            }
        }
        (None, Direction::Revert) => {
            return Err(unit.fail(Inconsistency::InvalidInput(format!(
                "no balance of ticket {} for account {account_id}",
                ticket.id
            ))))
        }
    };

    let held_before = balance.balance.sign() == Sign::Plus;
    balance.balance += delta;
    if balance.balance.sign() == Sign::Minus {
        return Err(unit.fail(Inconsistency::NegativeBalance(RowKey::TicketBalance(
            balance.id,
        ))));
    }
    let held_after = balance.balance.sign() == Sign::Plus;
    let holders = held_after as i32 - held_before as i32;
    ticket.holders_count += holders;
    account.active_tickets_count += holders;
    balance.transfers_count += dir.step();
    account.ticket_transfers_count += dir.step();

    match dir {
        Direction::Apply => {
            balance.last_level = unit.level;
            unit.put(balance);
        }
        Direction::Revert if balance.transfers_count == 0 => {
            unit.drop_row(RowKey::TicketBalance(balance.id), Counter::TicketBalance)
                .await?;
            ticket.balances_count -= 1;
            account.ticket_balances_count -= 1;
        }
        Direction::Revert => {
            unit.touch(Subject::TicketBalance(balance.id));
            unit.put(balance);
        }
    }
    unit.put(account);
    Ok(())
}
