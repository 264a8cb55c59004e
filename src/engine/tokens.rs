//! Token ledger: transfers folded into tokens and per-holder balances.
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
use crate::schema::Token;
use crate::schema::TokenBalance;
use crate::schema::TokenMovement;
use crate::schema::TokenTransfer;
use crate::schema::TokenTransferCause;
use crate::store::Store;

/// Appends a token transfer and folds it into the token and both balances.
pub(super) async fn apply<S: Store>(
    unit: &mut Unit<'_, S>,
    movement: &TokenMovement,
    cause: TokenTransferCause,
) -> Result<(), MutationError> {
    if movement.amount.sign() == Sign::Minus {
        return Err(unit.fail(Inconsistency::InvalidInput(format!(
            "negative token amount {}",
            movement.amount
        ))));
    }
    if movement.from.is_none() && movement.to.is_none() {
        return Err(unit.fail(Inconsistency::InvalidInput(String::from(
            "token transfer without sender nor receiver",
        ))));
    }
    let level = unit.level;
    let contract_id = accounts::resolve(unit, &movement.contract).await?;
    let key = IndexKey::Token {
        contract_id,
        token_id: movement.token_id.clone(),
    };
    let mut token = match unit.find::<Token>(&key).await? {
        Some(token) => token,
        None => {
            let mut contract = accounts::get(unit, contract_id).await?;
            contract.tokens_count += 1;
            unit.put(contract);
            Token {
                id: unit.allocate(Counter::Token),
                contract_id,
                token_id: movement.token_id.clone(),
                standard: movement.standard,
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
        Some(from_id) => credit(unit, &mut token, from_id, &-amount, Direction::Apply).await?,
        None => token.total_minted += amount,
    }
    match to_id {
        Some(to_id) => credit(unit, &mut token, to_id, amount, Direction::Apply).await?,
        None => token.total_burned += amount,
    }
    token.total_supply = &token.total_minted - &token.total_burned;
    token.transfers_count += 1;
    token.last_level = level;

    let id = unit.allocate(Counter::TokenTransfer);
    unit.put(TokenTransfer {
        id,
        level,
        token_id: token.id,
        from_id,
        to_id,
        amount: amount.clone(),
        cause,
    });
    unit.put(token);
    Ok(())
}

/// Reverses a transfer and removes it, along with rows it brought to life.
pub(super) async fn unfold<S: Store>(
    unit: &mut Unit<'_, S>,
    transfer: &TokenTransfer,
) -> Result<(), MutationError> {
    let mut token: Token = unit.require(RowKey::Token(transfer.token_id)).await?;
    let amount = &transfer.amount;
    match transfer.to_id {
        Some(to_id) => credit(unit, &mut token, to_id, &-amount, Direction::Revert).await?,
        None => token.total_burned -= amount,
    }
    match transfer.from_id {
        Some(from_id) => credit(unit, &mut token, from_id, amount, Direction::Revert).await?,
        None => token.total_minted -= amount,
    }
    token.total_supply = &token.total_minted - &token.total_burned;
    token.transfers_count -= 1;
    unit.drop_row(RowKey::TokenTransfer(transfer.id), Counter::TokenTransfer)
        .await?;

    if token.transfers_count == 0 {
        unit.drop_row(RowKey::Token(token.id), Counter::Token)
            .await?;
        let mut contract = accounts::get(unit, token.contract_id).await?;
        contract.tokens_count -= 1;
        unit.put(contract);
    } else {
        unit.touch(Subject::Token(token.id));
        unit.put(token);
    }
    Ok(())
}

/// Adds `delta` to a holder's balance of `token`.
async fn credit<S: Store>(
    unit: &mut Unit<'_, S>,
    token: &mut Token,
    account_id: AccountId,
    delta: &BigInt,
    dir: Direction,
) -> Result<(), MutationError> {
    let key = IndexKey::TokenBalance {
        token_id: token.id,
        account_id,
    };
    let mut account = accounts::get(unit, account_id).await?;
    let mut balance = match (unit.find::<TokenBalance>(&key).await?, dir) {
        (Some(balance), _) => balance,
        (None, Direction::Apply) => {
            token.balances_count += 1;
            account.token_balances_count += 1;
            TokenBalance {
                id: unit.allocate(Counter::TokenBalance),
                token_id: token.id,
                contract_id: token.contract_id,
                account_id,
                balance: BigInt::default(),
                first_level: unit.level,
                last_level: unit.level,
                transfers_count: 0,
            }
        }
        (None, Direction::Revert) => {
            return Err(unit.fail(Inconsistency::InvalidInput(format!(
                "no balance of token {} for account {account_id}",
                token.id
            ))))
        }
    };

    let held_before = balance.balance.sign() == Sign::Plus;
    balance.balance += delta;
    if balance.balance.sign() == Sign::Minus {
        return Err(unit.fail(Inconsistency::NegativeBalance(RowKey::TokenBalance(
            balance.id,
        ))));
    }
    let held_after = balance.balance.sign() == Sign::Plus;
    let holders = held_after as i32 - held_before as i32;
    token.holders_count += holders;
    account.active_tokens_count += holders;
    balance.transfers_count += dir.step();
    account.token_transfers_count += dir.step();

    match dir {
        Direction::Apply => {
            balance.last_level = unit.level;
            unit.put(balance);
        }
        Direction::Revert if balance.transfers_count == 0 => {
            unit.drop_row(RowKey::TokenBalance(balance.id), Counter::TokenBalance)
                .await?;
            token.balances_count -= 1;
            account.token_balances_count -= 1;
        }
        Direction::Revert => {
            unit.touch(Subject::TokenBalance(balance.id));
            unit.put(balance);
        }
    }
    unit.put(account);
    Ok(())
}
