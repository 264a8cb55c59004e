//! Account resolution, balances and delegation bookkeeping.
use super::error::Inconsistency;
use super::error::MutationError;
use super::unit::Unit;
use super::Direction;
use crate::core::types::AccountId;
use crate::core::types::Address;
use crate::core::types::Level;
use crate::core::types::Mutez;
use crate::schema::Account;
use crate::schema::Counter;
use crate::schema::IndexKey;
use crate::schema::Operation;
use crate::schema::OperationRecord;
use crate::schema::Profile;
use crate::schema::RowKey;
use crate::schema::Subject;
use crate::store::Store;

/// Id of the account at `address`, creating it with `profile` if unknown.
pub(super) async fn resolve_with<S: Store>(
    unit: &mut Unit<'_, S>,
    address: &Address,
    profile: fn(&str) -> Profile,
) -> Result<AccountId, MutationError> {
    let key = IndexKey::AccountAddress(address.clone());
    if let Some(row_key) = unit.lookup(&key).await? {
        return Ok(row_key.id());
    }
    let id = unit.allocate(Counter::Account);
    tracing::trace!("new account {address} with id {id}");
    unit.put(Account::new(id, address.clone(), unit.level, profile(address)));
    unit.account_created(address.clone(), id);
    Ok(id)
}

pub(super) async fn resolve<S: Store>(
    unit: &mut Unit<'_, S>,
    address: &Address,
) -> Result<AccountId, MutationError> {
    resolve_with(unit, address, Profile::for_address).await
}

pub(super) async fn resolve_opt<S: Store>(
    unit: &mut Unit<'_, S>,
    address: &Option<Address>,
) -> Result<Option<AccountId>, MutationError> {
    match address {
        Some(address) => Ok(Some(resolve(unit, address).await?)),
        None => Ok(None),
    }
}

/// Resolves a token or ticket holder, first seen ones becoming ghosts.
pub(super) async fn resolve_holder<S: Store>(
    unit: &mut Unit<'_, S>,
    address: &Option<Address>,
) -> Result<Option<AccountId>, MutationError> {
    match address {
        Some(address) => Ok(Some(resolve_with(unit, address, |_| Profile::Ghost).await?)),
        None => Ok(None),
    }
}

pub(super) async fn get<S: Store>(
    unit: &mut Unit<'_, S>,
    id: AccountId,
) -> Result<Account, MutationError> {
    unit.require(RowKey::Account(id)).await
}

/// Applies `f` to an account.
pub(super) async fn update<S: Store, F: FnOnce(&mut Account) + Send>(
    unit: &mut Unit<'_, S>,
    id: AccountId,
    f: F,
) -> Result<(), MutationError> {
    let mut account = get(unit, id).await?;
    f(&mut account);
    unit.put(account);
    Ok(())
}

/// Adds `delta` to an account's balance and to its delegate's delegated balance.
pub(super) async fn change_balance<S: Store>(
    unit: &mut Unit<'_, S>,
    id: AccountId,
    delta: Mutez,
) -> Result<(), MutationError> {
    if delta == 0 {
        return Ok(());
    }
    let mut account = get(unit, id).await?;
    account.balance += delta;
    if account.balance < 0 {
        return Err(unit.fail(Inconsistency::NegativeBalance(RowKey::Account(id))));
    }
    let delegate = account.delegate_id.filter(|d| *d != id);
    unit.put(account);
    if let Some(delegate_id) = delegate {
        let mut delegate = get(unit, delegate_id).await?;
        delegate.delegated_balance += delta;
        unit.put(delegate);
    }
    Ok(())
}

/// Moves funds between two accounts.
pub(super) async fn transfer<S: Store>(
    unit: &mut Unit<'_, S>,
    from: AccountId,
    to: AccountId,
    amount: Mutez,
) -> Result<(), MutationError> {
    change_balance(unit, from, -amount).await?;
    change_balance(unit, to, amount).await
}

/// Points an account to a new delegate, moving its balance along.
pub(super) async fn set_delegate<S: Store>(
    unit: &mut Unit<'_, S>,
    id: AccountId,
    delegate: Option<AccountId>,
) -> Result<(), MutationError> {
    let mut account = get(unit, id).await?;
    let previous = account.delegate_id;
    if previous == delegate {
        return Ok(());
    }
    let balance = account.balance;
    account.delegate_id = delegate;
    unit.put(account);
    if let Some(previous_id) = previous.filter(|d| *d != id) {
        let mut previous = get(unit, previous_id).await?;
        previous.delegated_balance -= balance;
        previous.delegators_count -= 1;
        unit.put(previous);
    }
    if let Some(delegate_id) = delegate.filter(|d| *d != id) {
        let mut delegate = get(unit, delegate_id).await?;
        delegate.delegated_balance += balance;
        delegate.delegators_count += 1;
        unit.put(delegate);
    }
    Ok(())
}

/// Turns an implicit account into a delegate or back.
pub(super) async fn set_registered<S: Store>(
    unit: &mut Unit<'_, S>,
    id: AccountId,
    registered: bool,
    level: Level,
) -> Result<(), MutationError> {
    let mut account = get(unit, id).await?;
    account.profile = match (account.profile, registered) {
        (Profile::User { revealed, activated }, true) => Profile::Delegate {
            revealed,
            activated,
            activation_level: level,
        },
        (Profile::Ghost, true) => Profile::Delegate {
            revealed: false,
            activated: false,
            activation_level: level,
        },
        (
            Profile::Delegate {
                revealed,
                activated,
                ..
            },
            false,
        ) => Profile::User { revealed, activated },
        (profile, _) => {
            return Err(unit.fail(Inconsistency::InvalidInput(format!(
                "cannot change delegate registration of {:?} account {id}",
                profile.kind()
            ))))
        }
    };
    unit.put(account);
    Ok(())
}

/// Sets the reveal or activation flag of an implicit account.
pub(super) async fn set_flag<S: Store>(
    unit: &mut Unit<'_, S>,
    id: AccountId,
    flag: Flag,
    value: bool,
) -> Result<(), MutationError> {
    let mut account = get(unit, id).await?;
    match (&mut account.profile, flag) {
        (Profile::User { revealed, .. }, Flag::Revealed)
        | (Profile::Delegate { revealed, .. }, Flag::Revealed) => *revealed = value,
        (Profile::User { activated, .. }, Flag::Activated)
        | (Profile::Delegate { activated, .. }, Flag::Activated) => *activated = value,
        _ => return Ok(()),
    }
    unit.put(account);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Flag {
    Revealed,
    Activated,
}

/// Counts an operation for every account it references.
///
/// Applied operations set the last level of their accounts, reverted ones
/// leave it to be derived again from the remaining log.
pub(super) async fn count_operation<S: Store>(
    unit: &mut Unit<'_, S>,
    op: &Operation,
    dir: Direction,
) -> Result<(), MutationError> {
    let kind = op.kind();
    for id in &op.account_ids {
        let mut account = get(unit, *id).await?;
        if !account.ops_counts.add(kind, dir.sign()) {
            return Err(unit.fail(Inconsistency::OpsCountUnderflow { kind, account: *id }));
        }
        match dir {
            Direction::Apply => account.last_level = unit.level,
            Direction::Revert => unit.touch(Subject::Account(*id)),
        }
        unit.put(account);
    }
    Ok(())
}

/// Records baking activity on an account.
pub(super) async fn mark_active<S: Store>(
    unit: &mut Unit<'_, S>,
    id: AccountId,
    dir: Direction,
) -> Result<(), MutationError> {
    match dir {
        Direction::Apply => {
            let mut account = get(unit, id).await?;
            account.last_level = unit.level;
            unit.put(account);
        }
        Direction::Revert => unit.touch(Subject::Account(id)),
    }
    Ok(())
}

/// Rolls back accounts first seen at the current level, newest first.
pub(super) async fn drop_created<S: Store>(unit: &mut Unit<'_, S>) -> Result<usize, MutationError> {
    let created = unit.rows_at::<Account>().await?;
    let n = created.len();
    for account in created.into_iter().rev() {
        unit.drop_row(RowKey::Account(account.id), Counter::Account)
            .await?;
    }
    Ok(n)
}
