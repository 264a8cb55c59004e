//! Operations: fees, per-kind effects and the logs they feed.
use itertools::Itertools;
use std::collections::HashMap;

use super::accounts;
use super::accounts::Flag;
use super::big_maps;
use super::blocks;
use super::cycles;
use super::error::Inconsistency;
use super::error::MutationError;
use super::staking;
use super::staking::Movement;
use super::tickets;
use super::tokens;
use super::unit::Unit;
use super::voting;
use super::Direction;
use crate::core::types::AccountId;
use crate::core::types::Mutez;
use crate::core::types::OperationId;
use crate::ledger;
use crate::schema::operations::AutostakingAction;
use crate::schema::operations::DoubleSigning;
use crate::schema::operations::Fees;
use crate::schema::operations::MigrationKind;
use crate::schema::operations::StakingAction;
use crate::schema::BigMapUpdate;
use crate::schema::BigMapUpdateCause;
use crate::schema::Block;
use crate::schema::Content;
use crate::schema::DecodedOperation;
use crate::schema::Effects;
use crate::schema::Envelope;
use crate::schema::Operation;
use crate::schema::OperationKind;
use crate::schema::OperationRecord;
use crate::schema::Profile;
use crate::schema::RowKey;
use crate::schema::StakingUpdate;
use crate::schema::StakingUpdateCause;
use crate::schema::StakingUpdateKind;
use crate::schema::TicketTransfer;
use crate::schema::TicketTransferCause;
use crate::schema::TokenTransfer;
use crate::schema::TokenTransferCause;
use crate::store::Store;

/// What every effect of an operation needs to know about it.
struct Context {
    id: OperationId,
    kind: OperationKind,
    sender: AccountId,
    /// Producer of the block holding the operation
    producer: AccountId,
}

/// Log rows of a level, grouped by the operation that caused them.
pub(super) struct Logs {
    big_map_updates: HashMap<OperationId, Vec<BigMapUpdate>>,
    ticket_transfers: HashMap<OperationId, Vec<TicketTransfer>>,
    token_transfers: HashMap<OperationId, Vec<TokenTransfer>>,
    staking_updates: HashMap<OperationId, Vec<StakingUpdate>>,
}

impl Logs {
    pub async fn load<S: Store>(unit: &mut Unit<'_, S>) -> Result<Self, MutationError> {
        Ok(Self {
            big_map_updates: unit
                .rows_at::<BigMapUpdate>()
                .await?
                .into_iter()
                .into_group_map_by(|r| r.cause.operation_id()),
            ticket_transfers: unit
                .rows_at::<TicketTransfer>()
                .await?
                .into_iter()
                .into_group_map_by(|r| r.cause.operation_id()),
            token_transfers: unit
                .rows_at::<TokenTransfer>()
                .await?
                .into_iter()
                .into_group_map_by(|r| r.cause.operation_id()),
            staking_updates: unit
                .rows_at::<StakingUpdate>()
                .await?
                .into_iter()
                .into_group_map_by(|r| r.cause.operation_id()),
        })
    }

    /// Operations with log rows left over.
    pub fn orphans(&self) -> Vec<OperationId> {
        self.big_map_updates
            .keys()
            .chain(self.ticket_transfers.keys())
            .chain(self.token_transfers.keys())
            .chain(self.staking_updates.keys())
            .copied()
            .sorted()
            .dedup()
            .collect()
    }
}

/// Appends a decoded operation and applies its effects.
pub(super) async fn apply<S: Store>(
    unit: &mut Unit<'_, S>,
    block: &Block,
    op: &DecodedOperation,
) -> Result<(), MutationError> {
    let sender = accounts::resolve(unit, op.sender()).await?;
    let initiator = accounts::resolve_opt(unit, &op.envelope.initiator).await?;
    let mut ids = HashMap::new();
    for address in op.content.referenced_accounts() {
        let id = accounts::resolve(unit, &address).await?;
        ids.insert(address, id);
    }
    let res = op.content.try_map(|address| {
        ids.get(address)
            .copied()
            .ok_or_else(|| Inconsistency::InvalidInput(format!("unresolved account {address}")))
    });
    let mut content = unit.check(res)?;

    let kind = content.kind();
    let id = ledger::append(&mut unit.app, kind);
    let envelope = Envelope {
        hash: op.envelope.hash.clone(),
        sender,
        initiator,
        nonce: op.envelope.nonce,
        counter: op.envelope.counter,
        fees: op.envelope.fees.clone(),
        usage: op.envelope.usage.clone(),
        status: op.envelope.status,
        errors: op.envelope.errors.clone(),
    };
    let ctx = Context {
        id,
        kind,
        sender,
        producer: block.producer_id,
    };

    pay_fees(unit, &ctx, &envelope.fees, Direction::Apply).await?;
    if op.is_applied() {
        fold_content(unit, &ctx, &mut content, Direction::Apply).await?;
        apply_effects(unit, &ctx, &op.effects).await?;
    } else if !op.effects.is_empty() {
        return Err(unit.fail(Inconsistency::InvalidInput(format!(
            "{:?} {kind} operation {id} carries effects",
            op.status()
        ))));
    }

    let row = Operation::new(id, unit.level, block.timestamp, envelope, content);
    accounts::count_operation(unit, &row, Direction::Apply).await?;
    unit.put(row);
    Ok(())
}

/// Reverts an operation and everything it logged, then removes it.
pub(super) async fn revert<S: Store>(
    unit: &mut Unit<'_, S>,
    block: &Block,
    op: &Operation,
    logs: &mut Logs,
) -> Result<(), MutationError> {
    let kind = op.kind();
    let ctx = Context {
        id: op.id,
        kind,
        sender: op.envelope.sender,
        producer: block.producer_id,
    };
    accounts::count_operation(unit, op, Direction::Revert).await?;

    let token_transfers = logs.token_transfers.remove(&op.id).unwrap_or_default();
    let ticket_transfers = logs.ticket_transfers.remove(&op.id).unwrap_or_default();
    let big_map_updates = logs.big_map_updates.remove(&op.id).unwrap_or_default();
    let staking_updates = logs.staking_updates.remove(&op.id).unwrap_or_default();
    if op.is_applied() {
        for transfer in token_transfers.iter().rev() {
            tokens::unfold(unit, transfer).await?;
        }
        for transfer in ticket_transfers.iter().rev() {
            tickets::unfold(unit, transfer).await?;
        }
        for update in big_map_updates.iter().rev() {
            big_maps::unfold(unit, update).await?;
        }
        for update in staking_updates.iter().rev() {
            staking::unfold(unit, update).await?;
        }
        let mut content = op.content.clone();
        fold_content(unit, &ctx, &mut content, Direction::Revert).await?;
    } else if !(token_transfers.is_empty()
        && ticket_transfers.is_empty()
        && big_map_updates.is_empty()
        && staking_updates.is_empty())
    {
        return Err(unit.fail(Inconsistency::InvalidInput(format!(
            "{:?} {kind} operation {} has logged effects",
            op.status(),
            op.id
        ))));
    }
    pay_fees(unit, &ctx, op.fees(), Direction::Revert).await?;

    unit.delete(RowKey::Operation(op.id)).await?;
    let res = ledger::remove(&mut unit.app, kind, op.id);
    unit.check(res)
}

/// Fees are paid whatever the operation's status.
async fn pay_fees<S: Store>(
    unit: &mut Unit<'_, S>,
    ctx: &Context,
    fees: &Fees,
    dir: Direction,
) -> Result<(), MutationError> {
    if fees.total() == 0 {
        return Ok(());
    }
    let s = dir.sign();
    accounts::change_balance(unit, ctx.sender, -s * fees.total()).await?;
    accounts::change_balance(unit, ctx.producer, s * fees.baker_fee).await?;
    unit.app.total_burned += s * fees.burned();
    if fees.baker_fee != 0 {
        credit_block_fee(unit, ctx.producer, s * fees.baker_fee, dir).await?;
    }
    Ok(())
}

async fn credit_block_fee<S: Store>(
    unit: &mut Unit<'_, S>,
    producer: AccountId,
    amount: Mutez,
    dir: Direction,
) -> Result<(), MutationError> {
    blocks::update_current(unit, move |b| b.fees += amount).await?;
    cycles::update_baker(unit, producer, dir, move |bc| bc.block_fees += amount).await
}

/// Credits newly minted funds.
async fn create<S: Store>(
    unit: &mut Unit<'_, S>,
    id: AccountId,
    amount: Mutez,
) -> Result<(), MutationError> {
    accounts::change_balance(unit, id, amount).await?;
    unit.app.total_created += amount;
    Ok(())
}

fn invalid<S: Store>(unit: &Unit<'_, S>, ctx: &Context, detail: &str) -> MutationError {
    unit.fail(Inconsistency::InvalidInput(format!(
        "{} operation {}: {detail}",
        ctx.kind, ctx.id
    )))
}

/// Applies or reverts the effects of an operation's content.
///
/// Applying may complete the content with derived fields, such as the
/// previous delegate of a delegation, that reverting relies on.
async fn fold_content<S: Store>(
    unit: &mut Unit<'_, S>,
    ctx: &Context,
    content: &mut Content<AccountId>,
    dir: Direction,
) -> Result<(), MutationError> {
    let (s, n) = (dir.sign(), dir.step());
    let sender = ctx.sender;
    let level = unit.level;
    match content {
        Content::Endorsement(e) => {
            let slots = e.slots;
            blocks::update_current(unit, move |b| b.validations += n * slots).await?;
            cycles::update_baker(unit, sender, dir, move |bc| {
                bc.endorsements += n;
                bc.endorsed_slots += n * slots;
            })
            .await?;
        }
        Content::Preendorsement(e) => {
            let slots = e.slots;
            blocks::update_current(unit, move |b| b.validations += n * slots).await?;
        }
        Content::NonceRevelation(r) => {
            let reward = s * r.reward;
            create(unit, sender, reward).await?;
            cycles::update_baker(unit, sender, dir, move |bc| {
                bc.nonce_revelations += n;
                bc.revelation_rewards += reward;
            })
            .await?;
        }
        Content::DoubleBaking(d) | Content::DoubleEndorsing(d) | Content::DoublePreendorsing(d) => {
            let reward = s * d.reward;
            let lost = s * (d.lost_staked + d.lost_unstaked);
            create(unit, sender, reward).await?;
            cycles::update_baker(unit, sender, dir, move |bc| {
                bc.double_signing_rewards += reward;
            })
            .await?;
            cycles::update_baker(unit, d.offender, dir, move |bc| {
                bc.double_signing_losses += lost;
            })
            .await?;
            if dir == Direction::Apply {
                slash(unit, ctx, d).await?;
            }
        }
        Content::Activation(a) => {
            let amount = s * a.balance;
            accounts::change_balance(unit, sender, amount).await?;
            unit.app.total_activated += amount;
            accounts::set_flag(unit, sender, Flag::Activated, dir == Direction::Apply).await?;
        }
        Content::Ballot(b) => voting::ballot(unit, sender, b, dir).await?,
        Content::Proposal(p) => match dir {
            Direction::Apply => voting::upvote(unit, sender, p).await?,
            Direction::Revert => voting::revoke_upvote(unit, sender, p).await?,
        },
        Content::EndorsingReward(r) => {
            let amount = s * r.received;
            create(unit, sender, amount).await?;
            cycles::update_baker(unit, sender, dir, move |bc| {
                bc.endorsement_rewards += amount;
            })
            .await?;
        }
        Content::DalAttestationReward(r) => {
            let amount = s * r.received;
            create(unit, sender, amount).await?;
            cycles::update_baker(unit, sender, dir, move |bc| {
                bc.dal_attestation_rewards += amount;
            })
            .await?;
        }
        Content::RevelationPenalty(p) => {
            let loss = s * p.loss;
            accounts::change_balance(unit, sender, -loss).await?;
            unit.app.total_burned += loss;
            cycles::update_baker(unit, sender, dir, move |bc| bc.revelation_losses += loss)
                .await?;
        }
        Content::Migration(m) => {
            let activates = m.kind == MigrationKind::ActivateDelegate;
            if activates && dir == Direction::Revert {
                accounts::set_delegate(unit, sender, None).await?;
                accounts::set_registered(unit, sender, false, level).await?;
            }
            let change = s * m.balance_change;
            accounts::change_balance(unit, sender, change).await?;
            match m.balance_change >= 0 {
                true => unit.app.total_created += change,
                false => unit.app.total_burned -= change,
            }
            if activates && dir == Direction::Apply {
                let account = accounts::get(unit, sender).await?;
                if account.delegate_id.is_some_and(|d| d != sender) {
                    return Err(invalid(unit, ctx, "activated delegate is delegating"));
                }
                accounts::set_registered(unit, sender, true, level).await?;
                accounts::set_delegate(unit, sender, Some(sender)).await?;
            }
        }
        Content::Autostaking(a) => {
            if dir == Direction::Apply {
                let kind = match a.action {
                    AutostakingAction::Stake => StakingUpdateKind::Stake,
                    AutostakingAction::Unstake => StakingUpdateKind::Unstake,
                    AutostakingAction::Finalize => StakingUpdateKind::Finalize,
                    AutostakingAction::Restake => StakingUpdateKind::Restake,
                };
                let movement = Movement {
                    kind,
                    staker: sender,
                    baker: sender,
                    amount: a.amount,
                    request_cycle: a.request_cycle.unwrap_or(unit.app.cycle),
                };
                staking::record(unit, movement, StakingUpdateCause::Autostaking(ctx.id)).await?;
            }
        }
        Content::Reveal(_) => {
            accounts::set_flag(unit, sender, Flag::Revealed, dir == Direction::Apply).await?;
        }
        Content::Transaction(t) => {
            accounts::transfer(unit, sender, t.target, s * t.amount).await?;
        }
        Content::Delegation(d) => match dir {
            Direction::Apply => {
                let account = accounts::get(unit, sender).await?;
                d.prev_delegate = account.delegate_id;
                d.amount = account.balance;
                d.registration = d.delegate == Some(sender) && !account.profile.is_delegate();
                if d.registration {
                    accounts::set_registered(unit, sender, true, level).await?;
                }
                accounts::set_delegate(unit, sender, d.delegate).await?;
            }
            Direction::Revert => {
                accounts::set_delegate(unit, sender, d.prev_delegate).await?;
                if d.registration {
                    accounts::set_registered(unit, sender, false, level).await?;
                }
            }
        },
        Content::Origination(o) => {
            let Some(contract) = o.contract else {
                return Err(invalid(unit, ctx, "no originated contract"));
            };
            match dir {
                Direction::Apply => {
                    accounts::update(unit, contract, move |a| {
                        if let Profile::Contract { creator_id } = &mut a.profile {
                            creator_id.get_or_insert(sender);
                        }
                    })
                    .await?;
                    accounts::update(unit, sender, |a| a.contracts_count += 1).await?;
                    accounts::transfer(unit, sender, contract, o.balance).await?;
                    accounts::set_delegate(unit, contract, o.delegate).await?;
                }
                Direction::Revert => {
                    accounts::set_delegate(unit, contract, None).await?;
                    accounts::transfer(unit, contract, sender, o.balance).await?;
                    accounts::update(unit, sender, |a| a.contracts_count -= 1).await?;
                    accounts::update(unit, contract, move |a| {
                        if let Profile::Contract { creator_id } = &mut a.profile {
                            if *creator_id == Some(sender) {
                                *creator_id = None;
                            }
                        }
                    })
                    .await?;
                }
            }
        }
        Content::DrainDelegate(d) => {
            accounts::transfer(unit, sender, d.target, s * d.amount).await?;
            accounts::transfer(unit, sender, ctx.producer, s * d.fee).await?;
            if d.fee != 0 {
                credit_block_fee(unit, ctx.producer, s * d.fee, dir).await?;
            }
        }
        Content::Staking(st) => {
            if st.action == StakingAction::SetParameters || dir == Direction::Revert {
                return Ok(());
            }
            let baker = match st.baker {
                Some(baker) => baker,
                None => match accounts::get(unit, sender).await?.delegate_id {
                    Some(baker) => baker,
                    None => return Err(invalid(unit, ctx, "staker has no delegate")),
                },
            };
            st.baker = Some(baker);
            let (kind, request_cycle) = match st.action {
                StakingAction::Stake => (StakingUpdateKind::Stake, unit.app.cycle),
                StakingAction::Unstake => {
                    st.request_cycle = Some(unit.app.cycle);
                    (StakingUpdateKind::Unstake, unit.app.cycle)
                }
                StakingAction::Finalize => match st.request_cycle {
                    Some(cycle) => (StakingUpdateKind::Finalize, cycle),
                    None => return Err(invalid(unit, ctx, "finalize without request cycle")),
                },
                StakingAction::SetParameters => return Ok(()),
            };
            let movement = Movement {
                kind,
                staker: sender,
                baker,
                amount: st.amount,
                request_cycle,
            };
            staking::record(unit, movement, StakingUpdateCause::Staking(ctx.id)).await?;
        }
        Content::SmartRollupOriginate(r) => {
            let Some(rollup) = r.rollup else {
                return Err(invalid(unit, ctx, "no originated rollup"));
            };
            let profile = match dir {
                Direction::Apply => Some(Profile::SmartRollup {
                    creator_id: Some(sender),
                    pvm_kind: r.pvm_kind.clone(),
                    genesis_commitment: r.genesis_commitment.clone(),
                }),
                Direction::Revert => None,
            };
            accounts::update(unit, rollup, move |a| {
                a.profile = profile.unwrap_or_else(|| Profile::for_address(&a.address));
            })
            .await?;
            accounts::update(unit, sender, move |a| a.smart_rollups_count += n).await?;
        }
        Content::SmartRollupPublish(p) => {
            let bond = s * p.bond;
            if bond != 0 {
                accounts::update(unit, sender, move |a| a.rollup_bonds += bond).await?;
                unit.app.total_rollup_bonds += bond;
            }
        }
        Content::SmartRollupRefute(r) => {
            if let Some(outcome) = &r.outcome {
                let (loss, reward) = (s * outcome.loss, s * outcome.reward);
                accounts::update(unit, outcome.loser, move |a| a.rollup_bonds -= loss).await?;
                accounts::change_balance(unit, outcome.loser, -loss).await?;
                accounts::change_balance(unit, outcome.winner, reward).await?;
                unit.app.total_rollup_bonds -= loss;
                unit.app.total_burned += loss - reward;
            }
        }
        Content::SmartRollupRecoverBond(b) => {
            let bond = s * b.bond;
            accounts::update(unit, b.staker, move |a| a.rollup_bonds -= bond).await?;
            unit.app.total_rollup_bonds -= bond;
        }
        Content::RegisterConstant(_)
        | Content::IncreasePaidStorage(_)
        | Content::TransferTicket(_)
        | Content::UpdateConsensusKey(_)
        | Content::SmartRollupAddMessages(_)
        | Content::SmartRollupCement(_)
        | Content::SmartRollupExecute(_)
        | Content::DalPublishCommitment(_) => (),
    }
    Ok(())
}

/// Records the slashing of a double signer's frozen funds.
async fn slash<S: Store>(
    unit: &mut Unit<'_, S>,
    ctx: &Context,
    d: &DoubleSigning<AccountId>,
) -> Result<(), MutationError> {
    let cause = match ctx.kind {
        OperationKind::DoubleBaking => StakingUpdateCause::DoubleBaking(ctx.id),
        OperationKind::DoubleEndorsing => StakingUpdateCause::DoubleEndorsing(ctx.id),
        _ => StakingUpdateCause::DoublePreendorsing(ctx.id),
    };
    let current = unit.app.cycle;
    let slashes = [
        (StakingUpdateKind::SlashStaked, d.lost_staked, current),
        (
            StakingUpdateKind::SlashUnstaked,
            d.lost_unstaked,
            d.request_cycle.unwrap_or(current),
        ),
    ];
    for (kind, amount, request_cycle) in slashes {
        if amount == 0 {
            continue;
        }
        let movement = Movement {
            kind,
            staker: d.offender,
            baker: d.offender,
            amount,
            request_cycle,
        };
        staking::record(unit, movement, cause).await?;
    }
    Ok(())
}

/// Applies big map diffs, then ticket and token transfers.
async fn apply_effects<S: Store>(
    unit: &mut Unit<'_, S>,
    ctx: &Context,
    effects: &Effects,
) -> Result<(), MutationError> {
    if effects.is_empty() {
        return Ok(());
    }
    let id = ctx.id;
    let big_map_cause = match ctx.kind {
        OperationKind::Origination => Some(BigMapUpdateCause::Origination(id)),
        OperationKind::Transaction => Some(BigMapUpdateCause::Transaction(id)),
        OperationKind::Migration => Some(BigMapUpdateCause::Migration(id)),
        _ => None,
    };
    let ticket_cause = match ctx.kind {
        OperationKind::Transaction => Some(TicketTransferCause::Transaction(id)),
        OperationKind::TransferTicket => Some(TicketTransferCause::TransferTicket(id)),
        OperationKind::SmartRollupExecute => Some(TicketTransferCause::SmartRollupExecute(id)),
        OperationKind::Migration => Some(TicketTransferCause::Migration(id)),
        _ => None,
    };
    let token_cause = match ctx.kind {
        OperationKind::Origination => Some(TokenTransferCause::Origination(id)),
        OperationKind::Transaction => Some(TokenTransferCause::Transaction(id)),
        OperationKind::Migration => Some(TokenTransferCause::Migration(id)),
        _ => None,
    };

    if !effects.big_map_diffs.is_empty() {
        let Some(cause) = big_map_cause else {
            return Err(invalid(unit, ctx, "unexpected big map diffs"));
        };
        for diff in &effects.big_map_diffs {
            big_maps::apply(unit, diff, cause).await?;
        }
    }
    if !effects.ticket_transfers.is_empty() {
        let Some(cause) = ticket_cause else {
            return Err(invalid(unit, ctx, "unexpected ticket transfers"));
        };
        for movement in &effects.ticket_transfers {
            tickets::apply(unit, movement, cause).await?;
        }
    }
    if !effects.token_transfers.is_empty() {
        let Some(cause) = token_cause else {
            return Err(invalid(unit, ctx, "unexpected token transfers"));
        };
        for movement in &effects.token_transfers {
            tokens::apply(unit, movement, cause).await?;
        }
    }
    Ok(())
}
