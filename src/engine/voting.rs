//! Governance: voting periods, baker snapshots, proposals and ballots.
use super::accounts;
use super::error::Inconsistency;
use super::error::MutationError;
use super::unit::Unit;
use super::Direction;
use crate::core::types::AccountId;
use crate::core::types::ChainConstants;
use crate::ledger;
use crate::schema::operations::Ballot;
use crate::schema::operations::ProposalUpvote;
use crate::schema::Counter;
use crate::schema::IndexKey;
use crate::schema::PeriodKind;
use crate::schema::PeriodStatus;
use crate::schema::Proposal;
use crate::schema::RowKey;
use crate::schema::Vote;
use crate::schema::VoterStatus;
use crate::schema::VotingPeriod;
use crate::schema::VotingSnapshot;
use crate::store::Store;

/// Outcome of a period reaching its end.
fn closing_status(period: &VotingPeriod, constants: &ChainConstants) -> PeriodStatus {
    let total = period.total_voting_power.max(1) as i128;
    match period.kind {
        PeriodKind::Proposal => {
            if period.proposals_count == 0 {
                PeriodStatus::NoProposals
            } else if period.top_voting_power as i128 * 10_000
                >= constants.proposal_quorum as i128 * total
            {
                PeriodStatus::Success
            } else {
                PeriodStatus::NoQuorum
            }
        }
        PeriodKind::Exploration | PeriodKind::Promotion => {
            let cast = (period.yay_voting_power + period.nay_voting_power) as i128;
            if (period.participation_power as i128) * 10_000
                < constants.ballot_quorum as i128 * total
            {
                PeriodStatus::NoQuorum
            } else if (period.yay_voting_power as i128) * 10_000
                < constants.supermajority as i128 * cast.max(1)
            {
                PeriodStatus::NoSupermajority
            } else {
                PeriodStatus::Success
            }
        }
        PeriodKind::Cooldown | PeriodKind::Adoption => PeriodStatus::Success,
    }
}

/// Kind of the period following one that ended with `status`.
fn next_kind(kind: PeriodKind, status: PeriodStatus) -> PeriodKind {
    match (kind, status) {
        (PeriodKind::Proposal, PeriodStatus::Success) => PeriodKind::Exploration,
        (PeriodKind::Exploration, PeriodStatus::Success) => PeriodKind::Cooldown,
        (PeriodKind::Cooldown, _) => PeriodKind::Promotion,
        (PeriodKind::Promotion, PeriodStatus::Success) => PeriodKind::Adoption,
        _ => PeriodKind::Proposal,
    }
}

/// Closes the running period, if any, and opens the one of the current level.
pub(super) async fn begin<S: Store>(
    unit: &mut Unit<'_, S>,
    constants: &ChainConstants,
) -> Result<(), MutationError> {
    let level = unit.level;
    let index = constants.voting_period_of(level);
    let (epoch, kind) = match unit.app.voting_period {
        -1 => (0, PeriodKind::Proposal),
        current => {
            let mut period: VotingPeriod = unit.require(RowKey::VotingPeriod(current)).await?;
            period.status = closing_status(&period, constants);
            tracing::debug!(
                "voting period {current} ({:?}) closed with {:?}",
                period.kind,
                period.status
            );
            let kind = next_kind(period.kind, period.status);
            let epoch = match kind {
                PeriodKind::Proposal => period.epoch + 1,
                _ => period.epoch,
            };
            unit.put(period);
            (epoch, kind)
        }
    };

    let length = constants.voting_period_length();
    let mut period = VotingPeriod {
        index,
        level,
        epoch,
        kind,
        first_level: index * length,
        last_level: (index + 1) * length - 1,
        status: PeriodStatus::Active,
        total_bakers: 0,
        total_voting_power: 0,
        proposals_count: 0,
        top_upvotes: 0,
        top_voting_power: 0,
        participation_power: 0,
        yay_ballots: 0,
        yay_voting_power: 0,
        nay_ballots: 0,
        nay_voting_power: 0,
        pass_ballots: 0,
        pass_voting_power: 0,
    };
    for baker_id in unit.store().delegates().await? {
        let baker = accounts::get(unit, baker_id).await?;
        let voting_power = baker.staking_balance();
        if voting_power < constants.min_baker_stake {
            continue;
        }
        let id = unit.allocate(Counter::VotingSnapshot);
        unit.put(VotingSnapshot {
            id,
            level,
            period: index,
            baker_id,
            voting_power,
            status: VoterStatus::None,
        });
        period.total_bakers += 1;
        period.total_voting_power += voting_power;
    }
    tracing::debug!("opening voting period {index} ({kind:?}) of epoch {epoch}");
    unit.put(period);
    ledger::increment(&mut unit.app, Counter::VotingPeriod);
    unit.app.voting_period = index;
    unit.app.voting_epoch = epoch;
    Ok(())
}

/// Drops a period opened at the current level and reopens the previous one.
pub(super) async fn revert<S: Store>(unit: &mut Unit<'_, S>) -> Result<(), MutationError> {
    for snapshot in unit.rows_at::<VotingSnapshot>().await?.into_iter().rev() {
        unit.drop_row(RowKey::VotingSnapshot(snapshot.id), Counter::VotingSnapshot)
            .await?;
    }
    for period in unit.rows_at::<VotingPeriod>().await? {
        unit.delete(RowKey::VotingPeriod(period.index)).await?;
        let res = ledger::decrement(&mut unit.app, Counter::VotingPeriod);
        unit.check(res)?;
        let previous: Option<VotingPeriod> =
            unit.get(RowKey::VotingPeriod(period.index - 1)).await?;
        match previous {
            Some(mut previous) => {
                unit.app.voting_period = previous.index;
                unit.app.voting_epoch = previous.epoch;
                previous.status = PeriodStatus::Active;
                unit.put(previous);
            }
            None => {
                unit.app.voting_period = -1;
                unit.app.voting_epoch = -1;
            }
        }
    }
    Ok(())
}

async fn snapshot<S: Store>(
    unit: &mut Unit<'_, S>,
    period: i32,
    baker_id: AccountId,
) -> Result<Option<VotingSnapshot>, MutationError> {
    unit.find(&IndexKey::VotingSnapshot { period, baker_id })
        .await
}

pub(super) async fn ballot<S: Store>(
    unit: &mut Unit<'_, S>,
    sender: AccountId,
    ballot: &Ballot,
    dir: Direction,
) -> Result<(), MutationError> {
    let (s, n) = (dir.sign(), dir.step());
    let mut period: VotingPeriod = unit.require(RowKey::VotingPeriod(ballot.period)).await?;
    let power = ballot.voting_power;
    match ballot.vote {
        Vote::Yay => {
            period.yay_ballots += n;
            period.yay_voting_power += s * power;
        }
        Vote::Nay => {
            period.nay_ballots += n;
            period.nay_voting_power += s * power;
        }
        Vote::Pass => {
            period.pass_ballots += n;
            period.pass_voting_power += s * power;
        }
    }
    period.participation_power += s * power;
    unit.put(period);

    if let Some(mut snapshot) = snapshot(unit, ballot.period, sender).await? {
        snapshot.status = match dir {
            Direction::Apply => VoterStatus::from(ballot.vote),
            Direction::Revert => VoterStatus::None,
        };
        unit.put(snapshot);
    }
    Ok(())
}

/// Counts an upvote, flagging senders that already upvoted in the period.
pub(super) async fn upvote<S: Store>(
    unit: &mut Unit<'_, S>,
    sender: AccountId,
    upvote: &mut ProposalUpvote,
) -> Result<(), MutationError> {
    let mut period: VotingPeriod = unit.require(RowKey::VotingPeriod(upvote.period)).await?;
    let key = IndexKey::Proposal {
        epoch: period.epoch,
        hash: upvote.proposal.clone(),
    };
    let mut proposal = match unit.find::<Proposal>(&key).await? {
        Some(proposal) => proposal,
        None => {
            period.proposals_count += 1;
            Proposal {
                id: unit.allocate(Counter::Proposal),
                epoch: period.epoch,
                hash: upvote.proposal.clone(),
                initiator_id: sender,
                first_period: period.index,
                first_level: unit.level,
                last_level: period.last_level,
                upvotes: 0,
                voting_power: 0,
            }
        }
    };
    proposal.upvotes += 1;
    proposal.voting_power += upvote.voting_power;
    period.top_upvotes = period.top_upvotes.max(proposal.upvotes);
    period.top_voting_power = period.top_voting_power.max(proposal.voting_power);
    unit.put(proposal);

    let snapshot = snapshot(unit, upvote.period, sender).await?;
    upvote.duplicated = snapshot
        .as_ref()
        .map(|s| s.status == VoterStatus::Upvoted)
        .unwrap_or(false);
    if !upvote.duplicated {
        period.participation_power += upvote.voting_power;
        if let Some(mut snapshot) = snapshot {
            snapshot.status = VoterStatus::Upvoted;
            unit.put(snapshot);
        }
    }
    unit.put(period);
    Ok(())
}

pub(super) async fn revoke_upvote<S: Store>(
    unit: &mut Unit<'_, S>,
    sender: AccountId,
    upvote: &ProposalUpvote,
) -> Result<(), MutationError> {
    let mut period: VotingPeriod = unit.require(RowKey::VotingPeriod(upvote.period)).await?;
    let key = IndexKey::Proposal {
        epoch: period.epoch,
        hash: upvote.proposal.clone(),
    };
    let Some(mut proposal) = unit.find::<Proposal>(&key).await? else {
        return Err(unit.fail(Inconsistency::InvalidInput(format!(
            "no proposal {} in epoch {}",
            upvote.proposal, period.epoch
        ))));
    };
    proposal.upvotes -= 1;
    proposal.voting_power -= upvote.voting_power;
    if proposal.upvotes == 0 {
        unit.drop_row(RowKey::Proposal(proposal.id), Counter::Proposal)
            .await?;
        period.proposals_count -= 1;
    } else {
        unit.put(proposal);
    }

    if !upvote.duplicated {
        period.participation_power -= upvote.voting_power;
        if let Some(mut snapshot) = snapshot(unit, upvote.period, sender).await? {
            snapshot.status = VoterStatus::None;
            unit.put(snapshot);
        }
    }

    // Tops only grow while applying, so they are recomputed from what is left.
    period.top_upvotes = 0;
    period.top_voting_power = 0;
    for stored in unit.store().proposals(period.epoch).await? {
        if let Some(p) = unit.get::<Proposal>(RowKey::Proposal(stored.id)).await? {
            period.top_upvotes = period.top_upvotes.max(p.upvotes);
            period.top_voting_power = period.top_voting_power.max(p.voting_power);
        }
    }
    unit.put(period);
    Ok(())
}
