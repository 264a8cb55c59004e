use postgres_from_row::FromRow;

use super::param;
use super::Param;
use crate::schema::StakingUpdate;
use crate::schema::StakingUpdateCause;
use crate::schema::UnstakeRequest;
use crate::store::StoreError;

pub(super) const UPDATE_COLUMNS: &[&str] = &[
    "id",
    "level",
    "cycle",
    "baker_id",
    "staker_id",
    "kind",
    "amount",
    "request_id",
    "staking_id",
    "autostaking_id",
    "double_baking_id",
    "double_endorsing_id",
    "double_preendorsing_id",
];

pub(super) const REQUEST_COLUMNS: &[&str] = &[
    "id",
    "cycle",
    "baker_id",
    "staker_id",
    "first_level",
    "last_level",
    "requested",
    "restaked",
    "finalized",
    "slashed",
    "updates_count",
];

pub(super) fn read_update(row: &tokio_postgres::Row) -> Result<StakingUpdate, StoreError> {
    let causes: [Option<i64>; 5] = [
        row.try_get("staking_id")?,
        row.try_get("autostaking_id")?,
        row.try_get("double_baking_id")?,
        row.try_get("double_endorsing_id")?,
        row.try_get("double_preendorsing_id")?,
    ];
    let cause = match causes {
        [Some(id), None, None, None, None] => StakingUpdateCause::Staking(id),
        [None, Some(id), None, None, None] => StakingUpdateCause::Autostaking(id),
        [None, None, Some(id), None, None] => StakingUpdateCause::DoubleBaking(id),
        [None, None, None, Some(id), None] => StakingUpdateCause::DoubleEndorsing(id),
        [None, None, None, None, Some(id)] => StakingUpdateCause::DoublePreendorsing(id),
        _ => {
            return Err(StoreError::Corrupt(String::from(
                "ambiguous staking update cause",
            )))
        }
    };
    Ok(StakingUpdate {
        id: row.try_get("id")?,
        level: row.try_get("level")?,
        cycle: row.try_get("cycle")?,
        baker_id: row.try_get("baker_id")?,
        staker_id: row.try_get("staker_id")?,
        kind: row.try_get("kind")?,
        amount: row.try_get("amount")?,
        request_id: row.try_get("request_id")?,
        cause,
    })
}

pub(super) fn update_params(u: &StakingUpdate) -> Vec<Param> {
    let mut causes: [Option<i64>; 5] = [None; 5];
    match u.cause {
        StakingUpdateCause::Staking(id) => causes[0] = Some(id),
        StakingUpdateCause::Autostaking(id) => causes[1] = Some(id),
        StakingUpdateCause::DoubleBaking(id) => causes[2] = Some(id),
        StakingUpdateCause::DoubleEndorsing(id) => causes[3] = Some(id),
        StakingUpdateCause::DoublePreendorsing(id) => causes[4] = Some(id),
    }
    let mut params = vec![
        param(u.id),
        param(u.level),
        param(u.cycle),
        param(u.baker_id),
        param(u.staker_id),
        param(u.kind),
        param(u.amount),
        param(u.request_id),
    ];
    params.extend(causes.into_iter().map(param));
    params
}

pub(super) fn read_request(row: &tokio_postgres::Row) -> Result<UnstakeRequest, StoreError> {
    Ok(UnstakeRequest::try_from_row(row)?)
}

pub(super) fn request_params(r: &UnstakeRequest) -> Vec<Param> {
    vec![
        param(r.id),
        param(r.cycle),
        param(r.baker_id),
        param(r.staker_id),
        param(r.first_level),
        param(r.last_level),
        param(r.requested),
        param(r.restaked),
        param(r.finalized),
        param(r.slashed),
        param(r.updates_count),
    ]
}
