use std::collections::BTreeMap;
use tokio_postgres::types::Json;
use tokio_postgres::Client;
use tokio_postgres::Transaction;

use crate::constants::APP_STATE_ID;
use crate::schema::AppState;
use crate::schema::Counter;
use crate::schema::OpsCounts;
use crate::store::StoreError;

/// Retrieve the singleton, none for an empty database.
pub(super) async fn get(client: &Client) -> Result<Option<AppState>, StoreError> {
    tracing::trace!("reading app state");
    let qry = "
        select level
            , hash
            , timestamp
            , cycle
            , protocol
            , proto_code
            , voting_period
            , voting_epoch
            , counters
            , ops_counts
            , total_created
            , total_burned
            , total_activated
            , total_frozen
            , total_rollup_bonds
        from tz.app_state
        where id = $1;";
    let row = match client.query_opt(qry, &[&APP_STATE_ID]).await? {
        Some(row) => row,
        None => return Ok(None),
    };
    let counters: Json<BTreeMap<String, i64>> = row.try_get("counters")?;
    let ops_counts: Json<OpsCounts> = row.try_get("ops_counts")?;

    let mut app = AppState::initial();
    app.level = row.try_get("level")?;
    app.hash = row.try_get("hash")?;
    app.timestamp = row.try_get("timestamp")?;
    app.cycle = row.try_get("cycle")?;
    app.protocol = row.try_get("protocol")?;
    app.proto_code = row.try_get("proto_code")?;
    app.voting_period = row.try_get("voting_period")?;
    app.voting_epoch = row.try_get("voting_epoch")?;
    for counter in Counter::ALL {
        *app.counter_mut(counter) = counters.0.get(counter.name()).copied().unwrap_or(0);
    }
    app.ops_counts = ops_counts.0;
    app.total_created = row.try_get("total_created")?;
    app.total_burned = row.try_get("total_burned")?;
    app.total_activated = row.try_get("total_activated")?;
    app.total_frozen = row.try_get("total_frozen")?;
    app.total_rollup_bonds = row.try_get("total_rollup_bonds")?;
    Ok(Some(app))
}

pub(super) async fn upsert(pgtx: &Transaction<'_>, app: &AppState) -> Result<(), StoreError> {
    let counters: BTreeMap<&str, i64> = Counter::ALL
        .iter()
        .map(|c| (c.name(), app.counter(*c)))
        .collect();
    let counters = serde_json::to_value(counters)?;
    let ops_counts = serde_json::to_value(&app.ops_counts)?;
    let stmt = "
        insert into tz.app_state (
            id,
            level,
            hash,
            timestamp,
            cycle,
            protocol,
            proto_code,
            voting_period,
            voting_epoch,
            counters,
            ops_counts,
            total_created,
            total_burned,
            total_activated,
            total_frozen,
            total_rollup_bonds
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        on conflict (id) do update set
            level = excluded.level,
            hash = excluded.hash,
            timestamp = excluded.timestamp,
            cycle = excluded.cycle,
            protocol = excluded.protocol,
            proto_code = excluded.proto_code,
            voting_period = excluded.voting_period,
            voting_epoch = excluded.voting_epoch,
            counters = excluded.counters,
            ops_counts = excluded.ops_counts,
            total_created = excluded.total_created,
            total_burned = excluded.total_burned,
            total_activated = excluded.total_activated,
            total_frozen = excluded.total_frozen,
            total_rollup_bonds = excluded.total_rollup_bonds;";
    pgtx.execute(
        stmt,
        &[
            &APP_STATE_ID,
            &app.level,
            &app.hash,
            &app.timestamp,
            &app.cycle,
            &app.protocol,
            &app.proto_code,
            &app.voting_period,
            &app.voting_epoch,
            &counters,
            &ops_counts,
            &app.total_created,
            &app.total_burned,
            &app.total_activated,
            &app.total_frozen,
            &app.total_rollup_bonds,
        ],
    )
    .await?;
    Ok(())
}
