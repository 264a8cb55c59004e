//! Raw operations, shaped like the decoder's input.
use serde_json::json;
use serde_json::Value;

/// Protocol credit of `amount` to `address`.
pub fn bootstrap(address: &str, amount: i64) -> Value {
    json!({
        "sender": address,
        "content": {"kind": "migration", "migration_kind": "bootstrap", "balance_change": amount},
    })
}

/// Protocol registration of `address` as a delegate.
pub fn activate_delegate(address: &str) -> Value {
    json!({
        "sender": address,
        "content": {"kind": "migration", "migration_kind": "activate_delegate"},
    })
}

pub fn transaction(from: &str, to: &str, amount: i64, fee: i64) -> Value {
    json!({
        "hash": format!("oo{from}{to}{amount}"),
        "sender": from,
        "counter": 1,
        "fees": {"baker_fee": fee},
        "content": {"kind": "transaction", "target": to, "amount": amount},
    })
}

/// A transaction that failed, paying its fees only.
pub fn failed_transaction(from: &str, to: &str, amount: i64, fee: i64) -> Value {
    let mut op = transaction(from, to, amount, fee);
    op["status"] = json!("failed");
    op["errors"] = json!([{"id": "balance_too_low"}]);
    op
}

pub fn delegation(from: &str, delegate: Option<&str>) -> Value {
    json!({
        "sender": from,
        "fees": {"baker_fee": 1},
        "content": {"kind": "delegation", "delegate": delegate},
    })
}

pub fn origination(from: &str, contract: &str, balance: i64, delegate: Option<&str>) -> Value {
    json!({
        "sender": from,
        "fees": {"baker_fee": 2, "storage_fee": 3, "allocation_fee": 4},
        "content": {
            "kind": "origination",
            "contract": contract,
            "balance": balance,
            "delegate": delegate,
        },
    })
}

pub fn stake(from: &str, amount: i64) -> Value {
    json!({
        "sender": from,
        "content": {"kind": "staking", "action": "stake", "amount": amount},
    })
}

pub fn unstake(from: &str, amount: i64) -> Value {
    json!({
        "sender": from,
        "content": {"kind": "staking", "action": "unstake", "amount": amount},
    })
}

pub fn finalize(from: &str, amount: i64, request_cycle: i32) -> Value {
    json!({
        "sender": from,
        "content": {
            "kind": "staking",
            "action": "finalize",
            "amount": amount,
            "request_cycle": request_cycle,
        },
    })
}

pub fn upvote(from: &str, period: i32, proposal: &str, voting_power: i64) -> Value {
    json!({
        "sender": from,
        "content": {
            "kind": "proposal",
            "period": period,
            "proposal": proposal,
            "voting_power": voting_power,
        },
    })
}

pub fn ballot(from: &str, period: i32, proposal: &str, vote: &str, voting_power: i64) -> Value {
    json!({
        "sender": from,
        "content": {
            "kind": "ballot",
            "period": period,
            "proposal": proposal,
            "vote": vote,
            "voting_power": voting_power,
        },
    })
}

/// Ticket movement of `amount` between optional holders.
pub fn ticket(ticketer: &str, from: Option<&str>, to: Option<&str>, amount: i64) -> Value {
    json!({
        "ticketer": ticketer,
        "content_type": {"prim": "string"},
        "content": {"string": "ticket"},
        "content_hash": "exprTicket",
        "from": from,
        "to": to,
        "amount": amount.to_string(),
    })
}

/// Token movement of `amount` between optional holders.
pub fn token(contract: &str, from: Option<&str>, to: Option<&str>, amount: i64) -> Value {
    json!({
        "contract": contract,
        "token_id": "0",
        "standard": "fa2",
        "from": from,
        "to": to,
        "amount": amount.to_string(),
    })
}

pub fn big_map_alloc(ptr: i64, contract: &str) -> Value {
    json!({
        "action": "alloc",
        "ptr": ptr,
        "contract": contract,
        "path": "ledger",
        "key_type": {"prim": "address"},
        "value_type": {"prim": "nat"},
    })
}

pub fn big_map_update(ptr: i64, key: &str, value: Option<i64>) -> Value {
    json!({
        "action": "update",
        "ptr": ptr,
        "key_hash": format!("expr{key}"),
        "key": {"string": key},
        "value": value.map(|v| json!({"int": v.to_string()})),
    })
}

/// A contract call of `sender` to `contract` with given side effects.
pub fn call(sender: &str, contract: &str, effects: Value) -> Value {
    json!({
        "sender": sender,
        "content": {"kind": "transaction", "target": contract, "amount": 0},
        "effects": effects,
    })
}

/// Endorsement, or preendorsement, of `slots` slots.
pub fn endorsement(from: &str, kind: &str, slots: i32) -> Value {
    json!({"sender": from, "content": {"kind": kind, "slots": slots}})
}

pub fn nonce_revelation(from: &str, revealed_level: i32, reward: i64) -> Value {
    json!({
        "sender": from,
        "content": {
            "kind": "nonce_revelation",
            "revealed_level": revealed_level,
            "nonce": format!("nonce{revealed_level}"),
            "reward": reward,
        },
    })
}

/// Denunciation of `offender` by `accuser`, `kind` being one of the double signing kinds.
pub fn double_signing(
    accuser: &str,
    kind: &str,
    offender: &str,
    lost_staked: i64,
    reward: i64,
) -> Value {
    json!({
        "sender": accuser,
        "content": {
            "kind": kind,
            "offender": offender,
            "accused_level": 1,
            "lost_staked": lost_staked,
            "reward": reward,
        },
    })
}

pub fn activation(address: &str, balance: i64) -> Value {
    json!({
        "sender": address,
        "content": {"kind": "activation", "balance": balance},
    })
}

/// End of cycle reward of kind `endorsing_reward` or `dal_attestation_reward`.
pub fn reward(baker: &str, kind: &str, received: i64) -> Value {
    json!({
        "sender": baker,
        "content": {"kind": kind, "expected": received, "received": received},
    })
}

pub fn revelation_penalty(baker: &str, missed_level: i32, loss: i64) -> Value {
    json!({
        "sender": baker,
        "content": {"kind": "revelation_penalty", "missed_level": missed_level, "loss": loss},
    })
}

pub fn autostake(baker: &str, amount: i64) -> Value {
    json!({
        "sender": baker,
        "content": {"kind": "autostaking", "action": "stake", "amount": amount},
    })
}

pub fn drain_delegate(baker: &str, target: &str, amount: i64, fee: i64) -> Value {
    json!({
        "sender": baker,
        "content": {"kind": "drain_delegate", "target": target, "amount": amount, "fee": fee},
    })
}

pub fn rollup_originate(from: &str, rollup: &str) -> Value {
    json!({
        "sender": from,
        "content": {
            "kind": "smart_rollup_originate",
            "rollup": rollup,
            "pvm_kind": "wasm_2_0_0",
            "genesis_commitment": "src1genesis",
        },
    })
}

pub fn rollup_publish(from: &str, rollup: &str, bond: i64) -> Value {
    json!({
        "sender": from,
        "content": {
            "kind": "smart_rollup_publish",
            "rollup": rollup,
            "commitment": format!("src1{from}"),
            "bond": bond,
        },
    })
}

/// Refutation move ending the game with `loser` losing `loss` of its bond.
pub fn rollup_refute(
    from: &str,
    rollup: &str,
    winner: &str,
    loser: &str,
    loss: i64,
    reward: i64,
) -> Value {
    json!({
        "sender": from,
        "content": {
            "kind": "smart_rollup_refute",
            "rollup": rollup,
            "opponent": loser,
            "outcome": {"winner": winner, "loser": loser, "loss": loss, "reward": reward},
        },
    })
}

pub fn rollup_recover_bond(from: &str, rollup: &str, staker: &str, bond: i64) -> Value {
    json!({
        "sender": from,
        "content": {
            "kind": "smart_rollup_recover_bond",
            "rollup": rollup,
            "staker": staker,
            "bond": bond,
        },
    })
}
