//! Snowflake ids for rules, alert instances and insights.
//!
//! Every process that writes to the same database needs its own
//! `(machine_id, node_id)` pair, otherwise two writers can mint the same id
//! within one millisecond.

use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

pub const MAX_NODE_PART: i32 = 31;

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Configures the generator for this process. Both parts must lie in
/// `0..=31`. Without a call, ids are minted as node `(1, 1)`.
///
/// # Examples
///
/// ```
/// use revmon_common::id;
///
/// assert!(id::init(0, 32).is_err());
/// assert!(id::init(-1, 3).is_err());
/// ```
pub fn init(machine_id: i32, node_id: i32) -> Result<(), String> {
    for (label, value) in [("machine_id", machine_id), ("node_id", node_id)] {
        if !(0..=MAX_NODE_PART).contains(&value) {
            return Err(format!("{label} must be within 0..={MAX_NODE_PART}, got {value}"));
        }
    }
    let mut gen = ID_GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
    *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
    Ok(())
}

pub fn next_id() -> String {
    let mut gen = ID_GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
    gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1))
        .get_id()
        .to_string()
}
