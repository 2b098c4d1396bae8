/// SQLite application_id stamped on ffind snapshot files.
pub const EXPECTED_APPLICATION_ID: u32 = 0xF17E_5EA1;

/// application_id stored as i32 with the same bit pattern.
pub const APPLICATION_ID_I32: i32 = i32::from_ne_bytes(EXPECTED_APPLICATION_ID.to_ne_bytes());

/// Snapshot layout version. Bump when the tables change.
pub const SNAPSHOT_VERSION: u32 = 1;
