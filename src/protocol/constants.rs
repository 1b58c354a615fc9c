//! Firebird protocol constants

/// Default server port
pub const DEFAULT_PORT: u16 = 3050;

/// Default number of rows requested per fetch round trip
pub const DEFAULT_FETCH_SIZE: usize = 400;

/// Transaction parameter block items (`isc_tpb_*`)
pub mod tpb {
    /// TPB format version
    pub const VERSION3: u8 = 3;

    /// Consistency (table-stability) isolation
    pub const CONSISTENCY: u8 = 1;

    /// Concurrency (snapshot) isolation
    pub const CONCURRENCY: u8 = 2;

    /// Wait on lock conflicts
    pub const WAIT: u8 = 6;

    /// Fail immediately on lock conflicts
    pub const NOWAIT: u8 = 7;

    /// Read-only access
    pub const READ: u8 = 8;

    /// Read-write access
    pub const WRITE: u8 = 9;

    /// Read committed isolation
    pub const READ_COMMITTED: u8 = 15;

    /// Read committed: read the latest committed record version
    pub const REC_VERSION: u8 = 17;

    /// Read committed: wait for (or fail on) uncommitted record versions
    pub const NO_REC_VERSION: u8 = 18;
}

/// Authentication plugin names
pub mod plugins {
    /// Secure remote password, SHA-1 proof
    pub const SRP: &str = "Srp";

    /// Secure remote password, SHA-256 proof
    pub const SRP256: &str = "Srp256";

    /// Pre-3.0 password hashing
    pub const LEGACY_AUTH: &str = "Legacy_Auth";
}
