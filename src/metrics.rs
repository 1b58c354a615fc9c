//! Metrics emitted through the `metrics` facade
//!
//! Nothing is recorded unless the application installs a recorder.

/// Label values
pub mod labels {
    /// Successful outcome
    pub const OUTCOME_OK: &str = "ok";
    /// Failed outcome
    pub const OUTCOME_ERROR: &str = "error";
    /// Transaction committed
    pub const COMMIT: &str = "commit";
    /// Transaction rolled back
    pub const ROLLBACK: &str = "rollback";
    /// Statement executed without a result set
    pub const EXEC: &str = "exec";
    /// Statement opened as a cursor
    pub const QUERY: &str = "query";
}

/// Counter helpers
pub mod counters {
    use ::metrics::counter;

    /// Connection attempt finished (open or create)
    pub fn connection_opened(outcome: &'static str) {
        counter!("firebird_wire_connections_total", "outcome" => outcome).increment(1);
    }

    /// A connection was poisoned by a transport failure
    pub fn connection_poisoned() {
        counter!("firebird_wire_connections_poisoned_total").increment(1);
    }

    /// Transaction finished
    pub fn transaction_finished(kind: &'static str, outcome: &'static str) {
        counter!("firebird_wire_transactions_total", "kind" => kind, "outcome" => outcome)
            .increment(1);
    }

    /// Statement executed or opened
    pub fn statement_executed(kind: &'static str) {
        counter!("firebird_wire_statements_total", "kind" => kind).increment(1);
    }

    /// Rows received from fetch round trips
    pub fn rows_fetched(count: u64) {
        counter!("firebird_wire_rows_fetched_total").increment(count);
    }
}

/// Histogram helpers
pub mod histograms {
    use ::metrics::histogram;

    /// Time from first connect frame to attach/create acknowledgement
    pub fn open_duration(millis: f64) {
        histogram!("firebird_wire_open_duration_ms").record(millis);
    }
}
