//! Structured logging field name constants.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation can query by standardized names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, per-request completions |
//! | DEBUG | Decision points, intermediate scores |
//! | TRACE | Per-candidate detail |

/// Subsystem originating the log event.
/// Values: "api", "engine", "db", "index"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pipeline", "retriever", "dup_model", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "score", "persist_snapshot", "candidates"
pub const OPERATION: &str = "op";

/// Tenant the request is scoped to.
pub const TENANT_ID: &str = "tenant_id";

/// Invoice being scored or looked up.
pub const INVOICE_ID: &str = "invoice_id";

/// Vendor of the invoice under scoring.
pub const VENDOR_ID: &str = "vendor_id";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows or candidates produced.
pub const RESULT_COUNT: &str = "result_count";

/// Marks events emitted while an optional capability is unavailable.
pub const DEGRADED: &str = "degraded";
