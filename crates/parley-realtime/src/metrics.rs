//! Engine metric names, recorded through the `metrics` facade.

/// Distribution calls (counter, labels: kind, rationale).
pub const DISTRIBUTIONS_TOTAL: &str = "parley_distributions_total";
/// Frames enqueued onto live connections (counter).
pub const PUSHES_DELIVERED_TOTAL: &str = "parley_pushes_delivered_total";
/// Frames dropped on full or closed queues (counter).
pub const PUSHES_DROPPED_TOTAL: &str = "parley_pushes_dropped_total";
/// Recipients per distribution (histogram).
pub const DISTRIBUTION_RECIPIENTS: &str = "parley_distribution_recipients";
/// Subscribe/unsubscribe commands handled (counter, labels: method, result).
pub const SUBSCRIPTION_COMMANDS_TOTAL: &str = "parley_subscription_commands_total";
/// Handshakes refused by the authentication collaborator (counter).
pub const HANDSHAKES_REFUSED_TOTAL: &str = "parley_handshakes_refused_total";
/// Messages accepted by the write path (counter, labels: kind).
pub const MESSAGES_POSTED_TOTAL: &str = "parley_messages_posted_total";
