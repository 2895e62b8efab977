//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const PLANS: &str = "plans";
    pub const PLAN_PARTICIPANTS: &str = "plan_participants";
    pub const PROFILES: &str = "profiles";
    pub const GROUPS: &str = "groups";
    pub const GROUP_MEMBERS: &str = "group_members";
    /// Applied-outcome records (keyed by `{plan_id}_{user_id}`)
    pub const OUTCOME_LEDGER: &str = "outcome_ledger";
}
