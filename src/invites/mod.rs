//! Invite-code allocation.
//!
//! One [`InviteAllocator`] drives every variant. Storage is a type parameter
//! ([`DbInviteStore`] or [`FileInviteStore`]) and the DB store is further
//! parameterized by [`Tenant`], which picks the table namespace.

mod allocator;
pub mod csv;
mod db_store;
mod file_store;
mod tenant;

pub use allocator::{Assignment, ClaimOutcome, InviteAllocator, InviteStore};
pub use db_store::{tenant_tables, AssignmentRecord, CodeStats, CodeStatus, DbInviteStore, ImportSummary};
pub use file_store::{AssignmentsFile, FileInviteStore};
pub use tenant::Tenant;
