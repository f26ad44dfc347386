//! Journal module (double-entry transactions and posting batches).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod batch;
pub mod entry;

pub use batch::{
    AddEntry, ApproveBatch, BatchApproved, BatchCreated, BatchEntryAdded, BatchMember,
    BatchPosted, BatchRejected, BatchReversed, BatchStatus, CreateBatch, PostBatch, PostingBatch,
    PostingBatchCommand, PostingBatchEvent, PostingBatchId, RejectBatch, ReverseBatch,
};
pub use entry::{
    AddLine, ApprovalStatus, ApproveEntry, CreateEntry, EntryApproved, EntryCreated, EntryPosted,
    EntryRejected, EntryReversed, EntryUpdated, JournalEntry, JournalEntryCommand,
    JournalEntryEvent, JournalEntryId, JournalEntryLine, LineAdded, PostEntry, RejectEntry,
    ReverseEntry, UpdateEntry, BALANCE_TOLERANCE,
};
