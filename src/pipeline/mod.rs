//! Pipeline stages for one PDF→XLSX request.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap an
//! implementation (e.g. a different conversion vendor) without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ convert ──▶ workbook ──▶ substitute ──▶ enhance
//! (size/magic)  (vendor)    (XLSX text)   (static map)    (LLM, optional)
//! ```
//!
//! 1. [`validate`]   — reject bad attachments before any network spend
//! 2. [`convert`]    — vendor job sequence: create → upload → poll → download
//! 3. [`workbook`]   — expose the XLSX text layer for rewriting
//! 4. [`substitute`] — static Ukrainian→Russian repair, always on
//! 5. [`enhance`]    — batched LLM repair; best-effort, may be absent
//! 6. [`quality`]    — before/after scoring for the user-facing summary

pub mod convert;
pub mod enhance;
pub mod quality;
pub mod substitute;
pub mod validate;
pub mod workbook;
