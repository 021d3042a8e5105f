//! Purpose: Library crate behind the `initclean` CLI and its tests.
//! Exports: `core` (guard stripping, scanning, cleaning, errors), `notice`, `report_json`.
//! Role: Keeps the binary thin; everything testable lives here.
//! Invariants: Core modules take explicit inputs and never print.
pub mod core;
pub mod notice;
pub mod report_json;
