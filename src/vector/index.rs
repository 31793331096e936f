//! Dense positional index and its persisted form.
//!
//! - `flat`: in-memory exact index (`position -> vector`, `id <-> position`)
//! - `io`: vector/mapping artifacts and the manifest that commits them

pub mod flat;
pub mod io;
