// Core modules: guard detection, file discovery, cleaning, and error modeling.
pub mod clean;
pub mod error;
pub mod guard;
pub mod scan;
