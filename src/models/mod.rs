pub mod api;
pub mod fingerprint;
pub mod medicine;
pub mod scan;
