pub mod cache;
pub mod catalog;
pub mod directory;
pub mod dispatcher;
pub mod ingress;
pub mod openfda;
pub mod recognizer;
pub mod scan;
pub mod status_store;
pub mod worker;
