pub mod backoff;
pub mod destination;
pub mod driver;
pub mod fingerprint;
pub mod media;
mod naming;
pub mod progress;
pub mod session;
pub mod staging;
pub mod transfer;
pub mod tree;
