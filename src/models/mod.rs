pub mod courier;
pub mod location;
pub mod raw;
pub mod tracking;
