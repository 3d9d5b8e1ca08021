pub mod error;
pub mod jobs;
pub mod repos;
pub mod subscriptions;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;
