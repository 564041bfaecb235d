pub mod ai_client;
pub mod conversations;
pub mod documents;
pub mod extraction;
pub mod modes;
pub mod server;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod test_support;
